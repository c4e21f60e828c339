use rand::Rng;

use allocated_rbtree::{CountingAllocator, Layout, NativeOrder, RawArray, RawMap};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    for i in 0..20 {
        let map_alloc = CountingAllocator::default();
        let mut map = RawMap::new_in(
            Layout::of::<u32>(),
            Layout::of::<u32>(),
            NativeOrder::<u32>::new(),
            &map_alloc,
        )?;

        let array_alloc = CountingAllocator::default();
        let mut array = RawArray::new_in(Layout::of::<[u32; 2]>(), &array_alloc)?;

        let mut rng = rand::thread_rng();
        let mut keys = Vec::with_capacity(1000);

        for _ in 0..1000 {
            let k: u32 = rng.gen();
            let v: u32 = rng.gen();

            map.put(&k.to_ne_bytes(), &v.to_ne_bytes())?;
            keys.push(k);

            let mut pair = [0u8; 8];
            pair[..4].copy_from_slice(&k.to_ne_bytes());
            pair[4..].copy_from_slice(&v.to_ne_bytes());
            array.push(&pair)?;

            println!(
                "{},map,{},{},{}",
                i,
                map.len(),
                map_alloc.n_allocations(),
                map_alloc.n_bytes_allocated()
            );
            println!(
                "{},array,{},{},{}",
                i,
                array.len(),
                array_alloc.n_allocations() + array_alloc.n_reallocations(),
                array_alloc.n_bytes_allocated()
            );
        }

        for k in keys.iter().step_by(2) {
            map.remove(&k.to_ne_bytes());
            array.remove(0);

            println!(
                "{},map,{},{},{}",
                i,
                map.len(),
                map_alloc.n_deallocations(),
                map_alloc.n_bytes_deallocated()
            );
            println!(
                "{},array,{},{},{}",
                i,
                array.len(),
                array_alloc.n_deallocations() + array_alloc.n_reallocations(),
                array_alloc.n_bytes_deallocated()
            );
        }

        map.check();

        std::mem::drop(map);
        std::mem::drop(array);

        assert_eq!(map_alloc.net_allocations(), 0);
        assert_eq!(array_alloc.net_allocations(), 0);
    }

    Ok(())
}
