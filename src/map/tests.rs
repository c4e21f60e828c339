#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block
)]

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use core::mem::size_of;
use std::error::Error;

use allocator_api2::alloc::Global;
use itertools::assert_equal;
use proptest::prelude::*;

use crate::allocator::{CountingAllocator, LimitedAllocator};
use crate::comparator::{Bytewise, NativeOrder};
use crate::layout::MAX_FUNDAMENTAL_ALIGN;

use super::node::NodeHeader;
use super::*;

type U32Map<'a, A> = RawMap<NativeOrder<u32>, &'a A>;

fn k(key: u32) -> [u8; 4] {
    key.to_ne_bytes()
}

fn v(value: u64) -> [u8; 8] {
    value.to_ne_bytes()
}

fn new_map<A: Allocator>(alloc: &A) -> Result<U32Map<'_, A>, LayoutError> {
    RawMap::new_in(
        Layout::of::<u32>(),
        Layout::of::<u64>(),
        NativeOrder::new(),
        alloc,
    )
}

fn keys<C>(map: &AllocatedRawMap<C>) -> Vec<u32> {
    let mut keys = Vec::new();
    map.walk_in_order(|key, _| keys.push(u32::from_ne_bytes(key.try_into().unwrap())));
    keys
}

fn value_of<C: Comparator>(map: &AllocatedRawMap<C>, key: u32) -> Option<u64> {
    map.get(&k(key))
        .map(|value| u64::from_ne_bytes(value.try_into().unwrap()))
}

fn _assert_allocations(alloc: &CountingAllocator, n_nodes: usize, node_size: usize) {
    assert_eq!(alloc.net_allocations(), 0);
    assert_eq!(alloc.net_bytes_allocated(), 0);
    assert_eq!(alloc.n_allocations(), n_nodes);
    assert_eq!(alloc.n_deallocations(), n_nodes);
    assert_eq!(alloc.n_bytes_allocated(), n_nodes * node_size);
}

#[test]
fn test_constructor() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut map = AllocatedRawMap::new(Layout::of::<u32>(), Layout::of::<u64>(), NativeOrder::<u32>::new())?;

    assert_eq!(map.len(), 0);
    assert!(map.is_empty());
    assert!(!map.contains_key(&k(1)));
    assert_eq!(map.get(&k(1)), None);
    assert_eq!(map.key_layout(), Layout::of::<u32>());
    assert_eq!(map.value_layout(), Layout::of::<u64>());
    map.check();

    unsafe {
        assert!(!map.remove_in(&alloc, &k(1)));
        map.drop_in(&alloc);
    }

    _assert_allocations(&alloc, 0, 0);

    Ok(())
}

#[test]
fn test_node_layout() -> Result<(), Box<dyn Error>> {
    let map = AllocatedRawMap::new(Layout::new(1, 1), Layout::of::<u64>(), Bytewise)?;
    let layout = map.layout;

    assert_eq!(layout.key_offset(), size_of::<NodeHeader>());
    assert_eq!(layout.value_offset() % core::mem::align_of::<u64>(), 0);
    assert!(layout.value_offset() >= layout.key_offset() + 1);

    let node = map.node_layout();
    assert!(node.size() >= layout.value_offset() + 8);
    assert_eq!(node.size() % MAX_FUNDAMENTAL_ALIGN, 0);
    assert_eq!(node.align(), core::mem::align_of::<NodeHeader>().max(8));

    Ok(())
}

#[test]
fn test_invalid_layout() {
    let result = AllocatedRawMap::new(Layout::new(12, 12), Layout::of::<u8>(), Bytewise);
    assert!(result.is_err());
}

#[test]
fn test_oversized_layout() {
    let key = AllocatedRawMap::new(Layout::new(usize::MAX, 1), Layout::of::<u8>(), Bytewise);
    assert_eq!(
        key.err(),
        Some(LayoutError {
            size: usize::MAX,
            align: 1
        })
    );

    let value = AllocatedRawMap::new(Layout::of::<u64>(), Layout::new(usize::MAX - 8, 8), Bytewise);
    assert!(value.is_err());

    let wrapped = RawMap::new(Layout::new(isize::MAX as usize, 1), Layout::of::<u8>(), Bytewise);
    assert!(wrapped.is_err());
}

#[test]
fn test_one() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut map = AllocatedRawMap::new(Layout::of::<u32>(), Layout::of::<u64>(), NativeOrder::<u32>::new())?;

    unsafe {
        map.put_in(&alloc, &k(1), &v(1))?;

        assert_eq!(map.len(), 1);
        assert!(!map.is_empty());
        assert!(map.contains_key(&k(1)));
        assert_eq!(value_of(&map, 1), Some(1));
        assert_eq!(value_of(&map, 2), None);
        map.check();

        map.drop_in(&alloc);
    }

    _assert_allocations(&alloc, 1, map.node_layout().size());

    Ok(())
}

#[test]
fn test_3_in_order() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut map = new_map(&alloc)?;

    map.put(&k(1), &v(1))?;
    map.put(&k(2), &v(4))?;
    map.put(&k(3), &v(9))?;
    map.check();

    assert_eq!(keys(&map.raw), [1, 2, 3]);
    // A straight line of three is rotated into a balanced triangle.
    let root = map.raw.root.unwrap();
    assert_eq!(unsafe { root.key(&map.raw.layout) }, &k(2));
    assert!(root.left().is_some_and(|left| left.is_red()));
    assert!(root.right().is_some_and(|right| right.is_red()));

    Ok(())
}

#[test]
fn test_3_out_of_order() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut map = new_map(&alloc)?;

    map.put(&k(1), &v(1))?;
    map.put(&k(3), &v(9))?;
    map.put(&k(2), &v(4))?;
    map.check();

    assert_eq!(keys(&map.raw), [1, 2, 3]);
    let root = map.raw.root.unwrap();
    assert_eq!(unsafe { root.key(&map.raw.layout) }, &k(2));

    Ok(())
}

#[test]
fn test_scenario_b() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut map = new_map(&alloc)?;

    for key in [5, 3, 8, 1, 4, 7, 9] {
        map.put(&k(key), &v(u64::from(key) * 10))?;
        map.check();
    }

    assert!(map.remove(&k(3)));
    map.check();
    assert!(map.remove(&k(8)));
    map.check();

    assert_eq!(keys(&map.raw), [1, 4, 5, 7, 9]);
    assert_eq!(map.len(), 5);
    assert_eq!(value_of(&map.raw, 4), Some(40));
    assert_eq!(value_of(&map.raw, 7), Some(70));
    assert_eq!(value_of(&map.raw, 3), None);

    let node_size = map.node_layout().size();
    drop(map);
    _assert_allocations(&alloc, 7, node_size);

    Ok(())
}

#[test]
fn test_scenario_c() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut map = new_map(&alloc)?;

    map.put(&k(42), &v(1))?;
    map.put(&k(42), &v(2))?;
    map.check();

    assert_eq!(map.len(), 1);
    assert_eq!(map.get(&k(42)), Some(&v(2)[..]));
    assert_eq!(alloc.n_allocations(), 1);

    Ok(())
}

#[test]
fn test_overwrite_keeps_stored_key() -> Result<(), Box<dyn Error>> {
    // Keys that compare equal on their first byte only.
    let first_byte = |a: &[u8], b: &[u8]| a[0].cmp(&b[0]);
    let mut map = RawMap::new(Layout::of::<[u8; 2]>(), Layout::of::<u8>(), first_byte)?;

    map.put(&[1, 1], &[10])?;
    map.put(&[1, 2], &[20])?;

    assert_eq!(map.len(), 1);
    assert_eq!(map.get(&[1, 9]), Some(&[20][..]));
    let mut stored = Vec::new();
    map.raw.walk_in_order(|key, _| stored.push(key.to_vec()));
    assert_eq!(stored, [vec![1, 1]]);

    Ok(())
}

#[test]
fn test_get_mut() -> Result<(), Box<dyn Error>> {
    let mut map = RawMap::new(Layout::of::<u32>(), Layout::of::<u64>(), NativeOrder::<u32>::new())?;
    map.put(&k(1), &v(1))?;

    map.get_mut(&k(1)).unwrap().copy_from_slice(&v(99));
    assert_eq!(map.get(&k(1)), Some(&v(99)[..]));
    assert!(map.get_mut(&k(2)).is_none());

    Ok(())
}

#[test]
fn test_remove_absent() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut map = new_map(&alloc)?;
    for key in [2, 4, 6] {
        map.put(&k(key), &v(0))?;
    }

    assert!(!map.remove(&k(3)));
    assert!(map.remove(&k(4)));
    assert!(!map.remove(&k(4)));
    assert_eq!(map.get(&k(4)), None);

    assert_eq!(keys(&map.raw), [2, 6]);
    assert_eq!(alloc.n_deallocations(), 1);
    map.check();

    Ok(())
}

#[test]
fn test_ascending_then_remove_all() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut map = new_map(&alloc)?;

    for key in 1..=200 {
        map.put(&k(key), &v(u64::from(key)))?;
        map.check();
    }
    assert_equal(keys(&map.raw), 1..=200u32);

    for key in 1..=200 {
        assert!(map.remove(&k(key)));
        map.check();
    }
    assert!(map.is_empty());
    assert!(map.raw.root.is_none());

    let node_size = map.node_layout().size();
    drop(map);
    _assert_allocations(&alloc, 200, node_size);

    Ok(())
}

#[test]
fn test_descending_then_remove_from_middle() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut map = new_map(&alloc)?;

    for key in (1..=128).rev() {
        map.put(&k(key), &v(u64::from(key)))?;
    }
    map.check();

    for key in (1..=64).rev().chain(65..=128) {
        assert!(map.remove(&k(key)));
        map.check();
        assert_eq!(value_of(&map.raw, key), None);
    }
    assert_eq!(map.len(), 0);

    Ok(())
}

#[test]
fn test_height_is_logarithmic() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut map = new_map(&alloc)?;
    for key in 0..1024 {
        map.put(&k(key), &v(0))?;
    }

    fn height(link: Link) -> usize {
        link.map_or(0, |node| 1 + height(node.left()).max(height(node.right())))
    }
    // A red-black tree is at most 2 * log2(n + 1) high.
    assert!(height(map.raw.root) <= 20);

    Ok(())
}

#[test]
fn test_put_allocation_failure() -> Result<(), Box<dyn Error>> {
    let alloc = LimitedAllocator::new(Global, 3);
    let mut map = new_map(&alloc)?;

    for key in [10, 20, 30] {
        map.put(&k(key), &v(u64::from(key)))?;
    }

    let err = map.put(&k(40), &v(40)).unwrap_err();
    assert_eq!(err.layout().size(), map.node_layout().size());
    assert_eq!(map.len(), 3);
    assert_eq!(keys(&map.raw), [10, 20, 30]);
    assert_eq!(map.get(&k(40)), None);
    map.check();

    // Overwriting an existing key needs no allocation.
    map.put(&k(20), &v(21))?;
    assert_eq!(map.get(&k(20)), Some(&v(21)[..]));

    alloc.set_remaining(1);
    map.put(&k(40), &v(40))?;
    assert_eq!(keys(&map.raw), [10, 20, 30, 40]);
    map.check();

    Ok(())
}

#[test]
fn test_clear() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAllocator::default();
    let mut map = new_map(&alloc)?;
    for key in 0..50 {
        map.put(&k(key), &v(0))?;
    }

    map.clear();
    assert!(map.is_empty());
    assert_eq!(alloc.net_allocations(), 0);
    map.check();

    map.put(&k(7), &v(7))?;
    assert_eq!(keys(&map.raw), [7]);
    map.check();

    Ok(())
}

#[test]
fn test_zero_sized_value() -> Result<(), Box<dyn Error>> {
    let mut set = RawMap::new(Layout::of::<u32>(), Layout::of::<()>(), NativeOrder::<u32>::new())?;
    for key in [3, 1, 2, 1] {
        set.put(&k(key), &[])?;
    }

    assert_eq!(set.len(), 3);
    assert_eq!(set.get(&k(2)), Some(&[][..]));
    assert!(!set.contains_key(&k(4)));
    set.check();

    Ok(())
}

#[test]
fn test_bytewise_keys() -> Result<(), Box<dyn Error>> {
    let mut map = RawMap::new(Layout::of::<[u8; 5]>(), Layout::of::<u16>(), Bytewise)?;
    for (i, word) in [b"delta", b"alpha", b"echo_", b"bravo", b"charl"].iter().enumerate() {
        map.put(*word, &(i as u16).to_ne_bytes())?;
    }
    map.check();

    let mut words = Vec::new();
    map.raw.walk_in_order(|key, _| words.push(key.to_vec()));
    assert_eq!(
        words,
        [b"alpha", b"bravo", b"charl", b"delta", b"echo_"].map(|w| w.to_vec())
    );
    assert_eq!(map.get(b"bravo"), Some(&3u16.to_ne_bytes()[..]));

    Ok(())
}

#[test]
fn test_over_aligned_value() -> Result<(), Box<dyn Error>> {
    #[repr(align(64))]
    struct Wide([u8; 64]);

    let mut map = RawMap::new(Layout::of::<u8>(), Layout::of::<Wide>(), Bytewise)?;
    let layout = map.raw.layout;
    assert_eq!(layout.value_offset() % 64, 0);
    // The composite's alignment is capped at the fundamental maximum.
    assert_eq!(map.node_layout().align(), MAX_FUNDAMENTAL_ALIGN);

    let wide = [7u8; 64];
    map.put(&[1], &wide)?;
    assert_eq!(map.get(&[1]), Some(&wide[..]));

    Ok(())
}

#[test]
#[should_panic(expected = "key region does not match the key layout")]
fn test_wrong_key_size() {
    let map = RawMap::new(Layout::of::<u32>(), Layout::of::<u64>(), NativeOrder::<u32>::new()).unwrap();
    map.get(&[1, 2]);
}

#[test]
#[should_panic(expected = "red root")]
fn test_check_detects_red_root() {
    let mut map = RawMap::new(Layout::of::<u32>(), Layout::of::<u64>(), NativeOrder::<u32>::new()).unwrap();
    map.put(&k(1), &v(1)).unwrap();
    map.raw.root.unwrap().set_red(true);
    map.check();
}

#[test]
#[should_panic(expected = "red node with a red parent")]
fn test_check_detects_red_red() {
    let mut map = RawMap::new(Layout::of::<u32>(), Layout::of::<u64>(), NativeOrder::<u32>::new()).unwrap();
    for key in [2, 1, 3, 4] {
        map.put(&k(key), &v(0)).unwrap();
    }
    // 4 hangs red below 3, which was recoloured black.
    map.raw.root.unwrap().right().unwrap().set_red(true);
    map.check();
}

#[test]
#[should_panic(expected = "unequal black heights")]
fn test_check_detects_black_height() {
    let mut map = RawMap::new(Layout::of::<u32>(), Layout::of::<u64>(), NativeOrder::<u32>::new()).unwrap();
    for key in [2, 1, 3] {
        map.put(&k(key), &v(0)).unwrap();
    }
    map.raw.root.unwrap().left().unwrap().set_red(false);
    map.check();
}

#[test]
#[should_panic(expected = "stored length does not match the tree")]
fn test_check_detects_count() {
    let mut map = RawMap::new(Layout::of::<u32>(), Layout::of::<u64>(), NativeOrder::<u32>::new()).unwrap();
    map.put(&k(1), &v(1)).unwrap();
    map.raw.n = 2;
    map.check();
}

#[test]
#[should_panic(expected = "child does not link back to its parent")]
fn test_check_detects_parent_link() {
    let mut map = RawMap::new(Layout::of::<u32>(), Layout::of::<u64>(), NativeOrder::<u32>::new()).unwrap();
    for key in [2, 1, 3] {
        map.put(&k(key), &v(0)).unwrap();
    }
    // Teardown climbs parent links, so the orphaned nodes leak.
    map.raw.root.unwrap().left().unwrap().set_parent(None);
    map.check();
}

#[test]
#[should_panic(expected = "keys out of order")]
fn test_check_detects_key_order() {
    let mut map = RawMap::new(Layout::of::<u32>(), Layout::of::<u64>(), NativeOrder::<u32>::new()).unwrap();
    for key in [2, 1, 3] {
        map.put(&k(key), &v(0)).unwrap();
    }
    let root = map.raw.root.unwrap();
    unsafe { root.write_key(&map.raw.layout, &k(9)) };
    map.check();
}

#[test]
fn test_debug() -> Result<(), Box<dyn Error>> {
    let mut map = RawMap::new(Layout::of::<u8>(), Layout::of::<u8>(), Bytewise)?;
    map.put(&[2], &[20])?;
    map.put(&[1], &[10])?;

    assert_eq!(format!("{map:?}"), "{[1]: [10], [2]: [20]}");

    Ok(())
}

#[derive(Clone, Debug)]
enum Op {
    Put(u32, u64),
    Remove(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..200u32, any::<u64>()).prop_map(|(key, value)| Op::Put(key, value)),
        (0..200u32).prop_map(Op::Remove),
    ]
}

proptest! {
    #[test]
    fn test_matches_btree_map(ops in prop::collection::vec(op(), 1..300)) {
        let alloc = CountingAllocator::default();
        let mut map = new_map(&alloc).unwrap();
        let mut model = BTreeMap::new();

        for op in ops {
            match op {
                Op::Put(key, value) => {
                    map.put(&k(key), &v(value)).unwrap();
                    model.insert(key, value);
                }
                Op::Remove(key) => {
                    prop_assert_eq!(map.remove(&k(key)), model.remove(&key).is_some());
                }
            }

            map.check();
            prop_assert_eq!(map.len(), model.len());
        }

        prop_assert_eq!(keys(&map.raw), model.keys().copied().collect::<Vec<_>>());
        for (key, value) in &model {
            prop_assert_eq!(value_of(&map.raw, *key), Some(*value));
        }

        drop(map);
        prop_assert_eq!(alloc.net_allocations(), 0);
    }
}

proptest! {
    #[test]
    fn test_insert_all_remove_all(
        (insert_keys, remove_keys) in prop::collection::hash_set(any::<u32>(), 1..150)
            .prop_map(|keys| keys.into_iter().collect::<Vec<_>>())
            .prop_flat_map(|keys| (Just(keys.clone()), Just(keys).prop_shuffle())),
    ) {
        let alloc = CountingAllocator::default();
        let mut map = new_map(&alloc).unwrap();

        for key in &insert_keys {
            map.put(&k(*key), &v(u64::from(*key))).unwrap();
        }
        map.check();
        prop_assert_eq!(map.len(), insert_keys.len());

        for key in &remove_keys {
            prop_assert!(map.remove(&k(*key)));
            map.check();
        }

        prop_assert_eq!(map.len(), 0);
        prop_assert!(map.raw.root.is_none());
        prop_assert_eq!(alloc.net_allocations(), 0);
    }
}
