//! Demonstrates the owning wrapper types.
//!
//! `RawMap` and `RawArray` own their allocator, so none of the calls below
//! need `unsafe`. Keys and values are plain byte regions whose layouts are
//! picked at runtime.

use allocated_rbtree::{Bytewise, Layout, NativeOrder, RawArray, RawMap};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Map Demo ===\n");
    map_demo()?;

    println!("\n=== Fixed-Width String Keys ===\n");
    string_key_demo()?;

    println!("\n=== Array Demo ===\n");
    array_demo()?;

    Ok(())
}

fn map_demo() -> Result<(), Box<dyn std::error::Error>> {
    let mut map = RawMap::new(Layout::of::<u32>(), Layout::of::<[u8; 5]>(), NativeOrder::<u32>::new())?;

    map.put(&3u32.to_ne_bytes(), b"three")?;
    map.put(&1u32.to_ne_bytes(), b"one  ")?;
    map.put(&4u32.to_ne_bytes(), b"four ")?;
    map.put(&1u32.to_ne_bytes(), b"ONE  ")?; // Updates existing key
    map.put(&5u32.to_ne_bytes(), b"five ")?;
    map.put(&9u32.to_ne_bytes(), b"nine ")?;
    map.put(&2u32.to_ne_bytes(), b"two  ")?;

    println!("Inserted {} items", map.len());
    println!("Node layout: {:?}", map.node_layout());

    if let Some(value) = map.get(&1u32.to_ne_bytes()) {
        println!("Key 1: {}", String::from_utf8_lossy(value));
    }

    if let Some(value) = map.get_mut(&9u32.to_ne_bytes()) {
        value.make_ascii_uppercase();
    }

    println!("Removed 4: {}", map.remove(&4u32.to_ne_bytes()));
    println!("Removed 4 again: {}", map.remove(&4u32.to_ne_bytes()));

    map.check();
    println!("Final count: {} items", map.len());

    Ok(())
}

fn string_key_demo() -> Result<(), Box<dyn std::error::Error>> {
    let mut map = RawMap::new(Layout::of::<[u8; 8]>(), Layout::of::<u16>(), Bytewise)?;

    for (i, word) in [b"pear    ", b"apple   ", b"quince  ", b"fig     "].iter().enumerate() {
        map.put(*word, &(i as u16).to_ne_bytes())?;
    }

    println!("{map:?}");
    println!("Contains fig: {}", map.contains_key(b"fig     "));

    Ok(())
}

fn array_demo() -> Result<(), Box<dyn std::error::Error>> {
    let mut array = RawArray::new(Layout::of::<u64>())?;

    for n in [10u64, 20, 30, 40] {
        array.push(&n.to_ne_bytes())?;
    }
    array.insert(1, &15u64.to_ne_bytes())?;
    array.remove(3);

    print!("Items:");
    for item in &array {
        print!(" {}", u64::from_ne_bytes(item.try_into()?));
    }
    println!();

    let mut last = [0u8; 8];
    if array.pop(Some(&mut last)) {
        println!("Popped {}", u64::from_ne_bytes(last));
    }
    println!("Length {} capacity {}", array.len(), array.capacity());

    Ok(())
}
