// Shows how handles go stale once their slot is released and reused
use kestrel_containers::prelude::*;

fn main() {
    let mut arena: SlotArena<&'static str> = SlotArena::with_capacity(2);

    let first = arena.insert("first").expect("arena has room");
    let second = arena.insert("second").expect("arena has room");
    println!("Inserted first at {:?}, second at {:?}", first, second);

    match arena.insert("third") {
        Ok(_) => println!("ERROR: arena grew past its capacity"),
        Err(error) => println!("Correctly rejected insert: {}", error),
    }

    arena.remove(first).expect("first is live");
    let third = arena.insert("third").expect("slot was freed");
    println!("third reused slot {} with id {}", third.index(), third.unique_id());
    println!("first is stale: {}", arena.is_stale(&first));
    println!("lookup through first: {:?}", arena.get(&first));
    println!("lookup through third: {:?}", arena.get(&third));
}
