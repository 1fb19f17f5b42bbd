use memlist_core::alloc::{Allocator, BlockPtr, BlockState};
use proptest::prelude::*;

const CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    Free(usize),
    Resize(usize, usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..128).prop_map(Op::Alloc),
        2 => any::<usize>().prop_map(Op::Free),
        2 => (any::<usize>(), 1usize..192).prop_map(|(i, size)| Op::Resize(i, size)),
    ]
}

struct Live {
    ptr: BlockPtr,
    bytes: Vec<u8>,
}

fn pattern(seed: usize, len: usize) -> Vec<u8> {
    (0..len).map(|i| (seed.wrapping_mul(31) + i) as u8 | 1).collect()
}

fn assert_table_matches(allocator: &Allocator, live: &[Live]) {
    allocator.check_invariants().unwrap();

    let blocks = allocator.blocks();
    let in_use: Vec<_> = blocks
        .iter()
        .filter(|b| b.state == BlockState::InUse)
        .collect();
    assert_eq!(in_use.len(), live.len());
    for block in live {
        let info = in_use
            .iter()
            .find(|b| b.ptr == block.ptr)
            .expect("live block is allocated");
        assert_eq!(info.len, block.bytes.len());
    }
    for pair in blocks.windows(2) {
        assert!(!(pair[0].is_free() && pair[1].is_free()));
    }
}

proptest! {
    #[test]
    fn random_sequences_keep_the_partition(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let allocator = Allocator::init(CAPACITY).unwrap();
        let mut live: Vec<Live> = Vec::new();

        for (step, op) in ops.into_iter().enumerate() {
            match op {
                Op::Alloc(size) => {
                    if let Some(ptr) = allocator.alloc(size) {
                        prop_assert_eq!(allocator.read(ptr).unwrap(), vec![0u8; size]);
                        let bytes = pattern(step, size);
                        allocator.write(ptr, 0, &bytes).unwrap();
                        live.push(Live { ptr, bytes });
                    }
                }
                Op::Free(i) if !live.is_empty() => {
                    let block = live.swap_remove(i % live.len());
                    allocator.free(block.ptr);
                }
                Op::Resize(i, size) if !live.is_empty() => {
                    let idx = i % live.len();
                    let old_len = live[idx].bytes.len();
                    match allocator.resize(live[idx].ptr, size) {
                        Some(ptr) => {
                            let now = allocator.read(ptr).unwrap();
                            let keep = old_len.min(size);
                            prop_assert_eq!(now.len(), size);
                            prop_assert_eq!(&now[..keep], &live[idx].bytes[..keep]);
                            prop_assert!(now[keep..].iter().all(|b| *b == 0));
                            let bytes = pattern(step, size);
                            allocator.write(ptr, 0, &bytes).unwrap();
                            live[idx] = Live { ptr, bytes };
                        }
                        None => {
                            prop_assert_eq!(
                                allocator.read(live[idx].ptr).unwrap(),
                                live[idx].bytes.clone()
                            );
                        }
                    }
                }
                _ => {}
            }
            assert_table_matches(&allocator, &live);
        }

        for block in live.drain(..) {
            allocator.free(block.ptr);
        }
        let blocks = allocator.blocks();
        prop_assert_eq!(blocks.len(), 1);
        prop_assert_eq!(blocks[0].len, CAPACITY);
        prop_assert!(allocator.alloc(CAPACITY).is_some());
    }

    #[test]
    fn alloc_is_always_zero_filled(sizes in prop::collection::vec(1usize..200, 1..16)) {
        let allocator = Allocator::init(CAPACITY).unwrap();
        let mut held = Vec::new();
        for size in sizes {
            if let Some(ptr) = allocator.alloc(size) {
                prop_assert!(allocator.read(ptr).unwrap().iter().all(|b| *b == 0));
                allocator.write(ptr, 0, &vec![0xEE; size]).unwrap();
                held.push(ptr);
            }
            if held.len() > 3 {
                allocator.free(held.remove(0));
            }
        }
    }
}

#[test]
fn reinit_after_deinit_serves_full_capacity() {
    let allocator = Allocator::init(CAPACITY).unwrap();
    for _ in 0..8 {
        allocator.alloc(100).unwrap();
    }
    allocator.deinit();

    let allocator = Allocator::init(CAPACITY).unwrap();
    assert_eq!(allocator.alloc(CAPACITY), Some(BlockPtr::new(0)));
}
