//! Property-based tests for brick allocation
//!
//! 1. **Uniqueness**: an address is never handed out twice while live
//! 2. **Reuse first**: a new buffer is only created when no deleted brick is waiting

#![cfg(test)]

use proptest::prelude::*;
use std::collections::BTreeSet;

use super::{BrickPoolManager, PoolConfig};

const BRICK: usize = 64;
const BRICKS_PER_BUFFER: usize = 4;

#[derive(Debug, Clone)]
enum Op {
    Allocate,
    /// Delete the live brick at this index (modulo the live count)
    Delete(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Allocate),
        1 => any::<usize>().prop_map(Op::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_allocation_unique_and_reuses_deleted(
        ops in prop::collection::vec(op_strategy(), 1..60)
    ) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = PoolConfig::new(temp_dir.path())
            .with_max_buffer_size(BRICKS_PER_BUFFER * BRICK)
            .with_ram_limit(2 * BRICKS_PER_BUFFER * BRICK);
        let pool = BrickPoolManager::initialize(&config, BRICK).unwrap();

        let mut live: Vec<u64> = Vec::new();
        let mut deleted: BTreeSet<u64> = BTreeSet::new();

        for op in ops {
            match op {
                Op::Allocate => {
                    let buffers_before = pool.buffer_count();
                    let address = pool.allocate_brick().unwrap();

                    prop_assert!(!live.contains(&address));
                    if pool.buffer_count() > buffers_before {
                        prop_assert!(deleted.is_empty());
                    }
                    deleted.remove(&address);
                    live.push(address);
                }
                Op::Delete(i) if !live.is_empty() => {
                    let address = live.swap_remove(i % live.len());
                    pool.delete_brick(address).unwrap();
                    deleted.insert(address);
                }
                Op::Delete(_) => {}
            }
        }

        prop_assert_eq!(pool.free_brick_count(), deleted.len());
    }
}
