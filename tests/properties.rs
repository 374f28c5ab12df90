use proptest::prelude::*;

use rpool::{ErrorKind, Handle, Pool, PoolConfig};

const CAPACITY: usize = 32 * 1024;

#[derive(Debug, Clone)]
enum Op {
  Allocate(usize),
  Zeroed(usize, usize),
  Aligned(usize, u32),
  Free(usize),
  Resize(usize, usize),
  Defragment,
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    4 => (1_usize..2048).prop_map(Op::Allocate),
    1 => (1_usize..64, 1_usize..64).prop_map(|(count, size)| Op::Zeroed(count, size)),
    2 => (1_usize..1024, 0_u32..9).prop_map(|(size, shift)| Op::Aligned(size, shift)),
    4 => any::<usize>().prop_map(Op::Free),
    2 => (any::<usize>(), 0_usize..3072).prop_map(|(index, size)| Op::Resize(index, size)),
    1 => Just(Op::Defragment),
  ]
}

/// Applies `op`, keeping `live` in sync. Allocation failures must be
/// out-of-memory, never anything else.
fn apply(
  pool: &Pool,
  live: &mut Vec<Handle>,
  op: Op,
) -> Result<(), TestCaseError> {
  match op {
    Op::Allocate(size) => match pool.allocate(size) {
      Ok(handle) => live.push(handle),
      Err(err) => prop_assert_eq!(err.kind(), ErrorKind::OutOfMemory),
    },
    Op::Zeroed(count, size) => match pool.allocate_zeroed(count, size) {
      Ok(handle) => {
        prop_assert!(pool.read(handle, 0, count * size).unwrap().iter().all(|byte| *byte == 0));
        live.push(handle);
      }
      Err(err) => prop_assert_eq!(err.kind(), ErrorKind::OutOfMemory),
    },
    Op::Aligned(size, shift) => match pool.allocate_aligned(size, 1 << shift) {
      Ok(handle) => {
        prop_assert_eq!(handle.addr() % (1 << shift), 0);
        live.push(handle);
      }
      Err(err) => prop_assert_eq!(err.kind(), ErrorKind::OutOfMemory),
    },
    Op::Free(index) if !live.is_empty() => {
      let handle = live.swap_remove(index % live.len());
      pool.free(handle).unwrap();

      // A block merged into its predecessor no longer exists on its own.
      let kind = pool.free(handle).unwrap_err().kind();
      prop_assert!(kind == ErrorKind::DoubleFree || kind == ErrorKind::InvalidPointer);
    }
    Op::Resize(index, size) if !live.is_empty() => {
      let slot = index % live.len();
      let handle = live[slot];
      let old_size = pool.usable_size(handle).unwrap();
      let keep = old_size.min(size).min(64);

      pool.fill(handle, 0x7E).unwrap();

      match pool.resize(handle, size) {
        Ok(Some(resized)) => {
          prop_assert!(pool.read(resized, 0, keep).unwrap().iter().all(|byte| *byte == 0x7E));
          live[slot] = resized;
        }
        Ok(None) => {
          prop_assert_eq!(size, 0);
          live.swap_remove(slot);
        }
        Err(err) => {
          prop_assert_eq!(err.kind(), ErrorKind::OutOfMemory);
          prop_assert_eq!(pool.usable_size(handle).unwrap(), old_size);
        }
      }
    }
    Op::Defragment => {
      pool.defragment();
    }
    _ => {}
  }

  Ok(())
}

proptest! {
  #[test]
  fn layout_survives_any_sequence(ops in proptest::collection::vec(op(), 1..80)) {
    let pool = Pool::with_config(PoolConfig::with_capacity(CAPACITY)).unwrap();
    let mut live = Vec::new();

    for op in ops {
      apply(&pool, &mut live, op)?;

      let stats = pool.stats();

      prop_assert!(pool.verify_layout());
      prop_assert_eq!(stats.used_bytes + stats.free_bytes + stats.header_bytes(), CAPACITY);
      prop_assert_eq!(stats.used_blocks, live.len());
    }

    for handle in live.drain(..) {
      pool.free(handle).unwrap();
    }

    prop_assert!(pool.leak_check().is_clean());
    prop_assert_eq!(pool.stats().total_blocks, 1);
  }

  #[test]
  fn round_trip_restores_free_space(size in 1_usize..(CAPACITY / 2)) {
    let pool = Pool::with_config(PoolConfig::with_capacity(CAPACITY)).unwrap();
    let before = pool.stats();

    let handle = pool.allocate(size).unwrap();
    pool.free(handle).unwrap();

    let after = pool.stats();

    prop_assert_eq!(after.free_blocks, before.free_blocks);
    prop_assert_eq!(after.free_bytes, before.free_bytes);
  }
}
