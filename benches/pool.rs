use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rpool::{Pool, PoolConfig};

const SIZES: [usize; 3] = [16, 256, 4096];

fn bench_allocate_free(c: &mut Criterion) {
  let mut group = c.benchmark_group("allocate_free");

  for size in SIZES {
    let pool = Pool::with_config(PoolConfig {
      track_sites: false,
      ..PoolConfig::default()
    })
    .unwrap();

    group.bench_with_input(BenchmarkId::new("rpool", size), &size, |b, &size| {
      b.iter(|| {
        let handle = pool.allocate(black_box(size)).unwrap();
        pool.free(handle).unwrap();
      });
    });

    group.bench_with_input(BenchmarkId::new("system", size), &size, |b, &size| {
      b.iter(|| {
        let buffer: Vec<u8> = Vec::with_capacity(black_box(size));
        black_box(buffer);
      });
    });
  }

  group.finish();
}

/// Best-fit cost grows with the free list, so fragment the pool first.
fn bench_fragmented(c: &mut Criterion) {
  let pool = Pool::new();

  let handles: Vec<_> = (0..512).map(|i| pool.allocate(32 + (i % 7) * 16).unwrap()).collect();
  for handle in handles.iter().step_by(2) {
    pool.free(*handle).unwrap();
  }

  c.bench_function("allocate_free_fragmented", |b| {
    b.iter(|| {
      let handle = pool.allocate(black_box(64)).unwrap();
      pool.free(handle).unwrap();
    });
  });
}

fn bench_resize(c: &mut Criterion) {
  let pool = Pool::new();

  c.bench_function("resize_in_place", |b| {
    b.iter(|| {
      let handle = pool.allocate(64).unwrap();
      let grown = pool.resize(handle, black_box(1024)).unwrap().unwrap();
      pool.free(grown).unwrap();
    });
  });
}

fn bench_defragment(c: &mut Criterion) {
  let pool = Pool::new();

  for _ in 0..256 {
    pool.allocate(64).unwrap();
  }

  c.bench_function("defragment_scan", |b| {
    b.iter(|| black_box(pool.defragment()));
  });
}

criterion_group!(benches, bench_allocate_free, bench_fragmented, bench_resize, bench_defragment);
criterion_main!(benches);
