use std::{sync::Arc, thread, time::Duration};

use criterion::{
    criterion_group, criterion_main, measurement::WallTime, BenchmarkGroup, BenchmarkId, Criterion,
    Throughput,
};
use pprof::criterion::Output;

use nettag::{InterfaceId, Link, LinkAllocator, TagPool, TagType};

const N_OPS: usize = 1_000;

// Using jemalloc improves performance by ~10%
#[cfg(all(not(windows), not(target_env = "musl")))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

struct LinkBenchmark {
    allocator: Arc<LinkAllocator>,
    /// A ring of links: link `i` joins pools `i` and `i + 1`, so every pool is shared by two
    /// links.
    links: Arc<Vec<Link>>,
    n_ops: usize,
}

impl LinkBenchmark {
    fn new(n_links: usize) -> Self {
        let pools: Vec<_> = (0..n_links)
            .map(|i| Arc::new(TagPool::new(InterfaceId::new(format!("s{i}"), 1))))
            .collect();
        let links = (0..n_links)
            .map(|i| {
                let next = (i + 1) % n_links;
                Link::new(Arc::clone(&pools[i]), Arc::clone(&pools[next])).unwrap()
            })
            .collect();

        Self { allocator: Arc::new(LinkAllocator::new()), links: Arc::new(links), n_ops: N_OPS }
    }

    /// Allocates and immediately releases a tag, `n_ops` times per thread, with one thread per
    /// link.
    fn bench_allocate_release(&self, mut group: BenchmarkGroup<'_, WallTime>) {
        let threads = self.links.len();
        group.throughput(Throughput::Elements((self.n_ops * threads) as u64));
        group.bench_function(BenchmarkId::from_parameter(threads), |b| {
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|i| {
                        let allocator = Arc::clone(&self.allocator);
                        let links = Arc::clone(&self.links);
                        let n_ops = self.n_ops;
                        thread::spawn(move || {
                            let link = &links[i];
                            for _ in 0..n_ops {
                                let tag = allocator
                                    .next_available_tag(link, TagType::Vlan, false, None)
                                    .unwrap();
                                allocator.release_on_link(link, TagType::Vlan, tag).unwrap();
                            }
                        })
                    })
                    .collect();

                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });

        group.finish();
    }
}

fn link_allocation(c: &mut Criterion) {
    let _ = tracing_subscriber::fmt::try_init();

    for n_links in [3, 4, 8] {
        let bench = LinkBenchmark::new(n_links);
        let mut group = c.benchmark_group("link_allocate_release");
        group.sample_size(10);
        bench.bench_allocate_release(group);
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().warm_up_time(Duration::from_secs(1)).with_profiler(pprof::criterion::PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = link_allocation
}

// Runs concurrent allocations on links sharing endpoint pools.
criterion_main!(benches);
