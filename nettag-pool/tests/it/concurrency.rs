use std::{
    collections::BTreeSet,
    sync::{Arc, Barrier},
    thread,
};

use nettag_lock::LockGroup;
use nettag_pool::{InterfaceId, Link, LinkAllocator, PoolOptions, TagPool, TagState, TagType};
use parking_lot::Mutex;

const THREADS: usize = 20;
const ROUNDS: usize = 50;

/// Every thread reads the state, picks a tag on a private copy and writes the copy back.
/// Without the group lock, two threads could pick the same tag.
#[test]
fn lock_group_serializes_read_modify_write() {
    let _ = tracing_subscriber::fmt::try_init();

    let group = Arc::new(LockGroup::new("interfaces"));
    let state = Arc::new(Mutex::new(TagState::new("s1:1", &PoolOptions::default())));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let group = Arc::clone(&group);
            let state = Arc::clone(&state);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                barrier.wait();
                let mut tags = Vec::with_capacity(ROUNDS);
                for _ in 0..ROUNDS {
                    let guard = group.acquire_one("s1:1");

                    let mut copy = state.lock().clone();
                    thread::yield_now();
                    let tag = copy.next_available(TagType::Vlan, false, None).unwrap();
                    *state.lock() = copy;

                    guard.release();
                    tags.push(tag);
                }
                tags
            })
        })
        .collect();

    let tags: Vec<u16> = handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect();
    let unique: BTreeSet<_> = tags.iter().copied().collect();

    assert_eq!(tags.len(), THREADS * ROUNDS);
    assert_eq!(unique.len(), tags.len());
    assert_eq!(state.lock().used_tags(TagType::Vlan).unwrap().count(), THREADS * ROUNDS);
    assert!(group.is_empty());
}

#[test]
fn pool_next_available_is_linearized() {
    let pool = Arc::new(TagPool::new(InterfaceId::new("s1", 1)));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                (0..ROUNDS)
                    .map(|_| pool.next_available(TagType::Vlan, i % 2 == 0, None).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let tags: BTreeSet<u16> =
        handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect();

    assert_eq!(tags.len(), THREADS * ROUNDS);
    assert_eq!(pool.stats().allocations(), THREADS * ROUNDS);
    assert_eq!(pool.used_tags(TagType::Vlan).unwrap().count(), THREADS * ROUNDS);
}

/// Three links in a triangle, each endpoint shared by two links.
#[test]
fn links_sharing_endpoints_do_not_deadlock() {
    let _ = tracing_subscriber::fmt::try_init();

    let pools: Vec<_> =
        (1..=3).map(|i| Arc::new(TagPool::new(InterfaceId::new(format!("s{i}"), 1)))).collect();
    let links = Arc::new(vec![
        Link::new(Arc::clone(&pools[0]), Arc::clone(&pools[1])).unwrap(),
        Link::new(Arc::clone(&pools[2]), Arc::clone(&pools[1])).unwrap(),
        Link::new(Arc::clone(&pools[0]), Arc::clone(&pools[2])).unwrap(),
    ]);
    let allocator = Arc::new(LinkAllocator::new());

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let links = Arc::clone(&links);
            let allocator = Arc::clone(&allocator);
            thread::spawn(move || {
                let link = &links[i % links.len()];
                let mut tags = Vec::new();
                for round in 0..ROUNDS {
                    let tag = allocator
                        .next_available_tag(link, TagType::Vlan, round % 2 == 0, None)
                        .unwrap();
                    tags.push((i % links.len(), tag));

                    if round % 5 == 0 {
                        allocator.release_on_link(link, TagType::Vlan, tag).unwrap();
                        tags.pop();
                    }
                }
                tags
            })
        })
        .collect();

    let allocations: Vec<(usize, u16)> =
        handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect();

    // every pool holds exactly the tags allocated on its two links, without duplicates
    for (p, pool) in pools.iter().enumerate() {
        let expected: Vec<u16> = allocations
            .iter()
            .filter(|(l, _)| {
                let link = &links[*l];
                link.endpoint_a().id() == pool.id() || link.endpoint_b().id() == pool.id()
            })
            .map(|(_, tag)| *tag)
            .collect();
        let unique: BTreeSet<_> = expected.iter().copied().collect();

        assert_eq!(unique.len(), expected.len(), "pool {p} has a tag allocated twice");
        assert_eq!(pool.used_tags(TagType::Vlan).unwrap().count(), expected.len());
    }

    assert!(allocator.locks().is_empty());
}
