use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::ThreadId,
};

use nettag_lock::LockObserver;
use nettag_pool::{
    InterfaceId, Link, LinkAllocator, LinkId, PoolOptions, SpecialTag, TagError, TagPool, TagType,
};
use nettag_ranges::RangeList;

fn link(a: &str, b: &str) -> Link {
    Link::new(
        Arc::new(TagPool::new(InterfaceId::new(a, 1))),
        Arc::new(TagPool::new(InterfaceId::new(b, 1))),
    )
    .unwrap()
}

#[test]
fn same_tag_on_both_endpoints() {
    let _ = tracing_subscriber::fmt::try_init();

    let allocator = LinkAllocator::new();
    let link = link("00:00:00:00:00:00:00:01", "00:00:00:00:00:00:00:02");

    for expected in 1..=10 {
        let tag = allocator.next_available_tag(&link, TagType::Vlan, false, None).unwrap();
        assert_eq!(tag, expected);
        assert!(!link.endpoint_a().is_tag_available(TagType::Vlan, tag));
        assert!(!link.endpoint_b().is_tag_available(TagType::Vlan, tag));
    }

    assert_eq!(
        link.endpoint_a().used_tags(TagType::Vlan).unwrap(),
        link.endpoint_b().used_tags(TagType::Vlan).unwrap()
    );
}

#[test]
fn release_restores_both_endpoints() {
    let allocator = LinkAllocator::new();
    let link = link("s1", "s2");
    let before = allocator.available_tags(&link, TagType::Vlan).unwrap();

    let tags = RangeList::from_pairs(&[(10, 20), (30, 40)]).unwrap();
    allocator.allocate_on_link(&link, TagType::Vlan, tags.clone()).unwrap();
    allocator.allocate_on_link(&link, TagType::Vlan, SpecialTag::Any).unwrap();

    let (free_a, free_b) = allocator.release_on_link(&link, TagType::Vlan, tags).unwrap();
    assert!(free_a.is_empty() && free_b.is_empty());
    allocator.release_on_link(&link, TagType::Vlan, SpecialTag::Any).unwrap();

    assert_eq!(allocator.available_tags(&link, TagType::Vlan).unwrap(), before);
    assert!(link.endpoint_a().all_tags_available());
    assert!(link.endpoint_b().all_tags_available());
}

#[test]
fn unsupported_tag_type_on_one_endpoint() {
    let allocator = LinkAllocator::new();
    let mpls = PoolOptions::default().ranges(TagType::Mpls, RangeList::range(16, 1000).unwrap());
    let link = Link::new(
        Arc::new(TagPool::with_options(InterfaceId::new("s1", 1), mpls)),
        Arc::new(TagPool::new(InterfaceId::new("s2", 1))),
    )
    .unwrap();

    assert_eq!(
        allocator.next_available_tag(&link, TagType::Mpls, false, None),
        Err(TagError::TagTypeNotSupported(TagType::Mpls))
    );
    assert!(link.endpoint_a().all_tags_available());
}

#[derive(Default)]
struct Counts {
    nested: AtomicUsize,
    reacquired: AtomicUsize,
}

struct CountingObserver(Arc<Counts>);

impl LockObserver<LinkId> for CountingObserver {
    fn nested_acquire(&self, _: &str, _: ThreadId, _: &[LinkId], held: &[LinkId]) {
        assert_eq!(held.len(), 1);
        self.0.nested.fetch_add(1, Ordering::Relaxed);
    }

    fn reacquire(&self, _: &str, _: ThreadId, _: &[LinkId]) {
        self.0.reacquired.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn nested_link_operations_are_reported() {
    let counts = Arc::new(Counts::default());
    let allocator = LinkAllocator::new().with_observer(CountingObserver(Arc::clone(&counts)));

    let first = link("s1", "s2");
    let second = link("s3", "s4");

    let available = allocator.with_link(&first, |_, _| {
        allocator.available_tags(&second, TagType::Vlan).unwrap()
    });

    assert_eq!(available, RangeList::range(1, 4094).unwrap());
    assert_eq!(counts.nested.load(Ordering::Relaxed), 1);
    assert_eq!(counts.reacquired.load(Ordering::Relaxed), 0);
    assert!(allocator.locks().is_empty());
}
