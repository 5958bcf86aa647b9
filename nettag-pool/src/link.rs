use std::{fmt, sync::Arc};

use nettag_lock::{LockGroup, LockObserver};
use nettag_ranges::{intersection, RangeList};
use tracing::{debug, debug_span};

use crate::{
    select::pick, LinkError, LinkId, NoopNotifier, TagChange, TagError, TagNotifier, TagPool,
    TagSet, TagState, TagType, Tags,
};

/// Two tag pools joined by a link. The link holds no tags of its own: a tag is available
/// on the link when it is available on both endpoints.
#[derive(Debug, Clone)]
pub struct Link {
    id: LinkId,
    endpoint_a: Arc<TagPool>,
    endpoint_b: Arc<TagPool>,
}

impl Link {
    /// Joins two pools. The endpoints are stored in interface id order, whatever the
    /// argument order.
    pub fn new(a: Arc<TagPool>, b: Arc<TagPool>) -> Result<Self, LinkError> {
        if a.id() == b.id() {
            return Err(LinkError::SameEndpoint(a.id().clone()));
        }

        let (endpoint_a, endpoint_b) = if a.id() < b.id() { (a, b) } else { (b, a) };
        let id = LinkId::new(endpoint_a.id().clone(), endpoint_b.id().clone());

        Ok(Self { id, endpoint_a, endpoint_b })
    }

    /// The link id, built from the two interface ids.
    #[inline]
    pub fn id(&self) -> &LinkId {
        &self.id
    }

    /// The endpoint with the lowest interface id.
    #[inline]
    pub fn endpoint_a(&self) -> &Arc<TagPool> {
        &self.endpoint_a
    }

    /// The endpoint with the highest interface id.
    #[inline]
    pub fn endpoint_b(&self) -> &Arc<TagPool> {
        &self.endpoint_b
    }
}

/// Allocates tags on both endpoints of a link at once.
///
/// Every operation takes the link's key in a [`LockGroup`], then locks the endpoint pools
/// in interface id order. Two operations on links sharing an endpoint can therefore never
/// deadlock. Pools taking part in link allocation must not be mutated directly while link
/// operations are running on them, since direct access does not go through the group.
pub struct LinkAllocator {
    locks: LockGroup<LinkId>,
    notifier: Arc<dyn TagNotifier>,
}

impl Default for LinkAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkAllocator {
    /// Creates an allocator with no notifier and the default lock observer.
    pub fn new() -> Self {
        Self { locks: LockGroup::new("links"), notifier: Arc::new(NoopNotifier) }
    }

    /// Sets the notifier called with [`TagChange::Link`] after every link mutation.
    pub fn with_notifier(mut self, notifier: impl TagNotifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Sets the observer of the link lock group.
    pub fn with_observer(mut self, observer: impl LockObserver<LinkId>) -> Self {
        self.locks = self.locks.with_observer(observer);
        self
    }

    /// The lock group holding one key per link in use.
    pub fn locks(&self) -> &LockGroup<LinkId> {
        &self.locks
    }

    /// Runs `f` with exclusive access to both endpoint states of `link`, in interface id
    /// order. Locks are released in reverse order once `f` returns.
    ///
    /// `f` must not call back into this allocator for the same link.
    pub fn with_link<T>(
        &self,
        link: &Link,
        f: impl FnOnce(&mut TagState, &mut TagState) -> T,
    ) -> T {
        let span = debug_span!("with_link", link = %link.id);
        let _enter = span.enter();

        let guard = self.locks.acquire_one(link.id.clone());
        let mut a = link.endpoint_a.lock();
        let mut b = link.endpoint_b.lock();

        let out = f(&mut a, &mut b);

        drop(b);
        drop(a);
        guard.release();
        out
    }

    /// Returns the tags available on both endpoints.
    pub fn available_tags(&self, link: &Link, tag_type: TagType) -> Result<RangeList, TagError> {
        self.with_link(link, |a, b| {
            Ok(intersection(a.available_tags(tag_type)?, b.available_tags(tag_type)?))
        })
    }

    /// Returns `true` if `tag` is available on both endpoints.
    pub fn is_tag_available(&self, link: &Link, tag_type: TagType, tag: u16) -> bool {
        self.with_link(link, |a, b| {
            a.is_tag_available(tag_type, tag) && b.is_tag_available(tag_type, tag)
        })
    }

    /// Picks a tag available on both endpoints and allocates it on both. The choice follows
    /// [`TagState::next_available`], applied to the intersection of the endpoints.
    pub fn next_available_tag(
        &self,
        link: &Link,
        tag_type: TagType,
        take_highest: bool,
        avoid: Option<u16>,
    ) -> Result<u16, TagError> {
        let result: Result<u16, TagError> = self.with_link(link, |a, b| {
            let available =
                intersection(a.available_tags(tag_type)?, b.available_tags(tag_type)?);
            let Some(tag) = pick(&available, take_highest, avoid) else {
                return Err(TagError::NoTagAvailable { entity: link.id.to_string(), tag_type });
            };

            let tags = Tags::Single(tag);
            for state in [a, b] {
                if let Err(e) = state.allocate(tag_type, &tags) {
                    unreachable!("tag {tag} is free on {} but not on its endpoint: {e}", link.id);
                }
            }
            Ok(tag)
        });

        match result {
            Ok(tag) => {
                link.endpoint_a.stats().increment_allocations();
                link.endpoint_b.stats().increment_allocations();
                debug!(link = %link.id, %tag_type, tag, "allocated next available tag on link");
                self.notify(link, tag_type);
            }
            Err(TagError::NoTagAvailable { .. }) => {
                link.endpoint_a.stats().increment_exhausted();
                link.endpoint_b.stats().increment_exhausted();
            }
            Err(_) => {}
        }

        result
    }

    /// Allocates `tags` on both endpoints, or on neither if either endpoint fails.
    pub fn allocate_on_link(
        &self,
        link: &Link,
        tag_type: TagType,
        tags: impl Into<Tags>,
    ) -> Result<(), TagError> {
        let tags = tags.into();
        self.with_link(link, |a, b| {
            let commit_a = a.prepare_allocate(tag_type, &tags)?;
            let commit_b = b.prepare_allocate(tag_type, &tags)?;
            a.commit(commit_a);
            b.commit(commit_b);
            Ok::<_, TagError>(())
        })?;

        link.endpoint_a.stats().increment_allocations();
        link.endpoint_b.stats().increment_allocations();
        debug!(link = %link.id, %tag_type, %tags, "allocated tags on link");
        self.notify(link, tag_type);
        Ok(())
    }

    /// Releases `tags` on both endpoints, or on neither if either endpoint fails.
    ///
    /// Returns the tags that were already free on endpoint a and on endpoint b.
    pub fn release_on_link(
        &self,
        link: &Link,
        tag_type: TagType,
        tags: impl Into<Tags>,
    ) -> Result<(TagSet, TagSet), TagError> {
        let tags = tags.into();
        let (free_a, free_b) = self.with_link(link, |a, b| {
            let (commit_a, free_a) = a.prepare_release(tag_type, &tags)?;
            let (commit_b, free_b) = b.prepare_release(tag_type, &tags)?;
            a.commit(commit_a);
            b.commit(commit_b);
            Ok::<_, TagError>((free_a, free_b))
        })?;

        link.endpoint_a.record_release(tag_type, &free_a);
        link.endpoint_b.record_release(tag_type, &free_b);
        debug!(link = %link.id, %tag_type, %tags, "released tags on link");
        self.notify(link, tag_type);
        Ok((free_a, free_b))
    }

    /// Notifies both endpoints, then the link. Called with no lock held.
    fn notify(&self, link: &Link, tag_type: TagType) {
        link.endpoint_a.notify(tag_type);
        link.endpoint_b.notify(tag_type);
        self.notifier.tags_changed(&TagChange::Link { id: link.id.clone(), tag_type });
    }
}

impl fmt::Debug for LinkAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkAllocator").field("locks", &self.locks).finish()
    }
}
