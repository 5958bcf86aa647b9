use std::{collections::BTreeSet, fmt, sync::Arc};

use nettag_ranges::RangeList;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{
    InterfaceId, NoopNotifier, PoolOptions, PoolStats, SpecialTag, SpecialTags, TagChange,
    TagError, TagNotifier, TagRanges, TagSet, TagSnapshot, TagState, TagType, Tags,
};

/// The tags of one interface, safe to share between threads.
///
/// Every method locks the pool for the duration of the operation only, and the notifier
/// runs after the lock is released.
pub struct TagPool {
    id: InterfaceId,
    state: Mutex<TagState>,
    notifier: Arc<dyn TagNotifier>,
    stats: PoolStats,
}

impl TagPool {
    /// Creates a pool for `id` with the default options (VLAN only).
    pub fn new(id: InterfaceId) -> Self {
        Self::with_options(id, PoolOptions::default())
    }

    /// Creates a pool for `id` with the tag types and ranges of `options`.
    pub fn with_options(id: InterfaceId, options: PoolOptions) -> Self {
        let state = TagState::new(id.to_string(), &options);
        Self {
            id,
            state: Mutex::new(state),
            notifier: Arc::new(NoopNotifier),
            stats: PoolStats::default(),
        }
    }

    /// Sets the notifier called after every mutation of this pool.
    pub fn with_notifier(mut self, notifier: impl TagNotifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// The interface this pool belongs to.
    #[inline]
    pub fn id(&self) -> &InterfaceId {
        &self.id
    }

    /// The operation counters of this pool.
    #[inline]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Allocates `tags`. See [`TagState::allocate`].
    pub fn allocate(&self, tag_type: TagType, tags: impl Into<Tags>) -> Result<(), TagError> {
        let tags = tags.into();
        self.mutate(tag_type, |state| state.allocate(tag_type, &tags))?;

        self.stats.increment_allocations();
        debug!(interface = %self.id, %tag_type, %tags, "allocated tags");
        Ok(())
    }

    /// Releases `tags` and returns those that were already free. See [`TagState::release`].
    pub fn release(&self, tag_type: TagType, tags: impl Into<Tags>) -> Result<TagSet, TagError> {
        let tags = tags.into();
        let already_free = self.mutate(tag_type, |state| state.release(tag_type, &tags))?;

        self.record_release(tag_type, &already_free);
        debug!(interface = %self.id, %tag_type, %tags, "released tags");
        Ok(already_free)
    }

    /// Allocates the next free tag. See [`TagState::next_available`].
    pub fn next_available(
        &self,
        tag_type: TagType,
        take_highest: bool,
        avoid: Option<u16>,
    ) -> Result<u16, TagError> {
        let result =
            self.mutate(tag_type, |state| state.next_available(tag_type, take_highest, avoid));

        match result {
            Ok(tag) => {
                self.stats.increment_allocations();
                debug!(interface = %self.id, %tag_type, tag, "allocated next available tag");
            }
            Err(TagError::NoTagAvailable { .. }) => self.stats.increment_exhausted(),
            Err(_) => {}
        }

        result
    }

    /// See [`TagState::set_current_ranges`].
    pub fn set_current_ranges(
        &self,
        tag_type: TagType,
        ranges: RangeList,
        ignore_in_use: bool,
        validate_against_default: bool,
    ) -> Result<(), TagError> {
        self.mutate(tag_type, |state| {
            state.set_current_ranges(tag_type, ranges, ignore_in_use, validate_against_default)
        })
    }

    /// See [`TagState::set_default_ranges`].
    pub fn set_default_ranges(
        &self,
        tag_type: TagType,
        ranges: RangeList,
        ignore_in_use: bool,
    ) -> Result<(), TagError> {
        self.mutate(tag_type, |state| state.set_default_ranges(tag_type, ranges, ignore_in_use))
    }

    /// See [`TagState::reset_current_ranges`].
    pub fn reset_current_ranges(&self, tag_type: TagType) -> Result<(), TagError> {
        self.mutate(tag_type, |state| state.reset_current_ranges(tag_type))
    }

    /// See [`TagState::remove_current_ranges`].
    pub fn remove_current_ranges(&self, tag_type: TagType) -> Result<(), TagError> {
        self.mutate(tag_type, |state| state.remove_current_ranges(tag_type))
    }

    /// See [`TagState::set_special_tags`].
    pub fn set_special_tags(
        &self,
        tag_type: TagType,
        tags: &[SpecialTag],
        ignore_in_use: bool,
        validate_against_default: bool,
    ) -> Result<(), TagError> {
        self.mutate(tag_type, |state| {
            state.set_special_tags(tag_type, tags, ignore_in_use, validate_against_default)
        })
    }

    /// See [`TagState::set_default_special_tags`].
    pub fn set_default_special_tags(
        &self,
        tag_type: TagType,
        tags: &[SpecialTag],
        ignore_in_use: bool,
    ) -> Result<(), TagError> {
        self.mutate(tag_type, |state| state.set_default_special_tags(tag_type, tags, ignore_in_use))
    }

    /// See [`TagState::reset_special_tags`].
    pub fn reset_special_tags(&self, tag_type: TagType) -> Result<(), TagError> {
        self.mutate(tag_type, |state| state.reset_special_tags(tag_type))
    }

    /// See [`TagState::remove_special_tags`].
    pub fn remove_special_tags(&self, tag_type: TagType) -> Result<(), TagError> {
        self.mutate(tag_type, |state| state.remove_special_tags(tag_type))
    }

    /// Returns a copy of the available tags.
    pub fn available_tags(&self, tag_type: TagType) -> Result<RangeList, TagError> {
        self.state.lock().available_tags(tag_type).cloned()
    }

    /// Returns a copy of the integer tag triple.
    pub fn tag_ranges(&self, tag_type: TagType) -> Result<TagRanges, TagError> {
        self.state.lock().tag_ranges(tag_type).cloned()
    }

    /// Returns a copy of the special tag triple.
    pub fn special_tags(&self, tag_type: TagType) -> Result<SpecialTags, TagError> {
        self.state.lock().special_tags(tag_type).cloned()
    }

    /// See [`TagState::used_tags`].
    pub fn used_tags(&self, tag_type: TagType) -> Result<RangeList, TagError> {
        self.state.lock().used_tags(tag_type)
    }

    /// See [`TagState::inactive_tags`].
    pub fn inactive_tags(&self, tag_type: TagType) -> Result<RangeList, TagError> {
        self.state.lock().inactive_tags(tag_type)
    }

    /// See [`TagState::used_special_tags`].
    pub fn used_special_tags(&self, tag_type: TagType) -> Result<BTreeSet<SpecialTag>, TagError> {
        self.state.lock().used_special_tags(tag_type)
    }

    /// See [`TagState::inactive_special_tags`].
    pub fn inactive_special_tags(
        &self,
        tag_type: TagType,
    ) -> Result<BTreeSet<SpecialTag>, TagError> {
        self.state.lock().inactive_special_tags(tag_type)
    }

    /// See [`TagState::is_tag_available`].
    pub fn is_tag_available(&self, tag_type: TagType, tag: u16) -> bool {
        self.state.lock().is_tag_available(tag_type, tag)
    }

    /// See [`TagState::is_tag_type_supported`].
    pub fn is_tag_type_supported(&self, tag_type: TagType) -> bool {
        self.state.lock().is_tag_type_supported(tag_type)
    }

    /// See [`TagState::all_tags_available`].
    pub fn all_tags_available(&self) -> bool {
        self.state.lock().all_tags_available()
    }

    /// Exports every tag triple of the pool.
    pub fn snapshot(&self) -> TagSnapshot {
        self.state.lock().snapshot()
    }

    /// Replaces the whole state of the pool. Every restored tag type is notified.
    pub fn restore(&self, snapshot: TagSnapshot) -> Result<(), TagError> {
        let tag_types: BTreeSet<_> =
            snapshot.ranges.keys().chain(snapshot.special.keys()).copied().collect();

        self.state.lock().restore(snapshot)?;

        for tag_type in tag_types {
            self.notify(tag_type);
        }
        Ok(())
    }

    /// Locks the state. Used by the link allocator, which notifies on its own.
    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, TagState> {
        self.state.lock()
    }

    pub(crate) fn notify(&self, tag_type: TagType) {
        self.notifier.tags_changed(&TagChange::Interface { id: self.id.clone(), tag_type });
    }

    pub(crate) fn record_release(&self, tag_type: TagType, already_free: &TagSet) {
        self.stats.increment_releases();
        if !already_free.is_empty() {
            self.stats.increment_double_releases();
            warn!(
                interface = %self.id,
                %tag_type,
                %already_free,
                "released tags that were already free"
            );
        }
    }

    /// Runs `f` under the lock and notifies once the lock is released, if `f` succeeded.
    fn mutate<T>(
        &self,
        tag_type: TagType,
        f: impl FnOnce(&mut TagState) -> Result<T, TagError>,
    ) -> Result<T, TagError> {
        let result = f(&mut self.state.lock());
        if result.is_ok() {
            self.notify(tag_type);
        }
        result
    }
}

impl fmt::Debug for TagPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagPool").field("id", &self.id).field("stats", &self.stats).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use nettag_ranges::InvalidRangeError;

    use super::*;

    fn pool() -> TagPool {
        TagPool::new(InterfaceId::new("00:00:00:00:00:00:00:01", 1))
    }

    #[test]
    fn default_pool_is_vlan() {
        let pool = pool();
        assert_eq!(pool.available_tags(TagType::Vlan).unwrap(), RangeList::range(1, 4094).unwrap());
        assert_eq!(
            pool.special_tags(TagType::Vlan).unwrap().available,
            BTreeSet::from([SpecialTag::Untagged, SpecialTag::Any])
        );
        assert!(!pool.is_tag_type_supported(TagType::Mpls));
    }

    #[test]
    fn notifies_after_successful_mutations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pool = pool().with_notifier(move |change: &TagChange| {
            assert!(matches!(change, TagChange::Interface { tag_type: TagType::Vlan, .. }));
            counter.fetch_add(1, Ordering::Relaxed);
        });

        pool.allocate(TagType::Vlan, 10).unwrap();
        pool.release(TagType::Vlan, 10).unwrap();
        assert!(pool.allocate(TagType::Vlan, (4094, 4095)).is_err());
        pool.next_available(TagType::Vlan, false, None).unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn empty_request_is_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let pool = pool().with_notifier(move |_: &TagChange| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        let empty = Tags::RangeList(RangeList::empty());
        let expected = Err(TagError::InvalidRanges(InvalidRangeError::Empty));
        assert_eq!(pool.allocate(TagType::Vlan, empty.clone()), expected);
        assert_eq!(pool.release(TagType::Vlan, empty).map(|_| ()), expected);

        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert_eq!(pool.stats().allocations(), 0);
        assert_eq!(pool.stats().releases(), 0);
    }

    #[test]
    fn notifier_may_call_back_into_the_pool() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let pool = Arc::new_cyclic(|this: &std::sync::Weak<TagPool>| {
            let this = this.clone();
            TagPool::new(InterfaceId::new("s1", 1)).with_notifier(move |_: &TagChange| {
                if let Some(pool) = this.upgrade() {
                    sink.lock().push(pool.available_tags(TagType::Vlan).unwrap().count());
                }
            })
        });

        pool.allocate(TagType::Vlan, (1, 10)).unwrap();
        assert_eq!(seen.lock().as_slice(), &[4084]);
    }

    #[test]
    fn stats_track_operations() {
        let _ = tracing_subscriber::fmt::try_init();

        let pool = TagPool::with_options(
            InterfaceId::new("s1", 1),
            PoolOptions::empty().ranges(TagType::Vlan, RangeList::range(1, 2).unwrap()),
        );

        pool.allocate(TagType::Vlan, 1).unwrap();
        assert_eq!(pool.next_available(TagType::Vlan, false, None).unwrap(), 2);
        assert!(pool.next_available(TagType::Vlan, false, None).is_err());

        pool.release(TagType::Vlan, (1, 2)).unwrap();
        let already_free = pool.release(TagType::Vlan, 1).unwrap();
        assert_eq!(already_free, TagSet::Ranges(RangeList::single(1).unwrap()));

        let stats = pool.stats();
        assert_eq!(stats.allocations(), 2);
        assert_eq!(stats.exhausted(), 1);
        assert_eq!(stats.releases(), 2);
        assert_eq!(stats.double_releases(), 1);
        assert!(pool.all_tags_available());
    }

    #[test]
    fn restore_notifies_every_tag_type() {
        let source = pool();
        source.set_default_ranges(TagType::Mpls, RangeList::range(16, 100).unwrap(), false).unwrap();
        source.allocate(TagType::Mpls, 16).unwrap();

        let notified = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notified);
        let target = TagPool::with_options(InterfaceId::new("s2", 1), PoolOptions::empty())
            .with_notifier(move |change: &TagChange| {
                if let TagChange::Interface { tag_type, .. } = change {
                    sink.lock().push(*tag_type);
                }
            });

        target.restore(source.snapshot()).unwrap();
        assert_eq!(notified.lock().as_slice(), &[TagType::Vlan, TagType::Mpls]);
        assert_eq!(target.used_tags(TagType::Mpls).unwrap(), RangeList::single(16).unwrap());
    }
}
