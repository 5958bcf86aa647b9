use std::collections::{BTreeMap, BTreeSet};

use nettag_ranges::{addition, contains, difference, is_subset, RangeList, TagRange};
use rustc_hash::FxHashMap;

use crate::{
    select::pick,
    tag::{Request, TagSet},
    PoolOptions, SpecialTag, TagError, TagType, Tags,
};

/// The integer tags of one tag type.
///
/// `available ⊆ current ⊆ default` holds for every triple held by a [`TagState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRanges {
    /// The physical ceiling: every tag the hardware supports.
    pub default: RangeList,
    /// The tags administratively enabled for use.
    pub current: RangeList,
    /// The enabled tags that are not allocated.
    pub available: RangeList,
}

impl TagRanges {
    /// A triple where every default tag is enabled and free.
    pub fn unused(ranges: RangeList) -> Self {
        Self { default: ranges.clone(), current: ranges.clone(), available: ranges }
    }

    fn check(&self, tag_type: TagType) -> Result<(), TagError> {
        if self.default.is_empty() {
            return Err(TagError::Inconsistent { tag_type, reason: "default tags are empty" });
        }
        if !is_subset(&self.current, &self.default) {
            return Err(TagError::Inconsistent {
                tag_type,
                reason: "current tags are not within default tags",
            });
        }
        if !is_subset(&self.available, &self.current) {
            return Err(TagError::Inconsistent {
                tag_type,
                reason: "available tags are not within current tags",
            });
        }
        Ok(())
    }
}

/// The special tags of one tag type, with the same containment as [`TagRanges`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialTags {
    /// Every special tag the interface supports.
    pub default: BTreeSet<SpecialTag>,
    /// The special tags enabled for use.
    pub current: BTreeSet<SpecialTag>,
    /// The enabled special tags that are not allocated.
    pub available: BTreeSet<SpecialTag>,
}

impl SpecialTags {
    /// A triple where every default tag is enabled and free.
    pub fn unused(tags: BTreeSet<SpecialTag>) -> Self {
        Self { default: tags.clone(), current: tags.clone(), available: tags }
    }

    fn check(&self, tag_type: TagType) -> Result<(), TagError> {
        if !self.current.is_subset(&self.default) {
            return Err(TagError::Inconsistent {
                tag_type,
                reason: "current special tags are not within default special tags",
            });
        }
        if !self.available.is_subset(&self.current) {
            return Err(TagError::Inconsistent {
                tag_type,
                reason: "available special tags are not within current special tags",
            });
        }
        Ok(())
    }
}

/// Every tag triple of an entity, for export to and import from an outer persistence layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSnapshot {
    /// The integer tag triples, by tag type.
    pub ranges: BTreeMap<TagType, TagRanges>,
    /// The special tag triples, by tag type.
    pub special: BTreeMap<TagType, SpecialTags>,
}

/// A change computed against a [`TagState`] that has not been applied yet.
///
/// Link operations prepare the change on both endpoints before committing either, so that
/// a failure on the second endpoint leaves the first one untouched.
#[derive(Debug)]
pub(crate) enum Commit {
    Ranges { tag_type: TagType, available: RangeList },
    Special { tag_type: TagType, available: BTreeSet<SpecialTag> },
}

/// The tag bookkeeping of one entity.
///
/// All operations are plain `&mut self` methods. [`TagPool`](crate::TagPool) wraps a state in
/// a mutex, and [`LinkAllocator::with_link`](crate::LinkAllocator::with_link) hands out
/// both endpoint states of a link at once.
#[derive(Debug, Clone)]
pub struct TagState {
    entity: String,
    ranges: FxHashMap<TagType, TagRanges>,
    special: FxHashMap<TagType, SpecialTags>,
}

impl TagState {
    /// Creates the state of `entity` with every configured tag enabled and free.
    pub fn new(entity: impl Into<String>, options: &PoolOptions) -> Self {
        Self {
            entity: entity.into(),
            ranges: options
                .ranges
                .iter()
                .map(|(&tag_type, ranges)| (tag_type, TagRanges::unused(ranges.clone())))
                .collect(),
            special: options
                .special
                .iter()
                .map(|(&tag_type, tags)| (tag_type, SpecialTags::unused(tags.clone())))
                .collect(),
        }
    }

    /// The name used for this entity in errors.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns `true` if the entity has integer tags of this type.
    pub fn is_tag_type_supported(&self, tag_type: TagType) -> bool {
        self.ranges.contains_key(&tag_type)
    }

    /// The integer tag triple of `tag_type`.
    pub fn tag_ranges(&self, tag_type: TagType) -> Result<&TagRanges, TagError> {
        self.ranges.get(&tag_type).ok_or(TagError::TagTypeNotSupported(tag_type))
    }

    /// The special tag triple of `tag_type`.
    pub fn special_tags(&self, tag_type: TagType) -> Result<&SpecialTags, TagError> {
        self.special.get(&tag_type).ok_or(TagError::TagTypeNotSupported(tag_type))
    }

    /// The integer tags that can be allocated.
    pub fn available_tags(&self, tag_type: TagType) -> Result<&RangeList, TagError> {
        Ok(&self.tag_ranges(tag_type)?.available)
    }

    /// Tags enabled and currently allocated: `current \ available`.
    pub fn used_tags(&self, tag_type: TagType) -> Result<RangeList, TagError> {
        let ranges = self.tag_ranges(tag_type)?;
        Ok(difference(&ranges.current, &ranges.available))
    }

    /// Tags supported but administratively disabled: `default \ current`.
    pub fn inactive_tags(&self, tag_type: TagType) -> Result<RangeList, TagError> {
        let ranges = self.tag_ranges(tag_type)?;
        Ok(difference(&ranges.default, &ranges.current))
    }

    /// Special tags enabled and currently allocated.
    pub fn used_special_tags(&self, tag_type: TagType) -> Result<BTreeSet<SpecialTag>, TagError> {
        let tags = self.special_tags(tag_type)?;
        Ok(tags.current.difference(&tags.available).copied().collect())
    }

    /// Special tags supported but administratively disabled.
    pub fn inactive_special_tags(
        &self,
        tag_type: TagType,
    ) -> Result<BTreeSet<SpecialTag>, TagError> {
        let tags = self.special_tags(tag_type)?;
        Ok(tags.default.difference(&tags.current).copied().collect())
    }

    /// Returns `true` if `tag` can be allocated. Unsupported tag types have no tag available.
    pub fn is_tag_available(&self, tag_type: TagType, tag: u16) -> bool {
        self.ranges.get(&tag_type).is_some_and(|ranges| contains(&ranges.available, tag))
    }

    /// Returns `true` if no tag of any type, integer or special, is allocated.
    pub fn all_tags_available(&self) -> bool {
        self.ranges.values().all(|ranges| ranges.available == ranges.current) &&
            self.special.values().all(|tags| tags.available == tags.current)
    }

    /// Marks `tags` as allocated.
    ///
    /// Fails with [`TagError::TagsUnavailable`], holding the tags that are not free, if any
    /// requested tag is not available.
    pub fn allocate(&mut self, tag_type: TagType, tags: &Tags) -> Result<(), TagError> {
        let commit = self.prepare_allocate(tag_type, tags)?;
        self.commit(commit);
        Ok(())
    }

    /// Marks `tags` as free again and returns the requested tags that were already free.
    ///
    /// Fails with [`TagError::TagsNotInRange`] if any requested tag is not enabled.
    pub fn release(&mut self, tag_type: TagType, tags: &Tags) -> Result<TagSet, TagError> {
        let (commit, already_free) = self.prepare_release(tag_type, tags)?;
        self.commit(commit);
        Ok(already_free)
    }

    /// Allocates and returns the lowest available tag, or the highest with `take_highest`.
    ///
    /// A boundary equal to `avoid` is passed over in favour of its neighbour. `avoid`
    /// itself is only returned when it is the last free tag.
    pub fn next_available(
        &mut self,
        tag_type: TagType,
        take_highest: bool,
        avoid: Option<u16>,
    ) -> Result<u16, TagError> {
        let ranges =
            self.ranges.get_mut(&tag_type).ok_or(TagError::TagTypeNotSupported(tag_type))?;
        let Some(tag) = pick(&ranges.available, take_highest, avoid) else {
            return Err(TagError::NoTagAvailable { entity: self.entity.clone(), tag_type });
        };

        ranges.available = difference(&ranges.available, &[TagRange::single(tag)]);
        Ok(tag)
    }

    /// Replaces the enabled tags, keeping allocated tags allocated.
    ///
    /// `ranges` must lie within the default ranges unless `validate_against_default` is
    /// unset. Allocated tags outside `ranges` fail the call unless `ignore_in_use` is set,
    /// in which case they are dropped.
    ///
    /// Without `validate_against_default`, the caller is responsible for keeping `current`
    /// within `default`. Tags enabled beyond the default break `current ⊆ default`, and a
    /// [`snapshot`](Self::snapshot) taken in that state is refused by
    /// [`restore`](Self::restore) until the default is widened.
    pub fn set_current_ranges(
        &mut self,
        tag_type: TagType,
        ranges: RangeList,
        ignore_in_use: bool,
        validate_against_default: bool,
    ) -> Result<(), TagError> {
        let entry =
            self.ranges.get_mut(&tag_type).ok_or(TagError::TagTypeNotSupported(tag_type))?;

        if validate_against_default {
            let invalid = difference(&ranges, &entry.default);
            if !invalid.is_empty() {
                return Err(TagError::NotSupported(TagSet::Ranges(invalid)));
            }
        }

        let used = difference(&entry.current, &entry.available);
        if !ignore_in_use {
            let missing = difference(&used, &ranges);
            if !missing.is_empty() {
                return Err(TagError::SetRange { missing: TagSet::Ranges(missing) });
            }
        }

        entry.available = difference(&ranges, &used);
        entry.current = ranges;
        Ok(())
    }

    /// Replaces the default ranges.
    ///
    /// Disabled tags stay disabled, and the enabled tags shrink with the new default. An
    /// empty `ranges` removes the tag type, and a non-empty one for an unsupported tag type
    /// adds it.
    pub fn set_default_ranges(
        &mut self,
        tag_type: TagType,
        ranges: RangeList,
        ignore_in_use: bool,
    ) -> Result<(), TagError> {
        let Some(entry) = self.ranges.get(&tag_type) else {
            if !ranges.is_empty() {
                self.ranges.insert(tag_type, TagRanges::unused(ranges));
            }
            return Ok(());
        };

        let inactive = difference(&entry.default, &entry.current);
        let current = difference(&ranges, &inactive);
        self.set_current_ranges(tag_type, current, ignore_in_use, false)?;

        if ranges.is_empty() {
            self.ranges.remove(&tag_type);
        } else if let Some(entry) = self.ranges.get_mut(&tag_type) {
            entry.default = ranges;
        }
        Ok(())
    }

    /// Enables every default tag, dropping allocations outside of the current ranges.
    pub fn reset_current_ranges(&mut self, tag_type: TagType) -> Result<(), TagError> {
        let default = self.tag_ranges(tag_type)?.default.clone();
        self.set_current_ranges(tag_type, default, true, true)
    }

    /// Disables every tag, dropping all allocations.
    pub fn remove_current_ranges(&mut self, tag_type: TagType) -> Result<(), TagError> {
        self.set_current_ranges(tag_type, RangeList::empty(), true, true)
    }

    /// Replaces the enabled special tags. Same rules as
    /// [`set_current_ranges`](Self::set_current_ranges), including the caveat on
    /// `validate_against_default`, and duplicates are rejected.
    pub fn set_special_tags(
        &mut self,
        tag_type: TagType,
        tags: &[SpecialTag],
        ignore_in_use: bool,
        validate_against_default: bool,
    ) -> Result<(), TagError> {
        let incoming = unique(tags)?;
        let entry =
            self.special.get_mut(&tag_type).ok_or(TagError::TagTypeNotSupported(tag_type))?;

        if validate_against_default {
            let invalid: BTreeSet<_> = incoming.difference(&entry.default).copied().collect();
            if !invalid.is_empty() {
                return Err(TagError::NotSupported(TagSet::Special(invalid)));
            }
        }

        let used: BTreeSet<_> = entry.current.difference(&entry.available).copied().collect();
        if !ignore_in_use {
            let missing: BTreeSet<_> = used.difference(&incoming).copied().collect();
            if !missing.is_empty() {
                return Err(TagError::SetRange { missing: TagSet::Special(missing) });
            }
        }

        entry.available = incoming.difference(&used).copied().collect();
        entry.current = incoming;
        Ok(())
    }

    /// Replaces the default special tags, following the rules of
    /// [`set_default_ranges`](Self::set_default_ranges).
    pub fn set_default_special_tags(
        &mut self,
        tag_type: TagType,
        tags: &[SpecialTag],
        ignore_in_use: bool,
    ) -> Result<(), TagError> {
        let incoming = unique(tags)?;
        let Some(entry) = self.special.get(&tag_type) else {
            if !incoming.is_empty() {
                self.special.insert(tag_type, SpecialTags::unused(incoming));
            }
            return Ok(());
        };

        let current: Vec<_> = incoming
            .iter()
            .filter(|tag| entry.current.contains(tag) || !entry.default.contains(tag))
            .copied()
            .collect();
        self.set_special_tags(tag_type, &current, ignore_in_use, false)?;

        if incoming.is_empty() {
            self.special.remove(&tag_type);
        } else if let Some(entry) = self.special.get_mut(&tag_type) {
            entry.default = incoming;
        }
        Ok(())
    }

    /// Enables every default special tag, dropping allocations.
    pub fn reset_special_tags(&mut self, tag_type: TagType) -> Result<(), TagError> {
        let default: Vec<_> = self.special_tags(tag_type)?.default.iter().copied().collect();
        self.set_special_tags(tag_type, &default, true, true)
    }

    /// Disables every special tag, dropping allocations.
    pub fn remove_special_tags(&mut self, tag_type: TagType) -> Result<(), TagError> {
        self.set_special_tags(tag_type, &[], true, true)
    }

    /// Exports every tag triple.
    pub fn snapshot(&self) -> TagSnapshot {
        TagSnapshot {
            ranges: self.ranges.iter().map(|(&t, ranges)| (t, ranges.clone())).collect(),
            special: self.special.iter().map(|(&t, tags)| (t, tags.clone())).collect(),
        }
    }

    /// Replaces every tag triple with the ones in `snapshot`.
    ///
    /// Nothing is replaced if any triple breaks `available ⊆ current ⊆ default`.
    pub fn restore(&mut self, snapshot: TagSnapshot) -> Result<(), TagError> {
        for (&tag_type, ranges) in &snapshot.ranges {
            ranges.check(tag_type)?;
        }
        for (&tag_type, tags) in &snapshot.special {
            tags.check(tag_type)?;
        }

        self.ranges = snapshot.ranges.into_iter().collect();
        self.special = snapshot.special.into_iter().collect();
        Ok(())
    }

    pub(crate) fn prepare_allocate(
        &self,
        tag_type: TagType,
        tags: &Tags,
    ) -> Result<Commit, TagError> {
        match tags.resolve()? {
            Request::Ranges(requested) => {
                let ranges = self.tag_ranges(tag_type)?;
                let unavailable = difference(&requested, &ranges.available);
                if !unavailable.is_empty() {
                    return Err(TagError::TagsUnavailable {
                        entity: self.entity.clone(),
                        tags: TagSet::Ranges(unavailable),
                    });
                }

                Ok(Commit::Ranges {
                    tag_type,
                    available: difference(&ranges.available, &requested),
                })
            }
            Request::Special(tag) => {
                let special = self.special_tags(tag_type)?;
                if !special.available.contains(&tag) {
                    return Err(TagError::TagsUnavailable {
                        entity: self.entity.clone(),
                        tags: TagSet::special(tag),
                    });
                }

                let mut available = special.available.clone();
                available.remove(&tag);
                Ok(Commit::Special { tag_type, available })
            }
        }
    }

    pub(crate) fn prepare_release(
        &self,
        tag_type: TagType,
        tags: &Tags,
    ) -> Result<(Commit, TagSet), TagError> {
        match tags.resolve()? {
            Request::Ranges(requested) => {
                let ranges = self.tag_ranges(tag_type)?;
                let outside = difference(&requested, &ranges.current);
                if !outside.is_empty() {
                    return Err(TagError::TagsNotInRange {
                        entity: self.entity.clone(),
                        tags: TagSet::Ranges(outside),
                    });
                }

                let (available, already_free) = addition(&ranges.available, &requested);
                Ok((Commit::Ranges { tag_type, available }, TagSet::Ranges(already_free)))
            }
            Request::Special(tag) => {
                let special = self.special_tags(tag_type)?;
                if !special.current.contains(&tag) {
                    return Err(TagError::TagsNotInRange {
                        entity: self.entity.clone(),
                        tags: TagSet::special(tag),
                    });
                }

                let mut available = special.available.clone();
                let already_free = if available.insert(tag) {
                    BTreeSet::new()
                } else {
                    BTreeSet::from([tag])
                };
                Ok((Commit::Special { tag_type, available }, TagSet::Special(already_free)))
            }
        }
    }

    pub(crate) fn commit(&mut self, commit: Commit) {
        match commit {
            Commit::Ranges { tag_type, available } => {
                if let Some(ranges) = self.ranges.get_mut(&tag_type) {
                    ranges.available = available;
                }
            }
            Commit::Special { tag_type, available } => {
                if let Some(tags) = self.special.get_mut(&tag_type) {
                    tags.available = available;
                }
            }
        }
    }
}

fn unique(tags: &[SpecialTag]) -> Result<BTreeSet<SpecialTag>, TagError> {
    let set: BTreeSet<_> = tags.iter().copied().collect();
    if set.len() < tags.len() {
        return Err(TagError::DuplicateSpecialTags);
    }
    Ok(set)
}
