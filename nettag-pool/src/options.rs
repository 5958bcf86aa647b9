use std::collections::{BTreeMap, BTreeSet};

use nettag_ranges::RangeList;

use crate::{SpecialTag, TagType};

/// The highest VLAN id handed out by default. 4095 is reserved.
const DEFAULT_VLAN_MAX: u16 = 4094;

/// The tag types a pool supports and the physical ceiling of each, used to build a fresh
/// pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Default integer ranges per tag type.
    pub(crate) ranges: BTreeMap<TagType, RangeList>,
    /// Default special tags per tag type.
    pub(crate) special: BTreeMap<TagType, BTreeSet<SpecialTag>>,
}

impl Default for PoolOptions {
    /// VLAN only: `[[1, 4094]]` and the special tags `untagged` and `any`.
    fn default() -> Self {
        Self::empty()
            .ranges(
                TagType::Vlan,
                RangeList::range(1, DEFAULT_VLAN_MAX).expect("default VLAN range is valid"),
            )
            .special_tags(TagType::Vlan, [SpecialTag::Untagged, SpecialTag::Any])
    }
}

impl PoolOptions {
    /// Options without any tag type.
    pub fn empty() -> Self {
        Self { ranges: BTreeMap::new(), special: BTreeMap::new() }
    }

    /// Sets the default integer ranges for a tag type. An empty list removes the tag type.
    pub fn ranges(mut self, tag_type: TagType, ranges: RangeList) -> Self {
        if ranges.is_empty() {
            self.ranges.remove(&tag_type);
        } else {
            self.ranges.insert(tag_type, ranges);
        }
        self
    }

    /// Sets the default special tags for a tag type. No tags removes them.
    pub fn special_tags(
        mut self,
        tag_type: TagType,
        tags: impl IntoIterator<Item = SpecialTag>,
    ) -> Self {
        let tags: BTreeSet<_> = tags.into_iter().collect();
        if tags.is_empty() {
            self.special.remove(&tag_type);
        } else {
            self.special.insert(tag_type, tags);
        }
        self
    }

    /// Removes a tag type entirely.
    pub fn without(mut self, tag_type: TagType) -> Self {
        self.ranges.remove(&tag_type);
        self.special.remove(&tag_type);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_vlan_only() {
        let options = PoolOptions::default();
        assert_eq!(options.ranges.len(), 1);
        assert_eq!(options.ranges[&TagType::Vlan], RangeList::range(1, 4094).unwrap());
        assert_eq!(
            options.special[&TagType::Vlan],
            BTreeSet::from([SpecialTag::Untagged, SpecialTag::Any])
        );
    }

    #[test]
    fn builder_adds_and_removes() {
        let options = PoolOptions::default()
            .ranges(TagType::Mpls, RangeList::range(16, 4095).unwrap())
            .without(TagType::Vlan);

        assert!(!options.ranges.contains_key(&TagType::Vlan));
        assert!(!options.special.contains_key(&TagType::Vlan));
        assert!(options.ranges.contains_key(&TagType::Mpls));

        let options = options.ranges(TagType::Mpls, RangeList::empty());
        assert!(options.ranges.is_empty());
    }
}
