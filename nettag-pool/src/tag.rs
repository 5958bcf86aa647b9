use std::{collections::BTreeSet, fmt, str::FromStr};

use nettag_ranges::{InvalidRangeError, RangeList};

use crate::TagError;

/// A tag namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagType {
    /// 802.1Q VLAN ids.
    Vlan,
    /// 802.1ad outer VLAN ids.
    VlanQinq,
    /// MPLS labels.
    Mpls,
}

impl TagType {
    /// The name used in configuration and errors.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Vlan => "vlan",
            Self::VlanQinq => "vlan_qinq",
            Self::Mpls => "mpls",
        }
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagType {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vlan" => Ok(Self::Vlan),
            "vlan_qinq" => Ok(Self::VlanQinq),
            "mpls" => Ok(Self::Mpls),
            _ => Err(TagError::UnknownTagType(s.to_owned())),
        }
    }
}

/// A symbolic tag outside the integer namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpecialTag {
    /// Traffic without a tag.
    Untagged,
    /// Traffic with any tag.
    Any,
}

impl SpecialTag {
    /// The name used in configuration and errors.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Untagged => "untagged",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for SpecialTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecialTag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "untagged" => Ok(Self::Untagged),
            "any" => Ok(Self::Any),
            _ => Err(TagError::UnknownSpecialTag(s.to_owned())),
        }
    }
}

/// The tags named by an allocate or release request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tags {
    /// A single tag.
    Single(u16),
    /// An inclusive range, `start..=end`.
    Range(u16, u16),
    /// A canonical range list. Must not be empty.
    RangeList(RangeList),
    /// A special tag.
    Special(SpecialTag),
}

/// A request with its shape resolved.
pub(crate) enum Request {
    Ranges(RangeList),
    Special(SpecialTag),
}

impl Tags {
    /// Validates the request and normalizes integer shapes into a range list.
    pub(crate) fn resolve(&self) -> Result<Request, InvalidRangeError> {
        Ok(match self {
            Self::Single(tag) => Request::Ranges(RangeList::single(*tag)?),
            Self::Range(start, end) => Request::Ranges(RangeList::range(*start, *end)?),
            Self::RangeList(ranges) if ranges.is_empty() => return Err(InvalidRangeError::Empty),
            Self::RangeList(ranges) => Request::Ranges(ranges.clone()),
            Self::Special(tag) => Request::Special(*tag),
        })
    }
}

impl From<u16> for Tags {
    fn from(tag: u16) -> Self {
        Self::Single(tag)
    }
}

impl From<(u16, u16)> for Tags {
    fn from((start, end): (u16, u16)) -> Self {
        Self::Range(start, end)
    }
}

impl From<RangeList> for Tags {
    fn from(ranges: RangeList) -> Self {
        Self::RangeList(ranges)
    }
}

impl From<SpecialTag> for Tags {
    fn from(tag: SpecialTag) -> Self {
        Self::Special(tag)
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(tag) => write!(f, "{tag}"),
            Self::Range(start, end) => write!(f, "[{start}, {end}]"),
            Self::RangeList(ranges) => write!(f, "{ranges}"),
            Self::Special(tag) => write!(f, "{tag}"),
        }
    }
}

/// A set of tags reported back by an operation, either integer ranges or special tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSet {
    /// Integer tags.
    Ranges(RangeList),
    /// Special tags.
    Special(BTreeSet<SpecialTag>),
}

impl TagSet {
    /// Returns `true` if the set holds no tag.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Ranges(ranges) => ranges.is_empty(),
            Self::Special(tags) => tags.is_empty(),
        }
    }

    pub(crate) fn special(tag: SpecialTag) -> Self {
        Self::Special(BTreeSet::from([tag]))
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ranges(ranges) => write!(f, "{ranges}"),
            Self::Special(tags) => {
                let tags: Vec<_> = tags.iter().map(SpecialTag::as_str).collect();
                write!(f, "[{}]", tags.join(", "))
            }
        }
    }
}
