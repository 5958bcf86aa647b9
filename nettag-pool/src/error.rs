use nettag_ranges::InvalidRangeError;
use thiserror::Error;

use crate::{InterfaceId, TagSet, TagType};

/// Errors returned by tag pool and link operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    /// The requested ranges are not a non-empty canonical range list.
    #[error("Invalid tag ranges: {0}")]
    InvalidRanges(#[from] InvalidRangeError),
    /// The tags lie outside the default tags of the tag type.
    #[error("The tags {0} are not supported")]
    NotSupported(TagSet),
    /// A special tag was given more than once.
    #[error("There are duplicated values in the special tags")]
    DuplicateSpecialTags,
    /// The entity has no tags of this type.
    #[error("Tag type {0} is not supported")]
    TagTypeNotSupported(TagType),
    /// A tag type name that does not parse.
    #[error("Unknown tag type: {0}")]
    UnknownTagType(String),
    /// A special tag name that does not parse.
    #[error("Unknown special tag: {0}")]
    UnknownSpecialTag(String),
    /// Some requested tags are already allocated or disabled.
    #[error("The tags {tags} are not available in {entity}")]
    TagsUnavailable {
        /// The interface or link the request was made on.
        entity: String,
        /// The requested tags that are not available.
        tags: TagSet,
    },
    /// Some released tags are not enabled.
    #[error("The tags {tags} are outside tag ranges in {entity}")]
    TagsNotInRange {
        /// The interface or link the request was made on.
        entity: String,
        /// The released tags outside the current tags.
        tags: TagSet,
    },
    /// Every tag of the type is allocated or disabled.
    #[error("{entity} has no {tag_type} tag available")]
    NoTagAvailable {
        /// The interface or link the request was made on.
        entity: String,
        /// The exhausted tag type.
        tag_type: TagType,
    },
    /// New current tags would leave allocated tags behind.
    #[error("Missing tags in tag range: {missing}")]
    SetRange {
        /// Allocated tags missing from the new current tags.
        missing: TagSet,
    },
    /// A restored triple breaks `available ⊆ current ⊆ default`.
    #[error("Inconsistent {tag_type} tags: {reason}")]
    Inconsistent {
        /// The tag type of the offending triple.
        tag_type: TagType,
        /// Which containment is broken.
        reason: &'static str,
    },
}

/// Errors returned when building a [`Link`](crate::Link).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Both endpoints are the same interface.
    #[error("Link endpoints must be different interfaces, got {0} twice")]
    SameEndpoint(InterfaceId),
}
