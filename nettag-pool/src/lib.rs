//! Per-interface tag pools and atomic tag allocation across links.
//!
//! A [`TagPool`] tracks, for every supported [`TagType`], three range lists: the default
//! (physical) tags, the current (enabled) tags and the available (free) tags. A
//! [`LinkAllocator`] allocates the same tag on both endpoint pools of a [`Link`] at once.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use nettag_pool::{InterfaceId, Link, LinkAllocator, TagPool, TagType};
//!
//! let a = Arc::new(TagPool::new(InterfaceId::new("s1", 1)));
//! let b = Arc::new(TagPool::new(InterfaceId::new("s2", 1)));
//! let link = Link::new(a, b).unwrap();
//!
//! let allocator = LinkAllocator::new();
//! let tag = allocator.next_available_tag(&link, TagType::Vlan, false, None).unwrap();
//! assert_eq!(tag, 1);
//! assert!(!link.endpoint_a().is_tag_available(TagType::Vlan, 1));
//! ```
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod error;
mod id;
mod link;
mod notify;
mod options;
mod pool;
mod select;
mod state;
mod stats;
mod tag;

pub use error::{LinkError, TagError};
pub use id::{InterfaceId, LinkId};
pub use link::{Link, LinkAllocator};
pub use notify::{NoopNotifier, TagChange, TagNotifier};
pub use options::PoolOptions;
pub use pool::TagPool;
pub use state::{SpecialTags, TagRanges, TagSnapshot, TagState};
pub use stats::PoolStats;
pub use tag::{SpecialTag, TagSet, TagType, Tags};
