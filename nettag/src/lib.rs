//! Tag allocation for software-defined networks.
//!
//! - [`ranges`]: canonical range lists and their set algebra.
//! - [`lock`]: keyed lock groups with canonical multi-key ordering.
//! - The crate root: per-interface tag pools and atomic link allocation.
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use nettag_lock as lock;
pub use nettag_pool::*;
pub use nettag_ranges as ranges;
