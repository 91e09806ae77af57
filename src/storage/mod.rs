//! Narrow interfaces to the persistent release store and its read-through cache.
//!
//! The store itself (CRUD of files, groups, releases, transactions) lives
//! outside this crate. The pipeline only needs:
//! - [`ReleaseStore`]: scan releases by modify time, read the active release of a file
//! - [`ReleaseCache`]: cached versions for change detection and quick checks
//!
//! [`MemReleaseStore`] is an in-memory adaptor used by tests and embedders.

mod adaptors;
mod release_cache;
mod release_store;

pub use adaptors::*;
pub use release_cache::*;
pub use release_store::*;
