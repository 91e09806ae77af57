//! Non-blocking resolution of watch and fetch requests against the
//! read-through cache.

mod watch_context;

pub use watch_context::*;
