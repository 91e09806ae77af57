//! Domain types shared by every stage of the notification pipeline.
//!
//! - [`Release`]: a published (or tombstoned) state of one configuration file
//! - [`ResourceKey`] / [`WatchKey`]: the file identity and its normalized fan-out index
//! - [`WatchRequest`] / [`WatchResponse`]: what the RPC layer hands in and gets back

mod release;
mod request;
mod response;

pub use release::*;
pub use request::*;
pub use response::*;
