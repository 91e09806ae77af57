//! Per-file registry of interested clients and version-gated fan-out.
//!
//! # Architecture
//!
//! ```text
//! Scanner thread:
//!   EventBus::publish() -> WatchRegistry::enqueue() -> try_send(worker queue[hash(key)])
//!                                                              |
//! Dispatch worker threads (one queue each):
//!   recv() -> snapshot watchers of key -> gate (version, labels) -> callback(client, response)
//! ```
//!
//! Routing by watch key keeps events of one file in FIFO order on a single
//! worker. A callback that blocks stalls only the files sharing its worker.
//! A full queue drops the event; affected clients fall back to their
//! long-poll timeout and catch up through the quick check when they re-poll.

mod registry;

pub use registry::*;
