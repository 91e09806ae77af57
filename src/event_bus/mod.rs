//! Minimal in-process typed publish/subscribe.
//!
//! The scanner publishes [`ConfigFileReleased`] here without knowing who
//! listens; the watch registry subscribes and forwards into its dispatch
//! queues.
//!
//! # Delivery contract
//!
//! - [`EventBus::publish`] runs every handler registered for the event's type
//!   synchronously on the caller's thread, in registration order.
//! - A panicking handler is caught, logged and counted; the remaining handlers
//!   still run and the publisher never observes the panic.
//! - No ordering across event types.

mod event_bus;
mod events;

pub use event_bus::*;
pub use events::*;
