//! Lifecycle coordination core for the rental marketplace backend.
//!
//! Bookings, payments, property visits and subscriptions move through small state machines
//! whose side effects span several records. The [`lifecycle`] module owns those transitions;
//! the store and the notification channel are injected so deployments and tests can swap
//! them freely.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod telemetry;
