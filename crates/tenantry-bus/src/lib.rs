//! # Tenantry Bus
//!
//! Forwards committed facts to in-process subscribers.
//!
//! The bridge is installed on the fact store as its publisher. After an
//! append commits, every fact whose type passes the filter (by default only
//! `organization.bootstrap.initiated`) is broadcast as a [`Notification`].
//! Delivery is best-effort and at most once per subscription. Nothing is
//! buffered while no one is subscribed, and a subscriber that falls behind
//! the channel capacity loses the oldest messages. Loss is reported as
//! [`RecvError::Lagged`] so the consumer can rescan the store; notifications
//! are a wake-up signal, not a durable queue.

pub mod error;
pub mod filter;
pub mod notification;

pub use error::RecvError;
pub use filter::FactFilter;
pub use notification::{Notification, NotificationBridge, Subscription};
