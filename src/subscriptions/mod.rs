//! Subscriptions: what the bus stores for each registration.
//!
//! Two variants share one type-erased interface:
//! - Action subscriptions wrap a callback plus an optional filter predicate
//! - Handler subscriptions wrap an [`EventHandler`](crate::EventHandler)
//!
//! Either kind may hold its target strongly or weakly. Weak targets are
//! resolved at the point of use on every dispatch; a dead target reports
//! itself as lost and the bus removes the subscription.
//!
//! The table holding them is copy-on-write so that publishing never blocks
//! on, or observes half of, a concurrent registration.

mod manager;
mod types;

pub(crate) use manager::SubscriptionTable;
pub(crate) use types::{
    erase_callback, erase_filter, erase_handler, ActionSubscription, Delivery,
    HandlerSubscription, Subscription,
};
pub use types::{SubscriptionKind, SubscriptionState};
