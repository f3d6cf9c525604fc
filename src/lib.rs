//! # Herald
//!
//! A typed, in-process publish/subscribe event bus.
//!
//! ## Core Concepts
//!
//! - **Events**: Any `Send + Sync + 'static` value, dispatched on its exact type
//! - **Subscriptions**: A callback (optionally filtered) or an [`EventHandler`]
//!   object, held strongly or weakly
//! - **Tokens**: The removal capability for one subscription
//! - **Transactions**: Buffer events and publish or discard them together
//!
//! Publishing is synchronous: every matching subscriber runs on the calling
//! thread, in registration order, before `publish` returns. A weakly held
//! subscriber that has been dropped is detected at dispatch time and its
//! subscription removed.
//!
//! ## Example
//!
//! ```ignore
//! use herald::{callback, filter, EventBus, Ref};
//!
//! struct Ping { value: u32 }
//!
//! let bus = EventBus::new();
//!
//! let on_ping = callback(|ping: &Ping| {
//!     println!("ping {}", ping.value);
//!     Ok(())
//! });
//! let large = filter(|ping: &Ping| ping.value > 10);
//!
//! // Weak: the bus does not keep `on_ping` alive
//! let token = bus.subscribe_filtered(Ref::weak(&on_ping), Ref::strong(large))?;
//!
//! bus.publish(&Ping { value: 15 })?;
//! token.release();
//! ```

pub mod bus;
pub mod error;
pub mod subscriptions;
pub mod token;
pub mod transaction;
pub mod types;

// Re-exports
pub use bus::{EventBus, EventBusConfig, PublishReport};
pub use error::{BusError, Result};
pub use subscriptions::{SubscriptionKind, SubscriptionState};
pub use token::{TokenId, UnsubscribeToken};
pub use transaction::EventTransaction;
pub use types::{
    callback, filter, Event, EventHandler, EventType, HandlerError, HandlerResult, Ref,
};
