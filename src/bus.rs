//! The event bus: registration, dispatch, and removal.

use crate::error::{BusError, Result};
use crate::subscriptions::{
    erase_callback, erase_filter, erase_handler, ActionSubscription, Delivery,
    HandlerSubscription, Subscription, SubscriptionKind, SubscriptionState, SubscriptionTable,
};
use crate::token::{TokenId, UnsubscribeToken};
use crate::types::{Event, EventHandler, EventType, HandlerResult, Ref};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Bus configuration.
#[derive(Clone, Debug)]
pub struct EventBusConfig {
    /// Name attached to every log record from this bus.
    /// Default: "default"
    pub name: String,

    /// Pre-allocated subscription slots.
    /// Default: 16
    pub initial_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            initial_capacity: 16,
        }
    }
}

/// Counts from one publish pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscriptions registered for the event's type.
    pub matched: usize,
    /// Callbacks or handlers actually invoked.
    pub delivered: usize,
    /// Skipped by a filter predicate or a handler's `can_handle`.
    pub filtered: usize,
    /// Weak subscriptions found dead and removed.
    pub removed: usize,
}

impl PublishReport {
    pub fn merge(&mut self, other: PublishReport) {
        self.matched += other.matched;
        self.delivered += other.delivered;
        self.filtered += other.filtered;
        self.removed += other.removed;
    }
}

struct BusShared {
    config: EventBusConfig,
    table: SubscriptionTable,
}

impl BusShared {
    /// Remove a subscription by token and disarm that token.
    fn remove(&self, id: TokenId) -> bool {
        match self.table.remove(id) {
            Some(entry) => {
                entry.token().disarm();
                debug!(
                    bus = %self.config.name,
                    token = %id,
                    event = entry.event_type().name(),
                    "subscription removed"
                );
                true
            }
            None => false,
        }
    }
}

/// Typed, synchronous, in-process publish/subscribe bus.
///
/// Cloning is cheap and every clone refers to the same subscription set.
/// Publishing runs every matching subscriber on the calling thread, in
/// registration order, before returning. The first subscriber error stops
/// the pass and is returned to the publisher.
///
/// ```ignore
/// let bus = EventBus::new();
///
/// let on_ping = herald::callback(|ping: &Ping| {
///     println!("ping {}", ping.id);
///     Ok(())
/// });
/// let token = bus.subscribe(Ref::strong(on_ping))?;
///
/// bus.publish(&Ping { id: 1 })?;
/// bus.unsubscribe(&token);
/// ```
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<BusShared>,
}

impl EventBus {
    /// Create a bus with default configuration.
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    pub fn with_config(config: EventBusConfig) -> Self {
        let table = SubscriptionTable::with_capacity(config.initial_capacity);
        Self {
            shared: Arc::new(BusShared { config, table }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    // --- Registration ---

    /// Subscribe a callback to events of type `E`.
    ///
    /// A `Ref::Weak` callback does not keep its target alive; once the target
    /// is dropped the subscription removes itself on the next publish of `E`.
    pub fn subscribe<E, F>(&self, callback: Ref<F>) -> Result<UnsubscribeToken>
    where
        E: Event,
        F: Fn(&E) -> HandlerResult + Send + Sync + 'static,
    {
        ensure_alive::<E, _>(&callback, "callback")?;
        let token = self.new_token();
        let subscription =
            ActionSubscription::<E>::new(token.clone(), erase_callback::<E, F>(callback), None);
        self.insert(Arc::new(subscription));
        Ok(token)
    }

    /// Subscribe a callback that only sees events accepted by `filter`.
    ///
    /// The filter may be held weakly independently of the callback. A weak
    /// filter whose target is dropped stops filtering: from then on every
    /// event of type `E` reaches the callback.
    pub fn subscribe_filtered<E, F, P>(
        &self,
        callback: Ref<F>,
        filter: Ref<P>,
    ) -> Result<UnsubscribeToken>
    where
        E: Event,
        F: Fn(&E) -> HandlerResult + Send + Sync + 'static,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        ensure_alive::<E, _>(&callback, "callback")?;
        ensure_alive::<E, _>(&filter, "filter")?;
        let token = self.new_token();
        let subscription = ActionSubscription::<E>::new(
            token.clone(),
            erase_callback::<E, F>(callback),
            Some(erase_filter::<E, P>(filter)),
        );
        self.insert(Arc::new(subscription));
        Ok(token)
    }

    /// Register an [`EventHandler`] for events of type `E`.
    pub fn register_handler<E, H>(&self, handler: Ref<H>) -> Result<UnsubscribeToken>
    where
        E: Event,
        H: EventHandler<E> + 'static,
    {
        ensure_alive::<E, _>(&handler, "handler")?;
        let token = self.new_token();
        let subscription =
            HandlerSubscription::<E>::new(token.clone(), erase_handler::<E, H>(handler));
        self.insert(Arc::new(subscription));
        Ok(token)
    }

    fn new_token(&self) -> UnsubscribeToken {
        let bus: Weak<BusShared> = Arc::downgrade(&self.shared);
        UnsubscribeToken::new(move |token| {
            if let Some(bus) = bus.upgrade() {
                bus.remove(token.id());
            }
        })
    }

    fn insert(&self, subscription: Arc<dyn Subscription>) {
        debug!(
            bus = %self.shared.config.name,
            token = %subscription.token().id(),
            event = subscription.event_type().name(),
            kind = ?subscription.kind(),
            weak = subscription.is_weak(),
            "subscription added"
        );
        self.shared.table.insert(subscription);
    }

    // --- Removal ---

    /// Remove the subscription owning `token`.
    ///
    /// Returns false if it was already gone or belongs to another bus.
    pub fn unsubscribe(&self, token: &UnsubscribeToken) -> bool {
        self.shared.remove(token.id())
    }

    /// Remove the first action subscription for `E` bound to `callback`.
    ///
    /// Matching is by allocation identity and works for weak subscriptions
    /// as well: a weak reference keeps its allocation from being reused, so
    /// it can only ever match the `Arc` it was created from.
    pub fn unsubscribe_callback<E, F>(&self, callback: &Arc<F>) -> bool
    where
        E: Event,
        F: ?Sized,
    {
        self.remove_by_identity(SubscriptionKind::Action, EventType::of::<E>(), callback)
    }

    /// Remove the first handler subscription for `E` bound to `handler`.
    pub fn unregister_handler<E, H>(&self, handler: &Arc<H>) -> bool
    where
        E: Event,
        H: ?Sized,
    {
        self.remove_by_identity(SubscriptionKind::Handler, EventType::of::<E>(), handler)
    }

    fn remove_by_identity<T: ?Sized>(
        &self,
        kind: SubscriptionKind,
        event_type: EventType,
        target: &Arc<T>,
    ) -> bool {
        let addr = Arc::as_ptr(target).cast::<()>();
        let removed = self.shared.table.remove_first(|entry| {
            entry.kind() == kind && entry.event_type() == event_type && entry.targets(addr)
        });

        match removed {
            Some(entry) => {
                entry.token().disarm();
                debug!(
                    bus = %self.shared.config.name,
                    token = %entry.token().id(),
                    event = event_type.name(),
                    kind = ?kind,
                    "subscription removed by identity"
                );
                true
            }
            None => false,
        }
    }

    /// Remove every weak subscription whose target is gone.
    ///
    /// Publishing already does this lazily for the published type; this
    /// sweeps all types at once.
    pub fn purge_lost(&self) -> usize {
        let removed = self
            .shared
            .table
            .remove_where(|entry| entry.state() == SubscriptionState::Lost);
        for entry in &removed {
            entry.token().disarm();
        }
        if !removed.is_empty() {
            debug!(
                bus = %self.shared.config.name,
                count = removed.len(),
                "purged lost subscriptions"
            );
        }
        removed.len()
    }

    /// Remove all subscriptions.
    pub fn clear(&self) {
        let removed = self.shared.table.clear();
        for entry in removed.iter() {
            entry.token().disarm();
        }
        debug!(bus = %self.shared.config.name, count = removed.len(), "bus cleared");
    }

    // --- Dispatch ---

    /// Deliver `event` to every matching subscription.
    ///
    /// Works on a snapshot taken on entry: subscriptions added while the pass
    /// runs do not see this event, and subscriptions removed while it runs
    /// are still offered it. Handlers may publish, subscribe, or unsubscribe
    /// on this bus reentrantly.
    pub fn publish<E: Event>(&self, event: &E) -> Result<PublishReport> {
        let event_type = EventType::of::<E>();
        let snapshot = self.shared.table.snapshot();
        let any: &dyn Any = event;
        let mut report = PublishReport::default();

        for entry in snapshot.iter().filter(|entry| entry.event_type() == event_type) {
            report.matched += 1;

            if !entry.can_handle(any) {
                report.filtered += 1;
                continue;
            }

            match entry.handle(any) {
                Ok(Delivery::Delivered) => report.delivered += 1,
                Ok(Delivery::Skipped) => report.filtered += 1,
                Ok(Delivery::Lost) => {
                    debug!(
                        bus = %self.shared.config.name,
                        token = %entry.token().id(),
                        event = event_type.name(),
                        "subscriber dropped, releasing subscription"
                    );
                    if entry.token().release() {
                        report.removed += 1;
                    }
                }
                Err(source) => {
                    warn!(
                        bus = %self.shared.config.name,
                        token = %entry.token().id(),
                        event = event_type.name(),
                        error = %source,
                        "subscriber failed, aborting publish"
                    );
                    return Err(BusError::handler(event_type.name(), source));
                }
            }
        }

        trace!(
            bus = %self.shared.config.name,
            event = event_type.name(),
            matched = report.matched,
            delivered = report.delivered,
            filtered = report.filtered,
            removed = report.removed,
            "published"
        );
        Ok(report)
    }

    // --- Introspection ---

    pub fn subscription_count(&self) -> usize {
        self.shared.table.len()
    }

    pub fn subscription_count_for<E: Event>(&self) -> usize {
        self.shared.table.count_for(EventType::of::<E>())
    }

    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.subscription_count_for::<E>() > 0
    }

    /// True if `token`'s subscription is registered on this bus.
    pub fn contains(&self, token: &UnsubscribeToken) -> bool {
        self.shared.table.get(token.id()).is_some()
    }

    /// Lifecycle state of `token`'s subscription on this bus.
    pub fn state(&self, token: &UnsubscribeToken) -> SubscriptionState {
        self.shared
            .table
            .get(token.id())
            .map(|entry| entry.state())
            .unwrap_or(SubscriptionState::Removed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.shared.config.name)
            .field("subscriptions", &self.shared.table.len())
            .finish()
    }
}

fn ensure_alive<E: Event, T: ?Sized>(target: &Ref<T>, what: &str) -> Result<()> {
    if target.is_alive() {
        Ok(())
    } else {
        Err(BusError::InvalidArgument(format!(
            "{what} for {} is already dropped",
            EventType::of::<E>()
        )))
    }
}
