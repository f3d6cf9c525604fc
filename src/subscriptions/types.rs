//! Subscription variants and their per-dispatch state.

use crate::token::UnsubscribeToken;
use crate::types::{
    DynCallback, DynFilter, Event, EventHandler, EventType, HandlerError, HandlerResult, Ref,
};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Which registration call created a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// Bound to a callback function.
    Action,
    /// Bound to an [`EventHandler`] object.
    Handler,
}

/// Observable lifecycle of a subscription.
///
/// Transitions only go forward: `Alive -> Lost -> Removed`, or straight
/// from `Alive` to `Removed` on explicit unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Target reachable. `filtered` is true while a filter predicate is armed.
    Alive { filtered: bool },
    /// Weak target gone; removed on the next dispatch that reaches it.
    Lost,
    /// No longer registered.
    Removed,
}

/// Outcome of handing one event to one subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// Not for this subscription after all (wrong type or vetoed).
    Skipped,
    /// Weak target is gone. The caller removes the subscription.
    Lost,
}

/// Type-erased view of a subscription, as stored in the table.
pub(crate) trait Subscription: Send + Sync {
    fn kind(&self) -> SubscriptionKind;

    fn token(&self) -> &UnsubscribeToken;

    fn event_type(&self) -> EventType;

    fn is_weak(&self) -> bool;

    fn state(&self) -> SubscriptionState;

    /// True if the subscriber is the allocation at `addr`.
    fn targets(&self, addr: *const ()) -> bool;

    /// Type check plus filter. Does not touch the subscriber itself.
    fn can_handle(&self, event: &dyn Any) -> bool;

    /// Resolve the subscriber and run it.
    fn handle(&self, event: &dyn Any) -> Result<Delivery, HandlerError>;
}

/// Subscription bound to a callback.
pub(crate) struct ActionSubscription<E: Event> {
    event_type: EventType,
    token: UnsubscribeToken,
    callback: Ref<DynCallback<E>>,
    /// Cleared for good once a weak predicate is found dead.
    filter: Mutex<Option<Ref<DynFilter<E>>>>,
}

impl<E: Event> ActionSubscription<E> {
    pub(crate) fn new(
        token: UnsubscribeToken,
        callback: Ref<DynCallback<E>>,
        filter: Option<Ref<DynFilter<E>>>,
    ) -> Self {
        Self {
            event_type: EventType::of::<E>(),
            token,
            callback,
            filter: Mutex::new(filter),
        }
    }

    fn passes_filter(&self, event: &E) -> bool {
        let filter = self.filter.lock().clone();
        let Some(filter) = filter else {
            return true;
        };

        match filter.resolve() {
            Some(predicate) => predicate(event),
            None => {
                *self.filter.lock() = None;
                debug!(
                    token = %self.token.id(),
                    event = self.event_type.name(),
                    "filter predicate dropped, subscription now unfiltered"
                );
                true
            }
        }
    }
}

impl<E: Event> Subscription for ActionSubscription<E> {
    fn kind(&self) -> SubscriptionKind {
        SubscriptionKind::Action
    }

    fn token(&self) -> &UnsubscribeToken {
        &self.token
    }

    fn event_type(&self) -> EventType {
        self.event_type
    }

    fn is_weak(&self) -> bool {
        self.callback.is_weak()
    }

    fn state(&self) -> SubscriptionState {
        if !self.callback.is_alive() {
            return SubscriptionState::Lost;
        }
        let filtered = self
            .filter
            .lock()
            .as_ref()
            .map(|filter| filter.is_alive())
            .unwrap_or(false);
        SubscriptionState::Alive { filtered }
    }

    fn targets(&self, addr: *const ()) -> bool {
        std::ptr::eq(self.callback.addr(), addr)
    }

    fn can_handle(&self, event: &dyn Any) -> bool {
        match event.downcast_ref::<E>() {
            Some(event) => self.passes_filter(event),
            None => false,
        }
    }

    fn handle(&self, event: &dyn Any) -> Result<Delivery, HandlerError> {
        let Some(event) = event.downcast_ref::<E>() else {
            return Ok(Delivery::Skipped);
        };
        let Some(callback) = self.callback.resolve() else {
            return Ok(Delivery::Lost);
        };
        callback(event)?;
        Ok(Delivery::Delivered)
    }
}

/// Subscription bound to an [`EventHandler`].
pub(crate) struct HandlerSubscription<E: Event> {
    event_type: EventType,
    token: UnsubscribeToken,
    handler: Ref<dyn EventHandler<E>>,
}

impl<E: Event> HandlerSubscription<E> {
    pub(crate) fn new(token: UnsubscribeToken, handler: Ref<dyn EventHandler<E>>) -> Self {
        Self {
            event_type: EventType::of::<E>(),
            token,
            handler,
        }
    }
}

impl<E: Event> Subscription for HandlerSubscription<E> {
    fn kind(&self) -> SubscriptionKind {
        SubscriptionKind::Handler
    }

    fn token(&self) -> &UnsubscribeToken {
        &self.token
    }

    fn event_type(&self) -> EventType {
        self.event_type
    }

    fn is_weak(&self) -> bool {
        self.handler.is_weak()
    }

    fn state(&self) -> SubscriptionState {
        if self.handler.is_alive() {
            SubscriptionState::Alive { filtered: false }
        } else {
            SubscriptionState::Lost
        }
    }

    fn targets(&self, addr: *const ()) -> bool {
        std::ptr::eq(self.handler.addr(), addr)
    }

    fn can_handle(&self, event: &dyn Any) -> bool {
        let Some(event) = event.downcast_ref::<E>() else {
            return false;
        };
        // A dead handler has no veto; let handle() report it as lost.
        match self.handler.resolve() {
            Some(handler) => handler.can_handle(event),
            None => true,
        }
    }

    fn handle(&self, event: &dyn Any) -> Result<Delivery, HandlerError> {
        let Some(event) = event.downcast_ref::<E>() else {
            return Ok(Delivery::Skipped);
        };
        let Some(handler) = self.handler.resolve() else {
            return Ok(Delivery::Lost);
        };
        handler.handle(event)?;
        Ok(Delivery::Delivered)
    }
}

impl fmt::Debug for dyn Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("token", &self.token().id())
            .field("kind", &self.kind())
            .field("event_type", &self.event_type())
            .field("weak", &self.is_weak())
            .field("state", &self.state())
            .finish()
    }
}

/// Erase a concrete callback to the stored trait object.
pub(crate) fn erase_callback<E, F>(callback: Ref<F>) -> Ref<DynCallback<E>>
where
    E: Event,
    F: Fn(&E) -> HandlerResult + Send + Sync + 'static,
{
    match callback {
        Ref::Strong(target) => Ref::Strong(target as Arc<DynCallback<E>>),
        Ref::Weak(target) => Ref::Weak(target as Weak<DynCallback<E>>),
    }
}

pub(crate) fn erase_filter<E, P>(filter: Ref<P>) -> Ref<DynFilter<E>>
where
    E: Event,
    P: Fn(&E) -> bool + Send + Sync + 'static,
{
    match filter {
        Ref::Strong(target) => Ref::Strong(target as Arc<DynFilter<E>>),
        Ref::Weak(target) => Ref::Weak(target as Weak<DynFilter<E>>),
    }
}

pub(crate) fn erase_handler<E, H>(handler: Ref<H>) -> Ref<dyn EventHandler<E>>
where
    E: Event,
    H: EventHandler<E> + 'static,
{
    match handler {
        Ref::Strong(target) => Ref::Strong(target as Arc<dyn EventHandler<E>>),
        Ref::Weak(target) => Ref::Weak(target as Weak<dyn EventHandler<E>>),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{callback, filter};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Reading {
        value: i32,
    }

    struct Other;

    fn inert_token() -> UnsubscribeToken {
        UnsubscribeToken::new(|_| {})
    }

    #[test]
    fn test_action_filter_and_type_check() {
        let cb = callback(|_: &Reading| Ok(()));
        let above_ten = filter(|r: &Reading| r.value > 10);
        let sub = ActionSubscription::new(
            inert_token(),
            erase_callback(Ref::strong(cb)),
            Some(erase_filter(Ref::strong(above_ten))),
        );

        assert!(!sub.can_handle(&Reading { value: 5 }));
        assert!(sub.can_handle(&Reading { value: 15 }));
        assert!(!sub.can_handle(&Other));
        assert_eq!(sub.state(), SubscriptionState::Alive { filtered: true });
    }

    #[test]
    fn test_lost_weak_filter_is_disarmed() {
        let cb = callback(|_: &Reading| Ok(()));
        let never = filter(|_: &Reading| false);
        let sub = ActionSubscription::new(
            inert_token(),
            erase_callback(Ref::strong(cb)),
            Some(erase_filter(Ref::weak(&never))),
        );

        assert!(!sub.can_handle(&Reading { value: 1 }));
        drop(never);
        assert!(sub.can_handle(&Reading { value: 1 }));
        assert!(sub.filter.lock().is_none());
        assert_eq!(sub.state(), SubscriptionState::Alive { filtered: false });
    }

    #[test]
    fn test_weak_callback_reports_lost() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let cb = callback(move |_: &Reading| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let sub = ActionSubscription::new(inert_token(), erase_callback(Ref::weak(&cb)), None);

        let event = Reading { value: 1 };
        assert_eq!(sub.handle(&event).unwrap(), Delivery::Delivered);

        drop(cb);
        assert_eq!(sub.state(), SubscriptionState::Lost);
        assert_eq!(sub.handle(&event).unwrap(), Delivery::Lost);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    struct Threshold {
        min: i32,
        seen: AtomicUsize,
    }

    impl EventHandler<Reading> for Threshold {
        fn handle(&self, _event: &Reading) -> HandlerResult {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn can_handle(&self, event: &Reading) -> bool {
            event.value >= self.min
        }
    }

    #[test]
    fn test_handler_subscription_vetoes() {
        let handler = Arc::new(Threshold {
            min: 3,
            seen: AtomicUsize::new(0),
        });
        let sub = HandlerSubscription::new(
            inert_token(),
            erase_handler::<Reading, _>(Ref::weak(&handler)),
        );

        assert!(!sub.can_handle(&Reading { value: 2 }));
        assert!(sub.can_handle(&Reading { value: 3 }));
        assert_eq!(sub.handle(&Reading { value: 3 }).unwrap(), Delivery::Delivered);
        assert_eq!(handler.seen.load(Ordering::SeqCst), 1);

        let addr = Arc::as_ptr(&handler).cast::<()>();
        assert!(sub.targets(addr));

        drop(handler);
        // Dead handlers cannot veto
        assert!(sub.can_handle(&Reading { value: 0 }));
        assert_eq!(sub.handle(&Reading { value: 0 }).unwrap(), Delivery::Lost);
    }
}
