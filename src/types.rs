//! Core types for the event bus.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Anything that can travel through the bus.
///
/// Blanket-implemented for every `'static` value that can be shared across
/// threads; there is nothing to derive.
pub trait Event: Any + Send + Sync {}

impl<T: Any + Send + Sync> Event for T {}

/// Dispatch key for an event type.
///
/// Equality is exact runtime type identity. The name is carried for logs
/// and error messages only.
#[derive(Clone, Copy)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
}

impl EventType {
    pub fn of<E: Event>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<E: Event>(&self) -> bool {
        self.id == TypeId::of::<E>()
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventType({})", self.name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Error raised by a subscriber. Propagated to the publisher unchanged.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by callbacks and handlers.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Type-erased callback stored by an action subscription.
pub(crate) type DynCallback<E> = dyn Fn(&E) -> HandlerResult + Send + Sync;

/// Type-erased filter predicate.
pub(crate) type DynFilter<E> = dyn Fn(&E) -> bool + Send + Sync;

/// An object that consumes events of type `E`.
pub trait EventHandler<E: Event>: Send + Sync {
    fn handle(&self, event: &E) -> HandlerResult;

    /// Veto individual events. Defaults to accepting everything.
    fn can_handle(&self, event: &E) -> bool {
        let _ = event;
        true
    }
}

/// How the bus holds on to a subscriber.
///
/// `Strong` keeps the target alive for as long as the subscription exists.
/// `Weak` does not; the target is resolved again every time it is needed and
/// the subscription removes itself once the target is gone.
pub enum Ref<T: ?Sized> {
    Strong(Arc<T>),
    Weak(Weak<T>),
}

impl<T: ?Sized> Ref<T> {
    pub fn strong(target: Arc<T>) -> Self {
        Ref::Strong(target)
    }

    pub fn weak(target: &Arc<T>) -> Self {
        Ref::Weak(Arc::downgrade(target))
    }

    pub fn is_weak(&self) -> bool {
        matches!(self, Ref::Weak(_))
    }

    /// Get the target if it is still reachable.
    pub fn resolve(&self) -> Option<Arc<T>> {
        match self {
            Ref::Strong(target) => Some(Arc::clone(target)),
            Ref::Weak(target) => target.upgrade(),
        }
    }

    pub fn is_alive(&self) -> bool {
        match self {
            Ref::Strong(_) => true,
            Ref::Weak(target) => target.strong_count() > 0,
        }
    }

    /// Address of the target allocation.
    ///
    /// Stable for weak references even after the target dies: the allocation
    /// is not freed while any `Weak` points at it.
    pub(crate) fn addr(&self) -> *const () {
        match self {
            Ref::Strong(target) => Arc::as_ptr(target).cast::<()>(),
            Ref::Weak(target) => target.as_ptr().cast::<()>(),
        }
    }
}

impl<T: ?Sized> Clone for Ref<T> {
    fn clone(&self) -> Self {
        match self {
            Ref::Strong(target) => Ref::Strong(Arc::clone(target)),
            Ref::Weak(target) => Ref::Weak(Weak::clone(target)),
        }
    }
}

impl<T: ?Sized> From<Arc<T>> for Ref<T> {
    fn from(target: Arc<T>) -> Self {
        Ref::Strong(target)
    }
}

impl<T: ?Sized> From<Weak<T>> for Ref<T> {
    fn from(target: Weak<T>) -> Self {
        Ref::Weak(target)
    }
}

impl<T: ?Sized> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Strong(_) => write!(f, "Strong({:p})", self.addr()),
            Ref::Weak(_) if self.is_alive() => write!(f, "Weak({:p})", self.addr()),
            Ref::Weak(_) => f.write_str("Weak(<lost>)"),
        }
    }
}

/// Build a callback for `E`.
///
/// Mostly a type-inference aid: closures passed here get their argument
/// type from `E`.
pub fn callback<E, F>(f: F) -> Arc<F>
where
    E: Event,
    F: Fn(&E) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Build a filter predicate for `E`.
pub fn filter<E, P>(p: P) -> Arc<P>
where
    E: Event,
    P: Fn(&E) -> bool + Send + Sync + 'static,
{
    Arc::new(p)
}
