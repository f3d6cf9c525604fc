//! Buffered publishing on top of an [`EventBus`].

use crate::bus::{EventBus, PublishReport};
use crate::error::{BusError, Result};
use crate::types::{Event, EventType};
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

type PendingPublish = Box<dyn FnOnce(&EventBus) -> Result<PublishReport> + Send>;

struct Pending {
    event_type: EventType,
    publish: PendingPublish,
}

/// Collects events and publishes them together, or not at all.
///
/// Events are delivered in the order they were buffered. Dropping a
/// transaction that was neither committed nor discarded discards whatever
/// is still buffered.
pub struct EventTransaction<'bus> {
    bus: &'bus EventBus,
    pending: VecDeque<Pending>,
    closed: bool,
}

impl<'bus> EventTransaction<'bus> {
    pub fn new(bus: &'bus EventBus) -> Self {
        Self {
            bus,
            pending: VecDeque::new(),
            closed: false,
        }
    }

    /// The wrapped bus. Subscriptions go straight through it.
    pub fn bus(&self) -> &'bus EventBus {
        self.bus
    }

    /// Buffer an event for a later [`publish_all`](Self::publish_all).
    pub fn publish<E: Event>(&mut self, event: E) -> Result<()> {
        if self.closed {
            return Err(BusError::TransactionClosed);
        }
        self.pending.push_back(Pending {
            event_type: EventType::of::<E>(),
            publish: Box::new(move |bus: &EventBus| bus.publish(&event)),
        });
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Publish everything buffered so far, oldest first.
    ///
    /// Stops at the first subscriber failure. The failing event is consumed;
    /// later events stay buffered and can be flushed again or discarded.
    pub fn publish_all(&mut self) -> Result<PublishReport> {
        if self.closed {
            return Err(BusError::TransactionClosed);
        }

        let mut report = PublishReport::default();
        while let Some(next) = self.pending.pop_front() {
            let pass = (next.publish)(self.bus)?;
            report.merge(pass);
        }

        debug!(
            bus = %self.bus.name(),
            delivered = report.delivered,
            "transaction flushed"
        );
        Ok(report)
    }

    /// Throw away everything buffered. Returns how many events were dropped.
    pub fn discard_all(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            debug!(bus = %self.bus.name(), dropped, "transaction discarded");
        }
        dropped
    }

    /// Flush and close. Nothing can be buffered afterwards.
    pub fn commit(&mut self) -> Result<PublishReport> {
        let report = self.publish_all();
        self.closed = true;
        report
    }

    /// Discard and close.
    pub fn rollback(&mut self) -> usize {
        let dropped = self.discard_all();
        self.closed = true;
        dropped
    }
}

impl Drop for EventTransaction<'_> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                bus = %self.bus.name(),
                dropped = self.pending.len(),
                "transaction dropped with pending events"
            );
        }
    }
}

impl fmt::Debug for EventTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending: Vec<&'static str> =
            self.pending.iter().map(|p| p.event_type.name()).collect();
        f.debug_struct("EventTransaction")
            .field("bus", &self.bus.name())
            .field("pending", &pending)
            .field("closed", &self.closed)
            .finish()
    }
}

impl EventBus {
    /// Start a transaction on this bus.
    pub fn transaction(&self) -> EventTransaction<'_> {
        EventTransaction::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{callback, Ref};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Saved(u32);

    fn recorder(bus: &EventBus) -> (Arc<Mutex<Vec<u32>>>, crate::UnsubscribeToken) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb = callback(move |e: &Saved| {
            sink.lock().push(e.0);
            Ok(())
        });
        let token = bus.subscribe(Ref::strong(cb)).unwrap();
        (seen, token)
    }

    #[test]
    fn test_buffer_then_flush_in_order() {
        let bus = EventBus::new();
        let (seen, _token) = recorder(&bus);

        let mut tx = bus.transaction();
        tx.publish(Saved(1)).unwrap();
        tx.publish(Saved(2)).unwrap();
        assert_eq!(tx.pending(), 2);
        assert!(seen.lock().is_empty());

        let report = tx.publish_all().unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(tx.pending(), 0);
    }

    #[test]
    fn test_discard_and_drop() {
        let bus = EventBus::new();
        let (seen, _token) = recorder(&bus);

        let mut tx = bus.transaction();
        tx.publish(Saved(1)).unwrap();
        assert_eq!(tx.discard_all(), 1);
        tx.publish(Saved(2)).unwrap();
        drop(tx);

        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_commit_closes() {
        let bus = EventBus::new();
        let (seen, _token) = recorder(&bus);

        let mut tx = bus.transaction();
        tx.publish(Saved(7)).unwrap();
        let report = tx.commit().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(*seen.lock(), vec![7]);

        assert!(tx.is_closed());
        assert!(matches!(tx.publish(Saved(8)), Err(BusError::TransactionClosed)));
        assert!(matches!(tx.commit(), Err(BusError::TransactionClosed)));
    }

    #[test]
    fn test_failure_keeps_remaining_events() {
        let bus = EventBus::new();
        let cb = callback(|e: &Saved| {
            if e.0 == 2 {
                return Err("rejected".into());
            }
            Ok(())
        });
        bus.subscribe(Ref::strong(cb)).unwrap();

        let mut tx = bus.transaction();
        for i in 1..=3 {
            tx.publish(Saved(i)).unwrap();
        }

        assert!(tx.publish_all().is_err());
        assert_eq!(tx.pending(), 1);
        assert_eq!(tx.rollback(), 1);
    }
}
