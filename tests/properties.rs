//! Property tests for dispatch and token semantics.

use herald::{callback, filter, EventBus, Ref, UnsubscribeToken};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Sample {
    value: i32,
}

proptest! {
    #[test]
    fn prop_filter_decides_delivery(values in prop::collection::vec(any::<i32>(), 0..64), threshold in any::<i32>()) {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let cb = callback(move |_: &Sample| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let above = filter(move |s: &Sample| s.value > threshold);
        bus.subscribe_filtered(Ref::strong(cb), Ref::strong(above)).unwrap();

        for value in &values {
            bus.publish(&Sample { value: *value }).unwrap();
        }

        let expected = values.iter().filter(|v| **v > threshold).count();
        prop_assert_eq!(hits.load(Ordering::SeqCst), expected);
    }

    #[test]
    fn prop_each_publish_invokes_once_until_unsubscribed(before in 0usize..20, after in 0usize..20) {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let cb = callback(move |_: &Sample| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let token = bus.subscribe(Ref::strong(cb)).unwrap();

        for _ in 0..before {
            bus.publish(&Sample { value: 0 }).unwrap();
        }
        bus.unsubscribe(&token);
        for _ in 0..after {
            bus.publish(&Sample { value: 0 }).unwrap();
        }

        prop_assert_eq!(hits.load(Ordering::SeqCst), before);
    }

    #[test]
    fn prop_tokens_are_distinct(count in 1usize..64) {
        let bus = EventBus::new();
        let cb = callback(|_: &Sample| Ok(()));
        let tokens: Vec<UnsubscribeToken> = (0..count)
            .map(|_| bus.subscribe(Ref::strong(Arc::clone(&cb))).unwrap())
            .collect();

        let ids: HashSet<_> = tokens.iter().map(|t| t.id()).collect();
        prop_assert_eq!(ids.len(), count);
        for token in &tokens {
            prop_assert_eq!(token, &token.clone());
        }
    }

    #[test]
    fn prop_release_twice_equals_once(releases in prop::collection::vec(0usize..8, 0..32)) {
        let bus = EventBus::new();
        let cb = callback(|_: &Sample| Ok(()));
        let tokens: Vec<UnsubscribeToken> = (0..8)
            .map(|_| bus.subscribe(Ref::strong(Arc::clone(&cb))).unwrap())
            .collect();

        for index in &releases {
            tokens[*index].release();
        }

        let distinct: HashSet<_> = releases.iter().collect();
        prop_assert_eq!(bus.subscription_count(), 8 - distinct.len());
    }

    #[test]
    fn prop_dead_weak_subscriptions_cleaned_by_publish(alive in 0usize..16, dead in 0usize..16) {
        let bus = EventBus::new();
        let mut keep = Vec::new();
        for _ in 0..alive {
            let cb = callback(|_: &Sample| Ok(()));
            bus.subscribe(Ref::weak(&cb)).unwrap();
            keep.push(cb);
        }
        for _ in 0..dead {
            let cb = callback(|_: &Sample| Ok(()));
            bus.subscribe(Ref::weak(&cb)).unwrap();
        }

        let report = bus.publish(&Sample { value: 1 }).unwrap();
        prop_assert_eq!(report.delivered, alive);
        prop_assert_eq!(report.removed, dead);
        prop_assert_eq!(bus.subscription_count(), alive);
    }
}
