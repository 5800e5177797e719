//! Property tests for snapshot and notification invariants.

use parking_lot::Mutex;
use proptest::prelude::*;
use snapstore::{Change, LegacyStore, Store, StoreOptions};
use std::sync::Arc;

const KEYS: [&str; 4] = ["a", "b", "c", "d"];

fn ops() -> impl Strategy<Value = Vec<(usize, i64)>> {
    prop::collection::vec((0..KEYS.len(), any::<i64>()), 1..40)
}

fn initial() -> [(&'static str, i64); 4] {
    [("a", 0), ("b", 0), ("c", 0), ("d", 0)]
}

proptest! {
    #[test]
    fn snapshots_never_change_after_capture(ops in ops()) {
        let store = Store::new(initial(), StoreOptions::default());
        let mut history = vec![(store.get_state(), store.get_state().state().clone())];

        for (index, value) in ops {
            store.set(&KEYS[index]).unwrap().call(value).unwrap();
            prop_assert_eq!(store.get(&KEYS[index]), Some(value));
            history.push((store.get_state(), store.get_state().state().clone()));
        }

        for (snapshot, captured) in &history {
            prop_assert_eq!(snapshot.state(), captured);
        }
    }

    #[test]
    fn every_set_emits_one_change_with_previous_value(ops in ops()) {
        let store = LegacyStore::new(initial(), StoreOptions::default());
        let changes = Arc::new(Mutex::new(Vec::new()));
        let c = changes.clone();
        store.on_all().subscribe(move |change: &Change<&'static str, i64>| {
            c.lock().push(change.clone());
        });

        let mut expected = Vec::new();
        for (index, value) in &ops {
            let key = KEYS[*index];
            let previous_value = store.get(&key).unwrap();
            store.set(&key).unwrap().call(*value).unwrap();
            expected.push(Change { key, previous_value, value: *value });
        }

        prop_assert_eq!(&*changes.lock(), &expected);
    }

    #[test]
    fn setters_stay_identical(ops in ops()) {
        let store = Store::new(initial(), StoreOptions::dev());
        let setters: Vec<_> = KEYS.iter().map(|k| store.set(k).unwrap()).collect();

        for (index, value) in ops {
            setters[index].call(value).unwrap();
            for (key, setter) in KEYS.iter().zip(&setters) {
                prop_assert!(Arc::ptr_eq(setter, &store.set(key).unwrap()));
            }
        }
    }

    #[test]
    fn equal_values_still_notify(value in any::<i64>(), repeats in 1usize..10) {
        let store = Store::new([("a", value)], StoreOptions::default());
        let count = Arc::new(Mutex::new(0usize));
        let c = count.clone();
        store.on("a").subscribe(move |_| *c.lock() += 1);

        for _ in 0..repeats {
            store.set(&"a").unwrap().call(value).unwrap();
        }

        prop_assert_eq!(*count.lock(), repeats);
    }
}
