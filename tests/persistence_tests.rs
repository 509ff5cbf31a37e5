//! Persistence cache tests
//!
//! Windows are shortened to keep the suite fast.

mod common;

use common::wait_until;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use light_tower_link::persist::{LoadOutcome, SaveOutcome};
use light_tower_link::{KeyValueStore, MemoryStore, PersistConfig, PersistError, PersistenceCache, TimerService};

const FAST: PersistConfig = PersistConfig {
    debounce_window_ms: 200,
    buffer_ms: 50,
};

fn setup(store: MemoryStore) -> (Arc<MemoryStore>, PersistenceCache) {
    let store = Arc::new(store);
    let timers = Arc::new(TimerService::start().unwrap());
    let dyn_store: Arc<dyn KeyValueStore> = Arc::clone(&store) as Arc<dyn KeyValueStore>;
    let cache = PersistenceCache::new("Amplitude Gain", dyn_store, timers, FAST);
    (store, cache)
}

#[test]
fn test_burst_coalesces_into_one_write_of_last_value() {
    let (store, cache) = setup(MemoryStore::new());

    for v in 1..=5 {
        assert_eq!(cache.save(&v.to_string()), SaveOutcome::Deferred);
    }
    assert_eq!(store.write_count("Amplitude Gain"), 0);
    assert_eq!(cache.pending().as_deref(), Some("5"));
    assert!(cache.is_timer_active());

    assert!(wait_until(Duration::from_secs(2), || store.write_count("Amplitude Gain") > 0));
    thread::sleep(Duration::from_millis(100));

    assert_eq!(store.write_count("Amplitude Gain"), 1);
    assert_eq!(store.value("Amplitude Gain").as_deref(), Some("5"));
    assert_eq!(cache.pending(), None);
    assert!(!cache.is_timer_active());
}

#[test]
fn test_save_after_window_writes_immediately() {
    let (store, cache) = setup(MemoryStore::new());
    thread::sleep(Duration::from_millis(250));

    assert_eq!(cache.save("1.5"), SaveOutcome::Written);
    assert_eq!(store.value("Amplitude Gain").as_deref(), Some("1.5"));

    // Just written, so the next one waits.
    assert_eq!(cache.save("2.5"), SaveOutcome::Deferred);
    assert_eq!(store.write_count("Amplitude Gain"), 1);
}

#[test]
fn test_flush_writes_pending_now() {
    let (store, cache) = setup(MemoryStore::new());
    assert_eq!(cache.save("3"), SaveOutcome::Deferred);

    cache.flush();
    assert_eq!(store.value("Amplitude Gain").as_deref(), Some("3"));
    assert!(!cache.is_timer_active());

    thread::sleep(Duration::from_millis(350));
    assert_eq!(store.write_count("Amplitude Gain"), 1);
}

#[test]
fn test_load_missing_key_initializes() {
    let (store, cache) = setup(MemoryStore::new());
    let mut applied = Vec::new();

    let outcome = cache.load("1", |v| {
        applied.push(v.to_string());
        true
    });

    assert_eq!(outcome, LoadOutcome::Initialized);
    assert_eq!(applied, vec!["1"]);
    assert_eq!(store.value("Amplitude Gain").as_deref(), Some("1"));
}

#[test]
fn test_load_stored_value() {
    let (store, cache) = setup(MemoryStore::new().with_entry("Amplitude Gain", "0.5"));
    let mut applied = None;

    assert_eq!(
        cache.load("1", |v| {
            applied = Some(v.to_string());
            true
        }),
        LoadOutcome::Loaded
    );
    assert_eq!(applied.as_deref(), Some("0.5"));
    assert_eq!(store.write_count("Amplitude Gain"), 0);
}

#[test]
fn test_load_rejected_value_falls_back_once() {
    let (_store, cache) = setup(MemoryStore::new().with_entry("Amplitude Gain", "garbage"));
    let mut attempts = Vec::new();

    let outcome = cache.load("1", |v| {
        attempts.push(v.to_string());
        v.parse::<f32>().is_ok()
    });
    assert_eq!(outcome, LoadOutcome::Defaulted);
    assert_eq!(attempts, vec!["garbage", "1"]);

    let outcome = cache.load("bad default", |v| v.parse::<f32>().is_ok());
    assert_eq!(outcome, LoadOutcome::Failed);
}

#[test]
fn test_short_write_is_reported_not_retried() {
    let (store, cache) = setup(MemoryStore::new());
    store.fail_writes(true);
    thread::sleep(Duration::from_millis(250));

    assert_eq!(
        cache.save("7"),
        SaveOutcome::Failed(PersistError::ShortWrite {
            key: "Amplitude Gain".into(),
            written: 0,
            expected: 1,
        })
    );
    thread::sleep(Duration::from_millis(350));
    assert_eq!(store.write_count("Amplitude Gain"), 1);
    assert!(!store.contains_key("Amplitude Gain"));
}
