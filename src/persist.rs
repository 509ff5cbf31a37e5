//! Debounced persistence of item values.
//!
//! # Architecture
//!
//! ```text
//! item commit ──▶ PersistenceCache::save ──┬─▶ store.put()          (window elapsed)
//!                                          └─▶ pending + one-shot   (inside window)
//!                                                 │
//!                                  timer thread ──┘──▶ store.put(latest pending)
//! ```
//!
//! # Rules
//!
//! - At most one physical write per key per debounce window.
//! - Last value wins: a deferred write carries the newest pending value.
//! - A running deferral timer is never restarted by later saves.
//! - A short write is logged and dropped; no retry, no rollback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::PersistConfig;
use crate::error::PersistError;
use crate::timer::{TimerHandle, TimerService};

/// Flat string key/value storage.
pub trait KeyValueStore: Send + Sync {
    fn contains_key(&self, key: &str) -> bool;

    /// Stored value, or `default` if absent or unreadable.
    fn get(&self, key: &str, default: &str) -> String;

    /// Store `value`, returning the number of bytes written.
    fn put(&self, key: &str, value: &str) -> usize;
}

/// Heap-backed store for the host build and tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    writes: Mutex<HashMap<String, u32>>,
    short_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a key without counting a write.
    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries.lock().insert(key.to_string(), value.to_string());
        self
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Physical writes of `key` so far.
    pub fn write_count(&self, key: &str) -> u32 {
        self.writes.lock().get(key).copied().unwrap_or(0)
    }

    pub fn total_writes(&self) -> u32 {
        self.writes.lock().values().sum()
    }

    /// Make every following `put` report zero bytes written.
    pub fn fail_writes(&self, fail: bool) {
        self.short_writes.store(fail, Ordering::Relaxed);
    }
}

impl KeyValueStore for MemoryStore {
    fn contains_key(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    fn get(&self, key: &str, default: &str) -> String {
        self.value(key).unwrap_or_else(|| default.to_string())
    }

    fn put(&self, key: &str, value: &str) -> usize {
        *self.writes.lock().entry(key.to_string()).or_insert(0) += 1;
        if self.short_writes.load(Ordering::Relaxed) {
            return 0;
        }
        self.entries.lock().insert(key.to_string(), value.to_string());
        value.len()
    }
}

/// What [`PersistenceCache::save`] did with the value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// Held back until the debounce timer fires.
    Deferred,
    Failed(PersistError),
}

/// How [`PersistenceCache::load`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Stored value accepted.
    Loaded,
    /// Stored value rejected; the default was applied instead.
    Defaulted,
    /// Key was absent; the default was written and applied.
    Initialized,
    /// Neither the stored value nor the default was accepted.
    Failed,
}

struct Record {
    pending: Option<String>,
    last_flush: Instant,
    timer: Option<TimerHandle>,
}

struct CacheInner {
    key: String,
    store: Arc<dyn KeyValueStore>,
    config: PersistConfig,
    record: Mutex<Record>,
}

impl CacheInner {
    fn write(&self, value: &str) -> Result<(), PersistError> {
        let written = self.store.put(&self.key, value);
        if written < value.len() {
            return Err(PersistError::ShortWrite {
                key: self.key.clone(),
                written,
                expected: value.len(),
            });
        }
        debug!(key = %self.key, value, "persisted");
        Ok(())
    }

    fn write_logged(&self, value: &str) -> Result<(), PersistError> {
        self.write(value).inspect_err(|e| error!(key = %self.key, "{}", e))
    }

    fn on_timer(&self) {
        let mut record = self.record.lock();
        record.timer = None;
        if let Some(value) = record.pending.take() {
            let _ = self.write_logged(&value);
            record.last_flush = Instant::now();
        }
    }
}

/// Write-coalescing wrapper around one key of a [`KeyValueStore`].
pub struct PersistenceCache {
    inner: Arc<CacheInner>,
    timers: Arc<TimerService>,
}

impl PersistenceCache {
    /// The debounce window starts at creation, so a burst of saves right
    /// after boot is coalesced too.
    pub fn new(
        key: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        timers: Arc<TimerService>,
        config: PersistConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                key: key.into(),
                store,
                config,
                record: Mutex::new(Record {
                    pending: None,
                    last_flush: Instant::now(),
                    timer: None,
                }),
            }),
            timers,
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Write `default` unconditionally.
    pub fn initialize(&self, default: &str) -> Result<(), PersistError> {
        let mut record = self.inner.record.lock();
        self.inner.write_logged(default)?;
        record.last_flush = Instant::now();
        info!(key = %self.inner.key, default, "initialized");
        Ok(())
    }

    /// Hand the stored value to `apply`.
    ///
    /// If `apply` rejects it, `default` is tried once. A missing key is
    /// initialized with `default`.
    pub fn load<F>(&self, default: &str, mut apply: F) -> LoadOutcome
    where
        F: FnMut(&str) -> bool,
    {
        let key = &self.inner.key;
        if !self.inner.store.contains_key(key) {
            let _ = self.initialize(default);
            return if apply(default) {
                LoadOutcome::Initialized
            } else {
                LoadOutcome::Failed
            };
        }

        let stored = self.inner.store.get(key, default);
        if apply(&stored) {
            debug!(key = %key, value = %stored, "loaded");
            return LoadOutcome::Loaded;
        }

        warn!(key = %key, value = %stored, "stored value rejected, using default");
        if apply(default) {
            LoadOutcome::Defaulted
        } else {
            error!(key = %key, default, "default value rejected");
            LoadOutcome::Failed
        }
    }

    /// Persist `value`, deferring it if the key was written within the
    /// debounce window.
    pub fn save(&self, value: &str) -> SaveOutcome {
        let mut record = self.inner.record.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(record.last_flush);
        let window = self.inner.config.debounce_window();

        if elapsed <= window {
            record.pending = Some(value.to_string());
            if record.timer.is_none() {
                let delay = (window - elapsed) + self.inner.config.buffer();
                let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
                record.timer = Some(self.timers.schedule_once(delay, move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_timer();
                    }
                }));
                debug!(key = %self.inner.key, delay_ms = delay.as_millis() as u64, "write deferred");
            }
            return SaveOutcome::Deferred;
        }

        if let Some(timer) = record.timer.take() {
            timer.cancel();
        }
        record.pending = None;
        record.last_flush = now;
        match self.inner.write_logged(value) {
            Ok(()) => SaveOutcome::Written,
            Err(e) => SaveOutcome::Failed(e),
        }
    }

    /// Write any pending value now.
    pub fn flush(&self) {
        let mut record = self.inner.record.lock();
        if let Some(timer) = record.timer.take() {
            timer.cancel();
        }
        if let Some(value) = record.pending.take() {
            let _ = self.inner.write_logged(&value);
            record.last_flush = Instant::now();
        }
    }

    pub fn pending(&self) -> Option<String> {
        self.inner.record.lock().pending.clone()
    }

    pub fn is_timer_active(&self) -> bool {
        self.inner.record.lock().timer.is_some()
    }
}
