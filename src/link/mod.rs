//! Transport manager: one serial stream, two tasks, a name registry.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────── LinkHandle (cloneable) ────────────┐
//! item.set() ──────▶ │ queue_message ─▶ [OutboundQueue] ─▶ TX task ──┼──▶ writer
//!                    │                                    every tick  │
//! reader ──▶ RX task ┼─▶ LineBuffer ─▶ dispatch_line ─▶ registry ─────┼──▶ item.on_message()
//!                    └────────────────────────────────────────────────┘
//! ```
//!
//! # Rules
//!
//! - `queue_message` never blocks: a full queue drops the message.
//! - The registry lock is released before an item is entered.
//! - Every dropped line or message is counted in [`LinkStats`] and logged
//!   through a rate limiter; a failure-rate summary is logged periodically.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::codec::Message;
use crate::config::LinkConfig;
use crate::element::ElementType;
use crate::error::{DecodeError, LinkError};
use crate::line_buffer::LineBuffer;
use crate::logging::{Interval, RateLimiter};
use crate::stats::{LinkEvent, LinkSnapshot, LinkStats};

pub mod pipe;
pub mod queue;

pub use queue::OutboundQueue;

/// Stack size of the RX and TX tasks.
pub const TASK_STACK_SIZE: usize = 8 * 1024;

/// Bytes pulled from the reader per poll.
const READ_CHUNK: usize = 256;

/// Receive half of a byte stream.
pub trait LinkReader: Send {
    /// Copy whatever is available into `buf` without waiting for more.
    /// `Ok(0)` means nothing was available.
    fn read_available(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// Transmit half of a byte stream.
pub trait LinkWriter: Send {
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

/// Something that accepts decoded messages by name.
pub trait RxTarget: Send + Sync {
    fn name(&self) -> &str;
    fn element_type(&self) -> ElementType;
    fn count(&self) -> usize;
    fn on_message(&self, message: &Message);
}

struct Registration {
    id: u64,
    target: Weak<dyn RxTarget>,
}

struct LinkShared {
    config: LinkConfig,
    queue: OutboundQueue,
    registry: RwLock<HashMap<String, Registration>>,
    stats: LinkStats,
    running: AtomicBool,
    malformed_log: RateLimiter,
    unknown_log: RateLimiter,
    overrun_log: RateLimiter,
    queue_log: RateLimiter,
}

/// Cloneable access to a transport manager's queue and registry.
#[derive(Clone)]
pub struct LinkHandle {
    shared: Arc<LinkShared>,
}

impl LinkHandle {
    fn new(config: LinkConfig) -> Self {
        let every = config.report_interval();
        Self {
            shared: Arc::new(LinkShared {
                queue: OutboundQueue::new(config.queue_capacity),
                registry: RwLock::new(HashMap::new()),
                stats: LinkStats::new(),
                running: AtomicBool::new(false),
                malformed_log: RateLimiter::new(every),
                unknown_log: RateLimiter::new(every),
                overrun_log: RateLimiter::new(every),
                queue_log: RateLimiter::new(every),
                config,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    // ========================================
    // Outbound
    // ========================================

    /// Queue one encoded line for the TX task. Never blocks.
    ///
    /// # Returns
    ///
    /// - `Err(LinkError::MessageTooLong)` if the line exceeds the limit
    /// - `Err(LinkError::QueueFull)` if the queue is at capacity (dropped)
    pub fn queue_message(&self, line: String) -> Result<(), LinkError> {
        let max = self.shared.config.max_message_len;
        if line.len() > max {
            warn!(link = %self.name(), len = line.len(), max, "outbound message too long");
            return Err(LinkError::MessageTooLong { len: line.len(), max });
        }
        if !self.shared.queue.push(line) {
            self.shared.stats.record(LinkEvent::QueueFull);
            if let Some(suppressed) = self.shared.queue_log.check() {
                warn!(link = %self.name(), suppressed, "outbound queue full, message dropped");
            }
            return Err(LinkError::QueueFull);
        }
        Ok(())
    }

    /// Encode and queue a message.
    pub fn send(&self, message: &Message) -> Result<(), LinkError> {
        let line = message.encode()?;
        trace!(link = %self.name(), %line, "queued");
        self.queue_message(line)
    }

    /// Remove and return every queued line without transmitting it.
    ///
    /// Meant for inspection while the TX task is not running.
    pub fn take_outbound(&self) -> Vec<String> {
        self.shared.queue.drain_all()
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.pending()
    }

    // ========================================
    // Registry
    // ========================================

    /// Route messages named `target.name()` to `target`.
    ///
    /// Registering the same `id` again is a no-op. A name held by another
    /// live target is refused.
    pub fn register_for_rx(&self, id: u64, target: &Arc<dyn RxTarget>) -> Result<(), LinkError> {
        let name = target.name().to_string();
        let mut registry = self.shared.registry.write();
        if let Some(existing) = registry.get(&name) {
            if existing.id == id {
                return Ok(());
            }
            if existing.target.strong_count() > 0 {
                warn!(link = %self.name(), item = %name, "name already registered");
                return Err(LinkError::AlreadyRegistered(name));
            }
        }
        debug!(link = %self.name(), item = %name, "registered for rx");
        registry.insert(
            name,
            Registration {
                id,
                target: Arc::downgrade(target),
            },
        );
        Ok(())
    }

    /// Stop routing `name` to the target registered as `id`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn deregister_for_rx(&self, name: &str, id: u64) -> bool {
        let mut registry = self.shared.registry.write();
        match registry.get(name) {
            Some(existing) if existing.id == id => {
                registry.remove(name);
                debug!(link = %self.name(), item = %name, "deregistered");
                true
            }
            _ => false,
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.shared
            .registry
            .read()
            .get(name)
            .is_some_and(|r| r.target.strong_count() > 0)
    }

    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.registry.read().keys().cloned().collect();
        names.sort();
        names
    }

    // ========================================
    // Inbound
    // ========================================

    /// Decode one line and hand it to the registered target.
    ///
    /// Returns `true` if the message reached an item.
    pub fn dispatch_line(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }

        let message = match Message::decode(line) {
            Ok(message) => message,
            Err(e) => {
                self.drop_undecodable(&e);
                return false;
            }
        };

        let target = self
            .shared
            .registry
            .read()
            .get(&message.name)
            .and_then(|r| r.target.upgrade());

        let Some(target) = target else {
            self.shared.stats.record(LinkEvent::UnknownItem);
            if let Some(suppressed) = self.shared.unknown_log.check() {
                warn!(link = %self.name(), item = %message.name, suppressed, "message for unknown item");
            }
            return false;
        };

        if target.element_type() != message.element_type || target.count() != message.count {
            self.shared.stats.record(LinkEvent::TypeMismatch);
            warn!(
                link = %self.name(),
                item = %message.name,
                expected = %target.element_type(),
                got = %message.element_type,
                count = message.count,
                "type or count mismatch"
            );
            return false;
        }

        self.shared.stats.record(LinkEvent::Decoded);
        target.on_message(&message);
        true
    }

    fn drop_undecodable(&self, e: &DecodeError) {
        self.shared.stats.record_decode_error(e);
        if let Some(suppressed) = self.shared.malformed_log.check() {
            warn!(link = %self.name(), suppressed, "dropped inbound line: {}", e);
        }
    }

    /// Accumulate raw bytes into lines and dispatch each complete one.
    fn feed(&self, line: &mut LineBuffer, bytes: &[u8]) {
        for &b in bytes {
            if b != b'\n' {
                line.push(b);
                continue;
            }
            if line.overflowed() {
                self.shared.stats.record(LinkEvent::RxOverrun);
                if let Some(suppressed) = self.shared.overrun_log.check() {
                    warn!(link = %self.name(), max = line.capacity(), suppressed, "inbound line too long, discarded");
                }
            } else {
                match std::str::from_utf8(line.as_bytes()) {
                    Ok(text) => {
                        self.dispatch_line(text);
                    }
                    Err(e) => self.drop_undecodable(&DecodeError::Malformed(e.to_string())),
                }
            }
            line.clear();
        }
    }

    // ========================================
    // Diagnostics
    // ========================================

    pub fn stats(&self) -> LinkSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
}

/// Owns the RX and TX tasks of one link.
pub struct TransportManager {
    handle: LinkHandle,
    rx: Option<JoinHandle<()>>,
    tx: Option<JoinHandle<()>>,
}

impl TransportManager {
    /// Create a stopped manager. Items can register before [`start`](Self::start).
    pub fn new(config: LinkConfig) -> Self {
        Self {
            handle: LinkHandle::new(config),
            rx: None,
            tx: None,
        }
    }

    pub fn handle(&self) -> LinkHandle {
        self.handle.clone()
    }

    /// Spawn the RX and TX tasks over the given stream halves.
    pub fn start<R, W>(&mut self, reader: R, writer: W) -> Result<(), LinkError>
    where
        R: LinkReader + 'static,
        W: LinkWriter + 'static,
    {
        if self.handle.is_running() {
            warn!(link = %self.handle.name(), "already running");
            return Ok(());
        }
        self.handle.shared.running.store(true, Ordering::Release);

        let rx_handle = self.handle.clone();
        let rx = thread::Builder::new()
            .name(format!("{}-rx", self.handle.name()))
            .stack_size(TASK_STACK_SIZE)
            .spawn(move || rx_task(rx_handle, reader));
        let rx = match rx {
            Ok(rx) => rx,
            Err(e) => {
                self.handle.shared.running.store(false, Ordering::Release);
                return Err(e.into());
            }
        };
        self.rx = Some(rx);

        let tx_handle = self.handle.clone();
        let tx = thread::Builder::new()
            .name(format!("{}-tx", self.handle.name()))
            .stack_size(TASK_STACK_SIZE)
            .spawn(move || tx_task(tx_handle, writer));
        match tx {
            Ok(tx) => self.tx = Some(tx),
            Err(e) => {
                self.stop();
                return Err(e.into());
            }
        }

        info!(link = %self.handle.name(), "link started");
        Ok(())
    }

    /// Signal both tasks to exit and wait for them.
    pub fn stop(&mut self) {
        self.handle.shared.running.store(false, Ordering::Release);
        let mut stopped = false;
        for task in [self.rx.take(), self.tx.take()].into_iter().flatten() {
            let _ = task.join();
            stopped = true;
        }
        if stopped {
            info!(link = %self.handle.name(), "link stopped");
        }
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn rx_task<R: LinkReader>(link: LinkHandle, mut reader: R) {
    let tick = link.config().rx_tick();
    let mut line = LineBuffer::new(link.config().max_message_len);
    let mut buf = [0u8; READ_CHUNK];

    while link.is_running() {
        match reader.read_available(&mut buf) {
            Ok(0) => thread::sleep(tick),
            Ok(n) => link.feed(&mut line, &buf[..n]),
            Err(e) => {
                warn!(link = %link.name(), "read failed: {}", e);
                thread::sleep(tick);
            }
        }
    }
}

fn tx_task<W: LinkWriter>(link: LinkHandle, mut writer: W) {
    let tick = link.config().tx_tick();
    let mut report = Interval::new(link.config().report_interval());
    let mut last = link.stats();

    while link.is_running() {
        while let Some(mut line) = link.shared.queue.drain() {
            line.push('\n');
            match writer.write_all(line.as_bytes()) {
                Ok(()) => link.shared.stats.record(LinkEvent::Transmitted),
                Err(e) => warn!(link = %link.name(), "write failed: {}", e),
            }
        }

        if report.tick() {
            let now = link.stats();
            report_failures(&link, &now.since(&last));
            last = now;
        }

        thread::sleep(tick);
    }
}

fn report_failures(link: &LinkHandle, delta: &LinkSnapshot) {
    if delta.failures() == 0 {
        return;
    }
    warn!(
        link = %link.name(),
        rx_ok = delta.decoded,
        malformed = delta.malformed,
        checksum = delta.checksum_mismatch,
        unknown = delta.unknown_item,
        mismatch = delta.type_mismatch,
        overrun = delta.rx_overrun,
        dropped_tx = delta.queue_full,
        "rx failure rate {:.1}%",
        delta.rx_failure_pct()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sink {
        name: String,
        hits: parking_lot::Mutex<Vec<Message>>,
    }

    impl RxTarget for Sink {
        fn name(&self) -> &str {
            &self.name
        }
        fn element_type(&self) -> ElementType {
            ElementType::Bool
        }
        fn count(&self) -> usize {
            1
        }
        fn on_message(&self, message: &Message) {
            self.hits.lock().push(message.clone());
        }
    }

    fn sink(name: &str) -> Arc<dyn RxTarget> {
        Arc::new(Sink {
            name: name.into(),
            hits: parking_lot::Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn test_feed_splits_lines() {
        let manager = TransportManager::new(LinkConfig::default());
        let link = manager.handle();
        let target = sink("BT_Sink_En");
        link.register_for_rx(1, &target).unwrap();

        let mut line = LineBuffer::new(1000);
        let frame = br#"{"N":"BT_Sink_En","C":1,"T":"Bool_t","D":["01"],"B":1,"S":1}"#;
        link.feed(&mut line, &frame[..10]);
        assert_eq!(link.stats().decoded, 0);
        link.feed(&mut line, &frame[10..]);
        link.feed(&mut line, b"\r\n");
        assert_eq!(link.stats().decoded, 1);
    }

    #[test]
    fn test_feed_counts_overrun() {
        let mut cfg = LinkConfig::default();
        cfg.max_message_len = 8;
        let manager = TransportManager::new(cfg);
        let link = manager.handle();

        let mut line = LineBuffer::new(8);
        link.feed(&mut line, b"0123456789abcdef\n");
        assert_eq!(link.stats().rx_overrun, 1);
        assert_eq!(link.stats().malformed, 0);
    }

    #[test]
    fn test_dead_registration_is_replaced() {
        let manager = TransportManager::new(LinkConfig::default());
        let link = manager.handle();
        let first = sink("x");
        link.register_for_rx(1, &first).unwrap();
        drop(first);
        assert!(!link.is_registered("x"));

        let second = sink("x");
        assert!(link.register_for_rx(2, &second).is_ok());
        assert!(link.is_registered("x"));
    }
}
