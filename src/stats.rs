//! Link health counters.
//!
//! Every failure on the link is local and non-fatal: the offending line or
//! message is dropped and one of these counters goes up. Counters are
//! lock-free so the RX and TX tasks never contend on them.
//!
//! # Usage
//!
//! ```ignore
//! match Message::decode(line) {
//!     Ok(msg) => stats.record(LinkEvent::Decoded),
//!     Err(e) => stats.record_decode_error(&e),
//! }
//!
//! // In the periodic report:
//! let snap = stats.snapshot();
//! if snap.failures() > 0 { warn!(...) }
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::DecodeError;

/// Countable link events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// Line decoded and dispatched.
    Decoded,
    /// Line failed JSON/tag/length/hex checks.
    Malformed,
    /// Line parsed but the checksum disagreed.
    ChecksumMismatch,
    /// Name not present in the registry.
    UnknownItem,
    /// Item found but type tag or count disagreed.
    TypeMismatch,
    /// Outbound queue full, message dropped.
    QueueFull,
    /// Inbound line exceeded the maximum length.
    RxOverrun,
    /// Line written to the stream.
    Transmitted,
}

/// Thread-safe link counters.
pub struct LinkStats {
    decoded: AtomicU32,
    malformed: AtomicU32,
    checksum_mismatch: AtomicU32,
    unknown_item: AtomicU32,
    type_mismatch: AtomicU32,
    queue_full: AtomicU32,
    rx_overrun: AtomicU32,
    transmitted: AtomicU32,
}

impl LinkStats {
    pub const fn new() -> Self {
        Self {
            decoded: AtomicU32::new(0),
            malformed: AtomicU32::new(0),
            checksum_mismatch: AtomicU32::new(0),
            unknown_item: AtomicU32::new(0),
            type_mismatch: AtomicU32::new(0),
            queue_full: AtomicU32::new(0),
            rx_overrun: AtomicU32::new(0),
            transmitted: AtomicU32::new(0),
        }
    }

    fn counter(&self, event: LinkEvent) -> &AtomicU32 {
        match event {
            LinkEvent::Decoded => &self.decoded,
            LinkEvent::Malformed => &self.malformed,
            LinkEvent::ChecksumMismatch => &self.checksum_mismatch,
            LinkEvent::UnknownItem => &self.unknown_item,
            LinkEvent::TypeMismatch => &self.type_mismatch,
            LinkEvent::QueueFull => &self.queue_full,
            LinkEvent::RxOverrun => &self.rx_overrun,
            LinkEvent::Transmitted => &self.transmitted,
        }
    }

    #[inline]
    pub fn record(&self, event: LinkEvent) {
        self.counter(event).fetch_add(1, Ordering::Relaxed);
    }

    /// Classify and count a codec failure.
    pub fn record_decode_error(&self, err: &DecodeError) {
        match err {
            DecodeError::ChecksumMismatch { .. } => self.record(LinkEvent::ChecksumMismatch),
            _ => self.record(LinkEvent::Malformed),
        }
    }

    #[inline]
    pub fn get(&self, event: LinkEvent) -> u32 {
        self.counter(event).load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> LinkSnapshot {
        LinkSnapshot {
            decoded: self.get(LinkEvent::Decoded),
            malformed: self.get(LinkEvent::Malformed),
            checksum_mismatch: self.get(LinkEvent::ChecksumMismatch),
            unknown_item: self.get(LinkEvent::UnknownItem),
            type_mismatch: self.get(LinkEvent::TypeMismatch),
            queue_full: self.get(LinkEvent::QueueFull),
            rx_overrun: self.get(LinkEvent::RxOverrun),
            transmitted: self.get(LinkEvent::Transmitted),
        }
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of link counters at a point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub decoded: u32,
    pub malformed: u32,
    pub checksum_mismatch: u32,
    pub unknown_item: u32,
    pub type_mismatch: u32,
    pub queue_full: u32,
    pub rx_overrun: u32,
    pub transmitted: u32,
}

impl LinkSnapshot {
    /// Inbound lines that never reached an item.
    pub fn rx_failures(&self) -> u32 {
        self.malformed + self.checksum_mismatch + self.unknown_item + self.type_mismatch + self.rx_overrun
    }

    /// All dropped traffic, both directions.
    pub fn failures(&self) -> u32 {
        self.rx_failures() + self.queue_full
    }

    /// Counter growth since `earlier`.
    pub fn since(&self, earlier: &LinkSnapshot) -> LinkSnapshot {
        LinkSnapshot {
            decoded: self.decoded.wrapping_sub(earlier.decoded),
            malformed: self.malformed.wrapping_sub(earlier.malformed),
            checksum_mismatch: self.checksum_mismatch.wrapping_sub(earlier.checksum_mismatch),
            unknown_item: self.unknown_item.wrapping_sub(earlier.unknown_item),
            type_mismatch: self.type_mismatch.wrapping_sub(earlier.type_mismatch),
            queue_full: self.queue_full.wrapping_sub(earlier.queue_full),
            rx_overrun: self.rx_overrun.wrapping_sub(earlier.rx_overrun),
            transmitted: self.transmitted.wrapping_sub(earlier.transmitted),
        }
    }

    /// Share of inbound lines that failed, in percent. Zero with no traffic.
    pub fn rx_failure_pct(&self) -> f32 {
        let total = self.decoded + self.rx_failures();
        if total == 0 {
            0.0
        } else {
            self.rx_failures() as f32 * 100.0 / total as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_basic() {
        let stats = LinkStats::new();
        assert_eq!(stats.snapshot(), LinkSnapshot::default());

        stats.record(LinkEvent::Decoded);
        stats.record(LinkEvent::Decoded);
        stats.record(LinkEvent::UnknownItem);

        let snap = stats.snapshot();
        assert_eq!(snap.decoded, 2);
        assert_eq!(snap.unknown_item, 1);
        assert_eq!(snap.rx_failures(), 1);
    }

    #[test]
    fn test_decode_error_classification() {
        let stats = LinkStats::new();
        stats.record_decode_error(&DecodeError::MissingTag("N"));
        stats.record_decode_error(&DecodeError::ChecksumMismatch { declared: 0, computed: 1 });
        assert_eq!(stats.get(LinkEvent::Malformed), 1);
        assert_eq!(stats.get(LinkEvent::ChecksumMismatch), 1);
    }

    #[test]
    fn test_snapshot_delta_and_rate() {
        let stats = LinkStats::new();
        stats.record(LinkEvent::Decoded);
        let before = stats.snapshot();

        stats.record(LinkEvent::Decoded);
        stats.record(LinkEvent::Malformed);
        stats.record(LinkEvent::QueueFull);

        let delta = stats.snapshot().since(&before);
        assert_eq!(delta.decoded, 1);
        assert_eq!(delta.failures(), 2);
        assert!((delta.rx_failure_pct() - 50.0).abs() < f32::EPSILON);
    }
}
