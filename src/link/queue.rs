//! Bounded outbound queue (many producers, one consumer).
//!
//! # Rules
//!
//! - Push never waits: a full queue drops the message and counts it.
//! - Only the TX task drains.

use std::collections::VecDeque;

use parking_lot::Mutex;

pub struct OutboundQueue {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Queue an encoded line.
    ///
    /// Returns `true` if queued, `false` if dropped (queue full).
    pub fn push(&self, line: String) -> bool {
        let mut lines = self.lines.lock();
        if lines.len() >= self.capacity {
            return false;
        }
        lines.push_back(line);
        true
    }

    /// Take the oldest line.
    pub fn drain(&self) -> Option<String> {
        self.lines.lock().pop_front()
    }

    /// Take everything queued so far, oldest first.
    pub fn drain_all(&self) -> Vec<String> {
        self.lines.lock().drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn has_entries(&self) -> bool {
        !self.lines.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_basic() {
        let queue = OutboundQueue::new(4);
        assert!(queue.push("a".into()));
        assert!(queue.has_entries());
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.drain().as_deref(), Some("a"));
        assert!(!queue.has_entries());
    }

    #[test]
    fn test_queue_full_drops() {
        let queue = OutboundQueue::new(2);
        assert!(queue.push("1".into()));
        assert!(queue.push("2".into()));
        assert!(!queue.push("3".into()));
        assert_eq!(queue.pending(), 2);

        queue.drain();
        assert!(queue.push("4".into()));
        assert_eq!(queue.drain_all(), vec!["2".to_string(), "4".to_string()]);
    }

    #[test]
    fn test_queue_multiple_producers() {
        use std::sync::Arc;
        use std::thread;

        let queue = Arc::new(OutboundQueue::new(64));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for j in 0..10 {
                        queue.push(format!("T{}-{}", i, j));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.pending(), 40);
    }
}
