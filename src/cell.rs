//! Typed, fixed-arity value storage with change notification.
//!
//! A [`ValueCell`] holds the current and initial value of one named array,
//! a change counter, a validity checker and a list of observers. It carries
//! no lock of its own; the owner decides how it is shared.
//!
//! # Rules
//!
//! - A write is accepted only if it differs from the current value and
//!   every validation unit passes the checker.
//! - Only an accepted write bumps the change count.
//! - Observers run synchronously on the writer's thread and must not block.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::element::Element;
use crate::validity::ValidityChecker;

/// Receiver of accepted value changes.
pub trait ValueObserver<T>: Send + Sync {
    fn on_new_value(&self, name: &str, values: &[T], change_count: u32);
}

impl<T, F> ValueObserver<T> for F
where
    F: Fn(&str, &[T], u32) + Send + Sync,
{
    fn on_new_value(&self, name: &str, values: &[T], change_count: u32) {
        self(name, values, change_count)
    }
}

/// `true` if `candidate` is a later change count than `current`.
///
/// Serial-number comparison: a candidate less than half the counter range
/// ahead (mod 2^32) is newer, so the order survives wraparound.
pub fn is_newer(current: u32, candidate: u32) -> bool {
    let ahead = candidate.wrapping_sub(current);
    ahead != 0 && ahead <= u32::MAX / 2
}

/// Pending observer fan-out, taken while the value is locked and delivered
/// after any inner borrow is released.
pub(crate) struct Notification<T: Element, const N: usize> {
    name: String,
    values: [T; N],
    change_count: u32,
    observers: Vec<Arc<dyn ValueObserver<T>>>,
}

impl<T: Element, const N: usize> Notification<T, N> {
    pub(crate) fn new(
        name: &str,
        values: [T; N],
        change_count: u32,
        observers: &[Arc<dyn ValueObserver<T>>],
    ) -> Self {
        Self {
            name: name.to_string(),
            values,
            change_count,
            observers: observers.to_vec(),
        }
    }

    pub(crate) fn deliver(self) {
        for observer in &self.observers {
            observer.on_new_value(&self.name, &self.values, self.change_count);
        }
    }
}

pub struct ValueCell<T: Element, const N: usize> {
    name: String,
    values: [T; N],
    initial: [T; N],
    change_count: u32,
    checker: ValidityChecker,
    observers: Vec<Arc<dyn ValueObserver<T>>>,
}

impl<T: Element, const N: usize> ValueCell<T, N> {
    /// Create a cell holding `initial`.
    pub fn new(name: impl Into<String>, initial: [T; N]) -> Self {
        Self {
            name: name.into(),
            values: initial,
            initial,
            change_count: 0,
            checker: ValidityChecker::Unconfigured,
            observers: Vec::new(),
        }
    }

    pub fn with_checker(mut self, checker: ValidityChecker) -> Self {
        self.checker = checker;
        self
    }

    /// Resume counting from `count` instead of zero.
    pub fn with_change_count(mut self, count: u32) -> Self {
        self.change_count = count;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value and its change count.
    pub fn get(&self) -> ([T; N], u32) {
        (self.values, self.change_count)
    }

    pub fn values(&self) -> &[T; N] {
        &self.values
    }

    pub fn initial(&self) -> &[T; N] {
        &self.initial
    }

    pub fn change_count(&self) -> u32 {
        self.change_count
    }

    pub fn checker(&self) -> &ValidityChecker {
        &self.checker
    }

    pub fn add_observer(&mut self, observer: Arc<dyn ValueObserver<T>>) {
        self.observers.push(observer);
    }

    /// Write `values`, notifying observers if accepted.
    ///
    /// # Returns
    ///
    /// `true` if the value changed and passed validation.
    pub fn set(&mut self, values: &[T; N]) -> bool {
        if !self.is_valid(values) {
            debug!(item = %self.name, value = %T::format_values(values), "rejected by validity check");
            return false;
        }
        if !self.commit(values) {
            return false;
        }
        self.notification().deliver();
        true
    }

    /// Parse the canonical string form and [`set`](Self::set) it.
    pub fn set_from_string(&mut self, text: &str) -> bool {
        match self.parse(text) {
            Some(values) => self.set(&values),
            None => {
                warn!(item = %self.name, text, "unparseable value");
                false
            }
        }
    }

    /// Restore the initial value through the normal write path.
    pub fn reset_to_initial(&mut self) -> bool {
        let initial = self.initial;
        self.set(&initial)
    }

    pub fn value_as_string(&self) -> String {
        T::format_values(&self.values)
    }

    pub fn initial_value_as_string(&self) -> String {
        T::format_values(&self.initial)
    }

    /// Parse text into a full array without touching the cell.
    pub fn parse(&self, text: &str) -> Option<[T; N]> {
        T::parse_values(text, N).and_then(|v| v.try_into().ok())
    }

    pub fn is_valid(&self, values: &[T; N]) -> bool {
        self.checker.all_valid(&T::validation_units(values))
    }

    /// Store `values` if different, bumping the change count. No validation
    /// and no notification.
    pub(crate) fn commit(&mut self, values: &[T; N]) -> bool {
        if self.values == *values {
            return false;
        }
        self.values = *values;
        self.change_count = self.change_count.wrapping_add(1);
        true
    }

    pub(crate) fn notification(&self) -> Notification<T, N> {
        Notification {
            name: self.name.clone(),
            values: self.values,
            change_count: self.change_count,
            observers: self.observers.clone(),
        }
    }
}
