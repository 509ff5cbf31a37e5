//! Synchronized items: typed variables replicated across a serial link.
//!
//! # Architecture
//!
//! ```text
//!            set()                              on_message()
//!              │                                     │
//!              ▼                                     ▼
//!         [TxShadow] ──tx_now()──▶ LinkHandle    [RxShadow]
//!              │                                     │
//!   On_Tx ─────┘ commit                  commit ─────┘ On_Rx
//!              ▼                                     ▼
//!         ValueCell (current value, change count, observers)
//!              │
//!              └──▶ PersistenceCache::save()
//! ```
//!
//! # Policies
//!
//! | RxTxType                    | transmits                               |
//! |-----------------------------|-----------------------------------------|
//! | Tx_Periodic                 | every period, unconditionally           |
//! | Tx_On_Change                | on every accepted local write           |
//! | Tx_On_Change_With_Heartbeat | both of the above                       |
//! | Rx_Only                     | never                                   |
//! | Rx_Echo_Value               | re-sends a received value that differs  |
//! |                             | from the TX shadow                      |
//!
//! Every policy subscribes to RX.
//!
//! # Rules
//!
//! - All state sits behind one reentrant lock per item, taken with a short
//!   timeout; on timeout the operation is skipped with a warning.
//! - Observers run after the inner state borrow ends, still under the lock,
//!   so they may read the item they were called from.
//! - Value observers see commits into the current value. RX observers see
//!   every change of the RX shadow, whatever the store policy.
//! - Lock order: item, then persistence record, then outbound queue.
//! - An item without a link is local: writes commit directly.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::cell::{Notification, ValueCell, ValueObserver};
use crate::codec::Message;
use crate::config::{PersistConfig, DEFAULT_PERIOD_MS};
use crate::element::{from_bytes, to_bytes, Char, Element, ElementType};
use crate::error::BuildError;
use crate::link::{LinkHandle, RxTarget};
use crate::persist::{KeyValueStore, LoadOutcome, PersistenceCache};
use crate::timer::{TimerHandle, TimerService};
use crate::validity::ValidityChecker;

/// Lock timeout of items without a link.
const LOCAL_LOCK_TIMEOUT: Duration = Duration::from_millis(10);

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// When an item transmits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RxTxType {
    TxPeriodic,
    TxOnChange,
    TxOnChangeWithHeartbeat,
    RxOnly,
    RxEchoValue,
}

impl RxTxType {
    fn transmits_on_change(self) -> bool {
        matches!(self, RxTxType::TxOnChange | RxTxType::TxOnChangeWithHeartbeat)
    }

    fn is_periodic(self) -> bool {
        matches!(self, RxTxType::TxPeriodic | RxTxType::TxOnChangeWithHeartbeat)
    }

    fn sends_at_setup(self) -> bool {
        matches!(
            self,
            RxTxType::TxPeriodic | RxTxType::TxOnChange | RxTxType::TxOnChangeWithHeartbeat
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RxTxType::TxPeriodic => "Tx_Periodic",
            RxTxType::TxOnChange => "Tx_On_Change",
            RxTxType::TxOnChangeWithHeartbeat => "Tx_On_Change_With_Heartbeat",
            RxTxType::RxOnly => "Rx_Only",
            RxTxType::RxEchoValue => "Rx_Echo_Value",
        }
    }
}

/// Which direction commits into the current value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStoreType {
    /// Commit only as a side effect of an actual transmission.
    OnTx,
    /// Commit whenever an inbound value is accepted.
    OnRx,
}

impl UpdateStoreType {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateStoreType::OnTx => "On_Tx",
            UpdateStoreType::OnRx => "On_Rx",
        }
    }
}

/// Outcome of a write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateStatus {
    /// Candidate differed from the value it was compared against.
    pub changed: bool,
    /// Candidate passed the validity checker.
    pub valid: bool,
    /// Current value was updated.
    pub committed: bool,
    /// A message was put on the outbound queue.
    pub queued: bool,
}

impl UpdateStatus {
    /// `changed && valid`.
    pub fn accepted(&self) -> bool {
        self.changed && self.valid
    }
}

struct ItemState<T: Element, const N: usize> {
    cell: ValueCell<T, N>,
    tx_shadow: [T; N],
    rx_shadow: [T; N],
    enabled: bool,
    periodic: Option<TimerHandle>,
}

type StateGuard<'a, T, const N: usize> = ReentrantMutexGuard<'a, RefCell<ItemState<T, N>>>;

/// Result of one transmission.
struct TxOutcome<T: Element, const N: usize> {
    queued: bool,
    committed: bool,
    note: Option<Notification<T, N>>,
}

/// A named, typed, fixed-arity variable kept consistent with a peer.
pub struct SyncItem<T: Element, const N: usize> {
    id: u64,
    name: String,
    rx_tx: RxTxType,
    store: UpdateStoreType,
    period: Duration,
    lock_timeout: Duration,
    initial: [T; N],
    state: ReentrantMutex<RefCell<ItemState<T, N>>>,
    rx_observers: Vec<Arc<dyn ValueObserver<T>>>,
    link: Option<LinkHandle>,
    timers: Option<Arc<TimerService>>,
    cache: Option<PersistenceCache>,
    self_ref: Weak<SyncItem<T, N>>,
}

/// Builder for [`SyncItem`].
pub struct SyncItemBuilder<T: Element, const N: usize> {
    name: String,
    initial: [T; N],
    rx_tx: RxTxType,
    store: UpdateStoreType,
    period: Duration,
    checker: ValidityChecker,
    link: Option<LinkHandle>,
    timers: Option<Arc<TimerService>>,
    persistence: Option<(Arc<dyn KeyValueStore>, PersistConfig)>,
    observers: Vec<Arc<dyn ValueObserver<T>>>,
    rx_observers: Vec<Arc<dyn ValueObserver<T>>>,
}

impl<T: Element, const N: usize> SyncItemBuilder<T, N> {
    pub fn policy(mut self, rx_tx: RxTxType, store: UpdateStoreType) -> Self {
        self.rx_tx = rx_tx;
        self.store = store;
        self
    }

    /// Period of Tx_Periodic and heartbeat transmissions.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn checker(mut self, checker: ValidityChecker) -> Self {
        self.checker = checker;
        self
    }

    pub fn link(mut self, link: LinkHandle) -> Self {
        self.link = Some(link);
        self
    }

    pub fn timers(mut self, timers: Arc<TimerService>) -> Self {
        self.timers = Some(timers);
        self
    }

    /// Persist the value under the item name.
    pub fn persist(mut self, store: Arc<dyn KeyValueStore>, config: PersistConfig) -> Self {
        self.persistence = Some((store, config));
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ValueObserver<T>>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Called whenever a different value arrives from the peer, before and
    /// independently of any commit. The count passed is the sender's change
    /// count, or 0 if the message carried none.
    pub fn rx_observer(mut self, observer: Arc<dyn ValueObserver<T>>) -> Self {
        self.rx_observers.push(observer);
        self
    }

    pub fn build(self) -> Result<Arc<SyncItem<T, N>>, BuildError> {
        if self.name.is_empty() {
            return Err(BuildError::EmptyName);
        }
        if self.link.is_some() && self.rx_tx.is_periodic() && self.timers.is_none() {
            return Err(BuildError::MissingTimers {
                item: self.name,
                purpose: "periodic transmission",
            });
        }

        let cache = match (self.persistence, &self.timers) {
            (Some((store, config)), Some(timers)) => Some(PersistenceCache::new(
                self.name.clone(),
                store,
                Arc::clone(timers),
                config,
            )),
            (Some(_), None) => {
                return Err(BuildError::MissingTimers {
                    item: self.name,
                    purpose: "persistence",
                })
            }
            (None, _) => None,
        };

        let mut cell = ValueCell::new(self.name.clone(), self.initial).with_checker(self.checker);
        for observer in self.observers {
            cell.add_observer(observer);
        }
        let lock_timeout = self
            .link
            .as_ref()
            .map_or(LOCAL_LOCK_TIMEOUT, |l| l.config().lock_timeout());

        Ok(Arc::new_cyclic(|self_ref| SyncItem {
            id: NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            rx_tx: self.rx_tx,
            store: self.store,
            period: self.period,
            lock_timeout,
            initial: self.initial,
            state: ReentrantMutex::new(RefCell::new(ItemState {
                cell,
                tx_shadow: self.initial,
                rx_shadow: self.initial,
                enabled: false,
                periodic: None,
            })),
            rx_observers: self.rx_observers,
            link: self.link,
            timers: self.timers,
            cache,
            self_ref: self_ref.clone(),
        }))
    }
}

impl<T: Element, const N: usize> SyncItem<T, N> {
    /// Start building an item. Defaults: Tx_On_Change, On_Tx, local.
    pub fn builder(name: impl Into<String>, initial: [T; N]) -> SyncItemBuilder<T, N> {
        SyncItemBuilder {
            name: name.into(),
            initial,
            rx_tx: RxTxType::TxOnChange,
            store: UpdateStoreType::OnTx,
            period: Duration::from_millis(DEFAULT_PERIOD_MS),
            checker: ValidityChecker::Unconfigured,
            link: None,
            timers: None,
            persistence: None,
            observers: Vec::new(),
            rx_observers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn rx_tx_type(&self) -> RxTxType {
        self.rx_tx
    }

    pub fn update_store_type(&self) -> UpdateStoreType {
        self.store
    }

    pub fn is_linked(&self) -> bool {
        self.link.is_some()
    }

    fn lock(&self) -> Option<StateGuard<'_, T, N>> {
        let guard = self.state.try_lock_for(self.lock_timeout);
        if guard.is_none() {
            warn!(item = %self.name, timeout_ms = self.lock_timeout.as_millis() as u64, "lock timeout, operation skipped");
        }
        guard
    }

    // ========================================
    // Lifecycle
    // ========================================

    /// One-time setup pass.
    ///
    /// Loads the persisted value, seeds both shadows from the current value,
    /// registers for RX, sends the initial frame for transmitting policies
    /// and starts the periodic timer. Calling it again is a no-op.
    ///
    /// # Returns
    ///
    /// `false` if the lock could not be taken or registration was refused.
    pub fn setup(&self) -> bool {
        let Some(guard) = self.lock() else {
            return false;
        };
        if guard.borrow().enabled {
            return true;
        }

        let loaded = self.load_persisted(&guard);

        {
            let mut st = guard.borrow_mut();
            let current = *st.cell.values();
            st.tx_shadow = current;
            st.rx_shadow = current;
        }

        let mut initial_tx = None;
        if let Some(link) = &self.link {
            let Some(me) = self.self_ref.upgrade() else {
                return false;
            };
            let target: Arc<dyn RxTarget> = me;
            if link.register_for_rx(self.id, &target).is_err() {
                return false;
            }

            let mut st = guard.borrow_mut();
            st.enabled = true;
            if self.rx_tx.sends_at_setup() {
                initial_tx = Some(self.tx_now(&mut st));
            }
            if self.rx_tx.is_periodic() {
                st.periodic = self.start_periodic();
            }
        } else {
            guard.borrow_mut().enabled = true;
        }

        if let Some(note) = loaded {
            note.deliver();
        }
        if let Some(note) = initial_tx.and_then(|tx| tx.note) {
            note.deliver();
        }

        info!(
            item = %self.name,
            policy = self.rx_tx.as_str(),
            store = self.store.as_str(),
            value = %guard.borrow().cell.value_as_string(),
            "item ready"
        );
        true
    }

    /// Stop periodic transmission, leave the RX registry and flush any
    /// pending persistence. Runs on drop as well.
    pub fn teardown(&self) {
        if let Some(guard) = self.lock() {
            let mut st = guard.borrow_mut();
            if let Some(timer) = st.periodic.take() {
                timer.cancel();
            }
            st.enabled = false;
        }
        if let Some(link) = &self.link {
            link.deregister_for_rx(&self.name, self.id);
        }
        if let Some(cache) = &self.cache {
            cache.flush();
        }
        debug!(item = %self.name, "torn down");
    }

    pub fn is_ready(&self) -> bool {
        self.lock().is_some_and(|g| g.borrow().enabled)
    }

    fn load_persisted(&self, guard: &StateGuard<'_, T, N>) -> Option<Notification<T, N>> {
        let cache = self.cache.as_ref()?;
        let mut st = guard.borrow_mut();
        let default = st.cell.initial_value_as_string();

        let mut committed = false;
        let outcome = cache.load(&default, |text| match T::parse_values(text, N) {
            Some(values) => match <[T; N]>::try_from(values) {
                Ok(values) if st.cell.is_valid(&values) => {
                    committed |= st.cell.commit(&values);
                    true
                }
                _ => false,
            },
            None => false,
        });
        debug!(item = %self.name, ?outcome, "persisted value loaded");
        if outcome == LoadOutcome::Failed {
            warn!(item = %self.name, "no usable persisted value, keeping initial");
        }
        committed.then(|| st.cell.notification())
    }

    fn start_periodic(&self) -> Option<TimerHandle> {
        let timers = self.timers.as_ref()?;
        let weak = self.self_ref.clone();
        Some(timers.schedule_periodic(self.period, move || {
            if let Some(item) = weak.upgrade() {
                item.periodic_tick();
            }
        }))
    }

    fn periodic_tick(&self) {
        let Some(guard) = self.lock() else {
            return;
        };
        let outcome = {
            let mut st = guard.borrow_mut();
            if !st.enabled {
                return;
            }
            self.tx_now(&mut st)
        };
        if let Some(note) = outcome.note {
            note.deliver();
        }
    }

    // ========================================
    // Reads
    // ========================================

    /// Current value and change count.
    pub fn get(&self) -> Option<([T; N], u32)> {
        self.lock().map(|g| g.borrow().cell.get())
    }

    pub fn change_count(&self) -> Option<u32> {
        self.lock().map(|g| g.borrow().cell.change_count())
    }

    /// Last value handed to the link.
    pub fn tx_shadow(&self) -> Option<[T; N]> {
        self.lock().map(|g| g.borrow().tx_shadow)
    }

    /// Last value received from the link.
    pub fn rx_shadow(&self) -> Option<[T; N]> {
        self.lock().map(|g| g.borrow().rx_shadow)
    }

    pub fn value_as_string(&self) -> Option<String> {
        self.lock().map(|g| g.borrow().cell.value_as_string())
    }

    pub fn initial_value_as_string(&self) -> String {
        T::format_values(&self.initial)
    }

    pub fn add_observer(&self, observer: Arc<dyn ValueObserver<T>>) {
        if let Some(guard) = self.lock() {
            guard.borrow_mut().cell.add_observer(observer);
        }
    }

    // ========================================
    // Writes
    // ========================================

    /// Write `values`. Returns `true` if the value changed and was valid.
    pub fn set(&self, values: &[T; N]) -> bool {
        self.update(values).accepted()
    }

    /// Write `values` and report what happened.
    ///
    /// Local items compare against and commit into the current value.
    /// Linked items compare against the TX shadow; whether the write is
    /// queued and committed depends on the policy.
    pub fn update(&self, values: &[T; N]) -> UpdateStatus {
        let Some(guard) = self.lock() else {
            return UpdateStatus::default();
        };

        let (status, note) = {
            let mut st = guard.borrow_mut();
            let mut status = UpdateStatus {
                valid: st.cell.is_valid(values),
                ..UpdateStatus::default()
            };

            if self.link.is_none() {
                status.changed = st.cell.values() != values;
                if !status.accepted() {
                    return status;
                }
                st.cell.commit(values);
                st.tx_shadow = *values;
                status.committed = true;
                self.persist(&st);
                (status, Some(st.cell.notification()))
            } else {
                status.changed = st.tx_shadow != *values;
                if !status.accepted() {
                    return status;
                }
                st.tx_shadow = *values;
                if !(self.rx_tx.transmits_on_change() && st.enabled) {
                    debug!(item = %self.name, "tx shadow updated, not sent now");
                    return status;
                }
                let tx = self.tx_now(&mut st);
                status.queued = tx.queued;
                status.committed = tx.committed;
                (status, tx.note)
            }
        };

        if let Some(note) = note {
            note.deliver();
        }
        status
    }

    /// Parse the canonical string form and [`update`](Self::update) with it.
    ///
    /// `None` if the text does not parse into exactly `N` elements.
    pub fn set_from_string(&self, text: &str) -> Option<UpdateStatus> {
        match T::parse_values(text, N).and_then(|v| <[T; N]>::try_from(v).ok()) {
            Some(values) => Some(self.update(&values)),
            None => {
                warn!(item = %self.name, text, "unparseable value");
                None
            }
        }
    }

    /// Write the initial value back through the normal path.
    pub fn reset_to_initial(&self) -> UpdateStatus {
        self.update(&self.initial)
    }

    /// Send the TX shadow now, committing it first under On_Tx.
    fn tx_now(&self, st: &mut ItemState<T, N>) -> TxOutcome<T, N> {
        let mut outcome = TxOutcome {
            queued: false,
            committed: false,
            note: None,
        };
        let Some(link) = &self.link else {
            return outcome;
        };

        if self.store == UpdateStoreType::OnTx {
            let shadow = st.tx_shadow;
            if st.cell.commit(&shadow) {
                outcome.committed = true;
                self.persist(st);
                outcome.note = Some(st.cell.notification());
            }
        }

        let message = Message::new(self.name.clone(), T::ELEMENT_TYPE, N, to_bytes(&st.tx_shadow))
            .with_change_count(st.cell.change_count());
        outcome.queued = link.send(&message).is_ok();
        outcome
    }

    fn persist(&self, st: &ItemState<T, N>) {
        if let Some(cache) = &self.cache {
            cache.save(&st.cell.value_as_string());
        }
    }

    // ========================================
    // Inbound
    // ========================================

    fn receive(&self, message: &Message) {
        let Some(values) = from_bytes::<T>(&message.payload).and_then(|v| <[T; N]>::try_from(v).ok()) else {
            warn!(item = %self.name, "payload does not decode to {} x {}", N, T::ELEMENT_TYPE);
            return;
        };
        if let Some(remote) = message.change_count {
            trace!(item = %self.name, remote, "inbound change count");
        }

        let Some(guard) = self.lock() else {
            return;
        };

        let (rx_note, commit_note, echo_note) = {
            let mut st = guard.borrow_mut();
            if !st.enabled {
                debug!(item = %self.name, "inbound before setup, ignored");
                return;
            }

            let mut rx_note = None;
            let mut commit_note = None;
            if st.rx_shadow != values {
                if !st.cell.is_valid(&values) {
                    warn!(item = %self.name, value = %T::format_values(&values), "inbound value rejected");
                    return;
                }
                st.rx_shadow = values;
                if !self.rx_observers.is_empty() {
                    let count = message.change_count.unwrap_or(0);
                    rx_note = Some(Notification::new(&self.name, values, count, &self.rx_observers));
                }
                if self.store == UpdateStoreType::OnRx && st.cell.commit(&values) {
                    self.persist(&st);
                    commit_note = Some(st.cell.notification());
                }
            }

            let mut echo_note = None;
            if self.rx_tx == RxTxType::RxEchoValue && st.rx_shadow != st.tx_shadow {
                st.tx_shadow = st.rx_shadow;
                echo_note = self.tx_now(&mut st).note;
            }
            (rx_note, commit_note, echo_note)
        };

        for note in [rx_note, commit_note, echo_note].into_iter().flatten() {
            note.deliver();
        }
    }
}

impl<T: Element> SyncItem<T, 1> {
    /// Scalar form of [`set`](SyncItem::set).
    pub fn set_value(&self, value: T) -> bool {
        self.set(&[value])
    }

    /// Scalar form of [`get`](SyncItem::get).
    pub fn value(&self) -> Option<T> {
        self.get().map(|(v, _)| v[0])
    }
}

impl<const N: usize> SyncItem<Char, N> {
    /// Write text; `false` if it does not fit in `N` bytes.
    pub fn set_str(&self, text: &str) -> bool {
        match Char::array_from_str::<N>(text) {
            Some(values) => self.set(&values),
            None => {
                warn!(item = %self.name, len = text.len(), max = N, "text too long");
                false
            }
        }
    }

    pub fn get_str(&self) -> Option<String> {
        self.get().map(|(v, _)| Char::slice_to_string(&v))
    }
}

impl<T: Element, const N: usize> RxTarget for SyncItem<T, N> {
    fn name(&self) -> &str {
        &self.name
    }

    fn element_type(&self) -> ElementType {
        T::ELEMENT_TYPE
    }

    fn count(&self) -> usize {
        N
    }

    fn on_message(&self, message: &Message) {
        self.receive(message);
    }
}

impl<T: Element, const N: usize> Drop for SyncItem<T, N> {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().get_mut().periodic.take() {
            timer.cancel();
        }
        if let Some(link) = &self.link {
            link.deregister_for_rx(&self.name, self.id);
        }
        if let Some(cache) = &self.cache {
            cache.flush();
        }
    }
}

/// Type-erased view of an item for directories and the console.
pub trait DynItem: Send + Sync {
    fn name(&self) -> &str;
    fn element_type(&self) -> ElementType;
    fn count(&self) -> usize;
    fn rx_tx_type(&self) -> RxTxType;
    fn update_store_type(&self) -> UpdateStoreType;
    fn value_string(&self) -> Option<String>;
    fn initial_string(&self) -> String;
    fn change_count(&self) -> Option<u32>;
    /// `None` if the text does not parse.
    fn set_string(&self, text: &str) -> Option<UpdateStatus>;
    fn reset(&self) -> UpdateStatus;
    fn setup(&self) -> bool;
    fn teardown(&self);
}

impl<T: Element, const N: usize> DynItem for SyncItem<T, N> {
    fn name(&self) -> &str {
        &self.name
    }

    fn element_type(&self) -> ElementType {
        T::ELEMENT_TYPE
    }

    fn count(&self) -> usize {
        N
    }

    fn rx_tx_type(&self) -> RxTxType {
        self.rx_tx
    }

    fn update_store_type(&self) -> UpdateStoreType {
        self.store
    }

    fn value_string(&self) -> Option<String> {
        SyncItem::value_as_string(self)
    }

    fn initial_string(&self) -> String {
        SyncItem::initial_value_as_string(self)
    }

    fn change_count(&self) -> Option<u32> {
        SyncItem::change_count(self)
    }

    fn set_string(&self, text: &str) -> Option<UpdateStatus> {
        self.set_from_string(text)
    }

    fn reset(&self) -> UpdateStatus {
        self.reset_to_initial()
    }

    fn setup(&self) -> bool {
        SyncItem::setup(self)
    }

    fn teardown(&self) {
        SyncItem::teardown(self)
    }
}
