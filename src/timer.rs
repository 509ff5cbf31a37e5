//! Software timer service.
//!
//! # Architecture
//!
//! ```text
//! schedule_*() ──▶ [deadline heap] ──▶ timer thread ──▶ callback()
//!   any thread       Mutex+Condvar      sleeps until     lock released
//!                                       next deadline    before the call
//! ```
//!
//! # Rules
//!
//! - Callbacks run on the timer thread with no service lock held, so a
//!   callback may schedule or cancel timers.
//! - Periodic timers are rescheduled before their callback runs; a slow
//!   callback delays the next firing but never stacks them up.
//! - Cancelling is idempotent. A cancelled timer never fires again, though a
//!   call already in flight completes.

use std::collections::{BinaryHeap, HashMap};
use std::cmp::Reverse;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

type OnceCallback = Box<dyn FnOnce() + Send>;
type PeriodicCallback = Arc<dyn Fn() + Send + Sync>;

enum Callback {
    Once(OnceCallback),
    Periodic(PeriodicCallback, Duration),
}

#[derive(Default)]
struct TimerState {
    deadlines: BinaryHeap<Reverse<(Instant, u64)>>,
    callbacks: HashMap<u64, Callback>,
    next_id: u64,
    shutdown: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    wake: Condvar,
}

impl TimerShared {
    fn cancel(&self, id: u64) -> bool {
        self.state.lock().callbacks.remove(&id).is_some()
    }

    fn is_scheduled(&self, id: u64) -> bool {
        self.state.lock().callbacks.contains_key(&id)
    }
}

/// Handle to one scheduled timer.
///
/// Dropping the handle does not cancel the timer.
pub struct TimerHandle {
    id: u64,
    shared: Weak<TimerShared>,
}

impl TimerHandle {
    /// Stop the timer. Returns `true` if it was still scheduled.
    pub fn cancel(&self) -> bool {
        self.shared.upgrade().is_some_and(|s| s.cancel(self.id))
    }

    /// `true` while the timer can still fire.
    pub fn is_active(&self) -> bool {
        self.shared.upgrade().is_some_and(|s| s.is_scheduled(self.id))
    }
}

/// Dedicated timer thread running one-shot and periodic callbacks.
pub struct TimerService {
    shared: Arc<TimerShared>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl TimerService {
    /// Spawn the timer thread.
    pub fn start() -> std::io::Result<Self> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState::default()),
            wake: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("timer".into())
            .spawn(move || run(&worker_shared))?;
        let worker_id = worker.thread().id();

        Ok(Self {
            shared,
            worker: Some(worker),
            worker_id,
        })
    }

    /// Run `callback` once after `delay`.
    pub fn schedule_once<F>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.insert(delay, Callback::Once(Box::new(callback)))
    }

    /// Run `callback` every `period`, first after one period.
    pub fn schedule_periodic<F>(&self, period: Duration, callback: F) -> TimerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.insert(period, Callback::Periodic(Arc::new(callback), period))
    }

    fn insert(&self, delay: Duration, callback: Callback) -> TimerHandle {
        let mut state = self.shared.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.callbacks.insert(id, callback);
        state.deadlines.push(Reverse((Instant::now() + delay, id)));
        drop(state);
        self.shared.wake.notify_one();

        TimerHandle {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Number of timers still scheduled.
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().callbacks.len()
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.wake.notify_all();
        // The last owner may be a callback running on the timer thread itself.
        if thread::current().id() == self.worker_id {
            return;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

enum Due {
    Once(OnceCallback),
    Periodic(PeriodicCallback),
}

fn run(shared: &TimerShared) {
    debug!("timer service started");
    loop {
        let due = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    debug!("timer service stopped");
                    return;
                }
                let Some(&Reverse((deadline, id))) = state.deadlines.peek() else {
                    shared.wake.wait(&mut state);
                    continue;
                };
                if !state.callbacks.contains_key(&id) {
                    // Cancelled.
                    state.deadlines.pop();
                    continue;
                }
                let now = Instant::now();
                if deadline > now {
                    shared.wake.wait_until(&mut state, deadline);
                    continue;
                }
                state.deadlines.pop();
                match state.callbacks.remove(&id) {
                    Some(Callback::Once(f)) => break Due::Once(f),
                    Some(Callback::Periodic(f, period)) => {
                        let next = (deadline + period).max(now);
                        state.callbacks.insert(id, Callback::Periodic(Arc::clone(&f), period));
                        state.deadlines.push(Reverse((next, id)));
                        break Due::Periodic(f);
                    }
                    None => continue,
                }
            }
        };

        match due {
            Due::Once(f) => f(),
            Due::Periodic(f) => f(),
        }
    }
}
