//! Chrono: the shared timer service.
//!
//! A `Chrono` drives an ordered expiry queue from a dedicated host thread so
//! device models can schedule callbacks without blocking their caller. It
//! provides:
//! 1. **Scheduling:** `timer_set` arms a callback no earlier than `now + us`
//!    host microseconds; callbacks may return [`TimerAction::Restart`] for
//!    periodic re-arm without drift.
//! 2. **Lifecycle:** Run/Pause/Stop transitions signalled through the
//!    condition variable; Stop joins the thread; on exit every still-active
//!    timer's callback is invoked once with [`TimerSignal::Exited`] so
//!    resources can be released.
//! 3. **Record reuse:** Timer ids come from a free list, so records recycle
//!    without growing the id space.
//!
//! Cancelling a timer whose callback is currently executing is guarded
//! under the lock: the id stays findable while the callback runs, and a
//! cancel in that window marks the record dead so a restart is suppressed.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, trace};

use crate::common::sem::lock_unpoisoned;
use crate::common::{Error, Result, host};

/// Outcome of a timer callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerAction {
    /// The timer is finished; release the record.
    Done,
    /// Re-arm for another period of the original duration.
    Restart,
}

/// Why a timer callback is being invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerSignal {
    /// The deadline passed.
    Fired,
    /// The service is shutting down; the timer will not fire.
    Exited,
}

/// A timer callback. Runs on the chrono thread, outside the chrono lock.
pub type TimerCallback = Box<dyn FnMut(TimerSignal) -> TimerAction + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChronoState {
    Stopped,
    Running,
    Paused,
    Exiting,
}

struct TimerRec {
    id: u64,
    expiry: u64,
    reset_value: u64,
    callback: TimerCallback,
}

struct ChronoInner {
    state: ChronoState,
    /// Sorted by expiry, earliest first.
    active: Vec<TimerRec>,
    /// Recycled timer ids.
    unused_ids: Vec<u64>,
    /// Ids whose callbacks are currently executing outside the lock.
    firing: Vec<u64>,
    /// Ids cancelled while firing; their restart is suppressed.
    fired_cancelled: Vec<u64>,
    next_id: u64,
}

impl ChronoInner {
    fn alloc_id(&mut self) -> u64 {
        if let Some(id) = self.unused_ids.pop() {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert_sorted(&mut self, rec: TimerRec) {
        let pos = self.active.partition_point(|t| t.expiry <= rec.expiry);
        self.active.insert(pos, rec);
    }
}

/// Ordered timer queue served by a dedicated thread.
pub struct Chrono {
    name: String,
    inner: Mutex<ChronoInner>,
    cond: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
    this: std::sync::Weak<Self>,
}

impl Chrono {
    /// Creates a stopped chrono service.
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name: name.to_owned(),
            inner: Mutex::new(ChronoInner {
                state: ChronoState::Stopped,
                active: Vec::new(),
                unused_ids: Vec::new(),
                firing: Vec::new(),
                fired_cancelled: Vec::new(),
                next_id: 1,
            }),
            cond: Condvar::new(),
            thread: Mutex::new(None),
            this: this.clone(),
        })
    }

    /// Returns the service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedules `callback` to fire no earlier than `us` microseconds from
    /// now. Returns the timer id.
    pub fn timer_set(
        &self,
        us: u64,
        callback: impl FnMut(TimerSignal) -> TimerAction + Send + 'static,
    ) -> Result<u64> {
        let now = host::time_us();
        let mut inner = lock_unpoisoned(&self.inner);
        let id = inner.alloc_id();
        inner.insert_sorted(TimerRec {
            id,
            expiry: now + us,
            reset_value: us,
            callback: Box::new(callback),
        });
        self.cond.notify_one();
        trace!(chrono = %self.name, id, us, "timer set");
        Ok(id)
    }

    /// Reports the remaining time of a pending timer in microseconds.
    pub fn timer_get_remaining(&self, id: u64) -> Result<u64> {
        let now = host::time_us();
        let inner = lock_unpoisoned(&self.inner);
        let t = inner
            .active
            .iter()
            .find(|t| t.id == id)
            .ok_or(Error::NotFound)?;
        Ok(t.expiry.saturating_sub(now))
    }

    /// Removes a pending timer.
    ///
    /// If the timer's callback is executing right now, the record is marked
    /// dead under the lock so a requested restart never happens.
    pub fn timer_cancel(&self, id: u64) -> Result<()> {
        let mut inner = lock_unpoisoned(&self.inner);
        if let Some(pos) = inner.active.iter().position(|t| t.id == id) {
            let _ = inner.active.remove(pos);
            inner.unused_ids.push(id);
            self.cond.notify_one();
            return Ok(());
        }
        if inner.firing.contains(&id) {
            inner.fired_cancelled.push(id);
            return Ok(());
        }
        Err(Error::NotFound)
    }

    /// Starts the service thread, or resumes it from pause.
    pub fn run(&self) -> Result<()> {
        let mut inner = lock_unpoisoned(&self.inner);
        match inner.state {
            ChronoState::Paused => {
                inner.state = ChronoState::Running;
                self.cond.notify_one();
                return Ok(());
            }
            ChronoState::Stopped => {}
            _ => return Err(Error::State),
        }
        inner.state = ChronoState::Running;
        drop(inner);

        let this = self.this.upgrade().ok_or(Error::State)?;
        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || this.thread_main())
            .map_err(|_| {
                lock_unpoisoned(&self.inner).state = ChronoState::Stopped;
                Error::State
            })?;
        *lock_unpoisoned(&self.thread) = Some(handle);
        Ok(())
    }

    /// Pauses the service; pending timers keep their deadlines.
    pub fn pause(&self) -> Result<()> {
        let mut inner = lock_unpoisoned(&self.inner);
        if inner.state != ChronoState::Running {
            return Err(Error::State);
        }
        inner.state = ChronoState::Paused;
        self.cond.notify_one();
        Ok(())
    }

    /// Stops the service and joins its thread. Active timers receive one
    /// `Exited` callback.
    pub fn stop(&self) -> Result<()> {
        {
            let mut inner = lock_unpoisoned(&self.inner);
            match inner.state {
                ChronoState::Running | ChronoState::Paused | ChronoState::Exiting => {
                    inner.state = ChronoState::Exiting;
                    self.cond.notify_one();
                }
                ChronoState::Stopped => return Err(Error::State),
            }
        }
        let handle = lock_unpoisoned(&self.thread).take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        lock_unpoisoned(&self.inner).state = ChronoState::Stopped;
        Ok(())
    }

    fn thread_main(self: Arc<Self>) {
        debug!(chrono = %self.name, "chrono thread started");
        let mut inner = lock_unpoisoned(&self.inner);
        loop {
            match inner.state {
                ChronoState::Running => inner = self.run_state(inner),
                ChronoState::Paused => {
                    inner = match self.cond.wait(inner) {
                        Ok(g) => g,
                        Err(p) => p.into_inner(),
                    };
                }
                ChronoState::Exiting | ChronoState::Stopped => break,
            }
        }

        // Drain the live queue: every still-active timer learns the service
        // is going away.
        let mut active = std::mem::take(&mut inner.active);
        drop(inner);
        for t in &mut active {
            let _ = (t.callback)(TimerSignal::Exited);
        }
        let mut inner = lock_unpoisoned(&self.inner);
        for t in active {
            inner.unused_ids.push(t.id);
        }
        debug!(chrono = %self.name, "chrono thread exited");
    }

    /// The Running-state loop. Entered and left with the lock held.
    fn run_state<'a>(
        &'a self,
        mut inner: MutexGuard<'a, ChronoInner>,
    ) -> MutexGuard<'a, ChronoInner> {
        while inner.state == ChronoState::Running {
            let now = host::time_us();

            let split = inner.active.partition_point(|t| t.expiry <= now);
            let mut expired: Vec<TimerRec> = inner.active.drain(..split).collect();
            let next_exp = inner.active.first().map(|t| t.expiry);

            if expired.is_empty() {
                inner = match next_exp {
                    None => match self.cond.wait(inner) {
                        Ok(g) => g,
                        Err(p) => p.into_inner(),
                    },
                    Some(exp) => {
                        let timeout = Duration::from_micros(exp - now);
                        match self.cond.wait_timeout(inner, timeout) {
                            Ok((g, _)) => g,
                            Err(p) => p.into_inner().0,
                        }
                    }
                };
                continue;
            }

            inner.firing.extend(expired.iter().map(|t| t.id));
            drop(inner);

            let mut restart = Vec::new();
            let mut done = Vec::new();
            for mut t in expired.drain(..) {
                match (t.callback)(TimerSignal::Fired) {
                    TimerAction::Restart => {
                        t.expiry += t.reset_value;
                        restart.push(t);
                    }
                    TimerAction::Done => done.push(t.id),
                }
            }

            inner = lock_unpoisoned(&self.inner);
            for t in restart {
                if inner.fired_cancelled.contains(&t.id) {
                    inner.unused_ids.push(t.id);
                } else {
                    inner.insert_sorted(t);
                }
            }
            inner.unused_ids.extend(done);
            inner.firing.clear();
            inner.fired_cancelled.clear();
        }
        inner
    }
}

impl Drop for Chrono {
    fn drop(&mut self) {
        let state = lock_unpoisoned(&self.inner).state;
        if state != ChronoState::Stopped {
            let _ = self.stop();
        }
    }
}
