//! Worker: the single-threaded loop that owns an engine.
//!
//! Each worker owns one steppable core, an event queue fed by other
//! threads, and a fixed table of event endpoints. The loop:
//! 1. Drains pending events, non-blocking while the engine is runnable,
//!    blocking on the queue's condition variable while it is not (WFI).
//! 2. Dispatches each event to its endpoint; engine-bound events are
//!    delivered directly to the owned core, callback events invoke their
//!    closure.
//! 3. Posts completion semaphores, then steps the engine in bounded
//!    batches.
//!
//! The worker thread is the sole mutator of the core and of endpoint-owned
//! state; producers only touch the queue under its lock. On exit, queued
//! events are drained without dispatch and their waiters released.

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::common::{Error, Result};
use crate::engine::{self, EngineCore, WorkerLink};
use crate::event::{EP_CALLBACK, Event, EventEndpoint, EventKind, EventQueue};

/// Size of a worker's endpoint table.
pub const WORKER_MAX_EPS: usize = 64;

/// Number of instructions dispatched between event-queue polls.
const STEP_BATCH: u64 = 64;

enum EpSlot {
    Empty,
    Engine,
    Endpoint(Arc<dyn EventEndpoint>),
}

/// A single host thread's worth of simulation: one engine plus its event
/// queue and endpoint table.
pub struct Worker {
    name: String,
    queue: Arc<EventQueue>,
    endpoints: Vec<EpSlot>,
    core: Option<Box<dyn EngineCore>>,
    engine_epid: u32,
}

/// A running worker thread. Joining returns the worker and its final
/// status.
pub struct WorkerThread {
    handle: JoinHandle<(Worker, Result<()>)>,
}

impl WorkerThread {
    /// Waits for the worker loop to finish and reclaims the worker.
    pub fn join(self) -> (Worker, Result<()>) {
        match self.handle.join() {
            Ok(r) => r,
            Err(_) => {
                warn!("worker thread panicked");
                // The worker is lost with the panicking thread; surface a
                // state error to the caller.
                (Worker::new("poisoned"), Err(Error::State))
            }
        }
    }
}

impl Worker {
    /// Creates a worker with an empty endpoint table and no engine.
    pub fn new(name: &str) -> Self {
        let mut endpoints = Vec::with_capacity(WORKER_MAX_EPS);
        endpoints.resize_with(WORKER_MAX_EPS, || EpSlot::Empty);
        Self {
            name: name.to_owned(),
            queue: EventQueue::new(),
            endpoints,
            core: None,
            engine_epid: u32::MAX,
        }
    }

    /// Returns the worker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the shared event queue.
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Registers an event endpoint, returning its assigned id.
    ///
    /// Ids are stable for the lifetime of the worker.
    pub fn add_event_endpoint(&mut self, ep: Arc<dyn EventEndpoint>) -> Result<u32> {
        let id = self.alloc_slot()?;
        self.endpoints[id as usize] = EpSlot::Endpoint(ep);
        Ok(id)
    }

    /// Attaches the engine core this worker drives.
    ///
    /// The core's engine is linked back to this worker's queue so device
    /// context can reach the loop.
    pub fn add_engine(&mut self, core: Box<dyn EngineCore>) -> Result<u32> {
        if self.core.is_some() {
            return Err(Error::Busy);
        }
        let id = self.alloc_slot()?;
        self.endpoints[id as usize] = EpSlot::Engine;
        core.engine().attach(WorkerLink {
            queue: Arc::clone(&self.queue),
            epid: id,
        });
        self.engine_epid = id;
        self.core = Some(core);
        Ok(id)
    }

    /// Builds a link other producers (devices) can use to reach an
    /// endpoint on this worker.
    pub fn link_for(&self, epid: u32) -> WorkerLink {
        WorkerLink {
            queue: Arc::clone(&self.queue),
            epid,
        }
    }

    /// Returns the owned core for inspection, or `State` if none is
    /// attached. Only valid while the worker loop is not running.
    pub fn core(&self) -> Result<&dyn EngineCore> {
        self.core.as_deref().ok_or(Error::State)
    }

    /// Mutable access to the owned core. Only valid while the worker loop
    /// is not running.
    pub fn core_mut(&mut self) -> Result<&mut (dyn EngineCore + 'static)> {
        match self.core.as_deref_mut() {
            Some(c) => Ok(c),
            None => Err(Error::State),
        }
    }

    fn alloc_slot(&mut self) -> Result<u32> {
        for (i, slot) in self.endpoints.iter().enumerate() {
            if matches!(slot, EpSlot::Empty) {
                return Ok(i as u32);
            }
        }
        Err(Error::Full)
    }

    fn dispatch_event(&mut self, mut ev: Event) -> Result<()> {
        let signal = ev.signal.take();
        let result = if ev.epid == EP_CALLBACK {
            match ev.kind {
                EventKind::Callback(f) => f(),
                _ => Err(Error::Arg),
            }
        } else if ev.epid == self.engine_epid {
            match self.core.as_deref_mut() {
                Some(core) => engine::handle_engine_event(core, ev),
                None => Err(Error::State),
            }
        } else {
            match self.endpoints.get(ev.epid as usize) {
                Some(EpSlot::Endpoint(ep)) => Arc::clone(ep).handle_event(ev),
                _ => Err(Error::Arg),
            }
        };
        if let Some(sem) = signal {
            sem.post();
        }
        result
    }

    /// Drains and dispatches events.
    ///
    /// While the engine is not runnable this blocks until events arrive,
    /// re-checking runnability after each batch. While runnable it only
    /// takes the queue lock when the racy probe says entries exist.
    pub fn handle_events(&mut self) -> Result<()> {
        let runnable = self.core.as_ref().is_some_and(|c| c.engine().is_runnable());
        if runnable && self.queue.maybe_has_events() {
            for ev in self.queue.drain(false) {
                self.dispatch_event(ev)?;
            }
        }

        loop {
            let runnable = self.core.as_ref().is_some_and(|c| c.engine().is_runnable());
            if runnable {
                return Ok(());
            }
            for ev in self.queue.drain(true) {
                self.dispatch_event(ev)?;
            }
        }
    }

    /// Advances the engine by up to `num` instructions, servicing events
    /// between bounded batches.
    pub fn step(&mut self, num: u64) -> Result<()> {
        if self.core.is_none() {
            return Err(Error::State);
        }
        let mut remaining = num;
        let result = loop {
            if remaining == 0 {
                break Ok(());
            }
            if let Err(e) = self.handle_events() {
                break Err(e);
            }
            match self.step_batch(remaining.min(STEP_BATCH)) {
                Ok(done) => remaining -= done,
                Err(e) => break Err(e),
            }
        };
        if result == Err(Error::Exited) {
            self.drain_without_dispatch();
        }
        result
    }

    /// Runs the engine until it faults or exits.
    pub fn run(&mut self) -> Result<()> {
        if self.core.is_none() {
            return Err(Error::State);
        }
        let result = loop {
            if let Err(e) = self.handle_events() {
                break Err(e);
            }
            if let Err(e) = self.step_batch(STEP_BATCH) {
                break Err(e);
            }
        };
        debug!(worker = %self.name, ?result, "worker loop finished");
        if result == Err(Error::Exited) {
            self.drain_without_dispatch();
        }
        result
    }

    /// Dispatches up to `num` instructions, stopping early when the engine
    /// leaves the runnable state or new events arrive. Returns the count
    /// actually dispatched.
    fn step_batch(&mut self, num: u64) -> Result<u64> {
        let Some(core) = self.core.as_deref_mut() else {
            return Err(Error::State);
        };
        let mut done = 0;
        while done < num {
            if !core.engine().is_runnable() {
                break;
            }
            core.step()?;
            done += 1;
            if self.queue.maybe_has_events() {
                break;
            }
        }
        Ok(done)
    }

    /// Releases waiters of any still-queued events without dispatching
    /// them.
    fn drain_without_dispatch(&mut self) {
        for mut ev in self.queue.drain(false) {
            if let Some(sem) = ev.signal.take() {
                sem.post();
            }
        }
    }

    /// Moves the worker onto its own host thread running [`run`](Self::run).
    pub fn thread_run(mut self) -> Result<WorkerThread> {
        if self.core.is_none() {
            return Err(Error::State);
        }
        let name = self.name.clone();
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                let status = self.run();
                (self, status)
            })
            .map_err(|_| Error::State)?;
        Ok(WorkerThread { handle })
    }
}
