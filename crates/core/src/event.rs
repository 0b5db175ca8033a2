//! Events and the asynchronous event queue.
//!
//! Events are the only way state crosses into a worker thread: interrupt
//! transitions, run-mode commands, mapper updates, and ad-hoc callbacks are
//! all tagged messages enqueued here and handled by the consuming worker.
//! The queue provides:
//! 1. **FIFO delivery:** Events from one producer are handled in submission
//!    order.
//! 2. **Blocking drain:** The worker sleeps on the queue's condition
//!    variable while its engine is not runnable.
//! 3. **Completion waits:** A producer may block on the event's semaphore
//!    until the handler has run.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::common::sem::lock_unpoisoned;
use crate::common::{Result, Semaphore};
use crate::mapper::MapperUpdate;

/// Endpoint id reserved for callback events; such events are not routed
/// through the endpoint table.
pub const EP_CALLBACK: u32 = u32::MAX;

/// Engine run-mode commands carried by [`EventKind::Command`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunCommand {
    /// Leave WFI and resume dispatch.
    Run,
    /// Enter WFI until further notice.
    Halt,
    /// Terminate the worker loop.
    Exit,
}

/// Payload of an event.
pub enum EventKind {
    /// Interrupt line transition destined for an engine.
    Irq {
        /// Line number at the engine endpoint.
        num: u32,
        /// New level.
        high: bool,
    },
    /// Run-mode command for an engine.
    Command(RunCommand),
    /// Mapper reconfiguration destined for a device endpoint.
    MapperUpdate(MapperUpdate),
    /// Arbitrary work executed on the worker thread.
    Callback(Box<dyn FnOnce() -> Result<()> + Send>),
}

impl std::fmt::Debug for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Irq { num, high } => f.debug_struct("Irq").field("num", num).field("high", high).finish(),
            Self::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            Self::MapperUpdate(_) => f.write_str("MapperUpdate"),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// A tagged message consumed by a worker.
#[derive(Debug)]
pub struct Event {
    /// Payload.
    pub kind: EventKind,
    /// Destination endpoint id in the worker's table, or [`EP_CALLBACK`].
    pub epid: u32,
    /// Posted by the worker after the handler returns (or on drain-without-
    /// dispatch during exit).
    pub signal: Option<Arc<Semaphore>>,
}

impl Event {
    /// Creates an event for the given endpoint.
    pub fn new(epid: u32, kind: EventKind) -> Self {
        Self {
            kind,
            epid,
            signal: None,
        }
    }

    /// Creates a callback event.
    pub fn callback(f: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self::new(EP_CALLBACK, EventKind::Callback(Box::new(f)))
    }
}

/// A handler installed in a worker's endpoint table.
pub trait EventEndpoint: Send + Sync {
    /// Handles one event on the worker thread.
    fn handle_event(&self, ev: Event) -> Result<()>;
}

/// Intrusive FIFO of pending events, shared between producers and one
/// consuming worker.
pub struct EventQueue {
    list: Mutex<VecDeque<Event>>,
    available: Condvar,
    approx_len: AtomicUsize,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self {
            list: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            approx_len: AtomicUsize::new(0),
        }
    }
}

impl EventQueue {
    /// Creates an empty shared queue.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Enqueues an event and wakes the consumer.
    pub fn send(&self, ev: Event) {
        let mut list = lock_unpoisoned(&self.list);
        list.push_back(ev);
        self.approx_len.store(list.len(), Ordering::Relaxed);
        self.available.notify_all();
    }

    /// Enqueues an event and blocks until the worker has handled it.
    pub fn send_wait(&self, mut ev: Event) {
        let sem = Arc::new(Semaphore::new(0));
        ev.signal = Some(Arc::clone(&sem));
        self.send(ev);
        sem.wait();
    }

    /// Removes all pending events, optionally blocking until at least one
    /// is available.
    pub fn drain(&self, wait: bool) -> Vec<Event> {
        let mut list = lock_unpoisoned(&self.list);
        if wait {
            while list.is_empty() {
                list = match self.available.wait(list) {
                    Ok(g) => g,
                    Err(p) => p.into_inner(),
                };
            }
        }
        let events: Vec<Event> = list.drain(..).collect();
        self.approx_len.store(0, Ordering::Relaxed);
        events
    }

    /// Racy emptiness probe.
    ///
    /// The returned view may be stale; it is only a hint to skip taking the
    /// queue lock on the hot path. The lock synchronizes any access to the
    /// entries themselves.
    pub fn maybe_has_events(&self) -> bool {
        self.approx_len.load(Ordering::Relaxed) != 0
    }
}
