//! Domain event dispatcher
//!
//! Handlers are registered per payload type. `dispatch` runs synchronous
//! handlers inline on the calling thread, in registration order, and hands
//! a copy of the event to a single background worker for each
//! asynchronous handler.
//!
//! ```text
//! dispatch(&event)
//!   ├─ sync handlers ──→ run now, caller's thread
//!   └─ async handlers ─→ (handler, event.duplicate()) ──→ queue ──→ worker
//! ```
//!
//! `shutdown` closes the queue and joins the worker after it has run every
//! task that was queued. Handler panics are caught and logged; neither the
//! caller nor the worker is taken down by one.

use crate::error::DispatchError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use tracing::{debug, error, info};
use types::{DomainEvent, EventKind, EventPayload};

type Handler = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

struct AsyncTask {
    handler: Handler,
    event: DomainEvent,
}

#[derive(Default)]
struct Registry {
    sync: HashMap<EventKind, Vec<Handler>>,
    background: HashMap<EventKind, Vec<Handler>>,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    sync_invocations: AtomicU64,
    async_queued: AtomicU64,
    async_invocations: AtomicU64,
    handler_panics: AtomicU64,
}

/// Counters since construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatcherStats {
    pub dispatched: u64,
    pub sync_invocations: u64,
    pub async_queued: u64,
    pub async_invocations: u64,
    pub handler_panics: u64,
}

pub struct DomainEventDispatcher {
    registry: Mutex<Registry>,
    sender: Mutex<Option<Sender<AsyncTask>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    stopped: AtomicBool,
    counters: Arc<Counters>,
}

impl DomainEventDispatcher {
    /// Create a dispatcher and start its worker thread
    pub fn new() -> Result<Self, DispatchError> {
        let (sender, receiver) = unbounded();
        let counters = Arc::new(Counters::default());

        let worker_counters = Arc::clone(&counters);
        let worker = std::thread::Builder::new()
            .name("domain-events".to_string())
            .spawn(move || worker_loop(receiver, worker_counters))
            .map_err(DispatchError::WorkerSpawn)?;

        Ok(Self {
            registry: Mutex::new(Registry::default()),
            sender: Mutex::new(Some(sender)),
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
            stopped: AtomicBool::new(false),
            counters,
        })
    }

    /// Register a handler run inline by `dispatch`
    pub fn register_sync<T, F>(&self, handler: F)
    where
        T: EventPayload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let handler = erase::<T, F>(handler);
        self.registry.lock().sync.entry(T::KIND).or_default().push(handler);
        debug!(event_type = %T::KIND, "Registered synchronous handler");
    }

    /// Register a handler run on the worker thread with its own copy of
    /// each event
    pub fn register_async<T, F>(&self, handler: F)
    where
        T: EventPayload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let handler = erase::<T, F>(handler);
        self.registry
            .lock()
            .background
            .entry(T::KIND)
            .or_default()
            .push(handler);
        debug!(event_type = %T::KIND, "Registered asynchronous handler");
    }

    pub fn handler_count(&self, kind: EventKind) -> (usize, usize) {
        let registry = self.registry.lock();
        (
            registry.sync.get(&kind).map_or(0, Vec::len),
            registry.background.get(&kind).map_or(0, Vec::len),
        )
    }

    /// Deliver `event` to every handler registered for its kind
    ///
    /// Synchronous handlers always run. After `shutdown` the asynchronous
    /// handlers are not queued and the call reports them as rejected.
    pub fn dispatch(&self, event: &DomainEvent) -> Result<(), DispatchError> {
        let kind = event.kind();
        let (sync, background) = {
            let registry = self.registry.lock();
            (
                registry.sync.get(&kind).cloned().unwrap_or_default(),
                registry.background.get(&kind).cloned().unwrap_or_default(),
            )
        };
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        for handler in &sync {
            self.counters.sync_invocations.fetch_add(1, Ordering::Relaxed);
            run_handler(handler, event, kind, &self.counters);
        }

        if background.is_empty() {
            return Ok(());
        }

        // Clone the sender so the lock is not held while sending
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            return Err(DispatchError::ShutDown {
                kind,
                rejected: background.len(),
            });
        };

        let mut rejected = 0;
        for handler in background {
            let task = AsyncTask {
                handler,
                event: event.duplicate(),
            };
            if sender.send(task).is_err() {
                rejected += 1;
            } else {
                self.counters.async_queued.fetch_add(1, Ordering::Relaxed);
            }
        }

        if rejected > 0 {
            return Err(DispatchError::ShutDown { kind, rejected });
        }
        Ok(())
    }

    /// Stop accepting async work, run everything already queued, join the
    /// worker. Safe to call more than once and from inside a handler.
    pub fn shutdown(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            // Dropping the last sender disconnects the channel once drained
            drop(self.sender.lock().take());
        }

        if std::thread::current().id() == self.worker_id {
            // Called from an async handler; a later call from another
            // thread (or Drop) does the join
            debug!("Dispatcher shutdown requested from worker thread");
            return;
        }

        // Held across the join so concurrent callers also wait for the drain
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return;
        };
        if handle.join().is_err() {
            error!("Domain event worker thread panicked");
        }
        drop(worker);

        let stats = self.stats();
        info!(
            dispatched = stats.dispatched,
            async_invocations = stats.async_invocations,
            handler_panics = stats.handler_panics,
            "Domain event dispatcher shut down"
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            sync_invocations: self.counters.sync_invocations.load(Ordering::Relaxed),
            async_queued: self.counters.async_queued.load(Ordering::Relaxed),
            async_invocations: self.counters.async_invocations.load(Ordering::Relaxed),
            handler_panics: self.counters.handler_panics.load(Ordering::Relaxed),
        }
    }
}

impl Drop for DomainEventDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DomainEventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainEventDispatcher")
            .field("shut_down", &self.is_shut_down())
            .field("stats", &self.stats())
            .finish()
    }
}

fn erase<T, F>(handler: F) -> Handler
where
    T: EventPayload,
    F: Fn(&T) + Send + Sync + 'static,
{
    Arc::new(move |event: &DomainEvent| {
        if let Some(payload) = T::from_event(event) {
            handler(payload);
        }
    })
}

fn run_handler(handler: &Handler, event: &DomainEvent, kind: EventKind, counters: &Counters) {
    if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
        counters.handler_panics.fetch_add(1, Ordering::Relaxed);
        error!(
            event_type = %kind,
            aggregate_id = event.aggregate_id(),
            "Event handler panicked"
        );
    }
}

fn worker_loop(receiver: Receiver<AsyncTask>, counters: Arc<Counters>) {
    debug!("Domain event worker started");

    // Ends once every sender is dropped and the queue is empty
    for task in receiver.iter() {
        let kind = task.event.kind();
        run_handler(&task.handler, &task.event, kind, &counters);
        counters.async_invocations.fetch_add(1, Ordering::Relaxed);
    }

    debug!("Domain event worker stopped");
}
