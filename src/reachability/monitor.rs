//! Reachability monitor lifecycle and flag processing.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread,
};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::bulk::Document;

use super::{
    flags::ReachabilityFlags,
    source::{FlagSource, ReachabilityError, SubscriptionToken},
    status::{ReachabilityPolicy, ReachabilityStatus, classify},
};

/// Name carried by every change event.
pub const REACHABILITY_CHANGED: &str = "ReachabilityChanged";

static NEXT_MONITOR_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a monitor instance, carried by its events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MonitorId(u64);

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reachability-monitor-{}", self.0)
    }
}

/// Handle returned by [`ReachabilityMonitor::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Change notification emitted after a new flag snapshot is processed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReachabilityChanged {
    pub name: &'static str,
    pub monitor: MonitorId,
    pub status: ReachabilityStatus,
    pub flags: ReachabilityFlags,
    pub observed_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct EventDocument<'a> {
    event: &'static str,
    monitor: String,
    status: &'static str,
    flags: &'a ReachabilityFlags,
    observed_at: String,
}

impl ReachabilityChanged {
    /// Render the event as a bulk document labelled with the event name.
    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        let payload = EventDocument {
            event: self.name,
            monitor: self.monitor.to_string(),
            status: self.status.as_str(),
            flags: &self.flags,
            observed_at: self.observed_at.to_rfc3339(),
        };
        Document::from_serialize(&payload, self.name)
    }
}

type EventCallback = Arc<dyn Fn(&ReachabilityChanged) + Send + Sync>;

#[derive(Default)]
struct StatusCallbacks {
    reachable: Option<EventCallback>,
    unreachable: Option<EventCallback>,
}

/// Work items for the serial queue.
enum QueueCommand {
    Flags(ReachabilityFlags),
    /// Read the source and process the result as a change.
    Evaluate,
    Shutdown,
}

struct Running {
    token: SubscriptionToken,
    queue: Sender<QueueCommand>,
    handle: thread::JoinHandle<()>,
}

/// Flags processed by the queue of the current run. Each start and stop
/// begins a new generation; a queue from an earlier run may not write here.
#[derive(Default)]
struct LastProcessed {
    generation: u64,
    flags: Option<ReachabilityFlags>,
}

impl LastProcessed {
    fn reset(&mut self) -> u64 {
        self.generation += 1;
        self.flags = None;
        self.generation
    }
}

struct Inner {
    id: MonitorId,
    source: Arc<dyn FlagSource>,
    policy: RwLock<ReachabilityPolicy>,
    last: Mutex<LastProcessed>,
    callbacks: Mutex<StatusCallbacks>,
    listeners: Mutex<Vec<(ListenerId, EventCallback)>>,
    channels: Mutex<Vec<Sender<ReachabilityChanged>>>,
    running: Mutex<Option<Running>>,
}

impl Inner {
    /// Debounce state lives on this thread, so every run starts fresh.
    fn run_queue(&self, generation: u64, rx: &Receiver<QueueCommand>) {
        let mut previous = None;
        while let Ok(command) = rx.recv() {
            let flags = match command {
                QueueCommand::Flags(flags) => flags,
                QueueCommand::Evaluate => match self.source.current_flags() {
                    Ok(flags) => flags,
                    Err(err) => {
                        warn!("{}: failed to read initial flags: {err}", self.id);
                        continue;
                    }
                },
                QueueCommand::Shutdown => break,
            };
            if previous != Some(flags) {
                self.process(flags);
                previous = Some(flags);
                let mut last = self.last.lock();
                if last.generation == generation {
                    last.flags = Some(flags);
                }
            }
        }
    }

    fn process(&self, flags: ReachabilityFlags) {
        let status = classify(flags, *self.policy.read());
        debug!("{}: {status} [{flags}]", self.id);
        let event = ReachabilityChanged {
            name: REACHABILITY_CHANGED,
            monitor: self.id,
            status,
            flags,
            observed_at: Utc::now(),
        };

        let callback = {
            let callbacks = self.callbacks.lock();
            if status.is_reachable() {
                callbacks.reachable.clone()
            } else {
                callbacks.unreachable.clone()
            }
        };
        if let Some(callback) = callback {
            callback(&event);
        }
        self.broadcast(&event);
    }

    fn broadcast(&self, event: &ReachabilityChanged) {
        let listeners: Vec<EventCallback> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
        self.channels
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Watches a [`FlagSource`] and reports connectivity transitions.
///
/// Flag snapshots are processed one at a time, in arrival order, on a
/// dedicated thread. A snapshot equal to the previous one is ignored.
/// Otherwise the matching reachable/unreachable callback runs, listeners
/// are notified, and the snapshot is remembered.
pub struct ReachabilityMonitor {
    inner: Arc<Inner>,
}

impl ReachabilityMonitor {
    pub fn new(source: Arc<dyn FlagSource>) -> Self {
        Self::with_policy(source, ReachabilityPolicy::default())
    }

    pub fn with_policy(source: Arc<dyn FlagSource>, policy: ReachabilityPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: MonitorId(NEXT_MONITOR_ID.fetch_add(1, Ordering::Relaxed)),
                source,
                policy: RwLock::new(policy),
                last: Mutex::new(LastProcessed::default()),
                callbacks: Mutex::new(StatusCallbacks::default()),
                listeners: Mutex::new(Vec::new()),
                channels: Mutex::new(Vec::new()),
                running: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> MonitorId {
        self.inner.id
    }

    /// Start watching for changes.
    ///
    /// Spawns the serial queue, subscribes to the source, and queues an
    /// immediate evaluation of the current flags. On failure nothing stays
    /// registered and the monitor remains stopped. Starting a running
    /// monitor does nothing.
    pub fn start(&self) -> Result<(), ReachabilityError> {
        let mut running = self.inner.running.lock();
        if running.is_some() {
            return Ok(());
        }

        let generation = self.inner.last.lock().reset();
        let (tx, rx) = unbounded();
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name(format!("logship-{}", self.inner.id))
            .spawn(move || inner.run_queue(generation, &rx))
            .map_err(|err| {
                ReachabilityError::Setup(format!("failed to spawn serial queue: {err}"))
            })?;

        let signal = tx.clone();
        let subscribed = self.inner.source.subscribe(Box::new(move |flags| {
            let _ = signal.send(QueueCommand::Flags(flags));
        }));
        let token = match subscribed {
            Ok(token) => token,
            Err(err) => {
                let _ = tx.send(QueueCommand::Shutdown);
                if handle.join().is_err() {
                    warn!("{}: serial queue panicked", self.inner.id);
                }
                return Err(err);
            }
        };

        let _ = tx.send(QueueCommand::Evaluate);
        debug!("{}: started", self.inner.id);
        *running = Some(Running {
            token,
            queue: tx,
            handle,
        });
        Ok(())
    }

    /// Stop watching. Safe to call when already stopped.
    ///
    /// Snapshots already queued are processed before the queue exits, but no
    /// longer update [`last_status`](Self::last_status). A later `start`
    /// reports the current status afresh, also when `stop` is called from a
    /// callback running on the queue itself.
    pub fn stop(&self) {
        let Some(running) = self.inner.running.lock().take() else {
            return;
        };
        self.inner.last.lock().reset();
        self.inner.source.unsubscribe(running.token);
        let _ = running.queue.send(QueueCommand::Shutdown);
        if running.handle.thread().id() != thread::current().id()
            && running.handle.join().is_err()
        {
            warn!("{}: serial queue panicked", self.inner.id);
        }
        debug!("{}: stopped", self.inner.id);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.lock().is_some()
    }

    /// Register the callback run when a change classifies as reachable.
    ///
    /// Runs on the serial queue. Replaces any previous callback.
    pub fn on_reachable(&self, callback: impl Fn(&ReachabilityChanged) + Send + Sync + 'static) {
        self.inner.callbacks.lock().reachable = Some(Arc::new(callback));
    }

    /// Register the callback run when a change classifies as unreachable.
    pub fn on_unreachable(
        &self,
        callback: impl Fn(&ReachabilityChanged) + Send + Sync + 'static,
    ) {
        self.inner.callbacks.lock().unreachable = Some(Arc::new(callback));
    }

    /// Add a listener notified of every change, after the status callback.
    pub fn add_listener(
        &self,
        listener: impl Fn(&ReachabilityChanged) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener, returning whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Receive change events over a channel owned by the monitor.
    ///
    /// The channel is dropped from the broadcast list once the receiver is.
    pub fn subscribe(&self) -> Receiver<ReachabilityChanged> {
        let (tx, rx) = unbounded();
        self.inner.channels.lock().push(tx);
        rx
    }

    pub fn policy(&self) -> ReachabilityPolicy {
        *self.inner.policy.read()
    }

    /// Change whether cellular paths count as reachable.
    ///
    /// Applies to the next processed change and to status queries.
    pub fn set_allow_cellular(&self, allow: bool) {
        self.inner.policy.write().allow_cellular = allow;
    }

    /// Read the source's current flags.
    pub fn current_flags(&self) -> Result<ReachabilityFlags, ReachabilityError> {
        self.inner.source.current_flags()
    }

    /// Classify the source's current flags, treating read failures as
    /// unreachable.
    pub fn current_status(&self) -> ReachabilityStatus {
        match self.current_flags() {
            Ok(flags) => classify(flags, self.policy()),
            Err(err) => {
                debug!("{}: cannot read flags: {err}", self.inner.id);
                ReachabilityStatus::Unreachable
            }
        }
    }

    /// Status of the last processed change, if any.
    pub fn last_status(&self) -> Option<ReachabilityStatus> {
        let flags = self.inner.last.lock().flags;
        flags.map(|flags| classify(flags, self.policy()))
    }

    pub fn is_reachable(&self) -> bool {
        self.current_status().is_reachable()
    }

    pub fn is_reachable_via_wifi(&self) -> bool {
        self.current_status() == ReachabilityStatus::ReachableWiFi
    }

    pub fn is_reachable_via_cellular(&self) -> bool {
        self.current_status() == ReachabilityStatus::ReachableCellular
    }

    pub fn is_connection_required(&self) -> bool {
        self.current_flags()
            .is_ok_and(|flags| flags.connection_required)
    }

    pub fn is_connection_on_demand(&self) -> bool {
        self.current_flags()
            .is_ok_and(|flags| flags.is_connection_on_demand())
    }

    pub fn is_intervention_required(&self) -> bool {
        self.current_flags()
            .is_ok_and(|flags| flags.is_intervention_required())
    }

    /// `"No Connection"`, `"WiFi"`, or `"Cellular"`.
    pub fn status_string(&self) -> &'static str {
        self.current_status().as_str()
    }

    /// Compact rendering of the current flags; all dashes if unreadable.
    pub fn flags_string(&self) -> String {
        self.current_flags()
            .unwrap_or_else(|_| ReachabilityFlags::none())
            .to_string()
    }
}

impl Drop for ReachabilityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ReachabilityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReachabilityMonitor")
            .field("id", &self.inner.id)
            .field("running", &self.is_running())
            .field("policy", &self.policy())
            .finish()
    }
}
