//! Transfer manager implementation.
//!
//! # Architecture
//!
//! - **Manager**: owns the registry, queue and slots (through
//!   [`DispatchQueue`]), validates intake and publishes lifecycle events
//! - **Dispatcher**: a lazily spawned task that runs dispatch ticks while the
//!   queue is non-empty
//! - **Units**: external transfer units, started with a [`UnitHandle`] and
//!   reporting back through the manager's [`CompletionSink`]
//!
//! # Concurrency Model
//!
//! - One `std::sync::Mutex` serializes slots, queue and registry
//! - Events are published with no lock held; handlers may call back in
//! - `Notify` wakes the dispatcher on enqueue and on slot release; the
//!   dispatch interval is only a fallback
//! - Lease tokens prevent stale completion commits

mod dispatcher;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::Notify;

use ferry_core::{
    CompletionSink, Event, FileCandidate, GlobalStatus, IntoEventSpec, LeaseId, QueueConfig,
    QueueResult, QueueSnapshot, Reply, TransferOutcome, TransferUnit, UnitFactory, UnitHandle,
    UnitId, UnitInfo, UnitStatus, UploadErrorKind, ValidationError,
};

use crate::bus::EventBus;
use crate::progress::{DEFAULT_PROGRESS_INTERVAL, ProgressThrottle};
use crate::queue::{Completion, DispatchQueue, FinishedRun};
use crate::validator::{DefaultValidator, FileValidator};

/// Dependencies for creating a transfer manager.
///
/// Bundles the configuration with the pluggable collaborators. Everything
/// but the config and the unit factory has a default.
pub struct TransferManagerDeps {
    /// Validated queue configuration.
    pub config: QueueConfig,
    /// Creates a transfer unit for every accepted file.
    pub factory: Arc<dyn UnitFactory>,
    /// Intake validation.
    pub validator: Arc<dyn FileValidator>,
    /// Event bus; pass a pre-populated one to observe `init`.
    pub bus: Arc<EventBus>,
    /// Minimum spacing of `progressFile` events per unit.
    pub progress_interval: Duration,
}

impl TransferManagerDeps {
    /// Dependencies with the default validator and a fresh bus.
    pub fn new(config: QueueConfig, factory: Arc<dyn UnitFactory>) -> Self {
        Self {
            config,
            factory,
            validator: Arc::new(DefaultValidator::new()),
            bus: Arc::new(EventBus::new()),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Use a custom validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn FileValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Use an existing event bus.
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    /// Set the per-unit progress event interval.
    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// Build a transfer manager from its dependencies.
///
/// Publishes `init` with the effective configuration before returning.
pub fn build_transfer_manager(deps: TransferManagerDeps) -> TransferManager {
    let inner = Arc::new_cyclic(|weak: &Weak<Inner>| Inner {
        state: Mutex::new(State {
            queue: DispatchQueue::new(deps.config.max_connections()),
            units: HashMap::new(),
            throttle: ProgressThrottle::new(deps.progress_interval),
            dispatcher_running: false,
        }),
        config: deps.config,
        bus: deps.bus,
        validator: deps.validator,
        factory: deps.factory,
        notify: Arc::new(Notify::new()),
        sink: Arc::new(ManagerSink {
            inner: weak.clone(),
        }),
        this: weak.clone(),
    });

    tracing::info!(
        target: "ferry.queue",
        max_connections = inner.config.max_connections(),
        interval_ms = u64::try_from(inner.config.dispatch_interval().as_millis()).unwrap_or(u64::MAX),
        "Transfer manager ready"
    );
    inner.bus.publish(&Event::Init {
        config: inner.config.clone(),
    });

    TransferManager { inner }
}

/// Everything guarded by the state lock.
struct State {
    queue: DispatchQueue,
    units: HashMap<UnitId, Arc<dyn TransferUnit>>,
    throttle: ProgressThrottle,
    dispatcher_running: bool,
}

struct Inner {
    config: QueueConfig,
    state: Mutex<State>,
    bus: Arc<EventBus>,
    validator: Arc<dyn FileValidator>,
    factory: Arc<dyn UnitFactory>,
    notify: Arc<Notify>,
    sink: Arc<dyn CompletionSink>,
    /// Back-reference handed to the dispatcher task.
    this: Weak<Self>,
}

/// Result of one dispatch tick.
struct Tick {
    started: usize,
    keep_running: bool,
}

/// Bounded-concurrency transfer queue.
///
/// Cheap to clone; clones share the same queue. The dispatcher task is
/// spawned on the ambient tokio runtime when work is enqueued. Without a
/// runtime, queued units are only dispatched by [`dispatch_tick`](Self::dispatch_tick).
#[derive(Clone)]
pub struct TransferManager {
    inner: Arc<Inner>,
}

impl TransferManager {
    /// Manager with the default validator and a fresh event bus.
    pub fn new(config: QueueConfig, factory: Arc<dyn UnitFactory>) -> Self {
        build_transfer_manager(TransferManagerDeps::new(config, factory))
    }

    /// The effective configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// The event bus this manager publishes on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    /// Subscribe to an event; see [`EventBus::on`].
    pub fn on<S, F, R>(&self, spec: S, handler: F) -> QueueResult<()>
    where
        S: IntoEventSpec,
        F: Fn(&Event) -> R + Send + Sync + 'static,
        R: Into<Reply>,
    {
        self.inner.bus.on(spec, handler)
    }

    /// Unsubscribe by exact namespace; see [`EventBus::off`].
    pub fn off<S: IntoEventSpec>(&self, spec: S) -> QueueResult<usize> {
        self.inner.bus.off(spec)
    }

    /// Validate `file` against the current registry without adding it.
    pub fn check_file(&self, file: &FileCandidate) -> Vec<ValidationError> {
        let registered = self.inner.lock().queue.len();
        self.inner
            .validator
            .validate(file, registered, &self.inner.config)
    }

    /// Validate and register files.
    ///
    /// Each file is checked against the registry as it grows. Rejected files
    /// publish `errorFile`; accepted ones become READY units and are
    /// announced in a single `select`. With `auto_start`, an upload starts
    /// right away.
    ///
    /// The validator and unit factory run under the state lock and must not
    /// call back into the manager.
    pub fn add_files<I>(&self, files: I) -> Vec<UnitId>
    where
        I: IntoIterator<Item = FileCandidate>,
    {
        self.inner.add_files(files)
    }

    /// Publish `drop` for files dropped onto the widget, then add them.
    pub fn drop_files(&self, files: Vec<FileCandidate>) -> Vec<UnitId> {
        self.inner.bus.publish(&Event::Drop {
            files: files.clone(),
        });
        self.inner.add_files(files)
    }

    /// Append one pending unit to the queue and wake the dispatcher.
    pub fn enqueue_file(&self, id: UnitId) -> QueueResult<()> {
        self.inner.enqueue_file(id)
    }

    /// Queue every pending unit.
    ///
    /// With nothing pending, publishes `error` (`noFiles`). A `false` from
    /// any `beforeUpload` subscriber publishes `error` (`aborted`) instead.
    /// Otherwise publishes `start` and queues the units.
    pub fn enqueue_all(&self) {
        self.inner.enqueue_all();
    }

    /// Alias of [`enqueue_all`](Self::enqueue_all).
    pub fn start_upload(&self) {
        self.enqueue_all();
    }

    /// Ask every ACTIVE unit to stop. No-op when nothing is active.
    ///
    /// Stopped units are READY immediately; their slots return when the
    /// units report back.
    pub fn stop_all(&self) {
        self.inner.stop_all();
    }

    /// Alias of [`stop_all`](Self::stop_all).
    pub fn stop_upload(&self) {
        self.stop_all();
    }

    /// Stop one unit: ACTIVE units are told to stop, queued ones leave the
    /// queue. Both end up READY.
    pub fn stop_unit(&self, id: UnitId) -> QueueResult<()> {
        self.inner.stop_unit(id)
    }

    /// Remove one unit from the queue and the registry.
    pub fn remove_unit(&self, id: UnitId) -> QueueResult<UnitInfo> {
        self.inner.remove_unit(id)
    }

    /// Remove every unit; the manager returns to idle.
    pub fn clear_all(&self) {
        self.inner.clear_all();
    }

    /// Alias of [`clear_all`](Self::clear_all).
    pub fn clear_queue(&self) {
        self.clear_all();
    }

    /// Disabled units are skipped by dispatch but keep their queue position.
    ///
    /// Disabling an ACTIVE unit stops it, as [`stop_unit`](Self::stop_unit)
    /// would.
    pub fn set_disabled(&self, id: UnitId, disabled: bool) -> QueueResult<()> {
        self.inner.set_disabled(id, disabled)
    }

    /// Park a unit in CHECK while an existence/overwrite decision is pending.
    pub fn hold_for_check(&self, id: UnitId) -> QueueResult<()> {
        self.inner.lock().queue.hold_for_check(id)?;
        Ok(())
    }

    /// Resolve a CHECK: the unit is eligible for dispatch again.
    pub fn release_check(&self, id: UnitId) -> QueueResult<()> {
        let mut state = self.inner.lock();
        let unit = state.queue.release_check(id)?;
        if unit.status == UnitStatus::Queued {
            self.inner.wake_dispatcher(&mut state);
        }
        Ok(())
    }

    /// Run one dispatch tick now. Returns the number of units started.
    pub fn dispatch_tick(&self) -> usize {
        self.inner.tick(false).started
    }

    pub fn is_uploading(&self) -> bool {
        self.inner.lock().queue.status() == GlobalStatus::Uploading
    }

    pub fn is_idle(&self) -> bool {
        self.inner.lock().queue.status() == GlobalStatus::Idle
    }

    pub fn has_files(&self) -> bool {
        !self.inner.lock().queue.is_empty()
    }

    pub fn status(&self) -> GlobalStatus {
        self.inner.lock().queue.status()
    }

    pub fn unit(&self, id: UnitId) -> Option<UnitInfo> {
        self.inner.lock().queue.unit(id)
    }

    /// Every registered unit, in id order.
    pub fn units(&self) -> Vec<UnitInfo> {
        self.inner.lock().queue.units()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.lock().queue.snapshot()
    }
}

impl fmt::Debug for TransferManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferManager")
            .field("config", &self.inner.config)
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_files<I>(&self, files: I) -> Vec<UnitId>
    where
        I: IntoIterator<Item = FileCandidate>,
    {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        {
            let mut state = self.lock();
            for file in files {
                let errors = self
                    .validator
                    .validate(&file, state.queue.len(), &self.config);
                if !errors.is_empty() {
                    rejected.push((file, errors));
                    continue;
                }

                let id = state.queue.register(&file);
                let unit = self.factory.create(id, &file);
                state.units.insert(id, unit);
                if let Ok(info) = state.queue.mark_ready(id) {
                    accepted.push(info);
                }
            }
        }

        for (file, errors) in rejected {
            tracing::debug!(
                name = %file.name,
                errors = errors.len(),
                "File rejected"
            );
            self.bus.publish(&Event::rejected(file, errors));
        }

        let ids: Vec<UnitId> = accepted.iter().map(|unit| unit.id).collect();
        if !accepted.is_empty() {
            tracing::info!(count = accepted.len(), "Files added");
            self.bus.publish(&Event::Select { units: accepted });

            if self.config.auto_start() {
                self.enqueue_all();
            }
        }
        ids
    }

    fn enqueue_file(&self, id: UnitId) -> QueueResult<()> {
        let mut state = self.lock();
        if state.queue.enqueue(id)? {
            tracing::debug!(id = %id, "Unit enqueued");
        }
        self.wake_dispatcher(&mut state);
        Ok(())
    }

    fn enqueue_all(&self) {
        let pending = self.lock().queue.pending();
        if pending.is_empty() {
            tracing::debug!("Nothing pending to upload");
            self.bus.publish(&Event::error(UploadErrorKind::NoFiles));
            return;
        }

        if self.bus.vetoed(&Event::BeforeUpload {
            units: pending.clone(),
        }) {
            tracing::warn!(count = pending.len(), "Upload aborted by beforeUpload");
            self.bus.publish(&Event::error(UploadErrorKind::Aborted));
            return;
        }

        self.bus.publish(&Event::Start {
            units: pending.clone(),
        });

        let mut state = self.lock();
        let mut queued = 0_usize;
        for unit in &pending {
            match state.queue.enqueue(unit.id) {
                Ok(true) => queued += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(id = %unit.id, error = %e, "Unit changed state before enqueue");
                }
            }
        }
        if queued > 0 {
            self.wake_dispatcher(&mut state);
        }
        drop(state);

        tracing::info!(target: "ferry.queue", count = queued, "Upload started");
    }

    /// Make sure a dispatcher will look at the queue soon.
    ///
    /// Spawns the dispatcher if none is running; must be called with the
    /// state lock held so the running flag cannot race the loop's exit.
    fn wake_dispatcher(&self, state: &mut State) {
        if state.dispatcher_running {
            self.notify.notify_one();
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                state.dispatcher_running = true;
                handle.spawn(dispatcher::run(
                    self.this.clone(),
                    Arc::clone(&self.notify),
                    self.config.dispatch_interval(),
                ));
                tracing::debug!(target: "ferry.queue", "Dispatcher spawned");
            }
            Err(_) => {
                tracing::warn!(
                    target: "ferry.queue",
                    queued = state.queue.queued_len(),
                    "No tokio runtime; queued units wait for dispatch_tick()"
                );
            }
        }
    }

    /// One dispatch tick.
    ///
    /// Reserves the units that fit in the free slots, asks `beforeUploadFile`
    /// about each, then promotes the approved ones and starts them. Vetoed
    /// units leave the queue and go back to READY. A tick entered from a
    /// `beforeUploadFile` handler skips the reserved units.
    fn tick(&self, from_loop: bool) -> Tick {
        let candidates = {
            let mut state = self.lock();
            let candidates = state.queue.begin_vetting();
            if candidates.is_empty() {
                let keep_running = state.queue.queued_len() > 0;
                if from_loop && !keep_running {
                    state.dispatcher_running = false;
                }
                return Tick {
                    started: 0,
                    keep_running,
                };
            }
            candidates
        };

        let reserved: Vec<UnitId> = candidates.iter().map(|unit| unit.id).collect();
        let mut allowed = HashSet::with_capacity(candidates.len());
        let mut vetoed = Vec::new();
        for unit in candidates {
            let id = unit.id;
            if self.bus.vetoed(&Event::BeforeUploadFile { unit }) {
                vetoed.push(id);
            } else {
                allowed.insert(id);
            }
        }

        let mut started = Vec::new();
        let keep_running = {
            let mut state = self.lock();
            state.queue.end_vetting(&reserved);
            for id in &vetoed {
                state.queue.skip(*id);
                tracing::warn!(target: "ferry.queue", id = %id, "Unit vetoed by beforeUploadFile");
            }

            let was_uploading = state.queue.status() == GlobalStatus::Uploading;
            for dispatched in state.queue.begin_dispatch(&allowed) {
                state.throttle.reset(dispatched.unit.id);
                let unit = state.units.get(&dispatched.unit.id).cloned();
                started.push((dispatched, unit));
            }
            if !was_uploading && state.queue.status() == GlobalStatus::Uploading {
                tracing::info!(target: "ferry.queue", "Upload run started");
            }

            let keep_running = state.queue.queued_len() > 0;
            if from_loop && !keep_running {
                state.dispatcher_running = false;
            }
            tracing::debug!(
                target: "ferry.queue",
                started = started.len(),
                vetoed = vetoed.len(),
                queued = state.queue.queued_len(),
                slots = state.queue.slots(),
                "Dispatch tick"
            );
            keep_running
        };

        let count = started.len();
        for (dispatched, unit) in started {
            let id = dispatched.unit.id;
            let handle = UnitHandle::new(id, dispatched.lease, Arc::clone(&self.sink));
            if let Some(unit) = unit {
                self.bus.publish(&Event::StartFile {
                    unit: dispatched.unit,
                });
                tracing::debug!(id = %id, lease = %dispatched.lease, "Unit started");
                unit.start(handle);
            } else {
                tracing::error!(id = %id, "BUG: registered unit has no transfer unit");
                drop(handle);
            }
        }

        Tick {
            started: count,
            keep_running,
        }
    }

    fn on_progress(&self, id: UnitId, lease: LeaseId, loaded: u64) {
        let (unit, aggregate_loaded, aggregate_total) = {
            let mut state = self.lock();
            let Some(unit) = state.queue.progress(id, lease, loaded) else {
                return;
            };
            let is_final = unit.loaded >= unit.size;
            if !state.throttle.should_emit(id, Instant::now(), is_final) {
                return;
            }
            let (aggregate_loaded, aggregate_total) = state.queue.aggregate();
            (unit, aggregate_loaded, aggregate_total)
        };

        self.bus.publish(&Event::ProgressFile {
            loaded: unit.loaded,
            total: unit.size,
            unit,
        });
        self.bus
            .publish(&Event::progress(aggregate_loaded, aggregate_total));
    }

    fn on_complete(&self, id: UnitId, lease: LeaseId, outcome: &TransferOutcome) {
        let (completion, wake) = {
            let mut state = self.lock();
            let completion = state.queue.complete(id, lease, outcome);
            if !matches!(completion, Completion::Ignored) {
                state.throttle.reset(id);
            }
            (completion, state.dispatcher_running)
        };

        if wake && !matches!(completion, Completion::Ignored) {
            self.notify.notify_one();
        }

        match completion {
            Completion::Ignored => {
                tracing::warn!(id = %id, lease = %lease, "Ignoring stale completion (lease not outstanding)");
            }
            Completion::Released => {
                tracing::debug!(id = %id, lease = %lease, "Slot released by inactive unit");
            }
            Completion::Returned { unit } => {
                tracing::debug!(id = %unit.id, "Unit stopped itself; back to ready");
            }
            Completion::Settled {
                unit,
                message,
                finished,
            } => {
                if unit.status == UnitStatus::Done {
                    tracing::info!(id = %unit.id, name = %unit.name, "Unit finished");
                    self.bus.publish(&Event::FinishFile { unit, message });
                } else {
                    tracing::warn!(
                        id = %unit.id,
                        name = %unit.name,
                        error = message.as_deref().unwrap_or("unknown"),
                        "Unit failed"
                    );
                    self.bus.publish(&Event::transfer_failed(&unit, message));
                }

                if let Some(run) = finished {
                    self.finish(run);
                }
            }
        }
    }

    fn stop_all(&self) {
        let stopping: Vec<Arc<dyn TransferUnit>> = {
            let mut state = self.lock();
            let mut stopping = Vec::new();
            for id in state.queue.active_ids() {
                if let Ok(Some(_)) = state.queue.stop(id) {
                    if let Some(unit) = state.units.get(&id) {
                        stopping.push(Arc::clone(unit));
                    }
                }
            }
            stopping
        };

        if stopping.is_empty() {
            return;
        }
        tracing::info!(target: "ferry.queue", count = stopping.len(), "Stopping active transfers");
        for unit in stopping {
            unit.stop();
        }
    }

    fn stop_unit(&self, id: UnitId) -> QueueResult<()> {
        let unit = {
            let mut state = self.lock();
            match state.queue.stop(id)? {
                Some(_) => state.units.get(&id).cloned(),
                None => None,
            }
        };

        if let Some(unit) = unit {
            tracing::debug!(id = %id, "Stopping unit");
            unit.stop();
        }
        Ok(())
    }

    fn set_disabled(&self, id: UnitId, disabled: bool) -> QueueResult<()> {
        let unit = {
            let mut state = self.lock();
            match state.queue.set_disabled(id, disabled)? {
                Some(_) => state.units.get(&id).cloned(),
                None => None,
            }
        };

        if let Some(unit) = unit {
            tracing::debug!(id = %id, "Stopping disabled unit");
            unit.stop();
        }
        Ok(())
    }

    fn remove_unit(&self, id: UnitId) -> QueueResult<UnitInfo> {
        let (removed, unit) = {
            let mut state = self.lock();
            let removed = state.queue.remove(id)?;
            state.throttle.reset(id);
            (removed, state.units.remove(&id))
        };

        if removed.was_active {
            if let Some(unit) = unit {
                unit.stop();
            }
        }
        tracing::info!(id = %id, "Unit removed");

        if let Some(run) = removed.finished {
            self.finish(run);
        }
        Ok(removed.unit)
    }

    fn clear_all(&self) {
        // Units are dropped after the lock is released: a unit holding its
        // handle reports from `Drop`.
        let (entries, units) = {
            let mut state = self.lock();
            state.throttle.clear();
            (state.queue.clear(), std::mem::take(&mut state.units))
        };

        for entry in &entries {
            if entry.status == UnitStatus::Active {
                if let Some(unit) = units.get(&entry.id) {
                    unit.stop();
                }
            }
        }
        tracing::info!(target: "ferry.queue", count = entries.len(), "Queue cleared");
    }

    fn finish(&self, run: FinishedRun) {
        tracing::info!(
            target: "ferry.queue",
            files = run.file_names.len(),
            "Upload run finished"
        );
        self.bus.publish(&Event::Finish {
            file_names: run.file_names,
            registry: run.registry,
        });
    }
}

/// The manager's side of every [`UnitHandle`].
///
/// Holds only a weak reference so running units do not keep a dropped
/// manager alive.
struct ManagerSink {
    inner: Weak<Inner>,
}

impl CompletionSink for ManagerSink {
    fn progress(&self, id: UnitId, lease: LeaseId, loaded: u64) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_progress(id, lease, loaded);
        }
    }

    fn complete(&self, id: UnitId, lease: LeaseId, outcome: TransferOutcome) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_complete(id, lease, &outcome);
        }
    }

    fn publish(&self, event: Event) {
        if let Some(inner) = self.inner.upgrade() {
            inner.bus.publish(&event);
        }
    }
}
