//! Periodic discovery-and-protect loop.
//!
//! One main timer drives [`ProtectionScanner::scan_now`]-equivalent cycles.
//! Protection requests are batched behind a one-shot debounce timer and then
//! filtered per resource by a suppression window, so a resource that was
//! just protected is not touched again on the next pass.
//!
//! Both timers are tokio tasks that hold a weak reference to the scanner and
//! a generation number. Bumping the generation makes any in-flight tick a
//! no-op. The main timer re-reads the interval before every sleep, so an
//! adaptive retune or an out-of-band [`ProtectionScanner::scan_now`] leaves
//! the pending tick where it is; only `start` and reconfiguration restart it.

pub mod adaptive;
pub mod events;

pub use adaptive::{interval_for_count, AdaptiveTuner};
pub use events::{ScanReport, ScannerEvent};

use crate::discovery::{contains_marker, AppType, DiscoveryBackend};
use crate::resource::{Pid, ResourceDescriptor, ResourceId};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use veil_core::context::ExecutionContext;
use veil_core::settings::{ScannerSettings, VeilSettings};
use veil_core::{Result, Transition, VeilError};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    pub interval: Duration,
    pub adaptive: bool,
    pub debounce_enabled: bool,
    pub debounce_interval: Duration,
    pub suppression_window: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self::from(&VeilSettings::default().scanner)
    }
}

impl From<&ScannerSettings> for ScannerConfig {
    fn from(s: &ScannerSettings) -> Self {
        Self {
            interval: Duration::from_millis(s.interval_ms),
            adaptive: s.adaptive,
            debounce_enabled: s.debounce_enabled,
            debounce_interval: Duration::from_millis(s.debounce_ms),
            suppression_window: Duration::from_millis(s.suppression_window_ms),
        }
    }
}

/// Overrides applied on top of a multi-process preset by
/// [`ProtectionScanner::enable_advanced_multi_process_handling`]. Unset
/// fields keep the preset's value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiProcessOptions {
    /// Multi-process flavour to assume. Defaults to the current type when it
    /// is already multi-process, otherwise [`AppType::MultiProcessA`].
    pub app_type: Option<AppType>,
    pub interval: Option<Duration>,
    pub debounce: Option<Duration>,
    /// Replaces the built-in helper heuristic. A descendant counts as a
    /// helper when its name contains any of these, ignoring case.
    pub helper_markers: Option<Vec<String>>,
}

impl MultiProcessOptions {
    pub fn for_type(app_type: AppType) -> Self {
        Self {
            app_type: Some(app_type),
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = Some(debounce);
        self
    }

    pub fn with_helper_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.helper_markers = Some(markers.into_iter().map(Into::into).collect());
        self
    }

    fn resolve_type(&self, current: AppType) -> Result<AppType> {
        let app_type = match self.app_type {
            Some(app_type) => app_type,
            None if current.is_multi_process() => current,
            None => AppType::MultiProcessA,
        };
        if !app_type.is_multi_process() {
            return Err(VeilError::InvalidArgument(format!(
                "{app_type} is not a multi-process application type"
            )));
        }
        if self.interval.is_some_and(|d| d.is_zero()) || self.debounce.is_some_and(|d| d.is_zero()) {
            return Err(VeilError::InvalidArgument(
                "multi-process interval and debounce must be non-zero".into(),
            ));
        }
        if self
            .helper_markers
            .as_ref()
            .is_some_and(|m| m.is_empty() || m.iter().any(|s| s.trim().is_empty()))
        {
            return Err(VeilError::InvalidArgument("helper markers must be non-empty".into()));
        }
        Ok(app_type)
    }
}

impl ScannerConfig {
    fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(VeilError::InvalidArgument("scan interval must be non-zero".into()));
        }
        if self.debounce_enabled && self.debounce_interval.is_zero() {
            return Err(VeilError::InvalidArgument(
                "debounce interval must be non-zero when debounce is enabled".into(),
            ));
        }
        Ok(())
    }
}

struct ScannerState {
    interval: Duration,
    adaptive: bool,
    tuner: AdaptiveTuner,
    debounce_enabled: bool,
    debounce_interval: Duration,
    suppression_window: Duration,
    app_type: AppType,
    /// Set by advanced multi-process handling; replaces the backend heuristic.
    helper_markers: Option<Vec<String>>,
    tracked_pid: Option<Pid>,
    known: HashSet<ResourceId>,
    /// Last protection attempt per resource.
    protected: HashMap<ResourceId, Instant>,
    pending: HashMap<ResourceId, Arc<ResourceDescriptor>>,
    scanning: bool,
    main_task: Option<JoinHandle<()>>,
    main_generation: u64,
    debounce_task: Option<JoinHandle<()>>,
    debounce_generation: u64,
    last_report: Option<ScanReport>,
}

struct Inner {
    backend: Arc<dyn DiscoveryBackend>,
    executor: Arc<dyn ExecutionContext>,
    runtime: Handle,
    events: broadcast::Sender<ScannerEvent>,
    state: Mutex<ScannerState>,
}

pub struct ProtectionScanner {
    inner: Arc<Inner>,
}

impl ProtectionScanner {
    /// Must be called from within a tokio runtime; timers are spawned on it.
    pub fn new(
        backend: Arc<dyn DiscoveryBackend>,
        executor: Arc<dyn ExecutionContext>,
        config: ScannerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            VeilError::InvalidArgument(format!("protection scanner needs a tokio runtime: {e}"))
        })?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = ScannerState {
            interval: config.interval,
            adaptive: config.adaptive,
            tuner: AdaptiveTuner::new(),
            debounce_enabled: config.debounce_enabled,
            debounce_interval: config.debounce_interval,
            suppression_window: config.suppression_window,
            app_type: AppType::Unknown,
            helper_markers: None,
            tracked_pid: None,
            known: HashSet::new(),
            protected: HashMap::new(),
            pending: HashMap::new(),
            scanning: false,
            main_task: None,
            main_generation: 0,
            debounce_task: None,
            debounce_generation: 0,
            last_report: None,
        };
        debug!(executor = executor.name(), ?config, "protection scanner created");
        Ok(Self {
            inner: Arc::new(Inner {
                backend,
                executor,
                runtime,
                events,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScannerEvent> {
        self.inner.events.subscribe()
    }

    // ── lifecycle ───────────────────────────────────────────────────────

    pub fn start(&self, interval: Duration) -> Result<Transition> {
        if interval.is_zero() {
            return Err(VeilError::InvalidArgument("scan interval must be non-zero".into()));
        }
        let mut state = self.inner.state.lock();
        if state.scanning {
            trace!("scanner already running");
            return Ok(Transition::Unchanged);
        }
        if state.tracked_pid.is_none() {
            warn!("scanner started without a tracked process; cycles will find nothing");
        }
        state.interval = interval;
        state.scanning = true;
        self.inner.restart_main_timer(&mut state);
        info!(interval_ms = interval.as_millis() as u64, "protection scanner started");
        Ok(Transition::Changed)
    }

    /// Cancel both timers and drop pending requests. Known and protected
    /// sets are kept.
    pub fn stop(&self) -> Transition {
        self.inner.stop()
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.state.lock().scanning
    }

    // ── configuration ───────────────────────────────────────────────────

    pub fn set_adaptive(&self, enabled: bool) {
        let mut state = self.inner.state.lock();
        if enabled && !state.adaptive {
            state.tuner.reset();
        }
        state.adaptive = enabled;
        debug!(enabled, "adaptive scanning toggled");
    }

    pub fn set_protection_debounce(&self, enabled: bool, interval: Duration) -> Result<()> {
        if enabled && interval.is_zero() {
            return Err(VeilError::InvalidArgument(
                "debounce interval must be non-zero when debounce is enabled".into(),
            ));
        }
        let flush = {
            let mut state = self.inner.state.lock();
            state.debounce_enabled = enabled;
            state.debounce_interval = interval;
            if enabled {
                Vec::new()
            } else {
                // Nothing would fire the pending batch any more.
                state.debounce_generation += 1;
                if let Some(task) = state.debounce_task.take() {
                    task.abort();
                }
                let pending: Vec<_> = state.pending.drain().map(|(_, d)| d).collect();
                pending
            }
        };
        if !flush.is_empty() {
            self.inner.dispatch(flush);
        }
        debug!(enabled, interval_ms = interval.as_millis() as u64, "protection debounce configured");
        Ok(())
    }

    /// Apply the preset for `app_type` and restart the timer if running.
    /// Custom helper markers from advanced multi-process handling are
    /// dropped.
    pub fn configure_for_application_type(&self, app_type: AppType) {
        let preset = app_type.preset();
        let mut state = self.inner.state.lock();
        self.inner
            .reconfigure(&mut state, app_type, preset.interval, preset.debounce, None);
        info!(
            %app_type,
            interval_ms = preset.interval.as_millis() as u64,
            debounce_ms = preset.debounce.as_millis() as u64,
            "scanner configured for application type"
        );
    }

    /// Switch to multi-process scanning with per-application overrides of
    /// the preset timing and helper detection. Restarts the timer if
    /// running. Returns the application type now in effect.
    pub fn enable_advanced_multi_process_handling(
        &self,
        options: MultiProcessOptions,
    ) -> Result<AppType> {
        let mut state = self.inner.state.lock();
        let app_type = options.resolve_type(state.app_type)?;
        let preset = app_type.preset();
        let interval = options.interval.unwrap_or(preset.interval);
        let debounce = options.debounce.unwrap_or(preset.debounce);
        self.inner.reconfigure(
            &mut state,
            app_type,
            interval,
            debounce,
            options.helper_markers.clone(),
        );
        info!(
            %app_type,
            interval_ms = interval.as_millis() as u64,
            debounce_ms = debounce.as_millis() as u64,
            markers = ?options.helper_markers,
            "advanced multi-process handling enabled"
        );
        Ok(app_type)
    }

    /// Classify the bundle at `path` through the backend, then configure.
    pub fn configure_for_bundle(&self, path: &Path) -> AppType {
        let app_type = self.inner.backend.classify_application(path);
        debug!(path = %path.display(), %app_type, "bundle classified");
        self.configure_for_application_type(app_type);
        app_type
    }

    /// Follow `pid` and its descendants. Switching to another process
    /// forgets the known set. Returns the previously tracked pid.
    pub fn track_process(&self, pid: Pid) -> Option<Pid> {
        let mut state = self.inner.state.lock();
        let previous = state.tracked_pid.replace(pid);
        if previous != Some(pid) {
            state.known.clear();
            state.tuner.reset();
            info!(pid, ?previous, "tracking process");
        }
        previous
    }

    // ── getters ─────────────────────────────────────────────────────────

    pub fn current_interval(&self) -> Duration {
        self.inner.state.lock().interval
    }

    pub fn debounce_interval(&self) -> Option<Duration> {
        let state = self.inner.state.lock();
        state.debounce_enabled.then_some(state.debounce_interval)
    }

    pub fn application_type(&self) -> AppType {
        self.inner.state.lock().app_type
    }

    pub fn helper_markers(&self) -> Option<Vec<String>> {
        self.inner.state.lock().helper_markers.clone()
    }

    pub fn tracked_process(&self) -> Option<Pid> {
        self.inner.state.lock().tracked_pid
    }

    pub fn known_resources(&self) -> Vec<ResourceId> {
        sorted(self.inner.state.lock().known.iter().copied())
    }

    pub fn protected_resources(&self) -> Vec<ResourceId> {
        sorted(self.inner.state.lock().protected.keys().copied())
    }

    pub fn pending_resources(&self) -> Vec<ResourceId> {
        sorted(self.inner.state.lock().pending.keys().copied())
    }

    pub fn last_report(&self) -> Option<ScanReport> {
        self.inner.state.lock().last_report.clone()
    }

    // ── work ────────────────────────────────────────────────────────────

    /// One discovery-and-protect cycle, outside the timer's schedule.
    pub fn scan_now(&self) -> ScanReport {
        self.inner.run_cycle()
    }

    pub fn request_protection(&self, descriptor: Arc<ResourceDescriptor>) {
        self.inner.request_protection(vec![descriptor]);
    }
}

impl Drop for ProtectionScanner {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

fn sorted(ids: impl Iterator<Item = ResourceId>) -> Vec<ResourceId> {
    let mut ids: Vec<_> = ids.collect();
    ids.sort_unstable();
    ids
}

impl Inner {
    fn emit(&self, event: ScannerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn stop(&self) -> Transition {
        let mut state = self.state.lock();
        let was_active =
            state.scanning || state.main_task.is_some() || state.debounce_task.is_some();
        state.scanning = false;
        state.main_generation += 1;
        state.debounce_generation += 1;
        if let Some(task) = state.main_task.take() {
            task.abort();
        }
        if let Some(task) = state.debounce_task.take() {
            task.abort();
        }
        let dropped = state.pending.len();
        state.pending.clear();
        if was_active {
            info!(dropped_pending = dropped, known = state.known.len(), "protection scanner stopped");
            Transition::Changed
        } else {
            Transition::Unchanged
        }
    }

    fn reconfigure(
        self: &Arc<Self>,
        state: &mut ScannerState,
        app_type: AppType,
        interval: Duration,
        debounce: Duration,
        helper_markers: Option<Vec<String>>,
    ) {
        state.app_type = app_type;
        state.interval = interval;
        state.debounce_interval = debounce;
        state.helper_markers = helper_markers;
        state.tuner.reset();
        if state.scanning {
            self.restart_main_timer(state);
        }
    }

    // ── timers ──────────────────────────────────────────────────────────

    fn restart_main_timer(self: &Arc<Self>, state: &mut ScannerState) {
        state.main_generation += 1;
        if let Some(task) = state.main_task.take() {
            task.abort();
        }
        let generation = state.main_generation;
        let weak = Arc::downgrade(self);
        state.main_task = Some(self.runtime.spawn(main_timer(weak, generation)));
    }

    fn arm_debounce_timer(self: &Arc<Self>, state: &mut ScannerState) {
        if state.debounce_task.is_some() {
            return;
        }
        let generation = state.debounce_generation;
        let delay = state.debounce_interval;
        let weak = Arc::downgrade(self);
        state.debounce_task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.flush_pending(generation);
            }
        }));
    }

    fn flush_pending(self: &Arc<Self>, generation: u64) {
        let batch = {
            let mut state = self.state.lock();
            if state.debounce_generation != generation {
                trace!("stale debounce tick ignored");
                return;
            }
            state.debounce_task = None;
            let pending: Vec<_> = state.pending.drain().map(|(_, d)| d).collect();
            pending
        };
        if !batch.is_empty() {
            debug!(batch = batch.len(), "debounce window elapsed, protecting batch");
            self.dispatch(batch);
        }
    }

    // ── cycle ───────────────────────────────────────────────────────────

    fn run_cycle(self: &Arc<Self>) -> ScanReport {
        let (pid, app_type, markers) = {
            let state = self.state.lock();
            (state.tracked_pid, state.app_type, state.helper_markers.clone())
        };
        let discovered = match pid {
            Some(pid) => self.discover(pid, app_type, markers.as_deref()),
            None => Vec::new(),
        };
        let submitted: Vec<ResourceId> = discovered.iter().map(|d| d.id()).collect();

        let (new, interval, retune) = {
            let mut state = self.state.lock();
            let new: Vec<ResourceId> = submitted
                .iter()
                .copied()
                .filter(|id| !state.known.contains(id))
                .collect();
            state.known = submitted.iter().copied().collect();
            let retune = self.retune(&mut state, submitted.len());
            (new, state.interval, retune)
        };

        self.request_protection(discovered);

        let report = ScanReport {
            discovered: submitted.len(),
            new,
            submitted,
            interval_ms: interval.as_millis() as u64,
            scanned_at: Utc::now(),
        };
        if !report.new.is_empty() {
            info!(pid = ?pid, new = ?report.new, total = report.discovered, "new resources discovered");
        } else {
            trace!(pid = ?pid, total = report.discovered, "scan cycle complete");
        }
        self.state.lock().last_report = Some(report.clone());
        if let Some(event) = retune {
            self.emit(event);
        }
        self.emit(ScannerEvent::ScanCompleted(report.clone()));
        report
    }

    /// The running timer picks up the new interval on its next sleep.
    fn retune(&self, state: &mut ScannerState, count: usize) -> Option<ScannerEvent> {
        if !state.adaptive {
            return None;
        }
        let from = state.interval;
        let to = state.tuner.propose(count, from)?;
        state.interval = to;
        info!(
            resources = count,
            from_ms = from.as_millis() as u64,
            to_ms = to.as_millis() as u64,
            "scan interval retuned"
        );
        Some(ScannerEvent::IntervalChanged {
            from,
            to,
            resource_count: count,
        })
    }

    /// Resources for `pid` and the relevant part of its process tree,
    /// deduplicated by id with the first sighting kept.
    fn discover(
        &self,
        pid: Pid,
        app_type: AppType,
        markers: Option<&[String]>,
    ) -> Vec<Arc<ResourceDescriptor>> {
        let backend = &self.backend;
        let mut pids = vec![pid];
        if app_type.is_multi_process() {
            pids.extend(
                backend
                    .list_descendant_process_ids(pid)
                    .into_iter()
                    .filter(|&child| self.is_helper(child, app_type, markers)),
            );
        } else {
            pids.extend(backend.list_child_process_ids(pid));
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for process in pids {
            for descriptor in backend.list_resources(process) {
                if seen.insert(descriptor.id()) {
                    out.push(descriptor);
                }
            }
        }
        out
    }

    fn is_helper(&self, pid: Pid, app_type: AppType, markers: Option<&[String]>) -> bool {
        match (markers, self.backend.process_name(pid)) {
            (Some(markers), Some(name)) => contains_marker(&name, markers),
            _ => self.backend.is_auxiliary_process(pid, app_type),
        }
    }

    // ── protection ──────────────────────────────────────────────────────

    fn request_protection(self: &Arc<Self>, descriptors: Vec<Arc<ResourceDescriptor>>) {
        if descriptors.is_empty() {
            return;
        }
        let immediate = {
            let mut state = self.state.lock();
            if state.debounce_enabled {
                for descriptor in descriptors {
                    state.pending.insert(descriptor.id(), descriptor);
                }
                self.arm_debounce_timer(&mut state);
                return;
            }
            descriptors
        };
        for descriptor in immediate {
            self.dispatch(vec![descriptor]);
        }
    }

    fn dispatch(self: &Arc<Self>, batch: Vec<Arc<ResourceDescriptor>>) {
        let inner = Arc::clone(self);
        self.executor
            .dispatch(Box::new(move || inner.protect_batch(batch)));
    }

    /// Runs on the execution context.
    fn protect_batch(&self, batch: Vec<Arc<ResourceDescriptor>>) {
        let now = Instant::now();
        let mut attempt = Vec::with_capacity(batch.len());
        let mut skipped = Vec::new();
        {
            let mut state = self.state.lock();
            let window = state.suppression_window;
            for descriptor in batch {
                let id = descriptor.id();
                match state.protected.get(&id).copied() {
                    Some(last) if now.duration_since(last) <= window => {
                        skipped.push((id, now.duration_since(last)));
                    }
                    _ => {
                        state.protected.insert(id, now);
                        attempt.push(descriptor);
                    }
                }
            }
        }

        for &(id, since_last) in &skipped {
            trace!(resource = id, since_last_ms = since_last.as_millis() as u64, "inside suppression window, skipped");
            self.emit(ScannerEvent::ResourceSkipped { id, since_last });
        }

        for descriptor in &attempt {
            let id = descriptor.id();
            if let Err(e) = descriptor.protect() {
                warn!(resource = id, error = %e, "failed to protect resource");
                self.emit(ScannerEvent::ProtectionFailed {
                    id,
                    reason: e.to_string(),
                });
                continue;
            }
            if let Err(e) = descriptor.set_level(descriptor.level()) {
                debug!(resource = id, error = %e, "level not applied");
            }
        }

        if !attempt.is_empty() {
            self.emit(ScannerEvent::BatchProtected {
                ids: attempt.iter().map(|d| d.id()).collect(),
                skipped: skipped.len(),
            });
        }
    }
}

async fn main_timer(weak: Weak<Inner>, generation: u64) {
    loop {
        let interval = {
            let Some(inner) = weak.upgrade() else { return };
            let state = inner.state.lock();
            if state.main_generation != generation {
                return;
            }
            state.interval
        };
        tokio::time::sleep(interval).await;
        let Some(inner) = weak.upgrade() else { return };
        if inner.state.lock().main_generation != generation {
            trace!("stale scan tick ignored");
            return;
        }
        inner.run_cycle();
    }
}
