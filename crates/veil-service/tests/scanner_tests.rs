use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use veil_core::context::{InlineContext, SerialContext};
use veil_core::{Result, Transition, VeilError};
use veil_service::discovery::{AppType, DiscoveryBackend};
use veil_service::resource::{
    BasicInfo, ExtendedInfo, Pid, ResourceBackend, ResourceDescriptor, ResourceId,
};
use veil_service::{MultiProcessOptions, ProtectionScanner, ScannerConfig, ScannerEvent};

const ROOT: Pid = 100;

/// Counts protection calls per resource.
#[derive(Default)]
struct Ledger {
    protects: Mutex<HashMap<ResourceId, usize>>,
    failing: Mutex<HashSet<ResourceId>>,
}

impl Ledger {
    fn count(&self, id: ResourceId) -> usize {
        self.protects.lock().get(&id).copied().unwrap_or(0)
    }

    fn total(&self) -> usize {
        self.protects.lock().values().sum()
    }
}

impl ResourceBackend for Ledger {
    fn name(&self) -> &str {
        "ledger"
    }

    fn exists(&self, _id: ResourceId) -> bool {
        true
    }

    fn basic_info(&self, _id: ResourceId) -> Option<BasicInfo> {
        Some(BasicInfo::default())
    }

    fn extended_info(&self, _id: ResourceId) -> Option<ExtendedInfo> {
        Some(ExtendedInfo::default())
    }

    fn protection_status(&self, id: ResourceId) -> Option<bool> {
        Some(self.count(id) > 0)
    }

    fn protect(&self, id: ResourceId) -> Result<()> {
        *self.protects.lock().entry(id).or_default() += 1;
        if self.failing.lock().contains(&id) {
            return Err(VeilError::BackendUnavailable(id));
        }
        Ok(())
    }

    fn set_level(&self, _id: ResourceId, _level: i64) -> Result<()> {
        Ok(())
    }
}

/// Discovery over a scripted process tree.
struct Scripted {
    ledger: Arc<Ledger>,
    children: HashMap<Pid, Vec<Pid>>,
    names: HashMap<Pid, &'static str>,
    resources: Mutex<HashMap<Pid, Vec<ResourceId>>>,
}

impl Scripted {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            ledger: Arc::new(Ledger::default()),
            children: HashMap::from([(ROOT, vec![101, 102]), (101, vec![103])]),
            names: HashMap::from([
                (ROOT, "Chat"),
                (101, "Chat Helper (Renderer)"),
                (102, "crashpad_handler"),
                (103, "Chat Helper (GPU)"),
            ]),
            resources: Mutex::new(HashMap::new()),
        })
    }

    fn set(&self, pid: Pid, ids: impl IntoIterator<Item = ResourceId>) {
        self.resources.lock().insert(pid, ids.into_iter().collect());
    }

    fn descriptor(&self, id: ResourceId) -> Arc<ResourceDescriptor> {
        let backend: Arc<dyn ResourceBackend> = self.ledger.clone();
        Arc::new(ResourceDescriptor::new(id, ROOT).with_primary(backend))
    }
}

impl DiscoveryBackend for Scripted {
    fn list_resources(&self, pid: Pid) -> Vec<Arc<ResourceDescriptor>> {
        let ids = self.resources.lock().get(&pid).cloned().unwrap_or_default();
        let backend: Arc<dyn ResourceBackend> = self.ledger.clone();
        ids.into_iter()
            .map(|id| Arc::new(ResourceDescriptor::new(id, pid).with_primary(backend.clone())))
            .collect()
    }

    fn list_child_process_ids(&self, pid: Pid) -> Vec<Pid> {
        self.children.get(&pid).cloned().unwrap_or_default()
    }

    fn is_auxiliary_process(&self, pid: Pid, _app_type: AppType) -> bool {
        self.names.get(&pid).is_some_and(|n| n.contains("Helper"))
    }

    fn process_name(&self, pid: Pid) -> Option<String> {
        self.names.get(&pid).map(|n| n.to_string())
    }
}

fn config(debounce: Option<u64>, adaptive: bool) -> ScannerConfig {
    ScannerConfig {
        interval: Duration::from_secs(1),
        adaptive,
        debounce_enabled: debounce.is_some(),
        debounce_interval: Duration::from_millis(debounce.unwrap_or(100)),
        suppression_window: Duration::from_secs(1),
    }
}

fn scanner(discovery: &Arc<Scripted>, config: ScannerConfig) -> ProtectionScanner {
    let backend: Arc<dyn DiscoveryBackend> = discovery.clone();
    let scanner = ProtectionScanner::new(backend, Arc::new(InlineContext), config).unwrap();
    scanner.track_process(ROOT);
    scanner
}

fn drain(rx: &mut broadcast::Receiver<ScannerEvent>) -> Vec<ScannerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn batches(events: &[ScannerEvent]) -> Vec<Vec<ResourceId>> {
    events
        .iter()
        .filter_map(|e| match e {
            ScannerEvent::BatchProtected { ids, .. } => {
                let mut ids = ids.clone();
                ids.sort_unstable();
                Some(ids)
            }
            _ => None,
        })
        .collect()
}

fn scans(events: &[ScannerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ScannerEvent::ScanCompleted(_)))
        .count()
}

// ── cycle ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn newly_discovered_resource_joins_known_set() {
    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(None, false));

    discovery.set(ROOT, [1, 2, 3]);
    let first = scanner.scan_now();
    assert_eq!(first.new, vec![1, 2, 3]);
    assert_eq!(scanner.known_resources(), vec![1, 2, 3]);

    discovery.set(ROOT, [1, 2, 3, 4]);
    let second = scanner.scan_now();
    assert_eq!(second.new, vec![4]);
    assert_eq!(second.submitted, vec![1, 2, 3, 4]);
    assert_eq!(second.discovered, 4);
    assert_eq!(scanner.known_resources(), vec![1, 2, 3, 4]);

    // 1..3 are still inside the suppression window.
    assert_eq!(discovery.ledger.count(1), 1);
    assert_eq!(discovery.ledger.count(4), 1);
    assert_eq!(scanner.protected_resources(), vec![1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn vanished_resources_leave_known_set() {
    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(None, false));
    discovery.set(ROOT, [1, 2]);
    scanner.scan_now();
    discovery.set(ROOT, [2]);
    let report = scanner.scan_now();
    assert!(report.new.is_empty());
    assert_eq!(scanner.known_resources(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn standard_strategy_lists_one_level_of_children() {
    let discovery = Scripted::new();
    discovery.set(ROOT, [1]);
    discovery.set(101, [2]);
    discovery.set(102, [3]);
    discovery.set(103, [4, 1]);
    let scanner = scanner(&discovery, config(None, false));
    scanner.configure_for_application_type(AppType::Standard);

    assert_eq!(scanner.scan_now().submitted, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn multi_process_strategy_walks_auxiliary_descendants() {
    let discovery = Scripted::new();
    discovery.set(ROOT, [1]);
    discovery.set(101, [2]);
    discovery.set(102, [3]);
    discovery.set(103, [4, 1]);
    let scanner = scanner(&discovery, config(None, false));
    scanner.configure_for_application_type(AppType::MultiProcessA);

    // 102 is not a helper; 1 seen again under 103 is deduplicated.
    assert_eq!(scanner.scan_now().submitted, vec![1, 2, 4]);
}

#[tokio::test]
async fn untracked_scanner_finds_nothing() {
    let discovery = Scripted::new();
    discovery.set(ROOT, [1]);
    let backend: Arc<dyn DiscoveryBackend> = discovery.clone();
    let scanner =
        ProtectionScanner::new(backend, Arc::new(InlineContext), config(None, false)).unwrap();
    assert_eq!(scanner.scan_now().discovered, 0);
    assert_eq!(discovery.ledger.total(), 0);
}

// ── debounce and suppression ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn burst_within_debounce_window_is_one_batch() {
    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(Some(200), false));
    let mut rx = scanner.subscribe();

    for id in 0..10 {
        scanner.request_protection(discovery.descriptor(id));
        tokio::time::advance(Duration::from_millis(10)).await;
    }
    assert_eq!(scanner.pending_resources().len(), 10);
    assert_eq!(discovery.ledger.total(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;

    let events = drain(&mut rx);
    assert_eq!(batches(&events), vec![(0..10).collect::<Vec<_>>()]);
    assert_eq!(discovery.ledger.total(), 10);
    assert!(scanner.pending_resources().is_empty());
}

#[tokio::test(start_paused = true)]
async fn repeated_request_in_one_window_is_protected_once() {
    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(Some(100), false));
    for _ in 0..5 {
        scanner.request_protection(discovery.descriptor(7));
    }
    assert_eq!(scanner.pending_resources(), vec![7]);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(discovery.ledger.count(7), 1);
}

#[tokio::test(start_paused = true)]
async fn suppression_window_skips_recent_resources() {
    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(None, false));
    let mut rx = scanner.subscribe();
    let resource = discovery.descriptor(5);

    scanner.request_protection(resource.clone());
    assert_eq!(discovery.ledger.count(5), 1);

    tokio::time::advance(Duration::from_millis(500)).await;
    scanner.request_protection(resource.clone());
    assert_eq!(discovery.ledger.count(5), 1);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, ScannerEvent::ResourceSkipped { id: 5, .. })));

    tokio::time::advance(Duration::from_millis(600)).await;
    scanner.request_protection(resource);
    assert_eq!(discovery.ledger.count(5), 2);
}

#[tokio::test(start_paused = true)]
async fn resource_at_window_boundary_is_still_skipped() {
    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(None, false));
    let resource = discovery.descriptor(6);

    scanner.request_protection(resource.clone());
    tokio::time::advance(Duration::from_secs(1)).await;
    scanner.request_protection(resource.clone());
    assert_eq!(discovery.ledger.count(6), 1);

    tokio::time::advance(Duration::from_millis(1)).await;
    scanner.request_protection(resource);
    assert_eq!(discovery.ledger.count(6), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_protection_is_reported_and_still_suppressed() {
    let discovery = Scripted::new();
    discovery.ledger.failing.lock().insert(9);
    let scanner = scanner(&discovery, config(None, false));
    let mut rx = scanner.subscribe();

    scanner.request_protection(discovery.descriptor(9));
    scanner.request_protection(discovery.descriptor(9));

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, ScannerEvent::ProtectionFailed { id: 9, .. })));
    assert_eq!(discovery.ledger.count(9), 1);
    assert_eq!(scanner.protected_resources(), vec![9]);
}

#[tokio::test(start_paused = true)]
async fn disabling_debounce_flushes_pending() {
    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(Some(500), false));
    scanner.request_protection(discovery.descriptor(1));
    scanner.request_protection(discovery.descriptor(2));
    assert_eq!(discovery.ledger.total(), 0);

    scanner
        .set_protection_debounce(false, Duration::from_millis(500))
        .unwrap();
    assert_eq!(discovery.ledger.total(), 2);
    assert_eq!(scanner.debounce_interval(), None);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(discovery.ledger.total(), 2);
    assert!(scanner
        .set_protection_debounce(true, Duration::ZERO)
        .is_err());
}

#[tokio::test(start_paused = true)]
async fn protection_runs_on_serial_context() {
    let discovery = Scripted::new();
    let context = Arc::new(SerialContext::spawn("resources", &tokio::runtime::Handle::current()));
    let backend: Arc<dyn DiscoveryBackend> = discovery.clone();
    let scanner = ProtectionScanner::new(backend, context.clone(), config(None, false)).unwrap();

    scanner.request_protection(discovery.descriptor(1));
    scanner.request_protection(discovery.descriptor(2));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(discovery.ledger.total(), 2);
    assert_eq!(context.completed_jobs(), 2);
}

// ── adaptive interval ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn adaptive_interval_tightens_then_loosens() {
    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(None, true));
    let mut rx = scanner.subscribe();

    discovery.set(ROOT, 1..=3);
    scanner.scan_now();
    assert_eq!(scanner.current_interval(), Duration::from_secs(2));

    discovery.set(ROOT, 1..=20);
    scanner.scan_now();
    assert_eq!(scanner.current_interval(), Duration::from_millis(500));

    discovery.set(ROOT, 1..=3);
    scanner.scan_now();
    assert_eq!(scanner.current_interval(), Duration::from_secs(2));

    let changes = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ScannerEvent::IntervalChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        changes,
        vec![
            Duration::from_secs(2),
            Duration::from_millis(500),
            Duration::from_secs(2)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn boundary_fluctuation_keeps_interval() {
    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(None, true));

    discovery.set(ROOT, 1..=15);
    scanner.scan_now();
    assert_eq!(scanner.current_interval(), Duration::from_secs(1));

    for count in [16, 15, 16] {
        discovery.set(ROOT, 1..=count);
        scanner.scan_now();
        assert_eq!(scanner.current_interval(), Duration::from_secs(1));
    }
}

#[tokio::test(start_paused = true)]
async fn non_adaptive_scanner_keeps_interval() {
    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(None, false));
    discovery.set(ROOT, 1..=40);
    scanner.scan_now();
    assert_eq!(scanner.current_interval(), Duration::from_secs(1));

    scanner.set_adaptive(true);
    scanner.scan_now();
    assert_eq!(scanner.current_interval(), Duration::from_millis(250));
}

// ── lifecycle ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn timer_drives_scan_cycles() {
    let discovery = Scripted::new();
    discovery.set(ROOT, [1]);
    let scanner = scanner(&discovery, config(None, false));
    let mut rx = scanner.subscribe();

    assert_eq!(scanner.start(Duration::from_millis(100)).unwrap(), Transition::Changed);
    assert_eq!(scanner.start(Duration::from_millis(100)).unwrap(), Transition::Unchanged);
    tokio::time::sleep(Duration::from_millis(350)).await;

    let ticks = scans(&drain(&mut rx));
    assert!((3..=4).contains(&ticks), "unexpected tick count {ticks}");
    assert!(scanner.last_report().is_some());
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_timers_and_keeps_sets() {
    let discovery = Scripted::new();
    discovery.set(ROOT, [1, 2]);
    let scanner = scanner(&discovery, config(Some(200), false));
    let mut rx = scanner.subscribe();

    scanner.start(Duration::from_millis(100)).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(scanner.known_resources(), vec![1, 2]);
    assert_eq!(scanner.pending_resources(), vec![1, 2]);

    assert_eq!(scanner.stop(), Transition::Changed);
    assert_eq!(scanner.stop(), Transition::Unchanged);
    assert!(!scanner.is_scanning());
    assert!(scanner.pending_resources().is_empty());
    drain(&mut rx);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let after_stop = drain(&mut rx);
    assert_eq!(scans(&after_stop), 0);
    assert!(batches(&after_stop).is_empty());
    assert_eq!(discovery.ledger.total(), 0);

    scanner.start(Duration::from_millis(100)).unwrap();
    assert!(scanner.scan_now().new.is_empty());
    scanner.stop();
}

#[tokio::test(start_paused = true)]
async fn scan_now_keeps_timer_schedule() {
    let discovery = Scripted::new();
    discovery.set(ROOT, 1..=3);
    let scanner = scanner(&discovery, config(None, true));
    let mut rx = scanner.subscribe();

    scanner.start(Duration::from_secs(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    scanner.scan_now();
    assert_eq!(scanner.current_interval(), Duration::from_secs(2));
    drain(&mut rx);

    // The tick armed at start still lands at 1s.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(scans(&drain(&mut rx)), 1);

    // The retuned interval applies from that tick on.
    tokio::time::sleep(Duration::from_millis(1800)).await;
    assert_eq!(scans(&drain(&mut rx)), 0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(scans(&drain(&mut rx)), 1);
    scanner.stop();
}

#[tokio::test(start_paused = true)]
async fn configure_while_running_restarts_timer() {
    let discovery = Scripted::new();
    discovery.set(ROOT, [1]);
    let scanner = scanner(&discovery, config(None, false));
    let mut rx = scanner.subscribe();

    scanner.start(Duration::from_secs(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    scanner.configure_for_application_type(AppType::MultiProcessA);
    assert!(scanner.is_scanning());

    // The 1s tick was cancelled; the 500ms schedule starts at 600ms.
    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(scans(&drain(&mut rx)), 0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(scans(&drain(&mut rx)), 1);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(scans(&drain(&mut rx)), 1);

    scanner.stop();
    scanner.configure_for_application_type(AppType::Standard);
    assert!(!scanner.is_scanning());
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(scans(&drain(&mut rx)), 0);
}

#[tokio::test(start_paused = true)]
async fn application_presets_reconfigure_timing() {
    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(Some(100), false));

    scanner.configure_for_application_type(AppType::MultiProcessB);
    assert_eq!(scanner.application_type(), AppType::MultiProcessB);
    assert_eq!(scanner.current_interval(), Duration::from_millis(750));
    assert_eq!(scanner.debounce_interval(), Some(Duration::from_millis(250)));

    scanner.configure_for_application_type(AppType::Standard);
    assert_eq!(scanner.current_interval(), Duration::from_secs(1));
    assert_eq!(scanner.debounce_interval(), Some(Duration::from_millis(100)));
}

#[tokio::test(start_paused = true)]
async fn bundle_classification_selects_preset() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = dir.path().join("Chat.app");
    fs::create_dir_all(bundle.join("Contents/Frameworks/Electron Framework.framework")).unwrap();

    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(Some(100), false));
    assert_eq!(scanner.configure_for_bundle(&bundle), AppType::MultiProcessA);
    assert_eq!(scanner.current_interval(), Duration::from_millis(500));
    assert_eq!(scanner.debounce_interval(), Some(Duration::from_millis(200)));
}

#[tokio::test(start_paused = true)]
async fn advanced_multi_process_handling_overrides_preset() {
    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(Some(100), false));

    let app_type = scanner
        .enable_advanced_multi_process_handling(MultiProcessOptions::default())
        .unwrap();
    assert_eq!(app_type, AppType::MultiProcessA);
    assert_eq!(scanner.current_interval(), Duration::from_millis(500));
    assert_eq!(scanner.debounce_interval(), Some(Duration::from_millis(200)));
    assert!(scanner.helper_markers().is_none());

    let options = MultiProcessOptions::for_type(AppType::MultiProcessB)
        .with_interval(Duration::from_millis(300))
        .with_debounce(Duration::from_millis(50))
        .with_helper_markers(["Plugin"]);
    scanner.enable_advanced_multi_process_handling(options).unwrap();
    assert_eq!(scanner.application_type(), AppType::MultiProcessB);
    assert_eq!(scanner.current_interval(), Duration::from_millis(300));
    assert_eq!(scanner.debounce_interval(), Some(Duration::from_millis(50)));
    assert_eq!(scanner.helper_markers(), Some(vec!["Plugin".to_string()]));

    // Without an explicit type the current multi-process flavour is kept.
    scanner
        .enable_advanced_multi_process_handling(MultiProcessOptions::default())
        .unwrap();
    assert_eq!(scanner.application_type(), AppType::MultiProcessB);
    assert_eq!(scanner.current_interval(), Duration::from_millis(750));

    scanner.configure_for_application_type(AppType::Standard);
    assert!(scanner.helper_markers().is_none());
}

#[tokio::test(start_paused = true)]
async fn custom_helper_markers_replace_heuristic() {
    let discovery = Scripted::new();
    discovery.set(ROOT, [1]);
    discovery.set(101, [2]);
    discovery.set(102, [3]);
    discovery.set(103, [4]);
    let scanner = scanner(&discovery, config(None, false));

    let options = MultiProcessOptions::default().with_helper_markers(["CRASHPAD"]);
    scanner.enable_advanced_multi_process_handling(options).unwrap();
    assert_eq!(scanner.scan_now().submitted, vec![1, 3]);

    scanner.configure_for_application_type(AppType::MultiProcessA);
    assert_eq!(scanner.scan_now().submitted, vec![1, 2, 4]);
}

#[tokio::test(start_paused = true)]
async fn invalid_multi_process_options_are_rejected() {
    let discovery = Scripted::new();
    let scanner = scanner(&discovery, config(None, false));
    scanner.configure_for_application_type(AppType::Standard);

    let rejected = [
        MultiProcessOptions::for_type(AppType::Standard),
        MultiProcessOptions::default().with_interval(Duration::ZERO),
        MultiProcessOptions::default().with_debounce(Duration::ZERO),
        MultiProcessOptions::default().with_helper_markers(Vec::<String>::new()),
        MultiProcessOptions::default().with_helper_markers([" "]),
    ];
    for options in rejected {
        assert!(matches!(
            scanner.enable_advanced_multi_process_handling(options),
            Err(VeilError::InvalidArgument(_))
        ));
    }
    assert_eq!(scanner.application_type(), AppType::Standard);
    assert_eq!(scanner.current_interval(), Duration::from_secs(1));
}

#[tokio::test]
async fn tracking_another_process_resets_known_set() {
    let discovery = Scripted::new();
    discovery.set(ROOT, [1]);
    let scanner = scanner(&discovery, config(None, false));
    scanner.scan_now();
    assert_eq!(scanner.track_process(ROOT), Some(ROOT));
    assert_eq!(scanner.known_resources(), vec![1]);
    assert_eq!(scanner.track_process(200), Some(ROOT));
    assert!(scanner.known_resources().is_empty());
    assert_eq!(scanner.tracked_process(), Some(200));
}

#[test]
fn scanner_requires_runtime() {
    let discovery = Scripted::new();
    let backend: Arc<dyn DiscoveryBackend> = discovery;
    assert!(ProtectionScanner::new(backend, Arc::new(InlineContext), config(None, false)).is_err());
}
