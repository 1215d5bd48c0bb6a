//! Discovery boundary: what the scanner needs to know about a process tree.

pub mod audit;
pub mod process_table;

pub use audit::ProcessAuditBackend;
pub use process_table::{ProcessEntry, ProcessTable};

use crate::resource::{Pid, ResourceDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Host application architecture, as far as discovery cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppType {
    Standard,
    /// Electron-style: a main process plus helper renderers.
    MultiProcessA,
    /// Chromium-style: browser process plus GPU, renderer and utility helpers.
    MultiProcessB,
    #[default]
    Unknown,
}

/// Timing preset applied by `configure_for_application_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPreset {
    pub interval: Duration,
    pub debounce: Duration,
}

impl AppType {
    pub fn preset(self) -> ScanPreset {
        let (interval_ms, debounce_ms) = match self {
            AppType::Standard | AppType::Unknown => (1000, 100),
            AppType::MultiProcessA => (500, 200),
            AppType::MultiProcessB => (750, 250),
        };
        ScanPreset {
            interval: Duration::from_millis(interval_ms),
            debounce: Duration::from_millis(debounce_ms),
        }
    }

    /// Multi-process types walk the whole descendant tree.
    pub fn is_multi_process(self) -> bool {
        matches!(self, AppType::MultiProcessA | AppType::MultiProcessB)
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppType::Standard => "standard",
            AppType::MultiProcessA => "multi_process_a",
            AppType::MultiProcessB => "multi_process_b",
            AppType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

const ELECTRON_FRAMEWORK: &str = "Electron Framework.framework";
const CHROMIUM_FRAMEWORKS: &[&str] = &[
    "Chromium Framework.framework",
    "Google Chrome Framework.framework",
];

/// Classify by the frameworks bundled next to the executable.
///
/// Accepts either the bundle root or a path inside it; anything up to and
/// including the `.app` component is taken as the root.
pub fn classify_bundle_path(path: &Path) -> AppType {
    let root = bundle_root(path);
    let frameworks = root.join("Contents").join("Frameworks");
    if !frameworks.is_dir() {
        return if root.exists() {
            AppType::Standard
        } else {
            AppType::Unknown
        };
    }
    if frameworks.join(ELECTRON_FRAMEWORK).exists() {
        return AppType::MultiProcessA;
    }
    if CHROMIUM_FRAMEWORKS
        .iter()
        .any(|name| frameworks.join(name).exists())
    {
        return AppType::MultiProcessB;
    }
    AppType::Standard
}

fn bundle_root(path: &Path) -> &Path {
    path.ancestors()
        .find(|p| p.extension().is_some_and(|ext| ext == "app"))
        .unwrap_or(path)
}

/// Helper process markers by architecture.
const ELECTRON_HELPER_MARKERS: &[&str] = &["helper", "renderer"];
const CHROMIUM_HELPER_MARKERS: &[&str] = &["helper", "renderer", "gpu", "utility", "--type="];

/// Name/role heuristic shared by the bundled backends.
pub fn looks_auxiliary(name: &str, app_type: AppType) -> bool {
    match app_type {
        AppType::MultiProcessA => contains_marker(name, ELECTRON_HELPER_MARKERS),
        AppType::MultiProcessB => contains_marker(name, CHROMIUM_HELPER_MARKERS),
        AppType::Standard | AppType::Unknown => false,
    }
}

/// Case-insensitive substring match against any of `markers`.
pub fn contains_marker<S: AsRef<str>>(name: &str, markers: &[S]) -> bool {
    let name = name.to_lowercase();
    markers
        .iter()
        .any(|m| name.contains(&m.as_ref().to_lowercase()))
}

/// Source of resources and process relationships.
pub trait DiscoveryBackend: Send + Sync {
    /// Resources owned directly by `pid`.
    fn list_resources(&self, pid: Pid) -> Vec<Arc<ResourceDescriptor>>;

    fn list_child_process_ids(&self, pid: Pid) -> Vec<Pid>;

    /// Whether `pid` is a helper process that may own resources for the
    /// application.
    fn is_auxiliary_process(&self, pid: Pid, app_type: AppType) -> bool;

    /// Name and role of `pid`, when the backend knows it. Custom helper
    /// markers are matched against this.
    fn process_name(&self, _pid: Pid) -> Option<String> {
        None
    }

    /// Every process below `pid`, breadth first. `pid` itself is excluded.
    fn list_descendant_process_ids(&self, pid: Pid) -> Vec<Pid> {
        let mut seen = HashSet::from([pid]);
        let mut queue = VecDeque::from([pid]);
        let mut out = Vec::new();
        while let Some(parent) = queue.pop_front() {
            for child in self.list_child_process_ids(parent) {
                if seen.insert(child) {
                    out.push(child);
                    queue.push_back(child);
                }
            }
        }
        out
    }

    fn classify_application(&self, bundle_path: &Path) -> AppType {
        classify_bundle_path(bundle_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    struct Tree(HashMap<Pid, Vec<Pid>>);

    impl DiscoveryBackend for Tree {
        fn list_resources(&self, _pid: Pid) -> Vec<Arc<ResourceDescriptor>> {
            Vec::new()
        }

        fn list_child_process_ids(&self, pid: Pid) -> Vec<Pid> {
            self.0.get(&pid).cloned().unwrap_or_default()
        }

        fn is_auxiliary_process(&self, _pid: Pid, _app_type: AppType) -> bool {
            false
        }
    }

    #[test]
    fn descendants_are_breadth_first_and_loop_safe() {
        let tree = Tree(HashMap::from([
            (1, vec![2, 3]),
            (2, vec![4]),
            (3, vec![5]),
            (4, vec![1]),
        ]));
        assert_eq!(tree.list_descendant_process_ids(1), vec![2, 3, 4, 5]);
        assert!(tree.list_descendant_process_ids(9).is_empty());
    }

    #[test]
    fn bundle_classification_reads_frameworks() {
        let dir = tempfile::tempdir().unwrap();
        let electron = dir.path().join("Chat.app");
        fs::create_dir_all(electron.join("Contents/Frameworks/Electron Framework.framework"))
            .unwrap();
        let chrome = dir.path().join("Browser.app");
        fs::create_dir_all(chrome.join("Contents/Frameworks/Chromium Framework.framework"))
            .unwrap();
        let plain = dir.path().join("Notes.app");
        fs::create_dir_all(plain.join("Contents/MacOS")).unwrap();

        assert_eq!(classify_bundle_path(&electron), AppType::MultiProcessA);
        assert_eq!(
            classify_bundle_path(&electron.join("Contents/MacOS/Chat")),
            AppType::MultiProcessA
        );
        assert_eq!(classify_bundle_path(&chrome), AppType::MultiProcessB);
        assert_eq!(classify_bundle_path(&plain), AppType::Standard);
        assert_eq!(
            classify_bundle_path(&dir.path().join("Missing.app")),
            AppType::Unknown
        );
    }

    #[test]
    fn presets_match_application_types() {
        assert_eq!(AppType::Standard.preset(), AppType::Unknown.preset());
        assert_eq!(AppType::MultiProcessA.preset().interval, Duration::from_millis(500));
        assert_eq!(AppType::MultiProcessB.preset().debounce, Duration::from_millis(250));
        assert!(!AppType::Standard.is_multi_process());
    }

    #[test]
    fn helper_heuristic_depends_on_type() {
        assert!(looks_auxiliary("Chat Helper (Renderer)", AppType::MultiProcessA));
        assert!(looks_auxiliary("chrome --type=gpu-process", AppType::MultiProcessB));
        assert!(!looks_auxiliary("Chat Helper", AppType::Standard));
        assert!(!looks_auxiliary("Chat", AppType::MultiProcessA));
    }

    #[test]
    fn custom_markers_ignore_case() {
        assert!(contains_marker("Code Helper (Plugin)", &["PLUGIN"]));
        assert!(!contains_marker("Code", &["plugin", "worker"]));
        assert!(!contains_marker::<&str>("Code Helper", &[]));
    }
}
