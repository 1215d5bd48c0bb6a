//! Explicitly constructed service graph for one host process.

use crate::discovery::{DiscoveryBackend, ProcessAuditBackend};
use crate::resource::LevelPolicy;
use crate::scanner::{ProtectionScanner, ScannerConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use veil_core::bootstrap::{BootstrapConfig, BootstrapReport};
use veil_core::context::ExecutionContext;
use veil_core::interceptor::{
    HookTable, Interceptor, InterceptorContext, InterceptorOptions, InterceptorRegistry,
    PropertyInterceptor,
};
use veil_core::settings::VeilSettings;
use veil_core::{OverrideStore, ProfileManager};

pub const WINDOW_TYPE: &str = "Window";
pub const APPLICATION_TYPE: &str = "Application";

/// Interceptors every runtime registers, with the option bit that selects
/// them.
pub fn builtin_interceptors() -> Vec<(PropertyInterceptor, InterceptorOptions)> {
    vec![
        (
            PropertyInterceptor::new("window-properties")
                .with_description("serves window level, sharing and visibility overrides")
                .with_priority(10)
                .hooking(WINDOW_TYPE, "level")
                .hooking(WINDOW_TYPE, "sharingType")
                .hooking(WINDOW_TYPE, "ignoresMouseEvents")
                .hooking(WINDOW_TYPE, "hasShadow"),
            InterceptorOptions::WINDOW,
        ),
        (
            PropertyInterceptor::new("application-properties")
                .with_description("serves activation policy and presentation overrides")
                .depends_on("window-properties")
                .hooking(APPLICATION_TYPE, "activationPolicy")
                .hooking(APPLICATION_TYPE, "presentationOptions"),
            InterceptorOptions::APPLICATION,
        ),
    ]
}

pub struct VeilRuntime {
    pub settings: VeilSettings,
    pub store: Arc<OverrideStore>,
    pub hooks: Arc<HookTable>,
    pub profiles: ProfileManager,
    pub registry: InterceptorRegistry,
    executor: Arc<dyn ExecutionContext>,
}

impl VeilRuntime {
    pub fn new(settings: VeilSettings, executor: Arc<dyn ExecutionContext>) -> anyhow::Result<Self> {
        settings.validate()?;
        let store = Arc::new(OverrideStore::new());
        let hooks = Arc::new(HookTable::new());
        let profiles = ProfileManager::new(store.clone());
        let registry = InterceptorRegistry::new(InterceptorContext::new(
            hooks.clone(),
            store.clone(),
            executor.clone(),
        ));
        for (interceptor, option) in builtin_interceptors() {
            let name = interceptor.name().to_string();
            registry.register_interceptor(Arc::new(interceptor))?;
            registry.map_interceptor(&name, option)?;
        }
        Ok(Self {
            settings,
            store,
            hooks,
            profiles,
            registry,
            executor,
        })
    }

    pub fn load_profiles(&self, dir: &Path) -> anyhow::Result<usize> {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "profile directory missing, no profiles loaded");
            return Ok(0);
        }
        self.profiles.load_dir(dir)
    }

    pub fn bootstrap(&self, config: &BootstrapConfig) -> BootstrapReport {
        config.apply(&self.profiles)
    }

    /// Install the interceptors selected in settings. Partial failure is
    /// logged and tolerated.
    pub fn install_interceptors(&self) {
        let options = self.settings.interceptors.enabled;
        if let Err(e) = self.registry.install_with_options(options) {
            warn!(error = %e, "some interceptors failed to install");
        }
        info!(installed = ?self.registry.installed_interceptors(), "interceptors ready");
    }

    pub fn level_policy(&self) -> LevelPolicy {
        LevelPolicy::from_setting(self.settings.resources.enforced_level)
    }

    /// Live process-audit backend configured from settings.
    pub fn audit_backend(&self) -> Arc<ProcessAuditBackend> {
        Arc::new(ProcessAuditBackend::live(self.level_policy()))
    }

    pub fn scanner(&self, backend: Arc<dyn DiscoveryBackend>) -> veil_core::Result<ProtectionScanner> {
        ProtectionScanner::new(
            backend,
            self.executor.clone(),
            ScannerConfig::from(&self.settings.scanner),
        )
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.registry.teardown() {
            warn!(error = %e, "interceptor teardown incomplete");
        }
    }
}
