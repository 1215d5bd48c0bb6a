use super::hooks::OverrideHandler;
use super::{Interceptor, InterceptorContext};
use crate::error::{Result, VeilError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Re-reads one `(type, property)` on live instances after its hook changed.
pub type RefreshFn = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Hooks a fixed list of `(type, property)` getters with override lookups.
///
/// Live instances cache property values, so after hooks are installed or
/// removed the optional refresh callback is run for every hooked pair on the
/// context's executor.
pub struct PropertyInterceptor {
    name: String,
    description: String,
    priority: i32,
    dependencies: Vec<String>,
    properties: Vec<(String, String)>,
    refresh: Option<RefreshFn>,
    installed: AtomicBool,
}

impl PropertyInterceptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            priority: 0,
            dependencies: Vec::new(),
            properties: Vec::new(),
            refresh: None,
            installed: AtomicBool::new(false),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn hooking(mut self, target_type: impl Into<String>, property: impl Into<String>) -> Self {
        self.properties.push((target_type.into(), property.into()));
        self
    }

    pub fn on_refresh(mut self, refresh: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.refresh = Some(Arc::new(refresh));
        self
    }

    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    fn schedule_refresh(&self, ctx: &InterceptorContext) {
        let Some(refresh) = self.refresh.clone() else {
            return;
        };
        let properties = self.properties.clone();
        debug!(interceptor = %self.name, executor = ctx.executor.name(), "refresh scheduled");
        ctx.executor.dispatch(Box::new(move || {
            for (target_type, property) in &properties {
                refresh(target_type, property);
            }
        }));
    }
}

impl Interceptor for PropertyInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn install(&self, ctx: &InterceptorContext) -> Result<()> {
        let mut hooked: Vec<&(String, String)> = Vec::new();
        for pair in &self.properties {
            let (target_type, property) = pair;
            let handler = Arc::new(OverrideHandler::new(
                ctx.overrides.clone(),
                target_type,
                property,
            ));
            if let Err(e) = ctx.hooks.install_hook(target_type, property, handler) {
                // Leave the table as we found it.
                for (t, p) in hooked {
                    ctx.hooks.remove_hook(t, p);
                }
                return Err(VeilError::HookFailed {
                    name: self.name.clone(),
                    reason: e.to_string(),
                });
            }
            hooked.push(pair);
        }
        self.installed.store(true, Ordering::SeqCst);
        info!(interceptor = %self.name, hooks = self.properties.len(), "property hooks installed");
        self.schedule_refresh(ctx);
        Ok(())
    }

    fn uninstall(&self, ctx: &InterceptorContext) -> Result<()> {
        for (target_type, property) in &self.properties {
            if !ctx.hooks.remove_hook(target_type, property) {
                warn!(interceptor = %self.name, target_type = %target_type, property = %property, "hook already gone");
            }
        }
        self.installed.store(false, Ordering::SeqCst);
        self.schedule_refresh(ctx);
        Ok(())
    }

    fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }
}
