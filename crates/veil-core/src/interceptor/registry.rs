//! Dependency-ordered interceptor lifecycle.
//!
//! Install order is a depth-first topological sort over declared
//! dependencies, with priority (higher first) breaking ties between
//! independent interceptors. Installs are best-effort: a failure is reported
//! but interceptors that already installed stay installed.
//!
//! Install and uninstall calls are serialized by `op_lock`. Interceptor hooks
//! run while it is held and must not call back into install/uninstall.

use super::{Interceptor, InterceptorContext, InterceptorOptions};
use crate::error::{EntityKind, Result, Transition, VeilError};
use parking_lot::{Mutex, RwLock};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct RegistryState {
    /// Registration order.
    registered: Vec<Arc<dyn Interceptor>>,
    /// Install order.
    installed: Vec<String>,
    options: HashMap<String, InterceptorOptions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

pub struct InterceptorRegistry {
    ctx: InterceptorContext,
    state: RwLock<RegistryState>,
    op_lock: Mutex<()>,
}

impl InterceptorRegistry {
    pub fn new(ctx: InterceptorContext) -> Self {
        Self {
            ctx,
            state: RwLock::new(RegistryState::default()),
            op_lock: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &InterceptorContext {
        &self.ctx
    }

    // ── registration ────────────────────────────────────────────────────

    pub fn register_interceptor(&self, interceptor: Arc<dyn Interceptor>) -> Result<Transition> {
        let name = interceptor.name().to_string();
        if name.trim().is_empty() {
            return Err(VeilError::InvalidArgument("interceptor name is empty".into()));
        }
        if interceptor.dependencies().iter().any(|d| d == &name) {
            return Err(VeilError::InvalidArgument(format!(
                "interceptor {name} depends on itself"
            )));
        }

        let mut state = self.state.write();
        if let Some(existing) = state.registered.iter().find(|i| i.name() == name) {
            if same_instance(existing, &interceptor) {
                warn!(interceptor = %name, "interceptor already registered");
                return Ok(Transition::Unchanged);
            }
            return Err(VeilError::InvalidArgument(format!(
                "another interceptor is already registered as {name}"
            )));
        }
        state.registered.push(interceptor);
        debug!(interceptor = %name, "interceptor registered");
        Ok(Transition::Changed)
    }

    /// Remove `name` from the registry, uninstalling it (and its dependents)
    /// first if needed.
    pub fn unregister_interceptor(&self, name: &str) -> Result<Transition> {
        let _op = self.op_lock.lock();
        if self.interceptor(name).is_none() {
            return Ok(Transition::Unchanged);
        }
        self.uninstall_locked(name, &mut HashSet::new())?;
        let mut state = self.state.write();
        state.registered.retain(|i| i.name() != name);
        state.options.remove(name);
        debug!(interceptor = %name, "interceptor unregistered");
        Ok(Transition::Changed)
    }

    pub fn interceptor(&self, name: &str) -> Option<Arc<dyn Interceptor>> {
        self.state
            .read()
            .registered
            .iter()
            .find(|i| i.name() == name)
            .cloned()
    }

    /// Names in registration order.
    pub fn registered_interceptors(&self) -> Vec<String> {
        self.state
            .read()
            .registered
            .iter()
            .map(|i| i.name().to_string())
            .collect()
    }

    /// Names in install order.
    pub fn installed_interceptors(&self) -> Vec<String> {
        self.state.read().installed.clone()
    }

    pub fn is_interceptor_installed(&self, name: &str) -> bool {
        self.state.read().installed.iter().any(|n| n == name)
    }

    pub fn map_interceptor(&self, name: &str, option: InterceptorOptions) -> Result<()> {
        if self.interceptor(name).is_none() {
            return Err(VeilError::not_found(EntityKind::Interceptor, name));
        }
        self.state.write().options.insert(name.to_string(), option);
        Ok(())
    }

    pub fn option_for(&self, name: &str) -> InterceptorOptions {
        self.state
            .read()
            .options
            .get(name)
            .copied()
            .unwrap_or(InterceptorOptions::NONE)
    }

    // ── install ─────────────────────────────────────────────────────────

    pub fn install_all(&self) -> Result<()> {
        let _op = self.op_lock.lock();
        let candidates = self.state.read().registered.clone();
        let order = topological_order(&candidates);
        info!(count = order.len(), "installing all interceptors");
        self.install_sequence(&order)
    }

    /// Install only interceptors mapped to an option in `options`.
    /// [`InterceptorOptions::ALL`] also selects unmapped interceptors.
    pub fn install_with_options(&self, options: InterceptorOptions) -> Result<()> {
        let _op = self.op_lock.lock();
        let candidates: Vec<Arc<dyn Interceptor>> = {
            let state = self.state.read();
            state
                .registered
                .iter()
                .filter(|i| {
                    options == InterceptorOptions::ALL
                        || state
                            .options
                            .get(i.name())
                            .map(|o| o.intersects(options))
                            .unwrap_or(false)
                })
                .cloned()
                .collect()
        };
        let order = topological_order(&candidates);
        info!(options = options.bits(), count = order.len(), "installing selected interceptors");
        self.install_sequence(&order)
    }

    /// Install `name`, installing its dependencies first.
    pub fn install_interceptor(&self, name: &str) -> Result<Transition> {
        let _op = self.op_lock.lock();
        self.install_locked(name, &mut HashSet::new())
    }

    fn install_sequence(&self, order: &[String]) -> Result<()> {
        let mut failed = Vec::new();
        for name in order {
            if let Err(e) = self.install_locked(name, &mut HashSet::new()) {
                warn!(interceptor = %name, error = %e, "interceptor not installed");
                failed.push(name.clone());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(VeilError::Incomplete { failed })
        }
    }

    fn install_locked(&self, name: &str, in_progress: &mut HashSet<String>) -> Result<Transition> {
        if self.is_interceptor_installed(name) {
            debug!(interceptor = %name, "already installed");
            return Ok(Transition::Unchanged);
        }
        let interceptor = self
            .interceptor(name)
            .ok_or_else(|| VeilError::not_found(EntityKind::Interceptor, name))?;

        if !in_progress.insert(name.to_string()) {
            warn!(interceptor = %name, "dependency cycle while installing");
            return Err(VeilError::CycleDetected(name.to_string()));
        }

        for dependency in interceptor.dependencies() {
            if let Err(e) = self.install_locked(&dependency, in_progress) {
                in_progress.remove(name);
                warn!(interceptor = %name, dependency = %dependency, error = %e, "dependency failed to install");
                return Err(VeilError::DependencyFailure {
                    name: name.to_string(),
                    dependency,
                });
            }
        }

        let outcome = interceptor.install(&self.ctx);
        in_progress.remove(name);
        match outcome {
            Ok(()) => {
                if !interceptor.is_installed() {
                    warn!(interceptor = %name, "install hook succeeded but interceptor reports not installed");
                }
                self.state.write().installed.push(name.to_string());
                info!(interceptor = %name, priority = interceptor.priority(), "interceptor installed");
                Ok(Transition::Changed)
            }
            Err(e) => {
                error!(interceptor = %name, error = %e, "install hook failed");
                Err(hook_failure(name, e))
            }
        }
    }

    // ── uninstall ───────────────────────────────────────────────────────

    /// Uninstall everything, most recently installed first.
    pub fn uninstall_all(&self) -> Result<()> {
        let _op = self.op_lock.lock();
        let order: Vec<String> = self.state.read().installed.iter().rev().cloned().collect();
        let mut failed = Vec::new();
        for name in &order {
            if let Err(e) = self.uninstall_locked(name, &mut HashSet::new()) {
                warn!(interceptor = %name, error = %e, "interceptor not uninstalled");
                failed.push(name.clone());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(VeilError::Incomplete { failed })
        }
    }

    /// Uninstall `name`, uninstalling anything installed that depends on it
    /// first.
    pub fn uninstall_interceptor(&self, name: &str) -> Result<Transition> {
        let _op = self.op_lock.lock();
        self.uninstall_locked(name, &mut HashSet::new())
    }

    fn uninstall_locked(&self, name: &str, in_progress: &mut HashSet<String>) -> Result<Transition> {
        if !self.is_interceptor_installed(name) {
            return Ok(Transition::Unchanged);
        }
        let interceptor = self
            .interceptor(name)
            .ok_or_else(|| VeilError::not_found(EntityKind::Interceptor, name))?;

        if !in_progress.insert(name.to_string()) {
            warn!(interceptor = %name, "dependency cycle while uninstalling");
            return Err(VeilError::CycleDetected(name.to_string()));
        }

        for dependent in self.installed_dependents(name) {
            debug!(interceptor = %name, dependent = %dependent, "uninstalling dependent first");
            if let Err(e) = self.uninstall_locked(&dependent, in_progress) {
                in_progress.remove(name);
                return Err(VeilError::HookFailed {
                    name: name.to_string(),
                    reason: format!("dependent {dependent} could not be uninstalled: {e}"),
                });
            }
        }

        let outcome = interceptor.uninstall(&self.ctx);
        in_progress.remove(name);
        match outcome {
            Ok(()) => {
                self.state.write().installed.retain(|n| n != name);
                info!(interceptor = %name, "interceptor uninstalled");
                Ok(Transition::Changed)
            }
            Err(e) => {
                error!(interceptor = %name, error = %e, "uninstall hook failed");
                Err(hook_failure(name, e))
            }
        }
    }

    /// Installed interceptors declaring `name` as a dependency, latest first.
    fn installed_dependents(&self, name: &str) -> Vec<String> {
        let state = self.state.read();
        state
            .installed
            .iter()
            .rev()
            .filter(|installed| {
                state
                    .registered
                    .iter()
                    .find(|i| i.name() == installed.as_str())
                    .map(|i| i.dependencies().iter().any(|d| d == name))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Uninstall everything and forget all registrations.
    pub fn teardown(&self) -> Result<()> {
        let result = self.uninstall_all();
        let mut state = self.state.write();
        if state.installed.is_empty() {
            state.registered.clear();
            state.options.clear();
        } else {
            warn!(remaining = state.installed.len(), "teardown left interceptors installed");
        }
        result
    }
}

fn same_instance(a: &Arc<dyn Interceptor>, b: &Arc<dyn Interceptor>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

fn hook_failure(name: &str, e: VeilError) -> VeilError {
    match e {
        VeilError::HookFailed { .. } => e,
        other => VeilError::HookFailed {
            name: name.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Depth-first topological order over `candidates`.
///
/// Roots are visited by descending priority, ties in registration order.
/// Dependencies outside `candidates` are left out; the installer pulls them
/// in lazily. A node met again while still being visited is a cycle: it is
/// logged and the walk does not descend into it.
fn topological_order(candidates: &[Arc<dyn Interceptor>]) -> Vec<String> {
    let mut roots: Vec<&Arc<dyn Interceptor>> = candidates.iter().collect();
    roots.sort_by_key(|i| Reverse(i.priority()));

    let by_name: HashMap<&str, &Arc<dyn Interceptor>> =
        candidates.iter().map(|i| (i.name(), i)).collect();
    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut order = Vec::with_capacity(candidates.len());

    fn visit(
        name: &str,
        by_name: &HashMap<&str, &Arc<dyn Interceptor>>,
        marks: &mut HashMap<String, Mark>,
        order: &mut Vec<String>,
    ) {
        match marks.get(name) {
            Some(Mark::Visited) => return,
            Some(Mark::Visiting) => {
                warn!(interceptor = %name, "dependency cycle detected during ordering");
                return;
            }
            None => {}
        }
        let Some(node) = by_name.get(name) else {
            return;
        };
        marks.insert(name.to_string(), Mark::Visiting);
        for dependency in node.dependencies() {
            visit(&dependency, by_name, marks, order);
        }
        marks.insert(name.to_string(), Mark::Visited);
        order.push(name.to_string());
    }

    for root in roots {
        visit(root.name(), &by_name, &mut marks, &mut order);
    }
    order
}
