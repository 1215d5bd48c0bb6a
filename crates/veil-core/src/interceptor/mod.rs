//! Pluggable interceptors and their lifecycle.
//!
//! An interceptor owns a family of hooks in the [`HookTable`]. The
//! [`InterceptorRegistry`] installs interceptors in dependency order and
//! tears them down dependents-first.

pub mod hooks;
pub mod property;
pub mod registry;

pub use hooks::{HookTable, OperationHandler, OperationTarget, OverrideHandler};
pub use property::PropertyInterceptor;
pub use registry::InterceptorRegistry;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::overrides::OverrideStore;
use serde::{Deserialize, Serialize};
use std::ops::BitOr;
use std::sync::Arc;

/// Handles passed to every install/uninstall hook.
#[derive(Clone)]
pub struct InterceptorContext {
    pub hooks: Arc<HookTable>,
    pub overrides: Arc<OverrideStore>,
    pub executor: Arc<dyn ExecutionContext>,
}

impl InterceptorContext {
    pub fn new(
        hooks: Arc<HookTable>,
        overrides: Arc<OverrideStore>,
        executor: Arc<dyn ExecutionContext>,
    ) -> Self {
        Self {
            hooks,
            overrides,
            executor,
        }
    }
}

pub trait Interceptor: Send + Sync {
    /// Unique identity within a registry.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Higher installs earlier among independent interceptors.
    fn priority(&self) -> i32 {
        0
    }

    /// Names of interceptors that must be installed first.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn install(&self, ctx: &InterceptorContext) -> Result<()>;

    /// Must cancel any timers the interceptor started before returning.
    fn uninstall(&self, ctx: &InterceptorContext) -> Result<()>;

    fn is_installed(&self) -> bool;
}

/// Selection mask for [`InterceptorRegistry::install_with_options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterceptorOptions(u32);

impl InterceptorOptions {
    pub const NONE: Self = Self(0);
    pub const WINDOW: Self = Self(1 << 0);
    pub const APPLICATION: Self = Self(1 << 1);
    pub const ALL: Self = Self(u32::MAX);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for InterceptorOptions {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for InterceptorOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
