//! Uniform handle for a discoverable resource.
//!
//! Metadata comes in three tiers that are loaded on first use and cached
//! until [`ResourceDescriptor::refresh`]:
//! - basic: title, frame, owner
//! - extended: level, sharing state
//! - protection status
//!
//! Mutations try the primary backend first and fall back to the secondary.

pub mod backend;

pub use backend::{
    BasicInfo, ExtendedInfo, Pid, Rect, ResourceBackend, ResourceId, SharingState,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use veil_core::{Result, VeilError};

/// Conventional floating level, kept above ordinary content.
pub const DEFAULT_ENFORCED_LEVEL: i64 = 3;

/// How `set_level` treats the caller's requested level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelPolicy {
    /// Always apply this level, whatever was requested.
    Enforced(i64),
    Requested,
}

impl LevelPolicy {
    pub fn from_setting(enforced_level: Option<i64>) -> Self {
        match enforced_level {
            Some(level) => LevelPolicy::Enforced(level),
            None => LevelPolicy::Requested,
        }
    }

    pub fn resolve(self, requested: i64) -> i64 {
        match self {
            LevelPolicy::Enforced(level) => level,
            LevelPolicy::Requested => requested,
        }
    }
}

impl Default for LevelPolicy {
    fn default() -> Self {
        LevelPolicy::Enforced(DEFAULT_ENFORCED_LEVEL)
    }
}

#[derive(Debug, Default)]
struct InfoCache {
    basic: Option<BasicInfo>,
    extended: Option<ExtendedInfo>,
    protected: Option<bool>,
}

/// Serializable view of a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub id: ResourceId,
    pub owner_pid: Pid,
    pub owner_name: String,
    pub title: String,
    pub frame: Rect,
    pub on_screen: bool,
    pub level: i64,
    pub sharing: SharingState,
    pub protected: bool,
    pub backends: Vec<String>,
}

pub struct ResourceDescriptor {
    id: ResourceId,
    owner_pid: Pid,
    primary: Option<Arc<dyn ResourceBackend>>,
    fallback: Option<Arc<dyn ResourceBackend>>,
    level_policy: LevelPolicy,
    cache: Mutex<InfoCache>,
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("id", &self.id)
            .field("owner_pid", &self.owner_pid)
            .field("backends", &self.backend_names())
            .finish()
    }
}

impl ResourceDescriptor {
    pub fn new(id: ResourceId, owner_pid: Pid) -> Self {
        Self {
            id,
            owner_pid,
            primary: None,
            fallback: None,
            level_policy: LevelPolicy::default(),
            cache: Mutex::new(InfoCache::default()),
        }
    }

    pub fn with_primary(mut self, backend: Arc<dyn ResourceBackend>) -> Self {
        self.primary = Some(backend);
        self
    }

    pub fn with_fallback(mut self, backend: Arc<dyn ResourceBackend>) -> Self {
        self.fallback = Some(backend);
        self
    }

    pub fn with_level_policy(mut self, policy: LevelPolicy) -> Self {
        self.level_policy = policy;
        self
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn owner_pid(&self) -> Pid {
        self.owner_pid
    }

    pub fn level_policy(&self) -> LevelPolicy {
        self.level_policy
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends().map(|b| b.name().to_string()).collect()
    }

    fn backends(&self) -> impl Iterator<Item = &Arc<dyn ResourceBackend>> {
        self.primary.iter().chain(self.fallback.iter())
    }

    /// First answer from the backends, in order.
    fn query<T>(&self, f: impl Fn(&dyn ResourceBackend) -> Option<T>) -> Option<T> {
        self.backends().find_map(|b| f(b.as_ref()))
    }

    // ── metadata ────────────────────────────────────────────────────────

    pub fn basic(&self) -> BasicInfo {
        let mut cache = self.cache.lock();
        if let Some(info) = &cache.basic {
            return info.clone();
        }
        let info = self
            .query(|b| b.basic_info(self.id))
            .unwrap_or_else(|| BasicInfo {
                owner_pid: self.owner_pid,
                ..BasicInfo::default()
            });
        cache.basic = Some(info.clone());
        info
    }

    pub fn extended(&self) -> ExtendedInfo {
        let mut cache = self.cache.lock();
        if let Some(info) = cache.extended {
            return info;
        }
        let info = self.query(|b| b.extended_info(self.id)).unwrap_or_default();
        cache.extended = Some(info);
        info
    }

    pub fn is_protected(&self) -> bool {
        let mut cache = self.cache.lock();
        if let Some(protected) = cache.protected {
            return protected;
        }
        let protected = self
            .query(|b| b.protection_status(self.id))
            .unwrap_or(false);
        cache.protected = Some(protected);
        protected
    }

    pub fn title(&self) -> String {
        self.basic().title
    }

    pub fn frame(&self) -> Rect {
        self.basic().frame
    }

    pub fn is_on_screen(&self) -> bool {
        self.basic().on_screen
    }

    pub fn level(&self) -> i64 {
        self.extended().level
    }

    pub fn sharing_state(&self) -> SharingState {
        self.extended().sharing
    }

    pub fn exists(&self) -> bool {
        self.backends().any(|b| b.exists(self.id))
    }

    /// Reload every tier. Returns false, leaving the cache as it was, when
    /// the resource is gone.
    pub fn refresh(&self) -> bool {
        if !self.exists() {
            debug!(resource = self.id, "refresh skipped, resource no longer exists");
            return false;
        }
        let basic = self.query(|b| b.basic_info(self.id));
        let extended = self.query(|b| b.extended_info(self.id));
        let protected = self.query(|b| b.protection_status(self.id));

        let mut cache = self.cache.lock();
        if basic.is_some() {
            cache.basic = basic;
        }
        if extended.is_some() {
            cache.extended = extended;
        }
        if protected.is_some() {
            cache.protected = protected;
        }
        true
    }

    // ── mutation ────────────────────────────────────────────────────────

    /// Protect through the primary backend, falling back to the secondary.
    pub fn protect(&self) -> Result<()> {
        for backend in self.backends() {
            match backend.protect(self.id) {
                Ok(()) => {
                    debug!(resource = self.id, backend = backend.name(), "resource protected");
                    let mut cache = self.cache.lock();
                    cache.protected = Some(true);
                    if let Some(extended) = cache.extended.as_mut() {
                        extended.sharing = SharingState::None;
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(resource = self.id, backend = backend.name(), error = %e, "protection attempt failed");
                }
            }
        }
        Err(VeilError::BackendUnavailable(self.id))
    }

    /// Apply a level. Under [`LevelPolicy::Enforced`] the requested value
    /// is replaced by the enforced one. Returns the level applied.
    pub fn set_level(&self, requested: i64) -> Result<i64> {
        let level = self.level_policy.resolve(requested);
        if level != requested {
            debug!(resource = self.id, requested, level, "requested level replaced by enforced level");
        }
        for backend in self.backends() {
            match backend.set_level(self.id, level) {
                Ok(()) => {
                    if let Some(extended) = self.cache.lock().extended.as_mut() {
                        extended.level = level;
                    }
                    return Ok(level);
                }
                Err(e) => {
                    warn!(resource = self.id, backend = backend.name(), error = %e, "set level failed");
                }
            }
        }
        Err(VeilError::BackendUnavailable(self.id))
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        let basic = self.basic();
        let extended = self.extended();
        ResourceSnapshot {
            id: self.id,
            owner_pid: self.owner_pid,
            owner_name: basic.owner_name,
            title: basic.title,
            frame: basic.frame,
            on_screen: basic.on_screen,
            level: extended.level,
            sharing: extended.sharing,
            protected: self.is_protected(),
            backends: self.backend_names(),
        }
    }
}
