//! Discovery backend that treats each process as one resource.
//!
//! Protection is recorded rather than enforced, which makes the whole scanner
//! path observable from the command line.

use super::{looks_auxiliary, AppType, DiscoveryBackend, ProcessTable};
use crate::resource::{
    BasicInfo, ExtendedInfo, LevelPolicy, Pid, ResourceBackend, ResourceDescriptor, ResourceId,
    SharingState,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use veil_core::error::EntityKind;
use veil_core::{Result, VeilError};

const DEFAULT_MAX_AGE: Duration = Duration::from_millis(250);

struct AuditState {
    table: RwLock<(ProcessTable, Option<Instant>)>,
    protected: Mutex<HashSet<ResourceId>>,
    levels: Mutex<HashMap<ResourceId, i64>>,
}

impl AuditState {
    fn pid(id: ResourceId) -> Option<Pid> {
        Pid::try_from(id).ok()
    }

    fn require(&self, id: ResourceId) -> Result<()> {
        if self.exists(id) {
            Ok(())
        } else {
            Err(VeilError::not_found(EntityKind::Resource, id.to_string()))
        }
    }
}

impl ResourceBackend for AuditState {
    fn name(&self) -> &str {
        "process-audit"
    }

    fn exists(&self, id: ResourceId) -> bool {
        Self::pid(id).is_some_and(|pid| self.table.read().0.contains(pid))
    }

    fn basic_info(&self, id: ResourceId) -> Option<BasicInfo> {
        let pid = Self::pid(id)?;
        let table = self.table.read();
        let entry = table.0.get(pid)?;
        Some(BasicInfo {
            title: entry
                .exe
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| entry.name.clone()),
            owner_pid: pid,
            owner_name: entry.name.clone(),
            on_screen: true,
            ..BasicInfo::default()
        })
    }

    fn extended_info(&self, id: ResourceId) -> Option<ExtendedInfo> {
        if !self.exists(id) {
            return None;
        }
        let sharing = if self.protected.lock().contains(&id) {
            SharingState::None
        } else {
            SharingState::ReadWrite
        };
        Some(ExtendedInfo {
            level: self.levels.lock().get(&id).copied().unwrap_or(0),
            sharing,
        })
    }

    fn protection_status(&self, id: ResourceId) -> Option<bool> {
        Some(self.protected.lock().contains(&id))
    }

    fn protect(&self, id: ResourceId) -> Result<()> {
        self.require(id)?;
        if self.protected.lock().insert(id) {
            info!(resource = id, "resource marked protected");
        }
        Ok(())
    }

    fn set_level(&self, id: ResourceId, level: i64) -> Result<()> {
        self.require(id)?;
        self.levels.lock().insert(id, level);
        debug!(resource = id, level, "resource level recorded");
        Ok(())
    }
}

pub struct ProcessAuditBackend {
    state: Arc<AuditState>,
    level_policy: LevelPolicy,
    max_age: Duration,
    live: bool,
}

impl ProcessAuditBackend {
    /// Backed by the live process list, re-read when older than `max_age`.
    pub fn live(level_policy: LevelPolicy) -> Self {
        let backend = Self::with_table(ProcessTable::default(), level_policy);
        Self {
            live: true,
            max_age: DEFAULT_MAX_AGE,
            ..backend
        }
    }

    /// Backed by a fixed table.
    pub fn with_table(table: ProcessTable, level_policy: LevelPolicy) -> Self {
        Self {
            state: Arc::new(AuditState {
                table: RwLock::new((table, None)),
                protected: Mutex::new(HashSet::new()),
                levels: Mutex::new(HashMap::new()),
            }),
            level_policy,
            max_age: DEFAULT_MAX_AGE,
            live: false,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Swap in a new table. Protection records are kept.
    pub fn replace_table(&self, table: ProcessTable) {
        *self.state.table.write() = (table, Some(Instant::now()));
    }

    pub fn protected_ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<_> = self.state.protected.lock().iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn table(&self) -> ProcessTable {
        self.ensure_fresh();
        self.state.table.read().0.clone()
    }

    fn ensure_fresh(&self) {
        if !self.live {
            return;
        }
        let stale = match self.state.table.read().1 {
            Some(at) => at.elapsed() >= self.max_age,
            None => true,
        };
        if stale {
            let table = ProcessTable::snapshot();
            debug!(processes = table.len(), "process table refreshed");
            self.replace_table(table);
        }
    }
}

impl DiscoveryBackend for ProcessAuditBackend {
    fn list_resources(&self, pid: Pid) -> Vec<Arc<ResourceDescriptor>> {
        self.ensure_fresh();
        if !self.state.table.read().0.contains(pid) {
            return Vec::new();
        }
        let backend: Arc<dyn ResourceBackend> = self.state.clone();
        vec![Arc::new(
            ResourceDescriptor::new(ResourceId::from(pid), pid)
                .with_primary(backend)
                .with_level_policy(self.level_policy),
        )]
    }

    fn list_child_process_ids(&self, pid: Pid) -> Vec<Pid> {
        self.ensure_fresh();
        self.state.table.read().0.children(pid).to_vec()
    }

    fn is_auxiliary_process(&self, pid: Pid, app_type: AppType) -> bool {
        self.state
            .table
            .read()
            .0
            .get(pid)
            .is_some_and(|entry| looks_auxiliary(&entry.describe(), app_type))
    }

    fn process_name(&self, pid: Pid) -> Option<String> {
        self.state.table.read().0.get(pid).map(|entry| entry.describe())
    }
}
