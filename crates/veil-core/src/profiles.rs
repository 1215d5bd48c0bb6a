//! Named, composable override bundles.

use crate::error::{EntityKind, Result, VeilError};
use crate::overrides::{OverrideMap, OverrideStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Applied, in order, before this profile's own overrides.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub overrides: OverrideMap,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_override(
        mut self,
        target_type: impl Into<String>,
        property: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.overrides
            .entry(target_type.into())
            .or_default()
            .insert(property.into(), value);
        self
    }
}

pub struct ProfileManager {
    store: Arc<OverrideStore>,
    profiles: RwLock<HashMap<String, Profile>>,
}

impl ProfileManager {
    pub fn new(store: Arc<OverrideStore>) -> Self {
        Self {
            store,
            profiles: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<OverrideStore> {
        &self.store
    }

    pub fn register_profile(&self, profile: Profile) -> Result<()> {
        if profile.name.trim().is_empty() {
            return Err(VeilError::InvalidArgument("profile name is empty".into()));
        }
        let name = profile.name.clone();
        if self.profiles.write().insert(name.clone(), profile).is_some() {
            warn!(profile = %name, "profile re-registered, previous definition replaced");
        } else {
            debug!(profile = %name, "profile registered");
        }
        Ok(())
    }

    pub fn unregister_profile(&self, name: &str) -> bool {
        self.profiles.write().remove(name).is_some()
    }

    pub fn profile(&self, name: &str) -> Option<Profile> {
        self.profiles.read().get(name).cloned()
    }

    pub fn has_profile(&self, name: &str) -> bool {
        self.profiles.read().contains_key(name)
    }

    /// All registered profiles, sorted by name.
    pub fn all_profiles(&self) -> Vec<Profile> {
        let mut all: Vec<Profile> = self.profiles.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn clear_profiles(&self) {
        self.profiles.write().clear();
    }

    /// Apply `name`, its dependencies first.
    ///
    /// Each profile is visited at most once per call; a dependency chain that
    /// loops back is cut at the repeat with a warning.
    pub fn apply_profile(&self, name: &str) -> Result<()> {
        let mut resolved = HashSet::new();
        self.apply_resolving(name, &mut resolved)
    }

    /// Apply several profiles in order. Returns the names that failed.
    pub fn apply_profiles<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        let mut failed = Vec::new();
        for name in names {
            let name = name.as_ref();
            if let Err(e) = self.apply_profile(name) {
                warn!(profile = %name, error = %e, "profile not applied cleanly");
                failed.push(name.to_string());
            }
        }
        failed
    }

    fn apply_resolving(&self, name: &str, resolved: &mut HashSet<String>) -> Result<()> {
        if !resolved.insert(name.to_string()) {
            warn!(profile = %name, "profile already resolved in this application, skipping (cycle)");
            return Err(VeilError::CycleDetected(name.to_string()));
        }

        // Clone out so the lock is not held while recursing.
        let profile = self
            .profile(name)
            .ok_or_else(|| VeilError::not_found(EntityKind::Profile, name))?;

        for dependency in &profile.dependencies {
            if let Err(e) = self.apply_resolving(dependency, resolved) {
                let failure = VeilError::DependencyFailure {
                    name: name.to_string(),
                    dependency: dependency.clone(),
                };
                warn!(error = %failure, cause = %e, "continuing without dependency");
            }
        }

        if self.store.bulk_apply(&profile.overrides) {
            info!(profile = %name, "profile applied");
            Ok(())
        } else {
            Err(VeilError::InvalidArgument(format!(
                "profile {name} contains malformed overrides"
            )))
        }
    }

    /// Register every `*.json` profile in `dir`. Bad files are logged and
    /// skipped. Returns the number registered.
    pub fn load_dir(&self, dir: &Path) -> anyhow::Result<usize> {
        let mut loaded = 0;
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();

        for path in paths {
            let parsed = fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|raw| serde_json::from_str::<Profile>(&raw).map_err(anyhow::Error::from));
            match parsed {
                Ok(profile) => match self.register_profile(profile) {
                    Ok(()) => loaded += 1,
                    Err(e) => warn!(path = %path.display(), error = %e, "invalid profile"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "cannot load profile file"),
            }
        }
        info!(dir = %dir.display(), loaded, "profiles loaded");
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> ProfileManager {
        ProfileManager::new(Arc::new(OverrideStore::new()))
    }

    #[test]
    fn apply_sets_overrides() {
        let pm = manager();
        pm.register_profile(Profile::new("A").with_override("TypeX", "flag", json!(1)))
            .unwrap();
        pm.apply_profile("A").unwrap();
        assert_eq!(pm.store().get_override("TypeX", "flag"), Some(json!(1)));
    }

    #[test]
    fn unknown_profile_is_not_found() {
        let pm = manager();
        assert!(matches!(
            pm.apply_profile("missing"),
            Err(VeilError::NotFound { kind: EntityKind::Profile, .. })
        ));
    }

    #[test]
    fn empty_name_rejected_and_overwrite_allowed() {
        let pm = manager();
        assert!(pm.register_profile(Profile::new("  ")).is_err());
        pm.register_profile(Profile::new("A").with_description("one")).unwrap();
        pm.register_profile(Profile::new("A").with_description("two")).unwrap();
        assert_eq!(pm.profile("A").unwrap().description, "two");
        assert_eq!(pm.all_profiles().len(), 1);
    }

    #[test]
    fn dependency_applied_before_own_overrides() {
        let pm = manager();
        pm.register_profile(
            Profile::new("base")
                .with_override("Window", "level", json!(0))
                .with_override("Window", "shadow", json!(true)),
        )
        .unwrap();
        pm.register_profile(
            Profile::new("top")
                .depends_on("base")
                .with_override("Window", "level", json!(3)),
        )
        .unwrap();

        pm.apply_profile("top").unwrap();
        // own value overwrote the dependency's, so the dependency ran first
        assert_eq!(pm.store().get_override("Window", "level"), Some(json!(3)));
        assert_eq!(pm.store().get_override("Window", "shadow"), Some(json!(true)));
    }

    #[test]
    fn missing_dependency_does_not_block_profile() {
        let pm = manager();
        pm.register_profile(
            Profile::new("top")
                .depends_on("ghost")
                .with_override("App", "hidden", json!(true)),
        )
        .unwrap();
        pm.apply_profile("top").unwrap();
        assert!(pm.store().has_override("App", "hidden"));
    }

    #[test]
    fn cyclic_profiles_terminate() {
        let pm = manager();
        pm.register_profile(Profile::new("A").depends_on("B").with_override("T", "a", json!(1)))
            .unwrap();
        pm.register_profile(Profile::new("B").depends_on("C").with_override("T", "b", json!(2)))
            .unwrap();
        pm.register_profile(Profile::new("C").depends_on("A").with_override("T", "c", json!(3)))
            .unwrap();

        pm.apply_profile("A").unwrap();
        assert_eq!(pm.store().len(), 3);
    }

    #[test]
    fn diamond_dependency_applied_once() {
        let pm = manager();
        pm.register_profile(Profile::new("D").with_override("T", "d", json!(1))).unwrap();
        pm.register_profile(Profile::new("B").depends_on("D")).unwrap();
        pm.register_profile(Profile::new("C").depends_on("D").with_override("T", "d", json!(2)))
            .unwrap();
        pm.register_profile(Profile::new("A").depends_on("B").depends_on("C")).unwrap();

        pm.apply_profile("A").unwrap();
        // D is not re-applied after C, so C's value stands
        assert_eq!(pm.store().get_override("T", "d"), Some(json!(2)));
    }

    #[test]
    fn apply_profiles_reports_failures() {
        let pm = manager();
        pm.register_profile(Profile::new("ok").with_override("T", "p", json!(1))).unwrap();
        let failed = pm.apply_profiles(&["ok", "nope"]);
        assert_eq!(failed, vec!["nope".to_string()]);
    }

    #[test]
    fn load_dir_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("stealth.json"),
            r#"{"name":"stealth","dependencies":["core"],"overrides":{"App":{"policy":"accessory"}}}"#,
        )
        .unwrap();
        fs::write(dir.path().join("core.json"), r#"{"name":"core"}"#).unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let pm = manager();
        assert_eq!(pm.load_dir(dir.path()).unwrap(), 2);
        assert_eq!(pm.profile("stealth").unwrap().dependencies, vec!["core"]);
    }

    #[test]
    fn unregister_and_clear_remove_profiles() {
        let pm = manager();
        pm.register_profile(Profile::new("a")).unwrap();
        pm.register_profile(Profile::new("b")).unwrap();
        assert!(pm.has_profile("a"));

        assert!(pm.unregister_profile("a"));
        assert!(!pm.unregister_profile("a"));
        assert!(!pm.has_profile("a"));
        assert!(matches!(pm.apply_profile("a"), Err(VeilError::NotFound { .. })));

        pm.clear_profiles();
        assert!(pm.all_profiles().is_empty());
    }
}
