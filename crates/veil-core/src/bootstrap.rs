//! Bootstrap configuration handed over by the process launcher.
//!
//! Two values, read once at start: a comma-separated profile list and a JSON
//! object of `type -> {property -> value}` overrides.

use crate::error::{Result, VeilError};
use crate::overrides::OverrideMap;
use crate::profiles::ProfileManager;
use serde_json::Value;
use tracing::{info, warn};

pub const PROFILES_ENV: &str = "VEIL_PROFILES";
pub const OVERRIDES_ENV: &str = "VEIL_OVERRIDES";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootstrapConfig {
    pub profiles: Vec<String>,
    pub overrides: OverrideMap,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub applied_profiles: Vec<String>,
    pub failed_profiles: Vec<String>,
    pub overrides_clean: bool,
}

impl BootstrapConfig {
    pub fn from_env() -> Result<Self> {
        let profiles = std::env::var(PROFILES_ENV).ok();
        let overrides = std::env::var(OVERRIDES_ENV).ok();
        Self::from_parts(profiles.as_deref(), overrides.as_deref())
    }

    pub fn from_parts(profiles: Option<&str>, overrides: Option<&str>) -> Result<Self> {
        let profiles = profiles.map(parse_profile_list).unwrap_or_default();
        let overrides = match overrides {
            Some(raw) if !raw.trim().is_empty() => parse_override_map(raw)?,
            _ => OverrideMap::new(),
        };
        Ok(Self {
            profiles,
            overrides,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty() && self.overrides.is_empty()
    }

    /// Apply profiles in order, then the explicit overrides on top.
    pub fn apply(&self, profiles: &ProfileManager) -> BootstrapReport {
        let failed = profiles.apply_profiles(&self.profiles);
        let applied = self
            .profiles
            .iter()
            .filter(|p| !failed.contains(p))
            .cloned()
            .collect::<Vec<_>>();
        let overrides_clean = profiles.store().bulk_apply(&self.overrides);
        if !overrides_clean {
            warn!("bootstrap overrides contained malformed entries");
        }
        info!(
            applied = applied.len(),
            failed = failed.len(),
            overrides = profiles.store().len(),
            "bootstrap configuration applied"
        );
        BootstrapReport {
            applied_profiles: applied,
            failed_profiles: failed,
            overrides_clean,
        }
    }
}

pub fn parse_profile_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn parse_override_map(raw: &str) -> Result<OverrideMap> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(types) = value else {
        return Err(VeilError::InvalidArgument(
            "override map must be a JSON object".into(),
        ));
    };
    let mut map = OverrideMap::new();
    for (target_type, props) in types {
        let Value::Object(props) = props else {
            return Err(VeilError::InvalidArgument(format!(
                "overrides for {target_type} must be a JSON object"
            )));
        };
        map.insert(target_type, props.into_iter().collect());
    }
    Ok(map)
}
