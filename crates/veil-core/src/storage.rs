use crate::settings::VeilSettings;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Load settings from `path`, or defaults when the file does not exist.
pub fn load_settings(path: &Path) -> anyhow::Result<VeilSettings> {
    if !path.exists() {
        debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(VeilSettings::default());
    }
    let raw = fs::read_to_string(path)?;
    let settings: VeilSettings = serde_json::from_str(&raw)?;
    settings.validate()?;
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &VeilSettings) -> anyhow::Result<()> {
    settings.validate()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;
    debug!(path = %path.display(), "settings saved");
    Ok(())
}
