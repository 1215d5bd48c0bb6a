use directories::ProjectDirs;
use std::path::PathBuf;

pub const APP_QUALIFIER: &str = "dev";
pub const APP_ORG: &str = "veil";
pub const APP_NAME: &str = "veil";

pub fn config_dir() -> anyhow::Result<PathBuf> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("cannot determine config directory"))?;
    Ok(dirs.config_dir().to_path_buf())
}

pub fn settings_path() -> anyhow::Result<PathBuf> {
    if let Ok(override_path) = std::env::var("VEIL_SETTINGS") {
        return Ok(PathBuf::from(override_path));
    }
    Ok(config_dir()?.join("settings.json"))
}

pub fn profile_dir() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("profiles"))
}
