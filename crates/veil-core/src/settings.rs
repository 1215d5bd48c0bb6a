use crate::interceptor::InterceptorOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerSettings {
    pub interval_ms: u64,
    pub adaptive: bool,
    pub debounce_enabled: bool,
    pub debounce_ms: u64,
    #[serde(default = "default_suppression_window_ms")]
    pub suppression_window_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSettings {
    /// Level forced onto every resource by `set_level`. `None` passes the
    /// caller's requested level through.
    #[serde(default = "default_enforced_level")]
    pub enforced_level: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptorSettings {
    #[serde(default)]
    pub enabled: InterceptorOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VeilSettings {
    pub scanner: ScannerSettings,
    pub resources: ResourceSettings,
    pub interceptors: InterceptorSettings,
    pub logging: LoggingSettings,
    #[serde(default)]
    pub profile_dir: Option<String>,
}

fn default_suppression_window_ms() -> u64 {
    1000
}

fn default_enforced_level() -> Option<i64> {
    Some(3)
}

impl Default for VeilSettings {
    fn default() -> Self {
        Self {
            scanner: ScannerSettings {
                interval_ms: 1000,
                adaptive: true,
                debounce_enabled: true,
                debounce_ms: 100,
                suppression_window_ms: default_suppression_window_ms(),
            },
            resources: ResourceSettings {
                enforced_level: default_enforced_level(),
            },
            interceptors: InterceptorSettings {
                enabled: InterceptorOptions::ALL,
            },
            logging: LoggingSettings {
                filter: "info".into(),
            },
            profile_dir: None,
        }
    }
}

impl VeilSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        let scanner = &self.scanner;
        if scanner.interval_ms < 50 || scanner.interval_ms > 60_000 {
            anyhow::bail!("Scan interval must be between 50 ms and 60 s");
        }
        if scanner.debounce_enabled && (scanner.debounce_ms == 0 || scanner.debounce_ms > 5_000) {
            anyhow::bail!("Debounce interval must be between 1 ms and 5 s");
        }
        if scanner.suppression_window_ms > 60_000 {
            anyhow::bail!("Suppression window must not exceed 60 s");
        }
        if self.logging.filter.trim().is_empty() {
            anyhow::bail!("Log filter must not be empty");
        }
        Ok(())
    }
}
