use std::fmt;

/// Result type for veil operations
pub type Result<T> = std::result::Result<T, VeilError>;

/// What kind of named thing a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Profile,
    Interceptor,
    Resource,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Profile => "profile",
            EntityKind::Interceptor => "interceptor",
            EntityKind::Resource => "resource",
        };
        f.write_str(label)
    }
}

/// Errors raised across component boundaries
#[derive(Debug, thiserror::Error)]
pub enum VeilError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown {kind}: {name}")]
    NotFound { kind: EntityKind, name: String },

    #[error("{name}: dependency {dependency} failed")]
    DependencyFailure { name: String, dependency: String },

    #[error("No working protection backend for resource {0}")]
    BackendUnavailable(u64),

    #[error("Cycle detected: {0}")]
    CycleDetected(String),

    #[error("Hook for {name} failed: {reason}")]
    HookFailed { name: String, reason: String },

    #[error("Incomplete: {} operation(s) failed ({})", failed.len(), failed.join(", "))]
    Incomplete { failed: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VeilError {
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        VeilError::NotFound {
            kind,
            name: name.into(),
        }
    }
}

/// Outcome of an idempotent state change.
///
/// `Unchanged` is the "already in the desired state" success: re-registering,
/// re-installing, or uninstalling something that was never installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    Unchanged,
}

impl Transition {
    pub fn changed(self) -> bool {
        matches!(self, Transition::Changed)
    }
}
