//! Resource discovery and protection on top of `veil-core`.
//!
//! - [`resource`]: descriptors with cached metadata and backend fallback
//! - [`discovery`]: process-tree walking and application classification
//! - [`scanner`]: the adaptive, debounced protection loop
//! - [`runtime`]: wiring of stores, profiles and interceptors for one host

pub mod discovery;
pub mod resource;
pub mod runtime;
pub mod scanner;

pub use discovery::{AppType, DiscoveryBackend, ProcessAuditBackend, ProcessTable};
pub use resource::{LevelPolicy, ResourceBackend, ResourceDescriptor, ResourceId};
pub use runtime::VeilRuntime;
pub use scanner::{
    MultiProcessOptions, ProtectionScanner, ScanReport, ScannerConfig, ScannerEvent,
};
