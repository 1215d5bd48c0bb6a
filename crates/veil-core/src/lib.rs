//! Override, profile and interceptor machinery for retrofitting behaviour onto
//! a running process.
//!
//! ```text
//! bootstrap ──► ProfileManager ──► OverrideStore ◄── OverrideHandler
//!                                                        ▲
//! InterceptorRegistry ──install──► Interceptor ──► HookTable
//! ```

pub mod bootstrap;
pub mod context;
pub mod error;
pub mod interceptor;
pub mod overrides;
pub mod paths;
pub mod profiles;
pub mod settings;
pub mod storage;

pub use error::{EntityKind, Result, Transition, VeilError};
pub use overrides::{OverrideMap, OverrideStore};
pub use profiles::{Profile, ProfileManager};
