use serde::{Deserialize, Serialize};
use veil_core::Result;

pub type ResourceId = u64;
pub type Pid = u32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Who else may read the resource's contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingState {
    None,
    ReadOnly,
    #[default]
    ReadWrite,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub title: String,
    pub frame: Rect,
    pub owner_pid: Pid,
    pub owner_name: String,
    pub on_screen: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedInfo {
    pub level: i64,
    pub sharing: SharingState,
}

/// One way of reading and mutating resources.
///
/// A descriptor holds up to two of these: the direct one it was found
/// through, and a lower-level enumeration fallback.
pub trait ResourceBackend: Send + Sync {
    fn name(&self) -> &str;

    fn exists(&self, id: ResourceId) -> bool;

    fn basic_info(&self, id: ResourceId) -> Option<BasicInfo>;

    fn extended_info(&self, id: ResourceId) -> Option<ExtendedInfo>;

    fn protection_status(&self, id: ResourceId) -> Option<bool>;

    fn protect(&self, id: ResourceId) -> Result<()>;

    fn set_level(&self, id: ResourceId, level: i64) -> Result<()>;
}
