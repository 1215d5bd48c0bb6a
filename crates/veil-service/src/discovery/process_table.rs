//! Point-in-time view of the OS process tree.

use crate::resource::Pid;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use sysinfo::System;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub name: String,
    pub exe: Option<PathBuf>,
    pub cmd: Vec<String>,
}

impl ProcessEntry {
    pub fn new(pid: Pid, parent: Option<Pid>, name: impl Into<String>) -> Self {
        Self {
            pid,
            parent,
            name: name.into(),
            exe: None,
            cmd: Vec::new(),
        }
    }

    pub fn with_exe(mut self, exe: impl Into<PathBuf>) -> Self {
        self.exe = Some(exe.into());
        self
    }

    pub fn with_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = cmd.into_iter().map(Into::into).collect();
        self
    }

    /// Name and command line, for heuristics that look at both.
    pub fn describe(&self) -> String {
        if self.cmd.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.cmd.join(" "))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessTable {
    entries: HashMap<Pid, ProcessEntry>,
    children: HashMap<Pid, Vec<Pid>>,
}

impl ProcessTable {
    /// Enumerate every process visible to this user.
    pub fn snapshot() -> Self {
        let mut sys = System::new();
        sys.refresh_processes();
        Self::from_entries(sys.processes().values().map(|p| ProcessEntry {
            pid: p.pid().as_u32(),
            parent: p.parent().map(|pp| pp.as_u32()),
            name: p.name().to_string(),
            exe: p.exe().map(Path::to_path_buf),
            cmd: p.cmd().to_vec(),
        }))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ProcessEntry>) -> Self {
        let entries: HashMap<Pid, ProcessEntry> =
            entries.into_iter().map(|e| (e.pid, e)).collect();
        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
        for entry in entries.values() {
            if let Some(parent) = entry.parent {
                if parent != entry.pid {
                    children.entry(parent).or_default().push(entry.pid);
                }
            }
        }
        for list in children.values_mut() {
            list.sort_unstable();
        }
        Self { entries, children }
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessEntry> {
        self.entries.get(&pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.entries.contains_key(&pid)
    }

    pub fn children(&self, pid: Pid) -> &[Pid] {
        self.children.get(&pid).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn name(&self, pid: Pid) -> Option<&str> {
        self.entries.get(&pid).map(|e| e.name.as_str())
    }

    pub fn exe(&self, pid: Pid) -> Option<&Path> {
        self.entries.get(&pid).and_then(|e| e.exe.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
