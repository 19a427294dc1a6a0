//! Helpers for unit tests: throwaway project trees and ready-made
//! environments.

pub mod fixtures;

use std::path::Path;

use tempfile::TempDir;

use crate::builder::coordinator;
use crate::builder::session::{LoadAddressTable, TargetState};
use crate::core::env::Env;
use crate::core::path::SourcePath;
use crate::core::target::{BuildMode, Isa, Platform};
use crate::util::config::{BuildSettings, ProjectConfig};

pub use fixtures::*;

/// A project tree in a temporary directory, removed on drop.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        TestProject {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file, creating its parent directories.
    pub fn file(&self, rel: &str, contents: &str) -> &Self {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
        self
    }

    pub fn dir(&self, rel: &str) -> &Self {
        std::fs::create_dir_all(self.dir.path().join(rel)).unwrap();
        self
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// A debug target environment rooted at `/project`.
pub fn target_env(platform: Platform, isa: Isa) -> Env {
    target_env_at(Path::new("/project"), platform, isa)
}

/// A debug target environment rooted at `root`, as the coordinator builds it.
pub fn target_env_at(root: &Path, platform: Platform, isa: Isa) -> Env {
    let settings = BuildSettings::new(platform, vec![isa], BuildMode::Debug);
    coordinator::target_env(root, &settings, &ProjectConfig::default(), isa).unwrap()
}

/// Fresh per-target state with the default linker script source.
pub fn test_state(start: u64, step: u64) -> TargetState {
    TargetState::new(
        LoadAddressTable::new(start, step),
        SourcePath::new("src/toolchain/ld.conf").unwrap(),
    )
}
