//! Configuration for a generation run.
//!
//! Two sources feed a run:
//! - [`BuildSettings`]: platform, ISAs, build mode, tile count and verbosity,
//!   read once from the process environment (or the command line).
//! - [`ProjectConfig`]: the optional `tilegen.toml` at the project root, with
//!   toolchain pinning, load-address layout and the declared top-level
//!   directories. Every field has a default.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::env::EnvError;
use crate::core::target::{BuildMode, Isa, Platform, TargetParseError};

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "tilegen.toml";

/// Cross-compiler version the tree is known to build with.
pub const PINNED_CROSS_VERSION: &str = "11.3.0";

/// Distance between the load addresses of two consecutive executables.
pub const DEFAULT_LINK_STEP: u64 = 0x30000;

/// Fatal configuration problems, reported before any graph construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported ISA `{isa}` for platform `{platform}` (only riscv is supported)")]
    UnsupportedIsa { isa: Isa, platform: Platform },

    #[error(transparent)]
    UnknownValue(#[from] TargetParseError),

    #[error("no ISA selected")]
    NoIsa,

    #[error("`[link] step` in tilegen.toml must not be zero")]
    ZeroLinkStep,

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(
        "cross compiler `{path}` not found; please install the {isa} cross compiler first \
         (cd cross && ./build.sh {isa})"
    )]
    CrossCompilerMissing { isa: Isa, path: String },

    #[error(
        "please update the {isa} cross compiler from {found} to {expected} \
         (cd cross && ./build.sh {isa} clean all)"
    )]
    CrossCompilerVersion {
        isa: Isa,
        found: String,
        expected: String,
    },
}

/// What to build: read from `TILEGEN_*` variables or flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub platform: Platform,
    pub isas: Vec<Isa>,
    pub mode: BuildMode,
    /// Number of simulated compute tiles.
    pub tiles: Option<u32>,
    pub verbose: bool,
}

impl BuildSettings {
    pub fn new(platform: Platform, isas: Vec<Isa>, mode: BuildMode) -> Self {
        BuildSettings {
            platform,
            isas,
            mode,
            tiles: None,
            verbose: false,
        }
    }

    /// Reject platform/ISA combinations the tree cannot build. Duplicate ISAs
    /// collapse to one, keeping the first occurrence.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.isas.is_empty() {
            return Err(ConfigError::NoIsa);
        }
        let mut seen = Vec::with_capacity(self.isas.len());
        for &isa in &self.isas {
            check_platform_isa(self.platform, isa)?;
            if !seen.contains(&isa) {
                seen.push(isa);
            }
        }
        self.isas = seen;
        Ok(())
    }

    /// Output root of one target variant: `build/<platform>-<isa>-<mode>`.
    pub fn builddir(&self, isa: Isa) -> String {
        format!("build/{}-{}-{}", self.platform, isa, self.mode)
    }
}

/// Hardware platforms only exist with RISC-V cores.
pub fn check_platform_isa(platform: Platform, isa: Isa) -> Result<(), ConfigError> {
    if platform.is_hardware() && isa != Isa::Riscv {
        return Err(ConfigError::UnsupportedIsa { isa, platform });
    }
    Ok(())
}

/// Contents of `tilegen.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub cross: CrossConfig,
    pub link: LinkConfig,
    pub layout: LayoutConfig,
}

/// Cross toolchain pinning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrossConfig {
    /// Expected output of `g++ -dumpversion`.
    pub version: String,
    /// Run the version check at all.
    pub check: bool,
}

impl Default for CrossConfig {
    fn default() -> Self {
        CrossConfig {
            version: PINNED_CROSS_VERSION.to_string(),
            check: true,
        }
    }
}

/// Load-address layout of statically linked executables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    pub step: u64,
    /// Per-ISA start address overrides, keyed by ISA name.
    pub start: BTreeMap<String, u64>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            step: DEFAULT_LINK_STEP,
            start: BTreeMap::new(),
        }
    }
}

impl LinkConfig {
    /// A zero step would hand every executable the same address.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step == 0 {
            return Err(ConfigError::ZeroLinkStep);
        }
        Ok(())
    }

    /// First load address handed out for `isa`.
    pub fn start_for(&self, isa: Isa) -> u64 {
        self.start.get(isa.as_str()).copied().unwrap_or(match isa {
            Isa::Riscv => 0x1100_0000,
            Isa::X86_64 | Isa::Arm => 0x100_0000,
        })
    }
}

/// Where things live in the source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Linker script source, preprocessed once per variant.
    pub ldscript: String,
    /// Top-level directories, visited in order.
    pub roots: Vec<RootConfig>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            ldscript: "src/toolchain/ld.conf".to_string(),
            roots: vec![
                RootConfig {
                    path: "src".to_string(),
                    host: false,
                },
                RootConfig {
                    path: "tools".to_string(),
                    host: true,
                },
            ],
        }
    }
}

/// One declared top-level directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootConfig {
    pub path: String,
    /// Visit with the host-tool environment instead of the target one.
    #[serde(default)]
    pub host: bool,
}

impl ProjectConfig {
    /// Load `tilegen.toml` from `root`, falling back to defaults if it is
    /// absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!("no {} found, using defaults", CONFIG_FILE);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        config
            .link
            .validate()
            .with_context(|| format!("invalid config: {}", path.display()))?;
        Ok(config)
    }
}
