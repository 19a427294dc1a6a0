//! Per-directory build descriptions (`build.toml`).
//!
//! A directory without a registered build script is described declaratively:
//! which sub-directories to visit, under which conditions, how to adjust the
//! inherited environment and which products to build. Unknown keys are
//! rejected so a typo fails the run instead of silently doing nothing.
//!
//! String values may contain placeholders that are replaced per target:
//! `{isa}`, `{target}`, `{build}` and `{sysgcclibpath}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::builder::ldscript::LdScript;
use crate::builder::session::BinCategory;
use crate::core::env::{Env, Value};
use crate::core::target::{BuildMode, Isa, Platform};

/// File name of a directory's build description.
pub const MANIFEST_NAME: &str = "build.toml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read `{}`", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse `{}`: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("unknown placeholder `{{{name}}}` in `{value}`")]
    UnknownPlaceholder { name: String, value: String },

    #[error("unterminated placeholder in `{value}`")]
    Unterminated { value: String },

    #[error("`{{sysgcclibpath}}` in `{value}` needs a cross toolchain")]
    NoToolchain { value: String },
}

/// Contents of one `build.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirManifest {
    /// Sub-directories visited after this directory's products.
    pub dirs: Vec<String>,
    pub when: Condition,
    pub env: EnvOverrides,
    /// Register this directory as a second-language library crate.
    pub rust_lib: bool,
    pub object: Vec<ObjectDecl>,
    pub static_lib: Vec<StaticLibDecl>,
    pub install: Vec<InstallDecl>,
    pub exe: Vec<ExeDecl>,
    pub host_exe: Vec<HostExeDecl>,
    pub rust_exe: Vec<RustExeDecl>,
    pub fs_image: Option<FsImageDecl>,
}

/// Restricts a directory to some targets. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Condition {
    pub isa: Vec<Isa>,
    pub platform: Vec<Platform>,
    pub build: Vec<BuildMode>,
}

impl Condition {
    pub fn matches(&self, env: &Env) -> bool {
        (self.isa.is_empty() || self.isa.contains(&env.isa))
            && (self.platform.is_empty() || self.platform.contains(&env.platform))
            && (self.build.is_empty() || self.build.contains(&env.mode))
    }
}

/// Changes to the inherited environment. They also apply to every
/// sub-directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvOverrides {
    pub set: BTreeMap<String, Value>,
    pub append: BTreeMap<String, Vec<String>>,
    pub remove: BTreeMap<String, Vec<String>>,
    /// Extra environment for cargo invocations.
    pub cargo_env: BTreeMap<String, String>,
    pub soft_float: bool,
}

impl EnvOverrides {
    /// Apply in a fixed order: set, append, remove, cargo env, soft float.
    pub fn apply(&self, env: &mut Env, vars: &Placeholders) -> anyhow::Result<()> {
        for (name, value) in &self.set {
            let value = match value {
                Value::Scalar(s) => Value::Scalar(vars.expand(s)?),
                Value::List(items) => Value::List(vars.expand_all(items)?),
            };
            env.set(name, value)?;
        }
        for (name, items) in &self.append {
            env.append(name, vars.expand_all(items)?)?;
        }
        for (name, items) in &self.remove {
            for item in items {
                env.remove_flag(name, &vars.expand(item)?)?;
            }
        }
        for (name, value) in &self.cargo_env {
            env.cargo_env.insert(name.clone(), vars.expand(value)?);
        }
        if self.soft_float {
            env.soft_float();
        }
        Ok(())
    }
}

/// Compile sources into objects without linking them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObjectDecl {
    pub sources: Vec<String>,
    /// Build the soft-float flavor.
    pub soft_float: bool,
    /// Directory setting (e.g. `LIBDIR`) to install the objects into.
    pub install: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticLibDecl {
    pub name: String,
    pub sources: Vec<String>,
    /// Objects built elsewhere in this directory, by file name.
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default)]
    pub soft_float: bool,
    /// Install into `LIBDIR`.
    #[serde(default = "yes")]
    pub install: bool,
}

/// Copy files into an output directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallDecl {
    pub files: Vec<String>,
    /// Directory setting to install into.
    #[serde(default = "libdir")]
    pub to: String,
    /// Leave out files whose destination another edge already produces.
    #[serde(default)]
    pub skip_existing: bool,
}

/// Where an executable goes in the filesystem image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCategory {
    #[default]
    Bin,
    Sbin,
    None,
}

impl ImageCategory {
    pub fn bin_category(self) -> Option<BinCategory> {
        match self {
            ImageCategory::Bin => Some(BinCategory::Bin),
            ImageCategory::Sbin => Some(BinCategory::Sbin),
            ImageCategory::None => None,
        }
    }
}

/// A system executable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExeDecl {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default)]
    pub libs: Vec<String>,
    #[serde(default)]
    pub category: ImageCategory,
    #[serde(default)]
    pub no_sup: bool,
    #[serde(default)]
    pub ldscript: LdScript,
    #[serde(default = "yes")]
    pub var_addr: bool,
}

/// A tool for the build machine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostExeDecl {
    pub name: String,
    pub sources: Vec<String>,
    #[serde(default)]
    pub libs: Vec<String>,
    /// Extra preprocessor flags for this tool only.
    #[serde(default)]
    pub cppflags: Vec<String>,
    /// Install into `TOOLDIR`.
    #[serde(default = "yes")]
    pub install: bool,
}

/// An executable whose main code is a second-language crate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RustExeDecl {
    pub name: String,
    #[serde(default)]
    pub libs: Vec<String>,
    #[serde(default)]
    pub category: ImageCategory,
    /// Startup code compiled and linked first.
    #[serde(default)]
    pub startup: Option<String>,
    #[serde(default)]
    pub ldscript: LdScript,
    #[serde(default = "yes")]
    pub var_addr: bool,
    /// Link against the full C library instead of the minimal one.
    #[serde(default)]
    pub std: bool,
    /// Build the crate on its own instead of in the shared workspace.
    #[serde(default)]
    pub standalone: bool,
}

/// The filesystem image of this directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FsImageDecl {
    pub name: String,
    #[serde(default = "cur_dir")]
    pub dir: String,
    #[serde(default = "default_blocks")]
    pub blocks: u64,
    /// Block count for coverage builds, which produce bigger binaries.
    #[serde(default = "default_coverage_blocks")]
    pub coverage_blocks: u64,
    #[serde(default = "default_inodes")]
    pub inodes: u64,
}

impl FsImageDecl {
    pub fn blocks_for(&self, mode: BuildMode) -> u64 {
        if mode == BuildMode::Coverage {
            self.coverage_blocks
        } else {
            self.blocks
        }
    }
}

fn yes() -> bool {
    true
}

fn libdir() -> String {
    "LIBDIR".to_string()
}

fn cur_dir() -> String {
    ".".to_string()
}

fn default_blocks() -> u64 {
    32 * 1024
}

fn default_coverage_blocks() -> u64 {
    160 * 1024
}

fn default_inodes() -> u64 {
    512
}

impl DirManifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ManifestError> {
        toml::from_str(text).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })
    }
}

/// Values substituted into manifest strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    isa: String,
    target: String,
    build: String,
    sysgcclibpath: Option<String>,
}

impl Placeholders {
    pub fn from_env(env: &Env) -> Self {
        Placeholders {
            isa: env.isa.to_string(),
            target: env.platform.to_string(),
            build: env.mode.to_string(),
            sysgcclibpath: env.toolchain().map(|tc| tc.sysgcclibpath()),
        }
    }

    pub fn expand(&self, value: &str) -> Result<String, ManifestError> {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| ManifestError::Unterminated {
                value: value.to_string(),
            })?;
            let name = &after[..end];
            match name {
                "isa" => out.push_str(&self.isa),
                "target" => out.push_str(&self.target),
                "build" => out.push_str(&self.build),
                "sysgcclibpath" => match &self.sysgcclibpath {
                    Some(path) => out.push_str(path),
                    None => {
                        return Err(ManifestError::NoToolchain {
                            value: value.to_string(),
                        })
                    }
                },
                _ => {
                    return Err(ManifestError::UnknownPlaceholder {
                        name: name.to_string(),
                        value: value.to_string(),
                    })
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    pub fn expand_all(&self, values: &[String]) -> Result<Vec<String>, ManifestError> {
        values.iter().map(|v| self.expand(v)).collect()
    }
}
