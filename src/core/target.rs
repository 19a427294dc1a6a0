//! Target descriptors: instruction-set architecture, platform and build mode.
//!
//! These three values select a cross toolchain and an output directory. They
//! come from the process environment (or the command line) and are fixed for
//! one generation run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when parsing a target descriptor fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetParseError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl fmt::Display for TargetParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} '{}', valid values: {}",
            self.kind, self.value, self.expected
        )
    }
}

impl std::error::Error for TargetParseError {}

/// Instruction-set architecture of a cross target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isa {
    X86_64,
    Arm,
    Riscv,
}

impl Isa {
    pub fn as_str(&self) -> &'static str {
        match self {
            Isa::X86_64 => "x86_64",
            Isa::Arm => "arm",
            Isa::Riscv => "riscv",
        }
    }

    /// Architecture directory name used by musl.
    pub fn musl_name(&self) -> &'static str {
        match self {
            Isa::Riscv => "riscv64",
            other => other.as_str(),
        }
    }
}

impl FromStr for Isa {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" => Ok(Isa::X86_64),
            "arm" => Ok(Isa::Arm),
            "riscv" | "riscv64" => Ok(Isa::Riscv),
            _ => Err(TargetParseError {
                kind: "ISA",
                value: s.to_string(),
                expected: "x86_64, arm, riscv",
            }),
        }
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The platform the system image runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// The simulator.
    Gem5,
    /// FPGA hardware.
    Hw,
    /// FPGA hardware, 2022 revision.
    Hw22,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Gem5 => "gem5",
            Platform::Hw => "hw",
            Platform::Hw22 => "hw22",
        }
    }

    /// Bare hardware targets load flat hex images instead of ELF files.
    pub fn is_hardware(&self) -> bool {
        matches!(self, Platform::Hw | Platform::Hw22)
    }
}

impl FromStr for Platform {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gem5" => Ok(Platform::Gem5),
            "hw" => Ok(Platform::Hw),
            "hw22" => Ok(Platform::Hw22),
            _ => Err(TargetParseError {
                kind: "target platform",
                value: s.to_string(),
                expected: "gem5, hw, hw22",
            }),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optimization flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    Debug,
    Release,
    Coverage,
}

impl BuildMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Debug => "debug",
            BuildMode::Release => "release",
            BuildMode::Coverage => "coverage",
        }
    }

    /// Cargo profile directory for this mode. Coverage builds are optimized.
    pub fn cargo_profile(&self) -> &'static str {
        match self {
            BuildMode::Debug => "debug",
            BuildMode::Release | BuildMode::Coverage => "release",
        }
    }
}

impl FromStr for BuildMode {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(BuildMode::Debug),
            "release" => Ok(BuildMode::Release),
            "coverage" => Ok(BuildMode::Coverage),
            _ => Err(TargetParseError {
                kind: "build mode",
                value: s.to_string(),
                expected: "debug, release, coverage",
            }),
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source language, determined from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Cxx,
    Asm,
}

impl Language {
    /// Classify a source file by extension.
    pub fn from_extension(ext: &str) -> Option<Language> {
        match ext {
            "c" => Some(Language::C),
            "cc" | "cpp" | "cxx" | "C" => Some(Language::Cxx),
            "S" | "s" => Some(Language::Asm),
            _ => None,
        }
    }
}
