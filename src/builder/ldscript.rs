//! Linker script variants.
//!
//! One linker script source is preprocessed into a script per variant. The
//! result is memoized per target: asking for a variant again returns the
//! same path and adds no edge.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::builder::compile;
use crate::core::env::Env;
use crate::core::graph::Fragment;
use crate::core::path::{BuildPath, SourcePath};

/// Which memory layout an executable is linked for.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LdScript {
    /// Applications running on top of the OS.
    #[default]
    Default,
    /// Bare-metal programs.
    Baremetal,
    /// Bare-metal programs with interrupt handling.
    Isr,
    /// The privileged per-tile scheduler.
    Tilemux,
}

impl LdScript {
    pub const ALL: [LdScript; 4] = [
        LdScript::Default,
        LdScript::Baremetal,
        LdScript::Isr,
        LdScript::Tilemux,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LdScript::Default => "default",
            LdScript::Baremetal => "baremetal",
            LdScript::Isr => "isr",
            LdScript::Tilemux => "tilemux",
        }
    }

    /// Preprocessor defines selecting the variant.
    pub fn defines(&self) -> &'static [&'static str] {
        match self {
            LdScript::Default => &[],
            LdScript::Baremetal => &["-D__baremetal__=1"],
            LdScript::Isr => &["-D__baremetal__=1", "-D__isr__=1"],
            LdScript::Tilemux => &["-D__isr__=1", "-D__tilemux__=1"],
        }
    }

    pub fn file_name(&self) -> String {
        format!("ld-{}.conf", self.as_str())
    }
}

impl fmt::Display for LdScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preprocessed scripts of one target.
#[derive(Debug, Clone)]
pub struct LinkerScripts {
    source: SourcePath,
    scripts: BTreeMap<LdScript, BuildPath>,
}

impl LinkerScripts {
    pub fn new(source: SourcePath) -> Self {
        LinkerScripts {
            source,
            scripts: BTreeMap::new(),
        }
    }

    /// The script for `variant`, generating it on first request. Later
    /// requests return an empty fragment with the same output.
    pub fn request(&mut self, env: &Env, variant: LdScript) -> Fragment {
        if let Some(path) = self.scripts.get(&variant) {
            return Fragment::new(path.clone(), Vec::new());
        }

        let mut env = env.clone();
        env.flags
            .cppflags
            .extend(variant.defines().iter().map(|d| d.to_string()));
        let out = env.dirs.builddir.join(&variant.file_name());
        tracing::debug!("linker script {} -> {}", variant, out);

        self.scripts.insert(variant, out.clone());
        compile::cpp(&env, out, &self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::rules;
    use crate::core::target::{BuildMode, Isa, Platform};

    #[test]
    fn test_memoized_per_variant() {
        let env = Env::new(
            "/p",
            Platform::Gem5,
            Isa::Riscv,
            BuildMode::Debug,
            BuildPath::new("build/gem5-riscv-debug"),
        );
        let mut scripts = LinkerScripts::new(SourcePath::new("src/toolchain/ld.conf").unwrap());

        let first = scripts.request(&env, LdScript::Isr);
        assert_eq!(first.output.as_str(), "build/gem5-riscv-debug/ld-isr.conf");
        assert_eq!(first.edges.len(), 1);
        assert_eq!(first.edges[0].rule(), rules::CPP);
        assert_eq!(
            first.edges[0].get_var("cppflags"),
            Some("-D__baremetal__=1 -D__isr__=1")
        );

        let again = scripts.request(&env, LdScript::Isr);
        assert_eq!(again.output, first.output);
        assert!(again.edges.is_empty());

        let other = scripts.request(&env, LdScript::Default);
        assert_ne!(other.output, first.output);
        assert_eq!(other.edges.len(), 1);
    }
}
