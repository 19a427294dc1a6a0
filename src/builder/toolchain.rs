//! Cross toolchain descriptions.
//!
//! Each target ISA is built with a buildroot-generated GCC living below
//! `build/cross-<isa>/host`. The description here knows the tool prefix, the
//! start files the linker needs, where GCC keeps its own runtime objects and
//! how the second-language target triple is formed.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::target::{BuildMode, Isa, Platform};
use crate::util::config::ConfigError;
use crate::util::process::ProcessBuilder;

/// One cross toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossToolchain {
    pub isa: Isa,
    /// Tool prefix, e.g. `riscv64-buildroot-linux-musl-`.
    pub prefix: String,
    /// ISA name in the second-language target triple.
    pub rust_isa: &'static str,
    /// ABI name in the second-language target triple.
    pub rust_abi: &'static str,
    /// Start files linked before all other objects.
    pub crts_begin: Vec<&'static str>,
    /// Start files linked after all other objects.
    pub crts_end: Vec<&'static str>,
    /// Installation directory, relative to the project root.
    pub dir: String,
    /// Pinned compiler version.
    pub version: String,
}

impl CrossToolchain {
    pub fn for_isa(isa: Isa, mode: BuildMode, version: impl Into<String>) -> Self {
        let (prefix, rust_isa, rust_abi, crts_begin, crts_end) = match isa {
            Isa::X86_64 => (
                "x86_64-buildroot-linux-musl-",
                "x86_64",
                "musl",
                vec!["crt0.o", "crt1.o", "crtbegin.o"],
                vec!["crtend.o", "crtn.o"],
            ),
            Isa::Arm => (
                "arm-buildroot-linux-musleabi-",
                "arm",
                "musleabi",
                vec!["crt0.o", "crtbegin.o"],
                vec!["crtend.o"],
            ),
            Isa::Riscv => (
                "riscv64-buildroot-linux-musl-",
                "riscv64",
                "musl",
                vec!["crt0.o", "crtbegin.o"],
                vec!["crtend.o"],
            ),
        };

        CrossToolchain {
            isa,
            prefix: prefix.to_string(),
            rust_isa,
            rust_abi: if mode == BuildMode::Coverage {
                "muslcov"
            } else {
                rust_abi
            },
            crts_begin,
            crts_end,
            dir: format!("build/cross-{}/host", isa),
            version: version.into(),
        }
    }

    /// GNU target name (the prefix without its trailing dash).
    pub fn gnu_target(&self) -> &str {
        self.prefix.trim_end_matches('-')
    }

    /// Second-language target triple, e.g. `riscv64-linux-gem5-musl`.
    pub fn triple(&self, platform: Platform) -> String {
        format!("{}-linux-{}-{}", self.rust_isa, platform, self.rust_abi)
    }

    /// The C++ compiler on disk.
    pub fn compiler(&self, root: &Path) -> PathBuf {
        root.join(&self.dir)
            .join("bin")
            .join(format!("{}g++", self.prefix))
    }

    /// Directory holding GCC's own runtime objects (`crtbegin.o` and friends).
    pub fn sysgcclibpath(&self) -> String {
        format!("{}/lib/gcc/{}/{}", self.dir, self.gnu_target(), self.version)
    }

    /// All start files, in link order.
    pub fn crts(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.crts_begin.iter().chain(self.crts_end.iter()).copied()
    }

    /// C++ standard library headers shipped with the compiler.
    pub fn include_dirs(&self) -> Vec<String> {
        vec![
            format!("{}/include/c++/{}", self.dir, self.version),
            format!(
                "{}/include/c++/{}/{}",
                self.dir,
                self.version,
                self.gnu_target()
            ),
        ]
    }

    /// Library search path of the toolchain itself.
    pub fn lib_dir(&self) -> String {
        format!("{}/lib", self.dir)
    }

    /// Make sure the compiler is installed and matches the pinned version.
    pub fn verify(&self, root: &Path) -> Result<()> {
        let compiler = self.compiler(root);
        if !compiler.is_file() {
            return Err(ConfigError::CrossCompilerMissing {
                isa: self.isa,
                path: compiler.display().to_string(),
            }
            .into());
        }

        let output = ProcessBuilder::new(&compiler)
            .arg("-dumpversion")
            .exec_and_check()?;
        let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!("{} reports version {}", compiler.display(), found);

        if !versions_match(&found, &self.version) {
            return Err(ConfigError::CrossCompilerVersion {
                isa: self.isa,
                found,
                expected: self.version.clone(),
            }
            .into());
        }
        Ok(())
    }
}

/// Compare compiler versions semantically when both parse, textually
/// otherwise (`-dumpversion` may print just the major version).
fn versions_match(found: &str, expected: &str) -> bool {
    match (
        semver::Version::parse(found),
        semver::Version::parse(expected),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => found == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_x86_64_toolchain() {
        let tc = CrossToolchain::for_isa(Isa::X86_64, BuildMode::Debug, "11.3.0");
        assert_eq!(tc.prefix, "x86_64-buildroot-linux-musl-");
        assert_eq!(tc.triple(Platform::Gem5), "x86_64-linux-gem5-musl");
        assert_eq!(
            tc.crts().collect::<Vec<_>>(),
            vec!["crt0.o", "crt1.o", "crtbegin.o", "crtend.o", "crtn.o"]
        );
        assert_eq!(
            tc.sysgcclibpath(),
            "build/cross-x86_64/host/lib/gcc/x86_64-buildroot-linux-musl/11.3.0"
        );
    }

    #[test]
    fn test_riscv_and_coverage_abi() {
        let tc = CrossToolchain::for_isa(Isa::Riscv, BuildMode::Coverage, "11.3.0");
        assert_eq!(tc.triple(Platform::Hw), "riscv64-linux-hw-muslcov");
        assert_eq!(tc.crts().count(), 3);
        assert_eq!(
            tc.include_dirs()[1],
            "build/cross-riscv/host/include/c++/11.3.0/riscv64-buildroot-linux-musl"
        );
    }

    #[test]
    fn test_arm_abi() {
        let tc = CrossToolchain::for_isa(Isa::Arm, BuildMode::Release, "11.3.0");
        assert_eq!(tc.triple(Platform::Gem5), "arm-linux-gem5-musleabi");
    }

    #[test]
    fn test_missing_compiler() {
        let tmp = TempDir::new().unwrap();
        let tc = CrossToolchain::for_isa(Isa::Arm, BuildMode::Debug, "11.3.0");
        let err = tc.verify(tmp.path()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("./build.sh arm"), "{}", msg);
    }

    #[cfg(unix)]
    #[test]
    fn test_version_mismatch() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let tc = CrossToolchain::for_isa(Isa::X86_64, BuildMode::Debug, "11.3.0");
        let compiler = tc.compiler(tmp.path());
        std::fs::create_dir_all(compiler.parent().unwrap()).unwrap();
        std::fs::write(&compiler, "#!/bin/sh\necho 10.1.0\n").unwrap();
        std::fs::set_permissions(&compiler, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = tc.verify(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("from 10.1.0 to 11.3.0"));

        std::fs::write(&compiler, "#!/bin/sh\necho 11.3.0\n").unwrap();
        tc.verify(tmp.path()).unwrap();
    }

    #[test]
    fn test_versions_match() {
        assert!(versions_match("11.3.0", "11.3.0"));
        assert!(!versions_match("11.2.0", "11.3.0"));
        assert!(!versions_match("11", "11.3.0"));
    }
}
