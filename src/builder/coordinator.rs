//! Construction of the build environments.
//!
//! For every selected ISA the coordinator builds one cross-target
//! environment and, cloned from the same base before any cross tool is set,
//! one host-tool environment reachable from it. Nothing here touches the
//! graph.

use std::path::Path;
use std::sync::Arc;

use crate::builder::toolchain::CrossToolchain;
use crate::core::env::{Env, Tools, Value, RISCV_HARD_FLOAT, TARGET_CFLAGS};
use crate::core::path::BuildPath;
use crate::core::target::{BuildMode, Isa};
use crate::util::config::{check_platform_isa, BuildSettings, ConfigError, ProjectConfig};

const WARNINGS: [&str; 4] = [
    "-Wall",
    "-Wextra",
    "-Wsign-conversion",
    "-fdiagnostics-color=always",
];

const TARGET_CXXFLAGS: [&str; 10] = [
    "-std=c++20",
    "-ffreestanding",
    "-fno-strict-aliasing",
    "-gdwarf-2",
    "-fno-omit-frame-pointer",
    "-fno-threadsafe-statics",
    "-fno-stack-protector",
    "-Wno-address-of-packed-member",
    "-ffunction-sections",
    "-fdata-sections",
];

const TARGET_CFLAGS_BASE: [&str; 4] = [
    "-gdwarf-2",
    "-fno-stack-protector",
    "-ffunction-sections",
    "-fdata-sections",
];

const STATIC_LINKFLAGS: [&str; 4] = [
    "-static",
    "-Wl,--build-id=none",
    "-Wl,-z,max-page-size=4096",
    "-Wl,-z,common-page-size=4096",
];

/// Triple of the machine running the generated build.
pub const HOST_TRIPLE: &str = "x86_64-unknown-linux-gnu";

/// Hands out the environments of one generation run.
#[derive(Debug, Clone)]
pub struct Coordinator {
    targets: Vec<Env>,
}

impl Coordinator {
    pub fn new(
        root: &Path,
        settings: &BuildSettings,
        config: &ProjectConfig,
    ) -> Result<Self, ConfigError> {
        if settings.isas.is_empty() {
            return Err(ConfigError::NoIsa);
        }
        let mut targets = Vec::with_capacity(settings.isas.len());
        for &isa in &settings.isas {
            check_platform_isa(settings.platform, isa)?;
            targets.push(target_env(root, settings, config, isa)?);
        }
        Ok(Coordinator { targets })
    }

    /// Target environments, in the order the ISAs were selected.
    pub fn targets(&self) -> &[Env] {
        &self.targets
    }

    pub fn target(&self, isa: Isa) -> Option<&Env> {
        self.targets.iter().find(|env| env.isa == isa)
    }

    pub fn toolchains(&self) -> impl Iterator<Item = &CrossToolchain> {
        self.targets.iter().filter_map(Env::toolchain)
    }
}

/// Flags shared by host and target builds.
pub fn base_env(root: &Path, settings: &BuildSettings, isa: Isa) -> Result<Env, ConfigError> {
    let builddir = BuildPath::new(settings.builddir(isa));
    let mut env = Env::new(root, settings.platform, isa, settings.mode, builddir);
    let flags = &mut env.flags;

    flags.cpppath.push("src/include".into());
    flags.cflags.push("-std=c99".into());
    flags.cflags.extend(WARNINGS.map(String::from));
    flags.cxxflags.extend(WARNINGS.map(String::from));
    flags.crgflags.push("--color=always".into());
    flags
        .crgflags
        .push(if settings.verbose { "-v" } else { "-q" }.into());

    if settings.mode == BuildMode::Debug {
        flags.cxxflags.extend(["-O0".into(), "-g".into()]);
        flags.cflags.extend(["-O0".into(), "-g".into()]);
        flags.asflags.push("-g".into());
    } else {
        flags.crgflags.push("--release".into());
        for list in [&mut flags.cxxflags, &mut flags.cflags] {
            list.extend(["-O2", "-DNDEBUG", "-flto"].map(String::from));
        }
        flags.linkflags.extend(["-O2".into(), "-flto".into()]);
    }

    if let Some(tiles) = settings.tiles {
        env.set("TILES", Value::scalar(tiles.to_string()))?;
    }
    Ok(env)
}

/// The host-tool environment derived from `base`.
pub fn host_env(base: &Env) -> Result<Env, ConfigError> {
    let mut host = base.clone();
    host.triple = HOST_TRIPLE.to_string();
    host.flags.cxxflags.push("-std=c++11".into());
    host.flags.cppflags.push("-D__tools__".into());
    for list in ["CXXFLAGS", "CFLAGS", "LINKFLAGS"] {
        host.remove_flag(list, "-flto")?;
    }
    host.dirs.objroot = base.dirs.builddir.join("host");
    Ok(host)
}

/// A cross-target environment with its host environment attached.
pub fn target_env(
    root: &Path,
    settings: &BuildSettings,
    config: &ProjectConfig,
    isa: Isa,
) -> Result<Env, ConfigError> {
    let mut env = base_env(root, settings, isa)?;
    let host = host_env(&env)?;
    let toolchain = CrossToolchain::for_isa(isa, settings.mode, config.cross.version.clone());

    env.tools = Tools::cross(&toolchain.prefix);
    env.triple = toolchain.triple(settings.platform);

    let flags = &mut env.flags;
    flags.cxxflags.extend(TARGET_CXXFLAGS.map(String::from));
    flags.cppflags.extend([
        format!("-D__{}__", settings.platform),
        "-U_FORTIFY_SOURCE".into(),
        "-D_GNU_SOURCE".into(),
    ]);
    flags.cflags.extend(TARGET_CFLAGS_BASE.map(String::from));
    flags
        .asflags
        .extend(["-Wl,-W", "-Wall", "-Wextra"].map(String::from));
    flags.linkflags.extend(
        [
            "-Wl,--gc-sections",
            "-Wno-lto-type-mismatch",
            "-fno-stack-protector",
        ]
        .map(String::from),
    );

    match isa {
        Isa::X86_64 => {
            flags.cflags.push("-mno-red-zone".into());
            flags.cxxflags.push("-mno-red-zone".into());
        }
        Isa::Arm => {
            for list in [
                &mut flags.cflags,
                &mut flags.cxxflags,
                &mut flags.linkflags,
                &mut flags.asflags,
            ] {
                list.push("-march=armv7-a".into());
            }
        }
        Isa::Riscv => {
            for list in [
                &mut flags.cflags,
                &mut flags.cxxflags,
                &mut flags.linkflags,
                &mut flags.asflags,
            ] {
                list.extend(RISCV_HARD_FLOAT.split(' ').map(String::from));
            }
        }
    }

    flags.cpppath.extend([
        format!("src/libs/musl/arch/{}", isa.musl_name()),
        "src/libs/musl/arch/generic".into(),
        format!("src/libs/musl/m3/include/{}", isa),
        "src/libs/musl/include".into(),
    ]);
    flags.cpppath.extend(toolchain.include_dirs());
    flags.linkflags.extend(STATIC_LINKFLAGS.map(String::from));
    flags.libpath.push(toolchain.lib_dir());
    flags.libpath.push(env.dirs.libdir.to_string());

    if isa == Isa::Riscv {
        let includes: Vec<String> = env
            .flags
            .cpppath
            .iter()
            .map(|p| format!("-I{p}"))
            .collect();
        env.cargo_env.insert(
            TARGET_CFLAGS.to_string(),
            format!("{} {}", RISCV_HARD_FLOAT, includes.join(" ")),
        );
    }

    tracing::debug!(
        "configured {} ({}) in {}",
        isa,
        env.triple,
        env.dirs.builddir
    );
    env.set_toolchain(Arc::new(toolchain));
    env.set_host(host);
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::Platform;

    fn settings(platform: Platform, isas: Vec<Isa>, mode: BuildMode) -> BuildSettings {
        BuildSettings::new(platform, isas, mode)
    }

    fn coordinator(s: &BuildSettings) -> Coordinator {
        Coordinator::new(Path::new("/project"), s, &ProjectConfig::default()).unwrap()
    }

    #[test]
    fn test_one_env_per_isa() {
        let s = settings(
            Platform::Gem5,
            vec![Isa::X86_64, Isa::Riscv],
            BuildMode::Debug,
        );
        let c = coordinator(&s);
        assert_eq!(c.targets().len(), 2);
        assert_eq!(c.toolchains().count(), 2);

        let riscv = c.target(Isa::Riscv).unwrap();
        assert_eq!(riscv.triple, "riscv64-linux-gem5-musl");
        assert_eq!(riscv.dirs.builddir.as_str(), "build/gem5-riscv-debug");
        assert_eq!(riscv.tools.cxx, "riscv64-buildroot-linux-musl-g++");
        assert!(riscv.cargo_env[TARGET_CFLAGS].starts_with("-march=rv64imafdc -mabi=lp64d -I"));

        let x86 = c.target(Isa::X86_64).unwrap();
        assert!(x86.flags.cxxflags.contains(&"-mno-red-zone".to_string()));
        assert!(x86.cargo_env.is_empty());
        assert!(c.target(Isa::Arm).is_none());
    }

    #[test]
    fn test_hardware_rejects_other_isas() {
        let s = settings(Platform::Hw, vec![Isa::X86_64], BuildMode::Debug);
        let err = Coordinator::new(Path::new("/p"), &s, &ProjectConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedIsa { .. }));
    }

    #[test]
    fn test_host_env_is_native() {
        let s = settings(Platform::Gem5, vec![Isa::Arm], BuildMode::Release);
        let c = coordinator(&s);
        let target = c.target(Isa::Arm).unwrap();
        let host = target.host().unwrap();

        assert_eq!(host.tools.cxx, "g++");
        assert!(host.toolchain().is_none());
        assert_eq!(host.dirs.objroot.as_str(), "build/gem5-arm-release/host");
        assert_eq!(host.dirs.tooldir, target.dirs.tooldir);
        assert_eq!(host.dirs.bindir, target.dirs.bindir);
        assert!(host.flags.cppflags.contains(&"-D__tools__".to_string()));
        assert!(!host.flags.cxxflags.contains(&"-flto".to_string()));
        assert!(!host.flags.linkflags.contains(&"-flto".to_string()));
        assert!(!host.flags.cxxflags.contains(&"-march=armv7-a".to_string()));

        // The target keeps LTO in release builds.
        assert!(target.flags.cxxflags.contains(&"-flto".to_string()));
        assert!(target.flags.crgflags.contains(&"--release".to_string()));
    }

    #[test]
    fn test_mode_flags() {
        let s = settings(Platform::Gem5, vec![Isa::X86_64], BuildMode::Debug);
        let env = coordinator(&s).target(Isa::X86_64).cloned().unwrap();
        assert_eq!(env.flags.asflags[0], "-g");
        assert_eq!(env.flags.crgflags, vec!["--color=always", "-q"]);
        assert!(!env.flags.cxxflags.contains(&"-flto".to_string()));
        assert!(env
            .flags
            .cppflags
            .starts_with(&["-D__gem5__".to_string()]));
    }

    #[test]
    fn test_tiles_and_verbosity() {
        let mut s = settings(Platform::Gem5, vec![Isa::X86_64], BuildMode::Coverage);
        s.tiles = Some(8);
        s.verbose = true;
        let env = coordinator(&s).target(Isa::X86_64).cloned().unwrap();
        assert_eq!(env.get("TILES"), Some(Value::scalar("8")));
        assert!(env.flags.crgflags.contains(&"-v".to_string()));
        assert_eq!(env.triple, "x86_64-linux-gem5-muslcov");
    }

    #[test]
    fn test_library_paths() {
        let s = settings(Platform::Gem5, vec![Isa::Riscv], BuildMode::Debug);
        let env = coordinator(&s).target(Isa::Riscv).cloned().unwrap();
        assert_eq!(
            env.flags.libpath,
            vec!["build/cross-riscv/host/lib", "build/gem5-riscv-debug/bin"]
        );
        assert!(env
            .flags
            .cpppath
            .contains(&"src/libs/musl/arch/riscv64".to_string()));
    }
}
