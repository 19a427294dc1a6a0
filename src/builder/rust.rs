//! Second-language (Rust) integration.
//!
//! Rust modules are not compiled one by one. Each executable's crate is
//! registered in the target's [`RustRegistry`](crate::builder::session::RustRegistry)
//! and, once the whole tree has been visited, [`cargo_ws`] emits a single
//! cargo invocation producing one static archive per registered crate. The
//! rule is restat, so executables only relink when cargo actually touched
//! their archive.

use std::path::Path;

use anyhow::{anyhow, Result};

use crate::builder::compile;
use crate::builder::exe::{self, ExeSpec};
use crate::builder::ldscript::LdScript;
use crate::builder::rules;
use crate::builder::session::{BinCategory, TargetState};
use crate::core::env::Env;
use crate::core::graph::{BuildEdge, Fragment, Generator};
use crate::core::path::{BuildPath, FilePath, SourcePath, SOURCE_DIR};
use crate::util::fs::relative_path;

/// Flags for building the standard library from source.
const BUILD_STD: &str = "build-std=core,alloc,std,panic_abort";

/// A Rust executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RustExeSpec {
    pub name: String,
    pub libs: Vec<String>,
    pub category: Option<BinCategory>,
    /// Object linked before everything else, e.g. an assembly entry point.
    pub startup: Option<FilePath>,
    pub ldscript: LdScript,
    pub var_addr: bool,
    /// Link against the full C library instead of the minimal one.
    pub std: bool,
    /// The archive is built outside the workspace (see [`standalone`]).
    pub standalone: bool,
}

impl RustExeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        RustExeSpec {
            name: name.into(),
            libs: Vec::new(),
            category: Some(BinCategory::Bin),
            startup: None,
            ldscript: LdScript::Default,
            var_addr: true,
            std: false,
            standalone: false,
        }
    }
}

/// Link a Rust executable whose code lives in `lib<name>.a`.
pub fn rust_exe(
    env: &Env,
    graph: &Generator,
    target: &mut TargetState,
    spec: RustExeSpec,
) -> Result<Fragment> {
    if !spec.standalone {
        target.rust.register_app(env.cur_dir().clone());
    }

    let mut env = env.clone();
    env.flags.linkflags.push("-Wl,-z,muldefs".into());
    env.flags.libpath.push(env.dirs.rustlibs.to_string());
    env.flags.linkflags.push("-nodefaultlibs".into());

    let runtime: &[&str] = if spec.std {
        &["c", "gem5", "gcc", "gcc_eh"]
    } else if env.is_soft_float() {
        &["simplecsf", "gem5sf"]
    } else {
        &["simplec", "gem5", "gcc", "gcc_eh"]
    };
    let libs: Vec<String> = runtime
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(spec.name.clone()))
        .chain(spec.libs.iter().cloned())
        .collect();

    // Installed from the workspace (or standalone) build.
    let archive = env.dirs.rustlibs.join(&format!("lib{}.a", spec.name));
    let exe = ExeSpec::new(spec.name)
        .ins(spec.startup)
        .archives([archive])
        .libs(libs)
        .category(spec.category)
        .no_sup(true)
        .ldscript(spec.ldscript)
        .var_addr(spec.var_addr);
    exe::executable(&env, graph, target, exe)
}

/// Register the current directory as a Rust library crate. Its files become
/// dependencies of the workspace build; it has no output of its own.
pub fn register_lib(env: &Env, target: &mut TargetState) {
    target.rust.register_lib(env.cur_dir().clone());
}

fn crate_name(dir: &SourcePath) -> Result<&str> {
    dir.file_name()
        .ok_or_else(|| anyhow!("the project root cannot be a Rust crate"))
}

/// Manifest and sources of one crate.
fn crate_files(env: &Env, dir: &SourcePath) -> Result<Vec<FilePath>> {
    let mut files: Vec<FilePath> = vec![dir.join("Cargo.toml")?.into()];
    let pattern = format!("/{}/**/*.rs", dir.as_str());
    files.extend(env.glob(&pattern, true)?.into_iter().map(FilePath::from));
    Ok(files)
}

/// Cargo configuration below `dir`, if present.
fn cargo_config(env: &Env, dir: &SourcePath) -> Result<Option<SourcePath>> {
    for name in [".cargo/config", ".cargo/config.toml"] {
        let path = dir.join(name)?;
        if path.on_disk(env.root()).is_file() {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Files every Rust build depends on: workspace manifest, toolchain pin,
/// target specification and all registered library crates.
pub fn rust_deps(env: &Env, target: &TargetState) -> Result<Vec<FilePath>> {
    let src = SourcePath::new(SOURCE_DIR)?;
    let mut deps: Vec<FilePath> = vec![src.join("Cargo.toml")?.into()];
    if let Some(config) = cargo_config(env, &src)? {
        deps.push(config.into());
    }
    deps.push(SourcePath::new("rust-toolchain.toml")?.into());
    deps.push(
        src.join(format!("toolchain/rust/{}.json", env.triple))?
            .into(),
    );
    for lib in target.rust.libs() {
        deps.extend(crate_files(env, lib)?);
    }
    Ok(deps)
}

fn target_flags(env: &Env) -> Vec<String> {
    vec![
        "--target".to_string(),
        env.triple.clone(),
        "-Z".to_string(),
        BUILD_STD.to_string(),
    ]
}

/// Shell form of the extra cargo environment.
fn cargo_env_line(env: &Env) -> String {
    env.cargo_env
        .iter()
        .map(|(k, v)| format!("{k}='{}'", v.replace('\'', r"'\''")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A cargo edge run from `cargodir` with its target directory at
/// `targetdir`.
fn cargo_edge(env: &Env, cargodir: &SourcePath, targetdir: &BuildPath, flags: Vec<String>) -> BuildEdge {
    let base = if cargodir.is_root() {
        Path::new("")
    } else {
        Path::new(cargodir.as_str())
    };
    let rel = relative_path(base, Path::new(targetdir.as_str()));

    let mut flags = flags;
    flags.push("--target-dir".to_string());
    flags.push(rel.to_string_lossy().replace('\\', "/"));

    let mut edge = BuildEdge::new(rules::CARGO)
        .var("cargodir", cargodir.as_str())
        .var("cargoflags", flags.join(" "));
    let cargoenv = cargo_env_line(env);
    if !cargoenv.is_empty() {
        edge = edge.var("cargoenv", cargoenv);
    }
    edge
}

/// Directory cargo puts the archives of `env`'s triple in.
fn profile_dir(env: &Env, targetdir: &BuildPath) -> BuildPath {
    targetdir
        .join(&env.triple)
        .join(env.mode.cargo_profile())
}

/// The workspace build of every registered crate, followed by installs into
/// the Rust library directory. `None` if no crate was registered.
pub fn cargo_ws(env: &Env, target: &TargetState) -> Result<Option<Fragment>> {
    let apps = target.rust.apps();
    if apps.is_empty() {
        return Ok(None);
    }

    let targetdir = env.dirs.builddir.join("rust");
    let profile = profile_dir(env, &targetdir);

    let mut flags = env.flags.crgflags.clone();
    let mut outs = Vec::with_capacity(apps.len());
    let mut deps = rust_deps(env, target)?;
    for app in apps {
        let name = crate_name(app)?;
        outs.push(profile.join(&format!("lib{name}.a")));
        deps.extend(crate_files(env, app)?);
        flags.push("-p".to_string());
        flags.push(name.to_string());
    }
    flags.extend(target_flags(env));

    tracing::debug!(
        "cargo workspace for {}: {} crate(s)",
        env.triple,
        outs.len()
    );

    let src = SourcePath::new(SOURCE_DIR)?;
    let edge = cargo_edge(env, &src, &targetdir, flags)
        .outs(outs.iter().cloned())
        .deps(deps);

    let mut frag = Fragment::new(env.dirs.rustlibs.clone(), vec![edge]);
    let mut first = None;
    for out in outs {
        let installed = frag.absorb(compile::install(env, &env.dirs.rustlibs, out));
        first.get_or_insert(installed);
    }
    if let Some(first) = first {
        frag.output = first;
    }
    Ok(Some(frag))
}

/// Build the crate in the current directory on its own, with its own target
/// directory. Used for crates that need a different target specification
/// than the workspace.
pub fn standalone(env: &Env, target: &TargetState, out: &str) -> Result<Fragment> {
    let dir = env.cur_dir().clone();
    let targetdir = env.build_path("");
    let output = profile_dir(env, &targetdir).join(out);

    let mut deps = rust_deps(env, target)?;
    deps.extend(crate_files(env, &dir)?);
    if let Some(config) = cargo_config(env, &dir)? {
        deps.push(config.into());
    }

    let mut flags = env.flags.crgflags.clone();
    flags.extend(target_flags(env));

    let edge = cargo_edge(env, &dir, &targetdir, flags)
        .out(output.clone())
        .deps(deps);
    Ok(Fragment::single(output, edge))
}
