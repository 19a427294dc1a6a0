//! System executables.
//!
//! Linking a program for a tile pulls in far more than its own objects: the
//! runtime libraries, the toolchain's start files, a linker script, a fixed
//! load address and our own memory primitives. [`executable`] wires all of
//! that into the link edge and registers the result for the filesystem
//! image.

use anyhow::{anyhow, Result};

use crate::builder::compile;
use crate::builder::ldscript::LdScript;
use crate::builder::rules;
use crate::builder::session::{BinCategory, TargetState};
use crate::core::env::Env;
use crate::core::graph::{BuildEdge, Fragment, Generator};
use crate::core::path::{BuildPath, FilePath, SourcePath};

/// Runtime support libraries linked first.
pub const BASE_LIBS: [&str; 7] = ["gcc", "c", "gem5", "m", "gloss", "stdc++", "supc++"];

/// System libraries linked after the runtime.
pub const SYSTEM_LIBS: [&str; 3] = ["base", "m3", "thread"];

/// Memory primitives that replace the C library's versions.
pub const MEMORY_PRIMITIVES: [&str; 5] = ["memcmp", "memcpy", "memset", "memmove", "memzero"];

/// Source directory of the memory primitives.
pub const MEMORY_DIR: &str = "src/libs/memory";

/// What to link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExeSpec {
    pub name: String,
    pub ins: Vec<FilePath>,
    pub libs: Vec<String>,
    /// Where the binary goes in the filesystem image, if anywhere.
    pub category: Option<BinCategory>,
    /// Skip the runtime and system libraries.
    pub no_sup: bool,
    pub ldscript: LdScript,
    /// Pin `.text` to a fresh load address.
    pub var_addr: bool,
    /// Archives among `libs` that are built later in the run.
    pub archives: Vec<FilePath>,
}

impl ExeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        ExeSpec {
            name: name.into(),
            ins: Vec::new(),
            libs: Vec::new(),
            category: Some(BinCategory::Bin),
            no_sup: false,
            ldscript: LdScript::Default,
            var_addr: true,
            archives: Vec::new(),
        }
    }

    pub fn ins<P: Into<FilePath>>(mut self, ins: impl IntoIterator<Item = P>) -> Self {
        self.ins.extend(ins.into_iter().map(Into::into));
        self
    }

    pub fn libs<S: Into<String>>(mut self, libs: impl IntoIterator<Item = S>) -> Self {
        self.libs.extend(libs.into_iter().map(Into::into));
        self
    }

    pub fn category(mut self, category: Option<BinCategory>) -> Self {
        self.category = category;
        self
    }

    pub fn no_sup(mut self, no_sup: bool) -> Self {
        self.no_sup = no_sup;
        self
    }

    pub fn ldscript(mut self, ldscript: LdScript) -> Self {
        self.ldscript = ldscript;
        self
    }

    pub fn var_addr(mut self, var_addr: bool) -> Self {
        self.var_addr = var_addr;
        self
    }

    pub fn archives<P: Into<FilePath>>(mut self, archives: impl IntoIterator<Item = P>) -> Self {
        self.archives.extend(archives.into_iter().map(Into::into));
        self
    }
}

/// Full library list of a link. The C library is referenced again at the
/// end; some symbols only resolve in that second pass.
pub fn link_libs(spec: &ExeSpec) -> Vec<String> {
    if spec.no_sup {
        return spec.libs.clone();
    }
    BASE_LIBS
        .iter()
        .chain(SYSTEM_LIBS.iter())
        .map(|s| s.to_string())
        .chain(spec.libs.iter().cloned())
        .chain(std::iter::once("c".to_string()))
        .collect()
}

/// Archives the graph already builds for the libraries in `libs`. Names
/// without one (toolchain and system libraries) stay plain `-l` flags.
pub fn archive_deps(graph: &Generator, env: &Env, libs: &[String]) -> Vec<FilePath> {
    libs.iter()
        .filter_map(|name| {
            let file = format!("lib{name}.a");
            [&env.dirs.libdir, &env.dirs.rustlibs]
                .into_iter()
                .map(|dir| dir.join(&file))
                .find(|path| graph.is_output(path))
        })
        .map(FilePath::Build)
        .collect()
}

/// Object paths of the memory primitives for this environment.
pub fn memory_objects(env: &Env) -> Result<Vec<FilePath>> {
    let ext = compile::object_extension(env);
    MEMORY_PRIMITIVES
        .iter()
        .map(|name| {
            let src = SourcePath::new(format!("{MEMORY_DIR}/{name}.cc"))?;
            Ok(FilePath::Build(env.build_path_for(&src, Some(ext))))
        })
        .collect()
}

/// Link a system executable and install it. `graph` is only read, to find
/// the archives of linked libraries.
pub fn executable(
    env: &Env,
    graph: &Generator,
    target: &mut TargetState,
    spec: ExeSpec,
) -> Result<Fragment> {
    let toolchain = env.toolchain().ok_or_else(|| {
        anyhow!(
            "`{}` in `{}` needs a cross toolchain",
            spec.name,
            env.cur_dir()
        )
    })?;

    let mut env = env.clone();
    let libs = link_libs(&spec);
    let mut frag = Fragment::new(env.build_path(&spec.name), Vec::new());

    let script = frag.absorb(target.ldscripts.request(&env, spec.ldscript));
    env.flags.linkflags.push(format!("-Wl,-T,{script}"));

    let mut deps: Vec<FilePath> = vec![script.into()];
    deps.extend(
        toolchain
            .crts()
            .map(|crt| FilePath::Build(env.dirs.libdir.join(crt))),
    );
    deps.extend(archive_deps(graph, &env, &libs));
    deps.extend(spec.archives.iter().cloned());

    if spec.var_addr {
        let addr = target.addresses.allocate()?;
        tracing::debug!("{} in {} loads at {:#x}", spec.name, env.cur_dir(), addr);
        env.flags
            .linkflags
            .push(format!("-Wl,--section-start=.text={addr:#x}"));
    }

    // Start files are looked up in the library directory.
    env.flags.linkflags.push(format!("-B{}", env.dirs.libdir));

    let mut ins = memory_objects(&env)?;
    ins.extend(spec.ins.iter().cloned());

    let bin = frag.absorb(compile::cxx_exe(&env, &spec.name, &ins, &libs, deps)?);
    if env.platform.is_hardware() {
        let hex = frag.absorb(hex(&env, &format!("{}.hex", spec.name), bin.clone()));
        frag.absorb(compile::install(&env, &env.dirs.memdir, hex));
    }
    frag.absorb(compile::install(&env, &env.dirs.bindir, bin.clone()));

    if let Some(category) = spec.category {
        target.bins.register(category, bin.clone());
    }
    frag.output = bin;
    Ok(frag)
}

/// Convert a linked ELF file into a flat hex image.
pub fn hex(env: &Env, name: &str, input: BuildPath) -> Fragment {
    let out = env.build_path(name);
    let tool = env.dirs.tooldir.join("elf2hex");
    let edge = BuildEdge::new(rules::ELF2HEX)
        .out(out.clone())
        .input(input)
        .dep(tool.clone())
        .var("elf2hex", tool.as_str());
    Fragment::single(out, edge)
}
