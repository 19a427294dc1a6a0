//! Directory-tree traversal.
//!
//! Every visited directory contributes to the graph through a
//! [`BuildScript`]: either one registered in code for that directory, or its
//! `build.toml`. Scripts emit products and recurse into the sub-directories
//! they declare. The order is fixed by those declarations; nothing is
//! discovered on the fly.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use crate::builder::compile;
use crate::builder::exe::{self, ExeSpec};
use crate::builder::fs_image::{self, FsImageSpec};
use crate::builder::rust::{self, RustExeSpec};
use crate::builder::session::{Session, TargetState};
use crate::core::env::{Env, Value};
use crate::core::graph::{Fragment, Generator};
use crate::core::manifest::{
    DirManifest, ExeDecl, HostExeDecl, InstallDecl, ObjectDecl, Placeholders, RustExeDecl,
    StaticLibDecl, MANIFEST_NAME,
};
use crate::core::path::{BuildPath, FilePath, SourcePath};
use crate::core::target::Isa;

/// The callback of one directory.
pub trait BuildScript {
    fn build(&self, cx: &mut BuildCx<'_>, env: &Env) -> Result<()>;
}

impl<F> BuildScript for F
where
    F: Fn(&mut BuildCx<'_>, &Env) -> Result<()>,
{
    fn build(&self, cx: &mut BuildCx<'_>, env: &Env) -> Result<()> {
        self(cx, env)
    }
}

/// Build scripts registered in code, keyed by directory.
#[derive(Default)]
pub struct ScriptRegistry {
    scripts: HashMap<SourcePath, Box<dyn BuildScript>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `script` instead of the `build.toml` of `dir`.
    pub fn register(&mut self, dir: SourcePath, script: impl BuildScript + 'static) {
        self.scripts.insert(dir, Box::new(script));
    }

    pub fn get(&self, dir: &SourcePath) -> Option<&dyn BuildScript> {
        self.scripts.get(dir).map(|s| s.as_ref())
    }

}

/// What a build script works with: the session and the way down the tree.
pub struct BuildCx<'a> {
    session: &'a mut Session,
    scripts: &'a ScriptRegistry,
}

impl<'a> BuildCx<'a> {
    pub fn new(session: &'a mut Session, scripts: &'a ScriptRegistry) -> Self {
        BuildCx { session, scripts }
    }

    /// Visit the sub-directory `dir` of `env`'s current directory.
    pub fn sub_build(&mut self, env: &Env, dir: &str) -> Result<()> {
        let env = env.at(dir)?;
        let cur = env.cur_dir().clone();
        debug!("visiting {} ({})", cur, env.isa);

        let scripts = self.scripts;
        if let Some(script) = scripts.get(&cur) {
            return script
                .build(self, &env)
                .with_context(|| format!("failed to build `{}`", cur));
        }

        let path = cur.join(MANIFEST_NAME)?.on_disk(env.root());
        if !path.is_file() {
            bail!("no {} in `{}`", MANIFEST_NAME, cur);
        }
        let manifest = DirManifest::load(&path)?;
        manifest
            .build(self, &env)
            .with_context(|| format!("failed to build `{}`", cur))
    }

    /// Add a builder's output to the graph.
    pub fn merge(&mut self, fragment: Fragment) -> Result<BuildPath> {
        Ok(self.session.merge(fragment)?)
    }

    pub fn target(&mut self, isa: Isa) -> &mut TargetState {
        self.session.state.target(isa)
    }

    /// The graph built so far, next to the state of `isa`.
    pub fn graph_and_target(&mut self, isa: Isa) -> (&Generator, &mut TargetState) {
        let Session { graph, state } = &mut *self.session;
        (&*graph, state.target(isa))
    }

    pub fn session(&mut self) -> &mut Session {
        self.session
    }
}

impl BuildScript for DirManifest {
    fn build(&self, cx: &mut BuildCx<'_>, env: &Env) -> Result<()> {
        if !self.when.matches(env) {
            debug!("skipping {} for {}", env.cur_dir(), env.isa);
            return Ok(());
        }

        let vars = Placeholders::from_env(env);
        let mut env = env.clone();
        self.env.apply(&mut env, &vars)?;

        if self.rust_lib {
            rust::register_lib(&env, cx.target(env.isa));
        }
        for decl in &self.object {
            build_objects(cx, &env, &vars, decl)?;
        }
        for decl in &self.static_lib {
            build_static_lib(cx, &env, &vars, decl)?;
        }
        for decl in &self.install {
            build_install(cx, &env, &vars, decl)?;
        }
        for decl in &self.exe {
            build_exe(cx, &env, &vars, decl)?;
        }
        for decl in &self.host_exe {
            build_host_exe(cx, &env, &vars, decl)?;
        }
        for decl in &self.rust_exe {
            build_rust_exe(cx, &env, &vars, decl)?;
        }
        if let Some(decl) = &self.fs_image {
            let spec = FsImageSpec {
                name: vars.expand(&decl.name)?,
                dir: vars.expand(&decl.dir)?,
                blocks: decl.blocks_for(env.mode),
                inodes: decl.inodes,
            };
            let frag = fs_image::fs_image(&env, cx.target(env.isa), &spec)?;
            cx.merge(frag)?;
        }

        for dir in &self.dirs {
            cx.sub_build(&env, &vars.expand(dir)?)?;
        }
        Ok(())
    }
}

fn has_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Source files named by `patterns`. Globs expand sorted; plain names are
/// taken as they are and checked when the graph is validated.
fn expand_sources(env: &Env, vars: &Placeholders, patterns: &[String]) -> Result<Vec<FilePath>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let pattern = vars.expand(pattern)?;
        if has_glob(&pattern) {
            let matches = env.glob(&pattern, false)?;
            if matches.is_empty() {
                debug!("`{}` in {} matches nothing", pattern, env.cur_dir());
            }
            files.extend(matches.into_iter().map(FilePath::from));
        } else if let Some(rooted) = pattern.strip_prefix('/') {
            files.push(SourcePath::new(rooted)?.into());
        } else {
            files.push(env.src(&pattern)?.into());
        }
    }
    Ok(files)
}

/// Products of this directory referenced by file name.
fn local_objects(env: &Env, names: &[String]) -> Vec<FilePath> {
    names
        .iter()
        .map(|name| FilePath::Build(env.build_path(name)))
        .collect()
}

/// An output directory named by its setting, e.g. `LIBDIR`.
fn output_dir(env: &Env, name: &str) -> Result<BuildPath> {
    match env.get(name) {
        Some(Value::Scalar(dir)) if !dir.is_empty() => Ok(BuildPath::new(dir)),
        Some(_) => bail!("`{}` is not a directory", name),
        None => bail!("unknown directory `{}`", name),
    }
}

fn flavored(env: &Env, soft_float: bool) -> Env {
    let mut env = env.clone();
    if soft_float && !env.is_soft_float() {
        env.soft_float();
    }
    env
}

fn build_objects(
    cx: &mut BuildCx<'_>,
    env: &Env,
    vars: &Placeholders,
    decl: &ObjectDecl,
) -> Result<()> {
    let env = flavored(env, decl.soft_float);
    let installdir = decl
        .install
        .as_deref()
        .map(|name| output_dir(&env, name))
        .transpose()?;

    for src in expand_sources(&env, vars, &decl.sources)? {
        let FilePath::Source(src) = src else {
            continue;
        };
        let obj = cx.merge(compile::object(&env, &src, None)?)?;
        if let Some(dir) = &installdir {
            cx.merge(compile::install(&env, dir, obj))?;
        }
    }
    Ok(())
}

fn build_static_lib(
    cx: &mut BuildCx<'_>,
    env: &Env,
    vars: &Placeholders,
    decl: &StaticLibDecl,
) -> Result<()> {
    let env = flavored(env, decl.soft_float);
    let mut ins = expand_sources(&env, vars, &decl.sources)?;
    ins.extend(local_objects(&env, &decl.objects));

    let lib = cx.merge(compile::static_lib(&env, &decl.name, &ins)?)?;
    if decl.install {
        cx.merge(compile::install(&env, &env.dirs.libdir, lib))?;
    }
    Ok(())
}

fn build_install(
    cx: &mut BuildCx<'_>,
    env: &Env,
    vars: &Placeholders,
    decl: &InstallDecl,
) -> Result<()> {
    let dir = output_dir(env, &decl.to)?;
    for file in expand_sources(env, vars, &decl.files)? {
        let dst = dir.join(file.file_name());
        if decl.skip_existing && cx.session().graph.is_output(&dst) {
            debug!("{} is already installed", dst);
            continue;
        }
        cx.merge(compile::install_as(env, dst, file))?;
    }
    Ok(())
}

fn build_exe(cx: &mut BuildCx<'_>, env: &Env, vars: &Placeholders, decl: &ExeDecl) -> Result<()> {
    let mut ins = expand_sources(env, vars, &decl.sources)?;
    ins.extend(local_objects(env, &decl.objects));

    let spec = ExeSpec::new(vars.expand(&decl.name)?)
        .ins(ins)
        .libs(vars.expand_all(&decl.libs)?)
        .category(decl.category.bin_category())
        .no_sup(decl.no_sup)
        .ldscript(decl.ldscript)
        .var_addr(decl.var_addr);
    let (graph, target) = cx.graph_and_target(env.isa);
    let frag = exe::executable(env, graph, target, spec)?;
    cx.merge(frag)?;
    Ok(())
}

fn build_host_exe(
    cx: &mut BuildCx<'_>,
    env: &Env,
    vars: &Placeholders,
    decl: &HostExeDecl,
) -> Result<()> {
    // Target directories reach the host through the back-reference; host
    // roots are visited with the host environment itself.
    let mut host = match env.host() {
        Some(host) => host.at_source(env.cur_dir().clone()),
        None => env.clone(),
    };
    host.flags
        .cppflags
        .extend(vars.expand_all(&decl.cppflags)?);

    let ins = expand_sources(&host, vars, &decl.sources)?;
    let name = vars.expand(&decl.name)?;
    let bin = cx.merge(compile::cxx_exe(
        &host,
        &name,
        &ins,
        &vars.expand_all(&decl.libs)?,
        Vec::new(),
    )?)?;
    if decl.install {
        cx.merge(compile::install(&host, &host.dirs.tooldir, bin))?;
    }
    Ok(())
}

fn build_rust_exe(
    cx: &mut BuildCx<'_>,
    env: &Env,
    vars: &Placeholders,
    decl: &RustExeDecl,
) -> Result<()> {
    let name = vars.expand(&decl.name)?;
    let startup = match &decl.startup {
        Some(pattern) => {
            let src = match expand_sources(env, vars, std::slice::from_ref(pattern))?.pop() {
                Some(FilePath::Source(src)) => src,
                _ => return Err(anyhow!("startup code `{}` not found", pattern)),
            };
            Some(FilePath::Build(cx.merge(compile::object(env, &src, None)?)?))
        }
        None => None,
    };

    if decl.standalone {
        let frag = rust::standalone(env, cx.target(env.isa), &format!("lib{name}.a"))?;
        let archive = cx.merge(frag)?;
        cx.merge(compile::install(env, &env.dirs.rustlibs, archive))?;
    }

    let spec = RustExeSpec {
        libs: vars.expand_all(&decl.libs)?,
        category: decl.category.bin_category(),
        startup,
        ldscript: decl.ldscript,
        var_addr: decl.var_addr,
        std: decl.std,
        standalone: decl.standalone,
        ..RustExeSpec::new(name)
    };
    let (graph, target) = cx.graph_and_target(env.isa);
    let frag = rust::rust_exe(env, graph, target, spec)?;
    cx.merge(frag)?;
    Ok(())
}
