//! Generic product builders.
//!
//! Each builder is a pure function of an environment and an intent. It
//! returns a [`Fragment`] holding the new edges and the primary output; the
//! caller merges it into the graph.

use anyhow::{bail, Result};

use crate::builder::rules;
use crate::core::env::Env;
use crate::core::graph::{BuildEdge, Fragment};
use crate::core::path::{BuildPath, FilePath, SourcePath};
use crate::core::target::Language;

/// Object extension for the environment: soft-float objects are kept apart
/// so both flavors of a file can coexist.
pub fn object_extension(env: &Env) -> &'static str {
    if env.is_soft_float() {
        "sf.o"
    } else {
        "o"
    }
}

/// Compile one source file. The output defaults to the source path mapped
/// into the build tree with the object extension.
pub fn object(env: &Env, src: &SourcePath, out: Option<BuildPath>) -> Result<Fragment> {
    let Some(lang) = src.extension().and_then(Language::from_extension) else {
        bail!("don't know how to compile `{}`", src);
    };
    let out = out.unwrap_or_else(|| env.build_path_for(src, Some(object_extension(env))));
    let edge = rules::compile_edge(env, lang)
        .out(out.clone())
        .input(src.clone());
    Ok(Fragment::single(out, edge))
}

/// Compile every compilable source among `ins`; pass everything else
/// (generated files, prebuilt objects) through unchanged. Order is kept.
pub fn compile_inputs(env: &Env, ins: &[FilePath], frag: &mut Fragment) -> Result<Vec<FilePath>> {
    let mut objs = Vec::with_capacity(ins.len());
    for input in ins {
        match input {
            FilePath::Source(src)
                if src
                    .extension()
                    .and_then(Language::from_extension)
                    .is_some() =>
            {
                let obj = frag.absorb(object(env, src, None)?);
                objs.push(FilePath::Build(obj));
            }
            other => objs.push(other.clone()),
        }
    }
    Ok(objs)
}

/// Archive objects into `lib<name>.a` in the current directory.
pub fn static_lib(env: &Env, name: &str, ins: &[FilePath]) -> Result<Fragment> {
    let out = env.build_path(&format!("lib{name}.a"));
    let mut frag = Fragment::new(out.clone(), Vec::new());
    let objs = compile_inputs(env, ins, &mut frag)?;
    if objs.is_empty() {
        bail!("static library `{}` has no inputs", out);
    }

    frag.edges.push(
        BuildEdge::new(rules::AR)
            .out(out)
            .inputs(objs)
            .var("ar", &env.tools.ar),
    );
    Ok(frag)
}

/// Link an executable named `name` in the current directory.
///
/// `deps` affect staleness only; libraries are resolved by the linker
/// through the library search path.
pub fn cxx_exe(
    env: &Env,
    name: &str,
    ins: &[FilePath],
    libs: &[String],
    deps: Vec<FilePath>,
) -> Result<Fragment> {
    let out = env.build_path(name);
    let mut frag = Fragment::new(out.clone(), Vec::new());
    let objs = compile_inputs(env, ins, &mut frag)?;

    frag.edges.push(
        rules::link_edge(env, libs)
            .out(out)
            .inputs(objs)
            .deps(deps),
    );
    Ok(frag)
}

/// Copy `input` into `outdir`, keeping its file name.
pub fn install(env: &Env, outdir: &BuildPath, input: impl Into<FilePath>) -> Fragment {
    let input = input.into();
    let out = outdir.join(input.file_name());
    install_as(env, out, input)
}

/// Copy `input` to `out`.
pub fn install_as(env: &Env, out: BuildPath, input: impl Into<FilePath>) -> Fragment {
    let edge = BuildEdge::new(rules::INSTALL)
        .out(out.clone())
        .input(input)
        .var("instflags", env.flags.instflags.join(" "));
    Fragment::single(out, edge)
}

/// Strip symbols from `input` into `out`.
pub fn strip(env: &Env, out: BuildPath, input: impl Into<FilePath>) -> Fragment {
    let edge = BuildEdge::new(rules::STRIP)
        .out(out.clone())
        .input(input)
        .var("strip", &env.tools.strip);
    Fragment::single(out, edge)
}

/// Run `input` through the C preprocessor.
pub fn cpp(env: &Env, out: BuildPath, input: &SourcePath) -> Fragment {
    let edge = BuildEdge::new(rules::CPP)
        .out(out.clone())
        .input(input.clone())
        .var("cpp", &env.tools.cpp)
        .var("cppflags", env.cppflags_line());
    Fragment::single(out, edge)
}
