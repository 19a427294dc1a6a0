//! Filesystem image.
//!
//! The image root is assembled in the build tree: stripped copies of every
//! registered binary under `bin/` and `sbin/`, plus a copy of a static
//! directory tree. One edge then packs that root with the image tool.

use anyhow::Result;

use crate::builder::compile;
use crate::builder::rules;
use crate::builder::session::TargetState;
use crate::core::env::Env;
use crate::core::graph::{BuildEdge, Fragment};
use crate::core::manifest::MANIFEST_NAME;
use crate::core::path::FilePath;

/// Name of the image tool in the tool directory.
pub const MKFS_TOOL: &str = "mkm3fs";

/// An image to pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsImageSpec {
    /// File name of the image below the build directory.
    pub name: String,
    /// Static content, relative to the current directory.
    pub dir: String,
    pub blocks: u64,
    pub inodes: u64,
}

pub fn fs_image(env: &Env, target: &TargetState, spec: &FsImageSpec) -> Result<Fragment> {
    let tool = env.dirs.tooldir.join(MKFS_TOOL);
    let out = env.dirs.builddir.join(&spec.name);
    let root = env.build_path(&spec.dir);
    let mut frag = Fragment::new(out.clone(), Vec::new());
    let mut deps: Vec<FilePath> = vec![tool.clone().into()];

    for (category, bin) in target.bins.iter() {
        let dst = root.join(&format!("{}/{}", category.as_str(), bin.file_name()));
        deps.push(frag.absorb(compile::strip(env, dst, bin.clone())).into());
    }

    let mut file_env = env.clone();
    file_env.flags.instflags.push("-m 0644".into());
    let mut dir_env = env.clone();
    dir_env.flags.instflags.push("-d".into());

    let pattern = format!("{}/**/*", spec.dir.trim_end_matches('/'));
    for src in env.glob(&pattern, true)? {
        if src.file_name() == Some(MANIFEST_NAME) {
            continue;
        }
        let dst = env.build_path_for(&src, None);
        let installed = if src.on_disk(env.root()).is_dir() {
            compile::install_as(&dir_env, dst, src)
        } else {
            compile::install_as(&file_env, dst, src)
        };
        deps.push(frag.absorb(installed).into());
    }

    tracing::debug!(
        "filesystem image {} with {} entries",
        out,
        deps.len() - 1
    );

    frag.edges.push(
        BuildEdge::new(rules::MKFS)
            .out(out)
            .deps(deps)
            .var("mkfs", tool.as_str())
            .var("dir", root.as_str())
            .var("blocks", spec.blocks.to_string())
            .var("inodes", spec.inodes.to_string()),
    );
    Ok(frag)
}
