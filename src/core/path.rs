//! Source-tree and build-tree paths.
//!
//! Every path in the generated graph is relative to the project root, because
//! the external executor runs from there. A [`SourcePath`] names a checked-in
//! file, a [`BuildPath`] names a generated one. Build paths are derived from an
//! output root plus either an explicit name or a source path with a rewritten
//! extension.

use std::fmt;
use std::path::{Component, Path};

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

/// Top-level directory of the source tree. It is dropped when a source path is
/// mapped into a build tree, so `src/a/b.cc` lands at `<root>/a/b.o`.
pub const SOURCE_DIR: &str = "src";

/// Errors produced while constructing paths.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("path `{path}` escapes the project root")]
    Escapes { path: String },

    #[error("path `{path}` is not valid UTF-8")]
    NotUtf8 { path: String },

    #[error("invalid glob pattern `{pattern}`: {message}")]
    BadPattern { pattern: String, message: String },
}

/// A checked-in file, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcePath(String);

impl SourcePath {
    /// The project root itself.
    pub fn root() -> Self {
        SourcePath(String::new())
    }

    /// Create a source path from a project-relative path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, PathError> {
        let path = path.as_ref();
        if path.is_absolute() {
            return Err(PathError::Escapes {
                path: path.display().to_string(),
            });
        }
        normalize(&SourcePath::root(), path).map(SourcePath)
    }

    /// Resolve `path` against the project root.
    ///
    /// Absolute paths must lie below `root`; relative paths are taken relative
    /// to `base`. The result is lexically normalized.
    pub fn resolve(root: &Path, base: &SourcePath, path: impl AsRef<Path>) -> Result<Self, PathError> {
        let path = path.as_ref();
        if path.is_absolute() {
            let rel = path.strip_prefix(root).map_err(|_| PathError::Escapes {
                path: path.display().to_string(),
            })?;
            return normalize(&SourcePath::root(), rel).map(SourcePath);
        }
        normalize(base, path).map(SourcePath)
    }

    /// Join a relative path onto this one.
    pub fn join(&self, path: impl AsRef<Path>) -> Result<Self, PathError> {
        normalize(self, path.as_ref()).map(SourcePath)
    }

    pub fn as_str(&self) -> &str {
        if self.0.is_empty() {
            "."
        } else {
            &self.0
        }
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last path component, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.0.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// Extension of the last component, without the dot.
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.0).extension().and_then(|e| e.to_str())
    }

    /// Location on disk.
    pub fn on_disk(&self, root: &Path) -> std::path::PathBuf {
        root.join(&self.0)
    }

    /// The path with the leading source directory removed.
    fn tree_relative(&self) -> &str {
        match self.0.strip_prefix(SOURCE_DIR) {
            Some("") => "",
            Some(rest) if rest.starts_with('/') => &rest[1..],
            _ => &self.0,
        }
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated file, relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildPath(String);

impl BuildPath {
    /// Create a build path from an explicit project-relative location.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let trimmed = path.trim_end_matches('/');
        BuildPath(trimmed.strip_prefix("./").unwrap_or(trimmed).to_string())
    }

    /// `<root>/<dir>/<name>`, where `dir` is a source directory mapped into the
    /// build tree.
    pub fn under(root: &BuildPath, dir: &SourcePath, name: &str) -> BuildPath {
        root.join(dir.tree_relative()).join(name)
    }

    /// Map a source file into the build tree below `root`, optionally rewriting
    /// the extension of its last component. The extension may be given with
    /// or without the leading dot (`".o"`, `"sf.o"`).
    pub fn for_source(root: &BuildPath, src: &SourcePath, ext: Option<&str>) -> BuildPath {
        let rel = src.tree_relative();
        match ext {
            Some(ext) => {
                let ext = ext.trim_start_matches('.');
                let rewritten = Path::new(rel).with_extension(ext);
                root.join(&rewritten.to_string_lossy())
            }
            None => root.join(rel),
        }
    }

    pub fn join(&self, name: &str) -> BuildPath {
        let name = name.trim_matches('/');
        if name.is_empty() || name == "." {
            self.clone()
        } else if self.0.is_empty() {
            BuildPath(name.to_string())
        } else {
            BuildPath(format!("{}/{}", self.0, name))
        }
    }

    /// Append a suffix to the last component (`kernel` -> `kernel.hex`).
    pub fn with_suffix(&self, suffix: &str) -> BuildPath {
        BuildPath(format!("{}{}", self.0, suffix))
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Either kind of path, as used for edge inputs and dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum FilePath {
    Source(SourcePath),
    Build(BuildPath),
}

impl FilePath {
    pub fn as_str(&self) -> &str {
        match self {
            FilePath::Source(p) => p.as_str(),
            FilePath::Build(p) => p.as_str(),
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            FilePath::Source(p) => p.file_name().unwrap_or("."),
            FilePath::Build(p) => p.file_name(),
        }
    }
}

impl From<SourcePath> for FilePath {
    fn from(p: SourcePath) -> Self {
        FilePath::Source(p)
    }
}

impl From<BuildPath> for FilePath {
    fn from(p: BuildPath) -> Self {
        FilePath::Build(p)
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lexically join `path` onto `base`, rejecting anything that climbs above
/// the project root.
fn normalize(base: &SourcePath, path: &Path) -> Result<String, PathError> {
    let mut parts: Vec<String> = if base.0.is_empty() {
        Vec::new()
    } else {
        base.0.split('/').map(str::to_string).collect()
    };

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(PathError::Escapes {
                        path: format!("{}/{}", base.as_str(), path.display()),
                    });
                }
            }
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| PathError::NotUtf8 {
                    path: path.display().to_string(),
                })?;
                parts.push(part.to_string());
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::Escapes {
                    path: path.display().to_string(),
                });
            }
        }
    }

    Ok(parts.join("/"))
}

fn is_glob_component(part: &str) -> bool {
    part.contains(['*', '?', '['])
}

/// Expand a glob pattern into source paths, sorted.
///
/// The pattern is relative to `base`, or to the project root if it starts
/// with `/`. Both files and directories match. Without `recursive`, the walk
/// never descends deeper than the pattern has components.
pub fn glob(
    root: &Path,
    base: &SourcePath,
    pattern: &str,
    recursive: bool,
) -> Result<Vec<SourcePath>, PathError> {
    let (base, pattern) = match pattern.strip_prefix('/') {
        Some(rest) => (SourcePath::root(), rest),
        None => (base.clone(), pattern),
    };

    // Walk from the longest literal prefix of the pattern.
    let components: Vec<&str> = pattern.split('/').filter(|c| !c.is_empty()).collect();
    let literal = components
        .iter()
        .take_while(|c| !is_glob_component(c))
        .count();
    let (prefix, rest) = components.split_at(literal);
    if rest.is_empty() {
        let single = base.join(prefix.join("/"))?;
        return Ok(if single.on_disk(root).exists() {
            vec![single]
        } else {
            Vec::new()
        });
    }

    let start = base.join(prefix.join("/"))?;
    let rest_pattern = rest.join("/");
    let matcher = Pattern::new(&rest_pattern).map_err(|e| PathError::BadPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let start_dir = start.on_disk(root);
    if !start_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(&start_dir).min_depth(1).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(rest.len());
    }

    let mut matches = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("glob error: {}", e);
                continue;
            }
        };
        let rel = match entry.path().strip_prefix(&start_dir) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let rel = rel.to_str().ok_or_else(|| PathError::NotUtf8 {
            path: entry.path().display().to_string(),
        })?;
        let rel = rel.replace('\\', "/");
        if matcher.matches_with(&rel, options) {
            matches.push(start.join(&rel)?);
        }
    }

    matches.sort();
    matches.dedup();
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_source_path_normalizes() {
        let p = SourcePath::new("src/./libs/../apps/hello.cc").unwrap();
        assert_eq!(p.as_str(), "src/apps/hello.cc");
        assert_eq!(p.file_name(), Some("hello.cc"));
        assert_eq!(p.extension(), Some("cc"));
    }

    #[test]
    fn test_source_path_rejects_escape() {
        assert!(matches!(
            SourcePath::new("src/../../etc/passwd"),
            Err(PathError::Escapes { .. })
        ));
        assert!(matches!(
            SourcePath::new("/etc/passwd"),
            Err(PathError::Escapes { .. })
        ));
    }

    #[test]
    fn test_resolve_absolute_inside_root() {
        let root = Path::new("/work/project");
        let base = SourcePath::new("src/apps").unwrap();
        let p = SourcePath::resolve(root, &base, "/work/project/src/include/a.h").unwrap();
        assert_eq!(p.as_str(), "src/include/a.h");

        let rel = SourcePath::resolve(root, &base, "hello/main.cc").unwrap();
        assert_eq!(rel.as_str(), "src/apps/hello/main.cc");

        assert!(SourcePath::resolve(root, &base, "/elsewhere/a.cc").is_err());
        assert!(SourcePath::resolve(root, &base, "../../../a.cc").is_err());
    }

    #[test]
    fn test_build_path_rewrites_extension() {
        let root = BuildPath::new("build/x");
        let src = SourcePath::new("src/a/b.cc").unwrap();
        assert_eq!(
            BuildPath::for_source(&root, &src, Some(".o")).as_str(),
            "build/x/a/b.o"
        );
        assert_eq!(
            BuildPath::for_source(&root, &src, Some("sf.o")).as_str(),
            "build/x/a/b.sf.o"
        );
        assert_eq!(
            BuildPath::for_source(&root, &src, None).as_str(),
            "build/x/a/b.cc"
        );
    }

    #[test]
    fn test_build_path_outside_source_dir_keeps_prefix() {
        let root = BuildPath::new("build/x/host");
        let src = SourcePath::new("tools/mkfs/mkfs.cc").unwrap();
        assert_eq!(
            BuildPath::for_source(&root, &src, Some("o")).as_str(),
            "build/x/host/tools/mkfs/mkfs.o"
        );
    }

    #[test]
    fn test_build_path_under_dir() {
        let root = BuildPath::new("build/x");
        let dir = SourcePath::new("src/libs/m3").unwrap();
        assert_eq!(
            BuildPath::under(&root, &dir, "libm3.a").as_str(),
            "build/x/libs/m3/libm3.a"
        );
        assert_eq!(
            BuildPath::under(&root, &SourcePath::new("src").unwrap(), "ld.conf").as_str(),
            "build/x/ld.conf"
        );
        assert_eq!(
            BuildPath::under(&root, &SourcePath::root(), "ld.conf").as_str(),
            "build/x/ld.conf"
        );
    }

    #[test]
    fn test_different_roots_do_not_collide() {
        let dir = SourcePath::new("src/apps/hello").unwrap();
        let target = BuildPath::under(&BuildPath::new("build/gem5-x86_64-debug"), &dir, "hello");
        let host = BuildPath::under(&BuildPath::new("build/gem5-x86_64-debug/host"), &dir, "hello");
        assert_ne!(target, host);
    }

    #[test]
    fn test_glob_sorted_and_non_recursive() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("src/lib");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("b.cc"), "").unwrap();
        fs::write(dir.join("a.cc"), "").unwrap();
        fs::write(dir.join("c.h"), "").unwrap();
        fs::write(dir.join("sub/d.cc"), "").unwrap();

        let base = SourcePath::new("src/lib").unwrap();
        let found = glob(tmp.path(), &base, "*.cc", false).unwrap();
        let names: Vec<_> = found.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["src/lib/a.cc", "src/lib/b.cc"]);

        let nested = glob(tmp.path(), &base, "*/*.cc", false).unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].as_str(), "src/lib/sub/d.cc");
    }

    #[test]
    fn test_glob_recursive() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("src/crate");
        fs::create_dir_all(dir.join("src/deep")).unwrap();
        fs::write(dir.join("src/lib.rs"), "").unwrap();
        fs::write(dir.join("src/deep/mod.rs"), "").unwrap();

        let found = glob(tmp.path(), &SourcePath::root(), "/src/crate/**/*.rs", true).unwrap();
        let names: Vec<_> = found.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["src/crate/src/deep/mod.rs", "src/crate/src/lib.rs"]);

        // Same call twice yields the same order.
        let again = glob(tmp.path(), &SourcePath::root(), "/src/crate/**/*.rs", true).unwrap();
        assert_eq!(found, again);
    }

    #[test]
    fn test_glob_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let found = glob(tmp.path(), &SourcePath::root(), "nothing/*.cc", false).unwrap();
        assert!(found.is_empty());
    }
}
