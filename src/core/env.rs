//! Build environments.
//!
//! An [`Env`] carries everything a product builder needs to know: tool
//! paths, flag lists, output directories and the directory currently being
//! visited. Known settings are typed fields; anything else goes through the
//! string-keyed API ([`Env::get`], [`Env::set`], [`Env::append`]) and lands in
//! a pass-through map.
//!
//! Cloning is deep for everything mutable. The project root, the cross
//! toolchain description and the host environment are shared behind `Arc`
//! because they never change after construction.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builder::toolchain::CrossToolchain;
use crate::core::path::{self, BuildPath, PathError, SourcePath};
use crate::core::target::{BuildMode, Isa, Platform};

/// Errors from the string-keyed environment API.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("`{name}` is a scalar and cannot hold a list")]
    NotAList { name: String },

    #[error("`{name}` is a list and cannot hold a scalar")]
    NotAScalar { name: String },

    #[error("`{name}` is fixed when the environment is constructed")]
    ReadOnly { name: String },
}

/// Cargo environment variable with the C flags for embedded C code.
pub const TARGET_CFLAGS: &str = "TARGET_CFLAGS";

/// RISC-V code generation flags with and without the FPU.
pub const RISCV_HARD_FLOAT: &str = "-march=rv64imafdc -mabi=lp64d";
pub const RISCV_SOFT_FLOAT: &str = "-march=rv64imac -mabi=lp64";

/// A value in the string-keyed view of an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(String),
    List(Vec<String>),
}

impl Value {
    pub fn list<I, S>(items: I) -> Value
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn scalar(s: impl Into<String>) -> Value {
        Value::Scalar(s.into())
    }
}

/// Flag lists. Appending accumulates; nothing here is ever overwritten by
/// a builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Flags {
    pub cppflags: Vec<String>,
    pub cpppath: Vec<String>,
    pub cflags: Vec<String>,
    pub cxxflags: Vec<String>,
    pub asflags: Vec<String>,
    pub linkflags: Vec<String>,
    pub libpath: Vec<String>,
    pub crgflags: Vec<String>,
    pub instflags: Vec<String>,
}

/// Tool commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tools {
    pub cc: String,
    pub cxx: String,
    pub cpp: String,
    pub asm: String,
    pub ar: String,
    pub ranlib: String,
    pub strip: String,
}

impl Tools {
    /// Native tools found on `PATH`.
    pub fn native() -> Self {
        Tools {
            cc: "gcc".into(),
            cxx: "g++".into(),
            cpp: "cpp".into(),
            asm: "gcc".into(),
            ar: "gcc-ar".into(),
            ranlib: "gcc-ranlib".into(),
            strip: "strip".into(),
        }
    }

    /// Tools of a cross toolchain, e.g. `riscv64-buildroot-linux-musl-g++`.
    pub fn cross(prefix: &str) -> Self {
        Tools {
            cc: format!("{prefix}gcc"),
            cxx: format!("{prefix}g++"),
            cpp: format!("{prefix}cpp"),
            asm: format!("{prefix}gcc"),
            ar: format!("{prefix}gcc-ar"),
            ranlib: format!("{prefix}gcc-ranlib"),
            strip: format!("{prefix}strip"),
        }
    }
}

/// Output locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dirs {
    /// Root of this variant's build tree.
    pub builddir: BuildPath,
    /// Where objects and intermediate products of this environment go.
    pub objroot: BuildPath,
    pub bindir: BuildPath,
    pub libdir: BuildPath,
    pub memdir: BuildPath,
    pub tooldir: BuildPath,
    pub rustlibs: BuildPath,
}

impl Dirs {
    /// Standard layout below `builddir`.
    pub fn new(builddir: BuildPath) -> Self {
        Dirs {
            objroot: builddir.clone(),
            bindir: builddir.join("bin"),
            libdir: builddir.join("bin"),
            memdir: builddir.join("mem"),
            tooldir: builddir.join("toolsbin"),
            rustlibs: builddir.join("rust/libs"),
            builddir,
        }
    }
}

/// A build environment.
#[derive(Debug, Clone, Serialize)]
pub struct Env {
    #[serde(skip)]
    root: Arc<Path>,
    cur_dir: SourcePath,
    pub platform: Platform,
    pub isa: Isa,
    pub mode: BuildMode,
    /// Target triple for the second-language compiler.
    pub triple: String,
    pub flags: Flags,
    pub tools: Tools,
    pub dirs: Dirs,
    /// Extra environment variables for cargo invocations.
    pub cargo_env: BTreeMap<String, String>,
    extra: BTreeMap<String, Value>,
    #[serde(skip)]
    toolchain: Option<Arc<CrossToolchain>>,
    #[serde(skip)]
    host: Option<Arc<Env>>,
}

impl Env {
    /// Create an environment with native tools and no flags.
    pub fn new(
        root: impl AsRef<Path>,
        platform: Platform,
        isa: Isa,
        mode: BuildMode,
        builddir: BuildPath,
    ) -> Self {
        Env {
            root: Arc::from(root.as_ref()),
            cur_dir: SourcePath::root(),
            platform,
            isa,
            mode,
            triple: String::new(),
            flags: Flags::default(),
            tools: Tools::native(),
            dirs: Dirs::new(builddir),
            cargo_env: BTreeMap::new(),
            extra: BTreeMap::new(),
            toolchain: None,
            host: None,
        }
    }

    /// Project root on disk.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory currently being visited.
    pub fn cur_dir(&self) -> &SourcePath {
        &self.cur_dir
    }

    /// A copy of this environment positioned in a sub-directory.
    pub fn at(&self, dir: &str) -> Result<Env, PathError> {
        let mut env = self.clone();
        env.cur_dir = self.cur_dir.join(dir)?;
        Ok(env)
    }

    /// A copy of this environment positioned at an explicit source directory.
    pub fn at_source(&self, dir: SourcePath) -> Env {
        let mut env = self.clone();
        env.cur_dir = dir;
        env
    }

    pub fn toolchain(&self) -> Option<&CrossToolchain> {
        self.toolchain.as_deref()
    }

    pub fn set_toolchain(&mut self, toolchain: Arc<CrossToolchain>) {
        self.toolchain = Some(toolchain);
    }

    /// The host-tool environment reachable from this one, if any.
    pub fn host(&self) -> Option<&Env> {
        self.host.as_deref()
    }

    pub fn set_host(&mut self, host: Env) {
        self.host = Some(Arc::new(host));
    }

    /// Whether this environment builds soft-float code.
    pub fn is_soft_float(&self) -> bool {
        self.triple.ends_with("sf")
    }

    /// Switch to soft-float code generation.
    pub fn soft_float(&mut self) {
        match self.isa {
            Isa::X86_64 => {
                for list in [
                    &mut self.flags.asflags,
                    &mut self.flags.cflags,
                    &mut self.flags.cxxflags,
                ] {
                    list.extend(["-msoft-float".to_string(), "-mno-sse".to_string()]);
                }
            }
            Isa::Riscv => {
                self.flags.asflags.push("-mabi=lp64".into());
                for list in [&mut self.flags.cflags, &mut self.flags.cxxflags] {
                    list.extend(["-march=rv64imac".to_string(), "-mabi=lp64".to_string()]);
                }
                // C code embedded in cargo builds has to match.
                if let Some(cflags) = self.cargo_env.get_mut(TARGET_CFLAGS) {
                    *cflags = cflags.replace(RISCV_HARD_FLOAT, RISCV_SOFT_FLOAT);
                }
            }
            Isa::Arm => {}
        }
        self.triple.push_str("sf");
    }

    /// Resolve a path given relative to the current directory.
    pub fn src(&self, path: impl AsRef<Path>) -> Result<SourcePath, PathError> {
        SourcePath::resolve(&self.root, &self.cur_dir, path)
    }

    /// Expand a glob relative to the current directory. Sorted.
    pub fn glob(&self, pattern: &str, recursive: bool) -> Result<Vec<SourcePath>, PathError> {
        path::glob(&self.root, &self.cur_dir, pattern, recursive)
    }

    /// Output path for a named product of the current directory.
    pub fn build_path(&self, name: &str) -> BuildPath {
        BuildPath::under(&self.dirs.objroot, &self.cur_dir, name)
    }

    /// Output path derived from a source file, with an optional new extension.
    pub fn build_path_for(&self, src: &SourcePath, ext: Option<&str>) -> BuildPath {
        BuildPath::for_source(&self.dirs.objroot, src, ext)
    }

    /// Preprocessor flags plus include directories.
    pub fn cppflags_line(&self) -> String {
        let mut parts = self.flags.cppflags.clone();
        parts.extend(self.flags.cpppath.iter().map(|p| format!("-I{p}")));
        parts.join(" ")
    }

    /// Look up a setting by name. Unknown names resolve to `None`.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(list) = self.list(name) {
            return Some(Value::List(list.clone()));
        }
        let scalar = match name {
            "CC" => self.tools.cc.clone(),
            "CXX" => self.tools.cxx.clone(),
            "CPP" => self.tools.cpp.clone(),
            "AS" => self.tools.asm.clone(),
            "AR" => self.tools.ar.clone(),
            "RANLIB" => self.tools.ranlib.clone(),
            "STRIP" => self.tools.strip.clone(),
            "TRIPLE" => self.triple.clone(),
            "TGT" => self.platform.to_string(),
            "ISA" => self.isa.to_string(),
            "BUILD" => self.mode.to_string(),
            "BUILDDIR" => self.dirs.builddir.to_string(),
            "OBJROOT" => self.dirs.objroot.to_string(),
            "BINDIR" => self.dirs.bindir.to_string(),
            "LIBDIR" => self.dirs.libdir.to_string(),
            "MEMDIR" => self.dirs.memdir.to_string(),
            "TOOLDIR" => self.dirs.tooldir.to_string(),
            "RUSTLIBS" => self.dirs.rustlibs.to_string(),
            _ => return self.extra.get(name).cloned(),
        };
        Some(Value::Scalar(scalar))
    }

    /// Overwrite a setting.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), EnvError> {
        if matches!(name, "TGT" | "ISA" | "BUILD") {
            return Err(EnvError::ReadOnly { name: name.into() });
        }
        if let Some(list) = self.list_mut(name) {
            return match value {
                Value::List(items) => {
                    *list = items;
                    Ok(())
                }
                Value::Scalar(_) => Err(EnvError::NotAScalar { name: name.into() }),
            };
        }
        let is_known_scalar = self.scalar_mut(name).is_some() || self.dir_mut(name).is_some();
        match value {
            Value::Scalar(s) if is_known_scalar => {
                if let Some(slot) = self.scalar_mut(name) {
                    *slot = s;
                } else if let Some(dir) = self.dir_mut(name) {
                    *dir = BuildPath::new(s);
                }
                Ok(())
            }
            Value::List(_) if is_known_scalar => Err(EnvError::NotAList { name: name.into() }),
            value => {
                self.extra.insert(name.to_string(), value);
                Ok(())
            }
        }
    }

    /// Append to a list setting. Unset names start out as an empty list.
    pub fn append<I, S>(&mut self, name: &str, values: I) -> Result<(), EnvError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into);
        if let Some(list) = self.list_mut(name) {
            list.extend(values);
            return Ok(());
        }
        if self.scalar_mut(name).is_some() || self.dir_mut(name).is_some() {
            return Err(EnvError::NotAList { name: name.into() });
        }
        match self
            .extra
            .entry(name.to_string())
            .or_insert_with(|| Value::List(Vec::new()))
        {
            Value::List(list) => {
                list.extend(values);
                Ok(())
            }
            Value::Scalar(_) => Err(EnvError::NotAList { name: name.into() }),
        }
    }

    /// Remove every occurrence of `flag` from a list setting.
    pub fn remove_flag(&mut self, name: &str, flag: &str) -> Result<(), EnvError> {
        if let Some(list) = self.list_mut(name) {
            list.retain(|f| f != flag);
            return Ok(());
        }
        if self.scalar_mut(name).is_some() || self.dir_mut(name).is_some() {
            return Err(EnvError::NotAList { name: name.into() });
        }
        match self.extra.get_mut(name) {
            Some(Value::List(list)) => {
                list.retain(|f| f != flag);
                Ok(())
            }
            Some(Value::Scalar(_)) => Err(EnvError::NotAList { name: name.into() }),
            None => Ok(()),
        }
    }

    fn list(&self, name: &str) -> Option<&Vec<String>> {
        let f = &self.flags;
        Some(match name {
            "CPPFLAGS" => &f.cppflags,
            "CPPPATH" => &f.cpppath,
            "CFLAGS" => &f.cflags,
            "CXXFLAGS" => &f.cxxflags,
            "ASFLAGS" => &f.asflags,
            "LINKFLAGS" => &f.linkflags,
            "LIBPATH" => &f.libpath,
            "CRGFLAGS" => &f.crgflags,
            "INSTFLAGS" => &f.instflags,
            _ => return None,
        })
    }

    fn list_mut(&mut self, name: &str) -> Option<&mut Vec<String>> {
        let f = &mut self.flags;
        Some(match name {
            "CPPFLAGS" => &mut f.cppflags,
            "CPPPATH" => &mut f.cpppath,
            "CFLAGS" => &mut f.cflags,
            "CXXFLAGS" => &mut f.cxxflags,
            "ASFLAGS" => &mut f.asflags,
            "LINKFLAGS" => &mut f.linkflags,
            "LIBPATH" => &mut f.libpath,
            "CRGFLAGS" => &mut f.crgflags,
            "INSTFLAGS" => &mut f.instflags,
            _ => return None,
        })
    }

    fn scalar_mut(&mut self, name: &str) -> Option<&mut String> {
        let t = &mut self.tools;
        Some(match name {
            "CC" => &mut t.cc,
            "CXX" => &mut t.cxx,
            "CPP" => &mut t.cpp,
            "AS" => &mut t.asm,
            "AR" => &mut t.ar,
            "RANLIB" => &mut t.ranlib,
            "STRIP" => &mut t.strip,
            "TRIPLE" => &mut self.triple,
            _ => return None,
        })
    }

    fn dir_mut(&mut self, name: &str) -> Option<&mut BuildPath> {
        let d = &mut self.dirs;
        Some(match name {
            "BUILDDIR" => &mut d.builddir,
            "OBJROOT" => &mut d.objroot,
            "BINDIR" => &mut d.bindir,
            "LIBDIR" => &mut d.libdir,
            "MEMDIR" => &mut d.memdir,
            "TOOLDIR" => &mut d.tooldir,
            "RUSTLIBS" => &mut d.rustlibs,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Env {
        Env::new(
            "/project",
            Platform::Gem5,
            Isa::X86_64,
            BuildMode::Debug,
            BuildPath::new("build/gem5-x86_64-debug"),
        )
    }

    #[test]
    fn test_clone_does_not_alias() {
        let mut base = env();
        base.flags.cflags.push("-O2".into());

        let mut clone = base.clone();
        clone.append("CFLAGS", ["-g"]).unwrap();

        assert_eq!(clone.flags.cflags, vec!["-O2", "-g"]);
        assert_eq!(base.flags.cflags, vec!["-O2"]);
    }

    #[test]
    fn test_sibling_clones_are_independent() {
        let base = env();
        let mut a = base.clone();
        let mut b = base.clone();
        a.append("EXTRA", ["x"]).unwrap();
        b.set("CXX", Value::scalar("clang++")).unwrap();

        assert_eq!(a.get("EXTRA"), Some(Value::list(["x"])));
        assert_eq!(b.get("EXTRA"), None);
        assert_eq!(a.tools.cxx, "g++");
        assert_eq!(base.get("CXX"), Some(Value::scalar("g++")));
    }

    #[test]
    fn test_append_to_unset_initializes_list() {
        let mut e = env();
        assert_eq!(e.get("NOPE"), None);
        e.append("NOPE", ["a", "b"]).unwrap();
        e.append("NOPE", ["c"]).unwrap();
        assert_eq!(e.get("NOPE"), Some(Value::list(["a", "b", "c"])));
    }

    #[test]
    fn test_scalar_overwrites() {
        let mut e = env();
        e.set("TRIPLE", Value::scalar("a")).unwrap();
        e.set("TRIPLE", Value::scalar("b")).unwrap();
        assert_eq!(e.triple, "b");
        e.set("BINDIR", Value::scalar("out/bin/")).unwrap();
        assert_eq!(e.dirs.bindir.as_str(), "out/bin");
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let mut e = env();
        assert!(matches!(
            e.append("CXX", ["x"]),
            Err(EnvError::NotAList { .. })
        ));
        assert!(matches!(
            e.set("CFLAGS", Value::scalar("-O2")),
            Err(EnvError::NotAScalar { .. })
        ));
        assert!(matches!(
            e.set("ISA", Value::scalar("arm")),
            Err(EnvError::ReadOnly { .. })
        ));
    }

    #[test]
    fn test_remove_flag() {
        let mut e = env();
        e.append("CXXFLAGS", ["-O2", "-flto", "-g", "-flto"]).unwrap();
        e.remove_flag("CXXFLAGS", "-flto").unwrap();
        assert_eq!(e.flags.cxxflags, vec!["-O2", "-g"]);
        // Removing from something unset is a no-op.
        e.remove_flag("UNSET", "-x").unwrap();
    }

    #[test]
    fn test_soft_float_suffixes_triple() {
        let mut e = env();
        e.triple = "x86_64-linux-gem5-musl".into();
        assert!(!e.is_soft_float());
        e.soft_float();
        assert!(e.is_soft_float());
        assert!(e.flags.cxxflags.contains(&"-msoft-float".to_string()));
    }

    #[test]
    fn test_soft_float_riscv_cargo_flags() {
        let mut e = Env::new(
            "/project",
            Platform::Gem5,
            Isa::Riscv,
            BuildMode::Debug,
            BuildPath::new("build/gem5-riscv-debug"),
        );
        e.cargo_env.insert(
            TARGET_CFLAGS.into(),
            format!("{} -Isrc/include", RISCV_HARD_FLOAT),
        );
        e.soft_float();
        assert_eq!(
            e.cargo_env[TARGET_CFLAGS],
            "-march=rv64imac -mabi=lp64 -Isrc/include"
        );
        assert_eq!(e.flags.asflags, vec!["-mabi=lp64"]);
    }

    #[test]
    fn test_build_paths_follow_cursor() {
        let e = env().at("src").unwrap().at("apps/hello").unwrap();
        assert_eq!(e.cur_dir().as_str(), "src/apps/hello");
        assert_eq!(
            e.build_path("hello").as_str(),
            "build/gem5-x86_64-debug/apps/hello/hello"
        );
        let src = e.src("main.cc").unwrap();
        assert_eq!(
            e.build_path_for(&src, Some("o")).as_str(),
            "build/gem5-x86_64-debug/apps/hello/main.o"
        );
    }

    #[test]
    fn test_host_back_reference_is_shared() {
        let mut target = env();
        let mut host = env();
        host.dirs.objroot = BuildPath::new("build/gem5-x86_64-debug/host");
        target.set_host(host);

        let clone = target.clone();
        assert_eq!(
            clone.host().unwrap().dirs.objroot.as_str(),
            "build/gem5-x86_64-debug/host"
        );
    }
}
