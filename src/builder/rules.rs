//! Standard rules and the edge variables they read.
//!
//! Rules are global and defined once per generator. Tool commands and flags
//! are never baked into a rule: every edge carries them as edge-local
//! variables taken from the environment it was built in, so host and
//! cross-target edges (and several targets) share the same rule set.

use crate::core::env::Env;
use crate::core::graph::{BuildEdge, Generator, GraphError, Rule};
use crate::core::target::Language;

pub const CC: &str = "cc";
pub const CXX: &str = "cxx";
pub const ASM: &str = "asm";
pub const CPP: &str = "cpp";
pub const AR: &str = "ar";
pub const LINK: &str = "link";
pub const STRIP: &str = "strip";
pub const INSTALL: &str = "install";
pub const ELF2HEX: &str = "elf2hex";
pub const MKFS: &str = "mkfs";
pub const CARGO: &str = "cargo";

/// Every rule the product builders use.
pub fn standard_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            CC,
            "$cc -MD -MF $out.d $cppflags $cflags -c $in -o $out",
            "CC $out",
        )
        .depfile("$out.d", "gcc"),
        Rule::new(
            CXX,
            "$cxx -MD -MF $out.d $cppflags $cxxflags -c $in -o $out",
            "CXX $out",
        )
        .depfile("$out.d", "gcc"),
        Rule::new(
            ASM,
            "$asm -MD -MF $out.d $cppflags $asflags -c $in -o $out",
            "AS $out",
        )
        .depfile("$out.d", "gcc"),
        Rule::new(CPP, "$cpp -P $cppflags $in -o $out", "CPP $out"),
        Rule::new(AR, "rm -f $out && $ar rcs $out $in", "AR $out"),
        Rule::new(
            LINK,
            "$link $linkflags -o $out $in $libpaths -Wl,--start-group $libs -Wl,--end-group",
            "LINK $out",
        ),
        Rule::new(STRIP, "$strip -o $out $in", "STRIP $out"),
        Rule::new(INSTALL, "install $instflags $in $out", "INSTALL $out"),
        Rule::new(ELF2HEX, "$elf2hex $in > $out", "ELF2HEX $out"),
        Rule::new(MKFS, "$mkfs $out $dir $blocks $inodes 0", "MKFS $out"),
        // The underlying tool may leave an archive untouched when it is
        // already current.
        Rule::new(
            CARGO,
            "cd $cargodir && $cargoenv cargo build $cargoflags",
            "CARGO $out",
        )
        .restat(),
    ]
}

/// Register the standard rules.
pub fn register(gen: &mut Generator) -> Result<(), GraphError> {
    for rule in standard_rules() {
        gen.add_rule(rule)?;
    }
    Ok(())
}

/// Rule compiling a source file of the given language.
pub fn compile_rule(lang: Language) -> &'static str {
    match lang {
        Language::C => CC,
        Language::Cxx => CXX,
        Language::Asm => ASM,
    }
}

/// A compile edge with the tool and flags of `env`.
pub fn compile_edge(env: &Env, lang: Language) -> BuildEdge {
    let edge = BuildEdge::new(compile_rule(lang)).var("cppflags", env.cppflags_line());
    match lang {
        Language::C => edge
            .var("cc", &env.tools.cc)
            .var("cflags", env.flags.cflags.join(" ")),
        Language::Cxx => edge
            .var("cxx", &env.tools.cxx)
            .var("cxxflags", env.flags.cxxflags.join(" ")),
        Language::Asm => edge
            .var("asm", &env.tools.asm)
            .var("asflags", env.flags.asflags.join(" ")),
    }
}

/// A link edge. Libraries are given by name and passed as `-l<name>`.
pub fn link_edge(env: &Env, libs: &[String]) -> BuildEdge {
    let libpaths: Vec<String> = env.flags.libpath.iter().map(|p| format!("-L{p}")).collect();
    let libs: Vec<String> = libs.iter().map(|l| format!("-l{l}")).collect();
    BuildEdge::new(LINK)
        .var("link", &env.tools.cxx)
        .var("linkflags", env.flags.linkflags.join(" "))
        .var("libpaths", libpaths.join(" "))
        .var("libs", libs.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::path::BuildPath;
    use crate::core::target::{BuildMode, Isa, Platform};

    #[test]
    fn test_rules_register_once() {
        let mut gen = Generator::new();
        register(&mut gen).unwrap();
        assert!(gen.rule(CARGO).unwrap().restat);
        assert!(!gen.rule(LINK).unwrap().restat);
        assert_eq!(
            gen.rule(CXX).unwrap().depfile,
            Some(("$out.d".to_string(), "gcc".to_string()))
        );
        assert!(matches!(
            register(&mut gen),
            Err(GraphError::DuplicateRule { .. })
        ));
    }

    #[test]
    fn test_edges_carry_env_tools() {
        let mut env = Env::new(
            "/p",
            Platform::Gem5,
            Isa::X86_64,
            BuildMode::Debug,
            BuildPath::new("build/x"),
        );
        env.flags.cppflags.push("-D__gem5__".into());
        env.flags.cpppath.push("src/include".into());
        env.flags.libpath.push("build/x/bin".into());

        let edge = compile_edge(&env, Language::Cxx);
        assert_eq!(edge.rule(), CXX);
        assert_eq!(edge.get_var("cxx"), Some("g++"));
        assert_eq!(edge.get_var("cppflags"), Some("-D__gem5__ -Isrc/include"));

        let link = link_edge(&env, &["m3".to_string(), "c".to_string()]);
        assert_eq!(link.get_var("libs"), Some("-lm3 -lc"));
        assert_eq!(link.get_var("libpaths"), Some("-Lbuild/x/bin"));
    }
}
