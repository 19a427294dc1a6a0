//! CLI integration tests for tilegen.
//!
//! These tests run the binary against small project trees and check the
//! written build description.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

const GCC_LIB_DIR: &str = "build/cross-x86_64/host/lib/gcc/x86_64-buildroot-linux-musl/11.3.0";

/// Get the tilegen binary command, isolated from the caller's settings.
fn tilegen() -> Command {
    let mut cmd = Command::cargo_bin("tilegen").unwrap();
    for var in [
        "TILEGEN_TARGET",
        "TILEGEN_ISA",
        "TILEGEN_BUILD",
        "TILEGEN_TILES",
        "TILEGEN_VERBOSE",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A project that links one application and packs a filesystem image.
fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    write(root, "src/build.toml", "dirs = [\"libs\", \"apps\", \"fs\"]\n");
    write(root, "src/toolchain/ld.conf", "SECTIONS {}\n");
    write(root, "src/libs/build.toml", "dirs = [\"memory\", \"support\"]\n");
    write(
        root,
        "src/libs/memory/build.toml",
        "[[object]]\nsources = [\"*.cc\"]\n\n[[object]]\nsources = [\"*.cc\"]\nsoft_float = true\n",
    );
    for name in ["memcmp", "memcpy", "memmove", "memset", "memzero"] {
        write(root, &format!("src/libs/memory/{name}.cc"), "");
    }
    write(
        root,
        "src/libs/support/build.toml",
        r#"
[[object]]
sources = ["{isa}/crt*.S"]
install = "LIBDIR"

[[install]]
files = ["/{sysgcclibpath}/crt*"]
skip_existing = true
"#,
    );
    write(root, "src/libs/support/x86_64/crt0.S", "");
    write(root, "src/libs/support/x86_64/crt1.S", "");
    for crt in ["crtbegin.o", "crtend.o", "crtn.o"] {
        write(root, &format!("{GCC_LIB_DIR}/{crt}"), "");
    }

    write(root, "src/apps/build.toml", "dirs = [\"hello\"]\n");
    write(
        root,
        "src/apps/hello/build.toml",
        "[[exe]]\nname = \"hello\"\nsources = [\"hello.cc\"]\n",
    );
    write(root, "src/apps/hello/hello.cc", "int main() {}\n");

    write(
        root,
        "src/fs/build.toml",
        "[fs_image]\nname = \"default.img\"\ndir = \"default\"\n",
    );
    write(root, "src/fs/default/etc/motd", "hi\n");

    write(root, "tools/build.toml", "dirs = [\"mkm3fs\"]\n");
    write(
        root,
        "tools/mkm3fs/build.toml",
        "[[host_exe]]\nname = \"mkm3fs\"\nsources = [\"mkfs.cc\"]\n",
    );
    write(root, "tools/mkm3fs/mkfs.cc", "int main() {}\n");
    tmp
}

fn generate(dir: &Path) -> Command {
    let mut cmd = tilegen();
    cmd.args(["generate", "--skip-toolchain-check"])
        .env("TILEGEN_TARGET", "gem5")
        .env("TILEGEN_BUILD", "debug")
        .current_dir(dir);
    cmd
}

// ============================================================================
// tilegen generate
// ============================================================================

#[test]
fn test_generate_writes_ninja() {
    let tmp = project();

    generate(tmp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Generated"));

    let ninja = fs::read_to_string(tmp.path().join("build/gem5-x86_64-debug/build.ninja")).unwrap();
    assert!(ninja.contains("builddir = build/gem5-x86_64-debug"));
    assert!(ninja.contains("rule cargo"));
    assert!(ninja.contains("restat = 1"));
    assert!(ninja.contains("build build/gem5-x86_64-debug/apps/hello/hello: link"));
    assert!(ninja.contains("-Wl,--section-start=.text=0x1000000"));
    assert!(ninja.contains("build/gem5-x86_64-debug/default.img: mkfs"));
    assert!(ninja.contains("build/gem5-x86_64-debug/toolsbin/mkm3fs"));
}

#[test]
fn test_generate_unchanged_is_fresh() {
    let tmp = project();
    generate(tmp.path()).assert().success();
    let path = tmp.path().join("build/gem5-x86_64-debug/build.ninja");
    let first = fs::read_to_string(&path).unwrap();

    generate(tmp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Fresh"));
    assert_eq!(fs::read_to_string(&path).unwrap(), first);
}

#[test]
fn test_generate_json() {
    let tmp = project();
    let out = tmp.path().join("graph.json");

    generate(tmp.path())
        .args(["--format", "json", "-o"])
        .arg(&out)
        .assert()
        .success();

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
    let rules = json["rules"].as_array().unwrap();
    assert!(rules.iter().any(|r| r["name"] == "cargo" && r["restat"] == true));
    assert!(!json["edges"].as_array().unwrap().is_empty());
}

#[test]
fn test_generate_from_project_dir() {
    let tmp = project();
    let elsewhere = TempDir::new().unwrap();

    generate(elsewhere.path())
        .arg("-C")
        .arg(tmp.path())
        .assert()
        .success();
    assert!(tmp
        .path()
        .join("build/gem5-x86_64-debug/build.ninja")
        .exists());
}

#[test]
fn test_missing_target_is_an_error() {
    let tmp = project();

    tilegen()
        .args(["generate", "--skip-toolchain-check"])
        .env("TILEGEN_BUILD", "debug")
        .current_dir(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--target"));
}

#[test]
fn test_hardware_needs_riscv() {
    let tmp = project();

    tilegen()
        .args(["generate", "--skip-toolchain-check"])
        .env("TILEGEN_TARGET", "hw")
        .env("TILEGEN_ISA", "x86_64")
        .env("TILEGEN_BUILD", "release")
        .current_dir(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported ISA `x86_64`"));
    assert!(!tmp.path().join("build").join("hw-x86_64-release").exists());
}

#[test]
fn test_missing_cross_compiler() {
    let tmp = project();

    tilegen()
        .arg("generate")
        .env("TILEGEN_TARGET", "gem5")
        .env("TILEGEN_BUILD", "debug")
        .current_dir(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("cross compiler"));
}

#[test]
fn test_dangling_input_fails() {
    let tmp = project();
    write(
        tmp.path(),
        "src/apps/hello/build.toml",
        "[[exe]]\nname = \"hello\"\nsources = [\"missing.cc\"]\n",
    );

    generate(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("src/apps/hello/missing.cc"));
    assert!(!tmp
        .path()
        .join("build/gem5-x86_64-debug/build.ninja")
        .exists());
}

#[test]
fn test_manifest_typo_fails() {
    let tmp = project();
    write(tmp.path(), "src/apps/build.toml", "dir = [\"hello\"]\n");

    generate(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("src/apps/build.toml"));
}

// ============================================================================
// tilegen check
// ============================================================================

#[test]
fn test_check_writes_nothing() {
    let tmp = project();

    tilegen()
        .args(["check", "--skip-toolchain-check", "--target", "gem5", "--build", "debug"])
        .current_dir(tmp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Checked"));
    assert!(!tmp.path().join("build/gem5-x86_64-debug").exists());
}

// ============================================================================
// tilegen env
// ============================================================================

#[test]
fn test_env_prints_json() {
    let tmp = project();

    tilegen()
        .args(["env", "--target", "gem5", "--isa", "x86_64,riscv", "--build", "release"])
        .env("TILEGEN_TILES", "4")
        .current_dir(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("x86_64-linux-gem5-musl"))
        .stdout(predicate::str::contains("riscv64-linux-gem5-musl"))
        .stdout(predicate::str::contains("\"TILES\": \"4\""));
}
