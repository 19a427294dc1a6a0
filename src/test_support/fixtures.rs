//! A small but complete project tree.
//!
//! It has everything an x86_64 gem5 build links against: the memory
//! primitives, start files, one in-tree system library, one C++ and one Rust
//! application, a host tool and a filesystem image, so the generated graph
//! validates.

use super::TestProject;

/// Runtime objects the cross compiler would normally provide.
pub const GCC_LIB_DIR: &str = "build/cross-x86_64/host/lib/gcc/x86_64-buildroot-linux-musl/11.3.0";

pub fn sample_project() -> TestProject {
    let p = TestProject::new();
    p.file("src/build.toml", "dirs = [\"libs\", \"apps\", \"fs\"]\n")
        .file("src/toolchain/ld.conf", "SECTIONS {}\n")
        .file("src/libs/build.toml", "dirs = [\"memory\", \"support\", \"m3\"]\n");

    p.file(
        "src/libs/memory/build.toml",
        r#"
[env]
remove = { CXXFLAGS = ["-flto"] }

[[object]]
sources = ["*.cc"]

[[object]]
sources = ["*.cc"]
soft_float = true
"#,
    );
    for name in ["memcmp", "memcpy", "memmove", "memset", "memzero"] {
        p.file(&format!("src/libs/memory/{name}.cc"), "");
    }

    p.file(
        "src/libs/support/build.toml",
        r#"
[[object]]
sources = ["{isa}/crt*.S"]
install = "LIBDIR"

[[install]]
files = ["/{sysgcclibpath}/crt*"]
skip_existing = true
"#,
    )
    .file("src/libs/support/x86_64/crt0.S", "")
    .file("src/libs/support/x86_64/crt1.S", "");
    for crt in ["crtbegin.o", "crtend.o", "crtn.o"] {
        p.file(&format!("{GCC_LIB_DIR}/{crt}"), "");
    }

    p.file(
        "src/libs/m3/build.toml",
        "[[static_lib]]\nname = \"m3\"\nsources = [\"*.cc\"]\n",
    )
    .file("src/libs/m3/env.cc", "")
    .file("src/libs/m3/syscalls.cc", "");

    p.file("src/apps/build.toml", "dirs = [\"hello\", \"rusty\"]\n")
        .file(
            "src/apps/hello/build.toml",
            "[[exe]]\nname = \"hello\"\nsources = [\"*.cc\"]\n",
        )
        .file("src/apps/hello/hello.cc", "int main() {}\n")
        .file(
            "src/apps/rusty/build.toml",
            "[[rust_exe]]\nname = \"rusty\"\n",
        )
        .file("src/apps/rusty/Cargo.toml", "[package]\nname = \"rusty\"\n")
        .file("src/apps/rusty/src/lib.rs", "")
        .file("src/Cargo.toml", "[workspace]\nmembers = [\"apps/rusty\"]\n")
        .file("rust-toolchain.toml", "")
        .file("src/toolchain/rust/x86_64-linux-gem5-musl.json", "{}");

    p.file(
        "src/fs/build.toml",
        "[fs_image]\nname = \"default.img\"\ndir = \"default\"\n",
    )
    .file("src/fs/default/etc/motd", "hello\n");

    p.file("tools/build.toml", "dirs = [\"mkm3fs\"]\n")
        .file(
            "tools/mkm3fs/build.toml",
            "[[host_exe]]\nname = \"mkm3fs\"\nsources = [\"*.cc\"]\n",
        )
        .file("tools/mkm3fs/mkfs.cc", "int main() {}\n");
    p
}
