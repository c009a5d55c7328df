//! Bulk library sets a toolchain can pull in with one call.

use anyhow::Result;

use crate::config::{BuildToolKind, Bundle, LibraryConfig};
use crate::toolchain::Toolchain;

pub const ZLIB_URL: &str = "https://zlib.net/fossils/zlib-1.2.11.tar.gz";
pub const BZIP2_URL: &str = "https://sourceware.org/pub/bzip2/bzip2-1.0.6.tar.gz";
pub const XZ_URL: &str = "https://tukaani.org/xz/xz-5.2.3.tar.gz";
pub const ZSTD_URL: &str = "https://github.com/facebook/zstd/archive/v1.3.0.tar.gz";
pub const LINUX_URL: &str = "https://cdn.kernel.org/pub/linux/kernel/v4.x/linux-4.12.tar.xz";

/// Register every library of `bundle` with `toolchain`.
pub fn apply(toolchain: &mut Toolchain, bundle: Bundle) -> Result<()> {
    match bundle {
        Bundle::CompressionLibraries => install_compression_libraries(toolchain),
        Bundle::LinuxHeaders => install_linux_headers(toolchain),
    }
}

/// zlib, bzip2, xz and zstd, all static.
pub fn install_compression_libraries(toolchain: &mut Toolchain) -> Result<()> {
    // zlib's configure is hand-written and rejects --host/--build.
    toolchain.add_library(
        LibraryConfig::new("zlib", ZLIB_URL)
            .configure_arg("--host", false)
            .configure_arg("--build", false)
            .configure_arg("--static", true),
    )?;

    toolchain.add_library(
        LibraryConfig::new("bzip2", BZIP2_URL)
            .build_tool(BuildToolKind::Make)
            .build_arg("CC", "{cc}")
            .build_arg("AR", "{ar}")
            .build_arg("RANLIB", "{ranlib}")
            .build_targets(["libbz2.a", "bzip2", "bzip2recover"]),
    )?;

    toolchain.add_library(
        LibraryConfig::new("xz", XZ_URL)
            .configure_arg("--disable-shared", true)
            .configure_arg("--enable-static", true),
    )?;

    toolchain.add_library(
        LibraryConfig::new("zstd", ZSTD_URL)
            .build_tool(BuildToolKind::Make)
            .build_arg("CC", "{cc}")
            .build_arg("AR", "{ar}")
            .build_targets(["lib-release"]),
    )
}

/// Kernel UAPI headers via `make headers_install`.
pub fn install_linux_headers(toolchain: &mut Toolchain) -> Result<()> {
    let arch = kernel_arch(toolchain.core().arch()).to_string();
    toolchain.add_library(
        LibraryConfig::new("linux", LINUX_URL)
            .build_tool(BuildToolKind::Make)
            .build_targets(Vec::<String>::new())
            .install_targets(["headers_install"])
            .install_arg("ARCH", arch)
            .install_arg("INSTALL_HDR_PATH", "{prefix_dir}"),
    )
}

/// The kernel's name for a triple's architecture.
pub fn kernel_arch(arch: &str) -> &str {
    match arch {
        "x86_64" | "i386" | "i486" | "i586" | "i686" => "x86",
        "aarch64" | "aarch64_be" => "arm64",
        a if a.starts_with("arm") => "arm",
        a if a.starts_with("powerpc") => "powerpc",
        a if a.starts_with("mips") => "mips",
        a if a.starts_with("riscv") => "riscv",
        other => other,
    }
}
