//! Compiles the libtorrent shim when the `libtorrent` feature is enabled.

fn main() {
    #[cfg(feature = "libtorrent")]
    if let Err(err) = native::build() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[cfg(feature = "libtorrent")]
mod native {
    use std::env;
    use std::error::Error;
    use std::fmt;
    use std::fs;
    use std::path::{Path, PathBuf};

    const MIN_VERSION: (u32, u32, u32) = (2, 0, 0);
    const LIBRARY: &str = "btbridge-libtorrent";

    pub(super) fn build() -> Result<(), BuildError> {
        println!("cargo:rerun-if-env-changed=LIBTORRENT_INCLUDE_DIR");
        println!("cargo:rerun-if-env-changed=LIBTORRENT_LIB_DIR");
        println!("cargo:rerun-if-changed=src/ffi/bridge.rs");
        println!("cargo:rerun-if-changed=src/ffi/include/btbridge/session.hpp");
        println!("cargo:rerun-if-changed=src/ffi/session.cpp");

        let mut bridge = cxx_build::bridge("src/ffi/bridge.rs");
        bridge.flag_if_supported("-std=c++17");
        bridge.file("src/ffi/session.cpp");
        bridge.include(PathBuf::from("src/ffi/include"));

        let include_override = env::var_os("LIBTORRENT_INCLUDE_DIR").map(PathBuf::from);
        let lib_override = env::var_os("LIBTORRENT_LIB_DIR").map(PathBuf::from);

        match (include_override, lib_override) {
            (Some(include), Some(lib)) => {
                ensure_header_version(&include)?;
                bridge.include(&include);
                println!("cargo:rustc-link-search=native={}", lib.display());
                println!("cargo:rustc-link-lib=torrent-rasterbar");
            }
            (None, Some(_)) => return Err(BuildError::MissingIncludeDir),
            (include, None) => {
                let (major, minor, patch) = MIN_VERSION;
                let libtorrent = pkg_config::Config::new()
                    .atleast_version(&format!("{major}.{minor}.{patch}"))
                    .probe("libtorrent-rasterbar")
                    .map_err(BuildError::PkgConfig)?;
                if let Some(include) = include {
                    ensure_header_version(&include)?;
                    bridge.include(include);
                }
                for path in libtorrent.include_paths {
                    bridge.include(path);
                }
            }
        }

        bridge.compile(LIBRARY);
        Ok(())
    }

    fn ensure_header_version(include_dir: &Path) -> Result<(), BuildError> {
        let header = include_dir.join("libtorrent").join("version.hpp");
        let contents =
            fs::read_to_string(&header).map_err(|source| BuildError::ReadHeader { source })?;

        let major = parse_define(&contents, "LIBTORRENT_VERSION_MAJOR")
            .ok_or(BuildError::MissingDefine)?;
        let minor = parse_define(&contents, "LIBTORRENT_VERSION_MINOR")
            .ok_or(BuildError::MissingDefine)?;
        let patch =
            parse_define(&contents, "LIBTORRENT_VERSION_TINY").ok_or(BuildError::MissingDefine)?;

        if (major, minor, patch) < MIN_VERSION {
            return Err(BuildError::VersionTooOld);
        }
        Ok(())
    }

    fn parse_define(contents: &str, name: &str) -> Option<u32> {
        contents.lines().find_map(|line| {
            let mut parts = line.trim_start().strip_prefix("#define")?.split_whitespace();
            let key = parts.next()?;
            let value = parts.next()?;
            if key == name {
                value.parse::<u32>().ok()
            } else {
                None
            }
        })
    }

    #[derive(Debug)]
    pub(super) enum BuildError {
        MissingIncludeDir,
        PkgConfig(pkg_config::Error),
        ReadHeader { source: std::io::Error },
        MissingDefine,
        VersionTooOld,
    }

    impl fmt::Display for BuildError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::MissingIncludeDir => {
                    write!(f, "LIBTORRENT_LIB_DIR requires LIBTORRENT_INCLUDE_DIR")
                }
                Self::PkgConfig(_) => write!(f, "libtorrent pkg-config probe failed"),
                Self::ReadHeader { .. } => write!(f, "libtorrent version header read failed"),
                Self::MissingDefine => write!(f, "libtorrent version header missing field"),
                Self::VersionTooOld => write!(f, "libtorrent 2.0 or newer is required"),
            }
        }
    }

    impl Error for BuildError {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            match self {
                Self::PkgConfig(err) => Some(err),
                Self::ReadHeader { source } => Some(source),
                _ => None,
            }
        }
    }
}
