use std::env;
use std::path::{Path, PathBuf};

/// Environment variables that change how `ffmpeg-sys-next` finds FFmpeg.
const DISCOVERY_VARS: [&str; 5] = [
    "FFMPEG_DIR",
    "PKG_CONFIG_PATH",
    "VCPKG_ROOT",
    "VCPKGRS_DYNAMIC",
    "VCPKGRS_TRIPLET",
];

fn main() {
    for var in DISCOVERY_VARS {
        println!("cargo:rerun-if-env-changed={var}");
    }

    if let Some(dir) = env::var_os("FFMPEG_DIR") {
        let dir = PathBuf::from(dir);
        if !dir.join("include").is_dir() {
            println!(
                "cargo:warning=FFMPEG_DIR={} has no include/ directory; FFmpeg headers will not be found there.",
                dir.display()
            );
        }
        return;
    }

    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("windows") {
        hint_vcpkg();
    }
}

/// Windows has no pkg-config by default; point at a vcpkg install if one exists.
fn hint_vcpkg() {
    let Ok(root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=Neither FFMPEG_DIR nor VCPKG_ROOT is set. Install FFmpeg (for example `vcpkg install ffmpeg:x64-windows`) and set FFMPEG_DIR."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let candidate = Path::new(&root).join("installed").join(&triplet);
    if candidate.is_dir() {
        println!(
            "cargo:warning=Using vcpkg FFmpeg at {0}; set FFMPEG_DIR={0} to silence this hint.",
            candidate.display()
        );
    } else {
        println!(
            "cargo:warning=VCPKG_ROOT is set but {} does not exist; is FFmpeg installed for triplet {triplet}?",
            candidate.display()
        );
    }
}
