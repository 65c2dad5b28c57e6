//! Build script: places the default config.ini next to the built binary.

use std::env;
use std::fs;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=config.ini");
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = env::var("OUT_DIR").unwrap_or_default();

    // OUT_DIR is target/<profile>/build/<pkg>/out; the binary lives in target/<profile>/.
    let Some(profile_dir) = Path::new(&out_dir)
        .parent()
        .and_then(|p| p.parent())
        .and_then(|p| p.parent())
    else {
        return;
    };

    let src = Path::new("config.ini");
    if !src.exists() {
        return;
    }
    let dst = profile_dir.join("config.ini");
    if let Err(e) = fs::copy(src, &dst) {
        println!("cargo:warning=could not copy config.ini to {}: {}", dst.display(), e);
    }
}
