//! Stamps build provenance into the binary for the `--debug` header.

use std::process::Command;

fn git_short_hash() -> Option<String> {
    let output = Command::new("git").args(["rev-parse", "--short", "HEAD"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!hash.is_empty()).then_some(hash)
}

fn main() {
    let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    println!("cargo:rustc-env=BUILD_TIME={}", stamp);

    if let Some(hash) = git_short_hash() {
        println!("cargo:rustc-env=GIT_COMMIT={}", hash);
    }

    let target = std::env::var("TARGET").unwrap_or_else(|_| String::from("unknown"));
    println!("cargo:rustc-env=TARGET_TRIPLE={}", target);

    println!("cargo:rerun-if-changed=build.rs");
}
