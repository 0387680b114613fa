//! Build script for fleetagent
//! Stamps the git hash and build time reported by `--version` and `/version`

use chrono::Utc;
use std::process::Command;

/// Lets packaging builds from a source tarball (no `.git`) supply the hash
const GIT_HASH_OVERRIDE: &str = "FLEETAGENT_GIT_HASH";

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!hash.is_empty()).then_some(hash)
}

fn main() {
    let git_hash = std::env::var(GIT_HASH_OVERRIDE)
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(git_short_hash)
        .unwrap_or_else(|| "unknown".to_string());

    let build_time = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=BUILD_TIME={}", build_time);

    println!("cargo:rerun-if-env-changed={}", GIT_HASH_OVERRIDE);
    println!("cargo:rerun-if-changed=../.git/HEAD");
}
