//! Deterministic staging paths

use std::path::{Path, PathBuf};

use crate::filesys::file::File;
use crate::installer::InstallerKind;

const PLACEHOLDER_EXT: &str = "bin";

/// Extensionless staging path for one task/app pair
pub fn base_path(temp_dir: &Path, task_id: i64, app_id: i64) -> PathBuf {
    temp_dir.join(format!("task_{}_app_{}", task_id, app_id))
}

fn with_ext(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Reuse a previous download at `base` with a known extension, else the
/// `.bin` placeholder
pub async fn find_existing_download_path(base: &Path) -> PathBuf {
    for ext in [
        InstallerKind::Package.extension(),
        InstallerKind::SelfExtracting.extension(),
        PLACEHOLDER_EXT,
    ] {
        let candidate = with_ext(base, ext);
        if File::new(&candidate).exists().await {
            return candidate;
        }
    }
    with_ext(base, PLACEHOLDER_EXT)
}

/// Prefix server-relative URLs with the server base URL
pub fn resolve_download_url(server_url: &str, url: &str) -> String {
    if url.starts_with('/') {
        format!("{}{}", server_url.trim_end_matches('/'), url)
    } else {
        url.to_string()
    }
}

/// The path the download should move to, when the server-provided filename
/// names an installer type the current path does not carry
pub fn installer_path_for(base: &Path, current: &Path, filename: &str) -> Option<PathBuf> {
    let kind = InstallerKind::from_path(Path::new(filename))?;
    let candidate = with_ext(base, kind.extension());
    if candidate == current {
        None
    } else {
        Some(candidate)
    }
}
