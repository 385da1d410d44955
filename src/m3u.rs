//! Extended M3U reading and writing.
//!
//! `#EXTINF:<seconds>,<title>` precedes each location. A duration of `-1`
//! means unknown. Unknown directives are skipped.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::media_item::is_remote_ref;

#[derive(Debug, Clone, PartialEq)]
pub struct M3uEntry {
    pub location: String,
    pub title: Option<String>,
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read playlist {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write playlist {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch playlist {url}: {reason}")]
    Fetch { url: String, reason: String },
}

pub fn parse(text: &str) -> Vec<M3uEntry> {
    let mut entries = Vec::new();
    let mut pending_title = None;
    let mut pending_duration = None;

    for line in text.lines() {
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() {
            continue;
        }
        if let Some(info) = line.strip_prefix("#EXTINF:") {
            let (duration, title) = match info.split_once(',') {
                Some((duration, title)) => (duration, Some(title.trim())),
                None => (info, None),
            };
            // Attributes such as `tvg-id="x"` may follow the duration.
            let duration = duration.split_whitespace().next().unwrap_or_default();
            pending_duration = duration
                .parse::<f64>()
                .ok()
                .filter(|seconds| seconds.is_finite() && *seconds >= 0.0);
            pending_title = title.filter(|title| !title.is_empty()).map(str::to_string);
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        entries.push(M3uEntry {
            location: line.to_string(),
            title: pending_title.take(),
            duration_seconds: pending_duration.take(),
        });
    }
    entries
}

pub fn render(entries: &[M3uEntry]) -> String {
    let mut out = String::from("#EXTM3U\n");
    for entry in entries {
        let duration = entry
            .duration_seconds
            .filter(|seconds| *seconds > 0.0)
            .map(|seconds| seconds as i64)
            .unwrap_or(-1);
        let title = entry.title.as_deref().unwrap_or_default();
        out.push_str(&format!("#EXTINF:{duration},{title}\n"));
        out.push_str(&entry.location);
        out.push('\n');
    }
    out
}

pub fn read_file(path: &Path) -> Result<Vec<M3uEntry>, ManifestError> {
    let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse(&text))
}

pub fn write_file(path: &Path, entries: &[M3uEntry]) -> Result<(), ManifestError> {
    fs::write(path, render(entries)).map_err(|source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("M3U: wrote {} entries to {}", entries.len(), path.display());
    Ok(())
}

/// Downloads a remote manifest as text.
pub fn fetch_remote(url: &str, timeout: std::time::Duration) -> Result<Vec<M3uEntry>, ManifestError> {
    let fetch_error = |reason: String| ManifestError::Fetch {
        url: url.to_string(),
        reason,
    };
    let response = ureq::get(url)
        .timeout(timeout)
        .call()
        .map_err(|err| fetch_error(err.to_string()))?;
    let text = response
        .into_string()
        .map_err(|err| fetch_error(err.to_string()))?;
    Ok(parse(&text))
}

/// Resolves a location found in a manifest loaded from `manifest_dir`.
/// Absolute paths and URLs are returned unchanged.
pub fn resolve_local_location(manifest_dir: &Path, location: &str) -> String {
    let location = location.strip_prefix("file://").unwrap_or(location);
    if is_remote_ref(location) || Path::new(location).is_absolute() {
        return location.to_string();
    }
    manifest_dir.join(location).to_string_lossy().to_string()
}

/// Resolves a location found in a manifest fetched from `manifest_url`.
pub fn resolve_remote_location(manifest_url: &str, location: &str) -> String {
    if is_remote_ref(location) {
        return location.to_string();
    }
    let base = manifest_url
        .split(['?', '#'])
        .next()
        .unwrap_or(manifest_url);
    if let Some(absolute) = location.strip_prefix('/') {
        if let Some((scheme, rest)) = base.split_once("://") {
            let host = rest.split('/').next().unwrap_or(rest);
            return format!("{scheme}://{host}/{absolute}");
        }
    }
    match base.rsplit_once('/') {
        Some((dir, _)) if dir.contains("://") => format!("{dir}/{location}"),
        _ => format!("{}/{location}", base.trim_end_matches('/')),
    }
}
