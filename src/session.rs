//! Session persistence: the playlist snapshot written on shutdown and
//! restored on startup, plus M3U export of the same snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::m3u::{self, M3uEntry, ManifestError};
use crate::navigation::PlaybackMode;

const SESSION_SCHEMA_VERSION: u32 = 1;

/// One persisted playlist entry.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SnapshotEntry {
    pub source_ref: String,
    pub display_name: String,
    #[serde(default)]
    pub resume_position_seconds: Option<f64>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SessionFile {
    pub schema_version: u32,
    #[serde(default)]
    pub mode: PlaybackMode,
    /// Position of the entry that was current at save time.
    #[serde(default)]
    pub current_index: Option<usize>,
    #[serde(default)]
    pub entries: Vec<SnapshotEntry>,
}

impl SessionFile {
    pub fn new(mode: PlaybackMode, current_index: Option<usize>, entries: Vec<SnapshotEntry>) -> Self {
        Self {
            schema_version: SESSION_SCHEMA_VERSION,
            mode,
            current_index,
            entries,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to access session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Loads the session file. A missing, unreadable or outdated file yields
/// `None` so startup proceeds with an empty playlist.
pub fn load_session(path: &Path) -> Option<SessionFile> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!("Session: no session at {}: {}", path.display(), err);
            return None;
        }
    };
    let parsed: SessionFile = match serde_json::from_str(&contents) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("Session: failed parsing {}: {}", path.display(), err);
            return None;
        }
    };
    if parsed.schema_version != SESSION_SCHEMA_VERSION {
        warn!(
            "Session: ignoring {} with schema version {}",
            path.display(),
            parsed.schema_version
        );
        return None;
    }
    Some(parsed)
}

pub fn save_session(path: &Path, session: &SessionFile) -> Result<(), SessionError> {
    let io_error = |source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let serialized = serde_json::to_string_pretty(session)?;
    // The previous session stays intact until the rename.
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, serialized).map_err(io_error)?;
    fs::rename(&staging, path).map_err(io_error)?;
    debug!(
        "Session: saved {} entries to {}",
        session.entries.len(),
        path.display()
    );
    Ok(())
}

pub fn export_m3u(path: &Path, entries: &[SnapshotEntry]) -> Result<(), ManifestError> {
    let manifest: Vec<M3uEntry> = entries
        .iter()
        .map(|entry| M3uEntry {
            location: entry.source_ref.clone(),
            title: Some(entry.display_name.clone()),
            duration_seconds: entry.duration_seconds,
        })
        .collect();
    m3u::write_file(path, &manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, resume: Option<f64>) -> SnapshotEntry {
        SnapshotEntry {
            source_ref: format!("/media/{name}"),
            display_name: name.to_string(),
            resume_position_seconds: resume,
            duration_seconds: Some(100.0),
        }
    }

    #[test]
    fn test_session_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("session.json");
        let session = SessionFile::new(
            PlaybackMode::RepeatAll,
            Some(1),
            vec![entry("a.mkv", None), entry("b.mkv", Some(42.5))],
        );
        save_session(&path, &session).expect("save session");
        assert_eq!(load_session(&path), Some(session));
    }

    #[test]
    fn test_missing_or_corrupt_session_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        assert_eq!(load_session(&path), None);
        fs::write(&path, "{ not json").expect("write corrupt session");
        assert_eq!(load_session(&path), None);
    }

    #[test]
    fn test_outdated_schema_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{"schema_version": 0, "entries": []}"#).expect("write session");
        assert_eq!(load_session(&path), None);
    }

    #[test]
    fn test_export_m3u_uses_display_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("list.m3u");
        export_m3u(&path, &[entry("a.mkv", None)]).expect("export");
        let text = fs::read_to_string(&path).expect("read export");
        assert_eq!(text, "#EXTM3U\n#EXTINF:100,a.mkv\n/media/a.mkv\n");
    }
}
