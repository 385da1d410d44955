//! Playlist entry model.
//!
//! A `MediaItem` is identified by its `ItemId`, never by its position. Positions
//! change on every insert, removal and reorder while ids stay fixed for the
//! lifetime of the entry.

use std::fmt;
use std::path::Path;

use uuid::Uuid;

/// Stable handle for one playlist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an entry came from. Decides probe eligibility and whether the entry
/// maps to a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    LocalFile,
    RemoteStream,
    /// Entry expanded from an imported manifest.
    PlaylistEntry,
}

/// Who supplied a known duration. Metadata from an import outranks a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationSource {
    Metadata,
    Probed,
}

/// Duration of an entry.
///
/// `Failed` is terminal for automatic resolution: the resolver never admits a
/// failed entry again unless a full scan is requested.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DurationState {
    Pending,
    Known { seconds: f64, source: DurationSource },
    /// Carried over from a snapshot or manifest; may be re-probed and replaced.
    Stale(f64),
    Failed,
}

impl DurationState {
    pub fn seconds(&self) -> Option<f64> {
        match self {
            DurationState::Known { seconds, .. } | DurationState::Stale(seconds) => Some(*seconds),
            DurationState::Pending | DurationState::Failed => None,
        }
    }

    pub fn needs_probe(&self) -> bool {
        matches!(self, DurationState::Pending | DurationState::Stale(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DurationState::Failed)
    }
}

/// One playlist entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub id: ItemId,
    pub source_ref: String,
    pub display_name: String,
    pub duration: DurationState,
    pub resume_position_seconds: Option<f64>,
    pub origin: Origin,
    pub order_index: usize,
}

impl MediaItem {
    /// Builds an entry with a fresh id. `order_index` is assigned on insert.
    pub fn new(source_ref: impl Into<String>, origin: Origin) -> Self {
        let source_ref = source_ref.into();
        let display_name = display_name_for(&source_ref);
        Self {
            id: ItemId::new(),
            source_ref,
            display_name,
            duration: DurationState::Pending,
            resume_position_seconds: None,
            origin,
            order_index: 0,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        if !display_name.trim().is_empty() {
            self.display_name = display_name;
        }
        self
    }

    pub fn with_duration(mut self, duration: DurationState) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_resume_position(mut self, seconds: Option<f64>) -> Self {
        self.resume_position_seconds = seconds;
        self
    }

    pub fn is_remote(&self) -> bool {
        is_remote_ref(&self.source_ref)
    }

    /// Local files are always eligible; remote entries only while their
    /// duration is still unknown.
    pub fn is_probe_eligible(&self) -> bool {
        match self.origin {
            Origin::LocalFile => true,
            Origin::RemoteStream | Origin::PlaylistEntry => !matches!(
                self.duration,
                DurationState::Known {
                    source: DurationSource::Metadata,
                    ..
                }
            ),
        }
    }

    /// Only entries backed by a file on disk may be deleted from disk.
    pub fn is_local_file(&self) -> bool {
        !self.is_remote()
    }
}

/// True for `scheme://...` references.
pub fn is_remote_ref(source_ref: &str) -> bool {
    match source_ref.split_once("://") {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// File name for paths, last non-empty path segment for URLs.
pub fn display_name_for(source_ref: &str) -> String {
    if let Some((_, rest)) = source_ref.split_once("://") {
        let rest = rest
            .split(['?', '#'])
            .next()
            .unwrap_or(rest)
            .trim_end_matches('/');
        return match rest.rsplit_once('/') {
            Some((_, tail)) if !tail.is_empty() => tail.to_string(),
            _ if !rest.is_empty() => rest.to_string(),
            _ => source_ref.to_string(),
        };
    }

    Path::new(source_ref)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| source_ref.to_string())
}

/// `H:MM:SS` above an hour, `MM:SS` otherwise, `--:--` when unknown.
pub fn format_duration(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds else {
        return "--:--".to_string();
    };
    if !seconds.is_finite() || seconds < 0.0 {
        return "--:--".to_string();
    }
    let total = seconds as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_ids_are_unique() {
        let a = MediaItem::new("/media/a.mkv", Origin::LocalFile);
        let b = MediaItem::new("/media/a.mkv", Origin::LocalFile);
        assert_ne!(a.id, b.id);
        assert_eq!(a.source_ref, b.source_ref);
    }

    #[test]
    fn test_display_name_for_paths_and_urls() {
        assert_eq!(display_name_for("/media/movies/Heat.mkv"), "Heat.mkv");
        assert_eq!(
            display_name_for("https://cdn.example.com/shows/ep1.mp4?token=abc"),
            "ep1.mp4"
        );
        assert_eq!(display_name_for("https://example.com"), "example.com");
    }

    #[test]
    fn test_remote_detection() {
        assert!(is_remote_ref("https://youtu.be/xyz"));
        assert!(is_remote_ref("rtsp://camera.local/stream"));
        assert!(!is_remote_ref("/home/user/video.mp4"));
        assert!(!is_remote_ref("C:\\Videos\\clip.mp4"));
    }

    #[test]
    fn test_probe_eligibility_respects_metadata_duration() {
        let local = MediaItem::new("/a.mp4", Origin::LocalFile);
        assert!(local.is_probe_eligible());

        let remote_unknown = MediaItem::new("https://x/a.mp4", Origin::RemoteStream);
        assert!(remote_unknown.is_probe_eligible());

        let remote_known = MediaItem::new("https://x/a.mp4", Origin::RemoteStream).with_duration(
            DurationState::Known {
                seconds: 30.0,
                source: DurationSource::Metadata,
            },
        );
        assert!(!remote_known.is_probe_eligible());
    }

    #[test]
    fn test_duration_state_helpers() {
        assert!(DurationState::Pending.needs_probe());
        assert!(DurationState::Stale(12.0).needs_probe());
        assert!(!DurationState::Failed.needs_probe());
        assert_eq!(DurationState::Stale(12.0).seconds(), Some(12.0));
        assert_eq!(DurationState::Failed.seconds(), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(None), "--:--");
        assert_eq!(format_duration(Some(f64::NAN)), "--:--");
        assert_eq!(format_duration(Some(65.9)), "01:05");
        assert_eq!(format_duration(Some(3725.0)), "1:02:05");
    }
}
