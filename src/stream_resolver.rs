//! Stream URL resolution for imports.
//!
//! A stream resolver turns one URL into zero or more playable entries. The
//! passthrough resolver keeps the URL as-is and leaves the duration to the
//! probe; the yt-dlp resolver expands channel/playlist pages and carries the
//! durations the extractor reports.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use log::debug;

use crate::media_item::display_name_for;

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub source_ref: String,
    pub title: Option<String>,
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("extractor failed: {0}")]
    Extractor(String),
    #[error("invalid extractor output: {0}")]
    InvalidOutput(#[from] serde_json::Error),
}

pub trait StreamResolver: Send + Sync {
    fn resolve(&self, url: &str) -> Result<Vec<StreamEntry>, StreamError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughStreamResolver;

impl StreamResolver for PassthroughStreamResolver {
    fn resolve(&self, url: &str) -> Result<Vec<StreamEntry>, StreamError> {
        Ok(vec![StreamEntry {
            source_ref: url.to_string(),
            title: Some(display_name_for(url)),
            duration_seconds: None,
        }])
    }
}

/// Runs `yt-dlp -J --flat-playlist` and reads its JSON document.
#[derive(Debug, Clone)]
pub struct YtDlpStreamResolver {
    program: PathBuf,
}

#[derive(Debug, serde::Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    entries: Option<Vec<YtDlpInfo>>,
}

impl YtDlpStreamResolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl StreamResolver for YtDlpStreamResolver {
    fn resolve(&self, url: &str) -> Result<Vec<StreamEntry>, StreamError> {
        let program = self.program.display().to_string();
        let output = Command::new(&self.program)
            .args(["-J", "--flat-playlist", "--no-warnings"])
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| StreamError::Launch { program, source })?;
        if !output.status.success() {
            return Err(StreamError::Extractor(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let entries = parse_ytdlp_json(url, &output.stdout)?;
        debug!("YtDlpStreamResolver: {} resolved to {} entries", url, entries.len());
        Ok(entries)
    }
}

/// Flattens a yt-dlp info document. Playlist documents yield one entry per
/// child; single videos yield the page itself.
pub fn parse_ytdlp_json(requested_url: &str, json: &[u8]) -> Result<Vec<StreamEntry>, StreamError> {
    let info: YtDlpInfo = serde_json::from_slice(json)?;
    let valid_duration = |duration: Option<f64>| duration.filter(|d| d.is_finite() && *d > 0.0);

    match info.entries {
        Some(children) => Ok(children
            .into_iter()
            .filter_map(|child| {
                let source_ref = child.webpage_url.or(child.url)?;
                Some(StreamEntry {
                    source_ref,
                    title: child.title,
                    duration_seconds: valid_duration(child.duration),
                })
            })
            .collect()),
        None => Ok(vec![StreamEntry {
            source_ref: info
                .webpage_url
                .unwrap_or_else(|| requested_url.to_string()),
            title: info.title,
            duration_seconds: valid_duration(info.duration),
        }]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_keeps_url() {
        let entries = PassthroughStreamResolver
            .resolve("https://example.com/live/stream.m3u8")
            .expect("passthrough never fails");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_ref, "https://example.com/live/stream.m3u8");
        assert_eq!(entries[0].title.as_deref(), Some("stream.m3u8"));
        assert_eq!(entries[0].duration_seconds, None);
    }

    #[test]
    fn test_parse_single_video_document() {
        let json = br#"{"title":"Talk","duration":1834.0,"webpage_url":"https://www.youtube.com/watch?v=abc"}"#;
        let entries = parse_ytdlp_json("https://youtu.be/abc", json).expect("valid json");
        assert_eq!(
            entries,
            vec![StreamEntry {
                source_ref: "https://www.youtube.com/watch?v=abc".to_string(),
                title: Some("Talk".to_string()),
                duration_seconds: Some(1834.0),
            }]
        );
    }

    #[test]
    fn test_parse_flat_playlist_document() {
        let json = br#"{
            "title": "Channel",
            "entries": [
                {"title": "One", "duration": 60, "url": "https://www.youtube.com/watch?v=1"},
                {"title": "No link"},
                {"title": "Two", "duration": null, "webpage_url": "https://www.youtube.com/watch?v=2"}
            ]
        }"#;
        let entries = parse_ytdlp_json("https://www.youtube.com/@c", json).expect("valid json");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].duration_seconds, Some(60.0));
        assert_eq!(entries[1].duration_seconds, None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_ytdlp_json("https://x", b"not json"),
            Err(StreamError::InvalidOutput(_))
        ));
    }
}
