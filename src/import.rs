//! Import pipeline: classifies source descriptors and resolves them into
//! playlist entries.
//!
//! `ImportPipeline::resolve` performs all blocking work (directory walks,
//! manifest reads and downloads, stream extraction) and must run off the
//! playlist service thread. Applying the result to the playlist happens on
//! the service thread through `PlaylistController::apply_import`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::m3u::{self, M3uEntry};
use crate::media_discovery::{
    collect_media_files_from_folder, is_playlist_manifest, is_supported_media_file,
};
use crate::media_item::{is_remote_ref, DurationSource, DurationState, MediaItem, Origin};
use crate::stream_resolver::{PassthroughStreamResolver, StreamResolver};

/// How one source descriptor is handled.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    LocalFile(PathBuf),
    Directory(PathBuf),
    LocalManifest(PathBuf),
    RemoteManifest(String),
    Url(String),
}

pub fn classify(source: &str) -> Option<SourceKind> {
    let source = source.trim();
    if source.is_empty() {
        return None;
    }
    let source = source.strip_prefix("file://").unwrap_or(source);
    if is_remote_ref(source) {
        let path_part = source.split(['?', '#']).next().unwrap_or(source);
        if is_playlist_manifest(Path::new(path_part)) {
            return Some(SourceKind::RemoteManifest(source.to_string()));
        }
        return Some(SourceKind::Url(source.to_string()));
    }
    let path = PathBuf::from(source);
    if path.is_dir() {
        Some(SourceKind::Directory(path))
    } else if is_playlist_manifest(&path) {
        Some(SourceKind::LocalManifest(path))
    } else {
        Some(SourceKind::LocalFile(path))
    }
}

/// One resolved entry, ready to become a `MediaItem`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedEntry {
    pub source_ref: String,
    pub display_name: Option<String>,
    pub duration: DurationState,
    pub origin: Origin,
}

impl ImportedEntry {
    pub fn into_media_item(self) -> MediaItem {
        let mut item = MediaItem::new(self.source_ref, self.origin).with_duration(self.duration);
        if let Some(display_name) = self.display_name {
            item = item.with_display_name(display_name);
        }
        item
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportFailure {
    pub source: String,
    pub reason: String,
}

/// Result of resolving a batch, before it touches the playlist.
#[derive(Debug, Clone, Default)]
pub struct ResolvedImport {
    pub entries: Vec<ImportedEntry>,
    pub failures: Vec<ImportFailure>,
}

/// Outcome reported to the caller of an import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    pub imported_count: usize,
    pub failed_count: usize,
    pub skipped_duplicates: usize,
    pub failures: Vec<ImportFailure>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ImportError {
    #[error("import request contains no sources")]
    EmptyRequest,
    #[error("import request contains no usable sources")]
    Malformed,
}

pub struct ImportPipeline {
    recursive_folders: bool,
    manifest_timeout: Duration,
    stream_resolver: Arc<dyn StreamResolver>,
}

impl ImportPipeline {
    pub fn new(recursive_folders: bool, stream_resolver: Arc<dyn StreamResolver>) -> Self {
        Self {
            recursive_folders,
            manifest_timeout: Duration::from_secs(15),
            stream_resolver,
        }
    }

    pub fn with_manifest_timeout(mut self, timeout: Duration) -> Self {
        self.manifest_timeout = timeout;
        self
    }

    /// Resolves every source. Individual failures are collected; only a
    /// request without any usable source is an error.
    pub fn resolve(&self, sources: &[String]) -> Result<ResolvedImport, ImportError> {
        if sources.is_empty() {
            return Err(ImportError::EmptyRequest);
        }
        let classified: Vec<(&String, SourceKind)> = sources
            .iter()
            .filter_map(|source| classify(source).map(|kind| (source, kind)))
            .collect();
        if classified.is_empty() {
            return Err(ImportError::Malformed);
        }

        let mut resolved = ResolvedImport::default();
        for (source, kind) in classified {
            debug!("ImportPipeline: resolving {:?}", kind);
            match kind {
                SourceKind::LocalFile(path) => match local_file_entry(&path, Origin::LocalFile) {
                    Ok(entry) => resolved.entries.push(entry),
                    Err(reason) => resolved.failures.push(ImportFailure {
                        source: source.clone(),
                        reason,
                    }),
                },
                SourceKind::Directory(path) => {
                    let files = collect_media_files_from_folder(&path, self.recursive_folders);
                    if files.is_empty() {
                        resolved.failures.push(ImportFailure {
                            source: source.clone(),
                            reason: "folder contains no playable files".to_string(),
                        });
                    }
                    resolved.entries.extend(files.into_iter().map(|file| ImportedEntry {
                        source_ref: normalize_path(&file),
                        display_name: None,
                        duration: DurationState::Pending,
                        origin: Origin::LocalFile,
                    }));
                }
                SourceKind::LocalManifest(path) => {
                    let manifest_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                    match m3u::read_file(&path) {
                        Ok(manifest) => self.expand_manifest(
                            manifest,
                            |location| m3u::resolve_local_location(&manifest_dir, location),
                            &mut resolved,
                        ),
                        Err(err) => resolved.failures.push(ImportFailure {
                            source: source.clone(),
                            reason: err.to_string(),
                        }),
                    }
                }
                SourceKind::RemoteManifest(url) => {
                    match m3u::fetch_remote(&url, self.manifest_timeout) {
                        Ok(manifest) => self.expand_manifest(
                            manifest,
                            |location| m3u::resolve_remote_location(&url, location),
                            &mut resolved,
                        ),
                        Err(err) => resolved.failures.push(ImportFailure {
                            source: source.clone(),
                            reason: err.to_string(),
                        }),
                    }
                }
                SourceKind::Url(url) => match self.stream_resolver.resolve(&url) {
                    Ok(streams) if streams.is_empty() => resolved.failures.push(ImportFailure {
                        source: source.clone(),
                        reason: "stream resolver returned no entries".to_string(),
                    }),
                    Ok(streams) => {
                        resolved
                            .entries
                            .extend(streams.into_iter().map(|stream| ImportedEntry {
                                source_ref: stream.source_ref,
                                display_name: stream.title,
                                duration: metadata_duration(stream.duration_seconds),
                                origin: Origin::RemoteStream,
                            }))
                    }
                    Err(err) => resolved.failures.push(ImportFailure {
                        source: source.clone(),
                        reason: err.to_string(),
                    }),
                },
            }
        }
        info!(
            "ImportPipeline: resolved {} entries, {} failures",
            resolved.entries.len(),
            resolved.failures.len()
        );
        Ok(resolved)
    }

    fn expand_manifest<F>(&self, manifest: Vec<M3uEntry>, resolve: F, resolved: &mut ResolvedImport)
    where
        F: Fn(&str) -> String,
    {
        for entry in manifest {
            let location = resolve(&entry.location);
            if is_remote_ref(&location) {
                resolved.entries.push(ImportedEntry {
                    source_ref: location,
                    display_name: entry.title,
                    duration: metadata_duration(entry.duration_seconds),
                    origin: Origin::PlaylistEntry,
                });
                continue;
            }
            match local_file_entry(Path::new(&location), Origin::PlaylistEntry) {
                Ok(mut imported) => {
                    imported.display_name = entry.title;
                    // Local durations in a manifest are hints; the probe has the final say.
                    if let Some(seconds) = entry.duration_seconds {
                        imported.duration = DurationState::Stale(seconds);
                    }
                    resolved.entries.push(imported);
                }
                Err(reason) => resolved.failures.push(ImportFailure {
                    source: entry.location,
                    reason,
                }),
            }
        }
    }
}

impl Default for ImportPipeline {
    fn default() -> Self {
        Self::new(true, Arc::new(PassthroughStreamResolver))
    }
}

fn metadata_duration(seconds: Option<f64>) -> DurationState {
    match seconds {
        Some(seconds) => DurationState::Known {
            seconds,
            source: DurationSource::Metadata,
        },
        None => DurationState::Pending,
    }
}

fn local_file_entry(path: &Path, origin: Origin) -> Result<ImportedEntry, String> {
    if !path.is_file() {
        return Err("file not found".to_string());
    }
    if !is_supported_media_file(path) {
        return Err("unsupported file type".to_string());
    }
    Ok(ImportedEntry {
        source_ref: normalize_path(path),
        display_name: None,
        duration: DurationState::Pending,
        origin,
    })
}

fn normalize_path(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}
