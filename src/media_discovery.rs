//! File-system enumeration for imports.

use std::path::{Path, PathBuf};

use log::debug;

pub const SUPPORTED_VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mkv", "avi", "mov", "webm"];

pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 9] = [
    "mp3", "wav", "flac", "aac", "ogg", "m4a", "wma", "alac", "aiff",
];

pub const PLAYLIST_MANIFEST_EXTENSIONS: [&str; 2] = ["m3u", "m3u8"];

fn has_extension_in(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

pub fn is_supported_video_file(path: &Path) -> bool {
    has_extension_in(path, &SUPPORTED_VIDEO_EXTENSIONS)
}

pub fn is_supported_audio_file(path: &Path) -> bool {
    has_extension_in(path, &SUPPORTED_AUDIO_EXTENSIONS)
}

pub fn is_supported_media_file(path: &Path) -> bool {
    is_supported_video_file(path) || is_supported_audio_file(path)
}

pub fn is_playlist_manifest(path: &Path) -> bool {
    has_extension_in(path, &PLAYLIST_MANIFEST_EXTENSIONS)
}

/// Playable files in `folder`, sorted case-insensitively by full path.
/// Without `recursive` only direct children are listed.
pub fn collect_media_files_from_folder(folder_path: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut folders = vec![folder_path.to_path_buf()];
    let mut media_files = Vec::new();

    while let Some(folder) = folders.pop() {
        for (path, is_dir) in list_folder(&folder) {
            if is_dir {
                if recursive {
                    folders.push(path);
                }
            } else if is_supported_media_file(&path) {
                media_files.push(path);
            }
        }
    }

    media_files.sort_by_cached_key(|path| path.to_string_lossy().to_lowercase());
    media_files
}

/// Directory and regular-file children of `folder`. Unreadable entries are
/// skipped.
fn list_folder(folder: &Path) -> Vec<(PathBuf, bool)> {
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("MediaDiscovery: cannot list {}: {}", folder.display(), err);
            return Vec::new();
        }
    };
    entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("MediaDiscovery: bad entry in {}: {}", folder.display(), err);
                None
            }
        })
        .filter_map(|entry| {
            let path = entry.path();
            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => Some((path, true)),
                Ok(file_type) if file_type.is_file() => Some((path, false)),
                Ok(_) => None,
                Err(err) => {
                    debug!("MediaDiscovery: cannot inspect {}: {}", path.display(), err);
                    None
                }
            }
        })
        .collect()
}
