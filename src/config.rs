//! Persistent application configuration model and defaults.

use std::path::{Path, PathBuf};

use log::info;

use crate::navigation::PlaybackMode;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Playlist import and navigation preferences.
    pub playlist: PlaylistConfig,
    #[serde(default)]
    /// Duration probing.
    pub probe: ProbeConfig,
    #[serde(default)]
    /// Stream URL extraction.
    pub streams: StreamsConfig,
    #[serde(default)]
    /// Resume-position rules.
    pub resume: ResumeConfig,
    #[serde(default)]
    /// Session snapshot persistence.
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaylistConfig {
    /// Include subfolders when a folder is imported.
    #[serde(default = "default_true")]
    pub recursive_folders: bool,
    /// Skip sources already present in the playlist.
    #[serde(default)]
    pub skip_duplicates: bool,
    #[serde(default)]
    pub default_mode: PlaybackMode,
    /// Timeout for downloading remote playlist manifests.
    #[serde(default = "default_manifest_timeout_secs")]
    pub manifest_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ProbeConfig {
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,
    /// Fall back to container properties when ffprobe is unavailable.
    #[serde(default = "default_true")]
    pub use_tag_fallback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StreamsConfig {
    /// yt-dlp executable. URLs are imported as-is when unset.
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ResumeConfig {
    /// Offsets at or below this are not handed to playback.
    #[serde(default = "default_min_resume_seconds")]
    pub min_resume_seconds: f64,
    /// Offsets this close to the end reset the resume position.
    #[serde(default = "default_end_guard_seconds")]
    pub end_guard_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_true")]
    pub restore_on_startup: bool,
    #[serde(default = "default_true")]
    pub save_on_shutdown: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    /// One of `error`, `warn`, `info`, `debug`, `trace`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_true() -> bool {
    true
}

fn default_manifest_timeout_secs() -> u64 {
    15
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_min_resume_seconds() -> f64 {
    5.0
}

fn default_end_guard_seconds() -> f64 {
    15.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            recursive_folders: true,
            skip_duplicates: false,
            default_mode: PlaybackMode::Sequential,
            manifest_timeout_secs: default_manifest_timeout_secs(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: default_ffprobe_path(),
            use_tag_fallback: true,
        }
    }
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            min_resume_seconds: default_min_resume_seconds(),
            end_guard_seconds: default_end_guard_seconds(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            restore_on_startup: true,
            save_on_shutdown: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Clamps values a hand-edited file may have pushed out of range.
pub fn sanitize_config(config: Config) -> Config {
    let mut config = config;
    let resume = &mut config.resume;
    if !resume.min_resume_seconds.is_finite() || resume.min_resume_seconds < 0.0 {
        resume.min_resume_seconds = default_min_resume_seconds();
    }
    if !resume.end_guard_seconds.is_finite() || resume.end_guard_seconds < 0.0 {
        resume.end_guard_seconds = default_end_guard_seconds();
    }
    config.playlist.manifest_timeout_secs = config.playlist.manifest_timeout_secs.clamp(1, 300);
    if config.logging.level.parse::<log::LevelFilter>().is_err() {
        config.logging.level = default_log_level();
    }
    config
}

/// Reads `config_file`, writing the defaults first when it does not exist.
pub fn load_or_create_config(config_file: &Path) -> Result<Config, ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: config_file.to_path_buf(),
        source,
    };
    if !config_file.exists() {
        if let Some(parent) = config_file.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let default_config = sanitize_config(Config::default());
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        std::fs::write(config_file, toml::to_string(&default_config)?).map_err(io_error)?;
        return Ok(default_config);
    }

    let config_content = std::fs::read_to_string(config_file).map_err(io_error)?;
    let config = toml::from_str::<Config>(&config_content).map_err(|source| ConfigError::Parse {
        path: config_file.to_path_buf(),
        source,
    })?;
    Ok(sanitize_config(config))
}
