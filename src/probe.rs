//! Duration probing services used by the duration resolver.
//!
//! Probing may block on disk or network I/O. It only ever runs on the
//! resolver's worker thread.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, trace};

use crate::media_item::is_remote_ref;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with status {status}: {stderr}")]
    Exited {
        program: String,
        status: i32,
        stderr: String,
    },
    #[error("no usable duration in probe output {0:?}")]
    NoDuration(String),
    #[error("unsupported source {0}")]
    Unsupported(String),
    #[error("failed to read container properties: {0}")]
    Container(String),
    #[error("all probes failed: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}

/// Determines the duration of one source without playing it.
pub trait ProbeService: Send + Sync {
    fn probe(&self, source_ref: &str) -> Result<f64, ProbeError>;
}

/// Runs `ffprobe` and reads `format=duration`.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: PathBuf,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl ProbeService for FfprobeProbe {
    fn probe(&self, source_ref: &str) -> Result<f64, ProbeError> {
        let program = self.program.display().to_string();
        trace!("FfprobeProbe: probing {}", source_ref);
        let mut command = Command::new(&self.program);
        command
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(source_ref)
            .stdin(Stdio::null());
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let output = command.output().map_err(|source| ProbeError::Launch {
            program: program.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(ProbeError::Exited {
                program,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_ffprobe_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parses the single-value `ffprobe` output. `N/A`, negatives and
/// non-finite values count as missing.
pub fn parse_ffprobe_duration(output: &str) -> Result<f64, ProbeError> {
    let value = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    match value.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => Ok(seconds),
        _ => Err(ProbeError::NoDuration(value.to_string())),
    }
}

/// Reads the duration from container properties for local files.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagProbe;

impl ProbeService for TagProbe {
    fn probe(&self, source_ref: &str) -> Result<f64, ProbeError> {
        use lofty::file::AudioFile;

        if is_remote_ref(source_ref) {
            return Err(ProbeError::Unsupported(source_ref.to_string()));
        }
        let tagged_file = lofty::read_from_path(Path::new(source_ref))
            .map_err(|err| ProbeError::Container(err.to_string()))?;
        let seconds = tagged_file.properties().duration().as_secs_f64();
        if seconds > 0.0 {
            Ok(seconds)
        } else {
            Err(ProbeError::NoDuration(format!("{seconds}")))
        }
    }
}

/// Tries each probe in order and returns the first success.
pub struct ProbeChain {
    probes: Vec<Box<dyn ProbeService>>,
}

impl ProbeChain {
    pub fn new(probes: Vec<Box<dyn ProbeService>>) -> Self {
        Self { probes }
    }
}

impl ProbeService for ProbeChain {
    fn probe(&self, source_ref: &str) -> Result<f64, ProbeError> {
        let mut failures = Vec::new();
        for probe in &self.probes {
            match probe.probe(source_ref) {
                Ok(seconds) => return Ok(seconds),
                Err(err) => {
                    debug!("ProbeChain: probe failed for {}: {}", source_ref, err);
                    failures.push(err.to_string());
                }
            }
        }
        Err(ProbeError::Exhausted(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<f64, &'static str>);

    impl ProbeService for Fixed {
        fn probe(&self, _source_ref: &str) -> Result<f64, ProbeError> {
            self.0
                .map_err(|reason| ProbeError::NoDuration(reason.to_string()))
        }
    }

    #[test]
    fn test_parse_ffprobe_duration() {
        assert_eq!(parse_ffprobe_duration("123.456000\n").ok(), Some(123.456));
        assert!(parse_ffprobe_duration("N/A\n").is_err());
        assert!(parse_ffprobe_duration("").is_err());
        assert!(parse_ffprobe_duration("-3").is_err());
    }

    #[test]
    fn test_chain_returns_first_success() {
        let chain = ProbeChain::new(vec![
            Box::new(Fixed(Err("broken"))),
            Box::new(Fixed(Ok(42.0))),
            Box::new(Fixed(Ok(7.0))),
        ]);
        assert_eq!(chain.probe("/a.mkv").ok(), Some(42.0));
    }

    #[test]
    fn test_chain_collects_failures() {
        let chain = ProbeChain::new(vec![
            Box::new(Fixed(Err("one"))),
            Box::new(Fixed(Err("two"))),
        ]);
        match chain.probe("/a.mkv") {
            Err(ProbeError::Exhausted(reasons)) => assert_eq!(reasons.len(), 2),
            other => panic!("unexpected probe result {other:?}"),
        }
    }

    #[test]
    fn test_missing_ffprobe_binary_is_a_launch_error() {
        let probe = FfprobeProbe::new("/nonexistent/ffprobe-for-tests");
        assert!(matches!(
            probe.probe("/a.mkv"),
            Err(ProbeError::Launch { .. })
        ));
    }

    #[test]
    fn test_tag_probe_rejects_remote_and_missing_files() {
        assert!(matches!(
            TagProbe.probe("https://example.com/a.mp3"),
            Err(ProbeError::Unsupported(_))
        ));
        assert!(TagProbe.probe("/nonexistent/file.mp3").is_err());
    }
}
