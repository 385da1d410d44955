use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cadre::config::load_or_create_config;
use cadre::import::ImportPipeline;
use cadre::media_item::format_duration;
use cadre::playlist_service::{spawn_playlist_service, PlaylistServiceOptions};
use cadre::probe::{FfprobeProbe, ProbeChain, ProbeService, TagProbe};
use cadre::protocol::{Message, PlaylistMessage};
use cadre::session::load_session;
use cadre::stream_resolver::{PassthroughStreamResolver, StreamResolver, YtDlpStreamResolver};
use cadre::PlaybackMode;
use clap::Parser;
use log::{debug, error, info, warn};
use tokio::sync::broadcast::{self, error::TryRecvError};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(120);
const SETTLE_POLL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "cadre")]
#[command(about = "Build a video playlist and resolve its durations", long_about = None)]
struct Args {
    /// Files, folders, playlist manifests or stream URLs to add
    sources: Vec<String>,

    /// Playback mode: sequential, repeat-one, repeat-all or shuffle
    #[arg(short = 'm', long)]
    mode: Option<PlaybackMode>,

    /// Re-probe every duration, including known ones
    #[arg(long)]
    full_scan: bool,

    /// Neither restore nor save the previous session
    #[arg(long)]
    no_session: bool,

    /// Write the final playlist as extended M3U
    #[arg(long, value_name = "PATH")]
    export_m3u: Option<PathBuf>,
}

fn build_probe(ffprobe_path: PathBuf, use_tag_fallback: bool) -> Arc<dyn ProbeService> {
    let mut probes: Vec<Box<dyn ProbeService>> = vec![Box::new(FfprobeProbe::new(ffprobe_path))];
    if use_tag_fallback {
        probes.push(Box::new(TagProbe));
    }
    Arc::new(ProbeChain::new(probes))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Args::parse();

    let config_dir = dirs::config_dir()
        .ok_or("no user config directory available")?
        .join("cadre");
    let config = load_or_create_config(&config_dir.join("config.toml"))?;

    let mut clog = colog::default_builder();
    clog.filter(None, config.logging.level_filter());
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let probe = build_probe(
        config.probe.ffprobe_path.clone(),
        config.probe.use_tag_fallback,
    );
    let stream_resolver: Arc<dyn StreamResolver> = match config.streams.ytdlp_path.as_ref() {
        Some(path) => Arc::new(YtDlpStreamResolver::new(path.clone())),
        None => Arc::new(PassthroughStreamResolver),
    };
    let pipeline = ImportPipeline::new(config.playlist.recursive_folders, stream_resolver)
        .with_manifest_timeout(Duration::from_secs(config.playlist.manifest_timeout_secs));

    let session_path = (!cli.no_session).then(|| config_dir.join("session.json"));

    // Bus for communication between components
    let (bus_sender, mut bus_receiver) = broadcast::channel(1024);
    let runtime = spawn_playlist_service(
        PlaylistServiceOptions::from_config(&config, session_path.clone()),
        Arc::new(pipeline),
        probe,
        bus_sender,
    )?;
    let playlist = runtime.handle.clone();

    if let Some(path) = session_path
        .as_ref()
        .filter(|_| config.session.restore_on_startup)
    {
        if let Some(session) = load_session(path) {
            info!("Restoring {} entries from {}", session.entries.len(), path.display());
            playlist.restore_session(session);
        }
    }
    if let Some(mode) = cli.mode {
        playlist.set_mode(mode);
    }

    if !cli.sources.is_empty() {
        match playlist.import(cli.sources.clone()).recv() {
            Ok(Ok(summary)) => {
                info!(
                    "Imported {} entries ({} failed)",
                    summary.imported_count, summary.failed_count
                );
                for failure in &summary.failures {
                    eprintln!("skipped {}: {}", failure.source, failure.reason);
                }
            }
            Ok(Err(err)) => error!("Import failed: {}", err),
            Err(_) => error!("Playlist service stopped during import"),
        }
    }
    if cli.full_scan {
        playlist.set_full_scan(true);
    }

    // Wait for queued probes (and a running full scan) to finish.
    let started = Instant::now();
    let mut scan_running = cli.full_scan;
    loop {
        loop {
            match bus_receiver.try_recv() {
                Ok(Message::Playlist(PlaylistMessage::FullScanChanged(enabled))) => {
                    scan_running = enabled;
                }
                Ok(Message::Playlist(PlaylistMessage::ProbeFailed { reason, .. })) => {
                    warn!("Duration unavailable: {}", reason);
                }
                Ok(Message::Playlist(PlaylistMessage::Changed(event))) => {
                    debug!(
                        "Playlist change {:?} ({} entries)",
                        event.kind(),
                        event.affected_ids().len()
                    );
                }
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        let Some(snapshot) = playlist.query() else {
            break;
        };
        let probing = snapshot
            .iter()
            .any(|item| item.is_probe_eligible() && item.duration.needs_probe());
        if (!probing && !scan_running) || started.elapsed() > SETTLE_TIMEOUT {
            if probing {
                warn!("Gave up waiting for durations after {:?}", SETTLE_TIMEOUT);
            }
            break;
        }
        thread::sleep(SETTLE_POLL);
    }

    if let Some(snapshot) = playlist.query() {
        let mut total = 0.0;
        for (index, item) in snapshot.iter().enumerate() {
            let seconds = item.duration.seconds();
            total += seconds.unwrap_or(0.0);
            println!(
                "{:>4}  {:>8}  {}",
                index + 1,
                format_duration(seconds),
                item.display_name
            );
        }
        println!("{} entries, {}", snapshot.len(), format_duration(Some(total)));
    }

    if let Some(path) = cli.export_m3u {
        playlist.export_m3u(path);
    }
    runtime.shutdown();
    Ok(())
}
