//! Playlist service thread.
//!
//! The service owns the `PlaylistController` and is the only place it is
//! mutated. User commands, playback events, import completions and probe
//! results all arrive on one inbox and are applied in arrival order.
//! Imports are resolved on one worker thread, so batches land in the order
//! they were requested.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use tokio::sync::broadcast;

use crate::config::Config;
use crate::duration_resolver::{spawn_duration_resolver, ResolverHandle};
use crate::import::{ImportError, ImportPipeline, ImportSummary};
use crate::media_item::ItemId;
use crate::navigation::{Direction, PlaybackMode};
use crate::playlist_controller::{ControllerSettings, PlaylistController};
use crate::playlist_store::{PlaylistSnapshot, SortKey};
use crate::probe::ProbeService;
use crate::protocol::{
    ImportReply, Message, PlaybackEvent, PlaybackMessage, PlaylistCommand, PlaylistMessage,
};
use crate::session::{self, SessionFile, SnapshotEntry};
use crate::trash::{DeleteSummary, SystemTrash};

struct ImportRequest {
    sources: Vec<String>,
    reply: Option<ImportReply>,
}

fn run_import_worker(
    requests: Receiver<ImportRequest>,
    pipeline: Arc<ImportPipeline>,
    inbox: Sender<PlaylistCommand>,
) {
    for ImportRequest { sources, reply } in requests {
        match pipeline.resolve(&sources) {
            Ok(resolved) => {
                if inbox
                    .send(PlaylistCommand::ImportResolved { resolved, reply })
                    .is_err()
                {
                    break;
                }
            }
            Err(err) => {
                warn!("PlaylistService: import rejected: {}", err);
                if let Some(reply) = reply {
                    let _ = reply.send(Err(err));
                }
            }
        }
    }
    debug!("PlaylistService: import worker stopped");
}

pub struct PlaylistService {
    controller: PlaylistController,
    pipeline: Arc<ImportPipeline>,
    import_queue: Option<Sender<ImportRequest>>,
    trash: SystemTrash,
    inbox: Receiver<PlaylistCommand>,
    inbox_producer: Sender<PlaylistCommand>,
    bus_producer: broadcast::Sender<Message>,
    resolver: ResolverHandle,
    session_path: Option<PathBuf>,
    save_on_shutdown: bool,
}

impl PlaylistService {
    pub fn new(
        controller: PlaylistController,
        inbox: Receiver<PlaylistCommand>,
        inbox_producer: Sender<PlaylistCommand>,
        bus_producer: broadcast::Sender<Message>,
        resolver: ResolverHandle,
    ) -> Self {
        Self {
            controller,
            pipeline: Arc::new(ImportPipeline::default()),
            import_queue: None,
            trash: SystemTrash,
            inbox,
            inbox_producer,
            bus_producer,
            resolver,
            session_path: None,
            save_on_shutdown: false,
        }
    }

    pub fn with_pipeline(mut self, pipeline: Arc<ImportPipeline>) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_session_path(mut self, path: Option<PathBuf>, save_on_shutdown: bool) -> Self {
        self.session_path = path;
        self.save_on_shutdown = save_on_shutdown;
        self
    }

    /// Processes commands until `Shutdown`.
    pub fn run(&mut self) {
        info!("PlaylistService: started");
        while let Ok(command) = self.inbox.recv() {
            if !self.handle_command(command) {
                break;
            }
        }
        if self.save_on_shutdown {
            self.save_session();
        }
        self.resolver.shutdown();
        info!("PlaylistService: stopped");
    }

    /// Returns false on shutdown.
    fn handle_command(&mut self, command: PlaylistCommand) -> bool {
        match command {
            PlaylistCommand::Import { sources, reply } => self.queue_import(sources, reply),
            PlaylistCommand::ImportResolved { resolved, reply } => {
                let summary = self.controller.apply_import(resolved);
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(summary));
                }
            }
            PlaylistCommand::Remove(ids) => {
                self.controller.remove(&ids);
            }
            PlaylistCommand::RemoveRows(rows) => {
                self.controller.remove_indices(&rows);
            }
            PlaylistCommand::DeleteToTrash { ids, reply } => {
                let playing_local = self.controller.current_id().is_some_and(|current| {
                    ids.contains(&current)
                        && self
                            .controller
                            .item(current)
                            .is_some_and(|item| item.is_local_file())
                });
                if playing_local {
                    self.publish_playback(PlaybackMessage::Stop);
                }
                let summary = self.controller.delete_to_trash(&ids, &self.trash);
                if let Some(reply) = reply {
                    let _ = reply.send(summary);
                }
            }
            PlaylistCommand::Reorder { id, to_index } => {
                self.controller.reorder(id, to_index);
            }
            PlaylistCommand::Sort { key, descending } => self.controller.sort(key, descending),
            PlaylistCommand::Clear => self.controller.clear(),
            PlaylistCommand::Play(id) => match self.controller.play(id) {
                Some(request) => self.publish_playback(PlaybackMessage::Play(request)),
                None => debug!("PlaylistService: play ignored for missing item {}", id),
            },
            PlaylistCommand::SetMode(mode) => self.controller.set_mode(mode),
            PlaylistCommand::SetFullScan(enabled) => self.controller.set_full_scan(enabled),
            PlaylistCommand::Playback(event) => self.handle_playback_event(event),
            PlaylistCommand::ProbeFinished(report) => {
                self.controller.on_resolver_result(report);
            }
            PlaylistCommand::LoadSnapshot {
                entries,
                current_index,
            } => self.controller.load_snapshot(entries, current_index),
            PlaylistCommand::SaveSession => self.save_session(),
            PlaylistCommand::ExportM3u(path) => {
                match session::export_m3u(&path, &self.controller.export_snapshot()) {
                    Ok(()) => info!("PlaylistService: exported playlist to {}", path.display()),
                    Err(err) => error!("PlaylistService: M3U export failed: {}", err),
                }
            }
            PlaylistCommand::Query(reply) => {
                let _ = reply.send(self.controller.snapshot());
            }
            PlaylistCommand::Shutdown => return false,
        }
        true
    }

    fn handle_playback_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::TrackEnded => {
                self.controller.finish_current();
                self.advance(Direction::Next);
            }
            PlaybackEvent::SkipRequested(direction) => self.advance(direction),
            PlaybackEvent::PositionReport {
                id,
                position_seconds,
                duration_seconds,
            } => {
                self.controller
                    .record_playback_position(id, position_seconds, duration_seconds);
            }
        }
    }

    fn advance(&mut self, direction: Direction) {
        let request = self
            .controller
            .advance(direction)
            .and_then(|id| self.controller.play_request(id));
        match request {
            Some(request) => self.publish_playback(PlaybackMessage::Play(request)),
            None => {
                info!("PlaylistService: end of playlist");
                self.publish_playback(PlaybackMessage::Stop);
            }
        }
    }

    fn publish_playback(&self, message: PlaybackMessage) {
        let _ = self.bus_producer.send(Message::Playback(message));
    }

    /// Hands the request to the import worker, starting it on first use.
    fn queue_import(&mut self, sources: Vec<String>, reply: Option<ImportReply>) {
        let mut request = ImportRequest { sources, reply };
        if let Some(queue) = self.import_queue.as_ref() {
            match queue.send(request) {
                Ok(()) => return,
                Err(mpsc::SendError(returned)) => request = returned,
            }
        }

        let (queue, requests) = mpsc::channel();
        let pipeline = Arc::clone(&self.pipeline);
        let inbox = self.inbox_producer.clone();
        let spawned = thread::Builder::new()
            .name("playlist-import".to_string())
            .spawn(move || run_import_worker(requests, pipeline, inbox));
        match spawned {
            Ok(_) => {
                let _ = queue.send(request);
                self.import_queue = Some(queue);
            }
            Err(err) => {
                error!("PlaylistService: failed to start import worker: {}", err);
                self.import_queue = None;
            }
        }
    }

    fn save_session(&self) {
        let Some(path) = self.session_path.as_ref() else {
            debug!("PlaylistService: no session path configured");
            return;
        };
        let session = self.controller.session_file();
        match session::save_session(path, &session) {
            Ok(()) => {
                let _ = self
                    .bus_producer
                    .send(Message::Playlist(PlaylistMessage::SessionSaved {
                        path: path.clone(),
                        entries: session.entries.len(),
                    }));
            }
            Err(err) => error!("PlaylistService: failed to save session: {}", err),
        }
    }
}

/// Cloneable front door to the playlist service.
#[derive(Debug, Clone)]
pub struct PlaylistHandle {
    sender: Sender<PlaylistCommand>,
}

impl PlaylistHandle {
    pub fn new(sender: Sender<PlaylistCommand>) -> Self {
        Self { sender }
    }

    fn send(&self, command: PlaylistCommand) {
        if self.sender.send(command).is_err() {
            debug!("PlaylistHandle: service gone, command dropped");
        }
    }

    /// Starts an import. The summary arrives on the returned channel once
    /// the entries are in the playlist.
    pub fn import(&self, sources: Vec<String>) -> Receiver<Result<ImportSummary, ImportError>> {
        let (reply, summary) = mpsc::channel();
        self.send(PlaylistCommand::Import {
            sources,
            reply: Some(reply),
        });
        summary
    }

    pub fn remove(&self, ids: Vec<ItemId>) {
        self.send(PlaylistCommand::Remove(ids));
    }

    pub fn remove_rows(&self, rows: Vec<usize>) {
        self.send(PlaylistCommand::RemoveRows(rows));
    }

    /// Moves the files of local entries to the trash. The summary lists
    /// which entries were removed and which stayed.
    pub fn delete_to_trash(&self, ids: Vec<ItemId>) -> Receiver<DeleteSummary> {
        let (reply, summary) = mpsc::channel();
        self.send(PlaylistCommand::DeleteToTrash {
            ids,
            reply: Some(reply),
        });
        summary
    }

    pub fn reorder(&self, id: ItemId, to_index: usize) {
        self.send(PlaylistCommand::Reorder { id, to_index });
    }

    pub fn sort(&self, key: SortKey, descending: bool) {
        self.send(PlaylistCommand::Sort { key, descending });
    }

    pub fn clear(&self) {
        self.send(PlaylistCommand::Clear);
    }

    pub fn play(&self, id: ItemId) {
        self.send(PlaylistCommand::Play(id));
    }

    pub fn set_mode(&self, mode: PlaybackMode) {
        self.send(PlaylistCommand::SetMode(mode));
    }

    pub fn set_full_scan(&self, enabled: bool) {
        self.send(PlaylistCommand::SetFullScan(enabled));
    }

    pub fn playback_event(&self, event: PlaybackEvent) {
        self.send(PlaylistCommand::Playback(event));
    }

    pub fn load_snapshot(&self, entries: Vec<SnapshotEntry>, current_index: Option<usize>) {
        self.send(PlaylistCommand::LoadSnapshot {
            entries,
            current_index,
        });
    }

    pub fn restore_session(&self, session: SessionFile) {
        self.set_mode(session.mode);
        self.load_snapshot(session.entries, session.current_index);
    }

    pub fn save_session(&self) {
        self.send(PlaylistCommand::SaveSession);
    }

    pub fn export_m3u(&self, path: PathBuf) {
        self.send(PlaylistCommand::ExportM3u(path));
    }

    /// Current contents, or `None` once the service has stopped.
    pub fn query(&self) -> Option<PlaylistSnapshot> {
        let (reply, snapshot) = mpsc::channel();
        self.send(PlaylistCommand::Query(reply));
        snapshot.recv().ok()
    }

    pub fn shutdown(&self) {
        self.send(PlaylistCommand::Shutdown);
    }
}

/// Startup parameters for `spawn_playlist_service`.
#[derive(Debug, Clone, Default)]
pub struct PlaylistServiceOptions {
    pub settings: ControllerSettings,
    pub default_mode: PlaybackMode,
    pub session_path: Option<PathBuf>,
    pub save_on_shutdown: bool,
}

impl PlaylistServiceOptions {
    pub fn from_config(config: &Config, session_path: Option<PathBuf>) -> Self {
        Self {
            settings: ControllerSettings::from(config),
            default_mode: config.playlist.default_mode,
            session_path,
            save_on_shutdown: config.session.save_on_shutdown,
        }
    }
}

/// Running service and resolver threads.
pub struct PlaylistRuntime {
    pub handle: PlaylistHandle,
    service_thread: JoinHandle<()>,
    resolver_thread: JoinHandle<()>,
}

impl PlaylistRuntime {
    /// Requests shutdown and waits for both threads.
    pub fn shutdown(self) {
        self.handle.shutdown();
        for (name, thread) in [
            ("playlist service", self.service_thread),
            ("duration resolver", self.resolver_thread),
        ] {
            if thread.join().is_err() {
                error!("PlaylistRuntime: {} thread panicked", name);
            }
        }
    }
}

pub fn spawn_playlist_service(
    options: PlaylistServiceOptions,
    pipeline: Arc<ImportPipeline>,
    probe: Arc<dyn ProbeService>,
    bus_producer: broadcast::Sender<Message>,
) -> std::io::Result<PlaylistRuntime> {
    let (inbox_producer, inbox) = mpsc::channel();
    let (resolver, resolver_thread) = spawn_duration_resolver(probe, inbox_producer.clone())?;

    let mut controller =
        PlaylistController::new(resolver.clone(), bus_producer.clone(), options.settings);
    controller.set_mode(options.default_mode);
    let mut service = PlaylistService::new(
        controller,
        inbox,
        inbox_producer.clone(),
        bus_producer,
        resolver,
    )
    .with_pipeline(pipeline)
    .with_session_path(options.session_path, options.save_on_shutdown);

    let service_thread = thread::Builder::new()
        .name("playlist-service".to_string())
        .spawn(move || service.run())?;

    Ok(PlaylistRuntime {
        handle: PlaylistHandle::new(inbox_producer),
        service_thread,
        resolver_thread,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_item::DurationState;
    use crate::probe::ProbeError;
    use crate::protocol::ChangeEvent;
    use crate::stream_resolver::{StreamEntry, StreamError, StreamResolver};
    use std::fs;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use tokio::sync::broadcast::error::TryRecvError;

    const TIMEOUT: Duration = Duration::from_secs(3);

    /// Durations by file stem (`a` = 10 s, `b` = 20 s, ...). Probes of
    /// `gated` wait for a release signal.
    struct GateProbe {
        gated: Option<String>,
        started: Mutex<Sender<String>>,
        release: Mutex<Receiver<()>>,
    }

    impl ProbeService for GateProbe {
        fn probe(&self, source_ref: &str) -> Result<f64, ProbeError> {
            if let Ok(started) = self.started.lock() {
                let _ = started.send(source_ref.to_string());
            }
            if self
                .gated
                .as_deref()
                .is_some_and(|gated| source_ref.ends_with(gated))
            {
                if let Ok(release) = self.release.lock() {
                    let _ = release.recv_timeout(TIMEOUT);
                }
            }
            let stem = std::path::Path::new(source_ref)
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_default();
            match stem.as_str() {
                "a" => Ok(10.0),
                "b" => Ok(20.0),
                "c" => Ok(30.0),
                _ => Err(ProbeError::NoDuration(stem)),
            }
        }
    }

    struct Fixture {
        runtime: PlaylistRuntime,
        bus: broadcast::Receiver<Message>,
        started: Receiver<String>,
        release: Sender<()>,
        dir: tempfile::TempDir,
    }

    fn fixture(gated: Option<&str>, session_path: Option<PathBuf>) -> Fixture {
        fixture_with_pipeline(gated, session_path, ImportPipeline::default())
    }

    fn fixture_with_pipeline(
        gated: Option<&str>,
        session_path: Option<PathBuf>,
        pipeline: ImportPipeline,
    ) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["a.mkv", "b.mkv", "c.mkv"] {
            fs::write(dir.path().join(name), b"").expect("write fixture");
        }
        let (started_tx, started) = mpsc::channel();
        let (release, release_rx) = mpsc::channel();
        let probe = Arc::new(GateProbe {
            gated: gated.map(str::to_string),
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        });
        let (bus_tx, bus) = broadcast::channel(1024);
        let options = PlaylistServiceOptions {
            session_path,
            save_on_shutdown: true,
            ..PlaylistServiceOptions::default()
        };
        let runtime =
            spawn_playlist_service(options, Arc::new(pipeline), probe, bus_tx)
                .expect("spawn playlist service");
        Fixture {
            runtime,
            bus,
            started,
            release,
            dir,
        }
    }

    impl Fixture {
        fn import_folder(&self) -> ImportSummary {
            self.runtime
                .handle
                .import(vec![self.dir.path().to_string_lossy().to_string()])
                .recv_timeout(TIMEOUT)
                .expect("import reply")
                .expect("import succeeds")
        }

        fn wait_for_probe_of(&self, name: &str) {
            let deadline = Instant::now() + TIMEOUT;
            loop {
                let source = self
                    .started
                    .recv_timeout(deadline.saturating_duration_since(Instant::now()))
                    .expect("probe started");
                if source.ends_with(name) {
                    return;
                }
            }
        }

        fn id_of(&self, name: &str) -> ItemId {
            self.runtime
                .handle
                .query()
                .and_then(|snapshot| {
                    snapshot
                        .iter()
                        .find(|item| item.display_name == name)
                        .map(|item| item.id)
                })
                .expect("item present")
        }
    }

    fn wait_for_message<F>(
        receiver: &mut broadcast::Receiver<Message>,
        timeout: Duration,
        mut predicate: F,
    ) -> Message
    where
        F: FnMut(&Message) -> bool,
    {
        let start = Instant::now();
        loop {
            if start.elapsed() > timeout {
                panic!("timed out waiting for expected message");
            }
            match receiver.try_recv() {
                Ok(message) => {
                    if predicate(&message) {
                        return message;
                    }
                }
                Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => panic!("bus closed while waiting for message"),
            }
        }
    }

    fn wait_for_play(receiver: &mut broadcast::Receiver<Message>) -> Option<ItemId> {
        match wait_for_message(receiver, TIMEOUT, |message| {
            matches!(message, Message::Playback(_))
        }) {
            Message::Playback(PlaybackMessage::Play(request)) => Some(request.id),
            _ => None,
        }
    }

    #[test]
    fn test_import_probe_and_play_through() {
        let mut f = fixture(None, None);
        let summary = f.import_folder();
        assert_eq!(summary.imported_count, 3);
        assert_eq!(summary.failed_count, 0);

        let mut updated = 0;
        wait_for_message(&mut f.bus, TIMEOUT, |message| {
            if let Message::Playlist(PlaylistMessage::Changed(ChangeEvent::MetadataUpdated {
                ..
            })) = message
            {
                updated += 1;
            }
            updated == 3
        });
        let snapshot = f.runtime.handle.query().expect("snapshot");
        let durations: Vec<Option<f64>> = snapshot.iter().map(|i| i.duration.seconds()).collect();
        assert_eq!(durations, vec![Some(10.0), Some(20.0), Some(30.0)]);

        let ids = [f.id_of("a.mkv"), f.id_of("b.mkv"), f.id_of("c.mkv")];
        f.runtime
            .handle
            .playback_event(PlaybackEvent::SkipRequested(Direction::Next));
        assert_eq!(wait_for_play(&mut f.bus), Some(ids[0]));
        for expected in [Some(ids[1]), Some(ids[2]), None] {
            f.runtime.handle.playback_event(PlaybackEvent::TrackEnded);
            assert_eq!(wait_for_play(&mut f.bus), expected);
        }
        f.runtime.shutdown();
    }

    #[test]
    fn test_removal_wins_over_in_flight_probe() {
        let mut f = fixture(Some("b.mkv"), None);
        f.import_folder();
        let b = f.id_of("b.mkv");
        let c = f.id_of("c.mkv");

        f.wait_for_probe_of("b.mkv");
        f.runtime.handle.remove(vec![b]);
        let snapshot = f.runtime.handle.query().expect("snapshot");
        assert_eq!(snapshot.len(), 2);
        let _ = f.release.send(());

        let mut touched_b = false;
        wait_for_message(&mut f.bus, TIMEOUT, |message| match message {
            Message::Playlist(PlaylistMessage::Changed(ChangeEvent::MetadataUpdated { ids })) => {
                touched_b |= ids.contains(&b);
                ids.contains(&c)
            }
            Message::Playlist(PlaylistMessage::ProbeFailed { id, .. }) => {
                touched_b |= *id == b;
                false
            }
            _ => false,
        });
        assert!(!touched_b);
        let snapshot = f.runtime.handle.query().expect("snapshot");
        assert!(snapshot.iter().all(|item| item.id != b));
        assert_eq!(
            snapshot.iter().find(|item| item.id == c).map(|item| item.duration.seconds()),
            Some(Some(30.0))
        );
        f.runtime.shutdown();
    }

    #[test]
    fn test_empty_import_is_rejected() {
        let f = fixture(None, None);
        let reply = f
            .runtime
            .handle
            .import(Vec::new())
            .recv_timeout(TIMEOUT)
            .expect("import reply");
        assert_eq!(reply, Err(ImportError::EmptyRequest));
        f.runtime.shutdown();
    }

    #[test]
    fn test_shutdown_saves_session_and_restore_reloads_it() {
        let session_dir = tempfile::tempdir().expect("tempdir");
        let session_path = session_dir.path().join("session.json");
        let mut f = fixture(None, Some(session_path.clone()));
        f.import_folder();
        let a = f.id_of("a.mkv");
        f.runtime.handle.set_mode(PlaybackMode::RepeatAll);
        f.runtime.handle.playback_event(PlaybackEvent::PositionReport {
            id: a,
            position_seconds: 42.0,
            duration_seconds: Some(600.0),
        });
        f.runtime.handle.play(a);
        wait_for_play(&mut f.bus);
        f.runtime.shutdown();

        let session = session::load_session(&session_path).expect("session saved");
        assert_eq!(session.mode, PlaybackMode::RepeatAll);
        assert_eq!(session.current_index, Some(0));
        assert_eq!(session.entries.len(), 3);
        assert_eq!(session.entries[0].resume_position_seconds, Some(42.0));

        let mut restored = fixture(None, None);
        restored.runtime.handle.restore_session(session.clone());
        let snapshot = restored.runtime.handle.query().expect("snapshot");
        let sources: Vec<&str> = snapshot.iter().map(|i| i.source_ref.as_str()).collect();
        let saved: Vec<&str> = session.entries.iter().map(|e| e.source_ref.as_str()).collect();
        assert_eq!(sources, saved);
        assert_eq!(
            snapshot.get(0).map(|i| i.resume_position_seconds),
            Some(Some(42.0))
        );
        restored
            .runtime
            .handle
            .playback_event(PlaybackEvent::SkipRequested(Direction::Next));
        let second = snapshot.get(1).map(|i| i.id);
        assert_eq!(wait_for_play(&mut restored.bus), second);
        restored.runtime.shutdown();
    }

    #[test]
    fn test_save_session_command_reports_path() {
        let session_dir = tempfile::tempdir().expect("tempdir");
        let session_path = session_dir.path().join("session.json");
        let mut f = fixture(None, Some(session_path.clone()));
        f.import_folder();
        f.runtime.handle.save_session();
        let message = wait_for_message(&mut f.bus, TIMEOUT, |message| {
            matches!(message, Message::Playlist(PlaylistMessage::SessionSaved { .. }))
        });
        match message {
            Message::Playlist(PlaylistMessage::SessionSaved { path, entries }) => {
                assert_eq!(path, session_path);
                assert_eq!(entries, 3);
            }
            other => panic!("unexpected message {other:?}"),
        }
        f.runtime.shutdown();
    }

    #[test]
    fn test_failed_probe_is_reported_once() {
        let mut f = fixture(None, None);
        fs::write(f.dir.path().join("z.mkv"), b"").expect("write fixture");
        f.import_folder();
        let z = f.id_of("z.mkv");
        wait_for_message(&mut f.bus, TIMEOUT, |message| {
            matches!(message, Message::Playlist(PlaylistMessage::ProbeFailed { id, .. }) if *id == z)
        });
        let snapshot = f.runtime.handle.query().expect("snapshot");
        assert_eq!(
            snapshot.iter().find(|i| i.id == z).map(|i| i.duration),
            Some(DurationState::Failed)
        );
        f.runtime.shutdown();
    }

    #[test]
    fn test_stopping_full_scan_still_resolves_pending_durations() {
        let mut f = fixture(Some("a.mkv"), None);
        f.import_folder();
        f.wait_for_probe_of("a.mkv");

        f.runtime.handle.set_full_scan(true);
        f.runtime.handle.set_full_scan(false);
        f.runtime.handle.query().expect("snapshot");
        let _ = f.release.send(());
        let _ = f.release.send(());

        let mut toggles = Vec::new();
        wait_for_message(&mut f.bus, TIMEOUT, |message| {
            if let Message::Playlist(PlaylistMessage::FullScanChanged(enabled)) = message {
                toggles.push(*enabled);
            }
            toggles.len() == 2
        });
        assert_eq!(toggles, vec![true, false]);

        let deadline = Instant::now() + TIMEOUT;
        let durations = loop {
            let snapshot = f.runtime.handle.query().expect("snapshot");
            let durations: Vec<Option<f64>> =
                snapshot.iter().map(|i| i.duration.seconds()).collect();
            if durations.iter().all(Option::is_some) || Instant::now() > deadline {
                break durations;
            }
            thread::sleep(Duration::from_millis(10));
        };
        assert_eq!(durations, vec![Some(10.0), Some(20.0), Some(30.0)]);
        f.runtime.shutdown();
    }

    /// Passes URLs through, taking longer for ones containing `slow`.
    struct SlowStreams;

    impl StreamResolver for SlowStreams {
        fn resolve(&self, url: &str) -> Result<Vec<StreamEntry>, StreamError> {
            if url.contains("slow") {
                thread::sleep(Duration::from_millis(200));
            }
            Ok(vec![StreamEntry {
                source_ref: url.to_string(),
                title: None,
                duration_seconds: Some(60.0),
            }])
        }
    }

    #[test]
    fn test_imports_apply_in_request_order() {
        let f = fixture_with_pipeline(
            None,
            None,
            ImportPipeline::new(false, Arc::new(SlowStreams)),
        );
        let slow = f
            .runtime
            .handle
            .import(vec!["https://example.com/slow".to_string()]);
        let fast = f
            .runtime
            .handle
            .import(vec!["https://example.com/fast".to_string()]);
        fast.recv_timeout(TIMEOUT)
            .expect("import reply")
            .expect("import succeeds");
        slow.recv_timeout(TIMEOUT)
            .expect("import reply")
            .expect("import succeeds");

        let snapshot = f.runtime.handle.query().expect("snapshot");
        let sources: Vec<&str> = snapshot.iter().map(|i| i.source_ref.as_str()).collect();
        assert_eq!(
            sources,
            vec!["https://example.com/slow", "https://example.com/fast"]
        );
        f.runtime.shutdown();
    }

    #[test]
    fn test_trashing_playing_entry_stops_and_keeps_failed_entry() {
        let mut f = fixture(None, None);
        f.import_folder();
        let a = f.id_of("a.mkv");
        f.runtime.handle.play(a);
        wait_for_play(&mut f.bus);
        fs::remove_file(f.dir.path().join("a.mkv")).expect("remove fixture");

        let summary = f
            .runtime
            .handle
            .delete_to_trash(vec![a])
            .recv_timeout(TIMEOUT)
            .expect("trash reply");
        assert!(summary.deleted.is_empty());
        assert_eq!(
            summary.failures.iter().map(|failure| failure.id).collect::<Vec<_>>(),
            vec![a]
        );
        wait_for_message(&mut f.bus, TIMEOUT, |message| {
            matches!(message, Message::Playback(PlaybackMessage::Stop))
        });
        assert_eq!(f.runtime.handle.query().map(|s| s.len()), Some(3));
        f.runtime.shutdown();
    }
}
