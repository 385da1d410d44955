//! Playlist orchestration.
//!
//! `PlaylistController` owns the store, the navigation engine and the current
//! entry. It is driven from a single thread (the playlist service) and
//! publishes every observable change on the bus.

use std::collections::HashSet;
use std::path::Path;

use log::{debug, info, warn};
use tokio::sync::broadcast::Sender;

use crate::config::Config;
use crate::duration_resolver::ResolverHandle;
use crate::import::{ImportError, ImportPipeline, ImportSummary, ResolvedImport};
use crate::media_item::{is_remote_ref, DurationSource, DurationState, ItemId, MediaItem, Origin};
use crate::navigation::{Direction, NavigationEngine, PlaybackMode};
use crate::playlist_store::{MediaItemStore, PlaylistSnapshot, SortKey};
use crate::protocol::{
    ChangeEvent, Message, PlayRequest, PlaylistMessage, ProbeJob, ProbeOutcome, ProbeReport,
};
use crate::session::{SessionFile, SnapshotEntry};
use crate::trash::{DeleteFailure, DeleteSummary, TrashBin};

/// Behavior knobs taken from the `playlist` and `resume` config sections.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub skip_duplicates: bool,
    pub min_resume_seconds: f64,
    pub end_guard_seconds: f64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            skip_duplicates: config.playlist.skip_duplicates,
            min_resume_seconds: config.resume.min_resume_seconds,
            end_guard_seconds: config.resume.end_guard_seconds,
        }
    }
}

pub struct PlaylistController {
    store: MediaItemStore,
    navigation: NavigationEngine,
    current: Option<ItemId>,
    resolver: ResolverHandle,
    bus_producer: Sender<Message>,
    settings: ControllerSettings,
    full_scan: bool,
    full_scan_pending: HashSet<ItemId>,
}

impl PlaylistController {
    pub fn new(
        resolver: ResolverHandle,
        bus_producer: Sender<Message>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            store: MediaItemStore::new(),
            navigation: NavigationEngine::new(),
            current: None,
            resolver,
            bus_producer,
            settings,
            full_scan: false,
            full_scan_pending: HashSet::new(),
        }
    }

    /// Replaces the navigation engine, e.g. with a seeded one.
    pub fn with_navigation(mut self, navigation: NavigationEngine) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn snapshot(&self) -> PlaylistSnapshot {
        self.store.query()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn item(&self, id: ItemId) -> Option<&MediaItem> {
        self.store.get(id)
    }

    pub fn current_id(&self) -> Option<ItemId> {
        self.current
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current.and_then(|id| self.store.position_of(id))
    }

    pub fn mode(&self) -> PlaybackMode {
        self.navigation.mode()
    }

    pub fn full_scan_active(&self) -> bool {
        self.full_scan
    }

    /// Forced probes of the running full scan that have not reported yet.
    pub fn full_scan_remaining(&self) -> usize {
        self.full_scan_pending.len()
    }

    fn emit(&self, message: PlaylistMessage) {
        let _ = self.bus_producer.send(Message::Playlist(message));
    }

    fn emit_change(&self, event: ChangeEvent) {
        self.emit(PlaylistMessage::Changed(event));
    }

    fn emit_current(&self) {
        self.emit(PlaylistMessage::CurrentChanged {
            id: self.current,
            index: self.current_index(),
        });
    }

    /// Keeps the shuffle permutation in step with the entry set, anchored on
    /// the current entry.
    fn resync_shuffle(&mut self) {
        if self.navigation.mode() == PlaybackMode::Shuffle {
            self.navigation
                .reshuffle(self.store.len(), self.current_index());
        }
    }

    /// Carries the shuffle permutation across a reorder. `before` is the
    /// entry order prior to the move.
    fn carry_shuffle(&mut self, before: &[ItemId]) {
        if self.navigation.mode() != PlaybackMode::Shuffle {
            return;
        }
        let new_positions: Option<Vec<usize>> = before
            .iter()
            .map(|id| self.store.position_of(*id))
            .collect();
        if let Some(new_positions) = new_positions {
            self.navigation.remap(&new_positions);
        }
    }

    /// Entries in the order they will play; the permutation under shuffle.
    pub fn play_order(&self) -> Vec<ItemId> {
        let order = self.navigation.shuffle_order();
        if self.navigation.mode() == PlaybackMode::Shuffle && order.len() == self.store.len() {
            order
                .iter()
                .filter_map(|index| self.store.id_at(*index))
                .collect()
        } else {
            self.store.ids()
        }
    }

    fn resync_resolver(&self) {
        self.resolver.retain(self.store.ids());
    }

    fn enqueue_probes(&mut self, ids: &[ItemId], forced: bool) {
        let jobs: Vec<ProbeJob> = ids
            .iter()
            .filter_map(|id| self.store.get(*id))
            .filter(|item| item.is_probe_eligible() && (forced || item.duration.needs_probe()))
            .map(|item| ProbeJob {
                id: item.id,
                source_ref: item.source_ref.clone(),
                forced,
            })
            .collect();
        if jobs.is_empty() {
            return;
        }
        debug!(
            "PlaylistController: queueing {} probes (forced={})",
            jobs.len(),
            forced
        );
        if forced {
            self.full_scan_pending.extend(jobs.iter().map(|job| job.id));
        }
        self.resolver.enqueue(jobs);
    }

    /// Resolves and applies a batch on the calling thread.
    pub fn import_batch(
        &mut self,
        sources: &[String],
        pipeline: &ImportPipeline,
    ) -> Result<ImportSummary, ImportError> {
        let resolved = pipeline.resolve(sources)?;
        Ok(self.apply_import(resolved))
    }

    /// Appends resolved entries and queues their probes.
    pub fn apply_import(&mut self, resolved: ResolvedImport) -> ImportSummary {
        let mut summary = ImportSummary {
            failed_count: resolved.failures.len(),
            failures: resolved.failures,
            ..ImportSummary::default()
        };

        let mut known_sources: HashSet<String> = if self.settings.skip_duplicates {
            self.store
                .query()
                .iter()
                .map(|item| item.source_ref.clone())
                .collect()
        } else {
            HashSet::new()
        };
        let mut items = Vec::with_capacity(resolved.entries.len());
        for entry in resolved.entries {
            if self.settings.skip_duplicates && !known_sources.insert(entry.source_ref.clone()) {
                debug!("PlaylistController: skipping duplicate {}", entry.source_ref);
                summary.skipped_duplicates += 1;
                continue;
            }
            items.push(entry.into_media_item());
        }
        summary.imported_count = items.len();

        if !items.is_empty() {
            let at = self.store.len();
            let ids = self.store.insert(items, at);
            self.resync_shuffle();
            self.emit_change(ChangeEvent::Inserted {
                at,
                ids: ids.clone(),
            });
            let forced = self.full_scan;
            self.enqueue_probes(&ids, forced);
        }

        info!(
            "PlaylistController: imported {} entries, {} failed, {} duplicates skipped",
            summary.imported_count, summary.failed_count, summary.skipped_duplicates
        );
        for failure in &summary.failures {
            warn!(
                "PlaylistController: import failed for {}: {}",
                failure.source, failure.reason
            );
        }
        self.emit(PlaylistMessage::ImportFinished(summary.clone()));
        summary
    }

    /// Removes entries by identity. Absent ids are ignored.
    pub fn remove(&mut self, ids: &[ItemId]) -> usize {
        let mut seen = HashSet::new();
        let present: Vec<ItemId> = ids
            .iter()
            .copied()
            .filter(|id| self.store.contains(*id) && seen.insert(*id))
            .collect();
        if present.is_empty() {
            debug!("PlaylistController: remove ignored, no listed entry present");
            return 0;
        }

        let removed = self.store.remove(&present);
        for id in &present {
            self.full_scan_pending.remove(id);
        }
        let current_removed = self.current.is_some_and(|id| !self.store.contains(id));
        if current_removed {
            self.current = None;
        }
        self.resync_shuffle();
        self.resync_resolver();
        self.emit_change(ChangeEvent::Removed { ids: present });
        if current_removed {
            self.emit_current();
        }
        self.finish_full_scan_if_done();
        removed
    }

    /// Removes the entries currently shown at `rows`.
    pub fn remove_indices(&mut self, rows: &[usize]) -> usize {
        let ids: Vec<ItemId> = rows
            .iter()
            .filter_map(|row| self.store.id_at(*row))
            .collect();
        self.remove(&ids)
    }

    pub fn reorder(&mut self, id: ItemId, to_index: usize) -> bool {
        let before = self.store.ids();
        if !self.store.reorder(id, to_index) {
            return false;
        }
        self.carry_shuffle(&before);
        self.resync_resolver();
        self.emit_change(ChangeEvent::Reordered { ids: vec![id] });
        if self.current == Some(id) {
            self.emit_current();
        }
        true
    }

    pub fn sort(&mut self, key: SortKey, descending: bool) {
        if self.store.len() < 2 {
            return;
        }
        let before = self.store.ids();
        self.store.sort_by(key, descending);
        self.carry_shuffle(&before);
        self.resync_resolver();
        self.emit_change(ChangeEvent::Reordered {
            ids: self.store.ids(),
        });
        if self.current.is_some() {
            self.emit_current();
        }
    }

    /// Moves the files of local entries to the trash and removes the entries
    /// whose files went. Other entries are reported as failures and stay.
    pub fn delete_to_trash(&mut self, ids: &[ItemId], trash: &dyn TrashBin) -> DeleteSummary {
        let mut summary = DeleteSummary::default();
        let mut seen = HashSet::new();
        for id in ids.iter().copied().filter(|id| seen.insert(*id)) {
            let Some(item) = self.store.get(id) else {
                debug!("PlaylistController: trash ignored for missing item {}", id);
                continue;
            };
            let source_ref = item.source_ref.clone();
            let result = if item.is_local_file() {
                trash
                    .delete(Path::new(&source_ref))
                    .map_err(|err| err.to_string())
            } else {
                Err("not a local file".to_string())
            };
            match result {
                Ok(()) => summary.deleted.push(id),
                Err(reason) => {
                    warn!(
                        "PlaylistController: could not trash {}: {}",
                        source_ref, reason
                    );
                    summary.failures.push(DeleteFailure {
                        id,
                        source_ref,
                        reason,
                    });
                }
            }
        }
        if !summary.deleted.is_empty() {
            self.remove(&summary.deleted);
        }
        info!(
            "PlaylistController: trashed {} files, {} failed",
            summary.deleted.len(),
            summary.failures.len()
        );
        summary
    }

    pub fn clear(&mut self) {
        let ids = self.store.clear();
        self.full_scan_pending.clear();
        self.resync_shuffle();
        self.resync_resolver();
        if !ids.is_empty() {
            self.emit_change(ChangeEvent::Removed { ids });
        }
        if self.current.take().is_some() {
            self.emit_current();
        }
        self.finish_full_scan_if_done();
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        if self.navigation.mode() == mode {
            return;
        }
        self.navigation
            .set_mode(mode, self.store.len(), self.current_index());
        info!("PlaylistController: playback mode {:?}", mode);
        self.emit(PlaylistMessage::ModeChanged(mode));
    }

    /// Explicit selection. Under shuffle the permutation restarts at `id`.
    pub fn play(&mut self, id: ItemId) -> Option<PlayRequest> {
        let Some(index) = self.store.position_of(id) else {
            debug!("PlaylistController: play ignored for missing item {}", id);
            return None;
        };
        self.current = Some(id);
        if self.navigation.mode() == PlaybackMode::Shuffle {
            self.navigation.reshuffle(self.store.len(), Some(index));
        }
        self.emit_current();
        self.play_request(id)
    }

    /// Moves to the next or previous entry. `None` means playback stops.
    pub fn advance(&mut self, direction: Direction) -> Option<ItemId> {
        let len = self.store.len();
        let next_index = match self.current_index() {
            Some(index) => self.navigation.step(direction, index, len),
            None => self.navigation.first(len),
        };
        let next = next_index.and_then(|index| self.store.id_at(index));
        debug!(
            "PlaylistController: advance {:?} from {:?} to {:?}",
            direction,
            self.current_index(),
            next_index
        );
        if next != self.current {
            self.current = next;
            self.emit_current();
        }
        next
    }

    /// Playback parameters for `id`. Short offsets start from the beginning.
    pub fn play_request(&self, id: ItemId) -> Option<PlayRequest> {
        let item = self.store.get(id)?;
        let resume_position_seconds = item
            .resume_position_seconds
            .filter(|seconds| *seconds > self.settings.min_resume_seconds);
        Some(PlayRequest {
            id,
            source_ref: item.source_ref.clone(),
            resume_position_seconds,
        })
    }

    /// Stores the resume offset reported by playback. Offsets near the end
    /// reset it. A reported duration fills an unknown one.
    pub fn record_playback_position(
        &mut self,
        id: ItemId,
        position_seconds: f64,
        duration_seconds: Option<f64>,
    ) -> bool {
        let Some(item) = self.store.get(id) else {
            debug!("PlaylistController: position report for missing item {}", id);
            return false;
        };
        let reported = duration_seconds.filter(|seconds| seconds.is_finite() && *seconds > 0.0);
        let total = reported.or(item.duration.seconds());

        if let Some(seconds) = reported {
            if self
                .store
                .update_duration(id, seconds, DurationSource::Probed, false)
            {
                self.emit_change(ChangeEvent::MetadataUpdated { ids: vec![id] });
            }
        }

        let resume = match total {
            _ if !position_seconds.is_finite() || position_seconds <= 0.0 => None,
            Some(total) if position_seconds >= total - self.settings.end_guard_seconds => None,
            _ => Some(position_seconds),
        };
        self.store.set_resume_position(id, resume)
    }

    /// The current entry played to the end; the next start is from zero.
    pub fn finish_current(&mut self) {
        if let Some(id) = self.current {
            self.store.set_resume_position(id, None);
        }
    }

    /// Starts or stops a full duration scan. Starting queues a forced probe
    /// for every eligible entry. Stopping drops the queued ones and requeues
    /// ordinary probes for entries still without a duration.
    pub fn set_full_scan(&mut self, enabled: bool) {
        if self.full_scan == enabled {
            return;
        }
        self.full_scan = enabled;
        if enabled {
            let ids = self.store.ids();
            self.enqueue_probes(&ids, true);
            info!(
                "PlaylistController: full duration scan started ({} probes)",
                self.full_scan_pending.len()
            );
        } else {
            self.resolver.drop_forced();
            self.full_scan_pending.clear();
            let ids = self.store.ids();
            self.enqueue_probes(&ids, false);
            info!("PlaylistController: full duration scan stopped");
        }
        self.emit(PlaylistMessage::FullScanChanged(enabled));
        self.finish_full_scan_if_done();
    }

    fn finish_full_scan_if_done(&mut self) {
        if self.full_scan && self.full_scan_pending.is_empty() {
            self.full_scan = false;
            info!("PlaylistController: full duration scan finished");
            self.emit(PlaylistMessage::FullScanChanged(false));
        }
    }

    /// Applies a probe result. Results for removed entries are dropped.
    pub fn on_resolver_result(&mut self, report: ProbeReport) -> bool {
        if report.forced {
            self.full_scan_pending.remove(&report.id);
        }
        let applied = if !self.store.contains(report.id) {
            debug!(
                "PlaylistController: dropping probe result for removed item {}",
                report.id
            );
            false
        } else {
            match report.outcome {
                ProbeOutcome::Duration(seconds) if seconds.is_finite() && seconds >= 0.0 => {
                    let updated = self.store.update_duration(
                        report.id,
                        seconds,
                        DurationSource::Probed,
                        report.forced,
                    );
                    if updated {
                        self.emit_change(ChangeEvent::MetadataUpdated {
                            ids: vec![report.id],
                        });
                    }
                    updated
                }
                ProbeOutcome::Duration(seconds) => {
                    self.apply_probe_failure(report.id, format!("invalid duration {seconds}"))
                }
                ProbeOutcome::Failed(reason) => self.apply_probe_failure(report.id, reason),
            }
        };
        self.finish_full_scan_if_done();
        applied
    }

    fn apply_probe_failure(&mut self, id: ItemId, reason: String) -> bool {
        let source = self
            .store
            .get(id)
            .map(|item| item.source_ref.clone())
            .unwrap_or_default();
        warn!(
            "PlaylistController: duration unavailable for {}: {}",
            source, reason
        );
        let marked = self.store.mark_duration_failed(id);
        if marked {
            self.emit_change(ChangeEvent::MetadataUpdated { ids: vec![id] });
        }
        self.emit(PlaylistMessage::ProbeFailed { id, reason });
        marked
    }

    pub fn export_snapshot(&self) -> Vec<SnapshotEntry> {
        self.store
            .query()
            .iter()
            .map(|item| SnapshotEntry {
                source_ref: item.source_ref.clone(),
                display_name: item.display_name.clone(),
                resume_position_seconds: item.resume_position_seconds,
                duration_seconds: item.duration.seconds(),
            })
            .collect()
    }

    pub fn session_file(&self) -> SessionFile {
        SessionFile::new(self.mode(), self.current_index(), self.export_snapshot())
    }

    /// Replaces the playlist with persisted entries. Saved durations are
    /// kept as stale values until re-probed.
    pub fn load_snapshot(&mut self, entries: Vec<SnapshotEntry>, current_index: Option<usize>) {
        self.clear();
        let items: Vec<MediaItem> = entries
            .into_iter()
            .map(|entry| {
                let origin = if is_remote_ref(&entry.source_ref) {
                    Origin::RemoteStream
                } else {
                    Origin::LocalFile
                };
                let duration = match entry.duration_seconds {
                    Some(seconds) => DurationState::Stale(seconds),
                    None => DurationState::Pending,
                };
                MediaItem::new(entry.source_ref, origin)
                    .with_display_name(entry.display_name)
                    .with_duration(duration)
                    .with_resume_position(entry.resume_position_seconds)
            })
            .collect();
        if items.is_empty() {
            return;
        }

        let ids = self.store.insert(items, 0);
        self.current = current_index.and_then(|index| self.store.id_at(index));
        self.resync_shuffle();
        self.emit_change(ChangeEvent::Inserted {
            at: 0,
            ids: ids.clone(),
        });
        if self.current.is_some() {
            self.emit_current();
        }
        self.enqueue_probes(&ids, false);
        info!("PlaylistController: restored {} entries", ids.len());
    }

    /// Restores mode, entries and current entry from a session file.
    pub fn restore_session(&mut self, session: SessionFile) {
        self.set_mode(session.mode);
        self.load_snapshot(session.entries, session.current_index);
    }
}
