//! Messages exchanged between the playlist service, its workers and the
//! outside world.
//!
//! `Message` travels on the broadcast bus and is what observers see.
//! `PlaylistCommand` is the playlist service's private inbox: user commands,
//! playback events, import completions and probe results all pass through it
//! so they are applied one at a time.

use std::path::PathBuf;
use std::sync::mpsc::Sender as ReplySender;

use crate::import::{ImportError, ImportSummary, ResolvedImport};
use crate::media_item::ItemId;
use crate::navigation::{Direction, PlaybackMode};
use crate::playlist_store::{PlaylistSnapshot, SortKey};
use crate::session::SnapshotEntry;
use crate::trash::DeleteSummary;

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Playlist(PlaylistMessage),
    Playback(PlaybackMessage),
}

/// Incremental change to the playlist contents.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Inserted { at: usize, ids: Vec<ItemId> },
    Removed { ids: Vec<ItemId> },
    Reordered { ids: Vec<ItemId> },
    MetadataUpdated { ids: Vec<ItemId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Remove,
    Reorder,
    MetadataUpdate,
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeEvent::Inserted { .. } => ChangeKind::Insert,
            ChangeEvent::Removed { .. } => ChangeKind::Remove,
            ChangeEvent::Reordered { .. } => ChangeKind::Reorder,
            ChangeEvent::MetadataUpdated { .. } => ChangeKind::MetadataUpdate,
        }
    }

    pub fn affected_ids(&self) -> &[ItemId] {
        match self {
            ChangeEvent::Inserted { ids, .. }
            | ChangeEvent::Removed { ids }
            | ChangeEvent::Reordered { ids }
            | ChangeEvent::MetadataUpdated { ids } => ids,
        }
    }
}

/// Playlist notifications published on the bus.
#[derive(Debug, Clone)]
pub enum PlaylistMessage {
    Changed(ChangeEvent),
    CurrentChanged {
        id: Option<ItemId>,
        index: Option<usize>,
    },
    ModeChanged(PlaybackMode),
    FullScanChanged(bool),
    ProbeFailed {
        id: ItemId,
        reason: String,
    },
    ImportFinished(ImportSummary),
    SessionSaved {
        path: PathBuf,
        entries: usize,
    },
}

/// What the playback boundary needs to start an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRequest {
    pub id: ItemId,
    pub source_ref: String,
    pub resume_position_seconds: Option<f64>,
}

/// Requests for the playback boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackMessage {
    Play(PlayRequest),
    Stop,
}

/// Events reported by the playback boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    TrackEnded,
    SkipRequested(Direction),
    PositionReport {
        id: ItemId,
        position_seconds: f64,
        duration_seconds: Option<f64>,
    },
}

/// One queued duration probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeJob {
    pub id: ItemId,
    pub source_ref: String,
    /// Part of a full scan; may overwrite known durations.
    pub forced: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Duration(f64),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub id: ItemId,
    pub outcome: ProbeOutcome,
    pub forced: bool,
}

pub type ImportReply = ReplySender<Result<ImportSummary, ImportError>>;

/// Inbox of the playlist service.
#[derive(Debug)]
pub enum PlaylistCommand {
    Import {
        sources: Vec<String>,
        reply: Option<ImportReply>,
    },
    ImportResolved {
        resolved: ResolvedImport,
        reply: Option<ImportReply>,
    },
    Remove(Vec<ItemId>),
    RemoveRows(Vec<usize>),
    DeleteToTrash {
        ids: Vec<ItemId>,
        reply: Option<ReplySender<DeleteSummary>>,
    },
    Reorder {
        id: ItemId,
        to_index: usize,
    },
    Sort {
        key: SortKey,
        descending: bool,
    },
    Clear,
    Play(ItemId),
    SetMode(PlaybackMode),
    SetFullScan(bool),
    Playback(PlaybackEvent),
    ProbeFinished(ProbeReport),
    LoadSnapshot {
        entries: Vec<SnapshotEntry>,
        current_index: Option<usize>,
    },
    SaveSession,
    ExportM3u(PathBuf),
    Query(ReplySender<PlaylistSnapshot>),
    Shutdown,
}
