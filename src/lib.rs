//! Playlist core of the cadre video player: the ordered media list, its
//! background duration resolution, playback-order navigation and session
//! persistence.

pub mod config;
pub mod duration_resolver;
pub mod import;
pub mod m3u;
pub mod media_discovery;
pub mod media_item;
pub mod navigation;
pub mod playlist_controller;
pub mod playlist_service;
pub mod playlist_store;
pub mod probe;
pub mod protocol;
pub mod session;
pub mod stream_resolver;
pub mod trash;

pub use media_item::{DurationState, ItemId, MediaItem};
pub use navigation::{Direction, PlaybackMode};
pub use playlist_controller::PlaylistController;
pub use playlist_service::{spawn_playlist_service, PlaylistHandle, PlaylistRuntime};
pub use protocol::{ChangeEvent, Message, PlaylistMessage};
