//! Moving local media files to the desktop trash.

use std::path::{Path, PathBuf};

use log::debug;

use crate::media_item::ItemId;

#[derive(Debug, thiserror::Error)]
pub enum TrashError {
    #[error("{0} does not exist")]
    Missing(PathBuf),
    #[error("could not move {path} to the trash: {reason}")]
    Failed { path: PathBuf, reason: String },
}

pub trait TrashBin: Send + Sync {
    fn delete(&self, path: &Path) -> Result<(), TrashError>;
}

/// The trash of the running desktop.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTrash;

impl TrashBin for SystemTrash {
    fn delete(&self, path: &Path) -> Result<(), TrashError> {
        if !path.exists() {
            return Err(TrashError::Missing(path.to_path_buf()));
        }
        debug!("SystemTrash: moving {} to the trash", path.display());
        trash::delete(path).map_err(|err| TrashError::Failed {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteFailure {
    pub id: ItemId,
    pub source_ref: String,
    pub reason: String,
}

/// Outcome of a trash request. Only `deleted` entries left the playlist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteSummary {
    pub deleted: Vec<ItemId>,
    pub failures: Vec<DeleteFailure>,
}
