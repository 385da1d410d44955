//! Ordered playlist storage with identity-stable mutation primitives.
//!
//! Items live in an `Arc<Vec<MediaItem>>` that is cloned on write, so a
//! `PlaylistSnapshot` handed to a reader never changes underneath it. The
//! `ItemId -> position` table is rebuilt after every structural change.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;

use crate::media_item::{DurationSource, DurationState, ItemId, MediaItem};

/// Immutable view of the playlist at one point in time.
#[derive(Debug, Clone, Default)]
pub struct PlaylistSnapshot {
    items: Arc<Vec<MediaItem>>,
}

impl PlaylistSnapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, MediaItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MediaItem> {
        self.items.get(index)
    }
}

impl<'a> IntoIterator for &'a PlaylistSnapshot {
    type Item = &'a MediaItem;
    type IntoIter = std::slice::Iter<'a, MediaItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Sort criteria offered by the playlist panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Display name, case-insensitive.
    Name,
    /// Full source reference, case-insensitive.
    Path,
    /// Known or stale duration; unknown sorts as zero.
    Duration,
}

#[derive(Debug, Default)]
pub struct MediaItemStore {
    items: Arc<Vec<MediaItem>>,
    positions: HashMap<ItemId, usize>,
}

impl MediaItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position_of(&self, id: ItemId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.positions.contains_key(&id)
    }

    pub fn get(&self, id: ItemId) -> Option<&MediaItem> {
        self.position_of(id).and_then(|index| self.items.get(index))
    }

    pub fn id_at(&self, index: usize) -> Option<ItemId> {
        self.items.get(index).map(|item| item.id)
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id).collect()
    }

    /// Cheap immutable snapshot of the current contents.
    pub fn query(&self) -> PlaylistSnapshot {
        PlaylistSnapshot {
            items: Arc::clone(&self.items),
        }
    }

    /// Inserts `new_items` at `at_index` (clamped to the end), keeping the
    /// caller's order. Returns the inserted ids.
    pub fn insert(&mut self, new_items: Vec<MediaItem>, at_index: usize) -> Vec<ItemId> {
        if new_items.is_empty() {
            return Vec::new();
        }
        let at = at_index.min(self.items.len());
        let ids: Vec<ItemId> = new_items.iter().map(|item| item.id).collect();
        let items = Arc::make_mut(&mut self.items);
        let tail = items.split_off(at);
        items.extend(new_items);
        items.extend(tail);
        self.reindex_from(at);
        ids
    }

    /// Removes every listed id that is present. Absent ids are ignored.
    pub fn remove(&mut self, ids: &[ItemId]) -> usize {
        let targets: HashSet<ItemId> = ids
            .iter()
            .copied()
            .filter(|id| self.positions.contains_key(id))
            .collect();
        if targets.is_empty() {
            return 0;
        }
        let first_touched = targets
            .iter()
            .filter_map(|id| self.positions.get(id).copied())
            .min()
            .unwrap_or(0);
        let items = Arc::make_mut(&mut self.items);
        let before = items.len();
        items.retain(|item| !targets.contains(&item.id));
        let removed = before - items.len();
        for id in &targets {
            self.positions.remove(id);
        }
        self.reindex_from(first_touched);
        removed
    }

    /// Moves one entry to `to_index`, clamped to the last position.
    pub fn reorder(&mut self, id: ItemId, to_index: usize) -> bool {
        let Some(from) = self.position_of(id) else {
            debug!("MediaItemStore: reorder ignored for missing item {}", id);
            return false;
        };
        let to = to_index.min(self.items.len().saturating_sub(1));
        if from == to {
            return false;
        }
        let items = Arc::make_mut(&mut self.items);
        let item = items.remove(from);
        items.insert(to, item);
        self.reindex_from(from.min(to));
        true
    }

    /// Stable sort; ties keep their current relative order.
    pub fn sort_by(&mut self, key: SortKey, descending: bool) {
        if self.items.len() < 2 {
            return;
        }
        let items = Arc::make_mut(&mut self.items);
        items.sort_by(|a, b| {
            let ordering = match key {
                SortKey::Name => a
                    .display_name
                    .to_lowercase()
                    .cmp(&b.display_name.to_lowercase()),
                SortKey::Path => a
                    .source_ref
                    .to_lowercase()
                    .cmp(&b.source_ref.to_lowercase()),
                SortKey::Duration => {
                    let a = a.duration.seconds().unwrap_or(0.0);
                    let b = b.duration.seconds().unwrap_or(0.0);
                    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
                }
            };
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        self.reindex_from(0);
    }

    pub fn clear(&mut self) -> Vec<ItemId> {
        let ids = self.ids();
        self.items = Arc::new(Vec::new());
        self.positions.clear();
        ids
    }

    /// Writes a duration. Without `force`, only `Pending` and `Stale` entries
    /// accept the value, and a probe never replaces import metadata.
    pub fn update_duration(
        &mut self,
        id: ItemId,
        seconds: f64,
        source: DurationSource,
        force: bool,
    ) -> bool {
        let Some(index) = self.position_of(id) else {
            debug!("MediaItemStore: duration update dropped for missing item {}", id);
            return false;
        };
        let current = self.items[index].duration;
        let accepted = match current {
            DurationState::Pending | DurationState::Stale(_) => true,
            DurationState::Failed => force,
            DurationState::Known {
                source: DurationSource::Metadata,
                ..
            } => force || source == DurationSource::Metadata,
            DurationState::Known { .. } => force,
        };
        if !accepted {
            debug!(
                "MediaItemStore: keeping existing duration {:?} for {}",
                current, id
            );
            return false;
        }
        let next = DurationState::Known { seconds, source };
        if current == next {
            return false;
        }
        Arc::make_mut(&mut self.items)[index].duration = next;
        true
    }

    /// Marks a failed probe. A forced re-probe that fails keeps any value
    /// that was already known.
    pub fn mark_duration_failed(&mut self, id: ItemId) -> bool {
        let Some(index) = self.position_of(id) else {
            return false;
        };
        if !self.items[index].duration.needs_probe() {
            return false;
        }
        Arc::make_mut(&mut self.items)[index].duration = DurationState::Failed;
        true
    }

    pub fn set_resume_position(&mut self, id: ItemId, seconds: Option<f64>) -> bool {
        let Some(index) = self.position_of(id) else {
            return false;
        };
        if self.items[index].resume_position_seconds == seconds {
            return false;
        }
        Arc::make_mut(&mut self.items)[index].resume_position_seconds = seconds;
        true
    }

    fn reindex_from(&mut self, start: usize) {
        let items = Arc::make_mut(&mut self.items);
        for (index, item) in items.iter_mut().enumerate().skip(start) {
            item.order_index = index;
            self.positions.insert(item.id, index);
        }
    }
}
