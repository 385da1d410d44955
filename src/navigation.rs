//! Next/previous selection for the four playback modes.
//!
//! The engine works on positions only. Mapping positions back to item
//! identities, and clearing a current position whose item was removed, is the
//! controller's job.

use log::{debug, trace};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

/// Playback mode cycled from the transport controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// Play in order and stop after the last entry.
    #[default]
    Sequential,
    /// Replay the current entry.
    RepeatOne,
    /// Play in order and wrap around.
    RepeatAll,
    /// Play a random permutation, regenerating it when it runs out.
    Shuffle,
}

impl std::str::FromStr for PlaybackMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sequential" => Ok(PlaybackMode::Sequential),
            "repeat_one" => Ok(PlaybackMode::RepeatOne),
            "repeat_all" => Ok(PlaybackMode::RepeatAll),
            "shuffle" => Ok(PlaybackMode::Shuffle),
            other => Err(format!("unknown playback mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

pub struct NavigationEngine {
    mode: PlaybackMode,
    shuffle_order: Vec<usize>,
    rng: StdRng,
    shuffle_generations: u64,
}

impl NavigationEngine {
    pub fn new() -> Self {
        // Generate a random seed
        let mut seed = [0u8; 32];
        if let Err(err) = getrandom::fill(&mut seed) {
            debug!("NavigationEngine: OS seed unavailable ({}), using clock", err);
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|elapsed| elapsed.as_nanos())
                .unwrap_or_default();
            seed[..16].copy_from_slice(&nanos.to_le_bytes());
        }
        Self::with_seed(seed)
    }

    /// Deterministic engine, used by tests.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            mode: PlaybackMode::Sequential,
            shuffle_order: Vec::new(),
            rng: StdRng::from_seed(seed),
            shuffle_generations: 0,
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Switches mode without moving the current position. Entering shuffle
    /// builds a permutation that starts at `current`.
    pub fn set_mode(&mut self, mode: PlaybackMode, len: usize, current: Option<usize>) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        if mode == PlaybackMode::Shuffle {
            self.reshuffle(len, current);
        }
    }

    pub fn shuffle_order(&self) -> &[usize] {
        &self.shuffle_order
    }

    /// Number of permutations generated so far.
    pub fn shuffle_generations(&self) -> u64 {
        self.shuffle_generations
    }

    /// Rebuilds the permutation after the set of entries changed. `anchor`
    /// is moved to the front so the playing entry starts the new order.
    pub fn reshuffle(&mut self, len: usize, anchor: Option<usize>) {
        let mut indices: Vec<usize> = (0..len).collect();
        if len > 1 {
            indices.shuffle(&mut self.rng);
            self.shuffle_generations += 1;
            if let Some(anchor) = anchor.filter(|anchor| *anchor < len) {
                if let Some(position) = indices.iter().position(|&index| index == anchor) {
                    indices.remove(position);
                    indices.insert(0, anchor);
                }
            }
        }
        trace!("NavigationEngine: shuffle order {:?}", indices);
        self.shuffle_order = indices;
    }

    /// Carries the permutation across a reorder of the same entries.
    /// `new_positions[old]` is where the entry at `old` now sits.
    pub fn remap(&mut self, new_positions: &[usize]) {
        if self.shuffle_order.len() != new_positions.len() {
            return;
        }
        for index in self.shuffle_order.iter_mut() {
            *index = new_positions[*index];
        }
        trace!("NavigationEngine: shuffle order remapped {:?}", self.shuffle_order);
    }

    /// Starting position when nothing is current.
    pub fn first(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        match self.mode {
            PlaybackMode::Shuffle => {
                self.ensure_shuffle_order(len, None);
                self.shuffle_order.first().copied()
            }
            _ => Some(0),
        }
    }

    pub fn step(&mut self, direction: Direction, current: usize, len: usize) -> Option<usize> {
        match direction {
            Direction::Next => self.next(current, len),
            Direction::Previous => self.previous(current, len),
        }
    }

    pub fn next(&mut self, current: usize, len: usize) -> Option<usize> {
        if current >= len {
            return None;
        }
        match self.mode {
            PlaybackMode::Sequential => {
                let next = current + 1;
                (next < len).then_some(next)
            }
            PlaybackMode::RepeatOne => Some(current),
            PlaybackMode::RepeatAll => Some((current + 1) % len),
            PlaybackMode::Shuffle => {
                if len == 1 {
                    return Some(current);
                }
                self.ensure_shuffle_order(len, Some(current));
                match self.shuffle_position(current) {
                    Some(position) if position + 1 < len => {
                        Some(self.shuffle_order[position + 1])
                    }
                    _ => {
                        self.regenerate_after(current, len);
                        self.shuffle_order.first().copied()
                    }
                }
            }
        }
    }

    pub fn previous(&mut self, current: usize, len: usize) -> Option<usize> {
        if current >= len {
            return None;
        }
        match self.mode {
            PlaybackMode::Sequential => current.checked_sub(1),
            PlaybackMode::RepeatOne => Some(current),
            PlaybackMode::RepeatAll => Some(if current == 0 { len - 1 } else { current - 1 }),
            PlaybackMode::Shuffle => {
                if len == 1 {
                    return Some(current);
                }
                self.ensure_shuffle_order(len, Some(current));
                match self.shuffle_position(current) {
                    Some(position) if position > 0 => Some(self.shuffle_order[position - 1]),
                    _ => None,
                }
            }
        }
    }

    fn shuffle_position(&self, current: usize) -> Option<usize> {
        self.shuffle_order.iter().position(|&index| index == current)
    }

    fn ensure_shuffle_order(&mut self, len: usize, anchor: Option<usize>) {
        if self.shuffle_order.len() != len {
            self.reshuffle(len, anchor);
        }
    }

    /// Fresh permutation once the previous one is exhausted. With more than
    /// two entries the just-played entry may not come first again.
    fn regenerate_after(&mut self, just_played: usize, len: usize) {
        self.reshuffle(len, None);
        if len > 2 && self.shuffle_order.first() == Some(&just_played) {
            let swap_with = self.rng.random_range(1..len);
            self.shuffle_order.swap(0, swap_with);
        }
        debug!(
            "NavigationEngine: shuffle order exhausted, regenerated ({} entries)",
            len
        );
    }
}

impl Default for NavigationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(mode: PlaybackMode, len: usize) -> NavigationEngine {
        let mut engine = NavigationEngine::with_seed([7u8; 32]);
        engine.set_mode(mode, len, None);
        engine
    }

    #[test]
    fn test_mode_parses_cli_spelling() {
        assert_eq!("repeat-all".parse(), Ok(PlaybackMode::RepeatAll));
        assert_eq!("Shuffle".parse(), Ok(PlaybackMode::Shuffle));
        assert!("loop".parse::<PlaybackMode>().is_err());
    }

    fn is_permutation(order: &[usize], len: usize) -> bool {
        let mut sorted = order.to_vec();
        sorted.sort_unstable();
        sorted == (0..len).collect::<Vec<_>>()
    }

    #[test]
    fn test_sequential_stops_at_end() {
        let mut engine = engine(PlaybackMode::Sequential, 5);
        assert_eq!(engine.next(3, 5), Some(4));
        assert_eq!(engine.next(4, 5), None);
    }

    #[test]
    fn test_sequential_previous_stops_at_start() {
        let mut engine = engine(PlaybackMode::Sequential, 5);
        assert_eq!(engine.previous(2, 5), Some(1));
        assert_eq!(engine.previous(0, 5), None);
    }

    #[test]
    fn test_repeat_all_wraps_both_ways() {
        let mut engine = engine(PlaybackMode::RepeatAll, 5);
        assert_eq!(engine.next(4, 5), Some(0));
        assert_eq!(engine.previous(0, 5), Some(4));
    }

    #[test]
    fn test_repeat_one_stays_put() {
        let mut engine = engine(PlaybackMode::RepeatOne, 5);
        assert_eq!(engine.next(2, 5), Some(2));
        assert_eq!(engine.previous(2, 5), Some(2));
    }

    #[test]
    fn test_empty_list_yields_none_in_every_mode() {
        for mode in [
            PlaybackMode::Sequential,
            PlaybackMode::RepeatOne,
            PlaybackMode::RepeatAll,
            PlaybackMode::Shuffle,
        ] {
            let mut engine = engine(mode, 0);
            assert_eq!(engine.next(0, 0), None);
            assert_eq!(engine.previous(0, 0), None);
            assert_eq!(engine.first(0), None);
        }
    }

    #[test]
    fn test_shuffle_single_entry_skips_rng() {
        let mut engine = engine(PlaybackMode::Shuffle, 1);
        let generations = engine.shuffle_generations();
        assert_eq!(engine.next(0, 1), Some(0));
        assert_eq!(engine.previous(0, 1), Some(0));
        assert_eq!(engine.shuffle_generations(), generations);
    }

    #[test]
    fn test_entering_shuffle_anchors_current() {
        let mut engine = NavigationEngine::with_seed([3u8; 32]);
        engine.set_mode(PlaybackMode::Shuffle, 10, Some(6));
        assert_eq!(engine.shuffle_order().first(), Some(&6));
        assert!(is_permutation(engine.shuffle_order(), 10));
    }

    #[test]
    fn test_shuffle_walks_permutation_then_regenerates() {
        let len = 6;
        let mut engine = engine(PlaybackMode::Shuffle, len);
        let order = engine.shuffle_order().to_vec();
        assert!(is_permutation(&order, len));

        let mut current = order[0];
        for expected in order.iter().skip(1) {
            current = engine.next(current, len).expect("shuffle never stops");
            assert_eq!(current, *expected);
        }

        let generations = engine.shuffle_generations();
        let wrapped = engine.next(current, len).expect("shuffle never stops");
        assert_eq!(engine.shuffle_generations(), generations + 1);
        assert_ne!(wrapped, current);
        assert_eq!(engine.shuffle_order().first(), Some(&wrapped));
        assert!(is_permutation(engine.shuffle_order(), len));
    }

    #[test]
    fn test_shuffle_regeneration_never_repeats_last_entry() {
        for seed in 0u8..40 {
            let mut engine = NavigationEngine::with_seed([seed; 32]);
            engine.set_mode(PlaybackMode::Shuffle, 3, None);
            let last = *engine.shuffle_order().last().expect("non-empty order");
            let next = engine.next(last, 3).expect("shuffle never stops");
            assert_ne!(next, last, "seed {seed}");
        }
    }

    #[test]
    fn test_shuffle_previous_walks_backward_and_stops() {
        let len = 4;
        let mut engine = engine(PlaybackMode::Shuffle, len);
        let order = engine.shuffle_order().to_vec();
        assert_eq!(engine.previous(order[2], len), Some(order[1]));
        assert_eq!(engine.previous(order[0], len), None);
    }

    #[test]
    fn test_remap_follows_moved_entries() {
        let len = 5;
        let mut engine = engine(PlaybackMode::Shuffle, len);
        let before = engine.shuffle_order().to_vec();
        let generations = engine.shuffle_generations();

        // Entry at position 4 moved to the front.
        let new_positions = [1, 2, 3, 4, 0];
        engine.remap(&new_positions);
        let expected: Vec<usize> = before.iter().map(|&old| new_positions[old]).collect();
        assert_eq!(engine.shuffle_order(), expected.as_slice());
        assert_eq!(engine.shuffle_generations(), generations);

        engine.remap(&[0, 1]);
        assert_eq!(engine.shuffle_order(), expected.as_slice());
    }

    #[test]
    fn test_mode_switch_does_not_touch_other_modes_order() {
        let mut engine = engine(PlaybackMode::Sequential, 5);
        engine.set_mode(PlaybackMode::RepeatAll, 5, Some(2));
        assert!(engine.shuffle_order().is_empty());
        assert_eq!(engine.mode(), PlaybackMode::RepeatAll);
    }

    #[test]
    fn test_first_follows_mode() {
        let mut sequential = engine(PlaybackMode::Sequential, 3);
        assert_eq!(sequential.first(3), Some(0));

        let mut shuffle = engine(PlaybackMode::Shuffle, 3);
        let expected = shuffle.shuffle_order().first().copied();
        assert_eq!(shuffle.first(3), expected);
    }

    #[test]
    fn test_step_dispatches_direction() {
        let mut engine = engine(PlaybackMode::Sequential, 3);
        assert_eq!(engine.step(Direction::Next, 0, 3), Some(1));
        assert_eq!(engine.step(Direction::Previous, 1, 3), Some(0));
    }
}
