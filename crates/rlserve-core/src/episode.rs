//! Single-slot cache of the previous step of the running episode

use crate::action::ActionValue;

/// The previous step, as remembered between requests
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousStep {
    pub observation: Vec<f64>,
    pub action: ActionValue,
    pub reward: f64,
}

/// Holds the most recent step of the one episode in flight.
///
/// This is a single slot, not a history: each `store` overwrites the last one,
/// so memory stays flat however long the episode runs. The batch accumulator
/// owns the history.
#[derive(Debug, Clone)]
pub struct EpisodeCache {
    step: u64,
    episode_id: u64,
    previous: Option<PreviousStep>,
}

impl EpisodeCache {
    /// Create an empty cache with a randomly seeded episode id
    #[must_use]
    pub fn new() -> Self {
        Self::with_episode_id(u64::from(rand::random::<u32>()))
    }

    /// Create an empty cache starting at a known episode id
    #[must_use]
    pub fn with_episode_id(episode_id: u64) -> Self {
        Self {
            step: 0,
            episode_id,
            previous: None,
        }
    }

    /// True only when nothing has been stored since creation or the last reset
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.previous.is_none()
    }

    /// Overwrite the slot
    pub fn store(&mut self, step: u64, observation: Vec<f64>, action: ActionValue, reward: f64) {
        self.step = step;
        self.previous = Some(PreviousStep {
            observation,
            action,
            reward,
        });
    }

    /// Clear the slot and move to a fresh episode id
    pub fn reset(&mut self) {
        self.step = 0;
        self.previous = None;
        self.episode_id = self.episode_id.wrapping_add(1);
    }

    /// Step index stored with the slot
    #[must_use]
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Identifier of the running episode
    #[must_use]
    pub fn episode_id(&self) -> u64 {
        self.episode_id
    }

    /// The stored previous step, if any
    #[must_use]
    pub fn previous(&self) -> Option<&PreviousStep> {
        self.previous.as_ref()
    }
}

impl Default for EpisodeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let cache = EpisodeCache::with_episode_id(10);
        assert!(cache.is_empty());
        assert_eq!(cache.step(), 0);
        assert!(cache.previous().is_none());
    }

    #[test]
    fn store_fills_the_slot() {
        let mut cache = EpisodeCache::new();
        cache.store(4, vec![1.0, 2.0], ActionValue::Discrete(1), 0.5);

        assert!(!cache.is_empty());
        assert_eq!(cache.step(), 4);
        let prev = cache.previous().unwrap();
        assert_eq!(prev.observation, vec![1.0, 2.0]);
        assert_eq!(prev.action, ActionValue::Discrete(1));
    }

    #[test]
    fn store_overwrites_previous_entry() {
        let mut cache = EpisodeCache::with_episode_id(0);
        cache.store(0, vec![1.0], ActionValue::Discrete(0), 0.0);
        cache.store(1, vec![2.0], ActionValue::Discrete(1), 1.0);

        assert_eq!(cache.step(), 1);
        assert_eq!(cache.previous().unwrap().observation, vec![2.0]);
    }

    #[test]
    fn reset_empties_and_rotates_episode() {
        let mut cache = EpisodeCache::new();
        let before = cache.episode_id();
        cache.store(3, vec![0.0], ActionValue::Continuous(0.1), 1.0);
        cache.reset();

        assert!(cache.is_empty());
        assert_eq!(cache.step(), 0);
        assert_ne!(cache.episode_id(), before);
    }

    #[test]
    fn reset_wraps_at_max_id() {
        let mut cache = EpisodeCache::with_episode_id(u64::MAX);
        cache.reset();
        assert_eq!(cache.episode_id(), 0);
    }
}
