//! Per-episode transition buffer

use anyhow::anyhow;
use tracing::debug;

use crate::action::ActionValue;
use crate::episode::EpisodeCache;
use crate::trajectory::{SampleBatch, Transition};
use crate::Result;

/// Outcome of the current step, before it is paired with the cached one
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome<'a> {
    pub observation: &'a [f64],
    pub action: ActionValue,
    pub probability: f64,
    pub reward: f64,
    pub done: bool,
}

/// Collects the transitions of one episode until it is flushed
#[derive(Debug, Default)]
pub struct BatchAccumulator {
    transitions: Vec<Transition>,
}

impl BatchAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transition
    pub fn add_transition(&mut self, transition: Transition) {
        debug_assert!(
            self.transitions
                .first()
                .map_or(true, |first| first.eps_id == transition.eps_id),
            "transition from a different episode"
        );
        self.transitions.push(transition);
    }

    /// Pair the cached previous step with `outcome` and append the result.
    ///
    /// Must run before the cache is advanced to `outcome`.
    pub fn record(&mut self, cache: &EpisodeCache, outcome: StepOutcome<'_>) -> Result<()> {
        let previous = cache
            .previous()
            .ok_or_else(|| anyhow!("episode cache must be populated before recording a step"))?;

        let transition = Transition {
            t: cache.step(),
            eps_id: cache.episode_id(),
            obs: previous.observation.clone(),
            new_obs: outcome.observation.to_vec(),
            action: outcome.action,
            action_prob: outcome.probability,
            action_logp: outcome.probability.ln(),
            prev_action: previous.action,
            prev_reward: previous.reward,
            reward: outcome.reward,
            done: outcome.done,
        };
        debug!(t = transition.t, eps_id = transition.eps_id, "recorded transition");
        self.add_transition(transition);
        Ok(())
    }

    /// Number of buffered transitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Check if nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Move the buffered transitions out as a batch, leaving the buffer empty
    #[must_use]
    pub fn build_and_reset(&mut self) -> SampleBatch {
        let batch = SampleBatch::from_transitions(std::mem::take(&mut self.transitions));
        debug_assert!(batch.is_empty() || batch.episode_id().is_some());
        batch
    }
}
