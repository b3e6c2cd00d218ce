//! Transitions and the column-oriented batches handed to writers

use serde::{Deserialize, Serialize};

use crate::action::ActionValue;

/// Agent index recorded for every transition; serving is single-agent
pub const AGENT_INDEX: u32 = 0;

/// Single step of interaction, paired with the step before it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Step index within the episode
    pub t: u64,
    /// Episode the step belongs to
    pub eps_id: u64,
    /// Previous observation
    pub obs: Vec<f64>,
    /// Current observation
    pub new_obs: Vec<f64>,
    /// Action chosen for the current observation
    pub action: ActionValue,
    /// Probability of that action
    pub action_prob: f64,
    /// Log probability of that action
    pub action_logp: f64,
    /// Previous action
    pub prev_action: ActionValue,
    /// Previous reward
    pub prev_reward: f64,
    /// Reward reported with the current observation
    pub reward: f64,
    /// Whether the episode ended
    pub done: bool,
}

/// Batch of transitions from one episode, one column per field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    #[serde(rename = "type")]
    pub kind: BatchKind,
    pub agent_index: Vec<u32>,
    pub t: Vec<u64>,
    pub eps_id: Vec<u64>,
    pub obs: Vec<Vec<f64>>,
    pub new_obs: Vec<Vec<f64>>,
    pub actions: Vec<ActionValue>,
    pub action_prob: Vec<f64>,
    pub action_logp: Vec<f64>,
    pub prev_actions: Vec<ActionValue>,
    pub prev_rewards: Vec<f64>,
    pub rewards: Vec<f64>,
    pub dones: Vec<bool>,
}

/// Record type tag written alongside each batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchKind {
    #[default]
    SampleBatch,
}

impl SampleBatch {
    /// Transpose rows into columns
    #[must_use]
    pub fn from_transitions(transitions: Vec<Transition>) -> Self {
        let mut batch = Self::default();
        for tr in transitions {
            batch.agent_index.push(AGENT_INDEX);
            batch.t.push(tr.t);
            batch.eps_id.push(tr.eps_id);
            batch.obs.push(tr.obs);
            batch.new_obs.push(tr.new_obs);
            batch.actions.push(tr.action);
            batch.action_prob.push(tr.action_prob);
            batch.action_logp.push(tr.action_logp);
            batch.prev_actions.push(tr.prev_action);
            batch.prev_rewards.push(tr.prev_reward);
            batch.rewards.push(tr.reward);
            batch.dones.push(tr.done);
        }
        batch
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.t.len()
    }

    /// Check if the batch has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Episode shared by every row, if the batch is non-empty and uniform
    #[must_use]
    pub fn episode_id(&self) -> Option<u64> {
        let first = *self.eps_id.first()?;
        self.eps_id.iter().all(|id| *id == first).then_some(first)
    }

    /// Sum of rewards over the batch
    #[must_use]
    pub fn total_reward(&self) -> f64 {
        self.rewards.iter().sum()
    }
}
