//! Action results returned by policies

use serde::{Deserialize, Serialize};
use std::fmt;

/// One element of a policy's action output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionValue {
    /// Index into a discrete action space
    Discrete(i64),
    /// Continuous control value
    Continuous(f64),
}

impl ActionValue {
    /// Numeric view of the action
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Discrete(i) => *i as f64,
            Self::Continuous(v) => *v,
        }
    }
}

impl Default for ActionValue {
    fn default() -> Self {
        Self::Discrete(0)
    }
}

impl fmt::Display for ActionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discrete(i) => write!(f, "{i}"),
            Self::Continuous(v) => write!(f, "{v}"),
        }
    }
}

fn certain() -> f64 {
    1.0
}

/// Result of a policy call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Chosen action(s); a single entry unless the action space is a tuple
    pub actions: Vec<ActionValue>,
    /// Probability of the chosen action under the policy
    #[serde(default = "certain")]
    pub probability: f64,
    /// Full distribution over discrete actions, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Vec<f64>>,
}

impl Action {
    /// Create an action result without a distribution
    #[must_use]
    pub fn new(actions: Vec<ActionValue>, probability: f64) -> Self {
        Self {
            actions,
            probability,
            distribution: None,
        }
    }

    /// First action element, which is what experience batches record
    #[must_use]
    pub fn primary(&self) -> Option<ActionValue> {
        self.actions.first().copied()
    }

    /// Log probability of the chosen action
    #[must_use]
    pub fn log_prob(&self) -> f64 {
        self.probability.ln()
    }

    /// Check that the result is usable downstream
    pub fn validate(&self) -> crate::Result<()> {
        if self.actions.is_empty() {
            return Err(crate::ServeError::Upstream(
                "policy returned no actions".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(crate::ServeError::Upstream(format!(
                "policy returned probability {} outside [0, 1]",
                self.probability
            )));
        }
        Ok(())
    }
}
