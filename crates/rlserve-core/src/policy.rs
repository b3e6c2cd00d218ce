//! Policy capabilities used by the inference gateway

use async_trait::async_trait;
use ndarray::{Array1, Array2, ArrayView1};
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::action::{Action, ActionValue};
use crate::{Result, ServeError};

/// Something that turns a flat observation vector into an action, possibly remotely
#[async_trait]
pub trait PolicyHandle: Send + Sync {
    /// Compute an action for the observation
    async fn compute(&self, observation: Vec<f64>) -> Result<Action>;
}

/// Policy evaluated in-process, without dispatch
pub trait LocalPolicy: Send + Sync {
    /// Expected observation width
    fn input_dim(&self) -> usize;

    /// Most likely action, with its probability
    fn predict_deterministic(&self, observation: &[f64]) -> Result<Action>;

    /// Most likely action together with the full action distribution
    fn distribution(&self, observation: &[f64]) -> Result<Action>;
}

/// On-disk form of a [`LinearPolicy`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearPolicyFile {
    /// One row of input weights per discrete action
    pub weights: Vec<Vec<f64>>,
    /// One bias per discrete action
    pub bias: Vec<f64>,
}

/// Softmax policy over a linear scoring of the observation
#[derive(Debug, Clone)]
pub struct LinearPolicy {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl LinearPolicy {
    /// Create a policy from an `(actions, inputs)` weight matrix and per-action bias
    pub fn new(weights: Array2<f64>, bias: Array1<f64>) -> Result<Self> {
        let (actions, inputs) = weights.dim();
        if actions == 0 || inputs == 0 {
            return Err(ServeError::Configuration(
                "linear policy needs at least one action and one input".to_string(),
            ));
        }
        if bias.len() != actions {
            return Err(ServeError::DimensionMismatch {
                expected: actions,
                actual: bias.len(),
            });
        }
        Ok(Self { weights, bias })
    }

    /// Build from the serialized row-major form
    pub fn from_file_contents(file: LinearPolicyFile) -> Result<Self> {
        let actions = file.weights.len();
        let inputs = file.weights.first().map_or(0, Vec::len);
        if let Some(row) = file.weights.iter().find(|row| row.len() != inputs) {
            return Err(ServeError::DimensionMismatch {
                expected: inputs,
                actual: row.len(),
            });
        }

        let flat: Vec<f64> = file.weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((actions, inputs), flat)
            .map_err(|e| ServeError::Configuration(format!("invalid weight matrix: {e}")))?;
        Self::new(weights, Array1::from(file.bias))
    }

    /// Load a JSON weights file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let file: LinearPolicyFile = serde_json::from_str(&text)?;
        let policy = Self::from_file_contents(file)?;
        info!(
            path = %path.display(),
            actions = policy.num_actions(),
            inputs = policy.input_dim(),
            "loaded linear policy"
        );
        Ok(policy)
    }

    /// Number of discrete actions
    #[must_use]
    pub fn num_actions(&self) -> usize {
        self.weights.nrows()
    }

    /// Softmax probabilities for the observation
    pub fn probabilities(&self, observation: &[f64]) -> Result<Vec<f64>> {
        if observation.len() != self.input_dim() {
            return Err(ServeError::DimensionMismatch {
                expected: self.input_dim(),
                actual: observation.len(),
            });
        }

        let logits = self.weights.dot(&ArrayView1::from(observation)) + &self.bias;
        if !logits.iter().all(|v| v.is_finite()) {
            return Err(ServeError::Validation(
                "observation produces non-finite action scores".to_string(),
            ));
        }
        let max = logits.fold(f64::NEG_INFINITY, |m, v| m.max(*v));
        let exp = logits.mapv(|v| (v - max).exp());
        let total = exp.sum();
        Ok(exp.iter().map(|v| v / total).collect())
    }
}

fn argmax(probs: &[f64]) -> (usize, f64) {
    probs
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best })
}

impl LocalPolicy for LinearPolicy {
    fn input_dim(&self) -> usize {
        self.weights.ncols()
    }

    fn predict_deterministic(&self, observation: &[f64]) -> Result<Action> {
        let probs = self.probabilities(observation)?;
        let (index, probability) = argmax(&probs);
        Ok(Action::new(vec![ActionValue::Discrete(index as i64)], probability))
    }

    fn distribution(&self, observation: &[f64]) -> Result<Action> {
        let probs = self.probabilities(observation)?;
        let (index, probability) = argmax(&probs);
        Ok(Action {
            actions: vec![ActionValue::Discrete(index as i64)],
            probability,
            distribution: Some(probs),
        })
    }
}

/// Samples from the softmax, so a local model can stand in for a remote actor
#[async_trait]
impl PolicyHandle for LinearPolicy {
    async fn compute(&self, observation: Vec<f64>) -> Result<Action> {
        let probs = self.probabilities(&observation)?;
        let dist = WeightedIndex::new(&probs)
            .map_err(|e| ServeError::Upstream(format!("degenerate action distribution: {e}")))?;
        let index = dist.sample(&mut rand::thread_rng());
        Ok(Action::new(vec![ActionValue::Discrete(index as i64)], probs[index]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn policy() -> LinearPolicy {
        // Action 1 scores the first input, action 0 the second.
        LinearPolicy::new(array![[0.0, 1.0], [1.0, 0.0]], array![0.0, 0.0]).unwrap()
    }

    #[test]
    fn deterministic_picks_argmax() {
        let action = policy().predict_deterministic(&[3.0, 0.0]).unwrap();
        assert_eq!(action.actions, vec![ActionValue::Discrete(1)]);
        assert!(action.probability > 0.9);
        assert!(action.distribution.is_none());
    }

    #[test]
    fn distribution_sums_to_one() {
        let action = policy().distribution(&[0.5, 0.5]).unwrap();
        let dist = action.distribution.unwrap();
        assert_eq!(dist.len(), 2);
        assert!((dist.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!((dist[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn wrong_width_is_rejected() {
        assert!(matches!(
            policy().predict_deterministic(&[1.0]),
            Err(ServeError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn overflowing_scores_are_rejected() {
        let policy =
            LinearPolicy::new(array![[0.0, 0.0], [1.0, 1.0]], array![0.0, 0.0]).unwrap();

        for obs in [[1e308, 1e308], [f64::NAN, 0.0]] {
            assert!(matches!(
                policy.predict_deterministic(&obs),
                Err(ServeError::Validation(_))
            ));
            assert!(matches!(policy.distribution(&obs), Err(ServeError::Validation(_))));
        }
    }

    #[test]
    fn ragged_weights_are_rejected() {
        let file = LinearPolicyFile {
            weights: vec![vec![1.0, 2.0], vec![1.0]],
            bias: vec![0.0, 0.0],
        };
        assert!(LinearPolicy::from_file_contents(file).is_err());
    }

    #[test]
    fn loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"weights": [[1, 0, 0], [0, 1, 0]], "bias": [0, 0.5]}"#).unwrap();

        let policy = LinearPolicy::load(&path).unwrap();
        assert_eq!(policy.input_dim(), 3);
        assert_eq!(policy.num_actions(), 2);
    }

    #[tokio::test]
    async fn sampling_returns_a_valid_action() {
        let action = policy().compute(vec![10.0, 0.0]).await.unwrap();
        assert!(action.validate().is_ok());
        assert!(matches!(action.primary(), Some(ActionValue::Discrete(0 | 1))));
    }
}
