//! Observation payloads and their flattened form

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Trait for observations handed to a policy
pub trait Observation: Clone + Debug + Send + Sync {
    /// Convert observation to a feature vector
    fn to_vec(&self) -> Vec<f64>;

    /// Get the shape of the observation
    fn shape(&self) -> Vec<usize>;
}

/// Value of a single observation field as it arrives on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric scalar
    Scalar(f64),
    /// Boolean scalar, encoded as 0.0 / 1.0
    Flag(bool),
    /// Numeric sequence
    Sequence(Vec<f64>),
    /// Boolean sequence
    Flags(Vec<bool>),
}

impl FieldValue {
    /// Number of elements this value contributes to the flat vector
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(_) | Self::Flag(_) => 1,
            Self::Sequence(values) => values.len(),
            Self::Flags(values) => values.len(),
        }
    }

    /// Whether the value contributes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this value was sent as a scalar
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Flag(_))
    }

    /// Numeric view of the value; scalars become single-element sequences
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        match self {
            Self::Scalar(v) => vec![*v],
            Self::Flag(b) => vec![flag(*b)],
            Self::Sequence(values) => values.clone(),
            Self::Flags(values) => values.iter().copied().map(flag).collect(),
        }
    }
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Observation keyed by schema field name, as posted by clients
pub type StructuredObservation = IndexMap<String, FieldValue>;

/// Observation flattened into the vector layout the policy expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatObservation {
    /// The observation data
    pub data: Vec<f64>,
}

impl FlatObservation {
    /// Wrap an already flattened vector
    #[must_use]
    pub fn new(data: Vec<f64>) -> Self {
        Self { data }
    }

    /// Consume and return the vector
    #[must_use]
    pub fn into_inner(self) -> Vec<f64> {
        self.data
    }
}

impl Observation for FlatObservation {
    fn to_vec(&self) -> Vec<f64> {
        self.data.clone()
    }

    fn shape(&self) -> Vec<usize> {
        vec![self.data.len()]
    }
}

/// Pre-flattened observation for clients that already know the layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub obs: Vec<f64>,
}

/// Body of an experience-collection request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceRequest {
    pub observation: StructuredObservation,
    pub reward: f64,
    pub done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_and_sequences_deserialize_untagged() {
        let obs: StructuredObservation =
            serde_json::from_str(r#"{"x": 5, "y": [1, 2], "z": true, "w": [false, true]}"#).unwrap();

        assert_eq!(obs["x"], FieldValue::Scalar(5.0));
        assert_eq!(obs["y"], FieldValue::Sequence(vec![1.0, 2.0]));
        assert_eq!(obs["z"], FieldValue::Flag(true));
        assert_eq!(obs["w"].values(), vec![0.0, 1.0]);
        assert_eq!(obs.keys().collect::<Vec<_>>(), ["x", "y", "z", "w"]);
    }

    #[test]
    fn experience_request_parses() {
        let req: ExperienceRequest = serde_json::from_str(
            r#"{"observation": {"x": 1.5}, "reward": -0.25, "done": false}"#,
        )
        .unwrap();

        assert_eq!(req.observation["x"].values(), vec![1.5]);
        assert!((req.reward + 0.25).abs() < f64::EPSILON);
        assert!(!req.done);
    }
}
