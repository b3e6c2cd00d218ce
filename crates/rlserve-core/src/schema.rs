//! Observation schema loading and compilation
//!
//! The schema is an ordered mapping from field name to field type. It defines
//! both the accepted request shape and the order in which fields are
//! concatenated into the flat vector sent to the policy. It is compiled once
//! at startup into a [`CompiledSchema`] holding per-field offsets.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::observation::{FieldValue, FlatObservation, StructuredObservation};
use crate::{Result, ServeError};

/// Declared type of an observation field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "List[float]")]
    FloatList,
    #[serde(rename = "List[int]")]
    IntList,
    #[serde(rename = "List[bool]")]
    BoolList,
}

impl FieldKind {
    /// Whether the field carries a single value
    #[must_use]
    pub fn is_scalar(self) -> bool {
        matches!(self, Self::Float | Self::Int | Self::Bool)
    }

    fn is_integral(self) -> bool {
        matches!(self, Self::Int | Self::IntList)
    }

    fn is_boolean(self) -> bool {
        matches!(self, Self::Bool | Self::BoolList)
    }

    /// JSON schema type name of a single element
    #[must_use]
    pub fn element_type(self) -> &'static str {
        match self {
            Self::Float | Self::FloatList => "number",
            Self::Int | Self::IntList => "integer",
            Self::Bool | Self::BoolList => "boolean",
        }
    }
}

/// One entry of the `observations` mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
}

impl FieldSpec {
    /// Scalar field of the given kind
    #[must_use]
    pub fn scalar(kind: FieldKind) -> Self {
        Self {
            kind,
            max_items: None,
            min_items: None,
        }
    }

    /// Fixed-length list field of the given kind
    #[must_use]
    pub fn list(kind: FieldKind, items: usize) -> Self {
        Self {
            kind,
            max_items: Some(items),
            min_items: None,
        }
    }
}

/// Schema document as stored on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationSchema {
    /// Ordered field declarations
    #[serde(default)]
    pub observations: IndexMap<String, FieldSpec>,
    /// Free-form deployment parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_yaml::Mapping>,
}

impl ObservationSchema {
    /// Parse a schema from YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| ServeError::Configuration(format!("invalid observation schema: {e}")))
    }

    /// Look up a string entry in the `parameters` section
    #[must_use]
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters
            .as_ref()?
            .get(&serde_yaml::Value::String(key.to_string()))?
            .as_str()
    }
}

/// Position of one field inside the flat vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSlot {
    pub name: String,
    pub kind: FieldKind,
    pub arity: usize,
    pub offset: usize,
}

/// Schema resolved to a fixed-length vector layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSchema {
    slots: Vec<FieldSlot>,
    width: usize,
}

impl CompiledSchema {
    /// Resolve field arities and offsets
    pub fn compile(schema: &ObservationSchema) -> Result<Self> {
        if schema.observations.is_empty() {
            return Err(ServeError::Configuration(
                "observation schema declares no fields".to_string(),
            ));
        }

        let mut slots = Vec::with_capacity(schema.observations.len());
        let mut offset = 0;

        for (name, spec) in &schema.observations {
            let arity = if spec.kind.is_scalar() {
                1
            } else {
                let max = spec.max_items.ok_or_else(|| {
                    ServeError::Configuration(format!("list field '{name}' needs max_items"))
                })?;
                if let Some(min) = spec.min_items {
                    if min != max {
                        return Err(ServeError::Configuration(format!(
                            "list field '{name}' must have a fixed length (min_items {min} != max_items {max})"
                        )));
                    }
                }
                if max == 0 {
                    return Err(ServeError::Configuration(format!(
                        "list field '{name}' has zero length"
                    )));
                }
                max
            };

            slots.push(FieldSlot {
                name: name.clone(),
                kind: spec.kind,
                arity,
                offset,
            });
            offset += arity;
        }

        Ok(Self { slots, width: offset })
    }

    /// Length of the flat vector
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Field slots in flattening order
    #[must_use]
    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    /// Concatenate the observation's fields in schema order
    pub fn flatten(&self, observation: &StructuredObservation) -> Result<FlatObservation> {
        let mut data = Vec::with_capacity(self.width);

        for slot in &self.slots {
            let value = observation
                .get(&slot.name)
                .ok_or_else(|| ServeError::Validation(format!("field required: {}", slot.name)))?;

            if slot.kind.is_scalar() && !value.is_scalar() {
                return Err(ServeError::Validation(format!(
                    "field '{}' expects a single value",
                    slot.name
                )));
            }
            if value.len() != slot.arity {
                return Err(ServeError::Validation(format!(
                    "field '{}' expects {} values, got {}",
                    slot.name,
                    slot.arity,
                    value.len()
                )));
            }

            let values = value.values();
            if slot.kind.is_integral() && values.iter().any(|v| v.fract() != 0.0) {
                return Err(ServeError::Validation(format!(
                    "field '{}' expects integers",
                    slot.name
                )));
            }
            if slot.kind.is_boolean() && values.iter().any(|v| *v != 0.0 && *v != 1.0) {
                return Err(ServeError::Validation(format!(
                    "field '{}' expects booleans",
                    slot.name
                )));
            }

            data.extend(values);
        }

        Ok(FlatObservation::new(data))
    }

    /// Split a flat vector back into named fields using the slot arities
    pub fn unflatten(&self, data: &[f64]) -> Result<IndexMap<String, FieldValue>> {
        if data.len() != self.width {
            return Err(ServeError::DimensionMismatch {
                expected: self.width,
                actual: data.len(),
            });
        }

        Ok(self
            .slots
            .iter()
            .map(|slot| {
                let chunk = &data[slot.offset..slot.offset + slot.arity];
                let value = match slot.kind {
                    FieldKind::Bool => FieldValue::Flag(chunk[0] != 0.0),
                    FieldKind::BoolList => FieldValue::Flags(chunk.iter().map(|v| *v != 0.0).collect()),
                    kind if kind.is_scalar() => FieldValue::Scalar(chunk[0]),
                    _ => FieldValue::Sequence(chunk.to_vec()),
                };
                (slot.name.clone(), value)
            })
            .collect())
    }
}
