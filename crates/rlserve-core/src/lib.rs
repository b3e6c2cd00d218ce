//! Core types for serving reinforcement-learning policies over HTTP
//!
//! This crate holds everything that is not transport: the observation schema
//! and the flattening it drives, the policy capability traits, and the
//! experience pipeline that turns single-step requests into per-episode
//! batches for offline training.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod accumulator;
pub mod action;
pub mod collector;
pub mod episode;
pub mod error;
pub mod observation;
pub mod policy;
pub mod schema;
pub mod trajectory;
pub mod writer;

// Re-export core traits and types
pub use accumulator::{BatchAccumulator, StepOutcome};
pub use action::{Action, ActionValue};
pub use collector::{CollectorStatus, ExperienceCollector};
pub use episode::{EpisodeCache, PreviousStep};
pub use error::{AuthFailure, Result, ServeError};
pub use observation::{
    ExperienceRequest, FieldValue, FlatObservation, Observation, RawObservation,
    StructuredObservation,
};
pub use policy::{LinearPolicy, LinearPolicyFile, LocalPolicy, PolicyHandle};
pub use schema::{CompiledSchema, FieldKind, FieldSlot, FieldSpec, ObservationSchema};
pub use trajectory::{SampleBatch, Transition, AGENT_INDEX};
pub use writer::{BatchWriter, JsonWriter, MemoryWriter, DEFAULT_MAX_FILE_SIZE};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Action, ActionValue, CompiledSchema, ExperienceCollector, LocalPolicy, Observation,
        PolicyHandle, Result, ServeError,
    };
}
