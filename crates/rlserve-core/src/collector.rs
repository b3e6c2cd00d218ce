//! Serialized experience collection
//!
//! The episode cache, the batch accumulator and the writer form one piece of
//! shared mutable state. Each collection request runs its read, compute, record,
//! advance and flush sequence while holding a single lock, so the
//! previous/current pairing can never interleave between callers.

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::accumulator::{BatchAccumulator, StepOutcome};
use crate::action::Action;
use crate::episode::EpisodeCache;
use crate::policy::PolicyHandle;
use crate::writer::BatchWriter;
use crate::{Result, ServeError};

struct CollectorState {
    cache: EpisodeCache,
    accumulator: BatchAccumulator,
    writer: Box<dyn BatchWriter>,
}

/// Snapshot of collector progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorStatus {
    pub episode_id: u64,
    pub step: u64,
    pub pending: usize,
}

/// Stitches single-step requests into per-episode batches
pub struct ExperienceCollector {
    state: Mutex<CollectorState>,
}

impl ExperienceCollector {
    /// Create a collector with a fresh cache
    pub fn new(writer: impl BatchWriter + 'static) -> Self {
        Self::with_cache(EpisodeCache::new(), writer)
    }

    /// Create a collector starting from the given cache
    pub fn with_cache(cache: EpisodeCache, writer: impl BatchWriter + 'static) -> Self {
        Self {
            state: Mutex::new(CollectorState {
                cache,
                accumulator: BatchAccumulator::new(),
                writer: Box::new(writer),
            }),
        }
    }

    /// Current episode, step and number of unflushed transitions
    pub async fn status(&self) -> CollectorStatus {
        let state = self.state.lock().await;
        CollectorStatus {
            episode_id: state.cache.episode_id(),
            step: state.cache.step(),
            pending: state.accumulator.len(),
        }
    }

    /// Compute an action for `observation` and log the resulting transition.
    ///
    /// A `done` step flushes the episode's batch to the writer and starts a new
    /// episode. Writer failures surface as [`ServeError::Upstream`]; the
    /// episode's data is then lost but the cache is already reset.
    pub async fn collect(
        &self,
        policy: &dyn PolicyHandle,
        observation: Vec<f64>,
        reward: f64,
        done: bool,
    ) -> Result<Action> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let action = policy.compute(observation.clone()).await?;
        action.validate()?;
        let primary = action.primary().unwrap_or_default();

        if state.cache.is_empty() {
            state.cache.store(0, observation.clone(), primary, 0.0);
        }

        state.accumulator.record(
            &state.cache,
            StepOutcome {
                observation: &observation,
                action: primary,
                probability: action.probability,
                reward,
                done,
            },
        )?;
        let next_step = state.cache.step() + 1;
        state.cache.store(next_step, observation, primary, reward);

        if done {
            let batch = state.accumulator.build_and_reset();
            let episode_id = state.cache.episode_id();
            state.cache.reset();

            let len = batch.len();
            let total_reward = batch.total_reward();
            if let Err(e) = state.writer.write(batch).await {
                error!(episode_id, error = %e, "failed to write episode batch");
                return Err(ServeError::Upstream(format!(
                    "failed to write episode {episode_id}: {e}"
                )));
            }
            info!(episode_id, len, total_reward, "flushed episode batch");
        }

        Ok(action)
    }
}
