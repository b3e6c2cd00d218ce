// Inference gateway: adapts request payloads to the flat vectors policies accept

use rlserve_core::{
    Action, CompiledSchema, ExperienceCollector, ExperienceRequest, LocalPolicy, PolicyHandle,
    RawObservation, Result, ServeError, StructuredObservation,
};
use std::sync::Arc;
use tracing::{debug, error};

pub struct InferenceGateway {
    schema: Arc<CompiledSchema>,
    handle: Arc<dyn PolicyHandle>,
    local: Option<Arc<dyn LocalPolicy>>,
    collector: ExperienceCollector,
}

impl InferenceGateway {
    pub fn new(
        schema: Arc<CompiledSchema>,
        handle: Arc<dyn PolicyHandle>,
        local: Option<Arc<dyn LocalPolicy>>,
        collector: ExperienceCollector,
    ) -> Self {
        Self {
            schema,
            handle,
            local,
            collector,
        }
    }

    pub fn schema(&self) -> &CompiledSchema {
        &self.schema
    }

    pub fn collector(&self) -> &ExperienceCollector {
        &self.collector
    }

    /// Flatten by schema and dispatch to the policy handle
    pub async fn predict(&self, observation: &StructuredObservation) -> Result<Action> {
        let flat = self.schema.flatten(observation)?;
        self.dispatch(flat.into_inner()).await
    }

    /// Forward a caller-flattened vector unchanged
    pub async fn predict_raw(&self, observation: RawObservation) -> Result<Action> {
        self.dispatch(observation.obs).await
    }

    /// Point estimate from the in-process policy
    pub fn predict_deterministic(&self, observation: &StructuredObservation) -> Result<Action> {
        let flat = self.schema.flatten(observation)?;
        let action = self.local()?.predict_deterministic(&flat.data)?;
        action.validate()?;
        Ok(action)
    }

    /// Full action distribution from the in-process policy
    pub fn distribution(&self, observation: &StructuredObservation) -> Result<Action> {
        let flat = self.schema.flatten(observation)?;
        let action = self.local()?.distribution(&flat.data)?;
        action.validate()?;
        Ok(action)
    }

    /// Act on the observation and log the transition for offline training
    pub async fn collect_experience(&self, request: ExperienceRequest) -> Result<Action> {
        let flat = self.schema.flatten(&request.observation)?;
        self.collector
            .collect(
                self.handle.as_ref(),
                flat.into_inner(),
                request.reward,
                request.done,
            )
            .await
    }

    fn local(&self) -> Result<&dyn LocalPolicy> {
        self.local
            .as_deref()
            .ok_or_else(|| ServeError::Configuration("no local model configured".to_string()))
    }

    async fn dispatch(&self, observation: Vec<f64>) -> Result<Action> {
        debug!(width = observation.len(), "dispatching observation");
        let action = self.handle.compute(observation).await.map_err(|e| {
            error!(error = %e, "policy dispatch failed");
            e
        })?;
        action.validate()?;
        Ok(action)
    }
}
