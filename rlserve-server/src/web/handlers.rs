use super::{reject, AppState};
use crate::clients::package_clients;
use rlserve_core::{ExperienceRequest, RawObservation, ServeError, StructuredObservation};
use std::sync::Arc;
use tracing::{debug, info};
use warp::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use warp::Reply;

/// Liveness probe
pub async fn health_check() -> Result<impl Reply, warp::Rejection> {
    Ok(warp::reply::json(&"ok"))
}

/// Sample an action from the policy handle
pub async fn predict(
    observation: StructuredObservation,
    state: Arc<AppState>,
) -> Result<impl Reply, warp::Rejection> {
    let action = state.gateway.predict(&observation).await.map_err(reject)?;
    Ok(warp::reply::json(&action))
}

/// Point estimate from the local model
pub async fn predict_deterministic(
    _token: String,
    observation: StructuredObservation,
    state: Arc<AppState>,
) -> Result<impl Reply, warp::Rejection> {
    let action = state
        .gateway
        .predict_deterministic(&observation)
        .map_err(reject)?;
    Ok(warp::reply::json(&action))
}

/// Full action distribution from the local model
pub async fn distribution(
    observation: StructuredObservation,
    state: Arc<AppState>,
) -> Result<impl Reply, warp::Rejection> {
    let action = state.gateway.distribution(&observation).map_err(reject)?;
    Ok(warp::reply::json(&action))
}

/// Forward a pre-flattened vector
pub async fn predict_raw(
    _token: String,
    observation: RawObservation,
    state: Arc<AppState>,
) -> Result<impl Reply, warp::Rejection> {
    let action = state.gateway.predict_raw(observation).await.map_err(reject)?;
    Ok(warp::reply::json(&action))
}

/// Act and log the transition
pub async fn collect_experience(
    _token: String,
    request: ExperienceRequest,
    state: Arc<AppState>,
) -> Result<impl Reply, warp::Rejection> {
    let done = request.done;
    let action = state
        .gateway
        .collect_experience(request)
        .await
        .map_err(reject)?;
    if done {
        info!("episode closed by client");
    }
    Ok(warp::reply::json(&action))
}

/// Zip of the generated client libraries
pub async fn clients(_token: String, state: Arc<AppState>) -> Result<impl Reply, warp::Rejection> {
    let dir = state.clients_dir.clone();
    let archive = state.clients_archive.clone();

    let bytes = tokio::task::spawn_blocking(move || package_clients(&dir, &archive))
        .await
        .map_err(|e| reject(ServeError::Other(e.into())))?
        .map_err(|e| reject(ServeError::Other(e)))?;

    debug!(bytes = bytes.len(), "serving client archive");
    let reply = warp::reply::with_header(bytes, CONTENT_TYPE, "application/zip");
    Ok(warp::reply::with_header(
        reply,
        CONTENT_DISPOSITION,
        "attachment; filename=\"clients.zip\"",
    ))
}

/// The configured observation schema
pub async fn server_schema(state: Arc<AppState>) -> Result<impl Reply, warp::Rejection> {
    Ok(warp::reply::json(&state.schema_document))
}
