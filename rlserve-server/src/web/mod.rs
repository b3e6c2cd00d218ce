// HTTP surface for the policy server
// Route table, shared state, and the rejection-to-response mapping

use anyhow::Result;
use rlserve_core::{
    ExperienceCollector, ExperienceRequest, JsonWriter, LocalPolicy, PolicyHandle, RawObservation,
    ServeError, StructuredObservation,
};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use warp::filters::BoxedFilter;
use warp::{Filter, Rejection, Reply};

pub mod handlers;
pub mod rejection;

pub use rejection::{handle_rejection, reject, ApiError};

use crate::auth::{api_key, basic_auth, Credentials};
use crate::config::RuntimeConfig;
use crate::gateway::InferenceGateway;
use crate::remote::RemotePolicyHandle;

/// Largest request body accepted on the JSON routes
const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// State shared by every handler
pub struct AppState {
    pub gateway: InferenceGateway,
    pub credentials: Arc<Credentials>,
    pub url_path: Option<String>,
    pub schema_document: serde_json::Value,
    pub clients_dir: PathBuf,
    pub clients_archive: PathBuf,
}

impl AppState {
    /// Wire up the policy handle, local model and experience writer from config
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        let local: Option<Arc<dyn LocalPolicy>> = config
            .local_policy
            .clone()
            .map(|p| p as Arc<dyn LocalPolicy>);

        let handle: Arc<dyn PolicyHandle> = match (&config.settings.policy.remote_url, &config.local_policy) {
            (Some(url), _) => {
                info!(url = %url, "using remote policy actor");
                Arc::new(RemotePolicyHandle::new(
                    url.clone(),
                    Duration::from_secs(config.settings.policy.timeout_secs),
                )?)
            }
            (None, Some(policy)) => {
                info!("no remote actor configured; sampling from the local model");
                policy.clone()
            }
            (None, None) => {
                return Err(ServeError::Configuration("no policy source configured".to_string()).into())
            }
        };

        let output = &config.settings.output;
        let writer = JsonWriter::new(&output.experience_dir, output.max_file_size);
        let gateway = InferenceGateway::new(
            config.schema.clone(),
            handle,
            local,
            ExperienceCollector::new(writer),
        );

        Ok(Self {
            gateway,
            credentials: Arc::new(config.credentials.clone()),
            url_path: config.url_path.clone(),
            schema_document: config.schema_document.clone(),
            clients_dir: output.clients_dir.clone(),
            clients_archive: output.clients_archive.clone(),
        })
    }
}

/// Helper to inject state into handlers
fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Configure all routes, mounted under the configured path segment
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = std::convert::Infallible> + Clone {
    let creds = state.credentials.clone();

    let prefix: BoxedFilter<()> = match &state.url_path {
        Some(segment) => warp::path(segment.clone()).boxed(),
        None => warp::any().boxed(),
    };

    let health = warp::path::end()
        .and(warp::get())
        .and_then(handlers::health_check);

    let predict = warp::path("predict")
        .and(warp::path::end())
        .and(warp::post())
        .and(basic_auth(creds.clone()))
        .and(json_body::<StructuredObservation>())
        .and(with_state(state.clone()))
        .and_then(handlers::predict);

    let predict_deterministic = warp::path("predict_deterministic")
        .and(warp::path::end())
        .and(warp::post())
        .and(api_key(creds.clone()))
        .and(json_body::<StructuredObservation>())
        .and(with_state(state.clone()))
        .and_then(handlers::predict_deterministic);

    let distribution = warp::path("distribution")
        .and(warp::path::end())
        .and(warp::post())
        .and(basic_auth(creds.clone()))
        .and(json_body::<StructuredObservation>())
        .and(with_state(state.clone()))
        .and_then(handlers::distribution);

    let predict_raw = warp::path("predict_raw")
        .and(warp::path::end())
        .and(warp::post())
        .and(api_key(creds.clone()))
        .and(json_body::<RawObservation>())
        .and(with_state(state.clone()))
        .and_then(handlers::predict_raw);

    let collect_experience = warp::path("collect_experience")
        .and(warp::path::end())
        .and(warp::post())
        .and(api_key(creds.clone()))
        .and(json_body::<ExperienceRequest>())
        .and(with_state(state.clone()))
        .and_then(handlers::collect_experience);

    let clients = warp::path("clients")
        .and(warp::path::end())
        .and(warp::get())
        .and(api_key(creds.clone()))
        .and(with_state(state.clone()))
        .and_then(handlers::clients);

    let schema = warp::path("schema")
        .and(warp::path::end())
        .and(warp::get())
        .and(basic_auth(creds))
        .and(with_state(state))
        .and_then(handlers::server_schema);

    prefix
        .and(
            health
                .or(predict)
                .or(predict_deterministic)
                .or(distribution)
                .or(predict_raw)
                .or(collect_experience)
                .or(clients)
                .or(schema),
        )
        .recover(handle_rejection)
        .with(warp::trace::request())
}

/// Serve until ctrl-c
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let (bound, server) = warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, async {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received");
    })?;

    info!(addr = %bound, "policy server listening");
    server.await;
    Ok(())
}
