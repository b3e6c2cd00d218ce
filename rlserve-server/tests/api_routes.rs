// End-to-end tests against the full route tree

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rlserve_core::{
    Action, ActionValue, CompiledSchema, EpisodeCache, ExperienceCollector, FieldKind, FieldSpec,
    JsonWriter, LinearPolicy, LinearPolicyFile, LocalPolicy, ObservationSchema, PolicyHandle,
    Result, DEFAULT_MAX_FILE_SIZE,
};
use rlserve_server::auth::Credentials;
use rlserve_server::openapi::ROUTES;
use rlserve_server::{routes, AppState, InferenceGateway};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use warp::http::StatusCode;

const KEY: &str = "1234567asdfgh";

/// Answers every call with action 1 and counts invocations
#[derive(Default)]
struct CountingHandle {
    calls: AtomicUsize,
    last: Mutex<Option<Vec<f64>>>,
}

#[async_trait]
impl PolicyHandle for CountingHandle {
    async fn compute(&self, observation: Vec<f64>) -> Result<Action> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(observation);
        Ok(Action::new(vec![ActionValue::Discrete(1)], 0.5))
    }
}

struct Harness {
    state: Arc<AppState>,
    handle: Arc<CountingHandle>,
    dir: TempDir,
}

fn harness(url_path: Option<&str>) -> Harness {
    let dir = tempfile::tempdir().unwrap();

    let mut schema = ObservationSchema::default();
    schema.observations.insert("x".into(), FieldSpec::scalar(FieldKind::Float));
    schema.observations.insert("y".into(), FieldSpec::list(FieldKind::FloatList, 2));
    let compiled = Arc::new(CompiledSchema::compile(&schema).unwrap());

    let local = LinearPolicy::from_file_contents(LinearPolicyFile {
        weights: vec![vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]],
        bias: vec![0.0, 0.0],
    })
    .unwrap();

    let handle = Arc::new(CountingHandle::default());
    let writer = JsonWriter::new(dir.path().join("experience"), DEFAULT_MAX_FILE_SIZE);
    let gateway = InferenceGateway::new(
        compiled,
        handle.clone(),
        Some(Arc::new(local) as Arc<dyn LocalPolicy>),
        ExperienceCollector::with_cache(EpisodeCache::with_episode_id(7), writer),
    );

    let clients_dir = dir.path().join("clients");
    std::fs::create_dir_all(clients_dir.join("python")).unwrap();
    std::fs::write(clients_dir.join("python").join("client.py"), "# client\n").unwrap();

    let state = Arc::new(AppState {
        gateway,
        credentials: Arc::new(Credentials {
            api_key: KEY.to_string(),
            api_key_name: "access-token".to_string(),
            username: "admin".to_string(),
            password: "pw".to_string(),
        }),
        url_path: url_path.map(str::to_string),
        schema_document: json!({
            "observations": { "x": { "type": "float" } },
            "parameters": { "discrete": true },
        }),
        clients_dir,
        clients_archive: dir.path().join("clients.zip"),
    });

    Harness { state, handle, dir }
}

fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
}

fn observation() -> Value {
    json!({ "x": 5, "y": [1, 2] })
}

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

fn experience_files(dir: &Path) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn health_check_needs_no_credentials() {
    let h = harness(None);
    let response = warp::test::request()
        .path("/")
        .reply(&routes(h.state.clone()))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response.body()), json!("ok"));
}

#[tokio::test]
async fn unauthenticated_raw_prediction_never_reaches_policy() {
    let h = harness(None);
    let response = warp::test::request()
        .method("POST")
        .path("/predict_raw/")
        .json(&json!({ "obs": [1.0, 2.0, 3.0] }))
        .reply(&routes(h.state.clone()))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response.body()),
        json!({ "detail": "Could not validate credentials" })
    );
    assert_eq!(h.handle.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn token_is_accepted_from_any_channel() {
    let h = harness(None);
    let filter = routes(h.state.clone());
    let body = json!({ "obs": [1.0, 2.0, 3.0] });

    let by_query = warp::test::request()
        .method("POST")
        .path(&format!("/predict_raw/?access-token={KEY}"))
        .json(&body)
        .reply(&filter)
        .await;
    let by_header = warp::test::request()
        .method("POST")
        .path("/predict_raw/")
        .header("access-token", KEY)
        .json(&body)
        .reply(&filter)
        .await;
    let by_cookie = warp::test::request()
        .method("POST")
        .path("/predict_raw/")
        .header("cookie", format!("access-token={KEY}"))
        .json(&body)
        .reply(&filter)
        .await;

    for response in [by_query, by_header, by_cookie] {
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response.body())["actions"], json!([1]));
    }
    assert_eq!(h.handle.calls.load(Ordering::SeqCst), 3);
    assert_eq!(*h.handle.last.lock().unwrap(), Some(vec![1.0, 2.0, 3.0]));
}

#[tokio::test]
async fn basic_routes_challenge_and_flatten() {
    let h = harness(None);
    let filter = routes(h.state.clone());

    let rejected = warp::test::request()
        .method("POST")
        .path("/predict/")
        .header("authorization", basic("admin", "wrong"))
        .json(&observation())
        .reply(&filter)
        .await;
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(rejected.headers()["www-authenticate"], "Basic");
    assert_eq!(
        body_json(rejected.body()),
        json!({ "detail": "Incorrect email or password" })
    );

    let accepted = warp::test::request()
        .method("POST")
        .path("/predict/")
        .header("authorization", basic("admin", "pw"))
        .json(&observation())
        .reply(&filter)
        .await;
    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(*h.handle.last.lock().unwrap(), Some(vec![5.0, 1.0, 2.0]));
}

#[tokio::test]
async fn local_model_routes() {
    let h = harness(None);
    let filter = routes(h.state.clone());

    let deterministic = warp::test::request()
        .method("POST")
        .path(&format!("/predict_deterministic/?access-token={KEY}"))
        .json(&observation())
        .reply(&filter)
        .await;
    assert_eq!(deterministic.status(), StatusCode::OK);
    assert_eq!(body_json(deterministic.body())["actions"], json!([1]));

    let distribution = warp::test::request()
        .method("POST")
        .path("/distribution/")
        .header("authorization", basic("admin", "pw"))
        .json(&observation())
        .reply(&filter)
        .await;
    assert_eq!(distribution.status(), StatusCode::OK);
    let probs = body_json(distribution.body())["distribution"].clone();
    let total: f64 = probs
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_f64().unwrap())
        .sum();
    assert!((total - 1.0).abs() < 1e-9);

    assert_eq!(h.handle.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn three_step_episode_is_flushed_once() {
    let h = harness(None);
    let filter = routes(h.state.clone());
    let experience_dir = h.dir.path().join("experience");

    for (step, done) in [false, false, true].into_iter().enumerate() {
        let response = warp::test::request()
            .method("POST")
            .path(&format!("/collect_experience/?access-token={KEY}"))
            .json(&json!({ "observation": observation(), "reward": step as f64, "done": done }))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        if !done {
            assert!(experience_files(&experience_dir).is_empty());
        }
    }

    let files = experience_files(&experience_dir);
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(&files[0]).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1);

    let batch: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(batch["type"], "SampleBatch");
    assert_eq!(batch["t"], json!([0, 1, 2]));
    assert_eq!(batch["eps_id"], json!([7, 7, 7]));
    assert_eq!(batch["dones"], json!([false, false, true]));

    let status = h.state.gateway.collector().status().await;
    assert_eq!(status.pending, 0);
    assert_eq!(status.step, 0);
    assert_ne!(status.episode_id, 7);
}

#[tokio::test]
async fn malformed_bodies_are_unprocessable() {
    let h = harness(None);
    let filter = routes(h.state.clone());

    let wrong_arity = warp::test::request()
        .method("POST")
        .path(&format!("/collect_experience/?access-token={KEY}"))
        .json(&json!({ "observation": { "x": 1, "y": [1] }, "reward": 0.0, "done": false }))
        .reply(&filter)
        .await;
    assert_eq!(wrong_arity.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let not_json = warp::test::request()
        .method("POST")
        .path(&format!("/predict_raw/?access-token={KEY}"))
        .body("{\"obs\": oops")
        .reply(&filter)
        .await;
    assert_eq!(not_json.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_json(not_json.body())["detail"].is_string());

    assert_eq!(h.handle.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn schema_and_clients_are_served() {
    let h = harness(None);
    let filter = routes(h.state.clone());

    let schema = warp::test::request()
        .path("/schema")
        .header("authorization", basic("admin", "pw"))
        .reply(&filter)
        .await;
    assert_eq!(schema.status(), StatusCode::OK);
    assert_eq!(body_json(schema.body())["parameters"]["discrete"], true);

    let clients = warp::test::request()
        .path(&format!("/clients?access-token={KEY}"))
        .reply(&filter)
        .await;
    assert_eq!(clients.status(), StatusCode::OK);
    assert_eq!(clients.headers()["content-type"], "application/zip");
    assert_eq!(
        clients.headers()["content-disposition"],
        "attachment; filename=\"clients.zip\""
    );
    assert!(clients.body().starts_with(b"PK"));
    assert!(h.dir.path().join("clients.zip").is_file());
}

#[tokio::test]
async fn overflowing_observations_are_unprocessable() {
    let h = harness(None);
    let filter = routes(h.state.clone());
    let huge = json!({ "x": 1e308, "y": [1e308, 1e308] });

    let deterministic = warp::test::request()
        .method("POST")
        .path(&format!("/predict_deterministic/?access-token={KEY}"))
        .json(&huge)
        .reply(&filter)
        .await;
    assert_eq!(deterministic.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let distribution = warp::test::request()
        .method("POST")
        .path("/distribution/")
        .header("authorization", basic("admin", "pw"))
        .json(&huge)
        .reply(&filter)
        .await;
    assert_eq!(distribution.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_json(distribution.body())["detail"].is_string());
}

#[tokio::test]
async fn unknown_routes_and_methods() {
    let h = harness(None);
    let filter = routes(h.state.clone());

    let missing = warp::test::request().path("/nope").reply(&filter).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let wrong_method = warp::test::request()
        .method("GET")
        .path("/predict/")
        .header("authorization", basic("admin", "pw"))
        .reply(&filter)
        .await;
    assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn every_documented_route_is_registered() {
    let h = harness(None);
    let filter = routes(h.state.clone());

    for route in ROUTES {
        let response = warp::test::request()
            .method(&route.method.to_uppercase())
            .path(&format!("{}?access-token={KEY}", route.path))
            .header("authorization", basic("admin", "pw"))
            .body("")
            .reply(&filter)
            .await;

        assert_ne!(response.status(), StatusCode::NOT_FOUND, "{}", route.path);
        assert_ne!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", route.path);
    }
}

#[tokio::test]
async fn routes_mount_under_url_path() {
    let h = harness(Some("policy"));
    let filter = routes(h.state.clone());
    let body = json!({ "obs": [1.0] });

    let mounted = warp::test::request()
        .method("POST")
        .path(&format!("/policy/predict_raw/?access-token={KEY}"))
        .json(&body)
        .reply(&filter)
        .await;
    assert_eq!(mounted.status(), StatusCode::OK);

    let bare = warp::test::request()
        .method("POST")
        .path(&format!("/predict_raw/?access-token={KEY}"))
        .json(&body)
        .reply(&filter)
        .await;
    assert_eq!(bare.status(), StatusCode::NOT_FOUND);
}
