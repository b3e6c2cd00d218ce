//! OpenAPI document for the HTTP surface
//!
//! The document is built once at startup from [`ROUTES`] and the compiled
//! observation schema, then written next to the server so client generators
//! can consume it.

use anyhow::{Context, Result};
use rlserve_core::FieldSlot;
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::info;

use crate::config::RuntimeConfig;

pub const TITLE: &str = "Policy Server";
pub const DESCRIPTION: &str = "Serve your policies in production";
pub const API_VERSION: &str = "1.0.0";

/// Credential scheme a route requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    None,
    ApiKey,
    Basic,
}

/// Documentation entry for one registered route
#[derive(Debug, Clone, Copy)]
pub struct RouteDoc {
    /// Lowercase, as OpenAPI path items key operations
    pub method: &'static str,
    pub path: &'static str,
    pub operation_id: &'static str,
    pub summary: &'static str,
    pub tag: &'static str,
    pub auth: AuthScheme,
    /// Component describing the JSON body, if the route takes one
    pub request: Option<&'static str>,
}

/// Documentation table for the routes assembled in `web::routes`.
///
/// Kept by hand; the route tests send a request for every entry so the two
/// cannot drift apart unnoticed.
pub const ROUTES: &[RouteDoc] = &[
    RouteDoc {
        method: "post",
        path: "/predict/",
        operation_id: "predict",
        summary: "Predict",
        tag: "Predictions",
        auth: AuthScheme::Basic,
        request: Some("Observation"),
    },
    RouteDoc {
        method: "post",
        path: "/predict_deterministic/",
        operation_id: "predict_deterministic",
        summary: "Predict Deterministic",
        tag: "Predictions",
        auth: AuthScheme::ApiKey,
        request: Some("Observation"),
    },
    RouteDoc {
        method: "post",
        path: "/distribution/",
        operation_id: "distribution",
        summary: "Distribution",
        tag: "Predictions",
        auth: AuthScheme::Basic,
        request: Some("Observation"),
    },
    RouteDoc {
        method: "post",
        path: "/collect_experience/",
        operation_id: "collect_experience",
        summary: "Collect Experience",
        tag: "Predictions",
        auth: AuthScheme::ApiKey,
        request: Some("Experience"),
    },
    RouteDoc {
        method: "post",
        path: "/predict_raw/",
        operation_id: "predict_raw",
        summary: "Predict Raw",
        tag: "Predictions",
        auth: AuthScheme::ApiKey,
        request: Some("RawObservation"),
    },
    RouteDoc {
        method: "get",
        path: "/clients",
        operation_id: "clients",
        summary: "Clients",
        tag: "Clients",
        auth: AuthScheme::ApiKey,
        request: None,
    },
    RouteDoc {
        method: "get",
        path: "/schema",
        operation_id: "server_schema",
        summary: "Server Schema",
        tag: "Clients",
        auth: AuthScheme::Basic,
        request: None,
    },
    RouteDoc {
        method: "get",
        path: "/",
        operation_id: "health_check",
        summary: "Health Check",
        tag: "Health",
        auth: AuthScheme::None,
        request: None,
    },
];

fn schema_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/components/schemas/{name}") })
}

fn field_schema(slot: &FieldSlot) -> Value {
    let element = json!({ "type": slot.kind.element_type() });
    if slot.kind.is_scalar() {
        element
    } else {
        json!({
            "type": "array",
            "items": element,
            "minItems": slot.arity,
            "maxItems": slot.arity,
        })
    }
}

fn observation_component(slots: &[FieldSlot]) -> Value {
    let properties: Map<String, Value> = slots
        .iter()
        .map(|slot| (slot.name.clone(), field_schema(slot)))
        .collect();
    let required: Vec<&str> = slots.iter().map(|slot| slot.name.as_str()).collect();
    json!({
        "title": "Observation",
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn components(config: &RuntimeConfig) -> Value {
    let key_name = &config.credentials.api_key_name;
    json!({
        "schemas": {
            "Observation": observation_component(config.schema.slots()),
            "Experience": {
                "title": "Experience",
                "type": "object",
                "properties": {
                    "observation": schema_ref("Observation"),
                    "reward": { "type": "number" },
                    "done": { "type": "boolean" },
                },
                "required": ["observation", "reward", "done"],
            },
            "RawObservation": {
                "title": "RawObservation",
                "type": "object",
                "properties": {
                    "obs": { "type": "array", "items": { "type": "number" } },
                },
                "required": ["obs"],
            },
            "Action": {
                "title": "Action",
                "type": "object",
                "properties": {
                    "actions": { "type": "array", "items": { "type": "number" } },
                    "probability": { "type": "number", "minimum": 0, "maximum": 1 },
                    "distribution": { "type": "array", "items": { "type": "number" } },
                },
                "required": ["actions", "probability"],
            },
            "HTTPError": {
                "title": "HTTPError",
                "type": "object",
                "properties": { "detail": { "type": "string" } },
                "required": ["detail"],
            },
        },
        "securitySchemes": {
            "APIKeyQuery": { "type": "apiKey", "in": "query", "name": key_name },
            "APIKeyHeader": { "type": "apiKey", "in": "header", "name": key_name },
            "APIKeyCookie": { "type": "apiKey", "in": "cookie", "name": key_name },
            "HTTPBasic": { "type": "http", "scheme": "basic" },
        },
    })
}

fn security(auth: AuthScheme) -> Option<Value> {
    match auth {
        AuthScheme::None => None,
        AuthScheme::ApiKey => Some(json!([
            { "APIKeyQuery": [] },
            { "APIKeyHeader": [] },
            { "APIKeyCookie": [] },
        ])),
        AuthScheme::Basic => Some(json!([{ "HTTPBasic": [] }])),
    }
}

fn operation(route: &RouteDoc) -> Value {
    let success = match route.operation_id {
        "clients" => json!({
            "description": "Zip archive of generated client libraries",
            "content": { "application/zip": { "schema": { "type": "string", "format": "binary" } } },
        }),
        "server_schema" | "health_check" => json!({
            "description": "Successful Response",
            "content": { "application/json": { "schema": {} } },
        }),
        _ => json!({
            "description": "Successful Response",
            "content": { "application/json": { "schema": schema_ref("Action") } },
        }),
    };

    let error = |description: &str| {
        json!({
            "description": description,
            "content": { "application/json": { "schema": schema_ref("HTTPError") } },
        })
    };

    let mut responses = Map::new();
    responses.insert("200".to_string(), success);
    match route.auth {
        AuthScheme::ApiKey => {
            responses.insert("403".to_string(), error("Could not validate credentials"));
        }
        AuthScheme::Basic => {
            responses.insert("401".to_string(), error("Incorrect email or password"));
        }
        AuthScheme::None => {}
    }

    let mut op = Map::new();
    op.insert("tags".to_string(), json!([route.tag]));
    op.insert("summary".to_string(), json!(route.summary));
    op.insert("operationId".to_string(), json!(route.operation_id));

    if let Some(component) = route.request {
        op.insert(
            "requestBody".to_string(),
            json!({
                "required": true,
                "content": { "application/json": { "schema": schema_ref(component) } },
            }),
        );
        responses.insert("422".to_string(), error("Validation Error"));
    }
    if route.operation_id != "health_check" && route.operation_id != "clients" {
        responses.insert("502".to_string(), error("Policy actor or experience writer failed"));
    }
    op.insert("responses".to_string(), Value::Object(responses));

    if let Some(security) = security(route.auth) {
        op.insert("security".to_string(), security);
    }
    Value::Object(op)
}

/// Build the OpenAPI 3.0 document
#[must_use]
pub fn generate(config: &RuntimeConfig) -> Value {
    let mut paths = Map::new();
    for route in ROUTES {
        let entry = paths
            .entry(route.path.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(methods) = entry {
            methods.insert(route.method.to_string(), operation(route));
        }
    }

    let mut doc = json!({
        "openapi": "3.0.2",
        "info": {
            "title": TITLE,
            "description": DESCRIPTION,
            "version": API_VERSION,
        },
        "tags": [
            { "name": "Predictions", "description": "Get actions for your next observations." },
            { "name": "Clients", "description": "Get libraries in several programming languages to connect with this server." },
            { "name": "Health", "description": "Basic health checks." },
        ],
        "paths": paths,
        "components": components(config),
    });

    if let Some(path) = &config.url_path {
        doc["servers"] = json!([{ "url": format!("/{path}") }]);
    }
    doc
}

/// Serialize the document to `path`
pub fn write(path: &Path, doc: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(doc)?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write OpenAPI document {}", path.display()))?;
    info!(path = %path.display(), "wrote OpenAPI document");
    Ok(())
}
