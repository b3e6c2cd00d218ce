// Server configuration loaded from TOML, with secrets overridable from the environment

use anyhow::{Context, Result};
use rlserve_core::{
    CompiledSchema, LinearPolicy, LocalPolicy, ObservationSchema, ServeError, DEFAULT_MAX_FILE_SIZE,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::Credentials;

pub const DEFAULT_CONFIG_PATH: &str = "rlserve.toml";
pub const ENV_API_KEY: &str = "RLSERVE_API_KEY";
pub const ENV_USERNAME: &str = "RLSERVE_USERNAME";
pub const ENV_PASSWORD: &str = "RLSERVE_PASSWORD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub schema: SchemaSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub clients: ClientsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Single path segment every route is mounted under
    #[serde(default)]
    pub url_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_name")]
    pub api_key_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySection {
    /// Endpoint of the remote policy actor
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Linear policy weights for the in-process routes
    #[serde(default)]
    pub local_model: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSection {
    #[serde(default = "default_schema_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_experience_dir")]
    pub experience_dir: PathBuf,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_openapi_path")]
    pub openapi_path: PathBuf,
    #[serde(default = "default_clients_dir")]
    pub clients_dir: PathBuf,
    #[serde(default = "default_clients_archive")]
    pub clients_archive: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientsSection {
    /// Command template run once per language; `{spec}`, `{lang}` and `{out}` are substituted
    #[serde(default)]
    pub generator: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_api_key_name() -> String {
    "access-token".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("schema.yaml")
}

fn default_experience_dir() -> PathBuf {
    PathBuf::from("experience")
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_openapi_path() -> PathBuf {
    PathBuf::from("openapi.json")
}

fn default_clients_dir() -> PathBuf {
    PathBuf::from("clients")
}

fn default_clients_archive() -> PathBuf {
    PathBuf::from("clients.zip")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            url_path: None,
        }
    }
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_name: default_api_key_name(),
            username: None,
            password: None,
        }
    }
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            remote_url: None,
            timeout_secs: default_timeout_secs(),
            local_model: None,
        }
    }
}

impl Default for SchemaSection {
    fn default() -> Self {
        Self {
            path: default_schema_path(),
        }
    }
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            experience_dir: default_experience_dir(),
            max_file_size: default_max_file_size(),
            openapi_path: default_openapi_path(),
            clients_dir: default_clients_dir(),
            clients_archive: default_clients_archive(),
        }
    }
}

/// Fully validated configuration the server runs with
pub struct RuntimeConfig {
    pub settings: ServerConfig,
    pub url_path: Option<String>,
    pub credentials: Credentials,
    pub schema: Arc<CompiledSchema>,
    /// Schema file as served by `GET /schema`, with secrets removed
    pub schema_document: serde_json::Value,
    pub local_policy: Option<Arc<LinearPolicy>>,
}

impl ServerConfig {
    /// Read and parse a TOML config file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override secrets from `RLSERVE_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_API_KEY) {
            self.auth.api_key = Some(key);
        }
        if let Some(user) = lookup(ENV_USERNAME) {
            self.auth.username = Some(user);
        }
        if let Some(pass) = lookup(ENV_PASSWORD) {
            self.auth.password = Some(pass);
        }
    }

    /// Load the schema file named in the config and validate everything
    pub fn compile(self) -> Result<RuntimeConfig> {
        let schema_text = fs::read_to_string(&self.schema.path).with_context(|| {
            format!("Failed to read observation schema {}", self.schema.path.display())
        })?;
        self.compile_with_schema(&schema_text)
    }

    /// Validate against schema YAML supplied directly
    pub fn compile_with_schema(self, schema_text: &str) -> Result<RuntimeConfig> {
        let observation_schema = ObservationSchema::from_yaml_str(schema_text)?;
        let schema = CompiledSchema::compile(&observation_schema)?;

        let api_key = self
            .auth
            .api_key
            .clone()
            .or_else(|| observation_schema.parameter_str("api_key").map(str::to_string));
        let url_path = self
            .server
            .url_path
            .clone()
            .or_else(|| observation_schema.parameter_str("url_path").map(str::to_string))
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());

        if let Some(path) = &url_path {
            if path.contains('/') {
                return Err(config_error(format!(
                    "url_path '{path}' must be a single path segment"
                )));
            }
        }

        let credentials = Credentials {
            api_key: require(api_key, "auth.api_key")?,
            api_key_name: self.auth.api_key_name.clone(),
            username: require(self.auth.username.clone(), "auth.username")?,
            password: require(self.auth.password.clone(), "auth.password")?,
        };
        if credentials.api_key_name.trim().is_empty() {
            return Err(config_error("auth.api_key_name must not be empty"));
        }

        let local_policy = match &self.policy.local_model {
            Some(path) => {
                let policy = LinearPolicy::load(path)
                    .with_context(|| format!("Failed to load local model {}", path.display()))?;
                if policy.input_dim() != schema.width() {
                    return Err(ServeError::DimensionMismatch {
                        expected: schema.width(),
                        actual: policy.input_dim(),
                    })
                    .context("Local model input width does not match the observation schema");
                }
                Some(Arc::new(policy))
            }
            None => None,
        };

        if self.policy.remote_url.is_none() && local_policy.is_none() {
            return Err(config_error(
                "either policy.remote_url or policy.local_model must be set",
            ));
        }

        let raw: serde_yaml::Value = serde_yaml::from_str(schema_text)
            .context("Failed to parse observation schema")?;
        let mut schema_document =
            serde_json::to_value(&raw).context("Observation schema is not JSON-compatible")?;
        if let Some(params) = schema_document
            .get_mut("parameters")
            .and_then(serde_json::Value::as_object_mut)
        {
            params.remove("api_key");
        }

        Ok(RuntimeConfig {
            settings: self,
            url_path,
            credentials,
            schema: Arc::new(schema),
            schema_document,
            local_policy,
        })
    }
}

fn config_error(msg: impl Into<String>) -> anyhow::Error {
    ServeError::Configuration(msg.into()).into()
}

fn require(value: Option<String>, name: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(config_error(format!("{name} must be set"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
observations:
  x:
    type: float
  y:
    type: List[float]
    max_items: 2
parameters:
  api_key: from-schema
  url_path: /policy/
"#;

    const CONFIG: &str = r#"
[server]
port = 9000

[auth]
username = "admin"
password = "hunter2"

[policy]
remote_url = "http://127.0.0.1:8265/predict"
"#;

    #[test]
    fn defaults_fill_missing_sections() {
        let config = ServerConfig::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.api_key_name, "access-token");
        assert_eq!(config.policy.timeout_secs, 30);
        assert_eq!(config.output.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.output.clients_archive, PathBuf::from("clients.zip"));
    }

    #[test]
    fn schema_parameters_fill_key_and_path() {
        let runtime = ServerConfig::from_toml_str(CONFIG)
            .unwrap()
            .compile_with_schema(SCHEMA)
            .unwrap();

        assert_eq!(runtime.credentials.api_key, "from-schema");
        assert_eq!(runtime.url_path.as_deref(), Some("policy"));
        assert_eq!(runtime.schema.width(), 3);
        assert!(runtime.schema_document["parameters"].get("api_key").is_none());
        assert_eq!(runtime.schema_document["observations"]["x"]["type"], "float");
    }

    #[test]
    fn env_overrides_secrets() {
        let mut config = ServerConfig::from_toml_str(CONFIG).unwrap();
        config.apply_overrides(|key| match key {
            ENV_API_KEY => Some("from-env".to_string()),
            ENV_PASSWORD => Some("s3cret".to_string()),
            _ => None,
        });

        let runtime = config.compile_with_schema(SCHEMA).unwrap();
        assert_eq!(runtime.credentials.api_key, "from-env");
        assert_eq!(runtime.credentials.password, "s3cret");
        assert_eq!(runtime.credentials.username, "admin");
    }

    #[test]
    fn missing_api_key_fails_fast() {
        let schema = "observations:\n  x:\n    type: float\n";
        let err = ServerConfig::from_toml_str(CONFIG)
            .unwrap()
            .compile_with_schema(schema)
            .err()
            .unwrap();
        assert!(err.to_string().contains("auth.api_key"));
    }

    #[test]
    fn policy_source_is_required() {
        let config = ServerConfig::from_toml_str(
            "[auth]\napi_key = \"k\"\nusername = \"u\"\npassword = \"p\"\n",
        )
        .unwrap();
        assert!(config.compile_with_schema(SCHEMA).is_err());
    }

    #[test]
    fn local_model_width_must_match_schema() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("policy.json");
        fs::write(&model, r#"{"weights": [[1, 0], [0, 1]], "bias": [0, 0]}"#).unwrap();

        let mut config = ServerConfig::from_toml_str(CONFIG).unwrap();
        config.policy.local_model = Some(model);
        assert!(config.compile_with_schema(SCHEMA).is_err());
    }

    #[test]
    fn nested_url_path_is_rejected() {
        let mut config = ServerConfig::from_toml_str(CONFIG).unwrap();
        config.server.url_path = Some("a/b".to_string());
        assert!(config.compile_with_schema(SCHEMA).is_err());
    }
}
