//! Process configuration loaded from environment variables.
//!
//! Read once at startup and immutable for the process lifetime. Credentials
//! come from the environment; operational knobs may additionally be
//! overridden on the command line by the binaries.

use crate::pipeline::{AuthMode, ElasticConfig};
use crate::{Error, Result};

/// Process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backing store connection and index settings.
    pub elastic: ElasticConfig,

    /// Event-stream endpoint URL.
    pub stream_url: String,

    /// Bearer token for the stream handshake.
    pub stream_token: Option<String>,

    /// Resume cursor: id of the last event indexed by a previous run.
    pub stream_cursor: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (all have defaults for local development):
    /// - `CHRONICLE_ELASTIC_URL`: store URL (default: "http://localhost:9200")
    /// - `CHRONICLE_ELASTIC_INDEX`: index name (default: "history")
    /// - `CHRONICLE_ELASTIC_USERNAME` / `CHRONICLE_ELASTIC_PASSWORD`: basic auth
    /// - `CHRONICLE_ELASTIC_API_KEY`: API-key auth
    /// - `CHRONICLE_ELASTIC_VERIFY_TLS`: "true"/"false" (default: "true")
    /// - `CHRONICLE_STREAM_URL`: stream endpoint (default: "http://localhost:4000/stream")
    /// - `CHRONICLE_STREAM_TOKEN`: bearer token for the stream
    /// - `CHRONICLE_STREAM_CURSOR`: resume cursor
    ///
    /// Auth modes are mutually exclusive: configuring both basic auth and an
    /// API key is an error, as is a username without a password.
    pub fn from_env() -> Result<Self> {
        let url = env_opt("CHRONICLE_ELASTIC_URL")
            .unwrap_or_else(|| "http://localhost:9200".to_string());
        let index = env_opt("CHRONICLE_ELASTIC_INDEX").unwrap_or_else(|| "history".to_string());

        let auth = resolve_auth(
            env_opt("CHRONICLE_ELASTIC_USERNAME"),
            env_opt("CHRONICLE_ELASTIC_PASSWORD"),
            env_opt("CHRONICLE_ELASTIC_API_KEY"),
        )?;

        let verify_tls = match env_opt("CHRONICLE_ELASTIC_VERIFY_TLS").as_deref() {
            None | Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                return Err(Error::Config(format!(
                    "CHRONICLE_ELASTIC_VERIFY_TLS must be true or false, got '{other}'"
                )));
            }
        };

        let stream_url = env_opt("CHRONICLE_STREAM_URL")
            .unwrap_or_else(|| "http://localhost:4000/stream".to_string());
        let stream_token = env_opt("CHRONICLE_STREAM_TOKEN");
        let stream_cursor = env_opt("CHRONICLE_STREAM_CURSOR");

        tracing::info!(
            elastic_url = %url,
            index = %index,
            verify_tls,
            stream_url = %stream_url,
            "configuration loaded"
        );

        Ok(Self {
            elastic: ElasticConfig {
                url,
                index,
                verify_tls,
                auth,
                ..Default::default()
            },
            stream_url,
            stream_token,
            stream_cursor,
        })
    }
}

/// Select the auth mode, priority basic → api-key → none.
///
/// Configuring more than one mode is rejected rather than silently picking
/// the higher-priority one.
fn resolve_auth(
    username: Option<String>,
    password: Option<String>,
    api_key: Option<String>,
) -> Result<AuthMode> {
    match (username, password, api_key) {
        (Some(_), _, Some(_)) | (_, Some(_), Some(_)) => Err(Error::Config(
            "both basic auth and an API key are configured; set only one".to_string(),
        )),
        (Some(username), Some(password), None) => Ok(AuthMode::Basic { username, password }),
        (Some(_), None, None) => Err(Error::Config(
            "CHRONICLE_ELASTIC_USERNAME is set without CHRONICLE_ELASTIC_PASSWORD".to_string(),
        )),
        (None, Some(_), None) => Err(Error::Config(
            "CHRONICLE_ELASTIC_PASSWORD is set without CHRONICLE_ELASTIC_USERNAME".to_string(),
        )),
        (None, None, Some(key)) => Ok(AuthMode::ApiKey(key)),
        (None, None, None) => Ok(AuthMode::None),
    }
}

/// Read an environment variable, treating empty values as unset.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
