//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CHESSVARS_BACK_CONFIG_PATH";
/// Google's public keys for Firebase ID tokens, in JWK form.
const DEFAULT_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Firebase project whose ID tokens are accepted.
    pub firebase_project_id: String,
    pub jwks_url: String,
    /// How long fetched signing keys are trusted before refetching.
    pub jwks_refresh_secs: u64,
    /// Attempts per optimistic transaction before giving up.
    pub transaction_max_attempts: u32,
    /// Externally reachable base URL, used by the `/explorer` redirect.
    pub public_address: String,
    pub sse_keep_alive_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            firebase_project_id: String::new(),
            jwks_url: DEFAULT_JWKS_URL.to_owned(),
            jwks_refresh_secs: 3600,
            transaction_max_attempts: 5,
            public_address: "http://localhost:8080".to_owned(),
            sse_keep_alive_secs: 15,
        }
    }
}

impl AppConfig {
    /// Load the configuration file, falling back to defaults, then apply
    /// environment overrides.
    pub fn load() -> Self {
        let mut config = Self::from_file();
        config.apply_env();
        if config.firebase_project_id.is_empty() {
            warn!("no Firebase project configured; every credential will be rejected");
        }
        config
    }

    fn from_file() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration file");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    fn apply_env(&mut self) {
        if let Some(project) = first_env(&["FIREBASE_PROJECT_ID", "GOOGLE_CLOUD_PROJECT"]) {
            self.firebase_project_id = project;
        }
        if let Some(address) = first_env(&["PUBLIC_ADDRESS", "ADDRESS"]) {
            self.public_address = address;
        }
    }

    pub fn jwks_refresh(&self) -> Duration {
        Duration::from_secs(self.jwks_refresh_secs)
    }

    pub fn sse_keep_alive(&self) -> Duration {
        Duration::from_secs(self.sse_keep_alive_secs.max(1))
    }

    /// Apollo sandbox URL pointed at this server's GraphQL endpoint.
    pub fn explorer_url(&self) -> String {
        format!(
            "https://sandbox.apollo.dev/?endpoint={}/graphql",
            self.public_address.trim_end_matches('/')
        )
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.is_empty())
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
