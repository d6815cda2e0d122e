use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    pub store: StoreConfig,
    pub session: SessionConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Both AI providers. Each key field holds a comma-separated list; rotation
/// order follows the list order.
#[derive(Clone, Debug)]
pub struct ProvidersConfig {
    pub kolosal: ProviderEndpoint,
    pub gemini: ProviderEndpoint,
    pub timeout_secs: u64,
    /// Base unit for the linear backoff between key-rotation retries.
    pub backoff_base_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ProviderEndpoint {
    pub api_keys: SecretString,
    pub base_url: String,
    pub model: String,
}

/// The REST record store. When disabled the pipeline runs on the in-memory
/// store and the demo seller catalogue.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub service_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub kolosal_api_keys: Option<String>,
    pub gemini_api_keys: Option<String>,
    pub store_enabled: Option<bool>,
    pub store_base_url: Option<String>,
    pub store_service_key: Option<String>,
    pub session_ttl_secs: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig {
                kolosal: ProviderEndpoint {
                    api_keys: String::new().into(),
                    base_url: "https://api.kolosal.ai/v1".to_string(),
                    model: "kolosal-1-full".to_string(),
                },
                gemini: ProviderEndpoint {
                    api_keys: String::new().into(),
                    base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                    model: "gemini-2.0-flash".to_string(),
                },
                timeout_secs: 30,
                backoff_base_ms: 100,
            },
            store: StoreConfig { enabled: false, base_url: None, service_key: None, timeout_secs: 30 },
            session: SessionConfig { ttl_secs: 30 * 60, sweep_interval_secs: 5 * 60 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("lapak.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(providers) = patch.providers {
            if let Some(kolosal) = providers.kolosal {
                apply_endpoint_patch(&mut self.providers.kolosal, kolosal);
            }
            if let Some(gemini) = providers.gemini {
                apply_endpoint_patch(&mut self.providers.gemini, gemini);
            }
            if let Some(timeout_secs) = providers.timeout_secs {
                self.providers.timeout_secs = timeout_secs;
            }
            if let Some(backoff_base_ms) = providers.backoff_base_ms {
                self.providers.backoff_base_ms = backoff_base_ms;
            }
        }

        if let Some(store) = patch.store {
            if let Some(enabled) = store.enabled {
                self.store.enabled = enabled;
            }
            if let Some(base_url) = store.base_url {
                self.store.base_url = Some(base_url);
            }
            if let Some(store_service_key_value) = store.service_key {
                self.store.service_key = Some(secret_value(store_service_key_value));
            }
            if let Some(timeout_secs) = store.timeout_secs {
                self.store.timeout_secs = timeout_secs;
            }
        }

        if let Some(session) = patch.session {
            if let Some(ttl_secs) = session.ttl_secs {
                self.session.ttl_secs = ttl_secs;
            }
            if let Some(sweep_interval_secs) = session.sweep_interval_secs {
                self.session.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LAPAK_KOLOSAL_API_KEYS") {
            self.providers.kolosal.api_keys = secret_value(value);
        }
        if let Some(value) = read_env("LAPAK_KOLOSAL_BASE_URL") {
            self.providers.kolosal.base_url = value;
        }
        if let Some(value) = read_env("LAPAK_KOLOSAL_MODEL") {
            self.providers.kolosal.model = value;
        }
        if let Some(value) = read_env("LAPAK_GEMINI_API_KEYS") {
            self.providers.gemini.api_keys = secret_value(value);
        }
        if let Some(value) = read_env("LAPAK_GEMINI_BASE_URL") {
            self.providers.gemini.base_url = value;
        }
        if let Some(value) = read_env("LAPAK_GEMINI_MODEL") {
            self.providers.gemini.model = value;
        }
        if let Some(value) = read_env("LAPAK_PROVIDER_TIMEOUT_SECS") {
            self.providers.timeout_secs = parse_u64("LAPAK_PROVIDER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LAPAK_PROVIDER_BACKOFF_BASE_MS") {
            self.providers.backoff_base_ms = parse_u64("LAPAK_PROVIDER_BACKOFF_BASE_MS", &value)?;
        }

        if let Some(value) = read_env("LAPAK_STORE_ENABLED") {
            self.store.enabled = parse_bool("LAPAK_STORE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("LAPAK_STORE_BASE_URL") {
            self.store.base_url = Some(value);
        }
        if let Some(value) = read_env("LAPAK_STORE_SERVICE_KEY") {
            self.store.service_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LAPAK_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_u64("LAPAK_STORE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LAPAK_SESSION_TTL_SECS") {
            self.session.ttl_secs = parse_u64("LAPAK_SESSION_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("LAPAK_SESSION_SWEEP_INTERVAL_SECS") {
            self.session.sweep_interval_secs =
                parse_u64("LAPAK_SESSION_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("LAPAK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LAPAK_SERVER_PORT") {
            self.server.port = parse_u16("LAPAK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LAPAK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("LAPAK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("LAPAK_LOGGING_LEVEL").or_else(|| read_env("LAPAK_LOG_LEVEL"))
        {
            self.logging.level = value;
        }
        if let Some(value) =
            read_env("LAPAK_LOGGING_FORMAT").or_else(|| read_env("LAPAK_LOG_FORMAT"))
        {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(kolosal_api_keys) = overrides.kolosal_api_keys {
            self.providers.kolosal.api_keys = secret_value(kolosal_api_keys);
        }
        if let Some(gemini_api_keys) = overrides.gemini_api_keys {
            self.providers.gemini.api_keys = secret_value(gemini_api_keys);
        }
        if let Some(enabled) = overrides.store_enabled {
            self.store.enabled = enabled;
        }
        if let Some(base_url) = overrides.store_base_url {
            self.store.base_url = Some(base_url);
        }
        if let Some(service_key) = overrides.store_service_key {
            self.store.service_key = Some(secret_value(service_key));
        }
        if let Some(ttl_secs) = overrides.session_ttl_secs {
            self.session.ttl_secs = ttl_secs;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.timeout_secs == 0 || self.providers.timeout_secs > 300 {
            return Err(ConfigError::Validation(
                "providers.timeout_secs must be in range 1..=300".to_string(),
            ));
        }

        if self.store.enabled {
            let base_url_missing = self
                .store
                .base_url
                .as_deref()
                .map(|url| url.trim().is_empty())
                .unwrap_or(true);
            if base_url_missing {
                return Err(ConfigError::Validation(
                    "store.base_url is required when store.enabled = true".to_string(),
                ));
            }
            let key_missing = self
                .store
                .service_key
                .as_ref()
                .map(|key| key.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if key_missing {
                return Err(ConfigError::Validation(
                    "store.service_key is required when store.enabled = true".to_string(),
                ));
            }
        }

        if self.session.ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "session.ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "session.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must be non-zero".to_string()));
        }

        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("lapak.toml"), PathBuf::from("config/lapak.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn apply_endpoint_patch(endpoint: &mut ProviderEndpoint, patch: EndpointPatch) {
    if let Some(api_keys_value) = patch.api_keys {
        endpoint.api_keys = secret_value(api_keys_value);
    }
    if let Some(base_url) = patch.base_url {
        endpoint.base_url = base_url;
    }
    if let Some(model) = patch.model {
        endpoint.model = model;
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    providers: Option<ProvidersPatch>,
    store: Option<StorePatch>,
    session: Option<SessionPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ProvidersPatch {
    kolosal: Option<EndpointPatch>,
    gemini: Option<EndpointPatch>,
    timeout_secs: Option<u64>,
    backoff_base_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointPatch {
    api_keys: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    service_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
