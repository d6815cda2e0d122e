use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use lapak_agent::KeyRing;
use lapak_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "providers.kolosal.api_keys",
        &redact_keys(&KeyRing::parse(&config.providers.kolosal.api_keys)),
        source("providers.kolosal.api_keys", "LAPAK_KOLOSAL_API_KEYS"),
    ));
    lines.push(render_line(
        "providers.kolosal.base_url",
        &config.providers.kolosal.base_url,
        source("providers.kolosal.base_url", "LAPAK_KOLOSAL_BASE_URL"),
    ));
    lines.push(render_line(
        "providers.kolosal.model",
        &config.providers.kolosal.model,
        source("providers.kolosal.model", "LAPAK_KOLOSAL_MODEL"),
    ));
    lines.push(render_line(
        "providers.gemini.api_keys",
        &redact_keys(&KeyRing::parse(&config.providers.gemini.api_keys)),
        source("providers.gemini.api_keys", "LAPAK_GEMINI_API_KEYS"),
    ));
    lines.push(render_line(
        "providers.gemini.base_url",
        &config.providers.gemini.base_url,
        source("providers.gemini.base_url", "LAPAK_GEMINI_BASE_URL"),
    ));
    lines.push(render_line(
        "providers.gemini.model",
        &config.providers.gemini.model,
        source("providers.gemini.model", "LAPAK_GEMINI_MODEL"),
    ));
    lines.push(render_line(
        "providers.timeout_secs",
        &config.providers.timeout_secs.to_string(),
        source("providers.timeout_secs", "LAPAK_PROVIDER_TIMEOUT_SECS"),
    ));
    lines.push(render_line(
        "providers.backoff_base_ms",
        &config.providers.backoff_base_ms.to_string(),
        source("providers.backoff_base_ms", "LAPAK_PROVIDER_BACKOFF_BASE_MS"),
    ));

    lines.push(render_line(
        "store.enabled",
        &config.store.enabled.to_string(),
        source("store.enabled", "LAPAK_STORE_ENABLED"),
    ));
    lines.push(render_line(
        "store.base_url",
        config.store.base_url.as_deref().unwrap_or("<unset>"),
        source("store.base_url", "LAPAK_STORE_BASE_URL"),
    ));
    lines.push(render_line(
        "store.service_key",
        if config.store.service_key.is_some() { "<redacted>" } else { "<unset>" },
        source("store.service_key", "LAPAK_STORE_SERVICE_KEY"),
    ));
    lines.push(render_line(
        "store.timeout_secs",
        &config.store.timeout_secs.to_string(),
        source("store.timeout_secs", "LAPAK_STORE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "session.ttl_secs",
        &config.session.ttl_secs.to_string(),
        source("session.ttl_secs", "LAPAK_SESSION_TTL_SECS"),
    ));
    lines.push(render_line(
        "session.sweep_interval_secs",
        &config.session.sweep_interval_secs.to_string(),
        source("session.sweep_interval_secs", "LAPAK_SESSION_SWEEP_INTERVAL_SECS"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "LAPAK_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "LAPAK_SERVER_PORT"),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", "LAPAK_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "LAPAK_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "LAPAK_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("lapak.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/lapak.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_keys(ring: &KeyRing) -> String {
    match ring.len() {
        0 => "<unset>".to_string(),
        1 => "<redacted: 1 key>".to_string(),
        n => format!("<redacted: {n} keys>"),
    }
}
