use std::env;
use std::sync::{Mutex, OnceLock};

use lapak_cli::commands::{config, doctor, smoke};
use serde_json::Value;

#[test]
fn doctor_passes_with_provider_keys_and_memory_store() {
    with_env(&[("LAPAK_KOLOSAL_API_KEYS", "key-a,key-b")], || {
        let payload = parse_payload(&doctor::run(true));

        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks should be an array");
        assert!(checks
            .iter()
            .any(|check| check["name"] == "provider_key_readiness" && check["status"] == "pass"));
        assert!(checks
            .iter()
            .any(|check| check["name"] == "record_store_connectivity"
                && check["status"] == "skipped"));
    });
}

#[test]
fn doctor_fails_without_any_provider_keys() {
    with_env(&[], || {
        let payload = parse_payload(&doctor::run(true));

        assert_eq!(payload["overall_status"], "fail");
        let checks = payload["checks"].as_array().expect("checks should be an array");
        assert!(checks
            .iter()
            .any(|check| check["name"] == "provider_key_readiness" && check["status"] == "fail"));
    });
}

#[test]
fn doctor_human_output_lists_every_check() {
    with_env(&[("LAPAK_GEMINI_API_KEYS", "key-c")], || {
        let output = doctor::run(false);

        assert!(output.contains("config_validation"));
        assert!(output.contains("provider_key_readiness"));
        assert!(output.contains("record_store_connectivity"));
    });
}

#[test]
fn config_redacts_api_keys_and_reports_env_source() {
    with_env(&[("LAPAK_KOLOSAL_API_KEYS", "key-a,key-b,key-c")], || {
        let output = config::run();

        assert!(!output.contains("key-a"), "raw keys must never leak into output");
        assert!(output.contains("<redacted: 3 keys>"));
        assert!(output.contains("env (LAPAK_KOLOSAL_API_KEYS)"));
        assert!(output.contains("store.enabled = false"));
    });
}

#[test]
fn config_reports_defaults_when_nothing_is_set() {
    with_env(&[], || {
        let output = config::run();

        assert!(output.contains("providers.kolosal.api_keys = <unset>"));
        assert!(output.contains("server.port = 8080 (source: default)"));
    });
}

#[test]
fn smoke_passes_offline_with_default_config() {
    with_env(&[], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 0, "expected successful smoke report");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "pass");

        let checks = payload["checks"].as_array().expect("checks should be an array");
        assert!(checks
            .iter()
            .any(|check| check["name"] == "demo_negotiation" && check["status"] == "pass"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "LAPAK_KOLOSAL_API_KEYS",
        "LAPAK_KOLOSAL_BASE_URL",
        "LAPAK_KOLOSAL_MODEL",
        "LAPAK_GEMINI_API_KEYS",
        "LAPAK_GEMINI_BASE_URL",
        "LAPAK_GEMINI_MODEL",
        "LAPAK_PROVIDER_TIMEOUT_SECS",
        "LAPAK_PROVIDER_BACKOFF_BASE_MS",
        "LAPAK_STORE_ENABLED",
        "LAPAK_STORE_BASE_URL",
        "LAPAK_STORE_SERVICE_KEY",
        "LAPAK_STORE_TIMEOUT_SECS",
        "LAPAK_SESSION_TTL_SECS",
        "LAPAK_SESSION_SWEEP_INTERVAL_SECS",
        "LAPAK_SERVER_BIND_ADDRESS",
        "LAPAK_SERVER_PORT",
        "LAPAK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "LAPAK_LOGGING_LEVEL",
        "LAPAK_LOGGING_FORMAT",
        "LAPAK_LOG_LEVEL",
        "LAPAK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
