use std::time::Duration;

use lapak_agent::KeyRing;
use lapak_core::config::{AppConfig, LoadOptions};
use lapak_store::RestStore;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_provider_keys(&config));
            checks.push(check_record_store(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "provider_key_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "record_store_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// At least one provider needs a key; the other rotates in as fallback only
/// when configured.
fn check_provider_keys(config: &AppConfig) -> DoctorCheck {
    let kolosal = KeyRing::parse(&config.providers.kolosal.api_keys).len();
    let gemini = KeyRing::parse(&config.providers.gemini.api_keys).len();

    if kolosal == 0 && gemini == 0 {
        return DoctorCheck {
            name: "provider_key_readiness",
            status: CheckStatus::Fail,
            details: "no API keys configured; set LAPAK_KOLOSAL_API_KEYS or LAPAK_GEMINI_API_KEYS"
                .to_string(),
        };
    }

    DoctorCheck {
        name: "provider_key_readiness",
        status: CheckStatus::Pass,
        details: format!("kolosal: {kolosal} key(s), gemini: {gemini} key(s)"),
    }
}

fn check_record_store(config: &AppConfig) -> DoctorCheck {
    if !config.store.enabled {
        return DoctorCheck {
            name: "record_store_connectivity",
            status: CheckStatus::Skipped,
            details: "store disabled, pipeline runs on the in-memory store".to_string(),
        };
    }

    let (Some(base_url), Some(service_key)) = (&config.store.base_url, &config.store.service_key)
    else {
        return DoctorCheck {
            name: "record_store_connectivity",
            status: CheckStatus::Fail,
            details: "store enabled but base_url or service_key missing".to_string(),
        };
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "record_store_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let store = RestStore::new(
        base_url,
        service_key.clone(),
        Duration::from_secs(config.store.timeout_secs),
    );
    match runtime.block_on(store.ping()) {
        Ok(()) => DoctorCheck {
            name: "record_store_connectivity",
            status: CheckStatus::Pass,
            details: format!("record store reachable at `{base_url}`"),
        },
        Err(error) => DoctorCheck {
            name: "record_store_connectivity",
            status: CheckStatus::Fail,
            details: format!("record store unreachable: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
