use std::time::Instant;

use crate::commands::CommandResult;
use lapak_core::config::{AppConfig, LoadOptions};
use lapak_core::negotiate::{NegotiationEngine, NegotiationRequest};
use lapak_core::normalize::normalize;
use lapak_core::slots::{first_missing, SLOT_MAX_PRICE, SLOT_PRODUCT, SLOT_QTY};
use lapak_core::{Entities, EntityValue, IntentAction};
use lapak_store::MemoryStore;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

/// Exercises the deterministic pipeline stages offline: no provider calls,
/// no record-store calls.
pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, _config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("normalizer_sanity"));
            checks.push(skipped("slot_rules"));
            checks.push(skipped("demo_negotiation"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    }

    checks.push(check_normalizer());
    checks.push(check_slot_rules());
    checks.push(check_demo_negotiation());

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn check_normalizer() -> SmokeCheck {
    let started = Instant::now();
    let canonical = normalize("cari beras 25kg maksimal 12rb");
    let expected = "cari beras 25 kg maksimal 12000";
    let idempotent = normalize(canonical.as_str()) == canonical;

    let pass = canonical == expected && idempotent;
    SmokeCheck {
        name: "normalizer_sanity",
        status: if pass { SmokeStatus::Pass } else { SmokeStatus::Fail },
        elapsed_ms: started.elapsed().as_millis() as u64,
        message: if pass {
            "shorthand expansion is canonical and idempotent".to_string()
        } else {
            format!("expected `{expected}`, got `{canonical}`")
        },
    }
}

fn check_slot_rules() -> SmokeCheck {
    let started = Instant::now();
    let mut entities = Entities::default();

    let empty_asks_for_product =
        first_missing(IntentAction::OrderRestock, &entities) == Some(SLOT_PRODUCT);

    entities.insert(SLOT_PRODUCT, EntityValue::Text("beras".to_string()));
    entities.insert(SLOT_QTY, EntityValue::Number(25.0));
    entities.insert(SLOT_MAX_PRICE, EntityValue::Number(12000.0));
    let filled_is_complete = first_missing(IntentAction::OrderRestock, &entities).is_none();

    let pass = empty_asks_for_product && filled_is_complete;
    SmokeCheck {
        name: "slot_rules",
        status: if pass { SmokeStatus::Pass } else { SmokeStatus::Fail },
        elapsed_ms: started.elapsed().as_millis() as u64,
        message: if pass {
            "restock slot order and completion are consistent".to_string()
        } else {
            "restock slot rules returned unexpected requirements".to_string()
        },
    }
}

fn check_demo_negotiation() -> SmokeCheck {
    let started = Instant::now();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return SmokeCheck {
                name: "demo_negotiation",
                status: SmokeStatus::Fail,
                elapsed_ms: started.elapsed().as_millis() as u64,
                message: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let engine = NegotiationEngine::new(MemoryStore::new());
    let result = runtime.block_on(engine.negotiate(NegotiationRequest {
        product: "beras".to_string(),
        qty: 25.0,
        max_price: 12000.0,
    }));

    let within_budget = result.final_price.map(|price| price <= 12000.0).unwrap_or(false);
    let pass = result.success && within_budget;
    SmokeCheck {
        name: "demo_negotiation",
        status: if pass { SmokeStatus::Pass } else { SmokeStatus::Fail },
        elapsed_ms: started.elapsed().as_millis() as u64,
        message: if pass {
            format!(
                "demo catalogue closed a deal with {} within budget",
                result.seller_name.unwrap_or_default()
            )
        } else {
            result.error_message.unwrap_or_else(|| "negotiation did not close".to_string())
        },
    }
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
