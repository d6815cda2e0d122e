use std::sync::Arc;
use std::time::Duration;

use lapak_agent::{
    BreakerGuardedProvider, ConversationSessionStore, GeminiProvider, IntentExtractionService,
    IntentProvider, KeyRing, KolosalProvider, Orchestrator, RotatingProvider,
};
use lapak_core::config::{AppConfig, ConfigError, LoadOptions};
use lapak_core::negotiate::NegotiationEngine;
use lapak_core::ports::{RecordStore, SellerDirectory};
use lapak_store::{MemoryStore, RestStore};
use secrecy::SecretString;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator<Arc<dyn SellerDirectory>>>,
    pub sessions: Arc<ConversationSessionStore>,
    pub sweeper: tokio::task::JoinHandle<()>,
    pub store_mode: &'static str,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no provider API keys configured; set LAPAK_KOLOSAL_API_KEYS or LAPAK_GEMINI_API_KEYS")]
    MissingProviderKeys,
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let timeout = Duration::from_secs(config.providers.timeout_secs);
    let backoff = Duration::from_millis(config.providers.backoff_base_ms);

    let kolosal_keys = KeyRing::parse(&config.providers.kolosal.api_keys);
    let gemini_keys = KeyRing::parse(&config.providers.gemini.api_keys);
    if kolosal_keys.is_empty() && gemini_keys.is_empty() {
        return Err(BootstrapError::MissingProviderKeys);
    }

    let kolosal = guarded(RotatingProvider::new(
        "kolosal",
        replicas(&kolosal_keys, |key| {
            Arc::new(KolosalProvider::new(&config.providers.kolosal, key, timeout))
        }),
        backoff,
    ));
    let gemini = guarded(RotatingProvider::new(
        "gemini",
        replicas(&gemini_keys, |key| {
            Arc::new(GeminiProvider::new(&config.providers.gemini, key, timeout))
        }),
        backoff,
    ));
    let extraction = IntentExtractionService::new(kolosal, gemini);

    let sessions =
        Arc::new(ConversationSessionStore::new(Duration::from_secs(config.session.ttl_secs)));
    let sweeper =
        sessions.spawn_sweeper(Duration::from_secs(config.session.sweep_interval_secs));

    let (record_store, directory, store_mode) = build_store(&config);
    info!(
        event_name = "system.bootstrap.store_selected",
        correlation_id = "bootstrap",
        store_mode,
        "record store initialized"
    );

    let orchestrator = Arc::new(Orchestrator::new(
        extraction,
        Arc::clone(&sessions),
        NegotiationEngine::new(directory),
        record_store,
    ));

    Ok(Application { config, orchestrator, sessions, sweeper, store_mode })
}

fn replicas(
    keys: &KeyRing,
    build: impl Fn(SecretString) -> Arc<dyn IntentProvider>,
) -> Vec<Arc<dyn IntentProvider>> {
    keys.iter().map(|key| build(key.clone())).collect()
}

fn guarded(rotating: RotatingProvider) -> Arc<dyn IntentProvider> {
    Arc::new(BreakerGuardedProvider::new(Arc::new(rotating)))
}

/// Picks the REST store when configured, the in-memory demo store otherwise.
/// Config validation already guarantees `base_url` and `service_key` are
/// present whenever `store.enabled` is set.
fn build_store(
    config: &AppConfig,
) -> (Arc<dyn RecordStore>, Arc<dyn SellerDirectory>, &'static str) {
    if config.store.enabled {
        if let (Some(base_url), Some(service_key)) =
            (&config.store.base_url, &config.store.service_key)
        {
            let rest = Arc::new(RestStore::new(
                base_url,
                service_key.clone(),
                Duration::from_secs(config.store.timeout_secs),
            ));
            return (Arc::clone(&rest) as Arc<dyn RecordStore>, rest, "rest");
        }
    }
    let memory = Arc::new(MemoryStore::new());
    (Arc::clone(&memory) as Arc<dyn RecordStore>, memory, "memory")
}

#[cfg(test)]
mod tests {
    use lapak_core::config::{ConfigOverrides, LoadOptions};

    use super::*;

    fn options(overrides: ConfigOverrides) -> LoadOptions {
        LoadOptions { overrides, ..LoadOptions::default() }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_any_provider_keys() {
        let result = bootstrap(options(ConfigOverrides {
            kolosal_api_keys: Some(String::new()),
            gemini_api_keys: Some(String::new()),
            ..ConfigOverrides::default()
        }))
        .await;

        assert!(matches!(result, Err(BootstrapError::MissingProviderKeys)));
    }

    #[tokio::test]
    async fn bootstrap_defaults_to_memory_store() {
        let app = bootstrap(options(ConfigOverrides {
            kolosal_api_keys: Some("key-a,key-b".to_string()),
            gemini_api_keys: Some("key-c".to_string()),
            ..ConfigOverrides::default()
        }))
        .await
        .expect("bootstrap should succeed with provider keys");

        assert_eq!(app.store_mode, "memory");
        app.sweeper.abort();
    }

    #[tokio::test]
    async fn bootstrap_selects_rest_store_when_enabled() {
        let app = bootstrap(options(ConfigOverrides {
            kolosal_api_keys: Some("key-a".to_string()),
            store_enabled: Some(true),
            store_base_url: Some("https://records.example.com".to_string()),
            store_service_key: Some("service-key".to_string()),
            ..ConfigOverrides::default()
        }))
        .await
        .expect("bootstrap should succeed with store settings");

        assert_eq!(app.store_mode, "rest");
        app.sweeper.abort();
    }
}
