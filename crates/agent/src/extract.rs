use std::sync::Arc;

use tracing::{debug, info, warn};

use lapak_core::normalize::normalize;
use lapak_core::Intent;

use crate::provider::IntentProvider;

/// Normalizes the inbound text, asks the primary provider, falls back to
/// the secondary, and finally degrades to an UNKNOWN intent so one flaky
/// upstream never drops a merchant's message.
pub struct IntentExtractionService {
    primary: Arc<dyn IntentProvider>,
    fallback: Arc<dyn IntentProvider>,
}

impl IntentExtractionService {
    pub fn new(primary: Arc<dyn IntentProvider>, fallback: Arc<dyn IntentProvider>) -> Self {
        Self { primary, fallback }
    }

    pub async fn extract(&self, text: &str) -> Intent {
        let normalized = normalize(text);
        if normalized != text {
            debug!(original = text, normalized = %normalized, "normalized inbound text");
        }

        let mut intent = match self.primary.extract_intent(&normalized).await {
            Ok(intent) => intent,
            Err(primary_error) => {
                warn!(
                    provider = self.primary.name(),
                    error = %primary_error,
                    "primary provider failed, trying fallback"
                );
                match self.fallback.extract_intent(&normalized).await {
                    Ok(intent) => {
                        info!(provider = self.fallback.name(), "fallback provider succeeded");
                        intent
                    }
                    Err(fallback_error) => {
                        warn!(
                            provider = self.fallback.name(),
                            error = %fallback_error,
                            "fallback provider also failed, degrading to UNKNOWN"
                        );
                        Intent::unknown(text)
                    }
                }
            }
        };

        // Callers always see the text the merchant actually sent.
        intent.raw_text = text.to_string();

        info!(
            action = intent.action.wire_name(),
            has_entities = !intent.entities.is_empty(),
            "intent extracted"
        );
        intent
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use lapak_core::{Entities, EntityValue, IntentAction, Language, Sentiment};

    use crate::provider::ProviderError;

    use super::*;

    struct FixedProvider {
        action: Option<IntentAction>,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn returning(action: IntentAction) -> Arc<Self> {
            Arc::new(Self { action: Some(action), calls: AtomicUsize::new(0) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { action: None, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl IntentProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn extract_intent(&self, text: &str) -> Result<Intent, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.action {
                Some(action) => {
                    let mut entities = Entities::new();
                    entities.insert("normalized_text", EntityValue::Text(text.to_string()));
                    Ok(Intent {
                        action,
                        entities,
                        sentiment: Sentiment::Neutral,
                        language: Language::Id,
                        raw_text: text.to_string(),
                    })
                }
                None => Err(ProviderError::Transport {
                    provider: "fixed",
                    message: "down".to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let primary = FixedProvider::returning(IntentAction::RecordSale);
        let fallback = FixedProvider::returning(IntentAction::Greeting);
        let service = IntentExtractionService::new(primary.clone(), fallback.clone());

        let intent = service.extract("tadi laku nasi 10 porsi").await;
        assert_eq!(intent.action, IntentAction::RecordSale);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fallback_serves_when_primary_fails() {
        let primary = FixedProvider::failing();
        let fallback = FixedProvider::returning(IntentAction::OrderRestock);
        let service = IntentExtractionService::new(primary, fallback);

        let intent = service.extract("cari beras 25 kg").await;
        assert_eq!(intent.action, IntentAction::OrderRestock);
    }

    #[tokio::test]
    async fn both_failing_degrades_to_unknown_with_original_text() {
        let service =
            IntentExtractionService::new(FixedProvider::failing(), FixedProvider::failing());

        let intent = service.extract("apalah ini").await;
        assert_eq!(intent.action, IntentAction::Unknown);
        assert_eq!(intent.raw_text, "apalah ini");
    }

    #[tokio::test]
    async fn providers_receive_normalized_text_but_raw_text_is_original() {
        let primary = FixedProvider::returning(IntentAction::RecordSale);
        let service =
            IntentExtractionService::new(primary, FixedProvider::failing());

        let intent = service.extract("laku nasi 15rb").await;
        assert_eq!(
            intent.entities.text("normalized_text"),
            Some("laku nasi 15000"),
        );
        assert_eq!(intent.raw_text, "laku nasi 15rb");
    }
}
