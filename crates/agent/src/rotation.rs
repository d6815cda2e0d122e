use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use lapak_core::Intent;

use crate::provider::{IntentProvider, ProviderError};

/// Parses a comma-separated key list into individual secrets, dropping
/// blanks. List order is rotation order.
#[derive(Clone, Default)]
pub struct KeyRing {
    keys: Vec<SecretString>,
}

impl KeyRing {
    pub fn parse(raw: &SecretString) -> Self {
        let keys = raw
            .expose_secret()
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| SecretString::from(key.to_string()))
            .collect::<Vec<_>>();
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SecretString> {
        self.keys.iter()
    }
}

/// Round-robin decorator over one provider instance per API key.
///
/// On a transport or decode failure the next key is tried immediately; on a
/// rate-limit failure the rotation pauses for `attempt * backoff_base`
/// first. Any other failure is final. When every key has been tried the
/// last error is surfaced as [`ProviderError::Exhausted`].
pub struct RotatingProvider {
    name: &'static str,
    replicas: Vec<Arc<dyn IntentProvider>>,
    cursor: AtomicUsize,
    backoff_base: Duration,
}

impl RotatingProvider {
    pub fn new(
        name: &'static str,
        replicas: Vec<Arc<dyn IntentProvider>>,
        backoff_base: Duration,
    ) -> Self {
        if replicas.len() > 1 {
            info!(provider = name, keys = replicas.len(), "loaded API keys for rotation");
        }
        Self { name, replicas, cursor: AtomicUsize::new(0), backoff_base }
    }

    fn current(&self) -> usize {
        self.cursor.load(Ordering::Acquire) % self.replicas.len().max(1)
    }

    fn rotate(&self) {
        if self.replicas.len() <= 1 {
            return;
        }
        let from = self.current();
        let to = (from + 1) % self.replicas.len();
        self.cursor.store(to, Ordering::Release);
        warn!(provider = self.name, from, to, total = self.replicas.len(), "rotating API key");
    }
}

#[async_trait]
impl IntentProvider for RotatingProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn extract_intent(&self, text: &str) -> Result<Intent, ProviderError> {
        if self.replicas.is_empty() {
            return Err(ProviderError::NotConfigured { provider: self.name });
        }

        let max_attempts = self.replicas.len();
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..max_attempts {
            let replica = &self.replicas[self.current()];

            match replica.extract_intent(text).await {
                Ok(intent) => {
                    if attempt > 0 {
                        info!(
                            provider = self.name,
                            retries = attempt,
                            "intent extraction succeeded after key rotation"
                        );
                    }
                    return Ok(intent);
                }
                Err(error) if error.is_rotatable() => {
                    warn!(
                        provider = self.name,
                        attempt = attempt + 1,
                        max_attempts,
                        error = %error,
                        "provider attempt failed"
                    );
                    let backoff = error.wants_backoff();
                    self.rotate();
                    if backoff {
                        tokio::time::sleep(self.backoff_base * (attempt as u32 + 1)).await;
                    }
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        warn!(provider = self.name, keys = max_attempts, "all API keys exhausted");
        Err(ProviderError::Exhausted {
            provider: self.name,
            attempts: max_attempts,
            last: Box::new(
                last_error.unwrap_or(ProviderError::NotConfigured { provider: self.name }),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use lapak_core::IntentAction;

    use super::*;

    #[derive(Clone, Copy)]
    enum Outcome {
        Succeed,
        FailTransport,
        FailRejected,
    }

    struct ScriptedReplica {
        outcome: Outcome,
        calls: AtomicUsize,
    }

    impl ScriptedReplica {
        fn with_outcome(outcome: Outcome) -> Self {
            Self { outcome, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl IntentProvider for ScriptedReplica {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn extract_intent(&self, _text: &str) -> Result<Intent, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Succeed => Ok(Intent::unknown("ok")),
                Outcome::FailTransport => Err(ProviderError::Transport {
                    provider: "scripted",
                    message: "connection reset".to_string(),
                }),
                Outcome::FailRejected => Err(ProviderError::Rejected {
                    provider: "scripted",
                    message: "malformed request".to_string(),
                }),
            }
        }
    }

    #[test]
    fn key_ring_splits_and_trims() {
        let ring = KeyRing::parse(&SecretString::from("k1, k2 ,,k3".to_string()));
        assert_eq!(ring.len(), 3);

        let keys: Vec<_> = ring.iter().map(|key| key.expose_secret().to_string()).collect();
        assert_eq!(keys, vec!["k1", "k2", "k3"]);
    }

    #[test]
    fn empty_ring_from_blank_input() {
        assert!(KeyRing::parse(&SecretString::from("  ".to_string())).is_empty());
    }

    #[tokio::test]
    async fn rotates_past_a_dead_key() {
        let provider = RotatingProvider::new(
            "scripted",
            vec![
                Arc::new(ScriptedReplica::with_outcome(Outcome::FailTransport)),
                Arc::new(ScriptedReplica::with_outcome(Outcome::Succeed)),
            ],
            Duration::from_millis(1),
        );

        let intent = provider.extract_intent("halo").await.expect("second key should serve");
        assert_eq!(intent.action, IntentAction::Unknown);
    }

    #[tokio::test]
    async fn exhausts_after_every_key_fails() {
        let provider = RotatingProvider::new(
            "scripted",
            vec![
                Arc::new(ScriptedReplica::with_outcome(Outcome::FailTransport)),
                Arc::new(ScriptedReplica::with_outcome(Outcome::FailTransport)),
            ],
            Duration::from_millis(1),
        );

        let error = provider.extract_intent("halo").await.expect_err("all keys fail");
        assert!(matches!(error, ProviderError::Exhausted { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn rejection_is_final_without_rotation() {
        let succeeding = Arc::new(ScriptedReplica::with_outcome(Outcome::Succeed));
        let provider = RotatingProvider::new(
            "scripted",
            vec![
                Arc::new(ScriptedReplica::with_outcome(Outcome::FailRejected)),
                succeeding.clone(),
            ],
            Duration::from_millis(1),
        );

        let error = provider.extract_intent("halo").await.expect_err("rejection is final");
        assert!(matches!(error, ProviderError::Rejected { .. }));
        assert_eq!(succeeding.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_replica_set_reports_not_configured() {
        let provider = RotatingProvider::new("scripted", Vec::new(), Duration::from_millis(1));
        let error = provider.extract_intent("halo").await.expect_err("no keys");
        assert!(matches!(error, ProviderError::NotConfigured { .. }));
    }
}
