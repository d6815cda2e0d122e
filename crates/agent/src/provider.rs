use async_trait::async_trait;
use thiserror::Error;

use lapak_core::Intent;

/// A single upstream AI endpoint that turns free text into a structured
/// intent. Implementations must be cheap to clone behind an `Arc` and safe
/// to call concurrently.
#[async_trait]
pub trait IntentProvider: Send + Sync {
    /// Short stable name used in logs (`kolosal`, `gemini`).
    fn name(&self) -> &'static str;

    async fn extract_intent(&self, text: &str) -> Result<Intent, ProviderError>;
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no API key configured for {provider}")]
    NotConfigured { provider: &'static str },
    #[error("transport failure talking to {provider}: {message}")]
    Transport { provider: &'static str, message: String },
    #[error("{provider} returned an undecodable response: {message}")]
    Parse { provider: &'static str, message: String },
    #[error("{provider} rate limited or quota exhausted (code {code}): {message}")]
    RateLimited { provider: &'static str, code: u16, message: String },
    #[error("{provider} rejected the request: {message}")]
    Rejected { provider: &'static str, message: String },
    #[error("all {attempts} API keys exhausted for {provider}: {last}")]
    Exhausted { provider: &'static str, attempts: usize, last: Box<ProviderError> },
    #[error("circuit breaker open for {provider}")]
    CircuitOpen { provider: &'static str },
}

impl ProviderError {
    /// Rotation-worthy failures: the next key in the ring may still work.
    pub fn is_rotatable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Parse { .. } | Self::RateLimited { .. }
        )
    }

    /// Rate-limit style failures additionally get a short backoff before
    /// the next key is tried.
    pub fn wants_backoff(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_rate_limit_are_rotatable() {
        let transport =
            ProviderError::Transport { provider: "kolosal", message: "timeout".to_string() };
        let limited = ProviderError::RateLimited {
            provider: "gemini",
            code: 429,
            message: "quota".to_string(),
        };
        let rejected =
            ProviderError::Rejected { provider: "gemini", message: "bad request".to_string() };

        assert!(transport.is_rotatable());
        assert!(limited.is_rotatable());
        assert!(limited.wants_backoff());
        assert!(!transport.wants_backoff());
        assert!(!rejected.is_rotatable());
    }
}
