use thiserror::Error;

use crate::config::ConfigError;
use crate::ports::StoreError;

/// Failures that can reach the orchestrator. None of these ever surface to
/// the merchant as-is; the pipeline degrades to a localized apology instead.
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// The only error text a merchant ever sees.
    pub fn user_message(&self) -> &'static str {
        "Maaf, ada kendala teknis. Coba lagi ya!"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_failure_maps_to_localized_apology() {
        let error = ApplicationError::from(StoreError::Transport("timeout".to_string()));
        assert_eq!(error.user_message(), "Maaf, ada kendala teknis. Coba lagi ya!");
    }
}
