use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use lapak_core::config::ProviderEndpoint;
use lapak_core::Intent;

use crate::kolosal::{parse_intent_content, INTENT_SYSTEM_PROMPT};
use crate::provider::{IntentProvider, ProviderError};

const PROVIDER_NAME: &str = "gemini";

/// Gemini `generateContent` client. Unlike the OpenAI-style API the key
/// rides in the query string and the system prompt is folded into the
/// single user part.
#[derive(Clone)]
pub struct GeminiProvider {
    api_key: SecretString,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiError {
    code: u16,
    message: String,
}

impl GeminiProvider {
    pub fn new(endpoint: &ProviderEndpoint, api_key: SecretString, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            model: endpoint.model.clone(),
            client,
        }
    }
}

#[async_trait]
impl IntentProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn extract_intent(&self, text: &str) -> Result<Intent, ProviderError> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(ProviderError::NotConfigured { provider: PROVIDER_NAME });
        }

        let prompt = format!("{INTENT_SYSTEM_PROMPT}\n\nUser message: {text}");
        let request =
            GenerateRequest { contents: vec![Content { parts: vec![Part { text: prompt }] }] };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            self.api_key.expose_secret()
        );

        let response =
            self.client.post(&url).json(&request).send().await.map_err(|err| {
                ProviderError::Transport { provider: PROVIDER_NAME, message: err.to_string() }
            })?;

        let body = response.text().await.map_err(|err| ProviderError::Transport {
            provider: PROVIDER_NAME,
            message: err.to_string(),
        })?;

        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|err| ProviderError::Parse {
                provider: PROVIDER_NAME,
                message: err.to_string(),
            })?;

        if let Some(error) = parsed.error {
            // 429 and 403 mean this key is spent; the ring can try another.
            if error.code == 429 || error.code == 403 {
                return Err(ProviderError::RateLimited {
                    provider: PROVIDER_NAME,
                    code: error.code,
                    message: error.message,
                });
            }
            return Err(ProviderError::Rejected {
                provider: PROVIDER_NAME,
                message: error.message,
            });
        }

        let content = parsed
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.as_str())
            .ok_or(ProviderError::Parse {
                provider: PROVIDER_NAME,
                message: "response contained no candidates".to_string(),
            })?;

        Ok(parse_intent_content(content, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_shape_decodes_nested_candidates() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"action\":\"GREETING\",\"entities\":{},\"sentiment\":\"positive\",\"language\":\"id\"}"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).expect("shape should parse");

        let text = &parsed.candidates[0].content.parts[0].text;
        let intent = parse_intent_content(text, "halo");
        assert_eq!(intent.action, lapak_core::IntentAction::Greeting);
    }

    #[test]
    fn error_shape_decodes_code_and_message() {
        let body = r#"{"error":{"code":429,"message":"Resource has been exhausted"}}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).expect("shape should parse");

        let error = parsed.error.expect("error should be present");
        assert_eq!(error.code, 429);
        assert!(error.message.contains("exhausted"));
    }
}
