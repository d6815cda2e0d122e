use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use lapak_core::config::ProviderEndpoint;
use lapak_core::Intent;

use crate::provider::{IntentProvider, ProviderError};

pub(crate) const INTENT_SYSTEM_PROMPT: &str = r#"You are an Intent Extraction Engine for Lapak, a conversational business assistant for Indonesian UMKM (small businesses).

Your task is to analyze informal Indonesian/Javanese/Sundanese text and extract structured intent.

IMPORTANT: Always respond with valid JSON only, no other text.

Available intents:
- ORDER_RESTOCK: User wants to order/buy supplies (e.g., "cari beras 25 kilo", "butuh minyak goreng")
- RECORD_SALE: User recording a sale transaction (e.g., "tadi laku nasi 10 porsi", "payu bakso 5 mangkok")
- RECORD_EXPENSE: User recording an expense (e.g., "beli gas 2 tabung", "bayar listrik")
- REQUEST_PROMO: User wants promotional content (e.g., "buatkan promosi", "mau bikin iklan")
- ASK_MARKET: User asking about market/price info (e.g., "harga cabai berapa", "tren harga beras")
- CHECK_STOCK: User checking inventory (e.g., "stok beras berapa", "sisa telur ada berapa")
- GREETING: Simple greeting (e.g., "halo", "selamat pagi")
- UNKNOWN: Cannot determine intent

Response format:
{
  "action": "INTENT_NAME",
  "entities": {
    "product": "product name if mentioned",
    "qty": number if mentioned,
    "unit": "kg/liter/porsi/etc if mentioned",
    "price": number if mentioned,
    "max_price": number if budget mentioned,
    "time": "delivery time if mentioned"
  },
  "sentiment": "positive/negative/neutral",
  "language": "id/jv/su (detected language)"
}

Examples:
Input: "Mas, cari beras 25 kilo maksimal 12 ribu ya"
Output: {"action":"ORDER_RESTOCK","entities":{"product":"beras","qty":25,"unit":"kg","max_price":12000},"sentiment":"neutral","language":"id"}

Input: "Tadi laku nasi rames limolas porsi, rolas ewu siji"
Output: {"action":"RECORD_SALE","entities":{"product":"nasi rames","qty":15,"unit":"porsi","price":12000},"sentiment":"positive","language":"jv"}

Input: "Halo mas"
Output: {"action":"GREETING","entities":{},"sentiment":"positive","language":"id"}"#;

const PROVIDER_NAME: &str = "kolosal";

/// OpenAI-compatible chat-completions client for the Kolosal API.
#[derive(Clone)]
pub struct KolosalProvider {
    api_key: SecretString,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

impl KolosalProvider {
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
impl IntentProvider for KolosalProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn extract_intent(&self, text: &str) -> Result<Intent, ProviderError> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(ProviderError::NotConfigured { provider: PROVIDER_NAME });
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: INTENT_SYSTEM_PROMPT },
                ChatMessage { role: "user", content: text },
            ],
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|err| ProviderError::Transport {
                provider: PROVIDER_NAME,
                message: err.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| ProviderError::Transport {
            provider: PROVIDER_NAME,
            message: err.to_string(),
        })?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::RateLimited {
                provider: PROVIDER_NAME,
                code: status.as_u16(),
                message: body,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|err| ProviderError::Parse {
                provider: PROVIDER_NAME,
                message: err.to_string(),
            })?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::Rejected {
                provider: PROVIDER_NAME,
                message: error.message,
            });
        }

        let content = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or(ProviderError::Parse {
                provider: PROVIDER_NAME,
                message: "response contained no choices".to_string(),
            })?;

        Ok(parse_intent_content(content, text))
    }
}

/// Decodes the model's JSON payload. A malformed payload degrades to
/// UNKNOWN rather than failing the whole pipeline; the upstream call
/// itself succeeded at that point.
pub(crate) fn parse_intent_content(content: &str, raw_text: &str) -> Intent {
    let cleaned = strip_markdown_fences(content);
    match serde_json::from_str::<Intent>(cleaned) {
        Ok(mut intent) => {
            intent.raw_text = raw_text.to_string();
            intent
        }
        Err(_) => Intent::unknown(raw_text),
    }
}

pub(crate) fn strip_markdown_fences(content: &str) -> &str {
    let mut cleaned = content.trim();
    for prefix in ["```json", "```"] {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest;
            break;
        }
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

#[cfg(test)]
mod tests {
    use lapak_core::IntentAction;

    use super::*;

    #[test]
    fn valid_payload_keeps_original_raw_text() {
        let content = r#"{"action":"ORDER_RESTOCK","entities":{"product":"beras","qty":25,"max_price":12000},"sentiment":"neutral","language":"id"}"#;
        let intent = parse_intent_content(content, "cari beras 25 kg maksimal 12 ribu");

        assert_eq!(intent.action, IntentAction::OrderRestock);
        assert_eq!(intent.entities.text("product"), Some("beras"));
        assert_eq!(intent.raw_text, "cari beras 25 kg maksimal 12 ribu");
    }

    #[test]
    fn null_entity_values_do_not_degrade_a_classified_message() {
        let content = r#"{"action":"RECORD_SALE","entities":{"product":"nasi","qty":10,"time":null},"sentiment":"neutral","language":"id"}"#;
        let intent = parse_intent_content(content, "tadi laku nasi 10 porsi");

        assert_eq!(intent.action, IntentAction::RecordSale);
        assert_eq!(intent.entities.number("qty"), Some(10.0));
    }

    #[test]
    fn garbage_payload_degrades_to_unknown() {
        let intent = parse_intent_content("I am not JSON, sorry", "halo");
        assert_eq!(intent.action, IntentAction::Unknown);
        assert_eq!(intent.raw_text, "halo");
    }

    #[test]
    fn fenced_payload_is_unwrapped() {
        let content = "```json\n{\"action\":\"GREETING\",\"entities\":{},\"sentiment\":\"positive\",\"language\":\"id\"}\n```";
        let intent = parse_intent_content(content, "halo mas");
        assert_eq!(intent.action, IntentAction::Greeting);
    }

    #[test]
    fn fence_without_language_tag_is_unwrapped() {
        let content = "```\n{\"action\":\"CHECK_STOCK\",\"entities\":{\"product\":\"telur\"},\"sentiment\":\"neutral\",\"language\":\"id\"}\n```";
        let intent = parse_intent_content(content, "stok telur berapa");
        assert_eq!(intent.action, IntentAction::CheckStock);
    }
}
