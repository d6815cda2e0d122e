use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use lapak_core::negotiate::SellerCandidate;
use lapak_core::ports::{
    NewNegotiationLog, NewTransaction, RecordStore, SellerDirectory, StockLevel, StoreError,
};

/// PostgREST-style HTTP client for the record store. Every table lives
/// under `/rest/v1/` and the service key rides in both the `apikey`
/// header and the bearer token.
#[derive(Clone)]
pub struct RestStore {
    base_url: String,
    service_key: SecretString,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct InventoryRow {
    user_id: String,
    product_name: String,
    stock_qty: f64,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    min_sell_price: f64,
    #[serde(default)]
    users: Option<SellerRef>,
}

#[derive(Debug, Deserialize)]
struct SellerRef {
    #[serde(default)]
    name: String,
}

impl RestStore {
    pub fn new(base_url: &str, service_key: SecretString, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { base_url: base_url.trim_end_matches('/').to_string(), service_key, client }
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", self.service_key.expose_secret())
            .bearer_auth(self.service_key.expose_secret())
            .header("Prefer", "return=representation")
    }

    async fn insert<T: serde::Serialize>(&self, table: &str, row: &T) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.post(self.endpoint(table)))
            .json(row)
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        check_status(response).await.map(|_| ())
    }

    async fn select<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let response = self
            .authorized(self.client.get(self.endpoint(table)).query(filters))
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        let body = check_status(response).await?;
        decode_body(&body)
    }

    /// Quick reachability probe against the REST root. Used by `doctor`.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.get(format!("{}/rest/v1/", self.base_url)))
            .send()
            .await
            .map_err(|err| StoreError::Transport(err.to_string()))?;

        check_status(response).await.map(|_| ())
    }
}

async fn check_status(response: reqwest::Response) -> Result<String, StoreError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| StoreError::Transport(err.to_string()))?;

    classify_response(status, body)
}

fn classify_response(status: reqwest::StatusCode, body: String) -> Result<String, StoreError> {
    if status.is_client_error() || status.is_server_error() {
        return Err(StoreError::Api { status: status.as_u16(), body });
    }
    Ok(body)
}

fn decode_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, StoreError> {
    serde_json::from_str(body).map_err(|err| StoreError::Decode(err.to_string()))
}

#[async_trait]
impl RecordStore for RestStore {
    async fn create_transaction(&self, transaction: NewTransaction) -> Result<(), StoreError> {
        debug!(product = %transaction.product_name, "inserting transaction row");
        self.insert("transactions", &transaction).await
    }

    async fn create_negotiation_log(&self, log: NewNegotiationLog) -> Result<(), StoreError> {
        debug!(product = %log.product_name, "inserting negotiation log row");
        self.insert("negotiation_logs", &log).await
    }

    async fn stock_level(
        &self,
        user_id: &str,
        product: &str,
    ) -> Result<Option<StockLevel>, StoreError> {
        let rows: Vec<InventoryRow> = self
            .select(
                "inventory",
                &[
                    ("user_id", format!("eq.{user_id}")),
                    ("product_name", format!("ilike.*{product}*")),
                    ("select", "user_id,product_name,stock_qty,unit,min_sell_price".to_string()),
                ],
            )
            .await?;

        Ok(rows.into_iter().next().map(|row| StockLevel {
            product_name: row.product_name,
            stock_qty: row.stock_qty,
            unit: row.unit,
            min_sell_price: row.min_sell_price,
        }))
    }
}

#[async_trait]
impl SellerDirectory for RestStore {
    async fn find_sellers(
        &self,
        product: &str,
        max_price: f64,
    ) -> Result<Vec<SellerCandidate>, StoreError> {
        let rows: Vec<InventoryRow> = self
            .select(
                "inventory",
                &[
                    ("product_name", format!("ilike.*{product}*")),
                    ("stock_qty", "gt.0".to_string()),
                    ("min_sell_price", format!("lte.{max_price}")),
                    (
                        "select",
                        "user_id,product_name,stock_qty,unit,min_sell_price,users(name)"
                            .to_string(),
                    ),
                ],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let name = row
                    .users
                    .map(|seller| seller.name)
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| "Penjual".to_string());
                SellerCandidate {
                    seller_id: row.user_id,
                    name,
                    product_name: row.product_name,
                    stock_qty: row.stock_qty,
                    min_price: row.min_sell_price,
                }
            })
            .collect())
    }
}
