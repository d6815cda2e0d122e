//! Interfaces to the persistence collaborator (a REST record store).
//!
//! The pipeline only ever talks to these traits; `lapak-store` provides the
//! HTTP implementation and an in-memory one for tests and demo mode.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::negotiate::SellerCandidate;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store request failed: {0}")]
    Transport(String),
    #[error("record store returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("record store response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    #[serde(rename = "SALE")]
    Sale,
    #[serde(rename = "PURCHASE")]
    Purchase,
    #[serde(rename = "EXPENSE")]
    Expense,
}

/// A ledger row to append. Mirrors the record store's `transactions` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub product_name: String,
    pub qty: f64,
    pub price_per_unit: f64,
    pub total_amount: f64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub raw_text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
}

/// Audit entry for one finished negotiation, transcript included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewNegotiationLog {
    pub buyer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<String>,
    pub product_name: String,
    pub initial_offer: f64,
    pub final_price: f64,
    pub status: NegotiationStatus,
    pub transcript: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_name: String,
    pub stock_qty: f64,
    pub unit: String,
    pub min_sell_price: f64,
}

/// Seller discovery for the negotiation engine.
#[async_trait]
pub trait SellerDirectory: Send + Sync {
    /// Candidates offering `product` at or under `max_price` per unit.
    async fn find_sellers(
        &self,
        product: &str,
        max_price: f64,
    ) -> Result<Vec<SellerCandidate>, StoreError>;
}

#[async_trait]
impl<T: SellerDirectory + ?Sized> SellerDirectory for std::sync::Arc<T> {
    async fn find_sellers(
        &self,
        product: &str,
        max_price: f64,
    ) -> Result<Vec<SellerCandidate>, StoreError> {
        (**self).find_sellers(product, max_price).await
    }
}

/// Write-side of the record store, plus the one read the orchestrator needs.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_transaction(&self, transaction: NewTransaction) -> Result<(), StoreError>;

    async fn create_negotiation_log(&self, log: NewNegotiationLog) -> Result<(), StoreError>;

    async fn stock_level(
        &self,
        user_id: &str,
        product: &str,
    ) -> Result<Option<StockLevel>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_serializes_with_wire_field_names() {
        let transaction = NewTransaction {
            user_id: "u-1".to_string(),
            kind: TransactionKind::Sale,
            product_name: "nasi goreng".to_string(),
            qty: 10.0,
            price_per_unit: 15000.0,
            total_amount: 150000.0,
            raw_text: "tadi laku nasi 10 porsi".to_string(),
        };

        let json = serde_json::to_value(&transaction).expect("serializable");
        assert_eq!(json["type"], "SALE");
        assert_eq!(json["price_per_unit"], 15000.0);
    }

    #[test]
    fn empty_raw_text_is_omitted() {
        let transaction = NewTransaction {
            user_id: "u-1".to_string(),
            kind: TransactionKind::Expense,
            product_name: "listrik".to_string(),
            qty: 1.0,
            price_per_unit: 200000.0,
            total_amount: 200000.0,
            raw_text: String::new(),
        };

        let json = serde_json::to_value(&transaction).expect("serializable");
        assert!(json.get("raw_text").is_none());
    }
}
