use async_trait::async_trait;
use tokio::sync::Mutex;

use lapak_core::negotiate::{demo_catalogue, SellerCandidate};
use lapak_core::ports::{
    NewNegotiationLog, NewTransaction, RecordStore, SellerDirectory, StockLevel, StoreError,
};

/// In-process store for demo mode and tests. Writes are kept so tests can
/// assert on them; seller discovery serves the demo catalogue.
#[derive(Default)]
pub struct MemoryStore {
    transactions: Mutex<Vec<NewTransaction>>,
    negotiation_logs: Mutex<Vec<NewNegotiationLog>>,
    stock: Mutex<Vec<(String, StockLevel)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_stock(&self, user_id: &str, level: StockLevel) {
        self.stock.lock().await.push((user_id.to_string(), level));
    }

    pub async fn transactions(&self) -> Vec<NewTransaction> {
        self.transactions.lock().await.clone()
    }

    pub async fn negotiation_logs(&self) -> Vec<NewNegotiationLog> {
        self.negotiation_logs.lock().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_transaction(&self, transaction: NewTransaction) -> Result<(), StoreError> {
        self.transactions.lock().await.push(transaction);
        Ok(())
    }

    async fn create_negotiation_log(&self, log: NewNegotiationLog) -> Result<(), StoreError> {
        self.negotiation_logs.lock().await.push(log);
        Ok(())
    }

    async fn stock_level(
        &self,
        user_id: &str,
        product: &str,
    ) -> Result<Option<StockLevel>, StoreError> {
        let needle = product.to_lowercase();
        let stock = self.stock.lock().await;
        Ok(stock
            .iter()
            .find(|(owner, level)| {
                owner == user_id && level.product_name.to_lowercase().contains(&needle)
            })
            .map(|(_, level)| level.clone()))
    }
}

#[async_trait]
impl SellerDirectory for MemoryStore {
    async fn find_sellers(
        &self,
        product: &str,
        max_price: f64,
    ) -> Result<Vec<SellerCandidate>, StoreError> {
        Ok(demo_catalogue(product)
            .into_iter()
            .filter(|candidate| candidate.min_price <= max_price)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use lapak_core::ports::TransactionKind;

    use super::*;

    #[tokio::test]
    async fn writes_are_retained_in_order() {
        let store = MemoryStore::new();
        for (product, total) in [("nasi", 150000.0), ("gas", 22000.0)] {
            store
                .create_transaction(NewTransaction {
                    user_id: "u-1".to_string(),
                    kind: TransactionKind::Sale,
                    product_name: product.to_string(),
                    qty: 1.0,
                    price_per_unit: total,
                    total_amount: total,
                    raw_text: String::new(),
                })
                .await
                .expect("memory writes cannot fail");
        }

        let recorded = store.transactions().await;
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].product_name, "nasi");
        assert_eq!(recorded[1].product_name, "gas");
    }

    #[tokio::test]
    async fn stock_lookup_matches_by_owner_and_substring() {
        let store = MemoryStore::new();
        store
            .seed_stock(
                "u-1",
                StockLevel {
                    product_name: "Telur Ayam".to_string(),
                    stock_qty: 100.0,
                    unit: "butir".to_string(),
                    min_sell_price: 2200.0,
                },
            )
            .await;

        let hit = store.stock_level("u-1", "telur").await.expect("lookup works");
        assert_eq!(hit.map(|level| level.stock_qty), Some(100.0));

        let other_user = store.stock_level("u-2", "telur").await.expect("lookup works");
        assert!(other_user.is_none());
    }

    #[tokio::test]
    async fn seller_discovery_respects_budget() {
        let store = MemoryStore::new();

        let affordable = store.find_sellers("beras", 12000.0).await.expect("discovery works");
        assert_eq!(affordable.len(), 2);

        let tight = store.find_sellers("beras", 11600.0).await.expect("discovery works");
        assert_eq!(tight.len(), 1);
        assert_eq!(tight[0].name, "Pak Joyo");
    }
}
