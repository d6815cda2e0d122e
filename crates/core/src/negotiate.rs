//! Deterministic multi-round price negotiation.
//!
//! Given a restock request, the engine discovers candidate sellers, picks the
//! cheapest one that can fill the order, and simulates a fixed three-round
//! bargain. There is no randomness anywhere: the same request against the
//! same catalogue always converges on the same price, which keeps the whole
//! protocol property-testable.
//!
//! The bargaining formula (buyer opens at 90% of budget, seller at 110% of
//! floor, settle at the clamped midpoint) is intentionally a fixed policy.
//! TODO: make the policy pluggable once a second bargaining strategy exists.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ports::SellerDirectory;

/// Sentinel for "no budget ceiling".
pub const NO_BUDGET_CEILING: f64 = 999_999_999.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    BuyerAgent,
    SellerAgent,
    System,
}

/// One line of the negotiation transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NegotiationMessage {
    pub role: Role,
    pub content: String,
    /// RFC 3339 timestamp.
    pub time: String,
}

impl NegotiationMessage {
    fn now(role: Role, content: String) -> Self {
        Self { role, content, time: Utc::now().to_rfc3339() }
    }
}

/// A seller able to supply a product, as sourced from the record store or
/// the demo catalogue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SellerCandidate {
    pub seller_id: String,
    pub name: String,
    pub product_name: String,
    pub stock_qty: f64,
    pub min_price: f64,
}

/// What the buyer asked for. `normalized` applies the defaulting rules.
#[derive(Clone, Debug, PartialEq)]
pub struct NegotiationRequest {
    pub product: String,
    pub qty: f64,
    pub max_price: f64,
}

impl NegotiationRequest {
    pub fn normalized(mut self) -> Self {
        if self.qty <= 0.0 {
            self.qty = 1.0;
        }
        if self.max_price <= 0.0 {
            self.max_price = NO_BUDGET_CEILING;
        }
        self
    }
}

/// Outcome of one negotiation call. Failure is a normal structured result,
/// never an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NegotiationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_name: Option<String>,
    pub product_name: String,
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    pub messages: Vec<NegotiationMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl NegotiationResult {
    fn opened(request: &NegotiationRequest) -> Self {
        let opening = if request.max_price >= NO_BUDGET_CEILING {
            format!("Mencari {} {:.0} unit, tanpa batas budget", request.product, request.qty)
        } else {
            format!(
                "Mencari {} {:.0} unit, budget maksimal Rp {:.0}/unit",
                request.product, request.qty, request.max_price
            )
        };

        Self {
            success: false,
            final_price: None,
            seller_id: None,
            seller_name: None,
            product_name: request.product.clone(),
            quantity: request.qty,
            total_amount: None,
            messages: vec![NegotiationMessage::now(Role::BuyerAgent, opening)],
            error_message: None,
        }
    }

    fn fail(mut self, system_note: String, reason: &str) -> Self {
        self.messages.push(NegotiationMessage::now(Role::System, system_note));
        self.error_message = Some(reason.to_string());
        self
    }
}

/// Runs seller discovery, selection, and the bargaining rounds.
pub struct NegotiationEngine<D> {
    directory: D,
}

impl<D: SellerDirectory> NegotiationEngine<D> {
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    pub async fn negotiate(&self, request: NegotiationRequest) -> NegotiationResult {
        let request = request.normalized();
        let mut result = NegotiationResult::opened(&request);

        let candidates = self.discover(&request).await;
        if candidates.is_empty() {
            return result.fail(
                format!("Tidak ditemukan penjual untuk {}", request.product),
                "Tidak ada penjual yang tersedia",
            );
        }

        let Some(seller) = best_seller(&candidates, request.max_price, request.qty) else {
            return result.fail(
                "Tidak ada penjual yang sesuai budget".to_string(),
                "Harga penjual melebihi budget",
            );
        };

        match bargain(&mut result, seller, request.max_price, request.qty) {
            Some(final_price) => {
                let total = final_price * request.qty;
                result.success = true;
                result.final_price = Some(final_price);
                result.seller_id = Some(seller.seller_id.clone());
                result.seller_name = Some(seller.name.clone());
                result.total_amount = Some(total);
                result.messages.push(NegotiationMessage::now(
                    Role::System,
                    format!(
                        "✅ Deal! Harga final Rp {final_price:.0}/unit. Total Rp {total:.0} untuk {:.0} unit",
                        request.qty
                    ),
                ));
                result
            }
            None => {
                result.error_message = Some("Negosiasi gagal".to_string());
                result
            }
        }
    }

    /// Record-store lookup with the static demo catalogue as fallback. Store
    /// unavailability is a degraded path, never a failure.
    async fn discover(&self, request: &NegotiationRequest) -> Vec<SellerCandidate> {
        let from_store = match self
            .directory
            .find_sellers(&request.product, request.max_price)
            .await
        {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(
                    event_name = "negotiate.seller_lookup_failed",
                    product = %request.product,
                    error = %error,
                    "seller directory unavailable, using demo catalogue"
                );
                Vec::new()
            }
        };

        if from_store.is_empty() {
            demo_catalogue(&request.product)
        } else {
            from_store
        }
    }
}

/// Cheapest seller with enough stock inside the budget; ties keep the first
/// one encountered.
fn best_seller(candidates: &[SellerCandidate], max_price: f64, qty: f64) -> Option<&SellerCandidate> {
    let mut best: Option<&SellerCandidate> = None;

    for candidate in candidates {
        if candidate.min_price > max_price || candidate.stock_qty < qty {
            continue;
        }
        match best {
            Some(current) if candidate.min_price >= current.min_price => {}
            _ => best = Some(candidate),
        }
    }

    best
}

/// The fixed three-round exchange: seller asks 110% of floor, buyer offers
/// 90% of budget, they settle at the midpoint clamped up to the floor.
fn bargain(
    result: &mut NegotiationResult,
    seller: &SellerCandidate,
    max_price: f64,
    qty: f64,
) -> Option<f64> {
    let ask = seller.min_price * 1.10;
    let offer = max_price * 0.90;

    result.messages.push(NegotiationMessage::now(
        Role::SellerAgent,
        format!(
            "[{}] Stok tersedia {:.0} unit. Harga Rp {ask:.0}/unit",
            seller.name, seller.stock_qty
        ),
    ));
    result.messages.push(NegotiationMessage::now(
        Role::BuyerAgent,
        format!("Bisa Rp {offer:.0}/unit? Saya ambil {qty:.0} unit"),
    ));

    let mid = ((offer + ask) / 2.0).max(seller.min_price);
    result.messages.push(NegotiationMessage::now(
        Role::SellerAgent,
        format!("[{}] Untuk {qty:.0} unit, bisa Rp {mid:.0}/unit", seller.name),
    ));

    if mid >= seller.min_price && mid <= max_price {
        result
            .messages
            .push(NegotiationMessage::now(Role::BuyerAgent, format!("Deal! Rp {mid:.0}/unit")));
        Some(mid)
    } else {
        None
    }
}

/// In-memory catalogue used when the record store has no matching sellers or
/// is unreachable. Exact product match first, then substring in either
/// direction.
pub fn demo_catalogue(product: &str) -> Vec<SellerCandidate> {
    let catalogue: [(&str, &[SellerCandidate]); 3] = [
        (
            "beras",
            &[
                seller("22222222-2222-2222-2222-222222222222", "Pak Joyo", "Beras Premium", 500.0, 11500.0),
                seller("55555555-5555-5555-5555-555555555555", "Pak Budi", "Beras Premium", 200.0, 12000.0),
            ],
        ),
        (
            "cabai",
            &[seller("33333333-3333-3333-3333-333333333333", "Mang Ujang", "Cabai Merah", 20.0, 45000.0)],
        ),
        (
            "telur",
            &[seller("44444444-4444-4444-4444-444444444444", "Bu Ani", "Telur Ayam", 100.0, 2200.0)],
        ),
    ];

    let product = product.trim().to_lowercase();

    if let Some((_, sellers)) = catalogue.iter().find(|(key, _)| *key == product) {
        return sellers.to_vec();
    }

    catalogue
        .iter()
        .find(|(key, _)| product.contains(key) || key.contains(product.as_str()))
        .map(|(_, sellers)| sellers.to_vec())
        .unwrap_or_default()
}

fn seller(id: &str, name: &str, product: &str, stock: f64, min_price: f64) -> SellerCandidate {
    SellerCandidate {
        seller_id: id.to_string(),
        name: name.to_string(),
        product_name: product.to_string(),
        stock_qty: stock,
        min_price,
    }
}
