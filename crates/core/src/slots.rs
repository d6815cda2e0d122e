//! Required-slot rules per intent and the clarifying questions asked when a
//! slot is missing. "First missing wins": the resolver only ever reports one
//! missing slot at a time, in declared order.

use crate::intent::{Entities, EntityValue, IntentAction};
use crate::normalize::normalize_price;

pub const SLOT_PRODUCT: &str = "product";
pub const SLOT_QTY: &str = "qty";
pub const SLOT_PRICE: &str = "price";
pub const SLOT_MAX_PRICE: &str = "max_price";

/// Ordered required slots for an action. Actions that take no slot filling
/// return an empty list.
pub fn required_slots(action: IntentAction) -> &'static [&'static str] {
    match action {
        IntentAction::RecordSale => &[SLOT_PRODUCT, SLOT_QTY, SLOT_PRICE],
        IntentAction::RecordExpense => &[SLOT_PRODUCT, SLOT_PRICE],
        IntentAction::OrderRestock => &[SLOT_PRODUCT, SLOT_QTY, SLOT_MAX_PRICE],
        IntentAction::CheckStock => &[SLOT_PRODUCT],
        _ => &[],
    }
}

/// The first required slot not yet present in `entities`, checked in
/// declared order. Numeric slots count as missing when absent or non-positive
/// (providers emit 0 for "not mentioned").
pub fn first_missing(action: IntentAction, entities: &Entities) -> Option<&'static str> {
    required_slots(action).iter().copied().find(|slot| !slot_filled(slot, entities))
}

fn slot_filled(slot: &str, entities: &Entities) -> bool {
    match slot {
        SLOT_PRODUCT => entities.text(SLOT_PRODUCT).is_some(),
        _ => entities.number(slot).map(|value| value > 0.0).unwrap_or(false),
    }
}

/// A clarifying question plus example answers for one missing slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotPrompt {
    pub question: String,
    pub suggestions: Vec<String>,
}

/// Localized question for `slot`, with up to 4 example answers. Known
/// entities (usually the product) are woven into the question text.
pub fn prompt_for(action: IntentAction, slot: &str, entities: &Entities) -> SlotPrompt {
    let product = entities.text(SLOT_PRODUCT).unwrap_or_default();

    let (question, suggestions): (String, &[&str]) = match (action, slot) {
        (IntentAction::RecordSale, SLOT_PRODUCT) => (
            "Produk apa yang dijual?".to_string(),
            &["Nasi Goreng", "Ayam Geprek", "Es Teh"],
        ),
        (IntentAction::RecordSale, SLOT_QTY) => (
            format!("Berapa porsi {product} yang terjual?"),
            &["5 porsi", "10 porsi", "15 porsi", "20 porsi"],
        ),
        (IntentAction::RecordSale, SLOT_PRICE) => (
            format!("Harga {product} berapa per porsi?"),
            &["Rp 10.000", "Rp 15.000", "Rp 20.000", "Rp 25.000"],
        ),
        (IntentAction::RecordExpense, SLOT_PRODUCT) => {
            ("Pengeluaran untuk apa?".to_string(), &["Listrik", "Gas", "Wifi", "Gaji"])
        }
        (IntentAction::RecordExpense, SLOT_PRICE) => (
            format!("Biaya {product} berapa?"),
            &["Rp 50.000", "Rp 100.000", "Rp 200.000"],
        ),
        (IntentAction::OrderRestock, SLOT_PRODUCT) => (
            "Mau pesan produk apa?".to_string(),
            &["Beras", "Minyak Goreng", "Telur", "Gula"],
        ),
        (IntentAction::OrderRestock, SLOT_QTY) => (
            format!("Berapa kg {product} yang dibutuhkan?"),
            &["25 kg", "50 kg", "100 kg"],
        ),
        (IntentAction::OrderRestock, SLOT_MAX_PRICE) => (
            format!("Budget maksimal untuk {product} berapa per kg?"),
            &["Rp 10.000", "Rp 12.000", "Rp 15.000"],
        ),
        (IntentAction::CheckStock, SLOT_PRODUCT) => {
            ("Mau cek stok produk apa?".to_string(), &["Beras", "Minyak", "Telur", "Gula"])
        }
        _ => ("Maaf, ada informasi yang kurang. Bisa diulang?".to_string(), &[]),
    };

    SlotPrompt {
        question,
        suggestions: suggestions.iter().take(4).map(|value| (*value).to_string()).collect(),
    }
}

/// Compact button labels for quick replies: at most 3, with currency strings
/// squeezed ("Rp 10.000" becomes "10rb").
pub fn quick_reply_labels(suggestions: &[String]) -> Vec<String> {
    suggestions
        .iter()
        .take(3)
        .map(|suggestion| suggestion.replace("Rp ", "").replace(".000", "rb"))
        .collect()
}

/// Interpret a free-form follow-up message as a value for `slot`. Returns
/// `None` when the reply cannot be parsed into the slot's type, in which case
/// the same question is asked again.
pub fn parse_slot_reply(slot: &str, reply: &str) -> Option<EntityValue> {
    match slot {
        SLOT_PRODUCT => parse_product_reply(reply),
        _ => parse_numeric_reply(reply).map(EntityValue::Number),
    }
}

fn parse_product_reply(reply: &str) -> Option<EntityValue> {
    // Strip conversational filler so "beli beras" fills the slot with "beras".
    const FILLER: [&str; 5] = ["beli", "jual", "laku", "tadi", "kemarin"];

    let lowered = reply.trim().to_lowercase();
    let cleaned = lowered
        .split_whitespace()
        .filter(|word| !FILLER.contains(word))
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.is_empty() {
        return None;
    }
    Some(EntityValue::Text(cleaned))
}

fn parse_numeric_reply(reply: &str) -> Option<f64> {
    let normalized = normalize_price(&reply.trim().to_lowercase().replace("rp", ""));

    normalized
        .split_whitespace()
        .find_map(|token| token.trim_matches(|ch: char| !ch.is_ascii_digit()).parse::<f64>().ok())
        .filter(|value| *value > 0.0)
}
