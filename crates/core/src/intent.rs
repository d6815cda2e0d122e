//! Structured intent model shared by the extraction pipeline and the agents.
//!
//! Providers return the wire shape
//! `{"action": "...", "entities": {...}, "sentiment": "...", "language": "..."}`;
//! everything downstream works with these types instead of untyped JSON maps,
//! so "slot missing" and "slot present" stay distinguishable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What the user wants this turn, as classified by a provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentAction {
    #[serde(rename = "RECORD_SALE")]
    RecordSale,
    #[serde(rename = "RECORD_EXPENSE")]
    RecordExpense,
    #[serde(rename = "ORDER_RESTOCK")]
    OrderRestock,
    #[serde(rename = "CHECK_STOCK")]
    CheckStock,
    #[serde(rename = "ASK_MARKET")]
    AskMarket,
    #[serde(rename = "REQUEST_PROMO")]
    RequestPromo,
    #[serde(rename = "GREETING")]
    Greeting,
    #[default]
    #[serde(rename = "UNKNOWN")]
    #[serde(other)]
    Unknown,
}

impl IntentAction {
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::RecordSale => "RECORD_SALE",
            Self::RecordExpense => "RECORD_EXPENSE",
            Self::OrderRestock => "ORDER_RESTOCK",
            Self::CheckStock => "CHECK_STOCK",
            Self::AskMarket => "ASK_MARKET",
            Self::RequestPromo => "REQUEST_PROMO",
            Self::Greeting => "GREETING",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// A single slot value. Providers emit either strings or numbers; nulls and
/// structured values are dropped by the [`Entities`] deserializer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    Number(f64),
    Text(String),
}

impl EntityValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            Self::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

/// Slot name to value mapping. Keys are never guaranteed present.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Entities(BTreeMap<String, EntityValue>);

// Providers sometimes pad the entity map with nulls or nested structures
// ("time": null, "note": {...}). Those must not poison the whole intent;
// only scalar slots are kept.
impl<'de> Deserialize<'de> for Entities {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawValue {
            Scalar(EntityValue),
            Other(serde::de::IgnoredAny),
        }

        let raw = BTreeMap::<String, RawValue>::deserialize(deserializer)?;
        let mut slots = BTreeMap::new();
        for (slot, value) in raw {
            if let RawValue::Scalar(value) = value {
                slots.insert(slot, value);
            }
        }
        Ok(Entities(slots))
    }
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: impl Into<String>, value: EntityValue) {
        self.0.insert(slot.into(), value);
    }

    pub fn get(&self, slot: &str) -> Option<&EntityValue> {
        self.0.get(slot)
    }

    /// Text value of a slot, `None` when absent, non-text, or blank.
    pub fn text(&self, slot: &str) -> Option<&str> {
        self.0
            .get(slot)
            .and_then(EntityValue::as_text)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Numeric value of a slot, `None` when absent or non-numeric.
    pub fn number(&self, slot: &str) -> Option<f64> {
        self.0.get(slot).and_then(EntityValue::as_number)
    }

    /// Merge `other` into `self`, newer values winning per slot.
    pub fn merge(&mut self, other: &Entities) {
        for (slot, value) in &other.0 {
            self.0.insert(slot.clone(), value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    #[serde(other)]
    Neutral,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Javanese
    Jv,
    /// Sundanese
    Su,
    /// Bahasa Indonesia
    #[default]
    #[serde(other)]
    Id,
}

/// One extracted intent. Produced fresh per inbound message and immutable
/// once returned by the extraction service; the domain layer copies before
/// mutating.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub action: IntentAction,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub raw_text: String,
}

impl Intent {
    /// The degraded path when every provider has failed: the user's message
    /// is preserved verbatim so it is never silently dropped.
    pub fn unknown(raw_text: impl Into<String>) -> Self {
        Self {
            action: IntentAction::Unknown,
            entities: Entities::new(),
            sentiment: Sentiment::Neutral,
            language: Language::Id,
            raw_text: raw_text.into(),
        }
    }
}
