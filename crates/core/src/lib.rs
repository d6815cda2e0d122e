pub mod config;
pub mod errors;
pub mod intent;
pub mod negotiate;
pub mod normalize;
pub mod ports;
pub mod slots;

pub use errors::ApplicationError;
pub use intent::{Entities, EntityValue, Intent, IntentAction, Language, Sentiment};
pub use negotiate::{
    NegotiationEngine, NegotiationMessage, NegotiationRequest, NegotiationResult, Role,
    SellerCandidate, NO_BUDGET_CEILING,
};
pub use normalize::{normalize, normalize_price};
pub use ports::{
    NewNegotiationLog, NewTransaction, NegotiationStatus, RecordStore, SellerDirectory,
    StockLevel, StoreError, TransactionKind,
};
pub use slots::{first_missing, prompt_for, quick_reply_labels, required_slots, SlotPrompt};
