//! Agent runtime - AI intent extraction and conversation orchestration.
//!
//! This crate is the "brain" of the lapak pipeline:
//! - Extracts structured intent from informal Indonesian text via two AI
//!   providers (Kolosal primary, Gemini fallback)
//! - Rotates through multiple API keys and trips a circuit breaker when a
//!   provider keeps failing
//! - Tracks per-user conversation sessions and fills missing slots over
//!   follow-up turns
//! - Routes completed intents to the finance/negotiation handlers and
//!   formats the merchant-facing reply
//!
//! # Safety Principle
//!
//! The AI provider is strictly a translator. It never decides prices or
//! transaction outcomes; those are deterministic decisions made by
//! `lapak-core`.

pub mod breaker;
pub mod extract;
pub mod gemini;
pub mod kolosal;
pub mod provider;
pub mod resolver;
pub mod rotation;
pub mod runtime;
pub mod session;

pub use breaker::{BreakerGuardedProvider, CircuitBreaker};
pub use extract::IntentExtractionService;
pub use gemini::GeminiProvider;
pub use kolosal::KolosalProvider;
pub use provider::{IntentProvider, ProviderError};
pub use resolver::{SlotDisposition, SlotResolver};
pub use rotation::{KeyRing, RotatingProvider};
pub use runtime::{Orchestrator, OrchestratorReply};
pub use session::{ConversationSessionStore, PendingState, SessionMessage};
