//! Persistence adapters for the lapak pipeline.
//!
//! The record store is an external PostgREST-style API (`rest`), reached
//! over HTTP with a service key. `memory` provides the in-process
//! implementation used by tests and demo mode (store disabled in config).

pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;
