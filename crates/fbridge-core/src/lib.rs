//! fbridge Core - Shared types for the file-channel bridge
//!
//! This crate provides the domain types shared between the
//! protocol grammar (fbridge-protocol) and the polling client
//! (fbridge-client).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod cache;
pub mod config;
pub mod error;
pub mod record;
pub mod state;

// Re-exports for convenience
pub use cache::{parse_int_literal, Interner, NumberCache, Passthrough, ResponseCache, StringPool};
pub use config::ChannelConfig;
pub use error::{BridgeError, Result};
pub use record::{RecordStatus, ResponseBatch, ResponseRecord};
pub use state::BridgeState;
