//! # satchel-account — UTXO account engine.
//!
//! Reads account state from a ledger, derives extended public keys through a
//! signer, builds unsigned transactions with pluggable coin selection,
//! previews tiered fees, hands transactions to the signer, broadcasts them,
//! and streams live account events over a pub/sub transport.
//!
//! # Modules
//!
//! - [`error`] — `EngineError` enum
//! - [`config`] — Engine settings, defaults and environment overrides
//! - [`keys`] — Extended public key derivation and variant re-encoding
//! - [`account`] — Account snapshots and the spendable output set
//! - [`coin_selection`] — Largest-first accumulative selection
//! - [`builder`] — Unsigned transaction assembly
//! - [`fees`] — Fee tier conversion and previews
//! - [`signing`] — Signer handoff, address requests and broadcast
//! - [`events`] — Normalized transaction events
//! - [`subscription`] — Live event subscriptions
//! - [`engine`] — High-level engine composition

pub mod account;
pub mod builder;
pub mod coin_selection;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fees;
pub mod keys;
pub mod signing;
pub mod subscription;

#[cfg(test)]
mod mock;

// Re-exports for convenient access
pub use account::{Account, AccountAddress, SpendableOutput, SpendableSet, UnspentOutput};
pub use builder::{SpendIntent, TransactionBuilder};
pub use coin_selection::AccumulativeSelector;
pub use config::EngineConfig;
pub use engine::{AccountEngine, AddressQuery};
pub use error::EngineError;
pub use events::{Transfer, TransferKind, TxEvent, TxHistoryPage, TxStatus};
pub use fees::{FeeEstimates, FeeQuery, FeeTierEstimate};
pub use keys::PublicKeyMaterial;
pub use subscription::{ErrorHandler, MessageHandler, SubscriptionManager, SubscriptionState};
