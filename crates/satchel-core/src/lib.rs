//! # satchel-core
//! Shared types, collaborator contracts and chain parameters for the Satchel
//! UTXO account engine.

pub mod chain;
pub mod constants;
pub mod error;
pub mod path;
pub mod traits;
pub mod types;
