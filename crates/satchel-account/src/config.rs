//! Engine configuration.

use satchel_core::constants::{DEFAULT_EVENT_BUFFER, DEFAULT_HISTORY_PAGE_SIZE, TXS_TOPIC};

use crate::error::EngineError;

/// Tunables for an [`AccountEngine`](crate::engine::AccountEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Pub/sub topic carrying account transactions.
    pub topic: String,
    /// Capacity of each subscription's event channel.
    pub event_buffer: usize,
    /// History page size used when the caller does not pass one.
    pub history_page_size: u32,
    /// Fetch and attach the raw previous transaction to every input.
    pub attach_previous_transactions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            topic: TXS_TOPIC.to_string(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            attach_previous_transactions: true,
        }
    }
}

impl EngineConfig {
    /// Preset for signers that only need input amounts, not previous
    /// transactions. Skips one ledger round trip per distinct input txid.
    pub fn segwit_only() -> Self {
        Self {
            attach_previous_transactions: false,
            ..Self::default()
        }
    }

    /// Load configuration from `SATCHEL_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let defaults = Self::default();

        let topic = lookup("SATCHEL_TOPIC").unwrap_or(defaults.topic);
        if topic.trim().is_empty() {
            return Err(EngineError::InvalidInput("SATCHEL_TOPIC must not be empty".into()));
        }

        let event_buffer: usize = match lookup("SATCHEL_EVENT_BUFFER") {
            Some(v) => v.trim().parse().map_err(|_| {
                EngineError::InvalidInput(format!("SATCHEL_EVENT_BUFFER must be an integer: {v}"))
            })?,
            None => defaults.event_buffer,
        };
        if event_buffer == 0 {
            return Err(EngineError::InvalidInput(
                "SATCHEL_EVENT_BUFFER must be positive".into(),
            ));
        }

        let history_page_size: u32 = match lookup("SATCHEL_HISTORY_PAGE_SIZE") {
            Some(v) => v.trim().parse().map_err(|_| {
                EngineError::InvalidInput(format!(
                    "SATCHEL_HISTORY_PAGE_SIZE must be an integer: {v}"
                ))
            })?,
            None => defaults.history_page_size,
        };
        if history_page_size == 0 {
            return Err(EngineError::InvalidInput(
                "SATCHEL_HISTORY_PAGE_SIZE must be positive".into(),
            ));
        }

        let attach_previous_transactions = match lookup("SATCHEL_ATTACH_PREV_TX") {
            Some(v) => parse_flag(&v).ok_or_else(|| {
                EngineError::InvalidInput(format!("SATCHEL_ATTACH_PREV_TX must be a boolean: {v}"))
            })?,
            None => defaults.attach_previous_transactions,
        };

        Ok(Self {
            topic,
            event_buffer,
            history_page_size,
            attach_previous_transactions,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
