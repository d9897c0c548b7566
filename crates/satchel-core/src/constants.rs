//! Engine constants. All monetary values are in the chain's smallest unit.

/// Outputs at or below this value are uneconomical to spend and are never
/// created as change.
pub const DUST_THRESHOLD: u64 = 546;

/// Fixed per-transaction overhead in bytes (version, locktime, counts).
pub const TX_OVERHEAD_BYTES: u64 = 10;

/// Estimated size of a single output in bytes.
pub const OUTPUT_BYTES: u64 = 34;

/// Ledger fee samples are quoted per kilobyte of 1024 bytes.
///
/// # Examples
///
/// ```
/// use satchel_core::constants::BYTES_PER_KILOBYTE;
/// assert_eq!(20_480 / BYTES_PER_KILOBYTE, 20);
/// ```
pub const BYTES_PER_KILOBYTE: u64 = 1024;

/// BIP-32 hardened derivation offset.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Branch index of receive addresses within an account.
pub const RECEIVE_BRANCH: u32 = 0;

/// Branch index of change addresses within an account.
pub const CHANGE_BRANCH: u32 = 1;

/// Serialized length of a BIP-32 extended key payload (without checksum).
pub const EXTENDED_KEY_LEN: usize = 78;

/// Pub/sub topic carrying account transaction events.
pub const TXS_TOPIC: &str = "txs";

/// Capacity of the per-subscription event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Default number of transactions per history page.
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 10;
