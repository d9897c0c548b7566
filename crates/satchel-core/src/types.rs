//! Core types: amounts, outpoints, ledger wire shapes, selection results and
//! the unsigned transaction handed to signers.
//!
//! All monetary values are `u64` in the chain's smallest unit. Ledger
//! services report amounts as decimal strings; they are converted with
//! [`parse_amount`] / [`parse_signed_amount`], which reject anything that is
//! not an exact integer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chain::{Curve, InputScriptType, OutputScriptType};
use crate::error::AmountError;
use crate::path::DerivationPath;

/// Parse a non-negative integer amount in the smallest unit.
///
/// # Examples
///
/// ```
/// use satchel_core::types::parse_amount;
/// assert_eq!(parse_amount("50000").unwrap(), 50_000);
/// assert!(parse_amount("0.5").is_err());
/// ```
pub fn parse_amount(s: &str) -> Result<u64, AmountError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }
    if s.starts_with('-') {
        return Err(AmountError::Negative(s.to_string()));
    }
    let digits = s.strip_prefix('+').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::NotAnInteger(s.to_string()));
    }
    digits
        .parse::<u64>()
        .map_err(|_| AmountError::Overflow(s.to_string()))
}

/// Parse a signed integer amount (unconfirmed balances may be negative).
pub fn parse_signed_amount(s: &str) -> Result<i64, AmountError> {
    let s = s.trim();
    let (negative, magnitude) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = parse_amount(magnitude).map_err(|e| match e {
        AmountError::Negative(_) => AmountError::NotAnInteger(s.to_string()),
        other => other,
    })?;
    let value = i64::try_from(value).map_err(|_| AmountError::Overflow(s.to_string()))?;
    Ok(if negative { -value } else { value })
}

/// A 32-byte transaction id, displayed as 64 hex characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Txid(pub [u8; 32]);

impl Txid {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Txid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(format!("txid must be 64 hex characters, got {}", s.len()));
        }
        let bytes = hex::decode(s).map_err(|e| format!("invalid txid hex: {e}"))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl TryFrom<String> for Txid {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Txid> for String {
    fn from(txid: Txid) -> Self {
        txid.to_string()
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Txid,
    pub vout: u32,
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// Fee priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeTier {
    Fast,
    Average,
    Slow,
}

impl FeeTier {
    pub const ALL: [FeeTier; 3] = [Self::Fast, Self::Average, Self::Slow];
}

impl fmt::Display for FeeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fast => "fast",
            Self::Average => "average",
            Self::Slow => "slow",
        })
    }
}

// ---------------------------------------------------------------------------
// Ledger wire shapes
// ---------------------------------------------------------------------------

/// Response of the ledger's info endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerInfo {
    pub network: String,
}

/// One address tracked under an account's extended key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAddress {
    /// The address string.
    pub pubkey: String,
    pub balance: String,
}

/// Account state as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAccount {
    pub pubkey: String,
    /// Confirmed balance.
    pub balance: String,
    /// Pending delta; negative while spends are unconfirmed.
    pub unconfirmed_balance: String,
    #[serde(default)]
    pub addresses: Vec<LedgerAddress>,
    pub next_change_address_index: Option<u32>,
    pub next_receive_address_index: Option<u32>,
}

/// Unspent output as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerUtxo {
    pub txid: String,
    pub vout: u32,
    pub value: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub confirmations: u64,
    /// Derivation path of the owning key, when the ledger knows it.
    #[serde(default)]
    pub path: Option<String>,
}

/// Input or output of a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTxIo {
    #[serde(default)]
    pub addresses: Vec<String>,
    pub value: String,
}

/// A transaction as delivered by history pages and the live feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTx {
    pub txid: String,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default)]
    pub fee: Option<String>,
    #[serde(default)]
    pub vin: Vec<LedgerTxIo>,
    #[serde(default)]
    pub vout: Vec<LedgerTxIo>,
}

/// Paging request for transaction history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPageRequest {
    pub cursor: Option<String>,
    pub page_size: u32,
}

/// One page of transaction history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTxPage {
    /// Cursor for the next page; `None` on the last page.
    pub cursor: Option<String>,
    #[serde(default)]
    pub txs: Vec<LedgerTx>,
}

/// One fee sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSample {
    /// Rate per 1024 bytes. Negative or absent means no estimate.
    pub sats_per_kilo_byte: Option<i64>,
    #[serde(default)]
    pub blocks_until_confirmation: Option<u32>,
}

/// Tiered network fee data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkFees {
    pub fast: Option<FeeSample>,
    pub average: Option<FeeSample>,
    pub slow: Option<FeeSample>,
}

impl NetworkFees {
    pub fn tier(&self, tier: FeeTier) -> Option<&FeeSample> {
        match tier {
            FeeTier::Fast => self.fast.as_ref(),
            FeeTier::Average => self.average.as_ref(),
            FeeTier::Slow => self.slow.as_ref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Coin selection
// ---------------------------------------------------------------------------

/// A spendable output offered to a coin selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionCandidate {
    pub outpoint: OutPoint,
    pub value: u64,
    /// Estimated signed size of spending this output.
    pub input_bytes: u64,
}

/// A payment the selection must fund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTarget {
    pub address: String,
    pub value: u64,
}

/// An output produced by a selector. No address means change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedOutput {
    pub address: Option<String>,
    pub value: u64,
}

/// Result of a selection or sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<SelectionCandidate>,
    pub outputs: Vec<SelectedOutput>,
    pub fee: u64,
}

impl Selection {
    /// Sum of input values, `None` on overflow.
    pub fn total_input(&self) -> Option<u64> {
        self.inputs
            .iter()
            .try_fold(0u64, |acc, i| acc.checked_add(i.value))
    }

    /// Sum of output values, `None` on overflow.
    pub fn total_output(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value))
    }
}

// ---------------------------------------------------------------------------
// Unsigned transaction
// ---------------------------------------------------------------------------

/// An input to be signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedInput {
    pub outpoint: OutPoint,
    pub amount: u64,
    pub path: DerivationPath,
    pub script_type: InputScriptType,
    /// Raw hex of the transaction that created this output, for signers
    /// that verify input amounts against it.
    pub prev_tx_hex: Option<String>,
}

/// An output of an unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UnsignedOutput {
    /// Payment to a counterparty.
    Spend {
        address: String,
        amount: u64,
        script_type: OutputScriptType,
    },
    /// Leftover value returning to the account's change branch.
    Change {
        path: DerivationPath,
        amount: u64,
        script_type: OutputScriptType,
    },
}

impl UnsignedOutput {
    pub fn amount(&self) -> u64 {
        match self {
            Self::Spend { amount, .. } | Self::Change { amount, .. } => *amount,
        }
    }

    pub fn is_change(&self) -> bool {
        matches!(self, Self::Change { .. })
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Spend { address, .. } => Some(address),
            Self::Change { .. } => None,
        }
    }

    pub fn path(&self) -> Option<&DerivationPath> {
        match self {
            Self::Spend { .. } => None,
            Self::Change { path, .. } => Some(path),
        }
    }
}

/// A fully assembled transaction awaiting signatures. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTransaction {
    /// Signer coin name.
    pub coin: String,
    pub inputs: Vec<UnsignedInput>,
    pub outputs: Vec<UnsignedOutput>,
    pub fee: u64,
}

impl UnsignedTransaction {
    pub fn total_input(&self) -> Option<u64> {
        self.inputs
            .iter()
            .try_fold(0u64, |acc, i| acc.checked_add(i.amount))
    }

    pub fn total_output(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.amount()))
    }

    pub fn change_outputs(&self) -> impl Iterator<Item = &UnsignedOutput> {
        self.outputs.iter().filter(|o| o.is_change())
    }
}

/// Serialized, signed transaction returned by a signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    /// Hex-encoded network serialization.
    pub serialized_tx: String,
}

// ---------------------------------------------------------------------------
// Signer requests
// ---------------------------------------------------------------------------

/// Request for one extended public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyRequest {
    pub coin: String,
    pub path: DerivationPath,
    pub curve: Curve,
    pub script_type: InputScriptType,
    pub show_display: bool,
}

/// Request for one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRequest {
    pub coin: String,
    pub path: DerivationPath,
    pub script_type: InputScriptType,
    pub show_display: bool,
}

/// Address filter sent to the pub/sub transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub topic: String,
    pub addresses: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_amount_accepts_integers() {
        assert_eq!(parse_amount("0").unwrap(), 0);
        assert_eq!(parse_amount(" 30000 ").unwrap(), 30_000);
        assert_eq!(parse_amount("+7").unwrap(), 7);
        assert_eq!(parse_amount("18446744073709551615").unwrap(), u64::MAX);
    }

    #[test]
    fn parse_amount_rejects_drift() {
        assert_eq!(parse_amount(""), Err(AmountError::Empty));
        assert!(matches!(parse_amount("0.00001"), Err(AmountError::NotAnInteger(_))));
        assert!(matches!(parse_amount("1e5"), Err(AmountError::NotAnInteger(_))));
        assert!(matches!(parse_amount("-5"), Err(AmountError::Negative(_))));
        assert!(matches!(
            parse_amount("18446744073709551616"),
            Err(AmountError::Overflow(_))
        ));
    }

    #[test]
    fn parse_signed_amount_handles_sign() {
        assert_eq!(parse_signed_amount("-2500").unwrap(), -2500);
        assert_eq!(parse_signed_amount("2500").unwrap(), 2500);
        assert!(parse_signed_amount("--1").is_err());
        assert!(parse_signed_amount("-0.1").is_err());
    }

    #[test]
    fn txid_hex_roundtrip() {
        let hex_str = "ab".repeat(32);
        let txid: Txid = hex_str.parse().unwrap();
        assert_eq!(txid.0, [0xab; 32]);
        assert_eq!(txid.to_string(), hex_str);
        assert!("abcd".parse::<Txid>().is_err());
        assert!("zz".repeat(32).parse::<Txid>().is_err());
    }

    #[test]
    fn outpoint_display() {
        let op = OutPoint {
            txid: Txid([1; 32]),
            vout: 3,
        };
        assert!(op.to_string().ends_with(":3"));
    }

    #[test]
    fn ledger_account_deserializes_camel_case() {
        let json = r#"{
            "pubkey": "zpub...",
            "balance": "80000",
            "unconfirmedBalance": "-1000",
            "addresses": [{"pubkey": "bc1qa", "balance": "80000"}],
            "nextChangeAddressIndex": 3,
            "nextReceiveAddressIndex": 7
        }"#;
        let acct: LedgerAccount = serde_json::from_str(json).unwrap();
        assert_eq!(acct.unconfirmed_balance, "-1000");
        assert_eq!(acct.addresses[0].pubkey, "bc1qa");
        assert_eq!(acct.next_change_address_index, Some(3));
    }

    #[test]
    fn network_fees_tier_lookup() {
        let fees: NetworkFees = serde_json::from_str(
            r#"{"fast": {"satsPerKiloByte": 20480}, "average": null}"#,
        )
        .unwrap();
        assert_eq!(fees.tier(FeeTier::Fast).unwrap().sats_per_kilo_byte, Some(20480));
        assert!(fees.tier(FeeTier::Average).is_none());
        assert!(fees.tier(FeeTier::Slow).is_none());
    }

    #[test]
    fn unsigned_output_accessors() {
        let spend = UnsignedOutput::Spend {
            address: "bc1qdest".into(),
            amount: 500,
            script_type: OutputScriptType::PayToAddress,
        };
        let change = UnsignedOutput::Change {
            path: "m/84'/0'/0'/1/0".parse().unwrap(),
            amount: 200,
            script_type: OutputScriptType::PayToWitness,
        };
        assert!(!spend.is_change());
        assert_eq!(spend.address(), Some("bc1qdest"));
        assert!(spend.path().is_none());
        assert!(change.is_change());
        assert!(change.address().is_none());
        assert!(change.path().is_some());
        assert_eq!(spend.amount() + change.amount(), 700);
    }

    #[test]
    fn selection_totals_detect_overflow() {
        let candidate = |value| SelectionCandidate {
            outpoint: OutPoint {
                txid: Txid::default(),
                vout: 0,
            },
            value,
            input_bytes: 68,
        };
        let sel = Selection {
            inputs: vec![candidate(u64::MAX), candidate(1)],
            outputs: vec![],
            fee: 0,
        };
        assert_eq!(sel.total_input(), None);
        assert_eq!(sel.total_output(), Some(0));
    }
}
