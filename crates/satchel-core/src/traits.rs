//! Collaborator contracts consumed by the engine.
//!
//! - [`LedgerClient`] — read-only remote chain state plus broadcast
//! - [`CoinSelector`] — pluggable input selection strategy
//! - [`Signer`] — capability-gated external signer (hardware or software)
//! - [`Transport`] — pub/sub channel delivering live transactions
//! - [`AddressValidator`] — per-network address format rules
//!
//! None of these are implemented by the engine itself; production adapters
//! live with the caller, and tests supply in-memory fakes.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::chain::{ChainParams, Curve, Network};
use crate::error::{LedgerError, SignerError, TransportError};
use crate::types::{
    AddressRequest, HistoryPageRequest, LedgerAccount, LedgerInfo, LedgerTx, LedgerTxPage,
    LedgerUtxo, NetworkFees, PublicKeyRequest, Selection, SelectionCandidate, SelectionTarget,
    SignedTransaction, SubscriptionFilter, Txid, UnsignedTransaction,
};

/// Sender half handed to a [`Transport`]; each item is one inbound message.
pub type TransportFeed = mpsc::Sender<Result<LedgerTx, TransportError>>;

/// Read-only view over remote ledger state, plus transaction submission.
///
/// Implementations must not retry internally in a way that hides failures;
/// the engine wraps every error with the operation name and surfaces it.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Network the remote service is running on.
    async fn get_info(&self) -> Result<LedgerInfo, LedgerError>;

    /// Account state for an extended public key.
    async fn get_account(&self, pubkey: &str) -> Result<LedgerAccount, LedgerError>;

    /// Unspent outputs controlled by an extended public key.
    async fn get_utxos(&self, pubkey: &str) -> Result<Vec<LedgerUtxo>, LedgerError>;

    /// Raw hex of a transaction.
    async fn get_transaction(&self, txid: &Txid) -> Result<String, LedgerError>;

    /// One page of transaction history for an extended public key.
    async fn get_tx_history(
        &self,
        pubkey: &str,
        page: &HistoryPageRequest,
    ) -> Result<LedgerTxPage, LedgerError>;

    /// Current tiered fee samples.
    async fn get_network_fees(&self) -> Result<NetworkFees, LedgerError>;

    /// Submit a signed transaction; returns the ledger's acknowledgment id.
    async fn send_tx(&self, hex: &str) -> Result<String, LedgerError>;
}

/// Input selection strategy.
///
/// Contract for both operations: on success,
/// `sum(outputs) + fee <= sum(inputs)`, every input is one of the
/// `candidates`, and outputs without an address are change. `None` means no
/// viable selection exists at this fee rate.
pub trait CoinSelector: Send + Sync {
    /// Fund `targets` from `candidates`, adding change when warranted.
    fn select(
        &self,
        candidates: &[SelectionCandidate],
        targets: &[SelectionTarget],
        fee_rate: u64,
    ) -> Option<Selection>;

    /// Spend every candidate to a single output at `address`, no change.
    fn sweep(
        &self,
        candidates: &[SelectionCandidate],
        address: &str,
        fee_rate: u64,
    ) -> Option<Selection>;
}

/// External signer. Key derivation and signatures never happen in-process.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Whether the signer can handle this chain's transaction format.
    fn supports_chain(&self, chain: &ChainParams) -> bool;

    /// Whether the signer can derive keys on `curve`.
    fn supports_curve(&self, curve: Curve) -> bool;

    /// Extended public keys, one slot per request; `None` where the signer
    /// produced nothing.
    async fn get_public_keys(
        &self,
        requests: &[PublicKeyRequest],
    ) -> Result<Vec<Option<String>>, SignerError>;

    /// Address at a full derivation path.
    async fn get_address(&self, request: &AddressRequest) -> Result<Option<String>, SignerError>;

    /// Sign every input. `None` when the signer returned no result.
    async fn sign_transaction(
        &self,
        tx: &UnsignedTransaction,
    ) -> Result<Option<SignedTransaction>, SignerError>;
}

/// Shared pub/sub channel. Reconnection policy belongs to the implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, topic: &str) -> Result<(), TransportError>;

    /// Register `id` for `filter`. Inbound messages are pushed into `feed`
    /// in delivery order. Subscribing an id twice replaces the first filter.
    async fn subscribe(
        &self,
        id: &str,
        filter: &SubscriptionFilter,
        feed: TransportFeed,
    ) -> Result<(), TransportError>;

    async fn unsubscribe(&self, id: &str, filter: &SubscriptionFilter)
    -> Result<(), TransportError>;

    async fn close(&self, topic: &str) -> Result<(), TransportError>;
}

/// Address format rules for one network.
pub trait AddressValidator: Send + Sync {
    fn validate(&self, address: &str, network: Network) -> bool;
}
