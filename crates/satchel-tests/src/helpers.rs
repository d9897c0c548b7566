//! Shared in-memory collaborators for integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use satchel_account::{AccountEngine, AccumulativeSelector, EngineConfig};
use satchel_core::chain::{ChainParams, Curve, Network, VARIANT_TABLE};
use satchel_core::constants::EXTENDED_KEY_LEN;
use satchel_core::error::{LedgerError, SignerError, TransportError};
use satchel_core::traits::{LedgerClient, Signer, Transport, TransportFeed};
use satchel_core::types::{
    AddressRequest, FeeSample, HistoryPageRequest, LedgerAccount, LedgerAddress, LedgerInfo,
    LedgerTx, LedgerTxIo, LedgerTxPage, LedgerUtxo, NetworkFees, PublicKeyRequest,
    SignedTransaction, SubscriptionFilter, Txid, UnsignedTransaction,
};

/// Legacy-encoded extended public key with a body derived from `seed`.
pub fn xpub(network: Network, seed: u8) -> String {
    let mut payload = vec![0u8; EXTENDED_KEY_LEN];
    payload[..4].copy_from_slice(&VARIANT_TABLE[0].key_version(network));
    payload[4] = 3;
    for (i, b) in payload[5..].iter_mut().enumerate() {
        *b = seed.wrapping_mul(7).wrapping_add(i as u8);
    }
    payload[45] = 0x03;
    bs58::encode(payload).with_check().into_string()
}

pub fn txid(n: u8) -> Txid {
    Txid([n; 32])
}

/// UTXO `n` paying `value` on the receive branch of `m/84'/0'/0'`.
pub fn utxo(n: u8, value: u64) -> LedgerUtxo {
    utxo_at(84, n, value)
}

/// UTXO `n` paying `value` on the receive branch of `m/{purpose}'/0'/0'`.
pub fn utxo_at(purpose: u32, n: u8, value: u64) -> LedgerUtxo {
    LedgerUtxo {
        txid: txid(n).to_string(),
        vout: 0,
        value: value.to_string(),
        address: Some(format!("bc1qaddr{n}")),
        confirmations: 3,
        path: Some(format!("m/{purpose}'/0'/0'/0/{n}")),
    }
}

pub fn fees(fast: i64, average: i64, slow: i64) -> NetworkFees {
    let sample = |rate| {
        Some(FeeSample {
            sats_per_kilo_byte: Some(rate),
            blocks_until_confirmation: None,
        })
    };
    NetworkFees {
        fast: sample(fast),
        average: sample(average),
        slow: sample(slow),
    }
}

/// Ledger transaction paying `value` to `to` from `from`.
pub fn ledger_tx(n: u8, from: &str, to: &str, value: u64, confirmations: u64) -> LedgerTx {
    LedgerTx {
        txid: txid(n).to_string(),
        block_hash: None,
        block_height: None,
        timestamp: Some(1_700_000_000),
        confirmations,
        fee: Some("226".into()),
        vin: vec![LedgerTxIo {
            addresses: vec![from.to_string()],
            value: (value + 226).to_string(),
        }],
        vout: vec![LedgerTxIo {
            addresses: vec![to.to_string()],
            value: value.to_string(),
        }],
    }
}

// ----------------------------------------------------------------------
// Ledger
// ----------------------------------------------------------------------

pub struct FakeLedger {
    pub network: String,
    pub account: Mutex<LedgerAccount>,
    pub utxos: Mutex<Vec<LedgerUtxo>>,
    pub fees: NetworkFees,
    pub history: LedgerTxPage,
    pub sent: Mutex<Vec<String>>,
    pub fetched: Mutex<Vec<Txid>>,
}

impl FakeLedger {
    /// Mainnet account holding `values` with one own address `bc1qown`.
    pub fn with_utxos(values: &[u64]) -> Self {
        Self::with_utxos_at(84, values)
    }

    /// Like [`with_utxos`](Self::with_utxos), under account `m/{purpose}'/0'/0'`.
    pub fn with_utxos_at(purpose: u32, values: &[u64]) -> Self {
        let utxos: Vec<LedgerUtxo> = values
            .iter()
            .enumerate()
            .map(|(i, v)| utxo_at(purpose, i as u8 + 1, *v))
            .collect();
        let total: u64 = values.iter().sum();
        Self {
            network: "mainnet".into(),
            account: Mutex::new(LedgerAccount {
                pubkey: String::new(),
                balance: total.to_string(),
                unconfirmed_balance: "0".into(),
                addresses: vec![LedgerAddress {
                    pubkey: "bc1qown".into(),
                    balance: total.to_string(),
                }],
                next_change_address_index: Some(2),
                next_receive_address_index: Some(7),
            }),
            utxos: Mutex::new(utxos),
            fees: fees(20_480, 10_240, 1_024),
            history: LedgerTxPage::default(),
            sent: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn set_balance(&self, confirmed: &str, unconfirmed: &str) {
        let mut account = self.account.lock().unwrap();
        account.balance = confirmed.into();
        account.unconfirmed_balance = unconfirmed.into();
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn get_info(&self) -> Result<LedgerInfo, LedgerError> {
        Ok(LedgerInfo {
            network: self.network.clone(),
        })
    }

    async fn get_account(&self, pubkey: &str) -> Result<LedgerAccount, LedgerError> {
        let mut account = self.account.lock().unwrap().clone();
        account.pubkey = pubkey.to_string();
        Ok(account)
    }

    async fn get_utxos(&self, _pubkey: &str) -> Result<Vec<LedgerUtxo>, LedgerError> {
        Ok(self.utxos.lock().unwrap().clone())
    }

    async fn get_transaction(&self, txid: &Txid) -> Result<String, LedgerError> {
        self.fetched.lock().unwrap().push(*txid);
        Ok(format!("02000000{txid}"))
    }

    async fn get_tx_history(
        &self,
        _pubkey: &str,
        _page: &HistoryPageRequest,
    ) -> Result<LedgerTxPage, LedgerError> {
        Ok(self.history.clone())
    }

    async fn get_network_fees(&self) -> Result<NetworkFees, LedgerError> {
        Ok(self.fees)
    }

    async fn send_tx(&self, hex: &str) -> Result<String, LedgerError> {
        self.sent.lock().unwrap().push(hex.to_string());
        Ok(format!("{:064x}", hex.len()))
    }
}

// ----------------------------------------------------------------------
// Signer
// ----------------------------------------------------------------------

/// Software signer: keys are deterministic, signatures are the input count.
#[derive(Default)]
pub struct FakeSigner {
    pub refuse_chain: bool,
    pub ed25519_only: bool,
    pub signed: Mutex<Vec<UnsignedTransaction>>,
}

#[async_trait]
impl Signer for FakeSigner {
    fn supports_chain(&self, _chain: &ChainParams) -> bool {
        !self.refuse_chain
    }

    fn supports_curve(&self, curve: Curve) -> bool {
        match curve {
            Curve::Secp256k1 => !self.ed25519_only,
            Curve::Ed25519 => true,
        }
    }

    async fn get_public_keys(
        &self,
        requests: &[PublicKeyRequest],
    ) -> Result<Vec<Option<String>>, SignerError> {
        Ok(requests
            .iter()
            .map(|r| {
                let network = if r.coin == "Testnet" {
                    Network::Testnet
                } else {
                    Network::Mainnet
                };
                let seed = r.path.indices().last().copied().unwrap_or_default() as u8;
                Some(xpub(network, seed))
            })
            .collect())
    }

    async fn get_address(&self, request: &AddressRequest) -> Result<Option<String>, SignerError> {
        Ok(Some(format!("{}:{}", request.coin, request.path)))
    }

    async fn sign_transaction(
        &self,
        tx: &UnsignedTransaction,
    ) -> Result<Option<SignedTransaction>, SignerError> {
        self.signed.lock().unwrap().push(tx.clone());
        Ok(Some(SignedTransaction {
            serialized_tx: format!("0200{:02x}{:016x}", tx.inputs.len(), tx.fee),
        }))
    }
}

// ----------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct FakeTransport {
    pub opens: Mutex<usize>,
    pub closes: Mutex<usize>,
    pub feeds: Mutex<HashMap<String, (SubscriptionFilter, TransportFeed)>>,
}

impl FakeTransport {
    pub fn filter(&self, id: &str) -> Option<SubscriptionFilter> {
        self.feeds.lock().unwrap().get(id).map(|(f, _)| f.clone())
    }

    /// Deliver `msg` to subscription `id`; false when no feed is registered.
    pub async fn push(&self, id: &str, msg: Result<LedgerTx, TransportError>) -> bool {
        let feed = self.feeds.lock().unwrap().get(id).map(|(_, f)| f.clone());
        match feed {
            Some(feed) => feed.send(msg).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, _topic: &str) -> Result<(), TransportError> {
        *self.opens.lock().unwrap() += 1;
        Ok(())
    }

    async fn subscribe(
        &self,
        id: &str,
        filter: &SubscriptionFilter,
        feed: TransportFeed,
    ) -> Result<(), TransportError> {
        self.feeds
            .lock()
            .unwrap()
            .insert(id.to_string(), (filter.clone(), feed));
        Ok(())
    }

    async fn unsubscribe(
        &self,
        id: &str,
        _filter: &SubscriptionFilter,
    ) -> Result<(), TransportError> {
        self.feeds.lock().unwrap().remove(id);
        Ok(())
    }

    async fn close(&self, _topic: &str) -> Result<(), TransportError> {
        self.feeds.lock().unwrap().clear();
        *self.closes.lock().unwrap() += 1;
        Ok(())
    }
}

/// Collaborators behind an engine, kept so tests can inspect them.
pub struct Harness {
    pub engine: AccountEngine,
    pub ledger: Arc<FakeLedger>,
    pub signer: Arc<FakeSigner>,
    pub transport: Arc<FakeTransport>,
}

/// Bitcoin mainnet engine over `ledger` with the default selector.
pub fn harness(ledger: FakeLedger, config: EngineConfig) -> Harness {
    harness_on(ChainParams::bitcoin(), ledger, FakeSigner::default(), config)
}

pub fn harness_on(
    chain: ChainParams,
    ledger: FakeLedger,
    signer: FakeSigner,
    config: EngineConfig,
) -> Harness {
    let ledger = Arc::new(ledger);
    let signer = Arc::new(signer);
    let transport = Arc::new(FakeTransport::default());
    let engine = AccountEngine::new(
        chain,
        config,
        ledger.clone(),
        Arc::new(AccumulativeSelector::new()),
        signer.clone(),
        transport.clone(),
    );
    Harness {
        engine,
        ledger,
        signer,
        transport,
    }
}
