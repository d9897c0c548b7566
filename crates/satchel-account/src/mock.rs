//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use satchel_core::chain::{ChainParams, Curve, Network, VARIANT_TABLE};
use satchel_core::constants::EXTENDED_KEY_LEN;
use satchel_core::error::{LedgerError, SignerError, TransportError};
use satchel_core::traits::{LedgerClient, Signer, Transport, TransportFeed};
use satchel_core::types::{
    AddressRequest, FeeSample, HistoryPageRequest, LedgerAccount, LedgerAddress, LedgerInfo,
    LedgerTx, LedgerTxPage, LedgerUtxo, NetworkFees, PublicKeyRequest, SignedTransaction,
    SubscriptionFilter, Txid, UnsignedTransaction,
};

/// Deterministic legacy-encoded extended key; `seed` varies the key body.
pub fn sample_xpub(network: Network, seed: u8) -> String {
    let mut payload = vec![0u8; EXTENDED_KEY_LEN];
    payload[..4].copy_from_slice(&VARIANT_TABLE[0].key_version(network));
    payload[4] = 3;
    for (i, b) in payload[13..45].iter_mut().enumerate() {
        *b = seed.wrapping_add(i as u8);
    }
    payload[45] = 0x02;
    for (i, b) in payload[46..].iter_mut().enumerate() {
        *b = seed.wrapping_mul(31).wrapping_add(i as u8);
    }
    bs58::encode(payload).with_check().into_string()
}

pub fn txid(n: u8) -> Txid {
    Txid([n; 32])
}

pub fn utxo(n: u8, value: u64, path: Option<&str>) -> LedgerUtxo {
    LedgerUtxo {
        txid: txid(n).to_string(),
        vout: 0,
        value: value.to_string(),
        address: Some(format!("addr{n}")),
        confirmations: 1,
        path: path.map(str::to_string),
    }
}

pub fn fee_sample(rate: i64) -> Option<FeeSample> {
    Some(FeeSample {
        sats_per_kilo_byte: Some(rate),
        blocks_until_confirmation: None,
    })
}

pub struct MockLedger {
    pub network: String,
    pub account: LedgerAccount,
    pub utxos: Vec<LedgerUtxo>,
    pub fees: NetworkFees,
    pub raw_txs: HashMap<Txid, String>,
    pub history: LedgerTxPage,
    /// Operation name that fails with the given error.
    pub failing: Option<(&'static str, LedgerError)>,
    pub calls: Mutex<Vec<&'static str>>,
    pub sent: Mutex<Vec<String>>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self {
            network: "mainnet".into(),
            account: LedgerAccount {
                pubkey: "pubkey".into(),
                balance: "80000".into(),
                unconfirmed_balance: "0".into(),
                addresses: vec![LedgerAddress {
                    pubkey: "bc1qown".into(),
                    balance: "80000".into(),
                }],
                next_change_address_index: Some(3),
                next_receive_address_index: Some(5),
            },
            utxos: vec![
                utxo(1, 50_000, Some("m/84'/0'/0'/0/0")),
                utxo(2, 30_000, Some("m/84'/0'/0'/0/1")),
            ],
            fees: NetworkFees {
                fast: fee_sample(20_480),
                average: fee_sample(10_240),
                slow: fee_sample(1_024),
            },
            raw_txs: HashMap::new(),
            history: LedgerTxPage::default(),
            failing: None,
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl MockLedger {
    fn call(&self, operation: &'static str) -> Result<(), LedgerError> {
        self.calls.lock().unwrap().push(operation);
        match &self.failing {
            Some((op, err)) if *op == operation => Err(err.clone()),
            _ => Ok(()),
        }
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == operation).count()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_info(&self) -> Result<LedgerInfo, LedgerError> {
        self.call("get_info")?;
        Ok(LedgerInfo {
            network: self.network.clone(),
        })
    }

    async fn get_account(&self, pubkey: &str) -> Result<LedgerAccount, LedgerError> {
        self.call("get_account")?;
        Ok(LedgerAccount {
            pubkey: pubkey.to_string(),
            ..self.account.clone()
        })
    }

    async fn get_utxos(&self, _pubkey: &str) -> Result<Vec<LedgerUtxo>, LedgerError> {
        self.call("get_utxos")?;
        Ok(self.utxos.clone())
    }

    async fn get_transaction(&self, txid: &Txid) -> Result<String, LedgerError> {
        self.call("get_transaction")?;
        self.raw_txs
            .get(txid)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(txid.to_string()))
    }

    async fn get_tx_history(
        &self,
        _pubkey: &str,
        _page: &HistoryPageRequest,
    ) -> Result<LedgerTxPage, LedgerError> {
        self.call("get_tx_history")?;
        Ok(self.history.clone())
    }

    async fn get_network_fees(&self) -> Result<NetworkFees, LedgerError> {
        self.call("get_network_fees")?;
        Ok(self.fees)
    }

    async fn send_tx(&self, hex: &str) -> Result<String, LedgerError> {
        self.call("send_tx")?;
        self.sent.lock().unwrap().push(hex.to_string());
        Ok(format!("ack-{}", hex.len()))
    }
}

pub struct MockSigner {
    pub secp256k1: bool,
    pub chain_ok: bool,
    pub empty_keys: bool,
    /// `None` makes `sign_transaction` return no result.
    pub signed: Option<String>,
    pub sign_error: Option<SignerError>,
    pub key_requests: Mutex<Vec<PublicKeyRequest>>,
    pub signed_txs: Mutex<Vec<UnsignedTransaction>>,
}

impl Default for MockSigner {
    fn default() -> Self {
        Self {
            secp256k1: true,
            chain_ok: true,
            empty_keys: false,
            signed: Some("0100beef".into()),
            sign_error: None,
            key_requests: Mutex::new(Vec::new()),
            signed_txs: Mutex::new(Vec::new()),
        }
    }
}

impl MockSigner {
    pub fn key_requests(&self) -> Vec<PublicKeyRequest> {
        self.key_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Signer for MockSigner {
    fn supports_chain(&self, _chain: &ChainParams) -> bool {
        self.chain_ok
    }

    fn supports_curve(&self, curve: Curve) -> bool {
        self.secp256k1 && curve == Curve::Secp256k1
    }

    async fn get_public_keys(
        &self,
        requests: &[PublicKeyRequest],
    ) -> Result<Vec<Option<String>>, SignerError> {
        self.key_requests.lock().unwrap().extend_from_slice(requests);
        Ok(requests
            .iter()
            .map(|r| {
                if self.empty_keys {
                    return None;
                }
                let network = if r.coin == "Testnet" {
                    Network::Testnet
                } else {
                    Network::Mainnet
                };
                let seed = r.path.indices().iter().fold(0u8, |acc, i| acc.wrapping_add(*i as u8));
                Some(sample_xpub(network, seed))
            })
            .collect())
    }

    async fn get_address(&self, request: &AddressRequest) -> Result<Option<String>, SignerError> {
        Ok(Some(format!("addr:{}", request.path)))
    }

    async fn sign_transaction(
        &self,
        tx: &UnsignedTransaction,
    ) -> Result<Option<SignedTransaction>, SignerError> {
        if let Some(err) = &self.sign_error {
            return Err(err.clone());
        }
        self.signed_txs.lock().unwrap().push(tx.clone());
        Ok(self.signed.clone().map(|serialized_tx| SignedTransaction { serialized_tx }))
    }
}

#[derive(Default)]
pub struct MockTransport {
    pub fail_open: bool,
    pub fail_subscribe: AtomicBool,
    /// When set, `subscribe` waits for a permit before registering.
    pub gate: Option<Arc<Notify>>,
    pub state: Mutex<TransportLog>,
}

#[derive(Default)]
pub struct TransportLog {
    pub opens: usize,
    pub closes: usize,
    pub unsubscribes: Vec<String>,
    pub feeds: HashMap<String, (SubscriptionFilter, TransportFeed)>,
}

impl MockTransport {
    pub fn feed(&self, id: &str) -> Option<TransportFeed> {
        self.state.lock().unwrap().feeds.get(id).map(|(_, f)| f.clone())
    }

    pub fn filter(&self, id: &str) -> Option<SubscriptionFilter> {
        self.state.lock().unwrap().feeds.get(id).map(|(f, _)| f.clone())
    }

    pub async fn push(&self, id: &str, msg: Result<LedgerTx, TransportError>) -> bool {
        match self.feed(id) {
            Some(feed) => feed.send(msg).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _topic: &str) -> Result<(), TransportError> {
        if self.fail_open {
            return Err(TransportError::ConnectionClosed("refused".into()));
        }
        self.state.lock().unwrap().opens += 1;
        Ok(())
    }

    async fn subscribe(
        &self,
        id: &str,
        filter: &SubscriptionFilter,
        feed: TransportFeed,
    ) -> Result<(), TransportError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::Protocol("subscribe rejected".into()));
        }
        self.state
            .lock()
            .unwrap()
            .feeds
            .insert(id.to_string(), (filter.clone(), feed));
        Ok(())
    }

    async fn unsubscribe(
        &self,
        id: &str,
        _filter: &SubscriptionFilter,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.feeds.remove(id);
        state.unsubscribes.push(id.to_string());
        Ok(())
    }

    async fn close(&self, _topic: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.feeds.clear();
        state.closes += 1;
        Ok(())
    }
}
