//! Engine composition.
//!
//! [`AccountEngine`] wires the collaborators together and exposes the
//! account-level operations. It holds no account state between calls: every
//! operation reads a fresh snapshot from the ledger.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use satchel_core::chain::{AccountVariant, ChainParams, Network};
use satchel_core::path::AccountPath;
use satchel_core::traits::{AddressValidator, CoinSelector, LedgerClient, Signer, Transport};
use satchel_core::types::{
    FeeTier, HistoryPageRequest, SignedTransaction, Txid, UnsignedTransaction,
};

use crate::account::{Account, SpendableSet};
use crate::builder::{SpendIntent, TransactionBuilder};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{TxEvent, TxHistoryPage};
use crate::fees::{self, FeeEstimates, FeeQuery};
use crate::keys::{self, PublicKeyMaterial};
use crate::signing;
use crate::subscription::{
    subscription_id, ErrorHandler, MessageHandler, SubscriptionManager, SubscriptionState,
};

/// Which address to derive. Without `address_index`, the account's next
/// unused index on the chosen branch is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddressQuery {
    pub account_index: u32,
    pub variant: Option<AccountVariant>,
    pub is_change: bool,
    pub address_index: Option<u32>,
    /// Ask the signer to show the address on its display.
    pub show_display: bool,
}

/// UTXO account engine for one chain.
pub struct AccountEngine {
    chain: ChainParams,
    config: EngineConfig,
    ledger: Arc<dyn LedgerClient>,
    selector: Arc<dyn CoinSelector>,
    signer: Arc<dyn Signer>,
    validator: Option<Arc<dyn AddressValidator>>,
    subscriptions: SubscriptionManager,
}

impl AccountEngine {
    pub fn new(
        chain: ChainParams,
        config: EngineConfig,
        ledger: Arc<dyn LedgerClient>,
        selector: Arc<dyn CoinSelector>,
        signer: Arc<dyn Signer>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let subscriptions =
            SubscriptionManager::new(transport, config.topic.clone(), config.event_buffer);
        Self {
            chain,
            config,
            ledger,
            selector,
            signer,
            validator: None,
            subscriptions,
        }
    }

    /// Attach an address validator; recipients are checked before building.
    pub fn with_address_validator(mut self, validator: Arc<dyn AddressValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn chain(&self) -> &ChainParams {
        &self.chain
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn builder(&self) -> TransactionBuilder<'_> {
        TransactionBuilder::new(&self.chain, self.selector.as_ref())
    }

    fn require_pubkey(pubkey: &str) -> Result<(), EngineError> {
        if pubkey.trim().is_empty() {
            return Err(EngineError::InvalidInput("public key is empty".into()));
        }
        Ok(())
    }

    // --- Ledger reads ---

    /// Network reported by the ledger; must match the configured chain.
    pub async fn network(&self) -> Result<Network, EngineError> {
        let info = self
            .ledger
            .get_info()
            .await
            .map_err(EngineError::ledger("get_info"))?;
        let network: Network = info
            .network
            .parse()
            .map_err(|_| EngineError::UnsupportedNetwork(info.network.clone()))?;
        if network != self.chain.network {
            return Err(EngineError::UnsupportedNetwork(format!(
                "ledger is on {network}, {} expects {}",
                self.chain.name, self.chain.network
            )));
        }
        Ok(network)
    }

    pub async fn get_account(&self, pubkey: &str) -> Result<Account, EngineError> {
        Self::require_pubkey(pubkey)?;
        let raw = self
            .ledger
            .get_account(pubkey)
            .await
            .map_err(EngineError::ledger("get_account"))?;
        Account::from_ledger(raw)
    }

    pub async fn get_spendable_utxos(&self, pubkey: &str) -> Result<SpendableSet, EngineError> {
        Self::require_pubkey(pubkey)?;
        let raw = self
            .ledger
            .get_utxos(pubkey)
            .await
            .map_err(EngineError::ledger("get_utxos"))?;
        SpendableSet::from_ledger(raw)
    }

    /// One page of history, normalized against the account's addresses.
    pub async fn get_tx_history(
        &self,
        pubkey: &str,
        cursor: Option<String>,
        page_size: Option<u32>,
    ) -> Result<TxHistoryPage, EngineError> {
        let account = self.get_account(pubkey).await?;
        let own: HashSet<String> = account.address_list().into_iter().collect();

        let request = HistoryPageRequest {
            cursor,
            page_size: page_size.unwrap_or(self.config.history_page_size),
        };
        if request.page_size == 0 {
            return Err(EngineError::InvalidInput("page size must be positive".into()));
        }
        let page = self
            .ledger
            .get_tx_history(pubkey, &request)
            .await
            .map_err(EngineError::ledger("get_tx_history"))?;

        let events = page
            .txs
            .iter()
            .map(|tx| {
                TxEvent::from_ledger(tx, &own).map_err(|e| {
                    EngineError::malformed("get_tx_history", format!("{}: {e}", tx.txid))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TxHistoryPage {
            cursor: page.cursor,
            events,
        })
    }

    // --- Keys and addresses ---

    pub async fn derive_public_key(
        &self,
        path: &AccountPath,
        variant: Option<AccountVariant>,
    ) -> Result<PublicKeyMaterial, EngineError> {
        keys::derive_public_key(self.signer.as_ref(), &self.chain, path, variant).await
    }

    /// Address at `<root>/<0|1>/<index>`.
    pub async fn get_address(&self, query: &AddressQuery) -> Result<String, EngineError> {
        let variant = query.variant.unwrap_or_else(|| self.chain.default_variant());
        let root = self.chain.account_path(variant, query.account_index);

        let index = match query.address_index {
            Some(index) => index,
            None => {
                let pubkey = self.derive_public_key(&root, Some(variant)).await?;
                let account = self.get_account(pubkey.as_str()).await?;
                if query.is_change {
                    account.next_change_index
                } else {
                    account.next_receive_index
                }
            }
        };

        let path = root.with_address(query.is_change, index);
        signing::request_address(
            self.signer.as_ref(),
            &self.chain,
            &path,
            variant,
            query.show_display,
        )
        .await
    }

    /// `None` when no validator is attached.
    pub fn validate_address(&self, address: &str) -> Result<Option<bool>, EngineError> {
        if address.trim().is_empty() {
            return Err(EngineError::InvalidInput("address is empty".into()));
        }
        Ok(self
            .validator
            .as_ref()
            .map(|v| v.validate(address, self.chain.network)))
    }

    fn check_recipient(&self, recipient: &str) -> Result<(), EngineError> {
        if self.validate_address(recipient)? == Some(false) {
            return Err(EngineError::InvalidInput(format!(
                "invalid {} address: {recipient}",
                self.chain.name
            )));
        }
        Ok(())
    }

    // --- Building ---

    /// Build an unsigned transaction for `intent` from `pubkey`'s account.
    pub async fn build_transaction(
        &self,
        pubkey: &str,
        intent: &SpendIntent,
    ) -> Result<UnsignedTransaction, EngineError> {
        let builder = self.builder();
        builder.validate(intent)?;
        self.check_recipient(&intent.recipient)?;
        // Plain xpub/tpub keys serve every variant; tagged keys name one.
        if let Ok((variant, _)) = keys::key_variant(pubkey) {
            if variant != AccountVariant::Legacy && variant != intent.variant {
                return Err(EngineError::InvalidInput(format!(
                    "{variant} key cannot fund a {} spend",
                    intent.variant
                )));
            }
        }

        let account = self.get_account(pubkey).await?;
        let spendable = self.get_spendable_utxos(pubkey).await?;
        let selection = builder.select(intent, &spendable)?;

        let mut prev_txs = HashMap::new();
        if self.config.attach_previous_transactions {
            let txids: HashSet<Txid> = selection.inputs.iter().map(|c| c.outpoint.txid).collect();
            for txid in txids {
                let hex = self
                    .ledger
                    .get_transaction(&txid)
                    .await
                    .map_err(EngineError::ledger("get_transaction"))?;
                prev_txs.insert(txid, hex);
            }
        }

        let tx = builder.assemble(intent, &account, &spendable, selection, &prev_txs)?;
        info!(
            recipient = %intent.recipient,
            send_max = intent.send_max,
            fee = tx.fee,
            inputs = tx.inputs.len(),
            "built transaction"
        );
        Ok(tx)
    }

    /// Preview the fee of `query` at every tier.
    pub async fn estimate_fees(
        &self,
        query: &FeeQuery,
        pubkey: &str,
    ) -> Result<FeeEstimates, EngineError> {
        let intent = query.to_intent(self.chain.default_variant())?;
        if pubkey.trim().is_empty() {
            return Err(EngineError::MissingParameter("pubkey"));
        }
        let network_fees = self
            .ledger
            .get_network_fees()
            .await
            .map_err(EngineError::ledger("get_network_fees"))?;
        // Missing fee data is reported before the outputs are fetched.
        for tier in FeeTier::ALL {
            fees::tier_rate(&network_fees, tier)?;
        }
        let spendable = self.get_spendable_utxos(pubkey).await?;
        fees::estimate(&self.builder(), &intent, &network_fees, &spendable)
    }

    // --- Signing and broadcast ---

    pub async fn sign(
        &self,
        unsigned: &UnsignedTransaction,
    ) -> Result<SignedTransaction, EngineError> {
        let signed = signing::sign(self.signer.as_ref(), &self.chain, unsigned).await?;
        debug!(inputs = unsigned.inputs.len(), "signed transaction");
        Ok(signed)
    }

    pub async fn broadcast(&self, signed: &SignedTransaction) -> Result<String, EngineError> {
        signing::broadcast(self.ledger.as_ref(), signed).await
    }

    // --- Live events ---

    /// Subscribe to the account at `account_index` / `variant`. Returns the subscription id.
    pub async fn subscribe(
        &self,
        account_index: u32,
        variant: AccountVariant,
        on_message: MessageHandler,
        on_error: ErrorHandler,
    ) -> Result<String, EngineError> {
        let path = self.chain.account_path(variant, account_index);
        let id = subscription_id(&path, variant)
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        let pubkey = self.derive_public_key(&path, Some(variant)).await?;
        let account = self.get_account(pubkey.as_str()).await?;

        self.subscriptions
            .subscribe(&id, account.address_list(), on_message, on_error)
            .await?;
        Ok(id)
    }

    /// Subscribe `id` to an explicit address set.
    pub async fn subscribe_addresses(
        &self,
        id: &str,
        addresses: Vec<String>,
        on_message: MessageHandler,
        on_error: ErrorHandler,
    ) -> Result<(), EngineError> {
        if id.trim().is_empty() {
            return Err(EngineError::InvalidInput("subscription id is empty".into()));
        }
        self.subscriptions.subscribe(id, addresses, on_message, on_error).await
    }

    /// Tear down `id`, or everything when `None`. Unknown ids are a no-op.
    pub async fn unsubscribe(&self, id: Option<&str>) -> Result<(), EngineError> {
        self.subscriptions.unsubscribe(id).await
    }

    pub async fn close(&self) -> Result<(), EngineError> {
        self.subscriptions.close().await
    }

    pub async fn subscription_state(&self, id: &str) -> SubscriptionState {
        self.subscriptions.state(id).await
    }
}
