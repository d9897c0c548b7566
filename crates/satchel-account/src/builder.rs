//! Transaction builder: input selection and structural assembly.
//!
//! Building happens in two steps:
//! 1. [`TransactionBuilder::select`] validates the intent and delegates to
//!    the injected [`CoinSelector`] (`select` for an exact amount, `sweep`
//!    for send-max).
//! 2. [`TransactionBuilder::assemble`] maps the selection onto the account:
//!    inputs get their derivation paths, change gets a path on the change
//!    branch, and value conservation is checked before anything is returned.
//!
//! The split lets the engine fetch previous transactions for the selected
//! inputs between the two steps. [`TransactionBuilder::build`] runs both.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use satchel_core::chain::{variant_spec, AccountVariant, ChainParams, OutputScriptType};
use satchel_core::traits::CoinSelector;
use satchel_core::types::{
    Selection, SelectionTarget, Txid, UnsignedInput, UnsignedOutput, UnsignedTransaction,
};

use crate::account::{Account, SpendableSet};
use crate::error::EngineError;

/// What the caller wants to pay, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendIntent {
    /// Destination address.
    pub recipient: String,
    /// Amount in the smallest unit. Ignored in send-max mode.
    pub amount: Option<u64>,
    /// Fee rate per byte.
    pub fee_rate: u64,
    /// Spend every spendable output to the recipient, with no change.
    pub send_max: bool,
    pub variant: AccountVariant,
    /// Account whose change branch receives change.
    pub account_index: u32,
}

impl SpendIntent {
    /// Pay `amount` to `recipient` from account 0.
    pub fn exact(
        recipient: impl Into<String>,
        amount: u64,
        fee_rate: u64,
        variant: AccountVariant,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            amount: Some(amount),
            fee_rate,
            send_max: false,
            variant,
            account_index: 0,
        }
    }

    /// Sweep account 0 to `recipient`.
    pub fn send_max(recipient: impl Into<String>, fee_rate: u64, variant: AccountVariant) -> Self {
        Self {
            recipient: recipient.into(),
            amount: None,
            fee_rate,
            send_max: true,
            variant,
            account_index: 0,
        }
    }

    pub fn with_account(mut self, account_index: u32) -> Self {
        self.account_index = account_index;
        self
    }

    pub fn with_fee_rate(mut self, fee_rate: u64) -> Self {
        self.fee_rate = fee_rate;
        self
    }
}

/// Builds unsigned transactions for one chain with one selection strategy.
pub struct TransactionBuilder<'a> {
    chain: &'a ChainParams,
    selector: &'a dyn CoinSelector,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(chain: &'a ChainParams, selector: &'a dyn CoinSelector) -> Self {
        Self { chain, selector }
    }

    /// Check the intent's own fields.
    pub fn validate(&self, intent: &SpendIntent) -> Result<(), EngineError> {
        if intent.recipient.trim().is_empty() {
            return Err(EngineError::InvalidInput("recipient address is empty".into()));
        }
        if !self.chain.supports(intent.variant) {
            return Err(EngineError::InvalidInput(format!(
                "{} does not support {} accounts",
                self.chain.name, intent.variant
            )));
        }
        if !intent.send_max {
            match intent.amount {
                None => return Err(EngineError::InvalidInput("amount is required".into())),
                Some(0) => return Err(EngineError::InvalidInput("amount must be positive".into())),
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Validate `intent` and run the selection strategy over `spendable`.
    pub fn select(
        &self,
        intent: &SpendIntent,
        spendable: &SpendableSet,
    ) -> Result<Selection, EngineError> {
        self.validate(intent)?;
        if spendable.is_empty() {
            return Err(EngineError::SelectionFailed("no spendable outputs".into()));
        }

        let candidates = spendable.candidates(variant_spec(intent.variant).input_bytes);
        let selection = if intent.send_max {
            self.selector
                .sweep(&candidates, &intent.recipient, intent.fee_rate)
        } else {
            let target = SelectionTarget {
                address: intent.recipient.clone(),
                value: intent.amount.unwrap_or_default(),
            };
            self.selector
                .select(&candidates, std::slice::from_ref(&target), intent.fee_rate)
        };

        let selection = selection.ok_or_else(|| {
            EngineError::SelectionFailed(format!(
                "no selection covers the intent at {} per byte",
                intent.fee_rate
            ))
        })?;
        if selection.inputs.is_empty() {
            return Err(EngineError::SelectionFailed("selection has no inputs".into()));
        }
        if selection.outputs.is_empty() {
            return Err(EngineError::SelectionFailed("selection has no outputs".into()));
        }

        debug!(
            inputs = selection.inputs.len(),
            outputs = selection.outputs.len(),
            fee = selection.fee,
            send_max = intent.send_max,
            "selected inputs"
        );
        Ok(selection)
    }

    /// Map a selection onto the account snapshot.
    ///
    /// `prev_txs` supplies raw previous transactions by txid; inputs whose
    /// txid is absent get none. The change index is read from `account`
    /// only, so one build is consistent even if the ledger moves meanwhile.
    /// Every input must derive from the intent's account root, since that
    /// root fixes both the input script type and the change branch.
    pub fn assemble(
        &self,
        intent: &SpendIntent,
        account: &Account,
        spendable: &SpendableSet,
        selection: Selection,
        prev_txs: &HashMap<Txid, String>,
    ) -> Result<UnsignedTransaction, EngineError> {
        let spec = variant_spec(intent.variant);
        let account_path = self.chain.account_path(intent.variant, intent.account_index);
        let root = account_path
            .root()
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;

        let mut inputs = Vec::with_capacity(selection.inputs.len());
        let mut seen = HashSet::with_capacity(selection.inputs.len());
        for candidate in &selection.inputs {
            if !seen.insert(candidate.outpoint) {
                return Err(EngineError::SelectionFailed(format!(
                    "input {} selected twice",
                    candidate.outpoint
                )));
            }
            let owned = spendable
                .get(&candidate.outpoint)
                .ok_or(EngineError::UnspendableInput(candidate.outpoint))?;
            if !owned.path.indices().starts_with(root.indices()) {
                return Err(EngineError::InvalidInput(format!(
                    "input {} at {} is outside {} account {root}",
                    owned.outpoint, owned.path, intent.variant
                )));
            }
            inputs.push(UnsignedInput {
                outpoint: owned.outpoint,
                amount: owned.value,
                path: owned.path.clone(),
                script_type: spec.input_script,
                prev_tx_hex: prev_txs.get(&owned.outpoint.txid).cloned(),
            });
        }

        let mut outputs = Vec::with_capacity(selection.outputs.len());
        for output in selection.outputs {
            outputs.push(match output.address {
                Some(address) => UnsignedOutput::Spend {
                    address,
                    amount: output.value,
                    script_type: OutputScriptType::PayToAddress,
                },
                None => UnsignedOutput::Change {
                    path: account_path
                        .change_path(account.next_change_index)
                        .map_err(|e| EngineError::InvalidInput(e.to_string()))?,
                    amount: output.value,
                    script_type: spec.change_script,
                },
            });
        }

        let tx = UnsignedTransaction {
            coin: self.chain.coin.to_string(),
            inputs,
            outputs,
            fee: selection.fee,
        };
        if intent.send_max {
            check_sweep(&tx)?;
        }
        check_conservation(&tx)?;

        debug!(
            coin = %tx.coin,
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            fee = tx.fee,
            "assembled unsigned transaction"
        );
        Ok(tx)
    }

    /// Select and assemble without previous transactions.
    pub fn build(
        &self,
        intent: &SpendIntent,
        account: &Account,
        spendable: &SpendableSet,
    ) -> Result<UnsignedTransaction, EngineError> {
        let selection = self.select(intent, spendable)?;
        self.assemble(intent, account, spendable, selection, &HashMap::new())
    }
}

/// A sweep pays exactly one non-change output of `sum(inputs) - fee`.
fn check_sweep(tx: &UnsignedTransaction) -> Result<(), EngineError> {
    let spends = tx.outputs.iter().filter(|o| !o.is_change()).count();
    if spends != 1 || tx.outputs.len() != 1 {
        return Err(EngineError::SelectionFailed(format!(
            "sweep must produce exactly one output, got {} ({spends} non-change)",
            tx.outputs.len()
        )));
    }
    let inputs: u128 = tx.inputs.iter().map(|i| u128::from(i.amount)).sum();
    let output = u128::from(tx.outputs[0].amount());
    if inputs.checked_sub(u128::from(tx.fee)) != Some(output) {
        return Err(EngineError::ValueNotConserved {
            inputs,
            outputs: output,
            fee: tx.fee,
        });
    }
    Ok(())
}

/// `sum(outputs) + fee == sum(inputs)`: nothing is overspent, and nothing
/// leaves the transaction without being reported as fee.
fn check_conservation(tx: &UnsignedTransaction) -> Result<(), EngineError> {
    let inputs: u128 = tx.inputs.iter().map(|i| u128::from(i.amount)).sum();
    let outputs: u128 = tx.outputs.iter().map(|o| u128::from(o.amount())).sum();
    if outputs + u128::from(tx.fee) != inputs {
        return Err(EngineError::ValueNotConserved {
            inputs,
            outputs,
            fee: tx.fee,
        });
    }
    Ok(())
}
