//! Normalized transaction events.
//!
//! Live feed messages and history pages share one shape, [`TxEvent`], built
//! relative to the account's own address set: inputs spending from an own
//! address become [`TransferKind::Send`], outputs paying one become
//! [`TransferKind::Receive`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use satchel_core::error::AmountError;
use satchel_core::types::{parse_amount, LedgerTx, LedgerTxIo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Confirmed,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Send,
    Receive,
}

/// Value moved from or to one of the account's addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub kind: TransferKind,
    pub address: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxEvent {
    pub txid: String,
    pub block_hash: Option<String>,
    pub block_height: Option<u64>,
    pub timestamp: Option<u64>,
    pub confirmations: u64,
    pub status: TxStatus,
    pub transfers: Vec<Transfer>,
    pub fee: Option<u64>,
}

impl TxEvent {
    /// Normalize a ledger transaction against `own` addresses.
    pub fn from_ledger(tx: &LedgerTx, own: &HashSet<String>) -> Result<Self, AmountError> {
        let mut transfers = Vec::new();
        collect(&tx.vin, own, TransferKind::Send, &mut transfers)?;
        collect(&tx.vout, own, TransferKind::Receive, &mut transfers)?;

        let fee = tx.fee.as_deref().map(parse_amount).transpose()?;
        let status = if tx.confirmations > 0 {
            TxStatus::Confirmed
        } else {
            TxStatus::Pending
        };

        Ok(Self {
            txid: tx.txid.clone(),
            block_hash: tx.block_hash.clone(),
            block_height: tx.block_height,
            timestamp: tx.timestamp,
            confirmations: tx.confirmations,
            status,
            transfers,
            fee,
        })
    }

    /// Received minus sent, across all transfers.
    pub fn net_value(&self) -> i128 {
        self.transfers
            .iter()
            .map(|t| match t.kind {
                TransferKind::Receive => i128::from(t.value),
                TransferKind::Send => -i128::from(t.value),
            })
            .sum()
    }
}

// A multi-address io is credited once, to its first own address.
fn collect(
    ios: &[LedgerTxIo],
    own: &HashSet<String>,
    kind: TransferKind,
    out: &mut Vec<Transfer>,
) -> Result<(), AmountError> {
    for io in ios {
        if let Some(address) = io.addresses.iter().find(|a| own.contains(*a)) {
            out.push(Transfer {
                kind,
                address: address.clone(),
                value: parse_amount(&io.value)?,
            });
        }
    }
    Ok(())
}

/// One page of normalized history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHistoryPage {
    /// Pass back to fetch the next page; `None` on the last page.
    pub cursor: Option<String>,
    pub events: Vec<TxEvent>,
}
