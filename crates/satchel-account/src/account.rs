//! Account aggregation: normalized account snapshots and the spendable set.
//!
//! Ledger amounts arrive as decimal strings and are parsed strictly; any
//! value that is not an exact integer in the smallest unit is a malformed
//! response, never rounded.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use satchel_core::path::DerivationPath;
use satchel_core::types::{
    parse_amount, parse_signed_amount, LedgerAccount, LedgerUtxo, OutPoint, SelectionCandidate,
    Txid,
};

use crate::error::EngineError;

/// One address of an account with its confirmed balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAddress {
    pub address: String,
    pub balance: u64,
}

/// Point-in-time account snapshot. Rebuilt on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub pubkey: String,
    /// `confirmed_balance + unconfirmed_balance`.
    pub balance: u64,
    pub confirmed_balance: u64,
    /// Pending delta; negative while spends are unconfirmed.
    pub unconfirmed_balance: i64,
    pub addresses: Vec<AccountAddress>,
    pub next_change_index: u32,
    pub next_receive_index: u32,
}

impl Account {
    /// Normalize a ledger account response.
    pub fn from_ledger(raw: LedgerAccount) -> Result<Self, EngineError> {
        const OP: &str = "get_account";

        let confirmed_balance =
            parse_amount(&raw.balance).map_err(|e| EngineError::malformed(OP, e))?;
        let unconfirmed_balance = parse_signed_amount(&raw.unconfirmed_balance)
            .map_err(|e| EngineError::malformed(OP, e))?;

        let sum = i128::from(confirmed_balance) + i128::from(unconfirmed_balance);
        let balance = u64::try_from(sum).map_err(|_| {
            EngineError::malformed(
                OP,
                format!("balance {confirmed_balance} + {unconfirmed_balance} is out of range"),
            )
        })?;

        let addresses = raw
            .addresses
            .into_iter()
            .map(|a| {
                Ok(AccountAddress {
                    balance: parse_amount(&a.balance).map_err(|e| EngineError::malformed(OP, e))?,
                    address: a.pubkey,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        Ok(Self {
            pubkey: raw.pubkey,
            balance,
            confirmed_balance,
            unconfirmed_balance,
            addresses,
            next_change_index: raw.next_change_address_index.unwrap_or(0),
            next_receive_index: raw.next_receive_address_index.unwrap_or(0),
        })
    }

    /// The account's address strings, in ledger order.
    pub fn address_list(&self) -> Vec<String> {
        self.addresses.iter().map(|a| a.address.clone()).collect()
    }
}

/// An unspent output as normalized from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub value: u64,
    /// Derivation path of the owning key; `None` makes the output unspendable.
    pub path: Option<DerivationPath>,
    pub address: Option<String>,
    pub confirmations: u64,
}

impl UnspentOutput {
    pub fn from_ledger(raw: LedgerUtxo) -> Result<Self, EngineError> {
        const OP: &str = "get_utxos";

        let txid: Txid = raw.txid.parse().map_err(|e| EngineError::malformed(OP, e))?;
        let value = parse_amount(&raw.value).map_err(|e| EngineError::malformed(OP, e))?;
        let path = match raw.path.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(p) => Some(
                p.parse::<DerivationPath>()
                    .map_err(|e| EngineError::malformed(OP, format!("{p}: {e}")))?,
            ),
        };

        Ok(Self {
            outpoint: OutPoint {
                txid,
                vout: raw.vout,
            },
            value,
            path,
            address: raw.address,
            confirmations: raw.confirmations,
        })
    }
}

/// An output this account can sign for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendableOutput {
    pub outpoint: OutPoint,
    pub value: u64,
    pub path: DerivationPath,
    pub address: Option<String>,
    pub confirmations: u64,
}

/// Spendable outputs plus the number of outputs filtered away.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpendableSet {
    outputs: Vec<SpendableOutput>,
    index: HashMap<OutPoint, usize>,
    /// Outputs dropped for lacking a derivation path.
    pub excluded: usize,
}

impl SpendableSet {
    /// Keep only outputs with a known derivation path; count the rest.
    ///
    /// An outpoint reported twice is a malformed ledger response.
    pub fn from_utxos(utxos: Vec<UnspentOutput>) -> Result<Self, EngineError> {
        let mut set = Self::default();
        let mut seen = HashSet::with_capacity(utxos.len());
        for utxo in utxos {
            if !seen.insert(utxo.outpoint) {
                return Err(EngineError::malformed(
                    "get_utxos",
                    format!("outpoint {} reported twice", utxo.outpoint),
                ));
            }
            match utxo.path {
                Some(path) => {
                    set.index.insert(utxo.outpoint, set.outputs.len());
                    set.outputs.push(SpendableOutput {
                        outpoint: utxo.outpoint,
                        value: utxo.value,
                        path,
                        address: utxo.address,
                        confirmations: utxo.confirmations,
                    });
                }
                None => set.excluded += 1,
            }
        }
        if set.excluded > 0 {
            debug!(
                spendable = set.outputs.len(),
                excluded = set.excluded,
                "excluded outputs without a derivation path"
            );
        }
        Ok(set)
    }

    /// Parse and filter raw ledger outputs.
    pub fn from_ledger(raw: Vec<LedgerUtxo>) -> Result<Self, EngineError> {
        let utxos = raw
            .into_iter()
            .map(UnspentOutput::from_ledger)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_utxos(utxos)
    }

    pub fn outputs(&self) -> &[SpendableOutput] {
        &self.outputs
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&SpendableOutput> {
        self.index.get(outpoint).map(|&i| &self.outputs[i])
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Sum of spendable values, `None` on overflow.
    pub fn total_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value))
    }

    /// Selection candidates, each costing `input_bytes` to spend.
    pub fn candidates(&self, input_bytes: u64) -> Vec<SelectionCandidate> {
        self.outputs
            .iter()
            .map(|o| SelectionCandidate {
                outpoint: o.outpoint,
                value: o.value,
                input_bytes,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{txid, utxo};
    use satchel_core::error::LedgerError;
    use satchel_core::types::LedgerAddress;

    fn ledger_account(balance: &str, unconfirmed: &str) -> LedgerAccount {
        LedgerAccount {
            pubkey: "zpub".into(),
            balance: balance.into(),
            unconfirmed_balance: unconfirmed.into(),
            addresses: vec![LedgerAddress {
                pubkey: "bc1qa".into(),
                balance: "100".into(),
            }],
            next_change_address_index: Some(2),
            next_receive_address_index: None,
        }
    }

    #[test]
    fn balance_sums_confirmed_and_unconfirmed() {
        let acct = Account::from_ledger(ledger_account("80000", "-1500")).unwrap();
        assert_eq!(acct.balance, 78_500);
        assert_eq!(acct.confirmed_balance, 80_000);
        assert_eq!(acct.unconfirmed_balance, -1_500);
        assert_eq!(
            acct.balance as i128,
            acct.confirmed_balance as i128 + acct.unconfirmed_balance as i128
        );
    }

    #[test]
    fn counters_pass_through_and_default() {
        let acct = Account::from_ledger(ledger_account("0", "0")).unwrap();
        assert_eq!(acct.next_change_index, 2);
        assert_eq!(acct.next_receive_index, 0);
        assert_eq!(acct.address_list(), vec!["bc1qa".to_string()]);
    }

    #[test]
    fn negative_balance_is_malformed() {
        let err = Account::from_ledger(ledger_account("100", "-200")).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Ledger {
                operation: "get_account",
                source: LedgerError::Malformed(_)
            }
        ));
    }

    #[test]
    fn fractional_balance_is_malformed() {
        let err = Account::from_ledger(ledger_account("0.5", "0")).unwrap_err();
        assert!(matches!(err, EngineError::Ledger { .. }));
    }

    #[test]
    fn balance_overflow_is_malformed() {
        let err = Account::from_ledger(ledger_account(&u64::MAX.to_string(), "1")).unwrap_err();
        assert!(matches!(err, EngineError::Ledger { .. }));
    }

    #[test]
    fn unspent_output_parses_path() {
        let out = UnspentOutput::from_ledger(utxo(1, 5_000, Some("m/84'/0'/0'/0/3"))).unwrap();
        assert_eq!(out.value, 5_000);
        assert_eq!(out.outpoint.txid, txid(1));
        assert_eq!(out.path.unwrap().to_string(), "m/84'/0'/0'/0/3");
    }

    #[test]
    fn unspent_output_rejects_bad_value() {
        let mut raw = utxo(1, 0, None);
        raw.value = "12.5".into();
        assert!(UnspentOutput::from_ledger(raw).is_err());
    }

    #[test]
    fn unspent_output_rejects_bad_txid() {
        let mut raw = utxo(1, 10, None);
        raw.txid = "xyz".into();
        assert!(UnspentOutput::from_ledger(raw).is_err());
    }

    #[test]
    fn spendable_set_counts_exclusions() {
        let set = SpendableSet::from_ledger(vec![
            utxo(1, 50_000, Some("m/44'/0'/0'/0/0")),
            utxo(2, 30_000, None),
            utxo(3, 10_000, Some("")),
            utxo(4, 20_000, Some("m/44'/0'/0'/1/0")),
        ])
        .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.excluded, 2);
        assert_eq!(set.total_value(), Some(70_000));
        assert!(set.get(&OutPoint { txid: txid(2), vout: 0 }).is_none());
        assert_eq!(
            set.get(&OutPoint { txid: txid(4), vout: 0 }).unwrap().value,
            20_000
        );
    }

    #[test]
    fn candidates_carry_input_size() {
        let set = SpendableSet::from_ledger(vec![utxo(1, 1_000, Some("m/84'/0'/0'/0/0"))]).unwrap();
        let candidates = set.candidates(68);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].input_bytes, 68);
        assert_eq!(candidates[0].value, 1_000);
    }

    #[test]
    fn duplicate_outpoint_is_malformed() {
        let err = SpendableSet::from_ledger(vec![
            utxo(1, 50_000, Some("m/84'/0'/0'/0/0")),
            utxo(1, 50_000, Some("m/84'/0'/0'/0/0")),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Ledger {
                operation: "get_utxos",
                source: LedgerError::Malformed(_)
            }
        ));

        // Same txid, different vout, is two outputs.
        let mut second = utxo(1, 20_000, Some("m/84'/0'/0'/0/1"));
        second.vout = 1;
        let set =
            SpendableSet::from_ledger(vec![utxo(1, 50_000, Some("m/84'/0'/0'/0/0")), second])
                .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.total_value(), Some(70_000));
    }
}
