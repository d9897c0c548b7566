//! Tiered fee estimation.
//!
//! The ledger quotes fee rates per 1024 bytes. Each tier is converted to a
//! per-byte rate and the builder's selection step is run once per tier,
//! against a single shared account snapshot, to preview the total fee.

use serde::{Deserialize, Serialize};
use tracing::debug;

use satchel_core::chain::AccountVariant;
use satchel_core::constants::BYTES_PER_KILOBYTE;
use satchel_core::types::{FeeTier, NetworkFees};

use crate::account::SpendableSet;
use crate::builder::{SpendIntent, TransactionBuilder};
use crate::error::EngineError;

/// Convert a per-kilobyte rate to a per-byte rate.
///
/// Rounds half up, and never to zero when the reported rate is positive.
/// Negative rates carry no estimate.
///
/// # Examples
///
/// ```
/// use satchel_account::fees::per_byte_rate;
/// assert_eq!(per_byte_rate(20_480), Some(20));
/// assert_eq!(per_byte_rate(100), Some(1));
/// assert_eq!(per_byte_rate(0), Some(0));
/// assert_eq!(per_byte_rate(-1), None);
/// ```
pub fn per_byte_rate(sats_per_kilo_byte: i64) -> Option<u64> {
    let rate = u64::try_from(sats_per_kilo_byte).ok()?;
    let round_up = rate % BYTES_PER_KILOBYTE >= BYTES_PER_KILOBYTE / 2;
    let rounded = rate / BYTES_PER_KILOBYTE + u64::from(round_up);
    Some(if rate > 0 { rounded.max(1) } else { 0 })
}

/// Per-byte rate for `tier`, or [`EngineError::FeeDataUnavailable`].
pub fn tier_rate(fees: &NetworkFees, tier: FeeTier) -> Result<u64, EngineError> {
    fees.tier(tier)
        .and_then(|sample| sample.sats_per_kilo_byte)
        .and_then(per_byte_rate)
        .ok_or(EngineError::FeeDataUnavailable(tier))
}

/// Request for a fee preview. The fee rate is what is being estimated, so it is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuery {
    pub recipient: Option<String>,
    /// Required unless `send_max` is set.
    pub amount: Option<u64>,
    pub send_max: bool,
    /// Defaults to the chain's default variant.
    pub variant: Option<AccountVariant>,
    pub account_index: u32,
}

impl FeeQuery {
    /// Turn the query into a zero-rate intent, or report the first missing field.
    pub fn to_intent(&self, default_variant: AccountVariant) -> Result<SpendIntent, EngineError> {
        let recipient = self
            .recipient
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or(EngineError::MissingParameter("recipient"))?;
        if !self.send_max && self.amount.is_none() {
            return Err(EngineError::MissingParameter("amount"));
        }
        Ok(SpendIntent {
            recipient: recipient.to_string(),
            amount: self.amount,
            fee_rate: 0,
            send_max: self.send_max,
            variant: self.variant.unwrap_or(default_variant),
            account_index: self.account_index,
        })
    }
}

/// Preview for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeTierEstimate {
    pub tier: FeeTier,
    pub sat_per_byte: u64,
    /// Total fee of the previewed transaction.
    pub fee: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEstimates {
    pub fast: FeeTierEstimate,
    pub average: FeeTierEstimate,
    pub slow: FeeTierEstimate,
}

impl FeeEstimates {
    pub fn get(&self, tier: FeeTier) -> &FeeTierEstimate {
        match tier {
            FeeTier::Fast => &self.fast,
            FeeTier::Average => &self.average,
            FeeTier::Slow => &self.slow,
        }
    }
}

/// Preview every tier for `intent` over one spendable snapshot.
///
/// All tier rates are resolved before any selection runs, so missing fee
/// data is reported ahead of selection failures.
pub fn estimate(
    builder: &TransactionBuilder<'_>,
    intent: &SpendIntent,
    fees: &NetworkFees,
    spendable: &SpendableSet,
) -> Result<FeeEstimates, EngineError> {
    let rates = [
        tier_rate(fees, FeeTier::Fast)?,
        tier_rate(fees, FeeTier::Average)?,
        tier_rate(fees, FeeTier::Slow)?,
    ];

    let preview = |tier: FeeTier, sat_per_byte: u64| -> Result<FeeTierEstimate, EngineError> {
        let intent = intent.clone().with_fee_rate(sat_per_byte);
        let selection = builder.select(&intent, spendable)?;
        debug!(%tier, sat_per_byte, fee = selection.fee, "fee preview");
        Ok(FeeTierEstimate {
            tier,
            sat_per_byte,
            fee: selection.fee,
        })
    };

    Ok(FeeEstimates {
        fast: preview(FeeTier::Fast, rates[0])?,
        average: preview(FeeTier::Average, rates[1])?,
        slow: preview(FeeTier::Slow, rates[2])?,
    })
}
