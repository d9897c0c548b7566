//! Default coin selection strategy.
//!
//! [`AccumulativeSelector`] is a deterministic baseline: it spends the
//! largest outputs first and stops as soon as the targets plus fee are
//! covered. It makes no attempt to minimize fee or avoid change; callers
//! that need an optimizing strategy inject their own [`CoinSelector`].

use satchel_core::constants::{DUST_THRESHOLD, OUTPUT_BYTES, TX_OVERHEAD_BYTES};
use satchel_core::traits::CoinSelector;
use satchel_core::types::{Selection, SelectedOutput, SelectionCandidate, SelectionTarget};

/// Largest-first accumulative selector.
///
/// Fee is `(overhead + input bytes + output bytes) * fee_rate`. Change is
/// added only when it would exceed the dust threshold; otherwise the excess
/// goes to the fee, so a selection always satisfies
/// `sum(outputs) + fee == sum(inputs)`.
#[derive(Debug, Clone, Copy)]
pub struct AccumulativeSelector {
    dust_threshold: u64,
}

impl AccumulativeSelector {
    pub fn new() -> Self {
        Self {
            dust_threshold: DUST_THRESHOLD,
        }
    }

    /// Override the change dust threshold (default: [`DUST_THRESHOLD`]).
    pub fn with_dust_threshold(dust_threshold: u64) -> Self {
        Self { dust_threshold }
    }

    pub fn dust_threshold(&self) -> u64 {
        self.dust_threshold
    }
}

impl Default for AccumulativeSelector {
    fn default() -> Self {
        Self::new()
    }
}

/// Fee for a transaction of `input_bytes` of inputs and `outputs` outputs.
fn fee_for(input_bytes: u64, outputs: usize, fee_rate: u64) -> Option<u64> {
    let output_bytes = OUTPUT_BYTES.checked_mul(outputs as u64)?;
    TX_OVERHEAD_BYTES
        .checked_add(input_bytes)?
        .checked_add(output_bytes)?
        .checked_mul(fee_rate)
}

/// Largest value first; outpoint order breaks ties so results are stable.
fn sorted(candidates: &[SelectionCandidate]) -> Vec<SelectionCandidate> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| b.value.cmp(&a.value).then(a.outpoint.cmp(&b.outpoint)));
    sorted
}

impl CoinSelector for AccumulativeSelector {
    fn select(
        &self,
        candidates: &[SelectionCandidate],
        targets: &[SelectionTarget],
        fee_rate: u64,
    ) -> Option<Selection> {
        if candidates.is_empty() || targets.is_empty() {
            return None;
        }
        let target_total = targets
            .iter()
            .try_fold(0u64, |acc, t| acc.checked_add(t.value))?;

        let mut selected = Vec::new();
        let mut total_in: u64 = 0;
        let mut input_bytes: u64 = 0;

        for candidate in sorted(candidates) {
            selected.push(candidate);
            total_in = total_in.checked_add(candidate.value)?;
            input_bytes = input_bytes.checked_add(candidate.input_bytes)?;

            let fee = fee_for(input_bytes, targets.len(), fee_rate)?;
            let Some(excess) = total_in
                .checked_sub(target_total)
                .and_then(|rest| rest.checked_sub(fee))
            else {
                continue;
            };

            let mut outputs: Vec<SelectedOutput> = targets
                .iter()
                .map(|t| SelectedOutput {
                    address: Some(t.address.clone()),
                    value: t.value,
                })
                .collect();

            // Change pays for its own output bytes.
            let fee_with_change = fee_for(input_bytes, targets.len() + 1, fee_rate)?;
            let change = (total_in - target_total).checked_sub(fee_with_change);
            let fee = match change {
                Some(change) if change > self.dust_threshold => {
                    outputs.push(SelectedOutput {
                        address: None,
                        value: change,
                    });
                    fee_with_change
                }
                _ => fee + excess,
            };

            return Some(Selection {
                inputs: selected,
                outputs,
                fee,
            });
        }

        None
    }

    fn sweep(
        &self,
        candidates: &[SelectionCandidate],
        address: &str,
        fee_rate: u64,
    ) -> Option<Selection> {
        if candidates.is_empty() {
            return None;
        }
        let inputs = sorted(candidates);
        let total_in = inputs.iter().try_fold(0u64, |acc, c| acc.checked_add(c.value))?;
        let input_bytes = inputs
            .iter()
            .try_fold(0u64, |acc, c| acc.checked_add(c.input_bytes))?;

        let fee = fee_for(input_bytes, 1, fee_rate)?;
        let value = total_in.checked_sub(fee)?;
        if value <= self.dust_threshold {
            return None;
        }

        Some(Selection {
            inputs,
            outputs: vec![SelectedOutput {
                address: Some(address.to_string()),
                value,
            }],
            fee,
        })
    }
}
