//! Engine error types.

use satchel_core::error::{
    AmountError, KeyEncodingError, LedgerError, PathError, SignerError, TransportError,
};
use satchel_core::types::{FeeTier, OutPoint};
use thiserror::Error;

/// Errors returned by every public engine operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Caller-supplied value is malformed or out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A required request field was not provided.
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    /// The ledger reports a network this engine cannot serve.
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// The attached signer lacks a required capability.
    #[error("signer unsupported: {0}")]
    SignerUnsupported(String),

    /// No viable input/output set.
    #[error("selection failed: {0}")]
    SelectionFailed(String),

    /// The ledger has no usable fee rate for a tier.
    #[error("fee data unavailable for {0} tier")]
    FeeDataUnavailable(FeeTier),

    /// The signer produced no result.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Subscription channel failure.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// A ledger query failed.
    #[error("ledger {operation} failed: {source}")]
    Ledger {
        /// Ledger call that failed.
        operation: &'static str,
        #[source]
        source: LedgerError,
    },

    /// The signer returned an error.
    #[error("signer {operation} failed: {source}")]
    Signer {
        /// Signer call that failed.
        operation: &'static str,
        #[source]
        source: SignerError,
    },

    /// A selected input has no known derivation path.
    #[error("selected input {0} is not spendable by this account")]
    UnspendableInput(OutPoint),

    /// Outputs plus fee exceed inputs.
    #[error("value not conserved: inputs {inputs}, outputs {outputs}, fee {fee}")]
    ValueNotConserved {
        inputs: u128,
        outputs: u128,
        fee: u64,
    },

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    KeyEncoding(#[from] KeyEncodingError),
}

impl EngineError {
    /// Wrap a ledger failure with the name of the call, for use with `map_err`.
    pub fn ledger(operation: &'static str) -> impl FnOnce(LedgerError) -> Self {
        move |source| Self::Ledger { operation, source }
    }

    /// Wrap a signer failure with the name of the call, for use with `map_err`.
    pub fn signer(operation: &'static str) -> impl FnOnce(SignerError) -> Self {
        move |source| Self::Signer { operation, source }
    }

    /// A ledger response that parsed but makes no sense.
    pub fn malformed(operation: &'static str, detail: impl ToString) -> Self {
        Self::Ledger {
            operation,
            source: LedgerError::Malformed(detail.to_string()),
        }
    }
}
