//! Error types shared by the engine and its collaborators.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount")] Empty,
    #[error("amount is not an integer in the smallest unit: {0}")] NotAnInteger(String),
    #[error("negative amount: {0}")] Negative(String),
    #[error("amount overflow: {0}")] Overflow(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("empty derivation path")] Empty,
    #[error("derivation path must start with 'm'")] MissingRoot,
    #[error("invalid path component: {0}")] InvalidComponent(String),
    #[error("index out of range: {0}")] IndexOutOfRange(u32),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyEncodingError {
    #[error("invalid base58check: {0}")] InvalidBase58(String),
    #[error("invalid extended key length: {0}")] InvalidLength(usize),
    #[error("unknown extended key version: {0}")] UnknownVersion(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkParseError {
    #[error("unknown network: {0}")] Unknown(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("request failed: {0}")] Request(String),
    #[error("not found: {0}")] NotFound(String),
    #[error("malformed response: {0}")] Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("rejected by signer: {0}")] Rejected(String),
    #[error("device error: {0}")] Device(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("channel not open")] NotOpen,
    #[error("connection closed: {0}")] ConnectionClosed(String),
    #[error("protocol error: {0}")] Protocol(String),
}
