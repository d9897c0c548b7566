//! Signing handoff, address requests and broadcast.

use tracing::info;

use satchel_core::chain::{variant_spec, AccountVariant, ChainParams};
use satchel_core::path::AccountPath;
use satchel_core::traits::{LedgerClient, Signer};
use satchel_core::types::{AddressRequest, SignedTransaction, UnsignedTransaction};

use crate::error::EngineError;

/// Hand `unsigned` to the signer and return its serialized result.
pub async fn sign(
    signer: &dyn Signer,
    chain: &ChainParams,
    unsigned: &UnsignedTransaction,
) -> Result<SignedTransaction, EngineError> {
    if !signer.supports_chain(chain) {
        return Err(EngineError::SignerUnsupported(format!(
            "signer cannot sign {} transactions",
            chain.name
        )));
    }
    let signed = signer
        .sign_transaction(unsigned)
        .await
        .map_err(EngineError::signer("sign_transaction"))?
        .ok_or_else(|| EngineError::SigningFailed("signer returned no result".into()))?;
    if signed.serialized_tx.trim().is_empty() {
        return Err(EngineError::SigningFailed(
            "signer returned an empty transaction".into(),
        ));
    }
    Ok(signed)
}

/// Submit a signed transaction. The ledger's acknowledgment is returned verbatim.
pub async fn broadcast(
    ledger: &dyn LedgerClient,
    signed: &SignedTransaction,
) -> Result<String, EngineError> {
    let txid = ledger
        .send_tx(&signed.serialized_tx)
        .await
        .map_err(EngineError::ledger("send_tx"))?;
    info!(%txid, bytes = signed.serialized_tx.len() / 2, "broadcast transaction");
    Ok(txid)
}

/// Ask the signer for the address at a full `path`.
pub async fn request_address(
    signer: &dyn Signer,
    chain: &ChainParams,
    path: &AccountPath,
    variant: AccountVariant,
    show_display: bool,
) -> Result<String, EngineError> {
    if !signer.supports_chain(chain) {
        return Err(EngineError::SignerUnsupported(format!(
            "signer cannot derive {} addresses",
            chain.name
        )));
    }
    let request = AddressRequest {
        coin: chain.coin.to_string(),
        path: path
            .to_derivation_path()
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?,
        script_type: variant_spec(variant).input_script,
        show_display,
    };
    signer
        .get_address(&request)
        .await
        .map_err(EngineError::signer("get_address"))?
        .filter(|a| !a.is_empty())
        .ok_or_else(|| {
            EngineError::SigningFailed(format!("no address returned for {}", request.path))
        })
}
