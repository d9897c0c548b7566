//! Extended public key derivation and variant-tagged encoding.
//!
//! Keys are derived by the external signer; this module never touches
//! private material. What it does own is the encoding: the same BIP-32
//! payload is re-serialized with the version bytes of the account variant
//! (`xpub`/`ypub`/`zpub` on mainnet, `tpub`/`upub`/`vpub` on test networks)
//! so downstream consumers can tell the script style from the key alone.
//! Re-encoding touches only the first four bytes and is always reversible.

use serde::{Deserialize, Serialize};
use std::fmt;

use satchel_core::chain::{
    variant_for_key_version, variant_spec, AccountVariant, ChainParams, Curve, Network,
};
use satchel_core::constants::EXTENDED_KEY_LEN;
use satchel_core::error::KeyEncodingError;
use satchel_core::path::AccountPath;
use satchel_core::traits::Signer;
use satchel_core::types::PublicKeyRequest;

use crate::error::EngineError;

/// Extended public key of one account root. Owned by the caller's session.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyMaterial {
    pub extended_key: String,
}

impl PublicKeyMaterial {
    pub fn as_str(&self) -> &str {
        &self.extended_key
    }

    /// Variant and network implied by the key's version bytes.
    pub fn variant(&self) -> Result<(AccountVariant, Network), KeyEncodingError> {
        key_variant(&self.extended_key)
    }
}

impl fmt::Debug for PublicKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.extended_key.chars().take(12).collect();
        f.debug_struct("PublicKeyMaterial")
            .field("extended_key", &format_args!("{prefix}..."))
            .finish()
    }
}

impl fmt::Display for PublicKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.extended_key)
    }
}

/// Derive the account-root extended public key through `signer`.
///
/// With `variant`, the key is re-encoded for that variant on the chain's
/// network. Without one, the signer's encoding is returned unchanged and the
/// chain's default variant selects the script type of the request.
pub async fn derive_public_key(
    signer: &dyn Signer,
    chain: &ChainParams,
    path: &AccountPath,
    variant: Option<AccountVariant>,
) -> Result<PublicKeyMaterial, EngineError> {
    if !signer.supports_curve(Curve::Secp256k1) {
        return Err(EngineError::SignerUnsupported(
            "signer cannot derive secp256k1 keys".into(),
        ));
    }
    let script_variant = variant.unwrap_or_else(|| chain.default_variant());
    if !chain.supports(script_variant) {
        return Err(EngineError::InvalidInput(format!(
            "{} does not support {script_variant} accounts",
            chain.name
        )));
    }

    let request = PublicKeyRequest {
        coin: chain.coin.to_string(),
        path: path
            .root()
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?,
        curve: Curve::Secp256k1,
        script_type: variant_spec(script_variant).input_script,
        show_display: false,
    };
    let keys = signer
        .get_public_keys(std::slice::from_ref(&request))
        .await
        .map_err(EngineError::signer("get_public_keys"))?;

    let raw = keys
        .into_iter()
        .next()
        .flatten()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            EngineError::SignerUnsupported(format!("no public key returned for {}", request.path))
        })?;

    let extended_key = match variant {
        Some(v) => encode_for_variant(&raw, v, chain.network)?,
        None => raw,
    };
    tracing::debug!(path = %request.path, variant = %script_variant, "derived account public key");
    Ok(PublicKeyMaterial { extended_key })
}

/// Re-encode an extended public key with the version bytes of `variant` on `network`.
pub fn encode_for_variant(
    key: &str,
    variant: AccountVariant,
    network: Network,
) -> Result<String, KeyEncodingError> {
    let mut payload = decode_extended_key(key)?;
    payload[..4].copy_from_slice(&variant_spec(variant).key_version(network));
    Ok(bs58::encode(payload).with_check().into_string())
}

/// Restore the plain BIP-32 encoding (`xpub` or `tpub`) of any variant-tagged key.
pub fn canonical_encoding(key: &str) -> Result<String, KeyEncodingError> {
    let (_, network) = key_variant(key)?;
    encode_for_variant(key, AccountVariant::Legacy, network)
}

/// Variant and network implied by an extended key's version bytes.
pub fn key_variant(key: &str) -> Result<(AccountVariant, Network), KeyEncodingError> {
    let payload = decode_extended_key(key)?;
    let version = [payload[0], payload[1], payload[2], payload[3]];
    variant_for_key_version(version)
        .ok_or_else(|| KeyEncodingError::UnknownVersion(hex::encode(version)))
}

/// Base58check-decode an extended key and check its payload length.
fn decode_extended_key(key: &str) -> Result<Vec<u8>, KeyEncodingError> {
    let payload = bs58::decode(key.trim())
        .with_check(None)
        .into_vec()
        .map_err(|e| KeyEncodingError::InvalidBase58(e.to_string()))?;
    if payload.len() != EXTENDED_KEY_LEN {
        return Err(KeyEncodingError::InvalidLength(payload.len()));
    }
    Ok(payload)
}
