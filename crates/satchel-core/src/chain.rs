//! Chain parameters and the account-variant mapping table.
//!
//! Every UTXO chain shares one engine shape. What differs between chains is
//! data: SLIP-44 coin type, supported variants, and network. What differs
//! between variants is captured in a single static table, [`VARIANT_TABLE`],
//! looked up with [`variant_spec`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NetworkParseError;
use crate::path::AccountPath;

/// Ledger network a chain instance runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network.
    #[default]
    Mainnet,
    /// Public test network.
    Testnet,
    /// Local regression-test network.
    Regtest,
}

impl Network {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Regtest => "regtest",
        }
    }

    /// Whether this network uses the test extended-key versions (tpub...).
    pub fn is_test(&self) -> bool {
        !matches!(self, Self::Mainnet)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = NetworkParseError;

    /// Accepts the names ledger indexers commonly report.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "livenet" | "bitcoin" => Ok(Self::Mainnet),
            "testnet" | "test" | "testnet3" | "testnet4" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            _ => Err(NetworkParseError::Unknown(s.to_string())),
        }
    }
}

/// Output-script convention of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountVariant {
    /// Pay-to-pubkey-hash.
    #[serde(rename = "p2pkh")]
    Legacy,
    /// Pay-to-witness-pubkey-hash nested in pay-to-script-hash.
    #[serde(rename = "p2sh-p2wpkh")]
    WrappedSegwit,
    /// Native pay-to-witness-pubkey-hash.
    #[serde(rename = "p2wpkh")]
    NativeSegwit,
}

impl AccountVariant {
    /// All variants in table order.
    pub const ALL: [AccountVariant; 3] = [Self::Legacy, Self::WrappedSegwit, Self::NativeSegwit];

    /// Short label used in subscription ids and logs.
    pub fn label(&self) -> &'static str {
        variant_spec(*self).label
    }
}

impl fmt::Display for AccountVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Signer-facing script type of a spent input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputScriptType {
    SpendAddress,
    SpendP2shWitness,
    SpendWitness,
}

/// Signer-facing script type of a created output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputScriptType {
    PayToAddress,
    PayToP2shWitness,
    PayToWitness,
}

/// Elliptic curve a signer derives keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    Secp256k1,
    Ed25519,
}

/// Everything that varies by account variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantSpec {
    pub variant: AccountVariant,
    pub label: &'static str,
    /// BIP-43 purpose of accounts using this variant.
    pub purpose: u32,
    pub input_script: InputScriptType,
    /// Script type of change outputs returning to this account.
    pub change_script: OutputScriptType,
    /// Estimated signed input size in bytes.
    pub input_bytes: u64,
    /// Extended public key version bytes on mainnet.
    pub mainnet_version: [u8; 4],
    /// Extended public key version bytes on test networks.
    pub testnet_version: [u8; 4],
}

impl VariantSpec {
    /// Version bytes for extended keys on `network`.
    pub fn key_version(&self, network: Network) -> [u8; 4] {
        if network.is_test() {
            self.testnet_version
        } else {
            self.mainnet_version
        }
    }
}

/// Variant mapping table, in [`AccountVariant::ALL`] order.
pub const VARIANT_TABLE: [VariantSpec; 3] = [
    VariantSpec {
        variant: AccountVariant::Legacy,
        label: "p2pkh",
        purpose: 44,
        input_script: InputScriptType::SpendAddress,
        change_script: OutputScriptType::PayToAddress,
        input_bytes: 148,
        mainnet_version: [0x04, 0x88, 0xb2, 0x1e], // xpub
        testnet_version: [0x04, 0x35, 0x87, 0xcf], // tpub
    },
    VariantSpec {
        variant: AccountVariant::WrappedSegwit,
        label: "p2sh-p2wpkh",
        purpose: 49,
        input_script: InputScriptType::SpendP2shWitness,
        change_script: OutputScriptType::PayToP2shWitness,
        input_bytes: 91,
        mainnet_version: [0x04, 0x9d, 0x7c, 0xb2], // ypub
        testnet_version: [0x04, 0x4a, 0x52, 0x62], // upub
    },
    VariantSpec {
        variant: AccountVariant::NativeSegwit,
        label: "p2wpkh",
        purpose: 84,
        input_script: InputScriptType::SpendWitness,
        change_script: OutputScriptType::PayToWitness,
        input_bytes: 68,
        mainnet_version: [0x04, 0xb2, 0x47, 0x46], // zpub
        testnet_version: [0x04, 0x5f, 0x1c, 0xf6], // vpub
    },
];

/// Look up the mapping for a variant.
pub fn variant_spec(variant: AccountVariant) -> &'static VariantSpec {
    match variant {
        AccountVariant::Legacy => &VARIANT_TABLE[0],
        AccountVariant::WrappedSegwit => &VARIANT_TABLE[1],
        AccountVariant::NativeSegwit => &VARIANT_TABLE[2],
    }
}

/// Find the variant whose extended-key version bytes match `version` on any network.
pub fn variant_for_key_version(version: [u8; 4]) -> Option<(AccountVariant, Network)> {
    VARIANT_TABLE.iter().find_map(|spec| {
        if spec.mainnet_version == version {
            Some((spec.variant, Network::Mainnet))
        } else if spec.testnet_version == version {
            Some((spec.variant, Network::Testnet))
        } else {
            None
        }
    })
}

/// Static description of one UTXO chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    /// Display name.
    pub name: &'static str,
    /// Coin name understood by signers.
    pub coin: &'static str,
    /// SLIP-44 coin type.
    pub coin_type: u32,
    pub network: Network,
    /// Variants the chain supports, default first.
    pub variants: &'static [AccountVariant],
}

impl ChainParams {
    pub fn bitcoin() -> Self {
        Self {
            name: "Bitcoin",
            coin: "Bitcoin",
            coin_type: 0,
            network: Network::Mainnet,
            variants: &[
                AccountVariant::NativeSegwit,
                AccountVariant::WrappedSegwit,
                AccountVariant::Legacy,
            ],
        }
    }

    pub fn bitcoin_testnet() -> Self {
        Self {
            name: "Bitcoin Testnet",
            coin: "Testnet",
            coin_type: 1,
            network: Network::Testnet,
            ..Self::bitcoin()
        }
    }

    /// Litecoin mainnet.
    ///
    /// Extended keys use the Bitcoin xpub/ypub/zpub version bytes, not the
    /// Ltub/Mtub family; version bytes follow [`Network`] only.
    pub fn litecoin() -> Self {
        Self {
            name: "Litecoin",
            coin: "Litecoin",
            coin_type: 2,
            network: Network::Mainnet,
            variants: &[
                AccountVariant::NativeSegwit,
                AccountVariant::WrappedSegwit,
                AccountVariant::Legacy,
            ],
        }
    }

    pub fn dogecoin() -> Self {
        Self {
            name: "Dogecoin",
            coin: "Dogecoin",
            coin_type: 3,
            network: Network::Mainnet,
            variants: &[AccountVariant::Legacy],
        }
    }

    pub fn bitcoin_cash() -> Self {
        Self {
            name: "Bitcoin Cash",
            coin: "BitcoinCash",
            coin_type: 145,
            network: Network::Mainnet,
            variants: &[AccountVariant::Legacy],
        }
    }

    /// The variant used when a caller does not name one.
    pub fn default_variant(&self) -> AccountVariant {
        self.variants
            .first()
            .copied()
            .unwrap_or(AccountVariant::Legacy)
    }

    pub fn supports(&self, variant: AccountVariant) -> bool {
        self.variants.contains(&variant)
    }

    /// Account-level path for `variant` at `account_index`.
    pub fn account_path(&self, variant: AccountVariant, account_index: u32) -> AccountPath {
        AccountPath::new(variant_spec(variant).purpose, self.coin_type, account_index)
    }
}
