//! BIP-32 derivation paths and account-level path parameters.
//!
//! [`DerivationPath`] is the concrete index list handed to signers.
//! [`AccountPath`] names one branch of an account tree
//! (`m / purpose' / coin_type' / account' / change / index`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{CHANGE_BRANCH, HARDENED_OFFSET, RECEIVE_BRANCH};
use crate::error::PathError;

/// A BIP-32 derivation path stored as raw child numbers.
///
/// Hardened children carry [`HARDENED_OFFSET`]. Text form is
/// `m/84'/0'/0'/1/5`; `h` is accepted as a hardened marker when parsing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DerivationPath(Vec<u32>);

impl DerivationPath {
    /// Build a path from raw child numbers.
    pub fn from_indices(indices: Vec<u32>) -> Self {
        Self(indices)
    }

    /// Raw child numbers (the signer-facing address list).
    pub fn indices(&self) -> &[u32] {
        &self.0
    }

    /// Number of levels below the master key.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Return a new path extended by one non-hardened child.
    pub fn child(&self, index: u32) -> Result<Self, PathError> {
        if index >= HARDENED_OFFSET {
            return Err(PathError::IndexOutOfRange(index));
        }
        let mut indices = self.0.clone();
        indices.push(index);
        Ok(Self(indices))
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for index in &self.0 {
            if *index >= HARDENED_OFFSET {
                write!(f, "/{}'", index - HARDENED_OFFSET)?;
            } else {
                write!(f, "/{index}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        let mut parts = s.split('/');
        if parts.next() != Some("m") {
            return Err(PathError::MissingRoot);
        }

        let mut indices = Vec::new();
        for part in parts {
            let (digits, hardened) = match part.strip_suffix(['\'', 'h']) {
                Some(rest) => (rest, true),
                None => (part, false),
            };
            let index: u32 = digits
                .parse()
                .map_err(|_| PathError::InvalidComponent(part.to_string()))?;
            if index >= HARDENED_OFFSET {
                return Err(PathError::IndexOutOfRange(index));
            }
            indices.push(if hardened { index + HARDENED_OFFSET } else { index });
        }
        Ok(Self(indices))
    }
}

impl TryFrom<String> for DerivationPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DerivationPath> for String {
    fn from(path: DerivationPath) -> Self {
        path.to_string()
    }
}

/// Identifies a derivation branch of an account.
///
/// `purpose` and `coin_type` are fixed per chain and variant; the first three
/// levels are always hardened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPath {
    /// BIP-43 purpose (44, 49 or 84).
    pub purpose: u32,
    /// SLIP-44 coin type.
    pub coin_type: u32,
    /// Account number within the wallet.
    pub account_index: u32,
    /// Whether this names the change branch.
    pub is_change: bool,
    /// Address index within the branch, if addressing a single key.
    pub address_index: Option<u32>,
}

impl AccountPath {
    /// Account-level path with no branch or address selected.
    pub fn new(purpose: u32, coin_type: u32, account_index: u32) -> Self {
        Self {
            purpose,
            coin_type,
            account_index,
            is_change: false,
            address_index: None,
        }
    }

    /// Select a branch and address index.
    pub fn with_address(mut self, is_change: bool, address_index: u32) -> Self {
        self.is_change = is_change;
        self.address_index = Some(address_index);
        self
    }

    /// The hardened account root: `m/purpose'/coin_type'/account'`.
    pub fn root(&self) -> Result<DerivationPath, PathError> {
        for index in [self.purpose, self.coin_type, self.account_index] {
            if index >= HARDENED_OFFSET {
                return Err(PathError::IndexOutOfRange(index));
            }
        }
        Ok(DerivationPath(vec![
            self.purpose + HARDENED_OFFSET,
            self.coin_type + HARDENED_OFFSET,
            self.account_index + HARDENED_OFFSET,
        ]))
    }

    /// Full path. Without an address index this is the account root.
    pub fn to_derivation_path(&self) -> Result<DerivationPath, PathError> {
        let root = self.root()?;
        match self.address_index {
            Some(index) => root.child(self.branch())?.child(index),
            None => Ok(root),
        }
    }

    /// Path of the change address at `index`.
    pub fn change_path(&self, index: u32) -> Result<DerivationPath, PathError> {
        self.root()?.child(CHANGE_BRANCH)?.child(index)
    }

    fn branch(&self) -> u32 {
        if self.is_change {
            CHANGE_BRANCH
        } else {
            RECEIVE_BRANCH
        }
    }
}
