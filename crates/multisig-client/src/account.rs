use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use multisig_error::{MultisigError, Result};
use std::fmt;
use std::str::FromStr;

/// The account a transaction is sent from.
#[derive(Clone)]
pub enum Account {
    /// Signed locally with a private key
    Local(PrivateKeySigner),
    /// Unlocked on the node and signed by `eth_sendTransaction`
    Node(Address),
}

impl Account {
    /// Builds a local account from a hex private key, with or without `0x`.
    pub fn from_private_key(key: &str, chain_id: u64) -> Result<Self> {
        let key = key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);
        let signer = PrivateKeySigner::from_str(key)
            .map_err(|e| MultisigError::ConfigError(format!("invalid private key: {e}")))?
            .with_chain_id(Some(chain_id));
        Ok(Self::Local(signer))
    }

    /// Address the account sends from
    pub fn address(&self) -> Address {
        match self {
            Self::Local(signer) => signer.address(),
            Self::Node(address) => *address,
        }
    }

    /// True when the node signs on our behalf
    pub fn is_node(&self) -> bool {
        matches!(self, Self::Node(_))
    }
}

// Never print key material.
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(signer) => f.debug_tuple("Local").field(&signer.address()).finish(),
            Self::Node(address) => f.debug_tuple("Node").field(address).finish(),
        }
    }
}
