//! Settlement wallet and transaction signing.
//!
//! # Security
//! - The private key is loaded ONLY from an environment variable
//! - The key is never logged or serialized

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::blockchain::types::{SettlementError, SettlementResult};

/// Environment variable name for the settlement private key.
pub const SETTLEMENT_KEY_ENV_VAR: &str = "TAP_GATEWAY_SETTLEMENT_KEY";

/// Wallet holding the gateway's settlement key, with nonce management.
#[derive(Debug)]
pub struct Wallet {
    signer: PrivateKeySigner,
    /// Next nonce for sequential submissions.
    nonce: Arc<AtomicU64>,
    /// Chain ID for EIP-155 replay protection.
    chain_id: u64,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key string.
    pub fn from_private_key(private_key_hex: &str, chain_id: u64) -> SettlementResult<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| SettlementError::Wallet(format!("Invalid private key format: {}", e)))?;

        tracing::info!(
            address = %signer.address(),
            chain_id = chain_id,
            "Settlement wallet initialized"
        );

        Ok(Self {
            signer,
            nonce: Arc::new(AtomicU64::new(0)),
            chain_id,
        })
    }

    /// Load the wallet from `TAP_GATEWAY_SETTLEMENT_KEY`.
    pub fn from_env(chain_id: u64) -> SettlementResult<Self> {
        let private_key = std::env::var(SETTLEMENT_KEY_ENV_VAR).map_err(|_| {
            SettlementError::Wallet(format!(
                "Environment variable {} not set",
                SETTLEMENT_KEY_ENV_VAR
            ))
        })?;

        Self::from_private_key(&private_key, chain_id)
    }

    /// The wallet's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// The chain ID this wallet signs for.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The underlying signer, for attaching to a provider.
    pub fn signer(&self) -> PrivateKeySigner {
        self.signer.clone()
    }

    /// Get and increment the nonce atomically, so concurrent settlement
    /// submissions never collide on a nonce.
    pub fn get_and_increment_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::SeqCst)
    }

    /// Sync the nonce from the chain.
    pub fn set_nonce(&self, nonce: u64) {
        self.nonce.store(nonce, Ordering::SeqCst);
    }

    /// Current nonce without incrementing.
    pub fn current_nonce(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }
}

impl Clone for Wallet {
    fn clone(&self) -> Self {
        Self {
            signer: self.signer.clone(),
            nonce: self.nonce.clone(),
            chain_id: self.chain_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known test private key (Anvil's first account)
    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_wallet_from_private_key() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 1).unwrap();
        assert_eq!(
            wallet.address().to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_wallet_with_0x_prefix() {
        let wallet = Wallet::from_private_key(&format!("0x{}", TEST_PRIVATE_KEY), 1).unwrap();
        assert_eq!(
            wallet.address().to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_nonce_management() {
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 1).unwrap();

        assert_eq!(wallet.current_nonce(), 0);
        assert_eq!(wallet.get_and_increment_nonce(), 0);
        assert_eq!(wallet.get_and_increment_nonce(), 1);
        assert_eq!(wallet.current_nonce(), 2);

        wallet.set_nonce(100);
        assert_eq!(wallet.current_nonce(), 100);
    }

    #[test]
    fn test_invalid_private_key() {
        let result = Wallet::from_private_key("invalid_key", 1);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid private key"));
    }
}
