//! Local private-key account implementation.
//!
//! Holds a secp256k1 key in memory and signs legacy transactions with it.
//! The key arrives through configuration as a hex string and is wrapped in
//! [`SecretString`] so it never shows up in logs or serialized state.

use crate::{AccountError, AccountFactory, AccountInterface, AccountRegistry};
use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use keeper_types::{
	without_0x_prefix, ConfigSchema, Field, FieldType, ImplementationRegistry, PendingTransaction,
	Schema, SecretString, ValidationError,
};

/// Account implementation backed by a locally held private key.
pub struct LocalAccount {
	signer: PrivateKeySigner,
}

impl LocalAccount {
	/// Creates a LocalAccount from a hex-encoded private key.
	pub fn new(private_key: &SecretString) -> Result<Self, AccountError> {
		let signer = private_key.with_exposed(|key| {
			without_0x_prefix(key)
				.parse::<PrivateKeySigner>()
				.map_err(|e| AccountError::InvalidKey(e.to_string()))
		})?;
		Ok(Self { signer })
	}
}

#[async_trait]
impl AccountInterface for LocalAccount {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalAccountSchema)
	}

	async fn address(&self) -> Result<String, AccountError> {
		Ok(format!("{:#x}", self.signer.address()))
	}

	async fn sign_transaction(&self, tx: &PendingTransaction) -> Result<Vec<u8>, AccountError> {
		let to = tx
			.to
			.parse::<Address>()
			.map_err(|e| AccountError::SigningFailed(format!("bad destination address: {}", e)))?;

		let mut legacy = TxLegacy {
			chain_id: Some(tx.chain_id),
			nonce: tx.nonce,
			gas_price: tx.gas_price,
			gas_limit: tx.gas_limit,
			to: TxKind::Call(to),
			value: U256::ZERO,
			input: Bytes::from(tx.data.clone()),
		};

		let signature = self
			.signer
			.sign_transaction_sync(&mut legacy)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;

		let envelope = TxEnvelope::Legacy(legacy.into_signed(signature));
		Ok(envelope.encoded_2718())
	}
}

/// Configuration schema for LocalAccount.
pub struct LocalAccountSchema;

impl ConfigSchema for LocalAccountSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("private_key", FieldType::String).with_validator(|value| {
				let key = value.as_str().unwrap_or("");
				let hex_part = without_0x_prefix(key);
				if hex_part.len() != 64 {
					return Err("private_key must be 32 bytes of hex".to_string());
				}
				if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
					return Err("private_key must be hex-encoded".to_string());
				}
				Ok(())
			})],
			vec![],
		);
		schema.validate(config)
	}
}

/// Factory function to create a local account from configuration.
///
/// Configuration parameters:
/// - `private_key`: hex-encoded secp256k1 private key, with or without 0x
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalAccountSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidKey(e.to_string()))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.map(SecretString::from)
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".to_string()))?;

	Ok(Box::new(LocalAccount::new(&private_key)?))
}

/// Registry for the local account implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	// Well-known anvil test key 0, never used on a real network.
	const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

	fn sample_tx() -> PendingTransaction {
		PendingTransaction {
			chain_id: 31337,
			nonce: 0,
			gas_price: 1_000_000_000,
			gas_limit: 100_000,
			to: "0x5fbdb2315678afecb367f032d93f642f64180aa3".into(),
			data: vec![0xab, 0xcd],
		}
	}

	#[tokio::test]
	async fn test_address_derivation() {
		let account = LocalAccount::new(&SecretString::from(TEST_KEY)).unwrap();
		assert_eq!(account.address().await.unwrap(), TEST_ADDRESS);
	}

	#[tokio::test]
	async fn test_sign_produces_raw_bytes() {
		let account = LocalAccount::new(&SecretString::from(TEST_KEY)).unwrap();
		let raw = account.sign_transaction(&sample_tx()).await.unwrap();
		assert!(!raw.is_empty());
		// Legacy transactions RLP-encode to a list, no type prefix.
		assert!(raw[0] >= 0xc0);
	}

	#[tokio::test]
	async fn test_signing_is_deterministic() {
		let account = LocalAccount::new(&SecretString::from(TEST_KEY)).unwrap();
		let a = account.sign_transaction(&sample_tx()).await.unwrap();
		let b = account.sign_transaction(&sample_tx()).await.unwrap();
		assert_eq!(a, b);
	}

	#[tokio::test]
	async fn test_rejects_bad_destination() {
		let account = LocalAccount::new(&SecretString::from(TEST_KEY)).unwrap();
		let mut tx = sample_tx();
		tx.to = "not-an-address".into();
		assert!(matches!(
			account.sign_transaction(&tx).await,
			Err(AccountError::SigningFailed(_))
		));
	}

	#[test]
	fn test_rejects_malformed_key() {
		assert!(matches!(
			LocalAccount::new(&SecretString::from("0x1234")),
			Err(AccountError::InvalidKey(_))
		));
	}

	#[test]
	fn test_schema_requires_well_formed_key() {
		let ok: toml::Value = toml::from_str(&format!("private_key = \"{}\"", TEST_KEY)).unwrap();
		assert!(LocalAccountSchema.validate(&ok).is_ok());

		let short: toml::Value = toml::from_str("private_key = \"0xabcd\"").unwrap();
		assert!(LocalAccountSchema.validate(&short).is_err());

		let missing: toml::Value = toml::from_str("").unwrap();
		assert!(LocalAccountSchema.validate(&missing).is_err());
	}
}
