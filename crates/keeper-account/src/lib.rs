//! Account management module for the proof keeper.
//!
//! Abstracts over the signing key that authorizes proof submissions. An
//! account implementation turns a composed [`PendingTransaction`] into raw
//! signed bytes ready for broadcast, and exposes the sender address the
//! delivery engine needs for nonce queries.

use async_trait::async_trait;
use keeper_types::{ConfigSchema, ImplementationRegistry, PendingTransaction};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// Error that occurs when interacting with the account implementation.
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Trait defining the interface for account implementations.
///
/// Implementations own the private key; it never leaves the account crate.
/// The delivery engine only ever sees the sender address and the signed
/// bytes.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Retrieves the 0x-prefixed sender address for this account.
	async fn address(&self) -> Result<String, AccountError>;

	/// Signs a composed transaction, returning raw bytes ready for broadcast.
	async fn sign_transaction(&self, tx: &PendingTransaction) -> Result<Vec<u8>, AccountError>;
}

/// Type alias for account factory functions.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service that manages account operations.
///
/// Wraps an account implementation behind a stable surface for the rest of
/// the keeper.
pub struct AccountService {
	/// The underlying account implementation.
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	/// Creates a new AccountService with the specified implementation.
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Retrieves the sender address of the managed account.
	pub async fn get_address(&self) -> Result<String, AccountError> {
		self.implementation.address().await
	}

	/// Signs a transaction using the managed account.
	pub async fn sign(&self, tx: &PendingTransaction) -> Result<Vec<u8>, AccountError> {
		self.implementation.sign_transaction(tx).await
	}
}
