//! Transaction delivery module for the proof keeper.
//!
//! Owns the life of a submission: estimate gas, price it through the fee
//! oracle, sign it, broadcast it, and then either confirm the receipt or
//! recover a prior identifier after a failed broadcast. The engine never
//! resubmits a request it cannot prove was dropped; recovery always asks for
//! an outstanding identifier before anything else, which is what keeps each
//! logical request recorded exactly once.

use async_trait::async_trait;
use keeper_account::{AccountError, AccountService};
use keeper_price::{FeeOracle, PriceError};
use keeper_storage::StorageError;
use keeper_types::{
	CallSpec, ConfigSchema, DeliveryRequest, ImplementationRegistry, PendingTransaction,
	SubmissionAttempt, TransactionHash, TransactionReceipt,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod attempts;
pub mod cancel;
pub mod locator;
pub mod recovery;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod http;
	}
}

pub use attempts::AttemptLog;
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use locator::{parse_transaction_id, ReceiptLocator};
pub use recovery::{AttemptLogRecovery, RecoveryChannel, StdinRecovery};

/// Errors that can occur during transaction delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// Gas estimation failed; the call itself is likely invalid.
	#[error("Estimation failed: {0}")]
	EstimationFailed(String),
	/// Signing failed; key material or transaction format problem.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// A gas-price override was not a well-formed integer.
	#[error("Invalid gas price input: {0:?}")]
	InvalidPriceInput(String),
	/// A transaction identifier was not 32 bytes of prefixed hex.
	#[error("Malformed transaction identifier: {0:?}")]
	MalformedIdentifier(String),
	/// The transaction executed but reverted.
	#[error("Transaction failed: {0}")]
	TransactionFailed(String),
	/// Recovery was declined or polling was exhausted; the request was not
	/// confirmed delivered.
	#[error("Delivery abandoned")]
	Abandoned,
	/// The caller cancelled while the engine was polling.
	#[error("Delivery cancelled")]
	Cancelled,
	/// Error that occurs during network communication.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs in the attempt-log storage backend.
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<PriceError> for DeliveryError {
	fn from(err: PriceError) -> Self {
		match err {
			PriceError::InvalidPriceInput(input) => DeliveryError::InvalidPriceInput(input),
			PriceError::Source(msg) => DeliveryError::Network(msg),
		}
	}
}

impl From<AccountError> for DeliveryError {
	fn from(err: AccountError) -> Self {
		DeliveryError::SigningFailed(err.to_string())
	}
}

impl From<StorageError> for DeliveryError {
	fn from(err: StorageError) -> Self {
		DeliveryError::Storage(err.to_string())
	}
}

/// Trait defining the interface for ledger network clients.
///
/// One implementation per transport. All methods are safe for concurrent use;
/// independent deliveries share a client.
#[async_trait]
pub trait DeliveryInterface: Send + Sync {
	/// Returns the configuration schema for this delivery implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Asks the network to estimate the gas limit for a call.
	async fn estimate_gas(&self, call: &CallSpec) -> Result<u64, DeliveryError>;

	/// Returns the network's suggested gas price in wei as a decimal string.
	async fn suggested_gas_price(&self) -> Result<String, DeliveryError>;

	/// Returns the next valid nonce for an address.
	async fn nonce(&self, address: &str) -> Result<u64, DeliveryError>;

	/// Broadcasts raw signed transaction bytes, returning the accepted
	/// identifier.
	async fn broadcast(&self, raw_tx: &[u8]) -> Result<TransactionHash, DeliveryError>;

	/// Queries the receipt for an identifier. `Ok(None)` means the network
	/// has none yet.
	async fn receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, DeliveryError>;

	/// Returns the latest block number on the network.
	async fn block_number(&self) -> Result<u64, DeliveryError>;

	/// The chain ID transactions are bound to.
	fn chain_id(&self) -> u64;
}

/// Type alias for delivery factory functions.
pub type DeliveryFactory = fn(&toml::Value) -> Result<Box<dyn DeliveryInterface>, DeliveryError>;

/// Registry trait for delivery implementations.
pub trait DeliveryRegistry: ImplementationRegistry<Factory = DeliveryFactory> {}

/// Get all registered delivery implementations.
pub fn get_all_implementations() -> Vec<(&'static str, DeliveryFactory)> {
	use implementations::evm::http;

	vec![(http::Registry::NAME, http::Registry::factory())]
}

fn current_timestamp() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

/// The delivery engine.
///
/// Drives one submission attempt per call through the state machine
/// Estimate, Price, Sign, Broadcast, then Confirming on success or Recovering
/// after a failed broadcast. Exactly-once behavior rests on two rules: the
/// attempt log is consulted before composing anything new, and a broadcast
/// identifier is persisted before confirmation starts.
pub struct DeliveryService {
	/// The underlying network client.
	network: Box<dyn DeliveryInterface>,
	/// Account service for transaction signing.
	account: Arc<AccountService>,
	/// Fee oracle resolving the gas price per submission.
	oracle: FeeOracle,
	/// Channel consulted in the Recovering state.
	recovery: Box<dyn RecoveryChannel>,
	/// Durable log of issued identifiers.
	attempts: AttemptLog,
	/// Confirmation depth required before a receipt counts as final.
	min_confirmations: u64,
	/// Pacing delay between receipt polls.
	poll_interval: Duration,
	/// Poll budget per attempt; `None` polls until cancelled.
	max_poll_attempts: Option<u64>,
}

impl DeliveryService {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		network: Box<dyn DeliveryInterface>,
		account: Arc<AccountService>,
		oracle: FeeOracle,
		recovery: Box<dyn RecoveryChannel>,
		attempts: AttemptLog,
		min_confirmations: u64,
		poll_interval: Duration,
		max_poll_attempts: Option<u64>,
	) -> Self {
		Self {
			network,
			account,
			oracle,
			recovery,
			attempts,
			min_confirmations,
			poll_interval,
			max_poll_attempts,
		}
	}

	/// Read access to the attempt log, for wiring a log-backed recovery
	/// channel or inspecting history.
	pub fn attempt_log(&self) -> &AttemptLog {
		&self.attempts
	}

	/// The underlying network client.
	pub fn network(&self) -> &dyn DeliveryInterface {
		self.network.as_ref()
	}

	/// Delivers one logical request, returning its receipt.
	///
	/// If a prior attempt for the same (deal, window) pair is on record, the
	/// engine resumes confirming that identifier instead of broadcasting
	/// again; a crash between broadcast and receipt therefore never causes a
	/// duplicate submission.
	pub async fn deliver(
		&self,
		request: &DeliveryRequest,
		cancel: &mut CancelToken,
	) -> Result<TransactionReceipt, DeliveryError> {
		if let Some(prior) = self
			.attempts
			.latest(request.deal_id, request.window_index)
			.await?
		{
			tracing::info!(
				deal_id = %request.deal_id,
				window_index = request.window_index,
				tx_hash = %prior.tx_hash,
				"prior attempt on record, resuming confirmation"
			);
			return self.confirm(&prior.tx_hash, cancel).await;
		}

		// Estimate
		let gas_limit = match request.call.gas_hint {
			Some(limit) => limit,
			None => self.network.estimate_gas(&request.call).await?,
		};

		// Price
		let suggested = self.network.suggested_gas_price().await?;
		let price = self.oracle.price_for_submission(&suggested).await?;
		let gas_price: u128 = price
			.parse()
			.map_err(|_| DeliveryError::InvalidPriceInput(price.clone()))?;

		// Sign
		let sender = self.account.get_address().await?;
		let nonce = self.network.nonce(&sender).await?;
		let pending = PendingTransaction {
			chain_id: self.network.chain_id(),
			nonce,
			gas_price,
			gas_limit,
			to: request.call.to.clone(),
			data: request.call.data.clone(),
		};
		let raw = self.account.sign(&pending).await?;

		// Broadcast
		match self.network.broadcast(&raw).await {
			Ok(tx_hash) => {
				let attempt = SubmissionAttempt {
					deal_id: request.deal_id,
					window_index: request.window_index,
					tx_hash,
					submitted_at: current_timestamp(),
				};
				self.attempts.record(&attempt).await?;
				tracing::info!(
					deal_id = %request.deal_id,
					window_index = request.window_index,
					tx_hash = %tx_hash,
					gas_limit,
					gas_price,
					"broadcast accepted"
				);
				self.confirm(&tx_hash, cancel).await
			}
			Err(e) => {
				tracing::warn!(
					deal_id = %request.deal_id,
					window_index = request.window_index,
					error = %e,
					"broadcast failed, entering recovery"
				);
				self.recover(request, cancel).await
			}
		}
	}

	/// Confirming state: poll for the receipt, then wait out the
	/// confirmation depth.
	pub async fn confirm(
		&self,
		hash: &TransactionHash,
		cancel: &mut CancelToken,
	) -> Result<TransactionReceipt, DeliveryError> {
		let mut polls: u64 = 0;
		loop {
			if cancel.is_cancelled() {
				return Err(DeliveryError::Cancelled);
			}

			if let Some(receipt) = self.network.receipt(hash).await? {
				let current = self.network.block_number().await?;
				let depth = current.saturating_sub(receipt.block_number);
				if depth >= self.min_confirmations {
					return finished(receipt);
				}
				tracing::debug!(
					tx_hash = %hash,
					depth,
					required = self.min_confirmations,
					"receipt found, waiting for confirmation depth"
				);
			}

			polls += 1;
			if let Some(max) = self.max_poll_attempts {
				if polls >= max {
					tracing::warn!(tx_hash = %hash, polls, "poll budget exhausted");
					return Err(DeliveryError::Abandoned);
				}
			}

			tokio::select! {
				_ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
				_ = tokio::time::sleep(self.poll_interval) => {}
			}
		}
	}

	/// Recovering state: ask the recovery channel for an outstanding
	/// identifier and poll for its receipt. Declining is the explicit
	/// abandon signal.
	async fn recover(
		&self,
		request: &DeliveryRequest,
		cancel: &mut CancelToken,
	) -> Result<TransactionReceipt, DeliveryError> {
		let locator = ReceiptLocator::new(self.network.as_ref());

		loop {
			let id = match self
				.recovery
				.prior_identifier(request.deal_id, request.window_index)
				.await?
			{
				Some(id) => id,
				None => return Err(DeliveryError::Abandoned),
			};

			let mut polls: u64 = 0;
			loop {
				if cancel.is_cancelled() {
					return Err(DeliveryError::Cancelled);
				}

				match locator.locate(&id).await {
					Ok(Some(receipt)) => return finished(receipt),
					Ok(None) => {}
					Err(DeliveryError::MalformedIdentifier(bad)) if self.recovery.reprompts() => {
						tracing::warn!(input = %bad, "malformed identifier, asking again");
						break;
					}
					Err(e) => return Err(e),
				}

				polls += 1;
				if let Some(max) = self.max_poll_attempts {
					if polls >= max {
						if self.recovery.reprompts() {
							tracing::warn!(id = %id, polls, "no receipt for identifier, asking again");
							break;
						}
						return Err(DeliveryError::Abandoned);
					}
				}

				tokio::select! {
					_ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
					_ = tokio::time::sleep(self.poll_interval) => {}
				}
			}
		}
	}
}

fn finished(receipt: TransactionReceipt) -> Result<TransactionReceipt, DeliveryError> {
	if receipt.success {
		Ok(receipt)
	} else {
		Err(DeliveryError::TransactionFailed(format!(
			"transaction {} reverted in block {}",
			receipt.hash, receipt.block_number
		)))
	}
}
