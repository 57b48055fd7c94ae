//! Deal registry client for the proof keeper.
//!
//! The registry contract records deal timing parameters and accepts proof
//! submissions. This crate reads deal specs, checks for already recorded
//! proofs, builds `save_proof` call payloads and decodes the `ProofAdded`
//! event out of receipt logs. It never broadcasts anything itself; composed
//! calls are handed to the delivery engine.

use async_trait::async_trait;
use keeper_types::{CallSpec, ConfigSchema, DealId, DealWindowSpec, ImplementationRegistry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod evm;
}

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
	/// Error that occurs when connecting to the ledger node.
	#[error("Connection error: {0}")]
	Connection(String),
	/// Error that occurs when a contract read fails or returns garbage.
	#[error("Contract error: {0}")]
	Contract(String),
	/// Error that occurs when decoding event data.
	#[error("Decode error: {0}")]
	Decode(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// A decoded `ProofAdded` event.
///
/// Emitted by the registry contract when a proof is recorded. The height is
/// the window-boundary argument the proof was recorded under, not the height
/// of the including block; that one lives on the receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofAddedEvent {
	pub deal_id: DealId,
	pub height: u64,
	pub payload: Vec<u8>,
}

/// Trait defining the interface for registry implementations.
#[async_trait]
pub trait RegistryInterface: Send + Sync {
	/// Returns the configuration schema for this registry implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Reads the timing parameters of a deal from the registry contract.
	async fn deal_spec(&self, deal_id: DealId) -> Result<DealWindowSpec, RegistryError>;

	/// Returns the height a proof was recorded under for the given window
	/// index, or `None` when no proof has been recorded yet. The index is the
	/// same key `save_proof_call` writes under; the contract encodes "none"
	/// as zero.
	async fn recorded_proof_height(
		&self,
		deal_id: DealId,
		window_index: u64,
	) -> Result<Option<u64>, RegistryError>;

	/// Builds the call spec that records `proof` for the given (deal, window)
	/// pair. Pure encoding, no network access.
	fn save_proof_call(&self, deal_id: DealId, window_index: u64, proof: &[u8]) -> CallSpec;

	/// Decodes a receipt log as a `ProofAdded` event. Returns `None` when the
	/// log belongs to some other event or contract.
	fn decode_proof_added(
		&self,
		log: &keeper_types::TxLog,
	) -> Result<Option<ProofAddedEvent>, RegistryError>;
}

/// Type alias for registry factory functions.
pub type RegistryFactory = fn(&toml::Value) -> Result<Box<dyn RegistryInterface>, RegistryError>;

/// Registry trait for registry-client implementations.
pub trait RegistryClientRegistry: ImplementationRegistry<Factory = RegistryFactory> {}

/// Get all registered registry-client implementations.
pub fn get_all_implementations() -> Vec<(&'static str, RegistryFactory)> {
	use implementations::evm;

	vec![(evm::Registry::NAME, evm::Registry::factory())]
}

/// Service that manages registry operations.
pub struct RegistryService {
	/// The underlying registry implementation.
	implementation: Box<dyn RegistryInterface>,
}

impl RegistryService {
	/// Creates a new RegistryService with the specified implementation.
	pub fn new(implementation: Box<dyn RegistryInterface>) -> Self {
		Self { implementation }
	}

	/// Reads the timing parameters of a deal.
	pub async fn deal_spec(&self, deal_id: DealId) -> Result<DealWindowSpec, RegistryError> {
		self.implementation.deal_spec(deal_id).await
	}

	/// Checks whether a proof has already been recorded for a window.
	pub async fn recorded_proof_height(
		&self,
		deal_id: DealId,
		window_index: u64,
	) -> Result<Option<u64>, RegistryError> {
		self.implementation
			.recorded_proof_height(deal_id, window_index)
			.await
	}

	/// Builds the proof-recording call for the delivery engine.
	pub fn save_proof_call(&self, deal_id: DealId, window_index: u64, proof: &[u8]) -> CallSpec {
		self.implementation
			.save_proof_call(deal_id, window_index, proof)
	}

	/// Decodes a receipt log as a `ProofAdded` event.
	pub fn decode_proof_added(
		&self,
		log: &keeper_types::TxLog,
	) -> Result<Option<ProofAddedEvent>, RegistryError> {
		self.implementation.decode_proof_added(log)
	}
}
