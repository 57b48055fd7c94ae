//! EVM registry client implementation using the Alloy library.
//!
//! Reads deal parameters through `eth_call` and encodes `save_proof`
//! submissions against the registry contract ABI.

use crate::{ProofAddedEvent, RegistryClientRegistry, RegistryError, RegistryFactory, RegistryInterface};
use alloy_primitives::{Address, Bytes, LogData, B256, U256};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::{TransactionInput, TransactionRequest};
use alloy_sol_types::{sol, SolCall, SolEvent};
use alloy_transport_http::Http;
use async_trait::async_trait;
use keeper_types::{
	CallSpec, ConfigSchema, DealId, DealWindowSpec, Field, FieldType, ImplementationRegistry,
	Schema, TxLog, ValidationError,
};

// Contract ABI for the deal registry. Deals are called offers on chain.
sol! {
	function getDealStartBlock(uint256 offerId) external view returns (uint256);
	function getDealLengthInBlocks(uint256 offerId) external view returns (uint256);
	function getProofFrequencyInBlocks(uint256 offerId) external view returns (uint256);
	function getProofBlock(uint256 offerId, uint256 windowNum) external view returns (uint256);

	function save_proof(bytes _proof, uint256 offerId, uint256 windowNum);

	event ProofAdded(uint256 indexed offerId, uint256 indexed blockNumber, bytes proof);
}

/// Registry client talking to an EVM contract over HTTP.
pub struct EvmRegistry {
	/// The Alloy provider for ledger interaction.
	provider: RootProvider<Http<reqwest::Client>>,
	/// Address of the registry contract.
	contract: Address,
}

impl EvmRegistry {
	/// Creates a new EvmRegistry for the contract at `contract_address`.
	pub fn new(rpc_url: &str, contract_address: &str) -> Result<Self, RegistryError> {
		let provider = RootProvider::new_http(
			rpc_url
				.parse()
				.map_err(|e| RegistryError::Connection(format!("Invalid RPC URL: {}", e)))?,
		);
		let contract = contract_address
			.parse::<Address>()
			.map_err(|e| RegistryError::Configuration(format!("Invalid contract address: {}", e)))?;
		Ok(Self { provider, contract })
	}

	/// Issues a read-only call against the registry contract.
	async fn read(&self, call_data: Vec<u8>) -> Result<Bytes, RegistryError> {
		let request = TransactionRequest {
			to: Some(self.contract.into()),
			input: TransactionInput::new(call_data.into()),
			..Default::default()
		};
		self.provider
			.call(&request)
			.await
			.map_err(|e| RegistryError::Contract(e.to_string()))
	}
}

fn to_u64(value: U256, what: &str) -> Result<u64, RegistryError> {
	u64::try_from(value)
		.map_err(|_| RegistryError::Contract(format!("{} does not fit in u64: {}", what, value)))
}

#[async_trait]
impl RegistryInterface for EvmRegistry {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EvmRegistrySchema)
	}

	async fn deal_spec(&self, deal_id: DealId) -> Result<DealWindowSpec, RegistryError> {
		let offer = U256::from(deal_id.0);

		let raw = self
			.read(getDealStartBlockCall { offerId: offer }.abi_encode())
			.await?;
		let start = getDealStartBlockCall::abi_decode_returns(&raw, true)
			.map_err(|e| RegistryError::Decode(e.to_string()))?
			._0;

		let raw = self
			.read(getDealLengthInBlocksCall { offerId: offer }.abi_encode())
			.await?;
		let length = getDealLengthInBlocksCall::abi_decode_returns(&raw, true)
			.map_err(|e| RegistryError::Decode(e.to_string()))?
			._0;

		let raw = self
			.read(getProofFrequencyInBlocksCall { offerId: offer }.abi_encode())
			.await?;
		let frequency = getProofFrequencyInBlocksCall::abi_decode_returns(&raw, true)
			.map_err(|e| RegistryError::Decode(e.to_string()))?
			._0;

		Ok(DealWindowSpec {
			deal_id,
			start_height: to_u64(start, "deal start height")?,
			total_length: to_u64(length, "deal length")?,
			window_length: to_u64(frequency, "proof frequency")?,
		})
	}

	async fn recorded_proof_height(
		&self,
		deal_id: DealId,
		window_index: u64,
	) -> Result<Option<u64>, RegistryError> {
		let raw = self
			.read(
				getProofBlockCall {
					offerId: U256::from(deal_id.0),
					windowNum: U256::from(window_index),
				}
				.abi_encode(),
			)
			.await?;
		let height = getProofBlockCall::abi_decode_returns(&raw, true)
			.map_err(|e| RegistryError::Decode(e.to_string()))?
			._0;

		// The contract encodes "no proof recorded" as zero.
		if height.is_zero() {
			Ok(None)
		} else {
			Ok(Some(to_u64(height, "recorded proof height")?))
		}
	}

	fn save_proof_call(&self, deal_id: DealId, window_index: u64, proof: &[u8]) -> CallSpec {
		let data = save_proofCall {
			_proof: Bytes::copy_from_slice(proof),
			offerId: U256::from(deal_id.0),
			windowNum: U256::from(window_index),
		}
		.abi_encode();

		CallSpec {
			to: format!("{:#x}", self.contract),
			data,
			gas_hint: None,
		}
	}

	fn decode_proof_added(&self, log: &TxLog) -> Result<Option<ProofAddedEvent>, RegistryError> {
		if log.topics.first() != Some(&ProofAdded::SIGNATURE_HASH.0) {
			return Ok(None);
		}

		let topics: Vec<B256> = log.topics.iter().map(|t| B256::from(*t)).collect();
		let data = LogData::new_unchecked(topics, Bytes::copy_from_slice(&log.data));
		let event = ProofAdded::decode_log_data(&data, true)
			.map_err(|e| RegistryError::Decode(e.to_string()))?;

		Ok(Some(ProofAddedEvent {
			deal_id: DealId(to_u64(event.offerId, "event offer id")?),
			height: to_u64(event.blockNumber, "event height")?,
			payload: event.proof.to_vec(),
		}))
	}
}

/// Configuration schema for EvmRegistry.
pub struct EvmRegistrySchema;

impl ConfigSchema for EvmRegistrySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String),
				Field::new("address", FieldType::String).with_validator(|value| {
					let s = value.as_str().unwrap_or("");
					if s.len() == 42
						&& s.starts_with("0x")
						&& s[2..].chars().all(|c| c.is_ascii_hexdigit())
					{
						Ok(())
					} else {
						Err("address must be a 0x-prefixed 20-byte hex address".to_string())
					}
				}),
			],
			vec![],
		);
		schema.validate(config)
	}
}

/// Factory function to create an EVM registry client from configuration.
///
/// Configuration parameters:
/// - `rpc_url`: HTTP endpoint of the ledger node
/// - `address`: registry contract address
pub fn create_registry(config: &toml::Value) -> Result<Box<dyn RegistryInterface>, RegistryError> {
	EvmRegistrySchema
		.validate(config)
		.map_err(|e| RegistryError::Configuration(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| RegistryError::Configuration("rpc_url is required".to_string()))?;
	let address = config
		.get("address")
		.and_then(|v| v.as_str())
		.ok_or_else(|| RegistryError::Configuration("address is required".to_string()))?;

	Ok(Box::new(EvmRegistry::new(rpc_url, address)?))
}

/// Registry for the EVM implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "evm";
	type Factory = RegistryFactory;

	fn factory() -> Self::Factory {
		create_registry
	}
}

impl RegistryClientRegistry for Registry {}
