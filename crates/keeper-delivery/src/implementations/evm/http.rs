//! HTTP network client implementation using the Alloy library.
//!
//! Thin mapping from the delivery interface onto JSON-RPC calls. Signing is
//! not done here; the engine hands over raw signed bytes.

use crate::{DeliveryError, DeliveryFactory, DeliveryInterface, DeliveryRegistry};
use alloy_primitives::{Address, B256};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::{TransactionInput, TransactionRequest};
use alloy_transport_http::Http;
use async_trait::async_trait;
use keeper_types::{
	CallSpec, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, TransactionHash,
	TransactionReceipt, TxLog, ValidationError,
};

/// Alloy-based HTTP delivery implementation.
pub struct HttpDelivery {
	/// The Alloy provider for ledger interaction.
	provider: RootProvider<Http<reqwest::Client>>,
	/// Chain ID transactions are bound to.
	chain_id: u64,
}

impl HttpDelivery {
	/// Creates a new HttpDelivery against the given RPC endpoint.
	pub fn new(rpc_url: &str, chain_id: u64) -> Result<Self, DeliveryError> {
		let provider = RootProvider::new_http(
			rpc_url
				.parse()
				.map_err(|e| DeliveryError::Network(format!("Invalid RPC URL: {}", e)))?,
		);
		Ok(Self { provider, chain_id })
	}

	fn call_request(call: &CallSpec) -> Result<TransactionRequest, DeliveryError> {
		let to = call
			.to
			.parse::<Address>()
			.map_err(|e| DeliveryError::Network(format!("Invalid destination address: {}", e)))?;
		Ok(TransactionRequest {
			to: Some(to.into()),
			input: TransactionInput::new(call.data.clone().into()),
			..Default::default()
		})
	}
}

#[async_trait]
impl DeliveryInterface for HttpDelivery {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpDeliverySchema)
	}

	async fn estimate_gas(&self, call: &CallSpec) -> Result<u64, DeliveryError> {
		let request = Self::call_request(call)?;
		self.provider
			.estimate_gas(&request)
			.await
			.map_err(|e| DeliveryError::EstimationFailed(e.to_string()))
	}

	async fn suggested_gas_price(&self) -> Result<String, DeliveryError> {
		let gas_price = self
			.provider
			.get_gas_price()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get gas price: {}", e)))?;
		Ok(gas_price.to_string())
	}

	async fn nonce(&self, address: &str) -> Result<u64, DeliveryError> {
		let address: Address = address
			.parse()
			.map_err(|e| DeliveryError::Network(format!("Invalid address: {}", e)))?;
		self.provider
			.get_transaction_count(address)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get nonce: {}", e)))
	}

	async fn broadcast(&self, raw_tx: &[u8]) -> Result<TransactionHash, DeliveryError> {
		let pending = self
			.provider
			.send_raw_transaction(raw_tx)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to send transaction: {}", e)))?;
		Ok(TransactionHash(pending.tx_hash().0))
	}

	async fn receipt(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, DeliveryError> {
		let receipt = self
			.provider
			.get_transaction_receipt(B256::from(hash.0))
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get receipt: {}", e)))?;

		Ok(receipt.map(|receipt| TransactionReceipt {
			hash: TransactionHash(receipt.transaction_hash.0),
			block_number: receipt.block_number.unwrap_or(0),
			success: receipt.status(),
			logs: receipt
				.inner
				.logs()
				.iter()
				.map(|log| TxLog {
					address: format!("{:#x}", log.address()),
					topics: log.topics().iter().map(|topic| topic.0).collect(),
					data: log.data().data.to_vec(),
				})
				.collect(),
		}))
	}

	async fn block_number(&self) -> Result<u64, DeliveryError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get block number: {}", e)))
	}

	fn chain_id(&self) -> u64 {
		self.chain_id
	}
}

/// Configuration schema for HttpDelivery.
pub struct HttpDeliverySchema;

impl ConfigSchema for HttpDeliverySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String),
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
			vec![],
		);
		schema.validate(config)
	}
}

/// Factory function to create an HTTP delivery client from configuration.
///
/// Configuration parameters:
/// - `rpc_url`: HTTP endpoint of the ledger node
/// - `chain_id`: chain ID transactions are bound to
pub fn create_http_delivery(
	config: &toml::Value,
) -> Result<Box<dyn DeliveryInterface>, DeliveryError> {
	HttpDeliverySchema
		.validate(config)
		.map_err(|e| DeliveryError::Network(format!("Invalid configuration: {}", e)))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DeliveryError::Network("rpc_url is required".to_string()))?;
	let chain_id = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.ok_or_else(|| DeliveryError::Network("chain_id is required".to_string()))? as u64;

	Ok(Box::new(HttpDelivery::new(rpc_url, chain_id)?))
}

/// Registry for the HTTP delivery implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_http";
	type Factory = DeliveryFactory;

	fn factory() -> Self::Factory {
		create_http_delivery
	}
}

impl DeliveryRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_schema() {
		let good: toml::Value =
			toml::from_str("rpc_url = \"http://localhost:8545\"\nchain_id = 31337").unwrap();
		assert!(HttpDeliverySchema.validate(&good).is_ok());

		let missing: toml::Value = toml::from_str("rpc_url = \"http://localhost:8545\"").unwrap();
		assert!(HttpDeliverySchema.validate(&missing).is_err());
	}

	#[test]
	fn test_rejects_bad_call_destination() {
		let call = CallSpec {
			to: "somewhere".into(),
			data: vec![],
			gas_hint: None,
		};
		assert!(HttpDelivery::call_request(&call).is_err());
	}
}
