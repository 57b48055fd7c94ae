//! Wiring of the keeper from configuration.
//!
//! Resolves the configured implementations through each crate's factory
//! registry and assembles them into a [`Keeper`] that the CLI commands drive.

use keeper_config::Config;
use keeper_delivery::{
	implementations::evm::http::create_http_delivery, AttemptLog, AttemptLogRecovery, CancelToken,
	DeliveryError, DeliveryService, RecoveryChannel, StdinRecovery,
};
use keeper_price::{
	implementations::{fixed::FixedPriceSource, stdin::StdinPriceSource},
	FeeOracle, PriceOverrideSource,
};
use keeper_registry::{implementations::evm::create_registry, ProofAddedEvent, RegistryService};
use keeper_scheduler::{compute_window, validate_submission};
use keeper_storage::StorageService;
use keeper_types::{DealId, DeliveryRequest, SubmissionWindow, TransactionReceipt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the keeper commands.
#[derive(Debug, Error)]
pub enum KeeperError {
	#[error("Configuration error: {0}")]
	Configuration(String),
	#[error(transparent)]
	Scheduler(#[from] keeper_scheduler::SchedulerError),
	#[error(transparent)]
	Registry(#[from] keeper_registry::RegistryError),
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
	#[error("Proof already recorded for deal {deal_id} window {window_index} at height {height}")]
	AlreadyRecorded {
		deal_id: DealId,
		window_index: u64,
		height: u64,
	},
}

/// The outcome of a submit or recover command.
pub struct SubmissionOutcome {
	pub receipt: TransactionReceipt,
	/// The `ProofAdded` event decoded from the receipt, if the registry
	/// emitted one.
	pub event: Option<ProofAddedEvent>,
}

/// The assembled keeper.
pub struct Keeper {
	registry: RegistryService,
	delivery: DeliveryService,
}

impl Keeper {
	/// Computes the active submission window for a deal at the current
	/// ledger height.
	pub async fn current_window(
		&self,
		deal_id: DealId,
	) -> Result<SubmissionWindow, KeeperError> {
		let spec = self.registry.deal_spec(deal_id).await?;
		let height = self.delivery.network().block_number().await?;
		Ok(compute_window(&spec, height)?)
	}

	/// Submits a proof for the deal's current window and waits for the
	/// receipt.
	///
	/// The window is revalidated against a fresh height right before
	/// delivery so a submission composed from a stale snapshot is rejected
	/// rather than recorded under the wrong window.
	pub async fn submit(
		&self,
		deal_id: DealId,
		proof: &[u8],
		cancel: &mut CancelToken,
	) -> Result<SubmissionOutcome, KeeperError> {
		let spec = self.registry.deal_spec(deal_id).await?;
		let height = self.delivery.network().block_number().await?;
		let window = compute_window(&spec, height)?;

		if let Some(recorded) = self
			.registry
			.recorded_proof_height(deal_id, window.index)
			.await?
		{
			return Err(KeeperError::AlreadyRecorded {
				deal_id,
				window_index: window.index,
				height: recorded,
			});
		}

		let fresh_height = self.delivery.network().block_number().await?;
		validate_submission(&spec, fresh_height, window.index)?;

		tracing::info!(
			deal_id = %deal_id,
			window_index = window.index,
			window_start = window.start_height,
			window_end = window.end_height,
			height = fresh_height,
			"submitting proof"
		);

		let request = DeliveryRequest {
			deal_id,
			window_index: window.index,
			call: self.registry.save_proof_call(deal_id, window.index, proof),
		};
		let receipt = self.delivery.deliver(&request, cancel).await?;
		Ok(self.outcome(receipt))
	}

	/// Checks a previously issued transaction identifier and waits for its
	/// receipt.
	pub async fn recover(
		&self,
		transaction_id: &str,
		cancel: &mut CancelToken,
	) -> Result<SubmissionOutcome, KeeperError> {
		// Reject malformed input before touching the network.
		let hash = keeper_delivery::parse_transaction_id(transaction_id)?;
		let receipt = self.delivery.confirm(&hash, cancel).await?;
		Ok(self.outcome(receipt))
	}

	fn outcome(&self, receipt: TransactionReceipt) -> SubmissionOutcome {
		let event = receipt
			.logs
			.iter()
			.find_map(|log| self.registry.decode_proof_added(log).ok().flatten());
		SubmissionOutcome { receipt, event }
	}
}

fn factory_config<'a>(
	implementations: &'a std::collections::HashMap<String, toml::Value>,
	primary: &str,
	section: &str,
) -> Result<&'a toml::Value, KeeperError> {
	implementations.get(primary).ok_or_else(|| {
		KeeperError::Configuration(format!(
			"{} implementation '{}' is not configured",
			section, primary
		))
	})
}

/// Builds the keeper from validated configuration.
pub fn build_keeper(config: &Config) -> Result<Keeper, KeeperError> {
	// Storage
	let storage_config = factory_config(
		&config.storage.implementations,
		&config.storage.primary,
		"storage",
	)?;
	let storage_factory = keeper_storage::get_all_implementations()
		.into_iter()
		.find(|(name, _)| *name == config.storage.primary)
		.map(|(_, factory)| factory)
		.ok_or_else(|| {
			KeeperError::Configuration(format!(
				"unknown storage implementation '{}'",
				config.storage.primary
			))
		})?;
	let storage = Arc::new(StorageService::new(
		storage_factory(storage_config)
			.map_err(|e| KeeperError::Configuration(e.to_string()))?,
	));

	// Account
	let account_config = factory_config(
		&config.account.implementations,
		&config.account.primary,
		"account",
	)?;
	let account_factory = keeper_account::get_all_implementations()
		.into_iter()
		.find(|(name, _)| *name == config.account.primary)
		.map(|(_, factory)| factory)
		.ok_or_else(|| {
			KeeperError::Configuration(format!(
				"unknown account implementation '{}'",
				config.account.primary
			))
		})?;
	let account = Arc::new(keeper_account::AccountService::new(
		account_factory(account_config)
			.map_err(|e| KeeperError::Configuration(e.to_string()))?,
	));

	// Registry client
	let mut registry_config = toml::map::Map::new();
	registry_config.insert(
		"rpc_url".to_string(),
		toml::Value::String(config.network.rpc_url.clone()),
	);
	registry_config.insert(
		"address".to_string(),
		toml::Value::String(config.registry.address.clone()),
	);
	let registry = RegistryService::new(create_registry(&toml::Value::Table(registry_config))?);

	// Network client
	let mut network_config = toml::map::Map::new();
	network_config.insert(
		"rpc_url".to_string(),
		toml::Value::String(config.network.rpc_url.clone()),
	);
	network_config.insert(
		"chain_id".to_string(),
		toml::Value::Integer(config.network.chain_id as i64),
	);
	let network = create_http_delivery(&toml::Value::Table(network_config))?;

	// Fee oracle
	let price_source: Box<dyn PriceOverrideSource> = if config.delivery.interactive {
		Box::new(StdinPriceSource)
	} else {
		Box::new(FixedPriceSource::new(config.delivery.gas_price.clone()))
	};
	let oracle = FeeOracle::new(price_source);

	// Recovery channel and attempt log
	let attempts = AttemptLog::new(Arc::clone(&storage));
	let recovery: Box<dyn RecoveryChannel> = if config.delivery.interactive {
		Box::new(StdinRecovery)
	} else {
		Box::new(AttemptLogRecovery::new(attempts.clone()))
	};

	let delivery = DeliveryService::new(
		network,
		account,
		oracle,
		recovery,
		attempts,
		config.delivery.min_confirmations,
		Duration::from_millis(config.keeper.poll_interval_ms),
		config.keeper.max_poll_attempts,
	);

	Ok(Keeper { registry, delivery })
}

#[cfg(test)]
mod tests {
	use super::*;

	const CONFIG: &str = r#"
[keeper]
id = "keeper-test"

[network]
rpc_url = "http://localhost:8545"
chain_id = 31337

[account]
primary = "local"
[account.implementations.local]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[registry]
address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"

[storage]
primary = "memory"
[storage.implementations.memory]

[delivery]
"#;

	// Construction never touches the network; only the commands do.
	#[test]
	fn test_build_keeper_from_config() {
		let config: Config = CONFIG.parse().unwrap();
		assert!(build_keeper(&config).is_ok());
	}

	#[test]
	fn test_build_rejects_unknown_storage_implementation() {
		let config_str = CONFIG
			.replace("primary = \"memory\"", "primary = \"redis\"")
			.replace("[storage.implementations.memory]", "[storage.implementations.redis]");
		let config: Config = config_str.parse().unwrap();
		assert!(matches!(
			build_keeper(&config),
			Err(KeeperError::Configuration(_))
		));
	}

	#[test]
	fn test_build_selects_interactive_wiring() {
		let config_str = CONFIG.replace("[delivery]", "[delivery]\ninteractive = true");
		let config: Config = config_str.parse().unwrap();
		assert!(build_keeper(&config).is_ok());
	}

	use async_trait::async_trait;
	use keeper_account::{AccountError, AccountInterface, AccountService};
	use keeper_delivery::{cancel_pair, DeliveryInterface};
	use keeper_price::implementations::fixed::FixedPriceSource;
	use keeper_registry::{RegistryError, RegistryInterface};
	use keeper_storage::implementations::memory::MemoryStorage;
	use keeper_types::{
		CallSpec, ConfigSchema, DealWindowSpec, PendingTransaction, Schema, TransactionHash,
		TransactionReceipt, TxLog, ValidationError,
	};
	use std::sync::atomic::{AtomicU64, Ordering};

	struct NoopSchema;

	impl ConfigSchema for NoopSchema {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	struct StubAccount;

	#[async_trait]
	impl AccountInterface for StubAccount {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoopSchema)
		}

		async fn address(&self) -> Result<String, AccountError> {
			Ok(format!("0x{}", "11".repeat(20)))
		}

		async fn sign_transaction(
			&self,
			_tx: &PendingTransaction,
		) -> Result<Vec<u8>, AccountError> {
			Ok(vec![0xf8, 0x01])
		}
	}

	/// Registry double keyed by window index, like the contract itself:
	/// `recorded_proof_height(deal, i)` answers for the same `i` that
	/// `save_proof_call(deal, i, ..)` writes under.
	struct IndexKeyedRegistry {
		recorded_index: u64,
	}

	#[async_trait]
	impl RegistryInterface for IndexKeyedRegistry {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoopSchema)
		}

		async fn deal_spec(&self, deal_id: DealId) -> Result<DealWindowSpec, RegistryError> {
			Ok(DealWindowSpec {
				deal_id,
				start_height: 0,
				total_length: 10,
				window_length: 5,
			})
		}

		async fn recorded_proof_height(
			&self,
			_deal_id: DealId,
			window_index: u64,
		) -> Result<Option<u64>, RegistryError> {
			Ok((window_index == self.recorded_index).then_some(120))
		}

		fn save_proof_call(&self, _deal_id: DealId, _window_index: u64, proof: &[u8]) -> CallSpec {
			CallSpec {
				to: format!("0x{}", "22".repeat(20)),
				data: proof.to_vec(),
				gas_hint: Some(50_000),
			}
		}

		fn decode_proof_added(
			&self,
			_log: &TxLog,
		) -> Result<Option<ProofAddedEvent>, RegistryError> {
			Ok(None)
		}
	}

	/// Network double at height 7 that counts broadcasts and confirms any
	/// identifier immediately.
	#[derive(Clone)]
	struct CountingNetwork {
		broadcasts: Arc<AtomicU64>,
	}

	impl CountingNetwork {
		fn new() -> Self {
			Self {
				broadcasts: Arc::new(AtomicU64::new(0)),
			}
		}
	}

	#[async_trait]
	impl DeliveryInterface for CountingNetwork {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoopSchema)
		}

		async fn estimate_gas(&self, _call: &CallSpec) -> Result<u64, DeliveryError> {
			Ok(50_000)
		}

		async fn suggested_gas_price(&self) -> Result<String, DeliveryError> {
			Ok("1000".to_string())
		}

		async fn nonce(&self, _address: &str) -> Result<u64, DeliveryError> {
			Ok(0)
		}

		async fn broadcast(&self, _raw_tx: &[u8]) -> Result<TransactionHash, DeliveryError> {
			self.broadcasts.fetch_add(1, Ordering::SeqCst);
			Ok(TransactionHash([0xaa; 32]))
		}

		async fn receipt(
			&self,
			hash: &TransactionHash,
		) -> Result<Option<TransactionReceipt>, DeliveryError> {
			Ok(Some(TransactionReceipt {
				hash: *hash,
				block_number: 5,
				success: true,
				logs: vec![],
			}))
		}

		async fn block_number(&self) -> Result<u64, DeliveryError> {
			Ok(7)
		}

		fn chain_id(&self) -> u64 {
			31337
		}
	}

	fn keeper_with(registry: IndexKeyedRegistry, network: CountingNetwork) -> Keeper {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let attempts = AttemptLog::new(Arc::clone(&storage));
		let delivery = DeliveryService::new(
			Box::new(network),
			Arc::new(AccountService::new(Box::new(StubAccount))),
			FeeOracle::new(Box::new(FixedPriceSource::new(None))),
			Box::new(AttemptLogRecovery::new(attempts.clone())),
			attempts,
			1,
			Duration::from_millis(1),
			None,
		);
		Keeper {
			registry: RegistryService::new(Box::new(registry)),
			delivery,
		}
	}

	// At height 7 with {start 0, total 10, window 5} the active window has
	// index 1 and start height 5. A proof recorded under windowNum 1 must
	// stop the submission; the guard queries the same index key the write
	// path fills.
	#[tokio::test]
	async fn test_submit_refuses_window_with_recorded_proof() {
		let network = CountingNetwork::new();
		let keeper = keeper_with(IndexKeyedRegistry { recorded_index: 1 }, network.clone());

		let (_handle, mut token) = cancel_pair();
		let result = keeper.submit(DealId(613), b"proof", &mut token).await;

		assert!(matches!(
			result,
			Err(KeeperError::AlreadyRecorded {
				window_index: 1,
				height: 120,
				..
			})
		));
		assert_eq!(network.broadcasts.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn test_submit_delivers_when_window_unrecorded() {
		let network = CountingNetwork::new();
		let keeper = keeper_with(IndexKeyedRegistry { recorded_index: 3 }, network.clone());

		let (_handle, mut token) = cancel_pair();
		let outcome = keeper.submit(DealId(613), b"proof", &mut token).await.unwrap();

		assert!(outcome.receipt.success);
		assert_eq!(network.broadcasts.load(Ordering::SeqCst), 1);
	}
}
