//! Configuration module for the proof keeper.
//!
//! Loads keeper configuration from TOML files, resolves `${VAR}` environment
//! references so secrets stay out of the file, and validates the result
//! before any component is constructed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the proof keeper.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Configuration specific to this keeper instance.
	pub keeper: KeeperConfig,
	/// Ledger network connection parameters.
	pub network: NetworkConfig,
	/// Configuration for account management.
	pub account: AccountConfig,
	/// Deal registry contract parameters.
	pub registry: RegistryConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for transaction delivery.
	pub delivery: DeliveryConfig,
}

/// Configuration specific to this keeper instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeeperConfig {
	/// Unique identifier for this keeper instance.
	pub id: String,
	/// Interval in milliseconds between receipt polls.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Maximum number of receipt polls before an attempt is abandoned.
	/// Absent means poll until cancelled.
	pub max_poll_attempts: Option<u64>,
}

/// Interval between receipt polls when none is configured. Roughly half a
/// block time on the networks this keeper targets.
fn default_poll_interval_ms() -> u64 {
	7000
}

/// Ledger network connection parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// HTTP endpoint of the ledger node.
	pub rpc_url: String,
	/// Chain identifier transactions are bound to.
	pub chain_id: u64,
}

/// Configuration for account management.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of account implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Deal registry contract parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
	/// Hex address of the deal registry contract.
	pub address: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for transaction delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
	/// Minimum number of confirmations before a submission counts as final.
	#[serde(default = "default_confirmations")]
	pub min_confirmations: u64,
	/// Fixed gas-price override in wei. Absent means the network's suggested
	/// price, or an interactive prompt when `interactive` is set.
	pub gas_price: Option<String>,
	/// Whether to prompt the operator for gas prices and recovery decisions.
	#[serde(default)]
	pub interactive: bool,
}

/// One confirmation is enough for the devnet-grade ledgers this keeper runs
/// against.
fn default_confirmations() -> u64 {
	1
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let full_match = cap.get(0).ok_or_else(|| {
			ConfigError::Parse("Regex capture missing full match".to_string())
		})?;
		let var_name = cap
			.get(1)
			.ok_or_else(|| ConfigError::Parse("Regex capture missing variable name".to_string()))?
			.as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

fn is_hex_address(s: &str) -> bool {
	s.len() == 42
		&& s.starts_with("0x")
		&& s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

impl Config {
	/// Loads configuration from a file with environment variable resolution.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let contents = tokio::fs::read_to_string(path).await?;
		contents.parse()
	}

	/// Validates the configuration to ensure all required fields are properly
	/// set and cross-references between sections hold.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.keeper.id.is_empty() {
			return Err(ConfigError::Validation("Keeper ID cannot be empty".into()));
		}
		if self.keeper.poll_interval_ms == 0 {
			return Err(ConfigError::Validation(
				"poll_interval_ms must be greater than 0".into(),
			));
		}
		if self.keeper.max_poll_attempts == Some(0) {
			return Err(ConfigError::Validation(
				"max_poll_attempts must be at least 1 when set".into(),
			));
		}

		if self.network.rpc_url.is_empty() {
			return Err(ConfigError::Validation("rpc_url cannot be empty".into()));
		}

		if !is_hex_address(&self.registry.address) {
			return Err(ConfigError::Validation(format!(
				"Registry address '{}' is not a 20-byte hex address",
				self.registry.address
			)));
		}

		if self.account.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one account implementation must be configured".into(),
			));
		}
		if !self
			.account
			.implementations
			.contains_key(&self.account.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary account '{}' not found in implementations",
				self.account.primary
			)));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		if self.delivery.min_confirmations == 0 {
			return Err(ConfigError::Validation(
				"min_confirmations must be at least 1".into(),
			));
		}
		if self.delivery.min_confirmations > 100 {
			return Err(ConfigError::Validation(
				"min_confirmations cannot exceed 100".into(),
			));
		}
		if let Some(price) = &self.delivery.gas_price {
			if price.is_empty() || !price.bytes().all(|b| b.is_ascii_digit()) {
				return Err(ConfigError::Validation(format!(
					"gas_price '{}' must be a decimal wei amount",
					price
				)));
			}
			if self.delivery.interactive {
				return Err(ConfigError::Validation(
					"gas_price and interactive are mutually exclusive".into(),
				));
			}
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string, resolving environment variables
/// and validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const VALID_CONFIG: &str = r#"
[keeper]
id = "keeper-1"

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

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("TEST_HOST", "localhost");
		std::env::set_var("TEST_PORT", "8545");

		let input = "rpc_url = \"http://${TEST_HOST}:${TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "rpc_url = \"http://localhost:8545\"");

		std::env::remove_var("TEST_HOST");
		std::env::remove_var("TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("MISSING_VAR"));
	}

	#[test]
	fn test_valid_config_with_defaults() {
		let config: Config = VALID_CONFIG.parse().unwrap();
		assert_eq!(config.keeper.id, "keeper-1");
		assert_eq!(config.keeper.poll_interval_ms, 7000);
		assert_eq!(config.keeper.max_poll_attempts, None);
		assert_eq!(config.delivery.min_confirmations, 1);
		assert!(!config.delivery.interactive);
	}

	#[test]
	fn test_empty_keeper_id_rejected() {
		let config_str = VALID_CONFIG.replace("id = \"keeper-1\"", "id = \"\"");
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("Keeper ID"));
	}

	#[test]
	fn test_bad_registry_address_rejected() {
		let config_str = VALID_CONFIG.replace(
			"address = \"0x5fbdb2315678afecb367f032d93f642f64180aa3\"",
			"address = \"0x1234\"",
		);
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("hex address"));
	}

	#[test]
	fn test_unknown_primary_storage_rejected() {
		let config_str = VALID_CONFIG.replace("primary = \"memory\"", "primary = \"redis\"");
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("Primary storage 'redis'"));
	}

	#[test]
	fn test_non_numeric_gas_price_rejected() {
		let config_str = format!("{}gas_price = \"fast\"\n", VALID_CONFIG);
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("gas_price"));
	}

	#[test]
	fn test_fixed_price_and_interactive_conflict() {
		let config_str = format!("{}gas_price = \"100\"\ninteractive = true\n", VALID_CONFIG);
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("mutually exclusive"));
	}

	#[test]
	fn test_zero_max_poll_attempts_rejected() {
		let config_str = VALID_CONFIG.replace(
			"id = \"keeper-1\"",
			"id = \"keeper-1\"\nmax_poll_attempts = 0",
		);
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("max_poll_attempts"));
	}

	#[tokio::test]
	async fn test_from_file_resolves_env() {
		std::env::set_var("KEEPER_TEST_KEY_A1", "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80");
		let contents = VALID_CONFIG.replace(
			"private_key = \"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80\"",
			"private_key = \"${KEEPER_TEST_KEY_A1}\"",
		);

		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(contents.as_bytes()).unwrap();

		let config = Config::from_file(file.path().to_str().unwrap())
			.await
			.unwrap();
		let local = &config.account.implementations["local"];
		assert!(local
			.get("private_key")
			.and_then(|v| v.as_str())
			.unwrap()
			.starts_with("0xac0974"));

		std::env::remove_var("KEEPER_TEST_KEY_A1");
	}
}
