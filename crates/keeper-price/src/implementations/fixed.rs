//! Configuration-driven override source.

use crate::{PriceError, PriceOverrideSource};
use async_trait::async_trait;

/// Override source backed by a value from configuration.
///
/// `None` always defers to the network's suggested price. Because the value
/// cannot change between asks this source never reprompts; a malformed value
/// becomes a hard error at the oracle.
pub struct FixedPriceSource {
	value: Option<String>,
}

impl FixedPriceSource {
	pub fn new(value: Option<String>) -> Self {
		Self { value }
	}
}

#[async_trait]
impl PriceOverrideSource for FixedPriceSource {
	async fn gas_price_override(&self, _suggested: &str) -> Result<Option<String>, PriceError> {
		Ok(self.value.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_returns_configured_value() {
		let source = FixedPriceSource::new(Some("77".into()));
		assert_eq!(
			source.gas_price_override("1").await.unwrap(),
			Some("77".into())
		);
		assert!(!source.reprompts());
	}
}
