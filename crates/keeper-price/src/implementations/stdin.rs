//! Interactive override source reading from the operator's terminal.

use crate::{prompt_line, PriceError, PriceOverrideSource};
use async_trait::async_trait;

/// Override source that asks the operator on stdin before each submission.
///
/// An empty answer means "use the network's suggestion". The blocking read
/// runs on tokio's blocking pool so the runtime is not stalled while the
/// operator thinks.
pub struct StdinPriceSource;

#[async_trait]
impl PriceOverrideSource for StdinPriceSource {
	async fn gas_price_override(&self, suggested: &str) -> Result<Option<String>, PriceError> {
		let prompt = format!(
			"Gas price in wei (empty keeps the suggested {}): ",
			suggested
		);
		let line = tokio::task::spawn_blocking(move || prompt_line(&prompt))
			.await
			.map_err(|e| PriceError::Source(e.to_string()))?
			.map_err(|e| PriceError::Source(e.to_string()))?;
		if line.is_empty() {
			Ok(None)
		} else {
			Ok(Some(line))
		}
	}

	fn reprompts(&self) -> bool {
		true
	}
}
