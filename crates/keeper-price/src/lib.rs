//! Fee oracle for the keeper.
//!
//! Decides the gas price a submission is broadcast with. The network's
//! suggested price is the default; an operator may override it, either
//! interactively at a prompt or through configuration. Prices are handled as
//! decimal wei strings end to end so an override is used verbatim rather
//! than round-tripped through a numeric type.

use async_trait::async_trait;
use std::io::Write;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod fixed;
	pub mod stdin;
}

/// Errors that can occur while resolving a gas price.
#[derive(Debug, Error)]
pub enum PriceError {
	/// The supplied override is not a non-negative decimal integer.
	#[error("invalid gas price input: {0:?}")]
	InvalidPriceInput(String),
	/// The override source itself failed, e.g. a closed prompt.
	#[error("price source error: {0}")]
	Source(String),
}

/// Resolves a user override against the network's suggested price.
///
/// An empty override means "use the suggestion"; a string of decimal digits
/// is returned verbatim; anything else is rejected.
pub fn resolve_gas_price(suggested: &str, user_override: &str) -> Result<String, PriceError> {
	if user_override.is_empty() {
		return Ok(suggested.to_string());
	}
	if user_override.bytes().all(|b| b.is_ascii_digit()) {
		return Ok(user_override.to_string());
	}
	Err(PriceError::InvalidPriceInput(user_override.to_string()))
}

/// A source of gas-price overrides.
///
/// `None` means "no override, use the network's suggestion". The source does
/// not validate the value; the [`FeeOracle`] does, and re-asks sources that
/// support it.
#[async_trait]
pub trait PriceOverrideSource: Send + Sync {
	/// Returns the operator's override for this submission, if any.
	async fn gas_price_override(&self, suggested: &str) -> Result<Option<String>, PriceError>;

	/// Whether the source can be asked again after a malformed answer.
	/// Interactive sources return true; config-driven sources would hand
	/// back the same malformed value forever and must surface the error
	/// instead.
	fn reprompts(&self) -> bool {
		false
	}
}

/// Service that resolves the price for a submission through an override
/// source.
pub struct FeeOracle {
	source: Box<dyn PriceOverrideSource>,
}

impl FeeOracle {
	pub fn new(source: Box<dyn PriceOverrideSource>) -> Self {
		Self { source }
	}

	/// Resolves the gas price for one submission.
	///
	/// Interactive sources are asked again until they produce a well-formed
	/// value; this is a validation loop, not a silent fallback. For
	/// non-interactive sources a malformed override is surfaced as
	/// [`PriceError::InvalidPriceInput`].
	pub async fn price_for_submission(&self, suggested: &str) -> Result<String, PriceError> {
		loop {
			match self.source.gas_price_override(suggested).await? {
				None => return Ok(suggested.to_string()),
				Some(answer) => match resolve_gas_price(suggested, answer.trim()) {
					Ok(price) => return Ok(price),
					Err(_) if self.source.reprompts() => {
						tracing::warn!(input = %answer.trim(), "illegal gas price, asking again");
					}
					Err(e) => return Err(e),
				},
			}
		}
	}
}

/// Reads one trimmed line from stdin after printing `prompt`.
///
/// Shared by the interactive override source here and the interactive
/// recovery channel in the delivery crate.
pub fn prompt_line(prompt: &str) -> std::io::Result<String> {
	let mut out = std::io::stdout();
	write!(out, "{}", prompt)?;
	out.flush()?;
	let mut line = String::new();
	std::io::stdin().read_line(&mut line)?;
	Ok(line.trim().to_string())
}
