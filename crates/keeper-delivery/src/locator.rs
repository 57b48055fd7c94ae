//! Receipt locator.
//!
//! Looks a transaction identifier up on the network, exactly one query per
//! call; the delivery engine loops with pacing around it. Identifier
//! validation happens before any network access, so a caller bug (a
//! truncated or mistyped hash) fails fast instead of producing confusing RPC
//! errors.

use crate::{DeliveryError, DeliveryInterface};
use keeper_types::{TransactionHash, TransactionReceipt};

/// Parses a transaction identifier.
///
/// Accepts exactly a `0x` prefix followed by 64 hex digits, case
/// insensitive. Anything else is [`DeliveryError::MalformedIdentifier`].
pub fn parse_transaction_id(id: &str) -> Result<TransactionHash, DeliveryError> {
	let hex_part = id
		.strip_prefix("0x")
		.or_else(|| id.strip_prefix("0X"))
		.ok_or_else(|| DeliveryError::MalformedIdentifier(id.to_string()))?;
	if hex_part.len() != 64 {
		return Err(DeliveryError::MalformedIdentifier(id.to_string()));
	}

	let mut bytes = [0u8; 32];
	hex::decode_to_slice(hex_part, &mut bytes)
		.map_err(|_| DeliveryError::MalformedIdentifier(id.to_string()))?;
	Ok(TransactionHash(bytes))
}

/// Single-shot receipt lookup over a network client.
pub struct ReceiptLocator<'a> {
	network: &'a dyn DeliveryInterface,
}

impl<'a> ReceiptLocator<'a> {
	pub fn new(network: &'a dyn DeliveryInterface) -> Self {
		Self { network }
	}

	/// Queries the network once for the receipt of `id`.
	///
	/// `Ok(None)` means the network has no receipt yet, the normal outcome
	/// while a transaction is pending. A malformed identifier errors without
	/// touching the network.
	pub async fn locate(&self, id: &str) -> Result<Option<TransactionReceipt>, DeliveryError> {
		let hash = parse_transaction_id(id)?;
		self.network.receipt(&hash).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_valid_identifier() {
		let id = format!("0x{}", "ab".repeat(32));
		assert_eq!(parse_transaction_id(&id).unwrap(), TransactionHash([0xab; 32]));
	}

	#[test]
	fn test_parse_is_case_insensitive() {
		let lower = format!("0x{}", "ab".repeat(32));
		let upper = format!("0X{}", "AB".repeat(32));
		assert_eq!(
			parse_transaction_id(&lower).unwrap(),
			parse_transaction_id(&upper).unwrap()
		);
	}

	#[test]
	fn test_parse_rejects_malformed() {
		for bad in [
			"0x123",
			"",
			&"ab".repeat(32),
			&format!("0x{}", "ab".repeat(33)),
			&format!("0x{}zz", "ab".repeat(31)),
		] {
			assert!(matches!(
				parse_transaction_id(bad),
				Err(DeliveryError::MalformedIdentifier(_))
			));
		}
	}
}
