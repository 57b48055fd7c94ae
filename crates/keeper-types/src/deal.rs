//! Deal and proof-window types.
//!
//! A deal is an on-chain agreement with a start height, a total length and a
//! fixed proof cadence. Each deal is divided into consecutive fixed-length
//! windows; at most one proof may ever be recorded per window. The window
//! itself is derived data: it is recomputed from the deal parameters and the
//! current ledger height on every call and never stored.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a deal (also called an offer) in the registry contract.
#[derive(
	Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DealId(pub u64);

impl fmt::Display for DealId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Timing parameters of a deal as recorded in the registry contract.
///
/// All values are ledger heights or spans of heights. The keeper only ever
/// reads this struct from the registry; it never writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealWindowSpec {
	/// The deal this spec belongs to.
	pub deal_id: DealId,
	/// Height at which the deal becomes active.
	pub start_height: u64,
	/// Total span of the deal in heights. Does not need to be an exact
	/// multiple of `window_length`; a reachable partial last window is valid.
	pub total_length: u64,
	/// Length of each proof window in heights. Must be positive.
	pub window_length: u64,
}

/// A single proof-submission window, derived from a [`DealWindowSpec`] and a
/// ledger height.
///
/// The window covers the heights `start_height < h <= end_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionWindow {
	/// Zero-based index of the window within the deal.
	pub index: u64,
	/// First boundary of the window (exclusive).
	pub start_height: u64,
	/// Last height that belongs to the window (inclusive).
	pub end_height: u64,
}

/// A proof recorded on chain for a specific (deal, window) pair.
///
/// Created by a successful delivery; immutable once recorded. The registry
/// contract rejects a second write for the same pair, so the keeper never
/// re-checks this locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
	pub deal_id: DealId,
	pub window_index: u64,
	pub payload: Vec<u8>,
	/// Height of the block that included the recording transaction.
	pub recording_height: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_deal_id_display() {
		assert_eq!(DealId(55378008).to_string(), "55378008");
	}

	#[test]
	fn test_window_spec_roundtrip() {
		let spec = DealWindowSpec {
			deal_id: DealId(7),
			start_height: 100,
			total_length: 50,
			window_length: 10,
		};
		let json = serde_json::to_string(&spec).unwrap();
		let back: DealWindowSpec = serde_json::from_str(&json).unwrap();
		assert_eq!(spec, back);
	}
}
