//! Transaction delivery types.
//!
//! This module defines the types exchanged between the delivery engine, the
//! account service and the registry client: call specifications, pending
//! transactions, identifiers and receipts.

use crate::deal::DealId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte ledger transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub [u8; 32]);

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

/// A raw log entry attached to a receipt.
///
/// Topics and data are kept undecoded so the receipt stays independent of
/// any particular contract ABI; the registry crate knows how to decode the
/// events it cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLog {
	/// Hex address of the emitting contract.
	pub address: String,
	/// Indexed topics, including the event signature hash.
	pub topics: Vec<[u8; 32]>,
	/// Unindexed event data.
	pub data: Vec<u8>,
}

/// Transaction receipt observed from the network.
///
/// The network owns the receipt; the keeper only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	/// The hash of the transaction.
	pub hash: TransactionHash,
	/// The block height at which the transaction was included.
	pub block_number: u64,
	/// Whether the transaction executed successfully.
	pub success: bool,
	/// Logs emitted during execution.
	pub logs: Vec<TxLog>,
}

/// An encoded contract call to be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSpec {
	/// Hex address of the destination contract.
	pub to: String,
	/// ABI-encoded call payload.
	pub data: Vec<u8>,
	/// Optional gas limit override. When absent the delivery engine asks the
	/// network for an estimate.
	pub gas_hint: Option<u64>,
}

/// A logical delivery request: one contract call tagged with the (deal,
/// window) pair it records a proof for.
///
/// The tag is what makes the request idempotent across restarts: the attempt
/// log is keyed by it, and recovery looks prior identifiers up under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
	pub deal_id: DealId,
	pub window_index: u64,
	pub call: CallSpec,
}

/// A transaction composed for a single submission attempt.
///
/// Owned exclusively by the delivery engine. Immutable once signed; dropped
/// as soon as a receipt is obtained or the attempt is abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
	pub chain_id: u64,
	pub nonce: u64,
	/// Gas price in wei.
	pub gas_price: u128,
	pub gas_limit: u64,
	/// Hex address of the destination contract.
	pub to: String,
	pub data: Vec<u8>,
}

/// A persisted record of an issued transaction identifier.
///
/// Entries are append-only and durable across restarts; they are what makes
/// recovery after a crash possible without resubmitting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionAttempt {
	pub deal_id: DealId,
	pub window_index: u64,
	pub tx_hash: TransactionHash,
	/// Unix timestamp at which the transaction was broadcast.
	pub submitted_at: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_transaction_hash_display() {
		let hash = TransactionHash([0xab; 32]);
		let s = hash.to_string();
		assert!(s.starts_with("0x"));
		assert_eq!(s.len(), 66);
		assert!(s[2..].chars().all(|c| c == 'a' || c == 'b'));
	}

	#[test]
	fn test_attempt_roundtrip() {
		let attempt = SubmissionAttempt {
			deal_id: DealId(613),
			window_index: 2,
			tx_hash: TransactionHash([7; 32]),
			submitted_at: 1700000000,
		};
		let json = serde_json::to_string(&attempt).unwrap();
		let back: SubmissionAttempt = serde_json::from_str(&json).unwrap();
		assert_eq!(attempt, back);
	}
}
