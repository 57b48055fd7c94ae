//! Durable log of issued transaction identifiers.
//!
//! One entry per broadcast, keyed by (deal, window) and persisted before the
//! engine starts confirming. After a crash between broadcast and receipt,
//! the log is what lets a restarted keeper resume confirmation instead of
//! double-submitting under a fresh nonce.

use crate::DeliveryError;
use keeper_storage::StorageService;
use keeper_types::{DealId, SubmissionAttempt};
use std::sync::Arc;

const NAMESPACE: &str = "attempts";

/// Append-only attempt log over the storage service.
#[derive(Clone)]
pub struct AttemptLog {
	storage: Arc<StorageService>,
}

impl AttemptLog {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	fn key(deal_id: DealId, window_index: u64) -> String {
		format!("{}:{}", deal_id, window_index)
	}

	/// Appends an attempt. Existing entries for the pair are kept; the log
	/// never rewrites history.
	pub async fn record(&self, attempt: &SubmissionAttempt) -> Result<(), DeliveryError> {
		let key = Self::key(attempt.deal_id, attempt.window_index);
		let mut entries: Vec<SubmissionAttempt> = self
			.storage
			.retrieve_optional(NAMESPACE, &key)
			.await?
			.unwrap_or_default();
		entries.push(attempt.clone());
		self.storage.store(NAMESPACE, &key, &entries).await?;
		Ok(())
	}

	/// Returns every recorded attempt for the pair, oldest first.
	pub async fn attempts_for(
		&self,
		deal_id: DealId,
		window_index: u64,
	) -> Result<Vec<SubmissionAttempt>, DeliveryError> {
		let key = Self::key(deal_id, window_index);
		Ok(self
			.storage
			.retrieve_optional(NAMESPACE, &key)
			.await?
			.unwrap_or_default())
	}

	/// Returns the most recent attempt for the pair, if any.
	pub async fn latest(
		&self,
		deal_id: DealId,
		window_index: u64,
	) -> Result<Option<SubmissionAttempt>, DeliveryError> {
		Ok(self.attempts_for(deal_id, window_index).await?.pop())
	}
}
