//! Recovery channels for failed broadcasts.
//!
//! When a broadcast fails, the only safe next step is to ask whether a prior
//! attempt for the same (deal, window) pair already has a known identifier.
//! Interactively that is an operator at a prompt; unattended it is the
//! persisted attempt log. Both answer the same question through
//! [`RecoveryChannel`].

use crate::{attempts::AttemptLog, DeliveryError};
use async_trait::async_trait;
use keeper_price::prompt_line;
use keeper_types::DealId;
use std::collections::HashSet;
use tokio::sync::Mutex;

/// Source of previously issued transaction identifiers.
#[async_trait]
pub trait RecoveryChannel: Send + Sync {
	/// Returns an identifier for a prior attempt on this pair, or `None` to
	/// abandon the delivery.
	async fn prior_identifier(
		&self,
		deal_id: DealId,
		window_index: u64,
	) -> Result<Option<String>, DeliveryError>;

	/// Whether the channel can be asked again after an identifier led
	/// nowhere. Interactive channels return true; log-backed ones would keep
	/// handing out the same identifier and must decline instead.
	fn reprompts(&self) -> bool {
		false
	}
}

/// Interactive recovery: ask the operator at the terminal.
///
/// An empty answer is the explicit "no more attempts" signal.
pub struct StdinRecovery;

#[async_trait]
impl RecoveryChannel for StdinRecovery {
	async fn prior_identifier(
		&self,
		deal_id: DealId,
		window_index: u64,
	) -> Result<Option<String>, DeliveryError> {
		let prompt = format!(
			"Broadcast failed for deal {} window {}. \
			 Enter a prior transaction id to check, or leave empty to abandon: ",
			deal_id, window_index
		);
		let line = tokio::task::spawn_blocking(move || prompt_line(&prompt))
			.await
			.map_err(|e| DeliveryError::Network(e.to_string()))?
			.map_err(|e| DeliveryError::Network(e.to_string()))?;
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

/// Unattended recovery backed by the persisted attempt log.
///
/// Yields the most recent logged identifier once per (deal, window) pair,
/// then declines. Without the once-guard a dead identifier would be handed
/// out forever.
pub struct AttemptLogRecovery {
	log: AttemptLog,
	yielded: Mutex<HashSet<(DealId, u64)>>,
}

impl AttemptLogRecovery {
	pub fn new(log: AttemptLog) -> Self {
		Self {
			log,
			yielded: Mutex::new(HashSet::new()),
		}
	}
}

#[async_trait]
impl RecoveryChannel for AttemptLogRecovery {
	async fn prior_identifier(
		&self,
		deal_id: DealId,
		window_index: u64,
	) -> Result<Option<String>, DeliveryError> {
		let mut yielded = self.yielded.lock().await;
		if !yielded.insert((deal_id, window_index)) {
			return Ok(None);
		}
		drop(yielded);

		match self.log.latest(deal_id, window_index).await? {
			Some(attempt) => {
				tracing::info!(
					deal_id = %deal_id,
					window_index,
					tx_hash = %attempt.tx_hash,
					"recovering with logged identifier"
				);
				Ok(Some(attempt.tx_hash.to_string()))
			}
			None => Ok(None),
		}
	}
}
