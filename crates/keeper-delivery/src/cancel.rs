//! Cooperative cancellation for delivery polling loops.
//!
//! Ledger finality has no upper bound, so the confirmation and recovery
//! loops poll until told to stop. The caller holds a [`CancelHandle`]; the
//! delivery engine holds the matching [`CancelToken`] and checks it between
//! polls.

use tokio::sync::watch;

/// Caller-side handle that requests cancellation.
#[derive(Debug, Clone)]
pub struct CancelHandle {
	tx: watch::Sender<bool>,
}

impl CancelHandle {
	/// Signals every associated token. Idempotent.
	pub fn cancel(&self) {
		let _ = self.tx.send(true);
	}
}

/// Engine-side token observed between polling attempts.
#[derive(Debug, Clone)]
pub struct CancelToken {
	rx: watch::Receiver<bool>,
}

impl CancelToken {
	/// Returns true once cancellation has been requested.
	pub fn is_cancelled(&self) -> bool {
		*self.rx.borrow()
	}

	/// Resolves when cancellation is requested. If the handle is dropped
	/// without cancelling, this never resolves; polling loops pair it with a
	/// sleep inside `select!` so a dropped handle simply means "run to
	/// completion".
	pub async fn cancelled(&mut self) {
		loop {
			if *self.rx.borrow() {
				return;
			}
			if self.rx.changed().await.is_err() {
				std::future::pending::<()>().await;
			}
		}
	}

	/// A token that can never be cancelled, for unattended runs.
	pub fn never() -> Self {
		let (tx, rx) = watch::channel(false);
		// Leak the sender so the channel stays open.
		std::mem::forget(tx);
		Self { rx }
	}
}

/// Creates a connected handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
	let (tx, rx) = watch::channel(false);
	(CancelHandle { tx }, CancelToken { rx })
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn test_cancel_resolves_waiters() {
		let (handle, mut token) = cancel_pair();
		assert!(!token.is_cancelled());

		let waiter = tokio::spawn(async move {
			token.cancelled().await;
		});
		handle.cancel();
		tokio::time::timeout(Duration::from_secs(1), waiter)
			.await
			.unwrap()
			.unwrap();
	}

	#[tokio::test]
	async fn test_cancel_before_wait() {
		let (handle, mut token) = cancel_pair();
		handle.cancel();
		assert!(token.is_cancelled());
		token.cancelled().await;
	}

	#[tokio::test]
	async fn test_dropped_handle_does_not_cancel() {
		let (handle, mut token) = cancel_pair();
		drop(handle);
		assert!(!token.is_cancelled());
		let waited = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
		assert!(waited.is_err());
	}

	#[tokio::test]
	async fn test_never_token() {
		let mut token = CancelToken::never();
		assert!(!token.is_cancelled());
		let waited = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
		assert!(waited.is_err());
	}
}
