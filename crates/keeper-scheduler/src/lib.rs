//! Proof-window scheduler for the keeper.
//!
//! Pure arithmetic over ledger heights: given a deal's timing parameters and
//! the current height, compute which fixed-length proof window the height
//! falls into and check that a candidate submission is neither early nor
//! late. No I/O happens here; callers supply the current height themselves.

use keeper_types::{DealWindowSpec, SubmissionWindow};
use thiserror::Error;

/// Errors that can occur while deriving or validating a submission window.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
	/// The supplied height precedes the deal's first window.
	#[error("deal has not started at height {height}")]
	DealNotStarted { height: u64 },
	/// The supplied height lies beyond the deal's total length.
	#[error("deal has expired at height {height}")]
	DealExpired { height: u64 },
	/// The supplied height does not fall inside the derived window. Given
	/// the arithmetic below this indicates a caller-supplied height outside
	/// the intended use, such as a height far in the future.
	#[error("height {height} falls outside the derived window")]
	OutOfWindow { height: u64 },
	/// A submission was tagged with a window index that does not match the
	/// window derived from the supplied height.
	#[error("window mismatch: claimed index {claimed}, expected {expected}")]
	WindowMismatch { claimed: u64, expected: u64 },
	/// The deal parameters themselves are unusable.
	#[error("invalid deal spec: {0}")]
	InvalidSpec(&'static str),
}

/// Computes the submission window that `current_height` falls into.
///
/// The deal is divided into consecutive windows of `spec.window_length`
/// heights starting at `spec.start_height`. A window covers the heights
/// `start < h <= end`, so a height sitting exactly on a window boundary
/// belongs to the window that ends there. `spec.total_length` does not need
/// to be an exact multiple of the window length; a partial last window is
/// valid as long as its start lies within the deal.
pub fn compute_window(
	spec: &DealWindowSpec,
	current_height: u64,
) -> Result<SubmissionWindow, SchedulerError> {
	if spec.window_length == 0 {
		return Err(SchedulerError::InvalidSpec("window_length must be positive"));
	}
	if spec.total_length == 0 {
		return Err(SchedulerError::InvalidSpec("total_length must be positive"));
	}

	let offset = current_height
		.checked_sub(spec.start_height)
		.ok_or(SchedulerError::DealNotStarted {
			height: current_height,
		})?;

	// A height on a window boundary closes that window rather than opening
	// the next one.
	let raw_remainder = offset % spec.window_length;
	let distance_to_boundary = if raw_remainder == 0 {
		spec.window_length
	} else {
		raw_remainder
	};

	let window_start = current_height
		.checked_sub(distance_to_boundary)
		.ok_or(SchedulerError::DealNotStarted {
			height: current_height,
		})?;
	if window_start < spec.start_height {
		return Err(SchedulerError::DealNotStarted {
			height: current_height,
		});
	}
	if window_start - spec.start_height >= spec.total_length {
		return Err(SchedulerError::DealExpired {
			height: current_height,
		});
	}

	let window_end = window_start
		.checked_add(spec.window_length)
		.ok_or(SchedulerError::InvalidSpec(
			"window end exceeds the representable height range",
		))?;
	if current_height <= window_start || current_height > window_end {
		return Err(SchedulerError::OutOfWindow {
			height: current_height,
		});
	}

	Ok(SubmissionWindow {
		index: (window_start - spec.start_height) / spec.window_length,
		start_height: window_start,
		end_height: window_end,
	})
}

/// Checks that a submission tagged with `claimed_index` is valid at
/// `current_height`.
///
/// Recomputes the window from the height and compares indices. This guards
/// against a submission prepared from a stale height snapshot being recorded
/// under the wrong window.
pub fn validate_submission(
	spec: &DealWindowSpec,
	current_height: u64,
	claimed_index: u64,
) -> Result<(), SchedulerError> {
	let window = compute_window(spec, current_height)?;
	if window.index != claimed_index {
		return Err(SchedulerError::WindowMismatch {
			claimed: claimed_index,
			expected: window.index,
		});
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use keeper_types::DealId;

	fn spec(start: u64, total: u64, window: u64) -> DealWindowSpec {
		DealWindowSpec {
			deal_id: DealId(1),
			start_height: start,
			total_length: total,
			window_length: window,
		}
	}

	#[test]
	fn test_boundary_height_closes_first_window() {
		let w = compute_window(&spec(0, 10, 5), 5).unwrap();
		assert_eq!(
			w,
			SubmissionWindow {
				index: 0,
				start_height: 0,
				end_height: 5
			}
		);
	}

	#[test]
	fn test_mid_window_height() {
		let w = compute_window(&spec(0, 10, 5), 7).unwrap();
		assert_eq!(
			w,
			SubmissionWindow {
				index: 1,
				start_height: 5,
				end_height: 10
			}
		);
	}

	#[test]
	fn test_expired_deal() {
		assert_eq!(
			compute_window(&spec(0, 10, 5), 11),
			Err(SchedulerError::DealExpired { height: 11 })
		);
	}

	#[test]
	fn test_height_below_start() {
		assert_eq!(
			compute_window(&spec(100, 10, 5), 99),
			Err(SchedulerError::DealNotStarted { height: 99 })
		);
	}

	#[test]
	fn test_height_at_start_is_before_first_window() {
		// The first window covers (start, start + window_length]; the start
		// height itself belongs to no window.
		assert_eq!(
			compute_window(&spec(100, 10, 5), 100),
			Err(SchedulerError::DealNotStarted { height: 100 })
		);
	}

	#[test]
	fn test_nonzero_start() {
		let w = compute_window(&spec(100, 50, 10), 125).unwrap();
		assert_eq!(
			w,
			SubmissionWindow {
				index: 2,
				start_height: 120,
				end_height: 130
			}
		);
	}

	#[test]
	fn test_partial_last_window_is_reachable() {
		// total_length 12 with window_length 5: windows start at 0, 5 and 10;
		// the last one is partial but still valid.
		let w = compute_window(&spec(0, 12, 5), 11).unwrap();
		assert_eq!(w.index, 2);
		assert_eq!(w.start_height, 10);
		assert_eq!(w.end_height, 15);
	}

	#[test]
	fn test_window_invariants_hold_across_deal() {
		let s = spec(40, 33, 7);
		for height in 41..=(40 + 33) {
			let w = compute_window(&s, height).unwrap();
			assert!(w.start_height < height && height <= w.end_height);
			assert_eq!(w.index, (w.start_height - s.start_height) / s.window_length);
		}
	}

	#[test]
	fn test_idempotent() {
		let s = spec(3, 20, 4);
		assert_eq!(compute_window(&s, 9), compute_window(&s, 9));
	}

	#[test]
	fn test_window_end_beyond_height_range_is_invalid() {
		// start 1 with a window spanning the whole u64 range: the derived
		// window starts at 1 but its end does not fit in a height.
		assert_eq!(
			compute_window(&spec(1, u64::MAX, u64::MAX), u64::MAX),
			Err(SchedulerError::InvalidSpec(
				"window end exceeds the representable height range"
			))
		);
	}

	#[test]
	fn test_invalid_spec() {
		assert_eq!(
			compute_window(&spec(0, 10, 0), 5),
			Err(SchedulerError::InvalidSpec("window_length must be positive"))
		);
		assert_eq!(
			compute_window(&spec(0, 0, 5), 5),
			Err(SchedulerError::InvalidSpec("total_length must be positive"))
		);
	}

	#[test]
	fn test_validate_submission_accepts_fresh_index() {
		assert!(validate_submission(&spec(0, 10, 5), 7, 1).is_ok());
	}

	#[test]
	fn test_validate_submission_rejects_any_mismatch() {
		for claimed in [0u64, 2, 3, 17] {
			assert_eq!(
				validate_submission(&spec(0, 30, 5), 7, claimed),
				Err(SchedulerError::WindowMismatch {
					claimed,
					expected: 1
				})
			);
		}
	}

	#[test]
	fn test_validate_submission_propagates_timing_errors() {
		assert_eq!(
			validate_submission(&spec(0, 10, 5), 11, 2),
			Err(SchedulerError::DealExpired { height: 11 })
		);
	}
}
