//! Proof keeper binary.
//!
//! Ties configuration, the registry client, the scheduler and the delivery
//! engine together behind a small CLI: submit a proof for a deal's current
//! window, recover a previously issued transaction, or inspect the window a
//! deal is in right now.

mod builder;

use builder::{build_keeper, KeeperError, SubmissionOutcome};
use clap::{Parser, Subcommand};
use keeper_config::Config;
use keeper_delivery::cancel_pair;
use keeper_types::{truncate_id, without_0x_prefix, DealId};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keeper")]
#[command(about = "Proof submission keeper for storage deals", long_about = None)]
struct Args {
	/// Path to the configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: String,

	/// Log level (trace, debug, info, warn, error)
	#[arg(long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Submit a proof for the deal's current window
	Submit {
		/// Deal identifier
		deal_id: u64,

		/// File containing the raw proof bytes
		#[arg(long, conflicts_with = "proof_hex")]
		proof_file: Option<PathBuf>,

		/// Proof bytes as hex, with or without a 0x prefix
		#[arg(long)]
		proof_hex: Option<String>,
	},
	/// Check a previously issued transaction and wait for its receipt
	Recover {
		/// Transaction identifier (0x-prefixed, 64 hex characters)
		transaction_id: String,
	},
	/// Show the submission window a deal is in at the current height
	Window {
		/// Deal identifier
		deal_id: u64,
	},
}

/// Loads the proof payload from whichever source the operator gave.
async fn load_proof(
	proof_file: Option<&PathBuf>,
	proof_hex: Option<&str>,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
	match (proof_file, proof_hex) {
		(Some(path), None) => Ok(tokio::fs::read(path).await?),
		(None, Some(hex_str)) => Ok(hex::decode(without_0x_prefix(hex_str))?),
		(None, None) => Err("one of --proof-file or --proof-hex is required".into()),
		(Some(_), Some(_)) => Err("--proof-file and --proof-hex are mutually exclusive".into()),
	}
}

fn report(outcome: &SubmissionOutcome) {
	info!(
		tx_hash = %truncate_id(&outcome.receipt.hash.to_string()),
		block_number = outcome.receipt.block_number,
		"transaction confirmed"
	);
	match &outcome.event {
		Some(event) => info!(
			deal_id = %event.deal_id,
			height = event.height,
			payload_len = event.payload.len(),
			"proof recorded on the registry"
		),
		None => info!("receipt carries no registry event"),
	}
	println!("{}", outcome.receipt.hash);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
		)
		.init();

	let config = Config::from_file(&args.config).await?;
	info!(keeper_id = %config.keeper.id, "configuration loaded and validated");

	let keeper = build_keeper(&config)?;

	let (handle, mut token) = cancel_pair();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			info!("shutdown signal received, cancelling");
			handle.cancel();
		}
	});

	match args.command {
		Command::Submit {
			deal_id,
			proof_file,
			proof_hex,
		} => {
			let proof = load_proof(proof_file.as_ref(), proof_hex.as_deref()).await?;
			info!(deal_id, proof_len = proof.len(), "proof loaded");
			match keeper.submit(DealId(deal_id), &proof, &mut token).await {
				Ok(outcome) => report(&outcome),
				Err(KeeperError::AlreadyRecorded {
					deal_id,
					window_index,
					height,
				}) => {
					tracing::warn!(
						%deal_id,
						window_index,
						height,
						"proof already recorded for this window, nothing to do"
					);
				}
				Err(e) => {
					error!(error = %e, "submission failed");
					return Err(e.into());
				}
			}
		}
		Command::Recover { transaction_id } => {
			match keeper.recover(&transaction_id, &mut token).await {
				Ok(outcome) => report(&outcome),
				Err(e) => {
					error!(error = %e, "recovery failed");
					return Err(e.into());
				}
			}
		}
		Command::Window { deal_id } => {
			let window = keeper.current_window(DealId(deal_id)).await?;
			info!(
				deal_id,
				window_index = window.index,
				start_height = window.start_height,
				end_height = window.end_height,
				"current submission window"
			);
			println!(
				"deal {} window {}: ({}, {}]",
				deal_id, window.index, window.start_height, window.end_height
			);
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_load_proof_from_hex() {
		let proof = load_proof(None, Some("0xdeadbeef")).await.unwrap();
		assert_eq!(proof, vec![0xde, 0xad, 0xbe, 0xef]);

		let bare = load_proof(None, Some("cafe")).await.unwrap();
		assert_eq!(bare, vec![0xca, 0xfe]);
	}

	#[tokio::test]
	async fn test_load_proof_from_file() {
		use std::io::Write;
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(&[1, 2, 3]).unwrap();
		let path = file.path().to_path_buf();

		let proof = load_proof(Some(&path), None).await.unwrap();
		assert_eq!(proof, vec![1, 2, 3]);
	}

	#[tokio::test]
	async fn test_load_proof_requires_a_source() {
		assert!(load_proof(None, None).await.is_err());
		assert!(load_proof(None, Some("zz")).await.is_err());
	}
}
