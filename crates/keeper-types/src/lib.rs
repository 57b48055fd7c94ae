//! Common types module for the proof keeper.
//!
//! This crate defines the data types shared across the keeper components.
//! It provides a centralized location for deal and window descriptions,
//! transaction types, and configuration validation so that all crates agree
//! on the same representations.

/// Deal and proof-window types.
pub mod deal;
/// Transaction delivery types for ledger interactions.
pub mod delivery;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Secure string type for private keys.
pub mod secret_string;
/// Utility functions for hex formatting.
pub mod utils;
/// Configuration validation types for type-safe TOML configs.
pub mod validation;

pub use deal::*;
pub use delivery::*;
pub use registry::*;
pub use secret_string::SecretString;
pub use utils::{truncate_id, without_0x_prefix};
pub use validation::*;
