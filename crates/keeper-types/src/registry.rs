//! Registry trait for self-registering implementations.
//!
//! Each pluggable component (storage backends, account providers, delivery
//! providers) exposes a `Registry` struct implementing this trait so the
//! service binary can wire implementations up by their configuration name.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// for example "file" for `storage.implementations.file` or "local" for
	/// `account.implementation = "local"`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory function for this implementation.
	fn factory() -> Self::Factory;
}
