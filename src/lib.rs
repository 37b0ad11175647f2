// Cofre — Library root
//
// Re-exports the store, directory, enclave, config and CLI modules.

pub mod cli;
pub mod config;
pub mod directory;
pub mod enclave;
pub mod error;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{CofreError, Result};
