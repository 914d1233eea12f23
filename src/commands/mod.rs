//! CLI subcommand implementations for pushnotif.
//!
//! - [`collaborator`] - Talk to the push collaborator (public key, trigger)
//! - [`decode`] - Run the payload decoder on a raw push body
//!
//! # Usage
//!
//! ```ignore
//! use pushnotif::commands;
//!
//! commands::collaborator::vapid_key(&config).await?;
//! commands::decode::run(Some(Path::new("push.json")), &config)?;
//! ```

pub mod collaborator;
pub mod decode;

/// Crate version, shown by `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
