//! CLI module
//!
//! Command-line interface for the BitTorrent client.

pub mod args;
pub mod config;

pub use args::{CliArgs, Command};
pub use config::Config;
