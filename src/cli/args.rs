//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// CLI arguments for the BitTorrent client
#[derive(Debug, Parser)]
#[command(name = "bittorrent")]
#[command(about = "BitTorrent client: bencode tools, tracker queries and piece downloads", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// JSON configuration file supplying defaults for the options below
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Port reported to the tracker
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// 20-character peer id (random if omitted)
    #[arg(long, global = true, value_name = "ID")]
    pub peer_id: Option<String>,

    /// TCP connect timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Per-message read timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub read_timeout: Option<u64>,

    /// Maximum outstanding block requests per peer
    #[arg(long, global = true, value_name = "DEPTH")]
    pub pipeline: Option<usize>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Decode a bencoded value and print it as JSON
    Decode {
        /// Bencoded value, e.g. `d3:foo3:bare`; raw bytes are passed through
        value: OsString,
    },

    /// Print torrent metadata
    Info {
        torrent: PathBuf,
    },

    /// Ask the tracker for peers
    Peers {
        torrent: PathBuf,
    },

    /// Handshake with one peer and print its peer id
    Handshake {
        torrent: PathBuf,
        /// Peer address as ip:port
        peer: String,
    },

    /// Download and verify a single piece
    #[command(name = "download_piece")]
    DownloadPiece {
        /// Output file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        torrent: PathBuf,
        index: u32,
    },

    /// Download the whole file
    #[command(name = "download_file")]
    DownloadFile {
        /// Output file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
        torrent: PathBuf,
    },
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the log level based on verbosity settings
    ///
    /// Logs default to warnings so command output stays machine-readable.
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::WARN
        }
    }
}
