//! CLI configuration module
//!
//! Merges an optional JSON configuration file with command-line flags.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cli::args::CliArgs;
use crate::error::{Result, TorrentError};
use crate::peer::PeerSettings;
use crate::protocol::Handshake;
use crate::tracker::DEFAULT_PORT;

/// Upper bound on outstanding block requests per peer
pub const MAX_PIPELINE_DEPTH: usize = 64;

/// Configuration for the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port reported to the tracker
    pub port: u16,
    /// Fixed 20-character peer id; random when absent
    pub peer_id: Option<String>,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Per-message read timeout in seconds
    pub read_timeout_secs: u64,
    /// Maximum outstanding block requests per peer
    pub pipeline_depth: usize,
    /// Tracker round-trip timeout in seconds
    pub tracker_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            peer_id: None,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            pipeline_depth: 1,
            tracker_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            TorrentError::io_error_full("Failed to read config file", path.display().to_string(), e.to_string())
        })?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Create configuration from CLI arguments, on top of the config file if one is given
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(port) = args.port {
            config.port = port;
        }
        if let Some(peer_id) = &args.peer_id {
            config.peer_id = Some(peer_id.clone());
        }
        if let Some(secs) = args.connect_timeout {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = args.read_timeout {
            config.read_timeout_secs = secs;
        }
        if let Some(depth) = args.pipeline {
            config.pipeline_depth = depth;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TorrentError::config_error_with_field("Port cannot be 0", "port"));
        }

        if self.pipeline_depth == 0 || self.pipeline_depth > MAX_PIPELINE_DEPTH {
            return Err(TorrentError::config_error_with_field(
                format!("must be between 1 and {}", MAX_PIPELINE_DEPTH),
                "pipeline_depth",
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(TorrentError::config_error_with_field("must be at least 1 second", "connect_timeout_secs"));
        }
        if self.read_timeout_secs == 0 {
            return Err(TorrentError::config_error_with_field("must be at least 1 second", "read_timeout_secs"));
        }
        if self.tracker_timeout_secs == 0 {
            return Err(TorrentError::config_error_with_field("must be at least 1 second", "tracker_timeout_secs"));
        }

        if let Some(peer_id) = &self.peer_id {
            if peer_id.len() != 20 {
                return Err(TorrentError::config_error_with_field(
                    format!("must be exactly 20 bytes, got {}", peer_id.len()),
                    "peer_id",
                ));
            }
        }

        Ok(())
    }

    /// The configured peer id, or a freshly generated one
    pub fn peer_id(&self) -> Result<[u8; 20]> {
        match &self.peer_id {
            Some(id) => <[u8; 20]>::try_from(id.as_bytes())
                .map_err(|_| TorrentError::config_error_with_field("must be exactly 20 bytes", "peer_id")),
            None => Ok(Handshake::generate_peer_id()),
        }
    }

    /// Settings for peer sessions; call once so every session shares one peer id
    pub fn peer_settings(&self) -> Result<PeerSettings> {
        let settings = PeerSettings {
            peer_id: self.peer_id()?,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            pipeline_depth: self.pipeline_depth,
        };
        info!(
            "Peer settings: id {}, pipeline depth {}",
            String::from_utf8_lossy(&settings.peer_id),
            settings.pipeline_depth
        );
        Ok(settings)
    }

    pub fn tracker_timeout(&self) -> Duration {
        Duration::from_secs(self.tracker_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["bittorrent"];
        argv.extend_from_slice(extra);
        argv.extend_from_slice(&["info", "sample.torrent"]);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_args(&args(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.validate().is_ok());

        let settings = config.peer_settings().unwrap();
        assert_eq!(&settings.peer_id[..8], b"-RU0000-");
        assert_eq!(settings.pipeline_depth, 1);
        assert_eq!(settings.read_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_flags_override() {
        let config = Config::from_args(&args(&[
            "--port",
            "7000",
            "--peer-id",
            "00112233445566778899",
            "--pipeline",
            "8",
            "--connect-timeout",
            "3",
        ]))
        .unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.pipeline_depth, 8);
        let settings = config.peer_settings().unwrap();
        assert_eq!(&settings.peer_id, b"00112233445566778899");
        assert_eq!(settings.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_config_file_with_flag_override() {
        let path = std::env::temp_dir().join(format!("bittorrent-core-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"pipeline_depth": 4, "read_timeout_secs": 5}"#).unwrap();

        let path_arg = path.display().to_string();
        let config = Config::from_args(&args(&["--config", &path_arg, "--pipeline", "2"])).unwrap();
        assert_eq!(config.pipeline_depth, 2);
        assert_eq!(config.read_timeout_secs, 5);
        assert_eq!(config.port, DEFAULT_PORT);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_bad_config_file() {
        let path = std::env::temp_dir().join(format!("bittorrent-core-bad-config-{}.json", std::process::id()));
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(Config::load(&path), Err(TorrentError::Config { .. })));
        let _ = std::fs::remove_file(&path);

        assert!(matches!(
            Config::load(Path::new("/nonexistent/config.json")),
            Err(TorrentError::Io { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config { port: 0, ..Config::default() };
        assert!(config.validate().is_err());

        config = Config { pipeline_depth: 0, ..Config::default() };
        assert!(config.validate().is_err());

        config = Config { pipeline_depth: MAX_PIPELINE_DEPTH + 1, ..Config::default() };
        assert!(config.validate().is_err());

        config = Config { read_timeout_secs: 0, ..Config::default() };
        assert!(config.validate().is_err());

        config = Config { peer_id: Some("short".to_string()), ..Config::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("peer_id"));
        assert!(config.peer_id().is_err());
    }
}
