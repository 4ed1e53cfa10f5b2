//! HTTP tracker client
//!
//! Announces to an HTTP(S) tracker and parses its bencoded reply.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use super::{AnnounceRequest, AnnounceResponse, PeerDiscovery};
use crate::bencode::{decode, Value};
use crate::error::{Result, TorrentError};
use crate::peer::PeerAddress;

/// Default timeout for a whole announce round trip
pub const DEFAULT_TRACKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one announce URL
#[derive(Debug, Clone)]
pub struct HttpTracker {
    client: Client,
    announce: Url,
}

impl HttpTracker {
    /// Create a tracker client, rejecting anything but http/https URLs
    pub fn new(announce: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(announce)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(TorrentError::tracker_error(format!(
                "unsupported tracker scheme '{}' in {}",
                url.scheme(),
                announce
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TorrentError::tracker_error_with_source("Failed to build HTTP client", e.to_string()))?;

        Ok(Self { client, announce: url })
    }

    pub fn url(&self) -> &str {
        self.announce.as_str()
    }

    /// Full announce URL with the binary fields percent-encoded
    pub fn announce_url(&self, request: &AnnounceRequest) -> String {
        let separator = if self.announce.query().is_some() { '&' } else { '?' };
        format!(
            "{}{}info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            self.announce,
            separator,
            urlencoding::encode_binary(&request.info_hash),
            urlencoding::encode_binary(&request.peer_id),
            request.port,
            request.uploaded,
            request.downloaded,
            request.left
        )
    }

    /// Send the announce and parse the reply
    pub async fn announce(&self, request: &AnnounceRequest) -> Result<AnnounceResponse> {
        let url = self.announce_url(request);
        info!("Announcing to tracker {}", self.announce);
        debug!("Announce URL: {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("Tracker answered with HTTP {}", status);
            return Err(TorrentError::tracker_error(format!("tracker answered with HTTP {}", status)));
        }

        let body = response.bytes().await?;
        debug!("Tracker response: {} bytes", body.len());
        parse_announce_response(&body)
    }
}

#[async_trait]
impl PeerDiscovery for HttpTracker {
    async fn discover(&self, request: &AnnounceRequest) -> Result<Vec<PeerAddress>> {
        Ok(self.announce(request).await?.peers)
    }
}

/// Parse a bencoded announce reply
pub fn parse_announce_response(body: &[u8]) -> Result<AnnounceResponse> {
    let value = decode(body)
        .map_err(|e| TorrentError::tracker_error_with_source("malformed tracker response", e.to_string()))?;
    if value.as_dict().is_none() {
        return Err(TorrentError::tracker_error("tracker response is not a dictionary"));
    }

    if let Some(reason) = value.get(b"failure reason") {
        let reason = String::from_utf8_lossy(reason.as_bytes().unwrap_or_default()).into_owned();
        warn!("Tracker failure: {}", reason);
        return Err(TorrentError::tracker_error(reason));
    }

    let warning = value
        .get(b"warning message")
        .and_then(Value::as_bytes)
        .map(|w| String::from_utf8_lossy(w).into_owned());
    if let Some(warning) = &warning {
        warn!("Tracker warning: {}", warning);
    }

    let interval = value
        .get(b"interval")
        .and_then(Value::as_integer)
        .and_then(|i| u64::try_from(i).ok());

    let peers = match value.get(b"peers") {
        Some(Value::Bytes(compact)) => PeerAddress::parse_compact_list(compact)?,
        Some(Value::List(entries)) => parse_peer_dicts(entries),
        Some(other) => {
            return Err(TorrentError::tracker_error(format!(
                "peers must be a byte string, got {}",
                other.kind()
            )))
        }
        None => return Err(TorrentError::tracker_error("tracker response has no peers")),
    };

    info!("Tracker returned {} peers", peers.len());
    Ok(AnnounceResponse { interval, peers, warning })
}

/// Non-compact form: a list of `{ip, port}` dictionaries; IPv6 entries are skipped
fn parse_peer_dicts(entries: &[Value]) -> Vec<PeerAddress> {
    entries
        .iter()
        .filter_map(|entry| {
            let ip = entry.get(b"ip")?.as_str()?.parse().ok()?;
            let port = u16::try_from(entry.get(b"port")?.as_integer()?).ok()?;
            Some(PeerAddress::new(ip, port))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AnnounceRequest {
        AnnounceRequest {
            info_hash: [0xd6, 0x9f, 0x91, 0xe6, 0xb2, 0xae, 0x4c, 0x54, 0x24, 0x68, 0xd1, 0x07, 0x3a, 0x71, 0xd4, 0xea, 0x13, 0x87, 0x9a, 0x7f],
            peer_id: *b"00112233445566778899",
            port: 6881,
            uploaded: 0,
            downloaded: 0,
            left: 92063,
        }
    }

    #[test]
    fn test_announce_url() {
        let tracker = HttpTracker::new("http://bittorrent-test-tracker.codecrafters.io/announce", DEFAULT_TRACKER_TIMEOUT).unwrap();
        let url = tracker.announce_url(&request());
        assert_eq!(
            url,
            "http://bittorrent-test-tracker.codecrafters.io/announce?info_hash=%D6%9F%91%E6%B2%AELT%24h%D1%07%3Aq%D4%EA%13%87%9A%7F\
             &peer_id=00112233445566778899&port=6881&uploaded=0&downloaded=0&left=92063&compact=1"
        );
    }

    #[test]
    fn test_announce_url_keeps_existing_query() {
        let tracker = HttpTracker::new("https://tracker.example/announce?key=abc", DEFAULT_TRACKER_TIMEOUT).unwrap();
        assert!(tracker.announce_url(&request()).starts_with("https://tracker.example/announce?key=abc&info_hash="));
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        assert!(matches!(
            HttpTracker::new("udp://tracker.example:80", DEFAULT_TRACKER_TIMEOUT),
            Err(TorrentError::Tracker { .. })
        ));
        assert!(HttpTracker::new("not a url", DEFAULT_TRACKER_TIMEOUT).is_err());
    }

    #[test]
    fn test_parse_compact_response() {
        let mut body = b"d8:intervali60e5:peers12:".to_vec();
        body.extend_from_slice(&[165, 232, 33, 77, 0xc9, 0x0b, 178, 62, 85, 20, 0xc9, 0x2a]);
        body.push(b'e');

        let response = parse_announce_response(&body).unwrap();
        assert_eq!(response.interval, Some(60));
        assert_eq!(response.peers.len(), 2);
        assert_eq!(response.peers[0].to_string(), "165.232.33.77:51467");
        assert_eq!(response.peers[1].to_string(), "178.62.85.20:51498");
    }

    #[test]
    fn test_parse_dict_peer_list() {
        let body = b"d5:peersld2:ip9:10.0.0.14:porti6881eed2:ip3:::14:porti1eeee";
        let response = parse_announce_response(body).unwrap();
        assert_eq!(response.peers, vec![PeerAddress::new([10, 0, 0, 1].into(), 6881)]);
        assert_eq!(response.interval, None);
    }

    #[test]
    fn test_failure_reason() {
        let err = parse_announce_response(b"d14:failure reason12:unregisterede").unwrap_err();
        assert_eq!(err.to_string(), "Tracker error: unregistered");
    }

    #[test]
    fn test_malformed_responses() {
        assert!(matches!(parse_announce_response(b"i1e"), Err(TorrentError::Tracker { .. })));
        assert!(matches!(parse_announce_response(b"d5:peers"), Err(TorrentError::Tracker { .. })));
        assert!(matches!(parse_announce_response(b"d5:peers5:abcdee"), Err(TorrentError::Tracker { .. })));
        assert!(matches!(parse_announce_response(b"d5:peersi3ee"), Err(TorrentError::Tracker { .. })));
        assert!(matches!(parse_announce_response(b"de"), Err(TorrentError::Tracker { .. })));
    }
}
