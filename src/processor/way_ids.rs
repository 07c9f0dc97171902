//! Network processor: queries a routing server for the ways linking two towns.
//!
//! The server answers `GET /wayid?z=18&loc=<lat>,<lon>&loc=<lat>,<lon>` with
//! a JSON object carrying a `way_ids` array. Anything else is a failure of
//! that unit: non-2xx statuses, malformed bodies and a missing field alike.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ExternalProcessor, ProcessorError};
use crate::enumerate::TownPair;

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Zoom level the server snaps route points at.
const ROUTE_ZOOM: u32 = 18;

/// A way identifier as sent by the server, number or string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WayId {
    Number(i64),
    Text(String),
}

impl fmt::Display for WayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Response body of the `/wayid` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WayIdsResponse {
    pub way_ids: Vec<WayId>,
}

impl WayIdsResponse {
    /// Decodes a response body.
    pub fn decode(body: &[u8]) -> Result<Self, ProcessorError> {
        serde_json::from_slice(body).map_err(|e| ProcessorError::Decode(e.to_string()))
    }

    pub fn into_ids(self) -> Vec<String> {
        self.way_ids.into_iter().map(|id| id.to_string()).collect()
    }
}

/// Client for the routing server's way-id endpoint.
pub struct WayIdClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl WayIdClient {
    /// Creates a client for `server`, given as `host:port` or a full URL.
    ///
    /// # Errors
    ///
    /// Returns the underlying `reqwest::Error` if the HTTP client cannot be
    /// built.
    pub fn with_timeout(server: &str, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(request_timeout).build()?,
            base_url: base_url(server),
            request_timeout,
        })
    }

    /// Creates a client that ignores system proxy settings, for servers on
    /// the local network.
    pub fn direct(server: &str, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder()
                .timeout(request_timeout)
                .no_proxy()
                .build()?,
            base_url: base_url(server),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request URL for one pair of towns.
    pub fn url_for(&self, pair: &TownPair) -> String {
        format!(
            "{}/wayid?z={}&loc={},{}&loc={},{}",
            self.base_url, ROUTE_ZOOM, pair.from.lat, pair.from.lon, pair.to.lat, pair.to.lon
        )
    }

    fn request_error(&self, err: reqwest::Error) -> ProcessorError {
        if err.is_connect() {
            ProcessorError::Unreachable(format!("{}: {err}", self.base_url))
        } else if err.is_timeout() {
            ProcessorError::Timeout(self.request_timeout)
        } else {
            ProcessorError::Failed(err.to_string())
        }
    }
}

/// Normalizes a server address into a base URL without a trailing slash.
fn base_url(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.starts_with("http://") || server.starts_with("https://") {
        server.to_string()
    } else {
        format!("http://{server}")
    }
}

#[async_trait]
impl ExternalProcessor<TownPair> for WayIdClient {
    async fn process(&self, pair: &TownPair) -> Result<Vec<String>, ProcessorError> {
        let url = self.url_for(pair);
        debug!(url = %url, "Requesting way ids");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProcessorError::Failed(format!("HTTP {status} from {url}")));
        }

        let body = response.bytes().await.map_err(|e| self.request_error(e))?;
        Ok(WayIdsResponse::decode(&body)?.into_ids())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::Town;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn pair() -> TownPair {
        TownPair::new(Town::new(55.75, 37.61, true), Town::new(59.93, 30.31, false))
    }

    /// Serves exactly one canned HTTP response on a local port.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\n\
                 Content-Type: application/json\r\n\
                 Content-Length: {}\r\n\
                 Connection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        addr.to_string()
    }

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("localhost:5000"), "http://localhost:5000");
        assert_eq!(base_url("http://osrm:5000/"), "http://osrm:5000");
        assert_eq!(base_url("https://osrm.example"), "https://osrm.example");
    }

    #[test]
    fn test_url_for() {
        let timeout = Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS);
        let client = WayIdClient::with_timeout("localhost:5000", timeout).expect("client builds");
        assert_eq!(
            client.url_for(&pair()),
            "http://localhost:5000/wayid?z=18&loc=55.75,37.61&loc=59.93,30.31"
        );
    }

    #[test]
    fn test_decode_numbers_and_strings() {
        let response =
            WayIdsResponse::decode(br#"{"way_ids": [4242, "77", -1]}"#).expect("valid body");
        assert_eq!(response.into_ids(), vec!["4242", "77", "-1"]);
    }

    #[test]
    fn test_decode_missing_field_fails() {
        let err = WayIdsResponse::decode(br#"{"routes": []}"#).unwrap_err();
        assert!(matches!(err, ProcessorError::Decode(_)));
        assert!(err.to_string().contains("way_ids"));
    }

    #[test]
    fn test_decode_malformed_fails() {
        assert!(WayIdsResponse::decode(b"<html>oops</html>").is_err());
        assert!(WayIdsResponse::decode(br#"{"way_ids": [true]}"#).is_err());
    }

    #[tokio::test]
    async fn test_process_success() {
        let addr = serve_once("200 OK", r#"{"way_ids":[1,2,3]}"#).await;
        let client = WayIdClient::direct(&addr, Duration::from_secs(5)).expect("client builds");

        let ids = client.process(&pair()).await.expect("request succeeds");
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_process_non_2xx_fails() {
        let addr = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let client = WayIdClient::direct(&addr, Duration::from_secs(5)).expect("client builds");

        let err = client.process(&pair()).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Failed(_)), "unexpected error: {err}");
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_process_refused_connection_is_unreachable() {
        // Bind to learn a free port, then release it so nothing listens there.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("local addr").to_string()
        };
        let client = WayIdClient::direct(&addr, Duration::from_secs(5)).expect("client builds");

        let err = client.process(&pair()).await.unwrap_err();
        assert!(err.is_unreachable(), "unexpected error: {err}");
    }
}
