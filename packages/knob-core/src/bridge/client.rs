//! Concrete bridge transports: the UDP fast path and the JSON endpoints.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use super::traits::{BridgeHttp, FastPath};
use crate::context::{BridgeUrls, NetworkError};
use crate::protocol_constants::FAST_RESPONSE_LEN;
use crate::wire::{
    check_control_response, decode_fast_response, encode_fast_request, encode_volume_command,
    ControlReply, ControlRequest, FastResponse, ParseError, WireError,
};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors talking to the bridge. Always recoverable: they drive the failure
/// counters and the next tick retries.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request to the bridge failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The bridge answered with a non-success status.
    #[error("HTTP error {0}")]
    HttpStatus(u16),

    /// Socket failure on the fast path.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// No fast-path reply arrived in time.
    #[error("no reply within {0}ms")]
    Timeout(u64),

    /// The bridge host name did not resolve.
    #[error("could not resolve '{0}'")]
    Resolve(String),

    /// The bridge accepted the request but reported an error.
    #[error("bridge rejected request: {0}")]
    Rejected(String),

    /// Malformed fast-path frame.
    #[error("bad fast-path reply: {0}")]
    Wire(#[from] WireError),

    /// Malformed JSON reply.
    #[error("bad JSON reply: {0}")]
    Parse(#[from] ParseError),

    /// The bridge address could not be turned into a URL.
    #[error(transparent)]
    Url(#[from] NetworkError),
}

/// Convenient Result alias for bridge transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    /// Returns true for link-level failures worth retrying unchanged, as
    /// opposed to the bridge refusing or garbling the request.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::HttpStatus(status) => *status >= 500,
            Self::Io(_) | Self::Timeout(_) | Self::Resolve(_) => true,
            Self::Rejected(_) | Self::Wire(_) | Self::Parse(_) | Self::Url(_) => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Production bridge client.
///
/// HTTP calls rely on the client's request timeout; the fast path uses a
/// fresh connected socket per request so a late reply to an earlier poll can
/// never be mistaken for the current one.
#[derive(Clone)]
pub struct BridgeClientImpl {
    http: Client,
    fast_timeout: Duration,
}

impl BridgeClientImpl {
    /// Creates a client with the given HTTP client and fast-path receive timeout.
    #[must_use]
    pub fn new(http: Client, fast_timeout: Duration) -> Self {
        Self { http, fast_timeout }
    }

    /// Builds the HTTP client with a bounded request timeout.
    pub fn http_client(request_timeout: Duration) -> TransportResult<Client> {
        Ok(Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()?)
    }

    /// Resolves the fast-path endpoint and opens a socket connected to it.
    async fn fast_socket(&self, base: &str) -> TransportResult<UdpSocket> {
        let (host, port) = BridgeUrls::new(base).fast_path_target()?;
        let target = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|_| TransportError::Resolve(host.clone()))?
            .next()
            .ok_or_else(|| TransportError::Resolve(host.clone()))?;

        let bind: SocketAddr = if target.is_ipv4() {
            "0.0.0.0:0".parse().map_err(|_| TransportError::Resolve(host.clone()))?
        } else {
            "[::]:0".parse().map_err(|_| TransportError::Resolve(host.clone()))?
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(target).await?;
        Ok(socket)
    }

    /// Reads the body of a successful response, mapping error statuses.
    async fn read_body(response: reqwest::Response) -> TransportResult<Vec<u8>> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl FastPath for BridgeClientImpl {
    async fn poll_fast(
        &self,
        base: &str,
        last_hash: &str,
        zone_id: &str,
    ) -> TransportResult<FastResponse> {
        let socket = self.fast_socket(base).await?;
        socket.send(&encode_fast_request(last_hash, zone_id)).await?;

        let mut buf = [0u8; FAST_RESPONSE_LEN + 1];
        let len = timeout(self.fast_timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout(self.fast_timeout.as_millis() as u64))??;
        Ok(decode_fast_response(&buf[..len])?)
    }

    async fn send_volume(&self, base: &str, zone_id: &str, value: f32) -> TransportResult<()> {
        let socket = self.fast_socket(base).await?;
        socket.send(&encode_volume_command(zone_id, value)).await?;
        Ok(())
    }
}

#[async_trait]
impl BridgeHttp for BridgeClientImpl {
    async fn fetch_manifest(
        &self,
        base: &str,
        zone_id: &str,
        sha: Option<&str>,
    ) -> TransportResult<Vec<u8>> {
        let url = BridgeUrls::new(base).manifest(zone_id, sha)?;
        let response = self.http.get(url).send().await?;
        Self::read_body(response).await
    }

    async fn fetch_zones(&self, base: &str, knob_id: Option<&str>) -> TransportResult<Vec<u8>> {
        let url = BridgeUrls::new(base).zones(knob_id)?;
        let response = self.http.get(url).send().await?;
        Self::read_body(response).await
    }

    async fn post_control(&self, base: &str, request: &ControlRequest) -> TransportResult<()> {
        let url = BridgeUrls::new(base).control()?;
        let response = self.http.post(url).json(request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        // An "error" key wins over the HTTP status.
        if let ControlReply::Rejected(message) = check_control_response(&body) {
            return Err(TransportError::Rejected(message));
        }
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{FastCommand, FastRequest, TransportFlags};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Binds a fake fast-path listener and returns it with the matching base URL.
    async fn fake_fast_bridge() -> (UdpSocket, String) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, format!("http://127.0.0.1:{}", port - 1))
    }

    /// Serves one HTTP request with a canned response, returning the request head.
    async fn fake_http_bridge(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });
        (base, handle)
    }

    fn client() -> BridgeClientImpl {
        BridgeClientImpl::new(
            BridgeClientImpl::http_client(Duration::from_secs(2)).unwrap(),
            Duration::from_millis(300),
        )
    }

    #[tokio::test]
    async fn poll_fast_round_trip() {
        let (bridge, base) = fake_fast_bridge().await;
        let server = tokio::spawn(async move {
            let mut buf = [0u8; 128];
            let (len, from) = bridge.recv_from(&mut buf).await.unwrap();
            let request = FastRequest::decode(&buf[..len]).unwrap();
            let reply = FastResponse {
                playing: true,
                transport: TransportFlags {
                    play: false,
                    pause: true,
                    next: true,
                    prev: true,
                },
                hash: request.hash.clone(),
                volume: -12.0,
                volume_min: -64.0,
                volume_max: 0.0,
                volume_step: 1.0,
                seek_position: 30,
                length: 200,
            };
            bridge.send_to(&reply.encode(), from).await.unwrap();
            request
        });

        let response = client().poll_fast(&base, "abc12345", "zone-1").await.unwrap();
        assert!(response.playing);
        assert_eq!(response.hash, "abc12345");
        assert_eq!(response.volume, -12.0);

        let request = server.await.unwrap();
        assert_eq!(request.zone_id, "zone-1");
    }

    #[tokio::test]
    async fn poll_fast_times_out_when_bridge_is_silent() {
        let (_silent, base) = fake_fast_bridge().await;
        let err = client().poll_fast(&base, "", "zone-1").await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(300)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn poll_fast_rejects_oversized_reply() {
        let (bridge, base) = fake_fast_bridge().await;
        tokio::spawn(async move {
            let mut buf = [0u8; 128];
            let (_, from) = bridge.recv_from(&mut buf).await.unwrap();
            let mut reply = FastResponse::default().encode().to_vec();
            reply.extend_from_slice(b"junk");
            bridge.send_to(&reply, from).await.unwrap();
        });

        let err = client().poll_fast(&base, "", "zone-1").await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Wire(WireError::BadLength {
                expected: 48,
                actual: 49
            })
        ));
    }

    #[tokio::test]
    async fn send_volume_is_fire_and_forget() {
        let (bridge, base) = fake_fast_bridge().await;
        client().send_volume(&base, "zone-1", -20.0).await.unwrap();

        let mut buf = [0u8; 64];
        let len = timeout(Duration::from_secs(2), bridge.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let command = FastCommand::decode(&buf[..len]).unwrap();
        assert_eq!(command, FastCommand::volume_set("zone-1", -20.0));
    }

    #[tokio::test]
    async fn control_error_key_beats_status() {
        let (base, server) = fake_http_bridge("200 OK", r#"{"error":"unknown zone"}"#).await;
        let err = client()
            .post_control(&base, &ControlRequest::new("z1", "play_pause"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(ref m) if m == "unknown zone"));
        assert!(!err.is_transient());

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /control"));
    }

    #[tokio::test]
    async fn control_accepts_empty_body() {
        let (base, _server) = fake_http_bridge("200 OK", "").await;
        client()
            .post_control(&base, &ControlRequest::new("z1", "next"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn control_accepts_plain_text_body() {
        let (base, server) = fake_http_bridge("200 OK", "OK").await;
        client()
            .post_control(&base, &ControlRequest::new("z1", "play_pause"))
            .await
            .unwrap();
        assert!(server.await.unwrap().starts_with("POST /control"));
    }

    #[tokio::test]
    async fn manifest_error_status_is_reported() {
        let (base, server) = fake_http_bridge("503 Service Unavailable", "{}").await;
        let err = client()
            .fetch_manifest(&base, "zone-1", Some("abc12345"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::HttpStatus(503)));
        assert!(err.is_transient());

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /knob/manifest?zone_id=zone-1&sha=abc12345"));
    }

    #[tokio::test]
    async fn zones_body_is_returned() {
        let (base, _server) = fake_http_bridge("200 OK", r#"[{"zone_id":"a","zone_name":"A"}]"#).await;
        let body = client().fetch_zones(&base, Some("knob-1")).await.unwrap();
        assert_eq!(crate::wire::parse_zones(&body).unwrap().len(), 1);
    }
}
