//! Network context for talking to the bridge.
//!
//! This module provides [`BridgeUrls`], which derives every bridge endpoint
//! from a base address, and the [`IpDetector`] seam used to learn the
//! device's own address (shown to the user when the bridge needs
//! reconfiguring).

use std::net::IpAddr;
use std::sync::Arc;

use reqwest::Url;

use crate::protocol_constants::{
    ARTWORK_PATH, CONTROL_PATH, DEFAULT_BRIDGE_PORT, FAST_PORT_OFFSET, MANIFEST_PATH, ZONES_PATH,
};
use crate::utils::normalize_base;

/// Trait for detecting the local IP address.
///
/// Different environments may need different detection strategies.
/// This trait allows injecting the appropriate detector.
pub trait IpDetector: Send + Sync {
    /// Detects the local IP address.
    fn detect(&self) -> Result<String, NetworkError>;
}

/// Default IP detector using the system's network interfaces.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    /// Creates a new `LocalIpDetector` wrapped in an Arc.
    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self)
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<String, NetworkError> {
        local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

/// Detector that always reports a configured address.
#[derive(Debug, Clone)]
pub struct FixedIpDetector(pub IpAddr);

impl IpDetector for FixedIpDetector {
    fn detect(&self) -> Result<String, NetworkError> {
        Ok(self.0.to_string())
    }
}

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Could not detect local IP address.
    #[error("Failed to detect local IP: {0}")]
    Detection(String),

    /// A bridge address could not be turned into a URL.
    #[error("Invalid bridge URL '{0}'")]
    InvalidUrl(String),
}

/// Builds bridge endpoint URLs from a base address.
#[derive(Debug, Clone)]
pub struct BridgeUrls {
    base: String,
}

impl BridgeUrls {
    /// Creates a builder for `base` (e.g. `http://192.168.1.20:8088/`).
    /// Trailing slashes are dropped.
    pub fn new(base: &str) -> Self {
        Self {
            base: normalize_base(base),
        }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, NetworkError> {
        let raw = format!("{}{}", self.base, path);
        let url = if params.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, params)
        };
        url.map_err(|_| NetworkError::InvalidUrl(raw))
    }

    /// `GET {base}/knob/manifest?zone_id=..[&sha=..]`
    pub fn manifest(&self, zone_id: &str, sha: Option<&str>) -> Result<Url, NetworkError> {
        match sha.filter(|s| !s.is_empty()) {
            Some(sha) => self.endpoint(MANIFEST_PATH, &[("zone_id", zone_id), ("sha", sha)]),
            None => self.endpoint(MANIFEST_PATH, &[("zone_id", zone_id)]),
        }
    }

    /// `GET {base}/zones[?knob_id=..]`
    pub fn zones(&self, knob_id: Option<&str>) -> Result<Url, NetworkError> {
        match knob_id.filter(|k| !k.is_empty()) {
            Some(knob_id) => self.endpoint(ZONES_PATH, &[("knob_id", knob_id)]),
            None => self.endpoint(ZONES_PATH, &[]),
        }
    }

    /// `POST {base}/control`
    pub fn control(&self) -> Result<Url, NetworkError> {
        self.endpoint(CONTROL_PATH, &[])
    }

    /// Artwork scaled to the display, as RGB565.
    pub fn artwork(
        &self,
        zone_id: &str,
        width: u32,
        height: u32,
        clip_radius: Option<u32>,
    ) -> Result<Url, NetworkError> {
        let width = width.to_string();
        let height = height.to_string();
        let clip = clip_radius.map(|r| r.to_string());
        let mut params = vec![
            ("zone_id", zone_id),
            ("scale", "fit"),
            ("width", width.as_str()),
            ("height", height.as_str()),
            ("format", "rgb565"),
        ];
        if let Some(clip) = clip.as_deref() {
            params.push(("clip_radius", clip));
        }
        self.endpoint(ARTWORK_PATH, &params)
    }

    /// Host and UDP port of the fast path (HTTP port + 1).
    pub fn fast_path_target(&self) -> Result<(String, u16), NetworkError> {
        let url = Url::parse(&self.base).map_err(|_| NetworkError::InvalidUrl(self.base.clone()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| NetworkError::InvalidUrl(self.base.clone()))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url.port_or_known_default().unwrap_or(DEFAULT_BRIDGE_PORT);
        let fast_port = port
            .checked_add(FAST_PORT_OFFSET)
            .ok_or_else(|| NetworkError::InvalidUrl(self.base.clone()))?;
        Ok((host, fast_port))
    }
}

/// Address the user should open to reconfigure the device.
#[must_use]
pub fn device_setup_url(device_ip: &str) -> String {
    format!("http://{}", device_ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn fixed_detector_reports_address() {
        let detector = FixedIpDetector(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(detector.detect().unwrap(), "10.0.0.5");
    }

    #[test]
    fn manifest_url_carries_zone_and_sha() {
        let urls = BridgeUrls::new("http://192.168.1.20:8088//");
        assert_eq!(urls.base(), "http://192.168.1.20:8088");
        assert_eq!(
            urls.manifest("zone 1", Some("abc12345")).unwrap().as_str(),
            "http://192.168.1.20:8088/knob/manifest?zone_id=zone+1&sha=abc12345"
        );
        assert_eq!(
            urls.manifest("z1", None).unwrap().as_str(),
            "http://192.168.1.20:8088/knob/manifest?zone_id=z1"
        );
    }

    #[test]
    fn zones_and_control_urls() {
        let urls = BridgeUrls::new("http://bridge.local:8088");
        assert_eq!(
            urls.zones(Some("knob-7")).unwrap().as_str(),
            "http://bridge.local:8088/zones?knob_id=knob-7"
        );
        assert_eq!(
            urls.zones(None).unwrap().as_str(),
            "http://bridge.local:8088/zones"
        );
        assert_eq!(
            urls.control().unwrap().as_str(),
            "http://bridge.local:8088/control"
        );
    }

    #[test]
    fn artwork_url_has_display_geometry() {
        let urls = BridgeUrls::new("http://10.0.0.2:8088");
        assert_eq!(
            urls.artwork("z1", 360, 360, Some(180)).unwrap().as_str(),
            "http://10.0.0.2:8088/now_playing/image?zone_id=z1&scale=fit&width=360&height=360&format=rgb565&clip_radius=180"
        );
    }

    #[test]
    fn fast_path_target_uses_next_port() {
        let urls = BridgeUrls::new("http://10.0.0.2:8088");
        assert_eq!(
            urls.fast_path_target().unwrap(),
            ("10.0.0.2".to_string(), 8089)
        );
        let urls = BridgeUrls::new("http://bridge.local");
        assert_eq!(
            urls.fast_path_target().unwrap(),
            ("bridge.local".to_string(), 81)
        );
    }

    #[test]
    fn invalid_base_is_reported() {
        assert!(matches!(
            BridgeUrls::new("not a url").control(),
            Err(NetworkError::InvalidUrl(_))
        ));
    }
}
