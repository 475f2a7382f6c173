//! User-facing connection status.
//!
//! Failures escalate in tiers: a silent retry, then "attempt N of M", then a
//! terminal message that tells the user where to reconfigure the device.

use std::fmt;

use serde::Serialize;

use crate::context::device_setup_url;

/// A connection status shown in the network banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BridgeStatus {
    /// No bridge address yet; discovery is running.
    Searching { attempt: u8, of: u8 },
    /// Discovery gave up.
    NotFound {
        #[serde(rename = "deviceIp")]
        device_ip: Option<String>,
    },
    /// The bridge stopped answering; retrying.
    Testing { attempt: u8, of: u8 },
    /// The bridge has not answered for too long.
    Unreachable {
        #[serde(rename = "deviceIp")]
        device_ip: Option<String>,
    },
}

impl BridgeStatus {
    /// First line, shown as the banner header.
    pub fn headline(&self) -> &'static str {
        match self {
            Self::Searching { .. } => "Searching for Bridge",
            Self::NotFound { .. } => "Bridge Not Found",
            Self::Testing { .. } => "Testing Bridge",
            Self::Unreachable { .. } => "Bridge unreachable",
        }
    }

    /// Second line: progress or the next action for the user.
    pub fn detail(&self) -> String {
        match self {
            Self::Searching { attempt, of } | Self::Testing { attempt, of } => {
                format!("Attempt {} of {}...", attempt, of)
            }
            Self::NotFound { device_ip } => match device_ip {
                Some(ip) => format!("Set Bridge at {}", device_setup_url(ip)),
                None => "Set Bridge URL in Settings".to_string(),
            },
            Self::Unreachable { device_ip } => match device_ip {
                Some(ip) => format!("Update at {}", device_setup_url(ip)),
                None => "Check Bridge URL in Settings".to_string(),
            },
        }
    }

    /// Whether this is a terminal tier that needs user action.
    pub fn needs_user_action(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Unreachable { .. })
    }
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.headline(), self.detail())
    }
}

/// Status for a failed bridge request, or `None` for the silent tier.
///
/// `failures` is the saturated count after recording this failure. The very
/// first failure after a successful poll stays silent.
pub fn bridge_failure_status(
    failures: u8,
    threshold: u8,
    was_online: bool,
    device_ip: Option<&str>,
) -> Option<BridgeStatus> {
    if failures >= threshold {
        return Some(BridgeStatus::Unreachable {
            device_ip: device_ip.map(str::to_string),
        });
    }
    if was_online && failures <= 1 {
        return None;
    }
    Some(BridgeStatus::Testing {
        attempt: failures,
        of: threshold,
    })
}

/// Status while no bridge address is known.
///
/// Below the threshold the banner names the search about to run, so it
/// counts one past the failures so far.
pub fn discovery_failure_status(
    failures: u8,
    threshold: u8,
    device_ip: Option<&str>,
) -> BridgeStatus {
    if failures >= threshold {
        BridgeStatus::NotFound {
            device_ip: device_ip.map(str::to_string),
        }
    } else {
        BridgeStatus::Searching {
            attempt: failures.saturating_add(1),
            of: threshold,
        }
    }
}
