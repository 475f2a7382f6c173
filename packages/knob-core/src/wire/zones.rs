//! Zone listing decoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ParseError;
use crate::protocol_constants::MAX_ZONES;

/// A named playback target on the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub zone_id: String,
    pub zone_name: String,
}

impl Zone {
    pub fn new(zone_id: impl Into<String>, zone_name: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            zone_name: zone_name.into(),
        }
    }
}

/// Bridges answer either with a bare array or with `{"zones": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ZonesBody {
    Bare(Vec<Value>),
    Wrapped { zones: Vec<Value> },
}

/// Decodes a zone listing.
///
/// Entries without a string `zone_id` are skipped, a missing name falls back
/// to the id, and the result is capped at [`MAX_ZONES`].
pub fn parse_zones(json: &[u8]) -> Result<Vec<Zone>, ParseError> {
    let entries = match serde_json::from_slice::<ZonesBody>(json)? {
        ZonesBody::Bare(entries) | ZonesBody::Wrapped { zones: entries } => entries,
    };

    let zones: Vec<Zone> = entries
        .iter()
        .filter_map(|entry| {
            let id = entry.get("zone_id")?.as_str()?;
            if id.is_empty() {
                return None;
            }
            let name = entry
                .get("zone_name")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
                .unwrap_or(id);
            Some(Zone::new(id, name))
        })
        .take(MAX_ZONES)
        .collect();

    if zones.len() < entries.len() {
        log::debug!(
            "[Zones] Kept {} of {} zone entries",
            zones.len(),
            entries.len()
        );
    }
    Ok(zones)
}
