//! Shared test fixtures for bridge payloads.
//!
//! These constants are used by multiple test modules to avoid duplication.

/// Manifest with every screen type the UI cares about plus one the device
/// does not understand.
pub const MANIFEST_FULL: &str = r##"{
  "version": 3,
  "sha": "abc12345",
  "fast": {
    "zone_id": "zone-1",
    "is_playing": true,
    "volume": -20,
    "volume_min": -64,
    "volume_max": 0,
    "volume_step": 1,
    "volume_type": "db",
    "seek_position": 42,
    "length": 240,
    "transport": {"play": false, "pause": true, "next": true, "prev": true}
  },
  "screens": [
    {
      "id": "now",
      "type": "media",
      "image_url": "/now_playing/image?zone_id=zone-1",
      "image_key": "img-1",
      "background_color": "#101820",
      "lines": [
        {"text": "Blue in Green", "style": "title"},
        {"text": "Kind of Blue", "style": "caption"}
      ],
      "controls": ["prev", "play", "next"]
    },
    {
      "id": "zones",
      "type": "list",
      "title": "Zones",
      "items": [
        {"id": "zone-1", "label": "Kitchen"},
        {"id": "zone-2", "label": "Den", "sublabel": "Idle"}
      ]
    },
    {
      "id": "viz",
      "type": "visualizer",
      "bars": 16
    },
    {
      "id": "queue",
      "type": "card",
      "lines": [{"text": "Up next", "style": "subtitle"}],
      "elements": [
        {
          "display": {"icon": "shuffle", "label": "Shuffle", "active": true},
          "on_tap": {"action": "shuffle", "params": {"on": true}}
        }
      ],
      "encoder": {
        "cw": {"action": "scroll_down"},
        "ccw": {"action": "scroll_up"},
        "press": {"action": "select"}
      }
    }
  ],
  "nav": {"order": ["now", "zones", "viz", "queue"], "default": "now"},
  "interactions": {"long_press": "zone_picker", "double_tap": 5}
}"##;

/// Manifest with only the required fields.
pub const MANIFEST_MINIMAL: &str = r##"{
  "version": 1,
  "sha": "abc12345",
  "fast": {"zone_id": "zone-1", "volume": -10, "volume_min": -64, "volume_max": 0}
}"##;

/// Same content hash as [`MANIFEST_FULL`] but a different volume.
pub const MANIFEST_FULL_VOLUME_CHANGED: &str = r##"{
  "version": 3,
  "sha": "abc12345",
  "fast": {"zone_id": "zone-1", "is_playing": true, "volume": -5, "volume_min": -64, "volume_max": 0},
  "screens": [{"id": "now", "type": "status", "message": "ignored"}],
  "nav": {"order": ["now"]}
}"##;

/// A new content hash with a two-screen layout.
pub const MANIFEST_NEW_LAYOUT: &str = r##"{
  "version": 3,
  "sha": "def67890",
  "fast": {"zone_id": "zone-1", "volume": -30, "volume_min": -64, "volume_max": 0},
  "screens": [
    {"id": "status", "type": "status", "message": "Paused", "icon": "pause"},
    {"id": "progress", "type": "progress", "label": "Buffering", "progress": 0.5}
  ],
  "nav": {"order": ["status", "progress"], "default": "progress"}
}"##;

/// Zone listing with two zones.
pub const ZONES_TWO: &str = r##"[
  {"zone_id": "zone-1", "zone_name": "Kitchen"},
  {"zone_id": "zone-2", "zone_name": "Den"}
]"##;
