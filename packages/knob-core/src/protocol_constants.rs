//! Fixed protocol constants that should NOT be changed.
//!
//! These values are shared with the bridge and changing them would break
//! wire compatibility with deployed bridges.

// ─────────────────────────────────────────────────────────────────────────────
// UDP Fast Path
// ─────────────────────────────────────────────────────────────────────────────

/// Magic prefix of every fast-path datagram ("RK" read little-endian).
pub const FAST_MAGIC: u16 = 0x524B;

/// Fast-path response version understood by this client.
pub const FAST_RESPONSE_VERSION: u8 = 1;

/// Size of a fast-path poll request (magic + hash + zone id).
pub const FAST_REQUEST_LEN: usize = 54;

/// Size of a fast-path poll response.
pub const FAST_RESPONSE_LEN: usize = 48;

/// Size of a fast-path command header: magic, code, reserved byte and zone.
pub const FAST_COMMAND_LEN: usize = 36;

/// Size of a fast-path command carrying an `f32` value.
pub const FAST_COMMAND_WITH_VALUE_LEN: usize = 40;

/// Width of the hash field in requests and responses.
pub const FAST_HASH_FIELD_LEN: usize = 20;

/// Width of the zone id field in requests and commands.
pub const FAST_ZONE_FIELD_LEN: usize = 32;

/// Command code: set absolute volume (carries a value).
pub const FAST_CMD_VOLUME_SET: u8 = 0x01;

/// The UDP fast path listens on the bridge HTTP port plus this offset.
pub const FAST_PORT_OFFSET: u16 = 1;

/// Response flag bits.
pub const FLAG_PLAYING: u8 = 1 << 0;
pub const FLAG_PLAY_OK: u8 = 1 << 1;
pub const FLAG_PAUSE_OK: u8 = 1 << 2;
pub const FLAG_NEXT_OK: u8 = 1 << 3;
pub const FLAG_PREV_OK: u8 = 1 << 4;

// ─────────────────────────────────────────────────────────────────────────────
// Bridge HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Default bridge HTTP port, used for discovered addresses.
pub const DEFAULT_BRIDGE_PORT: u16 = 8088;

/// Path of the manifest endpoint.
pub const MANIFEST_PATH: &str = "/knob/manifest";

/// Path of the zone listing endpoint.
pub const ZONES_PATH: &str = "/zones";

/// Path of the control endpoint.
pub const CONTROL_PATH: &str = "/control";

/// Path of the artwork endpoint.
pub const ARTWORK_PATH: &str = "/now_playing/image";

/// Service type advertised by bridges over mDNS.
pub const MDNS_SERVICE_TYPE: &str = "_roonknob._tcp.local.";

/// TXT record key carrying the bridge base URL.
pub const MDNS_TXT_BASE_KEY: &str = "base";

// ─────────────────────────────────────────────────────────────────────────────
// Manifest Limits
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum number of screens kept from a manifest.
pub const MANIFEST_MAX_SCREENS: usize = 4;

/// Maximum number of text lines per screen.
pub const MANIFEST_MAX_LINES: usize = 4;

/// Maximum number of items in a list screen.
pub const MANIFEST_MAX_LIST_ITEMS: usize = 16;

/// Maximum length of a manifest content hash.
pub const MANIFEST_SHA_MAX_LEN: usize = 16;

/// Maximum number of zones kept in the directory.
pub const MAX_ZONES: usize = 64;

/// Id of the list screen that mirrors the zone directory.
pub const ZONES_SCREEN_ID: &str = "zones";
