//! Manifest document decoding.
//!
//! The bridge describes the knob UI as a versioned JSON document: a fast
//! playback block, a list of typed screens and a navigation order. The
//! schema evolves on the bridge independently of the device, so decoding is
//! deliberately forgiving: only `version`, `sha` and `fast` are required,
//! screens of unknown type are skipped and counted, and everything else
//! defaults to empty.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::ParseError;
use crate::protocol_constants::{
    MANIFEST_MAX_LINES, MANIFEST_MAX_LIST_ITEMS, MANIFEST_MAX_SCREENS, MANIFEST_SHA_MAX_LEN,
};

// ─────────────────────────────────────────────────────────────────────────────
// Fast State
// ─────────────────────────────────────────────────────────────────────────────

/// Transport capabilities for the current zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportFlags {
    pub play: bool,
    pub pause: bool,
    pub next: bool,
    pub prev: bool,
}

/// Playback snapshot of the active zone.
///
/// Replaced on every successful poll, whichever transport produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastState {
    #[serde(deserialize_with = "null_as_default")]
    pub zone_id: String,
    pub is_playing: bool,
    pub volume: f32,
    pub volume_min: f32,
    pub volume_max: f32,
    pub volume_step: f32,
    #[serde(deserialize_with = "null_as_default")]
    pub volume_type: String,
    /// Seconds, `-1` when unknown.
    #[serde(deserialize_with = "lenient_i32")]
    pub seek_position: i32,
    /// Seconds, `0` when unknown.
    #[serde(deserialize_with = "lenient_i64")]
    pub length: i64,
    pub transport: TransportFlags,
}

impl Default for FastState {
    fn default() -> Self {
        Self {
            zone_id: String::new(),
            is_playing: false,
            volume: 0.0,
            volume_min: 0.0,
            volume_max: 100.0,
            volume_step: 1.0,
            volume_type: String::new(),
            seek_position: -1,
            length: 0,
            transport: TransportFlags::default(),
        }
    }
}

impl FastState {
    /// Repairs values the rest of the engine relies on.
    ///
    /// The step must be positive and the range must not be inverted.
    pub(crate) fn normalized(mut self) -> Self {
        if !(self.volume_step.is_finite() && self.volume_step > 0.0) {
            self.volume_step = 1.0;
        }
        if self.volume_min > self.volume_max {
            std::mem::swap(&mut self.volume_min, &mut self.volume_max);
        }
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Screens
// ─────────────────────────────────────────────────────────────────────────────

/// Typographic role of a text line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextStyle {
    Title,
    Subtitle,
    #[default]
    #[serde(other)]
    Detail,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextLine {
    #[serde(deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(deserialize_with = "null_as_default")]
    pub style: TextStyle,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaScreen {
    #[serde(deserialize_with = "null_as_default")]
    pub image_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub image_key: String,
    #[serde(deserialize_with = "null_as_default")]
    pub background_color: String,
    pub lines: Vec<TextLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListItem {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sublabel: String,
    pub selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListScreen {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    pub items: Vec<ListItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardScreen {
    pub lines: Vec<TextLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressScreen {
    #[serde(deserialize_with = "null_as_default")]
    pub label: String,
    /// Fraction in `[0, 1]`.
    pub progress: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusScreen {
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(deserialize_with = "null_as_default")]
    pub icon: String,
}

/// Type-specific screen content, selected by the `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScreenKind {
    Media(MediaScreen),
    List(ListScreen),
    Card(CardScreen),
    Progress(ProgressScreen),
    Status(StatusScreen),
}

impl ScreenKind {
    const TAGS: [&'static str; 5] = ["media", "list", "card", "progress", "status"];

    fn is_known_tag(tag: &str) -> bool {
        Self::TAGS.contains(&tag)
    }
}

/// An action the bridge wants triggered, with optional parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionRef {
    #[serde(deserialize_with = "null_as_default")]
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementDisplay {
    #[serde(deserialize_with = "null_as_default")]
    pub icon: String,
    #[serde(deserialize_with = "null_as_default")]
    pub label: String,
    pub active: bool,
}

/// A tappable element drawn on a screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Element {
    pub display: ElementDisplay,
    pub on_tap: Option<ActionRef>,
    pub on_long_press: Option<ActionRef>,
}

/// Rotary encoder bindings for a screen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderMap {
    pub cw: Option<ActionRef>,
    pub ccw: Option<ActionRef>,
    pub press: Option<ActionRef>,
    pub long_press: Option<ActionRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screen {
    pub id: String,
    #[serde(flatten)]
    pub kind: ScreenKind,
    /// Button visibility; empty means "all defaults".
    #[serde(default)]
    pub controls: Vec<String>,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub encoder: Option<EncoderMap>,
}

impl Screen {
    fn capped(mut self) -> Self {
        match &mut self.kind {
            ScreenKind::Media(media) => media.lines.truncate(MANIFEST_MAX_LINES),
            ScreenKind::Card(card) => card.lines.truncate(MANIFEST_MAX_LINES),
            ScreenKind::List(list) => list.items.truncate(MANIFEST_MAX_LIST_ITEMS),
            ScreenKind::Progress(progress) => {
                progress.progress = progress.progress.clamp(0.0, 1.0);
            }
            ScreenKind::Status(_) => {}
        }
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manifest
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nav {
    pub order: Vec<String>,
    pub default: Option<String>,
}

impl Nav {
    /// Index of the default screen within `order`, or 0.
    pub fn default_index(&self) -> usize {
        self.default
            .as_deref()
            .and_then(|id| self.order.iter().position(|o| o == id))
            .unwrap_or(0)
    }
}

/// A fully decoded manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Manifest {
    pub version: u32,
    pub sha: String,
    pub fast: FastState,
    pub screens: Vec<Screen>,
    pub nav: Nav,
    /// Input name to action name, e.g. `"long_press" -> "zone_picker"`.
    pub interactions: BTreeMap<String, String>,
    /// Screens dropped because their type is not understood.
    pub skipped_screens: usize,
}

impl Manifest {
    /// A manifest carrying only refreshed fast state for a known hash.
    pub fn fast_only(sha: &str, fast: FastState) -> Self {
        Self {
            version: 1,
            sha: sha.to_string(),
            fast,
            ..Self::default()
        }
    }

    pub fn screen(&self, id: &str) -> Option<&Screen> {
        self.screens.iter().find(|s| s.id == id)
    }

    pub fn screen_mut(&mut self, id: &str) -> Option<&mut Screen> {
        self.screens.iter_mut().find(|s| s.id == id)
    }

    /// Looks up the action mapped to an input name.
    pub fn interaction_for(&self, input: &str) -> Option<&str> {
        self.interactions.get(input).map(String::as_str)
    }
}

#[derive(Deserialize)]
struct RawManifest {
    version: Option<u32>,
    sha: Option<String>,
    fast: Option<FastState>,
    #[serde(default)]
    screens: Vec<Value>,
    #[serde(default)]
    nav: Option<RawNav>,
    #[serde(default)]
    interactions: Option<serde_json::Map<String, Value>>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawNav {
    order: Vec<Value>,
    default: Option<Value>,
}

#[derive(Deserialize)]
struct RawFastOnly {
    #[serde(default)]
    sha: Option<String>,
    fast: Option<FastState>,
}

/// Decodes a full manifest document.
pub fn parse_manifest(json: &[u8]) -> Result<Manifest, ParseError> {
    let raw: RawManifest = serde_json::from_slice(json)?;

    let version = raw.version.ok_or(ParseError::MissingField("version"))?;
    let sha = raw.sha.ok_or(ParseError::MissingField("sha"))?;
    if sha.is_empty() || sha.len() > MANIFEST_SHA_MAX_LEN {
        return Err(ParseError::InvalidField("sha"));
    }
    let fast = raw.fast.ok_or(ParseError::MissingField("fast"))?.normalized();

    let mut screens = Vec::new();
    let mut skipped_screens = 0;
    for value in raw.screens {
        if screens.len() >= MANIFEST_MAX_SCREENS {
            break;
        }
        match decode_screen(value) {
            Some(screen) => screens.push(screen),
            None => skipped_screens += 1,
        }
    }

    let nav = raw.nav.map(|n| build_nav(n, &screens)).unwrap_or_default();

    let interactions = raw
        .interactions
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(input, action)| match action {
            Value::String(action) => Some((input, action)),
            _ => None,
        })
        .collect();

    if skipped_screens > 0 {
        log::debug!(
            "[Manifest] Skipped {} screen(s) with unknown or malformed type",
            skipped_screens
        );
    }

    Ok(Manifest {
        version,
        sha,
        fast,
        screens,
        nav,
        interactions,
        skipped_screens,
    })
}

/// Decodes only the fast block of a manifest document.
///
/// Tokenizes the whole document but never materializes screen data.
pub fn parse_manifest_fast_only(json: &[u8]) -> Result<FastState, ParseError> {
    let raw: RawFastOnly = serde_json::from_slice(json)?;
    raw.fast
        .map(FastState::normalized)
        .ok_or(ParseError::MissingField("fast"))
}

/// Decodes a manifest, skipping screen data when its hash matches `cached_sha`.
///
/// An unchanged document comes back as [`Manifest::fast_only`], which the
/// cache treats as a fast-state refresh.
pub fn parse_manifest_if_changed(
    json: &[u8],
    cached_sha: Option<&str>,
) -> Result<Manifest, ParseError> {
    let Some(cached) = cached_sha.filter(|s| !s.is_empty()) else {
        return parse_manifest(json);
    };
    let raw: RawFastOnly = serde_json::from_slice(json)?;
    if raw.sha.as_deref() != Some(cached) {
        return parse_manifest(json);
    }
    let fast = raw
        .fast
        .map(FastState::normalized)
        .ok_or(ParseError::MissingField("fast"))?;
    Ok(Manifest::fast_only(cached, fast))
}

fn decode_screen(value: Value) -> Option<Screen> {
    let tag = value.get("type").and_then(Value::as_str)?;
    if !ScreenKind::is_known_tag(tag) {
        log::debug!("[Manifest] Unknown screen type '{}'", tag);
        return None;
    }
    match serde_json::from_value::<Screen>(value) {
        Ok(screen) => Some(screen.capped()),
        Err(e) => {
            log::warn!("[Manifest] Malformed screen: {}", e);
            None
        }
    }
}

fn build_nav(raw: RawNav, screens: &[Screen]) -> Nav {
    let order: Vec<String> = raw
        .order
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .filter(|id| screens.iter().any(|s| &s.id == id))
        .collect();

    let default = raw
        .default
        .as_ref()
        .and_then(Value::as_str)
        .filter(|id| order.iter().any(|o| o == id))
        .map(str::to_string)
        .or_else(|| order.first().cloned());

    Nav { order, default }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lenient field decoding
// ─────────────────────────────────────────────────────────────────────────────

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        _ => None,
    })
}

fn lenient_i32<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?
        .map(|n| n.clamp(i32::MIN as f64, i32::MAX as f64) as i32)
        .unwrap_or(-1))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?.map(|n| n as i64).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{MANIFEST_FULL, MANIFEST_MINIMAL};

    #[test]
    fn parses_full_manifest() {
        let manifest = parse_manifest(MANIFEST_FULL.as_bytes()).unwrap();

        assert_eq!(manifest.version, 3);
        assert_eq!(manifest.sha, "abc12345");
        assert!(manifest.fast.is_playing);
        assert_eq!(manifest.fast.volume, -20.0);
        assert_eq!(manifest.fast.volume_min, -64.0);
        assert_eq!(manifest.fast.volume_max, 0.0);
        assert_eq!(manifest.fast.seek_position, 42);
        assert!(manifest.fast.transport.next);

        assert_eq!(manifest.screens.len(), 3);
        assert_eq!(manifest.skipped_screens, 1);
        match &manifest.screens[0].kind {
            ScreenKind::Media(media) => {
                assert_eq!(media.image_key, "img-1");
                assert_eq!(media.lines.len(), 2);
                assert_eq!(media.lines[0].style, TextStyle::Title);
                assert_eq!(media.lines[1].style, TextStyle::Detail);
            }
            other => panic!("unexpected screen {:?}", other),
        }
        assert_eq!(manifest.screens[0].controls, vec!["prev", "play", "next"]);
        assert_eq!(manifest.nav.order, vec!["now", "zones", "queue"]);
        assert_eq!(manifest.nav.default.as_deref(), Some("now"));
        assert_eq!(manifest.interaction_for("long_press"), Some("zone_picker"));
        assert_eq!(manifest.interaction_for("double_tap"), None);
    }

    #[test]
    fn screen_elements_and_encoder() {
        let manifest = parse_manifest(MANIFEST_FULL.as_bytes()).unwrap();
        let queue = manifest.screen("queue").unwrap();
        let element = &queue.elements[0];
        assert_eq!(element.display.icon, "shuffle");
        assert!(element.display.active);
        let tap = element.on_tap.as_ref().unwrap();
        assert_eq!(tap.action, "shuffle");
        assert_eq!(tap.params.as_ref().unwrap()["on"], true);

        let encoder = queue.encoder.as_ref().unwrap();
        assert_eq!(encoder.cw.as_ref().unwrap().action, "scroll_down");
        assert!(encoder.long_press.is_none());
    }

    #[test]
    fn missing_screens_and_nav_yield_empty_lists() {
        let manifest = parse_manifest(MANIFEST_MINIMAL.as_bytes()).unwrap();
        assert!(manifest.screens.is_empty());
        assert!(manifest.nav.order.is_empty());
        assert!(manifest.nav.default.is_none());
        assert!(manifest.interactions.is_empty());
        assert_eq!(manifest.skipped_screens, 0);
    }

    #[test]
    fn missing_required_fields_fail() {
        let err = parse_manifest(br#"{"sha":"abcd1234","fast":{}}"#).unwrap_err();
        assert!(matches!(err, ParseError::MissingField("version")));

        let err = parse_manifest(br#"{"version":1,"fast":{}}"#).unwrap_err();
        assert!(matches!(err, ParseError::MissingField("sha")));

        let err = parse_manifest(br#"{"version":1,"sha":"abcd1234"}"#).unwrap_err();
        assert!(matches!(err, ParseError::MissingField("fast")));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(
            parse_manifest(b"{\"version\":"),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn fast_defaults_apply() {
        let manifest =
            parse_manifest(br#"{"version":1,"sha":"abcd1234","fast":{"volume_step":0}}"#).unwrap();
        assert_eq!(manifest.fast.volume_step, 1.0);
        assert_eq!(manifest.fast.seek_position, -1);
        assert_eq!(manifest.fast.length, 0);
    }

    #[test]
    fn lenient_numbers_and_nulls() {
        let json = br#"{"version":1,"sha":"abcd1234",
            "fast":{"zone_id":null,"seek_position":12.7,"length":null}}"#;
        let manifest = parse_manifest(json).unwrap();
        assert_eq!(manifest.fast.zone_id, "");
        assert_eq!(manifest.fast.seek_position, 12);
        assert_eq!(manifest.fast.length, 0);
    }

    #[test]
    fn nav_default_falls_back_to_first_known_screen() {
        let json = br#"{"version":1,"sha":"abcd1234","fast":{},
            "screens":[{"id":"a","type":"card"},{"id":"b","type":"status","message":"hi"}],
            "nav":{"order":["ghost","b","a"],"default":"ghost"}}"#;
        let manifest = parse_manifest(json).unwrap();
        assert_eq!(manifest.nav.order, vec!["b", "a"]);
        assert_eq!(manifest.nav.default.as_deref(), Some("b"));
        assert_eq!(manifest.nav.default_index(), 0);
    }

    #[test]
    fn list_items_are_capped() {
        let items: Vec<String> = (0..20)
            .map(|i| format!(r#"{{"id":"z{i}","label":"Zone {i}"}}"#))
            .collect();
        let json = format!(
            r#"{{"version":1,"sha":"abcd1234","fast":{{}},
                "screens":[{{"id":"zones","type":"list","items":[{}]}}]}}"#,
            items.join(",")
        );
        let manifest = parse_manifest(json.as_bytes()).unwrap();
        match &manifest.screens[0].kind {
            ScreenKind::List(list) => assert_eq!(list.items.len(), MANIFEST_MAX_LIST_ITEMS),
            other => panic!("unexpected screen {:?}", other),
        }
    }

    #[test]
    fn fast_only_ignores_screens() {
        let fast = parse_manifest_fast_only(MANIFEST_FULL.as_bytes()).unwrap();
        let full = parse_manifest(MANIFEST_FULL.as_bytes()).unwrap();
        assert_eq!(fast, full.fast);

        assert!(matches!(
            parse_manifest_fast_only(br#"{"version":1}"#),
            Err(ParseError::MissingField("fast"))
        ));
    }

    #[test]
    fn unchanged_hash_skips_screens() {
        let unchanged =
            parse_manifest_if_changed(MANIFEST_FULL.as_bytes(), Some("abc12345")).unwrap();
        assert!(unchanged.screens.is_empty());
        assert_eq!(unchanged.sha, "abc12345");
        assert_eq!(unchanged.fast.volume, -20.0);

        let changed =
            parse_manifest_if_changed(MANIFEST_FULL.as_bytes(), Some("00000000")).unwrap();
        assert_eq!(changed.screens.len(), 3);

        let uncached = parse_manifest_if_changed(MANIFEST_FULL.as_bytes(), None).unwrap();
        assert_eq!(uncached.screens.len(), 3);
    }
}
