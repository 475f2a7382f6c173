//! Cache of the last fully parsed manifest, keyed by its content hash.
//!
//! Fast state is replaced on every apply. Screens and navigation are only
//! replaced when the hash changes, so unchanged layouts are never rebuilt.

use std::sync::Arc;

use serde::Serialize;

use crate::protocol_constants::ZONES_SCREEN_ID;
use crate::wire::{FastState, Manifest, ScreenKind};

/// What changed after applying a manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CacheDelta {
    /// Same hash: only playback state changed.
    FastOnly { fast: FastState },
    /// New hash: screens, navigation and the screen to show.
    Full {
        manifest: Arc<Manifest>,
        #[serde(rename = "navIndex")]
        nav_index: usize,
    },
}

impl CacheDelta {
    pub fn fast(&self) -> &FastState {
        match self {
            Self::FastOnly { fast } => fast,
            Self::Full { manifest, .. } => &manifest.fast,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full { .. })
    }
}

#[derive(Debug, Default)]
pub struct ManifestCache {
    manifest: Option<Arc<Manifest>>,
    fast: Option<FastState>,
    nav_index: usize,
    full_updates: u64,
    fast_updates: u64,
}

impl ManifestCache {
    /// Applies a manifest, replacing screens only when its hash is new.
    pub fn apply(&mut self, incoming: Manifest) -> CacheDelta {
        self.fast = Some(incoming.fast.clone());

        let unchanged = self
            .manifest
            .as_ref()
            .is_some_and(|cached| cached.sha == incoming.sha);
        if unchanged {
            self.fast_updates += 1;
            return CacheDelta::FastOnly {
                fast: incoming.fast,
            };
        }

        let had_manifest = self.manifest.is_some();
        let nav_len = incoming.nav.order.len();
        if !had_manifest || self.nav_index >= nav_len {
            self.nav_index = incoming.nav.default_index();
        }

        log::debug!(
            "[ManifestCache] New manifest {} ({} screens, nav index {})",
            incoming.sha,
            incoming.screens.len(),
            self.nav_index
        );

        let manifest = Arc::new(incoming);
        self.manifest = Some(manifest.clone());
        self.full_updates += 1;
        CacheDelta::Full {
            manifest,
            nav_index: self.nav_index,
        }
    }

    /// Cached content hash.
    pub fn sha(&self) -> Option<&str> {
        self.manifest.as_ref().map(|m| m.sha.as_str())
    }

    /// Most recent fast state, from whichever manifest arrived last.
    pub fn fast(&self) -> Option<&FastState> {
        self.fast.as_ref()
    }

    pub fn manifest(&self) -> Option<Arc<Manifest>> {
        self.manifest.clone()
    }

    pub fn nav_index(&self) -> usize {
        self.nav_index
    }

    /// Id of the screen at the current navigation index.
    pub fn current_screen_id(&self) -> Option<&str> {
        self.manifest
            .as_ref()?
            .nav
            .order
            .get(self.nav_index)
            .map(String::as_str)
    }

    /// Moves through the navigation order, wrapping at both ends.
    pub fn step_screen(&mut self, delta: i32) -> Option<usize> {
        let len = self.manifest.as_ref()?.nav.order.len();
        if len == 0 {
            return None;
        }
        let next = (self.nav_index as i64 + delta as i64).rem_euclid(len as i64);
        self.nav_index = next as usize;
        Some(self.nav_index)
    }

    /// Number of (full, fast-only) applies since creation.
    pub fn update_counts(&self) -> (u64, u64) {
        (self.full_updates, self.fast_updates)
    }

    /// Forgets everything, forcing the next apply to be full.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Marks `zone_id` as the selected item of the zones list screen.
///
/// Returns whether a zones screen was present.
pub fn mark_selected_zone(manifest: &mut Manifest, zone_id: &str) -> bool {
    let Some(screen) = manifest.screen_mut(ZONES_SCREEN_ID) else {
        return false;
    };
    let ScreenKind::List(list) = &mut screen.kind else {
        return false;
    };
    for item in &mut list.items {
        item.selected = item.id == zone_id;
    }
    true
}
