//! Theme colors
//!
//! Persisted the same way as favorites: one JSON object rewritten on every
//! change. Palette derivation stays in the hosting UI; only the light/dark
//! decision lives here because several surfaces need it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::storage::{load_json_or_default, save_json, KeyValueStore};

pub const THEME_KEY: &str = "radio-theme";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeColors {
    pub background: String,
    pub primary: String,
}

impl Default for ThemeColors {
    fn default() -> Self {
        Self {
            background: "#f7f7f7".to_string(),
            primary: "#5A618E".to_string(),
        }
    }
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct ThemeUpdate {
    pub background: Option<String>,
    pub primary: Option<String>,
}

/// Hue in degrees, saturation and lightness in percent, all rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsl {
    pub h: u16,
    pub s: u8,
    pub l: u8,
}

impl ThemeColors {
    pub fn background_is_light(&self) -> bool {
        hex_to_hsl(&self.background).map(|c| c.l > 50).unwrap_or(true)
    }
}

/// `#rrggbb` (leading `#` optional) to HSL. `None` for anything else.
pub fn hex_to_hsl(hex: &str) -> Option<Hsl> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok().map(|v| v as f64 / 255.0);
    let (r, g, b) = (channel(0)?, channel(2)?, channel(4)?);

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    let (mut h, mut s) = (0.0, 0.0);

    if max != min {
        let d = max - min;
        s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
        let sector = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        h = sector / 6.0;
    }

    Some(Hsl {
        h: (h * 360.0).round() as u16,
        s: (s * 100.0).round() as u8,
        l: (l * 100.0).round() as u8,
    })
}

pub struct ThemeStore {
    store: Arc<dyn KeyValueStore>,
    colors: ThemeColors,
}

impl ThemeStore {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let colors = load_json_or_default(store.as_ref(), THEME_KEY).unwrap_or_default();
        Self { store, colors }
    }

    pub fn colors(&self) -> &ThemeColors {
        &self.colors
    }

    /// Apply a partial change and write the full object through.
    pub fn update(&mut self, update: ThemeUpdate) -> Result<&ThemeColors, PersistenceError> {
        let mut next = self.colors.clone();
        if let Some(background) = update.background {
            next.background = background;
        }
        if let Some(primary) = update.primary {
            next.primary = primary;
        }
        save_json(self.store.as_ref(), THEME_KEY, &next)?;
        self.colors = next;
        Ok(&self.colors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_hex_to_hsl() {
        assert_eq!(hex_to_hsl("#ffffff"), Some(Hsl { h: 0, s: 0, l: 100 }));
        assert_eq!(hex_to_hsl("000000"), Some(Hsl { h: 0, s: 0, l: 0 }));
        assert_eq!(hex_to_hsl("#ff0000"), Some(Hsl { h: 0, s: 100, l: 50 }));
        assert_eq!(hex_to_hsl("#00ff00"), Some(Hsl { h: 120, s: 100, l: 50 }));
        assert_eq!(hex_to_hsl("#0000ff"), Some(Hsl { h: 240, s: 100, l: 50 }));
        assert_eq!(hex_to_hsl("#abc"), None);
        assert_eq!(hex_to_hsl("#zzzzzz"), None);
    }

    #[test]
    fn test_default_theme_is_light() {
        assert!(ThemeColors::default().background_is_light());
        let dark = ThemeColors {
            background: "#121212".into(),
            ..ThemeColors::default()
        };
        assert!(!dark.background_is_light());
    }

    #[test]
    fn test_partial_update_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut theme = ThemeStore::load(store.clone());
        assert_eq!(theme.colors(), &ThemeColors::default());

        theme
            .update(ThemeUpdate {
                primary: Some("#112233".into()),
                ..ThemeUpdate::default()
            })
            .unwrap();

        let reloaded = ThemeStore::load(store);
        assert_eq!(reloaded.colors().primary, "#112233");
        assert_eq!(reloaded.colors().background, "#f7f7f7");
    }

    #[test]
    fn test_malformed_theme_falls_back() {
        let store = Arc::new(MemoryStore::new());
        store.set(THEME_KEY, "[1,2,3]").unwrap();
        let theme = ThemeStore::load(store);
        assert_eq!(theme.colors(), &ThemeColors::default());
    }
}
