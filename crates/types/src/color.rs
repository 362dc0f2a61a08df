//! Color values as they appear in card configurations.
//!
//! Card configs store colors as `#RRGGBB` strings so they survive JSON
//! round-trips unchanged; `Color` is the parsed form used by renderers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HEX_RGB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap_or_else(|e| panic!("invalid color pattern: {e}"))
});

/// Returns true if `value` is a `#RRGGBB` color literal.
pub fn is_hex_rgb(value: &str) -> bool {
    HEX_RGB.is_match(value)
}

/// RGBA color with alpha channel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f64 / 255.0,
            g: g as f64 / 255.0,
            b: b as f64 / 255.0,
            a: a as f64 / 255.0,
        }
    }

    pub fn to_rgba8(&self) -> (u8, u8, u8, u8) {
        (
            (self.r * 255.0).round() as u8,
            (self.g * 255.0).round() as u8,
            (self.b * 255.0).round() as u8,
            (self.a * 255.0).round() as u8,
        )
    }

    /// Parse a `#RRGGBB` literal. Alpha is always opaque.
    pub fn from_hex(value: &str) -> Option<Self> {
        if !is_hex_rgb(value) {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&value[range], 16).ok();
        Some(Self::from_rgba8(channel(1..3)?, channel(3..5)?, channel(5..7)?, 255))
    }

    /// Format as `#RRGGBB`, dropping alpha.
    pub fn to_hex(&self) -> String {
        let (r, g, b, _) = self.to_rgba8();
        format!("#{:02X}{:02X}{:02X}", r, g, b)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

/// Default series palette used when a chart series has no explicit color.
pub const SERIES_PALETTE: &[&str] = &[
    "#4E79A7", "#F28E2B", "#E15759", "#76B7B2", "#59A14F", "#EDC948", "#B07AA1", "#FF9DA7",
];

/// Pick a palette color for the series at `index`, wrapping around.
pub fn palette_color(index: usize) -> &'static str {
    SERIES_PALETTE[index % SERIES_PALETTE.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_validation() {
        assert!(is_hex_rgb("#A0b1C2"));
        assert!(!is_hex_rgb("A0B1C2"));
        assert!(!is_hex_rgb("#A0B1C"));
        assert!(!is_hex_rgb("#A0B1C2FF"));
        assert!(!is_hex_rgb("#GGGGGG"));
    }

    #[test]
    fn test_from_hex() {
        let color = Color::from_hex("#FF8000").unwrap();
        assert_eq!(color.to_rgba8(), (255, 128, 0, 255));
        assert_eq!(color.to_hex(), "#FF8000");
        assert!(Color::from_hex("red").is_none());
    }

    #[test]
    fn test_palette_wraps() {
        assert_eq!(palette_color(0), palette_color(SERIES_PALETTE.len()));
    }
}
