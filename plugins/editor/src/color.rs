//! Colour model for the mutator's colour group

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::{EditorError, EditorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTarget {
    Text,
    Background,
}

impl ColorTarget {
    pub fn css_property(&self) -> &'static str {
        match self {
            ColorTarget::Text => "color",
            ColorTarget::Background => "background-color",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Hue in degrees, saturation and lightness in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsl {
    pub h: f64,
    pub s: f64,
    pub l: f64,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };

    /// Manual entry: exactly six hex digits, `#` optional
    pub fn from_hex(input: &str) -> EditorResult<Self> {
        let trimmed = input.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(EditorError::InvalidHexColor(input.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| EditorError::InvalidHexColor(input.to_string()))
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Read a computed/inline CSS colour. Fully transparent colours and
    /// anything unrecognised yield `None`.
    pub fn parse_css(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        if let Ok(rgb) = Rgb::from_hex(&value) {
            return Some(rgb);
        }
        if let Some(short) = value.strip_prefix('#') {
            if short.len() == 3 && short.chars().all(|c| c.is_ascii_hexdigit()) {
                let expanded: String = short.chars().flat_map(|c| [c, c]).collect();
                return Rgb::from_hex(&expanded).ok();
            }
        }
        if let Some(caps) = rgb_pattern().and_then(|re| re.captures(&value)) {
            let channel = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u8>().ok());
            let alpha = caps
                .get(4)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(1.0);
            if alpha == 0.0 {
                return None;
            }
            return Some(Rgb {
                r: channel(1)?,
                g: channel(2)?,
                b: channel(3)?,
            });
        }
        match value.as_str() {
            "black" => Some(Rgb::BLACK),
            "white" => Some(Rgb::WHITE),
            "red" => Some(Rgb { r: 255, g: 0, b: 0 }),
            "green" => Some(Rgb { r: 0, g: 128, b: 0 }),
            "blue" => Some(Rgb { r: 0, g: 0, b: 255 }),
            "gray" | "grey" => Some(Rgb { r: 128, g: 128, b: 128 }),
            _ => None,
        }
    }

    pub fn to_hsl(&self) -> Hsl {
        let r = self.r as f64 / 255.0;
        let g = self.g as f64 / 255.0;
        let b = self.b as f64 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        let delta = max - min;

        if delta == 0.0 {
            return Hsl { h: 0.0, s: 0.0, l: l * 100.0 };
        }

        let s = delta / (1.0 - (2.0 * l - 1.0).abs());
        let h = if max == r {
            60.0 * (((g - b) / delta).rem_euclid(6.0))
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        Hsl {
            h,
            s: s * 100.0,
            l: l * 100.0,
        }
    }
}

fn rgb_pattern() -> Option<&'static Regex> {
    static RGB: OnceLock<Option<Regex>> = OnceLock::new();
    RGB.get_or_init(|| {
        Regex::new(r"^rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*([0-9.]+)\s*)?\)$").ok()
    })
    .as_ref()
}

impl Hsl {
    pub fn new(h: f64, s: f64, l: f64) -> Self {
        Self {
            h: h.rem_euclid(360.0),
            s: s.clamp(0.0, 100.0),
            l: l.clamp(0.0, 100.0),
        }
    }

    pub fn to_rgb(&self) -> Rgb {
        let s = self.s / 100.0;
        let l = self.l / 100.0;
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let h = self.h.rem_euclid(360.0) / 60.0;
        let x = c * (1.0 - (h.rem_euclid(2.0) - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = l - c / 2.0;
        let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Rgb {
            r: channel(r),
            g: channel(g),
            b: channel(b),
        }
    }

    pub fn to_hex(&self) -> String {
        self.to_rgb().to_hex()
    }

    pub fn to_css(&self) -> String {
        format!("hsl({:.0}, {:.0}%, {:.0}%)", self.h, self.s, self.l)
    }
}

/// The 2-D saturation x lightness field plus the 1-D hue bar
pub struct GradientPicker;

impl GradientPicker {
    /// `x` runs left to right over saturation, `y` top to bottom over
    /// lightness (top is light). Both are clamped to `0..=1`.
    pub fn pick(base: Hsl, x: f64, y: f64) -> Hsl {
        Hsl::new(base.h, x.clamp(0.0, 1.0) * 100.0, (1.0 - y.clamp(0.0, 1.0)) * 100.0)
    }

    /// Position `t` on the hue bar, `0..=1` mapped to `0..360` degrees
    pub fn pick_hue(base: Hsl, t: f64) -> Hsl {
        Hsl::new(t.clamp(0.0, 1.0) * 360.0, base.s, base.l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_validation() {
        assert_eq!(Rgb::from_hex("#FF8000").unwrap(), Rgb { r: 255, g: 128, b: 0 });
        assert_eq!(Rgb::from_hex("00ff00").unwrap().to_hex(), "#00ff00");
        for bad in ["#fff", "#12345", "#1234567", "#12345g", "", "red"] {
            assert!(
                matches!(Rgb::from_hex(bad), Err(EditorError::InvalidHexColor(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_css_parsing() {
        assert_eq!(Rgb::parse_css("#abc"), Some(Rgb { r: 0xaa, g: 0xbb, b: 0xcc }));
        assert_eq!(Rgb::parse_css("rgb(10, 20, 30)"), Some(Rgb { r: 10, g: 20, b: 30 }));
        assert_eq!(Rgb::parse_css("rgba(0, 0, 0, 0)"), None);
        assert_eq!(Rgb::parse_css("White"), Some(Rgb::WHITE));
        assert_eq!(Rgb::parse_css("var(--brand)"), None);
    }

    #[test]
    fn test_hsl_conversion() {
        let red = Rgb { r: 255, g: 0, b: 0 }.to_hsl();
        assert_eq!(red, Hsl { h: 0.0, s: 100.0, l: 50.0 });
        assert_eq!(Hsl::new(120.0, 100.0, 50.0).to_hex(), "#00ff00");
        assert_eq!(Hsl::new(240.0, 100.0, 25.0).to_hex(), "#000080");

        let teal = Rgb { r: 0x33, g: 0x99, b: 0x99 };
        assert_eq!(teal.to_hsl().to_rgb(), teal);
    }

    #[test]
    fn test_gradient_and_hue_bar() {
        let base = Hsl::new(200.0, 50.0, 50.0);
        let picked = GradientPicker::pick(base, 1.0, 0.5);
        assert_eq!(picked, Hsl::new(200.0, 100.0, 50.0));

        let corner = GradientPicker::pick(base, 0.0, 0.0);
        assert_eq!(corner.to_hex(), "#ffffff");

        let hue = GradientPicker::pick_hue(Hsl::new(0.0, 100.0, 50.0), 1.0 / 3.0);
        assert_eq!(hue.to_hex(), "#00ff00");
    }
}
