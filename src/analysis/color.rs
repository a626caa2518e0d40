use serde::{Deserialize, Serialize};

use crate::config::ColorParams;

/// An RGB color with floating-point channels, nominally 0.0-1.0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parses a short `rgb` hex triple (no `#`), each digit expanded to
    /// `dd` as in CSS, so `"f"` means 0xff.
    pub fn from_short_hex(hex: &str) -> Option<Self> {
        if hex.chars().count() != 3 {
            return None;
        }

        let mut digits = hex.chars().map(|c| c.to_digit(16));
        let mut channel = || digits.next().flatten().map(|d| (d * 17) as f32 / 255.0);
        Some(Self::new(channel()?, channel()?, channel()?))
    }
}

/// Turns pitch estimates into a slowly drifting color.
///
/// Each voiced frame derives a candidate color from the pitch, blends it
/// into the previous color, lifts it toward white, warms it slightly and then
/// keeps the result only if every channel moved by an amount strictly inside
/// `(gate_lo, gate_hi)`.
pub struct ColorMapper {
    params: ColorParams,
}

impl ColorMapper {
    pub fn new(params: ColorParams) -> Self {
        Self { params }
    }

    /// Next color for this frame. `previous` is never modified; an unvoiced
    /// frame or a rejected change returns it as-is.
    pub fn next(&self, previous: &Color, pitch: Option<f32>) -> Color {
        let Some(pitch) = pitch else {
            return *previous;
        };

        let candidate = Self::hue_candidate(pitch);
        let p = &self.params;

        let mix = |old: f32, new: f32| ((1.0 - p.blend) * old + p.blend * new) * p.brightness + p.lightness;
        let mut color = Color::new(
            mix(previous.r, candidate.r),
            mix(previous.g, candidate.g),
            mix(previous.b, candidate.b),
        );

        color.r += p.red_nudge;
        color.b -= p.blue_nudge;

        if self.within_gate(previous, &color) {
            color
        } else {
            *previous
        }
    }

    /// Candidate color for a pitch: the integer part as hex, zero-padded and
    /// cut to its last three digits, read as an `rgb` triple.
    pub fn hue_candidate(pitch: f32) -> Color {
        // Saturating cast: negative or NaN pitches map to 0.
        let hex = format!("{:03x}", pitch.floor() as u64);
        let short = &hex[hex.len() - 3..];
        Color::from_short_hex(short).unwrap_or_default()
    }

    /// Whether every channel changed by strictly more than `gate_lo` and
    /// strictly less than `gate_hi`.
    pub fn within_gate(&self, previous: &Color, next: &Color) -> bool {
        let lo = self.params.gate_lo;
        let hi = self.params.gate_hi;

        [
            (previous.r - next.r).abs(),
            (previous.g - next.g).abs(),
            (previous.b - next.b).abs(),
        ]
        .iter()
        .all(|&d| d > lo && d < hi)
    }
}

impl Default for ColorMapper {
    fn default() -> Self {
        Self::new(ColorParams::default())
    }
}
