//! Optional color rendering hints attached to a resource.

use serde::{Deserialize, Serialize};

/// How the visible bands of a raster should be interpreted for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorInterpretation {
    /// Single band mapped to a gray ramp.
    Grayscale,
    /// Three bands mapped to red, green, blue.
    Rgb,
    /// Four bands mapped to red, green, blue, alpha.
    Rgba,
    /// Single band of indices into an external palette.
    Palette,
}

impl ColorInterpretation {
    /// Band count this interpretation requires, if fixed.
    fn required_bands(&self) -> Option<usize> {
        match self {
            Self::Grayscale | Self::Palette => Some(1),
            Self::Rgb => Some(3),
            Self::Rgba => Some(4),
        }
    }
}

/// Rendering hint: a color interpretation plus the first band it applies to.
///
/// Purely advisory; a resource without one renders band values directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorModel {
    pub interpretation: ColorInterpretation,
    /// Index of the band carrying the (first) visible sample, in the
    /// coordinate space of the model's band list.
    pub visible_band: usize,
}

impl ColorModel {
    /// Create a color model.
    pub fn new(interpretation: ColorInterpretation, visible_band: usize) -> Self {
        Self {
            interpretation,
            visible_band,
        }
    }

    /// Derive the color model for a band subset.
    ///
    /// `bands` are strictly increasing source band indices. Returns `None`
    /// when the visible band was dropped. An interpretation whose band
    /// count no longer matches the selection degrades to grayscale.
    pub fn for_band_subset(&self, bands: &[usize]) -> Option<ColorModel> {
        let position = bands.iter().position(|&b| b == self.visible_band)?;
        let interpretation = match self.interpretation.required_bands() {
            Some(required) if bands.len() != required => ColorInterpretation::Grayscale,
            _ => self.interpretation,
        };
        Some(ColorModel {
            interpretation,
            visible_band: position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subset_keeps_matching_interpretation() {
        let rgb = ColorModel::new(ColorInterpretation::Rgb, 0);
        let kept = rgb.for_band_subset(&[0, 1, 2]).unwrap();
        assert_eq!(kept.interpretation, ColorInterpretation::Rgb);
        assert_eq!(kept.visible_band, 0);
    }

    #[test]
    fn test_subset_degrades_to_grayscale() {
        let rgb = ColorModel::new(ColorInterpretation::Rgb, 1);
        let degraded = rgb.for_band_subset(&[1, 3]).unwrap();
        assert_eq!(degraded.interpretation, ColorInterpretation::Grayscale);
        assert_eq!(degraded.visible_band, 0);
    }

    #[test]
    fn test_subset_drops_visible_band() {
        let gray = ColorModel::new(ColorInterpretation::Grayscale, 2);
        assert!(gray.for_band_subset(&[0, 1]).is_none());
    }
}
