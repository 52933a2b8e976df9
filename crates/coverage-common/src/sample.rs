//! Sample data types and per-pixel storage models.

use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};

/// Element type of one sample value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    U8,
    I16,
    U16,
    I32,
    F32,
    F64,
}

impl DataType {
    /// Size of one sample element in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Read the sample at `index` from little-endian raw bytes.
    ///
    /// Returns `None` when the element does not fit in `bytes`.
    pub fn read_sample(&self, bytes: &[u8], index: usize) -> Option<f64> {
        let w = self.size_bytes();
        let at = index.checked_mul(w)?;
        let raw = bytes.get(at..at + w)?;
        Some(match self {
            Self::U8 => raw[0] as f64,
            Self::I16 => i16::from_le_bytes([raw[0], raw[1]]) as f64,
            Self::U16 => u16::from_le_bytes([raw[0], raw[1]]) as f64,
            Self::I32 => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            Self::F32 => f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            Self::F64 => f64::from_le_bytes([
                raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
            ]),
        })
    }

    /// Write `value` as the sample at `index` into little-endian raw bytes.
    ///
    /// Integer types truncate toward zero. Silently ignores writes past the
    /// end of `bytes`.
    pub fn write_sample(&self, bytes: &mut [u8], index: usize, value: f64) {
        let w = self.size_bytes();
        let at = index * w;
        let Some(raw) = bytes.get_mut(at..at + w) else {
            return;
        };
        match self {
            Self::U8 => raw[0] = value as u8,
            Self::I16 => raw.copy_from_slice(&(value as i16).to_le_bytes()),
            Self::U16 => raw.copy_from_slice(&(value as u16).to_le_bytes()),
            Self::I32 => raw.copy_from_slice(&(value as i32).to_le_bytes()),
            Self::F32 => raw.copy_from_slice(&(value as f32).to_le_bytes()),
            Self::F64 => raw.copy_from_slice(&value.to_le_bytes()),
        }
    }
}

/// How the samples of a multi-band pixel are laid out in a tile buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandLayout {
    /// Samples of one pixel are adjacent: `pixel * num_bands + band`.
    PixelInterleaved,
    /// One full plane per band: `band * pixels_per_tile + pixel`.
    Planar,
    /// Multiple samples packed into one element (e.g. 1-bit masks).
    /// Not addressable per sample; decoders are expected to expand packed
    /// data before it reaches the coverage core.
    Packed { bits_per_sample: u8 },
}

/// Description of per-pixel sample storage for one full tile.
///
/// Width and height are not part of the model: a model always describes a
/// buffer sized to the resource's tile size at full resolution, regardless
/// of any subsampling applied when pixels are read back out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleModel {
    pub data_type: DataType,
    pub num_bands: usize,
    pub layout: BandLayout,
}

impl SampleModel {
    /// Create a sample model. Fails on a zero band count.
    pub fn new(data_type: DataType, num_bands: usize, layout: BandLayout) -> Result<Self> {
        if num_bands == 0 {
            return Err(CoverageError::model("sample model must have at least one band"));
        }
        Ok(Self {
            data_type,
            num_bands,
            layout,
        })
    }

    /// True when individual samples can be addressed by (pixel, band).
    pub fn is_addressable(&self) -> bool {
        !matches!(self.layout, BandLayout::Packed { .. })
    }

    /// Derive the model restricted to the given source bands.
    ///
    /// `bands` must be strictly increasing and in range. Packed layouts
    /// cannot be restricted; that is a hard error, raised here rather than
    /// at first tile read.
    pub fn band_subset(&self, bands: &[usize]) -> Result<SampleModel> {
        if bands.is_empty() {
            return Err(CoverageError::model("band subset must keep at least one band"));
        }
        if !self.is_addressable() {
            return Err(CoverageError::model(
                "packed sample layouts cannot be restricted to a band subset",
            ));
        }
        let mut previous: Option<usize> = None;
        for &band in bands {
            if band >= self.num_bands {
                return Err(CoverageError::InvalidBand {
                    band,
                    count: self.num_bands,
                });
            }
            if previous.is_some_and(|p| band <= p) {
                return Err(CoverageError::model("band subset must be strictly increasing"));
            }
            previous = Some(band);
        }
        Ok(SampleModel {
            data_type: self.data_type,
            num_bands: bands.len(),
            layout: self.layout,
        })
    }

    /// Element index of `(pixel, band)` in a tile of `pixels_per_tile`
    /// pixels. Only meaningful for addressable layouts.
    pub fn element_offset(&self, pixel: usize, band: usize, pixels_per_tile: usize) -> usize {
        debug_assert!(self.is_addressable());
        debug_assert!(band < self.num_bands);
        match self.layout {
            BandLayout::PixelInterleaved => pixel * self.num_bands + band,
            BandLayout::Planar => band * pixels_per_tile + pixel,
            BandLayout::Packed { .. } => 0,
        }
    }

    /// Byte length of a full tile buffer of `pixels` pixels, with overflow
    /// detection.
    pub fn tile_byte_len(&self, pixels: u64) -> Result<usize> {
        let elements = pixels
            .checked_mul(self.num_bands as u64)
            .ok_or_else(|| CoverageError::overflow("tile element count exceeds u64"))?;
        let bytes = elements
            .checked_mul(self.data_type.size_bytes() as u64)
            .ok_or_else(|| CoverageError::overflow("tile byte length exceeds u64"))?;
        usize::try_from(bytes)
            .map_err(|_| CoverageError::overflow("tile byte length exceeds usize"))
    }
}
