//! Decoded tile buffers.

use bytes::Bytes;

use coverage_common::{CoverageError, Result, SampleModel};
use tile_cache::MemorySized;

/// One decoded tile: raw little-endian samples plus the layout needed to
/// address them.
///
/// A buffer reused from a shared cache keeps the origin its first loader
/// set; it is not recomputed for later readers. All window arithmetic must
/// therefore go through [`origin`](Self::origin) (or [`sample`](Self::sample),
/// which does) rather than assume the origin equals the logical tile
/// position.
#[derive(Debug)]
pub struct TileBuffer {
    origin: Vec<i64>,
    tile_size: Vec<u64>,
    pixels: usize,
    model: SampleModel,
    data: Vec<u8>,
}

impl TileBuffer {
    /// Build a tile buffer from a raw payload.
    ///
    /// The buffer is always sized to one full tile. A payload shorter than
    /// that (a truncated edge tile) has its remainder padded with the fill
    /// value, or left zero-initialized when none is defined; a payload
    /// longer than a full tile is a decode error for `tile`.
    pub fn decode(
        tile: &[i64],
        raw: Bytes,
        origin: Vec<i64>,
        tile_size: &[u64],
        model: SampleModel,
        fill_value: Option<f64>,
    ) -> Result<Self> {
        let pixels_u64 = tile_size.iter().try_fold(1u64, |acc, &t| {
            acc.checked_mul(t)
                .ok_or_else(|| CoverageError::overflow("tile pixel count exceeds u64"))
        })?;
        let byte_len = model.tile_byte_len(pixels_u64)?;
        if raw.len() > byte_len {
            return Err(CoverageError::tile_decode(
                tile,
                format!("payload of {} bytes exceeds tile buffer of {byte_len} bytes", raw.len()),
            ));
        }

        let mut data = vec![0u8; byte_len];
        if let Some(fill) = fill_value {
            let elements = byte_len / model.data_type.size_bytes();
            for element in 0..elements {
                model.data_type.write_sample(&mut data, element, fill);
            }
        }
        data[..raw.len()].copy_from_slice(&raw);

        Ok(Self {
            origin,
            tile_size: tile_size.to_vec(),
            pixels: pixels_u64 as usize,
            model,
            data,
        })
    }

    /// The source-grid coordinates of this buffer's first sample, as set
    /// by whichever reader decoded it first.
    pub fn origin(&self) -> &[i64] {
        &self.origin
    }

    /// The sample model this buffer was decoded with.
    pub fn model(&self) -> &SampleModel {
        &self.model
    }

    /// Read the sample at absolute source coordinates, addressed against
    /// this buffer's own origin.
    ///
    /// Returns `None` when the coordinates fall outside the buffer or the
    /// band does not exist.
    pub fn sample(&self, coords: &[i64], band: usize) -> Option<f64> {
        if coords.len() != self.origin.len() || band >= self.model.num_bands {
            return None;
        }
        let mut pixel: usize = 0;
        for (d, &c) in coords.iter().enumerate() {
            let rel = c - self.origin[d];
            if rel < 0 || rel as u64 >= self.tile_size[d] {
                return None;
            }
            pixel = pixel * self.tile_size[d] as usize + rel as usize;
        }
        let element = self.model.element_offset(pixel, band, self.pixels);
        self.model.data_type.read_sample(&self.data, element)
    }
}

impl MemorySized for TileBuffer {
    fn size_bytes(&self) -> usize {
        self.data.len()
    }
}
