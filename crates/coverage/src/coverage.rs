//! Coverage reads: tile iteration, on-demand decode and output assembly.

use std::sync::Arc;

use futures::future;
use tracing::debug;

use coverage_common::{CoverageError, GridExtent, Result};

use crate::buffer::TileBuffer;
use crate::resource::RasterDecoder;
use crate::subset::Subset;

/// Pixel data produced by one coverage read.
///
/// Samples are `f64`, pixel-interleaved, row-major over the domain extent
/// (last dimension varies fastest), bands in the order they were
/// requested.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    domain: GridExtent,
    num_bands: usize,
    data: Vec<f64>,
}

impl Raster {
    fn filled(domain: GridExtent, num_bands: usize, value: f64) -> Result<Self> {
        let cells = domain.element_count()?;
        let samples = cells
            .checked_mul(num_bands as u64)
            .and_then(|total| usize::try_from(total).ok())
            .ok_or_else(|| CoverageError::overflow("raster sample count exceeds usize"))?;
        Ok(Self {
            domain,
            num_bands,
            data: vec![value; samples],
        })
    }

    /// The output grid extent, in output coordinates.
    pub fn domain(&self) -> &GridExtent {
        &self.domain
    }

    /// Number of bands.
    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    /// Raw samples.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the read produced no pixels.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The sample at output grid coordinates, or `None` outside the
    /// domain.
    pub fn sample(&self, coords: &[i64], band: usize) -> Option<f64> {
        if band >= self.num_bands {
            return None;
        }
        let pixel = self.linear(coords)?;
        self.data.get(pixel * self.num_bands + band).copied()
    }

    fn linear(&self, coords: &[i64]) -> Option<usize> {
        if coords.len() != self.domain.dimension() || !self.domain.contains(coords) {
            return None;
        }
        let mut index: usize = 0;
        for (d, &c) in coords.iter().enumerate() {
            index = index * self.domain.size(d) as usize + (c - self.domain.low(d)) as usize;
        }
        Some(index)
    }

    fn set(&mut self, coords: &[i64], band: usize, value: f64) {
        if let Some(pixel) = self.linear(coords) {
            self.data[pixel * self.num_bands + band] = value;
        }
    }
}

/// A coverage view over a planned [`Subset`].
///
/// Reading visits exactly the tiles overlapping the subset's read extent,
/// decoding each at most once per cache generation, and is safe to run
/// from multiple tasks concurrently over the same subset.
pub struct TiledGridCoverage {
    decoder: Arc<dyn RasterDecoder>,
    subset: Arc<Subset>,
}

impl TiledGridCoverage {
    /// Create a coverage over a subset.
    pub fn new(decoder: Arc<dyn RasterDecoder>, subset: Arc<Subset>) -> Self {
        Self { decoder, subset }
    }

    /// The plan this coverage reads.
    pub fn subset(&self) -> &Subset {
        &self.subset
    }

    /// Read one fully-populated raster covering the subset's domain.
    ///
    /// Any single tile decode failure aborts the whole read; no partial
    /// result is returned.
    pub async fn read(&self) -> Result<Raster> {
        let subset = &self.subset;
        let num_bands = subset.output_bands();
        if subset.domain().is_empty() {
            return Raster::filled(subset.domain().clone(), num_bands, 0.0);
        }

        let tiles = self.tiles_to_visit();
        debug!(
            tiles = tiles.len(),
            domain = ?subset.domain().sizes(),
            "reading coverage"
        );

        let buffers =
            future::try_join_all(tiles.iter().map(|tile| self.load_tile(tile))).await?;

        let mut raster = Raster::filled(
            subset.domain().clone(),
            num_bands,
            subset.fill_value().unwrap_or(0.0),
        )?;
        for (tile, buffer) in tiles.iter().zip(&buffers) {
            self.copy_tile_window(&mut raster, tile, buffer);
        }
        Ok(raster)
    }

    /// Tiles overlapping the read extent, in row-major order.
    fn tiles_to_visit(&self) -> Vec<Vec<i64>> {
        let subset = &self.subset;
        let read = subset.read_extent();
        let n = read.dimension();
        if read.is_empty() {
            return Vec::new();
        }

        let mut first = Vec::with_capacity(n);
        let mut last = Vec::with_capacity(n);
        for d in 0..n {
            // Read extents are clipped to the source, so both corners map
            // to valid tiles.
            first.push(read.low(d));
            last.push(read.high(d).unwrap_or(read.low(d)));
        }
        let first = subset.tiling().tile_of(&first);
        let last = subset.tiling().tile_of(&last);

        let mut tiles = Vec::new();
        for_each_index(&first, &last, |tile| tiles.push(tile.to_vec()));
        tiles
    }

    /// Fetch one tile through the subset's cache, decoding on miss.
    ///
    /// Concurrent misses on the same key may each decode; the cache keeps
    /// the first insertion and losers adopt the winner's buffer.
    async fn load_tile(&self, tile: &[i64]) -> Result<Arc<TileBuffer>> {
        let subset = &self.subset;
        let key = subset.tiling().tile_key(tile);
        if let Some(buffer) = subset.cache().get(key) {
            return Ok(buffer);
        }

        let bands = if subset.load_all_bands() {
            None
        } else {
            subset.selected_bands()
        };
        let raw = self
            .decoder
            .fetch_tile(tile, bands)
            .await
            .map_err(|e| match e {
                CoverageError::TileDecode { .. } => e,
                other => CoverageError::tile_decode(tile, other.to_string()),
            })?;

        let buffer = TileBuffer::decode(
            tile,
            raw,
            subset.tiling().tile_origin(tile),
            subset.tiling().tile_size(),
            subset.decode_model().clone(),
            subset.fill_value(),
        )?;
        Ok(subset.cache().insert(key, Arc::new(buffer)))
    }

    /// Copy the pixels this tile contributes to the output, applying
    /// subsampling and band selection.
    fn copy_tile_window(&self, raster: &mut Raster, tile: &[i64], buffer: &TileBuffer) {
        let subset = &self.subset;
        let n = subset.domain().dimension();
        let tile_origin = subset.tiling().tile_origin(tile);
        let tile_size = subset.tiling().tile_size();
        let read = subset.read_extent();
        let domain = subset.domain();

        // Output window served by this tile, per dimension.
        let mut out_first = Vec::with_capacity(n);
        let mut out_last = Vec::with_capacity(n);
        for d in 0..n {
            let (Some(read_high), Some(domain_high)) = (read.high(d), domain.high(d)) else {
                return;
            };
            let src_first = tile_origin[d].max(read.low(d));
            let src_last = (tile_origin[d] + tile_size[d] as i64 - 1).min(read_high);
            if src_first > src_last {
                return;
            }

            let step = subset.subsampling(d) as i64;
            let offset = subset.subsampling_offset(d);
            let first = div_ceil(src_first - offset, step).max(domain.low(d));
            let last = (src_last - offset).div_euclid(step).min(domain_high);
            if first > last {
                return;
            }
            out_first.push(first);
            out_last.push(last);
        }

        let num_bands = subset.output_bands();
        let mut source = vec![0i64; n];
        for_each_index(&out_first, &out_last, |out| {
            for d in 0..n {
                source[d] = out[d] * subset.subsampling(d) as i64 + subset.subsampling_offset(d);
            }
            for band in 0..num_bands {
                let decode_band = subset.decode_band_for_output(band);
                // Address against the buffer's own origin: a shared buffer
                // keeps whatever origin its first loader set.
                if let Some(value) = buffer.sample(&source, decode_band) {
                    raster.set(out, band, value);
                }
            }
        });
    }
}

/// Ceiling division for a positive divisor.
fn div_ceil(a: i64, b: i64) -> i64 {
    let q = a.div_euclid(b);
    if a.rem_euclid(b) != 0 {
        q + 1
    } else {
        q
    }
}

/// Visit every index vector in the inclusive box `[first, last]` in
/// row-major order (last dimension varies fastest).
fn for_each_index(first: &[i64], last: &[i64], mut visit: impl FnMut(&[i64])) {
    debug_assert_eq!(first.len(), last.len());
    if first.iter().zip(last).any(|(f, l)| f > l) {
        return;
    }
    let n = first.len();
    let mut current = first.to_vec();
    loop {
        visit(&current);
        let mut d = n;
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            if current[d] < last[d] {
                current[d] += 1;
                current[d + 1..].copy_from_slice(&first[d + 1..]);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_div_ceil() {
        assert_eq!(div_ceil(7, 4), 2);
        assert_eq!(div_ceil(8, 4), 2);
        assert_eq!(div_ceil(0, 4), 0);
        assert_eq!(div_ceil(-7, 4), -1);
        assert_eq!(div_ceil(-8, 4), -2);
    }

    #[test]
    fn test_for_each_index_row_major() {
        let mut seen = Vec::new();
        for_each_index(&[0, 10], &[1, 11], |idx| seen.push(idx.to_vec()));
        assert_eq!(
            seen,
            vec![vec![0, 10], vec![0, 11], vec![1, 10], vec![1, 11]]
        );
    }

    #[test]
    fn test_for_each_index_empty_range() {
        let mut count = 0;
        for_each_index(&[0, 5], &[3, 4], |_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_raster_indexing() {
        let domain = GridExtent::new(vec![10, 20], vec![2, 3]).unwrap();
        let mut raster = Raster::filled(domain, 2, 0.0).unwrap();
        raster.set(&[10, 20], 0, 1.0);
        raster.set(&[10, 20], 1, 2.0);
        raster.set(&[11, 22], 1, 9.0);

        assert_eq!(raster.sample(&[10, 20], 0), Some(1.0));
        assert_eq!(raster.sample(&[10, 20], 1), Some(2.0));
        assert_eq!(raster.sample(&[11, 22], 1), Some(9.0));
        assert_eq!(raster.sample(&[12, 20], 0), None);
        assert_eq!(raster.sample(&[10, 20], 2), None);
        assert_eq!(raster.len(), 12);
    }
}
