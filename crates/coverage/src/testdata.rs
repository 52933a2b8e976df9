//! In-memory decoder with deterministic pixel values, for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use coverage_common::{
    BandLayout, ColorModel, CoverageError, DataType, GridExtent, GridGeometry, Result,
    SampleDimension, SampleModel,
};

use crate::resource::RasterDecoder;

/// Deterministic sample value for a grid coordinate and band.
///
/// Coordinates are folded with base 10_000 so any two cells of a grid
/// smaller than 10_000 per dimension get distinct values, and each band is
/// shifted far enough to never collide with another band's values.
pub fn pattern_value(coords: &[i64], band: usize) -> f64 {
    let mut value = 0i64;
    for &c in coords {
        value = value * 10_000 + c;
    }
    (value + band as i64 * 1_000_000_000) as f64
}

/// Decoder backed by a value function instead of storage.
///
/// Tracks how many tile fetches it served and can inject failures or
/// truncated edge tiles to exercise the decode path.
pub struct MemoryDecoder {
    extent: GridExtent,
    tile_size: Vec<u64>,
    model: SampleModel,
    colors: Option<ColorModel>,
    fill: Option<f64>,
    dimensions: Vec<SampleDimension>,
    fetches: AtomicU64,
    fail_tiles: HashSet<Vec<i64>>,
    truncate_edges: bool,
}

impl MemoryDecoder {
    /// Square 2D grid with one F64 band and square tiles, anchored at the
    /// origin, holding [`pattern_value`] samples.
    pub fn single_band_2d(width: u64, height: u64, tile: u64) -> Self {
        Self::multi_band_2d(width, height, tile, 1)
    }

    /// Like [`single_band_2d`](Self::single_band_2d) with several
    /// pixel-interleaved bands.
    pub fn multi_band_2d(width: u64, height: u64, tile: u64, bands: usize) -> Self {
        let extent =
            GridExtent::new(vec![0, 0], vec![height, width]).expect("valid 2d test extent");
        Self::with_extent(extent, vec![tile, tile], bands)
    }

    /// Arbitrary extent, tile size and band count.
    pub fn with_extent(extent: GridExtent, tile_size: Vec<u64>, bands: usize) -> Self {
        let model = SampleModel {
            data_type: DataType::F64,
            num_bands: bands,
            layout: BandLayout::PixelInterleaved,
        };
        let dimensions = (0..bands)
            .map(|b| SampleDimension::new(format!("band_{b}"), ""))
            .collect();
        Self {
            extent,
            tile_size,
            model,
            colors: None,
            fill: None,
            dimensions,
            fetches: AtomicU64::new(0),
            fail_tiles: HashSet::new(),
            truncate_edges: false,
        }
    }

    /// Replace the sample model (same band count expected by the value
    /// pattern).
    pub fn with_model(mut self, model: SampleModel) -> Self {
        self.dimensions = (0..model.num_bands)
            .map(|b| SampleDimension::new(format!("band_{b}"), ""))
            .collect();
        self.model = model;
        self
    }

    /// Attach a color model.
    pub fn with_colors(mut self, colors: ColorModel) -> Self {
        self.colors = Some(colors);
        self
    }

    /// Attach a fill value used for cells outside the extent.
    pub fn with_fill(mut self, fill: f64) -> Self {
        self.fill = Some(fill);
        self
    }

    /// Make fetching the given tile fail.
    pub fn with_fail_tile(mut self, tile: Vec<i64>) -> Self {
        self.fail_tiles.insert(tile);
        self
    }

    /// Serve edge tiles clipped in the first dimension as their valid
    /// prefix instead of a padded full tile.
    pub fn with_truncated_edges(mut self) -> Self {
        self.truncate_edges = true;
        self
    }

    /// Number of tile fetches served so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RasterDecoder for MemoryDecoder {
    fn tile_size(&self) -> Result<Vec<u64>> {
        Ok(self.tile_size.clone())
    }

    fn sample_model(&self) -> Result<SampleModel> {
        Ok(self.model.clone())
    }

    fn color_model(&self) -> Result<Option<ColorModel>> {
        Ok(self.colors)
    }

    fn fill_value(&self) -> Result<Option<f64>> {
        Ok(self.fill)
    }

    fn grid_geometry(&self) -> Result<GridGeometry> {
        Ok(GridGeometry::of_extent(self.extent.clone()))
    }

    fn sample_dimensions(&self) -> Result<Vec<SampleDimension>> {
        Ok(self.dimensions.clone())
    }

    async fn fetch_tile(&self, tile: &[i64], bands: Option<&[usize]>) -> Result<Bytes> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if self.fail_tiles.contains(tile) {
            return Err(CoverageError::tile_decode(tile, "injected decode failure"));
        }

        let n = self.extent.dimension();
        let band_list: Vec<usize> = match bands {
            Some(selected) => selected.to_vec(),
            None => (0..self.model.num_bands).collect(),
        };
        let payload_model = SampleModel {
            data_type: self.model.data_type,
            num_bands: band_list.len(),
            layout: self.model.layout,
        };

        let origin: Vec<i64> = (0..n)
            .map(|d| self.extent.low(d) + tile[d] * self.tile_size[d] as i64)
            .collect();
        let pixels: usize = self.tile_size.iter().product::<u64>() as usize;
        let mut data = vec![0u8; payload_model.tile_byte_len(pixels as u64)?];

        let mut coords = origin.clone();
        for pixel in 0..pixels {
            let mut rem = pixel;
            for d in (0..n).rev() {
                coords[d] = origin[d] + (rem % self.tile_size[d] as usize) as i64;
                rem /= self.tile_size[d] as usize;
            }
            let inside = self.extent.contains(&coords);
            for (slot, &band) in band_list.iter().enumerate() {
                let value = if inside {
                    pattern_value(&coords, band)
                } else {
                    self.fill.unwrap_or(0.0)
                };
                let element = payload_model.element_offset(pixel, slot, pixels);
                payload_model.data_type.write_sample(&mut data, element, value);
            }
        }

        if self.truncate_edges && payload_model.layout == BandLayout::PixelInterleaved {
            let valid0 = (self.extent.low(0) + self.extent.size(0) as i64 - origin[0])
                .clamp(0, self.tile_size[0] as i64) as usize;
            if valid0 < self.tile_size[0] as usize {
                let row_pixels: usize =
                    self.tile_size[1..].iter().product::<u64>() as usize;
                let prefix = valid0
                    * row_pixels
                    * payload_model.num_bands
                    * payload_model.data_type.size_bytes();
                data.truncate(prefix);
            }
        }

        Ok(Bytes::from(data))
    }
}
