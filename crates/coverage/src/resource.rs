//! The decoder interface and the tiled grid resource built on top of it.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use coverage_common::{
    ColorModel, GridGeometry, Result, SampleDimension, SampleModel,
};
use tile_cache::{CacheStats, TileCache};

use crate::buffer::TileBuffer;
use crate::config::CoverageConfig;
use crate::coverage::{Raster, TiledGridCoverage};
use crate::subset::Subset;

/// Interface implemented by format-specific raster decoders (GeoTIFF,
/// NetCDF, raw rasters, ...).
///
/// The coverage core consumes this interface read-only: descriptor methods
/// are expected to be cheap and stable for the lifetime of the resource,
/// while [`fetch_tile`](Self::fetch_tile) performs the actual (possibly
/// remote) I/O.
#[async_trait]
pub trait RasterDecoder: Send + Sync {
    /// Tile size per dimension. Components are >= 1.
    fn tile_size(&self) -> Result<Vec<u64>>;

    /// Per-pixel storage layout of one full tile at full resolution, all
    /// bands included.
    fn sample_model(&self) -> Result<SampleModel>;

    /// Optional rendering hint.
    fn color_model(&self) -> Result<Option<ColorModel>>;

    /// Value used to pad incomplete edge tiles, if the format defines one.
    fn fill_value(&self) -> Result<Option<f64>>;

    /// Grid geometry of the resource at full resolution.
    fn grid_geometry(&self) -> Result<GridGeometry>;

    /// Per-band metadata.
    fn sample_dimensions(&self) -> Result<Vec<SampleDimension>>;

    /// Fetch the raw samples of one tile as little-endian bytes laid out
    /// per the resource's sample model.
    ///
    /// `tile` holds non-negative tile indices in the resource's tiling
    /// grid. When `bands` is given the decoder returns only those bands,
    /// in the given (strictly increasing) order; formats that cannot skip
    /// bands cheaply should be read with `load_all_bands` instead, in
    /// which case `bands` is always `None`. Edge tiles may be truncated
    /// to their valid prefix; the core pads the remainder.
    async fn fetch_tile(&self, tile: &[i64], bands: Option<&[usize]>) -> Result<Bytes>;
}

/// A raster resource exposed as an addressable, subsettable coverage.
///
/// The resource owns the shared tile cache reused by every subset that
/// reads whole, unsubsampled, full-band tiles; other subsets get private
/// caches (see [`Subset`]).
pub struct TiledGridResource {
    decoder: Arc<dyn RasterDecoder>,
    shared_cache: Arc<TileCache<TileBuffer>>,
    config: CoverageConfig,
}

impl TiledGridResource {
    /// Create a resource over a decoder.
    pub fn new(decoder: Arc<dyn RasterDecoder>, config: CoverageConfig) -> Self {
        let shared_cache = Arc::new(TileCache::new(config.shared_cache_bytes()));
        Self {
            decoder,
            shared_cache,
            config,
        }
    }

    /// The underlying decoder.
    pub fn decoder(&self) -> &Arc<dyn RasterDecoder> {
        &self.decoder
    }

    /// Plan a coverage read over an optional domain and band selection.
    ///
    /// `domain = None` means the full resource extent at native
    /// resolution; `bands = None` (or empty) means all bands in order.
    /// `load_all_bands` tells the planner the decoder must read every band
    /// of a tile even when only a subset is requested.
    pub fn subset(
        &self,
        domain: Option<&GridGeometry>,
        bands: Option<&[usize]>,
        load_all_bands: bool,
    ) -> Result<Subset> {
        Subset::compute(
            self.decoder.as_ref(),
            domain,
            bands,
            load_all_bands,
            &self.shared_cache,
            &self.config,
        )
    }

    /// Build the coverage that reads pixel data for a planned subset.
    pub fn coverage(&self, subset: Subset) -> TiledGridCoverage {
        TiledGridCoverage::new(self.decoder.clone(), Arc::new(subset))
    }

    /// Convenience: plan and read in one call.
    pub async fn read(
        &self,
        domain: Option<&GridGeometry>,
        bands: Option<&[usize]>,
        load_all_bands: bool,
    ) -> Result<Raster> {
        let subset = self.subset(domain, bands, load_all_bands)?;
        self.coverage(subset).read().await
    }

    /// Per-band metadata of the resource.
    pub fn sample_dimensions(&self) -> Result<Vec<SampleDimension>> {
        self.decoder.sample_dimensions()
    }

    /// Statistics of the resource-wide shared cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.shared_cache.stats()
    }

    /// The resource-wide shared cache handle.
    pub(crate) fn shared_cache(&self) -> &Arc<TileCache<TileBuffer>> {
        &self.shared_cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::MemoryDecoder;

    #[test]
    fn test_resource_starts_with_empty_cache() {
        let decoder = Arc::new(MemoryDecoder::single_band_2d(32, 32, 8));
        let resource = TiledGridResource::new(decoder, CoverageConfig::default());
        let stats = resource.cache_stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_plan_and_read_convenience() {
        let decoder = Arc::new(MemoryDecoder::single_band_2d(32, 32, 8));
        let resource = TiledGridResource::new(decoder, CoverageConfig::default());
        let raster = tokio_test::block_on(resource.read(None, None, false)).unwrap();
        assert_eq!(raster.len(), 32 * 32);
    }

    #[test]
    fn test_full_subset_uses_shared_cache() {
        let decoder = Arc::new(MemoryDecoder::single_band_2d(32, 32, 8));
        let resource = TiledGridResource::new(decoder, CoverageConfig::default());
        let subset = resource.subset(None, None, false).unwrap();
        assert!(subset.is_cache_shared());
        assert!(Arc::ptr_eq(subset.cache(), resource.shared_cache()));
    }
}
