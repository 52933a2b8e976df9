//! Subset planning: geometry, band selection and cache choice for one
//! coverage read.

use std::sync::Arc;

use tracing::debug;

use coverage_common::{
    ColorModel, CoverageError, GridExtent, GridGeometry, Result, SampleModel,
};
use tile_cache::TileCache;

use crate::buffer::TileBuffer;
use crate::config::CoverageConfig;
use crate::resource::RasterDecoder;

/// Row-major linear addressing of the full tiling grid of a resource.
///
/// Tile keys are computed against the full grid, never against a read
/// extent, so that a shared cache stays consistent across subsets.
#[derive(Debug, Clone)]
pub(crate) struct TileMatrix {
    origin: Vec<i64>,
    tile_size: Vec<u64>,
    tile_count: Vec<u64>,
    stride: Vec<u64>,
}

impl TileMatrix {
    /// Build the tiling of `extent` by `tile_size`, failing fast when the
    /// tile key space does not fit in `u64`.
    pub(crate) fn new(extent: &GridExtent, tile_size: &[u64]) -> Result<Self> {
        let n = extent.dimension();
        let mut tile_count = Vec::with_capacity(n);
        for d in 0..n {
            tile_count.push(extent.size(d).div_ceil(tile_size[d]));
        }
        let mut stride = vec![1u64; n];
        for d in (0..n.saturating_sub(1)).rev() {
            stride[d] = stride[d + 1]
                .checked_mul(tile_count[d + 1])
                .ok_or_else(|| CoverageError::overflow("tile grid stride exceeds u64"))?;
        }
        if n > 0 {
            stride[0]
                .checked_mul(tile_count[0])
                .ok_or_else(|| CoverageError::overflow("tile key space exceeds u64"))?;
        }
        Ok(Self {
            origin: extent.lows().to_vec(),
            tile_size: tile_size.to_vec(),
            tile_count,
            stride,
        })
    }

    pub(crate) fn dimension(&self) -> usize {
        self.tile_size.len()
    }

    pub(crate) fn tile_size(&self) -> &[u64] {
        &self.tile_size
    }

    pub(crate) fn tile_count(&self, d: usize) -> u64 {
        self.tile_count[d]
    }

    /// Linear cache key of a tile from its grid indices.
    pub(crate) fn tile_key(&self, tile: &[i64]) -> u64 {
        debug_assert_eq!(tile.len(), self.dimension());
        tile.iter()
            .zip(&self.stride)
            .map(|(&t, &s)| t as u64 * s)
            .sum()
    }

    /// Tile indices covering the given source coordinate.
    pub(crate) fn tile_of(&self, coords: &[i64]) -> Vec<i64> {
        coords
            .iter()
            .enumerate()
            .map(|(d, &c)| (c - self.origin[d]).div_euclid(self.tile_size[d] as i64))
            .collect()
    }

    /// Logical source-grid origin of a tile.
    pub(crate) fn tile_origin(&self, tile: &[i64]) -> Vec<i64> {
        tile.iter()
            .enumerate()
            .map(|(d, &t)| self.origin[d] + t * self.tile_size[d] as i64)
            .collect()
    }
}

/// Which tile cache a subset reads through.
///
/// The resource-wide shared cache is only safe when a subset reads whole,
/// unsubsampled, full-band tiles; anything else gets a private cache so
/// that heterogeneously shaped buffers never collide under one key.
pub enum SubsetCache {
    Shared(Arc<TileCache<TileBuffer>>),
    Private(Arc<TileCache<TileBuffer>>),
}

impl SubsetCache {
    /// Handle to the cache, shared or private.
    pub fn handle(&self) -> &Arc<TileCache<TileBuffer>> {
        match self {
            Self::Shared(cache) | Self::Private(cache) => cache,
        }
    }

    /// True for the resource-wide shared cache.
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }
}

/// The plan for one coverage read: clipped tile-aligned geometry,
/// subsampling, band selection, derived models and cache choice.
///
/// Immutable after construction and safely shared across threads.
pub struct Subset {
    source_extent: GridExtent,
    read_extent: GridExtent,
    domain: GridExtent,
    subsampling: Vec<u64>,
    subsampling_offsets: Vec<i64>,
    selected_bands: Option<Vec<usize>>,
    band_order: Option<Vec<usize>>,
    model: SampleModel,
    colors: Option<ColorModel>,
    decode_model: SampleModel,
    fill_value: Option<f64>,
    load_all_bands: bool,
    tiling: TileMatrix,
    cache: SubsetCache,
}

impl Subset {
    /// Plan a subset. See `TiledGridResource::subset` for the argument
    /// contract; all descriptor, band and arithmetic-range errors surface
    /// here rather than during tile iteration.
    pub(crate) fn compute(
        decoder: &dyn RasterDecoder,
        domain: Option<&GridGeometry>,
        bands: Option<&[usize]>,
        load_all_bands: bool,
        shared_cache: &Arc<TileCache<TileBuffer>>,
        config: &CoverageConfig,
    ) -> Result<Subset> {
        let tile_size = decoder.tile_size()?;
        if tile_size.is_empty() {
            return Err(CoverageError::metadata("tile size has no dimensions"));
        }
        if tile_size.iter().any(|&t| t == 0) {
            return Err(CoverageError::metadata("tile size components must be >= 1"));
        }
        let source_extent = decoder.grid_geometry()?.extent().clone();
        let n = source_extent.dimension();
        if n != tile_size.len() {
            return Err(CoverageError::DimensionMismatch {
                expected: n,
                actual: tile_size.len(),
            });
        }
        if source_extent.is_empty() {
            return Err(CoverageError::metadata("resource extent is empty"));
        }

        let full_model = decoder.sample_model()?;
        if !full_model.is_addressable() {
            return Err(CoverageError::model(
                "packed sample layouts must be expanded by the decoder before coverage access",
            ));
        }
        let full_colors = decoder.color_model()?;

        let mut sharable = true;
        let geometry = match domain {
            None => SubsetGeometry::full(&source_extent),
            Some(requested) => {
                SubsetGeometry::clipped(requested, &source_extent, &tile_size, &mut sharable)?
            }
        };

        let (selected_bands, band_order) = resolve_bands(bands, full_model.num_bands)?;
        if selected_bands.is_some() {
            sharable = false;
        }

        let model = match &selected_bands {
            Some(kept) => full_model.band_subset(kept)?,
            None => full_model.clone(),
        };
        let colors = match (&full_colors, &selected_bands) {
            (Some(c), Some(kept)) => c.for_band_subset(kept),
            (Some(c), None) => Some(*c),
            (None, _) => None,
        };
        let decode_model = if load_all_bands {
            full_model
        } else {
            model.clone()
        };

        let fill_value = decoder.fill_value()?.filter(|&v| v != 0.0);

        let tiling = TileMatrix::new(&source_extent, &tile_size)?;

        // Fail fast on output and tile buffer sizes the platform cannot
        // represent, instead of discovering it mid-iteration.
        let out_cells = geometry.domain.element_count()?;
        out_cells
            .checked_mul(model.num_bands as u64)
            .and_then(|total| usize::try_from(total).ok())
            .ok_or_else(|| CoverageError::overflow("output raster sample count exceeds usize"))?;
        let tile_pixels = tile_size.iter().try_fold(1u64, |acc, &t| {
            acc.checked_mul(t)
                .ok_or_else(|| CoverageError::overflow("tile pixel count exceeds u64"))
        })?;
        decode_model.tile_byte_len(tile_pixels)?;

        let cache = if sharable {
            SubsetCache::Shared(shared_cache.clone())
        } else {
            SubsetCache::Private(Arc::new(TileCache::new(config.private_cache_bytes())))
        };

        debug!(
            read_extent = ?geometry.read_extent.sizes(),
            subsampling = ?geometry.subsampling,
            bands = ?selected_bands,
            shared_cache = cache.is_shared(),
            "planned coverage subset"
        );

        Ok(Subset {
            source_extent,
            read_extent: geometry.read_extent,
            domain: geometry.domain,
            subsampling: geometry.subsampling,
            subsampling_offsets: geometry.offsets,
            selected_bands,
            band_order,
            model,
            colors,
            decode_model,
            fill_value,
            load_all_bands,
            tiling,
            cache,
        })
    }

    /// Copy of the resource's full extent at planning time.
    pub fn source_extent(&self) -> &GridExtent {
        &self.source_extent
    }

    /// The tile-aligned source region this subset reads.
    pub fn read_extent(&self) -> &GridExtent {
        &self.read_extent
    }

    /// The output grid extent, in output (subsampled) coordinates.
    pub fn domain(&self) -> &GridExtent {
        &self.domain
    }

    /// Subsampling factor in the given dimension (>= 1).
    pub fn subsampling(&self, d: usize) -> u64 {
        self.subsampling[d]
    }

    /// Remainder mapping output to source coordinates:
    /// `source = output * subsampling(d) + subsampling_offset(d)`.
    pub fn subsampling_offset(&self, d: usize) -> i64 {
        self.subsampling_offsets[d]
    }

    /// True when the given dimension is read at reduced resolution.
    pub fn has_subsampling(&self, d: usize) -> bool {
        self.subsampling[d] != 1
    }

    /// Selected source bands, strictly increasing; `None` means all bands
    /// in order.
    pub fn selected_bands(&self) -> Option<&[usize]> {
        self.selected_bands.as_deref()
    }

    /// Sample model restricted to the selected bands, at tile resolution.
    pub fn model(&self) -> &SampleModel {
        &self.model
    }

    /// Color model restricted to the selected bands, if still meaningful.
    pub fn colors(&self) -> Option<&ColorModel> {
        self.colors.as_ref()
    }

    /// Fill value used to pad incomplete tiles.
    pub fn fill_value(&self) -> Option<f64> {
        self.fill_value
    }

    /// Number of bands in the output raster.
    pub fn output_bands(&self) -> usize {
        self.model.num_bands
    }

    /// The cache this subset reads through.
    pub fn cache(&self) -> &Arc<TileCache<TileBuffer>> {
        self.cache.handle()
    }

    /// True when this subset shares the resource-wide cache.
    pub fn is_cache_shared(&self) -> bool {
        self.cache.is_shared()
    }

    pub(crate) fn tiling(&self) -> &TileMatrix {
        &self.tiling
    }

    pub(crate) fn decode_model(&self) -> &SampleModel {
        &self.decode_model
    }

    pub(crate) fn load_all_bands(&self) -> bool {
        self.load_all_bands
    }

    /// Band index within a decoded tile buffer for an output band
    /// position.
    pub(crate) fn decode_band_for_output(&self, output_band: usize) -> usize {
        let selected_index = self
            .band_order
            .as_ref()
            .map_or(output_band, |order| order[output_band]);
        match (&self.selected_bands, self.load_all_bands) {
            (Some(kept), true) => kept[selected_index],
            _ => selected_index,
        }
    }
}

impl std::fmt::Debug for Subset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subset")
            .field("source_extent", &self.source_extent)
            .field("read_extent", &self.read_extent)
            .field("domain", &self.domain)
            .field("subsampling", &self.subsampling)
            .field("subsampling_offsets", &self.subsampling_offsets)
            .field("selected_bands", &self.selected_bands)
            .field("band_order", &self.band_order)
            .field("model", &self.model)
            .field("fill_value", &self.fill_value)
            .field("load_all_bands", &self.load_all_bands)
            .field("shared_cache", &self.cache.is_shared())
            .finish_non_exhaustive()
    }
}

/// Geometry part of a planned subset.
struct SubsetGeometry {
    read_extent: GridExtent,
    domain: GridExtent,
    subsampling: Vec<u64>,
    offsets: Vec<i64>,
}

impl SubsetGeometry {
    /// Null domain: read everything at native resolution.
    fn full(source: &GridExtent) -> Self {
        let n = source.dimension();
        Self {
            read_extent: source.clone(),
            domain: source.clone(),
            subsampling: vec![1; n],
            offsets: vec![0; n],
        }
    }

    /// Clip the requested geometry against the source extent and align it
    /// to whole tiles with enclosing rounding.
    fn clipped(
        requested: &GridGeometry,
        source: &GridExtent,
        tile_size: &[u64],
        sharable: &mut bool,
    ) -> Result<Self> {
        let n = source.dimension();
        if requested.extent().dimension() != n {
            return Err(CoverageError::DimensionMismatch {
                expected: n,
                actual: requested.extent().dimension(),
            });
        }
        let request = requested.extent().intersect(source)?;

        let mut read_low = Vec::with_capacity(n);
        let mut read_size = Vec::with_capacity(n);
        let mut dom_low = Vec::with_capacity(n);
        let mut dom_size = Vec::with_capacity(n);
        let mut subsampling = Vec::with_capacity(n);
        let mut offsets = Vec::with_capacity(n);

        for d in 0..n {
            // Largest integer factor not exceeding the requested
            // resolution, chosen per dimension independently.
            let factor = (requested.resolution(d).floor() as u64).max(1);
            if factor != 1 {
                *sharable = false;
            }
            subsampling.push(factor);

            // A dimension whose tiles are as large as the whole extent is
            // effectively untiled: aligning to it would read far more than
            // requested, so the chunk collapses to 1 and the tile cache
            // cannot be shared.
            let chunk = if tile_size[d] >= source.size(d) {
                *sharable = false;
                1i64
            } else {
                tile_size[d] as i64
            };

            let factor_i = factor as i64;
            let offset = request.low(d).rem_euclid(factor_i);
            offsets.push(offset);

            let Some(request_high) = request.high(d) else {
                // Empty intersection in this dimension: a zero-size read,
                // anchored at the candidate corner. Not an error.
                read_low.push(request.low(d));
                read_size.push(0);
                dom_low.push(request.low(d).div_euclid(factor_i));
                dom_size.push(0);
                continue;
            };

            // Enclosing alignment relative to the tiling grid origin.
            let rel_low = request.low(d) - source.low(d);
            let rel_high = request_high - source.low(d);
            let aligned_low = rel_low - rel_low.rem_euclid(chunk);
            let aligned_high = rel_high
                .checked_add(chunk - 1 - rel_high.rem_euclid(chunk))
                .ok_or_else(|| CoverageError::overflow("tile-aligned upper bound"))?
                .min((source.size(d) - 1) as i64);

            read_low.push(source.low(d) + aligned_low);
            read_size.push((aligned_high - aligned_low + 1) as u64);

            let out_low = request.low(d).div_euclid(factor_i);
            let out_high = (request_high - offset).div_euclid(factor_i);
            dom_low.push(out_low);
            dom_size.push((out_high - out_low + 1) as u64);
        }

        Ok(Self {
            read_extent: GridExtent::new(read_low, read_size)?,
            domain: GridExtent::new(dom_low, dom_size)?,
            subsampling,
            offsets,
        })
    }
}

/// Resolve a requested band list into a strictly increasing source
/// selection plus the output-order permutation.
///
/// Returns `(None, None)` for the all-bands identity fast path; the
/// permutation is `None` when the requested order is already increasing.
fn resolve_bands(
    requested: Option<&[usize]>,
    band_count: usize,
) -> Result<(Option<Vec<usize>>, Option<Vec<usize>>)> {
    let Some(requested) = requested.filter(|bands| !bands.is_empty()) else {
        return Ok((None, None));
    };

    let mut seen = vec![false; band_count];
    for &band in requested {
        if band >= band_count {
            return Err(CoverageError::InvalidBand {
                band,
                count: band_count,
            });
        }
        if seen[band] {
            return Err(CoverageError::DuplicateBand { band });
        }
        seen[band] = true;
    }

    if requested.len() == band_count && requested.iter().enumerate().all(|(i, &b)| i == b) {
        return Ok((None, None));
    }

    let mut selected = requested.to_vec();
    selected.sort_unstable();

    let mut position = vec![0usize; band_count];
    for (index, &band) in selected.iter().enumerate() {
        position[band] = index;
    }
    let order: Vec<usize> = requested.iter().map(|&band| position[band]).collect();
    let order = if order.iter().enumerate().all(|(i, &o)| i == o) {
        None
    } else {
        Some(order)
    };

    Ok((Some(selected), order))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_matrix_counts_and_keys() {
        let extent = GridExtent::new(vec![0, 0], vec![1000, 1000]).unwrap();
        let matrix = TileMatrix::new(&extent, &[256, 256]).unwrap();
        assert_eq!(matrix.tile_count(0), 4);
        assert_eq!(matrix.tile_count(1), 4);

        // Row-major over the full grid: key = t0 * 4 + t1.
        assert_eq!(matrix.tile_key(&[0, 0]), 0);
        assert_eq!(matrix.tile_key(&[0, 3]), 3);
        assert_eq!(matrix.tile_key(&[1, 0]), 4);
        assert_eq!(matrix.tile_key(&[3, 3]), 15);
    }

    #[test]
    fn test_tile_matrix_origin_and_lookup() {
        let extent = GridExtent::new(vec![-100, 0], vec![500, 500]).unwrap();
        let matrix = TileMatrix::new(&extent, &[128, 128]).unwrap();
        assert_eq!(matrix.tile_of(&[-100, 0]), vec![0, 0]);
        assert_eq!(matrix.tile_of(&[27, 129]), vec![0, 1]);
        assert_eq!(matrix.tile_origin(&[1, 2]), vec![28, 256]);
    }

    #[test]
    fn test_tile_matrix_key_space_overflow() {
        let extent =
            GridExtent::new(vec![0, 0, 0], vec![u64::MAX / 4, u64::MAX / 4, 16]).unwrap();
        let err = TileMatrix::new(&extent, &[1, 1, 1]).unwrap_err();
        assert!(matches!(err, CoverageError::ArithmeticOverflow(_)));
    }

    #[test]
    fn test_resolve_bands_identity() {
        assert_eq!(resolve_bands(None, 4).unwrap(), (None, None));
        assert_eq!(resolve_bands(Some(&[]), 4).unwrap(), (None, None));
        assert_eq!(resolve_bands(Some(&[0, 1, 2, 3]), 4).unwrap(), (None, None));
    }

    #[test]
    fn test_resolve_bands_subset_in_order() {
        let (selected, order) = resolve_bands(Some(&[1, 3]), 4).unwrap();
        assert_eq!(selected, Some(vec![1, 3]));
        assert_eq!(order, None);
    }

    #[test]
    fn test_resolve_bands_reordered() {
        let (selected, order) = resolve_bands(Some(&[3, 0, 1]), 4).unwrap();
        assert_eq!(selected, Some(vec![0, 1, 3]));
        assert_eq!(order, Some(vec![2, 0, 1]));
    }

    #[test]
    fn test_resolve_bands_errors() {
        assert!(matches!(
            resolve_bands(Some(&[4]), 4).unwrap_err(),
            CoverageError::InvalidBand { band: 4, count: 4 }
        ));
        assert!(matches!(
            resolve_bands(Some(&[1, 1]), 4).unwrap_err(),
            CoverageError::DuplicateBand { band: 1 }
        ));
    }
}
