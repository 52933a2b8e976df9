//! End-to-end coverage reads through the tile cache.

use std::sync::Arc;

use coverage::testdata::{pattern_value, MemoryDecoder};
use coverage::{CoverageConfig, RasterDecoder, TiledGridResource};
use coverage_common::{CoverageError, GridExtent, GridGeometry};

fn extent(low: &[i64], size: &[u64]) -> GridExtent {
    GridExtent::new(low.to_vec(), size.to_vec()).unwrap()
}

#[tokio::test]
async fn test_read_full_grid() -> anyhow::Result<()> {
    let decoder = Arc::new(MemoryDecoder::single_band_2d(32, 32, 8));
    let resource = TiledGridResource::new(decoder, CoverageConfig::default());

    let raster = resource.read(None, None, false).await?;
    assert_eq!(raster.domain(), &extent(&[0, 0], &[32, 32]));
    for &coords in &[[0, 0], [7, 8], [15, 15], [31, 31]] {
        assert_eq!(raster.sample(&coords, 0), Some(pattern_value(&coords, 0)));
    }
    Ok(())
}

#[tokio::test]
async fn test_read_window() -> anyhow::Result<()> {
    let decoder = Arc::new(MemoryDecoder::single_band_2d(64, 64, 16));
    let resource = TiledGridResource::new(decoder, CoverageConfig::default());

    let domain = GridGeometry::of_extent(extent(&[10, 20], &[11, 11]));
    let raster = resource.read(Some(&domain), None, false).await?;

    assert_eq!(raster.domain(), &extent(&[10, 20], &[11, 11]));
    for row in 10..21 {
        for col in 20..31 {
            assert_eq!(
                raster.sample(&[row, col], 0),
                Some(pattern_value(&[row, col], 0)),
                "({row}, {col})"
            );
        }
    }
    // Outside the window nothing is addressable.
    assert_eq!(raster.sample(&[9, 20], 0), None);
    Ok(())
}

#[tokio::test]
async fn test_subsampled_read_maps_back_to_source() {
    let decoder = Arc::new(MemoryDecoder::single_band_2d(100, 100, 32));
    let resource = TiledGridResource::new(decoder, CoverageConfig::default());

    let domain = GridGeometry::with_resolution(
        extent(&[10, 10], &[80, 80]),
        vec![4.0, 4.0],
    )
    .unwrap();
    let subset = resource.subset(Some(&domain), None, false).unwrap();
    let raster = resource.coverage(subset).read().await.unwrap();

    let dom = raster.domain().clone();
    for row in dom.low(0)..=dom.high(0).unwrap() {
        for col in dom.low(1)..=dom.high(1).unwrap() {
            let source = [row * 4 + 2, col * 4 + 2];
            assert_eq!(
                raster.sample(&[row, col], 0),
                Some(pattern_value(&source, 0)),
                "({row}, {col})"
            );
        }
    }
}

#[tokio::test]
async fn test_band_selection_preserves_requested_order() {
    let decoder = Arc::new(MemoryDecoder::multi_band_2d(16, 16, 8, 3));
    let resource = TiledGridResource::new(decoder, CoverageConfig::default());

    let raster = resource.read(None, Some(&[2, 0]), false).await.unwrap();
    assert_eq!(raster.num_bands(), 2);
    assert_eq!(raster.sample(&[3, 5], 0), Some(pattern_value(&[3, 5], 2)));
    assert_eq!(raster.sample(&[3, 5], 1), Some(pattern_value(&[3, 5], 0)));
}

#[tokio::test]
async fn test_load_all_bands_reads_the_same_values() {
    let decoder = Arc::new(MemoryDecoder::multi_band_2d(16, 16, 8, 3));
    let resource = TiledGridResource::new(decoder, CoverageConfig::default());

    let selective = resource.read(None, Some(&[2, 0]), false).await.unwrap();
    let full_tiles = resource.read(None, Some(&[2, 0]), true).await.unwrap();
    assert_eq!(selective, full_tiles);
}

#[tokio::test]
async fn test_truncated_edge_tiles_read_correctly() {
    // 10x10 grid with 8x8 tiles: the bottom and right tiles are partial
    // and served as their valid prefix only.
    let decoder = Arc::new(
        MemoryDecoder::single_band_2d(10, 10, 8)
            .with_truncated_edges()
            .with_fill(-999.0),
    );
    let resource = TiledGridResource::new(decoder, CoverageConfig::default());

    let raster = resource.read(None, None, false).await.unwrap();
    for row in 0..10 {
        for col in 0..10 {
            assert_eq!(
                raster.sample(&[row, col], 0),
                Some(pattern_value(&[row, col], 0)),
                "({row}, {col})"
            );
        }
    }
}

#[tokio::test]
async fn test_untiled_dimension_read() {
    // Tiles taller than the whole grid: dimension 0 collapses to an
    // unaligned read window, served from whole decoded tiles.
    let source = extent(&[0, 0], &[20, 20]);
    let decoder = Arc::new(MemoryDecoder::with_extent(source, vec![64, 8], 1));
    let resource = TiledGridResource::new(decoder, CoverageConfig::default());

    let domain = GridGeometry::of_extent(extent(&[5, 3], &[10, 12]));
    let subset = resource.subset(Some(&domain), None, false).unwrap();
    assert!(!subset.is_cache_shared());
    assert_eq!(subset.read_extent().low(0), 5);
    assert_eq!(subset.read_extent().size(0), 10);

    let raster = resource.coverage(subset).read().await.unwrap();
    assert_eq!(raster.domain(), &extent(&[5, 3], &[10, 12]));
    for row in 5..15 {
        for col in 3..15 {
            assert_eq!(
                raster.sample(&[row, col], 0),
                Some(pattern_value(&[row, col], 0)),
                "({row}, {col})"
            );
        }
    }
}

#[tokio::test]
async fn test_decode_failure_aborts_the_read() {
    let decoder = Arc::new(MemoryDecoder::single_band_2d(32, 32, 8).with_fail_tile(vec![1, 2]));
    let resource = TiledGridResource::new(decoder, CoverageConfig::default());

    let err = resource.read(None, None, false).await.unwrap_err();
    match err {
        CoverageError::TileDecode { tile, .. } => assert_eq!(tile, vec![1, 2]),
        other => panic!("expected TileDecode, got {other}"),
    }
}

#[tokio::test]
async fn test_shared_cache_deduplicates_fetches() {
    let decoder = Arc::new(MemoryDecoder::single_band_2d(32, 32, 8));
    let resource = TiledGridResource::new(decoder.clone(), CoverageConfig::default());

    let first = resource.read(None, None, false).await.unwrap();
    assert_eq!(decoder.fetch_count(), 16);

    // Every tile of the second read is a cache hit.
    let second = resource.read(None, None, false).await.unwrap();
    assert_eq!(decoder.fetch_count(), 16);
    assert_eq!(first, second);
    assert!(resource.cache_stats().hits >= 16);
}

#[tokio::test]
async fn test_repeated_fetches_are_byte_identical() {
    let decoder = MemoryDecoder::single_band_2d(16, 16, 8);
    let a = decoder.fetch_tile(&[1, 1], None).await.unwrap();
    let b = decoder.fetch_tile(&[1, 1], None).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_concurrent_reads_agree() {
    let decoder = Arc::new(MemoryDecoder::single_band_2d(64, 64, 16));
    let resource = Arc::new(TiledGridResource::new(decoder, CoverageConfig::default()));

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let resource = resource.clone();
        tasks.push(tokio::spawn(async move {
            resource.read(None, None, false).await
        }));
    }

    let baseline = resource.read(None, None, false).await.unwrap();
    for task in tasks {
        let raster = task.await.unwrap().unwrap();
        assert_eq!(raster, baseline);
    }
}

#[tokio::test]
async fn test_empty_domain_reads_empty_raster() {
    let decoder = Arc::new(MemoryDecoder::single_band_2d(32, 32, 8));
    let resource = TiledGridResource::new(decoder.clone(), CoverageConfig::default());

    let domain = GridGeometry::of_extent(extent(&[100, 100], &[5, 5]));
    let raster = resource.read(Some(&domain), None, false).await.unwrap();
    assert!(raster.is_empty());
    assert_eq!(decoder.fetch_count(), 0);
}
