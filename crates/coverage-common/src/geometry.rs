//! Grid geometry of a requested domain and per-band metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};
use crate::extent::GridExtent;

/// Grid geometry: an extent plus an optional requested resolution.
///
/// The resolution is expressed per dimension as source cells per output
/// cell, so `1.0` is native resolution and `4.0` asks for a grid four
/// times coarser in that dimension. Absent resolution means native.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    extent: GridExtent,
    resolution: Option<Vec<f64>>,
}

impl GridGeometry {
    /// Geometry covering `extent` at native resolution.
    pub fn of_extent(extent: GridExtent) -> Self {
        Self {
            extent,
            resolution: None,
        }
    }

    /// Geometry with an explicit per-dimension requested resolution.
    ///
    /// Every factor must be finite and >= 1 (requests finer than native
    /// are a resampling concern and out of scope here).
    pub fn with_resolution(extent: GridExtent, resolution: Vec<f64>) -> Result<Self> {
        if resolution.len() != extent.dimension() {
            return Err(CoverageError::DimensionMismatch {
                expected: extent.dimension(),
                actual: resolution.len(),
            });
        }
        for (d, &r) in resolution.iter().enumerate() {
            if !r.is_finite() || r < 1.0 {
                return Err(CoverageError::metadata(format!(
                    "requested resolution {r} in dimension {d} must be finite and >= 1"
                )));
            }
        }
        Ok(Self {
            extent,
            resolution: Some(resolution),
        })
    }

    /// The extent of this geometry.
    pub fn extent(&self) -> &GridExtent {
        &self.extent
    }

    /// Requested resolution in the given dimension (1.0 when native).
    pub fn resolution(&self, d: usize) -> f64 {
        self.resolution.as_ref().map_or(1.0, |r| r[d])
    }

    /// True when any dimension requests a non-native resolution.
    pub fn has_resolution(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Metadata for one band of a raster resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleDimension {
    /// Band name (e.g. "red", "TMP").
    pub name: String,
    /// Physical units, empty when dimensionless.
    pub units: String,
    /// Per-band fill/missing value, if any.
    pub fill_value: Option<f64>,
}

impl SampleDimension {
    /// Create a sample dimension.
    pub fn new(name: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
            fill_value: None,
        }
    }

    /// Attach a fill value.
    pub fn with_fill_value(mut self, fill: f64) -> Self {
        self.fill_value = Some(fill);
        self
    }
}
