//! Error types shared across the coverage crates.

use thiserror::Error;

/// Errors that can occur while planning or reading a tiled coverage.
#[derive(Error, Debug)]
pub enum CoverageError {
    /// Failed to fetch descriptor metadata from the decoder.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// Two multi-dimensional arguments disagree on dimension count.
    #[error("dimension mismatch: expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Index arithmetic exceeded the representable integer range.
    #[error("index arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    /// A requested band index is outside the resource's band range.
    #[error("band index {band} out of range for {count} bands")]
    InvalidBand { band: usize, count: usize },

    /// The same band index was requested more than once.
    #[error("duplicate band index {band} in selection")]
    DuplicateBand { band: usize },

    /// A band-subset sample or color model could not be derived.
    #[error("cannot derive sample model: {0}")]
    ModelConstruction(String),

    /// A specific tile failed to decode. Aborts the enclosing read.
    #[error("failed to decode tile {tile:?}: {message}")]
    TileDecode { tile: Vec<i64>, message: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CoverageError {
    /// Create a Metadata error.
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Create an ArithmeticOverflow error.
    pub fn overflow(msg: impl Into<String>) -> Self {
        Self::ArithmeticOverflow(msg.into())
    }

    /// Create a ModelConstruction error.
    pub fn model(msg: impl Into<String>) -> Self {
        Self::ModelConstruction(msg.into())
    }

    /// Create a TileDecode error for a specific tile.
    pub fn tile_decode(tile: &[i64], msg: impl Into<String>) -> Self {
        Self::TileDecode {
            tile: tile.to_vec(),
            message: msg.into(),
        }
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type for coverage operations.
pub type Result<T> = std::result::Result<T, CoverageError>;
