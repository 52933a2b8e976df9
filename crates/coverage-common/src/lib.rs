//! Common types shared across the tiled-coverage crates.

pub mod color;
pub mod error;
pub mod extent;
pub mod geometry;
pub mod sample;

pub use color::{ColorInterpretation, ColorModel};
pub use error::{CoverageError, Result};
pub use extent::GridExtent;
pub use geometry::{GridGeometry, SampleDimension};
pub use sample::{BandLayout, DataType, SampleModel};
