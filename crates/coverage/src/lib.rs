//! Tiled grid coverage access.
//!
//! A [`TiledGridResource`] wraps a format-specific [`RasterDecoder`] and
//! plans reads as immutable [`Subset`]s: the requested domain is clipped to
//! the source, aligned to whole tiles, reduced by integer subsampling and
//! restricted to a band selection, with every arithmetic-range error
//! surfaced before the first tile is touched. A [`TiledGridCoverage`] then
//! walks the planned tiles, decoding each at most once through a weak,
//! memory-bounded cache, and assembles one [`Raster`].
//!
//! ```text
//! RasterDecoder ──> TiledGridResource ──> Subset ──> TiledGridCoverage
//!      │                   │                              │
//!      │             shared TileCache <── private cache ──┤
//!      └──────────────── fetch_tile <─────────────────────┘
//! ```
//!
//! Subsets that read whole, unsubsampled, full-band tiles share the
//! resource-wide cache; anything else gets a private one so differently
//! shaped buffers never collide under one key.

mod buffer;
mod config;
mod coverage;
mod resource;
mod subset;
pub mod testdata;

pub use buffer::TileBuffer;
pub use config::CoverageConfig;
pub use coverage::{Raster, TiledGridCoverage};
pub use resource::{RasterDecoder, TiledGridResource};
pub use subset::{Subset, SubsetCache};
