//! Weak-value tile cache shared across coverage reads.
//!
//! Decoded tile buffers are expensive to produce and cheap to share. This
//! crate provides [`TileCache`]: a thread-safe map from an integer tile key
//! to a reference-counted buffer, combining
//!
//! - **weak-value semantics**: an entry stays retrievable for as long as any
//!   reader still holds the buffer's `Arc`, and disappears once nothing
//!   does, and
//! - **a memory-bounded pin set**: the cache itself keeps strong references
//!   to recently used buffers, LRU-evicted once a byte budget is exceeded,
//!   so hot tiles survive between reads without unbounded growth.
//!
//! Lookups and insertions are individually atomic, but the full
//! check-then-decode-then-insert sequence is deliberately not covered by one
//! lock: concurrent misses on the same key may each decode, and the first
//! insertion wins. Callers receive the winning buffer from [`TileCache::insert`]
//! and drop their own copy, which is safe because tile decoding is
//! idempotent.

mod weak_cache;

pub use weak_cache::{CacheStats, MemorySized, TileCache};
