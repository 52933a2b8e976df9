//! N-dimensional integer grid extents.

use serde::{Deserialize, Serialize};

use crate::error::{CoverageError, Result};

/// An n-dimensional extent of grid indices.
///
/// Each dimension is described by an inclusive lower index and a size.
/// A size of zero in any dimension makes the extent empty; empty extents
/// are valid values (a request that misses the grid entirely produces one)
/// and carry their anchor coordinates so callers can still report where
/// the empty region sits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridExtent {
    low: Vec<i64>,
    size: Vec<u64>,
}

impl GridExtent {
    /// Create an extent from per-dimension lower indices and sizes.
    ///
    /// Fails if the two vectors disagree on dimension count or if
    /// `low + size - 1` does not fit in `i64` for some dimension.
    pub fn new(low: Vec<i64>, size: Vec<u64>) -> Result<Self> {
        if low.len() != size.len() {
            return Err(CoverageError::DimensionMismatch {
                expected: low.len(),
                actual: size.len(),
            });
        }
        for (d, (&lo, &sz)) in low.iter().zip(&size).enumerate() {
            if sz > 0 {
                let span = i64::try_from(sz - 1).map_err(|_| {
                    CoverageError::overflow(format!("extent size {sz} in dimension {d}"))
                })?;
                lo.checked_add(span).ok_or_else(|| {
                    CoverageError::overflow(format!(
                        "extent upper bound in dimension {d} (low {lo}, size {sz})"
                    ))
                })?;
            }
        }
        Ok(Self { low, size })
    }

    /// Create an extent from inclusive per-dimension bounds.
    ///
    /// A dimension with `high < low` yields size zero (an empty extent).
    pub fn from_bounds(low: &[i64], high: &[i64]) -> Result<Self> {
        if low.len() != high.len() {
            return Err(CoverageError::DimensionMismatch {
                expected: low.len(),
                actual: high.len(),
            });
        }
        let mut size = Vec::with_capacity(low.len());
        for (d, (&lo, &hi)) in low.iter().zip(high).enumerate() {
            if hi < lo {
                size.push(0);
            } else {
                let span = (hi as i128) - (lo as i128) + 1;
                size.push(u64::try_from(span).map_err(|_| {
                    CoverageError::overflow(format!("extent span in dimension {d}"))
                })?);
            }
        }
        Ok(Self {
            low: low.to_vec(),
            size,
        })
    }

    /// Number of dimensions.
    pub fn dimension(&self) -> usize {
        self.low.len()
    }

    /// Inclusive lower index in the given dimension.
    pub fn low(&self, d: usize) -> i64 {
        self.low[d]
    }

    /// Size (number of indices) in the given dimension.
    pub fn size(&self, d: usize) -> u64 {
        self.size[d]
    }

    /// Inclusive upper index in the given dimension, or `None` when the
    /// dimension is empty.
    pub fn high(&self, d: usize) -> Option<i64> {
        if self.size[d] == 0 {
            None
        } else {
            // In-range by the constructor invariant.
            Some(self.low[d] + (self.size[d] - 1) as i64)
        }
    }

    /// All lower indices.
    pub fn lows(&self) -> &[i64] {
        &self.low
    }

    /// All sizes.
    pub fn sizes(&self) -> &[u64] {
        &self.size
    }

    /// True when any dimension has size zero.
    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    /// Check whether a grid coordinate lies inside this extent.
    pub fn contains(&self, coords: &[i64]) -> bool {
        coords.len() == self.dimension()
            && coords.iter().enumerate().all(|(d, &c)| {
                self.size[d] > 0 && c >= self.low[d] && c <= self.low[d] + (self.size[d] - 1) as i64
            })
    }

    /// True when `other` is fully contained in this extent.
    ///
    /// An empty `other` is contained in anything of matching dimension.
    pub fn contains_extent(&self, other: &GridExtent) -> bool {
        if other.dimension() != self.dimension() {
            return false;
        }
        if other.is_empty() {
            return true;
        }
        (0..self.dimension()).all(|d| {
            self.size[d] > 0
                && other.low[d] >= self.low[d]
                && other.high(d).unwrap() <= self.high(d).unwrap()
        })
    }

    /// Intersection of two extents of the same dimension.
    ///
    /// A disjoint pair yields an empty extent anchored at the candidate
    /// lower corner; this is not an error.
    pub fn intersect(&self, other: &GridExtent) -> Result<GridExtent> {
        if other.dimension() != self.dimension() {
            return Err(CoverageError::DimensionMismatch {
                expected: self.dimension(),
                actual: other.dimension(),
            });
        }
        let mut low = Vec::with_capacity(self.dimension());
        let mut size = Vec::with_capacity(self.dimension());
        for d in 0..self.dimension() {
            let lo = self.low[d].max(other.low[d]);
            match (self.high(d), other.high(d)) {
                (Some(a), Some(b)) => {
                    let hi = a.min(b);
                    low.push(lo);
                    size.push(if hi < lo { 0 } else { (hi - lo) as u64 + 1 });
                }
                _ => {
                    low.push(lo);
                    size.push(0);
                }
            }
        }
        Ok(GridExtent { low, size })
    }

    /// Total number of grid cells, with overflow detection across
    /// dimensions.
    pub fn element_count(&self) -> Result<u64> {
        let mut count: u64 = 1;
        for (d, &sz) in self.size.iter().enumerate() {
            count = count.checked_mul(sz).ok_or_else(|| {
                CoverageError::overflow(format!("cell count exceeds u64 at dimension {d}"))
            })?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let e = GridExtent::new(vec![0, 10], vec![1000, 20]).unwrap();
        assert_eq!(e.dimension(), 2);
        assert_eq!(e.low(0), 0);
        assert_eq!(e.size(0), 1000);
        assert_eq!(e.high(0), Some(999));
        assert_eq!(e.high(1), Some(29));
        assert!(!e.is_empty());
    }

    #[test]
    fn test_from_bounds() {
        let e = GridExtent::from_bounds(&[100, 100], &[500, 500]).unwrap();
        assert_eq!(e.size(0), 401);
        assert_eq!(e.high(0), Some(500));

        // Inverted bounds collapse to empty.
        let empty = GridExtent::from_bounds(&[10], &[5]).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.low(0), 10);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = GridExtent::new(vec![0, 0], vec![10]).unwrap_err();
        assert!(matches!(err, CoverageError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_upper_bound_overflow() {
        let err = GridExtent::new(vec![i64::MAX - 1], vec![10]).unwrap_err();
        assert!(matches!(err, CoverageError::ArithmeticOverflow(_)));
    }

    #[test]
    fn test_intersect() {
        let a = GridExtent::new(vec![0, 0], vec![1000, 1000]).unwrap();
        let b = GridExtent::from_bounds(&[100, 900], &[500, 1200]).unwrap();
        let i = a.intersect(&b).unwrap();
        assert_eq!(i.low(0), 100);
        assert_eq!(i.high(0), Some(500));
        assert_eq!(i.low(1), 900);
        assert_eq!(i.high(1), Some(999));
    }

    #[test]
    fn test_intersect_disjoint_is_empty() {
        let a = GridExtent::new(vec![0], vec![100]).unwrap();
        let b = GridExtent::new(vec![200], vec![50]).unwrap();
        let i = a.intersect(&b).unwrap();
        assert!(i.is_empty());
        assert_eq!(i.element_count().unwrap(), 0);
    }

    #[test]
    fn test_contains() {
        let e = GridExtent::new(vec![-10, -10], vec![21, 21]).unwrap();
        assert!(e.contains(&[0, 0]));
        assert!(e.contains(&[-10, 10]));
        assert!(!e.contains(&[11, 0]));
        assert!(!e.contains(&[0]));
    }

    #[test]
    fn test_element_count_overflow() {
        let e = GridExtent::new(vec![0, 0, 0], vec![u64::MAX / 2, 8, 1]).unwrap();
        assert!(matches!(
            e.element_count().unwrap_err(),
            CoverageError::ArithmeticOverflow(_)
        ));
    }

    #[test]
    fn test_contains_extent() {
        let outer = GridExtent::new(vec![0, 0], vec![100, 100]).unwrap();
        let inner = GridExtent::from_bounds(&[10, 10], &[20, 20]).unwrap();
        let empty = GridExtent::new(vec![5, 5], vec![0, 0]).unwrap();
        assert!(outer.contains_extent(&inner));
        assert!(outer.contains_extent(&empty));
        assert!(!inner.contains_extent(&outer));
    }
}
