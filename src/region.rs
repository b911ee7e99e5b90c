//! Axis-aligned N-dimensional integer box used as a parallel index space.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Rectangular extent of an N-dimensional index space: a starting index and
/// a size per dimension. A region with any zero-sized dimension is empty;
/// splitting always produces two disjoint regions whose union is the
/// original, so no two tasks ever see overlapping extents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    index: Vec<i64>,
    size: Vec<u64>,
}

impl Region {
    /// Create a region; `index` and `size` must have the same length.
    pub fn new(index: Vec<i64>, size: Vec<u64>) -> Result<Self, ExecError> {
        if index.len() != size.len() {
            return Err(ExecError::DimensionMismatch {
                index_len: index.len(),
                size_len: size.len(),
            });
        }
        Ok(Self { index, size })
    }

    pub fn dimension(&self) -> usize {
        self.index.len()
    }

    pub fn index(&self) -> &[i64] {
        &self.index
    }

    pub fn size(&self) -> &[u64] {
        &self.size
    }

    /// Total element count, the product of all dimension sizes.
    pub fn number_of_elements(&self) -> u64 {
        self.size.iter().product()
    }

    /// True iff some dimension has zero elements.
    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    /// True iff some dimension has more than one element. Distinct from
    /// emptiness: a single-element region is neither empty nor divisible.
    pub fn is_divisible(&self) -> bool {
        self.size.iter().any(|&s| s > 1)
    }

    pub(crate) fn set_index(&mut self, dim: usize, value: i64) {
        self.index[dim] = value;
    }

    pub(crate) fn set_size(&mut self, dim: usize, value: u64) {
        self.size[dim] = value;
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "index={:?}, size={:?}", self.index, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_rejected() {
        let result = Region::new(vec![0, 0], vec![4]);
        assert!(matches!(
            result,
            Err(ExecError::DimensionMismatch {
                index_len: 2,
                size_len: 1
            })
        ));
    }

    #[test]
    fn test_number_of_elements() {
        let region = Region::new(vec![-3, 0, 7], vec![3, 2, 4]).unwrap();
        assert_eq!(region.number_of_elements(), 24);
    }

    #[test]
    fn test_zero_sized_dimension_makes_region_empty() {
        let region = Region::new(vec![0, 0], vec![5, 0]).unwrap();
        assert!(region.is_empty());
        assert_eq!(region.number_of_elements(), 0);
        // Empty is not the same state as indivisible: this one is both.
        assert!(region.is_divisible());
    }

    #[test]
    fn test_single_element_region_not_divisible_not_empty() {
        let region = Region::new(vec![9, -2], vec![1, 1]).unwrap();
        assert!(!region.is_empty());
        assert!(!region.is_divisible());
        assert_eq!(region.number_of_elements(), 1);
    }
}
