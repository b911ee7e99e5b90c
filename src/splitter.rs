//! Recursive bisection over a region, in the shape the split-based
//! dispatch driver consumes.

use crate::error::ExecError;
use crate::region::Region;

/// Wraps a [`Region`] with a binary split operation. Splitting shrinks the
/// invoking splitter to the lower part of one axis and returns the sibling
/// covering the rest; the two halves partition the original extent exactly.
#[derive(Clone, Debug)]
pub struct RegionSplitter {
    region: Region,
}

impl RegionSplitter {
    pub fn new(region: Region) -> Self {
        Self { region }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn into_region(self) -> Region {
        self.region
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    pub fn is_divisible(&self) -> bool {
        self.region.is_divisible()
    }

    /// Split the extent in proportion `left:right` along one axis.
    ///
    /// Dimensions are scanned from highest to lowest and the first one with
    /// more than one element is cut, so the slowest-varying axis is preferred.
    /// The invoking splitter keeps the lower `size * right / (left + right)`
    /// elements, clamped so neither half ends up empty; the returned sibling
    /// starts where the kept half ends.
    ///
    /// Fails with [`ExecError::UnsplittableRegion`] when every dimension has
    /// at most one element. Callers are expected to check `is_divisible()`
    /// first; the driver never reaches this path.
    pub fn split(&mut self, left: u32, right: u32) -> Result<RegionSplitter, ExecError> {
        let denom = (u64::from(left) + u64::from(right)).max(1);
        for dim in (0..self.region.dimension()).rev() {
            let extent = self.region.size()[dim];
            if extent > 1 {
                // 128-bit intermediate: extent * right can exceed u64.
                let cut = (u128::from(extent) * u128::from(right) / u128::from(denom)) as u64;
                let cut = cut.clamp(1, extent - 1);
                let mut sibling = self.clone();
                self.region.set_size(dim, cut);
                sibling.region.set_size(dim, extent - cut);
                sibling
                    .region
                    .set_index(dim, self.region.index()[dim] + cut as i64);
                return Ok(sibling);
            }
        }
        Err(ExecError::UnsplittableRegion {
            region: self.region.clone(),
        })
    }

    /// Even split, the ratio the load-balancing driver always requests.
    pub fn halve(&mut self) -> Result<RegionSplitter, ExecError> {
        self.split(1, 1)
    }
}
