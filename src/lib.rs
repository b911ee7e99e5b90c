//! Data-parallel execution over flat index ranges and N-dimensional regions.
//!
//! A [`ParallelExecutor`] fans a single unit of work out across a
//! work-stealing pool, three ways: once per logical worker slot, once per
//! index of a flat range, or once per leaf of a recursively bisected region.
//! Every index in the space executes exactly once. Cooperative abort and
//! fractional progress flow through a caller-supplied [`ProgressObserver`];
//! failures raised inside worker tasks surface to the single calling thread
//! as [`ExecError`].

pub mod error;
pub mod executor;
pub mod progress;
pub mod region;
pub mod splitter;

// Re-export main API
pub use error::{ExecError, TaskResult};
pub use executor::{ExecutorBuilder, Job, ParallelExecutor, WorkerSlot};
pub use progress::ProgressObserver;
pub use region::Region;
pub use splitter::RegionSplitter;
