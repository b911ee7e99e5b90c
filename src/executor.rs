//! Parallel dispatch over worker slots, flat index ranges, and N-dimensional
//! regions, built on rayon's work-stealing pool.
//!
//! Flat dispatch pins the grain size to one index per task so the pool never
//! merges two logical slots; region dispatch recursively bisects a
//! [`RegionSplitter`] and lets idle workers steal halves for load balance.

use std::sync::OnceLock;

use log::{debug, trace};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{ExecError, TaskResult};
use crate::progress::{ProgressObserver, ProgressState};
use crate::region::Region;
use crate::splitter::RegionSplitter;

/// Leaf budget multiplier for region dispatch: enough pieces per worker for
/// stealing to even out uneven leaf costs, without per-element granularity.
const LEAVES_PER_WORKER: usize = 4;

/// Identity of one logical worker slot in a per-worker dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerSlot {
    /// Slot index in `[0, count)`.
    pub id: usize,
    /// Total number of slots in this dispatch.
    pub count: usize,
}

/// Engine that fans a single unit of work out across a dedicated
/// work-stealing pool. The worker count is fixed at construction; every
/// dispatch blocks the caller until all tasks have completed, aborted, or
/// failed.
pub struct ParallelExecutor {
    pool: ThreadPool,
    workers: usize,
}

/// Builder for [`ParallelExecutor`]
pub struct ExecutorBuilder {
    workers: Option<usize>,
}

impl ExecutorBuilder {
    pub fn new() -> Self {
        Self { workers: None }
    }

    /// Set the worker count explicitly (clamped to at least 1). Without this
    /// the count comes from `FANOUT_WORKERS`, falling back to detected CPUs.
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = Some(count.max(1));
        self
    }

    pub fn build(self) -> Result<ParallelExecutor, ExecError> {
        let workers = self.workers.unwrap_or_else(default_workers);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fanout-worker-{}", i))
            .build()
            .map_err(|e| ExecError::PoolBuild {
                source: e.to_string(),
            })?;
        debug!("built worker pool with {} workers", workers);
        Ok(ParallelExecutor { pool, workers })
    }
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Default worker count: `FANOUT_WORKERS` override, else detected CPUs,
/// floor-clamped to 1. Computed once.
fn default_workers() -> usize {
    static WORKERS: OnceLock<usize> = OnceLock::new();
    *WORKERS.get_or_init(|| {
        std::env::var("FANOUT_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or_else(num_cpus::get)
            .max(1)
    })
}

impl ParallelExecutor {
    /// Create an executor with the default worker count.
    pub fn new() -> Result<Self, ExecError> {
        ExecutorBuilder::new().build()
    }

    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    /// Create an executor with an explicit worker count.
    pub fn with_workers(count: usize) -> Result<Self, ExecError> {
        ExecutorBuilder::new().workers(count).build()
    }

    /// Number of logical workers this executor dispatches across.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start configuring a single dispatch.
    pub fn job(&self) -> Job<'_> {
        Job::new(self)
    }
}

type WorkerWork<'a> = Box<dyn Fn(WorkerSlot) -> TaskResult + Send + Sync + 'a>;
type IndexWork<'a> = Box<dyn Fn(usize) -> TaskResult + Send + Sync + 'a>;
type RegionWork<'a> = Box<dyn Fn(&[i64], &[u64]) -> TaskResult + Send + Sync + 'a>;

/// One configured dispatch: the work function for each shape plus an
/// optional progress/abort observer. Borrowed from the executor and dropped
/// when the call returns, so no two concurrent dispatches ever share
/// progress state.
pub struct Job<'a> {
    executor: &'a ParallelExecutor,
    worker_work: Option<WorkerWork<'a>>,
    index_work: Option<IndexWork<'a>>,
    region_work: Option<RegionWork<'a>>,
    observer: Option<&'a dyn ProgressObserver>,
}

impl<'a> Job<'a> {
    fn new(executor: &'a ParallelExecutor) -> Self {
        Self {
            executor,
            worker_work: None,
            index_work: None,
            region_work: None,
            observer: None,
        }
    }

    /// Set the once-per-worker work function. Shared context is whatever the
    /// closure captures.
    pub fn on_worker<F>(mut self, work: F) -> Self
    where
        F: Fn(WorkerSlot) -> TaskResult + Send + Sync + 'a,
    {
        self.worker_work = Some(Box::new(work));
        self
    }

    /// Set the per-index work function for flat-range dispatch.
    pub fn on_index<F>(mut self, work: F) -> Self
    where
        F: Fn(usize) -> TaskResult + Send + Sync + 'a,
    {
        self.index_work = Some(Box::new(work));
        self
    }

    /// Set the per-leaf work function for region dispatch. Receives the
    /// sub-region's index and size, one slice element per dimension.
    pub fn on_region<F>(mut self, work: F) -> Self
    where
        F: Fn(&[i64], &[u64]) -> TaskResult + Send + Sync + 'a,
    {
        self.region_work = Some(Box::new(work));
        self
    }

    /// Attach a progress/abort observer for this dispatch.
    pub fn observe(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Invoke the per-worker work exactly once for every slot in
    /// `[0, workers)`. No chunking: each slot is its own task.
    pub fn run_on_each_worker(&self) -> Result<(), ExecError> {
        let work = self.worker_work.as_ref().ok_or(ExecError::NoWorkConfigured {
            operation: "run_on_each_worker",
        })?;
        let count = self.executor.workers;
        debug!("dispatching one task per worker across {} slots", count);
        self.executor.pool.install(|| {
            // Grain size 1 so the pool cannot hand one task two slots.
            (0..count)
                .into_par_iter()
                .with_max_len(1)
                .try_for_each(|id| work(WorkerSlot { id, count }).map_err(ExecError::user))
        })
    }

    /// Invoke the per-index work exactly once for every index in
    /// `[first, last)`. An empty range is a no-op; a single-element range
    /// runs inline on the calling thread.
    pub fn parallelize_array(&self, first: usize, last: usize) -> Result<(), ExecError> {
        let work = self.index_work.as_ref().ok_or(ExecError::NoWorkConfigured {
            operation: "parallelize_array",
        })?;
        let observer = self.observer;
        if let Some(obs) = observer {
            obs.update_progress(0.0);
        }

        let count = last.saturating_sub(first);
        if count > 1 {
            debug!(
                "dispatching {} indices across {} workers",
                count, self.executor.workers
            );
            self.executor.pool.install(|| {
                let progress = ProgressState::for_current_thread(count as u64);
                (first..last)
                    .into_par_iter()
                    .with_max_len(1)
                    .try_for_each(|i| {
                        if let Some(obs) = observer {
                            if obs.abort_requested() {
                                return Err(ExecError::aborted(obs.pipeline_name()));
                            }
                        }
                        work(i).map_err(ExecError::user)?;
                        if let Some(obs) = observer {
                            progress.record(1, obs);
                        }
                        Ok(())
                    })
            })?;
        } else if count == 1 {
            work(first).map_err(ExecError::user)?;
        }

        if let Some(obs) = observer {
            obs.update_progress(1.0);
            if obs.abort_requested() {
                return Err(ExecError::aborted(obs.pipeline_name()));
            }
        }
        Ok(())
    }

    /// Invoke the region work across a rectangular extent, recursively
    /// bisected for load balance. With a single worker the work is called
    /// once over the full extent, with no splitting. Progress is accounted
    /// in elements, since leaf sub-regions vary in size.
    pub fn parallelize_region(&self, index: &[i64], size: &[u64]) -> Result<(), ExecError> {
        let work = self.region_work.as_ref().ok_or(ExecError::NoWorkConfigured {
            operation: "parallelize_region",
        })?;
        let region = Region::new(index.to_vec(), size.to_vec())?;
        let observer = self.observer;
        if let Some(obs) = observer {
            obs.update_progress(0.0);
        }

        if self.executor.workers == 1 {
            work(region.index(), region.size()).map_err(ExecError::user)?;
        } else {
            let total = region.number_of_elements();
            debug!(
                "dispatching {}D region of {} elements across {} workers",
                region.dimension(),
                total,
                self.executor.workers
            );
            let budget = self.executor.workers * LEAVES_PER_WORKER;
            let splitter = RegionSplitter::new(region);
            self.executor.pool.install(|| {
                let progress = ProgressState::for_current_thread(total);
                let leaf = |leaf_region: &Region| -> Result<(), ExecError> {
                    if let Some(obs) = observer {
                        if obs.abort_requested() {
                            return Err(ExecError::aborted(obs.pipeline_name()));
                        }
                    }
                    work(leaf_region.index(), leaf_region.size()).map_err(ExecError::user)?;
                    if let Some(obs) = observer {
                        progress.record(leaf_region.number_of_elements(), obs);
                    }
                    Ok(())
                };
                drive_split(splitter, budget, &leaf)
            })?;
        }

        if let Some(obs) = observer {
            obs.update_progress(1.0);
            if obs.abort_requested() {
                return Err(ExecError::aborted(obs.pipeline_name()));
            }
        }
        Ok(())
    }
}

/// Divide-and-conquer parallel-for over a splitter: bisect while the region
/// is divisible and the leaf budget allows, joining halves through the pool
/// so idle workers can steal them. The first error wins; the sibling half
/// still runs to completion before the join returns.
fn drive_split<F>(
    mut splitter: RegionSplitter,
    budget: usize,
    leaf: &F,
) -> Result<(), ExecError>
where
    F: Fn(&Region) -> Result<(), ExecError> + Sync,
{
    if splitter.is_empty() {
        return Ok(());
    }
    if budget <= 1 || !splitter.is_divisible() {
        return leaf(splitter.region());
    }
    trace!("splitting region {} (budget {})", splitter.region(), budget);
    let sibling = splitter.halve()?;
    let (kept, split_off) = rayon::join(
        || drive_split(splitter, budget - budget / 2, leaf),
        || drive_split(sibling, budget / 2, leaf),
    );
    kept?;
    split_off
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builder_clamps_workers_to_one() {
        let executor = ParallelExecutor::with_workers(0).unwrap();
        assert_eq!(executor.workers(), 1);
    }

    #[test]
    fn test_drive_split_respects_budget() {
        let region = Region::new(vec![0, 0], vec![64, 64]).unwrap();
        let leaves = AtomicUsize::new(0);
        let elements = AtomicUsize::new(0);

        let count = |leaf_region: &Region| -> Result<(), ExecError> {
            leaves.fetch_add(1, Ordering::Relaxed);
            elements.fetch_add(leaf_region.number_of_elements() as usize, Ordering::Relaxed);
            Ok(())
        };
        drive_split(RegionSplitter::new(region), 8, &count).unwrap();

        assert_eq!(leaves.load(Ordering::Relaxed), 8);
        assert_eq!(elements.load(Ordering::Relaxed), 64 * 64);
    }

    #[test]
    fn test_drive_split_budget_one_runs_whole_region() {
        let region = Region::new(vec![0], vec![100]).unwrap();
        let leaves = AtomicUsize::new(0);

        let count = |leaf_region: &Region| -> Result<(), ExecError> {
            assert_eq!(leaf_region.size(), &[100]);
            leaves.fetch_add(1, Ordering::Relaxed);
            Ok(())
        };
        drive_split(RegionSplitter::new(region), 1, &count).unwrap();

        assert_eq!(leaves.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_drive_split_skips_empty_region() {
        let region = Region::new(vec![0, 0], vec![8, 0]).unwrap();
        let leaves = AtomicUsize::new(0);

        let count = |_: &Region| -> Result<(), ExecError> {
            leaves.fetch_add(1, Ordering::Relaxed);
            Ok(())
        };
        drive_split(RegionSplitter::new(region), 8, &count).unwrap();

        assert_eq!(leaves.load(Ordering::Relaxed), 0);
    }
}
