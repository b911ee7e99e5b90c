//! Error types for parallel dispatch.
//! One enum covers configuration mistakes, cooperative abort, internal
//! invariant violations, and failures raised by caller-supplied work.

use std::fmt;

use crate::region::Region;

/// Return type for caller-supplied work functions. An `Err` surfaces to the
/// original caller unchanged, wrapped in [`ExecError::User`].
pub type TaskResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Main error type for fanout dispatch operations
#[derive(Debug)]
pub enum ExecError {
    /// Entry point invoked before any work function was configured
    NoWorkConfigured {
        operation: &'static str,
    },
    /// Cooperative abort observed during the multi-threaded part of execution
    Aborted {
        pipeline: String,
    },
    /// Split requested on a region with no divisible dimension. This is an
    /// engine invariant violation, not a user error: the dispatch driver only
    /// splits while `is_divisible()` holds.
    UnsplittableRegion {
        region: Region,
    },
    /// Region constructed from index/size sequences of different lengths
    DimensionMismatch {
        index_len: usize,
        size_len: usize,
    },
    /// Worker pool construction failed
    PoolBuild {
        source: String,
    },
    /// Failure raised by a caller-supplied work function, carried unchanged
    User {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ExecError {
    pub(crate) fn user(source: Box<dyn std::error::Error + Send + Sync>) -> Self {
        ExecError::User { source }
    }

    pub(crate) fn aborted(pipeline: &str) -> Self {
        ExecError::Aborted {
            pipeline: pipeline.to_string(),
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::NoWorkConfigured { operation } => {
                write!(f, "no work function configured for {}", operation)
            }
            ExecError::Aborted { pipeline } => {
                write!(
                    f,
                    "abort was requested by {} during the multi-threaded part of execution",
                    pipeline
                )
            }
            ExecError::UnsplittableRegion { region } => {
                write!(f, "region could not be split: {}", region)
            }
            ExecError::DimensionMismatch {
                index_len,
                size_len,
            } => {
                write!(
                    f,
                    "region index/size length mismatch: {} vs {}",
                    index_len, size_len
                )
            }
            ExecError::PoolBuild { source } => {
                write!(f, "failed to build worker pool: {}", source)
            }
            ExecError::User { source } => {
                write!(f, "work function failed: {}", source)
            }
        }
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecError::User { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborted_display_names_pipeline() {
        let error = ExecError::aborted("MedianImageFilter");
        let display = format!("{}", error);
        assert!(display.contains("MedianImageFilter"));
        assert!(display.contains("abort was requested"));
    }

    #[test]
    fn test_user_error_exposes_source() {
        use std::error::Error;

        let inner: Box<dyn Error + Send + Sync> = "boom".into();
        let error = ExecError::user(inner);
        assert!(error.source().is_some());
        assert_eq!(error.source().unwrap().to_string(), "boom");
    }

    #[test]
    fn test_no_work_display_names_operation() {
        let error = ExecError::NoWorkConfigured {
            operation: "parallelize_array",
        };
        assert!(format!("{}", error).contains("parallelize_array"));
    }
}
