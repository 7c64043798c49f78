//! Bounded worker pool running one task per application.

use crate::backup::copy_engine::CopyOutcome;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use getset::{CopyGetters, Getters};
use itertools::Itertools;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Anything the scheduler can dispatch. The id is the key of the task's result.
pub trait ScheduledTask: Send + Sync {
    fn application_id(&self) -> &str;
}

/// Backup of one application: every source root lands under `destination`.
#[derive(Clone, Debug, Getters)]
pub struct CopyTask {
    application_id: String,
    #[getset(get = "pub")]
    sources: Vec<PathBuf>,
    #[getset(get = "pub")]
    destination: PathBuf,
}

impl CopyTask {
    pub fn new<S: Into<String>, D: Into<PathBuf>>(
        application_id: S,
        sources: Vec<PathBuf>,
        destination: D,
    ) -> Self {
        Self {
            application_id: application_id.into(),
            sources,
            destination: destination.into(),
        }
    }
}

impl ScheduledTask for CopyTask {
    fn application_id(&self) -> &str {
        &self.application_id
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Getters, CopyGetters)]
pub struct CopyResult {
    #[getset(get = "pub")]
    application_id: String,
    #[getset(get_copy = "pub")]
    success: bool,
    #[getset(get_copy = "pub")]
    files_copied: u64,
    #[getset(get_copy = "pub")]
    files_failed: u64,
    #[getset(get_copy = "pub")]
    bytes_copied: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[getset(get = "pub")]
    errors: Vec<String>,
}

impl CopyResult {
    pub fn from_outcome<S: Into<String>>(application_id: S, outcome: CopyOutcome) -> Self {
        Self::with_success(application_id, outcome.success(), outcome)
    }

    /// Same counters as `outcome` but with the caller's verdict.
    pub fn with_success<S: Into<String>>(
        application_id: S,
        success: bool,
        outcome: CopyOutcome,
    ) -> Self {
        Self {
            application_id: application_id.into(),
            success,
            files_copied: outcome.files_copied(),
            files_failed: outcome.files_failed(),
            bytes_copied: outcome.bytes_copied(),
            errors: match convert_error_vec(outcome.into_errors()) {
                Ok(()) => Vec::new(),
                Err(e) => e.into_iter().map(|e| e.to_string()).collect(),
            },
        }
    }

    pub fn failed<S: Into<String>>(application_id: S, error: &Error) -> Self {
        Self {
            application_id: application_id.into(),
            success: false,
            files_copied: 0,
            files_failed: 0,
            bytes_copied: 0,
            errors: vec![error.to_string()],
        }
    }

    fn absorb(&mut self, other: CopyResult) {
        self.success = self.success && other.success;
        self.files_copied += other.files_copied;
        self.files_failed += other.files_failed;
        self.bytes_copied += other.bytes_copied;
        self.errors.extend(other.errors);
    }
}

pub struct TaskScheduler {
    pool: ThreadPool,
}

impl TaskScheduler {
    pub fn new(max_workers: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(max_workers.max(1))
            .thread_name(|i| format!("backup-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs every task and returns once all of them have a result.
    ///
    /// A panicking task is recorded as a failure for its own id; siblings keep
    /// running. Completion order is unspecified.
    pub fn run_all<T, F>(&self, tasks: Vec<T>, run: F) -> BTreeMap<String, CopyResult>
    where
        T: ScheduledTask,
        F: Fn(&T) -> CopyResult + Sync,
    {
        info!("Dispatching {} task(s) on {} worker(s)", tasks.len(), self.workers());
        let collected = self.pool.install(|| {
            tasks
                .par_iter()
                .map(|task| {
                    let id = task.application_id().to_string();
                    let result =
                        catch_unwind(AssertUnwindSafe(|| run(task))).unwrap_or_else(|panic| {
                            let e = Error::TaskPanicked(id.clone(), panic_message(panic.as_ref()));
                            error!("{e}");
                            CopyResult::failed(id.clone(), &e)
                        });
                    (id, result)
                })
                .collect::<Vec<_>>()
        });

        let mut results: BTreeMap<String, CopyResult> = BTreeMap::new();
        for (id, result) in collected {
            match results.get_mut(&id) {
                None => {
                    results.insert(id, result);
                }
                Some(existing) => {
                    warn!("Several tasks share application id {id:?}, merging their results");
                    CopyResult::absorb(existing, result);
                }
            }
        }

        let failed = results
            .values()
            .filter(|r| !r.success)
            .map(|r| r.application_id.as_str())
            .join(", ");
        if !failed.is_empty() {
            warn!("Failed applications: {failed}");
        }
        results
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
