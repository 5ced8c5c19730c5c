//! Batch execution of independent work units (e.g. toy fits) over a worker pool.
//!
//! Units run on a dedicated rayon pool with `n_workers` threads. A failing unit does
//! not cancel its siblings; the first failure (in input order) is reported once every
//! unit has finished.

use pl_core::{Error, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Run `unit` for every id and return `(id, result)` pairs in input order.
///
/// Progress is logged at info level.
pub fn compute_many<I, S, T, F>(ids: I, n_workers: usize, unit: F) -> Result<Vec<(String, T)>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    T: Send,
    F: Fn(&str) -> Result<T> + Send + Sync,
{
    compute_many_with_progress(ids, n_workers, unit, |done, total| {
        log::info!("compute_many: {done}/{total} done");
    })
}

/// [`compute_many`] with a custom progress callback, called as `(done, total)` after
/// every finished unit.
pub fn compute_many_with_progress<I, S, T, F, P>(
    ids: I,
    n_workers: usize,
    unit: F,
    progress: P,
) -> Result<Vec<(String, T)>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    T: Send,
    F: Fn(&str) -> Result<T> + Send + Sync,
    P: Fn(usize, usize) + Send + Sync,
{
    if n_workers == 0 {
        return Err(Error::Validation("n_workers must be >= 1".to_string()));
    }
    let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
    let total = ids.len();
    let done = AtomicUsize::new(0);

    let run_one = |id: &String| {
        let result = unit(id);
        progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
        result
    };

    let results: Vec<Result<T>> = if n_workers == 1 {
        ids.iter().map(run_one).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_workers)
            .build()
            .map_err(|e| Error::Computation(format!("failed to build worker pool: {e}")))?;
        pool.install(|| ids.par_iter().map(run_one).collect())
    };

    ids.into_iter()
        .zip(results)
        .map(|(id, result)| match result {
            Ok(value) => Ok((id, value)),
            Err(e) => {
                log::warn!("compute_many: unit '{id}' failed: {e}");
                Err(e)
            }
        })
        .collect()
}
