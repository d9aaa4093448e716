//! Fixed-size worker pool for independent per-file tasks.

use std::{fmt::Debug, panic::{AssertUnwindSafe, catch_unwind}, time::Instant};

use anyhow::{Context, Result, anyhow};
use log::{error, info};
use rayon::prelude::*;

/// Run `task` over every item on a pool of `cpus` threads.
///
/// Tasks are independent: a task that errors or panics is logged with its
/// item and skipped, never aborting the rest. Returns the results of the
/// tasks that succeeded, in item order.
pub fn run_tasks<T, R, F>(label: &str, cpus: usize, items: Vec<T>, task: F) -> Result<Vec<R>>
where
    T: Debug + Send + Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync + Send,
{
    let total = items.len();
    info!("[{label}] Processing {total} items using {cpus} CPUs");
    let start = Instant::now();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cpus.max(1))
        .thread_name(|i| format!("streetnets-worker-{i}"))
        .build()
        .with_context(|| format!("[{label}] Failed to build thread pool"))?;

    let results: Vec<R> = pool.install(|| {
        items.par_iter()
            .filter_map(|item| {
                let outcome = catch_unwind(AssertUnwindSafe(|| task(item)))
                    .unwrap_or_else(|panic| Err(anyhow!("task panicked: {}", panic_message(&panic))));
                match outcome {
                    Ok(result) => Some(result),
                    Err(e) => {
                        error!("[{label}] {item:?} failed: {e:#}");
                        None
                    }
                }
            })
            .collect()
    });

    info!(
        "[{label}] Finished {} of {total} items in {:.1} seconds",
        results.len(),
        start.elapsed().as_secs_f64(),
    );
    Ok(results)
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
