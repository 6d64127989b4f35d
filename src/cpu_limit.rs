//! Limits on how many CPU-hungry external processes we run at once.

use std::sync::LazyLock;

use tokio::sync::Semaphore;

use crate::prelude::*;

/// One permit per CPU, shared by `pdftocairo` and `tesseract`.
static CPU_SEMAPHORE: LazyLock<Semaphore> =
    LazyLock::new(|| Semaphore::new(num_cpus::get()));

/// Call an async function while holding a permit from the CPU semaphore.
///
/// Both Poppler and Tesseract will happily use a whole core each, so OCRing a
/// long document with a high `--jobs` value would otherwise start far more
/// processes than the machine can run.
///
/// In-process CPU work (deskewing, PNG encoding) should go through
/// [`crate::async_utils::spawn_blocking_propagating_panics`] instead.
#[instrument(level = "trace", skip_all)]
pub async fn with_cpu_semaphore<Func, Fut, R>(f: Func) -> Result<R>
where
    Func: FnOnce() -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let permit = CPU_SEMAPHORE
        .acquire()
        .await
        .context("Could not acquire CPU permit")?;
    let result = f().await;
    drop(permit);
    result
}
