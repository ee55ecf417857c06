//! "Delayed queue": a dispatcher loop pops due items and hands them to
//! the worker pool. This module is the pop-and-dispatch step; the caller
//! supplies the handler lookup and owns the loop's cadence.

use chrono::Utc;
use openpenpal_cache::CacheStore;
use tracing::debug;

use crate::error::SchedulerError;

/// Pops up to `batch_size` due members from `queue` and invokes `on_due` for
/// each. Returns the number dispatched. Intended to be called on a fixed
/// tick (e.g. every second) by the owning runtime.
pub async fn dispatch_due<F, Fut>(
    cache: &dyn CacheStore,
    queue: &str,
    batch_size: usize,
    mut on_due: F,
) -> Result<usize, SchedulerError>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let now = Utc::now().timestamp();
    let due = cache.pop_due(queue, now, batch_size).await?;
    let count = due.len();
    for member in due {
        debug!(queue, %member, "dispatching due item");
        on_due(member).await;
    }
    Ok(count)
}
