use std::fmt::Display;
use std::future::Future;

/// Await an optional side-path operation (cache, queue) and swallow its error.
///
/// Failures are logged with the operation name and counted in
/// `best_effort_failures_total`; the caller gets `None` and carries on along
/// the authoritative path.
pub async fn best_effort<T, E, F>(operation: &'static str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(operation, error = %e, "Best-effort operation failed, continuing");
            metrics::counter!("best_effort_failures_total", "operation" => operation).increment(1);
            None
        }
    }
}
