//! Call instrumentation for service operations
//!
//! Wraps an operation future with a deadline, a duration log line and the
//! prometheus duration/error metrics. Applied uniformly at the service
//! boundary, whatever the backend does underneath.

use crate::metrics;
use crate::{KgraphError, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Execute an operation under a timeout, logging and recording its outcome
///
/// # Arguments
/// * `operation` - Name for logging and metrics labels
/// * `timeout` - Deadline for the whole operation
/// * `fut` - The operation to execute
///
/// # Returns
/// The operation's result, or `BackendUnavailable` if the deadline elapsed
pub async fn instrumented<T, Fut>(operation: &'static str, timeout: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();

    let result = match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(KgraphError::BackendUnavailable(format!(
            "{} timed out after {:?}",
            operation, timeout
        ))),
    };

    let elapsed = started.elapsed();
    metrics::record_operation(operation, elapsed.as_secs_f64());

    match &result {
        Ok(_) => debug!(
            operation,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Operation completed"
        ),
        Err(e) => {
            metrics::record_operation_error(operation, e.kind());
            error!(
                operation,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                error = %e,
                "Operation failed"
            );
        }
    }

    result
}
