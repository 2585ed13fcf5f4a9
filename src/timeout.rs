//! Timeout utilities for export operations

use std::future::Future;
use std::time::Duration;

use crate::error::{ExportError, ExportResult};

/// Bound a whole export job
///
/// When the budget runs out the inner future is dropped. Anything it held
/// (scratch files, session leases) is released through `Drop`.
pub async fn with_job_timeout<F, T>(operation: F, timeout_secs: u64) -> ExportResult<T>
where
    F: Future<Output = ExportResult<T>>,
{
    match tokio::time::timeout(Duration::from_secs(timeout_secs), operation).await {
        Ok(result) => result,
        Err(_) => Err(ExportError::JobTimeout(timeout_secs)),
    }
}
