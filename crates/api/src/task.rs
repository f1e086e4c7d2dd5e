//! Running writes so that a dropped request cannot interrupt them.
//!
//! When a client disconnects or the request times out, axum drops the
//! handler future. A write that has already started must still finish (or
//! fail) as a unit, so every mutation runs on its own spawned task and the
//! handler only awaits the outcome.

use std::future::Future;

use taskmaster_core::error::CoreError;

use crate::error::{AppError, AppResult};

pub async fn run_to_completion<F, T>(operation: F) -> AppResult<T>
where
    F: Future<Output = Result<T, CoreError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(operation).await {
        Ok(result) => result.map_err(AppError::from),
        Err(join_error) => Err(AppError::InternalError(format!(
            "write task failed: {join_error}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn operation_finishes_after_caller_is_dropped() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let caller = run_to_completion(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, CoreError>(())
        });
        // Poll long enough to spawn, then drop the caller.
        let _ = tokio::time::timeout(Duration::from_millis(1), caller).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn domain_errors_pass_through() {
        let result: AppResult<()> =
            run_to_completion(async { Err(CoreError::not_found("Project", "zzz")) }).await;
        assert_matches!(result, Err(AppError::Core(CoreError::NotFound { .. })));
    }
}
