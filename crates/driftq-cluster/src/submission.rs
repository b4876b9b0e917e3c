//! Handles over in-flight reassignment submissions.

use crate::ClusterError;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// The per-partition future recorded when a reassignment is submitted.
///
/// The handle is cheap to clone and can be probed repeatedly: each probe
/// waits up to the given timeout for the submission to settle and returns
/// `None` while it is still pending. The supervisor uses this to classify
/// rejected assignments without ever consuming the underlying future.
#[derive(Clone)]
pub struct SubmissionHandle {
    inner: Shared<BoxFuture<'static, Result<(), ClusterError>>>,
}

impl SubmissionHandle {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<(), ClusterError>> + Send + 'static,
    {
        Self {
            inner: future.boxed().shared(),
        }
    }

    /// A handle that has already settled with the given result.
    pub fn ready(result: Result<(), ClusterError>) -> Self {
        Self::new(std::future::ready(result))
    }

    /// A handle that never settles. Mirrors a submission the cluster
    /// controller has accepted but not yet acted on.
    pub fn pending() -> Self {
        Self::new(std::future::pending())
    }

    /// Wait up to `timeout` for the submission to settle.
    ///
    /// Returns `None` if it is still pending after the timeout.
    pub async fn probe(&self, timeout: Duration) -> Option<Result<(), ClusterError>> {
        match tokio::time::timeout(timeout, self.inner.clone()).await {
            Ok(result) => Some(result),
            Err(_) => None,
        }
    }
}

impl fmt::Debug for SubmissionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.peek() {
            Some(result) => write!(f, "SubmissionHandle(settled: {result:?})"),
            None => write!(f, "SubmissionHandle(pending)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_handle_settles_immediately() {
        let handle = SubmissionHandle::ready(Ok(()));
        let result = handle.probe(Duration::from_millis(10)).await;
        assert_eq!(result, Some(Ok(())));
    }

    #[tokio::test]
    async fn test_pending_handle_times_out() {
        let handle = SubmissionHandle::pending();
        let result = handle.probe(Duration::from_millis(10)).await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_probe_is_repeatable() {
        let error = ClusterError::InvalidReplicaAssignment {
            partition: "orders-0".to_string(),
            reason: "unknown broker".to_string(),
        };
        let handle = SubmissionHandle::ready(Err(error.clone()));

        let first = handle.probe(Duration::from_millis(10)).await;
        let second = handle.probe(Duration::from_millis(10)).await;
        assert_eq!(first, Some(Err(error.clone())));
        assert_eq!(second, Some(Err(error)));
    }

    #[tokio::test]
    async fn test_handle_resolves_from_spawned_task() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = SubmissionHandle::new(async move {
            rx.await
                .map_err(|e| ClusterError::from_transport_error(e, "submission channel"))?
        });

        assert_eq!(handle.probe(Duration::from_millis(5)).await, None);
        tx.send(Ok(())).unwrap();
        assert_eq!(
            handle.probe(Duration::from_millis(100)).await,
            Some(Ok(()))
        );
    }
}
