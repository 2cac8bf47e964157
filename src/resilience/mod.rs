//! Resilience layers for remote calls: timeout and retry
//!
//! Both are Tower layers over services whose error type is [`BoxError`], so
//! they compose with `ServiceBuilder` around the search client's transport:
//!
//! ```rust,ignore
//! ServiceBuilder::new()
//!     .layer(RetryLayer::new(RetryPolicy::once(), TransportOnly))
//!     .layer(TimeoutLayer::new(Duration::from_secs(30)))
//!     .service(transport)
//! ```
//!
//! A timeout is reported as an [`AgentsError::TransportError`], and
//! [`TransportOnly`] retries transport failures but never application errors:
//! a server that answered with a failure would answer the same way again.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tower::{BoxError, Layer, Service, ServiceExt};
use tracing::warn;

use crate::error::AgentsError;

// ===== Retry =====

#[derive(Debug, Clone, Copy)]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub kind: BackoffKind,
    pub initial: Duration,
    pub factor: f64,
    pub max: Duration,
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            initial: delay,
            factor: 1.0,
            max: delay,
        }
    }

    pub fn exponential(initial: Duration, factor: f64, max: Duration) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            initial,
            factor,
            max,
        }
    }

    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self.kind {
            BackoffKind::Fixed => self.initial,
            BackoffKind::Exponential => {
                // Whole nanoseconds, so 100ms * 2^0 stays exactly 100ms.
                let nanos = (self.initial.as_nanos() as f64
                    * self.factor.powi(attempt as i32))
                .round();
                if nanos >= self.max.as_nanos() as f64 {
                    self.max
                } else {
                    Duration::from_nanos(nanos as u64)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            backoff: Backoff::exponential(
                Duration::from_millis(250),
                2.0,
                Duration::from_secs(2),
            ),
        }
    }

    /// A single retry, the default for search calls.
    pub fn once() -> Self {
        Self::new(1)
    }
}

pub trait ErrorClassifier: Send + Sync + 'static {
    fn retryable(&self, error: &BoxError) -> bool;
}

/// Retries [`AgentsError::TransportError`]s only.
#[derive(Debug, Clone, Copy)]
pub struct TransportOnly;

impl ErrorClassifier for TransportOnly {
    fn retryable(&self, error: &BoxError) -> bool {
        error
            .downcast_ref::<AgentsError>()
            .is_some_and(AgentsError::is_transport)
    }
}

/// Recovers the crate error from a layered service's [`BoxError`].
pub fn into_agents_error(error: BoxError) -> AgentsError {
    match error.downcast::<AgentsError>() {
        Ok(e) => *e,
        Err(other) => AgentsError::transport(other.to_string()),
    }
}

pub struct RetryLayer<C> {
    policy: RetryPolicy,
    classifier: C,
}

impl<C> RetryLayer<C> {
    pub fn new(policy: RetryPolicy, classifier: C) -> Self {
        Self { policy, classifier }
    }
}

pub struct Retry<S, C> {
    inner: Arc<Mutex<S>>,
    policy: RetryPolicy,
    classifier: C,
}

impl<S, C: Clone> Clone for Retry<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            policy: self.policy,
            classifier: self.classifier.clone(),
        }
    }
}

impl<S, C> Layer<S> for RetryLayer<C>
where
    C: Clone,
{
    type Service = Retry<S, C>;

    fn layer(&self, inner: S) -> Self::Service {
        Retry {
            inner: Arc::new(Mutex::new(inner)),
            policy: self.policy,
            classifier: self.classifier.clone(),
        }
    }
}

impl<S, C, Req> Service<Req> for Retry<S, C>
where
    Req: Clone + Send + 'static,
    S: Service<Req, Error = BoxError> + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    C: ErrorClassifier + Clone,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let policy = self.policy;
        let classifier = self.classifier.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut attempts: usize = 0;
            loop {
                let result = {
                    let mut guard = inner.lock().await;
                    ServiceExt::ready(&mut *guard)
                        .await?
                        .call(req.clone())
                        .await
                };
                match result {
                    Ok(resp) => return Ok(resp),
                    Err(e) => {
                        if attempts >= policy.max_retries || !classifier.retryable(&e) {
                            return Err(e);
                        }
                        let delay = policy.backoff.delay_for_attempt(attempts);
                        attempts += 1;
                        warn!(attempt = attempts, error = %e, ?delay, "retrying remote call");
                        sleep(delay).await;
                    }
                }
            }
        })
    }
}

// ===== Timeout =====

pub struct TimeoutLayer {
    dur: Duration,
}

impl TimeoutLayer {
    pub fn new(dur: Duration) -> Self {
        Self { dur }
    }
}

#[derive(Clone)]
pub struct Timeout<S> {
    inner: S,
    dur: Duration,
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = Timeout<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Timeout {
            inner,
            dur: self.dur,
        }
    }
}

impl<S, Req> Service<Req> for Timeout<S>
where
    S: Service<Req, Error = BoxError> + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let fut = self.inner.call(req);
        let dur = self.dur;
        Box::pin(async move {
            match timeout(dur, fut).await {
                Ok(r) => r,
                Err(_) => Err(Box::new(AgentsError::transport(format!(
                    "request timed out after {:?}",
                    dur
                ))) as BoxError),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::service_fn;

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Backoff::fixed(Duration::from_millis(1)),
        }
    }

    #[tokio::test]
    async fn retries_transport_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let svc = service_fn(move |()| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err::<&str, BoxError>(Box::new(AgentsError::transport("connection reset")))
                } else {
                    Ok("results")
                }
            }
        });
        let mut svc = RetryLayer::new(fast_policy(1), TransportOnly).layer(svc);
        let out = ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(())
            .await
            .unwrap();
        assert_eq!(out, "results");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_application_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let svc = service_fn(move |()| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), BoxError>(Box::new(AgentsError::application("invalid API key")))
            }
        });
        let mut svc = RetryLayer::new(fast_policy(3), TransportOnly).layer(svc);
        let err = ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(())
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            into_agents_error(err),
            AgentsError::ApplicationError { .. }
        ));
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let svc = service_fn(move |()| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), BoxError>(Box::new(AgentsError::transport("unreachable")))
            }
        });
        let mut svc = RetryLayer::new(fast_policy(1), TransportOnly).layer(svc);
        assert!(ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(())
            .await
            .is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn timeout_is_a_transport_error() {
        let svc = service_fn(|()| async move {
            sleep(Duration::from_millis(50)).await;
            Ok::<(), BoxError>(())
        });
        let mut svc = TimeoutLayer::new(Duration::from_millis(5)).layer(svc);
        let err = ServiceExt::ready(&mut svc)
            .await
            .unwrap()
            .call(())
            .await
            .unwrap_err();
        let err = into_agents_error(err);
        assert!(err.is_transport());
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let b = Backoff::exponential(Duration::from_millis(100), 2.0, Duration::from_millis(300));
        assert_eq!(b.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(b.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(b.delay_for_attempt(5), Duration::from_millis(300));
        assert_eq!(b.delay_for_attempt(64), Duration::from_millis(300));

        let search = RetryPolicy::once().backoff;
        assert_eq!(search.delay_for_attempt(0), Duration::from_millis(250));
        assert_eq!(search.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(search.delay_for_attempt(3), Duration::from_secs(2));
    }
}
