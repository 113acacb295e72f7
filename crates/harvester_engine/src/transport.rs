use std::time::Duration;

use engine_logging::engine_debug;
use reqwest::header::AUTHORIZATION;
use tokio_util::sync::CancellationToken;

use crate::retry::{retry_with_policy, RetryAction, RetryError, RetryPolicy};
use crate::{PageResponse, TransportError, TransportFailure};

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub connect_timeout: Duration,
    /// Wall-clock bound on each individual attempt.
    pub request_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// One authenticated GET. Implementations report only transport-level
/// failures as errors; any HTTP status is a successful response.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        bearer: &str,
        cancel: &CancellationToken,
    ) -> Result<PageResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(settings: TransportSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| TransportError::new(TransportFailure::Network, err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        bearer: &str,
        cancel: &CancellationToken,
    ) -> Result<PageResponse, TransportError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| TransportError::new(TransportFailure::InvalidUrl, err.to_string()))?;

        let request = self
            .client
            .get(parsed)
            .header(AUTHORIZATION, format!("Bearer {bearer}"));
        let exchange = async {
            let response = request.send().await.map_err(map_reqwest_error)?;
            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(map_reqwest_error)?;
            Ok(PageResponse {
                status,
                body: body.to_vec(),
            })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::new(
                TransportFailure::Cancelled,
                "request cancelled",
            )),
            result = exchange => result,
        }
    }
}

/// Wraps another transport with a fixed attempt budget and jittered pauses.
///
/// Only transport-level failures are retried; the response status is not inspected.
#[derive(Debug, Clone)]
pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryingTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub async fn execute(
        &self,
        url: &str,
        bearer: &str,
        cancel: &CancellationToken,
    ) -> Result<PageResponse, TransportError> {
        let label = format!("http request {url}");
        let result = retry_with_policy(&self.policy, cancel, &label, classify, |attempt| {
            engine_debug!("GET {} (attempt {})", url, attempt);
            self.inner.get(url, bearer, cancel)
        })
        .await;

        match result {
            Ok(response) => Ok(response),
            Err(RetryError::Exhausted { last, .. }) | Err(RetryError::Aborted(last)) => Err(last),
            Err(RetryError::Cancelled) => Err(TransportError::new(
                TransportFailure::Cancelled,
                "request cancelled",
            )),
        }
    }
}

#[async_trait::async_trait]
impl<T: Transport> Transport for RetryingTransport<T> {
    async fn get(
        &self,
        url: &str,
        bearer: &str,
        cancel: &CancellationToken,
    ) -> Result<PageResponse, TransportError> {
        self.execute(url, bearer, cancel).await
    }
}

fn classify(err: &TransportError) -> RetryAction {
    match err.kind {
        TransportFailure::InvalidUrl | TransportFailure::Cancelled => RetryAction::Abort,
        TransportFailure::Timeout | TransportFailure::Network => RetryAction::Retry,
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::new(TransportFailure::Timeout, err.to_string());
    }
    TransportError::new(TransportFailure::Network, err.to_string())
}
