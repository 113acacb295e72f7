use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use harvester_engine::{
    PageResponse, ReqwestTransport, RetryPolicy, RetryingTransport, Transport, TransportError,
    TransportFailure, TransportSettings,
};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fails with a network error a fixed number of times, then answers 200.
struct FlakyTransport {
    failures: u32,
    calls: Arc<AtomicU32>,
}

impl FlakyTransport {
    fn new(failures: u32) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let transport = Self {
            failures,
            calls: calls.clone(),
        };
        (transport, calls)
    }
}

#[async_trait::async_trait]
impl Transport for FlakyTransport {
    async fn get(
        &self,
        _url: &str,
        _bearer: &str,
        _cancel: &CancellationToken,
    ) -> Result<PageResponse, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(TransportError::new(TransportFailure::Network, "connection reset"));
        }
        Ok(PageResponse {
            status: 200,
            body: b"{\"value\":[]}".to_vec(),
        })
    }
}

#[tokio::test]
async fn sends_bearer_token_and_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/odata/Items"))
        .and(header("authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"value\":[]}"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new(TransportSettings::default()).unwrap();
    let url = format!("{}/odata/Items", server.uri());

    let response = transport
        .get(&url, "abc123", &CancellationToken::new())
        .await
        .expect("request ok");
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"{\"value\":[]}".to_vec());
}

#[tokio::test]
async fn http_status_is_a_response_not_a_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .expect(1)
        .mount(&server)
        .await;

    let inner = ReqwestTransport::new(TransportSettings::default()).unwrap();
    let transport = RetryingTransport::new(inner, RetryPolicy::immediate(5));
    let url = format!("{}/broken", server.uri());

    let response = transport
        .get(&url, "token", &CancellationToken::new())
        .await
        .expect("status is returned");
    assert_eq!(response.status, 500);
    assert_eq!(response.body, b"oops".to_vec());
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(250))
                .set_body_string("slow"),
        )
        .mount(&server)
        .await;

    let settings = TransportSettings {
        request_timeout: Duration::from_millis(50),
        ..TransportSettings::default()
    };
    let transport = ReqwestTransport::new(settings).unwrap();
    let url = format!("{}/slow", server.uri());

    let err = transport
        .get(&url, "token", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, TransportFailure::Timeout);
}

#[tokio::test]
async fn malformed_url_is_not_retried() {
    let inner = ReqwestTransport::new(TransportSettings::default()).unwrap();
    let transport = RetryingTransport::new(inner, RetryPolicy::immediate(5));

    let err = transport
        .get("not a url", "token", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, TransportFailure::InvalidUrl);
}

#[tokio::test]
async fn transient_failures_within_budget_succeed() {
    let (flaky, calls) = FlakyTransport::new(2);
    let transport = RetryingTransport::new(flaky, RetryPolicy::immediate(5));

    let response = transport
        .get("http://odata.test/Items", "token", &CancellationToken::new())
        .await
        .expect("third attempt succeeds");
    assert_eq!(response.status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn budget_exhaustion_returns_last_error() {
    let (flaky, calls) = FlakyTransport::new(10);
    let transport = RetryingTransport::new(flaky, RetryPolicy::immediate(5));

    let err = transport
        .get("http://odata.test/Items", "token", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, TransportFailure::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn cancelled_request_reports_cancellation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hang"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let inner = ReqwestTransport::new(TransportSettings::default()).unwrap();
    let transport = RetryingTransport::new(inner, RetryPolicy::immediate(5));
    let url = format!("{}/hang", server.uri());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), transport.get(&url, "token", &cancel))
        .await
        .expect("cancellation is prompt")
        .unwrap_err();
    assert!(err.is_cancelled());
}
