//! End-to-end behaviour of the client against a scripted transport.
//!
//! These tests run on tokio's paused clock, so retry delays, cache expiry and
//! cancellation timing are exact.

use async_trait::async_trait;
use fetchkit::{
    CancelToken, Client, Endpoint, Error, ErrorKind, FailureReport, HttpRequest, RawResponse,
    Transport, TransportError,
};
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::Level;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct User {
    id: u64,
    name: String,
}

type Outcome = Result<RawResponse, TransportError>;

/// Plays back queued outcomes; the last one repeats once the queue runs dry.
struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome>>,
    last: Mutex<Option<Outcome>>,
    latency: Duration,
    calls: Mutex<Vec<(Instant, HttpRequest)>>,
}

impl ScriptedTransport {
    fn new(script: impl IntoIterator<Item = Outcome>) -> Arc<Self> {
        Self::with_latency(script, Duration::ZERO)
    }

    fn with_latency(script: impl IntoIterator<Item = Outcome>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            latency,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    fn methods(&self) -> Vec<Method> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.method.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));
        let next = self.script.lock().unwrap().pop_front();
        let outcome = match next {
            Some(outcome) => {
                *self.last.lock().unwrap() = Some(outcome.clone());
                outcome
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .expect("script must not be empty"),
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        outcome
    }
}

fn respond(status: u16, body: &str) -> Outcome {
    Ok(RawResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers: HeaderMap::new(),
        body: body.as_bytes().to_vec(),
    })
}

fn ada() -> &'static str {
    r#"{"id": 42, "name": "Ada"}"#
}

/// Counts warnings and errors emitted by the client.
#[derive(Clone, Default)]
struct LevelCounter {
    warnings: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

impl LevelCounter {
    fn counts(&self) -> (usize, usize) {
        (
            self.warnings.load(Ordering::SeqCst),
            self.errors.load(Ordering::SeqCst),
        )
    }
}

impl<S: tracing::Subscriber> Layer<S> for LevelCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with("fetchkit") {
            return;
        }
        match *metadata.level() {
            Level::WARN => self.warnings.fetch_add(1, Ordering::SeqCst),
            Level::ERROR => self.errors.fetch_add(1, Ordering::SeqCst),
            _ => 0,
        };
    }
}

struct Harness {
    client: Client,
    transport: Arc<ScriptedTransport>,
    reports: Arc<Mutex<Vec<FailureReport>>>,
}

fn harness(transport: Arc<ScriptedTransport>, max_attempts: usize) -> Harness {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    let client = Client::builder()
        .base_url("https://api.example.com")
        .unwrap()
        .max_attempts(max_attempts)
        .base_backoff(Duration::from_millis(100))
        .cache_ttl(Duration::from_secs(30))
        .transport(transport.clone())
        .observer(Arc::new(move |report: &FailureReport| {
            sink.lock().unwrap().push(report.clone());
        }))
        .build()
        .unwrap();
    Harness {
        client,
        transport,
        reports,
    }
}

#[tokio::test(start_paused = true)]
async fn server_errors_exhaust_retries_with_increasing_delays() {
    let h = harness(ScriptedTransport::new([respond(500, "boom")]), 3);

    let result = h
        .client
        .execute::<User>(&Endpoint::get("/users/42"), None)
        .await;

    match result {
        Err(Error::ServerError { status }) => assert_eq!(status.as_u16(), 500),
        other => panic!("Expected ServerError, got {:?}", other),
    }
    assert_eq!(h.transport.call_count(), 3);

    let times = h.transport.call_times();
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(gaps, [Duration::from_millis(100), Duration::from_millis(200)]);
    assert!(gaps[0] < gaps[1]);

    let reports = h.reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, ErrorKind::ServerError);
    assert_eq!(reports[0].attempts, 3);
    assert_eq!(reports[0].path, "/users/42");
}

#[tokio::test(start_paused = true)]
async fn recovers_after_transient_failures() {
    let h = harness(
        ScriptedTransport::new([
            Err(TransportError::Connect("connection reset".into())),
            respond(502, ""),
            respond(200, ada()),
        ]),
        3,
    );

    let response = h
        .client
        .send::<User>(&Endpoint::get("/users/42"), None)
        .await
        .unwrap();
    assert_eq!(response.data.name, "Ada");
    assert_eq!(response.attempts, 3);
    assert_eq!(response.latency, Duration::from_millis(300));
    assert!(h.reports.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn decode_failure_is_not_retried() {
    let h = harness(ScriptedTransport::new([respond(200, r#"{"id": 42}"#)]), 3);

    let result = h
        .client
        .execute::<User>(&Endpoint::get("/users/42"), Some("user:42"))
        .await;

    match result {
        Err(Error::DecodeFailure { message, .. }) => assert!(message.contains("name")),
        other => panic!("Expected DecodeFailure, got {:?}", other),
    }
    assert_eq!(h.transport.call_count(), 1);
    assert!(h.client.cache().get("user:42").is_none());
    assert_eq!(h.reports.lock().unwrap()[0].kind, ErrorKind::DecodeFailure);
}

#[tokio::test(start_paused = true)]
async fn client_errors_fail_on_first_attempt() {
    for (status, kind) in [
        (401, ErrorKind::Unauthorized),
        (403, ErrorKind::Forbidden),
        (404, ErrorKind::NotFound),
        (422, ErrorKind::ValidationFailed),
        (409, ErrorKind::InvalidRequest),
    ] {
        let h = harness(ScriptedTransport::new([respond(status, "")]), 5);
        let err = h
            .client
            .execute::<User>(&Endpoint::get("/users/42"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), kind);
        assert_eq!(h.transport.call_count(), 1, "status {status}");
    }
}

#[tokio::test(start_paused = true)]
async fn cached_get_makes_no_further_calls_within_ttl() {
    let h = harness(ScriptedTransport::new([respond(200, ada())]), 3);
    let endpoint = Endpoint::get("/users/42");

    let first: User = h.client.execute(&endpoint, Some("user:42")).await.unwrap();
    tokio::time::advance(Duration::from_secs(10)).await;
    let second = h
        .client
        .send::<User>(&endpoint, Some("user:42"))
        .await
        .unwrap();

    assert_eq!(h.transport.call_count(), 1);
    assert_eq!(second.data, first);
    assert!(second.from_cache);
    assert_eq!(second.attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn cached_get_refetches_after_ttl() {
    let h = harness(
        ScriptedTransport::new([
            respond(200, ada()),
            respond(200, r#"{"id": 42, "name": "Ada Lovelace"}"#),
        ]),
        3,
    );
    let endpoint = Endpoint::get("/users/42");

    let _: User = h.client.execute(&endpoint, Some("user:42")).await.unwrap();
    tokio::time::advance(Duration::from_secs(31)).await;
    let refreshed: User = h.client.execute(&endpoint, Some("user:42")).await.unwrap();

    assert_eq!(h.transport.call_count(), 2);
    assert_eq!(refreshed.name, "Ada Lovelace");
}

#[tokio::test(start_paused = true)]
async fn cache_entry_of_another_type_is_a_miss() {
    let h = harness(ScriptedTransport::new([respond(200, ada())]), 3);
    h.client.cache().set("user:42", Arc::new("not a user".to_string()));

    let user: User = h
        .client
        .execute(&Endpoint::get("/users/42"), Some("user:42"))
        .await
        .unwrap();
    assert_eq!(user.id, 42);
    assert_eq!(h.transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn mutations_bypass_the_cache() {
    let h = harness(ScriptedTransport::new([respond(200, ada())]), 3);
    let create = Endpoint::post("/users")
        .with_body(&User {
            id: 0,
            name: "Ada".into(),
        })
        .unwrap();

    let _: User = h.client.execute(&create, Some("user:42")).await.unwrap();
    assert!(h.client.cache().is_empty());

    // A cached read under the same key is not served to a mutation either.
    let _: User = h
        .client
        .execute(&Endpoint::get("/users/42"), Some("user:42"))
        .await
        .unwrap();
    let _: User = h
        .client
        .execute(&Endpoint::delete("/users/42"), Some("user:42"))
        .await
        .unwrap();

    assert_eq!(
        h.transport.methods(),
        [Method::POST, Method::GET, Method::DELETE]
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_during_retry_wait() {
    let h = harness(ScriptedTransport::new([respond(500, "")]), 5);
    let token = CancelToken::new();

    let task = tokio::spawn({
        let client = h.client.clone();
        let token = token.clone();
        async move {
            client
                .execute_with_cancel::<User>(&Endpoint::get("/users/42"), None, &token)
                .await
        }
    });

    // Attempts run at 0 ms and 100 ms; the next is due at 300 ms.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.transport.call_count(), 2);
    token.cancel();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)), "{result:?}");

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.transport.call_count(), 2);
    assert!(h.reports.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_during_transport_call() {
    let transport = ScriptedTransport::with_latency([respond(200, ada())], Duration::from_secs(1));
    let h = harness(transport, 3);
    let token = CancelToken::new();

    let task = tokio::spawn({
        let client = h.client.clone();
        let token = token.clone();
        async move {
            client
                .execute_with_cancel::<User>(&Endpoint::get("/users/42"), Some("user:42"), &token)
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    token.cancel();

    assert!(matches!(task.await.unwrap(), Err(Error::Cancelled)));
    assert!(h.client.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_skips_transport() {
    let h = harness(ScriptedTransport::new([respond(200, ada())]), 3);
    let token = CancelToken::new();
    token.cancel();

    let result = h
        .client
        .execute_with_cancel::<User>(&Endpoint::get("/users/42"), None, &token)
        .await;
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn transport_cancellation_is_not_retried() {
    let h = harness(ScriptedTransport::new([Err(TransportError::Cancelled)]), 3);

    let result = h
        .client
        .execute::<User>(&Endpoint::get("/users/42"), None)
        .await;
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(h.transport.call_count(), 1);
    assert!(h.reports.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn build_failure_makes_no_transport_call() {
    let h = harness(ScriptedTransport::new([respond(200, ada())]), 3);

    let result = h
        .client
        .execute::<User>(&Endpoint::get("/users?page=1"), None)
        .await;
    assert!(matches!(result, Err(Error::InvalidRequest { status: None, .. })));
    assert_eq!(h.transport.call_count(), 0);

    let reports = h.reports.lock().unwrap();
    assert_eq!(reports[0].kind, ErrorKind::InvalidRequest);
    assert_eq!(reports[0].attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_are_not_deduplicated() {
    let transport =
        ScriptedTransport::with_latency([respond(200, ada())], Duration::from_millis(50));
    let h = harness(transport, 3);
    let endpoint = Endpoint::get("/users/42");

    let (a, b) = tokio::join!(
        h.client.execute::<User>(&endpoint, Some("user:42")),
        h.client.execute::<User>(&endpoint, Some("user:42")),
    );
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(h.transport.call_count(), 2);

    let _: User = h.client.execute(&endpoint, Some("user:42")).await.unwrap();
    assert_eq!(h.transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn failures_are_logged_once_per_outcome() {
    let counter = LevelCounter::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(counter.clone()));

    // two retried attempts warn, the final one is the only error
    let h = harness(ScriptedTransport::new([respond(500, "boom")]), 3);
    let result = h
        .client
        .execute::<User>(&Endpoint::get("/users/42"), None)
        .await;
    assert!(matches!(result, Err(Error::ServerError { .. })));
    assert_eq!(counter.counts(), (2, 1));

    // nothing is retried, so nothing warns
    let h = harness(ScriptedTransport::new([respond(404, "")]), 3);
    let result = h
        .client
        .execute::<User>(&Endpoint::get("/users/404"), None)
        .await;
    assert!(matches!(result, Err(Error::NotFound)));
    assert_eq!(counter.counts(), (2, 2));
}
