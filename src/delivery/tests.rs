//! Tests driving the delivery client against a local mock server.

use std::sync::{Arc, mpsc};
use std::time::Duration;

use parking_lot::Mutex;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use crate::bulk::{BulkRequest, Document};
use crate::future::WaitStatus;
use crate::test_utils::mock_server::{
    CapturedRequest, MockResponse, closed_port_addr, local_listener, spawn_mock_server,
};

use super::{
    BulkFuture, DeliveryClient, DeliveryClientBuilder, DeliveryError, DeliveryFailure,
    JsonObject, normalise_endpoint, worker::PendingRequest,
};

const WAIT: Duration = Duration::from_secs(5);

#[fixture]
fn batch() -> BulkRequest {
    BulkRequest::from_documents([Document::new("{\"a\":1}", "t1")])
}

fn client_for(endpoint: String) -> DeliveryClient {
    DeliveryClientBuilder::new()
        .with_endpoint(endpoint)
        .with_index("tok123")
        .with_connect_timeout_ms(2_000)
        .with_resource_timeout_ms(5_000)
        .build()
        .expect("client builds")
}

fn serve(responses: Vec<MockResponse>) -> (DeliveryClient, mpsc::Receiver<CapturedRequest>) {
    let (addr, rx) = spawn_mock_server(local_listener(), responses);
    (client_for(format!("http://{addr}/")), rx)
}

#[rstest]
#[case("http://host/", "http://host")]
#[case("http://host", "http://host")]
#[case("  http://host/  ", "http://host")]
#[case("\thttp://host/path/\n", "http://host/path")]
fn endpoint_normalisation(#[case] raw: &str, #[case] expected: &str) {
    assert_eq!(normalise_endpoint(raw), expected);
}

#[rstest]
fn posts_bulk_body_with_headers(batch: BulkRequest) {
    let (client, rx) = serve(vec![MockResponse::new(200, "{}")]);
    let future = client.execute(&batch);

    let captured = rx.recv_timeout(WAIT).expect("request captured");
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.path, "/_bulk");
    assert_eq!(
        captured.header("content-type"),
        Some("application/json; charset=utf-8")
    );
    assert_eq!(captured.header("accept"), Some("application/json"));
    assert_eq!(
        captured.body,
        "{\"index\":{\"_index\":\"tok123\",\"_type\":\"t1\"}}\n{\"a\":1}\n"
    );
    assert_eq!(future.wait(Some(WAIT)), WaitStatus::Resolved);
}

#[rstest]
fn server_error_resolves_failure_with_body(batch: BulkRequest) {
    let (client, _rx) = serve(vec![MockResponse::new(500, "server error")]);
    let seen: Arc<Mutex<Option<DeliveryFailure>>> = Arc::new(Mutex::new(None));
    let s = Arc::clone(&seen);
    let future = client.execute(&batch);
    future
        .success(|_| panic!("500 must not succeed"))
        .failure(move |failure| *s.lock() = Some(failure.clone()));

    assert_eq!(future.wait(Some(WAIT)), WaitStatus::Resolved);
    let failure = seen.lock().take().expect("failure callback ran");
    assert_eq!(failure.status(), Some(500));
    assert_eq!(failure.body_text().as_deref(), Some("server error"));
    assert!(matches!(
        failure.error,
        DeliveryError::Status { code: 500, .. }
    ));
}

#[rstest]
fn created_response_resolves_parsed_object(batch: BulkRequest) {
    let (client, _rx) = serve(vec![MockResponse::new(201, r#"{"ok":true}"#)]);
    let seen: Arc<Mutex<Option<JsonObject>>> = Arc::new(Mutex::new(None));
    let s = Arc::clone(&seen);
    let future = client.execute(&batch);
    future.success(move |object| *s.lock() = Some(object.clone()));

    assert_eq!(future.wait(Some(WAIT)), WaitStatus::Resolved);
    let object = seen.lock().take().expect("success callback ran");
    assert_eq!(Value::Object(object), json!({"ok": true}));
}

#[rstest]
fn empty_success_body_resolves_empty_object(batch: BulkRequest) {
    let (client, _rx) = serve(vec![MockResponse::new(200, "")]);
    let outcome = client.execute_blocking(&batch).expect("200 succeeds");
    assert!(outcome.is_empty());
}

#[rstest]
fn transport_error_has_no_response(batch: BulkRequest) {
    let client = client_for(format!("http://{}", closed_port_addr()));
    let failure = client
        .execute_blocking(&batch)
        .expect_err("nothing is listening");
    assert!(matches!(failure.error, DeliveryError::Transport(_)));
    assert!(failure.response.is_none());
    assert!(failure.body.is_none());
}

#[rstest]
fn execute_returns_before_response(batch: BulkRequest) {
    let (client, _rx) =
        serve(vec![MockResponse::new(200, "{}").delayed(Duration::from_millis(300))]);
    let future = client.execute(&batch);
    assert!(!future.is_resolved());
    assert_eq!(
        future.wait(Some(Duration::from_millis(20))),
        WaitStatus::TimedOut
    );
    assert_eq!(future.wait(Some(WAIT)), WaitStatus::Resolved);
    assert!(matches!(future.outcome(), Some(Ok(_))));
}

#[rstest]
fn callbacks_run_on_io_thread(batch: BulkRequest) {
    let (client, _rx) =
        serve(vec![MockResponse::new(200, "{}").delayed(Duration::from_millis(200))]);
    let thread_name = Arc::new(Mutex::new(None));
    let t = Arc::clone(&thread_name);
    let future = client.execute(&batch);
    future.always(move |_| {
        *t.lock() = std::thread::current().name().map(str::to_string);
    });
    future.wait(Some(WAIT));
    let name = thread_name.lock().clone().unwrap_or_default();
    assert!(name.starts_with("logship-io-"), "ran on {name}");
}

#[rstest]
fn execute_after_shutdown_resolves_closed(batch: BulkRequest) {
    let (client, _rx) = serve(Vec::new());
    client.shutdown();
    assert!(client.is_closed());
    let future = client.execute(&batch);
    assert!(future.is_resolved());
    assert!(matches!(
        future.outcome(),
        Some(Err(DeliveryFailure {
            error: DeliveryError::Closed,
            ..
        }))
    ));
}

#[rstest]
fn shutdown_delivers_queued_requests(batch: BulkRequest) {
    let (client, rx) = serve(vec![
        MockResponse::new(200, "{}"),
        MockResponse::new(200, "{}"),
    ]);
    let first = client.execute(&batch);
    let second = client.execute(&batch);
    client.shutdown();
    assert!(first.is_resolved());
    assert!(second.is_resolved());
    assert_eq!(rx.try_iter().count(), 2);
}

#[rstest]
fn exposes_normalised_settings() {
    let client = client_for("  http://logs.example.com/ ".into());
    assert_eq!(client.endpoint(), "http://logs.example.com");
    assert_eq!(client.index(), "tok123");
    assert_eq!(client.wait_timeout(), Duration::from_millis(5_000));
}

#[rstest]
fn redirect_is_reported_not_followed(batch: BulkRequest) {
    let (target, target_rx) = spawn_mock_server(local_listener(), vec![MockResponse::new(200, "{}")]);
    let (client, rx) = serve(vec![
        MockResponse::new(302, "").with_header("Location", &format!("http://{target}/_bulk")),
    ]);

    let failure = client
        .execute_blocking(&batch)
        .expect_err("3xx is not a success");

    assert!(matches!(
        failure.error,
        DeliveryError::Status { code: 302, .. }
    ));
    assert_eq!(failure.status(), Some(302));
    assert_eq!(rx.try_iter().count(), 1);
    assert!(target_rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[rstest]
fn panicking_callback_does_not_stall_the_worker(batch: BulkRequest) {
    let (addr, _rx) = spawn_mock_server(
        local_listener(),
        vec![
            MockResponse::new(200, "{}").delayed(Duration::from_millis(200)),
            MockResponse::new(200, r#"{"second":true}"#),
        ],
    );
    let client = DeliveryClientBuilder::new()
        .with_endpoint(format!("http://{addr}/"))
        .with_index("tok123")
        .with_io_threads(1)
        .build()
        .expect("client builds");

    let first = client.execute(&batch);
    first.success(|_| panic!("caller callback failed"));
    let second = client.execute(&batch);

    assert_eq!(first.wait(Some(WAIT)), WaitStatus::Resolved);
    assert_eq!(second.wait(Some(WAIT)), WaitStatus::Resolved);
    let Some(Ok(object)) = second.outcome() else {
        panic!("second request should succeed: {:?}", second.outcome());
    };
    assert_eq!(object.get("second"), Some(&Value::Bool(true)));
}

#[rstest]
fn abandoned_request_resolves_closed() {
    let (future, resolver) = BulkFuture::pending();
    drop(PendingRequest {
        body: String::new(),
        document_count: 0,
        resolver,
    });
    assert!(matches!(
        future.outcome(),
        Some(Err(DeliveryFailure {
            error: DeliveryError::Closed,
            ..
        }))
    ));
}
