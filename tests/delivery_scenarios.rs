//! End-to-end delivery against a local mock endpoint.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use logship::test_utils::mock_server::{MockResponse, local_listener, spawn_mock_server};
use logship::{
    BulkRequest, DeliveryClient, DeliveryClientBuilder, DeliveryError, Document, LogshipConfig,
    WaitStatus,
};
use rstest::rstest;
use serde_json::{Value, json};
use tempfile::NamedTempFile;

const WAIT: Duration = Duration::from_secs(5);

fn client(addr: std::net::SocketAddr) -> DeliveryClient {
    DeliveryClientBuilder::new()
        .with_endpoint(format!("http://{addr}/"))
        .with_index("tok123")
        .build()
        .expect("client builds")
}

#[rstest]
fn single_document_body_matches_wire_format() {
    let (addr, rx) = spawn_mock_server(local_listener(), vec![MockResponse::new(201, "{}")]);
    let client = client(addr);
    let batch = BulkRequest::from_documents([Document::new("{\"a\":1}", "t1")]);

    client.execute_blocking(&batch).expect("delivered");

    let request = rx.recv_timeout(WAIT).expect("request captured");
    assert_eq!(
        request.body,
        "{\"index\":{\"_index\":\"tok123\",\"_type\":\"t1\"}}\n{\"a\":1}\n"
    );
}

#[rstest]
#[case(500, "server error")]
#[case(429, "")]
#[case(404, "{\"error\":\"no such index\"}")]
#[case(300, "")]
#[case(301, "moved")]
#[case(302, "")]
fn non_2xx_responses_fail_with_status(#[case] status: u16, #[case] body: &str) {
    let (addr, _rx) = spawn_mock_server(local_listener(), vec![MockResponse::new(status, body)]);
    let client = client(addr);
    let batch = BulkRequest::from_documents([Document::new("{}", "t")]);

    let failure = client.execute_blocking(&batch).expect_err("rejected");

    assert_eq!(failure.status(), Some(status));
    assert!(matches!(failure.error, DeliveryError::Status { code, .. } if code == status));
    let expected_body = (!body.is_empty()).then(|| body.to_string());
    assert_eq!(failure.body_text(), expected_body);
}

#[rstest]
#[case(201, r#"{"ok":true}"#, json!({"ok": true}))]
#[case(200, "", json!({}))]
#[case(200, r#"{"took":3,"errors":false}"#, json!({"took": 3, "errors": false}))]
#[case(204, "", json!({}))]
#[case(299, r#"{"edge":true}"#, json!({"edge": true}))]
fn success_responses_resolve_parsed_object(
    #[case] status: u16,
    #[case] body: &str,
    #[case] expected: Value,
) {
    let (addr, _rx) = spawn_mock_server(local_listener(), vec![MockResponse::new(status, body)]);
    let client = client(addr);
    let batch = BulkRequest::from_documents([Document::new("{}", "t")]);

    let object = client.execute_blocking(&batch).expect("delivered");

    assert_eq!(Value::Object(object), expected);
}

#[rstest]
fn concurrent_batches_resolve_independently() {
    let responses = (0..4).map(|_| MockResponse::new(200, "{}")).collect();
    let (addr, rx) = spawn_mock_server(local_listener(), responses);
    let client = client(addr);
    let completed = Arc::new(AtomicUsize::new(0));

    let futures: Vec<_> = (0..4)
        .map(|n| {
            let batch = BulkRequest::from_documents([Document::new(format!("{{\"n\":{n}}}"), "t")]);
            let future = client.execute(&batch);
            let done = Arc::clone(&completed);
            future.always(move |_| {
                done.fetch_add(1, Ordering::SeqCst);
            });
            future
        })
        .collect();

    for future in &futures {
        assert_eq!(future.wait(Some(WAIT)), WaitStatus::Resolved);
    }
    assert_eq!(completed.load(Ordering::SeqCst), 4);
    assert_eq!(rx.try_iter().count(), 4);
}

#[rstest]
fn client_built_from_ini_file_delivers() {
    let (addr, rx) = spawn_mock_server(local_listener(), vec![MockResponse::new(200, "{}")]);
    let mut file = NamedTempFile::new().expect("create temp ini file");
    write!(
        file,
        "[delivery]\nendpoint = http://{addr}/\nindex = from-file\nio_threads = 1\ncapacity = 4\n"
    )
    .expect("write ini contents");

    let config = LogshipConfig::from_ini_file(file.path()).expect("load config");
    let client = config.delivery().build().expect("client builds");
    let batch = BulkRequest::from_documents([Document::new("{}", "t")]);
    client.execute_blocking(&batch).expect("delivered");

    let request = rx.recv_timeout(WAIT).expect("request captured");
    assert!(request.body.starts_with("{\"index\":{\"_index\":\"from-file\""));
}
