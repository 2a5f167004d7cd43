//! Lifecycle tests for [`Application`] with in-memory dependencies.
//!
//! The HTTP side is exercised over a real socket bound to an ephemeral port.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use order_service::{Application, Config};
use order_stream_core::OrderStore;
use order_stream_testing::fixtures::sample_order;
use order_stream_testing::{InMemoryMessageSource, InMemoryOrderStore, RecordingFailureSink};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

fn test_config() -> Config {
    let static_dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../web/static");
    Config::from_lookup(|key| match key {
        "STATIC_DIR" => Some(static_dir.to_string()),
        "KAFKA_FETCH_TIMEOUT_MS" => Some("20".to_string()),
        "INGEST_RETRY_DELAY_MS" => Some("20".to_string()),
        "CACHE_RESTORE_TIMEOUT" => Some("2".to_string()),
        "SHUTDOWN_TIMEOUT" => Some("5".to_string()),
        _ => None,
    })
    .unwrap()
}

async fn application(
    store: &Arc<InMemoryOrderStore>,
    source: &Arc<InMemoryMessageSource>,
) -> Application {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    Application::new(test_config(), listener, store.clone(), source.clone())
}

/// Minimal HTTP/1.1 GET; returns the status code and body.
async fn http_get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let response = String::from_utf8_lossy(&raw).into_owned();

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status line");
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

#[tokio::test]
async fn test_serves_restored_and_ingested_orders() {
    let store = Arc::new(InMemoryOrderStore::with_orders([sample_order("restored")]));
    let source = Arc::new(InMemoryMessageSource::new("orders"));
    let app = application(&store, &source).await;
    let addr = app.local_addr().unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(app.run_until(async {
        let _ = stop_rx.await;
    }));

    let (status, body) = http_get(addr, "/order/restored").await;
    assert_eq!(status, 200);
    assert!(body.contains("\"order_uid\":\"restored\""));
    assert_eq!(store.read_count(), 0, "restored order must be served from cache");

    source.push_order(&sample_order("A1"));
    assert!(source.wait_for_commits(1, Duration::from_secs(5)).await);

    let (status, _) = http_get(addr, "/order/A1").await;
    assert_eq!(status, 200);
    assert!(store.get("A1").is_some());

    let (status, body) = http_get(addr, "/order/unknown").await;
    assert_eq!(status, 404);
    assert!(body.contains("NOT_FOUND"));

    let (status, body) = http_get(addr, "/ready").await;
    assert_eq!(status, 200);
    assert!(body.contains("\"store_orders\":2"));

    stop_tx.send(()).unwrap();
    running.await.unwrap().expect("clean shutdown");

    assert!(source.is_closed());
}

#[tokio::test]
async fn test_restore_failure_is_fatal_and_releases_source() {
    let store = Arc::new(InMemoryOrderStore::new());
    store.fail_reads(true);
    let source = Arc::new(InMemoryMessageSource::new("orders"));
    let app = application(&store, &source).await;

    let result = app.run_until(std::future::pending()).await;

    let err = result.expect_err("startup must fail");
    assert!(err.to_string().contains("restore"));
    assert!(source.is_closed());
    assert_eq!(store.create_count(), 0);
}

#[tokio::test]
async fn test_slow_restore_hits_deadline() {
    let store = Arc::new(InMemoryOrderStore::new());
    store.set_read_delay(Duration::from_secs(10));
    let source = Arc::new(InMemoryMessageSource::new("orders"));
    let app = application(&store, &source).await;

    let result = tokio::time::timeout(
        Duration::from_secs(8),
        app.run_until(std::future::pending()),
    )
    .await
    .expect("restore deadline should fire first");

    assert!(result.is_err());
}

#[tokio::test]
async fn test_skipped_messages_reach_failure_sink() {
    let store = Arc::new(InMemoryOrderStore::new());
    let source = Arc::new(InMemoryMessageSource::new("orders"));
    let sink = Arc::new(RecordingFailureSink::new());
    let app = application(&store, &source).await.with_failure_sink(sink.clone());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(app.run_until(async {
        let _ = stop_rx.await;
    }));

    source.push_raw(b"not json".to_vec());
    source.push_order(&sample_order("ok"));
    assert!(source.wait_for_commits(2, Duration::from_secs(5)).await);

    stop_tx.send(()).unwrap();
    running.await.unwrap().unwrap();

    assert_eq!(sink.records().len(), 1);
    assert_eq!(store.find_all_ids().await.unwrap(), vec!["ok".to_string()]);
}
