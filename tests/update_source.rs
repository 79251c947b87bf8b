use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use third_eye_shell_lib::update::{HttpUpdateSource, UpdateEvent, UpdateSource};

const PAYLOAD: &[u8] = b"#!/bin/sh\necho installing the third eye\n";

async fn serve_release(version: &str, sha256: Option<String>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let manifest = json!({
        "version": version,
        "url": format!("{}/download/setup.bin", base),
        "sha256": sha256,
        "notes": "Faster alert polling",
    });
    let router = Router::new()
        .route(
            "/latest.json",
            get(move || {
                let manifest = manifest.clone();
                async move { Json(manifest) }
            }),
        )
        .route("/download/setup.bin", get(|| async { PAYLOAD }));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    base
}

fn payload_digest() -> String {
    format!("{:x}", Sha256::digest(PAYLOAD))
}

async fn run_check(source: &HttpUpdateSource) -> Vec<UpdateEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    source.check(tx).await;
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn newer_release_is_downloaded_and_verified() {
    let base = serve_release("9.9.9", Some(payload_digest())).await;
    let dir = tempfile::tempdir().unwrap();
    let source =
        HttpUpdateSource::new(format!("{}/latest.json", base), "1.0.0", dir.path()).unwrap();

    let events = run_check(&source).await;

    assert_eq!(events.first(), Some(&UpdateEvent::Checking));
    assert!(events.contains(&UpdateEvent::Available { version: "9.9.9".into() }));
    assert!(events.iter().any(|e| matches!(e, UpdateEvent::Downloading(d) if d.transferred > 0)));
    assert_eq!(
        events.last(),
        Some(&UpdateEvent::Downloaded { version: "9.9.9".into() })
    );

    let path = source.downloaded_path().unwrap();
    assert_eq!(path, dir.path().join("setup.bin"));
    assert_eq!(std::fs::read(&path).unwrap(), PAYLOAD);
}

#[tokio::test]
async fn checksum_mismatch_discards_the_download() {
    let base = serve_release("9.9.9", Some("0".repeat(64))).await;
    let dir = tempfile::tempdir().unwrap();
    let source =
        HttpUpdateSource::new(format!("{}/latest.json", base), "1.0.0", dir.path()).unwrap();

    let events = run_check(&source).await;

    match events.last() {
        Some(UpdateEvent::Error(message)) => assert!(message.contains("checksum")),
        other => panic!("expected checksum error, got {:?}", other),
    }
    assert!(source.downloaded_path().is_none());
    assert!(!dir.path().join("setup.bin").exists());
}

#[tokio::test]
async fn current_release_is_not_an_update() {
    let base = serve_release("1.0.0", None).await;
    let dir = tempfile::tempdir().unwrap();
    let source =
        HttpUpdateSource::new(format!("{}/latest.json", base), "1.0.0", dir.path()).unwrap();

    let events = run_check(&source).await;

    assert_eq!(events, vec![UpdateEvent::Checking, UpdateEvent::NotAvailable]);
    assert!(source.downloaded_path().is_none());
}

#[tokio::test]
async fn missing_manifest_reports_an_error() {
    let base = serve_release("9.9.9", None).await;
    let dir = tempfile::tempdir().unwrap();
    let source =
        HttpUpdateSource::new(format!("{}/nope.json", base), "1.0.0", dir.path()).unwrap();

    let events = run_check(&source).await;

    assert_eq!(
        events.last(),
        Some(&UpdateEvent::Error("update server returned HTTP 404".into()))
    );
}
