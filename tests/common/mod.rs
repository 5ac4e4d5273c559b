//! Shared test doubles: scripted vision models and a local bill server.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{routing::get, Router};
use medbill_extract::{Document, ModelFailure, ModelReply, VisionModel};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Smallest byte prefix that sniffs as PNG.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

pub const SCENARIO_1: &str = r#"{"pagewise_line_items":[{"page_no":"1","bill_items":[{"item_name":"Paracetamol","item_amount":50.0,"item_rate":5.0,"item_quantity":10.0}]}]}"#;

/// Always answers with the same text.
pub struct FixedModel {
    pub answer: String,
    pub calls: AtomicU32,
}

impl FixedModel {
    pub fn new(answer: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.into(),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionModel for FixedModel {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, _: &Document, _: &str) -> Result<ModelReply, ModelFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModelReply {
            content: self.answer.clone(),
            input_tokens: 1200,
            output_tokens: 80,
        })
    }
}

/// Never answers within any reasonable timeout.
pub struct SlowModel {
    pub delay: Duration,
    pub calls: AtomicU32,
}

impl SlowModel {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionModel for SlowModel {
    fn name(&self) -> &str {
        "slow"
    }

    async fn complete(&self, _: &Document, _: &str) -> Result<ModelReply, ModelFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(ModelReply::default())
    }
}

/// Fails every call with the given failure.
pub struct FailingModel {
    pub failure: ModelFailure,
    pub calls: AtomicU32,
}

impl FailingModel {
    pub fn new(failure: ModelFailure) -> Arc<Self> {
        Arc::new(Self {
            failure,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _: &Document, _: &str) -> Result<ModelReply, ModelFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.failure.clone())
    }
}

/// Route `tracing` output through the test harness; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("medbill_extract=debug")
        .with_test_writer()
        .try_init();
}

pub fn png_document() -> Document {
    Document::from_bytes("https://bills.test/bill.png", PNG_BYTES.to_vec())
        .expect("PNG magic sniffs")
}

/// Serve `bytes` at `/bill` on an ephemeral loopback port; returns the URL.
/// Every other path is a 404.
pub async fn serve_bill(bytes: &'static [u8]) -> String {
    let app = Router::new().route("/bill", get(move || async move { bytes }));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}/bill")
}

/// Like [`serve_bill`], but the handler sleeps for `delay` before answering.
pub async fn serve_slow_bill(bytes: &'static [u8], delay: Duration) -> String {
    let app = Router::new().route(
        "/bill",
        get(move || async move {
            tokio::time::sleep(delay).await;
            bytes
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}/bill")
}

/// Answer one request with `chunks` chunks of `chunk` using chunked transfer
/// encoding, so the response carries no `Content-Length`.
pub async fn serve_chunked_bill(chunk: &'static [u8], chunks: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let head = "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nTransfer-Encoding: chunked\r\n\r\n";
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        for _ in 0..chunks {
            let frame = format!("{:x}\r\n", chunk.len());
            if socket.write_all(frame.as_bytes()).await.is_err()
                || socket.write_all(chunk).await.is_err()
                || socket.write_all(b"\r\n").await.is_err()
            {
                return;
            }
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
    });
    format!("http://{addr}/bill")
}
