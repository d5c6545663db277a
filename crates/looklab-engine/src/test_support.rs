//! Fixtures shared by the engine's unit tests.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use looklab_contracts::images::{data_url, ImageHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::oracle::{
    AnalysisOracle, AnalysisReply, AnalysisRequest, Candidate, InlineImage, LookOracle, LookReply,
    LookRequest, NamedOracle, OracleFailure, ReplyPart,
};

/// A minimal HTTP server on tokio that answers one request with a canned body.
pub(crate) struct MockGeminiServer {
    listener: TcpListener,
    pub base_url: String,
}

pub(crate) struct CapturedRequest {
    pub head: String,
    pub body: String,
}

impl MockGeminiServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock server");
        let port = listener.local_addr().unwrap().port();
        Self {
            listener,
            base_url: format!("http://127.0.0.1:{port}"),
        }
    }

    /// Accepts one connection, drains the full request, answers, shuts down.
    pub async fn respond_once(self, status_code: u16, body: &str) -> CapturedRequest {
        let (mut stream, _) = self.listener.accept().await.unwrap();

        let mut raw = Vec::new();
        let mut buf = vec![0u8; 8192];
        let header_end = loop {
            let read = stream.read(&mut buf).await.unwrap();
            assert!(read > 0, "client closed before sending headers");
            raw.extend_from_slice(&buf[..read]);
            if let Some(pos) = raw.windows(4).position(|window| window == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while raw.len() < header_end + content_length {
            let read = stream.read(&mut buf).await.unwrap();
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..read]);
        }

        let response = format!(
            "HTTP/1.1 {status_code} OK\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n\
             {body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();

        CapturedRequest {
            head,
            body: String::from_utf8_lossy(&raw[header_end..]).to_string(),
        }
    }
}

/// Oracle stub returning canned replies; transfers can be held on a gate.
pub(crate) struct StubOracle {
    pub analysis: Result<AnalysisReply, OracleFailure>,
    pub look: Result<LookReply, OracleFailure>,
    pub look_calls: AtomicUsize,
    pub gate: Option<Arc<Notify>>,
}

impl StubOracle {
    pub fn new(
        analysis: Result<AnalysisReply, OracleFailure>,
        look: Result<LookReply, OracleFailure>,
    ) -> Self {
        Self {
            analysis,
            look,
            look_calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.look_calls.load(Ordering::SeqCst)
    }
}

impl NamedOracle for StubOracle {
    fn name(&self) -> &str {
        "stub"
    }
}

#[async_trait]
impl AnalysisOracle for StubOracle {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<AnalysisReply, OracleFailure> {
        self.analysis.clone()
    }
}

#[async_trait]
impl LookOracle for StubOracle {
    async fn transfer(&self, _request: &LookRequest) -> Result<LookReply, OracleFailure> {
        self.look_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.look.clone()
    }
}

pub(crate) fn metrics_reply(text: &str) -> Result<AnalysisReply, OracleFailure> {
    Ok(AnalysisReply {
        text: text.to_string(),
    })
}

pub(crate) fn image_reply(handle: &ImageHandle) -> Result<LookReply, OracleFailure> {
    let inline = InlineImage::from_handle(handle).unwrap();
    Ok(LookReply {
        candidates: vec![Candidate {
            parts: vec![ReplyPart::InlineImage(inline)],
            finish_reason: Some("STOP".to_string()),
        }],
        block_reason: None,
    })
}

pub(crate) fn png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub(crate) fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> ImageHandle {
    data_url::encode(&png_bytes(width, height, rgb), "image/png")
}
