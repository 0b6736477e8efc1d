#![allow(dead_code)]

use std::{
    io::Cursor,
    net::{SocketAddr, TcpListener},
    path::PathBuf,
    sync::Arc,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::Engine as _;
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb};
use plantid_web::{
    config::Config,
    decoded::DecodedImage,
    engine::{EngineOutput, EngineStatus, PlantIdentifier},
    envelope::RankedEntry,
    error::EngineError,
    router, AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;

/// Engine stand-in that ranks made-up species by position.
pub struct FakeEngine;

#[async_trait]
impl PlantIdentifier for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn identify(
        &self,
        _image: &DecodedImage,
        topk: usize,
    ) -> Result<EngineOutput, EngineError> {
        let ranked = |prefix: &str| -> Vec<RankedEntry> {
            (0..topk)
                .map(|i| RankedEntry {
                    chinese_name: format!("{prefix}{i}"),
                    latin_name: format!("{prefix} latin {i}"),
                    probability: 0.5 / (i as f32 + 1.0),
                })
                .collect()
        };
        Ok(EngineOutput {
            status: EngineStatus::Completed,
            results: ranked("species"),
            family_results: ranked("family"),
            genus_results: ranked("genus"),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub static_dir: PathBuf,
    _tmp: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let static_dir = tmp.path().join("static");
        let mut config = Config {
            static_dir: static_dir.clone(),
            ..Config::default()
        };
        tweak(&mut config);
        let state = AppState::new(config, Arc::new(FakeEngine)).unwrap();
        Self {
            router: router(Arc::new(state)),
            static_dir,
            _tmp: tmp,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, body.to_vec())
    }

    pub async fn post_api(&self, image_b64: &str) -> serde_json::Value {
        let body = format!("image={}", form_encode(image_b64));
        let request = Request::builder()
            .method("POST")
            .uri("/api/plant")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        let (status, body) = self.send(request).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&body).unwrap()
    }

    pub async fn post_multipart(&self, uri: &str, parts: &[Part<'_>]) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_browser(&self, parts: &[Part<'_>]) -> (StatusCode, String) {
        let (status, body) = self.post_multipart("/", parts).await;
        (status, String::from_utf8(body).unwrap())
    }

    /// Put a regular file where the image directory `sub` would be created,
    /// so writes below it fail.
    pub fn block_dir(&self, sub: &str) {
        std::fs::create_dir_all(&self.static_dir).unwrap();
        std::fs::write(self.static_dir.join(sub), b"").unwrap();
    }

    pub fn files_in(&self, sub: &str) -> Vec<PathBuf> {
        match std::fs::read_dir(self.static_dir.join(sub)) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub enum Part<'a> {
    File {
        name: &'a str,
        filename: &'a str,
        bytes: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

const BOUNDARY: &str = "plantid-test-boundary";

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File {
                name,
                filename,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn form_encode(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D")
        .replace('&', "%26")
}

pub fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

pub fn encode(image: &DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient(width, height), ImageOutputFormat::Jpeg(90))
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient(width, height), ImageOutputFormat::Png)
}

pub fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Serve `router` on an ephemeral localhost port.
pub fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(router.into_make_service())
            .await
            .unwrap();
    });
    addr
}

/// Serve `bytes` at `/file` after waiting `delay`.
pub fn serve_slowly(bytes: Vec<u8>, delay: std::time::Duration) -> SocketAddr {
    let router = Router::new().route(
        "/file",
        axum::routing::get(move || {
            let bytes = bytes.clone();
            async move {
                tokio::time::sleep(delay).await;
                bytes
            }
        }),
    );
    spawn_server(router)
}

/// Serve fixed bytes at `/file`.
pub fn serve_bytes(bytes: Vec<u8>) -> SocketAddr {
    let router = Router::new().route(
        "/file",
        axum::routing::get(move || {
            let bytes = bytes.clone();
            async move { bytes }
        }),
    );
    spawn_server(router)
}
