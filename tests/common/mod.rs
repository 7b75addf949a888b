//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use firecloud::config::FirecloudConfig;
use firecloud::http::HttpServer;
use firecloud::lifecycle::{build_handler, Shutdown};
use firecloud::proxy::{Fetch, ProxyError};

/// A mock upstream that answers every request with its own request head.
///
/// Responses carry a `Link` header so cache hits can be told apart.
pub struct EchoUpstream {
    pub addr: SocketAddr,
    pub calls: Arc<AtomicUsize>,
}

impl EchoUpstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub async fn start_echo_upstream() -> EchoUpstream {
    start_upstream("").await
}

/// Echo upstream whose responses also carry `extra_headers`, each line
/// terminated by `\r\n`.
pub async fn start_upstream(extra_headers: &'static str) -> EchoUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let counter = counter.clone();
                    tokio::spawn(async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        echo(socket, extra_headers).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    EchoUpstream { addr, calls }
}

async fn echo(mut socket: TcpStream, extra_headers: &str) {
    let head = match read_request(&mut socket).await {
        Some(head) => head,
        None => return,
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nLink: </next>; rel=next\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        extra_headers,
        head.len(),
        head
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Read one request, returning its head. The body is consumed and dropped.
async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut remaining = content_length.saturating_sub(buf.len() - head_end);
    while remaining > 0 {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        remaining = remaining.saturating_sub(n);
    }

    Some(head)
}

/// Config for project `demo` with everything pointed at `public_endpoint`.
pub fn config(public_endpoint: &str) -> FirecloudConfig {
    let mut config = FirecloudConfig::default();
    config.observability.metrics_enabled = false;
    config.firebase.project_id = "demo".to_string();
    config.firebase.public_endpoint = Some(public_endpoint.to_string());
    config
}

/// A running engine on an ephemeral port.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_server(config: &FirecloudConfig) -> RunningServer {
    let handler = build_handler(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, handler, shutdown.clone());
    let handle = tokio::spawn(server.run(listener));

    RunningServer {
        addr,
        shutdown,
        handle,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Records outbound requests instead of sending them.
#[derive(Default)]
pub struct RecordingFetch {
    pub uris: Mutex<Vec<String>>,
}

impl RecordingFetch {
    pub fn uris(&self) -> Vec<String> {
        self.uris.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for RecordingFetch {
    async fn fetch(&self, request: Request<Body>) -> Result<Response<Body>, ProxyError> {
        self.uris.lock().unwrap().push(request.uri().to_string());
        Ok(Response::new(Body::from("recorded")))
    }
}
