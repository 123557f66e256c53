//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use safety_shield::http::{AppState, HttpServer};
use safety_shield::store::MemoryStore;
use safety_shield::upstream::HttpUpstream;
use safety_shield::{ShieldConfig, Shutdown};

pub const ADMIN_KEY: &str = "test-admin-key";

/// One scripted upstream answer.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub delay: Duration,
}

impl MockReply {
    pub fn ok(body: &str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Handle to a running mock upstream.
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub calls: Arc<AtomicUsize>,
    pub peak_in_flight: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Start a programmable upstream on an ephemeral port.
///
/// `reply` receives the zero-based call index and the request line.
pub async fn start_mock_upstream<F>(reply: F) -> MockUpstream
where
    F: Fn(usize, &str) -> MockReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let reply = Arc::new(reply);

    let (c, f, p) = (calls.clone(), in_flight.clone(), peak.clone());
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let (calls, in_flight, peak, reply) = (c.clone(), f.clone(), p.clone(), reply.clone());
            tokio::spawn(async move {
                let Some(request_line) = read_request_head(&mut socket).await else {
                    return;
                };
                let index = calls.fetch_add(1, Ordering::SeqCst);
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);

                let scripted = reply(index, &request_line);
                tokio::time::sleep(scripted.delay).await;

                let mut response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                    scripted.status,
                    reason(scripted.status),
                    scripted.body.len()
                );
                for (name, value) in &scripted.headers {
                    response.push_str(&format!("{}: {}\r\n", name, value));
                }
                response.push_str("\r\n");
                response.push_str(&scripted.body);

                in_flight.fetch_sub(1, Ordering::SeqCst);
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockUpstream {
        addr,
        calls,
        peak_in_flight: peak,
    }
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    head.lines().next().map(str::to_string)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

/// A shield served on an ephemeral port with an in-memory store.
pub struct TestShield {
    pub addr: SocketAddr,
    pub kv: Arc<MemoryStore>,
    pub state: AppState,
    pub shutdown: Shutdown,
}

impl TestShield {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn gateway(&self, path_and_query: &str) -> String {
        format!("http://{}/api/proxy{}", self.addr, path_and_query)
    }
}

impl Drop for TestShield {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_shield<F>(upstream: SocketAddr, tweak: F) -> TestShield
where
    F: FnOnce(&mut ShieldConfig),
{
    let mut config = ShieldConfig::default();
    config.upstream.base_url = format!("http://{}", upstream);
    config.upstream.token = Some("test-token".to_string());
    config.upstream.timeout_secs = 5;
    config.auth.admin_key = ADMIN_KEY.to_string();
    config.observability.metrics_enabled = false;
    tweak(&mut config);

    let kv = Arc::new(MemoryStore::new());
    let upstream = Arc::new(HttpUpstream::new(&config.upstream).unwrap());
    let server = HttpServer::new(config, kv.clone(), upstream);
    let state = server.state().clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, &server_shutdown).await;
    });

    TestShield {
        addr,
        kv,
        state,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
