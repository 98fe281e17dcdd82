// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared fixtures: a capturing log layer, a local HTTP server and a
//! scripted dispatcher.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Request, Response, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use whathappens::dispatch::Dispatch;
use whathappens::trace::{client_trace, DnsDoneInfo, DnsStartInfo, GotConnInfo, TlsState};
use whathappens::DispatchError;

/// A log event seen by [`CaptureLayer`].
#[derive(Debug, Clone, Default)]
pub struct CapturedEvent {
    pub message: String,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(|v| v.parse().ok())
    }
}

struct EventVisitor<'a>(&'a mut CapturedEvent);

impl Visit for EventVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.0.message = rendered;
        } else {
            self.0.fields.insert(field.name().to_string(), rendered);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.fields.insert(field.name().to_string(), value.to_string());
    }
}

/// Collects events from this crate's modules.
#[derive(Clone, Default)]
pub struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureLayer {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Event messages in order, without debug-level chatter.
    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.message).collect()
    }

    pub fn named(&self, message: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message == message)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if !meta.target().starts_with("whathappens") || *meta.level() > tracing::Level::INFO {
            return;
        }
        let mut captured = CapturedEvent::default();
        event.record(&mut EventVisitor(&mut captured));
        self.events.lock().unwrap().push(captured);
    }
}

/// Route this thread's events into a fresh [`CaptureLayer`].
pub fn capture() -> (CaptureLayer, tracing::subscriber::DefaultGuard) {
    let layer = CaptureLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (layer, guard)
}

/// A plain HTTP/1.1 response with a body and keep-alive.
pub fn ok(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: text/plain\r\n\r\n{body}",
        body.len()
    )
}

pub fn redirect(status: u16, location: &str) -> String {
    format!("HTTP/1.1 {status} Redirect\r\nLocation: {location}\r\nContent-Length: 0\r\n\r\n")
}

/// Request heads received by a server, in arrival order.
#[derive(Clone, Default)]
pub struct Received {
    heads: Arc<Mutex<Vec<String>>>,
}

impl Received {
    pub fn heads(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }

    /// Value of header `name` in the `index`th request, if sent.
    pub fn header(&self, index: usize, name: &str) -> Option<String> {
        let heads = self.heads();
        heads.get(index)?.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim().to_string())
        })
    }
}

/// Serve raw responses chosen by request path, keeping connections open.
///
/// Returns the bound address; the server lives until the runtime stops.
pub async fn spawn_server<F>(handler: F) -> SocketAddr
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    spawn_recording_server(handler).await.0
}

/// Like [`spawn_server`], also keeping every request head it reads.
pub async fn spawn_recording_server<F>(handler: F) -> (SocketAddr, Received)
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);
    let received = Received::default();
    let log = received.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_connection(stream, handler.clone(), log.clone()));
        }
    });
    (addr, received)
}

async fn serve_connection<F>(mut stream: TcpStream, handler: Arc<F>, received: Received)
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let head_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
        buf.drain(..head_end);
        received.heads.lock().unwrap().push(head.clone());

        let path = head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or("/")
            .to_string();
        if stream.write_all(handler(&path).as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Accept connections and never answer.
pub async fn spawn_silent_server() -> SocketAddr {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

/// Write `reply` as soon as a connection is accepted, without reading.
pub async fn spawn_eager_server(reply: &'static str) -> SocketAddr {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.write_all(reply.as_bytes()).await;
            held.push(stream);
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    listener.local_addr().unwrap()
}

/// Dispatcher that plays a full HTTPS lifecycle against the request's hooks
/// without any network, then answers 200.
pub struct ScriptedHttps {
    pub informational: Vec<StatusCode>,
    pub step: Duration,
}

impl Default for ScriptedHttps {
    fn default() -> Self {
        Self {
            informational: Vec::new(),
            step: Duration::from_millis(2),
        }
    }
}

#[async_trait]
impl Dispatch for ScriptedHttps {
    async fn round_trip(&self, req: Request<Bytes>) -> Result<Response<Bytes>, DispatchError> {
        let trace = client_trace(&req).cloned().unwrap_or_default();
        let host = req.uri().host().unwrap_or("example.test").to_string();
        let ip = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7));
        let remote = SocketAddr::new(ip, 443);
        let remote_str = remote.to_string();

        if let Some(h) = &trace.get_conn {
            h(&format!("{host}:443"));
        }
        if let Some(h) = &trace.dns_start {
            h(&DnsStartInfo { host: host.clone() });
        }
        tokio::time::sleep(self.step).await;
        if let Some(h) = &trace.dns_done {
            h(&DnsDoneInfo {
                addrs: &[ip],
                err: None,
            });
        }
        if let Some(h) = &trace.connect_start {
            h("tcp", &remote_str);
        }
        tokio::time::sleep(self.step).await;
        if let Some(h) = &trace.connect_done {
            h("tcp", &remote_str, None::<&io::Error>);
        }
        if let Some(h) = &trace.tls_handshake_start {
            h();
        }
        tokio::time::sleep(self.step).await;
        if let Some(h) = &trace.tls_handshake_done {
            h(
                &TlsState {
                    server_name: host.clone(),
                    version: Some("TLSv1_3".to_string()),
                    cipher_suite: Some("TLS13_AES_128_GCM_SHA256".to_string()),
                    alpn: Some("http/1.1".to_string()),
                },
                None,
            );
        }
        if let Some(h) = &trace.got_conn {
            h(&GotConnInfo {
                remote_addr: remote,
                reused: false,
                was_idle: false,
                idle_time: Duration::ZERO,
            });
        }
        tokio::time::sleep(self.step).await;
        // the first byte of an informational response counts
        if let Some(h) = &trace.got_first_response_byte {
            h();
        }
        for code in &self.informational {
            if let Some(h) = &trace.got_1xx_response {
                h(*code, &HeaderMap::new());
            }
        }

        Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Bytes::from_static(b"hello"))
            .unwrap())
    }
}
