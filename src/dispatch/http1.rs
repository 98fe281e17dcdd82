// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP/1.1 dispatcher over tokio, rustls and hyper.
//!
//! Each exchange is driven on the calling task (the hyper connection is not
//! spawned), so every hook fires inside the caller's `round_trip().await`.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONNECTION, HOST};
use http::{HeaderValue, Request, Response, Version};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use super::pool::{Pool, PoolKey, PooledConn};
use super::stream::{FirstByteSlot, MaybeTlsStream, WatchedStream};
use super::Dispatch;
use crate::error::DispatchError;
use crate::trace::hooks::{
    client_trace, ClientTrace, DnsDoneInfo, DnsStartInfo, GotConnInfo, TlsState,
};

const NETWORK_TCP: &str = "tcp";

/// Where a request goes.
#[derive(Debug, Clone)]
struct Target {
    tls: bool,
    host: String,
    port: u16,
}

impl Target {
    fn from_uri(uri: &http::Uri) -> Result<Self, DispatchError> {
        let tls = match uri.scheme_str() {
            Some("http") => false,
            Some("https") => true,
            Some(other) => return Err(DispatchError::UnsupportedScheme(other.to_string())),
            None => return Err(DispatchError::InvalidRequest(format!("URL has no scheme: {uri}"))),
        };
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DispatchError::InvalidRequest(format!("URL has no host: {uri}")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });
        Ok(Self { tls, host, port })
    }

    fn is_default_port(&self) -> bool {
        self.port == if self.tls { 443 } else { 80 }
    }

    fn bracketed_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }

    fn host_port(&self) -> String {
        format!("{}:{}", self.bracketed_host(), self.port)
    }

    fn host_header(&self) -> String {
        if self.is_default_port() {
            self.bracketed_host()
        } else {
            self.host_port()
        }
    }

    fn key(&self) -> PoolKey {
        PoolKey {
            tls: self.tls,
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Dispatches requests over pooled HTTP/1.1 connections, reporting every
/// phase to the request's [`ClientTrace`].
pub struct HttpDispatcher {
    tls: TlsConnector,
    pool: Pool,
}

impl HttpDispatcher {
    /// Create a dispatcher trusting the bundled web PKI roots.
    pub fn new() -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self::with_tls_config(config)
    }

    /// Create a dispatcher with a custom TLS configuration.
    ///
    /// ALPN is pinned to `http/1.1`.
    pub fn with_tls_config(mut config: ClientConfig) -> Self {
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Self {
            tls: TlsConnector::from(Arc::new(config)),
            pool: Pool::default(),
        }
    }

    /// Number of idle pooled connections for an origin.
    pub fn idle_connections(&self, uri: &http::Uri) -> usize {
        Target::from_uri(uri).map_or(0, |t| self.pool.idle_count(&t.key()))
    }

    async fn resolve(
        &self,
        target: &Target,
        trace: &ClientTrace,
    ) -> Result<Vec<SocketAddr>, DispatchError> {
        // IP literals need no lookup and report no DNS phase
        if let Ok(ip) = target.host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, target.port)]);
        }

        trace.dns_start(&DnsStartInfo {
            host: target.host.clone(),
        });
        match tokio::net::lookup_host((target.host.as_str(), target.port)).await {
            Ok(found) => {
                let addrs: Vec<SocketAddr> = found.collect();
                let ips: Vec<IpAddr> = addrs.iter().map(SocketAddr::ip).collect();
                if addrs.is_empty() {
                    let err = io::Error::new(io::ErrorKind::NotFound, "no addresses found");
                    trace.dns_done(&DnsDoneInfo {
                        addrs: &ips,
                        err: Some(&err),
                    });
                    return Err(DispatchError::Dns {
                        host: target.host.clone(),
                        source: err,
                    });
                }
                trace.dns_done(&DnsDoneInfo {
                    addrs: &ips,
                    err: None,
                });
                Ok(addrs)
            }
            Err(err) => {
                trace.dns_done(&DnsDoneInfo {
                    addrs: &[],
                    err: Some(&err),
                });
                Err(DispatchError::Dns {
                    host: target.host.clone(),
                    source: err,
                })
            }
        }
    }

    async fn dial(
        &self,
        addrs: &[SocketAddr],
        trace: &ClientTrace,
    ) -> Result<TcpStream, DispatchError> {
        let mut last_err = None;
        for addr in addrs {
            let addr_str = addr.to_string();
            trace.connect_start(NETWORK_TCP, &addr_str);
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    trace.connect_done(NETWORK_TCP, &addr_str, None);
                    return Ok(stream);
                }
                Err(err) => {
                    trace.connect_done(NETWORK_TCP, &addr_str, Some(&err));
                    last_err = Some((addr_str, err));
                }
            }
        }

        let (addr, source) = last_err.unwrap_or_else(|| {
            (
                String::new(),
                io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses to dial"),
            )
        });
        Err(DispatchError::Connect { addr, source })
    }

    async fn handshake(
        &self,
        target: &Target,
        tcp: TcpStream,
        trace: &ClientTrace,
    ) -> Result<TlsStream<TcpStream>, DispatchError> {
        let tls_err = |source: io::Error| DispatchError::Tls {
            host: target.host.clone(),
            source,
        };
        let server_name = ServerName::try_from(target.host.clone())
            .map_err(|e| tls_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        trace.tls_handshake_start();
        match self.tls.connect(server_name, tcp).await {
            Ok(stream) => {
                let (_, session) = stream.get_ref();
                let state = TlsState {
                    server_name: target.host.clone(),
                    version: session.protocol_version().map(|v| format!("{v:?}")),
                    cipher_suite: session
                        .negotiated_cipher_suite()
                        .map(|s| format!("{:?}", s.suite())),
                    alpn: session
                        .alpn_protocol()
                        .map(|p| String::from_utf8_lossy(p).into_owned()),
                };
                trace.tls_handshake_done(&state, None);
                Ok(stream)
            }
            Err(err) => {
                let state = TlsState {
                    server_name: target.host.clone(),
                    ..Default::default()
                };
                trace.tls_handshake_done(&state, Some(&err));
                Err(tls_err(err))
            }
        }
    }

    async fn connect(
        &self,
        target: &Target,
        trace: &ClientTrace,
    ) -> Result<PooledConn, DispatchError> {
        let addrs = self.resolve(target, trace).await?;
        let tcp = self.dial(&addrs, trace).await?;
        let remote_addr = tcp.peer_addr()?;
        tcp.set_nodelay(true)?;

        let stream = if target.tls {
            MaybeTlsStream::Tls(Box::new(self.handshake(target, tcp, trace).await?))
        } else {
            MaybeTlsStream::Plain(tcp)
        };

        let first_byte = FirstByteSlot::default();
        let io = TokioIo::new(WatchedStream::new(stream, first_byte.clone()));
        let (sender, driver) = hyper::client::conn::http1::handshake(io).await?;

        Ok(PooledConn {
            sender,
            driver: Box::pin(driver),
            first_byte,
            remote_addr,
            uses: 0,
        })
    }
}

impl Default for HttpDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite a client request into the origin-form hyper expects on a raw
/// connection, registering the informational-response hook.
fn prepare(
    req: Request<Bytes>,
    target: &Target,
    trace: &ClientTrace,
) -> Result<Request<Full<Bytes>>, DispatchError> {
    let (mut parts, body) = req.into_parts();

    let path = parts
        .uri
        .path_and_query()
        .map_or("/", |pq| pq.as_str())
        .to_string();
    parts.uri = path
        .parse()
        .map_err(|e: http::uri::InvalidUri| DispatchError::InvalidRequest(e.to_string()))?;
    parts.version = Version::HTTP_11;
    if !parts.headers.contains_key(HOST) {
        let host = HeaderValue::from_str(&target.host_header())
            .map_err(|e| DispatchError::InvalidRequest(e.to_string()))?;
        parts.headers.insert(HOST, host);
    }

    let mut req = Request::from_parts(parts, Full::new(body));
    if trace.got_1xx_response.is_some() {
        let trace = trace.clone();
        hyper::ext::on_informational(&mut req, move |res| {
            trace.got_1xx_response(res.status(), res.headers());
        });
    }
    Ok(req)
}

/// Send one request and buffer its response, driving the connection on
/// this task. Also reports whether the connection is still usable.
async fn exchange(
    conn: &mut PooledConn,
    req: Request<Full<Bytes>>,
) -> Result<(Response<Bytes>, bool), hyper::Error> {
    let PooledConn { sender, driver, .. } = conn;

    let send = async {
        sender.ready().await?;
        let response = sender.send_request(req).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok::<_, hyper::Error>(Response::from_parts(parts, body))
    };
    tokio::pin!(send);

    let mut driver_done = false;
    loop {
        tokio::select! {
            res = &mut send => return res.map(|r| (r, !driver_done)),
            res = driver.as_mut(), if !driver_done => {
                driver_done = true;
                if let Err(e) = res {
                    tracing::debug!(error = %e, "connection closed with error");
                }
            }
        }
    }
}

fn wants_close(response: &Response<Bytes>) -> bool {
    response.version() == Version::HTTP_10
        || response
            .headers()
            .get(CONNECTION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
}

#[async_trait]
impl Dispatch for HttpDispatcher {
    async fn round_trip(&self, req: Request<Bytes>) -> Result<Response<Bytes>, DispatchError> {
        let trace = client_trace(&req).cloned().unwrap_or_default();
        let target = Target::from_uri(req.uri())?;
        let key = target.key();

        trace.get_conn(&target.host_port());
        let (mut conn, idle_time) = match self.pool.take(&key) {
            Some((conn, idle)) => (conn, Some(idle)),
            None => (self.connect(&target, &trace).await?, None),
        };
        trace.got_conn(&GotConnInfo {
            remote_addr: conn.remote_addr,
            reused: conn.uses > 0,
            was_idle: idle_time.is_some(),
            idle_time: idle_time.unwrap_or_default(),
        });

        let req = prepare(req, &target, &trace)?;
        conn.first_byte.arm(trace.got_first_response_byte.clone());
        let result = exchange(&mut conn, req).await;
        conn.first_byte.arm(None);

        let (response, reusable) = result?;
        conn.uses += 1;
        if reusable && !wants_close(&response) {
            self.pool.put(key, conn);
        }
        Ok(response)
    }
}
