// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lifecycle hooks and the per-request trace context.
//!
//! A [`ClientTrace`] is a set of optional callbacks the dispatch mechanism
//! invokes synchronously at each phase boundary. It travels with the request
//! in its [`http::Extensions`]; attach it with [`with_client_trace`].
//! A hook left as `None` is not instrumented at all, which is different from
//! one that is instrumented and reports zero.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, Request, StatusCode};

/// Argument to the DNS start hook.
#[derive(Debug, Clone)]
pub struct DnsStartInfo {
    pub host: String,
}

/// Argument to the DNS done hook.
#[derive(Debug)]
pub struct DnsDoneInfo<'a> {
    pub addrs: &'a [IpAddr],
    pub err: Option<&'a io::Error>,
}

/// Negotiated TLS parameters reported by the handshake done hook.
#[derive(Debug, Clone, Default)]
pub struct TlsState {
    pub server_name: String,
    pub version: Option<String>,
    pub cipher_suite: Option<String>,
    pub alpn: Option<String>,
}

/// Argument to the got-connection hook.
#[derive(Debug, Clone)]
pub struct GotConnInfo {
    pub remote_addr: SocketAddr,
    /// The connection was previously used for another request.
    pub reused: bool,
    /// The connection was taken from the idle pool.
    pub was_idle: bool,
    /// How long the connection sat idle, if `was_idle`.
    pub idle_time: Duration,
}

pub type GetConnHook = Arc<dyn Fn(&str) + Send + Sync>;
pub type DnsStartHook = Arc<dyn Fn(&DnsStartInfo) + Send + Sync>;
pub type DnsDoneHook = Arc<dyn for<'a> Fn(&DnsDoneInfo<'a>) + Send + Sync>;
pub type ConnectStartHook = Arc<dyn Fn(&str, &str) + Send + Sync>;
pub type ConnectDoneHook = Arc<dyn Fn(&str, &str, Option<&io::Error>) + Send + Sync>;
pub type TlsHandshakeStartHook = Arc<dyn Fn() + Send + Sync>;
pub type TlsHandshakeDoneHook = Arc<dyn Fn(&TlsState, Option<&io::Error>) + Send + Sync>;
pub type GotConnHook = Arc<dyn Fn(&GotConnInfo) + Send + Sync>;
pub type GotFirstResponseByteHook = Arc<dyn Fn() + Send + Sync>;
pub type Got1xxResponseHook = Arc<dyn Fn(StatusCode, &HeaderMap) + Send + Sync>;
pub type SignalHook = Arc<dyn Fn() + Send + Sync>;

/// Callbacks invoked by the dispatch mechanism during one request.
#[derive(Clone, Default)]
pub struct ClientTrace {
    /// Before a connection is obtained, with the target `host:port`.
    pub get_conn: Option<GetConnHook>,
    pub dns_start: Option<DnsStartHook>,
    pub dns_done: Option<DnsDoneHook>,
    /// Before each dial, with network kind and address.
    pub connect_start: Option<ConnectStartHook>,
    pub connect_done: Option<ConnectDoneHook>,
    pub tls_handshake_start: Option<TlsHandshakeStartHook>,
    pub tls_handshake_done: Option<TlsHandshakeDoneHook>,
    pub got_conn: Option<GotConnHook>,
    pub got_first_response_byte: Option<GotFirstResponseByteHook>,
    /// Once per informational (1xx) response received.
    pub got_1xx_response: Option<Got1xxResponseHook>,
    pub wrote_headers: Option<SignalHook>,
    pub wait_100_continue: Option<SignalHook>,
    pub wrote_request: Option<SignalHook>,
}

impl ClientTrace {
    pub(crate) fn get_conn(&self, host_port: &str) {
        if let Some(hook) = &self.get_conn {
            hook(host_port);
        }
    }

    pub(crate) fn dns_start(&self, info: &DnsStartInfo) {
        if let Some(hook) = &self.dns_start {
            hook(info);
        }
    }

    pub(crate) fn dns_done(&self, info: &DnsDoneInfo<'_>) {
        if let Some(hook) = &self.dns_done {
            hook(info);
        }
    }

    pub(crate) fn connect_start(&self, network: &str, addr: &str) {
        if let Some(hook) = &self.connect_start {
            hook(network, addr);
        }
    }

    pub(crate) fn connect_done(&self, network: &str, addr: &str, err: Option<&io::Error>) {
        if let Some(hook) = &self.connect_done {
            hook(network, addr, err);
        }
    }

    pub(crate) fn tls_handshake_start(&self) {
        if let Some(hook) = &self.tls_handshake_start {
            hook();
        }
    }

    pub(crate) fn tls_handshake_done(&self, state: &TlsState, err: Option<&io::Error>) {
        if let Some(hook) = &self.tls_handshake_done {
            hook(state, err);
        }
    }

    pub(crate) fn got_conn(&self, info: &GotConnInfo) {
        if let Some(hook) = &self.got_conn {
            hook(info);
        }
    }

    pub(crate) fn got_1xx_response(&self, code: StatusCode, headers: &HeaderMap) {
        if let Some(hook) = &self.got_1xx_response {
            hook(code, headers);
        }
    }

    /// Names of the hooks that are set, in lifecycle order.
    pub fn installed(&self) -> Vec<&'static str> {
        let slots: [(&'static str, bool); 13] = [
            ("GetConn", self.get_conn.is_some()),
            ("DNSStart", self.dns_start.is_some()),
            ("DNSDone", self.dns_done.is_some()),
            ("ConnectStart", self.connect_start.is_some()),
            ("ConnectDone", self.connect_done.is_some()),
            ("TLSHandshakeStart", self.tls_handshake_start.is_some()),
            ("TLSHandshakeDone", self.tls_handshake_done.is_some()),
            ("GotConn", self.got_conn.is_some()),
            ("WroteHeaders", self.wrote_headers.is_some()),
            ("Wait100Continue", self.wait_100_continue.is_some()),
            ("WroteRequest", self.wrote_request.is_some()),
            ("Got1xxResponse", self.got_1xx_response.is_some()),
            ("GotFirstResponseByte", self.got_first_response_byte.is_some()),
        ];
        slots
            .into_iter()
            .filter_map(|(name, set)| set.then_some(name))
            .collect()
    }
}

impl fmt::Debug for ClientTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTrace")
            .field("installed", &self.installed())
            .finish()
    }
}

/// Attach a hook set to a request's trace context.
pub fn with_client_trace<B>(mut req: Request<B>, trace: ClientTrace) -> Request<B> {
    req.extensions_mut().insert(trace);
    req
}

/// The hook set attached to a request, if any.
pub fn client_trace<B>(req: &Request<B>) -> Option<&ClientTrace> {
    req.extensions().get::<ClientTrace>()
}
