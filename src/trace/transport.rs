// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The tracing transport.
//!
//! A [`Transport`] wraps a [`Dispatch`] and keeps track of the attempt in
//! flight. Its [`ClientTrace`] hooks turn phase boundaries into `tracing`
//! events and, when a sink is configured, metric samples.
//!
//! A transport may be reused across the redirect chain of one logical
//! request; every attempt gets a fresh [`RequestId`] under the same
//! [`CoreId`]. It must not be shared by unrelated concurrent requests:
//! dispatches are serialized, but hooks fired by one request can land on the
//! other's current attempt.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use http::{HeaderMap, Request, Response, StatusCode};
use tracing::field::display;

use super::attempt::AttemptPhases;
use super::clock::{elapsed_since, PhaseMark};
use super::hooks::{ClientTrace, DnsDoneInfo, DnsStartInfo, GotConnInfo, TlsState};
use super::id::{CoreId, RequestId, TransportId};
use super::report::ReportAssembler;
use super::timings::Timings;
use crate::client::Client;
use crate::config::TracerConfig;
use crate::dispatch::{Dispatch, HttpDispatcher};
use crate::error::{DispatchError, TraceError};
use crate::telemetry::MetricsSink;

/// Builder for [`Transport`].
pub struct TransportBuilder {
    config: Arc<TracerConfig>,
    metrics: Option<Arc<dyn MetricsSink>>,
    dispatcher: Option<Arc<dyn Dispatch>>,
}

impl TransportBuilder {
    /// Record a sample per completed phase into `sink`.
    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Wrap `dispatcher` instead of a fresh [`HttpDispatcher`].
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatch>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Mint identifiers and build the transport.
    ///
    /// # Panics
    ///
    /// Panics if the system entropy source is unavailable.
    pub fn build(self) -> Transport {
        let core_id = CoreId::generate();
        let transport_id = TransportId::derive(&core_id);
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Arc::new(HttpDispatcher::new()));

        Transport {
            inner: Some(Arc::new(TransportInner {
                core_id,
                transport_id,
                config: self.config,
                metrics: self.metrics,
                dispatcher,
                round_trip_lock: tokio::sync::Mutex::new(()),
                state: Mutex::new(TransportState::default()),
            })),
        }
    }
}

/// A request dispatcher that reports the timing of every request phase.
///
/// `Transport::default()` is an unconstructed handle: every method on it
/// returns [`TraceError::NilTransport`].
#[derive(Clone, Default)]
pub struct Transport {
    inner: Option<Arc<TransportInner>>,
}

struct TransportInner {
    core_id: CoreId,
    transport_id: TransportId,
    config: Arc<TracerConfig>,
    metrics: Option<Arc<dyn MetricsSink>>,
    dispatcher: Arc<dyn Dispatch>,
    /// Held for the whole of each dispatch.
    round_trip_lock: tokio::sync::Mutex<()>,
    /// Held only while reading or writing identifiers and timestamps.
    state: Mutex<TransportState>,
}

#[derive(Default)]
struct TransportState {
    current: Option<AttemptPhases>,
    completed: Vec<AttemptPhases>,
}

/// What a hook read from the current attempt.
struct Reading {
    request: String,
    elapsed: Option<f64>,
}

impl Reading {
    fn duration(&self) -> f64 {
        self.elapsed.unwrap_or(0.0)
    }

    fn start_missing(&self) -> Option<bool> {
        self.elapsed.is_none().then_some(true)
    }
}

impl TransportInner {
    fn state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Update the current attempt and return its request ID.
    fn mark(&self, f: impl FnOnce(&mut AttemptPhases)) -> String {
        let mut state = self.state();
        match state.current.as_mut() {
            Some(attempt) => {
                f(attempt);
                attempt.request_id.to_string()
            }
            None => String::new(),
        }
    }

    /// Measure a phase of the current attempt and record its duration.
    fn measure(
        &self,
        start: impl FnOnce(&AttemptPhases) -> Option<PhaseMark>,
        record: impl FnOnce(&mut AttemptPhases, f64),
    ) -> Reading {
        let mut state = self.state();
        let Some(attempt) = state.current.as_mut() else {
            return Reading {
                request: String::new(),
                elapsed: None,
            };
        };
        let elapsed = elapsed_since(start(attempt).as_ref());
        if let Some(ms) = elapsed {
            record(attempt, ms);
        }
        Reading {
            request: attempt.request_id.to_string(),
            elapsed,
        }
    }

    fn sample(&self, name: &[&str], reading: &Reading) {
        if let (Some(sink), Some(ms)) = (&self.metrics, reading.elapsed) {
            sink.add_sample(name, ms);
        }
    }

    fn begin_attempt(&self, attempt: AttemptPhases) {
        let mut state = self.state();
        if let Some(previous) = state.current.replace(attempt) {
            state.completed.push(previous);
        }
    }

    fn end_attempt(&self, result: &Result<Response<Bytes>, DispatchError>) {
        let mut state = self.state();
        if let Some(attempt) = state.current.as_mut() {
            match result {
                Ok(response) => attempt.status = Some(response.status().as_u16()),
                Err(err) => attempt.error = Some(err.to_string()),
            }
        }
    }

    /// Close out an attempt whose dispatch was dropped mid-flight.
    fn cancel_attempt(&self) {
        let request = {
            let mut state = self.state();
            let Some(attempt) = state.current.as_mut().filter(|a| !a.is_finished()) else {
                return;
            };
            attempt.error = Some(DispatchError::Canceled.to_string());
            attempt.request_id.to_string()
        };
        tracing::info!(
            transport = %self.transport_id,
            request = %request,
            error = %DispatchError::Canceled,
            "RoundTripCanceled"
        );
    }
}

/// Settles the current attempt as canceled if dropped before [`settle`].
///
/// [`settle`]: PendingAttempt::settle
struct PendingAttempt<'a> {
    inner: &'a TransportInner,
    settled: bool,
}

impl PendingAttempt<'_> {
    fn settle(mut self, result: &Result<Response<Bytes>, DispatchError>) {
        self.inner.end_attempt(result);
        self.settled = true;
    }
}

impl Drop for PendingAttempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.inner.cancel_attempt();
        }
    }
}

impl Transport {
    /// Create a transport dispatching over HTTP/1.1, without metrics.
    ///
    /// # Panics
    ///
    /// Panics if the system entropy source is unavailable.
    pub fn new(config: Arc<TracerConfig>) -> Self {
        Self::builder(config).build()
    }

    /// Start building a transport.
    pub fn builder(config: Arc<TracerConfig>) -> TransportBuilder {
        TransportBuilder {
            config,
            metrics: None,
            dispatcher: None,
        }
    }

    fn inner(&self) -> Result<&Arc<TransportInner>, TraceError> {
        self.inner.as_ref().ok_or(TraceError::NilTransport)
    }

    /// Whether this handle was never constructed.
    pub fn is_nil(&self) -> bool {
        self.inner.is_none()
    }

    pub fn core_id(&self) -> Result<CoreId, TraceError> {
        Ok(self.inner()?.core_id.clone())
    }

    pub fn transport_id(&self) -> Result<TransportId, TraceError> {
        Ok(self.inner()?.transport_id.clone())
    }

    pub fn config(&self) -> Result<Arc<TracerConfig>, TraceError> {
        Ok(self.inner()?.config.clone())
    }

    /// The request ID of the most recent attempt, if any.
    pub fn current_request_id(&self) -> Result<Option<RequestId>, TraceError> {
        let inner = self.inner()?;
        let state = inner.state();
        Ok(state.current.as_ref().map(|a| a.request_id.clone()))
    }

    /// The phases of the most recent attempt, if any.
    pub fn current_attempt(&self) -> Result<Option<AttemptPhases>, TraceError> {
        let inner = self.inner()?;
        let state = inner.state();
        Ok(state.current.clone())
    }

    /// Every attempt observed so far, oldest first.
    pub fn attempts(&self) -> Result<Vec<AttemptPhases>, TraceError> {
        let inner = self.inner()?;
        let state = inner.state();
        let mut attempts = state.completed.clone();
        attempts.extend(state.current.clone());
        Ok(attempts)
    }

    /// The timings observed by this transport, one per attempt.
    pub fn timings(&self) -> Result<Vec<Timings>, TraceError> {
        let inner = self.inner()?;
        ReportAssembler::new(inner.config.clone()).assemble_all(&self.attempts()?)
    }

    /// A client that dispatches through this transport.
    pub fn make_client(&self) -> Result<Client, TraceError> {
        let inner = self.inner()?;
        Ok(Client::new(self.clone(), &inner.config))
    }

    /// The hook set bound to this transport.
    ///
    /// Header-write, 100-continue and request-written hooks are left unset.
    pub fn client_trace(&self) -> Result<ClientTrace, TraceError> {
        self.inner()?;
        let t = self.clone();
        let get_conn = move |host_port: &str| {
            let _ = t.get_conn(host_port);
        };
        let t = self.clone();
        let dns_start = move |info: &DnsStartInfo| {
            let _ = t.dns_start(info);
        };
        let t = self.clone();
        let dns_done = move |info: &DnsDoneInfo<'_>| {
            let _ = t.dns_done(info);
        };
        let t = self.clone();
        let connect_start = move |network: &str, addr: &str| {
            let _ = t.connect_start(network, addr);
        };
        let t = self.clone();
        let connect_done = move |network: &str, addr: &str, err: Option<&std::io::Error>| {
            let _ = t.connect_done(network, addr, err);
        };
        let t = self.clone();
        let tls_handshake_start = move || {
            let _ = t.tls_handshake_start();
        };
        let t = self.clone();
        let tls_handshake_done = move |state: &TlsState, err: Option<&std::io::Error>| {
            let _ = t.tls_handshake_done(state, err);
        };
        let t = self.clone();
        let got_conn = move |info: &GotConnInfo| {
            let _ = t.got_conn(info);
        };
        let t = self.clone();
        let got_first_response_byte = move || {
            let _ = t.got_first_response_byte();
        };
        let t = self.clone();
        let got_1xx_response = move |code: StatusCode, headers: &HeaderMap| {
            let _ = t.got_1xx_response(code, headers);
        };

        Ok(ClientTrace {
            get_conn: Some(Arc::new(get_conn)),
            dns_start: Some(Arc::new(dns_start)),
            dns_done: Some(Arc::new(dns_done)),
            connect_start: Some(Arc::new(connect_start)),
            connect_done: Some(Arc::new(connect_done)),
            tls_handshake_start: Some(Arc::new(tls_handshake_start)),
            tls_handshake_done: Some(Arc::new(tls_handshake_done)),
            got_conn: Some(Arc::new(got_conn)),
            got_first_response_byte: Some(Arc::new(got_first_response_byte)),
            got_1xx_response: Some(Arc::new(got_1xx_response)),
            wrote_headers: None,
            wait_100_continue: None,
            wrote_request: None,
        })
    }

    /// Dispatch one attempt through the wrapped mechanism.
    ///
    /// Mints a fresh request ID, logs `RoundTripStart`, and returns the
    /// dispatcher's result unchanged. If the returned future is dropped
    /// first, the attempt is recorded as canceled.
    pub async fn round_trip(&self, req: Request<Bytes>) -> Result<Response<Bytes>, TraceError> {
        let inner = self.inner()?;
        let _serial = inner.round_trip_lock.lock().await;

        let request_id = RequestId::derive(&inner.core_id);
        tracing::info!(
            transport = %inner.transport_id,
            request = %request_id,
            url = %req.uri(),
            method = %req.method(),
            "RoundTripStart"
        );
        inner.begin_attempt(AttemptPhases::begin(
            request_id,
            req.method().to_string(),
            req.uri().to_string(),
        ));

        let pending = PendingAttempt {
            inner,
            settled: false,
        };
        let result = inner.dispatcher.round_trip(req).await;
        pending.settle(&result);
        result.map_err(TraceError::from)
    }

    pub fn get_conn(&self, host_port: &str) -> Result<(), TraceError> {
        let inner = self.inner()?;
        let request = inner.mark(|a| a.conn_start = Some(PhaseMark::now()));
        tracing::info!(
            transport = %inner.transport_id,
            request = %request,
            addr = %host_port,
            "GetConn"
        );
        Ok(())
    }

    pub fn dns_start(&self, info: &DnsStartInfo) -> Result<(), TraceError> {
        let inner = self.inner()?;
        let request = inner.mark(|a| a.dns_start = Some(PhaseMark::now()));
        tracing::info!(
            transport = %inner.transport_id,
            request = %request,
            host = %info.host,
            "DNSStart"
        );
        Ok(())
    }

    pub fn dns_done(&self, info: &DnsDoneInfo<'_>) -> Result<(), TraceError> {
        let inner = self.inner()?;
        let reading = inner.measure(|a| a.dns_start, |a, ms| a.durations.dns = Some(ms));
        tracing::info!(
            transport = %inner.transport_id,
            request = %reading.request,
            duration = reading.duration(),
            start_missing = reading.start_missing(),
            addrs = ?info.addrs,
            error = info.err.map(display),
            "DNSDone"
        );
        inner.sample(&["dns"], &reading);
        Ok(())
    }

    pub fn connect_start(&self, network: &str, addr: &str) -> Result<(), TraceError> {
        let inner = self.inner()?;
        let request = inner.mark(|a| a.connect_start = Some(PhaseMark::now()));
        tracing::info!(
            transport = %inner.transport_id,
            request = %request,
            network = %network,
            addr = %addr,
            "ConnectStart"
        );
        Ok(())
    }

    pub fn connect_done(
        &self,
        network: &str,
        addr: &str,
        err: Option<&std::io::Error>,
    ) -> Result<(), TraceError> {
        let inner = self.inner()?;
        let reading = inner.measure(
            |a| a.connect_start,
            |a, ms| a.durations.connect = Some(ms),
        );
        tracing::info!(
            transport = %inner.transport_id,
            request = %reading.request,
            duration = reading.duration(),
            start_missing = reading.start_missing(),
            network = %network,
            addr = %addr,
            error = err.map(display),
            "ConnectDone"
        );
        inner.sample(&["connect", network], &reading);
        Ok(())
    }

    pub fn tls_handshake_start(&self) -> Result<(), TraceError> {
        let inner = self.inner()?;
        let request = inner.mark(|a| a.tls_start = Some(PhaseMark::now()));
        tracing::info!(
            transport = %inner.transport_id,
            request = %request,
            "TLSHandshakeStart"
        );
        Ok(())
    }

    /// Handshake errors are logged as reported; they are never swallowed.
    pub fn tls_handshake_done(
        &self,
        state: &TlsState,
        err: Option<&std::io::Error>,
    ) -> Result<(), TraceError> {
        let inner = self.inner()?;
        let reading = inner.measure(
            |a| a.tls_start,
            |a, ms| a.durations.tls_handshake = Some(ms),
        );
        tracing::info!(
            transport = %inner.transport_id,
            request = %reading.request,
            duration = reading.duration(),
            start_missing = reading.start_missing(),
            server_name = %state.server_name,
            version = state.version.as_deref(),
            cipher_suite = state.cipher_suite.as_deref(),
            error = err.map(display),
            "TLSHandshakeDone"
        );
        inner.sample(&["tls", "handshake"], &reading);
        Ok(())
    }

    pub fn got_conn(&self, info: &GotConnInfo) -> Result<(), TraceError> {
        let inner = self.inner()?;
        let reading = inner.measure(
            |a| a.conn_start,
            |a, ms| {
                a.durations.get_conn = Some(ms);
                a.reused_conn = Some(info.reused);
            },
        );
        tracing::info!(
            transport = %inner.transport_id,
            request = %reading.request,
            duration = reading.duration(),
            start_missing = reading.start_missing(),
            addr = %info.remote_addr,
            reused = info.reused,
            was_idle = info.was_idle,
            idle_time = info.idle_time.as_secs_f64() * 1000.0,
            "GotConn"
        );
        inner.sample(&["connect", "open"], &reading);
        Ok(())
    }

    pub fn got_first_response_byte(&self) -> Result<(), TraceError> {
        let inner = self.inner()?;
        let reading = inner.measure(
            |a| Some(a.start),
            |a, ms| a.durations.time_to_first_byte = Some(ms),
        );
        tracing::info!(
            transport = %inner.transport_id,
            request = %reading.request,
            elapsed = reading.duration(),
            start_missing = reading.start_missing(),
            "GotFirstResponseByte"
        );
        inner.sample(&["time_to_first_byte"], &reading);
        Ok(())
    }

    pub fn got_1xx_response(
        &self,
        code: StatusCode,
        _headers: &HeaderMap,
    ) -> Result<(), TraceError> {
        let inner = self.inner()?;
        let reading = inner.measure(
            |a| Some(a.start),
            |a, ms| a.durations.informational.push((code.as_u16(), ms)),
        );
        tracing::info!(
            transport = %inner.transport_id,
            request = %reading.request,
            elapsed = reading.duration(),
            start_missing = reading.start_missing(),
            code = code.as_u16(),
            "Got1xxResponse"
        );
        inner.sample(&["1xx_response"], &reading);
        Ok(())
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(inner) => f
                .debug_struct("Transport")
                .field("transport_id", &inner.transport_id)
                .finish_non_exhaustive(),
            None => f.write_str("Transport(nil)"),
        }
    }
}
