// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP client bound to a tracing transport.
//!
//! The client owns what the transport does not: the end-to-end timeout,
//! redirect following and default headers. Every hop of a redirect chain is
//! a separate [`Transport::round_trip`], so each gets its own request ID.

use std::time::Duration;

use bytes::Bytes;
use http::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, LOCATION, PROXY_AUTHORIZATION,
    USER_AGENT,
};
use http::{HeaderValue, Method, Request, Response, StatusCode, Uri};
use url::Url;

use crate::config::TracerConfig;
use crate::error::{DispatchError, TraceError};
use crate::trace::{client_trace, with_client_trace, Transport};

/// Response extension holding the URI of the final hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveUri(pub Uri);

/// The URI that produced `res`, after redirects.
pub fn effective_uri<B>(res: &Response<B>) -> Option<&Uri> {
    res.extensions().get::<EffectiveUri>().map(|e| &e.0)
}

/// A client dispatching through a [`Transport`].
#[derive(Debug, Clone)]
pub struct Client {
    transport: Transport,
    timeout: Duration,
    max_redirects: usize,
    user_agent: Option<HeaderValue>,
}

impl Client {
    pub(crate) fn new(transport: Transport, config: &TracerConfig) -> Self {
        Self {
            transport,
            timeout: config.timeout,
            max_redirects: config.max_redirects,
            user_agent: HeaderValue::from_str(&config.user_agent).ok(),
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Limit on the whole exchange, redirects included.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// A GET request for `url` carrying the transport's hooks.
    pub fn traced_get(&self, url: &str) -> Result<Request<Bytes>, TraceError> {
        let req = Request::get(url)
            .body(Bytes::new())
            .map_err(DispatchError::from)?;
        self.traced(req)
    }

    /// Attach the transport's hooks to `req`.
    pub fn traced<B>(&self, req: Request<B>) -> Result<Request<B>, TraceError> {
        Ok(with_client_trace(req, self.transport.client_trace()?))
    }

    /// GET `url` with tracing enabled.
    pub async fn get(&self, url: &str) -> Result<Response<Bytes>, TraceError> {
        let req = self.traced_get(url)?;
        self.execute(req).await
    }

    /// Send `req`, following redirects, within the client timeout.
    ///
    /// The response carries its final URI as an [`EffectiveUri`] extension.
    pub async fn execute(&self, req: Request<Bytes>) -> Result<Response<Bytes>, TraceError> {
        match tokio::time::timeout(self.timeout, self.follow(req)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(timeout = ?self.timeout, "request timed out");
                Err(DispatchError::Timeout(self.timeout).into())
            }
        }
    }

    async fn follow(&self, mut req: Request<Bytes>) -> Result<Response<Bytes>, TraceError> {
        let mut hops = 0;
        loop {
            if let Some(agent) = &self.user_agent {
                req.headers_mut().entry(USER_AGENT).or_insert_with(|| agent.clone());
            }

            let method = req.method().clone();
            let uri = req.uri().clone();
            let mut headers = req.headers().clone();
            let body = req.body().clone();
            let trace = client_trace(&req).cloned();

            let mut response = self.transport.round_trip(req).await?;
            let Some(next) = redirect_location(&response, &uri)? else {
                response.extensions_mut().insert(EffectiveUri(uri));
                return Ok(response);
            };
            // max_redirects caps the number of requests in the chain
            hops += 1;
            if hops >= self.max_redirects {
                return Err(DispatchError::TooManyRedirects(hops).into());
            }

            let (method, body) = redirect_method(response.status(), method, body);
            headers.remove(HOST);
            if body.is_empty() {
                headers.remove(CONTENT_LENGTH);
                headers.remove(CONTENT_TYPE);
            }
            if !same_origin(&uri, &next) {
                for name in [AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION] {
                    headers.remove(name);
                }
            }
            tracing::debug!(
                status = response.status().as_u16(),
                location = %next,
                hops,
                "following redirect"
            );

            let mut builder = Request::builder().method(method).uri(next);
            if let Some(h) = builder.headers_mut() {
                *h = headers;
            }
            req = builder.body(body).map_err(DispatchError::from)?;
            if let Some(trace) = trace {
                req = with_client_trace(req, trace);
            }
        }
    }
}

/// The absolute target of a redirect response, if `res` is one.
fn redirect_location<B>(res: &Response<B>, base: &Uri) -> Result<Option<Uri>, DispatchError> {
    if !matches!(res.status().as_u16(), 301 | 302 | 303 | 307 | 308) {
        return Ok(None);
    }
    let Some(location) = res.headers().get(LOCATION) else {
        return Ok(None);
    };
    let location = location
        .to_str()
        .map_err(|_| DispatchError::InvalidRequest("non-ASCII Location header".to_string()))?;
    let base = Url::parse(&base.to_string())
        .map_err(|e| DispatchError::InvalidRequest(format!("{base}: {e}")))?;
    let next = base
        .join(location)
        .map_err(|e| DispatchError::InvalidRequest(format!("bad Location {location:?}: {e}")))?;
    next.as_str()
        .parse::<Uri>()
        .map(Some)
        .map_err(|e| DispatchError::InvalidRequest(format!("bad Location {location:?}: {e}")))
}

/// Whether `a` and `b` share scheme, host and port.
fn same_origin(a: &Uri, b: &Uri) -> bool {
    fn port(uri: &Uri) -> Option<u16> {
        uri.port_u16().or(match uri.scheme_str() {
            Some("https") => Some(443),
            Some("http") => Some(80),
            _ => None,
        })
    }
    a.scheme() == b.scheme()
        && a.host().map(str::to_ascii_lowercase) == b.host().map(str::to_ascii_lowercase)
        && port(a) == port(b)
}

/// 301, 302 and 303 turn into a bodiless GET; 307 and 308 replay as sent.
fn redirect_method(status: StatusCode, method: Method, body: Bytes) -> (Method, Bytes) {
    match status.as_u16() {
        301..=303 if method != Method::HEAD => (Method::GET, Bytes::new()),
        _ => (method, body),
    }
}
