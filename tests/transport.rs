// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end tests for the tracing transport against a local server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{AUTHORIZATION, COOKIE};
use http::{Request, StatusCode};
use whathappens::telemetry::Metrics;
use whathappens::trace::Transport;
use whathappens::{effective_uri, DispatchError, TracerConfig};

use common::{
    capture, closed_port, ok, redirect, spawn_eager_server, spawn_recording_server, spawn_server,
    spawn_silent_server, ScriptedHttps,
};

fn config() -> Arc<TracerConfig> {
    Arc::new(TracerConfig::default().with_timeout(Duration::from_secs(5)))
}

#[tokio::test]
async fn test_plain_get_event_sequence() {
    let (logs, _guard) = capture();
    let addr = spawn_server(|_| ok("hello")).await;

    let transport = Transport::new(config());
    let client = transport.make_client().unwrap();
    let response = client.get(&format!("http://{addr}/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), b"hello");

    // IP literal: no DNS phase; plain HTTP: no TLS phase
    assert_eq!(
        logs.messages(),
        [
            "RoundTripStart",
            "GetConn",
            "ConnectStart",
            "ConnectDone",
            "GotConn",
            "GotFirstResponseByte",
        ]
    );

    let transport_id = transport.transport_id().unwrap().to_string();
    let request_id = transport.current_request_id().unwrap().unwrap().to_string();
    for event in logs.events() {
        assert_eq!(event.field("transport"), Some(transport_id.as_str()), "{event:?}");
        assert_eq!(event.field("request"), Some(request_id.as_str()), "{event:?}");
    }

    let connect = &logs.named("ConnectDone")[0];
    assert_eq!(connect.field("network"), Some("tcp"));
    assert_eq!(connect.field("addr"), Some(addr.to_string().as_str()));
    assert!(connect.number("duration").unwrap() >= 0.0);
    assert!(connect.field("error").is_none());
    assert!(connect.field("start_missing").is_none());

    let got_conn = &logs.named("GotConn")[0];
    assert_eq!(got_conn.field("reused"), Some("false"));
    assert!(logs.named("GotFirstResponseByte")[0].number("elapsed").unwrap() >= 0.0);
}

#[tokio::test]
async fn test_redirect_mints_request_id_per_hop() {
    let (logs, _guard) = capture();
    let addr = spawn_server(|path| match path {
        "/start" => redirect(302, "/end"),
        _ => ok("done"),
    })
    .await;

    let transport = Transport::new(config());
    let client = transport.make_client().unwrap();
    let response = client.get(&format!("http://{addr}/start")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(effective_uri(&response).unwrap().path(), "/end");

    let core = transport.core_id().unwrap();
    let starts = logs.named("RoundTripStart");
    assert_eq!(starts.len(), 2);
    let first = starts[0].field("request").unwrap();
    let second = starts[1].field("request").unwrap();
    assert_ne!(first, second);
    assert!(first.starts_with(core.as_str()));
    assert!(second.starts_with(core.as_str()));

    // the second hop rides the kept-alive connection
    let conns = logs.named("GotConn");
    assert_eq!(conns.len(), 2);
    assert_eq!(conns[1].field("reused"), Some("true"));
    assert_eq!(conns[1].field("was_idle"), Some("true"));
    assert_eq!(logs.named("ConnectStart").len(), 1);

    let attempts = transport.attempts().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].status, Some(302));
    assert_eq!(attempts[1].status, Some(200));
    assert_eq!(
        transport.current_request_id().unwrap().unwrap().as_str(),
        second
    );
}

#[tokio::test]
async fn test_too_many_redirects() {
    let (_logs, _guard) = capture();
    let addr = spawn_server(|_| redirect(307, "/loop")).await;

    let transport = Transport::new(Arc::new(
        TracerConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_max_redirects(3),
    ));
    let client = transport.make_client().unwrap();
    let err = client.get(&format!("http://{addr}/loop")).await.unwrap_err();
    assert!(matches!(
        err.dispatch_error(),
        Some(DispatchError::TooManyRedirects(3))
    ));
    // the limit counts requests, not hops
    assert_eq!(transport.attempts().unwrap().len(), 3);
}

#[tokio::test]
async fn test_cross_origin_redirect_drops_credentials() {
    let (_logs, _guard) = capture();
    let (other, other_seen) = spawn_recording_server(|_| ok("elsewhere")).await;
    let next = format!("http://localhost:{}/landing", other.port());
    let (origin, origin_seen) = spawn_recording_server(move |path| match path {
        "/start" => redirect(302, "/same"),
        _ => redirect(302, &next),
    })
    .await;

    let transport = Transport::new(config());
    let client = transport.make_client().unwrap();
    let req = Request::get(format!("http://{origin}/start"))
        .header(AUTHORIZATION, "Bearer secret")
        .header(COOKIE, "sid=1")
        .body(Bytes::new())
        .unwrap();
    let response = client.execute(client.traced(req).unwrap()).await.unwrap();
    assert_eq!(response.body().as_ref(), b"elsewhere");

    // same-origin hop keeps them
    assert_eq!(origin_seen.heads().len(), 2);
    assert_eq!(
        origin_seen.header(1, "authorization").as_deref(),
        Some("Bearer secret")
    );
    assert_eq!(origin_seen.header(1, "cookie").as_deref(), Some("sid=1"));

    assert_eq!(other_seen.heads().len(), 1);
    assert_eq!(other_seen.header(0, "authorization"), None);
    assert_eq!(other_seen.header(0, "cookie"), None);
    assert!(other_seen.header(0, "user-agent").is_some());
}

#[tokio::test]
async fn test_informational_responses_fire_once_each() {
    let (logs, _guard) = capture();
    let addr = spawn_server(|_| {
        format!(
            "HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 103 Early Hints\r\nLink: </style.css>; rel=preload\r\n\r\n{}",
            ok("late")
        )
    })
    .await;

    let transport = Transport::new(config());
    let client = transport.make_client().unwrap();
    let response = client.get(&format!("http://{addr}/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let codes: Vec<_> = logs
        .named("Got1xxResponse")
        .iter()
        .map(|e| e.field("code").unwrap().to_string())
        .collect();
    assert_eq!(codes, ["100", "103"]);

    let attempt = transport.current_attempt().unwrap().unwrap();
    let recorded: Vec<u16> = attempt.durations.informational.iter().map(|(c, _)| *c).collect();
    assert_eq!(recorded, [100, 103]);
    assert!(attempt.durations.informational.iter().all(|(_, ms)| *ms >= 0.0));
}

#[tokio::test]
async fn test_connect_error_passes_through() {
    let (logs, _guard) = capture();
    let addr = closed_port().await;

    let transport = Transport::new(config());
    let client = transport.make_client().unwrap();
    let err = client.get(&format!("http://{addr}/")).await.unwrap_err();
    assert!(matches!(err.dispatch_error(), Some(DispatchError::Connect { .. })));

    let done = &logs.named("ConnectDone")[0];
    assert!(done.field("error").is_some());
    assert!(logs.named("GotConn").is_empty());

    let attempt = transport.current_attempt().unwrap().unwrap();
    assert!(attempt.error.is_some());
    assert!(attempt.is_finished());
}

#[tokio::test]
async fn test_client_timeout_covers_exchange() {
    let (logs, _guard) = capture();
    let addr = spawn_silent_server().await;

    let transport = Transport::new(Arc::new(
        TracerConfig::default().with_timeout(Duration::from_millis(200)),
    ));
    let client = transport.make_client().unwrap();
    let err = client.get(&format!("http://{addr}/")).await.unwrap_err();
    let dispatch = err.dispatch_error().unwrap();
    assert!(dispatch.is_timeout());

    // the abandoned attempt is closed out, not left in flight
    let attempt = transport.current_attempt().unwrap().unwrap();
    assert!(attempt.is_finished());
    assert_eq!(attempt.status, None);
    assert_eq!(attempt.error.as_deref(), Some("Request canceled"));

    let canceled = logs.named("RoundTripCanceled");
    assert_eq!(canceled.len(), 1);
    assert_eq!(
        canceled[0].field("request"),
        Some(attempt.request_id.as_str())
    );
    assert_eq!(logs.named("GotConn").len(), 1);
    assert!(logs.named("GotFirstResponseByte").is_empty());
}

#[tokio::test]
async fn test_hostname_is_resolved_before_connect() {
    let (logs, _guard) = capture();
    let addr = spawn_server(|_| ok("named")).await;

    let transport = Transport::new(config());
    let client = transport.make_client().unwrap();
    let url = format!("http://localhost:{}/", addr.port());
    let response = client.get(&url).await.unwrap();
    assert_eq!(response.body().as_ref(), b"named");

    let messages = logs.messages();
    assert_eq!(
        messages[..5],
        ["RoundTripStart", "GetConn", "DNSStart", "DNSDone", "ConnectStart"]
    );
    assert_eq!(messages[messages.len() - 2..], ["GotConn", "GotFirstResponseByte"]);

    assert_eq!(logs.named("DNSStart")[0].field("host"), Some("localhost"));
    let dns = &logs.named("DNSDone")[0];
    assert!(dns.field("error").is_none());
    assert!(dns.field("addrs").unwrap().contains("127.0.0.1"));
    assert!(dns.number("duration").unwrap() >= 0.0);

    let attempt = transport.current_attempt().unwrap().unwrap();
    assert!(attempt.durations.dns.is_some());
    assert_eq!(attempt.status, Some(200));
}

#[tokio::test]
async fn test_tls_handshake_error_reaches_hook() {
    let (logs, _guard) = capture();
    let addr = spawn_eager_server("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;

    let transport = Transport::new(config());
    let client = transport.make_client().unwrap();
    let url = format!("https://localhost:{}/", addr.port());
    let err = client.get(&url).await.unwrap_err();
    assert!(matches!(err.dispatch_error(), Some(DispatchError::Tls { .. })));

    let messages = logs.messages();
    assert_eq!(
        messages[messages.len() - 2..],
        ["TLSHandshakeStart", "TLSHandshakeDone"]
    );
    let done = &logs.named("TLSHandshakeDone")[0];
    assert!(done.field("error").is_some());
    assert_eq!(done.field("server_name"), Some("localhost"));
    assert!(done.field("version").is_none());
    assert!(logs.named("GotConn").is_empty());

    let attempt = transport.current_attempt().unwrap().unwrap();
    assert!(attempt.error.unwrap().starts_with("TLS handshake with localhost failed"));
}

#[tokio::test]
async fn test_metrics_samples_for_plain_get() {
    let (_logs, _guard) = capture();
    let addr = spawn_server(|_| ok("hi")).await;
    let metrics = Arc::new(Metrics::new());

    let transport = Transport::builder(config()).metrics(metrics.clone()).build();
    transport
        .make_client()
        .unwrap()
        .get(&format!("http://{addr}/"))
        .await
        .unwrap();

    for name in ["connect.tcp", "connect.open", "time_to_first_byte"] {
        assert_eq!(
            metrics.phase(name).map(|m| m.count),
            Some(1),
            "{name}"
        );
    }
    assert!(metrics.phase("dns").is_none());
    assert!(metrics.phase("tls.handshake").is_none());
}

#[tokio::test]
async fn test_https_lifecycle_order() {
    let (logs, _guard) = capture();
    let metrics = Arc::new(Metrics::new());
    let transport = Transport::builder(config())
        .dispatcher(Arc::new(ScriptedHttps {
            informational: vec![StatusCode::CONTINUE],
            ..Default::default()
        }))
        .metrics(metrics.clone())
        .build();

    let client = transport.make_client().unwrap();
    client.get("https://example.test/").await.unwrap();

    assert_eq!(
        logs.messages(),
        [
            "RoundTripStart",
            "GetConn",
            "DNSStart",
            "DNSDone",
            "ConnectStart",
            "ConnectDone",
            "TLSHandshakeStart",
            "TLSHandshakeDone",
            "GotConn",
            "GotFirstResponseByte",
            "Got1xxResponse",
        ]
    );

    let tls = &logs.named("TLSHandshakeDone")[0];
    assert!(tls.number("duration").unwrap() >= 1.0);
    assert_eq!(tls.field("version"), Some("TLSv1_3"));

    let attempt = transport.current_attempt().unwrap().unwrap();
    let d = &attempt.durations;
    assert!(d.dns.unwrap() >= 1.0);
    assert!(d.connect.unwrap() >= 1.0);
    assert!(d.tls_handshake.unwrap() >= 1.0);
    // connection acquisition spans DNS, connect and TLS
    assert!(d.get_conn.unwrap() >= d.dns.unwrap() + d.connect.unwrap());
    assert!(d.time_to_first_byte.unwrap() >= d.get_conn.unwrap());

    for name in [
        "dns",
        "connect.tcp",
        "tls.handshake",
        "connect.open",
        "1xx_response",
        "time_to_first_byte",
    ] {
        assert!(metrics.phase(name).is_some(), "{name}");
    }
}

#[tokio::test]
async fn test_timings_not_implemented_after_requests() {
    let (_logs, _guard) = capture();
    let transport = Transport::builder(config())
        .dispatcher(Arc::new(ScriptedHttps::default()))
        .build();
    transport
        .make_client()
        .unwrap()
        .get("https://example.test/")
        .await
        .unwrap();

    let err = transport.timings().unwrap_err();
    assert!(err.is_not_implemented());
}
