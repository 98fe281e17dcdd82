// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Idle keep-alive connection pool.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Waker};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::Full;
use hyper::client::conn::http1::{Connection, SendRequest};
use hyper_util::rt::TokioIo;

use super::stream::{FirstByteSlot, WatchedStream};

/// Idle connections kept per key.
const MAX_IDLE_PER_KEY: usize = 4;

/// Idle connections older than this are dropped instead of reused.
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

pub(crate) type ConnectionDriver = Connection<TokioIo<WatchedStream>, Full<Bytes>>;

/// An established HTTP/1.1 connection.
pub(crate) struct PooledConn {
    pub sender: SendRequest<Full<Bytes>>,
    pub driver: Pin<Box<ConnectionDriver>>,
    pub first_byte: FirstByteSlot,
    pub remote_addr: SocketAddr,
    /// Requests completed on this connection.
    pub uses: u64,
}

impl PooledConn {
    /// Whether the connection can carry another request.
    ///
    /// Idle connections are not driven, so a peer close is only noticed by
    /// polling the driver once; a finished driver means the socket is gone.
    fn is_alive(&mut self) -> bool {
        if self.sender.is_closed() {
            return false;
        }
        let mut cx = Context::from_waker(Waker::noop());
        self.driver.as_mut().poll(&mut cx).is_pending()
    }
}

/// Pool key: one bucket per scheme, host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PoolKey {
    pub tls: bool,
    pub host: String,
    pub port: u16,
}

struct IdleConn {
    conn: PooledConn,
    since: Instant,
}

#[derive(Default)]
pub(crate) struct Pool {
    idle: Mutex<HashMap<PoolKey, Vec<IdleConn>>>,
}

impl Pool {
    /// Take the most recently used live connection for `key`, with how long
    /// it sat idle.
    pub(crate) fn take(&self, key: &PoolKey) -> Option<(PooledConn, Duration)> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = idle.get_mut(key)?;
        while let Some(mut entry) = bucket.pop() {
            let idle_time = entry.since.elapsed();
            if idle_time < IDLE_TIMEOUT && entry.conn.is_alive() {
                return Some((entry.conn, idle_time));
            }
        }
        None
    }

    /// Return a connection for reuse.
    pub(crate) fn put(&self, key: PoolKey, conn: PooledConn) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        let bucket = idle.entry(key).or_default();
        if bucket.len() >= MAX_IDLE_PER_KEY {
            bucket.remove(0);
        }
        bucket.push(IdleConn {
            conn,
            since: Instant::now(),
        });
    }

    /// Number of idle connections held for `key`.
    pub(crate) fn idle_count(&self, key: &PoolKey) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, Vec::len)
    }
}
