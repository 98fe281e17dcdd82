// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The request-dispatch mechanism that tracing transports wrap.
//!
//! A [`Dispatch`] performs exactly one request-response exchange. It invokes
//! the [`ClientTrace`](crate::trace::ClientTrace) hooks found in the
//! request's extensions synchronously, on the awaiting task, as each phase
//! begins and ends. It does not follow redirects or retry.

mod http1;
mod pool;
mod stream;

pub use http1::HttpDispatcher;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};

use crate::error::DispatchError;

/// Perform one request, returning the response or an error.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn round_trip(&self, req: Request<Bytes>) -> Result<Response<Bytes>, DispatchError>;
}
