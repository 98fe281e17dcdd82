// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-attempt phase records.

use serde::Serialize;

use super::clock::PhaseMark;
use super::id::RequestId;

/// Durations observed for one attempt, in fractional milliseconds.
///
/// `None` means the phase did not happen (or its start was never seen).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseDurations {
    /// GetConn until GotConn.
    pub get_conn: Option<f64>,
    pub dns: Option<f64>,
    pub connect: Option<f64>,
    pub tls_handshake: Option<f64>,
    /// Dispatch start until the first response byte.
    pub time_to_first_byte: Option<f64>,
    /// Status code and elapsed time of each informational response.
    pub informational: Vec<(u16, f64)>,
}

/// Everything observed about one dispatch attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptPhases {
    pub request_id: RequestId,
    pub method: String,
    pub url: String,
    pub start: PhaseMark,
    pub conn_start: Option<PhaseMark>,
    pub dns_start: Option<PhaseMark>,
    pub connect_start: Option<PhaseMark>,
    pub tls_start: Option<PhaseMark>,
    pub reused_conn: Option<bool>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub durations: PhaseDurations,
}

impl AttemptPhases {
    pub(crate) fn begin(request_id: RequestId, method: String, url: String) -> Self {
        Self {
            request_id,
            method,
            url,
            start: PhaseMark::now(),
            conn_start: None,
            dns_start: None,
            connect_start: None,
            tls_start: None,
            reused_conn: None,
            status: None,
            error: None,
            durations: PhaseDurations::default(),
        }
    }

    /// Whether the attempt has ended, with a response or an error.
    pub fn is_finished(&self) -> bool {
        self.status.is_some() || self.error.is_some()
    }
}
