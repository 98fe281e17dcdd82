// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HAR 1.2 timing records.
//!
//! See <http://www.softwareishard.com/blog/har-12-spec/#timings>. All times
//! are milliseconds. `send`, `wait` and `receive` are required and must be
//! non-negative; any other phase that does not apply to the request is `-1`.

use serde::{Deserialize, Serialize};

use super::attempt::AttemptPhases;
use super::report::ReportAssembler;
use crate::error::TraceError;

/// Value used for phases that do not apply to a request.
pub const NOT_APPLICABLE: f64 = -1.0;

/// Time elapsed during the phases of one request-response round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    pub blocked: f64,
    pub dns: f64,
    pub connect: f64,
    pub send: f64,
    pub wait: f64,
    pub receive: f64,
    pub ssl: f64,
    #[serde(default)]
    pub comment: String,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            blocked: NOT_APPLICABLE,
            dns: NOT_APPLICABLE,
            connect: NOT_APPLICABLE,
            send: 0.0,
            wait: 0.0,
            receive: 0.0,
            ssl: NOT_APPLICABLE,
            comment: String::new(),
        }
    }
}

impl Timings {
    /// Check the HAR invariants.
    pub fn is_valid(&self) -> bool {
        let required = [self.send, self.wait, self.receive];
        let optional = [self.blocked, self.dns, self.connect, self.ssl];
        required.iter().all(|v| *v >= 0.0)
            && optional.iter().all(|v| *v >= 0.0 || *v == NOT_APPLICABLE)
    }

    /// Total time of the round trip.
    ///
    /// `ssl` is already included in `connect` per HAR, so it is not added.
    pub fn total(&self) -> f64 {
        [self.blocked, self.dns, self.connect, self.send, self.wait, self.receive]
            .iter()
            .filter(|v| **v >= 0.0)
            .sum()
    }
}

/// A full logical round trip, inclusive of redirects.
///
/// Owned by the caller that created it; attempts are appended in the order
/// they complete.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    pub id: String,
    attempts: Vec<AttemptPhases>,
}

impl Trace {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attempts: Vec::new(),
        }
    }

    /// Append a completed attempt.
    pub fn record(&mut self, attempt: AttemptPhases) {
        self.attempts.push(attempt);
    }

    /// Append several attempts, e.g. everything a transport observed.
    pub fn extend(&mut self, attempts: impl IntoIterator<Item = AttemptPhases>) {
        self.attempts.extend(attempts);
    }

    pub fn attempts(&self) -> &[AttemptPhases] {
        &self.attempts
    }

    /// The timings observed during this trace, one per attempt.
    pub fn timings(&self, assembler: &ReportAssembler) -> Result<Vec<Timings>, TraceError> {
        assembler.assemble_all(&self.attempts)
    }
}
