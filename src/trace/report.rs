// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Report assembly: observed phases to HAR timings.
//!
//! Splitting an attempt into HAR's send/wait/receive needs request-written
//! and body-read events that the transport does not record yet, so
//! assembly fails with [`TraceError::NotImplemented`] rather than returning
//! a guessed record.

use std::sync::Arc;

use super::attempt::AttemptPhases;
use super::timings::Timings;
use crate::config::TracerConfig;
use crate::error::TraceError;

/// Turns observed attempts into [`Timings`].
#[derive(Debug, Clone, Default)]
pub struct ReportAssembler {
    config: Arc<TracerConfig>,
}

impl ReportAssembler {
    pub fn new(config: Arc<TracerConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Timings for a single attempt.
    pub fn assemble(&self, attempt: &AttemptPhases) -> Result<Timings, TraceError> {
        tracing::debug!(request = %attempt.request_id, "timings requested");
        Err(TraceError::NotImplemented)
    }

    /// Timings for every attempt, in order.
    pub fn assemble_all(&self, attempts: &[AttemptPhases]) -> Result<Vec<Timings>, TraceError> {
        if let Some(first) = attempts.first() {
            self.assemble(first)?;
        }
        Err(TraceError::NotImplemented)
    }
}
