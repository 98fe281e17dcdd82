// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Phase clock.
//!
//! A [`PhaseMark`] pairs a wall-clock timestamp (for reporting) with a
//! monotonic instant (for arithmetic), so elapsed times are never negative
//! even if the system clock steps backwards mid-request.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The start of a phase.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PhaseMark {
    /// Wall-clock time the phase started.
    pub at: DateTime<Utc>,
    #[serde(skip)]
    instant: Instant,
}

impl PhaseMark {
    /// Mark the current moment.
    pub fn now() -> Self {
        Self {
            at: Utc::now(),
            instant: Instant::now(),
        }
    }

    /// Fractional milliseconds since this mark.
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms_at(Instant::now())
    }

    /// Fractional milliseconds between this mark and `now`; zero if `now` is earlier.
    pub fn elapsed_ms_at(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.instant).as_secs_f64() * 1000.0
    }
}

/// Elapsed milliseconds since an optional start.
///
/// Returns `None` when the phase was never marked, instead of measuring
/// against an unset clock.
pub fn elapsed_since(start: Option<&PhaseMark>) -> Option<f64> {
    start.map(PhaseMark::elapsed_ms)
}
