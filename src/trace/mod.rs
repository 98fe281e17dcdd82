// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request tracing: identifiers, phase hooks, the tracing transport and HAR
//! timings.

mod attempt;
mod clock;
pub mod hooks;
mod id;
mod report;
mod timings;
mod transport;

pub use attempt::{AttemptPhases, PhaseDurations};
pub use clock::{elapsed_since, PhaseMark};
pub use hooks::{
    client_trace, with_client_trace, ClientTrace, DnsDoneInfo, DnsStartInfo, GotConnInfo, TlsState,
};
pub use id::{CoreId, RequestId, TransportId};
pub use report::ReportAssembler;
pub use timings::{Timings, Trace, NOT_APPLICABLE};
pub use transport::{Transport, TransportBuilder};
