//! Match acceptance and deduplication for multi-pattern stream scanning.
//!
//! ## Scope
//! This crate is the last mile between a matching automaton and the user: it
//! decides, for every raw candidate event, whether the user callback fires.
//! It owns the per-report runtime checks (offset bounds, minimum length,
//! single-shot exhaustion), per-offset deduplication, and the deferral of
//! start-of-match (SOM) events to an external tracker.
//!
//! ## Key invariants
//! - End offsets are non-decreasing within a scan; the deduper's parity
//!   buffers rely on it and debug-assert it.
//! - Deduplication is per end offset, never global: a pattern may match again
//!   at a later offset.
//! - A callback stop request latches for the rest of the scan; no further
//!   match is delivered.
//! - Exhaustion bits are sticky within a scan and reset only with a new
//!   session.
//! - SOM-tracked events carrying a dedupe key are never delivered directly;
//!   the minimal start per (offset, key) goes to the tracker's flush.
//!
//! ## Acceptance flow (one event)
//! 1) Latched halt check.
//! 2) Bounds window, then exhaustion (skipped under the `fast` flag).
//! 3) Start resolution through the [`som::SomTracker`], end-offset
//!    adjustment, minimum length.
//! 4) Dedupe catch-up: housekeeping, SOM flush, duplicate or deferral verdict.
//! 5) Delivery to the user callback; exhaustion bit update.
//!
//! ## Notable entry points
//! - [`session::ScanSession`]: per-scan state plus the four pipeline entry
//!   points (`accept_match`, `accept_som_match`, `deliver_match`,
//!   `deliver_som_match`).
//! - [`report::ReportTableBuilder`] / [`report::ReportTable`]: compiled
//!   per-pattern metadata, built once and shared across scans.
//! - [`demo::LiteralScanner`]: a minimal literal automaton wired through the
//!   pipeline, as an integration sketch.
//!
//! ## Design trade-offs
//! The checked and fast paths share one parameterized implementation; `fast`
//! is an optimization hint that is debug-asserted against the descriptor, so
//! the two can never disagree on semantics. Dedupe state is double-buffered
//! by offset parity to make the per-byte advance O(words) instead of
//! O(key count).

pub mod demo;
pub mod stdx;

mod dedupe;
mod exhaust;
mod pipeline;
mod report;
mod session;
mod som;

pub use demo::{LiteralPattern, LiteralScanner};

pub use dedupe::{
    DedupWindow, DedupeResult, MatchDeduper, SomPending, SOM_DIRTY_ADJUSTED, SOM_DIRTY_UNADJUSTED,
};
pub use exhaust::ExhaustionVector;
pub use report::{
    Bounds, DedupeKey, ExhaustKey, ReportDescriptor, ReportId, ReportKind, ReportTable,
    ReportTableBuilder,
};
#[cfg(feature = "stats")]
pub use session::PipelineStats;
pub use session::{BrokenReason, OnMatch, ScanControl, ScanSession, MATCH_FLAG_ADJUSTED};
pub use som::{
    satisfies_min_length, FlushResult, NullSomTracker, SomStart, SomTracker, PAST_HORIZON,
};
