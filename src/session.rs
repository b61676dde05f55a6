//! Per-scan session state: callback, exhaustion vector, deduper, and the
//! latched halt flag.
//!
//! A session is created at scan start, mutated by every pipeline call, and
//! discarded at scan end. It owns all mutable per-scan state, so two scans on
//! separate sessions share nothing but the immutable report table.

use crate::dedupe::MatchDeduper;
use crate::exhaust::ExhaustionVector;
use crate::report::ReportTable;
use std::ops::ControlFlow;

/// Control code returned by every pipeline entry point, telling the calling
/// automaton whether to keep scanning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanControl {
    /// Stop the whole scan immediately; the session is marked broken.
    Halt,
    /// Keep scanning; an exhaustion bit was just set, or an already-exhausted
    /// report was consumed.
    Continue,
    /// Keep scanning; no exhaustion state changed.
    ContinueNoExhaust,
}

/// Why a scan stopped early.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokenReason {
    /// The user callback returned a stop request.
    UserRequested,
    /// Every single-shot expression fired; set by the scan driver, never by
    /// the pipeline itself.
    Exhausted,
}

/// Diagnostic flag bit on delivered matches: the end offset was corrected by
/// the report's offset adjustment. Only set in debug builds.
pub const MATCH_FLAG_ADJUSTED: u32 = 1 << 0;

/// User match callback: `(user_id, from_offset, to_offset, flags)`.
///
/// `from_offset == 0` conventionally means "no start tracked";
/// [`crate::som::PAST_HORIZON`] means the start precedes tracked history.
/// Returning `ControlFlow::Break(())` stops the scan. Context travels in the
/// closure's captures.
pub type OnMatch<'a> = dyn FnMut(u32, u64, u64, u32) -> ControlFlow<()> + 'a;

/// Acceptance counters for one session (feature `stats`).
#[cfg(feature = "stats")]
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    /// Matches delivered to the user callback.
    pub delivered: u64,
    /// Events rejected by the bounds window.
    pub bounds_rejected: u64,
    /// Events consumed because their exhaustion key was already set.
    pub exhausted_suppressed: u64,
    /// Events rejected by the minimum-length check.
    pub min_length_rejected: u64,
    /// Duplicate events squashed by the deduper.
    pub dupe_suppressed: u64,
    /// SOM-tracked events deferred to the flush path.
    pub som_deferred: u64,
}

/// Mutable state for one scan over one stream.
pub struct ScanSession<'a> {
    reports: &'a ReportTable,
    pub(crate) exhaustion: ExhaustionVector,
    pub(crate) deduper: MatchDeduper,
    broken: Option<BrokenReason>,
    pub(crate) on_match: &'a mut OnMatch<'a>,
    #[cfg(feature = "stats")]
    pub(crate) stats: PipelineStats,
}

impl<'a> ScanSession<'a> {
    /// Creates a fresh session: zeroed exhaustion vector and deduper sized
    /// from the table, halt flag clear.
    pub fn new(reports: &'a ReportTable, on_match: &'a mut OnMatch<'a>) -> Self {
        Self {
            reports,
            exhaustion: ExhaustionVector::zeroed(reports.exhaust_key_count()),
            deduper: MatchDeduper::new(reports.dedupe_key_count()),
            broken: None,
            on_match,
            #[cfg(feature = "stats")]
            stats: PipelineStats::default(),
        }
    }

    /// The compiled report table this scan runs against.
    #[inline]
    pub fn reports(&self) -> &'a ReportTable {
        self.reports
    }

    /// Returns whether the scan has been halted.
    #[inline]
    pub fn is_broken(&self) -> bool {
        self.broken.is_some()
    }

    /// Why the scan halted, when it did.
    #[inline]
    pub fn broken_reason(&self) -> Option<BrokenReason> {
        self.broken
    }

    /// Latches the halt flag. The first reason wins; every subsequent
    /// pipeline call returns [`ScanControl::Halt`] without touching state.
    pub fn mark_broken(&mut self, reason: BrokenReason) {
        if self.broken.is_none() {
            self.broken = Some(reason);
        }
    }

    /// Read access to the exhaustion vector, for drivers checking
    /// [`ExhaustionVector::all_exhausted`].
    #[inline]
    pub fn exhaustion(&self) -> &ExhaustionVector {
        &self.exhaustion
    }

    /// Acceptance counters accumulated so far (feature `stats`).
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportTableBuilder;

    #[test]
    fn broken_reason_is_latched_first_wins() {
        let table = ReportTableBuilder::new().build();
        let mut cb = |_: u32, _: u64, _: u64, _: u32| ControlFlow::Continue(());
        let mut session = ScanSession::new(&table, &mut cb);

        assert!(!session.is_broken());
        session.mark_broken(BrokenReason::UserRequested);
        session.mark_broken(BrokenReason::Exhausted);
        assert_eq!(session.broken_reason(), Some(BrokenReason::UserRequested));
    }

    #[test]
    fn session_state_is_sized_from_the_table() {
        let mut builder = ReportTableBuilder::new();
        let _ = builder.exhaust_key(0);
        let _ = builder.exhaust_key(1);
        let _ = builder.dedupe_key(0);
        let table = builder.build();

        let mut cb = |_: u32, _: u64, _: u64, _: u32| ControlFlow::Continue(());
        let session = ScanSession::new(&table, &mut cb);
        assert_eq!(session.exhaustion().key_count(), 2);
    }
}
