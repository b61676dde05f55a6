//! Match-acceptance pipeline: the last-mile checks between a raw automaton
//! event and the user callback.
//!
//! Four entry points share one parameterized core so the variants cannot
//! drift apart:
//!
//! - [`ScanSession::accept_match`] / [`ScanSession::accept_som_match`]: the
//!   adaptor path for untrusted events. Bounds, exhaustion, minimum length,
//!   and dedupe are all checked at runtime (a `fast` flag skips the first
//!   three for reports statically known to need none of them).
//! - [`ScanSession::deliver_match`] / [`ScanSession::deliver_som_match`]: the
//!   trusted path for events whose preconditions the calling automaton has
//!   already proven at compile time; checks become debug assertions.
//!
//! Check order on the adaptor path: latched halt, bounds, exhaustion, start
//! resolution, offset adjustment, minimum length, dedupe catch-up, delivery,
//! exhaustion update. The deduper is keyed by the pre-adjustment offset while
//! the reported window uses the adjusted one.

use crate::dedupe::DedupeResult;
use crate::report::{ReportId, ReportKind};
use crate::session::{BrokenReason, ScanControl, ScanSession, MATCH_FLAG_ADJUSTED};
use crate::som::{satisfies_min_length, SomStart, SomTracker};
use std::ops::ControlFlow;

/// Applies a report's end-offset correction.
///
/// Underflow (a negative adjustment at stream offset zero) is a caller
/// contract violation: automata never report an adjusted end before the
/// stream start.
#[inline]
fn adjust_end_offset(to_offset: u64, adjust: i32) -> u64 {
    debug_assert!(
        adjust >= 0 || to_offset >= u64::from(adjust.unsigned_abs()),
        "offset adjustment underflows the stream start"
    );
    to_offset.wrapping_add_signed(i64::from(adjust))
}

/// Flags word for a delivered match. The adjusted bit is diagnostic only and
/// is reported solely in debug builds.
#[inline]
fn delivery_flags(offset_adjust: i32) -> u32 {
    if cfg!(debug_assertions) && offset_adjust != 0 {
        MATCH_FLAG_ADJUSTED
    } else {
        0
    }
}

impl ScanSession<'_> {
    /// Accepts or rejects a plain candidate event from a matching automaton.
    ///
    /// `to_offset` is the automaton's raw end offset. `fast` may only be true
    /// for reports with no bounds, exhaustion key, or minimum length
    /// (debug-asserted against the descriptor rather than trusted).
    /// `tracking_som` says whether the surrounding scan performs
    /// start-of-match handling.
    ///
    /// End offsets must be non-decreasing across the life of the scan.
    pub fn accept_match(
        &mut self,
        som: &mut dyn SomTracker,
        to_offset: u64,
        id: ReportId,
        fast: bool,
        tracking_som: bool,
    ) -> ScanControl {
        self.accept(som, None, to_offset, id, fast, tracking_som)
    }

    /// Accepts or rejects a candidate event whose start offset the caller
    /// supplies directly. Start-of-match handling is implied.
    pub fn accept_som_match(
        &mut self,
        som: &mut dyn SomTracker,
        from: SomStart,
        to_offset: u64,
        id: ReportId,
        fast: bool,
    ) -> ScanControl {
        self.accept(som, Some(from), to_offset, id, fast, true)
    }

    fn accept(
        &mut self,
        som: &mut dyn SomTracker,
        caller_from: Option<SomStart>,
        to_offset: u64,
        id: ReportId,
        fast: bool,
        tracking_som: bool,
    ) -> ScanControl {
        let report = self.reports().get(id);
        debug_assert!(
            report.is_external(),
            "internal report {} reached the acceptance pipeline",
            id.0
        );
        debug_assert!(
            !fast || !report.needs_runtime_checks(),
            "fast flag set for report {} which needs runtime checks",
            id.0
        );

        // A halt latched by an earlier event terminates in-flight candidates
        // without touching any state.
        if self.is_broken() {
            return ScanControl::Halt;
        }

        if !fast {
            if let Some(bounds) = report.bounds {
                if !bounds.contains(to_offset) {
                    // Match fell outside its valid offset window.
                    #[cfg(feature = "stats")]
                    {
                        self.stats.bounds_rejected += 1;
                    }
                    return ScanControl::ContinueNoExhaust;
                }
            }

            if self.exhaustion.is_exhausted(report.ekey) {
                // Real match, but the expression is single-shot and already
                // fired; consume silently.
                #[cfg(feature = "stats")]
                {
                    self.stats.exhausted_suppressed += 1;
                }
                return ScanControl::Continue;
            }
        }

        // Housekeeping key for the deduper: the raw, pre-adjustment offset.
        let offset = to_offset;

        let mut from = match caller_from {
            Some(from) => from,
            None => match report.kind {
                ReportKind::ExternalCallback => SomStart::At(0),
                ReportKind::ExternalSomCallback if tracking_som => {
                    som.resolve_start(report, to_offset)
                }
                _ => SomStart::At(0),
            },
        };

        let to_offset = adjust_end_offset(to_offset, report.offset_adjust);
        debug_assert!(
            from.satisfies_order(to_offset),
            "match start past its adjusted end"
        );

        if !fast && tracking_som && report.min_length > 0 {
            if !satisfies_min_length(report.min_length, from, to_offset) {
                #[cfg(feature = "stats")]
                {
                    self.stats.min_length_rejected += 1;
                }
                return ScanControl::ContinueNoExhaust;
            }
            // The quash applies to what the user sees, not to the length
            // check, so it runs only after the check passes.
            if report.quash_som {
                from = SomStart::At(0);
            }
        }

        match self
            .deduper
            .advance_and_check(offset, from, to_offset, report, tracking_som, som)
        {
            DedupeResult::Halt => {
                self.mark_broken(BrokenReason::UserRequested);
                return ScanControl::Halt;
            }
            DedupeResult::Skip => {
                #[cfg(feature = "stats")]
                {
                    if tracking_som && report.kind == ReportKind::ExternalSomCallback
                        && !report.quash_som
                    {
                        self.stats.som_deferred += 1;
                    } else {
                        self.stats.dupe_suppressed += 1;
                    }
                }
                return ScanControl::ContinueNoExhaust;
            }
            DedupeResult::Continue => {}
        }

        let flags = delivery_flags(report.offset_adjust);
        #[cfg(feature = "stats")]
        {
            self.stats.delivered += 1;
        }
        if let ControlFlow::Break(()) =
            (self.on_match)(report.user_id, from.to_raw(), to_offset, flags)
        {
            self.mark_broken(BrokenReason::UserRequested);
            return ScanControl::Halt;
        }

        if !fast {
            if let Some(ekey) = report.ekey {
                self.exhaustion.mark(ekey);
                return ScanControl::Continue;
            }
        }
        ScanControl::ContinueNoExhaust
    }

    /// Delivers a pre-verified plain report to the user callback.
    ///
    /// The calling automaton guarantees: session not halted, bounds
    /// satisfied, report not exhausted, no minimum length, no SOM quash, and
    /// dedupe catch-up already done. Violations are contract breaches caught
    /// by debug assertions, not runtime conditions.
    pub fn deliver_match(&mut self, to_offset: u64, id: ReportId, exhaustible: bool) -> ScanControl {
        let report = self.reports().get(id);
        debug_assert!(!self.is_broken());
        debug_assert_eq!(report.kind, ReportKind::ExternalCallback);
        debug_assert!(report.bounds.map_or(true, |b| b.contains(to_offset)));
        debug_assert_eq!(report.min_length, 0);
        debug_assert!(!report.quash_som);
        debug_assert!(!self.exhaustion.is_exhausted(report.ekey));
        debug_assert!(!exhaustible || report.ekey.is_some());

        let to_offset = adjust_end_offset(to_offset, report.offset_adjust);
        let flags = delivery_flags(report.offset_adjust);
        #[cfg(feature = "stats")]
        {
            self.stats.delivered += 1;
        }
        if let ControlFlow::Break(()) = (self.on_match)(report.user_id, 0, to_offset, flags) {
            self.mark_broken(BrokenReason::UserRequested);
            return ScanControl::Halt;
        }

        if exhaustible {
            if let Some(ekey) = report.ekey {
                self.exhaustion.mark(ekey);
            }
            ScanControl::Continue
        } else {
            ScanControl::ContinueNoExhaust
        }
    }

    /// Delivers a pre-verified start-of-match report to the user callback.
    ///
    /// Same contract as [`ScanSession::deliver_match`], with the caller
    /// additionally guaranteeing length satisfaction and a quashed (zero)
    /// start where the descriptor demands one.
    pub fn deliver_som_match(
        &mut self,
        from: SomStart,
        to_offset: u64,
        id: ReportId,
        exhaustible: bool,
    ) -> ScanControl {
        let report = self.reports().get(id);
        debug_assert!(!self.is_broken());
        debug_assert!(report.is_external());
        debug_assert!(report.bounds.map_or(true, |b| b.contains(to_offset)));
        debug_assert!(!self.exhaustion.is_exhausted(report.ekey));
        debug_assert!(!exhaustible || report.ekey.is_some());

        let to_offset = adjust_end_offset(to_offset, report.offset_adjust);
        debug_assert!(from.satisfies_order(to_offset));
        debug_assert!(
            report.min_length == 0 || satisfies_min_length(report.min_length, from, to_offset)
        );
        debug_assert!(!report.quash_som || from == SomStart::At(0));

        let flags = delivery_flags(report.offset_adjust);
        #[cfg(feature = "stats")]
        {
            self.stats.delivered += 1;
        }
        if let ControlFlow::Break(()) =
            (self.on_match)(report.user_id, from.to_raw(), to_offset, flags)
        {
            self.mark_broken(BrokenReason::UserRequested);
            return ScanControl::Halt;
        }

        if exhaustible {
            if let Some(ekey) = report.ekey {
                self.exhaustion.mark(ekey);
            }
            ScanControl::Continue
        } else {
            ScanControl::ContinueNoExhaust
        }
    }
}
