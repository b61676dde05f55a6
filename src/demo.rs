//! Demo front end: a literal multi-pattern scanner wired through the full
//! acceptance pipeline.
//!
//! This is not a production matcher. It exists to show the intended wiring:
//! an automaton (here an Aho-Corasick literal automaton) produces raw
//! candidate events in end-offset order, and every event goes through
//! [`ScanSession::accept_match`] before the user sees it. Real integrations
//! plug their own automata and a real SOM tracker into the same seam.

use crate::report::{Bounds, ReportDescriptor, ReportId, ReportTable, ReportTableBuilder};
use crate::session::{OnMatch, ScanControl, ScanSession};
use crate::som::NullSomTracker;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder};

/// One demo pattern: the literal to find plus the acceptance constraints its
/// report should carry.
///
/// Key groups are caller-chosen labels; patterns naming the same dedupe group
/// collapse at a shared end offset, and patterns naming the same exhaustion
/// group go quiet together after the first delivery.
pub struct LiteralPattern {
    pub literal: Vec<u8>,
    pub user_id: u32,
    pub dedupe_group: Option<u32>,
    pub exhaust_group: Option<u32>,
    pub bounds: Option<Bounds>,
}

impl LiteralPattern {
    /// Plain pattern reporting `user_id` with no runtime checks.
    pub fn simple(literal: impl Into<Vec<u8>>, user_id: u32) -> Self {
        Self {
            literal: literal.into(),
            user_id,
            dedupe_group: None,
            exhaust_group: None,
            bounds: None,
        }
    }
}

/// Literal scanner: patterns compiled once, scanned many times.
///
/// Pattern `i` of the automaton maps to report `i` of the table; the
/// automaton's match end (exclusive) is the pipeline's end offset.
pub struct LiteralScanner {
    automaton: AhoCorasick,
    reports: ReportTable,
    report_ids: Vec<ReportId>,
    // Early termination on a fully-set exhaustion vector is only sound when
    // every pattern is single-shot; a keyless pattern can always still fire.
    can_exhaust: bool,
}

impl LiteralScanner {
    pub fn new(patterns: Vec<LiteralPattern>) -> Self {
        let automaton = AhoCorasickBuilder::new()
            .build(patterns.iter().map(|p| p.literal.as_slice()))
            .expect("build literal automaton");

        let mut builder = ReportTableBuilder::new();
        let mut can_exhaust = !patterns.is_empty();
        let report_ids = patterns
            .into_iter()
            .map(|p| {
                let dkey = p.dedupe_group.map(|g| builder.dedupe_key(g));
                let ekey = p.exhaust_group.map(|g| builder.exhaust_key(g));
                can_exhaust &= ekey.is_some();
                builder.push(ReportDescriptor {
                    dkey,
                    ekey,
                    bounds: p.bounds,
                    ..ReportDescriptor::external(p.user_id)
                })
            })
            .collect();

        Self {
            automaton,
            reports: builder.build(),
            report_ids,
            can_exhaust,
        }
    }

    /// The compiled report table, for callers sizing their own state.
    pub fn reports(&self) -> &ReportTable {
        &self.reports
    }

    /// Scans `haystack`, delivering accepted matches to `on_match`.
    ///
    /// Overlapping matches are reported. Returns the session's final control
    /// state; [`ScanControl::Halt`] means the callback stopped the scan.
    pub fn scan<'a>(&'a self, haystack: &[u8], on_match: &'a mut OnMatch<'a>) -> ScanControl {
        let mut session = ScanSession::new(&self.reports, on_match);
        let mut som = NullSomTracker;
        let mut control = ScanControl::ContinueNoExhaust;

        // find_overlapping_iter yields matches in end order, which is exactly
        // the non-decreasing-offset contract the deduper needs.
        for m in self.automaton.find_overlapping_iter(haystack) {
            let id = self.report_ids[m.pattern().as_usize()];
            control = session.accept_match(&mut som, m.end() as u64, id, false, false);
            if control == ScanControl::Halt {
                break;
            }
            if self.can_exhaust && session.exhaustion().all_exhausted() {
                // Nothing left that could ever report; stop the walk early.
                break;
            }
        }
        control
    }
}
