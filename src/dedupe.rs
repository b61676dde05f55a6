//! Match deduper: per-scan suppression of repeated events at one end offset.
//!
//! Deduplication is per end offset, not global; the same pattern can
//! legitimately match again later in the stream. Because the automata present
//! end offsets in non-decreasing order, usually stepping by one byte, the
//! deduper double-buffers its key bitsets by end-offset parity: advancing by
//! one reuses the buffer from two offsets ago after an O(words) clear instead
//! of paying an O(key count) clear per event. Any larger jump invalidates the
//! scheme and both buffers are cleared.
//!
//! SOM-tracked events are never delivered from here. They are folded into a
//! per-(parity, key) minimal-start table and handed to the external SOM
//! tracker's flush when the scan moves on, so that only the earliest start for
//! a window is ever reported.

use crate::report::{DedupeKey, ReportDescriptor, ReportKind};
use crate::som::{FlushResult, SomStart, SomTracker};
use crate::stdx::KeyBits;
use std::ops::ControlFlow;

/// Dirty-mask bit: some pending SOM entry was recorded with a nonzero offset
/// adjustment (its reported end is one byte before the housekeeping offset).
pub const SOM_DIRTY_ADJUSTED: u8 = 1 << 0;
/// Dirty-mask bit: some pending SOM entry was recorded with no adjustment.
pub const SOM_DIRTY_UNADJUSTED: u8 = 1 << 1;

/// Verdict for one candidate event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DedupeResult {
    /// Not a dupe; the event proceeds to delivery.
    Continue,
    /// Suppress: duplicate at this end offset, or deferred for SOM flush.
    Skip,
    /// The consumer asked to stop during the SOM flush.
    Halt,
}

/// One parity buffer: exact-match bits, SOM bits, and the minimal observed
/// start offset per dedupe key.
///
/// Kept as its own type so the clear/reuse policy is testable in isolation
/// from the pipeline. Start slots are only meaningful while the matching SOM
/// bit is set; clearing the bits is enough to invalidate them.
#[derive(Clone, Debug)]
pub struct DedupWindow {
    exact: KeyBits,
    som: KeyBits,
    som_starts: Box<[u64]>,
}

impl DedupWindow {
    pub fn new(dkey_count: usize) -> Self {
        Self {
            exact: KeyBits::zeroed(dkey_count),
            som: KeyBits::zeroed(dkey_count),
            som_starts: vec![0u64; dkey_count].into_boxed_slice(),
        }
    }

    /// Clears the exact-match bits, making the buffer reusable for a new end
    /// offset. SOM bits are not touched here: pending entries survive until
    /// the flush drains them.
    #[inline]
    pub fn clear_exact(&mut self) {
        self.exact.clear_all();
    }

    /// Records an exact-match event for `dkey`; returns `true` when the key
    /// already fired at this buffer's end offset (a duplicate).
    #[inline]
    pub fn note_exact(&mut self, dkey: DedupeKey) -> bool {
        self.exact.test_and_set(dkey.0 as usize)
    }

    /// Folds a SOM-tracked event into the minimal-start table: first write for
    /// the window records `start`, later writes keep the minimum.
    #[inline]
    pub fn merge_som_start(&mut self, dkey: DedupeKey, start: u64) {
        let idx = dkey.0 as usize;
        if self.som.test_and_set(idx) {
            self.som_starts[idx] = self.som_starts[idx].min(start);
        } else {
            self.som_starts[idx] = start;
        }
    }

    /// Returns the pending minimal start for `dkey`, if one is recorded.
    pub fn pending_som_start(&self, dkey: DedupeKey) -> Option<SomStart> {
        let idx = dkey.0 as usize;
        self.som
            .is_set(idx)
            .then(|| SomStart::from_raw(self.som_starts[idx]))
    }

    /// Yields and clears every pending SOM entry in ascending key order,
    /// stopping early when `f` breaks.
    pub fn drain_pending(
        &mut self,
        mut f: impl FnMut(DedupeKey, SomStart) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        let starts = &self.som_starts;
        for idx in self.som.drain() {
            f(DedupeKey(idx as u32), SomStart::from_raw(starts[idx]))?;
        }
        ControlFlow::Continue(())
    }

    #[cfg(test)]
    fn exact_is_set(&self, dkey: DedupeKey) -> bool {
        self.exact.is_set(dkey.0 as usize)
    }
}

/// Mutable view of the deduper's pending SOM state, handed to
/// [`SomTracker::flush`].
///
/// The flush component reads the dirty mask to learn which parities hold work
/// (adjusted entries sit one byte before the housekeeping offset, so their
/// parity is the opposite of unadjusted ones), drains the entries it intends
/// to deliver, and clears the mask.
pub struct SomPending<'a> {
    windows: &'a mut [DedupWindow; 2],
    dirty: &'a mut u8,
    prev_offset: Option<u64>,
}

impl SomPending<'_> {
    /// The end offset pending entries were recorded against, or `None` when
    /// no event has been processed yet (no entries can exist either).
    #[inline]
    pub fn prev_offset(&self) -> Option<u64> {
        self.prev_offset
    }

    /// Combination of [`SOM_DIRTY_ADJUSTED`] and [`SOM_DIRTY_UNADJUSTED`].
    #[inline]
    pub fn dirty_mask(&self) -> u8 {
        *self.dirty
    }

    #[inline]
    pub fn clear_dirty(&mut self) {
        *self.dirty = 0;
    }

    /// Drains pending entries recorded at end-offset parity `parity`.
    pub fn drain_parity(
        &mut self,
        parity: usize,
        f: impl FnMut(DedupeKey, SomStart) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        assert!(parity < 2, "parity must be 0 or 1");
        self.windows[parity].drain_pending(f)
    }
}

/// Per-scan deduplication state.
///
/// Not thread-safe; one deduper belongs to exactly one scan session. End
/// offsets presented to [`MatchDeduper::advance_and_check`] must be
/// non-decreasing for the life of the scan; the parity scheme is unsound
/// otherwise, and the invariant is debug-asserted.
#[derive(Debug)]
pub struct MatchDeduper {
    /// End offset of the most recent event, `None` before the first.
    current_offset: Option<u64>,
    windows: [DedupWindow; 2],
    som_log_dirty: u8,
}

impl MatchDeduper {
    /// Creates cleared state sized to the table's dedupe key universe.
    pub fn new(dkey_count: u32) -> Self {
        Self {
            current_offset: None,
            windows: [
                DedupWindow::new(dkey_count as usize),
                DedupWindow::new(dkey_count as usize),
            ],
            som_log_dirty: 0,
        }
    }

    /// End offset of the most recently processed event.
    #[inline]
    pub fn current_offset(&self) -> Option<u64> {
        self.current_offset
    }

    /// Pending SOM dirty mask, for diagnostics and tests.
    #[inline]
    pub fn som_log_dirty(&self) -> u8 {
        self.som_log_dirty
    }

    /// Advances the deduper to `offset` and classifies one candidate event.
    ///
    /// `offset` is the automaton's raw (pre-adjustment) end offset and keys
    /// the housekeeping; `to_offset` is the post-adjustment end offset and
    /// keys the parity buffers. `from` is the resolved start of the reported
    /// window. `tracking_som` says whether start-of-match handling is active
    /// for this event.
    ///
    /// On an offset change, stale parity buffers are cleared (one for a step
    /// of exactly one, both otherwise) and, when SOM tracking is active, the
    /// tracker's flush runs for everything recorded before `offset`; a flush
    /// stop halts the scan immediately.
    pub fn advance_and_check(
        &mut self,
        offset: u64,
        from: SomStart,
        to_offset: u64,
        report: &ReportDescriptor,
        tracking_som: bool,
        som: &mut dyn SomTracker,
    ) -> DedupeResult {
        if !tracking_som && report.dkey.is_none() {
            // Nothing to dedupe and nothing to defer.
            return DedupeResult::Continue;
        }

        if self.current_offset != Some(offset) {
            debug_assert!(
                self.current_offset.map_or(true, |cur| cur < offset),
                "end offsets must be non-decreasing within a scan"
            );
            if self.current_offset.map(|cur| cur.wrapping_add(1)) == Some(offset) {
                // Contiguous step: only the buffer from two offsets ago is
                // stale. Its pending SOM side is preserved for the flush.
                self.windows[(offset & 1) as usize].clear_exact();
            } else {
                // First event or a jump: the parity assumption no longer
                // holds for either buffer.
                self.windows[0].clear_exact();
                self.windows[1].clear_exact();
            }

            if tracking_som {
                let pending = SomPending {
                    windows: &mut self.windows,
                    dirty: &mut self.som_log_dirty,
                    prev_offset: self.current_offset,
                };
                if som.flush(offset, pending) == FlushResult::Stop {
                    return DedupeResult::Halt;
                }
            }
            self.current_offset = Some(offset);
        }

        if let Some(dkey) = report.dkey {
            debug_assert!(report.offset_adjust == 0 || report.offset_adjust == -1);
            let window = &mut self.windows[(to_offset & 1) as usize];
            if report.kind == ReportKind::ExternalCallback || report.quash_som {
                if window.note_exact(dkey) {
                    // Already raised this report at this offset; squash dupe.
                    return DedupeResult::Skip;
                }
            } else if tracking_som {
                // Deferred SOM event: fold into the minimal-start table and
                // leave delivery to the flush once the window is final.
                window.merge_som_start(dkey, from.to_raw());
                if report.offset_adjust != 0 {
                    self.som_log_dirty |= SOM_DIRTY_ADJUSTED;
                } else {
                    self.som_log_dirty |= SOM_DIRTY_UNADJUSTED;
                }
                return DedupeResult::Skip;
            }
        }

        DedupeResult::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{DedupeKey, ReportDescriptor};
    use crate::som::NullSomTracker;

    const DKEYS: u32 = 8;

    fn plain(dkey: u32) -> ReportDescriptor {
        ReportDescriptor {
            dkey: Some(DedupeKey(dkey)),
            ..ReportDescriptor::external(0)
        }
    }

    fn som_report(dkey: u32) -> ReportDescriptor {
        ReportDescriptor {
            dkey: Some(DedupeKey(dkey)),
            ..ReportDescriptor::external_som(0)
        }
    }

    /// Scripted tracker recording flush calls and optionally stopping.
    #[derive(Default)]
    struct RecordingTracker {
        flushes: Vec<u64>,
        drained: Vec<(u64, DedupeKey, SomStart)>,
        stop_at: Option<u64>,
    }

    impl SomTracker for RecordingTracker {
        fn resolve_start(&mut self, _report: &ReportDescriptor, _to: u64) -> SomStart {
            SomStart::Horizon
        }

        fn flush(&mut self, up_to: u64, mut pending: SomPending<'_>) -> FlushResult {
            self.flushes.push(up_to);
            for parity in 0..2 {
                let drained = &mut self.drained;
                let _ = pending.drain_parity(parity, |dkey, start| {
                    drained.push((up_to, dkey, start));
                    ControlFlow::Continue(())
                });
            }
            pending.clear_dirty();
            if self.stop_at == Some(up_to) {
                FlushResult::Stop
            } else {
                FlushResult::Flushed
            }
        }
    }

    // ------------------------------------------------------------------
    // DedupWindow in isolation
    // ------------------------------------------------------------------

    #[test]
    fn window_note_exact_is_test_and_set() {
        let mut window = DedupWindow::new(4);
        assert!(!window.note_exact(DedupeKey(2)));
        assert!(window.note_exact(DedupeKey(2)));
        window.clear_exact();
        assert!(!window.note_exact(DedupeKey(2)));
    }

    #[test]
    fn window_keeps_minimal_start_regardless_of_order() {
        let mut window = DedupWindow::new(4);
        window.merge_som_start(DedupeKey(1), 50);
        window.merge_som_start(DedupeKey(1), 30);
        assert_eq!(window.pending_som_start(DedupeKey(1)), Some(SomStart::At(30)));

        // Reverse arrival order gives the same result.
        let mut window = DedupWindow::new(4);
        window.merge_som_start(DedupeKey(1), 30);
        window.merge_som_start(DedupeKey(1), 50);
        assert_eq!(window.pending_som_start(DedupeKey(1)), Some(SomStart::At(30)));
    }

    #[test]
    fn window_horizon_start_loses_to_any_concrete_start() {
        let mut window = DedupWindow::new(2);
        window.merge_som_start(DedupeKey(0), SomStart::Horizon.to_raw());
        window.merge_som_start(DedupeKey(0), 99);
        assert_eq!(window.pending_som_start(DedupeKey(0)), Some(SomStart::At(99)));
    }

    #[test]
    fn window_drain_clears_pending_entries() {
        let mut window = DedupWindow::new(4);
        window.merge_som_start(DedupeKey(0), 5);
        window.merge_som_start(DedupeKey(3), 7);

        let mut seen = Vec::new();
        let flow = window.drain_pending(|dkey, start| {
            seen.push((dkey, start));
            ControlFlow::Continue(())
        });
        assert_eq!(flow, ControlFlow::Continue(()));
        assert_eq!(
            seen,
            vec![
                (DedupeKey(0), SomStart::At(5)),
                (DedupeKey(3), SomStart::At(7))
            ]
        );
        assert_eq!(window.pending_som_start(DedupeKey(0)), None);
        assert_eq!(window.pending_som_start(DedupeKey(3)), None);
    }

    // ------------------------------------------------------------------
    // Parity housekeeping
    // ------------------------------------------------------------------

    #[test]
    fn exact_dupe_suppressed_within_one_offset() {
        let mut deduper = MatchDeduper::new(DKEYS);
        let mut som = NullSomTracker;
        let report = plain(1);

        let first =
            deduper.advance_and_check(10, SomStart::At(0), 10, &report, false, &mut som);
        let second =
            deduper.advance_and_check(10, SomStart::At(0), 10, &report, false, &mut som);
        assert_eq!(first, DedupeResult::Continue);
        assert_eq!(second, DedupeResult::Skip);

        // A different key at the same offset is unaffected.
        let other = plain(2);
        assert_eq!(
            deduper.advance_and_check(10, SomStart::At(0), 10, &other, false, &mut som),
            DedupeResult::Continue
        );
    }

    #[test]
    fn contiguous_steps_clear_the_reused_buffer() {
        let mut deduper = MatchDeduper::new(DKEYS);
        let mut som = NullSomTracker;
        let report = plain(0);

        // Offsets 5, 6, 7: the buffer used at 5 must be clear again at 7.
        for offset in [5u64, 6, 7] {
            assert_eq!(
                deduper.advance_and_check(
                    offset,
                    SomStart::At(0),
                    offset,
                    &report,
                    false,
                    &mut som
                ),
                DedupeResult::Continue,
                "offset {offset} should not be a dupe"
            );
        }
    }

    #[test]
    fn offset_jump_clears_both_buffers() {
        let mut deduper = MatchDeduper::new(DKEYS);
        let mut som = NullSomTracker;
        let report = plain(3);

        assert_eq!(
            deduper.advance_and_check(5, SomStart::At(0), 5, &report, false, &mut som),
            DedupeResult::Continue
        );
        // Jump to 9 (same parity as 5): without the double clear this would
        // be misreported as a dupe.
        assert_eq!(
            deduper.advance_and_check(9, SomStart::At(0), 9, &report, false, &mut som),
            DedupeResult::Continue
        );
        // Odd parity was cleared too.
        assert!(!deduper.windows[0].exact_is_set(DedupeKey(3)));
    }

    #[test]
    fn adjusted_event_dedupes_on_reported_parity() {
        let mut deduper = MatchDeduper::new(DKEYS);
        let mut som = NullSomTracker;
        let report = ReportDescriptor {
            offset_adjust: -1,
            ..plain(1)
        };

        // Housekeeping offset 8, reported end 7: bits live in the odd buffer.
        assert_eq!(
            deduper.advance_and_check(8, SomStart::At(0), 7, &report, false, &mut som),
            DedupeResult::Continue
        );
        assert_eq!(
            deduper.advance_and_check(8, SomStart::At(0), 7, &report, false, &mut som),
            DedupeResult::Skip
        );
        assert!(deduper.windows[1].exact_is_set(DedupeKey(1)));
        assert!(!deduper.windows[0].exact_is_set(DedupeKey(1)));
    }

    #[test]
    #[should_panic(expected = "non-decreasing")]
    fn decreasing_offsets_are_a_contract_violation() {
        let mut deduper = MatchDeduper::new(DKEYS);
        let mut som = NullSomTracker;
        let report = plain(0);
        deduper.advance_and_check(10, SomStart::At(0), 10, &report, false, &mut som);
        deduper.advance_and_check(9, SomStart::At(0), 9, &report, false, &mut som);
    }

    // ------------------------------------------------------------------
    // SOM deferral and flush
    // ------------------------------------------------------------------

    #[test]
    fn som_events_are_deferred_and_minimized() {
        let mut deduper = MatchDeduper::new(DKEYS);
        let mut tracker = RecordingTracker::default();
        let report = som_report(2);

        assert_eq!(
            deduper.advance_and_check(20, SomStart::At(50), 20, &report, true, &mut tracker),
            DedupeResult::Skip
        );
        assert_eq!(
            deduper.advance_and_check(20, SomStart::At(30), 20, &report, true, &mut tracker),
            DedupeResult::Skip
        );
        assert_eq!(deduper.som_log_dirty() & SOM_DIRTY_UNADJUSTED, SOM_DIRTY_UNADJUSTED);

        // Advancing hands the minimal start to the flush.
        let plain_report = plain(0);
        deduper.advance_and_check(21, SomStart::At(0), 21, &plain_report, true, &mut tracker);
        assert_eq!(
            tracker.drained,
            vec![(21, DedupeKey(2), SomStart::At(30))]
        );
        // First flush ran before any entries existed.
        assert_eq!(tracker.flushes, vec![20, 21]);
        assert_eq!(deduper.som_log_dirty(), 0);
    }

    #[test]
    fn adjusted_som_entries_set_their_own_dirty_bit() {
        let mut deduper = MatchDeduper::new(DKEYS);
        let mut tracker = RecordingTracker::default();
        let adjusted = ReportDescriptor {
            offset_adjust: -1,
            ..som_report(1)
        };

        deduper.advance_and_check(20, SomStart::At(3), 19, &adjusted, true, &mut tracker);
        assert_eq!(deduper.som_log_dirty(), SOM_DIRTY_ADJUSTED);

        let unadjusted = som_report(4);
        deduper.advance_and_check(20, SomStart::At(3), 20, &unadjusted, true, &mut tracker);
        assert_eq!(
            deduper.som_log_dirty(),
            SOM_DIRTY_ADJUSTED | SOM_DIRTY_UNADJUSTED
        );
    }

    #[test]
    fn flush_stop_halts_before_any_key_work() {
        let mut deduper = MatchDeduper::new(DKEYS);
        let mut tracker = RecordingTracker {
            stop_at: Some(31),
            ..RecordingTracker::default()
        };
        let report = som_report(0);

        deduper.advance_and_check(30, SomStart::At(1), 30, &report, true, &mut tracker);
        assert_eq!(
            deduper.advance_and_check(31, SomStart::At(2), 31, &report, true, &mut tracker),
            DedupeResult::Halt
        );
    }

    #[test]
    fn quash_som_uses_the_exact_path() {
        let mut deduper = MatchDeduper::new(DKEYS);
        let mut tracker = RecordingTracker::default();
        let report = ReportDescriptor {
            quash_som: true,
            ..som_report(5)
        };

        assert_eq!(
            deduper.advance_and_check(12, SomStart::At(4), 12, &report, true, &mut tracker),
            DedupeResult::Continue
        );
        assert_eq!(
            deduper.advance_and_check(12, SomStart::At(4), 12, &report, true, &mut tracker),
            DedupeResult::Skip
        );
        // Nothing was deferred.
        assert_eq!(deduper.som_log_dirty(), 0);
    }

    #[test]
    fn keyless_untracked_event_is_a_no_op() {
        let mut deduper = MatchDeduper::new(DKEYS);
        let mut som = NullSomTracker;
        let report = ReportDescriptor::external(0);

        assert_eq!(
            deduper.advance_and_check(40, SomStart::At(0), 40, &report, false, &mut som),
            DedupeResult::Continue
        );
        // Housekeeping did not even adopt the offset.
        assert_eq!(deduper.current_offset(), None);
    }

    #[test]
    fn keyless_tracked_event_still_flushes() {
        let mut deduper = MatchDeduper::new(DKEYS);
        let mut tracker = RecordingTracker::default();
        let report = ReportDescriptor::external_som(0);

        assert_eq!(
            deduper.advance_and_check(40, SomStart::At(2), 40, &report, true, &mut tracker),
            DedupeResult::Continue
        );
        assert_eq!(tracker.flushes, vec![40]);
        assert_eq!(deduper.current_offset(), Some(40));
    }

    use proptest::prelude::*;

    proptest! {
        /// The parity machinery must behave exactly like a naive set of
        /// `(end offset, key)` pairs: Skip iff the pair was seen before.
        #[test]
        fn exact_dedupe_matches_naive_model(
            steps in proptest::collection::vec((0u64..4, 0u32..DKEYS), 1..64)
        ) {
            use std::collections::HashSet;

            let mut deduper = MatchDeduper::new(DKEYS);
            let mut som = NullSomTracker;
            let mut seen: HashSet<(u64, u32)> = HashSet::new();
            let mut offset = 0u64;

            for (delta, dkey) in steps {
                offset += delta;
                let report = plain(dkey);
                let got = deduper.advance_and_check(
                    offset,
                    SomStart::At(0),
                    offset,
                    &report,
                    false,
                    &mut som,
                );
                let expected = if seen.insert((offset, dkey)) {
                    DedupeResult::Continue
                } else {
                    DedupeResult::Skip
                };
                prop_assert_eq!(got, expected, "offset {} key {}", offset, dkey);
            }
        }
    }
}
