//! Start-of-match collaborator interface.
//!
//! The pipeline does not own SOM state; it asks an external tracker for the
//! current start offset of a report and tells it when to flush deferred SOM
//! matches. [`SomStart`] keeps "start lies earlier than tracked history" as a
//! proper sum-type variant instead of a magic offset value: `Horizon`
//! satisfies any minimum-length requirement and is never compared
//! numerically.

use crate::dedupe::SomPending;
use crate::report::ReportDescriptor;

/// Raw callback encoding of [`SomStart::Horizon`].
///
/// Delivered to the user callback when a match's start precedes tracked
/// history; also the value stored in the deduper's min-start slots so that
/// `min()` prefers any concrete start over an unknown one.
pub const PAST_HORIZON: u64 = u64::MAX;

/// Resolved start offset of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SomStart {
    /// Concrete start offset.
    At(u64),
    /// Start is earlier than tracked history.
    Horizon,
}

impl SomStart {
    /// Encodes for the user callback and the deduper's min-start tables.
    #[inline]
    pub const fn to_raw(self) -> u64 {
        match self {
            SomStart::At(offset) => offset,
            SomStart::Horizon => PAST_HORIZON,
        }
    }

    /// Inverse of [`SomStart::to_raw`].
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        if raw == PAST_HORIZON {
            SomStart::Horizon
        } else {
            SomStart::At(raw)
        }
    }

    #[inline]
    pub const fn is_horizon(self) -> bool {
        matches!(self, SomStart::Horizon)
    }

    /// Returns whether this start may legally precede `to_offset`.
    ///
    /// `Horizon` is incomparable and always passes; used in debug assertions
    /// on the `from <= to` pipeline invariant.
    #[inline]
    pub fn satisfies_order(self, to_offset: u64) -> bool {
        match self {
            SomStart::At(from) => from <= to_offset,
            SomStart::Horizon => true,
        }
    }
}

/// Returns whether a match `[from, to_offset]` is at least `min_length` long.
///
/// A `Horizon` start automatically satisfies any length requirement.
#[inline]
pub fn satisfies_min_length(min_length: u64, from: SomStart, to_offset: u64) -> bool {
    debug_assert!(min_length > 0);
    match from {
        SomStart::Horizon => true,
        SomStart::At(from) => {
            debug_assert!(from <= to_offset);
            to_offset.saturating_sub(from) >= min_length
        }
    }
}

/// Outcome of flushing deferred SOM matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushResult {
    /// All pending matches handled; scanning continues.
    Flushed,
    /// The consumer asked to stop during the flush.
    Stop,
}

/// External component that tracks start offsets and delivers deferred SOM
/// matches.
///
/// The deduper records SOM-tracked events as pending minimal-start entries
/// instead of delivering them; when the scan moves to a new end offset it
/// hands those entries to [`SomTracker::flush`] through a [`SomPending`]
/// view. Implementations map dedupe keys back to reports and drive the
/// delivery path; that machinery is outside this crate.
pub trait SomTracker {
    /// Returns the current start offset for a SOM-tracked report matching at
    /// `to_offset`.
    fn resolve_start(&mut self, report: &ReportDescriptor, to_offset: u64) -> SomStart;

    /// Delivers every pending SOM match recorded before `up_to`.
    ///
    /// Returns [`FlushResult::Stop`] when the consumer halted the scan from
    /// inside a delivery; the pipeline then halts without further work.
    fn flush(&mut self, up_to: u64, pending: SomPending<'_>) -> FlushResult;
}

/// Tracker for databases compiled without SOM patterns.
///
/// Resolution answers `Horizon` (nothing is tracked) and flushes are no-ops;
/// the deduper never records pending entries when no report is SOM-tracked.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSomTracker;

impl SomTracker for NullSomTracker {
    fn resolve_start(&mut self, _report: &ReportDescriptor, _to_offset: u64) -> SomStart {
        SomStart::Horizon
    }

    fn flush(&mut self, _up_to: u64, pending: SomPending<'_>) -> FlushResult {
        debug_assert_eq!(pending.dirty_mask(), 0, "pending SOM state without a tracker");
        FlushResult::Flushed
    }
}
