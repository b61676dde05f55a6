//! Compiled report descriptors and the immutable lookup table over them.
//!
//! A report descriptor is the per-pattern metadata the acceptance pipeline
//! consults for every raw match event: offset bounds, minimum length, the
//! offset correction for matchers that overshoot by a byte, and the optional
//! dedupe/exhaustion keys. The table is built once at compile time and shared
//! read-only across every concurrent scan of the same database.

use ahash::AHashMap;

/// Identifier of a compiled report, handed out by [`ReportTableBuilder::push`].
///
/// Callers are contractually required to pass only ids previously discovered
/// by the matching automata; [`ReportTable::get`] panics on anything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReportId(pub u32);

/// Index into the dedupe parity buffers.
///
/// Reports sharing a key must be deduplicated against each other at a shared
/// end offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DedupeKey(pub u32);

/// Index into the exhaustion vector.
///
/// Identifies a single-shot expression: once any report carrying the key
/// fires, further matches for the key are suppressed for the rest of the scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExhaustKey(pub u32);

/// What a compiled report does when it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportKind {
    /// Plain user callback; the reported start offset is always zero.
    ExternalCallback,
    /// User callback with a tracked start-of-match offset.
    ExternalSomCallback,
    /// Engine-internal start-of-match bookkeeping event. Never reaches the
    /// acceptance pipeline; handled upstream by the automaton runtime.
    InternalSomEvent,
}

/// Inclusive window of end offsets at which a report may fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub min_offset: u64,
    pub max_offset: u64,
}

impl Bounds {
    /// Returns whether `offset` lies inside `[min_offset, max_offset]`.
    #[inline]
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.min_offset && offset <= self.max_offset
    }

    // A bounds window must constrain something: unconstrained reports carry
    // `bounds: None` instead.
    pub(crate) fn assert_valid(&self, min_length: u64) {
        assert!(
            self.min_offset <= self.max_offset,
            "report bounds inverted: [{},{}]",
            self.min_offset,
            self.max_offset
        );
        assert!(
            self.min_offset > 0 || min_length > 0 || self.max_offset < u64::MAX,
            "report bounds constrain nothing"
        );
    }
}

/// Per-report metadata consulted on every candidate match event.
///
/// Built once by the pattern compiler, immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportDescriptor {
    pub kind: ReportKind,
    /// Opaque value handed to the user callback.
    pub user_id: u32,
    /// Signed correction applied to the end offset before reporting.
    /// Compensates for automata that match one byte past the true end;
    /// observed range is `{-1, 0}`.
    pub offset_adjust: i32,
    /// Exhaustion key, when the report is single-shot.
    pub ekey: Option<ExhaustKey>,
    /// Dedupe key, when repeated events at one end offset must collapse.
    pub dkey: Option<DedupeKey>,
    /// End-offset window, when the report is positionally constrained.
    pub bounds: Option<Bounds>,
    /// Minimum match length enforced against the tracked start offset.
    /// Zero means unconstrained.
    pub min_length: u64,
    /// Forces the reported start offset to zero regardless of the true start.
    pub quash_som: bool,
}

impl ReportDescriptor {
    /// Plain external-callback descriptor with no runtime checks.
    pub fn external(user_id: u32) -> Self {
        Self {
            kind: ReportKind::ExternalCallback,
            user_id,
            offset_adjust: 0,
            ekey: None,
            dkey: None,
            bounds: None,
            min_length: 0,
            quash_som: false,
        }
    }

    /// Start-of-match-tracked external descriptor with no runtime checks.
    pub fn external_som(user_id: u32) -> Self {
        Self {
            kind: ReportKind::ExternalSomCallback,
            ..Self::external(user_id)
        }
    }

    /// Returns whether the report is visible to the user at all.
    #[inline]
    pub fn is_external(&self) -> bool {
        matches!(
            self.kind,
            ReportKind::ExternalCallback | ReportKind::ExternalSomCallback
        )
    }

    /// Returns whether any of the bounds/exhaustion/min-length checks can
    /// reject or consume an event for this report.
    ///
    /// The pipeline's `fast` flag may only be true when this is false; the
    /// adaptor entry points debug-assert that equivalence rather than trusting
    /// the caller-supplied flag.
    #[inline]
    pub fn needs_runtime_checks(&self) -> bool {
        self.bounds.is_some() || self.ekey.is_some() || self.min_length > 0
    }

    pub(crate) fn assert_valid(&self) {
        assert!(
            self.offset_adjust == 0 || self.offset_adjust == -1,
            "report offset_adjust out of range: {}",
            self.offset_adjust
        );
        if let Some(bounds) = self.bounds {
            bounds.assert_valid(self.min_length);
        }
        if self.min_length > 0 || self.quash_som {
            assert!(
                self.kind != ReportKind::InternalSomEvent,
                "som options on an internal report"
            );
        }
    }
}

/// Immutable array of report descriptors plus the dedupe/exhaustion key
/// universe sizes, shared read-only across concurrent scans.
#[derive(Clone, Debug)]
pub struct ReportTable {
    reports: Box<[ReportDescriptor]>,
    dkey_count: u32,
    ekey_count: u32,
}

impl ReportTable {
    /// Looks up a descriptor by id.
    ///
    /// Panics if `id` was not issued by the builder that produced this table;
    /// that is a programming error in the calling automaton, not a runtime
    /// condition.
    #[inline]
    pub fn get(&self, id: ReportId) -> &ReportDescriptor {
        let idx = id.0 as usize;
        assert!(idx < self.reports.len(), "invalid report id {}", id.0);
        &self.reports[idx]
    }

    /// Number of compiled reports.
    #[inline]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Returns `true` when the table holds no reports.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Size of the dedupe key universe; parity buffers are sized to this.
    #[inline]
    pub fn dedupe_key_count(&self) -> u32 {
        self.dkey_count
    }

    /// Size of the exhaustion key universe.
    #[inline]
    pub fn exhaust_key_count(&self) -> u32 {
        self.ekey_count
    }
}

/// Builder that assigns dedupe and exhaustion keys from caller-side group ids
/// and validates descriptor invariants at build time.
///
/// Reports requesting the same dedupe group receive the same [`DedupeKey`];
/// likewise for exhaustion groups. Key spaces are dense, so per-scan state is
/// sized exactly to what the table uses.
#[derive(Default)]
pub struct ReportTableBuilder {
    reports: Vec<ReportDescriptor>,
    dkey_by_group: AHashMap<u32, DedupeKey>,
    ekey_by_group: AHashMap<u32, ExhaustKey>,
}

impl ReportTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the dedupe key for `group`, assigning the next dense index on
    /// first use.
    pub fn dedupe_key(&mut self, group: u32) -> DedupeKey {
        let next = DedupeKey(self.dkey_by_group.len() as u32);
        *self.dkey_by_group.entry(group).or_insert(next)
    }

    /// Returns the exhaustion key for `group`, assigning the next dense index
    /// on first use.
    pub fn exhaust_key(&mut self, group: u32) -> ExhaustKey {
        let next = ExhaustKey(self.ekey_by_group.len() as u32);
        *self.ekey_by_group.entry(group).or_insert(next)
    }

    /// Validates and appends a descriptor, returning its id.
    ///
    /// Panics when the descriptor violates a table invariant (inverted or
    /// vacuous bounds, out-of-range offset adjust, keys not issued by this
    /// builder).
    pub fn push(&mut self, desc: ReportDescriptor) -> ReportId {
        desc.assert_valid();
        if let Some(dkey) = desc.dkey {
            assert!(
                (dkey.0 as usize) < self.dkey_by_group.len(),
                "dedupe key {} not issued by this builder",
                dkey.0
            );
        }
        if let Some(ekey) = desc.ekey {
            assert!(
                (ekey.0 as usize) < self.ekey_by_group.len(),
                "exhaust key {} not issued by this builder",
                ekey.0
            );
        }
        let id = ReportId(self.reports.len() as u32);
        self.reports.push(desc);
        id
    }

    pub fn build(self) -> ReportTable {
        ReportTable {
            reports: self.reports.into_boxed_slice(),
            dkey_count: self.dkey_by_group.len() as u32,
            ekey_count: self.ekey_by_group.len() as u32,
        }
    }
}
