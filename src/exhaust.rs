//! Per-scan exhaustion vector: one sticky bit per single-shot expression.
//!
//! Created zeroed at scan start. A bit transitions 0→1 when an exhaustible
//! report is delivered and is never cleared within the scan; the vector is
//! discarded with the session at scan end.

use crate::report::ExhaustKey;
use crate::stdx::KeyBits;

/// Bitset over exhaustion keys, scoped to one scan.
#[derive(Clone, Debug)]
pub struct ExhaustionVector {
    bits: KeyBits,
}

impl ExhaustionVector {
    /// Creates a cleared vector sized to the table's exhaustion key universe.
    pub fn zeroed(key_count: u32) -> Self {
        Self {
            bits: KeyBits::zeroed(key_count as usize),
        }
    }

    /// Returns whether the report carrying `key` has already fired.
    ///
    /// `None` means the report is never exhaustible, so the answer is `false`.
    #[inline]
    pub fn is_exhausted(&self, key: Option<ExhaustKey>) -> bool {
        match key {
            Some(key) => self.bits.is_set(key.0 as usize),
            None => false,
        }
    }

    /// Latches the bit for `key`. Idempotent.
    #[inline]
    pub fn mark(&mut self, key: ExhaustKey) {
        self.bits.set(key.0 as usize);
    }

    /// Returns whether every single-shot expression has fired.
    ///
    /// A scan driver can use this to end the scan early once nothing further
    /// can be reported. A database with no exhaustion keys can never reach
    /// that state, so an empty vector answers `false`.
    pub fn all_exhausted(&self) -> bool {
        !self.bits.is_empty() && self.bits.all_set()
    }

    /// Number of exhaustion keys tracked.
    #[inline]
    pub fn key_count(&self) -> usize {
        self.bits.len()
    }
}
