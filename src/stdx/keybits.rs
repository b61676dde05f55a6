//! Runtime-sized key bitset backed by `u64` words.
//!
//! [`KeyBits`] is the storage primitive behind the exhaustion vector and the
//! dedupe parity buffers: a flat bitset indexed by a compile-time-assigned key.
//! Padding bits beyond the logical length always remain zero, so word-level
//! scans (`all_set`, `drain`) never observe phantom bits.

/// Computes the number of `u64` words needed to store `n` bits.
pub const fn words_for_keys(n: usize) -> usize {
    n.div_ceil(64)
}

/// Fixed-length bitset over dedupe/exhaustion keys.
///
/// All indexing operations panic when `idx >= len`; key ranges are assigned at
/// compile time, so an out-of-range index is a caller bug, not a runtime
/// condition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBits {
    words: Box<[u64]>,
    len: usize,
}

impl KeyBits {
    /// Creates a bitset with capacity for `len` keys, all cleared.
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0u64; words_for_keys(len)].into_boxed_slice(),
            len,
        }
    }

    /// Returns the number of addressable keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the bitset addresses zero keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn last_word_mask(&self) -> u64 {
        let remaining = self.len % 64;
        if remaining == 0 {
            u64::MAX
        } else {
            (1u64 << remaining) - 1
        }
    }

    /// Returns whether the bit for `idx` is set.
    ///
    /// Panics if `idx >= len`.
    #[inline]
    pub fn is_set(&self, idx: usize) -> bool {
        assert!(idx < self.len, "key index out of bounds");
        (self.words[idx / 64] & (1u64 << (idx % 64))) != 0
    }

    /// Sets the bit for `idx`.
    ///
    /// Panics if `idx >= len`.
    #[inline]
    pub fn set(&mut self, idx: usize) {
        assert!(idx < self.len, "key index out of bounds");
        self.words[idx / 64] |= 1u64 << (idx % 64);
    }

    /// Sets the bit for `idx` and reports whether it was already set.
    ///
    /// This is the dedupe primitive: the first caller for a key gets `false`,
    /// every subsequent caller gets `true` until the next clear.
    ///
    /// Panics if `idx >= len`.
    #[inline]
    pub fn test_and_set(&mut self, idx: usize) -> bool {
        assert!(idx < self.len, "key index out of bounds");
        let word = &mut self.words[idx / 64];
        let mask = 1u64 << (idx % 64);
        let was_set = (*word & mask) != 0;
        *word |= mask;
        was_set
    }

    /// Clears every bit.
    #[inline]
    pub fn clear_all(&mut self) {
        self.words.fill(0);
    }

    /// Returns `true` when no bits are set.
    pub fn none_set(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Returns `true` when every bit in `[0, len)` is set.
    pub fn all_set(&self) -> bool {
        if self.words.is_empty() {
            return true;
        }
        let last = self.words.len() - 1;
        for (i, &word) in self.words.iter().enumerate() {
            let expect = if i == last {
                self.last_word_mask()
            } else {
                u64::MAX
            };
            if word != expect {
                return false;
            }
        }
        true
    }

    /// Drains set bit indices in ascending order, clearing each as it is
    /// yielded. Dropping the iterator mid-way leaves the remaining bits set.
    #[inline]
    pub fn drain(&mut self) -> DrainSetBits<'_> {
        DrainSetBits {
            words: &mut self.words,
            word_idx: 0,
        }
    }
}

/// Iterator produced by [`KeyBits::drain`]: yields and clears set bits in
/// ascending index order.
pub struct DrainSetBits<'a> {
    words: &'a mut [u64],
    word_idx: usize,
}

impl Iterator for DrainSetBits<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        while self.word_idx < self.words.len() {
            let word = &mut self.words[self.word_idx];
            if *word != 0 {
                let bit = word.trailing_zeros() as usize;
                *word &= *word - 1;
                return Some(self.word_idx * 64 + bit);
            }
            self.word_idx += 1;
        }
        None
    }
}
