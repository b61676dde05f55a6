//! Small, self-contained data structures used across the crate.

pub mod keybits;

pub use keybits::{words_for_keys, DrainSetBits, KeyBits};
