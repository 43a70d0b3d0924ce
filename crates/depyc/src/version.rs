//! Python language version gating.
//!
//! A `(major, minor)` pair selects the opcode table (see [`crate::opcode`]), the
//! jump-target arithmetic used by the decoder, and a handful of prefix/suffix
//! behaviors (word-aligned bytecode since 3.6, inline caches since 3.11). A
//! `PyVersion` is immutable once constructed and is threaded read-only through
//! every downstream component.

use std::fmt;

/// `(major, minor)` language version, e.g. `PyVersion::new(3, 11)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PyVersion {
    pub major: u8,
    pub minor: u8,
}

impl PyVersion {
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Bytecode is word-aligned (2 bytes/instruction, explicit `EXTENDED_ARG`
    /// chaining, possible inline caches) from 3.6 onward. Before that, the
    /// "tall" 1-or-3-byte layout applies.
    #[must_use]
    pub const fn is_word_aligned(self) -> bool {
        self.at_least(3, 6)
    }

    /// Inline cache entries follow certain opcodes starting in 3.11.
    #[must_use]
    pub const fn has_inline_caches(self) -> bool {
        self.at_least(3, 11)
    }

    /// 3.11+ uses a per-code exception table instead of `SETUP_EXCEPT`/
    /// `SETUP_FINALLY` block-setup opcodes.
    #[must_use]
    pub const fn has_exception_table(self) -> bool {
        self.at_least(3, 11)
    }

    /// 3.10+ jump arguments are relative-to-instruction-end and, through
    /// 3.11, scaled by 2 (word-addressed); absolute byte offsets apply
    /// before 3.10.
    #[must_use]
    pub const fn has_relative_jumps(self) -> bool {
        self.at_least(3, 10)
    }

    /// Python 2.x `EXEC_STMT` retains its bespoke `print`-style statement
    /// shape rather than being translated to a Python-3 construct (spec
    /// open question, §9).
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        self.major < 3
    }

    #[must_use]
    pub const fn at_least(self, major: u8, minor: u8) -> bool {
        self.major > major || (self.major == major && self.minor >= minor)
    }
}

impl fmt::Display for PyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_reflexive_and_transitive() {
        let a = PyVersion::new(3, 9);
        let b = PyVersion::new(3, 11);
        let c = PyVersion::new(3, 12);
        assert!(a <= a);
        assert!(a < b);
        assert!(b < c);
        assert!(a < c);
    }

    #[test]
    fn word_alignment_boundary() {
        assert!(!PyVersion::new(3, 5).is_word_aligned());
        assert!(PyVersion::new(3, 6).is_word_aligned());
        assert!(PyVersion::new(3, 12).is_word_aligned());
    }

    #[test]
    fn inline_cache_boundary() {
        assert!(!PyVersion::new(3, 10).has_inline_caches());
        assert!(PyVersion::new(3, 11).has_inline_caches());
    }

    #[test]
    fn legacy_is_major_2_or_below() {
        assert!(PyVersion::new(2, 7).is_legacy());
        assert!(!PyVersion::new(3, 0).is_legacy());
    }
}
