//! Per-language-version opcode tables (component A).
//!
//! Each supported version gets an immutable, sorted-by-byte table mapping
//! byte → [`OpMeta`]. Callers never hard-code byte values or branch on
//! mnemonics directly for version-dependent behavior; they go through
//! [`lookup`], [`Opcode::has_arg`], [`Opcode::cache_entries`] and the
//! decoder's own `jump_target`.

mod cache311;
mod legacy;
mod word;

use crate::version::PyVersion;

/// A decoded opcode: the raw byte plus a handle back into the version's
/// static table entry that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub byte: u8,
    pub meta: &'static OpMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCategory {
    Load,
    Store,
    Arithmetic,
    Compare,
    Unary,
    Jump,
    JumpBackward,
    Call,
    StackManip,
    Build,
    BlockSetup,
    BlockTerminator,
    Iteration,
    ExceptionHandling,
    CacheOnly,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpMeta {
    pub mnemonic: &'static str,
    pub has_arg: bool,
    pub category: OpCategory,
    /// Number of 2-byte inline cache entries following the instruction.
    /// Always 0 before 3.11.
    pub cache_entries: u8,
}

impl Opcode {
    #[must_use]
    pub fn is_jump(self) -> bool {
        matches!(self.meta.category, OpCategory::Jump | OpCategory::JumpBackward)
    }

    #[must_use]
    pub fn is_conditional_jump(self) -> bool {
        matches!(
            self.meta.mnemonic,
            "POP_JUMP_IF_TRUE"
                | "POP_JUMP_IF_FALSE"
                | "POP_JUMP_FORWARD_IF_TRUE"
                | "POP_JUMP_FORWARD_IF_FALSE"
                | "JUMP_IF_TRUE_OR_POP"
                | "JUMP_IF_FALSE_OR_POP"
        )
    }

    /// `true` for the `…OR_POP` family whose false-branch does not pop,
    /// i.e. the value survives onto whichever arm does not take the jump.
    #[must_use]
    pub fn is_or_pop(self) -> bool {
        matches!(self.meta.mnemonic, "JUMP_IF_TRUE_OR_POP" | "JUMP_IF_FALSE_OR_POP")
    }

    /// Polarity used by the CFG builder's edge typer (§4.C): `true` means
    /// the jump is taken when the popped/peeked value is truthy.
    #[must_use]
    pub fn jump_polarity(self) -> Option<bool> {
        match self.meta.mnemonic {
            "POP_JUMP_IF_TRUE" | "POP_JUMP_FORWARD_IF_TRUE" | "JUMP_IF_TRUE_OR_POP" => Some(true),
            "POP_JUMP_IF_FALSE" | "POP_JUMP_FORWARD_IF_FALSE" | "JUMP_IF_FALSE_OR_POP" => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_block_terminator(self) -> bool {
        matches!(self.meta.category, OpCategory::BlockTerminator)
    }

    #[must_use]
    pub fn is_extended_arg(self) -> bool {
        self.meta.mnemonic == "EXTENDED_ARG"
    }
}

/// Returns the sorted-by-byte static table for `version`.
#[must_use]
pub fn table_for(version: PyVersion) -> &'static [(u8, OpMeta)] {
    if version.has_inline_caches() {
        cache311::TABLE
    } else if version.is_word_aligned() {
        word::TABLE
    } else {
        legacy::TABLE
    }
}

/// Looks up `byte` in `version`'s table. `None` means the byte has no
/// defined opcode in this version (§7 `UnknownOpcode`).
#[must_use]
pub fn lookup(version: PyVersion, byte: u8) -> Option<Opcode> {
    let table = table_for(version);
    table
        .binary_search_by_key(&byte, |(b, _)| *b)
        .ok()
        .map(|i| Opcode { byte, meta: &table[i].1 })
}

/// Pre-3.6 tall-format threshold: opcodes `>= HAVE_ARGUMENT` carry a 2-byte
/// little-endian argument; opcodes below it are argument-less single bytes.
pub const LEGACY_HAVE_ARGUMENT: u8 = 90;

/// Synthetic metadata for a byte with no table entry, used by the decoder
/// to emit a terminal `Invalid` instruction (§4.B) rather than panicking.
pub static INVALID_META: OpMeta =
    OpMeta { mnemonic: "<INVALID>", has_arg: false, category: OpCategory::Other, cache_entries: 0 };

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_is_sorted_and_deduped() {
        for version in [PyVersion::new(2, 7), PyVersion::new(3, 8), PyVersion::new(3, 11), PyVersion::new(3, 12)] {
            let table = table_for(version);
            for pair in table.windows(2) {
                assert!(pair[0].0 < pair[1].0, "table for {version} is not strictly sorted");
            }
        }
    }

    #[test]
    fn lookup_resolves_resume_in_word_aligned_versions() {
        let op = lookup(PyVersion::new(3, 11), resume_byte(PyVersion::new(3, 11))).expect("RESUME must be defined");
        assert_eq!(op.meta.mnemonic, "RESUME");
    }

    fn resume_byte(version: PyVersion) -> u8 {
        table_for(version)
            .iter()
            .find(|(_, meta)| meta.mnemonic == "RESUME")
            .map(|(b, _)| *b)
            .expect("RESUME present")
    }

    #[test]
    fn unknown_byte_returns_none() {
        assert!(lookup(PyVersion::new(3, 12), 0xfe).is_none());
    }
}
