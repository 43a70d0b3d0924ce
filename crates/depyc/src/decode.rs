//! Component B: the instruction decoder.
//!
//! Walks raw bytecode bytes into an ordered [`Instruction`] list, folding
//! `EXTENDED_ARG` prefixes and resolving jump targets. Offsets are strictly
//! monotonic; `offset + size` of one instruction equals the next
//! instruction's offset, or the end of input (§8).

use crate::error::DecompileError;
use crate::opcode::{self, Opcode, OpCategory};
use crate::version::PyVersion;

/// A decoded instruction. Pure value once produced; `arg` already has any
/// `EXTENDED_ARG` prefixes folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: Opcode,
    pub arg: u32,
    pub size: usize,
}

impl Instruction {
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.opcode.meta.mnemonic == "<INVALID>"
    }
}

/// Result of a decode pass: the instructions produced before any failure,
/// plus the failure itself if decoding stopped early (§4.B).
#[derive(Debug, Clone)]
pub struct DecodeOutput {
    pub instructions: Vec<Instruction>,
    pub error: Option<DecompileError>,
}

/// Decodes `bytecode` under `version`. Never panics on malformed input: a
/// truncated tail or an undefined opcode byte produces a synthetic
/// `Invalid` instruction, records the error, and stops.
#[must_use]
pub fn decode(bytecode: &[u8], version: PyVersion) -> DecodeOutput {
    let mut instructions = Vec::new();
    let mut pos = 0usize;
    let word_aligned = version.is_word_aligned();

    while pos < bytecode.len() {
        let start = pos;
        let mut ext_arg: u32 = 0;
        let mut chained = 0u8;

        let outcome = loop {
            let Some(&byte) = bytecode.get(pos) else {
                break Some(DecompileError::TruncatedBytecode { offset: start });
            };
            let Some(op) = opcode::lookup(version, byte) else {
                break Some(DecompileError::UnknownOpcode { offset: pos, byte, version });
            };

            if op.is_extended_arg() {
                chained += 1;
                if chained > 4 {
                    break Some(DecompileError::CfgMalformed {
                        reason: format!("more than four chained EXTENDED_ARG prefixes at offset {start}"),
                    });
                }
                if word_aligned {
                    let Some(&raw) = bytecode.get(pos + 1) else {
                        break Some(DecompileError::TruncatedBytecode { offset: pos });
                    };
                    ext_arg = (ext_arg << 8) | u32::from(raw);
                    pos += 2;
                } else {
                    let (Some(&lo), Some(&hi)) = (bytecode.get(pos + 1), bytecode.get(pos + 2)) else {
                        break Some(DecompileError::TruncatedBytecode { offset: pos });
                    };
                    ext_arg = (ext_arg << 16) | u32::from(u16::from_le_bytes([lo, hi]));
                    pos += 3;
                }
                continue;
            }

            if word_aligned {
                let Some(&raw) = bytecode.get(pos + 1) else {
                    break Some(DecompileError::TruncatedBytecode { offset: pos });
                };
                let arg = if op.meta.has_arg { (ext_arg << 8) | u32::from(raw) } else { 0 };
                let cache_bytes = usize::from(op.meta.cache_entries) * 2;
                let total = 2 + cache_bytes;
                if pos + total > bytecode.len() {
                    break Some(DecompileError::TruncatedBytecode { offset: pos });
                }
                instructions.push(Instruction { offset: start, opcode: op, arg, size: pos + total - start });
                pos += total;
            } else if byte >= opcode::LEGACY_HAVE_ARGUMENT {
                let (Some(&lo), Some(&hi)) = (bytecode.get(pos + 1), bytecode.get(pos + 2)) else {
                    break Some(DecompileError::TruncatedBytecode { offset: pos });
                };
                let arg = (ext_arg << 16) | u32::from(u16::from_le_bytes([lo, hi]));
                instructions.push(Instruction { offset: start, opcode: op, arg, size: pos + 3 - start });
                pos += 3;
            } else {
                instructions.push(Instruction { offset: start, opcode: op, arg: 0, size: pos + 1 - start });
                pos += 1;
            }
            break None;
        };

        if let Some(err) = outcome {
            instructions.push(Instruction {
                offset: start,
                opcode: Opcode { byte: bytecode.get(start).copied().unwrap_or(0), meta: &opcode::INVALID_META },
                arg: 0,
                size: bytecode.len().saturating_sub(start).max(1),
            });
            return DecodeOutput { instructions, error: Some(err) };
        }
    }

    DecodeOutput { instructions, error: None }
}

/// Resolves the byte offset a jump instruction targets, or `None` if
/// `instr` is not a jump. Version-dependent per §4.B: absolute offsets
/// pre-3.10, relative-from-instruction-end word-scaled offsets from 3.10.
#[must_use]
pub fn jump_target(instr: &Instruction, version: PyVersion) -> Option<i64> {
    let is_jump_category = matches!(instr.opcode.meta.category, OpCategory::Jump | OpCategory::JumpBackward);
    if !is_jump_category {
        return None;
    }
    let arg = i64::from(instr.arg);

    if version.has_relative_jumps() {
        let delta = arg * 2;
        let end = instr.end() as i64;
        if instr.opcode.meta.category == OpCategory::JumpBackward {
            Some(end - delta)
        } else {
            Some(end + delta)
        }
    } else if instr.opcode.meta.mnemonic == "JUMP_FORWARD" {
        Some(instr.end() as i64 + arg)
    } else {
        Some(arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_add_v312() -> Vec<u8> {
        // RESUME 0, LOAD_FAST 0, LOAD_FAST 1, BINARY_OP 0 [cache], RETURN_VALUE
        vec![122, 0, 124, 0, 124, 1, 49, 0, 0, 0, 83, 0]
    }

    #[test]
    fn offsets_are_strictly_monotonic_and_contiguous() {
        let version = PyVersion::new(3, 12);
        let out = decode(&linear_add_v312(), version);
        assert!(out.error.is_none());
        let mut last_end = 0;
        for instr in &out.instructions {
            assert_eq!(instr.offset, last_end);
            last_end = instr.end();
        }
        assert_eq!(last_end, linear_add_v312().len());
    }

    #[test]
    fn cache_entries_are_skipped_not_emitted() {
        let version = PyVersion::new(3, 12);
        let out = decode(&linear_add_v312(), version);
        let binary_op = out.instructions.iter().find(|i| i.opcode.meta.mnemonic == "BINARY_OP").unwrap();
        assert_eq!(binary_op.size, 4); // opcode+arg (2) + one cache entry (2)
    }

    #[test]
    fn extended_arg_folds_into_next_instruction() {
        // EXTENDED_ARG 1, LOAD_CONST 5 -> arg = (1 << 8) | 5
        let version = PyVersion::new(3, 8);
        let bytes = vec![255, 1, 100, 5];
        let out = decode(&bytes, version);
        assert!(out.error.is_none());
        assert_eq!(out.instructions.len(), 1);
        assert_eq!(out.instructions[0].arg, (1 << 8) | 5);
        assert_eq!(out.instructions[0].offset, 0);
        assert_eq!(out.instructions[0].size, 4);
    }

    #[test]
    fn truncated_tail_emits_invalid_and_stops() {
        let version = PyVersion::new(3, 12);
        let bytes = vec![122, 0, 124]; // RESUME 0, then a lone opcode byte missing its arg
        let out = decode(&bytes, version);
        assert!(out.error.is_some());
        assert_eq!(out.instructions.last().unwrap().opcode.meta.mnemonic, "<INVALID>");
    }

    #[test]
    fn unknown_opcode_byte_emits_invalid_and_stops() {
        let version = PyVersion::new(3, 12);
        let bytes = vec![254, 0];
        let out = decode(&bytes, version);
        assert!(matches!(out.error, Some(DecompileError::UnknownOpcode { .. })));
    }

    #[test]
    fn jump_forward_is_relative_in_word_aligned_pre_310() {
        let version = PyVersion::new(3, 8);
        let instr = Instruction {
            offset: 10,
            opcode: opcode::lookup(version, 110).unwrap(), // JUMP_FORWARD
            arg: 4,
            size: 2,
        };
        assert_eq!(jump_target(&instr, version), Some(16));
    }

    #[test]
    fn jump_backward_is_word_scaled_from_310() {
        let version = PyVersion::new(3, 12);
        let instr = Instruction {
            offset: 20,
            opcode: opcode::lookup(version, 172).unwrap(), // JUMP_BACKWARD
            arg: 3,
            size: 2,
        };
        assert_eq!(jump_target(&instr, version), Some(22 - 6));
    }
}
