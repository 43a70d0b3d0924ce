//! Property tests for the three components that take raw, untrusted bytes
//! directly from a `.pyc` file before any structural validation has run:
//! the instruction decoder, the CFG builder, and the exception-table
//! decoder. None of these may panic on malformed input; they report
//! failure through `DecompileError`/`DecodeOutput::error` instead (§8).

use depyc::cfg;
use depyc::decode::decode;
use depyc::exctable;
use depyc::version::PyVersion;
use proptest::prelude::*;

proptest! {
    /// Any byte buffer in the fixture size range decodes without panicking,
    /// and every instruction it does produce sits fully inside the input
    /// with its offsets in non-decreasing order.
    #[test]
    fn decode_never_panics_and_instructions_stay_in_bounds(bytes in prop::collection::vec(any::<u8>(), 32..=64)) {
        let out = decode(&bytes, PyVersion::new(3, 12));
        let mut last_end = 0usize;
        for instr in &out.instructions {
            prop_assert!(instr.offset >= last_end);
            prop_assert!(instr.end() <= bytes.len());
            last_end = instr.end();
        }
    }

    /// Decoding the same buffer twice yields the same instructions and the
    /// same terminal error, i.e. the decoder is a pure function of its
    /// input.
    #[test]
    fn decode_is_deterministic(bytes in prop::collection::vec(any::<u8>(), 32..=64)) {
        let first = decode(&bytes, PyVersion::new(3, 12));
        let second = decode(&bytes, PyVersion::new(3, 12));
        prop_assert_eq!(first.instructions, second.instructions);
        prop_assert_eq!(first.error.is_some(), second.error.is_some());
    }

    /// Whatever instructions the decoder manages to produce from random
    /// bytes, the CFG builder never panics on them, and every block's
    /// offset range is well-formed and every successor/predecessor id is
    /// in bounds.
    #[test]
    fn cfg_build_never_panics_on_decoded_output(bytes in prop::collection::vec(any::<u8>(), 32..=64)) {
        let decoded = decode(&bytes, PyVersion::new(3, 12));
        if let Ok(graph) = cfg::build(decoded.instructions, &[], PyVersion::new(3, 12)) {
            let block_count = graph.blocks().len();
            for block in graph.blocks() {
                prop_assert!(block.start_offset <= block.end_offset);
                for edge in &block.successors {
                    prop_assert!(edge.target_block_id < block_count);
                }
                for &pred in &block.predecessors {
                    prop_assert!(pred < block_count);
                }
            }
        }
    }

    /// The exception-table decoder never panics on an arbitrary byte
    /// buffer; whatever entries it does manage to decode satisfy the
    /// half-open range invariant `start_offset <= end_offset` that
    /// `ExceptionEntry::contains` relies on.
    #[test]
    fn exctable_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 32..=64)) {
        if let Ok(entries) = exctable::decode(&bytes) {
            for entry in &entries {
                prop_assert!(entry.start_offset <= entry.end_offset);
            }
        }
    }
}
