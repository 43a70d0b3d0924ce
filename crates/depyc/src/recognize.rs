//! Component E: the control-structure recognizer.
//!
//! Classifies a block as the head of a higher-level Python construct using
//! the CFG's edge shape plus the dominator tree. Condition/iterator
//! expressions themselves are left to the simulator (`simulate.rs`); the
//! recognizer only decides *which* pattern applies and *which* blocks it
//! consumes, per the tie-break rules in §4.E.

use std::collections::HashSet;

use crate::ast::BoolOp;
use crate::cfg::{Cfg, EdgeKind};
use crate::dominators::Dominators;

/// Soft signal re-exported here so callers in `decompile.rs` can match on
/// one type; semantically identical to `simulate::PatternNoMatch`.
pub use crate::simulate::PatternNoMatch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    If { cond_block: usize, then_block: usize, else_block: Option<usize>, merge: Option<usize> },
    While { header: usize, body_entry: usize, exit: usize },
    For { header: usize, body_entry: usize, exit: usize },
    TryExcept { body_entry: usize, handlers: Vec<usize>, merge: Option<usize> },
    With { body_entry: usize, merge: Option<usize> },
    Ternary { cond_block: usize, true_arm: usize, false_arm: usize, merge: usize },
    ShortCircuit { op: BoolOp, left: usize, right_arm: usize, merge: usize },
    /// `DUP_TOP, ROT_THREE, COMPARE_OP, JUMP_IF_FALSE_OR_POP` at the end of
    /// `head`: CPython's chained-comparison idiom (`a < b < c`). `right_arm`
    /// holds the second `COMPARE_OP` and falls straight through to `merge`.
    ChainedCompare { head: usize, right_arm: usize, merge: usize },
    /// A `match` subject block ending in a `MATCH_*` opcode plus `TO_BOOL`
    /// and a conditional jump. `case_body` is the arm taken when the
    /// pattern matches; `wildcard_body`, when present and distinct from
    /// `merge`, is the catch-all arm taken otherwise.
    Match { subject_block: usize, case_body: usize, wildcard_body: Option<usize>, merge: Option<usize> },
    /// No higher-level construct recognized; simulate straight-line.
    Straight,
}

/// Classifies `block_id`. Never reclassifies a block already consumed by
/// the driver — callers are responsible for checking their own
/// `consumed` set before calling this (§4.E "never reclassify").
#[must_use]
pub fn classify(cfg: &Cfg, dominators: &Dominators, exceptions: &[crate::exctable::ExceptionEntry], block_id: usize) -> Pattern {
    let Some(block) = cfg.block(block_id) else { return Pattern::Straight };

    if block.is_loop_header {
        return classify_loop(cfg, block_id);
    }

    if block.is_exception_handler {
        // Handlers are consumed by the `TryExcept` head, not reclassified
        // as their own pattern head.
        return Pattern::Straight;
    }

    if protects_a_region(exceptions, block) {
        return classify_try(cfg, exceptions, block_id);
    }

    if is_with_head(cfg, block_id) {
        return classify_with(cfg, block_id);
    }

    let true_false: Vec<&crate::cfg::Edge> =
        block.successors.iter().filter(|e| matches!(e.kind, EdgeKind::True | EdgeKind::False)).collect();
    if true_false.len() == 2 {
        if has_match_opcode(cfg, block_id) {
            return classify_match(cfg, block_id, &true_false);
        }
        return classify_diamond(cfg, dominators, block_id, &true_false);
    }

    Pattern::Straight
}

/// `true` if `block_id` carries one of the pattern-matching opcodes that
/// peek (rather than pop) their subject — `MATCH_SEQUENCE`, `MATCH_MAPPING`,
/// `MATCH_CLASS`, `MATCH_KEYS`.
fn has_match_opcode(cfg: &Cfg, block_id: usize) -> bool {
    cfg.block(block_id)
        .map(|b| {
            cfg.block_instructions(b)
                .iter()
                .any(|i| matches!(i.opcode.meta.mnemonic, "MATCH_SEQUENCE" | "MATCH_MAPPING" | "MATCH_CLASS" | "MATCH_KEYS"))
        })
        .unwrap_or(false)
}

fn classify_match(cfg: &Cfg, head: usize, edges: &[&crate::cfg::Edge]) -> Pattern {
    let true_block = edges.iter().find(|e| e.kind == EdgeKind::True).map(|e| e.target_block_id);
    let false_block = edges.iter().find(|e| e.kind == EdgeKind::False).map(|e| e.target_block_id);
    let (Some(case_body), Some(false_block)) = (true_block, false_block) else {
        return Pattern::Straight;
    };
    let merge = common_successor(cfg, &[case_body, false_block]);
    let wildcard_body = if Some(false_block) == merge { None } else { Some(false_block) };
    Pattern::Match { subject_block: head, case_body, wildcard_body, merge }
}

/// `true` if `block_id` ends with the `DUP_TOP, ROT_THREE, COMPARE_OP,
/// JUMP_IF_FALSE_OR_POP` sequence CPython emits for every comparison in a
/// chain but the last.
fn ends_with_chained_compare_idiom(cfg: &Cfg, block_id: usize) -> bool {
    let Some(block) = cfg.block(block_id) else { return false };
    let mnemonics: Vec<&str> = cfg.block_instructions(block).iter().map(|i| i.opcode.meta.mnemonic).collect();
    if mnemonics.last() != Some(&"JUMP_IF_FALSE_OR_POP") || mnemonics.len() < 4 {
        return false;
    }
    let tail = &mnemonics[mnemonics.len() - 4..mnemonics.len() - 1];
    tail == ["DUP_TOP", "ROT_THREE", "COMPARE_OP"]
}

fn ends_with_compare(cfg: &Cfg, block_id: usize) -> bool {
    cfg.block(block_id)
        .map(|b| cfg.block_instructions(b).last().map(|i| i.opcode.meta.mnemonic == "COMPARE_OP").unwrap_or(false))
        .unwrap_or(false)
}

fn protects_a_region(exceptions: &[crate::exctable::ExceptionEntry], block: &crate::cfg::BasicBlock) -> bool {
    exceptions.iter().any(|e| e.contains(block.start_offset))
        && block.successors.iter().any(|s| s.kind == EdgeKind::Exception)
}

fn classify_try(cfg: &Cfg, exceptions: &[crate::exctable::ExceptionEntry], block_id: usize) -> Pattern {
    let handlers: Vec<usize> = cfg
        .block(block_id)
        .into_iter()
        .flat_map(|b| b.successors.iter())
        .filter(|e| e.kind == EdgeKind::Exception)
        .map(|e| e.target_block_id)
        .collect();
    let merge = common_successor(cfg, &handlers_and_body(cfg, block_id, &handlers));
    let _ = exceptions;
    Pattern::TryExcept { body_entry: block_id, handlers, merge }
}

fn handlers_and_body(cfg: &Cfg, body: usize, handlers: &[usize]) -> Vec<usize> {
    let mut all = vec![body];
    all.extend_from_slice(handlers);
    let _ = cfg;
    all
}

fn is_with_head(cfg: &Cfg, block_id: usize) -> bool {
    cfg.block(block_id)
        .map(|b| cfg.block_instructions(b).iter().any(|i| matches!(i.opcode.meta.mnemonic, "BEFORE_WITH" | "SETUP_WITH")))
        .unwrap_or(false)
}

fn classify_with(cfg: &Cfg, block_id: usize) -> Pattern {
    let block = cfg.block(block_id).expect("checked by caller");
    let body_entry = block.successors.first().map(|e| e.target_block_id).unwrap_or(block_id);
    let merge = single_non_exception_exit(cfg, body_entry);
    Pattern::With { body_entry, merge }
}

fn classify_loop(cfg: &Cfg, header: usize) -> Pattern {
    let block = cfg.block(header).expect("checked by caller");
    let has_for_iter = cfg.block_instructions(block).iter().any(|i| i.opcode.meta.mnemonic == "FOR_ITER");
    let exit = block
        .successors
        .iter()
        .find(|e| matches!(e.kind, EdgeKind::False | EdgeKind::Normal) && e.target_block_id != header)
        .map(|e| e.target_block_id);
    let body_entry = block
        .successors
        .iter()
        .find(|e| matches!(e.kind, EdgeKind::True) || (matches!(e.kind, EdgeKind::Normal) && Some(e.target_block_id) != exit))
        .map(|e| e.target_block_id)
        .unwrap_or(header);
    let exit = exit.unwrap_or(header);
    if has_for_iter {
        Pattern::For { header, body_entry, exit }
    } else {
        Pattern::While { header, body_entry, exit }
    }
}

fn classify_diamond(cfg: &Cfg, dominators: &Dominators, head: usize, edges: &[&crate::cfg::Edge]) -> Pattern {
    let true_block = edges.iter().find(|e| e.kind == EdgeKind::True).map(|e| e.target_block_id);
    let false_block = edges.iter().find(|e| e.kind == EdgeKind::False).map(|e| e.target_block_id);
    let (Some(true_block), Some(false_block)) = (true_block, false_block) else { return Pattern::Straight };

    // Short-circuit idiom: one arm is the merge block itself (the `…OR_POP`
    // family jumps straight past evaluating the right operand).
    if true_block == false_block {
        return Pattern::Straight;
    }
    if ends_with_chained_compare_idiom(cfg, head)
        && is_merge_point(cfg, dominators, head, false_block, true_block)
        && ends_with_compare(cfg, true_block)
    {
        return Pattern::ChainedCompare { head, right_arm: true_block, merge: false_block };
    }
    if is_merge_point(cfg, dominators, head, false_block, true_block) {
        return Pattern::ShortCircuit { op: BoolOp::Or, left: head, right_arm: true_block, merge: false_block };
    }
    if is_merge_point(cfg, dominators, head, true_block, false_block) {
        return Pattern::ShortCircuit { op: BoolOp::And, left: head, right_arm: false_block, merge: true_block };
    }

    let merge = common_successor(cfg, &[true_block, false_block]);

    if let Some(merge) = merge {
        if is_single_expression_arm(cfg, true_block, merge) && is_single_expression_arm(cfg, false_block, merge) {
            return Pattern::Ternary { cond_block: head, true_arm: true_block, false_arm: false_block, merge };
        }
    }

    Pattern::If { cond_block: head, then_block: true_block, else_block: Some(false_block), merge }
}

/// `true` if `candidate` is a direct predecessor of `merge_candidate` and
/// `merge_candidate` otherwise post-dominates the diamond — i.e. control
/// from `head` always reaches `merge_candidate` either directly or through
/// `candidate`.
fn is_merge_point(cfg: &Cfg, _dominators: &Dominators, head: usize, merge_candidate: usize, candidate: usize) -> bool {
    let Some(candidate_block) = cfg.block(candidate) else { return false };
    let _ = head;
    candidate_block.successors.iter().any(|e| e.target_block_id == merge_candidate)
}

fn is_single_expression_arm(cfg: &Cfg, arm: usize, merge: usize) -> bool {
    let Some(block) = cfg.block(arm) else { return false };
    let reaches_merge_directly = block.successors.len() == 1 && block.successors[0].target_block_id == merge;
    let instructions = cfg.block_instructions(block);
    let no_stores = !instructions.iter().any(|i| i.opcode.meta.category == crate::opcode::OpCategory::Store);
    reaches_merge_directly && no_stores
}

fn single_non_exception_exit(cfg: &Cfg, from: usize) -> Option<usize> {
    let mut visited = HashSet::new();
    let mut cursor = from;
    loop {
        if !visited.insert(cursor) {
            return None;
        }
        let block = cfg.block(cursor)?;
        let normal: Vec<usize> =
            block.successors.iter().filter(|e| e.kind != EdgeKind::Exception).map(|e| e.target_block_id).collect();
        match normal.as_slice() {
            [] => return None,
            [single] => {
                if *single <= cursor {
                    return Some(*single);
                }
                cursor = *single;
            }
            _ => return common_successor(cfg, &normal),
        }
    }
}

/// Finds a block reachable (within a small bound) from every id in `from`,
/// preferring the earliest common one in block-id order. Returns `None`
/// when the arms never rejoin (e.g. both `return`).
fn common_successor(cfg: &Cfg, from: &[usize]) -> Option<usize> {
    let mut reachable_sets: Vec<HashSet<usize>> = Vec::new();
    for &start in from {
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        let mut steps = 0;
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            steps += 1;
            if steps > 4096 {
                break;
            }
            if let Some(block) = cfg.block(node) {
                for edge in &block.successors {
                    if edge.kind != EdgeKind::Exception {
                        stack.push(edge.target_block_id);
                    }
                }
            }
        }
        reachable_sets.push(seen);
    }
    let mut candidates = reachable_sets.first()?.clone();
    for set in &reachable_sets[1..] {
        candidates.retain(|c| set.contains(c));
    }
    candidates.into_iter().min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::version::PyVersion;

    fn cfg_for(bytes: &[u8], version: PyVersion) -> Cfg {
        let out = decode(bytes, version);
        assert!(out.error.is_none(), "{:?}", out.error);
        crate::cfg::build(out.instructions, &[], version).unwrap()
    }

    #[test]
    fn if_else_head_is_classified_as_if() {
        let bytes = vec![122, 0, 124, 0, 179, 1, 89, 0, 89, 1];
        let version = PyVersion::new(3, 12);
        let cfg = cfg_for(&bytes, version);
        let dominators = crate::dominators::analyze(&cfg).unwrap();
        let pattern = classify(&cfg, &dominators, &[], 0);
        assert!(matches!(pattern, Pattern::If { .. } | Pattern::Ternary { .. }));
    }

    #[test]
    fn linear_block_is_straight() {
        let bytes = vec![122, 0, 124, 0, 124, 1, 49, 0, 0, 0, 83, 0];
        let version = PyVersion::new(3, 12);
        let cfg = cfg_for(&bytes, version);
        let dominators = crate::dominators::analyze(&cfg).unwrap();
        assert_eq!(classify(&cfg, &dominators, &[], 0), Pattern::Straight);
    }

    #[test]
    fn match_sequence_head_is_classified_as_match_with_no_wildcard() {
        let bytes = vec![
            122, 0, // RESUME 0
            124, 0, // [subject] LOAD_FAST 0
            33, 0, // MATCH_SEQUENCE
            59, 0, 0, 0, 0, 0, 0, 0, // TO_BOOL (3 cache slots)
            179, 4, // POP_JUMP_IF_FALSE -> merge
            92, 2, 0, 0, // [case] UNPACK_SEQUENCE 2
            175, 18, // STORE_FAST_STORE_FAST
            110, 0, // JUMP_FORWARD 0 -> merge
            89, 0, // [merge] RETURN_CONST 0
        ];
        let version = PyVersion::new(3, 12);
        let cfg = cfg_for(&bytes, version);
        let dominators = crate::dominators::analyze(&cfg).unwrap();
        let pattern = classify(&cfg, &dominators, &[], 0);
        match pattern {
            Pattern::Match { wildcard_body, merge, .. } => {
                assert_eq!(wildcard_body, None);
                assert!(merge.is_some());
            }
            other => panic!("expected Pattern::Match, got {other:?}"),
        }
    }

    #[test]
    fn chained_compare_idiom_is_not_classified_as_short_circuit() {
        // a < b < c on a pre-3.11, cache-less word-aligned encoding (the
        // idiom predates the 3.11 DUP_TOP/ROT_THREE -> COPY/SWAP rename):
        // DUP_TOP, ROT_THREE, COMPARE_OP, JUMP_IF_FALSE_OR_POP land the
        // chain, falling through to a second COMPARE_OP.
        let bytes = vec![
            124, 0, // [head] LOAD_FAST 0 (a)
            4, 0, // DUP_TOP
            3, 0, // ROT_THREE
            124, 1, // LOAD_FAST 1 (b)
            107, 0, // COMPARE_OP <
            111, 2, // JUMP_IF_FALSE_OR_POP -> merge
            124, 2, // [right_arm] LOAD_FAST 2 (c)
            107, 0, // COMPARE_OP <
            83, 0, // [merge] RETURN_VALUE
        ];
        let version = PyVersion::new(3, 9);
        let cfg = cfg_for(&bytes, version);
        let dominators = crate::dominators::analyze(&cfg).unwrap();
        let pattern = classify(&cfg, &dominators, &[], 0);
        assert!(matches!(pattern, Pattern::ChainedCompare { .. }), "expected ChainedCompare, got {pattern:?}");
    }
}
