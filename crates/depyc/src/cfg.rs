//! Component C: the control-flow graph builder.
//!
//! The CFG owns its instruction array; blocks reference it by offset range
//! rather than borrowing a slice directly; a self-referential
//! block-borrows-instructions struct is not expressible without unsafe, so
//! [`Cfg::block_instructions`] recomputes the slice on demand from
//! `start_offset`/`end_offset` — `O(log n)` per call via the sorted
//! instruction-offset index, which every caller already has cheaply
//! available.

use std::collections::{BTreeSet, HashMap};

use crate::decode::{self, Instruction};
use crate::error::DecompileError;
use crate::exctable::ExceptionEntry;
use crate::version::PyVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Normal,
    True,
    False,
    LoopBack,
    Exception,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub target_block_id: usize,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub successors: Vec<Edge>,
    pub predecessors: Vec<usize>,
    pub is_exception_handler: bool,
    pub is_loop_header: bool,
}

#[derive(Debug, Clone)]
pub struct Cfg {
    instructions: Vec<Instruction>,
    blocks: Vec<BasicBlock>,
    entry: Option<usize>,
}

impl Cfg {
    #[must_use]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    #[must_use]
    pub fn block(&self, id: usize) -> Option<&BasicBlock> {
        self.blocks.get(id)
    }

    #[must_use]
    pub fn entry(&self) -> Option<usize> {
        self.entry
    }

    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Instructions belonging to `block`, sliced from the CFG's owned array.
    #[must_use]
    pub fn block_instructions(&self, block: &BasicBlock) -> &[Instruction] {
        let start = self.instructions.partition_point(|i| i.offset < block.start_offset);
        let end = self.instructions.partition_point(|i| i.offset < block.end_offset);
        &self.instructions[start..end]
    }

    /// The id of the block whose offset range contains `offset`, if any.
    #[must_use]
    pub fn block_at_offset(&self, offset: usize) -> Option<usize> {
        self.blocks.iter().position(|b| b.start_offset <= offset && offset < b.end_offset)
    }
}

/// Builds the CFG for one code object's decoded instructions (§4.C).
/// Empty bytecode yields a CFG with zero blocks and no entry (§4.C edge
/// case).
pub fn build(instructions: Vec<Instruction>, exceptions: &[ExceptionEntry], version: PyVersion) -> Result<Cfg, DecompileError> {
    if instructions.is_empty() {
        return Ok(Cfg { instructions, blocks: Vec::new(), entry: None });
    }

    let end_of_code = instructions.last().map(|i| i.end()).unwrap_or(0);
    let offset_index: HashMap<usize, usize> =
        instructions.iter().enumerate().map(|(idx, instr)| (instr.offset, idx)).collect();

    // Phase 1: leader discovery.
    let mut leaders: BTreeSet<usize> = BTreeSet::new();
    leaders.insert(0);
    for entry in exceptions {
        if offset_index.contains_key(&entry.handler_offset) {
            leaders.insert(entry.handler_offset);
        }
    }
    for (idx, instr) in instructions.iter().enumerate() {
        let is_jump = decode::jump_target(instr, version).is_some();
        let is_terminator = instr.opcode.is_block_terminator();
        if is_jump || is_terminator {
            if let Some(next) = instructions.get(idx + 1) {
                leaders.insert(next.offset);
            }
        }
        if let Some(target) = decode::jump_target(instr, version) {
            if target >= 0 && (target as usize) <= end_of_code {
                leaders.insert(target as usize);
            }
        }
    }
    let mut leader_offsets: Vec<usize> = leaders.into_iter().collect();
    leader_offsets.sort_unstable();

    // Phase 2: block slicing.
    let mut blocks: Vec<BasicBlock> = Vec::with_capacity(leader_offsets.len());
    for (i, &start) in leader_offsets.iter().enumerate() {
        let end = leader_offsets.get(i + 1).copied().unwrap_or(end_of_code);
        blocks.push(BasicBlock {
            id: i,
            start_offset: start,
            end_offset: end,
            successors: Vec::new(),
            predecessors: Vec::new(),
            is_exception_handler: false,
            is_loop_header: false,
        });
    }

    let offset_to_block: HashMap<usize, usize> = blocks.iter().map(|b| (b.start_offset, b.id)).collect();

    // Phase 3: edge typing from each block's terminator.
    for block_id in 0..blocks.len() {
        let (start, end) = (blocks[block_id].start_offset, blocks[block_id].end_offset);
        let start_idx = offset_index[&start];
        let end_idx = instructions.iter().position(|i| i.offset >= end).unwrap_or(instructions.len());
        let Some(last_idx) = end_idx.checked_sub(1).filter(|&i| i >= start_idx) else { continue };
        let terminator = &instructions[last_idx];

        let fallthrough_block = instructions.get(last_idx + 1).and_then(|n| offset_to_block.get(&n.offset).copied());

        if let Some(target) = decode::jump_target(terminator, version) {
            let Some(&target_block) = (target >= 0).then(|| target as usize).and_then(|t| offset_to_block.get(&t)) else {
                return Err(DecompileError::InvalidJumpTarget { offset: terminator.offset, target });
            };
            if terminator.opcode.is_conditional_jump() {
                // Polarity true means the jump is taken on a truthy value,
                // so the jump target is the `true` edge and fallthrough is
                // `false`; reversed otherwise (§4.C).
                let polarity = terminator.opcode.jump_polarity().unwrap_or(true);
                let (true_target, false_target) =
                    if polarity { (Some(target_block), fallthrough_block) } else { (fallthrough_block, Some(target_block)) };
                if let Some(t) = true_target {
                    blocks[block_id].successors.push(Edge { target_block_id: t, kind: EdgeKind::True });
                }
                if let Some(f) = false_target {
                    blocks[block_id].successors.push(Edge { target_block_id: f, kind: EdgeKind::False });
                }
            } else if terminator.opcode.meta.category == crate::opcode::OpCategory::JumpBackward {
                blocks[block_id].successors.push(Edge { target_block_id: target_block, kind: EdgeKind::LoopBack });
            } else {
                blocks[block_id].successors.push(Edge { target_block_id: target_block, kind: EdgeKind::Normal });
            }
        } else if terminator.opcode.is_block_terminator() {
            // return/raise: no fallthrough edge.
        } else if let Some(fallthrough) = fallthrough_block {
            blocks[block_id].successors.push(Edge { target_block_id: fallthrough, kind: EdgeKind::Normal });
        }
    }

    // Phase 4: predecessor lists by transposing successors.
    let succ_snapshot: Vec<(usize, usize)> =
        blocks.iter().flat_map(|b| b.successors.iter().map(move |e| (b.id, e.target_block_id))).collect();
    for (from, to) in succ_snapshot {
        if let Some(target) = blocks.get_mut(to) {
            target.predecessors.push(from);
        }
    }

    // Phase 5: exception edges.
    for entry in exceptions {
        let Some(&handler_block) = offset_to_block.get(&entry.handler_offset) else {
            return Err(DecompileError::InvalidExceptionTable {
                reason: format!("handler offset {} is not a block boundary", entry.handler_offset),
            });
        };
        let protected: Vec<usize> = blocks
            .iter()
            .filter(|b| b.start_offset < entry.end_offset && entry.start_offset < b.end_offset)
            .map(|b| b.id)
            .collect();
        for block_id in protected {
            blocks[block_id].successors.push(Edge { target_block_id: handler_block, kind: EdgeKind::Exception });
            blocks[handler_block].predecessors.push(block_id);
        }
        blocks[handler_block].is_exception_handler = true;
    }

    // Phase 6: loop-header flag.
    let loop_back_targets: BTreeSet<usize> = blocks
        .iter()
        .flat_map(|b| b.successors.iter())
        .filter(|e| e.kind == EdgeKind::LoopBack)
        .map(|e| e.target_block_id)
        .collect();
    for block in &mut blocks {
        block.is_loop_header = loop_back_targets.contains(&block.id);
    }

    Ok(Cfg { instructions, blocks, entry: Some(0) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;

    fn build_for(bytes: &[u8], version: PyVersion) -> Cfg {
        let out = decode(bytes, version);
        assert!(out.error.is_none(), "decode failed: {:?}", out.error);
        build(out.instructions, &[], version).expect("cfg build")
    }

    #[test]
    fn linear_code_is_a_single_block() {
        // RESUME 0, LOAD_FAST 0, LOAD_FAST 1, BINARY_OP 0 [cache], RETURN_VALUE
        let bytes = vec![122, 0, 124, 0, 124, 1, 49, 0, 0, 0, 83, 0];
        let cfg = build_for(&bytes, PyVersion::new(3, 12));
        assert_eq!(cfg.blocks().len(), 1);
        assert_eq!(cfg.entry(), Some(0));
    }

    #[test]
    fn conditional_jump_produces_true_false_edges() {
        // RESUME 0, LOAD_FAST 0, POP_JUMP_IF_FALSE 1 (-> offset 8), RETURN_CONST 0, RETURN_CONST 1
        let bytes = vec![122, 0, 124, 0, 179, 1, 89, 0, 89, 1];
        let cfg = build_for(&bytes, PyVersion::new(3, 12));
        assert_eq!(cfg.blocks().len(), 3);
        let head = cfg.block(0).unwrap();
        let kinds: Vec<EdgeKind> = head.successors.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EdgeKind::True));
        assert!(kinds.contains(&EdgeKind::False));
    }

    #[test]
    fn empty_bytecode_has_no_entry() {
        let cfg = build(Vec::new(), &[], PyVersion::new(3, 12)).unwrap();
        assert!(cfg.blocks().is_empty());
        assert_eq!(cfg.entry(), None);
    }
}
