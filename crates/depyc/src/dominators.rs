//! Component D: the dominator tree and natural-loop analyzer.
//!
//! Cooper-Harvey-Kennedy: compute a reverse postorder from the entry,
//! then iterate `idom[n] = intersect(pred(n))` with the classic two-finger
//! walk over RPO numbers until a fixed point (Cooper, Harvey & Kennedy,
//! *A Simple, Fast Dominance Algorithm*, 2001).

use std::collections::{BTreeSet, HashMap};

use crate::cfg::Cfg;
use crate::error::DecompileError;

#[derive(Debug, Clone)]
pub struct NaturalLoop {
    pub header_id: usize,
    pub body: BTreeSet<usize>,
}

#[derive(Debug, Clone)]
pub struct Dominators {
    /// `idom[n]` — unreachable blocks are their own sentinel idom.
    idom: Vec<usize>,
    rpo_number: Vec<Option<usize>>,
    loops: Vec<NaturalLoop>,
}

impl Dominators {
    #[must_use]
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        if a == b {
            return true;
        }
        let Some(_) = self.rpo_number.get(b).copied().flatten() else { return false };
        let mut cursor = b;
        loop {
            if cursor == a {
                return true;
            }
            let next = self.idom[cursor];
            if next == cursor {
                return false; // reached entry/unreachable sentinel without finding a
            }
            cursor = next;
        }
    }

    #[must_use]
    pub fn idom(&self, block: usize) -> Option<usize> {
        self.idom.get(block).copied()
    }

    #[must_use]
    pub fn is_in_loop(&self, block: usize, header: usize) -> bool {
        self.loops.iter().any(|l| l.header_id == header && l.body.contains(&block))
    }

    #[must_use]
    pub fn loop_headers(&self) -> Vec<usize> {
        self.loops.iter().map(|l| l.header_id).collect()
    }

    #[must_use]
    pub fn loop_for_header(&self, header: usize) -> Option<&NaturalLoop> {
        self.loops.iter().find(|l| l.header_id == header)
    }

    #[must_use]
    pub fn is_reachable(&self, block: usize) -> bool {
        self.rpo_number.get(block).copied().flatten().is_some()
    }
}

/// Builds the dominator tree and natural loops for `cfg`. A `CfgMalformed`
/// error means the fixed-point iteration exceeded its bound — a guard
/// against pathological or hostile CFGs (§5).
pub fn analyze(cfg: &Cfg) -> Result<Dominators, DecompileError> {
    let n = cfg.blocks().len();
    if n == 0 || cfg.entry().is_none() {
        return Ok(Dominators { idom: Vec::new(), rpo_number: Vec::new(), loops: Vec::new() });
    }
    let entry = cfg.entry().unwrap();

    let rpo = reverse_postorder(cfg, entry);
    let mut rpo_number: Vec<Option<usize>> = vec![None; n];
    for (order, &block) in rpo.iter().enumerate() {
        rpo_number[block] = Some(order);
    }

    let mut idom = vec![usize::MAX; n];
    idom[entry] = entry;

    let predecessors: Vec<Vec<usize>> = (0..n)
        .map(|id| {
            cfg.block(id)
                .map(|b| b.predecessors.iter().copied().filter(|&p| rpo_number[p].is_some()).collect())
                .unwrap_or_default()
        })
        .collect();

    let mut changed = true;
    let mut iterations = 0usize;
    const MAX_ITERATIONS: usize = 10_000;
    while changed {
        changed = false;
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            return Err(DecompileError::CfgMalformed { reason: "dominator fixed point did not converge".into() });
        }
        for &block in rpo.iter().skip(1) {
            let preds = &predecessors[block];
            let mut new_idom = None;
            for &pred in preds {
                if idom[pred] == usize::MAX {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(current) => intersect(current, pred, &idom, &rpo_number),
                });
            }
            if let Some(computed) = new_idom {
                if idom[block] != computed {
                    idom[block] = computed;
                    changed = true;
                }
            }
        }
    }

    for (block, value) in idom.iter_mut().enumerate() {
        if *value == usize::MAX {
            *value = block; // unreachable sentinel
        }
    }

    let dominators = Dominators { idom: idom.clone(), rpo_number: rpo_number.clone(), loops: Vec::new() };
    let loops = find_natural_loops(cfg, &dominators);
    Ok(Dominators { idom, rpo_number, loops })
}

fn intersect(mut a: usize, mut b: usize, idom: &[usize], rpo_number: &[Option<usize>]) -> usize {
    while a != b {
        while rpo_number[a] > rpo_number[b] {
            a = idom[a];
        }
        while rpo_number[b] > rpo_number[a] {
            b = idom[b];
        }
    }
    a
}

fn reverse_postorder(cfg: &Cfg, entry: usize) -> Vec<usize> {
    let mut visited = vec![false; cfg.blocks().len()];
    let mut postorder = Vec::new();
    let mut stack = vec![(entry, false)];
    while let Some((node, processed)) = stack.pop() {
        if processed {
            postorder.push(node);
            continue;
        }
        if visited[node] {
            continue;
        }
        visited[node] = true;
        stack.push((node, true));
        if let Some(block) = cfg.block(node) {
            for edge in &block.successors {
                if !visited[edge.target_block_id] {
                    stack.push((edge.target_block_id, false));
                }
            }
        }
    }
    postorder.reverse();
    postorder
}

fn find_natural_loops(cfg: &Cfg, dominators: &Dominators) -> Vec<NaturalLoop> {
    let mut by_header: HashMap<usize, BTreeSet<usize>> = HashMap::new();
    for block in cfg.blocks() {
        for edge in &block.successors {
            let (b, h) = (block.id, edge.target_block_id);
            if dominators.dominates(h, b) {
                let mut body = BTreeSet::new();
                body.insert(h);
                reverse_reachable_below(cfg, b, h, &mut body);
                by_header.entry(h).or_default().extend(body);
            }
        }
    }
    by_header.into_iter().map(|(header_id, body)| NaturalLoop { header_id, body }).collect()
}

/// Reverse-reachable closure from `from`, not crossing `stop_at`.
fn reverse_reachable_below(cfg: &Cfg, from: usize, stop_at: usize, acc: &mut BTreeSet<usize>) {
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        if node == stop_at || !acc.insert(node) {
            continue;
        }
        if let Some(block) = cfg.block(node) {
            for &pred in &block.predecessors {
                stack.push(pred);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::version::PyVersion;

    #[test]
    fn entry_dominates_all_reachable_blocks() {
        let bytes = vec![122, 0, 124, 0, 179, 1, 89, 0, 89, 1];
        let out = decode(&bytes, PyVersion::new(3, 12));
        let cfg = crate::cfg::build(out.instructions, &[], PyVersion::new(3, 12)).unwrap();
        let doms = analyze(&cfg).unwrap();
        for block in cfg.blocks() {
            assert!(doms.dominates(0, block.id));
            assert!(doms.dominates(block.id, block.id));
        }
    }

    #[test]
    fn while_true_loop_is_detected_as_natural_loop() {
        // RESUME 0, [header@2] LOAD_FAST 0, POP_JUMP_IF_FALSE -> end,
        // [body@6] LOAD_FAST 0, POP_TOP, JUMP_BACKWARD -> header, [end] RETURN_CONST 0
        let bytes = vec![
            122, 0, // RESUME 0        (offset 0)
            124, 0, // LOAD_FAST 0     (offset 2, header)
            179, 3, // POP_JUMP_IF_FALSE 3 -> offset 12 (end)
            124, 0, // LOAD_FAST 0     (offset 6, body)
            1, 0, // POP_TOP           (offset 8)
            172, 5, // JUMP_BACKWARD 5 -> back to offset 2
            89, 0, // RETURN_CONST 0  (offset 12)
        ];
        let version = PyVersion::new(3, 12);
        let out = decode(&bytes, version);
        assert!(out.error.is_none(), "{:?}", out.error);
        let cfg = crate::cfg::build(out.instructions, &[], version).unwrap();
        let doms = analyze(&cfg).unwrap();
        assert!(!doms.loop_headers().is_empty());
    }
}
