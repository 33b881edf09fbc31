//! Generic set-based dataflow framework.
//!
//! # Algorithm
//!
//! Standard iterative dataflow over basic blocks:
//!
//! 1. **Fold per-op gen/kill into per-block gen/kill** in program order
//!    (reversed for a backward analysis):
//!    `gen' = (gen − opkill) ∪ opgen; kill' = (kill − opgen) ∪ opkill`.
//! 2. **Worklist to a fixed point.** The list is LIFO and seeded with all
//!    blocks, reversed for a forward analysis so early blocks pop first.
//!    A block's `before` set joins its predecessors' `after` sets — union
//!    for a [`AnalysisKind::Maybe`] analysis, intersection for
//!    [`AnalysisKind::Must`] — and entry blocks (no predecessors) take the
//!    initial set. Backward analyses swap the predecessor/successor maps.
//! 3. **Per-op sweep.** Re-walk each block applying gen/kill op by op to
//!    produce `before`/`after` sets for every `(block, op)` location. For
//!    a backward analysis the two are swapped before returning, so
//!    `before` is always "before in program order".

use rustc_hash::FxHashSet;

use mica_ir::{BasicBlock, Op, OpKind, ValueId};

/// Control-flow graph over block indices.
///
/// Block 0 is the entry point. Ops that may terminate the program are not
/// treated as exits; only blocks ending in `Return`/`Unreachable` (or a
/// missing terminator while IR is under construction) are.
#[derive(Debug)]
pub struct Cfg {
    pub succ: Vec<Vec<usize>>,
    pub pred: Vec<Vec<usize>>,
    pub exits: FxHashSet<usize>,
}

/// Calculate the basic-block control-flow graph.
pub fn get_cfg(blocks: &[BasicBlock]) -> Cfg {
    let n = blocks.len();
    let mut succ: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut pred: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut exits = FxHashSet::default();

    for (i, block) in blocks.iter().enumerate() {
        let targets: Vec<usize> = match block.ops.last().map(|op| &op.kind) {
            Some(OpKind::Branch {
                true_target,
                false_target,
                ..
            }) => vec![true_target.index(), false_target.index()],
            Some(OpKind::Goto { target }) => vec![target.index()],
            _ => Vec::new(),
        };
        if targets.is_empty() {
            exits.insert(i);
        }
        for &t in &targets {
            pred[t].push(i);
        }
        succ[i] = targets;
    }

    Cfg { succ, pred, exits }
}

/// Join operator of an analysis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnalysisKind {
    /// Join is set union; iteration starts from the empty set.
    Maybe,
    /// Join is set intersection; iteration starts from the universe.
    Must,
}

/// Direction of an analysis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Per-location analysis results.
///
/// `before[block][op]` / `after[block][op]` are the sets holding just
/// before / just after that op in program order.
#[derive(Debug, PartialEq, Eq)]
pub struct AnalysisResult {
    pub before: Vec<Vec<FxHashSet<ValueId>>>,
    pub after: Vec<Vec<FxHashSet<ValueId>>>,
}

/// Gen and kill sets of a single op.
pub type GenAndKill = (FxHashSet<ValueId>, FxHashSet<ValueId>);

/// Run a general set-based dataflow analysis.
///
/// * `gen_and_kill` — gen and kill functions for each op.
/// * `initial` — value for the entry points (forward) or the exit points
///   (backward).
/// * `universe` — for a must analysis, the set of all possible values;
///   the worklist narrows it down to the fixed point. Ignored (and may be
///   `None`) for a maybe analysis.
///
/// # Panics
///
/// A must analysis without a universe is a caller bug.
pub fn run_analysis(
    blocks: &[BasicBlock],
    cfg: &Cfg,
    gen_and_kill: &dyn Fn(&Op) -> GenAndKill,
    initial: &FxHashSet<ValueId>,
    kind: AnalysisKind,
    direction: Direction,
    universe: Option<&FxHashSet<ValueId>>,
) -> AnalysisResult {
    assert!(
        kind == AnalysisKind::Maybe || universe.is_some(),
        "universe must be defined for a must analysis"
    );
    let n = blocks.len();
    let backward = direction == Direction::Backward;

    // Fold op-level gen/kill into block-level gen/kill.
    let mut block_gen: Vec<FxHashSet<ValueId>> = Vec::with_capacity(n);
    let mut block_kill: Vec<FxHashSet<ValueId>> = Vec::with_capacity(n);
    for block in blocks {
        let mut gen = FxHashSet::default();
        let mut kill = FxHashSet::default();
        let fold = |gen: &mut FxHashSet<ValueId>, kill: &mut FxHashSet<ValueId>, op: &Op| {
            let (opgen, opkill) = gen_and_kill(op);
            gen.retain(|v| !opkill.contains(v));
            kill.retain(|v| !opgen.contains(v));
            gen.extend(opgen.iter().copied());
            kill.extend(opkill.iter().copied());
        };
        if backward {
            for op in block.ops.iter().rev() {
                fold(&mut gen, &mut kill, op);
            }
        } else {
            for op in &block.ops {
                fold(&mut gen, &mut kill, op);
            }
        }
        block_gen.push(gen);
        block_kill.push(kill);
    }

    // Worklist iteration on block-level before/after sets.
    let mut worklist: Vec<usize> = (0..n).collect();
    if !backward {
        worklist.reverse();
    }
    let mut workset: FxHashSet<usize> = worklist.iter().copied().collect();
    let start = match kind {
        AnalysisKind::Maybe => FxHashSet::default(),
        AnalysisKind::Must => universe.map(Clone::clone).unwrap_or_default(),
    };
    let mut before: Vec<FxHashSet<ValueId>> = vec![start.clone(); n];
    let mut after: Vec<FxHashSet<ValueId>> = vec![start; n];

    let (pred_map, succ_map) = if backward {
        (&cfg.succ, &cfg.pred)
    } else {
        (&cfg.pred, &cfg.succ)
    };

    let mut iterations = 0u32;
    while let Some(label) = worklist.pop() {
        iterations += 1;
        workset.remove(&label);
        let new_before = if pred_map[label].is_empty() {
            initial.clone()
        } else {
            let mut joined: Option<FxHashSet<ValueId>> = None;
            for &p in &pred_map[label] {
                joined = Some(match joined {
                    None => after[p].clone(),
                    Some(acc) => match kind {
                        AnalysisKind::Maybe => acc.union(&after[p]).copied().collect(),
                        AnalysisKind::Must => acc.intersection(&after[p]).copied().collect(),
                    },
                });
            }
            joined.unwrap_or_default()
        };
        let mut new_after: FxHashSet<ValueId> = new_before
            .union(&block_gen[label])
            .copied()
            .collect();
        new_after.retain(|v| !block_kill[label].contains(v));
        before[label] = new_before;
        if new_after != after[label] {
            for &s in &succ_map[label] {
                if workset.insert(s) {
                    worklist.push(s);
                }
            }
            after[label] = new_after;
        }
    }
    tracing::debug!(iterations, backward, "dataflow converged");

    // Sweep each block to produce op-level sets.
    let mut op_before: Vec<Vec<FxHashSet<ValueId>>> = Vec::with_capacity(n);
    let mut op_after: Vec<Vec<FxHashSet<ValueId>>> = Vec::with_capacity(n);
    for (label, block) in blocks.iter().enumerate() {
        let num_ops = block.ops.len();
        let mut bef = vec![FxHashSet::default(); num_ops];
        let mut aft = vec![FxHashSet::default(); num_ops];
        let mut cur = before[label].clone();
        let indices: Vec<usize> = if backward {
            (0..num_ops).rev().collect()
        } else {
            (0..num_ops).collect()
        };
        for idx in indices {
            bef[idx] = cur.clone();
            let (opgen, opkill) = gen_and_kill(&block.ops[idx]);
            cur.retain(|v| !opkill.contains(v));
            cur.extend(opgen.iter().copied());
            aft[idx] = cur.clone();
        }
        op_before.push(bef);
        op_after.push(aft);
    }
    if backward {
        std::mem::swap(&mut op_before, &mut op_after);
    }
    AnalysisResult {
        before: op_before,
        after: op_after,
    }
}
