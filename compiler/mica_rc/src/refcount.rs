//! Reference-count insertion.
//!
//! Rewrites a function's blocks in place, adding `IncRef`/`DecRef` ops so
//! that along every execution path:
//!
//! - every refcounted value produced by a non-stealing op is dropped
//!   exactly once;
//! - reads of borrowed values stay borrowed (no incref on use);
//! - sources stolen by an op are not dropped after it;
//! - values that may be undefined at a drop site use the null-tolerant
//!   `xdec` form.
//!
//! # Algorithm
//!
//! Run liveness, must-defined, and borrowed-arguments. Then walk each
//! block in program order:
//!
//! 1. Before an op that steals a source which is borrowed, or which stays
//!    live after the op, insert `IncRef` to pay for the stolen reference.
//! 2. After an op, insert `DecRef` for each owned source that just died
//!    and was not stolen, and for a result that is dead on arrival.
//! 3. On CFG edges, reconcile: a value that is live out of one successor
//!    path but not another gets its `DecRef` in a transition block
//!    spliced onto the edge where it dies.
//!
//! Borrow propagation follows assignment aliases: a register whose every
//! assignment copies a borrowed value is itself borrowed and is skipped by
//! all reference counting. Unboxed tuples recurse elementwise at the emit
//! level, so a single inc/dec op per tuple value suffices here.

use rustc_hash::FxHashSet;

use mica_ir::{
    BasicBlock, BlockId, FuncIR, Op, OpKind, TypeRegistry, ValueId,
};

use crate::analyses::{
    analyze_borrowed_arguments, analyze_live_regs, analyze_must_defined_regs,
};
use crate::dataflow::{get_cfg, AnalysisResult};

/// Insert reference count inc/dec ops to a function.
///
/// The function must already have explicit exception handling (every
/// block ends with a single control op).
pub fn insert_ref_count_ops(func: &mut FuncIR, registry: &TypeRegistry) {
    tracing::debug!(function = %func.decl.fullname(), "inserting reference count ops");
    let cfg = get_cfg(&func.blocks);
    let args: FxHashSet<ValueId> = func.env.args().into_iter().collect();
    let all_values: FxHashSet<ValueId> = func.env.values().map(|(id, _)| id).collect();

    let live = analyze_live_regs(&func.blocks, &cfg);
    let defined = analyze_must_defined_regs(&func.blocks, &cfg, &args, &all_values);
    let arg_borrow = analyze_borrowed_arguments(&func.blocks, &cfg, &args);
    let borrow_derived = compute_borrow_derived(func);

    let ctx = RcContext {
        registry,
        borrow_derived,
        arg_borrow: &arg_borrow,
        live: &live,
        defined: &defined,
    };

    let num_blocks = func.blocks.len();
    for block_index in 0..num_blocks {
        transform_block(func, block_index, &ctx);
    }

    insert_branch_decrefs(func, &ctx);
    func.number_blocks();
}

struct RcContext<'a> {
    registry: &'a TypeRegistry,
    /// Registers that alias borrowed values through assignment chains.
    borrow_derived: FxHashSet<ValueId>,
    arg_borrow: &'a AnalysisResult,
    live: &'a AnalysisResult,
    defined: &'a AnalysisResult,
}

impl RcContext<'_> {
    fn is_refcounted(&self, func: &FuncIR, v: ValueId) -> bool {
        func.env.rtype(v).is_refcounted(self.registry)
    }

    /// Is `v` borrowed at op location `(block, op)`?
    fn is_borrowed_at(&self, func: &FuncIR, v: ValueId, block: usize, op: usize) -> bool {
        if self.borrow_derived.contains(&v) {
            return true;
        }
        if !func.env.is_borrowed(v) {
            return false;
        }
        // Arguments lose their borrowed status at the first assignment;
        // other borrowed values (static loads, boxed singletons) keep it.
        if func.env.is_arg(v) {
            self.arg_borrow.before[block][op].contains(&v)
        } else {
            true
        }
    }
}

/// Registers whose every assignment copies a borrowed value.
///
/// Such a register holds an alias into storage someone else owns; it is
/// never inc/dec'd itself. Chains (`y = x; z = y`) converge by iterating
/// until no register changes classification.
fn compute_borrow_derived(func: &FuncIR) -> FxHashSet<ValueId> {
    // Candidate set: registers only ever assigned from borrowed values.
    let mut derived: FxHashSet<ValueId> = FxHashSet::default();
    loop {
        let mut changed = false;
        let mut assigned: FxHashSet<ValueId> = FxHashSet::default();
        let mut disqualified: FxHashSet<ValueId> = FxHashSet::default();
        for block in &func.blocks {
            for op in &block.ops {
                if let OpKind::Assign { dest, src } = op.kind {
                    assigned.insert(dest);
                    let src_borrowed = func.env.is_borrowed(src) || derived.contains(&src);
                    if !src_borrowed {
                        disqualified.insert(dest);
                    }
                }
            }
        }
        for v in assigned {
            if !disqualified.contains(&v) && derived.insert(v) {
                changed = true;
            }
        }
        if !changed {
            return derived;
        }
    }
}

fn transform_block(func: &mut FuncIR, block_index: usize, ctx: &RcContext<'_>) {
    let old_ops = std::mem::take(&mut func.blocks[block_index].ops);
    let mut new_ops: Vec<Op> = Vec::with_capacity(old_ops.len());

    for (op_index, op) in old_ops.into_iter().enumerate() {
        let stolen = op.stolen();
        let sources = op.unique_sources();
        let live_after = &ctx.live.after[block_index][op_index];
        let defined_after = &ctx.defined.after[block_index][op_index];

        // Pay for stolen references up front.
        for &src in &sources {
            if !ctx.is_refcounted(func, src) || !stolen.contains(&src) {
                continue;
            }
            let borrowed = ctx.is_borrowed_at(func, src, block_index, op_index);
            // Copying a borrowed value into a borrow-derived register
            // propagates the borrow instead of taking a reference.
            if borrowed
                && matches!(op.kind, OpKind::Assign { dest, .. } if ctx.borrow_derived.contains(&dest))
            {
                continue;
            }
            if borrowed || live_after.contains(&src) {
                let result = func.env.add_op_result(mica_ir::RType::Void, false);
                new_ops.push(Op::new(result, op.line, OpKind::IncRef { src }));
            }
        }

        let dest = op.dest();
        let is_control = op.is_control();
        let line = op.line;
        new_ops.push(op);

        // Decref sources that died here, unless the op consumed them.
        // Control ops cannot be followed by more ops; their dying sources
        // are reconciled on the outgoing edges instead.
        if !is_control {
            for &src in &sources {
                if Some(src) == dest || !ctx.is_refcounted(func, src) {
                    continue;
                }
                if stolen.contains(&src)
                    || ctx.is_borrowed_at(func, src, block_index, op_index)
                    || live_after.contains(&src)
                {
                    continue;
                }
                let is_xdec = !defined_after.contains(&src);
                let dec_result = func.env.add_op_result(mica_ir::RType::Void, false);
                new_ops.push(Op::new(dec_result, line, OpKind::DecRef { src, is_xdec }));
            }

            // A result that is dead on arrival still owns a reference.
            if let Some(dest) = dest {
                if ctx.is_refcounted(func, dest)
                    && !ctx.is_borrowed_at(func, dest, block_index, op_index)
                    && !live_after.contains(&dest)
                {
                    let dec_result = func.env.add_op_result(mica_ir::RType::Void, false);
                    new_ops.push(Op::new(
                        dec_result,
                        line,
                        OpKind::DecRef { src: dest, is_xdec: false },
                    ));
                }
            }
        }
    }

    func.blocks[block_index].ops = new_ops;
}

/// Reconcile ownership on CFG edges.
///
/// A value live into one successor but not another still owns a reference
/// on the path where it dies. Splice a transition block holding the
/// decrefs onto that edge.
fn insert_branch_decrefs(func: &mut FuncIR, ctx: &RcContext<'_>) {
    let num_blocks = func.blocks.len();
    let mut transitions: Vec<BasicBlock> = Vec::new();

    for block_index in 0..num_blocks {
        // Analysis results are indexed by original op positions; the
        // terminator kept its place at the end of the block, but its
        // original index comes from the analysis row length.
        let Some(orig_last) = ctx.live.after[block_index].len().checked_sub(1) else {
            continue;
        };
        let Some(terminator) = func.blocks[block_index].ops.last() else {
            continue;
        };
        let (targets, term_sources, term_stolen) = match &terminator.kind {
            OpKind::Goto { target } => (vec![*target], terminator.unique_sources(), terminator.stolen()),
            OpKind::Branch {
                true_target,
                false_target,
                ..
            } => (
                vec![*true_target, *false_target],
                terminator.unique_sources(),
                terminator.stolen(),
            ),
            _ => continue,
        };
        let line = terminator.line;

        // Values owned at block exit: anything live after the terminator
        // plus the terminator's own unstolen sources.
        let mut exit_candidates: Vec<ValueId> = ctx.live.after[block_index][orig_last]
            .iter()
            .copied()
            .collect();
        for &src in &term_sources {
            if !term_stolen.contains(&src) && !exit_candidates.contains(&src) {
                exit_candidates.push(src);
            }
        }
        exit_candidates.sort_unstable();

        for (slot, target) in targets.into_iter().enumerate() {
            let target_index = target.index();
            let entry_live = ctx.live.before[target_index]
                .first()
                .cloned()
                .unwrap_or_default();
            let dying: Vec<ValueId> = exit_candidates
                .iter()
                .copied()
                .filter(|&v| {
                    ctx.is_refcounted(func, v)
                        && !ctx.is_borrowed_at(func, v, block_index, orig_last)
                        && !entry_live.contains(&v)
                })
                .collect();
            if dying.is_empty() {
                continue;
            }
            let is_xdec: Vec<bool> = dying
                .iter()
                .map(|v| !ctx.defined.after[block_index][orig_last].contains(v))
                .collect();

            let new_target =
                BlockId::from_raw((num_blocks + transitions.len()) as u32);
            let mut transition = BasicBlock::new();
            for (&src, &xdec) in dying.iter().zip(&is_xdec) {
                let dec_result = func.env.add_op_result(mica_ir::RType::Void, false);
                transition
                    .ops
                    .push(Op::new(dec_result, line, OpKind::DecRef { src, is_xdec: xdec }));
            }
            let goto_result = func.env.add_op_result(mica_ir::RType::Void, false);
            transition
                .ops
                .push(Op::new(goto_result, line, OpKind::Goto { target }));
            transitions.push(transition);

            let terminator = func.blocks[block_index]
                .ops
                .last_mut()
                .unwrap_or_else(|| unreachable!());
            match &mut terminator.kind {
                OpKind::Goto { target } => *target = new_target,
                OpKind::Branch {
                    true_target,
                    false_target,
                    ..
                } => {
                    if slot == 0 {
                        *true_target = new_target;
                    } else {
                        *false_target = new_target;
                    }
                }
                _ => {}
            }
        }
    }

    func.blocks.extend(transitions);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mica_ir::{
        primitives, BranchKind, Environment, FuncDecl, FuncSignature, RType, RuntimeArg,
    };
    use pretty_assertions::assert_eq;

    fn count_ops(func: &FuncIR, pred: impl Fn(&OpKind) -> bool) -> usize {
        func.blocks
            .iter()
            .flat_map(|b| b.ops.iter())
            .filter(|op| pred(&op.kind))
            .count()
    }

    /// def f(x: list) -> int: y = x; return len(y)
    fn borrowed_list_len() -> (FuncIR, ValueId) {
        let mut env = Environment::new();
        let x = env.add_local("x", RType::list(), true);
        let y = env.add_local("y", RType::list(), false);
        let mut block = BasicBlock::new();
        block.ops.push(Op::new(
            env.add_op_result(RType::Void, false),
            1,
            OpKind::Assign { dest: y, src: x },
        ));
        let r0 = env.add_op_result(RType::short_int(), false);
        block.ops.push(Op::new(
            r0,
            1,
            OpKind::Primitive { desc: primitives::list_len(), args: vec![y] },
        ));
        block.ops.push(Op::new(
            env.add_op_result(RType::Void, false),
            1,
            OpKind::Return { value: r0 },
        ));
        let func = FuncIR::new(
            FuncDecl::new(
                "f",
                None,
                "m",
                FuncSignature::new(
                    vec![RuntimeArg::new("x", RType::list())],
                    RType::short_int(),
                ),
            ),
            vec![block],
            env,
        );
        (func, x)
    }

    #[test]
    fn borrowed_arg_alias_needs_no_rc_ops() {
        let (mut func, x) = borrowed_list_len();
        let registry = TypeRegistry::standard();
        insert_ref_count_ops(&mut func, &registry);

        // No IncRef at all: x is a borrowed argument and y only aliases it.
        assert_eq!(count_ops(&func, |k| matches!(k, OpKind::IncRef { .. })), 0);
        // No DecRef of x either: borrowed values are never dropped here.
        assert_eq!(
            count_ops(&func, |k| matches!(k, OpKind::DecRef { src, .. } if *src == x)),
            0
        );
        // The length read survives untouched, exactly once.
        assert_eq!(
            count_ops(&func, |k| matches!(
                k,
                OpKind::Primitive { desc, .. } if desc.name == "list_len"
            )),
            1
        );
    }

    /// An owned value that dies mid-block gets exactly one DecRef.
    #[test]
    fn dead_owned_value_is_dropped_once() {
        let mut env = Environment::new();
        let mut block = BasicBlock::new();
        // r0 = list.pop-style owned object; result unused afterwards.
        let r0 = env.add_op_result(RType::object(), false);
        block.ops.push(Op::new(
            r0,
            1,
            OpKind::Call { func: "m.make".to_owned(), args: vec![] },
        ));
        let r1 = env.add_op_result(RType::short_int(), false);
        block.ops.push(Op::new(r1, 2, OpKind::LoadInt { value: 0 }));
        block.ops.push(Op::new(
            env.add_op_result(RType::Void, false),
            2,
            OpKind::Return { value: r1 },
        ));
        let mut func = FuncIR::new(
            FuncDecl::new("g", None, "m", FuncSignature::new(vec![], RType::short_int())),
            vec![block],
            env,
        );
        let registry = TypeRegistry::standard();
        insert_ref_count_ops(&mut func, &registry);

        let decs: Vec<&Op> = func.blocks[0]
            .ops
            .iter()
            .filter(|op| matches!(op.kind, OpKind::DecRef { src, .. } if src == r0))
            .collect();
        assert_eq!(decs.len(), 1);
        // The dead result is dropped immediately after its producing call.
        assert!(matches!(func.blocks[0].ops[1].kind, OpKind::DecRef { .. }));
    }

    /// Passing an owned value to a stealing op while it stays live needs
    /// an IncRef before the op.
    #[test]
    fn stolen_but_still_live_value_gets_incref() {
        let mut env = Environment::new();
        let mut block = BasicBlock::new();
        let r0 = env.add_op_result(RType::object(), false);
        block.ops.push(Op::new(
            r0,
            1,
            OpKind::Call { func: "m.make".to_owned(), args: vec![] },
        ));
        // cast steals r0, but r0 is returned later.
        let r1 = env.add_op_result(RType::object(), false);
        block.ops.push(Op::new(r1, 2, OpKind::Cast { src: r0 }));
        let r2 = env.add_op_result(RType::Void, false);
        block.ops.push(Op::new(
            r2,
            3,
            OpKind::InitStatic {
                value: r1,
                identifier: "cache".to_owned(),
                module_name: None,
                namespace: mica_ir::StaticNamespace::Static,
            },
        ));
        block.ops.push(Op::new(
            env.add_op_result(RType::Void, false),
            4,
            OpKind::Return { value: r0 },
        ));
        let mut func = FuncIR::new(
            FuncDecl::new("h", None, "m", FuncSignature::new(vec![], RType::object())),
            vec![block],
            env,
        );
        let registry = TypeRegistry::standard();
        insert_ref_count_ops(&mut func, &registry);

        let incs = count_ops(&func, |k| matches!(k, OpKind::IncRef { src } if *src == r0));
        assert_eq!(incs, 1);
        // The IncRef dominates the stealing cast.
        let ops = &func.blocks[0].ops;
        let inc_pos = ops
            .iter()
            .position(|op| matches!(op.kind, OpKind::IncRef { .. }))
            .unwrap();
        let cast_pos = ops
            .iter()
            .position(|op| matches!(op.kind, OpKind::Cast { .. }))
            .unwrap();
        assert!(inc_pos < cast_pos);
    }

    /// A value live on one branch arm but dead on the other gets its
    /// DecRef on the edge where it dies.
    #[test]
    fn branch_edge_reconciliation() {
        let mut env = Environment::new();
        let cond = env.add_local("cond", RType::bool_(), true);
        let mut entry = BasicBlock::new();
        let r0 = env.add_op_result(RType::object(), false);
        entry.ops.push(Op::new(
            r0,
            1,
            OpKind::Call { func: "m.make".to_owned(), args: vec![] },
        ));
        entry.ops.push(Op::new(
            env.add_op_result(RType::Void, false),
            2,
            OpKind::Branch {
                value: cond,
                true_target: BlockId::from_raw(1),
                false_target: BlockId::from_raw(2),
                kind: BranchKind::BoolExpr,
                negated: false,
                traceback_entry: None,
                rare: false,
            },
        ));
        // True arm returns r0 (stays owned), false arm returns fresh int.
        let mut uses = BasicBlock::new();
        uses.ops.push(Op::new(
            env.add_op_result(RType::Void, false),
            3,
            OpKind::Return { value: r0 },
        ));
        let mut skips = BasicBlock::new();
        let other = env.add_op_result(RType::object(), false);
        skips.ops.push(Op::new(
            other,
            4,
            OpKind::Call { func: "m.make".to_owned(), args: vec![] },
        ));
        skips.ops.push(Op::new(
            env.add_op_result(RType::Void, false),
            4,
            OpKind::Return { value: other },
        ));
        let mut func = FuncIR::new(
            FuncDecl::new(
                "k",
                None,
                "m",
                FuncSignature::new(vec![RuntimeArg::new("cond", RType::bool_())], RType::object()),
            ),
            vec![entry, uses, skips],
            env,
        );
        let registry = TypeRegistry::standard();
        insert_ref_count_ops(&mut func, &registry);

        // A transition block was spliced onto the false edge, dropping r0.
        assert_eq!(func.blocks.len(), 4);
        let transition = &func.blocks[3];
        assert!(matches!(transition.ops[0].kind, OpKind::DecRef { src, .. } if src == r0));
        assert!(matches!(transition.ops[1].kind, OpKind::Goto { .. }));
        // And the branch's false edge was retargeted at it.
        let OpKind::Branch { false_target, .. } = func.blocks[0].ops.last().unwrap().kind
        else {
            panic!("expected branch terminator");
        };
        assert_eq!(false_target.index(), 3);
    }
}
