//! The concrete dataflow analyses.
//!
//! All five instances share the generic framework in [`crate::dataflow`];
//! each contributes only its gen/kill functions, direction, join kind, and
//! initial set.

use rustc_hash::FxHashSet;

use mica_ir::{BasicBlock, FuncIR, Op, ValueId};

use crate::dataflow::{run_analysis, AnalysisKind, AnalysisResult, Cfg, Direction, GenAndKill};

fn no_sets() -> GenAndKill {
    (FxHashSet::default(), FxHashSet::default())
}

/// Calculate potentially defined registers at each location.
///
/// A register is defined if it has a value along *some* path from the
/// initial location.
pub fn analyze_maybe_defined_regs(
    blocks: &[BasicBlock],
    cfg: &Cfg,
    initial_defined: &FxHashSet<ValueId>,
) -> AnalysisResult {
    let gen_and_kill = |op: &Op| -> GenAndKill {
        match op.dest() {
            Some(dest) => {
                let mut gen = FxHashSet::default();
                gen.insert(dest);
                (gen, FxHashSet::default())
            }
            None => no_sets(),
        }
    };
    run_analysis(
        blocks,
        cfg,
        &gen_and_kill,
        initial_defined,
        AnalysisKind::Maybe,
        Direction::Forward,
        None,
    )
}

/// Calculate always-defined registers at each location.
///
/// A register is defined if it has a value along *all* paths from the
/// initial location.
pub fn analyze_must_defined_regs(
    blocks: &[BasicBlock],
    cfg: &Cfg,
    initial_defined: &FxHashSet<ValueId>,
    all_regs: &FxHashSet<ValueId>,
) -> AnalysisResult {
    let gen_and_kill = |op: &Op| -> GenAndKill {
        match op.dest() {
            Some(dest) => {
                let mut gen = FxHashSet::default();
                gen.insert(dest);
                (gen, FxHashSet::default())
            }
            None => no_sets(),
        }
    };
    run_analysis(
        blocks,
        cfg,
        &gen_and_kill,
        initial_defined,
        AnalysisKind::Must,
        Direction::Forward,
        Some(all_regs),
    )
}

/// Calculate arguments that can keep using references borrowed from the
/// caller. An argument stops being borrowed at the first assignment to it.
pub fn analyze_borrowed_arguments(
    blocks: &[BasicBlock],
    cfg: &Cfg,
    args: &FxHashSet<ValueId>,
) -> AnalysisResult {
    let args_clone = args.clone();
    let gen_and_kill = move |op: &Op| -> GenAndKill {
        match op.dest() {
            Some(dest) if args_clone.contains(&dest) => {
                let mut kill = FxHashSet::default();
                kill.insert(dest);
                (FxHashSet::default(), kill)
            }
            _ => no_sets(),
        }
    };
    run_analysis(
        blocks,
        cfg,
        &gen_and_kill,
        args,
        AnalysisKind::Must,
        Direction::Forward,
        Some(args),
    )
}

/// Calculate potentially undefined registers at each location.
///
/// A register is undefined if there is some path from the initial block
/// along which it never gets a value.
pub fn analyze_undefined_regs(
    func: &FuncIR,
    cfg: &Cfg,
    initial_defined: &FxHashSet<ValueId>,
) -> AnalysisResult {
    let initial_undefined: FxHashSet<ValueId> = func
        .env
        .values()
        .map(|(id, _)| id)
        .filter(|id| !initial_defined.contains(id))
        .collect();
    let gen_and_kill = |op: &Op| -> GenAndKill {
        match op.dest() {
            Some(dest) => {
                let mut kill = FxHashSet::default();
                kill.insert(dest);
                (FxHashSet::default(), kill)
            }
            None => no_sets(),
        }
    };
    run_analysis(
        &func.blocks,
        cfg,
        &gen_and_kill,
        &initial_undefined,
        AnalysisKind::Maybe,
        Direction::Forward,
        None,
    )
}

/// Calculate live registers at each location.
///
/// A register is live at a location if it can be read along some path
/// starting from there. Uses generate liveness; a definition kills it.
pub fn analyze_live_regs(blocks: &[BasicBlock], cfg: &Cfg) -> AnalysisResult {
    let gen_and_kill = |op: &Op| -> GenAndKill {
        let gen: FxHashSet<ValueId> = op.sources().iter().copied().collect();
        let mut kill = FxHashSet::default();
        if let Some(dest) = op.dest() {
            kill.insert(dest);
        }
        (gen, kill)
    };
    run_analysis(
        blocks,
        cfg,
        &gen_and_kill,
        &FxHashSet::default(),
        AnalysisKind::Maybe,
        Direction::Backward,
        None,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dataflow::get_cfg;
    use mica_ir::{
        primitives, BlockId, BranchKind, Environment, FuncDecl, FuncSignature, OpKind, RType,
    };

    /// a = 1; b = a + 1; return b
    fn straight_line() -> (Vec<BasicBlock>, Environment, ValueId, ValueId) {
        let mut env = Environment::new();
        let a = env.add_local("a", RType::short_int(), false);
        let b = env.add_local("b", RType::short_int(), false);
        let mut block = BasicBlock::new();

        let r0 = env.add_op_result(RType::short_int(), false);
        block.ops.push(Op::new(r0, 1, OpKind::LoadInt { value: 1 }));
        block
            .ops
            .push(Op::new(env.add_op_result(RType::Void, false), 1, OpKind::Assign { dest: a, src: r0 }));

        let r1 = env.add_op_result(RType::short_int(), false);
        block.ops.push(Op::new(r1, 2, OpKind::LoadInt { value: 1 }));
        let r2 = env.add_op_result(RType::int(), false);
        block.ops.push(Op::new(
            r2,
            2,
            OpKind::Primitive { desc: primitives::int_add(), args: vec![a, r1] },
        ));
        block
            .ops
            .push(Op::new(env.add_op_result(RType::Void, false), 2, OpKind::Assign { dest: b, src: r2 }));

        block.ops.push(Op::new(
            env.add_op_result(RType::Void, false),
            3,
            OpKind::Return { value: b },
        ));
        (vec![block], env, a, b)
    }

    #[test]
    fn liveness_on_straight_line_code() {
        let (blocks, _env, a, b) = straight_line();
        let cfg = get_cfg(&blocks);
        let live = analyze_live_regs(&blocks, &cfg);

        // After `a = 1` (op index 1), `a` is live: it is read by the add.
        assert!(live.after[0][1].contains(&a));
        // After `b = a + 1` (op index 4), `b` is live and `a` is dead.
        assert!(live.after[0][4].contains(&b));
        assert!(!live.after[0][4].contains(&a));
        // Nothing is live after the return.
        assert!(live.after[0][5].is_empty());
    }

    #[test]
    fn maybe_and_must_defined_agree_on_straight_line() {
        let (blocks, env, a, b) = straight_line();
        let cfg = get_cfg(&blocks);
        let initial = FxHashSet::default();
        let all: FxHashSet<ValueId> = env.values().map(|(id, _)| id).collect();

        let maybe = analyze_maybe_defined_regs(&blocks, &cfg, &initial);
        let must = analyze_must_defined_regs(&blocks, &cfg, &initial, &all);

        // Before the first op nothing is defined.
        assert!(!maybe.before[0][0].contains(&a));
        assert!(!must.before[0][0].contains(&a));
        // After both assignments, both report a and b defined.
        assert!(maybe.after[0][4].contains(&a) && maybe.after[0][4].contains(&b));
        assert!(must.after[0][4].contains(&a) && must.after[0][4].contains(&b));
    }

    /// Build a diamond where one arm assigns `x` and the other does not.
    fn diamond() -> (Vec<BasicBlock>, Environment, ValueId) {
        let mut env = Environment::new();
        let cond = env.add_local("cond", RType::bool_(), true);
        let x = env.add_local("x", RType::object(), false);

        let mut entry = BasicBlock::new();
        entry.ops.push(Op::new(
            env.add_op_result(RType::Void, false),
            1,
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

        let mut assigns = BasicBlock::new();
        let r0 = env.add_op_result(RType::object(), false);
        assigns.ops.push(Op::new(
            r0,
            2,
            OpKind::LoadStatic {
                identifier: "thing".to_owned(),
                module_name: None,
                namespace: mica_ir::StaticNamespace::Static,
            },
        ));
        assigns
            .ops
            .push(Op::new(env.add_op_result(RType::Void, false), 2, OpKind::Assign { dest: x, src: r0 }));
        assigns.ops.push(Op::new(
            env.add_op_result(RType::Void, false),
            2,
            OpKind::Goto { target: BlockId::from_raw(3) },
        ));

        let mut skips = BasicBlock::new();
        skips.ops.push(Op::new(
            env.add_op_result(RType::Void, false),
            3,
            OpKind::Goto { target: BlockId::from_raw(3) },
        ));

        let mut exit = BasicBlock::new();
        exit.ops.push(Op::new(
            env.add_op_result(RType::Void, false),
            4,
            OpKind::Return { value: x },
        ));

        (vec![entry, assigns, skips, exit], env, x)
    }

    #[test]
    fn maybe_but_not_must_defined_through_diamond() {
        let (blocks, env, x) = diamond();
        let cfg = get_cfg(&blocks);
        let args: FxHashSet<ValueId> = env.args().into_iter().collect();
        let all: FxHashSet<ValueId> = env.values().map(|(id, _)| id).collect();

        let maybe = analyze_maybe_defined_regs(&blocks, &cfg, &args);
        let must = analyze_must_defined_regs(&blocks, &cfg, &args, &all);

        // At the join, x may be defined but is not must-defined.
        assert!(maybe.before[3][0].contains(&x));
        assert!(!must.before[3][0].contains(&x));
    }

    #[test]
    fn undefined_tracks_the_unassigned_arm() {
        let (blocks, env, x) = diamond();
        let cfg = get_cfg(&blocks);
        let args: FxHashSet<ValueId> = env.args().into_iter().collect();
        let func = FuncIR::new(
            FuncDecl::new("f", None, "m", FuncSignature::new(vec![], RType::object())),
            blocks,
            env,
        );
        let undef = analyze_undefined_regs(&func, &cfg, &args);
        // x may still be undefined at the join.
        assert!(undef.before[3][0].contains(&x));
        // But not after the assignment in the left arm.
        assert!(!undef.after[1][1].contains(&x));
    }

    #[test]
    fn borrowed_arguments_end_at_assignment() {
        let mut env = Environment::new();
        let arg = env.add_local("x", RType::object(), true);
        let mut block = BasicBlock::new();
        let r0 = env.add_op_result(RType::object(), false);
        block.ops.push(Op::new(
            r0,
            1,
            OpKind::LoadStatic {
                identifier: "other".to_owned(),
                module_name: None,
                namespace: mica_ir::StaticNamespace::Static,
            },
        ));
        block
            .ops
            .push(Op::new(env.add_op_result(RType::Void, false), 2, OpKind::Assign { dest: arg, src: r0 }));
        block.ops.push(Op::new(
            env.add_op_result(RType::Void, false),
            3,
            OpKind::Return { value: arg },
        ));
        let blocks = vec![block];
        let cfg = get_cfg(&blocks);
        let args: FxHashSet<ValueId> = [arg].into_iter().collect();
        let borrowed = analyze_borrowed_arguments(&blocks, &cfg, &args);

        // Borrowed until the assignment, not after.
        assert!(borrowed.before[0][1].contains(&arg));
        assert!(!borrowed.after[0][1].contains(&arg));
        assert!(!borrowed.before[0][2].contains(&arg));
    }
}
