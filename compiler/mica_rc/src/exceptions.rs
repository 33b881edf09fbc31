//! Exception handling transform.
//!
//! While IR is being built, ops that can raise sit in the middle of basic
//! blocks with their error conditions unchecked — inserting the checks by
//! hand during lowering would be boring and error-prone. This transform
//! makes failure explicit: after every op whose error kind is not `Never`
//! it inserts a branch to the enclosing block's error handler (or to a
//! generated propagate-to-caller block), splitting the block so that a
//! control op only ever appears as the last op.
//!
//! Error kinds map to branch shapes:
//!
//! - `Magic` — `if is_error(result) goto handler else goto rest`.
//! - `False` — `if not result goto handler else goto rest`.
//!
//! The error branch carries a traceback entry (function name, line) so the
//! runtime can reconstruct call frames. Block `error_handler` fields are
//! consumed and cleared; after this pass they carry no information.

use mica_ir::{BasicBlock, BlockId, BranchKind, ErrorKind, FuncIR, Op, OpKind, RType};

// While blocks are being rebuilt, branch targets use a three-range
// encoding: ids below `NEW_BASE` are old block ids (remapped through the
// old-to-new map at the end), ids at or above it point directly at new
// block indices, and the sentinel marks the generated error exit (which
// is appended after all segments, so its index is only known at the end).
// The split loop only ever creates encoded targets; original control flow
// keeps old ids.
const NEW_BASE: u32 = 1 << 30;
const ERROR_EXIT: BlockId = BlockId::from_raw(u32::MAX - 1);

fn encode_new(index: usize) -> BlockId {
    BlockId::from_raw(NEW_BASE + index as u32)
}

/// Insert explicit error checks and split blocks accordingly.
///
/// After this pass every block ends with exactly one control op, and every
/// op that can raise is immediately followed by a branch on its error
/// value.
pub fn insert_exception_handling(func: &mut FuncIR) {
    let old_blocks = std::mem::take(&mut func.blocks);
    let ret_type = func.decl.sig.ret_type.clone();
    let traceback_name = func
        .traceback_name
        .clone()
        .unwrap_or_else(|| func.decl.shortname());

    let mut new_blocks: Vec<BasicBlock> = Vec::new();
    let mut block_map: Vec<usize> = Vec::with_capacity(old_blocks.len());
    let mut needs_error_exit = false;

    for old_block in old_blocks {
        block_map.push(new_blocks.len());
        let handler = old_block.error_handler;
        let mut current = BasicBlock::new();

        for op in old_block.ops {
            let error_kind = op.error_kind();
            let result = op.result;
            let line = op.line;
            let already_terminated = current.terminated();
            current.ops.push(op);

            if error_kind == ErrorKind::Never || already_terminated {
                continue;
            }
            // Raising op: branch on its error value, then continue in a
            // fresh segment.
            let error_target = match handler {
                Some(h) => h, // old id, remapped below
                None => {
                    needs_error_exit = true;
                    ERROR_EXIT
                }
            };
            let (kind, negated) = match error_kind {
                ErrorKind::Magic => (BranchKind::IsError, false),
                ErrorKind::False => (BranchKind::BoolExpr, true),
                ErrorKind::Never => continue,
            };
            // The continuation is the next new block we will push after
            // sealing this segment.
            let cont = encode_new(new_blocks.len() + 1);
            let branch_result = func.env.add_op_result(RType::Void, false);
            current.ops.push(Op::new(
                branch_result,
                line,
                OpKind::Branch {
                    value: result,
                    true_target: error_target,
                    false_target: cont,
                    kind,
                    negated,
                    traceback_entry: Some((traceback_name.clone(), line)),
                    rare: true,
                },
            ));
            new_blocks.push(std::mem::take(&mut current));
        }
        new_blocks.push(current);
    }

    // Append the propagate-to-caller block: load the error value of the
    // return type and return it.
    let error_exit_index = if needs_error_exit {
        let mut block = BasicBlock::new();
        let error_value = func.env.add_op_result(ret_type.clone(), false);
        block.ops.push(Op::new(
            error_value,
            -1,
            OpKind::LoadErrorValue { undefines: false },
        ));
        block.ops.push(Op::new(
            func.env.add_op_result(RType::Void, false),
            -1,
            OpKind::Return { value: error_value },
        ));
        new_blocks.push(block);
        new_blocks.len() - 1
    } else {
        0
    };

    // Resolve the three-range target encoding.
    for block in &mut new_blocks {
        for op in &mut block.ops {
            match &mut op.kind {
                OpKind::Goto { target } => {
                    *target = resolve(*target, &block_map, error_exit_index);
                }
                OpKind::Branch {
                    true_target,
                    false_target,
                    ..
                } => {
                    *true_target = resolve(*true_target, &block_map, error_exit_index);
                    *false_target = resolve(*false_target, &block_map, error_exit_index);
                }
                _ => {}
            }
        }
        block.error_handler = None;
    }

    func.blocks = new_blocks;
    func.number_blocks();
}

fn resolve(target: BlockId, block_map: &[usize], error_exit_index: usize) -> BlockId {
    if target == ERROR_EXIT {
        BlockId::from_raw(error_exit_index as u32)
    } else if target.raw() >= NEW_BASE {
        BlockId::from_raw(target.raw() - NEW_BASE)
    } else {
        BlockId::from_raw(block_map[target.index()] as u32)
    }
}
