//! IR ops.
//!
//! Ops are three-address instructions over values in a function's
//! [`Environment`](crate::Environment). Every op is itself a value (its
//! result), addressed by the same [`ValueId`](crate::ValueId) space as
//! registers; control-flow ops and void-typed ops simply have a `void`
//! result that nothing reads.
//!
//! When building IR, ops that can raise may appear in the middle of a
//! basic block; the exception-splitting transform later inserts explicit
//! error branches and restores the invariant that only the last op of a
//! block transfers control.

use smallvec::{smallvec, SmallVec};

use crate::block::BlockId;
use crate::env::ValueId;
use crate::primitives::{PrimitiveDesc, Steals};

/// How runtime failure of an op is signalled.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Never raises.
    Never,
    /// Failure produces the magic error sentinel of the result type.
    Magic,
    /// Failure produces boolean false.
    False,
}

/// Namespace of a C static.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StaticNamespace {
    Static,
    Type,
    Module,
}

impl StaticNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            StaticNamespace::Static => "static",
            StaticNamespace::Type => "type",
            StaticNamespace::Module => "module",
        }
    }
}

/// Condition form of a [`OpKind::Branch`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BranchKind {
    /// Branch on the boolean value itself.
    BoolExpr,
    /// Branch on whether the value is the error sentinel.
    IsError,
}

/// Small vector of op operands.
pub type Sources = SmallVec<[ValueId; 3]>;

/// The operation performed by an [`Op`].
#[derive(Clone, Debug, PartialEq)]
pub enum OpKind {
    /// `dest = src`. Writes an existing register rather than the op's own
    /// result slot; steals `src`.
    Assign { dest: ValueId, src: ValueId },
    /// Load an integer literal. Result type is `short_int`.
    LoadInt { value: i64 },
    /// Load the error sentinel of the result type. With `undefines`, the
    /// definedness analysis treats the target as undefined afterwards.
    LoadErrorValue { undefines: bool },
    /// `result = obj.attr` on a native object.
    GetAttr { obj: ValueId, attr: String },
    /// `obj.attr = src`; steals `src`; result is an is-error bool.
    SetAttr {
        obj: ValueId,
        attr: String,
        src: ValueId,
    },
    /// Load a C static. The result is borrowed.
    LoadStatic {
        identifier: String,
        module_name: Option<String>,
        namespace: StaticNamespace,
    },
    /// Initialize a C static.
    InitStatic {
        value: ValueId,
        identifier: String,
        module_name: Option<String>,
        namespace: StaticNamespace,
    },
    /// `result = src[index]` on a fixed-length tuple.
    TupleGet { src: ValueId, index: usize },
    /// `result = (items...)` building a fixed-length tuple struct.
    TupleSet { items: Vec<ValueId> },
    /// Runtime type check without representation change; steals `src`.
    Cast { src: ValueId },
    /// Convert an unboxed value to the boxed object representation;
    /// steals `src`. Boxing a fixed singleton (`None`, `bool`) yields a
    /// borrowed reference.
    Box { src: ValueId },
    /// Check and convert a boxed value to an unboxed representation.
    Unbox { src: ValueId },
    /// Raise a builtin exception, optionally with a message.
    RaiseStandardError {
        class_name: String,
        message: Option<String>,
    },
    /// Native call to a module-level function, by fullname.
    Call { func: String, args: Vec<ValueId> },
    /// Native method call through the vtable.
    MethodCall {
        obj: ValueId,
        method: String,
        args: Vec<ValueId>,
    },
    /// Primitive operation described by `desc`.
    Primitive {
        desc: PrimitiveDesc,
        args: Vec<ValueId>,
    },
    /// Increment the reference count of `src`.
    IncRef { src: ValueId },
    /// Decrement the reference count of `src`; `is_xdec` tolerates null.
    DecRef { src: ValueId, is_xdec: bool },
    /// Unconditional jump.
    Goto { target: BlockId },
    /// `if [not] value goto true_target else goto false_target`.
    ///
    /// Branches must not raise; an operation that both computes and can
    /// fail is split into two ops before the branch.
    Branch {
        value: ValueId,
        true_target: BlockId,
        false_target: BlockId,
        kind: BranchKind,
        negated: bool,
        /// When set, the true edge records a traceback entry
        /// (function name, line).
        traceback_entry: Option<(String, i64)>,
        rare: bool,
    },
    /// Return a value; steals it.
    Return { value: ValueId },
    /// Marks statically unreachable block ends.
    Unreachable,
}

/// A single IR instruction: its result value id, source line, and kind.
#[derive(Clone, Debug, PartialEq)]
pub struct Op {
    /// The value this op produces (possibly void-typed).
    pub result: ValueId,
    pub line: i64,
    pub kind: OpKind,
}

impl Op {
    pub fn new(result: ValueId, line: i64, kind: OpKind) -> Self {
        Op { result, line, kind }
    }

    /// How failure of this op is signalled at run time.
    pub fn error_kind(&self) -> ErrorKind {
        match &self.kind {
            OpKind::GetAttr { .. }
            | OpKind::Cast { .. }
            | OpKind::Unbox { .. }
            | OpKind::Call { .. }
            | OpKind::MethodCall { .. } => ErrorKind::Magic,
            OpKind::SetAttr { .. } | OpKind::RaiseStandardError { .. } => ErrorKind::False,
            OpKind::Primitive { desc, .. } => desc.error_kind,
            _ => ErrorKind::Never,
        }
    }

    pub fn can_raise(&self) -> bool {
        self.error_kind() != ErrorKind::Never
    }

    /// Is this a control-flow op (only legal as the last op of a block)?
    pub fn is_control(&self) -> bool {
        matches!(
            self.kind,
            OpKind::Goto { .. }
                | OpKind::Branch { .. }
                | OpKind::Return { .. }
                | OpKind::Unreachable
        )
    }

    /// Values read by this op, in operand order (may repeat).
    pub fn sources(&self) -> Sources {
        match &self.kind {
            OpKind::Assign { src, .. }
            | OpKind::Cast { src }
            | OpKind::Box { src }
            | OpKind::Unbox { src }
            | OpKind::TupleGet { src, .. }
            | OpKind::IncRef { src }
            | OpKind::DecRef { src, .. } => smallvec![*src],
            OpKind::GetAttr { obj, .. } => smallvec![*obj],
            OpKind::SetAttr { obj, src, .. } => smallvec![*obj, *src],
            OpKind::InitStatic { value, .. } => smallvec![*value],
            OpKind::TupleSet { items } => items.iter().copied().collect(),
            OpKind::Call { args, .. } => args.iter().copied().collect(),
            OpKind::MethodCall { obj, args, .. } => {
                let mut srcs: Sources = smallvec![*obj];
                srcs.extend(args.iter().copied());
                srcs
            }
            OpKind::Primitive { args, .. } => args.iter().copied().collect(),
            OpKind::Branch { value, .. } => smallvec![*value],
            OpKind::Return { value } => smallvec![*value],
            OpKind::LoadInt { .. }
            | OpKind::LoadErrorValue { .. }
            | OpKind::LoadStatic { .. }
            | OpKind::RaiseStandardError { .. }
            | OpKind::Goto { .. }
            | OpKind::Unreachable => smallvec![],
        }
    }

    /// Sources with duplicates removed, preserving first-seen order.
    pub fn unique_sources(&self) -> Sources {
        let mut out = Sources::new();
        for src in self.sources() {
            if !out.contains(&src) {
                out.push(src);
            }
        }
        out
    }

    /// Operands whose reference this op consumes. No decref is needed for
    /// a stolen operand after the op.
    pub fn stolen(&self) -> Sources {
        match &self.kind {
            OpKind::Assign { src, .. }
            | OpKind::SetAttr { src, .. }
            | OpKind::Cast { src }
            | OpKind::Box { src } => smallvec![*src],
            OpKind::Return { value } => smallvec![*value],
            OpKind::Primitive { desc, args } => match &desc.steals {
                Steals::None => smallvec![],
                Steals::All => args.iter().copied().collect(),
                Steals::Pattern(mask) => args
                    .iter()
                    .zip(mask)
                    .filter_map(|(a, steal)| steal.then_some(*a))
                    .collect(),
            },
            _ => smallvec![],
        }
    }

    /// The value this op defines, if any.
    ///
    /// For `Assign` that is the destination register; for other
    /// value-producing ops it is the op's own result; control ops define
    /// nothing.
    pub fn dest(&self) -> Option<ValueId> {
        match &self.kind {
            OpKind::Assign { dest, .. } => Some(*dest),
            OpKind::Goto { .. }
            | OpKind::Branch { .. }
            | OpKind::Return { .. }
            | OpKind::Unreachable
            | OpKind::IncRef { .. }
            | OpKind::DecRef { .. }
            | OpKind::SetAttr { .. }
            | OpKind::InitStatic { .. } => None,
            _ => Some(self.result),
        }
    }

    /// Rewrite a branch/goto target, used by block splitting passes.
    pub fn retarget(&mut self, old: BlockId, new: BlockId) {
        match &mut self.kind {
            OpKind::Goto { target } => {
                if *target == old {
                    *target = new;
                }
            }
            OpKind::Branch {
                true_target,
                false_target,
                ..
            } => {
                if *true_target == old {
                    *true_target = new;
                }
                if *false_target == old {
                    *false_target = new;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::env::ValueId;
    use pretty_assertions::assert_eq;

    fn v(n: u32) -> ValueId {
        ValueId::from_raw(n)
    }

    #[test]
    fn error_kind_matches_op_class() {
        let get = Op::new(v(0), 1, OpKind::GetAttr { obj: v(1), attr: "a".to_owned() });
        assert_eq!(get.error_kind(), ErrorKind::Magic);
        assert!(get.can_raise());

        let set = Op::new(
            v(0),
            1,
            OpKind::SetAttr { obj: v(1), attr: "a".to_owned(), src: v(2) },
        );
        assert_eq!(set.error_kind(), ErrorKind::False);

        let load = Op::new(v(0), 1, OpKind::LoadInt { value: 3 });
        assert_eq!(load.error_kind(), ErrorKind::Never);
        assert!(!load.can_raise());
    }

    #[test]
    fn assign_defines_the_destination_register() {
        let op = Op::new(v(5), 1, OpKind::Assign { dest: v(2), src: v(3) });
        assert_eq!(op.dest(), Some(v(2)));
        assert_eq!(op.sources().as_slice(), &[v(3)]);
        assert_eq!(op.stolen().as_slice(), &[v(3)]);
    }

    #[test]
    fn control_ops_define_nothing() {
        let ret = Op::new(v(0), 1, OpKind::Return { value: v(1) });
        assert_eq!(ret.dest(), None);
        assert_eq!(ret.stolen().as_slice(), &[v(1)]);
        assert!(ret.is_control());

        let goto = Op::new(v(0), 1, OpKind::Goto { target: BlockId::from_raw(2) });
        assert!(goto.is_control());
        assert!(goto.sources().is_empty());
    }

    #[test]
    fn unique_sources_dedups_in_order() {
        let op = Op::new(
            v(9),
            1,
            OpKind::Call { func: "m.f".to_owned(), args: vec![v(1), v(2), v(1)] },
        );
        assert_eq!(op.unique_sources().as_slice(), &[v(1), v(2)]);
    }
}
