//! Checker-level type model for the Mica compiler.
//!
//! This crate contains the type representation the checker and the
//! fine-grained incremental engine share:
//!
//! - [`Type`] — the tagged type variant (instances, tuples, unions,
//!   callables, `Any`, `None`, type variables, literals, erased).
//! - [`TypeInfo`] / [`TypeInfoPool`] — class metadata with C3-linearized
//!   MROs, stored in an arena and addressed by [`InfoId`].
//! - [`PromotionTable`] — ad-hoc subtype edges between unrelated types
//!   (`int → float` and friends), threaded explicitly through construction.
//! - [`is_compatible`] — the assignability relation used when checking
//!   calls and assignments.
//! - [`const_fold`] — compile-time folding of constant expressions.
//!
//! # Design Philosophy
//!
//! - **Intern everything**: classes are `InfoId(u32)` handles into a pool;
//!   type equality never chases pointers across modules.
//! - **No language-native inheritance**: `TypeInfo` is a plain record and
//!   the MRO is a list of pool ids, so cyclic class/function references
//!   never create ownership cycles.

mod compat;
mod const_fold;
mod info;
mod messages;
mod promote;
mod span;
mod types;

pub use compat::is_compatible;
pub use const_fold::{
    constant_fold_binary_int_op, constant_fold_binary_str_op, constant_fold_expr,
    constant_fold_unary_int_op, ConstExpr, ConstantValue, FinalScope,
};
pub use info::{InfoId, TypeFlags, TypeInfo, TypeInfoPool};
pub use messages::{
    incompatible_argument, incompatible_return, missing_module_stub, name_not_defined,
};
pub use promote::PromotionTable;
pub use span::Span;
pub use types::{optional_value_type, CallableSig, LiteralValue, Type};
