//! Register IR for the Mica compiler backend.
//!
//! This crate contains the typed, register-based intermediate
//! representation that type-checked modules are lowered into before C
//! emission:
//!
//! - **Value types** ([`RType`], [`RPrimitive`], [`RTuple`], [`RUnion`]) —
//!   the machine-level type system with explicit boxed/unboxed
//!   representations. Primitive types live in a [`TypeRegistry`] built once
//!   at startup and threaded through construction.
//! - **Ops and blocks** ([`Op`], [`OpKind`], [`BasicBlock`]) — a
//!   control-flow graph of basic blocks over three-address ops. Every op
//!   carries an [`ErrorKind`] describing how runtime failure is signalled.
//! - **Functions and classes** ([`FuncIR`], [`ClassIR`], [`IrArena`]) —
//!   functions own their [`Environment`] and blocks; classes are plain
//!   records addressed by [`ClassId`] so the mutually recursive
//!   class/function graph never forms ownership cycles.
//! - **Subtype relation** ([`is_subtype`]) — runtime-representation
//!   subtyping with MRO lookups and primitive promotion.
//! - **Serialization** ([`serialize`]) — the JSON cache format with its
//!   `.class`-discriminated type encoding and three-pass deserialization.

mod block;
mod class_ir;
mod env;
mod func;
mod ops;
pub mod primitives;
mod rtypes;
pub mod serialize;
mod subtype;

pub use block::{BasicBlock, BlockId};
pub use class_ir::{ClassIR, ClassId, FuncId, IrArena};
pub use env::{Environment, ValueData, ValueId};
pub use func::{ArgKind, FuncDecl, FuncIR, FuncKind, FuncSignature, RuntimeArg};
pub use ops::{BranchKind, ErrorKind, Op, OpKind, StaticNamespace};
pub use primitives::{PrimitiveDesc, Steals};
pub use rtypes::{
    is_optional_rtype, optional_rvalue_type, PrimId, RPrimitive, RTuple, RType, RUnion,
    TypeRegistry,
};
pub use subtype::is_subtype;
