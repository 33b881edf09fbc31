//! IR transformation passes for the Mica compiler.
//!
//! This crate provides:
//!
//! - **A generic set-based dataflow framework** ([`run_analysis`]) — a
//!   fixed-point worklist over basic blocks, parameterized by direction,
//!   join kind, and per-op gen/kill functions.
//! - **The concrete analyses** ([`analyses`]) — liveness, maybe-defined,
//!   must-defined, undefined, and borrowed arguments.
//! - **Exception splitting** ([`insert_exception_handling`]) — turns the
//!   per-op error kinds into explicit branches to each block's error
//!   handler, restoring the invariant that only the last op of a block
//!   transfers control.
//! - **Reference-count insertion** ([`insert_ref_count_ops`]) — places
//!   `IncRef`/`DecRef` ops so that every execution path maintains sound
//!   reference counts, using the analyses above.
//!
//! Pass order matters: exception splitting runs first (it fixes the CFG
//! shape the analyses assume), then reference-count insertion.

pub mod analyses;
mod dataflow;
mod exceptions;
mod refcount;

pub use dataflow::{get_cfg, run_analysis, AnalysisKind, AnalysisResult, Cfg, Direction};
pub use exceptions::insert_exception_handling;
pub use refcount::insert_ref_count_ops;
