//! Fine-grained incremental analysis engine.
//!
//! A long-lived [`FineGrainedManager`] holds the module dependency graph
//! in memory. On each request it recomputes diagnostics by re-analyzing
//! only the transitively affected top-level *targets* (functions, class
//! bodies, module top levels) instead of whole programs, and its results
//! are bit-identical to a cold full analysis across arbitrary edit,
//! add, delete, and rename sequences.
//!
//! The moving parts, leaves first:
//!
//! - [`FileSystemWatcher`] — `(mtime, size, content-hash)` snapshots and
//!   change detection.
//! - [`ModuleGraph`] — modules, import edges, per-target state.
//! - [`triggers`] — interned contract names; firing one forces its
//!   subscribers to re-analyze.
//! - [`ModuleAnalyzer`] — the boundary to the semantic analyzer. A
//!   minimal bundled front end ([`BasicAnalyzer`]) implements it for a
//!   small statement subset; a real front end plugs in the same way.
//! - [`FineGrainedManager`] — the update loop tying it all together.
//! - [`cache`] — the persisted `(mtime, size, hash)`-keyed warm-start
//!   data.

pub mod analyzer;
pub mod cache;
mod frontend;
mod fswatcher;
mod graph;
pub mod triggers;
mod update;

pub use analyzer::{
    AnalyzeContext, Exports, ModuleAnalysis, ModuleAnalyzer, SignatureMap, SymbolSig,
    TargetAnalysis,
};
pub use frontend::BasicAnalyzer;
pub use fswatcher::{FileData, FileSystemWatcher};
pub use graph::{ModuleGraph, ModuleNode, TargetState};
pub use update::{BuildSource, FineGrainedManager};
