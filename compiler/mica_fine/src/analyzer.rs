//! The boundary to the semantic analyzer.
//!
//! The incremental engine does not parse or type-check anything itself;
//! it drives an implementation of [`ModuleAnalyzer`] and reacts to what
//! comes back: per-target trigger dependencies, output signatures, and
//! diagnostics. The bundled [`BasicAnalyzer`](crate::BasicAnalyzer)
//! implements this trait for a small statement subset; a full front end
//! plugs in through the same three methods.

use std::collections::BTreeMap;
use std::path::Path;

use rustc_hash::FxHashMap;

use mica_diagnostic::Diagnostic;
use mica_types::{CallableSig, ConstantValue, Type, TypeInfoPool};

/// A symbol's externally visible signature.
#[derive(Clone, Debug, PartialEq)]
pub enum SymbolSig {
    /// A module-level variable.
    Var(Type),
    /// A module-level `Final` constant, with its folded value when the
    /// folder succeeded.
    Final {
        ty: Type,
        value: Option<ConstantValue>,
    },
    /// A function.
    Func(CallableSig),
}

impl SymbolSig {
    /// A stable text form used for output diffing and the on-disk cache.
    /// Two signatures with equal fingerprints are interchangeable for
    /// downstream targets.
    pub fn fingerprint(&self, pool: &TypeInfoPool) -> String {
        match self {
            SymbolSig::Var(t) => format!("var:{}", t.display(pool)),
            SymbolSig::Final { ty, value } => {
                format!("final:{}={value:?}", ty.display(pool))
            }
            SymbolSig::Func(sig) => {
                let params: Vec<String> = sig.params.iter().map(|t| t.display(pool)).collect();
                format!("def:({}) -> {}", params.join(", "), sig.ret.display(pool))
            }
        }
    }
}

/// Name-to-signature map of one target's outputs, ordered for stable
/// fingerprints.
pub type SignatureMap = BTreeMap<String, SymbolSig>;

/// Snapshot of every module's exports, handed to the analyzer so it can
/// resolve cross-module references without touching the live graph.
#[derive(Clone, Debug, Default)]
pub struct Exports {
    modules: FxHashMap<String, SignatureMap>,
}

impl Exports {
    pub fn new() -> Self {
        Exports::default()
    }

    pub fn insert_module(&mut self, id: &str, exports: SignatureMap) {
        self.modules.insert(id.to_owned(), exports);
    }

    pub fn has_module(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    pub fn lookup(&self, module: &str, name: &str) -> Option<&SymbolSig> {
        self.modules.get(module)?.get(name)
    }
}

/// What analyzing one target produced.
#[derive(Clone, Debug, Default)]
pub struct TargetAnalysis {
    /// Fully-qualified target name (`m.f`, or the module id itself for
    /// the module's top level).
    pub fqname: String,
    /// Trigger names this target subscribes to (`<a.X>`, `<a>`).
    pub deps: Vec<String>,
    /// Names this target defines, with signatures.
    pub outputs: SignatureMap,
    pub diagnostics: Vec<Diagnostic>,
    /// The target could not be analyzed at all. Its diagnostics stand,
    /// but prior output signatures survive and nothing fires downstream.
    pub failed: bool,
}

/// What analyzing one module produced.
#[derive(Clone, Debug, Default)]
pub struct ModuleAnalysis {
    /// Direct imports, resolved or not.
    pub imports: Vec<String>,
    pub targets: Vec<TargetAnalysis>,
}

/// Everything an analyzer call may look at.
pub struct AnalyzeContext<'a> {
    pub module_id: &'a str,
    pub path: Option<&'a Path>,
    pub source: &'a str,
    pub exports: &'a Exports,
}

/// The semantic analyzer, as the incremental engine sees it.
pub trait ModuleAnalyzer {
    /// Cheap import scan used to order the initial build.
    fn scan_imports(&mut self, source: &str) -> Vec<String>;

    /// Analyze a whole module into its targets.
    fn analyze_module(&mut self, ctx: &AnalyzeContext<'_>) -> ModuleAnalysis;

    /// Re-analyze a single target of a module.
    fn analyze_target(&mut self, ctx: &AnalyzeContext<'_>, fqname: &str) -> TargetAnalysis;
}
