//! The incremental update loop.
//!
//! [`FineGrainedManager`] owns the module graph and the trigger table and
//! drives an analyzer through full initialization and incremental
//! updates. The contract: after any sequence of `update` calls, the
//! accumulated diagnostics equal what a cold [`initialize`] over the same
//! final sources would produce, in the same order.
//!
//! # Update algorithm
//!
//! 1. Removed modules leave the graph; their module trigger and one
//!    trigger per export fire.
//! 2. Changed modules are re-analyzed whole; output signatures are
//!    diffed name by name and differences fire the matching triggers.
//!    Brand-new modules fire their module trigger so dependents stop
//!    reporting them missing.
//! 3. Fired triggers put subscribed targets on the worklist; each is
//!    re-analyzed, its new outputs diffed, and differences fire further
//!    triggers — iterated to a fixpoint. A target that fails to analyze
//!    keeps its previous outputs and fires nothing.
//! 4. Diagnostics are merged and ordered by
//!    [`sort_messages_preserving_file_order`].

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use rustc_hash::FxHashSet;

use mica_diagnostic::{sort_messages_preserving_file_order, Diagnostic};
use mica_types::TypeInfoPool;

use crate::analyzer::{AnalyzeContext, Exports, ModuleAnalyzer, TargetAnalysis};
use crate::graph::{ModuleGraph, TargetState};
use crate::triggers::{make_trigger, TargetKey, TriggerId, TriggerMap};

/// A module to build: id, path, and optionally in-memory text that
/// overrides the file contents.
#[derive(Clone, Debug)]
pub struct BuildSource {
    pub module: String,
    pub path: PathBuf,
    pub text: Option<String>,
}

impl BuildSource {
    pub fn new(module: &str, path: impl Into<PathBuf>) -> Self {
        BuildSource {
            module: module.to_owned(),
            path: path.into(),
            text: None,
        }
    }
}

/// Long-lived incremental analysis state.
pub struct FineGrainedManager<A> {
    pub graph: ModuleGraph,
    triggers: TriggerMap,
    analyzer: A,
    /// File order of the previous pass, for stable diagnostic ordering.
    previous_file_order: Vec<String>,
    initialized: bool,
}

impl<A: ModuleAnalyzer> FineGrainedManager<A> {
    pub fn new(analyzer: A) -> Self {
        FineGrainedManager {
            graph: ModuleGraph::new(),
            triggers: TriggerMap::new(),
            analyzer,
            previous_file_order: Vec::new(),
            initialized: false,
        }
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Full cold build of `sources`.
    pub fn initialize(&mut self, sources: &[BuildSource]) -> Vec<Diagnostic> {
        tracing::info!(modules = sources.len(), "cold build");
        self.graph = ModuleGraph::new();
        self.triggers = TriggerMap::new();
        self.previous_file_order = Vec::new();
        self.initialized = true;

        // Load sources and scan imports so modules can be analyzed in
        // dependency order (imports before importers; the import graph is
        // acyclic at module load time).
        let mut pending: Vec<(String, PathBuf, String, Vec<String>)> = Vec::new();
        for source in sources {
            let text = self.read_source(source);
            let imports = self.analyzer.scan_imports(&text);
            pending.push((source.module.clone(), source.path.clone(), text, imports));
        }
        let order = topo_order(&pending);
        for index in &order {
            let (module, path, text, _) = &pending[*index];
            self.graph.add_module(module, Some(path.clone()), text);
        }
        for index in order {
            let (module, _, _, _) = &pending[index];
            let module = module.clone();
            self.analyze_whole_module(&module);
        }
        self.collect_diagnostics()
    }

    /// Incremental update for explicitly changed and removed modules.
    pub fn update(
        &mut self,
        changed: Vec<(String, PathBuf)>,
        removed: Vec<(String, PathBuf)>,
    ) -> Vec<Diagnostic> {
        tracing::info!(
            changed = changed.len(),
            removed = removed.len(),
            "fine-grained update"
        );
        let mut fired: BTreeSet<TriggerId> = BTreeSet::new();

        for (module, _path) in removed {
            let exports = self
                .graph
                .get(&module)
                .map(|n| n.exports())
                .unwrap_or_default();
            self.triggers.unsubscribe_module(&module);
            self.graph.remove_module(&module);
            fired.insert(self.triggers.intern(&make_trigger(&module)));
            for name in exports.keys() {
                let trigger = make_trigger(&format!("{module}.{name}"));
                fired.insert(self.triggers.intern(&trigger));
            }
        }

        for (module, path) in changed {
            let is_new = !self.graph.contains(&module);
            let old_exports = self
                .graph
                .get(&module)
                .map(|n| n.exports())
                .unwrap_or_default();
            let text = fs::read_to_string(&path).unwrap_or_default();
            self.graph.add_module(&module, Some(path), &text);
            self.analyze_whole_module(&module);
            let new_exports = self
                .graph
                .get(&module)
                .map(|n| n.exports())
                .unwrap_or_default();

            if is_new {
                fired.insert(self.triggers.intern(&make_trigger(&module)));
            }
            let pool = self.pool();
            let mut names: BTreeSet<&String> =
                old_exports.keys().chain(new_exports.keys()).collect();
            // Names whose signature changed (or appeared/disappeared)
            // fire their triggers.
            names.retain(|name| {
                let old = old_exports.get(*name).map(|s| s.fingerprint(&pool));
                let new = new_exports.get(*name).map(|s| s.fingerprint(&pool));
                old != new
            });
            let qualified: Vec<String> = names
                .into_iter()
                .map(|name| make_trigger(&format!("{module}.{name}")))
                .collect();
            for trigger in qualified {
                fired.insert(self.triggers.intern(&trigger));
            }
        }

        self.propagate(fired);
        self.collect_diagnostics()
    }

    /// Fire triggers to a fixpoint.
    fn propagate(&mut self, mut pending: BTreeSet<TriggerId>) {
        let mut fired_total: FxHashSet<TriggerId> = FxHashSet::default();
        let mut processed: FxHashSet<(TargetKey, TriggerId)> = FxHashSet::default();

        while let Some(&trigger) = pending.iter().next() {
            pending.remove(&trigger);
            fired_total.insert(trigger);
            tracing::debug!(trigger = self.triggers.name(trigger), "firing");

            for target in self.triggers.fire(trigger) {
                if !processed.insert((target.clone(), trigger)) {
                    continue;
                }
                let (module, fqname) = &target;
                if !self.graph.contains(module) {
                    continue;
                }
                for next in self.reanalyze_target(module, fqname) {
                    let id = self.triggers.intern(&next);
                    if !fired_total.contains(&id) {
                        pending.insert(id);
                    }
                }
            }
        }
    }

    /// Re-analyze one target; returns the triggers its output changes
    /// imply.
    fn reanalyze_target(&mut self, module: &str, fqname: &str) -> Vec<String> {
        let Some(node) = self.graph.get(module) else {
            return Vec::new();
        };
        let source = node.source.clone();
        let path = node.path.clone();
        let old_state = node.targets.get(fqname).cloned().unwrap_or_default();

        let exports = self.exports_snapshot();
        let ctx = AnalyzeContext {
            module_id: module,
            path: path.as_deref(),
            source: &source,
            exports: &exports,
        };
        let analysis = self.analyzer.analyze_target(&ctx, fqname);
        self.apply_target(module, fqname, analysis, &old_state)
    }

    /// Install a target analysis result; returns triggers to fire.
    fn apply_target(
        &mut self,
        module: &str,
        fqname: &str,
        analysis: TargetAnalysis,
        old_state: &TargetState,
    ) -> Vec<String> {
        let key: TargetKey = (module.to_owned(), fqname.to_owned());
        self.triggers.unsubscribe_target(&key);
        let mut dep_ids = FxHashSet::default();
        for dep in &analysis.deps {
            let id = self.triggers.intern(dep);
            self.triggers.subscribe(id, key.clone());
            dep_ids.insert(id);
        }

        let pool = self.pool();
        let mut to_fire = Vec::new();
        let outputs = if analysis.failed {
            // A failed target reports diagnostics but keeps its previous
            // outputs so dependents are not churned by transient damage.
            old_state.outputs.clone()
        } else {
            let mut names: BTreeSet<&String> = old_state
                .outputs
                .keys()
                .chain(analysis.outputs.keys())
                .collect();
            names.retain(|name| {
                let old = old_state.outputs.get(*name).map(|s| s.fingerprint(&pool));
                let new = analysis.outputs.get(*name).map(|s| s.fingerprint(&pool));
                old != new
            });
            for name in names {
                to_fire.push(make_trigger(&format!("{module}.{name}")));
            }
            analysis.outputs
        };

        if let Some(node) = self.graph.get_mut(module) {
            node.targets.insert(
                fqname.to_owned(),
                TargetState {
                    deps: dep_ids,
                    outputs,
                    diagnostics: analysis.diagnostics,
                },
            );
        }
        to_fire
    }

    /// Analyze every target of a module from scratch.
    fn analyze_whole_module(&mut self, module: &str) {
        let Some(node) = self.graph.get(module) else {
            return;
        };
        let source = node.source.clone();
        let path = node.path.clone();
        let old_targets: Vec<String> = node.targets.keys().cloned().collect();

        let exports = self.exports_snapshot();
        let ctx = AnalyzeContext {
            module_id: module,
            path: path.as_deref(),
            source: &source,
            exports: &exports,
        };
        let analysis = self.analyzer.analyze_module(&ctx);

        // Retract targets that no longer exist.
        let new_names: FxHashSet<&str> =
            analysis.targets.iter().map(|t| t.fqname.as_str()).collect();
        for stale in old_targets {
            if !new_names.contains(stale.as_str()) {
                let key: TargetKey = (module.to_owned(), stale.clone());
                self.triggers.unsubscribe_target(&key);
                if let Some(node) = self.graph.get_mut(module) {
                    node.targets.remove(&stale);
                }
            }
        }

        self.graph.set_imports(module, &analysis.imports);
        for target in analysis.targets {
            let fqname = target.fqname.clone();
            let old_state = self
                .graph
                .get(module)
                .and_then(|n| n.targets.get(&fqname).cloned())
                .unwrap_or_default();
            self.apply_target(module, &fqname, target, &old_state);
        }
    }

    /// Snapshot every module's exports for the analyzer.
    fn exports_snapshot(&self) -> Exports {
        let mut exports = Exports::new();
        for id in self.graph.module_ids() {
            if let Some(node) = self.graph.get(&id) {
                exports.insert_module(&id, node.exports());
            }
        }
        exports
    }

    fn collect_diagnostics(&mut self) -> Vec<Diagnostic> {
        let mut all = Vec::new();
        for id in self.graph.module_ids() {
            if let Some(node) = self.graph.get(&id) {
                all.extend(node.diagnostics());
            }
        }
        let sorted = sort_messages_preserving_file_order(all, &self.previous_file_order);
        // Remember the file order this pass established.
        let mut order: Vec<String> = self.previous_file_order.clone();
        for diagnostic in &sorted {
            if let Some(path) = &diagnostic.path {
                if !order.contains(path) {
                    order.push(path.clone());
                }
            }
        }
        self.previous_file_order = order;
        sorted
    }

    fn read_source(&self, source: &BuildSource) -> String {
        match &source.text {
            Some(text) => text.clone(),
            None => fs::read_to_string(&source.path).unwrap_or_default(),
        }
    }

    fn pool(&self) -> TypeInfoPool {
        // Fingerprints only need builtin names; analyzer-specific pools
        // render user classes through their own display paths.
        TypeInfoPool::with_builtins()
    }
}

/// Order modules so imports come before importers; cycles and unknown
/// imports keep input order.
fn topo_order(pending: &[(String, PathBuf, String, Vec<String>)]) -> Vec<usize> {
    let mut order = Vec::with_capacity(pending.len());
    let mut placed: FxHashSet<&str> = FxHashSet::default();
    let mut remaining: Vec<usize> = (0..pending.len()).collect();
    while !remaining.is_empty() {
        let mut progressed = false;
        let mut next_round = Vec::new();
        for &index in &remaining {
            let (module, _, _, imports) = &pending[index];
            let ready = imports.iter().all(|import| {
                placed.contains(import.as_str())
                    || !pending.iter().any(|(m, _, _, _)| m == import)
            });
            if ready {
                placed.insert(module);
                order.push(index);
                progressed = true;
            } else {
                next_round.push(index);
            }
        }
        if !progressed {
            // Import cycle: fall back to input order for the rest.
            order.extend(next_round);
            break;
        }
        remaining = next_round;
    }
    order
}
