//! The module dependency graph.
//!
//! Nodes are modules in an insertion-ordered table; edges are import
//! dependencies kept symmetric in both directions. For every edge
//! `a → b`, `b ∈ a.imports` iff `a ∈ b.importers` — edge operations
//! preserve this pairing, and removing a module detaches all its edges
//! before the node goes away.

use std::path::PathBuf;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use mica_diagnostic::Diagnostic;

use crate::analyzer::SignatureMap;
use crate::cache::CacheMeta;
use crate::triggers::TriggerId;

/// Per-target state retained between passes.
#[derive(Clone, Debug, Default)]
pub struct TargetState {
    /// Triggers this target subscribes to.
    pub deps: FxHashSet<TriggerId>,
    /// Output signatures from the last successful analysis.
    pub outputs: SignatureMap,
    pub diagnostics: Vec<Diagnostic>,
}

/// One module.
#[derive(Clone, Debug, Default)]
pub struct ModuleNode {
    pub id: String,
    /// Absent for built-in or virtual modules.
    pub path: Option<PathBuf>,
    /// Latest source text; targets are re-analyzed against this.
    pub source: String,
    /// Options snapshot taken when the module was loaded; a mismatch
    /// forces a full reload.
    pub options_snapshot: String,
    pub importers: FxHashSet<String>,
    pub imports: FxHashSet<String>,
    /// Target state keyed by fully-qualified target name.
    pub targets: FxHashMap<String, TargetState>,
    /// Triggers fired on behalf of this module in the last pass.
    pub fired_last_pass: FxHashSet<TriggerId>,
    pub meta: Option<CacheMeta>,
    fresh: bool,
}

impl ModuleNode {
    /// Union of all targets' outputs: the module's export surface.
    pub fn exports(&self) -> SignatureMap {
        let mut map = SignatureMap::new();
        for target in self.targets.values() {
            for (name, sig) in &target.outputs {
                map.insert(name.clone(), sig.clone());
            }
        }
        map
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut out: Vec<Diagnostic> = Vec::new();
        let mut fqnames: Vec<&String> = self.targets.keys().collect();
        fqnames.sort();
        for fqname in fqnames {
            out.extend(self.targets[fqname].diagnostics.iter().cloned());
        }
        out
    }
}

/// Insertion-ordered module table with symmetric import edges.
#[derive(Debug, Default)]
pub struct ModuleGraph {
    nodes: IndexMap<String, ModuleNode>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        ModuleGraph::default()
    }

    /// Add (or reset) a module node. Existing edges are detached first so
    /// the symmetry invariant survives re-adds.
    pub fn add_module(&mut self, id: &str, path: Option<PathBuf>, source: &str) -> &mut ModuleNode {
        if self.nodes.contains_key(id) {
            self.set_imports(id, &[]);
        }
        let node = self.nodes.entry(id.to_owned()).or_default();
        node.id = id.to_owned();
        node.path = path;
        node.source = source.to_owned();
        node.fresh = false;
        self.nodes
            .get_mut(id)
            .unwrap_or_else(|| unreachable!("node was just inserted"))
    }

    /// Remove a module, detaching every edge in both directions first.
    pub fn remove_module(&mut self, id: &str) -> Option<ModuleNode> {
        if !self.nodes.contains_key(id) {
            return None;
        }
        self.set_imports(id, &[]);
        let importers: Vec<String> = self
            .nodes
            .get(id)
            .map(|n| n.importers.iter().cloned().collect())
            .unwrap_or_default();
        for importer in importers {
            if let Some(node) = self.nodes.get_mut(&importer) {
                node.imports.remove(id);
            }
            if let Some(node) = self.nodes.get_mut(id) {
                node.importers.remove(&importer);
            }
        }
        self.nodes.shift_remove(id)
    }

    /// Replace a module's import edge set, updating both directions.
    pub fn set_imports(&mut self, id: &str, imports: &[String]) {
        let old: Vec<String> = self
            .nodes
            .get(id)
            .map(|n| n.imports.iter().cloned().collect())
            .unwrap_or_default();
        for dep in old {
            if let Some(node) = self.nodes.get_mut(&dep) {
                node.importers.remove(id);
            }
            if let Some(node) = self.nodes.get_mut(id) {
                node.imports.remove(&dep);
            }
        }
        for dep in imports {
            // Edges only exist between loaded modules; unresolved imports
            // surface as diagnostics, not edges.
            if !self.nodes.contains_key(dep) || dep == id {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(id) {
                node.imports.insert(dep.clone());
            }
            if let Some(node) = self.nodes.get_mut(dep) {
                node.importers.insert(id.to_owned());
            }
        }
    }

    /// Direct importers and imports of a module.
    pub fn neighbors(&self, id: &str) -> (Vec<String>, Vec<String>) {
        match self.nodes.get(id) {
            Some(node) => {
                let mut importers: Vec<String> = node.importers.iter().cloned().collect();
                let mut imports: Vec<String> = node.imports.iter().cloned().collect();
                importers.sort();
                imports.sort();
                (importers, imports)
            }
            None => (Vec::new(), Vec::new()),
        }
    }

    /// Mark a module fresh. Idempotent; only legal when no outstanding
    /// triggers depend on re-analyzing it.
    pub fn mark_fresh(&mut self, id: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            debug_assert!(
                node.fired_last_pass.is_empty(),
                "mark_fresh with outstanding triggers on {id}"
            );
            node.fresh = true;
        }
    }

    pub fn is_fresh(&self, id: &str) -> bool {
        self.nodes.get(id).is_some_and(|n| n.fresh)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ModuleNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ModuleNode> {
        self.nodes.get_mut(id)
    }

    /// Module ids in insertion order.
    pub fn module_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check the edge symmetry invariant; used by tests and debug builds.
    pub fn edges_are_symmetric(&self) -> bool {
        for (id, node) in &self.nodes {
            for dep in &node.imports {
                let ok = self
                    .nodes
                    .get(dep)
                    .is_some_and(|d| d.importers.contains(id));
                if !ok {
                    return false;
                }
            }
            for importer in &node.importers {
                let ok = self
                    .nodes
                    .get(importer)
                    .is_some_and(|i| i.imports.contains(id));
                if !ok {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph_ab() -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        graph.add_module("a", None, "X = 1");
        graph.add_module("b", None, "import a");
        graph.set_imports("b", &["a".to_owned()]);
        graph
    }

    #[test]
    fn edges_are_paired_both_ways() {
        let graph = graph_ab();
        assert!(graph.edges_are_symmetric());
        let (importers, imports) = graph.neighbors("a");
        assert_eq!(importers, vec!["b".to_owned()]);
        assert!(imports.is_empty());
        let (importers, imports) = graph.neighbors("b");
        assert!(importers.is_empty());
        assert_eq!(imports, vec!["a".to_owned()]);
    }

    #[test]
    fn removal_detaches_edges_first() {
        let mut graph = graph_ab();
        graph.remove_module("a");
        assert!(!graph.contains("a"));
        assert!(graph.edges_are_symmetric());
        let (_, imports) = graph.neighbors("b");
        assert!(imports.is_empty());
    }

    #[test]
    fn set_imports_replaces_old_edges() {
        let mut graph = graph_ab();
        graph.add_module("c", None, "");
        graph.set_imports("b", &["c".to_owned()]);
        assert!(graph.edges_are_symmetric());
        let (importers, _) = graph.neighbors("a");
        assert!(importers.is_empty());
        let (importers, _) = graph.neighbors("c");
        assert_eq!(importers, vec!["b".to_owned()]);
    }

    #[test]
    fn unresolved_imports_do_not_create_edges() {
        let mut graph = ModuleGraph::new();
        graph.add_module("b", None, "import ghost");
        graph.set_imports("b", &["ghost".to_owned()]);
        let (_, imports) = graph.neighbors("b");
        assert!(imports.is_empty());
    }

    #[test]
    fn mark_fresh_is_idempotent() {
        let mut graph = graph_ab();
        assert!(!graph.is_fresh("a"));
        graph.mark_fresh("a");
        graph.mark_fresh("a");
        assert!(graph.is_fresh("a"));
        // Re-adding resets freshness.
        graph.add_module("a", None, "X = 2");
        assert!(!graph.is_fresh("a"));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let graph = graph_ab();
        assert_eq!(graph.module_ids(), vec!["a".to_owned(), "b".to_owned()]);
    }
}
