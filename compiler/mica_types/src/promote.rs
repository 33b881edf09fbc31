//! Ad-hoc subtype promotions between unrelated types.
//!
//! Some pairs of builtin classes are assignment-compatible without sharing
//! an MRO edge (`int → float`, `bytearray → bytes`). Those edges live in an
//! explicit table that is built once at startup and threaded through
//! construction; passing an empty table disables promotion entirely.

use rustc_hash::FxHashMap;

/// Mapping from a class fullname to the fullname it promotes to.
#[derive(Clone, Debug, Default)]
pub struct PromotionTable {
    edges: FxHashMap<String, String>,
}

impl PromotionTable {
    /// An empty table: no promotions apply.
    pub fn disabled() -> Self {
        PromotionTable::default()
    }

    /// The standard table used by default options.
    pub fn standard() -> Self {
        let mut table = PromotionTable::default();
        table.add("builtins.int", "builtins.float");
        table.add("builtins.bytearray", "builtins.bytes");
        table
    }

    pub fn add(&mut self, from: &str, to: &str) {
        self.edges.insert(from.to_owned(), to.to_owned());
    }

    pub fn promotes_to(&self, from: &str) -> Option<&str> {
        self.edges.get(from).map(String::as_str)
    }

    /// Follow promotion edges from `from`, checking whether `to` is ever
    /// reached. Chains are followed (bounded by table size, so cycles in a
    /// malformed table cannot loop forever).
    pub fn promotes_transitively(&self, from: &str, to: &str) -> bool {
        let mut cur = from;
        for _ in 0..=self.edges.len() {
            match self.promotes_to(cur) {
                Some(next) if next == to => return true,
                Some(next) => cur = next,
                None => return false,
            }
        }
        false
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn standard_promotions() {
        let table = PromotionTable::standard();
        assert!(table.promotes_transitively("builtins.int", "builtins.float"));
        assert!(table.promotes_transitively("builtins.bytearray", "builtins.bytes"));
        assert!(!table.promotes_transitively("builtins.float", "builtins.int"));
    }

    #[test]
    fn disabled_table_has_no_edges() {
        let table = PromotionTable::disabled();
        assert!(!table.promotes_transitively("builtins.int", "builtins.float"));
    }
}
