//! Per-function value environment.
//!
//! The environment owns every value a function mentions — named registers
//! (locals and arguments) and op results alike — in an insertion-ordered
//! table addressed by [`ValueId`]. It also tracks symbol bindings, keeps
//! generated names unique, hands out temporaries, and remembers which
//! registers need an explicit initialization because they may be read
//! before being assigned on some path.
//!
//! An `Environment` is created when a function begins lowering and stays
//! attached to its `FuncIR` for the function's whole life.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::rtypes::{RType, TypeRegistry};

/// Index of a value in its function's [`Environment`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ValueId(u32);

impl ValueId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        ValueId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Storage record for one value.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueData {
    /// Display name. Registers get their source name (made unique);
    /// op results get a fresh `rN` name.
    pub name: String,
    pub rtype: RType,
    /// Is this a named register (as opposed to an op result)?
    pub is_register: bool,
    pub is_arg: bool,
    /// Borrowed values are held without owning a reference.
    pub is_borrowed: bool,
}

/// Ordered table of all values of one function.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    values: Vec<ValueData>,
    /// Source symbol fullname to the register bound to it, in binding order.
    symtable: IndexMap<String, ValueId>,
    /// How many times each base name has been used, for uniquing.
    name_uses: FxHashMap<String, u32>,
    temp_count: u32,
    /// Registers that may be read before assignment on some path and
    /// therefore need an explicit initialization to the error value.
    pub vars_needing_init: FxHashSet<ValueId>,
}

/// Structural equality: two environments are equal when they hold the
/// same values in the same order. Builder bookkeeping (symbol table,
/// name-uniquing counters) is not part of the function's structure and is
/// not reconstructed by deserialization.
impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    /// Append a value record verbatim, bypassing naming and symbol
    /// bookkeeping. Used when deserializing cached IR.
    pub fn restore_value(&mut self, data: ValueData) -> ValueId {
        self.push(data)
    }

    fn push(&mut self, data: ValueData) -> ValueId {
        let id = ValueId::from_raw(u32::try_from(self.values.len()).unwrap_or(u32::MAX));
        self.values.push(data);
        id
    }

    /// Make `name` unique within this environment (`x`, `x2`, `x3`, …).
    fn unique_name(&mut self, name: &str) -> String {
        let uses = self.name_uses.entry(name.to_owned()).or_insert(0);
        *uses += 1;
        if *uses == 1 {
            name.to_owned()
        } else {
            format!("{name}{uses}")
        }
    }

    /// Add a named register for a source symbol.
    pub fn add_local(&mut self, symbol: &str, rtype: RType, is_arg: bool) -> ValueId {
        let name = self.unique_name(symbol);
        let id = self.push(ValueData {
            name,
            rtype,
            is_register: true,
            is_arg,
            // Arguments start out borrowed from the caller.
            is_borrowed: is_arg,
        });
        self.symtable.insert(symbol.to_owned(), id);
        id
    }

    /// Add an anonymous temporary register.
    pub fn add_temp(&mut self, rtype: RType) -> ValueId {
        self.temp_count += 1;
        let name = format!("r{}", self.temp_count - 1);
        self.push(ValueData {
            name,
            rtype,
            is_register: true,
            is_arg: false,
            is_borrowed: false,
        })
    }

    /// Allocate the result value of an op.
    pub fn add_op_result(&mut self, rtype: RType, is_borrowed: bool) -> ValueId {
        self.temp_count += 1;
        let name = format!("r{}", self.temp_count - 1);
        self.push(ValueData {
            name,
            rtype,
            is_register: false,
            is_arg: false,
            is_borrowed,
        })
    }

    pub fn lookup_symbol(&self, symbol: &str) -> Option<ValueId> {
        self.symtable.get(symbol).copied()
    }

    pub fn get(&self, id: ValueId) -> &ValueData {
        &self.values[id.index()]
    }

    pub fn get_mut(&mut self, id: ValueId) -> &mut ValueData {
        &mut self.values[id.index()]
    }

    pub fn rtype(&self, id: ValueId) -> &RType {
        &self.values[id.index()].rtype
    }

    pub fn is_arg(&self, id: ValueId) -> bool {
        self.values[id.index()].is_arg
    }

    pub fn is_borrowed(&self, id: ValueId) -> bool {
        self.values[id.index()].is_borrowed
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> impl Iterator<Item = (ValueId, &ValueData)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (ValueId::from_raw(i as u32), v))
    }

    /// All argument registers, in declaration order.
    pub fn args(&self) -> Vec<ValueId> {
        self.values()
            .filter_map(|(id, v)| v.is_arg.then_some(id))
            .collect()
    }

    /// Render the environment header for IR dumps, e.g.
    /// `x :: builtins.list, r0 :: short_int`.
    pub fn to_lines(&self, registry: &TypeRegistry, arena: &crate::IrArena) -> Vec<String> {
        self.values
            .iter()
            .filter(|v| !v.rtype.is_void())
            .map(|v| format!("{} :: {}", v.name, v.rtype.display(registry, arena)))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn locals_are_uniquely_named() {
        let mut env = Environment::new();
        let a = env.add_local("x", RType::int(), false);
        let b = env.add_local("x", RType::int(), false);
        assert_eq!(env.get(a).name, "x");
        assert_eq!(env.get(b).name, "x2");
        // The symbol table points at the latest binding.
        assert_eq!(env.lookup_symbol("x"), Some(b));
    }

    #[test]
    fn args_are_borrowed_registers() {
        let mut env = Environment::new();
        let arg = env.add_local("x", RType::list(), true);
        assert!(env.is_arg(arg));
        assert!(env.is_borrowed(arg));
        assert_eq!(env.args(), vec![arg]);

        let temp = env.add_temp(RType::int());
        assert!(!env.is_arg(temp));
        assert!(!env.is_borrowed(temp));
    }

    #[test]
    fn op_results_get_sequential_temp_names() {
        let mut env = Environment::new();
        let r0 = env.add_op_result(RType::int(), false);
        let r1 = env.add_op_result(RType::bool_(), false);
        assert_eq!(env.get(r0).name, "r0");
        assert_eq!(env.get(r1).name, "r1");
        assert!(!env.get(r0).is_register);
    }
}
