//! Class IR and the arena that owns classes and functions.
//!
//! Classes refer to methods that refer back to classes, so neither side
//! can own the other. Both live in an [`IrArena`] and refer to each other
//! by stable id; cross-module references go through fullnames at the
//! serialization boundary.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::func::FuncIR;
use crate::rtypes::RType;

/// Handle for a [`ClassIR`] in an [`IrArena`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ClassId(u32);

impl ClassId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        ClassId(raw)
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

impl std::fmt::Debug for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

/// Handle for a [`FuncIR`] in an [`IrArena`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FuncId(u32);

impl FuncId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        FuncId(raw)
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

impl std::fmt::Debug for FuncId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FuncId({})", self.0)
    }
}

/// IR of a class, compiled to a C extension class.
///
/// A plain record: bases and the MRO are id lists resolved through the
/// arena, never owned references.
#[derive(Clone, Debug)]
pub struct ClassIR {
    pub name: String,
    pub module_name: String,
    /// Attribute name to runtime type, in declaration order (the order
    /// decides struct layout).
    pub attributes: IndexMap<String, RType>,
    /// Method name to function, in vtable order.
    pub methods: IndexMap<String, FuncId>,
    /// Direct bases.
    pub bases: Vec<ClassId>,
    /// Linearized method resolution order; `mro[0]` is this class.
    pub mro: Vec<ClassId>,
    pub is_trait: bool,
    pub is_abstract: bool,
    /// Whether instances use the native struct layout.
    pub is_ext_class: bool,
}

impl ClassIR {
    pub fn new(name: &str, module_name: &str) -> Self {
        ClassIR {
            name: name.to_owned(),
            module_name: module_name.to_owned(),
            attributes: IndexMap::new(),
            methods: IndexMap::new(),
            bases: Vec::new(),
            mro: Vec::new(),
            is_trait: false,
            is_abstract: false,
            is_ext_class: true,
        }
    }

    pub fn fullname(&self) -> String {
        format!("{}.{}", self.module_name, self.name)
    }

    pub fn attr_type(&self, name: &str) -> Option<&RType> {
        self.attributes.get(name)
    }

    /// Attribute index for C struct member access.
    pub fn attr_index(&self, name: &str) -> Option<usize> {
        self.attributes.get_index_of(name)
    }

    pub fn method(&self, name: &str) -> Option<FuncId> {
        self.methods.get(name).copied()
    }
}

/// Arena owning all [`ClassIR`] and [`FuncIR`] records of a compilation
/// group, addressed by stable ids.
#[derive(Debug, Default)]
pub struct IrArena {
    classes: Vec<ClassIR>,
    functions: Vec<FuncIR>,
    class_by_name: FxHashMap<String, ClassId>,
    func_by_name: FxHashMap<String, FuncId>,
}

impl IrArena {
    pub fn new() -> Self {
        IrArena::default()
    }

    pub fn add_class(&mut self, class: ClassIR) -> ClassId {
        let id = ClassId::from_raw(u32::try_from(self.classes.len()).unwrap_or(u32::MAX));
        self.class_by_name.insert(class.fullname(), id);
        self.classes.push(class);
        id
    }

    pub fn add_func(&mut self, func: FuncIR) -> FuncId {
        let id = FuncId::from_raw(u32::try_from(self.functions.len()).unwrap_or(u32::MAX));
        self.func_by_name.insert(func.decl.fullname(), id);
        self.functions.push(func);
        id
    }

    pub fn class(&self, id: ClassId) -> &ClassIR {
        &self.classes[id.index()]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassIR {
        &mut self.classes[id.index()]
    }

    pub fn func(&self, id: FuncId) -> &FuncIR {
        &self.functions[id.index()]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut FuncIR {
        &mut self.functions[id.index()]
    }

    pub fn class_by_name(&self, fullname: &str) -> Option<ClassId> {
        self.class_by_name.get(fullname).copied()
    }

    pub fn func_by_name(&self, fullname: &str) -> Option<FuncId> {
        self.func_by_name.get(fullname).copied()
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &ClassIR)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, c)| (ClassId::from_raw(i as u32), c))
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &FuncIR)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId::from_raw(i as u32), f))
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fullname_joins_module_and_name() {
        let c = ClassIR::new("C", "pkg.mod");
        assert_eq!(c.fullname(), "pkg.mod.C");
    }

    #[test]
    fn arena_lookup_by_fullname() {
        let mut arena = IrArena::new();
        let id = arena.add_class(ClassIR::new("C", "m"));
        assert_eq!(arena.class_by_name("m.C"), Some(id));
        assert_eq!(arena.class_by_name("m.D"), None);
        assert_eq!(arena.class(id).mro, Vec::new());
    }

    #[test]
    fn attribute_order_is_declaration_order() {
        let mut c = ClassIR::new("C", "m");
        c.attributes.insert("b".to_owned(), RType::int());
        c.attributes.insert("a".to_owned(), RType::bool_());
        assert_eq!(c.attr_index("b"), Some(0));
        assert_eq!(c.attr_index("a"), Some(1));
    }
}
