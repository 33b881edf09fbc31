//! Runtime value types.
//!
//! [`RType`] describes the machine-level representation of a value:
//!
//! - **Unboxed** values live in native machine representations — tagged
//!   integers (`CPyTagged`), native booleans (`char`), and fixed-length
//!   tuples laid out as C structs.
//! - **Boxed** values are heap objects in the runtime representation.
//!
//! Primitive types are interned in a [`TypeRegistry`] that is created once
//! during startup, is read-only afterwards, and is passed explicitly to
//! everything that needs it. Equality of [`RType`] is structural; union
//! equality and hashing treat the item list as a frozen set.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHashMap;

use crate::class_ir::{ClassId, IrArena};

/// Handle for an interned [`RPrimitive`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PrimId(u32);

impl PrimId {
    // Pre-interned primitives, in registry seeding order.
    pub const OBJECT: Self = PrimId(0);
    pub const INT: Self = PrimId(1);
    pub const SHORT_INT: Self = PrimId(2);
    pub const FLOAT: Self = PrimId(3);
    pub const BOOL: Self = PrimId(4);
    pub const NONE: Self = PrimId(5);
    pub const LIST: Self = PrimId(6);
    pub const DICT: Self = PrimId(7);
    pub const SET: Self = PrimId(8);
    pub const STR: Self = PrimId(9);
    pub const TUPLE: Self = PrimId(10);
    pub const BYTES: Self = PrimId(11);
    pub const BYTEARRAY: Self = PrimId(12);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        PrimId(raw)
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

impl std::fmt::Debug for PrimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrimId({})", self.0)
    }
}

/// An interned primitive type record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RPrimitive {
    /// Fully-qualified source-level name (`builtins.int`), or a backend
    /// internal name (`short_int`).
    pub name: &'static str,
    pub is_unboxed: bool,
    pub is_refcounted: bool,
    /// The C representation this primitive lowers to.
    pub c_repr: &'static str,
}

impl RPrimitive {
    /// The C expression representing "undefined" for this representation.
    pub fn c_undefined(&self) -> &'static str {
        match self.c_repr {
            "CPyTagged" => "CPY_INT_TAG",
            "char" => "2",
            _ => "NULL",
        }
    }
}

/// Process-wide registry from primitive name to record.
///
/// Built once at startup; thereafter read-only and threaded by reference
/// through construction rather than accessed through a hidden singleton.
#[derive(Clone, Debug)]
pub struct TypeRegistry {
    prims: Vec<RPrimitive>,
    by_name: FxHashMap<&'static str, PrimId>,
}

impl TypeRegistry {
    /// The standard registry. Seeding order matches the `PrimId` constants.
    pub fn standard() -> Self {
        let mut reg = TypeRegistry {
            prims: Vec::with_capacity(13),
            by_name: FxHashMap::default(),
        };
        reg.intern("builtins.object", false, true, "PyObject *");
        reg.intern("builtins.int", true, true, "CPyTagged");
        reg.intern("short_int", true, false, "CPyTagged");
        reg.intern("builtins.float", false, true, "PyObject *");
        reg.intern("builtins.bool", true, false, "char");
        reg.intern("builtins.None", true, false, "char");
        reg.intern("builtins.list", false, true, "PyObject *");
        reg.intern("builtins.dict", false, true, "PyObject *");
        reg.intern("builtins.set", false, true, "PyObject *");
        reg.intern("builtins.str", false, true, "PyObject *");
        reg.intern("builtins.tuple", false, true, "PyObject *");
        reg.intern("builtins.bytes", false, true, "PyObject *");
        reg.intern("builtins.bytearray", false, true, "PyObject *");
        reg
    }

    fn intern(
        &mut self,
        name: &'static str,
        is_unboxed: bool,
        is_refcounted: bool,
        c_repr: &'static str,
    ) -> PrimId {
        let id = PrimId::from_raw(u32::try_from(self.prims.len()).unwrap_or(u32::MAX));
        self.prims.push(RPrimitive {
            name,
            is_unboxed,
            is_refcounted,
            c_repr,
        });
        self.by_name.insert(name, id);
        id
    }

    pub fn get(&self, id: PrimId) -> &RPrimitive {
        &self.prims[id.index()]
    }

    pub fn lookup(&self, name: &str) -> Option<PrimId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: PrimId) -> &'static str {
        self.get(id).name
    }
}

/// Fixed-length unboxed tuple, represented as a C struct.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RTuple {
    pub types: Vec<RType>,
}

impl RTuple {
    pub fn new(types: Vec<RType>) -> Self {
        RTuple { types }
    }

    /// Reference-counted iff any element is.
    pub fn is_refcounted(&self, registry: &TypeRegistry) -> bool {
        self.types.iter().any(|t| t.is_refcounted(registry))
    }

    /// A unique id derived depth-first over component representation tags.
    ///
    /// C has no anonymous structural type equivalence, so every distinct
    /// element shape needs its own named struct; this id makes the name.
    /// Tagged representations contribute `I`, native chars `C`, pointers
    /// `O`, nested tuples recurse as `T{n}...`.
    pub fn unique_id(&self, registry: &TypeRegistry) -> String {
        fn tag(t: &RType, registry: &TypeRegistry, out: &mut String) {
            match t {
                RType::Primitive(p) => {
                    let prim = registry.get(*p);
                    out.push(match prim.c_repr {
                        "CPyTagged" => 'I',
                        "char" => 'C',
                        _ => 'O',
                    });
                }
                RType::Instance(_) | RType::Union(_) => out.push('O'),
                RType::Tuple(inner) => {
                    out.push('T');
                    out.push_str(&inner.types.len().to_string());
                    for elt in &inner.types {
                        tag(elt, registry, out);
                    }
                }
                RType::Void => {}
            }
        }
        let mut out = String::new();
        out.push('T');
        out.push_str(&self.types.len().to_string());
        for elt in &self.types {
            tag(elt, registry, &mut out);
        }
        out
    }

    /// The generated C struct name for this tuple shape.
    pub fn struct_name(&self, registry: &TypeRegistry) -> String {
        format!("tuple_{}", self.unique_id(registry))
    }
}

/// Untagged union of boxed representations.
///
/// Order in a union doesn't matter: equality and hashing use the frozen
/// item set.
#[derive(Clone, Debug)]
pub struct RUnion {
    pub items: Vec<RType>,
}

impl RUnion {
    pub fn new(items: Vec<RType>) -> Self {
        RUnion { items }
    }
}

impl PartialEq for RUnion {
    fn eq(&self, other: &Self) -> bool {
        self.items.len() == other.items.len() && self.items.iter().all(|t| other.items.contains(t))
    }
}

impl Eq for RUnion {}

impl Hash for RUnion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut acc: u64 = 0;
        for item in &self.items {
            let mut h = rustc_hash::FxHasher::default();
            item.hash(&mut h);
            acc ^= h.finish();
        }
        acc.hash(state);
    }
}

/// A runtime value type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RType {
    Primitive(PrimId),
    Tuple(RTuple),
    Instance(ClassId),
    Union(RUnion),
    Void,
}

impl RType {
    pub fn object() -> Self {
        RType::Primitive(PrimId::OBJECT)
    }

    pub fn int() -> Self {
        RType::Primitive(PrimId::INT)
    }

    pub fn short_int() -> Self {
        RType::Primitive(PrimId::SHORT_INT)
    }

    pub fn bool_() -> Self {
        RType::Primitive(PrimId::BOOL)
    }

    pub fn none() -> Self {
        RType::Primitive(PrimId::NONE)
    }

    pub fn list() -> Self {
        RType::Primitive(PrimId::LIST)
    }

    pub fn str_() -> Self {
        RType::Primitive(PrimId::STR)
    }

    pub fn tuple(types: Vec<RType>) -> Self {
        RType::Tuple(RTuple::new(types))
    }

    pub fn union(items: Vec<RType>) -> Self {
        RType::Union(RUnion::new(items))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, RType::Void)
    }

    pub fn is_primitive(&self, id: PrimId) -> bool {
        matches!(self, RType::Primitive(p) if *p == id)
    }

    pub fn is_refcounted(&self, registry: &TypeRegistry) -> bool {
        match self {
            RType::Primitive(p) => registry.get(*p).is_refcounted,
            RType::Tuple(t) => t.is_refcounted(registry),
            RType::Instance(_) | RType::Union(_) => true,
            RType::Void => false,
        }
    }

    pub fn is_unboxed(&self, registry: &TypeRegistry) -> bool {
        match self {
            RType::Primitive(p) => registry.get(*p).is_unboxed,
            RType::Tuple(_) => true,
            RType::Instance(_) | RType::Union(_) => false,
            RType::Void => false,
        }
    }

    /// Human-readable name for logging and IR dumps.
    pub fn display(&self, registry: &TypeRegistry, arena: &IrArena) -> String {
        match self {
            RType::Primitive(p) => registry.name(*p).to_owned(),
            RType::Tuple(t) => {
                let parts: Vec<String> = t
                    .types
                    .iter()
                    .map(|x| x.display(registry, arena))
                    .collect();
                format!("tuple[{}]", parts.join(", "))
            }
            RType::Instance(c) => arena.class(*c).fullname(),
            RType::Union(u) => {
                let parts: Vec<String> = u
                    .items
                    .iter()
                    .map(|x| x.display(registry, arena))
                    .collect();
                format!("union[{}]", parts.join(", "))
            }
            RType::Void => "void".to_owned(),
        }
    }
}

/// If `rtype` is the canonical optional union (two items, one `None`),
/// return the non-`None` item.
pub fn optional_rvalue_type(rtype: &RType) -> Option<&RType> {
    if let RType::Union(u) = rtype {
        if u.items.len() == 2 {
            if u.items[0].is_primitive(PrimId::NONE) {
                return Some(&u.items[1]);
            }
            if u.items[1].is_primitive(PrimId::NONE) {
                return Some(&u.items[0]);
            }
        }
    }
    None
}

pub fn is_optional_rtype(rtype: &RType) -> bool {
    optional_rvalue_type(rtype).is_some()
}
