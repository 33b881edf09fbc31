//! Class metadata and the type-info pool.
//!
//! Classes are plain records stored in an arena and addressed by
//! [`InfoId`]; bases and MROs are lists of ids, never owned references.
//! The MRO is a C3 linearization computed at registration time. A class
//! whose bases cannot be linearized is kept in the pool but marked
//! [`TypeFlags::ILL_FORMED`] so later lookups degrade gracefully instead
//! of crashing the analysis.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::types::{CallableSig, Type};

/// A 32-bit handle into the [`TypeInfoPool`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct InfoId(u32);

impl InfoId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        InfoId(raw)
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

impl std::fmt::Debug for InfoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InfoId({})", self.0)
    }
}

bitflags! {
    /// Boolean class properties.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u8 {
        const PROTOCOL = 1 << 0;
        const ABSTRACT = 1 << 1;
        const FINAL = 1 << 2;
        const NEWTYPE = 1 << 3;
        /// C3 linearization failed; MRO is just `[self]`.
        const ILL_FORMED = 1 << 4;
    }
}

/// Class metadata: name, bases, linearized MRO, member tables, flags.
#[derive(Clone, Debug)]
pub struct TypeInfo {
    /// Dotted fully-qualified name, e.g. `builtins.int`.
    pub fullname: String,
    /// Declared bases, in declaration order.
    pub bases: Vec<InfoId>,
    /// C3-linearized method resolution order. `mro[0]` is the class itself.
    pub mro: Vec<InfoId>,
    /// Attribute name to declared type.
    pub attributes: FxHashMap<String, Type>,
    /// Method name to signature.
    pub methods: FxHashMap<String, CallableSig>,
    pub flags: TypeFlags,
    pub declared_metaclass: Option<InfoId>,
    /// For TypedDict classes, the anonymous typed-dict type.
    pub typeddict_type: Option<Type>,
}

impl TypeInfo {
    pub fn short_name(&self) -> &str {
        self.fullname
            .rsplit_once('.')
            .map_or(self.fullname.as_str(), |(_, tail)| tail)
    }

    pub fn is_protocol(&self) -> bool {
        self.flags.contains(TypeFlags::PROTOCOL)
    }
}

/// Arena of [`TypeInfo`] records.
///
/// Ids are dense and never invalidated. The pool is built once per analysis
/// session and passed by reference; it is not a process-wide singleton.
#[derive(Clone, Debug, Default)]
pub struct TypeInfoPool {
    infos: Vec<TypeInfo>,
    by_name: FxHashMap<String, InfoId>,
}

impl TypeInfoPool {
    pub fn new() -> Self {
        TypeInfoPool::default()
    }

    /// A pool pre-seeded with the builtin classes the checker always needs.
    ///
    /// `bool` derives from `int` so that MRO-based subtype checks get the
    /// `bool → int` edge without consulting the promotion table.
    pub fn with_builtins() -> Self {
        let mut pool = TypeInfoPool::new();
        let object = pool.add_class("builtins.object", vec![]);
        let int = pool.add_class("builtins.int", vec![object]);
        pool.add_class("builtins.bool", vec![int]);
        pool.add_class("builtins.float", vec![object]);
        pool.add_class("builtins.str", vec![object]);
        pool.add_class("builtins.bytes", vec![object]);
        pool.add_class("builtins.bytearray", vec![object]);
        pool.add_class("builtins.list", vec![object]);
        pool.add_class("builtins.dict", vec![object]);
        pool.add_class("builtins.set", vec![object]);
        pool.add_class("builtins.tuple", vec![object]);
        pool
    }

    /// Register a class and compute its MRO.
    pub fn add_class(&mut self, fullname: &str, bases: Vec<InfoId>) -> InfoId {
        let id = InfoId::from_raw(u32::try_from(self.infos.len()).unwrap_or(u32::MAX));
        let (mro, flags) = match self.linearize(id, &bases) {
            Some(mro) => (mro, TypeFlags::empty()),
            Option::None => {
                tracing::warn!(class = fullname, "inconsistent class hierarchy");
                (vec![id], TypeFlags::ILL_FORMED)
            }
        };
        self.infos.push(TypeInfo {
            fullname: fullname.to_owned(),
            bases,
            mro,
            attributes: FxHashMap::default(),
            methods: FxHashMap::default(),
            flags,
            declared_metaclass: Option::None,
            typeddict_type: Option::None,
        });
        self.by_name.insert(fullname.to_owned(), id);
        id
    }

    pub fn get(&self, id: InfoId) -> &TypeInfo {
        &self.infos[id.index()]
    }

    pub fn get_mut(&mut self, id: InfoId) -> &mut TypeInfo {
        &mut self.infos[id.index()]
    }

    pub fn lookup(&self, fullname: &str) -> Option<InfoId> {
        self.by_name.get(fullname).copied()
    }

    pub fn fullname(&self, id: InfoId) -> &str {
        &self.get(id).fullname
    }

    pub fn short_name(&self, id: InfoId) -> &str {
        self.get(id).short_name()
    }

    /// Is `sub`'s MRO reachable to `sup`? The nominal subclass check.
    pub fn has_base(&self, sub: InfoId, sup: InfoId) -> bool {
        self.get(sub).mro.contains(&sup)
    }

    /// Structural protocol conformance: every attribute and method the
    /// protocol declares (across its own MRO) must be present somewhere in
    /// the candidate's MRO.
    pub fn implements_protocol(&self, candidate: InfoId, protocol: InfoId) -> bool {
        let proto = self.get(protocol);
        if !proto.is_protocol() {
            return false;
        }
        let member_defined = |name: &str| {
            self.get(candidate).mro.iter().any(|&base| {
                let info = self.get(base);
                info.attributes.contains_key(name) || info.methods.contains_key(name)
            })
        };
        for &proto_base in &proto.mro {
            let info = self.get(proto_base);
            if info.fullname == "builtins.object" {
                continue;
            }
            for name in info.attributes.keys().chain(info.methods.keys()) {
                if !member_defined(name) {
                    return false;
                }
            }
        }
        true
    }

    /// C3 linearization of `cls` over `bases`. Returns `None` when no
    /// consistent linearization exists.
    fn linearize(&self, cls: InfoId, bases: &[InfoId]) -> Option<Vec<InfoId>> {
        let mut sequences: Vec<Vec<InfoId>> = bases
            .iter()
            .map(|&b| self.get(b).mro.clone())
            .collect();
        sequences.push(bases.to_vec());

        let mut result = vec![cls];
        loop {
            sequences.retain(|s| !s.is_empty());
            if sequences.is_empty() {
                return Some(result);
            }
            // Find a head that appears in no other sequence's tail.
            let head = sequences.iter().find_map(|seq| {
                let candidate = seq[0];
                let in_tail = sequences
                    .iter()
                    .any(|other| other.iter().skip(1).any(|&t| t == candidate));
                if in_tail {
                    Option::None
                } else {
                    Some(candidate)
                }
            })?;
            result.push(head);
            for seq in &mut sequences {
                seq.retain(|&t| t != head);
            }
        }
    }
}
