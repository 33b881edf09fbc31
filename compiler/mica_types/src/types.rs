//! The tagged type variant.
//!
//! [`Type`] is the structural type representation shared by the checker and
//! the fine-grained engine. Equality is structural and ignores source spans;
//! unions are order-insensitive (equality and hashing treat the item list as
//! a frozen set). `Optional[T]` is not a distinct variant: it is the
//! canonical two-item union `{T, None}` and is detected as such by the
//! pretty-printer and the subtype paths.

use std::fmt::Write as _;
use std::hash::{Hash, Hasher};

use crate::info::{InfoId, TypeInfoPool};
use crate::span::Span;

/// A literal constant usable in `Literal[...]` types.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    Int(i64),
    Str(String),
    Bool(bool),
}

/// A function signature as stored in method tables.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallableSig {
    pub arg_names: Vec<String>,
    pub params: Vec<Type>,
    pub ret: Box<Type>,
}

impl CallableSig {
    pub fn new(arg_names: Vec<String>, params: Vec<Type>, ret: Type) -> Self {
        CallableSig {
            arg_names,
            params,
            ret: Box::new(ret),
        }
    }
}

/// The structural kind of a [`Type`].
#[derive(Clone, Debug)]
pub enum TypeKind {
    /// A nominal instance of a class, with type arguments.
    Instance(InfoId, Vec<Type>),
    /// A fixed-length heterogeneous tuple.
    Tuple(Vec<Type>),
    /// An untagged union. Order-insensitive for equality and hashing.
    Union(Vec<Type>),
    /// A callable with positional parameter types and a return type.
    Callable {
        params: Vec<Type>,
        ret: Box<Type>,
    },
    /// The dynamic type: compatible with everything in both directions.
    Any,
    /// The `None` singleton type.
    None,
    /// A type variable, optionally bounded.
    TypeVar {
        name: String,
        bound: Option<Box<Type>>,
    },
    /// A literal type such as `Literal[3]`, with its base type.
    Literal {
        value: LiteralValue,
        base: Box<Type>,
    },
    /// A type erased during inference; treated like `Any` by compatibility.
    Erased,
}

/// A type together with the source position it was written at.
///
/// The span exists for diagnostics only; it is excluded from equality and
/// hashing so that structurally identical types written in different places
/// compare equal.
#[derive(Clone, Debug)]
pub struct Type {
    pub kind: TypeKind,
    pub span: Span,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Type {
            kind,
            span: Span::DUMMY,
        }
    }

    pub fn with_span(kind: TypeKind, span: Span) -> Self {
        Type { kind, span }
    }

    pub fn any() -> Self {
        Type::new(TypeKind::Any)
    }

    pub fn none() -> Self {
        Type::new(TypeKind::None)
    }

    pub fn instance(info: InfoId) -> Self {
        Type::new(TypeKind::Instance(info, Vec::new()))
    }

    pub fn tuple(items: Vec<Type>) -> Self {
        Type::new(TypeKind::Tuple(items))
    }

    /// Build a union, flattening nested unions and dropping duplicates.
    ///
    /// A single surviving item collapses to that item. `make_optional(t)`
    /// is `union(vec![t, None])`.
    pub fn union(items: Vec<Type>) -> Self {
        let mut flat: Vec<Type> = Vec::with_capacity(items.len());
        for item in items {
            match item.kind {
                TypeKind::Union(inner) => {
                    for t in inner {
                        if !flat.contains(&t) {
                            flat.push(t);
                        }
                    }
                }
                _ => {
                    if !flat.contains(&item) {
                        flat.push(item);
                    }
                }
            }
        }
        if flat.len() == 1 {
            return flat.into_iter().next().unwrap_or_else(Type::any);
        }
        Type::new(TypeKind::Union(flat))
    }

    /// The canonical `Optional[t]` union.
    pub fn make_optional(t: Type) -> Self {
        Type::union(vec![t, Type::none()])
    }

    pub fn is_any(&self) -> bool {
        matches!(self.kind, TypeKind::Any | TypeKind::Erased)
    }

    pub fn is_none(&self) -> bool {
        matches!(self.kind, TypeKind::None)
    }

    /// Render the type the way diagnostics quote it: short class names,
    /// `Optional[T]` for the canonical two-item union with `None`.
    pub fn display(&self, pool: &TypeInfoPool) -> String {
        match &self.kind {
            TypeKind::Instance(info, args) => {
                let mut s = pool.short_name(*info).to_owned();
                if !args.is_empty() {
                    s.push('[');
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            s.push_str(", ");
                        }
                        s.push_str(&a.display(pool));
                    }
                    s.push(']');
                }
                s
            }
            TypeKind::Tuple(items) => {
                let mut s = String::from("Tuple[");
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        s.push_str(", ");
                    }
                    s.push_str(&t.display(pool));
                }
                s.push(']');
                s
            }
            TypeKind::Union(items) => {
                if let Some(value) = optional_value_type(self) {
                    return format!("Optional[{}]", value.display(pool));
                }
                let mut s = String::from("Union[");
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        s.push_str(", ");
                    }
                    s.push_str(&t.display(pool));
                }
                s.push(']');
                s
            }
            TypeKind::Callable { params, ret } => {
                let mut s = String::from("Callable[[");
                for (i, t) in params.iter().enumerate() {
                    if i > 0 {
                        s.push_str(", ");
                    }
                    s.push_str(&t.display(pool));
                }
                let _ = write!(s, "], {}]", ret.display(pool));
                s
            }
            TypeKind::Any => "Any".to_owned(),
            TypeKind::None => "None".to_owned(),
            TypeKind::TypeVar { name, .. } => name.clone(),
            TypeKind::Literal { value, .. } => match value {
                LiteralValue::Int(n) => format!("Literal[{n}]"),
                LiteralValue::Str(s) => format!("Literal['{s}']"),
                LiteralValue::Bool(b) => format!("Literal[{}]", if *b { "True" } else { "False" }),
            },
            TypeKind::Erased => "<Erased>".to_owned(),
        }
    }
}

/// If `t` is the canonical optional union (exactly two items, one of them
/// `None`), return the non-`None` item.
pub fn optional_value_type(t: &Type) -> Option<&Type> {
    if let TypeKind::Union(items) = &t.kind {
        if items.len() == 2 {
            if items[0].is_none() {
                return Some(&items[1]);
            }
            if items[1].is_none() {
                return Some(&items[0]);
            }
        }
    }
    None
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (TypeKind::Union(a), TypeKind::Union(b)) => {
                // Frozen-set semantics: same length and every item of one
                // side occurs on the other. Items are deduplicated at
                // construction, so multiset and set compare agree.
                a.len() == b.len() && a.iter().all(|t| b.contains(t))
            }
            (TypeKind::Instance(ia, aa), TypeKind::Instance(ib, ab)) => ia == ib && aa == ab,
            (TypeKind::Tuple(a), TypeKind::Tuple(b)) => a == b,
            (
                TypeKind::Callable { params: pa, ret: ra },
                TypeKind::Callable { params: pb, ret: rb },
            ) => pa == pb && ra == rb,
            (TypeKind::Any, TypeKind::Any)
            | (TypeKind::None, TypeKind::None)
            | (TypeKind::Erased, TypeKind::Erased) => true,
            (
                TypeKind::TypeVar { name: na, bound: ba },
                TypeKind::TypeVar { name: nb, bound: bb },
            ) => na == nb && ba == bb,
            (
                TypeKind::Literal { value: va, base: ba },
                TypeKind::Literal { value: vb, base: bb },
            ) => va == vb && ba == bb,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.kind).hash(state);
        match &self.kind {
            TypeKind::Instance(info, args) => {
                info.hash(state);
                args.hash(state);
            }
            TypeKind::Tuple(items) => items.hash(state),
            TypeKind::Union(items) => {
                // Order-insensitive: combine per-item hashes with XOR so the
                // union hashes like its frozen item set.
                let mut acc: u64 = 0;
                for item in items {
                    let mut h = rustc_hash::FxHasher::default();
                    item.hash(&mut h);
                    acc ^= h.finish();
                }
                acc.hash(state);
            }
            TypeKind::Callable { params, ret } => {
                params.hash(state);
                ret.hash(state);
            }
            TypeKind::Any | TypeKind::None | TypeKind::Erased => {}
            TypeKind::TypeVar { name, bound } => {
                name.hash(state);
                bound.hash(state);
            }
            TypeKind::Literal { value, base } => {
                value.hash(state);
                base.hash(state);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::info::TypeInfoPool;
    use pretty_assertions::assert_eq;
    use rustc_hash::FxHashSet;

    fn int(pool: &TypeInfoPool) -> Type {
        Type::instance(pool.lookup("builtins.int").unwrap())
    }

    fn str_(pool: &TypeInfoPool) -> Type {
        Type::instance(pool.lookup("builtins.str").unwrap())
    }

    #[test]
    fn union_equality_is_order_insensitive() {
        let pool = TypeInfoPool::with_builtins();
        let a = Type::union(vec![int(&pool), str_(&pool)]);
        let b = Type::union(vec![str_(&pool), int(&pool)]);
        assert_eq!(a, b);

        let mut set = FxHashSet::default();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn union_flattens_and_dedups() {
        let pool = TypeInfoPool::with_builtins();
        let inner = Type::union(vec![int(&pool), Type::none()]);
        let outer = Type::union(vec![inner, int(&pool)]);
        match &outer.kind {
            TypeKind::Union(items) => assert_eq!(items.len(), 2),
            other => panic!("expected union, got {other:?}"),
        }
    }

    #[test]
    fn single_item_union_collapses() {
        let pool = TypeInfoPool::with_builtins();
        let t = Type::union(vec![int(&pool), int(&pool)]);
        assert_eq!(t, int(&pool));
    }

    #[test]
    fn optional_is_detected_and_printed() {
        let pool = TypeInfoPool::with_builtins();
        let opt = Type::make_optional(int(&pool));
        assert_eq!(optional_value_type(&opt), Some(&int(&pool)));
        assert_eq!(opt.display(&pool), "Optional[int]");

        let not_opt = Type::union(vec![int(&pool), str_(&pool)]);
        assert_eq!(optional_value_type(&not_opt), None);
    }

    #[test]
    fn spans_do_not_affect_equality() {
        let pool = TypeInfoPool::with_builtins();
        let a = int(&pool);
        let mut b = int(&pool);
        b.span = Span::new(10, 20, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn display_formats() {
        let pool = TypeInfoPool::with_builtins();
        let t = Type::tuple(vec![int(&pool), str_(&pool)]);
        assert_eq!(t.display(&pool), "Tuple[int, str]");
        let c = Type::new(TypeKind::Callable {
            params: vec![int(&pool)],
            ret: Box::new(Type::none()),
        });
        assert_eq!(c.display(&pool), "Callable[[int], None]");
    }
}
