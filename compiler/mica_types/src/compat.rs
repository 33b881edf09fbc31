//! Assignability between checker-level types.
//!
//! `is_compatible(left, right)` answers "may a value of type `left` flow
//! into a slot of type `right`". This is the gradual-typing relation: `Any`
//! (and erased types) accept and are accepted everywhere, which is what
//! distinguishes it from a strict subtype check.

use crate::info::TypeInfoPool;
use crate::promote::PromotionTable;
use crate::types::{Type, TypeKind};

/// May a value of type `left` be used where `right` is expected?
pub fn is_compatible(
    left: &Type,
    right: &Type,
    pool: &TypeInfoPool,
    promotions: &PromotionTable,
) -> bool {
    // The dynamic type is compatible in both directions.
    if left.is_any() || right.is_any() {
        return true;
    }

    // Unions on the right: every left item (or left itself) must find a
    // right item that accepts it.
    if let TypeKind::Union(right_items) = &right.kind {
        return match &left.kind {
            TypeKind::Union(left_items) => left_items.iter().all(|l| {
                right_items
                    .iter()
                    .any(|r| is_compatible(l, r, pool, promotions))
            }),
            _ => right_items
                .iter()
                .any(|r| is_compatible(left, r, pool, promotions)),
        };
    }

    // Union on the left only: every member must fit.
    if let TypeKind::Union(left_items) = &left.kind {
        return left_items
            .iter()
            .all(|l| is_compatible(l, right, pool, promotions));
    }

    match (&left.kind, &right.kind) {
        (TypeKind::None, TypeKind::None) => true,

        (TypeKind::Literal { base, .. }, _) => is_compatible(base, right, pool, promotions),
        (_, TypeKind::Literal { .. }) => false,

        (TypeKind::Instance(li, _), TypeKind::Instance(ri, _)) => {
            if pool.has_base(*li, *ri) {
                return true;
            }
            if pool.get(*ri).is_protocol() && pool.implements_protocol(*li, *ri) {
                return true;
            }
            // Ad-hoc promotion edges: follow from each class in the MRO.
            let right_name = pool.fullname(*ri);
            pool.get(*li)
                .mro
                .iter()
                .any(|&base| promotions.promotes_transitively(pool.fullname(base), right_name))
        }

        (TypeKind::Tuple(li), TypeKind::Tuple(ri)) => {
            li.len() == ri.len()
                && li
                    .iter()
                    .zip(ri)
                    .all(|(l, r)| is_compatible(l, r, pool, promotions))
        }
        // A tuple is acceptable where the bare tuple class is expected.
        (TypeKind::Tuple(_), TypeKind::Instance(ri, _)) => {
            pool.lookup("builtins.tuple") == Some(*ri)
        }

        (
            TypeKind::Callable { params: lp, ret: lr },
            TypeKind::Callable { params: rp, ret: rr },
        ) => {
            lp.len() == rp.len()
                // Parameters are contravariant, the return type covariant.
                && rp
                    .iter()
                    .zip(lp)
                    .all(|(r, l)| is_compatible(r, l, pool, promotions))
                && is_compatible(lr, rr, pool, promotions)
        }

        (TypeKind::TypeVar { name: ln, .. }, TypeKind::TypeVar { name: rn, .. }) => ln == rn,
        (TypeKind::TypeVar { bound, .. }, _) => bound
            .as_deref()
            .is_some_and(|b| is_compatible(b, right, pool, promotions)),

        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::info::TypeInfoPool;
    use crate::types::LiteralValue;

    fn named(pool: &TypeInfoPool, name: &str) -> Type {
        Type::instance(pool.lookup(name).unwrap())
    }

    #[test]
    fn int_flows_into_float_via_promotion() {
        let pool = TypeInfoPool::with_builtins();
        let promos = PromotionTable::standard();
        let int = named(&pool, "builtins.int");
        let float = named(&pool, "builtins.float");
        assert!(is_compatible(&int, &float, &pool, &promos));
        assert!(!is_compatible(&float, &int, &pool, &promos));
    }

    #[test]
    fn promotion_can_be_disabled() {
        let pool = TypeInfoPool::with_builtins();
        let promos = PromotionTable::disabled();
        let int = named(&pool, "builtins.int");
        let float = named(&pool, "builtins.float");
        assert!(!is_compatible(&int, &float, &pool, &promos));
    }

    #[test]
    fn bool_flows_into_int_via_mro() {
        let pool = TypeInfoPool::with_builtins();
        let promos = PromotionTable::disabled();
        let b = named(&pool, "builtins.bool");
        let int = named(&pool, "builtins.int");
        assert!(is_compatible(&b, &int, &pool, &promos));
        assert!(!is_compatible(&int, &b, &pool, &promos));
    }

    #[test]
    fn optional_accepts_value_and_none() {
        let pool = TypeInfoPool::with_builtins();
        let promos = PromotionTable::standard();
        let int = named(&pool, "builtins.int");
        let opt = Type::make_optional(int.clone());
        assert!(is_compatible(&int, &opt, &pool, &promos));
        assert!(is_compatible(&Type::none(), &opt, &pool, &promos));
        assert!(!is_compatible(&Type::none(), &int, &pool, &promos));
    }

    #[test]
    fn any_is_bidirectionally_compatible() {
        let pool = TypeInfoPool::with_builtins();
        let promos = PromotionTable::standard();
        let int = named(&pool, "builtins.int");
        assert!(is_compatible(&Type::any(), &int, &pool, &promos));
        assert!(is_compatible(&int, &Type::any(), &pool, &promos));
    }

    #[test]
    fn literal_uses_its_base_type() {
        let pool = TypeInfoPool::with_builtins();
        let promos = PromotionTable::standard();
        let int = named(&pool, "builtins.int");
        let lit = Type::new(TypeKind::Literal {
            value: LiteralValue::Int(3),
            base: Box::new(int.clone()),
        });
        assert!(is_compatible(&lit, &int, &pool, &promos));
        assert!(!is_compatible(&int, &lit, &pool, &promos));
    }

    #[test]
    fn tuple_elementwise_with_promotion() {
        let pool = TypeInfoPool::with_builtins();
        let promos = PromotionTable::standard();
        let int = named(&pool, "builtins.int");
        let float = named(&pool, "builtins.float");
        let l = Type::tuple(vec![int.clone(), int.clone()]);
        let r = Type::tuple(vec![float.clone(), int.clone()]);
        assert!(is_compatible(&l, &r, &pool, &promos));
        assert!(!is_compatible(&r, &l, &pool, &promos));
        // Arity mismatch never fits.
        let short = Type::tuple(vec![int]);
        assert!(!is_compatible(&short, &r, &pool, &promos));
    }

    #[test]
    fn callable_variance() {
        let pool = TypeInfoPool::with_builtins();
        let promos = PromotionTable::standard();
        let int = named(&pool, "builtins.int");
        let float = named(&pool, "builtins.float");
        // (float) -> int is usable where (int) -> float is expected.
        let general = Type::new(TypeKind::Callable {
            params: vec![float.clone()],
            ret: Box::new(int.clone()),
        });
        let wanted = Type::new(TypeKind::Callable {
            params: vec![int],
            ret: Box::new(float),
        });
        assert!(is_compatible(&general, &wanted, &pool, &promos));
        assert!(!is_compatible(&wanted, &general, &pool, &promos));
    }
}
