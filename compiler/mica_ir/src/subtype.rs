//! Subtype check for runtime types.

use mica_types::PromotionTable;

use crate::class_ir::IrArena;
use crate::rtypes::{PrimId, RType, TypeRegistry};

/// Is `left` a subtype of `right` at the runtime representation level?
///
/// A value of a subtype can be used unchanged wherever the supertype is
/// expected. Unions distribute in the usual way; nominal instances check
/// by MRO membership; primitives are identity plus the two built-in
/// promotions (`bool → int`, `short_int → int`) and whatever edges the
/// promotion table adds.
pub fn is_subtype(
    left: &RType,
    right: &RType,
    arena: &IrArena,
    registry: &TypeRegistry,
    promotions: &PromotionTable,
) -> bool {
    if right.is_primitive(PrimId::OBJECT) {
        return true;
    }
    if let RType::Union(right_union) = right {
        return match left {
            RType::Union(left_union) => left_union.items.iter().all(|left_item| {
                right_union
                    .items
                    .iter()
                    .any(|right_item| is_subtype(left_item, right_item, arena, registry, promotions))
            }),
            _ => right_union
                .items
                .iter()
                .any(|item| is_subtype(left, item, arena, registry, promotions)),
        };
    }

    match left {
        RType::Union(left_union) => left_union
            .items
            .iter()
            .all(|item| is_subtype(item, right, arena, registry, promotions)),

        RType::Instance(left_class) => match right {
            RType::Instance(right_class) => arena.class(*left_class).mro.contains(right_class),
            _ => false,
        },

        RType::Primitive(left_prim) => match right {
            RType::Primitive(right_prim) => {
                if left_prim == right_prim {
                    return true;
                }
                if (*left_prim == PrimId::BOOL || *left_prim == PrimId::SHORT_INT)
                    && *right_prim == PrimId::INT
                {
                    return true;
                }
                promotions
                    .promotes_transitively(registry.name(*left_prim), registry.name(*right_prim))
            }
            _ => false,
        },

        RType::Tuple(left_tuple) => match right {
            RType::Primitive(p) if *p == PrimId::TUPLE => true,
            RType::Tuple(right_tuple) => {
                left_tuple.types.len() == right_tuple.types.len()
                    && left_tuple
                        .types
                        .iter()
                        .zip(&right_tuple.types)
                        .all(|(l, r)| is_subtype(l, r, arena, registry, promotions))
            }
            _ => false,
        },

        RType::Void => right.is_void(),
    }
}
