//! Primitive op descriptions.
//!
//! The details of a `Primitive` op are defined by its [`PrimitiveDesc`].
//! The IR builder looks descriptions up by name when lowering calls to
//! builtin operations; the backend uses them to emit C.

use crate::ops::ErrorKind;
use crate::rtypes::RType;

/// Which arguments a primitive steals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Steals {
    None,
    All,
    /// Per-argument mask, parallel to the argument list.
    Pattern(Vec<bool>),
}

/// Description of a primitive operation.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimitiveDesc {
    pub name: &'static str,
    /// Result representation; `Void` for effect-only primitives whose
    /// is-error result is a bool.
    pub result_type: RType,
    pub error_kind: ErrorKind,
    pub steals: Steals,
    /// Whether the result is borrowed from an argument.
    pub is_borrowed: bool,
}

impl PrimitiveDesc {
    const fn new(name: &'static str, result_type: RType, error_kind: ErrorKind) -> Self {
        PrimitiveDesc {
            name,
            result_type,
            error_kind,
            steals: Steals::None,
            is_borrowed: false,
        }
    }
}

/// `len(list)`, producing a short int. Cannot fail on a list.
pub fn list_len() -> PrimitiveDesc {
    PrimitiveDesc::new("list_len", RType::short_int(), ErrorKind::Never)
}

/// `list[index]`, may raise `IndexError`.
pub fn list_get_item() -> PrimitiveDesc {
    PrimitiveDesc::new("list_get_item", RType::object(), ErrorKind::Magic)
}

/// `list.append(x)`; steals nothing, signals failure with false.
pub fn list_append() -> PrimitiveDesc {
    PrimitiveDesc::new("list_append", RType::bool_(), ErrorKind::False)
}

/// Tagged integer addition. Never raises (overflow promotes to big int).
pub fn int_add() -> PrimitiveDesc {
    PrimitiveDesc::new("int_add", RType::int(), ErrorKind::Never)
}

/// Tagged integer comparison.
pub fn int_lt() -> PrimitiveDesc {
    PrimitiveDesc::new("int_lt", RType::bool_(), ErrorKind::Never)
}

/// `dict[key] = value`; steals nothing.
pub fn dict_set_item() -> PrimitiveDesc {
    PrimitiveDesc::new("dict_set_item", RType::bool_(), ErrorKind::False)
}

/// Load the `None` object; borrowed, never fails.
pub fn none_object() -> PrimitiveDesc {
    let mut desc = PrimitiveDesc::new("none_object", RType::object(), ErrorKind::Never);
    desc.is_borrowed = true;
    desc
}

/// `list.pop()`; steals the list reference in the unsafe fast path.
pub fn list_pop_last() -> PrimitiveDesc {
    PrimitiveDesc::new("list_pop_last", RType::object(), ErrorKind::Magic)
}

/// Look a descriptor up by name. Used when deserializing cached IR.
pub fn by_name(name: &str) -> Option<PrimitiveDesc> {
    match name {
        "list_len" => Some(list_len()),
        "list_get_item" => Some(list_get_item()),
        "list_append" => Some(list_append()),
        "int_add" => Some(int_add()),
        "int_lt" => Some(int_lt()),
        "dict_set_item" => Some(dict_set_item()),
        "none_object" => Some(none_object()),
        "list_pop_last" => Some(list_pop_last()),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn descriptors_have_expected_shapes() {
        assert_eq!(list_len().error_kind, ErrorKind::Never);
        assert_eq!(list_len().result_type, RType::short_int());
        assert_eq!(list_get_item().error_kind, ErrorKind::Magic);
        assert_eq!(list_append().error_kind, ErrorKind::False);
        assert!(none_object().is_borrowed);
    }
}
