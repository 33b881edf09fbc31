//! Constant folding of expressions.
//!
//! For example, `3 + 5` can be folded into `8`. Folded values of
//! module-level `Final` variables are stored on the variable's symbol so a
//! later reference to the constant can be replaced by the statically
//! computed value.
//!
//! # Scope
//!
//! Simple folding only:
//! - Integer arithmetic and bit operations
//! - String concatenation
//! - Best-effort binding of references to `Final` constants of the
//!   *current* module (references into other modules are never bound;
//!   their values might not match the implementation we link against)
//!
//! A fold that would trap at run time (`// 0`, `% 0`, negative shift,
//! negative exponent) or overflow the 64-bit representation returns `None`,
//! meaning "not folded" — the expression stays as runtime code.

use rustc_hash::FxHashMap;

/// All possible results of constant folding.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    Int(i64),
    Bool(bool),
    Float(f64),
    Str(String),
}

/// Expression shape the folder understands, produced at the semantic
/// analyzer boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstExpr {
    Int(i64),
    Float(f64),
    Str(String),
    /// A resolved name: `True`, `False`, or a reference to a variable
    /// whose fully-qualified name is given.
    Name(String),
    Binary {
        op: String,
        left: Box<ConstExpr>,
        right: Box<ConstExpr>,
    },
    Unary {
        op: String,
        operand: Box<ConstExpr>,
    },
}

/// Final constants already folded in the current program, keyed by the
/// variable's fully-qualified name.
#[derive(Clone, Debug, Default)]
pub struct FinalScope {
    values: FxHashMap<String, ConstantValue>,
}

impl FinalScope {
    pub fn new() -> Self {
        FinalScope::default()
    }

    pub fn insert(&mut self, fullname: &str, value: ConstantValue) {
        self.values.insert(fullname.to_owned(), value);
    }

    pub fn get(&self, fullname: &str) -> Option<&ConstantValue> {
        self.values.get(fullname)
    }
}

/// Return the constant value of an expression for supported operations.
///
/// Name references are bound only when they resolve into `cur_mod_id`;
/// constants from other modules are left unfolded on purpose.
pub fn constant_fold_expr(
    expr: &ConstExpr,
    cur_mod_id: &str,
    finals: &FinalScope,
) -> Option<ConstantValue> {
    match expr {
        ConstExpr::Int(n) => Some(ConstantValue::Int(*n)),
        ConstExpr::Float(x) => Some(ConstantValue::Float(*x)),
        ConstExpr::Str(s) => Some(ConstantValue::Str(s.clone())),
        ConstExpr::Name(name) => {
            if name == "True" {
                return Some(ConstantValue::Bool(true));
            }
            if name == "False" {
                return Some(ConstantValue::Bool(false));
            }
            let (module, _) = name.rsplit_once('.')?;
            if module != cur_mod_id {
                return None;
            }
            finals.get(name).cloned()
        }
        ConstExpr::Binary { op, left, right } => {
            let left = constant_fold_expr(left, cur_mod_id, finals)?;
            let right = constant_fold_expr(right, cur_mod_id, finals)?;
            match (left, right) {
                (ConstantValue::Int(l), ConstantValue::Int(r)) => {
                    constant_fold_binary_int_op(op, l, r).map(ConstantValue::Int)
                }
                (ConstantValue::Str(l), ConstantValue::Str(r)) => {
                    constant_fold_binary_str_op(op, &l, &r).map(ConstantValue::Str)
                }
                _ => None,
            }
        }
        ConstExpr::Unary { op, operand } => {
            match constant_fold_expr(operand, cur_mod_id, finals)? {
                ConstantValue::Int(v) => constant_fold_unary_int_op(op, v).map(ConstantValue::Int),
                _ => None,
            }
        }
    }
}

/// Floor division, rounding toward negative infinity: `-7 // 2 == -4`.
fn floor_div(l: i64, r: i64) -> Option<i64> {
    if r == 0 {
        return None;
    }
    let q = l.checked_div(r)?;
    let rem = l.checked_rem(r)?;
    if rem != 0 && ((rem < 0) != (r < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// Modulo taking the sign of the divisor: `-7 % 2 == 1`.
fn floor_mod(l: i64, r: i64) -> Option<i64> {
    if r == 0 {
        return None;
    }
    let rem = l.checked_rem(r)?;
    if rem != 0 && ((rem < 0) != (r < 0)) {
        rem.checked_add(r)
    } else {
        Some(rem)
    }
}

pub fn constant_fold_binary_int_op(op: &str, left: i64, right: i64) -> Option<i64> {
    match op {
        "+" => left.checked_add(right),
        "-" => left.checked_sub(right),
        "*" => left.checked_mul(right),
        "//" => floor_div(left, right),
        "%" => floor_mod(left, right),
        "&" => Some(left & right),
        "|" => Some(left | right),
        "^" => Some(left ^ right),
        "<<" => {
            let shift = u32::try_from(right).ok()?;
            left.checked_shl(shift)
        }
        ">>" => {
            let shift = u32::try_from(right).ok()?;
            left.checked_shr(shift)
        }
        "**" => {
            let exp = u32::try_from(right).ok()?;
            left.checked_pow(exp)
        }
        _ => None,
    }
}

pub fn constant_fold_unary_int_op(op: &str, value: i64) -> Option<i64> {
    match op {
        "-" => value.checked_neg(),
        "~" => Some(!value),
        "+" => Some(value),
        _ => None,
    }
}

pub fn constant_fold_binary_str_op(op: &str, left: &str, right: &str) -> Option<String> {
    match op {
        "+" => {
            let mut out = String::with_capacity(left.len() + right.len());
            out.push_str(left);
            out.push_str(right);
            Some(out)
        }
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bin(op: &str, l: ConstExpr, r: ConstExpr) -> ConstExpr {
        ConstExpr::Binary {
            op: op.to_owned(),
            left: Box::new(l),
            right: Box::new(r),
        }
    }

    #[test]
    fn folds_arithmetic_with_precedence_prefolded() {
        // 3 + 5 * 2 arrives as (3 + (5 * 2)).
        let expr = bin(
            "+",
            ConstExpr::Int(3),
            bin("*", ConstExpr::Int(5), ConstExpr::Int(2)),
        );
        let folded = constant_fold_expr(&expr, "m", &FinalScope::new());
        assert_eq!(folded, Some(ConstantValue::Int(13)));
    }

    #[test]
    fn division_by_zero_does_not_fold() {
        assert_eq!(constant_fold_binary_int_op("//", 13, 0), None);
        assert_eq!(constant_fold_binary_int_op("%", 13, 0), None);
    }

    #[test]
    fn floor_division_rounds_down() {
        assert_eq!(constant_fold_binary_int_op("//", 7, 2), Some(3));
        assert_eq!(constant_fold_binary_int_op("//", -7, 2), Some(-4));
        assert_eq!(constant_fold_binary_int_op("//", 7, -2), Some(-4));
        assert_eq!(constant_fold_binary_int_op("%", -7, 2), Some(1));
    }

    #[test]
    fn negative_shift_and_exponent_do_not_fold() {
        assert_eq!(constant_fold_binary_int_op("<<", 1, -1), None);
        assert_eq!(constant_fold_binary_int_op(">>", 1, -1), None);
        assert_eq!(constant_fold_binary_int_op("**", 2, -1), None);
        assert_eq!(constant_fold_binary_int_op("**", 2, 10), Some(1024));
    }

    #[test]
    fn overflow_does_not_fold() {
        assert_eq!(constant_fold_binary_int_op("*", i64::MAX, 2), None);
        assert_eq!(constant_fold_unary_int_op("-", i64::MIN), None);
    }

    #[test]
    fn string_concatenation_folds() {
        assert_eq!(
            constant_fold_binary_str_op("+", "ab", "cd"),
            Some("abcd".to_owned())
        );
        assert_eq!(constant_fold_binary_str_op("*", "ab", "cd"), None);
    }

    #[test]
    fn binds_final_refs_in_current_module_only() {
        let mut finals = FinalScope::new();
        finals.insert("m.X", ConstantValue::Int(42));
        finals.insert("other.Y", ConstantValue::Int(7));

        let same = ConstExpr::Name("m.X".to_owned());
        assert_eq!(
            constant_fold_expr(&same, "m", &finals),
            Some(ConstantValue::Int(42))
        );
        let cross = ConstExpr::Name("other.Y".to_owned());
        assert_eq!(constant_fold_expr(&cross, "m", &finals), None);
    }

    #[test]
    fn true_false_names_fold() {
        let finals = FinalScope::new();
        assert_eq!(
            constant_fold_expr(&ConstExpr::Name("True".to_owned()), "m", &finals),
            Some(ConstantValue::Bool(true))
        );
        assert_eq!(
            constant_fold_expr(&ConstExpr::Name("False".to_owned()), "m", &finals),
            Some(ConstantValue::Bool(false))
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Floor division and modulo satisfy `l == q*r + m` with the
            /// remainder taking the divisor's sign.
            #[test]
            fn floor_div_mod_identity(l in -10_000i64..10_000, r in -100i64..100) {
                prop_assume!(r != 0);
                let q = constant_fold_binary_int_op("//", l, r).unwrap();
                let m = constant_fold_binary_int_op("%", l, r).unwrap();
                prop_assert_eq!(q * r + m, l);
                prop_assert!(m == 0 || (m < 0) == (r < 0));
            }

            /// Folding never panics, whatever the operands.
            #[test]
            fn fold_is_total(op_idx in 0usize..11, l in any::<i64>(), r in any::<i64>()) {
                let ops = ["+", "-", "*", "//", "%", "&", "|", "^", "<<", ">>", "**"];
                let _ = constant_fold_binary_int_op(ops[op_idx], l, r);
            }
        }
    }
}
