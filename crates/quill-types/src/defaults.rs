//! The standard type aliases, operators and casts.
//!
//! Operator and cast entries for concrete types are declared and
//! specialized together. Entries involving literal kinds are declared only:
//! literals are relabelled to a concrete type before code generation, so no
//! instruction is ever emitted for them.

use std::cmp::Ordering;

use inkwell::builder::{Builder, BuilderError};
use inkwell::context::Context;
use inkwell::values::BasicValueEnum;
use inkwell::{FloatPredicate, IntPredicate};

use crate::id::TypeId;
use crate::registry::{primitive_name, TypeRegistry};
use crate::special::{
    binary_emitter, cast_emitter, unary_emitter, BinaryEmitter, CastEmitter, SpecialFunctions,
};

pub const ASSIGN: &str = "=";
pub const ARITHMETIC_OPERATORS: [&str; 5] = ["+", "-", "*", "/", "%"];
pub const COMPARISON_OPERATORS: [&str; 6] = ["==", "!=", "<", "<=", ">", ">="];
pub const NEGATE: &str = "-";
pub const NOT: &str = "!";

const ASSIGN_PRECEDENCE: u32 = 1;
const COMPARISON_PRECEDENCE: u32 = 2;
const ADDITIVE_PRECEDENCE: u32 = 3;
const MULTIPLICATIVE_PRECEDENCE: u32 = 4;

/// A registry lowering into `context` and a table with every default
/// installed.
pub fn standard(context: &Context) -> (TypeRegistry<'_>, SpecialFunctions) {
    let mut types = TypeRegistry::in_context(context);
    let mut special = SpecialFunctions::new();
    install(&mut types, &mut special);
    (types, special)
}

/// The defaults over a registry without lowering, for analysis alone.
pub fn for_analysis() -> (TypeRegistry<'static>, SpecialFunctions) {
    let mut types = TypeRegistry::new();
    let mut special = SpecialFunctions::new();
    install(&mut types, &mut special);
    (types, special)
}

pub fn install(types: &mut TypeRegistry<'_>, special: &mut SpecialFunctions) {
    install_aliases(types);
    install_precedence(special);
    install_arithmetic(special);
    install_comparisons(special);
    install_unary(special);
    install_literal_folding(special);
    install_casts(special);
    special.set_literal_default(TypeId::U_LITERAL, TypeId::U32);
    special.set_literal_default(TypeId::I_LITERAL, TypeId::I32);
    special.set_literal_default(TypeId::FP_LITERAL, TypeId::F64);
}

fn install_aliases(types: &mut TypeRegistry<'_>) {
    let primitives = [TypeId::VOID, TypeId::BOOL, TypeId::CHAR]
        .into_iter()
        .chain(TypeId::numerics());
    for id in primitives {
        if let Some(name) = primitive_name(id) {
            types.alias(name, id);
        }
    }
    // A function without a declared return type returns nothing.
    types.alias("", TypeId::VOID);
}

fn install_precedence(special: &mut SpecialFunctions) {
    special.register_binary_operator(ASSIGN, ASSIGN_PRECEDENCE);
    for symbol in COMPARISON_OPERATORS {
        special.register_binary_operator(symbol, COMPARISON_PRECEDENCE);
    }
    for symbol in ["+", "-"] {
        special.register_binary_operator(symbol, ADDITIVE_PRECEDENCE);
    }
    for symbol in ["*", "/", "%"] {
        special.register_binary_operator(symbol, MULTIPLICATIVE_PRECEDENCE);
    }
}

/// An arithmetic instruction, chosen per operand type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

impl ArithOp {
    fn emit<'ctx>(
        self,
        b: &Builder<'ctx>,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>, BuilderError> {
        use ArithOp::*;
        if matches!(self, FAdd | FSub | FMul | FDiv | FRem) {
            let (l, r) = (lhs.into_float_value(), rhs.into_float_value());
            let value = match self {
                FAdd => b.build_float_add(l, r, "fadd")?,
                FSub => b.build_float_sub(l, r, "fsub")?,
                FMul => b.build_float_mul(l, r, "fmul")?,
                FDiv => b.build_float_div(l, r, "fdiv")?,
                _ => b.build_float_rem(l, r, "frem")?,
            };
            return Ok(value.into());
        }
        let (l, r) = (lhs.into_int_value(), rhs.into_int_value());
        let value = match self {
            Add => b.build_int_add(l, r, "add")?,
            Sub => b.build_int_sub(l, r, "sub")?,
            Mul => b.build_int_mul(l, r, "mul")?,
            SDiv => b.build_int_signed_div(l, r, "sdiv")?,
            UDiv => b.build_int_unsigned_div(l, r, "udiv")?,
            SRem => b.build_int_signed_rem(l, r, "srem")?,
            _ => b.build_int_unsigned_rem(l, r, "urem")?,
        };
        Ok(value.into())
    }
}

fn arithmetic_op(symbol: &str, ty: TypeId) -> Option<ArithOp> {
    let signed = ty.is_signed_int();
    let op = if ty.is_float() {
        match symbol {
            "+" => ArithOp::FAdd,
            "-" => ArithOp::FSub,
            "*" => ArithOp::FMul,
            "/" => ArithOp::FDiv,
            "%" => ArithOp::FRem,
            _ => return None,
        }
    } else {
        match symbol {
            "+" => ArithOp::Add,
            "-" => ArithOp::Sub,
            "*" => ArithOp::Mul,
            "/" if signed => ArithOp::SDiv,
            "/" => ArithOp::UDiv,
            "%" if signed => ArithOp::SRem,
            "%" => ArithOp::URem,
            _ => return None,
        }
    };
    Some(op)
}

fn install_arithmetic(special: &mut SpecialFunctions) {
    for symbol in ARITHMETIC_OPERATORS {
        for ty in TypeId::numerics() {
            let Some(op) = arithmetic_op(symbol, ty) else {
                continue;
            };
            let table = special.binary_mut(symbol);
            table.declare((ty, ty), ty);
            table.specialize((ty, ty), binary_emitter(move |b, lhs, rhs| op.emit(b, lhs, rhs)));
        }
    }
}

fn int_predicate(symbol: &str, signed: bool) -> Option<IntPredicate> {
    Some(match (symbol, signed) {
        ("==", _) => IntPredicate::EQ,
        ("!=", _) => IntPredicate::NE,
        ("<", false) => IntPredicate::ULT,
        ("<=", false) => IntPredicate::ULE,
        (">", false) => IntPredicate::UGT,
        (">=", false) => IntPredicate::UGE,
        ("<", true) => IntPredicate::SLT,
        ("<=", true) => IntPredicate::SLE,
        (">", true) => IntPredicate::SGT,
        (">=", true) => IntPredicate::SGE,
        _ => return None,
    })
}

fn float_predicate(symbol: &str) -> Option<FloatPredicate> {
    Some(match symbol {
        "==" => FloatPredicate::OEQ,
        "!=" => FloatPredicate::ONE,
        "<" => FloatPredicate::OLT,
        "<=" => FloatPredicate::OLE,
        ">" => FloatPredicate::OGT,
        ">=" => FloatPredicate::OGE,
        _ => return None,
    })
}

fn install_comparisons(special: &mut SpecialFunctions) {
    let operands = TypeId::numerics().chain([TypeId::BOOL, TypeId::CHAR]);
    for ty in operands {
        for symbol in COMPARISON_OPERATORS {
            let emitter: BinaryEmitter = if ty.is_float() {
                let Some(pred) = float_predicate(symbol) else {
                    continue;
                };
                binary_emitter(move |b, lhs, rhs| {
                    b.build_float_compare(pred, lhs.into_float_value(), rhs.into_float_value(), "cmp")
                        .map(Into::into)
                })
            } else {
                let Some(pred) = int_predicate(symbol, ty.is_signed_int()) else {
                    continue;
                };
                binary_emitter(move |b, lhs, rhs| {
                    b.build_int_compare(pred, lhs.into_int_value(), rhs.into_int_value(), "cmp")
                        .map(Into::into)
                })
            };
            let table = special.binary_mut(symbol);
            table.declare((ty, ty), TypeId::BOOL);
            table.specialize((ty, ty), emitter);
        }
    }
}

fn install_unary(special: &mut SpecialFunctions) {
    let int_neg = unary_emitter(|b, v| b.build_int_neg(v.into_int_value(), "neg").map(Into::into));
    for ty in TypeId::SIGNED_INTS {
        let table = special.unary_mut(NEGATE);
        table.declare(ty, ty);
        table.specialize(ty, int_neg.clone());
    }
    let float_neg =
        unary_emitter(|b, v| b.build_float_neg(v.into_float_value(), "fneg").map(Into::into));
    for ty in TypeId::FLOATS {
        let table = special.unary_mut(NEGATE);
        table.declare(ty, ty);
        table.specialize(ty, float_neg.clone());
    }
    let not = unary_emitter(|b, v| b.build_not(v.into_int_value(), "not").map(Into::into));
    let table = special.unary_mut(NOT);
    table.declare(TypeId::BOOL, TypeId::BOOL);
    table.specialize(TypeId::BOOL, not);
}

/// Expressions over literals alone stay literal-kinded until context
/// decides their type.
fn install_literal_folding(special: &mut SpecialFunctions) {
    use TypeId as T;
    let folds = [
        (T::U_LITERAL, T::U_LITERAL, T::U_LITERAL),
        (T::U_LITERAL, T::I_LITERAL, T::I_LITERAL),
        (T::I_LITERAL, T::U_LITERAL, T::I_LITERAL),
        (T::I_LITERAL, T::I_LITERAL, T::I_LITERAL),
        (T::FP_LITERAL, T::FP_LITERAL, T::FP_LITERAL),
        (T::FP_LITERAL, T::U_LITERAL, T::FP_LITERAL),
        (T::FP_LITERAL, T::I_LITERAL, T::FP_LITERAL),
        (T::U_LITERAL, T::FP_LITERAL, T::FP_LITERAL),
        (T::I_LITERAL, T::FP_LITERAL, T::FP_LITERAL),
    ];
    for symbol in ARITHMETIC_OPERATORS {
        for (left, right, ret) in folds {
            special.binary_mut(symbol).declare((left, right), ret);
        }
    }
    let neg = special.unary_mut(NEGATE);
    neg.declare(T::U_LITERAL, T::I_LITERAL);
    neg.declare(T::I_LITERAL, T::I_LITERAL);
    neg.declare(T::FP_LITERAL, T::FP_LITERAL);
}

fn width(id: TypeId) -> u32 {
    id.int_bits().unwrap_or(0)
}

/// Integer resize: extend (sign- or zero-) when widening, truncate when
/// narrowing, nothing at equal width.
fn int_conversion(from_bits: u32, to_bits: u32, signed: bool) -> CastEmitter {
    cast_emitter(move |b, v, to| {
        let (v, to) = (v.into_int_value(), to.into_int_type());
        let converted = match from_bits.cmp(&to_bits) {
            Ordering::Equal => v,
            Ordering::Less if signed => b.build_int_s_extend(v, to, "conv")?,
            Ordering::Less => b.build_int_z_extend(v, to, "conv")?,
            Ordering::Greater => b.build_int_truncate(v, to, "conv")?,
        };
        Ok(converted.into())
    })
}

fn int_to_float(signed: bool) -> CastEmitter {
    cast_emitter(move |b, v, to| {
        let (v, to) = (v.into_int_value(), to.into_float_type());
        let converted = if signed {
            b.build_signed_int_to_float(v, to, "conv")?
        } else {
            b.build_unsigned_int_to_float(v, to, "conv")?
        };
        Ok(converted.into())
    })
}

fn install_casts(special: &mut SpecialFunctions) {
    let casts = special.casts_mut();

    for to in TypeId::numerics() {
        casts.declare(TypeId::U_LITERAL, to);
    }
    for to in TypeId::SIGNED_INTS.into_iter().chain(TypeId::FLOATS) {
        casts.declare(TypeId::I_LITERAL, to);
    }
    for to in TypeId::FLOATS {
        casts.declare(TypeId::FP_LITERAL, to);
    }

    for int in TypeId::ints() {
        casts.specialize(TypeId::BOOL, int, int_conversion(1, width(int), false));
        casts.specialize(TypeId::CHAR, int, int_conversion(32, width(int), false));
        casts.specialize(
            int,
            TypeId::CHAR,
            int_conversion(width(int), 32, int.is_signed_int()),
        );
    }

    for from in TypeId::UNSIGNED_INTS {
        for to in TypeId::ints().filter(|to| width(*to) > width(from)) {
            casts.specialize(from, to, int_conversion(width(from), width(to), false));
        }
    }
    for from in TypeId::SIGNED_INTS {
        for to in TypeId::SIGNED_INTS.into_iter().filter(|to| width(*to) > width(from)) {
            casts.specialize(from, to, int_conversion(width(from), width(to), true));
        }
    }
    casts.specialize(
        TypeId::F32,
        TypeId::F64,
        cast_emitter(|b, v, to| {
            b.build_float_ext(v.into_float_value(), to.into_float_type(), "conv")
                .map(Into::into)
        }),
    );

    let int_to_bool = cast_emitter(|b, v, _| {
        let v = v.into_int_value();
        b.build_int_compare(IntPredicate::NE, v, v.get_type().const_zero(), "tobool")
            .map(Into::into)
    });
    for int in TypeId::ints() {
        casts.specialize(int, TypeId::BOOL, int_to_bool.clone());
    }
    let float_to_bool = cast_emitter(|b, v, _| {
        let v = v.into_float_value();
        b.build_float_compare(FloatPredicate::ONE, v, v.get_type().const_zero(), "tobool")
            .map(Into::into)
    });
    for float in TypeId::FLOATS {
        casts.specialize(float, TypeId::BOOL, float_to_bool.clone());
    }

    for to in TypeId::FLOATS {
        casts.specialize(TypeId::BOOL, to, int_to_float(false));
        for from in TypeId::UNSIGNED_INTS {
            casts.specialize(from, to, int_to_float(false));
        }
        for from in TypeId::SIGNED_INTS {
            casts.specialize(from, to, int_to_float(true));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_cover_every_primitive() {
        let (types, _) = for_analysis();
        assert_eq!(types.id_of("i32"), TypeId::I32);
        assert_eq!(types.id_of("u128"), TypeId::U128);
        assert_eq!(types.id_of("f64"), TypeId::F64);
        assert_eq!(types.id_of(""), TypeId::VOID);
        assert_eq!(types.id_of("string"), TypeId::UNDETERMINED);
    }

    #[test]
    fn precedence_tiers() {
        let (_, special) = for_analysis();
        let rank = |s| special.precedence(s).unwrap();
        assert!(rank("=") < rank("=="));
        assert!(rank("==") < rank("+"));
        assert_eq!(rank("+"), rank("-"));
        assert!(rank("+") < rank("*"));
        assert_eq!(rank("*"), rank("/"));
    }

    #[test]
    fn literal_entries_are_declared_only() {
        let (_, special) = for_analysis();
        let key = (TypeId::U_LITERAL, TypeId::FP_LITERAL);
        let (ret, emitter) = special.binary("+").unwrap().lookup(&key);
        assert_eq!(ret, TypeId::FP_LITERAL);
        assert!(emitter.is_none());
        assert!(special.casts().is_declared(TypeId::U_LITERAL, TypeId::F64));
        assert!(special.casts().get(TypeId::U_LITERAL, TypeId::F64).is_none());
        assert!(!special.casts().is_declared(TypeId::I_LITERAL, TypeId::U32));
    }

    #[test]
    fn division_picks_signedness() {
        assert_eq!(arithmetic_op("/", TypeId::U16), Some(ArithOp::UDiv));
        assert_eq!(arithmetic_op("/", TypeId::I16), Some(ArithOp::SDiv));
        assert_eq!(arithmetic_op("%", TypeId::F32), Some(ArithOp::FRem));
        assert_eq!(arithmetic_op("^", TypeId::I8), None);
    }

    #[test]
    fn narrowing_is_never_implicit() {
        let (_, special) = for_analysis();
        let casts = special.casts();
        assert!(casts.is_declared(TypeId::I8, TypeId::I64));
        assert!(!casts.is_declared(TypeId::I64, TypeId::I8));
        assert!(casts.is_declared(TypeId::U8, TypeId::I16));
        assert!(!casts.is_declared(TypeId::U16, TypeId::I16));
        assert!(!casts.is_declared(TypeId::I8, TypeId::U64));
        assert!(!casts.is_declared(TypeId::F64, TypeId::F32));
    }
}
