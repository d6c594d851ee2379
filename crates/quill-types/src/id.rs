use std::fmt;

/// Opaque handle naming an interned type.
///
/// Handles below the primitive bound are reserved and fixed; every other
/// handle is issued by a [`crate::TypeRegistry`]. The reserved order puts
/// narrower integers before wider ones and unsigned before signed, which
/// candidate tie-breaking relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    /// Failure marker. Never a valid type.
    pub const UNDETERMINED: TypeId = TypeId(0);
    /// No type chosen yet. Distinct from failure.
    pub const UNSET: TypeId = TypeId(1);
    /// Integer literal not yet defaulted or coerced.
    pub const U_LITERAL: TypeId = TypeId(2);
    /// Negated integer literal not yet defaulted or coerced.
    pub const I_LITERAL: TypeId = TypeId(3);
    /// Float literal not yet defaulted or coerced.
    pub const FP_LITERAL: TypeId = TypeId(4);
    pub const VOID: TypeId = TypeId(5);
    pub const BOOL: TypeId = TypeId(6);
    pub const CHAR: TypeId = TypeId(7);
    pub const U8: TypeId = TypeId(8);
    pub const U16: TypeId = TypeId(9);
    pub const U32: TypeId = TypeId(10);
    pub const U64: TypeId = TypeId(11);
    pub const U128: TypeId = TypeId(12);
    pub const I8: TypeId = TypeId(13);
    pub const I16: TypeId = TypeId(14);
    pub const I32: TypeId = TypeId(15);
    pub const I64: TypeId = TypeId(16);
    pub const I128: TypeId = TypeId(17);
    pub const F32: TypeId = TypeId(18);
    pub const F64: TypeId = TypeId(19);

    /// First handle the registry may issue.
    pub(crate) const PRIMITIVE_BOUND: u32 = 20;

    pub const UNSIGNED_INTS: [TypeId; 5] = [
        TypeId::U8,
        TypeId::U16,
        TypeId::U32,
        TypeId::U64,
        TypeId::U128,
    ];
    pub const SIGNED_INTS: [TypeId; 5] = [
        TypeId::I8,
        TypeId::I16,
        TypeId::I32,
        TypeId::I64,
        TypeId::I128,
    ];
    pub const FLOATS: [TypeId; 2] = [TypeId::F32, TypeId::F64];
    pub const LITERALS: [TypeId; 3] = [TypeId::U_LITERAL, TypeId::I_LITERAL, TypeId::FP_LITERAL];

    pub fn index(self) -> u32 {
        self.0
    }

    /// Every integer primitive, unsigned first, narrow to wide.
    pub fn ints() -> impl Iterator<Item = TypeId> {
        TypeId::UNSIGNED_INTS
            .into_iter()
            .chain(TypeId::SIGNED_INTS)
    }

    /// Every integer and float primitive.
    pub fn numerics() -> impl Iterator<Item = TypeId> {
        TypeId::ints().chain(TypeId::FLOATS)
    }

    pub fn is_literal(self) -> bool {
        (TypeId::U_LITERAL.0..=TypeId::FP_LITERAL.0).contains(&self.0)
    }

    /// A real type: not a sentinel and not a literal kind.
    pub fn is_concrete(self) -> bool {
        self.0 >= TypeId::VOID.0
    }

    pub fn is_primitive(self) -> bool {
        (TypeId::VOID.0..TypeId::PRIMITIVE_BOUND).contains(&self.0)
    }

    pub fn is_unsigned_int(self) -> bool {
        (TypeId::U8.0..=TypeId::U128.0).contains(&self.0)
    }

    pub fn is_signed_int(self) -> bool {
        (TypeId::I8.0..=TypeId::I128.0).contains(&self.0)
    }

    pub fn is_int(self) -> bool {
        self.is_unsigned_int() || self.is_signed_int()
    }

    pub fn is_float(self) -> bool {
        self == TypeId::F32 || self == TypeId::F64
    }

    /// Bit width of integer-like primitives, `bool` and `char` included.
    pub fn int_bits(self) -> Option<u32> {
        match self {
            TypeId::BOOL => Some(1),
            TypeId::U8 | TypeId::I8 => Some(8),
            TypeId::U16 | TypeId::I16 => Some(16),
            TypeId::CHAR | TypeId::U32 | TypeId::I32 => Some(32),
            TypeId::U64 | TypeId::I64 => Some(64),
            TypeId::U128 | TypeId::I128 => Some(128),
            _ => None,
        }
    }
}

/// The value of a literal operand, as far as range checks need it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    /// An integer literal, negated when it sits under a unary minus.
    Int { magnitude: u64, negative: bool },
    Float(f64),
}

impl TypeId {
    /// Whether a literal holding `constant` can be relabelled as this type
    /// without losing its value. Literal kinds hold anything.
    pub fn can_hold(self, constant: Constant) -> bool {
        if self.is_literal() {
            return true;
        }
        match constant {
            Constant::Int { magnitude, negative } => {
                if self.is_float() {
                    return true;
                }
                let (Some(bits), true) = (self.int_bits(), self.is_int()) else {
                    return false;
                };
                let magnitude = u128::from(magnitude);
                if self.is_signed_int() {
                    let max = u128::MAX >> (129 - bits);
                    if negative {
                        magnitude <= max + 1
                    } else {
                        magnitude <= max
                    }
                } else {
                    !negative && magnitude <= u128::MAX >> (128 - bits)
                }
            }
            Constant::Float(value) => match self {
                TypeId::F64 => true,
                TypeId::F32 => !value.is_finite() || value.abs() <= f64::from(f32::MAX),
                _ => false,
            },
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_order_is_narrow_to_wide() {
        assert!(TypeId::U8 < TypeId::U32);
        assert!(TypeId::U128 < TypeId::I8);
        assert!(TypeId::I128 < TypeId::F32);
        assert!(TypeId::F32 < TypeId::F64);
    }

    #[test]
    fn classification() {
        assert!(TypeId::U_LITERAL.is_literal());
        assert!(!TypeId::U_LITERAL.is_concrete());
        assert!(!TypeId::UNSET.is_concrete());
        assert!(TypeId::VOID.is_primitive());
        assert!(TypeId::I64.is_signed_int());
        assert!(!TypeId::CHAR.is_int());
        assert_eq!(TypeId::CHAR.int_bits(), Some(32));
        assert_eq!(TypeId::ints().count(), 10);
    }

    #[test]
    fn integer_ranges() {
        let int = |magnitude, negative| Constant::Int { magnitude, negative };
        assert!(TypeId::U8.can_hold(int(255, false)));
        assert!(!TypeId::U8.can_hold(int(256, false)));
        assert!(!TypeId::U8.can_hold(int(1, true)));
        assert!(TypeId::I8.can_hold(int(127, false)));
        assert!(!TypeId::I8.can_hold(int(128, false)));
        assert!(TypeId::I8.can_hold(int(128, true)));
        assert!(!TypeId::I8.can_hold(int(129, true)));
        assert!(TypeId::U64.can_hold(int(u64::MAX, false)));
        assert!(!TypeId::I64.can_hold(int(u64::MAX, false)));
        assert!(TypeId::I128.can_hold(int(u64::MAX, true)));
        assert!(TypeId::F32.can_hold(int(u64::MAX, false)));
        assert!(TypeId::U_LITERAL.can_hold(int(u64::MAX, false)));
        assert!(!TypeId::BOOL.can_hold(int(1, false)));
    }

    #[test]
    fn float_ranges() {
        assert!(TypeId::F32.can_hold(Constant::Float(1.5)));
        assert!(!TypeId::F32.can_hold(Constant::Float(1e39)));
        assert!(TypeId::F64.can_hold(Constant::Float(1e39)));
        assert!(!TypeId::I32.can_hold(Constant::Float(1.0)));
    }
}
