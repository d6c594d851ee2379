//! Overload resolution over the operator tables.
//!
//! An exact entry for the actual operand types always wins. Otherwise every
//! entry of the operator is a candidate if each operand whose type differs
//! has a declared cast to the entry's type, and at most one of those casts
//! converts a real (non-literal) value: literal kinds coerce for free.
//! Surviving candidates keep declaration order, then are stably sorted by
//! the required type of each literal operand, left first, so a literal takes
//! the narrowest type that works. A literal operand whose value is known
//! only matches entries whose type can hold that value.

use crate::id::{Constant, TypeId};
use crate::special::SpecialFunctions;

/// The operand types a binary expression must be converted to, and what it
/// then produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub left: TypeId,
    pub right: TypeId,
    pub ret: TypeId,
}

/// One side of a binary expression: its type and, for a literal leaf, its
/// value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operand {
    pub ty: TypeId,
    pub constant: Option<Constant>,
}

impl Operand {
    pub fn literal(ty: TypeId, constant: Constant) -> Self {
        Operand {
            ty,
            constant: Some(constant),
        }
    }

    fn admits(&self, want: TypeId) -> bool {
        self.constant.map_or(true, |c| want.can_hold(c))
    }
}

impl From<TypeId> for Operand {
    fn from(ty: TypeId) -> Self {
        Operand { ty, constant: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnaryResolution {
    pub operand: TypeId,
    pub ret: TypeId,
}

pub fn resolve_binary(
    special: &SpecialFunctions,
    symbol: &str,
    left: impl Into<Operand>,
    right: impl Into<Operand>,
) -> Option<Resolution> {
    let (left_operand, right_operand) = (left.into(), right.into());
    let (left, right) = (left_operand.ty, right_operand.ty);
    let table = special.binary(symbol)?;
    if let Some(entry) = table.get(&(left, right)) {
        return Some(Resolution {
            left,
            right,
            ret: entry.ret,
        });
    }

    let casts = special.casts();
    let mut candidates: Vec<Resolution> = table
        .iter()
        .filter(|(key, _)| {
            let (want_left, want_right) = **key;
            let cast_left = want_left != left;
            let cast_right = want_right != right;
            if cast_left && cast_right && !left.is_literal() && !right.is_literal() {
                return false;
            }
            (!cast_left || casts.is_declared(left, want_left))
                && (!cast_right || casts.is_declared(right, want_right))
                && left_operand.admits(want_left)
                && right_operand.admits(want_right)
        })
        .map(|(&(want_left, want_right), entry)| Resolution {
            left: want_left,
            right: want_right,
            ret: entry.ret,
        })
        .collect();

    if left.is_literal() {
        candidates.sort_by_key(|c| c.left);
    }
    if right.is_literal() {
        candidates.sort_by_key(|c| c.right);
    }
    let chosen = candidates.first().copied();
    tracing::trace!(
        symbol,
        left = left.index(),
        right = right.index(),
        candidates = candidates.len(),
        ?chosen,
        "binary candidate search"
    );
    chosen
}

/// Unary counterpart of [`resolve_binary`]: exact entry first, then the
/// first entry the operand can be cast to, narrowest first for literals.
pub fn resolve_unary(
    special: &SpecialFunctions,
    symbol: &str,
    operand: TypeId,
) -> Option<UnaryResolution> {
    let table = special.unary(symbol)?;
    if let Some(entry) = table.get(&operand) {
        return Some(UnaryResolution {
            operand,
            ret: entry.ret,
        });
    }
    let mut candidates: Vec<UnaryResolution> = table
        .iter()
        .filter(|(want, _)| special.casts().is_declared(operand, **want))
        .map(|(want, entry)| UnaryResolution {
            operand: *want,
            ret: entry.ret,
        })
        .collect();
    if operand.is_literal() {
        candidates.sort_by_key(|c| c.operand);
    }
    candidates.first().copied()
}
