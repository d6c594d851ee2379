//! Operator and cast tables.
//!
//! Every entry is keyed by operand type handles. Declaring an entry says
//! the operation is legal and fixes its result type; specializing attaches
//! the callback that emits it. The analyzer only needs declarations, the
//! code generator needs both.

use std::hash::Hash;
use std::rc::Rc;

use inkwell::builder::{Builder, BuilderError};
use inkwell::types::BasicTypeEnum;
use inkwell::values::BasicValueEnum;
use rustc_hash::FxHashMap;

use crate::id::TypeId;

/// Emits a binary operator at the builder's position.
pub type BinaryEmitter = Rc<
    dyn for<'ctx> Fn(
        &Builder<'ctx>,
        BasicValueEnum<'ctx>,
        BasicValueEnum<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>, BuilderError>,
>;

pub type UnaryEmitter = Rc<
    dyn for<'ctx> Fn(&Builder<'ctx>, BasicValueEnum<'ctx>) -> Result<BasicValueEnum<'ctx>, BuilderError>,
>;

/// Converts a value to the lowered target type passed alongside it.
pub type CastEmitter = Rc<
    dyn for<'ctx> Fn(
        &Builder<'ctx>,
        BasicValueEnum<'ctx>,
        BasicTypeEnum<'ctx>,
    ) -> Result<BasicValueEnum<'ctx>, BuilderError>,
>;

/// Wrap a closure as a [`BinaryEmitter`].
pub fn binary_emitter<F>(emit: F) -> BinaryEmitter
where
    F: for<'ctx> Fn(
            &Builder<'ctx>,
            BasicValueEnum<'ctx>,
            BasicValueEnum<'ctx>,
        ) -> Result<BasicValueEnum<'ctx>, BuilderError>
        + 'static,
{
    Rc::new(emit)
}

pub fn unary_emitter<F>(emit: F) -> UnaryEmitter
where
    F: for<'ctx> Fn(&Builder<'ctx>, BasicValueEnum<'ctx>) -> Result<BasicValueEnum<'ctx>, BuilderError>
        + 'static,
{
    Rc::new(emit)
}

pub fn cast_emitter<F>(emit: F) -> CastEmitter
where
    F: for<'ctx> Fn(
            &Builder<'ctx>,
            BasicValueEnum<'ctx>,
            BasicTypeEnum<'ctx>,
        ) -> Result<BasicValueEnum<'ctx>, BuilderError>
        + 'static,
{
    Rc::new(emit)
}

#[derive(Clone)]
pub struct OperatorEntry<E> {
    pub ret: TypeId,
    pub emitter: Option<E>,
}

/// Entries for one operator symbol, iterated in declaration order.
#[derive(Clone)]
pub struct OperatorTable<K, E> {
    entries: Vec<(K, OperatorEntry<E>)>,
    index: FxHashMap<K, usize>,
}

pub type BinaryTable = OperatorTable<(TypeId, TypeId), BinaryEmitter>;
pub type UnaryTable = OperatorTable<TypeId, UnaryEmitter>;

impl<K: Copy + Eq + Hash, E> OperatorTable<K, E> {
    pub fn new() -> Self {
        OperatorTable {
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// Declare `key` with result `ret`. Redeclaring keeps the entry's
    /// position and emitter and replaces the result type.
    pub fn declare(&mut self, key: K, ret: TypeId) {
        match self.index.get(&key) {
            Some(&at) => self.entries[at].1.ret = ret,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push((key, OperatorEntry { ret, emitter: None }));
            }
        }
    }

    /// Attach the emitter for a declared entry. Returns false when `key`
    /// was never declared.
    pub fn specialize(&mut self, key: K, emitter: E) -> bool {
        match self.index.get(&key) {
            Some(&at) => {
                self.entries[at].1.emitter = Some(emitter);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &K) -> Option<&OperatorEntry<E>> {
        self.index.get(key).map(|&at| &self.entries[at].1)
    }

    /// Result type and emitter for `key`; the result is
    /// [`TypeId::UNDETERMINED`] when there is no exact entry.
    pub fn lookup(&self, key: &K) -> (TypeId, Option<&E>) {
        match self.get(key) {
            Some(entry) => (entry.ret, entry.emitter.as_ref()),
            None => (TypeId::UNDETERMINED, None),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &OperatorEntry<E>)> {
        self.entries.iter().map(|(key, entry)| (key, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Copy + Eq + Hash, E> Default for OperatorTable<K, E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Implicit casts keyed by `(from, to)`. `None` means declared but not yet
/// specialized.
#[derive(Clone, Default)]
pub struct CastTable {
    entries: FxHashMap<(TypeId, TypeId), Option<CastEmitter>>,
}

impl CastTable {
    pub fn declare(&mut self, from: TypeId, to: TypeId) {
        self.entries.entry((from, to)).or_insert(None);
    }

    /// Declare (if needed) and attach the emitter in one step.
    pub fn specialize(&mut self, from: TypeId, to: TypeId, emitter: CastEmitter) {
        self.entries.insert((from, to), Some(emitter));
    }

    pub fn is_declared(&self, from: TypeId, to: TypeId) -> bool {
        self.entries.contains_key(&(from, to))
    }

    /// The emitter, present only once the cast is specialized.
    pub fn get(&self, from: TypeId, to: TypeId) -> Option<&CastEmitter> {
        self.entries.get(&(from, to))?.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Casts, unary operators and binary operators, plus binary precedence and
/// the defaults applied to literal kinds.
#[derive(Clone, Default)]
pub struct SpecialFunctions {
    casts: CastTable,
    unary: FxHashMap<String, UnaryTable>,
    binary: FxHashMap<String, BinaryTable>,
    precedence: FxHashMap<String, u32>,
    literal_defaults: FxHashMap<TypeId, TypeId>,
}

impl SpecialFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the binding strength of a binary operator; higher binds tighter.
    /// Precedence is set once per symbol: fails if a non-zero rank is
    /// already registered.
    pub fn register_binary_operator(&mut self, symbol: &str, precedence: u32) -> bool {
        match self.precedence.get(symbol) {
            Some(&existing) if existing != 0 => false,
            _ => {
                self.precedence.insert(symbol.to_string(), precedence);
                self.binary.entry(symbol.to_string()).or_default();
                true
            }
        }
    }

    /// Registered precedence, if any non-zero rank was set.
    pub fn precedence(&self, symbol: &str) -> Option<u32> {
        self.precedence.get(symbol).copied().filter(|p| *p != 0)
    }

    pub fn casts(&self) -> &CastTable {
        &self.casts
    }

    pub fn casts_mut(&mut self) -> &mut CastTable {
        &mut self.casts
    }

    pub fn binary(&self, symbol: &str) -> Option<&BinaryTable> {
        self.binary.get(symbol)
    }

    pub fn binary_mut(&mut self, symbol: &str) -> &mut BinaryTable {
        self.binary.entry(symbol.to_string()).or_default()
    }

    pub fn unary(&self, symbol: &str) -> Option<&UnaryTable> {
        self.unary.get(symbol)
    }

    pub fn unary_mut(&mut self, symbol: &str) -> &mut UnaryTable {
        self.unary.entry(symbol.to_string()).or_default()
    }

    /// Concrete type a literal kind takes when no context decides it.
    /// Concrete types map to themselves; an unconfigured kind is
    /// [`TypeId::UNDETERMINED`].
    pub fn literal_default(&self, kind: TypeId) -> TypeId {
        if !kind.is_literal() {
            return kind;
        }
        self.literal_defaults
            .get(&kind)
            .copied()
            .unwrap_or(TypeId::UNDETERMINED)
    }

    pub fn set_literal_default(&mut self, kind: TypeId, ty: TypeId) {
        self.literal_defaults.insert(kind, ty);
    }
}
