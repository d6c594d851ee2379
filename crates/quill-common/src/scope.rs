//! Lexical scope stack.
//!
//! A stack of flat name maps. Entering a function, block, or a construct
//! with its own `let` pushes a frame; leaving pops it. Lookups search from
//! the innermost frame outward, so inner bindings shadow outer ones.
//!
//! The same stack serves both passes: the analyzer stores type handles in
//! it and the code generator stores stack-slot values.

use rustc_hash::FxHashMap;

/// A stack of scopes mapping names to values of type `T`.
#[derive(Debug, Clone)]
pub struct ScopeStack<T> {
    /// Index 0 is the global frame and is never popped.
    frames: Vec<FxHashMap<String, T>>,
}

impl<T> ScopeStack<T> {
    /// Create a stack holding one empty global frame.
    pub fn new() -> Self {
        ScopeStack {
            frames: vec![FxHashMap::default()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(FxHashMap::default());
    }

    /// Pop the innermost frame.
    ///
    /// # Panics
    ///
    /// Panics if called when only the global frame remains.
    pub fn pop(&mut self) {
        assert!(self.frames.len() > 1, "cannot pop the global scope");
        self.frames.pop();
    }

    /// Bind `name` in the innermost frame, returning any binding it replaced
    /// in that same frame.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Option<T> {
        let top = self.frames.len() - 1;
        self.frames[top].insert(name.into(), value)
    }

    /// Bind `name` in the global frame regardless of the current depth.
    pub fn insert_global(&mut self, name: impl Into<String>, value: T) -> Option<T> {
        self.frames[0].insert(name.into(), value)
    }

    /// Look up a name, innermost binding first.
    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Whether `name` is bound in the innermost frame.
    pub fn is_bound_locally(&self, name: &str) -> bool {
        self.frames
            .last()
            .is_some_and(|frame| frame.contains_key(name))
    }

    /// Number of frames on the stack, global frame included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl<T> Default for ScopeStack<T> {
    fn default() -> Self {
        Self::new()
    }
}
