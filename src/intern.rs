//! Canonical instances of atomic literals.
//!
//! The reader and the arithmetic builtins create atoms only through an
//! [`Interner`], so two occurrences of the literal `42` (or `"abc"`, or `foo`)
//! are the same allocation and identity comparison substitutes for content
//! comparison.

use crate::ast::{Const, NumberType, Value};
use std::collections::HashMap;
use std::rc::Rc;

/// Interning session owned by one interpreter instance.
#[derive(Debug, Default)]
pub struct Interner {
    numbers: HashMap<NumberType, Value>,
    strings: HashMap<Rc<str>, Value>,
    idents: HashMap<Rc<str>, Value>,
}

impl Interner {
    pub fn new() -> Self {
        Interner::default()
    }

    pub fn get_number(&mut self, n: NumberType) -> Value {
        self.numbers.entry(n).or_insert_with(|| Value::from(n)).clone()
    }

    pub fn get_string(&mut self, s: &str) -> Value {
        Self::intern_text(&mut self.strings, s, Value::String)
    }

    pub fn get_ident(&mut self, name: &str) -> Value {
        Self::intern_text(&mut self.idents, name, Value::Ident)
    }

    /// Constants are unit variants, so every `Value::Const` of a kind is already canonical.
    pub fn get_const(&self, kind: Const) -> Value {
        Value::Const(kind)
    }

    /// Number of distinct atoms interned so far
    pub fn len(&self) -> usize {
        self.numbers.len() + self.strings.len() + self.idents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn intern_text(
        table: &mut HashMap<Rc<str>, Value>,
        text: &str,
        make: fn(Rc<str>) -> Value,
    ) -> Value {
        if let Some(value) = table.get(text) {
            return value.clone();
        }
        let key: Rc<str> = text.into();
        let value = make(key.clone());
        table.insert(key, value.clone());
        value
    }
}
