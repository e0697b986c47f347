use crate::ast::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Scope stack for variable bindings.
///
/// The outermost frame is the global frame and is never popped. Lookup walks
/// from the innermost frame outwards; `define` only ever touches the innermost
/// frame, so a binding made during a call disappears when the call's frame is
/// popped.
#[derive(Debug, Clone)]
pub struct Environment {
    frames: Vec<HashMap<Rc<str>, Value>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Discard the innermost frame. The global frame stays in place.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Insert or overwrite `name` in the innermost frame
    pub fn define(&mut self, name: Rc<str>, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name, value);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    /// Number of live frames, including the global one
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Get all visible bindings, inner frames shadowing outer ones.
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn bindings(&self) -> Vec<(Rc<str>, Value)> {
        let mut visible = HashMap::new();
        for frame in &self.frames {
            for (name, value) in frame {
                visible.insert(name.clone(), value.clone());
            }
        }

        let mut result: Vec<_> = visible.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}
