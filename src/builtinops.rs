//! Built-in operations registry.
//!
//! Every builtin is dispatched *before* ordinary function lookup and receives the
//! whole, unevaluated compound (head included). Each one decides which of its
//! operands to evaluate and when:
//!
//! ```lisp
//! (print 1 "two" 'three)       ; eager, left to right
//! (setq x (+ 1 2))             ; name unevaluated, value eager
//! (defun sq (n) (* n n))       ; nothing evaluated
//! (if (< x 5) 'small 'large)   ; only the chosen branch is evaluated
//! (cond F 1 T 2 3)             ; pairwise, first truthy condition wins
//! ```
//!
//! ## Primitives vs Special Forms
//!
//! - **Primitives** evaluate all of their operands (`print`, `eq`, `+`, `<`, ...)
//! - **Special forms** control evaluation of their operands (`setq`, `defun`, `if`, `cond`)
//!
//! The distinction is descriptive ([`OpKind`]); both kinds share one calling
//! convention, [`BuiltinFn`].
//!
//! ## Error Handling
//!
//! Builtins never fail out of band. Wrong arity, wrong operand kinds and
//! arithmetic overflow all come back as [`Value::Error`]. An operand that
//! evaluates to an error is returned unchanged by the numeric operations and by
//! the conditionals. Integer division by zero is not recovered: it panics.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** following `fn(&[Value], &mut Interpreter) -> Result<Value, Value>`
//! 2. **Add it to [`default_ops`]** with its name, kind and arity
//! 3. Or register a closure at runtime with [`Interpreter::register_builtin`]

use crate::ast::{Const, NumberType, Value};
use crate::evaluator::Interpreter;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Canonical builtin signature: the raw compound (head included) and the interpreter.
pub type BuiltinFn = dyn Fn(&[Value], &mut Interpreter) -> Value;

/// Number of operands (head excluded) a builtin accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// An odd number of operands, at least the given minimum
    OddAtLeast(usize),
    Any,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::OddAtLeast(n) => count >= n && count % 2 == 1,
            Arity::Any => true,
        }
    }
}

/// The error a builtin returns when called with the wrong number of operands
fn arity_error(name: &str, arity: Arity) -> Value {
    Value::error(format!("expect {arity} for `{name}`"))
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = |n: &usize| if *n == 1 { "argument" } else { "arguments" };
        match self {
            Arity::Exact(n) => write!(f, "exactly {n} {}", plural(n)),
            Arity::AtLeast(n) => write!(f, "at least {n} {}", plural(n)),
            Arity::OddAtLeast(n) => write!(f, "an odd number of at least {n} arguments"),
            Arity::Any => write!(f, "any number of arguments"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Evaluates every operand
    Primitive,
    /// Controls evaluation of its operands
    SpecialForm,
}

/// Definition of a built-in operation
#[derive(Clone)]
pub struct BuiltinOp {
    pub name: Rc<str>,
    pub kind: OpKind,
    pub arity: Arity,
    func: Rc<BuiltinFn>,
}

impl fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuiltinOp({}, {:?}, {:?})", self.name, self.kind, self.arity)
    }
}

impl BuiltinOp {
    pub fn new<F>(name: &str, kind: OpKind, arity: Arity, func: F) -> Self
    where
        F: Fn(&[Value], &mut Interpreter) -> Value + 'static,
    {
        BuiltinOp {
            name: name.into(),
            kind,
            arity,
            func: Rc::new(func),
        }
    }

    pub fn is_special_form(&self) -> bool {
        self.kind == OpKind::SpecialForm
    }

    /// Validate arity, then run the builtin on the raw compound `args`.
    pub fn call(&self, args: &[Value], interp: &mut Interpreter) -> Value {
        let operands = args.len().saturating_sub(1);
        if !self.arity.accepts(operands) {
            return arity_error(&self.name, self.arity);
        }
        (self.func)(args, interp)
    }
}

/// Name-keyed table of builtins owned by an interpreter
#[derive(Debug, Clone, Default)]
pub struct BuiltinRegistry {
    ops: HashMap<Rc<str>, Rc<BuiltinOp>>,
}

impl BuiltinRegistry {
    /// Empty registry
    pub fn new() -> Self {
        BuiltinRegistry::default()
    }

    /// Registry holding the standard builtins
    pub fn with_defaults() -> Self {
        let mut registry = BuiltinRegistry::new();
        for op in default_ops() {
            registry.register(op);
        }
        registry
    }

    /// Add or replace a builtin
    pub fn register(&mut self, op: BuiltinOp) {
        self.ops.insert(op.name.clone(), Rc::new(op));
    }

    pub fn get(&self, name: &str) -> Option<Rc<BuiltinOp>> {
        self.ops.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    /// All builtins sorted by name
    pub fn ops(&self) -> Vec<Rc<BuiltinOp>> {
        let mut ops: Vec<_> = self.ops.values().cloned().collect();
        ops.sort_by(|a, b| a.name.cmp(&b.name));
        ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

//
// Builtin Function Implementations
//
// Internally builtins return `Result<Value, Value>` so that `?` can
// short-circuit with an error value; `native` folds both sides back into
// a plain `Value`.
//

type NativeResult = Result<Value, Value>;

fn native(
    f: fn(&[Value], &mut Interpreter) -> NativeResult,
) -> impl Fn(&[Value], &mut Interpreter) -> Value {
    move |args: &[Value], interp: &mut Interpreter| f(args, interp).unwrap_or_else(|error| error)
}

fn nil(interp: &Interpreter) -> Value {
    interp.interner().get_const(Const::Nil)
}

fn truth(interp: &Interpreter, b: bool) -> Value {
    interp
        .interner()
        .get_const(if b { Const::T } else { Const::F })
}

/// Evaluate an operand that must produce a number.
/// An operand that evaluates to an error is passed through unchanged.
fn eval_number(interp: &mut Interpreter, expr: &Value, message: &str) -> Result<NumberType, Value> {
    match interp.eval(expr) {
        Value::Number(n) => Ok(*n),
        error @ Value::Error(_) => Err(error),
        _ => Err(Value::error(message)),
    }
}

/// Evaluate a condition; only constants are acceptable.
fn eval_condition(interp: &mut Interpreter, expr: &Value) -> Result<Const, Value> {
    match interp.eval(expr) {
        Value::Const(c) => Ok(c),
        error @ Value::Error(_) => Err(error),
        _ => Err(Value::error(
            "expect `T`, `F` or `NIL` as condition values",
        )),
    }
}

fn builtin_print(args: &[Value], interp: &mut Interpreter) -> NativeResult {
    for arg in args.iter().skip(1) {
        let value = interp.eval(arg);
        interp.write_output(format_args!("{value} "));
    }
    interp.write_output(format_args!("\n"));
    Ok(nil(interp))
}

fn builtin_setq(args: &[Value], interp: &mut Interpreter) -> NativeResult {
    let [_, target, expr] = args else {
        return Err(arity_error("setq", Arity::Exact(2)));
    };
    let Some(name) = target.as_ident() else {
        return Err(Value::error(
            "expect first `setq` argument to be an identifier",
        ));
    };

    let value = interp.eval(expr);
    debug!("setq `{name}` = {value} (frame depth {})", interp.env().depth());
    interp.env_mut().define(name.clone(), value);
    Ok(nil(interp))
}

fn builtin_defun(args: &[Value], interp: &mut Interpreter) -> NativeResult {
    let [_, target, params, body] = args else {
        return Err(arity_error("defun", Arity::Exact(3)));
    };
    let Some(name) = target.as_ident() else {
        return Err(Value::error(
            "expect first `defun` argument to be an identifier",
        ));
    };
    let Value::Compound(param_list) = params else {
        return Err(Value::error(
            "expect second `defun` argument to be a compound",
        ));
    };

    let param_names = param_list
        .iter()
        .map(|param| {
            param
                .as_ident()
                .cloned()
                .ok_or_else(|| Value::error("expect arguments to be identifiers"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!("defun `{name}` ({} parameters)", param_names.len());
    let function = Value::function(name.clone(), param_names, body.clone());
    interp.env_mut().define(name.clone(), function);
    Ok(nil(interp))
}

fn builtin_eq(args: &[Value], interp: &mut Interpreter) -> NativeResult {
    let first = interp.eval(&args[1]);
    for arg in &args[2..] {
        if interp.eval(arg) != first {
            return Ok(truth(interp, false));
        }
    }
    Ok(truth(interp, true))
}

fn builtin_cond(args: &[Value], interp: &mut Interpreter) -> NativeResult {
    let Some((default, pairs)) = args[1..].split_last() else {
        return Err(arity_error("cond", Arity::OddAtLeast(3)));
    };
    for pair in pairs.chunks(2) {
        let [condition, result] = pair else {
            return Err(arity_error("cond", Arity::OddAtLeast(3)));
        };
        if eval_condition(interp, condition)?.is_truthy() {
            return Ok(interp.eval(result));
        }
    }
    Ok(interp.eval(default))
}

fn builtin_if(args: &[Value], interp: &mut Interpreter) -> NativeResult {
    let [_, condition, then_branch, else_branch] = args else {
        return Err(arity_error("if", Arity::Exact(3)));
    };
    if eval_condition(interp, condition)?.is_truthy() {
        Ok(interp.eval(then_branch))
    } else {
        Ok(interp.eval(else_branch))
    }
}

/// Left fold over numeric operands, seeded by the first one
fn fold_numbers(
    args: &[Value],
    interp: &mut Interpreter,
    op_str: &str,
    combine: fn(NumberType, NumberType) -> Option<NumberType>,
) -> NativeResult {
    let type_error = format!("`{op_str}` expects all arguments to be numbers");
    let mut total = eval_number(interp, &args[1], &type_error)?;
    for arg in &args[2..] {
        let n = eval_number(interp, arg, &type_error)?;
        total = combine(total, n)
            .ok_or_else(|| Value::error(format!("integer overflow in `{op_str}`")))?;
    }
    Ok(interp.interner_mut().get_number(total))
}

// Macro to generate the arithmetic builtins
macro_rules! arithmetic_op {
    ($name:ident, $op_str:literal, $combine:expr) => {
        fn $name(args: &[Value], interp: &mut Interpreter) -> NativeResult {
            fold_numbers(args, interp, $op_str, $combine)
        }
    };
}

/// Truncating division. A zero divisor is a fatal fault, not an error value.
fn divide(a: NumberType, b: NumberType) -> Option<NumberType> {
    if b == 0 {
        panic!("division by zero in `/`");
    }
    a.checked_div(b)
}

arithmetic_op!(builtin_add, "+", NumberType::checked_add);
arithmetic_op!(builtin_sub, "-", NumberType::checked_sub);
arithmetic_op!(builtin_mul, "*", NumberType::checked_mul);
arithmetic_op!(builtin_div, "/", divide);

// Macro to generate numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:literal) => {
        fn $name(args: &[Value], interp: &mut Interpreter) -> NativeResult {
            let message = concat!("`", $op_str, "` only operates on numbers");
            let first = eval_number(interp, &args[1], message)?;
            let second = eval_number(interp, &args[2], message)?;
            Ok(truth(interp, first $op second))
        }
    };
}

numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_le, <=, "<=");
numeric_comparison!(builtin_ge, >=, ">=");

/// The standard builtin table.
pub fn default_ops() -> Vec<BuiltinOp> {
    use Arity::*;
    use OpKind::*;

    vec![
        BuiltinOp::new("print", Primitive, Any, native(builtin_print)),
        BuiltinOp::new("setq", SpecialForm, Exact(2), native(builtin_setq)),
        BuiltinOp::new("defun", SpecialForm, Exact(3), native(builtin_defun)),
        BuiltinOp::new("eq", Primitive, AtLeast(2), native(builtin_eq)),
        BuiltinOp::new("cond", SpecialForm, OddAtLeast(3), native(builtin_cond)),
        BuiltinOp::new("if", SpecialForm, Exact(3), native(builtin_if)),
        // Arithmetic
        BuiltinOp::new("+", Primitive, AtLeast(1), native(builtin_add)),
        BuiltinOp::new("-", Primitive, AtLeast(1), native(builtin_sub)),
        BuiltinOp::new("*", Primitive, AtLeast(1), native(builtin_mul)),
        BuiltinOp::new("/", Primitive, AtLeast(1), native(builtin_div)),
        // Comparison
        BuiltinOp::new("<", Primitive, Exact(2), native(builtin_lt)),
        BuiltinOp::new(">", Primitive, Exact(2), native(builtin_gt)),
        BuiltinOp::new("<=", Primitive, Exact(2), native(builtin_le)),
        BuiltinOp::new(">=", Primitive, Exact(2), native(builtin_ge)),
    ]
}
