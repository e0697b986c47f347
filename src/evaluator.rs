use crate::Error;
use crate::ast::{Function, Value};
use crate::builtinops::{Arity, BuiltinOp, BuiltinRegistry, OpKind};
use crate::environment::Environment;
use crate::intern::Interner;
use crate::reader::{ParseConfig, read_program};
use log::{debug, warn};
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

/// Interpreter state: the frame stack, the interning session, the builtin
/// registry and the sink `print` writes to.
pub struct Interpreter {
    env: Environment,
    interner: Interner,
    builtins: BuiltinRegistry,
    output: Box<dyn Write>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("env", &self.env)
            .field("interner", &self.interner)
            .field("builtins", &self.builtins)
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Interpreter printing to standard output
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Interpreter printing to the given sink
    pub fn with_output(output: Box<dyn Write>) -> Self {
        Interpreter {
            env: Environment::new(),
            interner: Interner::new(),
            builtins: BuiltinRegistry::with_defaults(),
            output,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    pub fn interner_mut(&mut self) -> &mut Interner {
        &mut self.interner
    }

    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }

    /// Register a native builtin, replacing any builtin of the same name.
    ///
    /// The closure receives the raw compound (head included) and decides itself
    /// which operands to evaluate, exactly like the standard builtins. `kind`
    /// records whether it evaluates all operands (`Primitive`) or only some
    /// (`SpecialForm`). Builtins take precedence over user functions of the
    /// same name.
    ///
    /// # Example
    /// ```
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    /// use tinylisp::ast::Value;
    /// use tinylisp::builtinops::{Arity, OpKind};
    /// use tinylisp::evaluator::Interpreter;
    ///
    /// let counter = Rc::new(Cell::new(0));
    /// let seen = counter.clone();
    /// let mut interp = Interpreter::with_output(Box::new(std::io::sink()));
    /// interp.register_builtin("tick", OpKind::Primitive, Arity::Exact(0), move |_args, interp| {
    ///     seen.set(seen.get() + 1);
    ///     interp.interner_mut().get_number(seen.get())
    /// });
    ///
    /// let result = interp.run_source("(tick) (tick)").unwrap();
    /// assert_eq!(format!("{result}"), "2");
    /// assert_eq!(counter.get(), 2);
    /// ```
    pub fn register_builtin<F>(&mut self, name: &str, kind: OpKind, arity: Arity, func: F)
    where
        F: Fn(&[Value], &mut Interpreter) -> Value + 'static,
    {
        debug!("registering builtin `{name}` ({kind:?})");
        self.builtins.register(BuiltinOp::new(name, kind, arity, func));
    }

    /// Write to the print sink. A failing sink is logged, never surfaced to the program.
    pub(crate) fn write_output(&mut self, args: fmt::Arguments<'_>) {
        if let Err(err) = self.output.write_fmt(args).and_then(|()| self.output.flush()) {
            warn!("failed to write program output: {err}");
        }
    }

    /// Evaluate a value. Never fails out of band: failures come back as `Value::Error`.
    pub fn eval(&mut self, value: &Value) -> Value {
        match value {
            Value::Error(_) | Value::Eof | Value::Const(_) => value.clone(),
            Value::String(s) => self.interner.get_string(s),
            Value::Number(n) => self.interner.get_number(**n),
            Value::Ident(name) => match self.env.lookup(name) {
                Some(bound) => bound.clone(),
                None => Value::error("unknown identifier"),
            },
            Value::Quote(inner) => Value::clone(inner),
            Value::Function(function) => self.eval(&function.body),
            Value::Compound(elements) => match elements.first() {
                Some(Value::Ident(name)) => self.apply(name, elements),
                _ => self.eval_sequence(elements),
            },
        }
    }

    /// Evaluate each form in order, stopping at the first error.
    /// The empty sequence evaluates to a fresh empty compound.
    pub fn eval_sequence(&mut self, forms: &[Value]) -> Value {
        let mut result = Value::compound(Vec::new());
        for form in forms {
            result = self.eval(form);
            if result.is_error() {
                return result;
            }
        }
        result
    }

    /// Dispatch a compound whose head is an identifier: builtins first, then
    /// user functions bound in the environment.
    fn apply(&mut self, name: &str, call: &[Value]) -> Value {
        if let Some(op) = self.builtins.get(name) {
            debug!("builtin `{name}` with {} operands", call.len() - 1);
            return op.call(call, self);
        }

        match self.env.lookup(name) {
            Some(Value::Function(function)) => {
                let function = Rc::clone(function);
                self.call_function(&function, &call[1..])
            }
            Some(_) => Value::error("can only call functions"),
            None => Value::error("could not find function"),
        }
    }

    /// Call a user function. Arguments are evaluated in the caller's frames,
    /// then bound in a fresh frame that lives for the duration of the body.
    fn call_function(&mut self, function: &Function, args: &[Value]) -> Value {
        if function.params.len() != args.len() {
            return Value::error("wrong number of arguments for function call");
        }

        let values: Vec<Value> = args.iter().map(|arg| self.eval(arg)).collect();

        debug!(
            "calling `{}` at frame depth {}",
            function.name,
            self.env.depth()
        );
        self.env.push();
        for (param, value) in function.params.iter().zip(values) {
            self.env.define(param.clone(), value);
        }
        let result = self.eval(&function.body);
        self.env.pop();
        result
    }

    /// Collect top-level forms into the implicit program sequence and evaluate it once.
    pub fn run_forms(&mut self, forms: Vec<Value>) -> Value {
        let mut program = Value::compound(Vec::with_capacity(forms.len()));
        for form in forms {
            program.add_value(form);
        }
        match &program {
            Value::Compound(elements) => self.eval_sequence(elements),
            _ => program,
        }
    }

    /// Read a whole program and run it. Reading is all-or-nothing: a parse error
    /// is returned before anything is evaluated.
    pub fn run_source(&mut self, source: &str) -> Result<Value, Error> {
        self.run_source_with_config(source, ParseConfig::default())
    }

    pub fn run_source_with_config(
        &mut self,
        source: &str,
        config: ParseConfig,
    ) -> Result<Value, Error> {
        let forms = read_program(source, &mut self.interner, config)?;
        Ok(self.run_forms(forms))
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{Const, compound, ident, num, string};
    use std::cell::RefCell;

    /// Print sink whose contents stay readable after the interpreter takes it
    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    fn quiet_interpreter() -> Interpreter {
        Interpreter::with_output(Box::new(io::sink()))
    }

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        EvalResult(&'static str),    // Evaluation should succeed and display as this
        SpecificError(&'static str), // Evaluation should yield an error with this reason
    }
    use TestResult::*;

    /// Test environment containing test cases that share state
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    fn execute_test_case(input: &str, expected: &TestResult, interp: &mut Interpreter, test_id: &str) {
        let result = match interp.run_source(input) {
            Ok(value) => value,
            Err(parse_err) => {
                panic!("{test_id}: unexpected parse error for '{input}': {parse_err:?}");
            }
        };

        match (&result, expected) {
            (Value::Error(reason), SpecificError(expected_reason)) => {
                assert_eq!(reason.as_ref(), *expected_reason, "{test_id}: '{input}'");
            }
            (Value::Error(reason), EvalResult(expected_val)) => {
                panic!("{test_id}: '{input}': expected {expected_val}, got error {reason}");
            }
            (actual, EvalResult(expected_val)) => {
                assert_eq!(format!("{actual}"), *expected_val, "{test_id}: '{input}'");
            }
            (actual, SpecificError(expected_reason)) => {
                panic!("{test_id}: '{input}': expected error '{expected_reason}', got {actual:?}");
            }
        }
    }

    /// Run tests in isolated environments with shared state
    fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let mut interp = quiet_interpreter();
            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &mut interp, &test_id);
            }
        }
    }

    /// Each case runs in a fresh interpreter
    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let mut interp = quiet_interpreter();
            let test_id = format!("#{}", i + 1);
            execute_test_case(input, expected, &mut interp, &test_id);
        }
    }

    #[test]
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // === SELF-EVALUATING FORMS ===
            ("42", EvalResult("42")),
            ("\"hello\"", EvalResult("hello")),
            ("T", EvalResult("T")),
            ("nil", EvalResult("NIL")),
            ("f", EvalResult("F")),
            ("", EvalResult("()")),
            ("()", EvalResult("()")),
            // === QUOTING ===
            ("'foo", EvalResult("foo")),
            ("'(1 2 3)", EvalResult("(1 2 3 )")),
            ("'(+ 1 2)", EvalResult("(+ 1 2 )")),
            ("''a", EvalResult("a")),
            // === ARITHMETIC ===
            ("(+ 1 2 3)", EvalResult("6")),
            ("(- 10 3 2)", EvalResult("5")),
            ("(* 2 3 4)", EvalResult("24")),
            ("(/ 20 4 5)", EvalResult("1")),
            ("(+ (* 2 3) (- 10 4))", EvalResult("12")),
            ("(- 5 10)", EvalResult("-5")),
            ("(+ 1 \"a\")", SpecificError("`+` expects all arguments to be numbers")),
            ("(+ undefined 1)", SpecificError("unknown identifier")),
            ("(+)", SpecificError("expect at least 1 argument for `+`")),
            // === COMPARISONS ===
            ("(< 1 2)", EvalResult("T")),
            ("(>= 3 3)", EvalResult("T")),
            ("(> 2 5)", EvalResult("F")),
            ("(<= 4 3)", EvalResult("F")),
            ("(< 1 2 3)", SpecificError("expect exactly 2 arguments for `<`")),
            ("(< 'a 2)", SpecificError("`<` only operates on numbers")),
            // === CONDITIONALS ===
            ("(if T 1 2)", EvalResult("1")),
            ("(if F 1 2)", EvalResult("2")),
            ("(if nil 1 2)", EvalResult("2")),
            ("(if (< 1 2) 'yes 'no)", EvalResult("yes")),
            ("(if T 1 undefined)", EvalResult("1")), // untaken branch not evaluated
            ("(if 1 2 3)", SpecificError("expect `T`, `F` or `NIL` as condition values")),
            ("(if T 1)", SpecificError("expect exactly 3 arguments for `if`")),
            ("(cond F 1 T 2 3)", EvalResult("2")),
            ("(cond F 1 F 2 9)", EvalResult("9")),
            ("(cond T 1 undefined 2 3)", EvalResult("1")),
            ("(cond (> 1 2) 'a (< 1 2) 'b 'c)", EvalResult("b")),
            (
                "(cond F 1 T)",
                SpecificError("expect an odd number of at least 3 arguments for `cond`"),
            ),
            (
                "(cond 5 1 2)",
                SpecificError("expect `T`, `F` or `NIL` as condition values"),
            ),
            // === EQUALITY ===
            ("(eq 1 1 1)", EvalResult("T")),
            ("(eq 1 2)", EvalResult("F")),
            ("(eq \"a\" \"a\")", EvalResult("T")),
            ("(eq 'a 'a)", EvalResult("T")),
            ("(eq 'a \"a\")", EvalResult("F")),
            ("(eq T T)", EvalResult("T")),
            ("(eq nil F)", EvalResult("F")),
            ("(eq '(1 2) '(1 2))", EvalResult("T")),
            ("(eq '((1)) '((1)))", EvalResult("F")),
            ("(eq 1 1 2)", EvalResult("F")),
            // === PRINT ===
            ("(print 1 2)", EvalResult("NIL")),
            // === IDENTIFIERS AND CALLS ===
            ("nonexistent", SpecificError("unknown identifier")),
            ("(nonexistent 1)", SpecificError("could not find function")),
            ("(setq x 1) (x)", SpecificError("can only call functions")),
            // === SEQUENCES ===
            ("(1 2 3)", EvalResult("3")),
            ("((+ 1 1) (+ 2 2))", EvalResult("4")),
            ("(1 undefined 3)", SpecificError("unknown identifier")),
            ("(setq x 5) x", EvalResult("5")),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_functions_and_scoping() {
        let test_environments = vec![
            // Definition and call
            TestEnvironment(vec![
                ("(defun add1 (x) (+ x 1))", EvalResult("NIL")),
                ("(add1 5)", EvalResult("6")),
                ("(add1)", SpecificError("wrong number of arguments for function call")),
                ("(add1 1 2)", SpecificError("wrong number of arguments for function call")),
                ("add1", EvalResult("function add1")),
                ("(add1 (add1 1))", EvalResult("3")),
            ]),
            // setq inside a call is local to the call's frame
            TestEnvironment(vec![
                ("(setq x 1)", EvalResult("NIL")),
                ("(defun f () (setq x 2))", EvalResult("NIL")),
                ("(f)", EvalResult("NIL")),
                ("x", EvalResult("1")),
            ]),
            // Parameters shadow globals only during the call
            TestEnvironment(vec![
                ("(setq n 100)", EvalResult("NIL")),
                ("(defun id (n) n)", EvalResult("NIL")),
                ("(id 7)", EvalResult("7")),
                ("n", EvalResult("100")),
            ]),
            // Dynamic scoping: free identifiers resolve against the caller's frames
            TestEnvironment(vec![
                ("(defun get-y () y)", EvalResult("NIL")),
                ("(get-y)", SpecificError("unknown identifier")),
                ("(defun with-y (y) (get-y))", EvalResult("NIL")),
                ("(with-y 42)", EvalResult("42")),
                ("(setq y 1)", EvalResult("NIL")),
                ("(get-y)", EvalResult("1")),
            ]),
            // Arguments are evaluated in the caller's frames, before binding
            TestEnvironment(vec![
                ("(setq x 10)", EvalResult("NIL")),
                ("(defun pair (x y) (+ (* x 100) y))", EvalResult("NIL")),
                ("(pair 1 x)", EvalResult("110")),
            ]),
            // Recursion
            TestEnvironment(vec![
                (
                    "(defun fact (n) (if (<= n 1) 1 (* n (fact (- n 1)))))",
                    EvalResult("NIL"),
                ),
                ("(fact 10)", EvalResult("3628800")),
                (
                    "(defun fib (n) (cond (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))",
                    EvalResult("NIL"),
                ),
                ("(fib 15)", EvalResult("610")),
            ]),
            // Builtins cannot be shadowed by user functions
            TestEnvironment(vec![
                ("(defun + (a b) 0)", EvalResult("NIL")),
                ("(+ 2 3)", EvalResult("5")),
            ]),
            // Redefinition replaces the function
            TestEnvironment(vec![
                ("(defun g () 1)", EvalResult("NIL")),
                ("(defun g () 2)", EvalResult("NIL")),
                ("(g)", EvalResult("2")),
            ]),
            // Malformed defun
            TestEnvironment(vec![
                (
                    "(defun 1 (x) x)",
                    SpecificError("expect first `defun` argument to be an identifier"),
                ),
                (
                    "(defun h x x)",
                    SpecificError("expect second `defun` argument to be a compound"),
                ),
                ("(defun h (x 1) x)", SpecificError("expect arguments to be identifiers")),
                ("(defun h (x))", SpecificError("expect exactly 3 arguments for `defun`")),
                ("(h 1)", SpecificError("could not find function")),
            ]),
        ];

        run_tests_in_environment(test_environments);
    }

    #[test]
    fn test_frames_are_popped_after_calls() {
        let mut interp = quiet_interpreter();
        interp
            .run_source("(defun f (a) (setq b a)) (f 1) (f 2)")
            .unwrap();
        assert_eq!(interp.env().depth(), 1);
        assert!(interp.env().lookup("b").is_none());
        assert!(interp.env().lookup("a").is_none());
    }

    #[test]
    fn test_print_output() {
        let buffer = SharedBuffer::default();
        let mut interp = Interpreter::with_output(Box::new(buffer.clone()));
        let result = interp
            .run_source("(print 1 \"two\" 'three '(4 5)) (print) (print (+ 1 2) T nil)")
            .unwrap();
        assert_eq!(result, Value::Const(Const::Nil));
        assert_eq!(buffer.contents(), "1 two three (4 5 ) \n\n3 T NIL \n");
    }

    #[test]
    fn test_sequence_stops_at_first_error() {
        let buffer = SharedBuffer::default();
        let mut interp = Interpreter::with_output(Box::new(buffer.clone()));
        let result = interp
            .run_source("(print 1) (undefined) (print 2)")
            .unwrap();
        assert_eq!(format!("{result}"), "Error: could not find function");
        assert_eq!(buffer.contents(), "1 \n");
    }

    #[test]
    fn test_errors_are_values() {
        let buffer = SharedBuffer::default();
        let mut interp = Interpreter::with_output(Box::new(buffer.clone()));
        // The error is bound like any value and surfaces only when printed
        interp.run_source("(setq e (+ 'a 1)) (print e)").unwrap();
        assert_eq!(
            buffer.contents(),
            "Error: `+` expects all arguments to be numbers \n"
        );
    }

    #[test]
    fn test_eval_canonicalizes_atoms() {
        let mut interp = quiet_interpreter();
        let canonical = interp.interner_mut().get_number(9);
        let result = interp.eval(&num(9));
        assert!(result.ptr_eq(&canonical));

        let canonical = interp.interner_mut().get_string("s");
        assert!(interp.eval(&string("s")).ptr_eq(&canonical));

        let quoted = interp.eval(&Value::quote(ident("unbound")));
        assert_eq!(quoted, ident("unbound"));

        let sequence = interp.eval(&compound([num(1), num(2)]));
        assert_eq!(format!("{sequence}"), "2");

        assert!(interp.eval(&Value::Eof).is_eof());
        let error = Value::error("kept");
        assert!(interp.eval(&error).ptr_eq(&error));
    }

    #[test]
    fn test_function_value_evaluates_body() {
        let mut interp = quiet_interpreter();
        interp.run_source("(setq z 3)").unwrap();
        let function = Value::function("f".into(), vec![], ident("z"));
        assert_eq!(format!("{}", interp.eval(&function)), "3");
    }

    #[test]
    fn test_parse_errors_abort_before_evaluation() {
        let buffer = SharedBuffer::default();
        let mut interp = Interpreter::with_output(Box::new(buffer.clone()));
        let err = interp.run_source("(print 1) \"abc").unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
        assert_eq!(buffer.contents(), "");
    }

    #[test]
    fn test_register_builtin_with_state() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let log = calls.clone();

        let mut interp = quiet_interpreter();
        let record = move |args: &[Value], interp: &mut Interpreter| {
            let value = interp.eval(&args[1]);
            log.borrow_mut().push(format!("{value}"));
            value
        };
        interp.register_builtin("record", OpKind::Primitive, Arity::Exact(1), record);
        let Some(op) = interp.builtins().get("record") else {
            panic!("record was not registered");
        };
        assert_eq!(op.kind, OpKind::Primitive);
        assert!(!op.is_special_form());

        let result = interp.run_source("(record (+ 1 2)) (record 'x)").unwrap();
        assert_eq!(format!("{result}"), "x");
        assert_eq!(*calls.borrow(), vec!["3".to_string(), "x".to_string()]);

        let arity = interp.run_source("(record)").unwrap();
        assert_eq!(
            format!("{arity}"),
            "Error: expect exactly 1 argument for `record`"
        );
    }

    #[test]
    #[should_panic(expected = "division by zero")]
    fn test_division_by_zero_is_fatal() {
        let mut interp = quiet_interpreter();
        let _ = interp.run_source("(/ 1 0)");
    }
}
