//! Tree-walking interpreter: direct AST evaluation.
//!
//! This is the conventional execution strategy: lexical scoping through an
//! environment chain, closures capturing their defining environment, and
//! short-circuiting `and`/`or`. The bytecode VM deliberately differs on the
//! last two points (call-frame name lookup, no short-circuit); programs that
//! stay clear of those corners produce identical output on both engines.

pub mod builtins;
pub mod environment;
pub mod operators;
pub mod value;

use std::cell::RefCell;
use std::io::BufRead;
use std::rc::Rc;

use crate::ast::{BinaryOp, Expr, ExprKind, Program, Stmt, StmtKind};
use crate::error::RuntimeError;
use crate::span::Span;

use builtins::{BuiltinResult, OpError};
use environment::Environment;
use value::{Closure, HashKey, Value};

/// How control leaves a statement.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// The tree-walking interpreter.
pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    /// Everything written by display/displayl, in write order.
    pub output: Vec<String>,
    capture: bool,
    /// Value of the most recently evaluated expression statement; a function
    /// body that falls off its end returns this, matching the VM's
    /// top-of-stack return convention.
    last_value: Option<Value>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            globals: Rc::new(RefCell::new(Environment::new())),
            output: Vec::new(),
            capture: false,
            last_value: None,
        }
    }

    /// An interpreter that records display output instead of printing it.
    pub fn with_captured_output() -> Self {
        Self {
            capture: true,
            ..Self::new()
        }
    }

    /// Execute a program, returning the value of its last expression
    /// statement, if any.
    pub fn interpret(&mut self, program: &Program) -> Result<Option<Value>, RuntimeError> {
        self.last_value = None;
        let env = self.globals.clone();
        for stmt in &program.statements {
            match self.execute(stmt, &env)? {
                Flow::Normal => {}
                Flow::Return(value) => return Ok(Some(value)),
                Flow::Break => {
                    return Err(RuntimeError::new("'breakout' outside of a loop", stmt.span))
                }
                Flow::Continue => {
                    return Err(RuntimeError::new("'moveon' outside of a loop", stmt.span))
                }
            }
        }
        Ok(self.last_value.take())
    }

    // ===== Statements =====

    fn execute(
        &mut self,
        stmt: &Stmt,
        env: &Rc<RefCell<Environment>>,
    ) -> Result<Flow, RuntimeError> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                let value = self.evaluate(expr, env)?;
                self.last_value = Some(value);
                Ok(Flow::Normal)
            }

            StmtKind::Var {
                name,
                declared_type,
                initializer,
            } => {
                let mut value = self.evaluate(initializer, env)?;
                if let Some(ty) = declared_type {
                    value = builtins::cast_value(value, &ty.0)
                        .map_err(|e| op_err(e, initializer.span))?;
                }
                env.borrow_mut().define(name.clone(), value);
                Ok(Flow::Normal)
            }

            StmtKind::Assign { name, value } => {
                let value = self.evaluate(value, env)?;
                if !env.borrow_mut().assign(name, value) {
                    return Err(RuntimeError::UndefinedVariable(name.clone(), stmt.span));
                }
                Ok(Flow::Normal)
            }

            StmtKind::CompoundAssign {
                name,
                operator,
                value,
            } => {
                let current = env
                    .borrow()
                    .get(name)
                    .ok_or_else(|| RuntimeError::UndefinedVariable(name.clone(), stmt.span))?;
                let rhs = self.evaluate(value, env)?;
                let combined =
                    operators::binary(*operator, &current, &rhs).map_err(|e| op_err(e, stmt.span))?;
                env.borrow_mut().assign(name, combined);
                Ok(Flow::Normal)
            }

            StmtKind::IndexAssign {
                object,
                index,
                value,
            } => {
                let target = self.evaluate(object, env)?;
                let index = self.evaluate(index, env)?;
                let value = self.evaluate(value, env)?;
                builtins::index_set(&target, &index, value).map_err(|e| op_err(e, stmt.span))?;
                Ok(Flow::Normal)
            }

            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition, env)?.is_truthy() {
                    self.execute_block(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.execute_block(else_branch, env)
                } else {
                    Ok(Flow::Normal)
                }
            }

            StmtKind::While { condition, body } => {
                while self.evaluate(condition, env)?.is_truthy() {
                    match self.execute_block(body, env)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }

            StmtKind::For {
                init,
                condition,
                increment,
                body,
            } => {
                let loop_env = Rc::new(RefCell::new(Environment::with_enclosing(env.clone())));
                self.execute(init, &loop_env)?;
                while self.evaluate(condition, &loop_env)?.is_truthy() {
                    match self.execute_block(body, &loop_env)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                    self.execute(increment, &loop_env)?;
                }
                Ok(Flow::Normal)
            }

            StmtKind::Repeat { count, body } => {
                let count = match self.evaluate(count, env)? {
                    Value::Int(n) => n,
                    other => {
                        return Err(RuntimeError::type_error(
                            format!("repeat count must be an integer, got {}", other.type_name()),
                            stmt.span,
                        ))
                    }
                };
                for _ in 0..count.max(0) {
                    match self.execute_block(body, env)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }

            StmtKind::Breakout => Ok(Flow::Break),
            StmtKind::Moveon => Ok(Flow::Continue),

            StmtKind::Function(decl) => {
                let closure = Closure {
                    decl: decl.clone(),
                    env: env.clone(),
                };
                env.borrow_mut()
                    .define(decl.name.clone(), Value::Closure(Rc::new(closure)));
                Ok(Flow::Normal)
            }

            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::Unit,
                };
                Ok(Flow::Return(value))
            }

            StmtKind::Display { value, newline } => {
                let value = self.evaluate(value, env)?;
                let text = if *newline {
                    format!("{}\n", value)
                } else {
                    format!("{}", value)
                };
                self.write_output(text);
                Ok(Flow::Normal)
            }
        }
    }

    fn execute_block(
        &mut self,
        statements: &[Stmt],
        env: &Rc<RefCell<Environment>>,
    ) -> Result<Flow, RuntimeError> {
        let block_env = Rc::new(RefCell::new(Environment::with_enclosing(env.clone())));
        for stmt in statements {
            match self.execute(stmt, &block_env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    // ===== Expressions =====

    fn evaluate(
        &mut self,
        expr: &Expr,
        env: &Rc<RefCell<Environment>>,
    ) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::IntLiteral(n) => Ok(Value::Int(*n)),
            ExprKind::DecimalLiteral(n) => Ok(Value::Decimal(*n)),
            ExprKind::TextLiteral(s) => Ok(Value::Text(s.clone())),
            ExprKind::BoolLiteral(b) => Ok(Value::Bool(*b)),

            ExprKind::Variable(name) => env
                .borrow()
                .get(name)
                .ok_or_else(|| RuntimeError::UndefinedVariable(name.clone(), expr.span)),

            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                // The interpreter short-circuits; the VM does not.
                match operator {
                    BinaryOp::And => {
                        let left = self.evaluate(left, env)?;
                        if !left.is_truthy() {
                            return Ok(Value::Bool(false));
                        }
                        let right = self.evaluate(right, env)?;
                        Ok(Value::Bool(right.is_truthy()))
                    }
                    BinaryOp::Or => {
                        let left = self.evaluate(left, env)?;
                        if left.is_truthy() {
                            return Ok(Value::Bool(true));
                        }
                        let right = self.evaluate(right, env)?;
                        Ok(Value::Bool(right.is_truthy()))
                    }
                    _ => {
                        let left = self.evaluate(left, env)?;
                        let right = self.evaluate(right, env)?;
                        operators::binary(*operator, &left, &right)
                            .map_err(|e| op_err(e, expr.span))
                    }
                }
            }

            ExprKind::Unary { operator, operand } => {
                let operand = self.evaluate(operand, env)?;
                operators::unary(*operator, &operand).map_err(|e| op_err(e, expr.span))
            }

            ExprKind::Grouping(inner) => self.evaluate(inner, env),

            ExprKind::Call { name, arguments } => self.call(name, arguments, env, expr.span),

            ExprKind::PropertyCall {
                receiver,
                operation,
                arguments,
            } => {
                let receiver_value = self.evaluate(receiver, env)?;
                let mut args = Vec::with_capacity(arguments.len());
                for arg in arguments {
                    args.push(self.evaluate(arg, env)?);
                }
                let result = builtins::property_access(&receiver_value, operation, &args)
                    .map_err(|e| op_err(e, expr.span))?;
                // Rebind variable receivers after in-place operations. For
                // arrays/hashes this re-stores the same shared cell; for
                // strings it is what makes `s.PushBack("x")` visible.
                if builtins::is_mutating_property(operation) {
                    if let ExprKind::Variable(name) = &receiver.kind {
                        env.borrow_mut().assign(name, result.clone());
                    }
                }
                Ok(result)
            }

            ExprKind::Index { object, index } => {
                let object = self.evaluate(object, env)?;
                let index = self.evaluate(index, env)?;
                builtins::index_get(&object, &index).map_err(|e| op_err(e, expr.span))
            }

            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element, env)?);
                }
                Ok(Value::array(values))
            }

            ExprKind::Hash(pairs) => {
                let mut map = indexmap::IndexMap::new();
                for (key, value) in pairs {
                    let key_value = self.evaluate(key, env)?;
                    let key = HashKey::from_value(&key_value).ok_or_else(|| {
                        RuntimeError::type_error(
                            format!("{} cannot be used as a hash key", key_value.type_name()),
                            expr.span,
                        )
                    })?;
                    map.insert(key, self.evaluate(value, env)?);
                }
                Ok(Value::Hash(Rc::new(RefCell::new(map))))
            }

            ExprKind::Input => {
                let mut line = String::new();
                std::io::stdin()
                    .lock()
                    .read_line(&mut line)
                    .map_err(|e| RuntimeError::new(format!("input failed: {}", e), expr.span))?;
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Ok(Value::Text(line))
            }
        }
    }

    // ===== Calls =====

    fn call(
        &mut self,
        name: &str,
        arguments: &[Expr],
        env: &Rc<RefCell<Environment>>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        let mut args = Vec::with_capacity(arguments.len());
        for arg in arguments {
            args.push(self.evaluate(arg, env)?);
        }

        // Built-ins are reserved names and shadow user functions.
        if name == builtins::SORT_BY {
            return self.sort_by(args, span);
        }
        if let Some(builtin) = builtins::lookup(name) {
            if args.len() != builtin.arity {
                return Err(RuntimeError::WrongArity {
                    name: name.to_string(),
                    expected: builtin.arity,
                    got: args.len(),
                    span,
                });
            }
            return match (builtin.func)(args).map_err(|e| op_err(e, span))? {
                BuiltinResult::One(value) => Ok(value),
                // The VM pushes both pair values; a tree-walk call yields
                // one, so keep the popped element.
                BuiltinResult::Pair(_, popped) => Ok(popped),
            };
        }

        // Resolve before dispatching so no environment borrow is held while
        // user code runs.
        let resolved = env.borrow().get(name);
        match resolved {
            Some(Value::Closure(closure)) => self.call_closure(&closure, args, span),
            Some(other) => Err(RuntimeError::type_error(
                format!("'{}' is not callable ({})", name, other.type_name()),
                span,
            )),
            None => Err(RuntimeError::UndefinedFunction(name.to_string(), span)),
        }
    }

    fn call_closure(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<Value>,
        span: Span,
    ) -> Result<Value, RuntimeError> {
        if args.len() != closure.decl.params.len() {
            return Err(RuntimeError::WrongArity {
                name: closure.decl.name.clone(),
                expected: closure.decl.params.len(),
                got: args.len(),
                span,
            });
        }

        let call_env = Rc::new(RefCell::new(Environment::with_enclosing(
            closure.env.clone(),
        )));
        for (param, arg) in closure.decl.params.iter().zip(args) {
            call_env.borrow_mut().define(param.clone(), arg);
        }

        let saved = self.last_value.take();
        let mut result = Value::Unit;
        for stmt in &closure.decl.body {
            match self.execute(stmt, &call_env)? {
                Flow::Normal => {}
                Flow::Return(value) => {
                    result = value;
                    self.last_value = saved;
                    return Ok(result);
                }
                Flow::Break => {
                    return Err(RuntimeError::new("'breakout' outside of a loop", span))
                }
                Flow::Continue => {
                    return Err(RuntimeError::new("'moveon' outside of a loop", span))
                }
            }
        }
        // Implicit return: the body's last expression value.
        if let Some(value) = self.last_value.take() {
            result = value;
        }
        self.last_value = saved;
        Ok(result)
    }

    fn sort_by(&mut self, mut args: Vec<Value>, span: Span) -> Result<Value, RuntimeError> {
        if args.len() != 2 {
            return Err(RuntimeError::WrongArity {
                name: builtins::SORT_BY.to_string(),
                expected: 2,
                got: args.len(),
                span,
            });
        }
        let comparator = args.remove(1);
        let array = args.remove(0);
        let Value::Array(cell) = &array else {
            return Err(RuntimeError::type_error(
                format!("SortBy expects an array, got {}", array.type_name()),
                span,
            ));
        };
        let Value::Closure(comparator) = &comparator else {
            return Err(RuntimeError::type_error(
                format!(
                    "SortBy expects a function comparator, got {}",
                    comparator.type_name()
                ),
                span,
            ));
        };

        // Stable insertion sort so the comparator fully determines order.
        let mut values = cell.borrow().clone();
        for i in 1..values.len() {
            let mut j = i;
            while j > 0 {
                let before = self.call_closure(
                    comparator,
                    vec![values[j].clone(), values[j - 1].clone()],
                    span,
                )?;
                if !before.is_truthy() {
                    break;
                }
                values.swap(j - 1, j);
                j -= 1;
            }
        }
        *cell.borrow_mut() = values;
        Ok(array.clone())
    }

    fn write_output(&mut self, text: String) {
        if !self.capture {
            use std::io::Write;
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        self.output.push(text);
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn op_err(err: OpError, span: Span) -> RuntimeError {
    match err {
        OpError::Type(message) => RuntimeError::TypeError { message, span },
        OpError::Index { index, length } => RuntimeError::IndexOutOfBounds {
            index,
            length,
            span,
        },
        OpError::KeyNotFound(key) => RuntimeError::KeyNotFound(key, span),
        OpError::DivisionByZero => RuntimeError::DivisionByZero(span),
        OpError::UnknownCast(target) => RuntimeError::General {
            message: format!("Unknown typecast target '{}'", target),
            span,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn run(source: &str) -> (Option<Value>, Vec<String>) {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let mut interpreter = Interpreter::with_captured_output();
        let value = interpreter.interpret(&program).unwrap();
        (value, interpreter.output)
    }

    fn output(source: &str) -> String {
        run(source).1.join("")
    }

    #[test]
    fn test_arithmetic_result() {
        let (value, _) = run("1 + 2 * 3;");
        assert!(value.unwrap().equals(&Value::Int(7)));
    }

    #[test]
    fn test_integer_division_yields_decimal() {
        assert_eq!(output("displayl 10 / 4;"), "2.5\n");
    }

    #[test]
    fn test_variables_and_compound_assign() {
        assert_eq!(output("var x = 2; x += 3; displayl x;"), "5\n");
    }

    #[test]
    fn test_declared_type_cast() {
        assert_eq!(output("var x : integer = 3.9; displayl x;"), "3\n");
    }

    #[test]
    fn test_if_else() {
        assert_eq!(
            output("var x = 5; if x > 3 then displayl \"big\"; else displayl \"small\"; end"),
            "big\n"
        );
    }

    #[test]
    fn test_while_loop() {
        assert_eq!(
            output("var i = 0; while i < 3 do display i; i += 1; end"),
            "012"
        );
    }

    #[test]
    fn test_for_loop_with_moveon() {
        assert_eq!(
            output("for var i = 0; i < 5; i += 1 do if i == 2 then moveon; end display i; end"),
            "0134"
        );
    }

    #[test]
    fn test_nested_breakout_is_innermost() {
        let source = r#"
            for var i = 0; i < 2; i += 1 do
                var j = 0;
                while true do
                    breakout;
                    j += 1;
                end
                display i;
            end
        "#;
        assert_eq!(output(source), "01");
    }

    #[test]
    fn test_repeat() {
        assert_eq!(output("repeat 3 do display \"x\"; end"), "xxx");
    }

    #[test]
    fn test_function_explicit_return() {
        assert_eq!(
            output("fn add(a, b) { return a + b; } displayl add(1, 2);"),
            "3\n"
        );
    }

    #[test]
    fn test_recursive_factorial_implicit_return() {
        let source = r#"
            fn fact(n) { if n <= 1 then 1 else n * fact(n - 1) end; }
            displayl fact(5);
        "#;
        assert_eq!(output(source), "120\n");
    }

    #[test]
    fn test_recursive_fib() {
        let source = r#"
            fn fib(n) { if n == 1 or n == 2 then 1 else fib(n - 1) + fib(n - 2) end; }
            displayl fib(10);
        "#;
        assert_eq!(output(source), "55\n");
    }

    #[test]
    fn test_closure_captures_defining_environment() {
        // The interpreter is lexically scoped: inner sees the outer's local
        // through the captured chain even when called from elsewhere.
        let source = r#"
            fn outer() {
                var secret = 41;
                fn inner() { return secret + 1; }
                return inner();
            }
            displayl outer();
        "#;
        assert_eq!(output(source), "42\n");
    }

    #[test]
    fn test_and_or_short_circuit() {
        // Contrast with the VM: the right operand must NOT run here.
        let source = r#"
            fn noisy() { displayl "side"; return true; }
            var a = false and noisy();
            var b = true or noisy();
            displayl a;
            displayl b;
        "#;
        assert_eq!(output(source), "false\ntrue\n");
    }

    #[test]
    fn test_array_aliasing() {
        let source = r#"
            var a = [1, 2];
            var b = a;
            b.PushBack(3);
            displayl a;
        "#;
        assert_eq!(output(source), "[1, 2, 3]\n");
    }

    #[test]
    fn test_text_property_rebinds() {
        assert_eq!(
            output("var s = \"ab\"; s.PushBack(\"x\"); displayl s;"),
            "abx\n"
        );
    }

    #[test]
    fn test_hash_literal_and_index() {
        assert_eq!(
            output("var h = {\"a\": 1, \"b\": 2}; displayl h[\"b\"];"),
            "2\n"
        );
    }

    #[test]
    fn test_index_assignment() {
        assert_eq!(output("var xs = [1, 2, 3]; xs[1] = 9; displayl xs;"), "[1, 9, 3]\n");
    }

    #[test]
    fn test_builtin_shadows_user_function() {
        // Built-in names are reserved: the user Length is unreachable.
        let source = r#"
            fn Length(x) { return 99; }
            displayl Length([1, 2, 3]);
        "#;
        assert_eq!(output(source), "3\n");
    }

    #[test]
    fn test_sort_by_comparator() {
        let source = r#"
            fn desc(a, b) { return a > b; }
            var xs = [3, 1, 2];
            SortBy(xs, desc);
            displayl xs;
        "#;
        assert_eq!(output(source), "[3, 2, 1]\n");
    }

    #[test]
    fn test_undefined_variable_error() {
        let tokens = Scanner::new("displayl nope;").scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let mut interpreter = Interpreter::with_captured_output();
        assert!(matches!(
            interpreter.interpret(&program),
            Err(RuntimeError::UndefinedVariable(..))
        ));
    }

    #[test]
    fn test_division_by_zero_error() {
        let tokens = Scanner::new("displayl 1 / 0;").scan_tokens().unwrap();
        let program = Parser::new(tokens).parse().unwrap();
        let mut interpreter = Interpreter::with_captured_output();
        assert!(matches!(
            interpreter.interpret(&program),
            Err(RuntimeError::DivisionByZero(_))
        ));
    }
}
