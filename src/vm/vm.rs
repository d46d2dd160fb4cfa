//! The bytecode virtual machine — stack-based execution engine.
//!
//! One shared operand stack, one stack of name-keyed call frames. Name
//! lookup is dynamic: LOAD searches the current frame, then outward through
//! the callers' frames to the program's root frame. A function therefore
//! sees whatever its caller has bound at call time — not its lexically
//! enclosing definition, which is how the tree-walking interpreter resolves
//! names instead.

use std::collections::HashMap;
use std::io::BufRead;

use crate::ast::{BinaryOp, UnaryOp};
use crate::error::VmError;
use crate::interpreter::builtins::{self, BuiltinResult, OpError};
use crate::interpreter::operators;
use crate::interpreter::value::{HashKey, Value};

use super::opcode::Op;
use super::program::Program;

/// Reserved frame key holding the caller's resume index. Angle brackets
/// keep it out of reach of user identifiers.
pub const RESUME_KEY: &str = "<resume>";

/// A call frame: name-to-value bindings created on CALL, destroyed on
/// RETURN. Frame 0 is the program's root frame and is never popped.
#[derive(Debug, Default)]
pub struct Frame {
    slots: HashMap<String, Value>,
}

impl Frame {
    fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

enum VmFlow {
    Continue,
    Halted,
}

/// The bytecode VM.
pub struct Vm {
    /// Shared operand stack.
    stack: Vec<Value>,
    /// Call frame stack; never empty while running.
    frames: Vec<Frame>,
    /// Instruction pointer.
    ip: usize,
    /// Everything written by display/displayl, in write order.
    pub output: Vec<String>,
    capture: bool,
}

impl Vm {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(16),
            ip: 0,
            output: Vec::new(),
            capture: false,
        }
    }

    /// A VM that records display output instead of printing it.
    pub fn with_captured_output() -> Self {
        Self {
            capture: true,
            ..Self::new()
        }
    }

    /// Execute a program to completion, returning the value left on top of
    /// the operand stack, if any.
    pub fn run(&mut self, program: &Program) -> Result<Option<Value>, VmError> {
        self.ip = 0;
        self.stack.clear();
        self.frames.clear();
        self.frames.push(Frame::new());

        loop {
            match self.step(program)? {
                VmFlow::Continue => {}
                VmFlow::Halted => break,
            }
        }
        Ok(self.stack.pop())
    }

    /// Fetch and execute one instruction.
    fn step(&mut self, program: &Program) -> Result<VmFlow, VmError> {
        let Some(op) = program.code.get(self.ip) else {
            return Ok(VmFlow::Halted);
        };
        self.ip += 1;

        match op {
            Op::Push(value) => self.stack.push(value.clone()),

            Op::Load(name) => {
                let value = self.lookup(name)?;
                self.stack.push(value);
            }
            Op::Store(name) => {
                let value = self.pop()?;
                self.current_frame().slots.insert(name.clone(), value);
            }

            Op::Jump(target) => self.ip = *target,
            Op::JumpIfFalse(target) => {
                let condition = self.pop()?;
                if !condition.is_truthy() {
                    self.ip = *target;
                }
            }

            Op::Call(name) => self.call(program, name)?,

            Op::Return => {
                if self.frames.len() == 1 {
                    // A return in the root frame ends the program.
                    return Ok(VmFlow::Halted);
                }
                let frame = self.frames.pop().ok_or(VmError::StackUnderflow)?;
                let resume = match frame.slots.get(RESUME_KEY) {
                    Some(Value::Int(addr)) => *addr as usize,
                    _ => return Err(VmError::UndefinedVariable(RESUME_KEY.to_string())),
                };
                self.ip = resume;
            }

            Op::BindFunction(name, entry) => {
                self.current_frame()
                    .slots
                    .insert(name.clone(), Value::FunctionAddr(*entry));
            }

            Op::Halt => return Ok(VmFlow::Halted),

            Op::Add => self.binary(BinaryOp::Add)?,
            Op::Subtract => self.binary(BinaryOp::Subtract)?,
            Op::Multiply => self.binary(BinaryOp::Multiply)?,
            Op::Divide => self.binary(BinaryOp::Divide)?,
            Op::Modulo => self.binary(BinaryOp::Modulo)?,
            Op::Power => self.binary(BinaryOp::Power)?,
            Op::Equal => self.binary(BinaryOp::Equal)?,
            Op::NotEqual => self.binary(BinaryOp::NotEqual)?,
            Op::Less => self.binary(BinaryOp::Less)?,
            Op::LessEqual => self.binary(BinaryOp::LessEqual)?,
            Op::Greater => self.binary(BinaryOp::Greater)?,
            Op::GreaterEqual => self.binary(BinaryOp::GreaterEqual)?,
            Op::And => self.binary(BinaryOp::And)?,
            Op::Or => self.binary(BinaryOp::Or)?,
            Op::BitAnd => self.binary(BinaryOp::BitAnd)?,
            Op::BitOr => self.binary(BinaryOp::BitOr)?,
            Op::BitXor => self.binary(BinaryOp::BitXor)?,
            Op::ShiftLeft => self.binary(BinaryOp::ShiftLeft)?,
            Op::ShiftRight => self.binary(BinaryOp::ShiftRight)?,

            Op::Negate => self.unary(UnaryOp::Negate)?,
            Op::Not => self.unary(UnaryOp::Not)?,
            Op::BitNot => self.unary(UnaryOp::BitNot)?,

            Op::MakeArray(count) => {
                let values = self.pop_many(*count)?;
                self.stack.push(Value::array(values));
            }
            Op::MakeHash(count) => {
                let flat = self.pop_many(count * 2)?;
                let mut map = indexmap::IndexMap::new();
                for pair in flat.chunks(2) {
                    let key = HashKey::from_value(&pair[0]).ok_or_else(|| {
                        VmError::type_mismatch(format!(
                            "{} cannot be used as a hash key",
                            pair[0].type_name()
                        ))
                    })?;
                    map.insert(key, pair[1].clone());
                }
                self.stack
                    .push(Value::Hash(std::rc::Rc::new(std::cell::RefCell::new(map))));
            }

            Op::GetIndex => {
                let index = self.pop()?;
                let object = self.pop()?;
                let value = builtins::index_get(&object, &index).map_err(op_err)?;
                self.stack.push(value);
            }
            Op::SetIndex => {
                let value = self.pop()?;
                let index = self.pop()?;
                let object = self.pop()?;
                builtins::index_set(&object, &index, value).map_err(op_err)?;
            }

            Op::PropAccess(operation) => {
                let arity = builtins::property_arity(operation).ok_or_else(|| {
                    VmError::type_mismatch(format!("unknown property operation '{}'", operation))
                })?;
                // The compiler pushed arguments in reverse, so popping
                // restores source order; the receiver sits beneath them.
                let mut args = Vec::with_capacity(arity);
                for _ in 0..arity {
                    args.push(self.pop()?);
                }
                let receiver = self.pop()?;
                let result =
                    builtins::property_access(&receiver, operation, &args).map_err(op_err)?;
                self.stack.push(result);
            }

            Op::Cast(target) => {
                let value = self.pop()?;
                let cast = builtins::cast_value(value, target).map_err(op_err)?;
                self.stack.push(cast);
            }

            Op::Display => {
                let value = self.pop()?;
                self.write_output(format!("{}", value));
            }
            Op::DisplayLine => {
                let value = self.pop()?;
                self.write_output(format!("{}\n", value));
            }
            Op::ReadInput => {
                let mut line = String::new();
                std::io::stdin()
                    .lock()
                    .read_line(&mut line)
                    .map_err(|e| VmError::type_mismatch(format!("input failed: {}", e)))?;
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                self.stack.push(Value::Text(line));
            }
        }

        Ok(VmFlow::Continue)
    }

    // ===== Calls =====

    fn call(&mut self, program: &Program, name: &str) -> Result<(), VmError> {
        // Built-in names are reserved and shadow user functions.
        if name == builtins::SORT_BY {
            return self.sort_by(program);
        }
        if let Some(builtin) = builtins::lookup(name) {
            if self.stack.len() < builtin.arity {
                return Err(VmError::ArityMismatch {
                    name: name.to_string(),
                    expected: builtin.arity,
                    got: self.stack.len(),
                });
            }
            let args = self.pop_many(builtin.arity)?;
            match (builtin.func)(args).map_err(op_err)? {
                BuiltinResult::One(value) => self.stack.push(value),
                BuiltinResult::Pair(first, second) => {
                    self.stack.push(first);
                    self.stack.push(second);
                }
            }
            return Ok(());
        }

        match self.lookup(name) {
            Ok(Value::FunctionAddr(entry)) => {
                let mut frame = Frame::new();
                frame
                    .slots
                    .insert(RESUME_KEY.to_string(), Value::Int(self.ip as i64));
                self.frames.push(frame);
                self.ip = entry;
                Ok(())
            }
            Ok(other) => Err(VmError::type_mismatch(format!(
                "'{}' is not callable ({})",
                name,
                other.type_name()
            ))),
            Err(_) => Err(VmError::UndefinedFunction(name.to_string())),
        }
    }

    /// Run a user function to completion from native code (the comparator
    /// hook) and hand back its return value.
    fn call_function(
        &mut self,
        program: &Program,
        entry: usize,
        args: Vec<Value>,
    ) -> Result<Value, VmError> {
        let saved_ip = self.ip;
        let depth = self.frames.len();

        for arg in args {
            self.stack.push(arg);
        }
        let mut frame = Frame::new();
        frame
            .slots
            .insert(RESUME_KEY.to_string(), Value::Int(saved_ip as i64));
        self.frames.push(frame);
        self.ip = entry;

        while self.frames.len() > depth {
            match self.step(program)? {
                VmFlow::Continue => {}
                VmFlow::Halted => break,
            }
        }

        self.ip = saved_ip;
        self.pop()
    }

    fn sort_by(&mut self, program: &Program) -> Result<(), VmError> {
        let comparator = self.pop()?;
        let array = self.pop()?;
        let Value::Array(cell) = &array else {
            return Err(VmError::type_mismatch(format!(
                "SortBy expects an array, got {}",
                array.type_name()
            )));
        };
        let Value::FunctionAddr(entry) = comparator else {
            return Err(VmError::type_mismatch(format!(
                "SortBy expects a function comparator, got {}",
                comparator.type_name()
            )));
        };

        // Stable insertion sort so the comparator fully determines order.
        let mut values = cell.borrow().clone();
        for i in 1..values.len() {
            let mut j = i;
            while j > 0 {
                let before = self.call_function(
                    program,
                    entry,
                    vec![values[j].clone(), values[j - 1].clone()],
                )?;
                if !before.is_truthy() {
                    break;
                }
                values.swap(j - 1, j);
                j -= 1;
            }
        }
        *cell.borrow_mut() = values;
        self.stack.push(array.clone());
        Ok(())
    }

    // ===== Name resolution =====

    /// Dynamic lookup: the current frame first, then outward through the
    /// callers to the root frame.
    fn lookup(&self, name: &str) -> Result<Value, VmError> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.slots.get(name) {
                return Ok(value.clone());
            }
        }
        Err(VmError::UndefinedVariable(name.to_string()))
    }

    fn current_frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    // ===== Stack plumbing =====

    fn pop(&mut self) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    /// Pop `count` values, restoring their push order.
    fn pop_many(&mut self, count: usize) -> Result<Vec<Value>, VmError> {
        if self.stack.len() < count {
            return Err(VmError::StackUnderflow);
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn binary(&mut self, operator: BinaryOp) -> Result<(), VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = operators::binary(operator, &a, &b).map_err(op_err)?;
        self.stack.push(result);
        Ok(())
    }

    fn unary(&mut self, operator: UnaryOp) -> Result<(), VmError> {
        let v = self.pop()?;
        let result = operators::unary(operator, &v).map_err(op_err)?;
        self.stack.push(result);
        Ok(())
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

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn op_err(err: OpError) -> VmError {
    match err {
        OpError::Type(message) => VmError::TypeMismatch(message),
        OpError::Index { index, length } => VmError::IndexOutOfBounds { index, length },
        OpError::KeyNotFound(key) => VmError::KeyNotFound(key),
        OpError::DivisionByZero => VmError::DivisionByZero,
        OpError::UnknownCast(target) => VmError::UnknownCastTarget(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Compiler;
    use pretty_assertions::assert_eq;

    fn run_source(source: &str) -> Result<(Option<Value>, Vec<String>), VmError> {
        let tokens = crate::lexer::Scanner::new(source).scan_tokens().unwrap();
        let ast = crate::parser::Parser::new(tokens).parse().unwrap();
        let program = Compiler::compile(&ast).unwrap();
        let mut vm = Vm::with_captured_output();
        let value = vm.run(&program)?;
        Ok((value, vm.output))
    }

    fn output(source: &str) -> String {
        run_source(source).unwrap().1.join("")
    }

    #[test]
    fn test_arithmetic_result() {
        let (value, _) = run_source("1 + 2 * 3;").unwrap();
        assert_eq!(value, Some(Value::Int(7)));
    }

    #[test]
    fn test_integer_division_yields_decimal() {
        assert_eq!(output("displayl 10 / 4;"), "2.5\n");
    }

    #[test]
    fn test_integer_arithmetic_stays_integer() {
        let (value, _) = run_source("7 % 4 + 2 ** 3;").unwrap();
        assert_eq!(value, Some(Value::Int(11)));
    }

    #[test]
    fn test_variables_and_compound_assign() {
        assert_eq!(output("var x = 2; x += 3; displayl x;"), "5\n");
    }

    #[test]
    fn test_declared_type_cast() {
        assert_eq!(output("var x : integer = 3.9; displayl x;"), "3\n");
        assert_eq!(output("var x : uinteger = -7; displayl x;"), "7\n");
    }

    #[test]
    fn test_unknown_cast_target_faults() {
        let result = run_source("var x : quaternion = 1;");
        assert!(matches!(result, Err(VmError::UnknownCastTarget(_))));
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
    fn test_for_loop_moveon_still_increments() {
        assert_eq!(
            output("for var i = 0; i < 5; i += 1 do if i == 2 then moveon; end display i; end"),
            "0134"
        );
    }

    #[test]
    fn test_repeat_moveon_still_decrements() {
        assert_eq!(
            output("var n = 0; repeat 4 do n += 1; if n == 2 then moveon; end display n; end"),
            "134"
        );
    }

    #[test]
    fn test_nested_breakout_is_innermost() {
        let source = r#"
            for var i = 0; i < 2; i += 1 do
                while true do
                    breakout;
                end
                display i;
            end
        "#;
        assert_eq!(output(source), "01");
    }

    #[test]
    fn test_recursive_factorial() {
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
    fn test_and_or_never_short_circuit() {
        // Both operands run even when the first already decides the result:
        // the side effects on the right-hand side must be observable.
        let source = r#"
            fn noisy() { displayl "side"; return true; }
            var a = false and noisy();
            var b = true or noisy();
            displayl a;
            displayl b;
        "#;
        assert_eq!(output(source), "side\nside\nfalse\ntrue\n");
    }

    #[test]
    fn test_array_aliasing_through_bindings() {
        let source = r#"
            var a = [1, 2];
            var b = a;
            b.PushBack(3);
            displayl a;
        "#;
        assert_eq!(output(source), "[1, 2, 3]\n");
    }

    #[test]
    fn test_text_push_back_rebinds_receiver() {
        assert_eq!(
            output("var s = \"ab\"; s.PushBack(\"x\"); displayl s;"),
            "abx\n"
        );
    }

    #[test]
    fn test_literal_receiver_push_back_is_expression_value() {
        assert_eq!(output("displayl [1, 2].PushBack(3);"), "[1, 2, 3]\n");
        assert_eq!(output("displayl \"ab\".PushBack(\"x\");"), "abx\n");
    }

    #[test]
    fn test_keys_on_array_is_type_mismatch() {
        let result = run_source("var xs = [1]; xs.Keys;");
        assert!(matches!(result, Err(VmError::TypeMismatch(_))));
    }

    #[test]
    fn test_hash_operations() {
        let source = r#"
            var h = {"a": 1};
            h.Add("b", 2);
            displayl h.Keys;
            displayl h["b"];
            h.Remove("a");
            displayl h.Length;
        "#;
        assert_eq!(output(source), "[\"a\", \"b\"]\n2\n1\n");
    }

    #[test]
    fn test_missing_hash_key_faults() {
        let result = run_source("var h = {\"a\": 1}; displayl h[\"b\"];");
        assert!(matches!(result, Err(VmError::KeyNotFound(_))));
    }

    #[test]
    fn test_index_out_of_bounds_faults() {
        let result = run_source("var xs = [1]; displayl xs[5];");
        assert!(matches!(result, Err(VmError::IndexOutOfBounds { .. })));
    }

    #[test]
    fn test_division_by_zero_faults() {
        let result = run_source("displayl 1 / 0;");
        assert!(matches!(result, Err(VmError::DivisionByZero)));
    }

    #[test]
    fn test_undefined_variable_faults() {
        let result = run_source("displayl nope;");
        assert!(matches!(result, Err(VmError::UndefinedVariable(_))));
    }

    #[test]
    fn test_undefined_function_faults() {
        let result = run_source("nope(1);");
        assert!(matches!(result, Err(VmError::UndefinedFunction(_))));
    }

    #[test]
    fn test_builtin_shadows_user_function() {
        let source = r#"
            fn Length(x) { return 99; }
            displayl Length([1, 2, 3]);
        "#;
        assert_eq!(output(source), "3\n");
    }

    #[test]
    fn test_builtin_calls() {
        assert_eq!(output("displayl Char(65);"), "A\n");
        assert_eq!(output("displayl Ascii(\"A\");"), "65\n");
        assert_eq!(output("displayl Abs(-3);"), "3\n");
        assert_eq!(output("displayl Floor(2.7);"), "2\n");
        assert_eq!(output("displayl TypeOf(1.5);"), "decimal\n");
        assert_eq!(output("displayl Format(\"n = {}\", 4);"), "n = 4\n");
        assert_eq!(
            output("displayl Format2(\"{} < {}\", 1, 2);"),
            "1 < 2\n"
        );
        assert_eq!(output("displayl Slice(\"abcdef\", 1, 5, 2);"), "bd\n");
    }

    #[test]
    fn test_string_pop_builtin_pushes_pair() {
        // PopBack pushes the remainder, then the popped character: the
        // character is what a single store consumes.
        assert_eq!(
            output("var c = PopBack(\"hi\"); displayl c;"),
            "i\n"
        );
    }

    #[test]
    fn test_sort_and_sort_by() {
        assert_eq!(
            output("var xs = [3, 1, 2]; Sort(xs); displayl xs;"),
            "[1, 2, 3]\n"
        );
        let source = r#"
            fn desc(a, b) { return a > b; }
            var xs = [3, 1, 2];
            SortBy(xs, desc);
            displayl xs;
        "#;
        assert_eq!(output(source), "[3, 2, 1]\n");
    }

    #[test]
    fn test_dynamic_scoping_sees_caller_bindings() {
        // The VM resolves free names against the live call stack: `inner`
        // finds `x` in its caller's frame, not in any lexical enclosure.
        let source = r#"
            fn inner() { return x + 1; }
            fn outer() { var x = 41; return inner(); }
            displayl outer();
        "#;
        assert_eq!(output(source), "42\n");
    }

    #[test]
    fn test_stack_underflow_on_pathological_program() {
        // A hand-built sequence popping more than it pushed must fault
        // cleanly, never read out of bounds.
        let mut program = Program::new();
        program.emit(Op::Push(Value::Int(1)));
        program.emit(Op::Add);
        program.emit(Op::Halt);
        let mut vm = Vm::with_captured_output();
        assert!(matches!(vm.run(&program), Err(VmError::StackUnderflow)));
    }

    #[test]
    fn test_arity_mismatch_on_starved_builtin_call() {
        let mut program = Program::new();
        program.emit(Op::Call("Pow".to_string()));
        program.emit(Op::Halt);
        let mut vm = Vm::with_captured_output();
        assert!(matches!(
            vm.run(&program),
            Err(VmError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn test_roundtrip_matches_interpreter_on_pure_programs() {
        // The cross-check between the two execution strategies: pure
        // arithmetic plus displayl must print identically on both.
        let sources = [
            "displayl 1 + 2 * 3 - 4;",
            "displayl 10 / 4;",
            "displayl (2 + 3) * (4 - 1);",
            "displayl 2 ** 8 % 10;",
            "var x = 6; var y = 7; displayl x * y;",
            "fn square(n) { return n * n; } displayl square(12);",
        ];
        for source in sources {
            let tokens = crate::lexer::Scanner::new(source).scan_tokens().unwrap();
            let ast = crate::parser::Parser::new(tokens).parse().unwrap();

            let mut interpreter = crate::interpreter::Interpreter::with_captured_output();
            interpreter.interpret(&ast).unwrap();

            let program = Compiler::compile(&ast).unwrap();
            let mut vm = Vm::with_captured_output();
            vm.run(&program).unwrap();

            assert_eq!(interpreter.output, vm.output, "diverged on: {}", source);
        }
    }
}
