//! AST-to-bytecode compiler.
//!
//! Single-pass compilation: walks the AST once, emitting instructions into
//! a `Program`. Jumps out of structured control flow are emitted with
//! placeholder targets and patched once the guarded code has been emitted.
//! The compiler is scope-agnostic — it emits LOAD/STORE by name and leaves
//! visibility to the VM's frame lookup.

use crate::ast::Program as Ast;
use crate::error::CompileError;
use crate::span::Span;

use super::opcode::Op;
use super::program::{Program, UNPATCHED};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Per-loop bookkeeping for breakout/moveon.
///
/// Loops with a condition check at a known index (while, repeat) record it
/// as the continue target; for-loops leave it unset and collect patches,
/// because their continuation is the increment label, which is only known
/// after the body has been emitted. A stack of these records is what makes
/// break/continue inside nested loops target the innermost one.
#[derive(Debug)]
pub struct LoopRecord {
    pub continue_target: Option<usize>,
    pub continue_patches: Vec<usize>,
    pub break_patches: Vec<usize>,
}

/// The compiler: transforms an AST into a runnable program.
pub struct Compiler {
    pub(crate) program: Program,
    pub(crate) loops: Vec<LoopRecord>,
    pub(crate) repeat_counter: usize,
}

impl Compiler {
    fn new() -> Self {
        Self {
            program: Program::new(),
            loops: Vec::new(),
            repeat_counter: 0,
        }
    }

    /// Compile a full program, terminated by a halt instruction, with every
    /// jump target resolved.
    pub fn compile(ast: &Ast) -> CompileResult<Program> {
        let mut compiler = Compiler::new();
        for stmt in &ast.statements {
            compiler.compile_stmt(stmt)?;
        }
        compiler.program.emit(Op::Halt);
        compiler.program.validate()?;
        Ok(compiler.program)
    }

    // --- Emit helpers ---

    pub(crate) fn emit(&mut self, op: Op) -> usize {
        self.program.emit(op)
    }

    pub(crate) fn emit_jump(&mut self, op: Op) -> usize {
        self.program.emit(op)
    }

    pub(crate) fn patch_jump(&mut self, offset: usize) {
        self.program.patch_jump(offset);
    }

    pub(crate) fn current_offset(&self) -> usize {
        self.program.len()
    }

    // --- Loop bookkeeping ---

    pub(crate) fn begin_loop(&mut self, continue_target: Option<usize>) {
        self.loops.push(LoopRecord {
            continue_target,
            continue_patches: Vec::new(),
            break_patches: Vec::new(),
        });
    }

    /// Pop the innermost loop record and patch its break jumps to the
    /// current offset.
    pub(crate) fn end_loop(&mut self) {
        if let Some(record) = self.loops.pop() {
            for patch in record.break_patches {
                self.program.patch_jump(patch);
            }
        }
    }

    /// Patch the innermost loop's pending continue jumps to the current
    /// offset (the for-loop increment label).
    pub(crate) fn patch_continues_here(&mut self) {
        let target = self.program.len();
        if let Some(record) = self.loops.last_mut() {
            let patches = std::mem::take(&mut record.continue_patches);
            for patch in patches {
                self.program.patch_jump_to(patch, target);
            }
        }
    }

    pub(crate) fn compile_breakout(&mut self, span: Span) -> CompileResult<()> {
        if self.loops.is_empty() {
            return Err(CompileError::BreakOutsideLoop(span));
        }
        let jump = self.emit_jump(Op::Jump(UNPATCHED));
        if let Some(record) = self.loops.last_mut() {
            record.break_patches.push(jump);
        }
        Ok(())
    }

    pub(crate) fn compile_moveon(&mut self, span: Span) -> CompileResult<()> {
        let Some(record) = self.loops.last() else {
            return Err(CompileError::ContinueOutsideLoop(span));
        };
        match record.continue_target {
            Some(target) => {
                self.emit(Op::Jump(target));
            }
            None => {
                let jump = self.emit_jump(Op::Jump(UNPATCHED));
                if let Some(record) = self.loops.last_mut() {
                    record.continue_patches.push(jump);
                }
            }
        }
        Ok(())
    }

    /// A fresh counter binding name for repeat lowering. The angle brackets
    /// keep it unlexable as a user identifier.
    pub(crate) fn fresh_repeat_counter(&mut self) -> String {
        let name = format!("<repeat:{}>", self.repeat_counter);
        self.repeat_counter += 1;
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;
    use crate::interpreter::value::Value;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn compile(source: &str) -> CompileResult<Program> {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        let ast = Parser::new(tokens).parse().unwrap();
        Compiler::compile(&ast)
    }

    #[test]
    fn test_ends_with_halt() {
        let program = compile("1 + 2;").unwrap();
        assert_eq!(program.code.last(), Some(&Op::Halt));
    }

    #[test]
    fn test_literal_lowering() {
        let program = compile("1 + 2;").unwrap();
        assert_eq!(
            program.code,
            vec![
                Op::Push(Value::Int(1)),
                Op::Push(Value::Int(2)),
                Op::Add,
                Op::Halt,
            ]
        );
    }

    #[test]
    fn test_logical_operands_always_emitted() {
        // Both operand sequences precede the logical opcode: no
        // short-circuit branches anywhere in the lowering.
        let program = compile("x or y;").unwrap();
        assert_eq!(
            program.code,
            vec![
                Op::Load("x".to_string()),
                Op::Load("y".to_string()),
                Op::Or,
                Op::Halt,
            ]
        );
    }

    #[test]
    fn test_var_with_cast() {
        let program = compile("var x : integer = 2.5;").unwrap();
        assert_eq!(
            program.code,
            vec![
                Op::Push(Value::Decimal(2.5)),
                Op::Cast("integer".to_string()),
                Op::Store("x".to_string()),
                Op::Halt,
            ]
        );
    }

    #[test]
    fn test_if_else_layout() {
        let program = compile("if true then display 1; else display 2; end").unwrap();
        // cond, JumpIfFalse(else), then..., Jump(end), else..., end, Halt
        assert_eq!(program.code[1], Op::JumpIfFalse(5));
        assert_eq!(program.code[4], Op::Jump(7));
        assert_eq!(program.code.len(), 8);
    }

    #[test]
    fn test_if_with_trailing_return_omits_end_jump() {
        let program = compile("fn f() { if true then return 1; else return 2; end }").unwrap();
        // The then-branch already ends in RETURN; no unconditional jump
        // should separate it from the else-branch.
        let jumps = program
            .code
            .iter()
            .filter(|op| matches!(op, Op::Jump(_)))
            .count();
        // only the jump over the function body
        assert_eq!(jumps, 1);
    }

    #[test]
    fn test_while_jumps_back_to_condition() {
        let program = compile("while true do display 1; end").unwrap();
        assert_eq!(program.code[1], Op::JumpIfFalse(5));
        assert_eq!(program.code[4], Op::Jump(0));
    }

    #[test]
    fn test_breakout_targets_innermost_loop() {
        let program = compile(
            "while true do while true do breakout; end breakout; end",
        )
        .unwrap();
        // Outer: cond@0, inner: cond@2; inner breakout jumps past inner's
        // back-jump, outer breakout past the outer one.
        let breaks: Vec<usize> = program
            .code
            .iter()
            .enumerate()
            .filter_map(|(i, op)| match op {
                Op::Jump(t) if *t > i => Some(*t),
                _ => None,
            })
            .collect();
        assert_eq!(breaks.len(), 2);
        assert!(breaks[0] < breaks[1]);
    }

    #[test]
    fn test_breakout_outside_loop_is_error() {
        assert!(matches!(
            compile("breakout;"),
            Err(CompileError::BreakOutsideLoop(_))
        ));
    }

    #[test]
    fn test_moveon_outside_loop_is_error() {
        assert!(matches!(
            compile("moveon;"),
            Err(CompileError::ContinueOutsideLoop(_))
        ));
    }

    #[test]
    fn test_function_params_stored_in_reverse() {
        let program = compile("fn add(a, b) { return a + b; }").unwrap();
        // Jump over body, then the prologue stores the last-declared
        // parameter first: the caller pushed left-to-right.
        assert_eq!(program.code[1], Op::Store("b".to_string()));
        assert_eq!(program.code[2], Op::Store("a".to_string()));
        let bind = program
            .code
            .iter()
            .find(|op| matches!(op, Op::BindFunction(..)))
            .unwrap();
        assert_eq!(bind, &Op::BindFunction("add".to_string(), 1));
    }

    #[test]
    fn test_property_store_back_only_for_variables() {
        let program = compile("var xs = [1]; xs.PushBack(2);").unwrap();
        let stores = program
            .code
            .iter()
            .filter(|op| matches!(op, Op::Store(name) if name == "xs"))
            .count();
        // one for the declaration, one for the mutating store-back
        assert_eq!(stores, 2);

        let program = compile("[1].PushBack(2);").unwrap();
        assert!(!program.code.iter().any(|op| matches!(op, Op::Store(_))));
    }

    #[test]
    fn test_read_only_property_has_no_store_back() {
        let program = compile("var xs = [1]; xs.Length;").unwrap();
        let stores = program
            .code
            .iter()
            .filter(|op| matches!(op, Op::Store(name) if name == "xs"))
            .count();
        assert_eq!(stores, 1);
    }

    #[test]
    fn test_every_jump_is_resolved() {
        let program = compile(
            r#"
            fn f(n) {
                var total = 0;
                for var i = 0; i < n; i += 1 do
                    if i % 2 == 0 then moveon; end
                    repeat 2 do total += i; end
                end
                return total;
            }
            displayl f(10);
            "#,
        )
        .unwrap();
        assert!(program.validate().is_ok());
    }
}
