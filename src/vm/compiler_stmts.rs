//! Statement lowering.

use crate::ast::{Stmt, StmtKind};
use crate::interpreter::value::Value;

use super::compiler::{CompileResult, Compiler};
use super::opcode::Op;
use super::program::UNPATCHED;

impl Compiler {
    pub(crate) fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            // Expression statements leave their value on the operand stack;
            // that residue is what an implicit function return hands back.
            StmtKind::Expression(expr) => self.compile_expr(expr),

            StmtKind::Var {
                name,
                declared_type,
                initializer,
            } => {
                self.compile_expr(initializer)?;
                if let Some(ty) = declared_type {
                    self.emit(Op::Cast(ty.0.clone()));
                }
                self.emit(Op::Store(name.clone()));
                Ok(())
            }

            StmtKind::Assign { name, value } => {
                self.compile_expr(value)?;
                self.emit(Op::Store(name.clone()));
                Ok(())
            }

            StmtKind::CompoundAssign {
                name,
                operator,
                value,
            } => {
                self.emit(Op::Load(name.clone()));
                self.compile_expr(value)?;
                self.emit(Self::binary_opcode(*operator));
                self.emit(Op::Store(name.clone()));
                Ok(())
            }

            StmtKind::IndexAssign {
                object,
                index,
                value,
            } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.compile_expr(value)?;
                self.emit(Op::SetIndex);
                Ok(())
            }

            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(condition)?;
                let to_else = self.emit_jump(Op::JumpIfFalse(UNPATCHED));

                for stmt in then_branch {
                    self.compile_stmt(stmt)?;
                }

                match else_branch {
                    Some(else_branch) => {
                        // A then-branch that already returned can never fall
                        // through, so the jump over the else-branch is dead.
                        let to_end = if ends_with_return(then_branch) {
                            None
                        } else {
                            Some(self.emit_jump(Op::Jump(UNPATCHED)))
                        };
                        self.patch_jump(to_else);
                        for stmt in else_branch {
                            self.compile_stmt(stmt)?;
                        }
                        if let Some(to_end) = to_end {
                            self.patch_jump(to_end);
                        }
                    }
                    None => {
                        self.patch_jump(to_else);
                    }
                }
                Ok(())
            }

            StmtKind::While { condition, body } => {
                let condition_label = self.current_offset();
                self.compile_expr(condition)?;
                let exit = self.emit_jump(Op::JumpIfFalse(UNPATCHED));

                self.begin_loop(Some(condition_label));
                for stmt in body {
                    self.compile_stmt(stmt)?;
                }
                self.emit(Op::Jump(condition_label));
                self.patch_jump(exit);
                self.end_loop();
                Ok(())
            }

            StmtKind::For {
                init,
                condition,
                increment,
                body,
            } => {
                self.compile_stmt(init)?;
                let condition_label = self.current_offset();
                self.compile_expr(condition)?;
                let exit = self.emit_jump(Op::JumpIfFalse(UNPATCHED));

                // moveon must still run the increment, which is emitted
                // after the body; collect continue patches instead of a
                // fixed target.
                self.begin_loop(None);
                for stmt in body {
                    self.compile_stmt(stmt)?;
                }
                self.patch_continues_here();
                self.compile_stmt(increment)?;
                self.emit(Op::Jump(condition_label));
                self.patch_jump(exit);
                self.end_loop();
                Ok(())
            }

            StmtKind::Repeat { count, body } => {
                let counter = self.fresh_repeat_counter();
                self.compile_expr(count)?;
                self.emit(Op::Store(counter.clone()));

                // Counter check and decrement both sit above the body, so a
                // moveon back to the condition still advances the count.
                let condition_label = self.current_offset();
                self.emit(Op::Load(counter.clone()));
                self.emit(Op::Push(Value::Int(0)));
                self.emit(Op::Greater);
                let exit = self.emit_jump(Op::JumpIfFalse(UNPATCHED));
                self.emit(Op::Load(counter.clone()));
                self.emit(Op::Push(Value::Int(1)));
                self.emit(Op::Subtract);
                self.emit(Op::Store(counter));

                self.begin_loop(Some(condition_label));
                for stmt in body {
                    self.compile_stmt(stmt)?;
                }
                self.emit(Op::Jump(condition_label));
                self.patch_jump(exit);
                self.end_loop();
                Ok(())
            }

            StmtKind::Breakout => self.compile_breakout(stmt.span),
            StmtKind::Moveon => self.compile_moveon(stmt.span),

            StmtKind::Function(decl) => {
                // Definitions are laid out inline: jump over the body, then
                // bind the name to the entry label where control resumes.
                let over = self.emit_jump(Op::Jump(UNPATCHED));
                let entry = self.current_offset();

                // The caller pushed arguments left-to-right, so the
                // prologue pops them in reverse declaration order.
                for param in decl.params.iter().rev() {
                    self.emit(Op::Store(param.clone()));
                }
                for stmt in &decl.body {
                    self.compile_stmt(stmt)?;
                }
                if !ends_with_return(&decl.body) {
                    self.emit(Op::Return);
                }

                self.patch_jump(over);
                self.emit(Op::BindFunction(decl.name.clone(), entry));
                Ok(())
            }

            StmtKind::Return(value) => {
                if let Some(expr) = value {
                    self.compile_expr(expr)?;
                }
                self.emit(Op::Return);
                Ok(())
            }

            StmtKind::Display { value, newline } => {
                self.compile_expr(value)?;
                self.emit(if *newline {
                    Op::DisplayLine
                } else {
                    Op::Display
                });
                Ok(())
            }
        }
    }
}

fn ends_with_return(statements: &[Stmt]) -> bool {
    matches!(
        statements.last(),
        Some(Stmt {
            kind: StmtKind::Return(_),
            ..
        })
    )
}
