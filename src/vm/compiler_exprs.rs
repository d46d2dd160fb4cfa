//! Expression lowering.

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::interpreter::builtins;
use crate::interpreter::value::Value;

use super::compiler::{CompileResult, Compiler};
use super::opcode::Op;

impl Compiler {
    pub(crate) fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::IntLiteral(n) => {
                self.emit(Op::Push(Value::Int(*n)));
                Ok(())
            }
            ExprKind::DecimalLiteral(n) => {
                self.emit(Op::Push(Value::Decimal(*n)));
                Ok(())
            }
            ExprKind::TextLiteral(s) => {
                self.emit(Op::Push(Value::Text(s.clone())));
                Ok(())
            }
            ExprKind::BoolLiteral(b) => {
                self.emit(Op::Push(Value::Bool(*b)));
                Ok(())
            }

            ExprKind::Variable(name) => {
                self.emit(Op::Load(name.clone()));
                Ok(())
            }

            // Operands lower left-to-right before the operator instruction.
            // This holds for `and`/`or` too: both operands always run, a
            // deliberate departure from the short-circuiting interpreter.
            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(Self::binary_opcode(*operator));
                Ok(())
            }

            ExprKind::Unary { operator, operand } => {
                self.compile_expr(operand)?;
                self.emit(match operator {
                    UnaryOp::Negate => Op::Negate,
                    UnaryOp::Not => Op::Not,
                    UnaryOp::BitNot => Op::BitNot,
                });
                Ok(())
            }

            ExprKind::Grouping(inner) => self.compile_expr(inner),

            ExprKind::Call { name, arguments } => {
                for arg in arguments {
                    self.compile_expr(arg)?;
                }
                self.emit(Op::Call(name.clone()));
                Ok(())
            }

            ExprKind::PropertyCall {
                receiver,
                operation,
                arguments,
            } => {
                self.compile_expr(receiver)?;
                for arg in arguments.iter().rev() {
                    self.compile_expr(arg)?;
                }
                self.emit(Op::PropAccess(operation.clone()));
                // In-place operations push the modified receiver; re-store
                // it when a binding exists to store into.
                if builtins::is_mutating_property(operation) {
                    if let ExprKind::Variable(name) = &receiver.kind {
                        self.emit(Op::Store(name.clone()));
                    }
                }
                Ok(())
            }

            ExprKind::Index { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.emit(Op::GetIndex);
                Ok(())
            }

            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.emit(Op::MakeArray(elements.len()));
                Ok(())
            }

            ExprKind::Hash(pairs) => {
                for (key, value) in pairs {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Op::MakeHash(pairs.len()));
                Ok(())
            }

            ExprKind::Input => {
                self.emit(Op::ReadInput);
                Ok(())
            }
        }
    }

    pub(crate) fn binary_opcode(operator: BinaryOp) -> Op {
        match operator {
            BinaryOp::Add => Op::Add,
            BinaryOp::Subtract => Op::Subtract,
            BinaryOp::Multiply => Op::Multiply,
            BinaryOp::Divide => Op::Divide,
            BinaryOp::Modulo => Op::Modulo,
            BinaryOp::Power => Op::Power,
            BinaryOp::Equal => Op::Equal,
            BinaryOp::NotEqual => Op::NotEqual,
            BinaryOp::Less => Op::Less,
            BinaryOp::LessEqual => Op::LessEqual,
            BinaryOp::Greater => Op::Greater,
            BinaryOp::GreaterEqual => Op::GreaterEqual,
            BinaryOp::And => Op::And,
            BinaryOp::Or => Op::Or,
            BinaryOp::BitAnd => Op::BitAnd,
            BinaryOp::BitOr => Op::BitOr,
            BinaryOp::BitXor => Op::BitXor,
            BinaryOp::ShiftLeft => Op::ShiftLeft,
            BinaryOp::ShiftRight => Op::ShiftRight,
        }
    }
}
