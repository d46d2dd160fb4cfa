//! Statement parsing.

use crate::ast::*;
use crate::error::ParserError;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn statement(&mut self) -> ParseResult<Stmt> {
        match &self.peek().kind {
            TokenKind::Var => self.var_declaration(),
            TokenKind::Fn => self.function_declaration(),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Repeat => self.repeat_statement(),
            TokenKind::Breakout => {
                let span = self.advance().span;
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::new(StmtKind::Breakout, span))
            }
            TokenKind::Moveon => {
                let span = self.advance().span;
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::new(StmtKind::Moveon, span))
            }
            TokenKind::Return => self.return_statement(),
            TokenKind::Display => self.display_statement(false),
            TokenKind::Displayl => self.display_statement(true),
            _ => self.expression_statement(),
        }
    }

    /// var name [: type] = expr ;
    fn var_declaration(&mut self) -> ParseResult<Stmt> {
        let start_span = self.advance().span;
        let name = self.expect_identifier()?;

        let declared_type = if self.match_token(&TokenKind::Colon) {
            Some(TypeName(self.expect_identifier()?))
        } else {
            None
        };

        self.expect(&TokenKind::Equal)?;
        let initializer = self.expression()?;
        self.expect(&TokenKind::Semicolon)?;

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(
            StmtKind::Var {
                name,
                declared_type,
                initializer,
            },
            span,
        ))
    }

    /// fn name(a, b) { stmts }
    fn function_declaration(&mut self) -> ParseResult<Stmt> {
        let start_span = self.advance().span;
        let name = self.expect_identifier()?;

        self.expect(&TokenKind::LeftParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                params.push(self.expect_identifier()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;

        self.expect(&TokenKind::LeftBrace)?;
        let body = self.parse_block(&[TokenKind::RightBrace])?;
        self.expect(&TokenKind::RightBrace)?;
        self.match_token(&TokenKind::Semicolon);

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(
            StmtKind::Function(FunctionDecl {
                name,
                params,
                body,
                span,
            }),
            span,
        ))
    }

    /// if cond then stmts [else stmts] end
    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.advance().span;
        let condition = self.expression()?;
        self.expect(&TokenKind::Then)?;

        let then_branch = self.parse_block(&[TokenKind::Else, TokenKind::End])?;

        let else_branch = if self.match_token(&TokenKind::Else) {
            Some(self.parse_block(&[TokenKind::End])?)
        } else {
            None
        };

        self.expect(&TokenKind::End)?;
        self.match_token(&TokenKind::Semicolon);

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            span,
        ))
    }

    /// while cond do stmts end
    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.advance().span;
        let condition = self.expression()?;
        self.expect(&TokenKind::Do)?;

        let body = self.parse_block(&[TokenKind::End])?;
        self.expect(&TokenKind::End)?;
        self.match_token(&TokenKind::Semicolon);

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::While { condition, body }, span))
    }

    /// for init; cond; incr do stmts end
    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.advance().span;

        let init = if self.check(&TokenKind::Var) {
            self.var_declaration()?
        } else {
            let stmt = self.assignment_clause()?;
            self.expect(&TokenKind::Semicolon)?;
            stmt
        };

        let condition = self.expression()?;
        self.expect(&TokenKind::Semicolon)?;

        let increment = self.assignment_clause()?;
        self.expect(&TokenKind::Do)?;

        let body = self.parse_block(&[TokenKind::End])?;
        self.expect(&TokenKind::End)?;
        self.match_token(&TokenKind::Semicolon);

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(
            StmtKind::For {
                init: Box::new(init),
                condition,
                increment: Box::new(increment),
                body,
            },
            span,
        ))
    }

    /// repeat count do stmts end
    fn repeat_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.advance().span;
        let count = self.expression()?;
        self.expect(&TokenKind::Do)?;

        let body = self.parse_block(&[TokenKind::End])?;
        self.expect(&TokenKind::End)?;
        self.match_token(&TokenKind::Semicolon);

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Repeat { count, body }, span))
    }

    /// return [expr] ;
    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let start_span = self.advance().span;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Return(value), span))
    }

    /// display expr ; / displayl expr ;
    fn display_statement(&mut self, newline: bool) -> ParseResult<Stmt> {
        let start_span = self.advance().span;
        let value = self.expression()?;
        self.expect(&TokenKind::Semicolon)?;

        let span = start_span.merge(&self.previous_span());
        Ok(Stmt::new(StmtKind::Display { value, newline }, span))
    }

    /// An assignment, compound assignment, indexed assignment, or bare
    /// expression, terminated by a semicolon.
    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let stmt = self.assignment_clause()?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(stmt)
    }

    /// The unterminated form shared by expression statements and for-loop
    /// init/increment clauses.
    fn assignment_clause(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        let start_span = expr.span;

        if self.match_token(&TokenKind::Equal) {
            let value = self.expression()?;
            let span = start_span.merge(&value.span);
            return match expr.kind {
                ExprKind::Variable(name) => Ok(Stmt::new(StmtKind::Assign { name, value }, span)),
                ExprKind::Index { object, index } => Ok(Stmt::new(
                    StmtKind::IndexAssign {
                        object: *object,
                        index: *index,
                        value,
                    },
                    span,
                )),
                _ => Err(ParserError::InvalidAssignmentTarget(start_span)),
            };
        }

        let compound_op = match self.peek().kind {
            TokenKind::PlusEqual => Some(BinaryOp::Add),
            TokenKind::MinusEqual => Some(BinaryOp::Subtract),
            TokenKind::StarEqual => Some(BinaryOp::Multiply),
            TokenKind::SlashEqual => Some(BinaryOp::Divide),
            TokenKind::PercentEqual => Some(BinaryOp::Modulo),
            _ => None,
        };
        if let Some(operator) = compound_op {
            self.advance();
            let value = self.expression()?;
            let span = start_span.merge(&value.span);
            return match expr.kind {
                ExprKind::Variable(name) => Ok(Stmt::new(
                    StmtKind::CompoundAssign {
                        name,
                        operator,
                        value,
                    },
                    span,
                )),
                _ => Err(ParserError::InvalidAssignmentTarget(start_span)),
            };
        }

        Ok(Stmt::new(StmtKind::Expression(expr), start_span))
    }

    /// Parse statements until one of the given terminator tokens is next.
    fn parse_block(&mut self, terminators: &[TokenKind]) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        loop {
            if self.is_at_end() {
                return Err(ParserError::UnexpectedEof(self.current_span()));
            }
            if terminators.iter().any(|t| self.check(t)) {
                break;
            }
            statements.push(self.statement()?);
        }
        Ok(statements)
    }
}
