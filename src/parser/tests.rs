//! Parser tests.

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn parse(source: &str) -> Program {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn parse_expr(source: &str) -> Expr {
        let program = parse(source);
        match program.statements.into_iter().next().unwrap().kind {
            StmtKind::Expression(expr) => expr,
            _ => panic!("Expected expression statement"),
        }
    }

    #[test]
    fn test_binary_expr() {
        let expr = parse_expr("1 + 2;");
        match expr.kind {
            ExprKind::Binary { operator, .. } => assert_eq!(operator, BinaryOp::Add),
            _ => panic!("Expected binary expression"),
        }
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 should parse as 1 + (2 * 3)
        let expr = parse_expr("1 + 2 * 3;");
        match expr.kind {
            ExprKind::Binary {
                operator: BinaryOp::Add,
                right,
                ..
            } => match right.kind {
                ExprKind::Binary {
                    operator: BinaryOp::Multiply,
                    ..
                } => {}
                _ => panic!("Expected multiply on right"),
            },
            _ => panic!("Expected add at top"),
        }
    }

    #[test]
    fn test_power_right_associative() {
        // 2 ** 3 ** 2 should parse as 2 ** (3 ** 2)
        let expr = parse_expr("2 ** 3 ** 2;");
        match expr.kind {
            ExprKind::Binary {
                operator: BinaryOp::Power,
                right,
                ..
            } => match right.kind {
                ExprKind::Binary {
                    operator: BinaryOp::Power,
                    ..
                } => {}
                _ => panic!("Expected power on right"),
            },
            _ => panic!("Expected power at top"),
        }
    }

    #[test]
    fn test_call() {
        let expr = parse_expr("foo(1, 2);");
        match expr.kind {
            ExprKind::Call { name, arguments } => {
                assert_eq!(name, "foo");
                assert_eq!(arguments.len(), 2);
            }
            _ => panic!("Expected call expression"),
        }
    }

    #[test]
    fn test_property_call_with_args() {
        let expr = parse_expr("xs.PushBack(3);");
        match expr.kind {
            ExprKind::PropertyCall {
                operation,
                arguments,
                ..
            } => {
                assert_eq!(operation, "PushBack");
                assert_eq!(arguments.len(), 1);
            }
            _ => panic!("Expected property call"),
        }
    }

    #[test]
    fn test_property_access_bare() {
        let expr = parse_expr("xs.Length;");
        match expr.kind {
            ExprKind::PropertyCall {
                operation,
                arguments,
                ..
            } => {
                assert_eq!(operation, "Length");
                assert!(arguments.is_empty());
            }
            _ => panic!("Expected property access"),
        }
    }

    #[test]
    fn test_var_with_declared_type() {
        let program = parse("var x : integer = 5;");
        match &program.statements[0].kind {
            StmtKind::Var {
                name,
                declared_type,
                ..
            } => {
                assert_eq!(name, "x");
                assert_eq!(declared_type, &Some(TypeName("integer".to_string())));
            }
            _ => panic!("Expected var declaration"),
        }
    }

    #[test]
    fn test_if_then_else_end() {
        let program = parse("if x < 1 then displayl x; else displayl 0; end");
        match &program.statements[0].kind {
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                assert_eq!(then_branch.len(), 1);
                assert_eq!(else_branch.as_ref().unwrap().len(), 1);
            }
            _ => panic!("Expected if statement"),
        }
    }

    #[test]
    fn test_for_loop() {
        let program = parse("for var i = 0; i < 10; i += 1 do displayl i; end");
        match &program.statements[0].kind {
            StmtKind::For {
                init,
                increment,
                body,
                ..
            } => {
                assert!(matches!(init.kind, StmtKind::Var { .. }));
                assert!(matches!(increment.kind, StmtKind::CompoundAssign { .. }));
                assert_eq!(body.len(), 1);
            }
            _ => panic!("Expected for statement"),
        }
    }

    #[test]
    fn test_repeat_loop() {
        let program = parse("repeat 3 do display \"x\"; end");
        assert!(matches!(
            program.statements[0].kind,
            StmtKind::Repeat { .. }
        ));
    }

    #[test]
    fn test_function_declaration() {
        let program = parse("fn add(a, b) { return a + b; }");
        match &program.statements[0].kind {
            StmtKind::Function(decl) => {
                assert_eq!(decl.name, "add");
                assert_eq!(decl.params, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(decl.body.len(), 1);
            }
            _ => panic!("Expected function declaration"),
        }
    }

    #[test]
    fn test_index_assignment() {
        let program = parse("xs[0] = 5;");
        assert!(matches!(
            program.statements[0].kind,
            StmtKind::IndexAssign { .. }
        ));
    }

    #[test]
    fn test_hash_literal() {
        let expr = parse_expr("{\"a\": 1, \"b\": 2};");
        match expr.kind {
            ExprKind::Hash(pairs) => assert_eq!(pairs.len(), 2),
            _ => panic!("Expected hash literal"),
        }
    }

    #[test]
    fn test_invalid_assignment_target() {
        let tokens = Scanner::new("1 + 2 = 3;").scan_tokens().unwrap();
        assert!(Parser::new(tokens).parse().is_err());
    }

    #[test]
    fn test_missing_end() {
        let tokens = Scanner::new("while true do displayl 1;")
            .scan_tokens()
            .unwrap();
        assert!(Parser::new(tokens).parse().is_err());
    }
}
