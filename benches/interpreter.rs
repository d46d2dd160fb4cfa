//! Benchmarks for the tree-walking interpreter in isolation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nexus_lang::interpreter::Interpreter;
use nexus_lang::lexer::Scanner;
use nexus_lang::parser::Parser;
use std::fs;

fn parse(source: &str) -> nexus_lang::ast::Program {
    let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
    Parser::new(tokens).parse().expect("parser error")
}

fn load_program(name: &str) -> String {
    let path = format!("benches/programs/{}.nx", name);
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("failed to read {}", path))
}

fn bench_parsing(c: &mut Criterion) {
    let source = load_program("fib_recursive");
    c.bench_function("parse_fib", |b| b.iter(|| parse(black_box(&source))));
}

fn bench_interpret(c: &mut Criterion) {
    let source = load_program("fib_recursive");
    let program = parse(&source);

    c.bench_function("interpret_fib", |b| {
        b.iter(|| {
            let mut interpreter = Interpreter::with_captured_output();
            interpreter.interpret(black_box(&program)).unwrap()
        })
    });
}

fn bench_collections(c: &mut Criterion) {
    let source = r#"
        var xs = [];
        for var i = 0; i < 500; i += 1 do
            xs.PushBack(i * 2);
        end
        var total = 0;
        for var i = 0; i < 500; i += 1 do
            total += xs[i];
        end
    "#;
    let program = parse(source);

    c.bench_function("interpret_collections", |b| {
        b.iter(|| {
            let mut interpreter = Interpreter::with_captured_output();
            interpreter.interpret(black_box(&program)).unwrap()
        })
    });
}

criterion_group!(benches, bench_parsing, bench_interpret, bench_collections);
criterion_main!(benches);
