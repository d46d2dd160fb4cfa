//! Benchmarks comparing the tree-walking interpreter vs the bytecode VM.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nexus_lang::interpreter::Interpreter;
use nexus_lang::lexer::Scanner;
use nexus_lang::parser::Parser;
use nexus_lang::vm::{Compiler, Vm};
use std::fs;

/// Parse source into an AST.
fn parse(source: &str) -> nexus_lang::ast::Program {
    let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
    Parser::new(tokens).parse().expect("parser error")
}

/// Run via tree-walking interpreter.
fn run_treewalk(source: &str) {
    let program = parse(source);
    let mut interpreter = Interpreter::with_captured_output();
    interpreter.interpret(&program).expect("runtime error");
}

/// Run via bytecode VM (compile + execute).
fn run_vm(source: &str) {
    let program = parse(source);
    let compiled = Compiler::compile(&program).expect("compile error");
    let mut vm = Vm::with_captured_output();
    vm.run(&compiled).expect("vm runtime error");
}

fn load_program(name: &str) -> String {
    let path = format!("benches/programs/{}.nx", name);
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("failed to read {}", path))
}

fn fibonacci_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_recursive_comparison");
    let source = load_program("fib_recursive");

    group.bench_function("treewalk", |b| b.iter(|| run_treewalk(black_box(&source))));
    group.bench_function("vm", |b| b.iter(|| run_vm(black_box(&source))));

    group.finish();
}

fn loop_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("loop_sum_comparison");
    let source = load_program("loop_sum");

    group.bench_function("treewalk", |b| b.iter(|| run_treewalk(black_box(&source))));
    group.bench_function("vm", |b| b.iter(|| run_vm(black_box(&source))));

    group.finish();
}

fn fib_scaling_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_scaling_comparison");

    for n in [10, 15, 20].iter() {
        let source = format!(
            r#"
fn fib(n) {{
    if n <= 1 then
        return n;
    end
    return fib(n - 1) + fib(n - 2);
}}
fib({});
"#,
            n
        );

        group.bench_with_input(BenchmarkId::new("treewalk", n), &source, |b, src| {
            b.iter(|| run_treewalk(black_box(src)))
        });
        group.bench_with_input(BenchmarkId::new("vm", n), &source, |b, src| {
            b.iter(|| run_vm(black_box(src)))
        });
    }

    group.finish();
}

/// Benchmark compilation time alone (not execution).
fn compilation_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation_overhead");

    let source = load_program("fib_recursive");
    let program = parse(&source);

    group.bench_function("compile_fib", |b| {
        b.iter(|| Compiler::compile(black_box(&program)).unwrap())
    });

    let source = load_program("loop_sum");
    let program = parse(&source);

    group.bench_function("compile_loop", |b| {
        b.iter(|| Compiler::compile(black_box(&program)).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    fibonacci_comparison,
    loop_comparison,
    fib_scaling_comparison,
    compilation_overhead,
);

criterion_main!(benches);
