//! Bytecode disassembler for debug output.

use crate::interpreter::value::Value;

use super::opcode::Op;
use super::program::Program;

/// Disassemble a program to a human-readable instruction listing: one line
/// per instruction with its index, opcode name and resolved operands.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    for (offset, op) in program.code.iter().enumerate() {
        out.push_str(&format!("{:04} ", offset));
        disassemble_op(op, &mut out);
        out.push('\n');
    }
    out
}

fn disassemble_op(op: &Op, out: &mut String) {
    match op {
        Op::Push(value) => out.push_str(&format!("PUSH          {}", format_value(value))),
        Op::Load(name) => out.push_str(&format!("LOAD          {}", name)),
        Op::Store(name) => out.push_str(&format!("STORE         {}", name)),
        Op::Jump(target) => out.push_str(&format!("JUMP          {:>5}", target)),
        Op::JumpIfFalse(target) => out.push_str(&format!("JUMP_IF_FALSE {:>5}", target)),
        Op::Call(name) => out.push_str(&format!("CALL          {}", name)),
        Op::BindFunction(name, entry) => {
            out.push_str(&format!("BIND_FN       {} @{}", name, entry));
        }
        Op::MakeArray(count) => out.push_str(&format!("MAKE_ARRAY    {:>5}", count)),
        Op::MakeHash(count) => out.push_str(&format!("MAKE_HASH     {:>5}", count)),
        Op::PropAccess(operation) => out.push_str(&format!("PROP_ACCESS   {}", operation)),
        Op::Cast(target) => out.push_str(&format!("CAST          {}", target)),
        other => out.push_str(other.name()),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("\"{}\"", s),
        other => format!("{}", other),
    }
}
