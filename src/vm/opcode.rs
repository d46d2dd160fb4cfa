//! Bytecode opcodes for the Nexus VM.

use crate::interpreter::value::Value;

/// A single bytecode instruction.
///
/// Instructions carry at most one small payload: an immediate value, a
/// variable name, an absolute jump target, a collection size, or an
/// operation/typecast name. Jump targets are emitted as `usize::MAX`
/// placeholders and patched to instruction indices before execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // --- Values & variables ---
    /// Push an immediate value onto the stack.
    Push(Value),
    /// Push the named variable, searching frames from the current one
    /// outward to the root.
    Load(String),
    /// Pop the top of stack into the named variable in the current frame.
    Store(String),

    // --- Control flow ---
    /// Unconditional jump to an absolute instruction index.
    Jump(usize),
    /// Pop the top of stack; jump if it is falsy.
    JumpIfFalse(usize),
    /// Call a built-in or user function by name. Arguments were pushed
    /// left-to-right by the caller.
    Call(String),
    /// Pop the current frame and resume at the caller's recorded address.
    Return,
    /// Bind a function name to its body's entry index in the current frame.
    BindFunction(String, usize),
    /// Stop execution.
    Halt,

    // --- Arithmetic ---
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Negate,

    // --- Comparison ---
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // --- Logical ---
    /// Both operands are already on the stack: `and`/`or` never
    /// short-circuit in compiled code.
    And,
    Or,
    Not,

    // --- Bitwise ---
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    ShiftLeft,
    ShiftRight,

    // --- Collections ---
    /// Pop N values (in reverse, restoring source order) into a new array.
    MakeArray(usize),
    /// Pop N key/value pairs into a new hash, preserving first-seen order.
    MakeHash(usize),
    /// Pop index and receiver, push the element.
    GetIndex,
    /// Pop value, index and receiver, write the element.
    SetIndex,

    // --- Polymorphic property access ---
    /// Pop the operation's arguments and the receiver, dispatch on the
    /// receiver's runtime type, push the result.
    PropAccess(String),

    // --- Typecast ---
    /// Pop a value and convert it to the named target type.
    Cast(String),

    // --- I/O ---
    /// Pop and write without a trailing newline.
    Display,
    /// Pop and write with a trailing newline.
    DisplayLine,
    /// Read one line from standard input and push it as text.
    ReadInput,
}

impl Op {
    /// The opcode's mnemonic, as shown by the disassembler.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Push(_) => "PUSH",
            Op::Load(_) => "LOAD",
            Op::Store(_) => "STORE",
            Op::Jump(_) => "JUMP",
            Op::JumpIfFalse(_) => "JUMP_IF_FALSE",
            Op::Call(_) => "CALL",
            Op::Return => "RETURN",
            Op::BindFunction(..) => "BIND_FN",
            Op::Halt => "HALT",
            Op::Add => "ADD",
            Op::Subtract => "SUBTRACT",
            Op::Multiply => "MULTIPLY",
            Op::Divide => "DIVIDE",
            Op::Modulo => "MODULO",
            Op::Power => "POWER",
            Op::Negate => "NEGATE",
            Op::Equal => "EQUAL",
            Op::NotEqual => "NOT_EQUAL",
            Op::Less => "LESS",
            Op::LessEqual => "LESS_EQUAL",
            Op::Greater => "GREATER",
            Op::GreaterEqual => "GREATER_EQUAL",
            Op::And => "AND",
            Op::Or => "OR",
            Op::Not => "NOT",
            Op::BitAnd => "BIT_AND",
            Op::BitOr => "BIT_OR",
            Op::BitXor => "BIT_XOR",
            Op::BitNot => "BIT_NOT",
            Op::ShiftLeft => "SHIFT_LEFT",
            Op::ShiftRight => "SHIFT_RIGHT",
            Op::MakeArray(_) => "MAKE_ARRAY",
            Op::MakeHash(_) => "MAKE_HASH",
            Op::GetIndex => "GET_INDEX",
            Op::SetIndex => "SET_INDEX",
            Op::PropAccess(_) => "PROP_ACCESS",
            Op::Cast(_) => "CAST",
            Op::Display => "DISPLAY",
            Op::DisplayLine => "DISPLAYL",
            Op::ReadInput => "READ_INPUT",
        }
    }
}
