//! Binary bytecode encoding.
//!
//! The wire format is tag-then-payload: each instruction serializes as a
//! one-byte opcode followed by fixed-width little-endian operand fields
//! (`u32` registers and counts, `i32` jump offsets, `f64` numbers,
//! `u32`-length-prefixed UTF-8 for strings and atoms). This module is the
//! producer side only; the VM ships the decoder.
//!
//! Encoding happens into an in-memory buffer: the bytes land in a package
//! archive, not on a raw stream, so there is no I/O failure mode here and
//! the only error is a value that does not fit the format.

use crate::error::{Error, Result};
use crate::function::{Function, FunctionKind};
use crate::instruction::{Instruction, ObjectInitArg};
use crate::value::{PropertyDescriptor, Value};

/// Magic bytes introducing serialized bytecode
pub const BYTECODE_MAGIC: &[u8] = b"PULBC\x01\x00\x00";

/// Version of the bytecode format
pub const BYTECODE_VERSION: u32 = 1;

/// Opcode tags. Gaps are reserved.
#[repr(u8)]
enum Opcode {
    LoadConst = 0x01,
    Move = 0x02,
    Add = 0x03,
    Sub = 0x04,
    Mul = 0x05,
    Div = 0x06,
    GetProp = 0x07,
    SetProp = 0x08,
    Call = 0x09,
    Return = 0x0A,
    Jump = 0x0B,
    JumpIfTrue = 0x0C,
    JumpIfFalse = 0x0D,
    Spawn = 0x0E,
    Send = 0x0F,
    Receive = 0x10,
    Link = 0x11,
    // 0x12 reserved
    Yield = 0x13,
    Nop = 0x14,
    Equal = 0x15,
    NotEqual = 0x16,
    LessThan = 0x17,
    LessEqual = 0x18,
    GreaterThan = 0x19,
    GreaterEqual = 0x1A,
    And = 0x1B,
    Or = 0x1C,
    Not = 0x1D,
    ReceiveWithTimeout = 0x1E,
    ObjectInit = 0x1F,
}

/// Value type tags. 0x0A is reserved.
#[repr(u8)]
enum ValueTag {
    Number = 0x01,
    Boolean = 0x02,
    Atom = 0x03,
    Unit = 0x04,
    Undefined = 0x05,
    Array = 0x06,
    Object = 0x07,
    FunctionRef = 0x08,
    String = 0x09,
    Tuple = 0x0B,
}

/// Accumulates encoded bytecode in memory.
#[derive(Debug, Default)]
pub struct BytecodeWriter {
    buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the writer, yielding the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn write_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Length and count fields are 32-bit on the wire.
    fn write_len(&mut self, len: usize) -> Result<()> {
        let value = u32::try_from(len)
            .map_err(|_| Error::Encoding(format!("length {len} exceeds the 32-bit count field")))?;
        self.write_u32(value);
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_len(s.len())?;
        self.buffer.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn write_flag(&mut self, flag: bool) {
        self.write_u8(if flag { 1 } else { 0 });
    }

    /// Encodes a constant value.
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Number(n) => {
                self.write_u8(ValueTag::Number as u8);
                self.write_f64(*n);
            }
            Value::Boolean(b) => {
                self.write_u8(ValueTag::Boolean as u8);
                self.write_flag(*b);
            }
            Value::Atom(s) => {
                self.write_u8(ValueTag::Atom as u8);
                self.write_string(s)?;
            }
            Value::String(s) => {
                self.write_u8(ValueTag::String as u8);
                self.write_string(s)?;
            }
            Value::Unit => self.write_u8(ValueTag::Unit as u8),
            Value::Undefined => self.write_u8(ValueTag::Undefined as u8),
            Value::Array(items) => {
                self.write_u8(ValueTag::Array as u8);
                self.write_len(items.len())?;
                for item in items {
                    self.write_value(item)?;
                }
            }
            Value::Tuple(items) => {
                self.write_u8(ValueTag::Tuple as u8);
                self.write_len(items.len())?;
                for item in items {
                    self.write_value(item)?;
                }
            }
            Value::Object(properties) => {
                self.write_u8(ValueTag::Object as u8);
                self.write_len(properties.len())?;
                for (key, descriptor) in properties {
                    self.write_string(key)?;
                    self.write_property(descriptor)?;
                }
            }
            Value::FunctionRef(name) => {
                self.write_u8(ValueTag::FunctionRef as u8);
                self.write_string(name)?;
            }
        }
        Ok(())
    }

    fn write_property(&mut self, descriptor: &PropertyDescriptor) -> Result<()> {
        self.write_value(&descriptor.value)?;
        self.write_flag(descriptor.writable);
        self.write_flag(descriptor.enumerable);
        self.write_flag(descriptor.configurable);
        Ok(())
    }

    /// Encodes one instruction.
    pub fn write_instruction(&mut self, instruction: &Instruction) -> Result<()> {
        match instruction {
            Instruction::LoadConst(dst, value) => {
                self.write_u8(Opcode::LoadConst as u8);
                self.write_u32(*dst);
                self.write_value(value)?;
            }
            Instruction::ObjectInit(dst, kvs) => {
                self.write_u8(Opcode::ObjectInit as u8);
                self.write_u32(*dst);
                self.write_len(kvs.len())?;
                for (key, arg) in kvs {
                    self.write_string(key)?;
                    match arg {
                        ObjectInitArg::Register(reg) => {
                            self.write_u8(0);
                            self.write_u32(*reg);
                        }
                        ObjectInitArg::Value(value) => {
                            self.write_u8(1);
                            self.write_value(value)?;
                        }
                        ObjectInitArg::RegisterWithFlags(reg, w, e, c) => {
                            self.write_u8(2);
                            self.write_u32(*reg);
                            self.write_flag(*w);
                            self.write_flag(*e);
                            self.write_flag(*c);
                        }
                        ObjectInitArg::ValueWithFlags(value, w, e, c) => {
                            self.write_u8(3);
                            self.write_value(value)?;
                            self.write_flag(*w);
                            self.write_flag(*e);
                            self.write_flag(*c);
                        }
                    }
                }
            }
            Instruction::Move(dst, src) => {
                self.write_u8(Opcode::Move as u8);
                self.write_u32(*dst);
                self.write_u32(*src);
            }
            Instruction::Add(dst, a, b) => self.write_binop(Opcode::Add, *dst, *a, *b),
            Instruction::Sub(dst, a, b) => self.write_binop(Opcode::Sub, *dst, *a, *b),
            Instruction::Mul(dst, a, b) => self.write_binop(Opcode::Mul, *dst, *a, *b),
            Instruction::Div(dst, a, b) => self.write_binop(Opcode::Div, *dst, *a, *b),
            Instruction::GetProp(dst, obj, key) => self.write_binop(Opcode::GetProp, *dst, *obj, *key),
            Instruction::SetProp(obj, key, value) => {
                self.write_binop(Opcode::SetProp, *obj, *key, *value)
            }
            Instruction::Call(dst, func, args) => {
                self.write_u8(Opcode::Call as u8);
                self.write_u32(*dst);
                self.write_u32(*func);
                self.write_len(args.len())?;
                for arg in args {
                    self.write_u32(*arg);
                }
            }
            Instruction::Return(reg) => {
                self.write_u8(Opcode::Return as u8);
                self.write_u32(*reg);
            }
            Instruction::Jump(offset) => {
                self.write_u8(Opcode::Jump as u8);
                self.write_i32(*offset);
            }
            Instruction::JumpIfTrue(cond, offset) => {
                self.write_u8(Opcode::JumpIfTrue as u8);
                self.write_u32(*cond);
                self.write_i32(*offset);
            }
            Instruction::JumpIfFalse(cond, offset) => {
                self.write_u8(Opcode::JumpIfFalse as u8);
                self.write_u32(*cond);
                self.write_i32(*offset);
            }
            Instruction::Spawn(dst, func, args) => {
                self.write_u8(Opcode::Spawn as u8);
                self.write_u32(*dst);
                self.write_u32(*func);
                self.write_len(args.len())?;
                for arg in args {
                    self.write_u32(*arg);
                }
            }
            Instruction::Send(proc, msg) => {
                self.write_u8(Opcode::Send as u8);
                self.write_u32(*proc);
                self.write_u32(*msg);
            }
            Instruction::Receive(dst) => {
                self.write_u8(Opcode::Receive as u8);
                self.write_u32(*dst);
            }
            Instruction::ReceiveWithTimeout(dst, timeout, result) => {
                self.write_binop(Opcode::ReceiveWithTimeout, *dst, *timeout, *result)
            }
            Instruction::Link(proc, handle) => {
                self.write_u8(Opcode::Link as u8);
                self.write_u32(*proc);
                self.write_u32(*handle);
            }
            Instruction::Yield => self.write_u8(Opcode::Yield as u8),
            Instruction::Nop => self.write_u8(Opcode::Nop as u8),
            Instruction::Equal(dst, a, b) => self.write_binop(Opcode::Equal, *dst, *a, *b),
            Instruction::NotEqual(dst, a, b) => self.write_binop(Opcode::NotEqual, *dst, *a, *b),
            Instruction::LessThan(dst, a, b) => self.write_binop(Opcode::LessThan, *dst, *a, *b),
            Instruction::LessEqual(dst, a, b) => self.write_binop(Opcode::LessEqual, *dst, *a, *b),
            Instruction::GreaterThan(dst, a, b) => {
                self.write_binop(Opcode::GreaterThan, *dst, *a, *b)
            }
            Instruction::GreaterEqual(dst, a, b) => {
                self.write_binop(Opcode::GreaterEqual, *dst, *a, *b)
            }
            Instruction::And(dst, a, b) => self.write_binop(Opcode::And, *dst, *a, *b),
            Instruction::Or(dst, a, b) => self.write_binop(Opcode::Or, *dst, *a, *b),
            Instruction::Not(dst, src) => {
                self.write_u8(Opcode::Not as u8);
                self.write_u32(*dst);
                self.write_u32(*src);
            }
        }
        Ok(())
    }

    fn write_binop(&mut self, opcode: Opcode, a: u32, b: u32, c: u32) {
        self.write_u8(opcode as u8);
        self.write_u32(a);
        self.write_u32(b);
        self.write_u32(c);
    }

    fn write_function_body(&mut self, function: &Function) -> Result<()> {
        match &function.name {
            Some(name) => {
                self.write_u8(1);
                self.write_string(name)?;
            }
            None => self.write_u8(0),
        }
        self.write_u32(function.arity);
        self.write_u32(function.extra_regs);
        match &function.kind {
            FunctionKind::Bytecode { instructions } => {
                self.write_u8(0);
                self.write_len(instructions.len())?;
                for instruction in instructions {
                    self.write_instruction(instruction)?;
                }
            }
            FunctionKind::Ffi { symbol } => {
                self.write_u8(1);
                self.write_string(symbol)?;
            }
        }
        Ok(())
    }
}

/// Encodes a bare instruction sequence with magic and version framing.
pub fn serialize_bytecode(instructions: &[Instruction]) -> Result<Vec<u8>> {
    let mut writer = BytecodeWriter::new();
    writer.buffer.extend_from_slice(BYTECODE_MAGIC);
    writer.write_u32(BYTECODE_VERSION);
    writer.write_len(instructions.len())?;
    for instruction in instructions {
        writer.write_instruction(instruction)?;
    }
    Ok(writer.into_bytes())
}

/// Encodes a single function, unframed: name flag, arity, extra register
/// count, kind tag, then the instructions.
pub fn serialize_function(function: &Function) -> Result<Vec<u8>> {
    let mut writer = BytecodeWriter::new();
    writer.write_function_body(function)?;
    Ok(writer.into_bytes())
}

/// Encodes several functions with magic, version and count framing.
pub fn serialize_functions(functions: &[Function]) -> Result<Vec<u8>> {
    let mut writer = BytecodeWriter::new();
    writer.buffer.extend_from_slice(BYTECODE_MAGIC);
    writer.write_u32(BYTECODE_VERSION);
    writer.write_len(functions.len())?;
    for function in functions {
        writer.write_function_body(function)?;
    }
    Ok(writer.into_bytes())
}
