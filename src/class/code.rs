//! Bytecode decoding and encoding.
//!
//! Instructions keep the offset and encoding width they were read with, so rewriting
//! operands never moves code and branch offsets stay valid.

use std::sync::Arc;

use nom::{
    Parser,
    bytes::complete::take,
    multi::count,
    number::complete::{be_i8, be_i16, be_i32, be_u16, u8},
};

use crate::{
    class::{
        constant::{Constant, ConstantPool, MemberKind, MemberRef, NameAndType},
        parser::{PResult, lift},
        writer::ConstantPoolBuilder,
    },
    consts::opcodes::*,
    error::{ClassReadError, ClassWriteError},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: u32,
    /// For `wide` forms this is the widened opcode, the prefix is implied by the operand.
    pub opcode: u8,
    pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    Byte(i8),
    Short(i16),
    ArrayType(u8),
    Local {
        index: u16,
        wide: bool,
    },
    Iinc {
        index: u16,
        delta: i16,
        wide: bool,
    },
    Jump(i16),
    JumpWide(i32),
    Constant(Constant),
    Member(MemberRef),
    InvokeInterface {
        method: MemberRef,
        count: u8,
    },
    InvokeDynamic {
        bootstrap_method: u16,
        name_and_type: NameAndType,
    },
    Class(Arc<str>),
    MultiANewArray {
        class: Arc<str>,
        dimensions: u8,
    },
    TableSwitch {
        default: i32,
        low: i32,
        high: i32,
        offsets: Vec<i32>,
    },
    LookupSwitch {
        default: i32,
        pairs: Vec<(i32, i32)>,
    },
}

impl Instruction {
    /// Encoded size in bytes, including switch padding and the `wide` prefix.
    pub fn len(&self) -> usize {
        match &self.operand {
            Operand::None => 1,
            Operand::Byte(_) | Operand::ArrayType(_) => 2,
            Operand::Short(_) | Operand::Jump(_) | Operand::Member(_) | Operand::Class(_) => 3,
            Operand::Local { wide: false, .. } => 2,
            Operand::Local { wide: true, .. } => 4,
            Operand::Iinc { wide: false, .. } => 3,
            Operand::Iinc { wide: true, .. } => 6,
            Operand::JumpWide(_) => 5,
            Operand::Constant(_) => {
                if self.opcode == LDC {
                    2
                } else {
                    3
                }
            }
            Operand::InvokeInterface { .. } | Operand::InvokeDynamic { .. } => 5,
            Operand::MultiANewArray { .. } => 4,
            Operand::TableSwitch { offsets, .. } => {
                1 + switch_padding(self.offset as usize) + 12 + offsets.len() * 4
            }
            Operand::LookupSwitch { pairs, .. } => {
                1 + switch_padding(self.offset as usize) + 8 + pairs.len() * 8
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

fn switch_padding(opcode_offset: usize) -> usize {
    (4 - (opcode_offset + 1) % 4) % 4
}

pub(crate) fn decode(code: &[u8], pool: &ConstantPool) -> Result<Vec<Instruction>, ClassReadError> {
    let mut instructions = Vec::new();
    let mut input = code;
    while !input.is_empty() {
        let offset = code.len() - input.len();
        let instruction;
        (input, instruction) = decode_instruction(input, offset, pool)?;
        instructions.push(instruction);
    }
    Ok(instructions)
}

/// `ldc2_w` pushes longs, doubles and dynamic constants of those types.
fn takes_two_slots(constant: &Constant) -> bool {
    match constant {
        Constant::Dynamic { name_and_type, .. } => {
            matches!(name_and_type.descriptor.as_ref(), "J" | "D")
        }
        constant => constant.is_wide(),
    }
}

fn expect_member(
    pool: &ConstantPool,
    index: u16,
    allowed: &[MemberKind],
) -> Result<MemberRef, ClassReadError> {
    let member = pool.member_ref(index)?;
    if !allowed.contains(&member.kind) {
        return Err(ClassReadError::UnexpectedConstant {
            index,
            expected: "member reference of the kind this instruction needs",
        });
    }
    Ok(member)
}

fn decode_instruction<'a>(
    input: &'a [u8],
    offset: usize,
    pool: &ConstantPool,
) -> PResult<'a, Instruction> {
    let (mut input, mut opcode) = u8(input)?;
    let operand = match opcode {
        BIPUSH => {
            let value;
            (input, value) = be_i8(input)?;
            Operand::Byte(value)
        }
        SIPUSH => {
            let value;
            (input, value) = be_i16(input)?;
            Operand::Short(value)
        }
        LDC => {
            let index;
            (input, index) = u8(input)?;
            let constant = lift(pool.loadable(index as u16))?;
            if takes_two_slots(&constant) {
                return lift(Err(ClassReadError::UnexpectedConstant {
                    index: index as u16,
                    expected: "single slot constant",
                }));
            }
            Operand::Constant(constant)
        }
        LDC_W | LDC2_W => {
            let index;
            (input, index) = be_u16(input)?;
            let constant = lift(pool.loadable(index))?;
            if takes_two_slots(&constant) != (opcode == LDC2_W) {
                return lift(Err(ClassReadError::UnexpectedConstant {
                    index,
                    expected: "constant matching the ldc width",
                }));
            }
            Operand::Constant(constant)
        }
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
            let index;
            (input, index) = u8(input)?;
            Operand::Local {
                index: index as u16,
                wide: false,
            }
        }
        IINC => {
            let (index, delta);
            (input, index) = u8(input)?;
            (input, delta) = be_i8(input)?;
            Operand::Iinc {
                index: index as u16,
                delta: delta as i16,
                wide: false,
            }
        }
        IFEQ..=JSR | IFNULL | IFNONNULL => {
            let jump;
            (input, jump) = be_i16(input)?;
            Operand::Jump(jump)
        }
        GOTO_W | JSR_W => {
            let jump;
            (input, jump) = be_i32(input)?;
            Operand::JumpWide(jump)
        }
        TABLESWITCH => {
            (input, _) = take(switch_padding(offset))(input)?;
            let (default, low, high);
            (input, default) = be_i32(input)?;
            (input, low) = be_i32(input)?;
            (input, high) = be_i32(input)?;
            if high < low {
                return lift(Err(ClassReadError::Syntax(format!(
                    "tableswitch at {offset} has low {low} above high {high}"
                ))));
            }
            let offsets;
            (input, offsets) = count(be_i32, (high as i64 - low as i64 + 1) as usize).parse(input)?;
            Operand::TableSwitch {
                default,
                low,
                high,
                offsets,
            }
        }
        LOOKUPSWITCH => {
            (input, _) = take(switch_padding(offset))(input)?;
            let (default, npairs);
            (input, default) = be_i32(input)?;
            (input, npairs) = be_i32(input)?;
            if npairs < 0 {
                return lift(Err(ClassReadError::Syntax(format!(
                    "lookupswitch at {offset} has {npairs} pairs"
                ))));
            }
            let pairs;
            (input, pairs) = count((be_i32, be_i32), npairs as usize).parse(input)?;
            Operand::LookupSwitch { default, pairs }
        }
        GETSTATIC..=PUTFIELD => {
            let index;
            (input, index) = be_u16(input)?;
            Operand::Member(lift(expect_member(pool, index, &[MemberKind::Field]))?)
        }
        INVOKEVIRTUAL => {
            let index;
            (input, index) = be_u16(input)?;
            Operand::Member(lift(expect_member(pool, index, &[MemberKind::Method]))?)
        }
        INVOKESPECIAL | INVOKESTATIC => {
            let index;
            (input, index) = be_u16(input)?;
            Operand::Member(lift(expect_member(
                pool,
                index,
                &[MemberKind::Method, MemberKind::InterfaceMethod],
            ))?)
        }
        INVOKEINTERFACE => {
            let (index, count);
            (input, index) = be_u16(input)?;
            (input, count) = u8(input)?;
            (input, _) = u8(input)?;
            Operand::InvokeInterface {
                method: lift(expect_member(pool, index, &[MemberKind::InterfaceMethod]))?,
                count,
            }
        }
        INVOKEDYNAMIC => {
            let index;
            (input, index) = be_u16(input)?;
            (input, _) = be_u16(input)?;
            let Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } = lift(pool.constant(index))?
            else {
                return lift(Err(ClassReadError::UnexpectedConstant {
                    index,
                    expected: "InvokeDynamic",
                }));
            };
            Operand::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            }
        }
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
            let index;
            (input, index) = be_u16(input)?;
            Operand::Class(lift(pool.class_name(index))?)
        }
        NEWARRAY => {
            let array_type;
            (input, array_type) = u8(input)?;
            Operand::ArrayType(array_type)
        }
        MULTIANEWARRAY => {
            let (index, dimensions);
            (input, index) = be_u16(input)?;
            (input, dimensions) = u8(input)?;
            Operand::MultiANewArray {
                class: lift(pool.class_name(index))?,
                dimensions,
            }
        }
        WIDE => {
            (input, opcode) = u8(input)?;
            match opcode {
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
                    let index;
                    (input, index) = be_u16(input)?;
                    Operand::Local { index, wide: true }
                }
                IINC => {
                    let (index, delta);
                    (input, index) = be_u16(input)?;
                    (input, delta) = be_i16(input)?;
                    Operand::Iinc {
                        index,
                        delta,
                        wide: true,
                    }
                }
                _ => {
                    return lift(Err(ClassReadError::InvalidOpcode {
                        opcode,
                        offset: offset + 1,
                    }));
                }
            }
        }
        0x00..=JSR_W => Operand::None,
        _ => return lift(Err(ClassReadError::InvalidOpcode { opcode, offset })),
    };
    Ok((
        input,
        Instruction {
            offset: offset as u32,
            opcode,
            operand,
        },
    ))
}

pub(crate) fn encode(
    instructions: &[Instruction],
    cp: &mut ConstantPoolBuilder,
) -> Result<Vec<u8>, ClassWriteError> {
    let mut code = Vec::new();
    for instruction in instructions {
        if instruction.offset as usize != code.len() {
            return Err(ClassWriteError::InstructionOffset {
                recorded: instruction.offset,
                actual: code.len(),
            });
        }
        encode_instruction(&mut code, instruction, cp)?;
    }
    Ok(code)
}

fn encode_instruction(
    code: &mut Vec<u8>,
    instruction: &Instruction,
    cp: &mut ConstantPoolBuilder,
) -> Result<(), ClassWriteError> {
    let opcode = instruction.opcode;
    match &instruction.operand {
        Operand::None => code.push(opcode),
        Operand::Byte(value) => {
            code.push(opcode);
            code.push(*value as u8);
        }
        Operand::Short(value) => {
            code.push(opcode);
            code.extend_from_slice(&value.to_be_bytes());
        }
        Operand::ArrayType(array_type) => {
            code.push(opcode);
            code.push(*array_type);
        }
        Operand::Local { index, wide: true } => {
            code.push(WIDE);
            code.push(opcode);
            code.extend_from_slice(&index.to_be_bytes());
        }
        Operand::Local { index, wide: false } => {
            let index = u8::try_from(*index)
                .map_err(|_| ClassWriteError::OperandOutOfRange("local variable index"))?;
            code.push(opcode);
            code.push(index);
        }
        Operand::Iinc {
            index,
            delta,
            wide: true,
        } => {
            code.push(WIDE);
            code.push(opcode);
            code.extend_from_slice(&index.to_be_bytes());
            code.extend_from_slice(&delta.to_be_bytes());
        }
        Operand::Iinc {
            index,
            delta,
            wide: false,
        } => {
            let index =
                u8::try_from(*index).map_err(|_| ClassWriteError::OperandOutOfRange("iinc"))?;
            let delta =
                i8::try_from(*delta).map_err(|_| ClassWriteError::OperandOutOfRange("iinc"))?;
            code.push(opcode);
            code.push(index);
            code.push(delta as u8);
        }
        Operand::Jump(jump) => {
            code.push(opcode);
            code.extend_from_slice(&jump.to_be_bytes());
        }
        Operand::JumpWide(jump) => {
            code.push(opcode);
            code.extend_from_slice(&jump.to_be_bytes());
        }
        Operand::Constant(constant) => {
            let index = cp.put(constant)?;
            code.push(opcode);
            if opcode == LDC {
                let index =
                    u8::try_from(index).map_err(|_| ClassWriteError::LdcIndexOverflow(index))?;
                code.push(index);
            } else {
                code.extend_from_slice(&index.to_be_bytes());
            }
        }
        Operand::Member(member) => {
            let index = cp.member(member)?;
            code.push(opcode);
            code.extend_from_slice(&index.to_be_bytes());
        }
        Operand::InvokeInterface { method, count } => {
            let index = cp.member(method)?;
            code.push(opcode);
            code.extend_from_slice(&index.to_be_bytes());
            code.push(*count);
            code.push(0);
        }
        Operand::InvokeDynamic {
            bootstrap_method,
            name_and_type,
        } => {
            let index = cp.put(&Constant::InvokeDynamic {
                bootstrap_method: *bootstrap_method,
                name_and_type: name_and_type.clone(),
            })?;
            code.push(opcode);
            code.extend_from_slice(&index.to_be_bytes());
            code.extend_from_slice(&[0, 0]);
        }
        Operand::Class(name) => {
            let index = cp.class(name)?;
            code.push(opcode);
            code.extend_from_slice(&index.to_be_bytes());
        }
        Operand::MultiANewArray { class, dimensions } => {
            let index = cp.class(class)?;
            code.push(opcode);
            code.extend_from_slice(&index.to_be_bytes());
            code.push(*dimensions);
        }
        Operand::TableSwitch {
            default,
            low,
            high,
            offsets,
        } => {
            let padding = switch_padding(code.len());
            code.push(opcode);
            code.extend(std::iter::repeat_n(0, padding));
            for value in [*default, *low, *high].iter().chain(offsets) {
                code.extend_from_slice(&value.to_be_bytes());
            }
        }
        Operand::LookupSwitch { default, pairs } => {
            let padding = switch_padding(code.len());
            code.push(opcode);
            code.extend(std::iter::repeat_n(0, padding));
            code.extend_from_slice(&default.to_be_bytes());
            code.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
            for (key, jump) in pairs {
                code.extend_from_slice(&key.to_be_bytes());
                code.extend_from_slice(&jump.to_be_bytes());
            }
        }
    }
    Ok(())
}
