//! Fixture tooling: a small text assembler that produces class file bytes, and a
//! disassembler that renders class files back into comparable text.
//!
//! ```text
//! class public super a/A extends java/lang/Object implements a/I
//! source A.java
//! field private count I
//! field private items Ljava/util/List; signature Ljava/util/List<La/B;>;
//! method public run ()V
//!   aload_0
//!   invokevirtual a/B value ()I
//!   pop
//!   return
//!   local 0 this La/A;
//!   localtype 1 items Ljava/util/List<La/B;>;
//! end
//! ```
#![allow(dead_code)]

use std::{fmt::Write, sync::Arc};

use jvm_remap::{
    ClassModel,
    class::{
        Attribute, Constant, FieldModel, Instruction, MemberKind, MemberRef, MethodModel, Operand,
        attributes::{Code, LocalVariable},
    },
    consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag},
};

const MNEMONICS: &[(&str, u8)] = &[
    ("aconst_null", 0x01),
    ("iconst_0", 0x03),
    ("iconst_1", 0x04),
    ("bipush", 0x10),
    ("ldc", 0x12),
    ("iload", 0x15),
    ("aload", 0x19),
    ("iload_1", 0x1b),
    ("aload_0", 0x2a),
    ("aload_1", 0x2b),
    ("istore", 0x36),
    ("astore", 0x3a),
    ("astore_1", 0x4c),
    ("pop", 0x57),
    ("dup", 0x59),
    ("iadd", 0x60),
    ("ireturn", 0xac),
    ("areturn", 0xb0),
    ("return", 0xb1),
    ("getstatic", 0xb2),
    ("putstatic", 0xb3),
    ("getfield", 0xb4),
    ("putfield", 0xb5),
    ("invokevirtual", 0xb6),
    ("invokespecial", 0xb7),
    ("invokestatic", 0xb8),
    ("invokeinterface", 0xb9),
    ("new", 0xbb),
    ("anewarray", 0xbd),
    ("athrow", 0xbf),
    ("checkcast", 0xc0),
    ("instanceof", 0xc1),
];

fn opcode(mnemonic: &str) -> u8 {
    MNEMONICS
        .iter()
        .find(|(name, _)| *name == mnemonic)
        .map(|(_, opcode)| *opcode)
        .unwrap_or_else(|| panic!("unknown mnemonic {mnemonic}"))
}

fn mnemonic(opcode: u8) -> String {
    MNEMONICS
        .iter()
        .find(|(_, op)| *op == opcode)
        .map_or_else(|| format!("op_{opcode:02x}"), |(name, _)| name.to_string())
}

fn class_flags(word: &str) -> Option<ClassAccessFlag> {
    Some(match word {
        "public" => ClassAccessFlag::PUBLIC,
        "final" => ClassAccessFlag::FINAL,
        "super" => ClassAccessFlag::SUPER,
        "interface" => ClassAccessFlag::INTERFACE,
        "abstract" => ClassAccessFlag::ABSTRACT,
        "annotation" => ClassAccessFlag::ANNOTATION,
        "enum" => ClassAccessFlag::ENUM,
        "module" => ClassAccessFlag::MODULE,
        _ => return None,
    })
}

fn field_flags(word: &str) -> Option<FieldAccessFlag> {
    Some(match word {
        "public" => FieldAccessFlag::PUBLIC,
        "private" => FieldAccessFlag::PRIVATE,
        "protected" => FieldAccessFlag::PROTECTED,
        "static" => FieldAccessFlag::STATIC,
        "final" => FieldAccessFlag::FINAL,
        _ => return None,
    })
}

fn method_flags(word: &str) -> Option<MethodAccessFlag> {
    Some(match word {
        "public" => MethodAccessFlag::PUBLIC,
        "private" => MethodAccessFlag::PRIVATE,
        "protected" => MethodAccessFlag::PROTECTED,
        "static" => MethodAccessFlag::STATIC,
        "final" => MethodAccessFlag::FINAL,
        "abstract" => MethodAccessFlag::ABSTRACT,
        "synchronized" => MethodAccessFlag::SYNCHRONIZED,
        _ => return None,
    })
}

/// Splits leading flag words off a token list.
fn split_flags<'t, F: Copy + std::ops::BitOr<Output = F>>(
    tokens: &'t [&'t str],
    empty: F,
    lookup: impl Fn(&str) -> Option<F>,
) -> (F, &'t [&'t str]) {
    let mut flags = empty;
    let mut rest = tokens;
    while let Some((first, tail)) = rest.split_first() {
        match lookup(first) {
            Some(flag) => flags = flags | flag,
            None => break,
        }
        rest = tail;
    }
    (flags, rest)
}

#[derive(Default)]
struct MethodBody {
    instructions: Vec<Instruction>,
    locals: Vec<LocalVariable>,
    local_types: Vec<LocalVariable>,
}

fn local(tokens: &[&str]) -> LocalVariable {
    LocalVariable {
        start_pc: 0,
        length: 0,
        name: tokens[2].into(),
        descriptor: tokens[3].into(),
        index: tokens[1].parse().expect("local index"),
    }
}

/// Assembles a fixture into a model.
pub fn assemble_model(source: &str) -> ClassModel {
    let mut class: Option<ClassModel> = None;
    let mut method: Option<(MethodModel, MethodBody)> = None;
    let mut offset = 0u32;

    for line in source.lines() {
        let line = line.split("//").next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if let Some((current, body)) = method.as_mut() {
            match tokens[0] {
                "end" => {
                    let (mut current, body) = method.take().unwrap();
                    if !body.instructions.is_empty() {
                        let mut attributes = vec![];
                        for (table, locals) in [(false, body.locals), (true, body.local_types)] {
                            if locals.is_empty() {
                                continue;
                            }
                            let locals = locals
                                .into_iter()
                                .map(|local| LocalVariable {
                                    length: offset as u16,
                                    ..local
                                })
                                .collect();
                            attributes.push(if table {
                                Attribute::LocalVariableTypeTable(locals)
                            } else {
                                Attribute::LocalVariableTable(locals)
                            });
                        }
                        current.attributes.insert(
                            0,
                            Attribute::Code(Code {
                                max_stack: 8,
                                max_locals: 8,
                                instructions: body.instructions,
                                exception_table: vec![],
                                attributes,
                            }),
                        );
                    }
                    class.as_mut().expect("method outside a class").methods.push(current);
                }
                "signature" => current.attributes.push(Attribute::Signature(tokens[1].into())),
                "local" => body.locals.push(local(&tokens)),
                "localtype" => body.local_types.push(local(&tokens)),
                _ => {
                    let instruction = Instruction {
                        offset,
                        opcode: opcode(tokens[0]),
                        operand: operand(&tokens),
                    };
                    offset += instruction.len() as u32;
                    body.instructions.push(instruction);
                }
            }
            continue;
        }

        match tokens[0] {
            "class" => {
                let (flags, rest) = split_flags(&tokens[1..], ClassAccessFlag::empty(), class_flags);
                let mut model = ClassModel {
                    minor_version: 0,
                    major_version: 52,
                    access_flags: flags,
                    name: rest[0].into(),
                    super_class: Some("java/lang/Object".into()),
                    interfaces: vec![],
                    fields: vec![],
                    methods: vec![],
                    attributes: vec![],
                };
                let mut words = rest[1..].iter();
                while let Some(word) = words.next() {
                    match *word {
                        "extends" => model.super_class = words.next().map(|s| Arc::from(*s)),
                        "implements" => model.interfaces.extend(words.by_ref().map(|s| Arc::from(*s))),
                        other => panic!("unexpected `{other}` in class header"),
                    }
                }
                class = Some(model);
            }
            "source" => class
                .as_mut()
                .expect("source outside a class")
                .attributes
                .push(Attribute::SourceFile(tokens[1].into())),
            "signature" => class
                .as_mut()
                .expect("signature outside a class")
                .attributes
                .push(Attribute::Signature(tokens[1].into())),
            "field" => {
                let (flags, rest) = split_flags(&tokens[1..], FieldAccessFlag::empty(), field_flags);
                let attributes = match rest.get(2..) {
                    Some(["signature", signature]) => vec![Attribute::Signature((*signature).into())],
                    _ => vec![],
                };
                class.as_mut().expect("field outside a class").fields.push(FieldModel {
                    access_flags: flags,
                    name: rest[0].into(),
                    descriptor: rest[1].into(),
                    attributes,
                });
            }
            "method" => {
                let (flags, rest) = split_flags(&tokens[1..], MethodAccessFlag::empty(), method_flags);
                offset = 0;
                method = Some((
                    MethodModel {
                        access_flags: flags,
                        name: rest[0].into(),
                        descriptor: rest[1].into(),
                        attributes: vec![],
                    },
                    MethodBody::default(),
                ));
            }
            other => panic!("unexpected directive `{other}`"),
        }
    }
    assert!(method.is_none(), "unterminated method");
    class.expect("fixture declares no class")
}

fn member(kind: MemberKind, tokens: &[&str]) -> MemberRef {
    MemberRef {
        kind,
        owner: tokens[1].into(),
        name: tokens[2].into(),
        descriptor: tokens[3].into(),
    }
}

fn operand(tokens: &[&str]) -> Operand {
    match tokens[0] {
        "getstatic" | "putstatic" | "getfield" | "putfield" => {
            Operand::Member(member(MemberKind::Field, tokens))
        }
        "invokevirtual" | "invokespecial" | "invokestatic" => {
            Operand::Member(member(MemberKind::Method, tokens))
        }
        "invokeinterface" => Operand::InvokeInterface {
            method: member(MemberKind::InterfaceMethod, tokens),
            count: tokens[4].parse().expect("argument count"),
        },
        "new" | "anewarray" | "checkcast" | "instanceof" => Operand::Class(tokens[1].into()),
        "bipush" => Operand::Byte(tokens[1].parse().expect("byte operand")),
        "iload" | "aload" | "istore" | "astore" => Operand::Local {
            index: tokens[1].parse().expect("local index"),
            wide: false,
        },
        "ldc" => Operand::Constant(match tokens[1] {
            "class" => Constant::Class(tokens[2].into()),
            literal if literal.starts_with('"') => {
                Constant::String(tokens[1..].join(" ").trim_matches('"').into())
            }
            number => Constant::Integer(number.parse().expect("ldc operand")),
        }),
        _ => Operand::None,
    }
}

/// Assembles a fixture into class file bytes.
pub fn assemble(source: &str) -> Vec<u8> {
    jvm_remap::serialize(&assemble_model(source)).expect("fixture does not serialize")
}

/// Renders a class file in the fixture syntax, minus flags. Used as the oracle that
/// remapped output is compared against.
pub fn disassemble(bytes: &[u8]) -> String {
    render(&jvm_remap::parse(bytes).expect("output does not parse"))
}

pub fn render(class: &ClassModel) -> String {
    let mut out = String::new();
    write!(out, "class {}", class.name).unwrap();
    if let Some(super_class) = &class.super_class {
        write!(out, " extends {super_class}").unwrap();
    }
    if !class.interfaces.is_empty() {
        write!(out, " implements {}", class.interfaces.join(" ")).unwrap();
    }
    out.push('\n');
    for attribute in &class.attributes {
        match attribute {
            Attribute::SourceFile(name) => writeln!(out, "source {name}").unwrap(),
            Attribute::Signature(signature) => writeln!(out, "signature {signature}").unwrap(),
            _ => {}
        }
    }
    for field in &class.fields {
        write!(out, "field {} {}", field.name, field.descriptor).unwrap();
        for attribute in &field.attributes {
            if let Attribute::Signature(signature) = attribute {
                write!(out, " signature {signature}").unwrap();
            }
        }
        out.push('\n');
    }
    for method in &class.methods {
        writeln!(out, "method {} {}", method.name, method.descriptor).unwrap();
        for attribute in &method.attributes {
            if let Attribute::Signature(signature) = attribute {
                writeln!(out, "  signature {signature}").unwrap();
            }
        }
        if let Some(code) = method.code() {
            for instruction in &code.instructions {
                writeln!(out, "  {}", render_instruction(instruction)).unwrap();
            }
            for attribute in &code.attributes {
                let (directive, locals) = match attribute {
                    Attribute::LocalVariableTable(locals) => ("local", locals),
                    Attribute::LocalVariableTypeTable(locals) => ("localtype", locals),
                    _ => continue,
                };
                for local in locals {
                    writeln!(
                        out,
                        "  {directive} {} {} {}",
                        local.index, local.name, local.descriptor
                    )
                    .unwrap();
                }
            }
        }
        out.push_str("end\n");
    }
    out
}

fn render_instruction(instruction: &Instruction) -> String {
    let name = mnemonic(instruction.opcode);
    match &instruction.operand {
        Operand::None => name,
        Operand::Byte(value) => format!("{name} {value}"),
        Operand::Local { index, .. } => format!("{name} {index}"),
        Operand::Member(member) => {
            format!("{name} {} {} {}", member.owner, member.name, member.descriptor)
        }
        Operand::InvokeInterface { method, count } => format!(
            "{name} {} {} {} {count}",
            method.owner, method.name, method.descriptor
        ),
        Operand::Class(class) => format!("{name} {class}"),
        Operand::Constant(Constant::Class(class)) => format!("{name} class {class}"),
        Operand::Constant(Constant::String(text)) => format!("{name} \"{text}\""),
        Operand::Constant(Constant::Integer(value)) => format!("{name} {value}"),
        other => format!("{name} {other:?}"),
    }
}
