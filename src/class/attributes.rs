use std::sync::Arc;

use nom::{
    Parser,
    bytes::complete::take,
    multi::count,
    number::complete::{be_u16, be_u32, u8},
};

use crate::{
    class::{
        code::{self, Instruction},
        constant::{Constant, ConstantPool, NameAndType, OriginalPool},
        parser::{PResult, lift, parse_attributes},
        structs::AttributeInfo,
    },
    error::ClassReadError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Code(Code),
    ConstantValue(Constant),
    StackMapTable(Vec<StackMapFrame>),
    Exceptions(Vec<Arc<str>>),
    InnerClasses(Vec<InnerClass>),
    EnclosingMethod {
        class: Arc<str>,
        method: Option<NameAndType>,
    },
    Synthetic,
    Deprecated,
    Signature(Arc<str>),
    SourceFile(Arc<str>),
    LineNumberTable(Vec<LineNumber>),
    LocalVariableTable(Vec<LocalVariable>),
    /// Same layout as the local variable table, the descriptor slot holds a signature.
    LocalVariableTypeTable(Vec<LocalVariable>),
    RuntimeVisibleAnnotations(Vec<Annotation>),
    RuntimeInvisibleAnnotations(Vec<Annotation>),
    RuntimeVisibleParameterAnnotations(Vec<Vec<Annotation>>),
    RuntimeInvisibleParameterAnnotations(Vec<Vec<Annotation>>),
    RuntimeVisibleTypeAnnotations(Vec<TypeAnnotation>),
    RuntimeInvisibleTypeAnnotations(Vec<TypeAnnotation>),
    AnnotationDefault(ElementValue),
    BootstrapMethods(Vec<BootstrapMethod>),
    MethodParameters(Vec<MethodParameter>),
    NestHost(Arc<str>),
    NestMembers(Vec<Arc<str>>),
    PermittedSubclasses(Vec<Arc<str>>),
    Record(Vec<RecordComponent>),
    Module(Module),
    ModulePackages(Vec<Arc<str>>),
    ModuleMainClass(Arc<str>),
    /// Anything not listed above, kept as the raw payload. `info` may hold indices into
    /// `pool`, so the writer lays `pool` out again before anything else.
    Unknown {
        name: Arc<str>,
        info: Vec<u8>,
        pool: OriginalPool,
    },
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Attribute::Code(_) => "Code",
            Attribute::ConstantValue(_) => "ConstantValue",
            Attribute::StackMapTable(_) => "StackMapTable",
            Attribute::Exceptions(_) => "Exceptions",
            Attribute::InnerClasses(_) => "InnerClasses",
            Attribute::EnclosingMethod { .. } => "EnclosingMethod",
            Attribute::Synthetic => "Synthetic",
            Attribute::Deprecated => "Deprecated",
            Attribute::Signature(_) => "Signature",
            Attribute::SourceFile(_) => "SourceFile",
            Attribute::LineNumberTable(_) => "LineNumberTable",
            Attribute::LocalVariableTable(_) => "LocalVariableTable",
            Attribute::LocalVariableTypeTable(_) => "LocalVariableTypeTable",
            Attribute::RuntimeVisibleAnnotations(_) => "RuntimeVisibleAnnotations",
            Attribute::RuntimeInvisibleAnnotations(_) => "RuntimeInvisibleAnnotations",
            Attribute::RuntimeVisibleParameterAnnotations(_) => {
                "RuntimeVisibleParameterAnnotations"
            }
            Attribute::RuntimeInvisibleParameterAnnotations(_) => {
                "RuntimeInvisibleParameterAnnotations"
            }
            Attribute::RuntimeVisibleTypeAnnotations(_) => "RuntimeVisibleTypeAnnotations",
            Attribute::RuntimeInvisibleTypeAnnotations(_) => "RuntimeInvisibleTypeAnnotations",
            Attribute::AnnotationDefault(_) => "AnnotationDefault",
            Attribute::BootstrapMethods(_) => "BootstrapMethods",
            Attribute::MethodParameters(_) => "MethodParameters",
            Attribute::NestHost(_) => "NestHost",
            Attribute::NestMembers(_) => "NestMembers",
            Attribute::PermittedSubclasses(_) => "PermittedSubclasses",
            Attribute::Record(_) => "Record",
            Attribute::Module(_) => "Module",
            Attribute::ModulePackages(_) => "ModulePackages",
            Attribute::ModuleMainClass(_) => "ModuleMainClass",
            Attribute::Unknown { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Instruction>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// `None` catches everything (`finally`).
    pub catch_type: Option<Arc<str>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    Same {
        frame_type: u8,
    },
    SameLocals1StackItem {
        frame_type: u8,
        stack: VerificationType,
    },
    SameLocals1StackItemExtended {
        offset_delta: u16,
        stack: VerificationType,
    },
    Chop {
        frame_type: u8,
        offset_delta: u16,
    },
    SameExtended {
        offset_delta: u16,
    },
    Append {
        frame_type: u8,
        offset_delta: u16,
        locals: Vec<VerificationType>,
    },
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(Arc<str>),
    /// Offset of the `new` instruction that created the value.
    Uninitialized(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClass {
    pub inner_class: Arc<str>,
    pub outer_class: Option<Arc<str>>,
    pub inner_name: Option<Arc<str>>,
    pub access_flags: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
    pub index: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub type_descriptor: Arc<str>,
    pub elements: Vec<(Arc<str>, ElementValue)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive and string values, `tag` is one of `BCDFIJSZs`.
    Const {
        tag: u8,
        value: Constant,
    },
    Enum {
        type_descriptor: Arc<str>,
        const_name: Arc<str>,
    },
    /// A return descriptor such as `Ljava/lang/String;` or `V`.
    Class(Arc<str>),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

/// A type annotation. `target` holds `target_type`, `target_info` and `type_path` as
/// they appear in the class file, none of which refer to the constant pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnnotation {
    pub target: Vec<u8>,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    pub method: Constant,
    pub arguments: Vec<Constant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodParameter {
    pub name: Option<Arc<str>>,
    pub access_flags: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordComponent {
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
    pub attributes: Vec<Attribute>,
}

/// The `Module` attribute of a `module-info` class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: Arc<str>,
    pub flags: u16,
    pub version: Option<Arc<str>>,
    pub requires: Vec<ModuleRequires>,
    pub exports: Vec<ModulePackage>,
    pub opens: Vec<ModulePackage>,
    /// Service interfaces.
    pub uses: Vec<Arc<str>>,
    pub provides: Vec<ModuleProvides>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequires {
    pub module: Arc<str>,
    pub flags: u16,
    pub version: Option<Arc<str>>,
}

/// An `exports` or `opens` entry. An empty `to` means every module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePackage {
    pub package: Arc<str>,
    pub flags: u16,
    pub to: Vec<Arc<str>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleProvides {
    pub service: Arc<str>,
    pub with: Vec<Arc<str>>,
}

pub(crate) fn decode_attributes(
    infos: &[AttributeInfo],
    pool: &ConstantPool,
) -> Result<Vec<Attribute>, ClassReadError> {
    infos.iter().map(|info| decode_attribute(info, pool)).collect()
}

fn decode_attribute(info: &AttributeInfo, pool: &ConstantPool) -> Result<Attribute, ClassReadError> {
    let name = pool.utf8(info.attribute_name_index)?;
    let input = info.info.as_slice();
    let parsed = match name.as_ref() {
        "Code" => code_attribute(input, pool).map(|(i, c)| (i, Attribute::Code(c))),
        "ConstantValue" => index(input)
            .and_then(|(i, idx)| Ok((i, Attribute::ConstantValue(lift(pool.constant(idx))?)))),
        "StackMapTable" => list(input, |i| stack_map_frame(i, pool))
            .map(|(i, frames)| (i, Attribute::StackMapTable(frames))),
        "Exceptions" => class_list(input, pool).map(|(i, c)| (i, Attribute::Exceptions(c))),
        "InnerClasses" => list(input, |i| inner_class(i, pool))
            .map(|(i, c)| (i, Attribute::InnerClasses(c))),
        "EnclosingMethod" => enclosing_method(input, pool),
        "Synthetic" => Ok((input, Attribute::Synthetic)),
        "Deprecated" => Ok((input, Attribute::Deprecated)),
        "Signature" => index(input)
            .and_then(|(i, idx)| Ok((i, Attribute::Signature(lift(pool.utf8(idx))?)))),
        "SourceFile" => index(input)
            .and_then(|(i, idx)| Ok((i, Attribute::SourceFile(lift(pool.utf8(idx))?)))),
        "LineNumberTable" => list(input, line_number)
            .map(|(i, lines)| (i, Attribute::LineNumberTable(lines))),
        "LocalVariableTable" => list(input, |i| local_variable(i, pool))
            .map(|(i, vars)| (i, Attribute::LocalVariableTable(vars))),
        "LocalVariableTypeTable" => list(input, |i| local_variable(i, pool))
            .map(|(i, vars)| (i, Attribute::LocalVariableTypeTable(vars))),
        "RuntimeVisibleAnnotations" => list(input, |i| annotation(i, pool))
            .map(|(i, a)| (i, Attribute::RuntimeVisibleAnnotations(a))),
        "RuntimeInvisibleAnnotations" => list(input, |i| annotation(i, pool))
            .map(|(i, a)| (i, Attribute::RuntimeInvisibleAnnotations(a))),
        "RuntimeVisibleParameterAnnotations" => parameter_annotations(input, pool)
            .map(|(i, a)| (i, Attribute::RuntimeVisibleParameterAnnotations(a))),
        "RuntimeInvisibleParameterAnnotations" => parameter_annotations(input, pool)
            .map(|(i, a)| (i, Attribute::RuntimeInvisibleParameterAnnotations(a))),
        "RuntimeVisibleTypeAnnotations" => list(input, |i| type_annotation(i, pool))
            .map(|(i, a)| (i, Attribute::RuntimeVisibleTypeAnnotations(a))),
        "RuntimeInvisibleTypeAnnotations" => list(input, |i| type_annotation(i, pool))
            .map(|(i, a)| (i, Attribute::RuntimeInvisibleTypeAnnotations(a))),
        "AnnotationDefault" => {
            element_value(input, pool).map(|(i, v)| (i, Attribute::AnnotationDefault(v)))
        }
        "BootstrapMethods" => list(input, |i| bootstrap_method(i, pool))
            .map(|(i, m)| (i, Attribute::BootstrapMethods(m))),
        "MethodParameters" => method_parameters(input, pool),
        "NestHost" => index(input)
            .and_then(|(i, idx)| Ok((i, Attribute::NestHost(lift(pool.class_name(idx))?)))),
        "NestMembers" => class_list(input, pool).map(|(i, c)| (i, Attribute::NestMembers(c))),
        "PermittedSubclasses" => {
            class_list(input, pool).map(|(i, c)| (i, Attribute::PermittedSubclasses(c)))
        }
        "Record" => list(input, |i| record_component(i, pool))
            .map(|(i, c)| (i, Attribute::Record(c))),
        "Module" => module(input, pool).map(|(i, m)| (i, Attribute::Module(m))),
        "ModulePackages" => list(input, |i| {
            let (i, idx) = be_u16(i)?;
            Ok((i, lift(pool.package_name(idx))?))
        })
        .map(|(i, p)| (i, Attribute::ModulePackages(p))),
        "ModuleMainClass" => index(input)
            .and_then(|(i, idx)| Ok((i, Attribute::ModuleMainClass(lift(pool.class_name(idx))?)))),
        _ => {
            log::debug!("keeping attribute {name} verbatim");
            return Ok(Attribute::Unknown {
                name,
                info: info.info.clone(),
                pool: pool.original(),
            });
        }
    };
    let (rest, attribute) = parsed.map_err(|err| match ClassReadError::from(err) {
        ClassReadError::UnexpectedEof => ClassReadError::InvalidAttribute(name.to_string()),
        err => err,
    })?;
    if !rest.is_empty() {
        return Err(ClassReadError::InvalidAttribute(name.to_string()));
    }
    Ok(attribute)
}

fn index(input: &[u8]) -> PResult<'_, u16> {
    be_u16(input)
}

/// A `u2` count followed by that many entries.
fn list<'a, T>(
    input: &'a [u8],
    item: impl FnMut(&'a [u8]) -> PResult<'a, T>,
) -> PResult<'a, Vec<T>> {
    let (input, n) = be_u16(input)?;
    count(item, n as usize).parse(input)
}

fn class_list<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, Vec<Arc<str>>> {
    list(input, |i| {
        let (i, idx) = be_u16(i)?;
        Ok((i, lift(pool.class_name(idx))?))
    })
}

fn code_attribute<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, Code> {
    let (input, max_stack) = be_u16(input)?;
    let (input, max_locals) = be_u16(input)?;
    let (input, code_length) = be_u32(input)?;
    let (input, bytecode) = take(code_length)(input)?;
    let instructions = lift(code::decode(bytecode, pool))?;
    let (input, exception_table) = list(input, |i| exception_handler(i, pool))?;
    let (input, infos) = parse_attributes(input)?;
    let attributes = lift(decode_attributes(&infos, pool))?;
    Ok((
        input,
        Code {
            max_stack,
            max_locals,
            instructions,
            exception_table,
            attributes,
        },
    ))
}

fn exception_handler<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, ExceptionHandler> {
    let (input, (start_pc, end_pc, handler_pc, catch_type)) =
        (be_u16, be_u16, be_u16, be_u16).parse(input)?;
    Ok((
        input,
        ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type: lift(pool.optional_class_name(catch_type))?,
        },
    ))
}

fn verification_type<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, VerificationType> {
    let (input, tag) = u8(input)?;
    let vt = match tag {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => {
            let (input, idx) = be_u16(input)?;
            return Ok((input, VerificationType::Object(lift(pool.class_name(idx))?)));
        }
        8 => {
            let (input, offset) = be_u16(input)?;
            return Ok((input, VerificationType::Uninitialized(offset)));
        }
        _ => {
            return lift(Err(ClassReadError::InvalidAttribute(format!(
                "StackMapTable verification type {tag}"
            ))));
        }
    };
    Ok((input, vt))
}

fn stack_map_frame<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, StackMapFrame> {
    let (input, frame_type) = u8(input)?;
    match frame_type {
        0..=63 => Ok((input, StackMapFrame::Same { frame_type })),
        64..=127 => {
            let (input, stack) = verification_type(input, pool)?;
            Ok((input, StackMapFrame::SameLocals1StackItem { frame_type, stack }))
        }
        247 => {
            let (input, offset_delta) = be_u16(input)?;
            let (input, stack) = verification_type(input, pool)?;
            Ok((
                input,
                StackMapFrame::SameLocals1StackItemExtended {
                    offset_delta,
                    stack,
                },
            ))
        }
        248..=250 => {
            let (input, offset_delta) = be_u16(input)?;
            Ok((
                input,
                StackMapFrame::Chop {
                    frame_type,
                    offset_delta,
                },
            ))
        }
        251 => {
            let (input, offset_delta) = be_u16(input)?;
            Ok((input, StackMapFrame::SameExtended { offset_delta }))
        }
        252..=254 => {
            let (input, offset_delta) = be_u16(input)?;
            let (input, locals) =
                count(|i| verification_type(i, pool), (frame_type - 251) as usize).parse(input)?;
            Ok((
                input,
                StackMapFrame::Append {
                    frame_type,
                    offset_delta,
                    locals,
                },
            ))
        }
        255 => {
            let (input, offset_delta) = be_u16(input)?;
            let (input, locals) = list(input, |i| verification_type(i, pool))?;
            let (input, stack) = list(input, |i| verification_type(i, pool))?;
            Ok((
                input,
                StackMapFrame::Full {
                    offset_delta,
                    locals,
                    stack,
                },
            ))
        }
        _ => lift(Err(ClassReadError::InvalidAttribute(format!(
            "StackMapTable frame type {frame_type}"
        )))),
    }
}

fn inner_class<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, InnerClass> {
    let (input, (inner, outer, name, access_flags)) =
        (be_u16, be_u16, be_u16, be_u16).parse(input)?;
    Ok((
        input,
        InnerClass {
            inner_class: lift(pool.class_name(inner))?,
            outer_class: lift(pool.optional_class_name(outer))?,
            inner_name: lift(pool.optional_utf8(name))?,
            access_flags,
        },
    ))
}

fn enclosing_method<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, Attribute> {
    let (input, (class, method)) = (be_u16, be_u16).parse(input)?;
    let method = if method == 0 {
        None
    } else {
        Some(lift(pool.name_and_type(method))?)
    };
    Ok((
        input,
        Attribute::EnclosingMethod {
            class: lift(pool.class_name(class))?,
            method,
        },
    ))
}

fn line_number(input: &[u8]) -> PResult<'_, LineNumber> {
    let (input, (start_pc, line_number)) = (be_u16, be_u16).parse(input)?;
    Ok((
        input,
        LineNumber {
            start_pc,
            line_number,
        },
    ))
}

fn local_variable<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, LocalVariable> {
    let (input, (start_pc, length, name, descriptor, index)) =
        (be_u16, be_u16, be_u16, be_u16, be_u16).parse(input)?;
    Ok((
        input,
        LocalVariable {
            start_pc,
            length,
            name: lift(pool.utf8(name))?,
            descriptor: lift(pool.utf8(descriptor))?,
            index,
        },
    ))
}

fn annotation<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, Annotation> {
    let (input, type_index) = be_u16(input)?;
    let (input, elements) = list(input, |i| {
        let (i, name) = be_u16(i)?;
        let (i, value) = element_value(i, pool)?;
        Ok((i, (lift(pool.utf8(name))?, value)))
    })?;
    Ok((
        input,
        Annotation {
            type_descriptor: lift(pool.utf8(type_index))?,
            elements,
        },
    ))
}

fn element_value<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, ElementValue> {
    let (input, tag) = u8(input)?;
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
            let (input, idx) = be_u16(input)?;
            let value = lift(pool.constant(idx))?;
            let fits = matches!(
                (tag, &value),
                (b'B' | b'C' | b'I' | b'S' | b'Z', Constant::Integer(_))
                    | (b'D', Constant::Double(_))
                    | (b'F', Constant::Float(_))
                    | (b'J', Constant::Long(_))
                    | (b's', Constant::Utf8(_))
            );
            if !fits {
                return lift(Err(ClassReadError::UnexpectedConstant {
                    index: idx,
                    expected: "constant matching the element value tag",
                }));
            }
            Ok((input, ElementValue::Const { tag, value }))
        }
        b'e' => {
            let (input, (type_index, name_index)) = (be_u16, be_u16).parse(input)?;
            Ok((
                input,
                ElementValue::Enum {
                    type_descriptor: lift(pool.utf8(type_index))?,
                    const_name: lift(pool.utf8(name_index))?,
                },
            ))
        }
        b'c' => {
            let (input, idx) = be_u16(input)?;
            Ok((input, ElementValue::Class(lift(pool.utf8(idx))?)))
        }
        b'@' => {
            let (input, nested) = annotation(input, pool)?;
            Ok((input, ElementValue::Annotation(nested)))
        }
        b'[' => {
            let (input, values) = list(input, |i| element_value(i, pool))?;
            Ok((input, ElementValue::Array(values)))
        }
        _ => lift(Err(ClassReadError::InvalidAttribute(format!(
            "element value tag {}",
            tag as char
        )))),
    }
}

fn parameter_annotations<'a>(
    input: &'a [u8],
    pool: &ConstantPool,
) -> PResult<'a, Vec<Vec<Annotation>>> {
    let (input, n) = u8(input)?;
    count(|i| list(i, |i| annotation(i, pool)), n as usize).parse(input)
}

fn type_annotation<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, TypeAnnotation> {
    let start = input;
    let (input, target_type) = u8(input)?;
    let (input, _) = match target_type {
        0x00 | 0x01 | 0x16 => take(1usize)(input)?,
        0x10..=0x12 | 0x17 | 0x42..=0x46 => take(2usize)(input)?,
        0x13..=0x15 => (input, &input[..0]),
        0x40 | 0x41 => {
            let (rest, n) = be_u16(input)?;
            take(n as usize * 6)(rest)?
        }
        0x47..=0x4b => take(3usize)(input)?,
        _ => {
            return lift(Err(ClassReadError::InvalidAttribute(format!(
                "type annotation target 0x{target_type:02x}"
            ))));
        }
    };
    let (input, path_length) = u8(input)?;
    let (input, _) = take(path_length as usize * 2)(input)?;
    let target = start[..start.len() - input.len()].to_vec();
    let (input, annotation) = annotation(input, pool)?;
    Ok((input, TypeAnnotation { target, annotation }))
}

fn bootstrap_method<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, BootstrapMethod> {
    let (input, method) = be_u16(input)?;
    let (input, arguments) = list(input, |i| {
        let (i, idx) = be_u16(i)?;
        Ok((i, lift(pool.loadable(idx))?))
    })?;
    let method = lift(pool.constant(method))?;
    if !matches!(method, Constant::MethodHandle { .. }) {
        return lift(Err(ClassReadError::InvalidAttribute(
            "BootstrapMethods entry is not a method handle".to_string(),
        )));
    }
    Ok((input, BootstrapMethod { method, arguments }))
}

fn method_parameters<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, Attribute> {
    let (input, n) = u8(input)?;
    let (input, parameters) = count(
        |i| {
            let (i, (name, access_flags)) = (be_u16, be_u16).parse(i)?;
            Ok((
                i,
                MethodParameter {
                    name: lift(pool.optional_utf8(name))?,
                    access_flags,
                },
            ))
        },
        n as usize,
    )
    .parse(input)?;
    Ok((input, Attribute::MethodParameters(parameters)))
}

fn record_component<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, RecordComponent> {
    let (input, (name, descriptor)) = (be_u16, be_u16).parse(input)?;
    let (input, infos) = parse_attributes(input)?;
    Ok((
        input,
        RecordComponent {
            name: lift(pool.utf8(name))?,
            descriptor: lift(pool.utf8(descriptor))?,
            attributes: lift(decode_attributes(&infos, pool))?,
        },
    ))
}

fn module<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, Module> {
    let (input, (name, flags, version)) = (be_u16, be_u16, be_u16).parse(input)?;
    let (input, requires) = list(input, |i| {
        let (i, (module, flags, version)) = (be_u16, be_u16, be_u16).parse(i)?;
        Ok((
            i,
            ModuleRequires {
                module: lift(pool.module_name(module))?,
                flags,
                version: lift(pool.optional_utf8(version))?,
            },
        ))
    })?;
    let (input, exports) = list(input, |i| module_package(i, pool))?;
    let (input, opens) = list(input, |i| module_package(i, pool))?;
    let (input, uses) = class_list(input, pool)?;
    let (input, provides) = list(input, |i| {
        let (i, service) = be_u16(i)?;
        let (i, with) = class_list(i, pool)?;
        Ok((
            i,
            ModuleProvides {
                service: lift(pool.class_name(service))?,
                with,
            },
        ))
    })?;
    Ok((
        input,
        Module {
            name: lift(pool.module_name(name))?,
            flags,
            version: lift(pool.optional_utf8(version))?,
            requires,
            exports,
            opens,
            uses,
            provides,
        },
    ))
}

fn module_package<'a>(input: &'a [u8], pool: &ConstantPool) -> PResult<'a, ModulePackage> {
    let (input, (package, flags)) = (be_u16, be_u16).parse(input)?;
    let (input, to) = list(input, |i| {
        let (i, idx) = be_u16(i)?;
        Ok((i, lift(pool.module_name(idx))?))
    })?;
    Ok((
        input,
        ModulePackage {
            package: lift(pool.package_name(package))?,
            flags,
            to,
        },
    ))
}
