use std::{collections::HashMap, sync::Arc};

use crate::{
    class::{
        attributes::{
            Annotation, Attribute, Code, ElementValue, ModulePackage, StackMapFrame,
            VerificationType,
        },
        code::{self, Operand},
        constant::{Constant, ConstantPool, MemberKind, MemberRef, NameAndType, OriginalPool},
        model::ClassModel,
        structs::{ConstantPoolInfo, encode_modified_utf8},
    },
    consts::{self, MAGIC, opcodes::LDC},
    error::ClassWriteError,
};

/// Builds a fresh constant pool, deduplicating entries as they are requested.
///
/// Indices are handed out in request order. `ldc` operands are reserved up front with
/// [`reserve`](Self::reserve) so they land within the one byte index range.
#[derive(Debug, Default)]
pub(crate) struct ConstantPoolBuilder {
    /// Slot `i` holds index `i + 1`. `None` marks a reserved slot not yet filled.
    entries: Vec<Option<ConstantPoolInfo>>,
    indices: HashMap<Constant, u16>,
}

impl ConstantPoolBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Lays `pool` out unchanged as the first entries so raw indices into it stay valid.
    /// Must run before anything else is added.
    pub(crate) fn seed(&mut self, pool: &OriginalPool) {
        let view = ConstantPool::new(pool.entries());
        self.entries.extend(pool.entries().iter().cloned().map(Some));
        for index in 1..=pool.entries().len() as u16 {
            if let Ok(constant) = view.constant(index) {
                self.indices.entry(constant).or_insert(index);
            }
        }
    }

    fn allocate(&mut self, wide: bool) -> Result<u16, ClassWriteError> {
        let slots = if wide { 2 } else { 1 };
        // the pool count is stored as a u2 and counts the unused slot 0
        if self.entries.len() + slots > u16::MAX as usize - 1 {
            return Err(ClassWriteError::ConstantPoolOverflow);
        }
        let index = self.entries.len() as u16 + 1;
        self.entries.push(None);
        if wide {
            self.entries.push(Some(ConstantPoolInfo::Empty));
        }
        Ok(index)
    }

    /// Claims an index for `constant` without adding what it refers to.
    pub(crate) fn reserve(&mut self, constant: &Constant) -> Result<u16, ClassWriteError> {
        if let Some(&index) = self.indices.get(constant) {
            return Ok(index);
        }
        let index = self.allocate(constant.is_wide())?;
        self.indices.insert(constant.clone(), index);
        Ok(index)
    }

    pub(crate) fn put(&mut self, constant: &Constant) -> Result<u16, ClassWriteError> {
        let reserved = self.indices.get(constant).copied();
        if let Some(index) = reserved {
            if self.entries[index as usize - 1].is_some() {
                return Ok(index);
            }
        }
        let info = match constant {
            Constant::Utf8(value) => {
                let length = encode_modified_utf8(value).len();
                if length > u16::MAX as usize {
                    return Err(ClassWriteError::StringTooLong(length));
                }
                ConstantPoolInfo::Utf8(Arc::clone(value))
            }
            Constant::Integer(value) => ConstantPoolInfo::Integer(*value),
            Constant::Float(bits) => ConstantPoolInfo::Float(*bits),
            Constant::Long(value) => ConstantPoolInfo::Long(*value),
            Constant::Double(bits) => ConstantPoolInfo::Double(*bits),
            Constant::Class(name) => ConstantPoolInfo::Class {
                name_index: self.utf8(name)?,
            },
            Constant::String(value) => ConstantPoolInfo::String {
                string_index: self.utf8(value)?,
            },
            Constant::Member(member) => {
                let class_index = self.class(&member.owner)?;
                let name_and_type_index = self.name_and_type(&member.name, &member.descriptor)?;
                match member.kind {
                    MemberKind::Field => ConstantPoolInfo::Fieldref {
                        class_index,
                        name_and_type_index,
                    },
                    MemberKind::Method => ConstantPoolInfo::Methodref {
                        class_index,
                        name_and_type_index,
                    },
                    MemberKind::InterfaceMethod => ConstantPoolInfo::InterfaceMethodref {
                        class_index,
                        name_and_type_index,
                    },
                }
            }
            Constant::NameAndType(NameAndType { name, descriptor }) => {
                ConstantPoolInfo::NameAndType {
                    name_index: self.utf8(name)?,
                    descriptor_index: self.utf8(descriptor)?,
                }
            }
            Constant::MethodHandle { kind, reference } => ConstantPoolInfo::MethodHandle {
                reference_kind: *kind,
                reference_index: self.member(reference)?,
            },
            Constant::MethodType(descriptor) => ConstantPoolInfo::MethodType {
                descriptor_index: self.utf8(descriptor)?,
            },
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => ConstantPoolInfo::Dynamic {
                bootstrap_method_attr_index: *bootstrap_method,
                name_and_type_index: self
                    .name_and_type(&name_and_type.name, &name_and_type.descriptor)?,
            },
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => ConstantPoolInfo::InvokeDynamic {
                bootstrap_method_attr_index: *bootstrap_method,
                name_and_type_index: self
                    .name_and_type(&name_and_type.name, &name_and_type.descriptor)?,
            },
            Constant::Module(name) => ConstantPoolInfo::Module {
                name_index: self.utf8(name)?,
            },
            Constant::Package(name) => ConstantPoolInfo::Package {
                name_index: self.utf8(name)?,
            },
        };
        let index = match reserved {
            Some(index) => index,
            None => {
                let index = self.allocate(constant.is_wide())?;
                self.indices.insert(constant.clone(), index);
                index
            }
        };
        self.entries[index as usize - 1] = Some(info);
        Ok(index)
    }

    pub(crate) fn utf8(&mut self, value: &str) -> Result<u16, ClassWriteError> {
        self.put(&Constant::Utf8(value.into()))
    }

    pub(crate) fn class(&mut self, name: &str) -> Result<u16, ClassWriteError> {
        self.put(&Constant::Class(name.into()))
    }

    pub(crate) fn optional_class(&mut self, name: Option<&str>) -> Result<u16, ClassWriteError> {
        name.map_or(Ok(0), |name| self.class(name))
    }

    pub(crate) fn optional_utf8(&mut self, value: Option<&str>) -> Result<u16, ClassWriteError> {
        value.map_or(Ok(0), |value| self.utf8(value))
    }

    pub(crate) fn name_and_type(
        &mut self,
        name: &Arc<str>,
        descriptor: &Arc<str>,
    ) -> Result<u16, ClassWriteError> {
        self.put(&Constant::NameAndType(NameAndType {
            name: Arc::clone(name),
            descriptor: Arc::clone(descriptor),
        }))
    }

    pub(crate) fn module(&mut self, name: &Arc<str>) -> Result<u16, ClassWriteError> {
        self.put(&Constant::Module(Arc::clone(name)))
    }

    pub(crate) fn package(&mut self, name: &Arc<str>) -> Result<u16, ClassWriteError> {
        self.put(&Constant::Package(Arc::clone(name)))
    }

    pub(crate) fn member(&mut self, member: &MemberRef) -> Result<u16, ClassWriteError> {
        self.put(&Constant::Member(member.clone()))
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) -> Result<(), ClassWriteError> {
        write_u2(out, self.entries.len() as u16 + 1);
        for entry in &self.entries {
            let Some(entry) = entry else {
                return Err(ClassWriteError::InvalidConstant(
                    "reserved constant pool slot was never filled".to_string(),
                ));
            };
            write_constant(out, entry);
        }
        Ok(())
    }
}

fn write_constant(out: &mut Vec<u8>, entry: &ConstantPoolInfo) {
    match entry {
        ConstantPoolInfo::Utf8(value) => {
            let bytes = encode_modified_utf8(value);
            out.push(consts::CONSTANT_UTF8);
            write_u2(out, bytes.len() as u16);
            out.extend_from_slice(&bytes);
        }
        ConstantPoolInfo::Integer(value) => {
            out.push(consts::CONSTANT_INTEGER);
            out.extend_from_slice(&value.to_be_bytes());
        }
        ConstantPoolInfo::Float(bits) => {
            out.push(consts::CONSTANT_FLOAT);
            write_u4(out, *bits);
        }
        ConstantPoolInfo::Long(value) => {
            out.push(consts::CONSTANT_LONG);
            out.extend_from_slice(&value.to_be_bytes());
        }
        ConstantPoolInfo::Double(bits) => {
            out.push(consts::CONSTANT_DOUBLE);
            out.extend_from_slice(&bits.to_be_bytes());
        }
        ConstantPoolInfo::Class { name_index } => {
            out.push(consts::CONSTANT_CLASS);
            write_u2(out, *name_index);
        }
        ConstantPoolInfo::String { string_index } => {
            out.push(consts::CONSTANT_STRING);
            write_u2(out, *string_index);
        }
        ConstantPoolInfo::Fieldref {
            class_index,
            name_and_type_index,
        } => {
            out.push(consts::CONSTANT_FIELDREF);
            write_u2(out, *class_index);
            write_u2(out, *name_and_type_index);
        }
        ConstantPoolInfo::Methodref {
            class_index,
            name_and_type_index,
        } => {
            out.push(consts::CONSTANT_METHODREF);
            write_u2(out, *class_index);
            write_u2(out, *name_and_type_index);
        }
        ConstantPoolInfo::InterfaceMethodref {
            class_index,
            name_and_type_index,
        } => {
            out.push(consts::CONSTANT_INTERFACE_METHODREF);
            write_u2(out, *class_index);
            write_u2(out, *name_and_type_index);
        }
        ConstantPoolInfo::NameAndType {
            name_index,
            descriptor_index,
        } => {
            out.push(consts::CONSTANT_NAME_AND_TYPE);
            write_u2(out, *name_index);
            write_u2(out, *descriptor_index);
        }
        ConstantPoolInfo::MethodHandle {
            reference_kind,
            reference_index,
        } => {
            out.push(consts::CONSTANT_METHOD_HANDLE);
            out.push(*reference_kind);
            write_u2(out, *reference_index);
        }
        ConstantPoolInfo::MethodType { descriptor_index } => {
            out.push(consts::CONSTANT_METHOD_TYPE);
            write_u2(out, *descriptor_index);
        }
        ConstantPoolInfo::Dynamic {
            bootstrap_method_attr_index,
            name_and_type_index,
        } => {
            out.push(consts::CONSTANT_DYNAMIC);
            write_u2(out, *bootstrap_method_attr_index);
            write_u2(out, *name_and_type_index);
        }
        ConstantPoolInfo::InvokeDynamic {
            bootstrap_method_attr_index,
            name_and_type_index,
        } => {
            out.push(consts::CONSTANT_INVOKE_DYNAMIC);
            write_u2(out, *bootstrap_method_attr_index);
            write_u2(out, *name_and_type_index);
        }
        ConstantPoolInfo::Module { name_index } => {
            out.push(consts::CONSTANT_MODULE);
            write_u2(out, *name_index);
        }
        ConstantPoolInfo::Package { name_index } => {
            out.push(consts::CONSTANT_PACKAGE);
            write_u2(out, *name_index);
        }
        // second slot of a long or double
        ConstantPoolInfo::Empty => {}
    }
}

fn write_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_u4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_len(out: &mut Vec<u8>, len: usize, what: &'static str) -> Result<(), ClassWriteError> {
    let len = u16::try_from(len).map_err(|_| ClassWriteError::TooManyEntries(what))?;
    write_u2(out, len);
    Ok(())
}

fn write_u1_len(out: &mut Vec<u8>, len: usize, what: &'static str) -> Result<(), ClassWriteError> {
    let len = u8::try_from(len).map_err(|_| ClassWriteError::TooManyEntries(what))?;
    out.push(len);
    Ok(())
}

/// The pool that verbatim attribute payloads in `class` index into, if it has any.
fn original_pool(class: &ClassModel) -> Result<Option<&OriginalPool>, ClassWriteError> {
    let mut found: Option<&OriginalPool> = None;
    let mut pending: Vec<&[Attribute]> = vec![class.attributes.as_slice()];
    pending.extend(class.fields.iter().map(|field| field.attributes.as_slice()));
    pending.extend(class.methods.iter().map(|method| method.attributes.as_slice()));
    while let Some(attributes) = pending.pop() {
        for attribute in attributes {
            match attribute {
                Attribute::Code(code) => pending.push(&code.attributes),
                Attribute::Record(components) => pending.extend(
                    components
                        .iter()
                        .map(|component| component.attributes.as_slice()),
                ),
                Attribute::Unknown { name, pool, .. } => match found {
                    Some(existing) if existing != pool => {
                        return Err(ClassWriteError::MixedConstantPools(name.to_string()));
                    }
                    Some(_) => {}
                    None => found = Some(pool),
                },
                _ => {}
            }
        }
    }
    Ok(found)
}

pub(crate) fn write_class(class: &ClassModel) -> Result<Vec<u8>, ClassWriteError> {
    let mut cp = ConstantPoolBuilder::new();
    if let Some(pool) = original_pool(class)? {
        cp.seed(pool);
    }
    for method in &class.methods {
        if let Some(code) = method.code() {
            for instruction in &code.instructions {
                if let (LDC, Operand::Constant(constant)) =
                    (instruction.opcode, &instruction.operand)
                {
                    cp.reserve(constant)?;
                }
            }
        }
    }

    let mut body = Vec::new();
    write_u2(&mut body, class.access_flags.bits());
    write_u2(&mut body, cp.class(&class.name)?);
    write_u2(&mut body, cp.optional_class(class.super_class.as_deref())?);
    write_len(&mut body, class.interfaces.len(), "interfaces")?;
    for interface in &class.interfaces {
        write_u2(&mut body, cp.class(interface)?);
    }

    write_len(&mut body, class.fields.len(), "fields")?;
    for field in &class.fields {
        write_u2(&mut body, field.access_flags.bits());
        write_u2(&mut body, cp.utf8(&field.name)?);
        write_u2(&mut body, cp.utf8(&field.descriptor)?);
        write_attributes(&mut body, &field.attributes, &mut cp)?;
    }

    write_len(&mut body, class.methods.len(), "methods")?;
    for method in &class.methods {
        write_u2(&mut body, method.access_flags.bits());
        write_u2(&mut body, cp.utf8(&method.name)?);
        write_u2(&mut body, cp.utf8(&method.descriptor)?);
        write_attributes(&mut body, &method.attributes, &mut cp)?;
    }

    write_attributes(&mut body, &class.attributes, &mut cp)?;

    let mut out = Vec::with_capacity(body.len() + 1024);
    write_u4(&mut out, MAGIC);
    write_u2(&mut out, class.minor_version);
    write_u2(&mut out, class.major_version);
    cp.write(&mut out)?;
    out.extend_from_slice(&body);
    Ok(out)
}

fn write_attributes(
    out: &mut Vec<u8>,
    attributes: &[Attribute],
    cp: &mut ConstantPoolBuilder,
) -> Result<(), ClassWriteError> {
    write_len(out, attributes.len(), "attributes")?;
    for attribute in attributes {
        write_u2(out, cp.utf8(attribute.name())?);
        let mut info = Vec::new();
        write_attribute_info(&mut info, attribute, cp)?;
        let length = u32::try_from(info.len())
            .map_err(|_| ClassWriteError::TooManyEntries("attribute length"))?;
        write_u4(out, length);
        out.extend_from_slice(&info);
    }
    Ok(())
}

fn write_class_list(
    out: &mut Vec<u8>,
    classes: &[Arc<str>],
    cp: &mut ConstantPoolBuilder,
    what: &'static str,
) -> Result<(), ClassWriteError> {
    write_len(out, classes.len(), what)?;
    for class in classes {
        write_u2(out, cp.class(class)?);
    }
    Ok(())
}

fn write_attribute_info(
    out: &mut Vec<u8>,
    attribute: &Attribute,
    cp: &mut ConstantPoolBuilder,
) -> Result<(), ClassWriteError> {
    match attribute {
        Attribute::Code(code) => write_code(out, code, cp)?,
        Attribute::ConstantValue(value) => write_u2(out, cp.put(value)?),
        Attribute::StackMapTable(frames) => {
            write_len(out, frames.len(), "StackMapTable")?;
            for frame in frames {
                write_frame(out, frame, cp)?;
            }
        }
        Attribute::Exceptions(classes) => write_class_list(out, classes, cp, "Exceptions")?,
        Attribute::InnerClasses(classes) => {
            write_len(out, classes.len(), "InnerClasses")?;
            for class in classes {
                write_u2(out, cp.class(&class.inner_class)?);
                write_u2(out, cp.optional_class(class.outer_class.as_deref())?);
                write_u2(out, cp.optional_utf8(class.inner_name.as_deref())?);
                write_u2(out, class.access_flags);
            }
        }
        Attribute::EnclosingMethod { class, method } => {
            write_u2(out, cp.class(class)?);
            let method = match method {
                Some(method) => cp.name_and_type(&method.name, &method.descriptor)?,
                None => 0,
            };
            write_u2(out, method);
        }
        Attribute::Synthetic | Attribute::Deprecated => {}
        Attribute::Signature(value) | Attribute::SourceFile(value) => {
            write_u2(out, cp.utf8(value)?)
        }
        Attribute::LineNumberTable(lines) => {
            write_len(out, lines.len(), "LineNumberTable")?;
            for line in lines {
                write_u2(out, line.start_pc);
                write_u2(out, line.line_number);
            }
        }
        Attribute::LocalVariableTable(variables) | Attribute::LocalVariableTypeTable(variables) => {
            write_len(out, variables.len(), "LocalVariableTable")?;
            for variable in variables {
                write_u2(out, variable.start_pc);
                write_u2(out, variable.length);
                write_u2(out, cp.utf8(&variable.name)?);
                write_u2(out, cp.utf8(&variable.descriptor)?);
                write_u2(out, variable.index);
            }
        }
        Attribute::RuntimeVisibleAnnotations(annotations)
        | Attribute::RuntimeInvisibleAnnotations(annotations) => {
            write_annotations(out, annotations, cp)?
        }
        Attribute::RuntimeVisibleParameterAnnotations(parameters)
        | Attribute::RuntimeInvisibleParameterAnnotations(parameters) => {
            write_u1_len(out, parameters.len(), "parameter annotations")?;
            for annotations in parameters {
                write_annotations(out, annotations, cp)?;
            }
        }
        Attribute::RuntimeVisibleTypeAnnotations(annotations)
        | Attribute::RuntimeInvisibleTypeAnnotations(annotations) => {
            write_len(out, annotations.len(), "type annotations")?;
            for annotation in annotations {
                out.extend_from_slice(&annotation.target);
                write_annotation(out, &annotation.annotation, cp)?;
            }
        }
        Attribute::AnnotationDefault(value) => write_element_value(out, value, cp)?,
        Attribute::BootstrapMethods(methods) => {
            write_len(out, methods.len(), "BootstrapMethods")?;
            for method in methods {
                write_u2(out, cp.put(&method.method)?);
                write_len(out, method.arguments.len(), "bootstrap arguments")?;
                for argument in &method.arguments {
                    write_u2(out, cp.put(argument)?);
                }
            }
        }
        Attribute::MethodParameters(parameters) => {
            write_u1_len(out, parameters.len(), "MethodParameters")?;
            for parameter in parameters {
                write_u2(out, cp.optional_utf8(parameter.name.as_deref())?);
                write_u2(out, parameter.access_flags);
            }
        }
        Attribute::NestHost(host) => write_u2(out, cp.class(host)?),
        Attribute::NestMembers(classes) => write_class_list(out, classes, cp, "NestMembers")?,
        Attribute::PermittedSubclasses(classes) => {
            write_class_list(out, classes, cp, "PermittedSubclasses")?
        }
        Attribute::Record(components) => {
            write_len(out, components.len(), "Record")?;
            for component in components {
                write_u2(out, cp.utf8(&component.name)?);
                write_u2(out, cp.utf8(&component.descriptor)?);
                write_attributes(out, &component.attributes, cp)?;
            }
        }
        Attribute::Module(module) => {
            write_u2(out, cp.module(&module.name)?);
            write_u2(out, module.flags);
            write_u2(out, cp.optional_utf8(module.version.as_deref())?);
            write_len(out, module.requires.len(), "module requires")?;
            for requires in &module.requires {
                write_u2(out, cp.module(&requires.module)?);
                write_u2(out, requires.flags);
                write_u2(out, cp.optional_utf8(requires.version.as_deref())?);
            }
            write_module_packages(out, &module.exports, cp, "module exports")?;
            write_module_packages(out, &module.opens, cp, "module opens")?;
            write_class_list(out, &module.uses, cp, "module uses")?;
            write_len(out, module.provides.len(), "module provides")?;
            for provides in &module.provides {
                write_u2(out, cp.class(&provides.service)?);
                write_class_list(out, &provides.with, cp, "module provides")?;
            }
        }
        Attribute::ModulePackages(packages) => {
            write_len(out, packages.len(), "ModulePackages")?;
            for package in packages {
                write_u2(out, cp.package(package)?);
            }
        }
        Attribute::ModuleMainClass(class) => write_u2(out, cp.class(class)?),
        Attribute::Unknown { info, .. } => out.extend_from_slice(info),
    }
    Ok(())
}

fn write_module_packages(
    out: &mut Vec<u8>,
    packages: &[ModulePackage],
    cp: &mut ConstantPoolBuilder,
    what: &'static str,
) -> Result<(), ClassWriteError> {
    write_len(out, packages.len(), what)?;
    for package in packages {
        write_u2(out, cp.package(&package.package)?);
        write_u2(out, package.flags);
        write_len(out, package.to.len(), what)?;
        for module in &package.to {
            write_u2(out, cp.module(module)?);
        }
    }
    Ok(())
}

fn write_code(
    out: &mut Vec<u8>,
    code: &Code,
    cp: &mut ConstantPoolBuilder,
) -> Result<(), ClassWriteError> {
    write_u2(out, code.max_stack);
    write_u2(out, code.max_locals);
    let bytecode = code::encode(&code.instructions, cp)?;
    let length = u32::try_from(bytecode.len())
        .map_err(|_| ClassWriteError::TooManyEntries("code length"))?;
    write_u4(out, length);
    out.extend_from_slice(&bytecode);
    write_len(out, code.exception_table.len(), "exception table")?;
    for handler in &code.exception_table {
        write_u2(out, handler.start_pc);
        write_u2(out, handler.end_pc);
        write_u2(out, handler.handler_pc);
        write_u2(out, cp.optional_class(handler.catch_type.as_deref())?);
    }
    write_attributes(out, &code.attributes, cp)
}

fn write_frame(
    out: &mut Vec<u8>,
    frame: &StackMapFrame,
    cp: &mut ConstantPoolBuilder,
) -> Result<(), ClassWriteError> {
    match frame {
        StackMapFrame::Same { frame_type } => out.push(*frame_type),
        StackMapFrame::SameLocals1StackItem { frame_type, stack } => {
            out.push(*frame_type);
            write_verification_type(out, stack, cp)?;
        }
        StackMapFrame::SameLocals1StackItemExtended {
            offset_delta,
            stack,
        } => {
            out.push(247);
            write_u2(out, *offset_delta);
            write_verification_type(out, stack, cp)?;
        }
        StackMapFrame::Chop {
            frame_type,
            offset_delta,
        } => {
            out.push(*frame_type);
            write_u2(out, *offset_delta);
        }
        StackMapFrame::SameExtended { offset_delta } => {
            out.push(251);
            write_u2(out, *offset_delta);
        }
        StackMapFrame::Append {
            frame_type,
            offset_delta,
            locals,
        } => {
            out.push(*frame_type);
            write_u2(out, *offset_delta);
            for local in locals {
                write_verification_type(out, local, cp)?;
            }
        }
        StackMapFrame::Full {
            offset_delta,
            locals,
            stack,
        } => {
            out.push(255);
            write_u2(out, *offset_delta);
            write_len(out, locals.len(), "frame locals")?;
            for local in locals {
                write_verification_type(out, local, cp)?;
            }
            write_len(out, stack.len(), "frame stack")?;
            for item in stack {
                write_verification_type(out, item, cp)?;
            }
        }
    }
    Ok(())
}

fn write_verification_type(
    out: &mut Vec<u8>,
    vt: &VerificationType,
    cp: &mut ConstantPoolBuilder,
) -> Result<(), ClassWriteError> {
    match vt {
        VerificationType::Top => out.push(0),
        VerificationType::Integer => out.push(1),
        VerificationType::Float => out.push(2),
        VerificationType::Double => out.push(3),
        VerificationType::Long => out.push(4),
        VerificationType::Null => out.push(5),
        VerificationType::UninitializedThis => out.push(6),
        VerificationType::Object(class) => {
            out.push(7);
            write_u2(out, cp.class(class)?);
        }
        VerificationType::Uninitialized(offset) => {
            out.push(8);
            write_u2(out, *offset);
        }
    }
    Ok(())
}

fn write_annotations(
    out: &mut Vec<u8>,
    annotations: &[Annotation],
    cp: &mut ConstantPoolBuilder,
) -> Result<(), ClassWriteError> {
    write_len(out, annotations.len(), "annotations")?;
    for annotation in annotations {
        write_annotation(out, annotation, cp)?;
    }
    Ok(())
}

fn write_annotation(
    out: &mut Vec<u8>,
    annotation: &Annotation,
    cp: &mut ConstantPoolBuilder,
) -> Result<(), ClassWriteError> {
    write_u2(out, cp.utf8(&annotation.type_descriptor)?);
    write_len(out, annotation.elements.len(), "annotation elements")?;
    for (name, value) in &annotation.elements {
        write_u2(out, cp.utf8(name)?);
        write_element_value(out, value, cp)?;
    }
    Ok(())
}

fn write_element_value(
    out: &mut Vec<u8>,
    value: &ElementValue,
    cp: &mut ConstantPoolBuilder,
) -> Result<(), ClassWriteError> {
    match value {
        ElementValue::Const { tag, value } => {
            out.push(*tag);
            write_u2(out, cp.put(value)?);
        }
        ElementValue::Enum {
            type_descriptor,
            const_name,
        } => {
            out.push(b'e');
            write_u2(out, cp.utf8(type_descriptor)?);
            write_u2(out, cp.utf8(const_name)?);
        }
        ElementValue::Class(descriptor) => {
            out.push(b'c');
            write_u2(out, cp.utf8(descriptor)?);
        }
        ElementValue::Annotation(annotation) => {
            out.push(b'@');
            write_annotation(out, annotation, cp)?;
        }
        ElementValue::Array(values) => {
            out.push(b'[');
            write_len(out, values.len(), "element value array")?;
            for value in values {
                write_element_value(out, value, cp)?;
            }
        }
    }
    Ok(())
}
