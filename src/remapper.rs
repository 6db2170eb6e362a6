//! Rewrites every name a class file mentions.
//!
//! A [`Remapper`] is built once per run, after the hierarchy has been seeded and the
//! dispatch groups computed, and is then shared read-only between workers.

use std::{collections::HashMap, collections::HashSet, sync::Arc};

use crate::{
    class::{
        ClassModel, Constant, FieldModel, Instruction, MemberKind, MemberRef, MethodModel,
        NameAndType, Operand,
        attributes::{
            Annotation, Attribute, BootstrapMethod, Code, ElementValue, ExceptionHandler,
            InnerClass, LocalVariable, Module, ModulePackage, ModuleProvides, RecordComponent,
            StackMapFrame, TypeAnnotation, VerificationType,
        },
    },
    config::RemapConfig,
    descriptor::{FieldType, map_class_reference, map_descriptor, map_field_descriptor, parse_method_descriptor},
    dispatch::DispatchGroups,
    error::{Diagnostic, DiagnosticKind, RemapError, Result},
    hierarchy::HierarchyResolver,
    mapping::{MemberKey, SymbolTable},
    signature::{map_class_signature, map_field_signature, map_method_signature},
};

const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

/// A rewritten class and the problems noticed on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Remapped {
    pub class: ClassModel,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
pub struct Remapper<'a> {
    symbols: &'a SymbolTable,
    resolver: &'a HierarchyResolver,
    groups: DispatchGroups,
    rebuild_source_file_names: bool,
}

impl<'a> Remapper<'a> {
    /// Computes the dispatch groups for `classes` and rejects mappings that would make
    /// two classes, or two members of one class, indistinguishable. Every class in
    /// `classes` must already be seeded into `resolver`.
    pub fn new(
        symbols: &'a SymbolTable,
        resolver: &'a HierarchyResolver,
        classes: &[Arc<ClassModel>],
        config: &RemapConfig,
    ) -> Result<Self> {
        let groups = DispatchGroups::build(symbols, resolver, classes)?;
        let remapper = Remapper {
            symbols,
            resolver,
            groups,
            rebuild_source_file_names: config.rebuild_source_file_names,
        };
        remapper.check_collisions(classes)?;
        Ok(remapper)
    }

    fn check_collisions(&self, classes: &[Arc<ClassModel>]) -> Result<()> {
        let inputs: HashSet<&str> = classes.iter().map(|class| class.name.as_ref()).collect();
        let mut seen = HashSet::new();
        let mut class_names: HashMap<&str, &str> = HashMap::new();
        for class in classes {
            if !seen.insert(&class.name) {
                continue;
            }
            let new = self.symbols.resolve_class(&class.name).unwrap_or(&class.name);
            if let Some(other) = class_names.insert(new, &class.name) {
                return Err(RemapError::AmbiguousMapping(format!(
                    "classes {other} and {} would both be named {new}",
                    class.name
                )));
            }
            if new != class.name.as_ref() && !inputs.contains(new) && self.resolver.on_classpath(new) {
                return Err(RemapError::AmbiguousMapping(format!(
                    "{} would be renamed to {new}, which is already on the classpath",
                    class.name
                )));
            }

            let mut fields: HashMap<(&str, String), &str> = HashMap::new();
            for field in &class.fields {
                let name = self
                    .symbols
                    .resolve_field(&class.name, &field.name, &field.descriptor)
                    .unwrap_or(&field.name);
                let descriptor = map_descriptor(&field.descriptor, self.symbols)
                    .unwrap_or_else(|_| field.descriptor.to_string());
                if let Some(other) = fields.insert((name, descriptor), &field.name) {
                    return Err(RemapError::AmbiguousMapping(format!(
                        "fields {0}.{other} and {0}.{1} would both be named {name}",
                        class.name, field.name
                    )));
                }
            }

            let mut methods: HashMap<(&str, String), &str> = HashMap::new();
            for method in &class.methods {
                let key = MemberKey {
                    owner: Arc::clone(&class.name),
                    name: Arc::clone(&method.name),
                    descriptor: Arc::clone(&method.descriptor),
                };
                let name = self.groups.name_of(&key, self.symbols).unwrap_or(&method.name);
                let descriptor = map_descriptor(&method.descriptor, self.symbols)
                    .unwrap_or_else(|_| method.descriptor.to_string());
                if let Some(other) = methods.insert((name, descriptor), &method.name) {
                    return Err(RemapError::AmbiguousMapping(format!(
                        "methods {0}.{other} and {0}.{1} {2} would both be named {name}",
                        class.name, method.name, method.descriptor
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn remap(&self, class: &ClassModel) -> Result<Remapped> {
        if let Some(through) = self.groups.broken_hierarchy(&class.name) {
            return Err(RemapError::HierarchyCycle(through.to_string()));
        }
        let mut rewrite = ClassRewrite::new(self, class);
        let rewritten = rewrite.class()?;
        log::debug!("remapped {} to {}", class.name, rewritten.name);
        Ok(Remapped {
            class: rewritten,
            diagnostics: rewrite.diagnostics,
        })
    }
}

/// Remaps a single class on its own. The class is seeded into `resolver` and is the
/// only one dispatch groups are computed for.
pub fn remap(
    class: &ClassModel,
    symbols: &SymbolTable,
    resolver: &HierarchyResolver,
) -> Result<Remapped> {
    let class = Arc::new(class.clone());
    resolver.seed(Arc::clone(&class));
    Remapper::new(
        symbols,
        resolver,
        std::slice::from_ref(&class),
        &RemapConfig::default(),
    )?
    .remap(&class)
}

#[derive(Debug, Clone, Copy)]
enum SignatureKind {
    Class,
    Method,
    Field,
}

struct ClassRewrite<'r, 'a> {
    remapper: &'r Remapper<'a>,
    class: &'r ClassModel,
    bootstrap_methods: &'r [BootstrapMethod],
    /// The member being rewritten, for error messages.
    subject: String,
    diagnostics: Vec<Diagnostic>,
}

impl<'r, 'a> ClassRewrite<'r, 'a> {
    fn new(remapper: &'r Remapper<'a>, class: &'r ClassModel) -> Self {
        let bootstrap_methods = class
            .attributes
            .iter()
            .find_map(|a| match a {
                Attribute::BootstrapMethods(methods) => Some(methods.as_slice()),
                _ => None,
            })
            .unwrap_or_default();
        ClassRewrite {
            remapper,
            class,
            bootstrap_methods,
            subject: class.name.to_string(),
            diagnostics: Vec::new(),
        }
    }

    fn class(&mut self) -> Result<ClassModel> {
        let class = self.class;
        let mut fields = Vec::with_capacity(class.fields.len());
        for field in &class.fields {
            self.subject = format!("{}.{}:{}", class.name, field.name, field.descriptor);
            let rewritten = self.field(field);
            fields.push(self.isolate(field, rewritten)?);
        }
        let mut methods = Vec::with_capacity(class.methods.len());
        for method in &class.methods {
            self.subject = format!("{}.{}{}", class.name, method.name, method.descriptor);
            let rewritten = self.method(method);
            methods.push(self.isolate(method, rewritten)?);
        }
        self.subject = class.name.to_string();
        let mut attributes = Vec::with_capacity(class.attributes.len());
        for attribute in &class.attributes {
            let rewritten = self.attribute(attribute, SignatureKind::Class);
            attributes.push(self.isolate(attribute, rewritten)?);
        }

        Ok(ClassModel {
            minor_version: class.minor_version,
            major_version: class.major_version,
            access_flags: class.access_flags,
            name: self.class_name(&class.name),
            super_class: class.super_class.as_ref().map(|s| self.class_name(s)),
            interfaces: class.interfaces.iter().map(|i| self.class_name(i)).collect(),
            fields,
            methods,
            attributes,
        })
    }

    /// Keeps the original form of a member whose types could not be rewritten.
    fn isolate<T: Clone>(&mut self, original: &T, rewritten: Result<T>) -> Result<T> {
        match rewritten {
            Ok(rewritten) => Ok(rewritten),
            Err(RemapError::DescriptorRewrite { member, descriptor }) => {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::DescriptorRewriteFailure,
                    member,
                    format!("cannot rewrite `{descriptor}`, left unchanged"),
                ));
                Ok(original.clone())
            }
            Err(err) => Err(err),
        }
    }

    fn field(&mut self, field: &FieldModel) -> Result<FieldModel> {
        let name = self
            .remapper
            .symbols
            .resolve_field(&self.class.name, &field.name, &field.descriptor)
            .map_or_else(|| Arc::clone(&field.name), Arc::from);
        Ok(FieldModel {
            access_flags: field.access_flags,
            name,
            descriptor: self.descriptor(&field.descriptor)?,
            attributes: self.attributes(&field.attributes, SignatureKind::Field)?,
        })
    }

    fn method(&mut self, method: &MethodModel) -> Result<MethodModel> {
        let key = MemberKey {
            owner: Arc::clone(&self.class.name),
            name: Arc::clone(&method.name),
            descriptor: Arc::clone(&method.descriptor),
        };
        let name = self
            .remapper
            .groups
            .name_of(&key, self.remapper.symbols)
            .map_or_else(|| Arc::clone(&method.name), Arc::from);
        Ok(MethodModel {
            access_flags: method.access_flags,
            name,
            descriptor: self.descriptor(&method.descriptor)?,
            attributes: self.attributes(&method.attributes, SignatureKind::Method)?,
        })
    }

    fn class_name(&self, name: &Arc<str>) -> Arc<str> {
        match self.remapper.symbols.resolve_class(name) {
            Some(new) => Arc::from(new),
            None => Arc::clone(name),
        }
    }

    /// A `CONSTANT_Class` operand, which is an array descriptor for array types.
    fn class_ref(&self, name: &Arc<str>) -> Result<Arc<str>> {
        if !name.starts_with('[') {
            return Ok(self.class_name(name));
        }
        map_class_reference(name, self.remapper.symbols)
            .map(Arc::from)
            .map_err(|_| self.descriptor_error(name))
    }

    fn descriptor(&self, descriptor: &Arc<str>) -> Result<Arc<str>> {
        map_descriptor(descriptor, self.remapper.symbols)
            .map(Arc::from)
            .map_err(|_| self.descriptor_error(descriptor))
    }

    fn descriptor_error(&self, descriptor: &str) -> RemapError {
        RemapError::DescriptorRewrite {
            member: self.subject.clone(),
            descriptor: descriptor.to_string(),
        }
    }

    fn method_name(&mut self, owner: &str, name: &Arc<str>, descriptor: &str) -> Result<Arc<str>> {
        if owner.starts_with('[') || name.starts_with('<') {
            return Ok(Arc::clone(name));
        }
        let remapper = self.remapper;
        let declaring = match remapper.resolver.resolve_method_owner(owner, name, descriptor) {
            Ok(declaring) => declaring,
            Err(RemapError::HierarchyCycle(_)) => None,
            Err(err) => return Err(err),
        };
        let new = match declaring {
            Some(model) => remapper
                .groups
                .name_of(&MemberKey::new(&model.name, name, descriptor), remapper.symbols),
            None => {
                let new = remapper
                    .groups
                    .name_of(&MemberKey::new(owner, name, descriptor), remapper.symbols);
                if let Some(new) = new {
                    self.ambiguous(format!("{owner}.{name}{descriptor}"), new);
                }
                new
            }
        };
        Ok(new.map_or_else(|| Arc::clone(name), Arc::from))
    }

    fn field_name(&mut self, owner: &str, name: &Arc<str>, descriptor: &str) -> Result<Arc<str>> {
        if owner.starts_with('[') {
            return Ok(Arc::clone(name));
        }
        let remapper = self.remapper;
        let declaring = match remapper.resolver.resolve_field_owner(owner, name, descriptor) {
            Ok(declaring) => declaring,
            Err(RemapError::HierarchyCycle(_)) => None,
            Err(err) => return Err(err),
        };
        let new = match declaring {
            Some(model) => remapper.symbols.resolve_field(&model.name, name, descriptor),
            None => {
                let new = remapper.symbols.resolve_field(owner, name, descriptor);
                if let Some(new) = new {
                    self.ambiguous(format!("{owner}.{name}:{descriptor}"), new);
                }
                new
            }
        };
        Ok(new.map_or_else(|| Arc::clone(name), Arc::from))
    }

    fn ambiguous(&mut self, reference: String, new: &str) {
        self.diagnostics.push(Diagnostic::new(
            DiagnosticKind::AmbiguousReference,
            reference,
            format!(
                "no declaration in the known hierarchy, renamed to {new} from its own entry (in {})",
                self.subject
            ),
        ));
    }

    fn member_ref(&mut self, member: &MemberRef) -> Result<MemberRef> {
        let name = match member.kind {
            MemberKind::Field => self.field_name(&member.owner, &member.name, &member.descriptor)?,
            MemberKind::Method | MemberKind::InterfaceMethod => {
                self.method_name(&member.owner, &member.name, &member.descriptor)?
            }
        };
        Ok(MemberRef {
            kind: member.kind,
            owner: self.class_ref(&member.owner)?,
            name,
            descriptor: self.descriptor(&member.descriptor)?,
        })
    }

    fn name_and_type(&self, name_and_type: &NameAndType) -> Result<NameAndType> {
        Ok(NameAndType {
            name: Arc::clone(&name_and_type.name),
            descriptor: self.descriptor(&name_and_type.descriptor)?,
        })
    }

    fn constant(&mut self, constant: &Constant) -> Result<Constant> {
        Ok(match constant {
            Constant::Class(name) => Constant::Class(self.class_ref(name)?),
            Constant::Member(member) => Constant::Member(self.member_ref(member)?),
            Constant::NameAndType(name_and_type) => {
                Constant::NameAndType(self.name_and_type(name_and_type)?)
            }
            Constant::MethodHandle { kind, reference } => Constant::MethodHandle {
                kind: *kind,
                reference: self.member_ref(reference)?,
            },
            Constant::MethodType(descriptor) => Constant::MethodType(self.descriptor(descriptor)?),
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => Constant::Dynamic {
                bootstrap_method: *bootstrap_method,
                name_and_type: self.name_and_type(name_and_type)?,
            },
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => Constant::InvokeDynamic {
                bootstrap_method: *bootstrap_method,
                name_and_type: self.name_and_type(name_and_type)?,
            },
            other => other.clone(),
        })
    }

    /// For a call site bootstrapped by `LambdaMetafactory`, the functional interface
    /// and the erased descriptor of the method the call site implements.
    fn lambda_target(
        &self,
        bootstrap_method: u16,
        name_and_type: &NameAndType,
    ) -> Option<(String, Arc<str>)> {
        let bootstrap = self.bootstrap_methods.get(bootstrap_method as usize)?;
        let Constant::MethodHandle { reference, .. } = &bootstrap.method else {
            return None;
        };
        if reference.owner.as_ref() != LAMBDA_METAFACTORY
            || !matches!(reference.name.as_ref(), "metafactory" | "altMetafactory")
        {
            return None;
        }
        let Some(Constant::MethodType(erased)) = bootstrap.arguments.first() else {
            return None;
        };
        match parse_method_descriptor(&name_and_type.descriptor).ok()?.return_type? {
            FieldType::Object(interface) => Some((interface, Arc::clone(erased))),
            _ => None,
        }
    }

    fn operand(&mut self, operand: &Operand) -> Result<Operand> {
        Ok(match operand {
            Operand::Constant(constant) => Operand::Constant(self.constant(constant)?),
            Operand::Member(member) => Operand::Member(self.member_ref(member)?),
            Operand::InvokeInterface { method, count } => Operand::InvokeInterface {
                method: self.member_ref(method)?,
                count: *count,
            },
            Operand::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                let name = match self.lambda_target(*bootstrap_method, name_and_type) {
                    Some((interface, erased)) => {
                        self.method_name(&interface, &name_and_type.name, &erased)?
                    }
                    None => Arc::clone(&name_and_type.name),
                };
                Operand::InvokeDynamic {
                    bootstrap_method: *bootstrap_method,
                    name_and_type: NameAndType {
                        name,
                        descriptor: self.descriptor(&name_and_type.descriptor)?,
                    },
                }
            }
            Operand::Class(name) => Operand::Class(self.class_ref(name)?),
            Operand::MultiANewArray { class, dimensions } => Operand::MultiANewArray {
                class: self.class_ref(class)?,
                dimensions: *dimensions,
            },
            other => other.clone(),
        })
    }

    fn code(&mut self, code: &Code) -> Result<Code> {
        let mut instructions = Vec::with_capacity(code.instructions.len());
        for instruction in &code.instructions {
            instructions.push(Instruction {
                offset: instruction.offset,
                opcode: instruction.opcode,
                operand: self.operand(&instruction.operand)?,
            });
        }
        let exception_table = code
            .exception_table
            .iter()
            .map(|handler| ExceptionHandler {
                catch_type: handler.catch_type.as_ref().map(|c| self.class_name(c)),
                ..handler.clone()
            })
            .collect();
        Ok(Code {
            max_stack: code.max_stack,
            max_locals: code.max_locals,
            instructions,
            exception_table,
            attributes: self.attributes(&code.attributes, SignatureKind::Field)?,
        })
    }

    fn verification_type(&self, ty: &VerificationType) -> Result<VerificationType> {
        Ok(match ty {
            VerificationType::Object(name) => VerificationType::Object(self.class_ref(name)?),
            other => other.clone(),
        })
    }

    fn verification_types(&self, types: &[VerificationType]) -> Result<Vec<VerificationType>> {
        types.iter().map(|ty| self.verification_type(ty)).collect()
    }

    fn frame(&self, frame: &StackMapFrame) -> Result<StackMapFrame> {
        Ok(match frame {
            StackMapFrame::SameLocals1StackItem { frame_type, stack } => {
                StackMapFrame::SameLocals1StackItem {
                    frame_type: *frame_type,
                    stack: self.verification_type(stack)?,
                }
            }
            StackMapFrame::SameLocals1StackItemExtended {
                offset_delta,
                stack,
            } => StackMapFrame::SameLocals1StackItemExtended {
                offset_delta: *offset_delta,
                stack: self.verification_type(stack)?,
            },
            StackMapFrame::Append {
                frame_type,
                offset_delta,
                locals,
            } => StackMapFrame::Append {
                frame_type: *frame_type,
                offset_delta: *offset_delta,
                locals: self.verification_types(locals)?,
            },
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => StackMapFrame::Full {
                offset_delta: *offset_delta,
                locals: self.verification_types(locals)?,
                stack: self.verification_types(stack)?,
            },
            other => other.clone(),
        })
    }

    fn attributes(&mut self, attributes: &[Attribute], kind: SignatureKind) -> Result<Vec<Attribute>> {
        let mut rewritten = Vec::with_capacity(attributes.len());
        for attribute in attributes {
            rewritten.push(self.attribute(attribute, kind)?);
        }
        Ok(rewritten)
    }

    fn attribute(&mut self, attribute: &Attribute, kind: SignatureKind) -> Result<Attribute> {
        Ok(match attribute {
            Attribute::Code(code) => Attribute::Code(self.code(code)?),
            Attribute::StackMapTable(frames) => Attribute::StackMapTable(
                frames
                    .iter()
                    .map(|frame| self.frame(frame))
                    .collect::<Result<_>>()?,
            ),
            Attribute::Exceptions(names) => {
                Attribute::Exceptions(names.iter().map(|n| self.class_name(n)).collect())
            }
            Attribute::InnerClasses(entries) => {
                Attribute::InnerClasses(entries.iter().map(|e| self.inner_class(e)).collect())
            }
            Attribute::EnclosingMethod { class, method } => {
                let method = match method {
                    Some(method) => Some(NameAndType {
                        name: self.method_name(class, &method.name, &method.descriptor)?,
                        descriptor: self.descriptor(&method.descriptor)?,
                    }),
                    None => None,
                };
                Attribute::EnclosingMethod {
                    class: self.class_name(class),
                    method,
                }
            }
            Attribute::Signature(signature) => Attribute::Signature(self.signature(signature, kind)),
            Attribute::SourceFile(name) => Attribute::SourceFile(self.source_file(name)),
            Attribute::LocalVariableTable(variables) => {
                Attribute::LocalVariableTable(self.local_variables(variables, false))
            }
            Attribute::LocalVariableTypeTable(variables) => {
                Attribute::LocalVariableTypeTable(self.local_variables(variables, true))
            }
            Attribute::RuntimeVisibleAnnotations(annotations) => {
                Attribute::RuntimeVisibleAnnotations(self.annotations(annotations)?)
            }
            Attribute::RuntimeInvisibleAnnotations(annotations) => {
                Attribute::RuntimeInvisibleAnnotations(self.annotations(annotations)?)
            }
            Attribute::RuntimeVisibleParameterAnnotations(parameters) => {
                Attribute::RuntimeVisibleParameterAnnotations(self.parameter_annotations(parameters)?)
            }
            Attribute::RuntimeInvisibleParameterAnnotations(parameters) => {
                Attribute::RuntimeInvisibleParameterAnnotations(
                    self.parameter_annotations(parameters)?,
                )
            }
            Attribute::RuntimeVisibleTypeAnnotations(annotations) => {
                Attribute::RuntimeVisibleTypeAnnotations(self.type_annotations(annotations)?)
            }
            Attribute::RuntimeInvisibleTypeAnnotations(annotations) => {
                Attribute::RuntimeInvisibleTypeAnnotations(self.type_annotations(annotations)?)
            }
            Attribute::AnnotationDefault(value) => {
                Attribute::AnnotationDefault(self.element_value(value)?)
            }
            Attribute::BootstrapMethods(methods) => {
                let mut rewritten = Vec::with_capacity(methods.len());
                for method in methods {
                    let mut arguments = Vec::with_capacity(method.arguments.len());
                    for argument in &method.arguments {
                        arguments.push(self.constant(argument)?);
                    }
                    rewritten.push(BootstrapMethod {
                        method: self.constant(&method.method)?,
                        arguments,
                    });
                }
                Attribute::BootstrapMethods(rewritten)
            }
            Attribute::NestHost(host) => Attribute::NestHost(self.class_name(host)),
            Attribute::NestMembers(members) => {
                Attribute::NestMembers(members.iter().map(|m| self.class_name(m)).collect())
            }
            Attribute::PermittedSubclasses(subclasses) => Attribute::PermittedSubclasses(
                subclasses.iter().map(|s| self.class_name(s)).collect(),
            ),
            Attribute::Record(components) => {
                let mut rewritten = Vec::with_capacity(components.len());
                for component in components {
                    rewritten.push(self.record_component(component)?);
                }
                Attribute::Record(rewritten)
            }
            Attribute::Module(module) => Attribute::Module(self.module(module)),
            Attribute::ModulePackages(packages) => {
                let mut rewritten = packages.clone();
                for package in packages {
                    let moved = self.package_name(package);
                    if !rewritten.contains(&moved) {
                        rewritten.push(moved);
                    }
                }
                Attribute::ModulePackages(rewritten)
            }
            Attribute::ModuleMainClass(class) => Attribute::ModuleMainClass(self.class_name(class)),
            Attribute::ConstantValue(_)
            | Attribute::Synthetic
            | Attribute::Deprecated
            | Attribute::LineNumberTable(_)
            | Attribute::MethodParameters(_)
            | Attribute::Unknown { .. } => attribute.clone(),
        })
    }

    fn module(&self, module: &Module) -> Module {
        let module_packages = |packages: &[ModulePackage]| -> Vec<ModulePackage> {
            packages
                .iter()
                .map(|entry| ModulePackage {
                    package: self.package_name(&entry.package),
                    ..entry.clone()
                })
                .collect()
        };
        Module {
            exports: module_packages(&module.exports),
            opens: module_packages(&module.opens),
            uses: module.uses.iter().map(|s| self.class_name(s)).collect(),
            provides: module
                .provides
                .iter()
                .map(|provides| ModuleProvides {
                    service: self.class_name(&provides.service),
                    with: provides.with.iter().map(|c| self.class_name(c)).collect(),
                })
                .collect(),
            ..module.clone()
        }
    }

    fn package_name(&self, package: &Arc<str>) -> Arc<str> {
        self.remapper
            .symbols
            .resolve_package(package)
            .map_or_else(|| Arc::clone(package), Arc::from)
    }

    fn record_component(&mut self, component: &RecordComponent) -> Result<RecordComponent> {
        let name = self
            .remapper
            .symbols
            .resolve_field(&self.class.name, &component.name, &component.descriptor)
            .map_or_else(|| Arc::clone(&component.name), Arc::from);
        Ok(RecordComponent {
            name,
            descriptor: self.descriptor(&component.descriptor)?,
            attributes: self.attributes(&component.attributes, SignatureKind::Field)?,
        })
    }

    fn signature(&mut self, signature: &Arc<str>, kind: SignatureKind) -> Arc<str> {
        let symbols = self.remapper.symbols;
        let mapped = match kind {
            SignatureKind::Class => map_class_signature(signature, symbols),
            SignatureKind::Method => map_method_signature(signature, symbols),
            SignatureKind::Field => map_field_signature(signature, symbols),
        };
        match mapped {
            Ok(mapped) => Arc::from(mapped),
            Err(err) => {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::DescriptorRewriteFailure,
                    self.subject.clone(),
                    format!("{err}, left unchanged"),
                ));
                Arc::clone(signature)
            }
        }
    }

    fn local_variables(&mut self, variables: &[LocalVariable], signatures: bool) -> Vec<LocalVariable> {
        let symbols = self.remapper.symbols;
        variables
            .iter()
            .map(|variable| {
                let mapped = if signatures {
                    map_field_signature(&variable.descriptor, symbols).map_err(|e| e.to_string())
                } else {
                    map_field_descriptor(&variable.descriptor, symbols).map_err(|e| e.to_string())
                };
                let descriptor = match mapped {
                    Ok(mapped) => Arc::from(mapped),
                    Err(err) => {
                        self.diagnostics.push(Diagnostic::new(
                            DiagnosticKind::DebugAttribute,
                            format!("{} local {}", self.subject, variable.name),
                            err,
                        ));
                        Arc::clone(&variable.descriptor)
                    }
                };
                LocalVariable {
                    descriptor,
                    ..variable.clone()
                }
            })
            .collect()
    }

    fn source_file(&self, name: &Arc<str>) -> Arc<str> {
        if !self.remapper.rebuild_source_file_names {
            return Arc::clone(name);
        }
        match self.remapper.symbols.resolve_class(&self.class.name) {
            Some(new) if new != self.class.name.as_ref() => {
                let simple = new.rsplit('/').next().unwrap_or(new);
                let outer = simple.split('$').next().unwrap_or(simple);
                Arc::from(format!("{outer}.java"))
            }
            _ => Arc::clone(name),
        }
    }

    fn inner_class(&self, entry: &InnerClass) -> InnerClass {
        let inner_class = self.class_name(&entry.inner_class);
        let outer_class = entry.outer_class.as_ref().map(|o| self.class_name(o));
        let inner_name = match &entry.inner_name {
            Some(simple) if inner_class != entry.inner_class => Some(
                simple_inner_name(&inner_class, outer_class.as_deref())
                    .map_or_else(|| Arc::clone(simple), Arc::from),
            ),
            other => other.clone(),
        };
        InnerClass {
            inner_class,
            outer_class,
            inner_name,
            access_flags: entry.access_flags,
        }
    }

    fn annotations(&mut self, annotations: &[Annotation]) -> Result<Vec<Annotation>> {
        let mut rewritten = Vec::with_capacity(annotations.len());
        for annotation in annotations {
            rewritten.push(self.annotation(annotation)?);
        }
        Ok(rewritten)
    }

    fn parameter_annotations(&mut self, parameters: &[Vec<Annotation>]) -> Result<Vec<Vec<Annotation>>> {
        let mut rewritten = Vec::with_capacity(parameters.len());
        for annotations in parameters {
            rewritten.push(self.annotations(annotations)?);
        }
        Ok(rewritten)
    }

    fn type_annotations(&mut self, annotations: &[TypeAnnotation]) -> Result<Vec<TypeAnnotation>> {
        let mut rewritten = Vec::with_capacity(annotations.len());
        for annotation in annotations {
            rewritten.push(TypeAnnotation {
                target: annotation.target.clone(),
                annotation: self.annotation(&annotation.annotation)?,
            });
        }
        Ok(rewritten)
    }

    fn annotation(&mut self, annotation: &Annotation) -> Result<Annotation> {
        let annotation_type = object_type(&annotation.type_descriptor);
        let mut elements = Vec::with_capacity(annotation.elements.len());
        for (name, value) in &annotation.elements {
            let name = match annotation_type {
                Some(annotation_type) => self.element_name(annotation_type, name)?,
                None => Arc::clone(name),
            };
            elements.push((name, self.element_value(value)?));
        }
        Ok(Annotation {
            type_descriptor: self.descriptor(&annotation.type_descriptor)?,
            elements,
        })
    }

    /// Element names are the names of the annotation interface's methods.
    fn element_name(&mut self, annotation_type: &str, name: &Arc<str>) -> Result<Arc<str>> {
        let declared = self
            .remapper
            .resolver
            .get(annotation_type)?
            .and_then(|model| {
                model
                    .methods
                    .iter()
                    .find(|m| m.name == *name && m.descriptor.starts_with("()"))
                    .map(|m| Arc::clone(&m.descriptor))
            });
        if let Some(descriptor) = declared {
            return self.method_name(annotation_type, name, &descriptor);
        }
        let listed = self.remapper.symbols.methods().find(|(key, _)| {
            key.owner.as_ref() == annotation_type
                && key.name == *name
                && key.descriptor.starts_with("()")
        });
        Ok(listed.map_or_else(|| Arc::clone(name), |(_, new)| Arc::clone(new)))
    }

    fn element_value(&mut self, value: &ElementValue) -> Result<ElementValue> {
        Ok(match value {
            ElementValue::Const { .. } => value.clone(),
            ElementValue::Enum {
                type_descriptor,
                const_name,
            } => {
                let const_name = match object_type(type_descriptor) {
                    Some(enum_type) => self.field_name(enum_type, const_name, type_descriptor)?,
                    None => Arc::clone(const_name),
                };
                ElementValue::Enum {
                    type_descriptor: self.descriptor(type_descriptor)?,
                    const_name,
                }
            }
            ElementValue::Class(descriptor) if descriptor.as_ref() == "V" => value.clone(),
            ElementValue::Class(descriptor) => ElementValue::Class(self.descriptor(descriptor)?),
            ElementValue::Annotation(annotation) => {
                ElementValue::Annotation(self.annotation(annotation)?)
            }
            ElementValue::Array(values) => {
                let mut rewritten = Vec::with_capacity(values.len());
                for value in values {
                    rewritten.push(self.element_value(value)?);
                }
                ElementValue::Array(rewritten)
            }
        })
    }
}

fn object_type(descriptor: &str) -> Option<&str> {
    descriptor.strip_prefix('L')?.strip_suffix(';')
}

/// The simple name of a nested class after a rename: whatever follows `Outer$`, or the
/// last `$` segment when the outer class is unknown.
fn simple_inner_name<'n>(inner_class: &'n str, outer_class: Option<&str>) -> Option<&'n str> {
    if let Some(rest) = outer_class
        .and_then(|outer| inner_class.strip_prefix(outer))
        .and_then(|rest| rest.strip_prefix('$'))
    {
        return (!rest.is_empty()).then_some(rest);
    }
    let simple = inner_class.rsplit('/').next()?;
    let simple = simple.rsplit_once('$').map_or(simple, |(_, simple)| simple);
    (!simple.is_empty()).then_some(simple)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        class::attributes::InnerClass,
        consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag, opcodes::*},
        hierarchy::MemoryClassPath,
        mapping::parse_mappings,
    };

    fn class(name: &str) -> ClassModel {
        ClassModel {
            minor_version: 0,
            major_version: 52,
            access_flags: ClassAccessFlag::PUBLIC | ClassAccessFlag::SUPER,
            name: name.into(),
            super_class: Some("java/lang/Object".into()),
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        }
    }

    fn method(name: &str, descriptor: &str, instructions: Vec<(u8, Operand)>) -> MethodModel {
        let mut offset = 0;
        let instructions = instructions
            .into_iter()
            .map(|(opcode, operand)| {
                let instruction = Instruction {
                    offset,
                    opcode,
                    operand,
                };
                offset += instruction.len() as u32;
                instruction
            })
            .collect();
        MethodModel {
            access_flags: MethodAccessFlag::PUBLIC,
            name: name.into(),
            descriptor: descriptor.into(),
            attributes: vec![Attribute::Code(Code {
                max_stack: 2,
                max_locals: 1,
                instructions,
                exception_table: vec![],
                attributes: vec![],
            })],
        }
    }

    fn invoke(kind: MemberKind, owner: &str, name: &str, descriptor: &str) -> Operand {
        Operand::Member(MemberRef {
            kind,
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        })
    }

    fn run(classes: Vec<ClassModel>, mappings: &str, config: &RemapConfig) -> Result<Vec<Remapped>> {
        let resolver = HierarchyResolver::with_config(Arc::new(MemoryClassPath::new()), config);
        let classes: Vec<Arc<ClassModel>> = classes.into_iter().map(Arc::new).collect();
        for class in &classes {
            resolver.seed(Arc::clone(class));
        }
        let symbols = parse_mappings(mappings)?;
        let remapper = Remapper::new(&symbols, &resolver, &classes, config)?;
        classes.iter().map(|class| remapper.remap(class)).collect()
    }

    fn instructions(method: &MethodModel) -> Vec<Operand> {
        method
            .code()
            .map(|code| code.instructions.iter().map(|i| i.operand.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn renames_declarations_and_references() {
        let mut a = class("A");
        a.fields.push(FieldModel {
            access_flags: FieldAccessFlag::PRIVATE,
            name: "other".into(),
            descriptor: "LB;".into(),
            attributes: vec![],
        });
        a.methods.push(method(
            "run",
            "()V",
            vec![
                (ALOAD_0, Operand::None),
                (GETFIELD, invoke(MemberKind::Field, "A", "other", "LB;")),
                (INVOKEVIRTUAL, invoke(MemberKind::Method, "B", "value", "()I")),
                (POP, Operand::None),
                (RETURN, Operand::None),
            ],
        ));
        let mut b = class("B");
        b.methods.push(method("value", "()I", vec![(ICONST_0, Operand::None), (IRETURN, Operand::None)]));

        let remapped = run(
            vec![a, b],
            "class A AA\nclass B BB\nmethod A.run ()V runAA\nmethod B.value ()I valueBB\nfield A.other LB; peer\n",
            &RemapConfig::default(),
        )
        .unwrap();
        let a = &remapped[0].class;
        assert_eq!(a.name.as_ref(), "AA");
        assert_eq!(a.fields[0].name.as_ref(), "peer");
        assert_eq!(a.fields[0].descriptor.as_ref(), "LBB;");
        assert_eq!(a.methods[0].name.as_ref(), "runAA");
        assert_eq!(
            instructions(&a.methods[0]),
            [
                Operand::None,
                invoke(MemberKind::Field, "AA", "peer", "LBB;"),
                invoke(MemberKind::Method, "BB", "valueBB", "()I"),
                Operand::None,
                Operand::None,
            ]
        );
        assert_eq!(remapped[1].class.methods[0].name.as_ref(), "valueBB");
    }

    #[test]
    fn inherited_references_follow_the_declaring_class() {
        let mut base = class("p/Base");
        base.methods.push(method("tick", "()V", vec![(RETURN, Operand::None)]));
        let mut child = class("p/Child");
        child.super_class = Some("p/Base".into());
        child.methods.push(method(
            "go",
            "()V",
            vec![
                (ALOAD_0, Operand::None),
                (INVOKEVIRTUAL, invoke(MemberKind::Method, "p/Child", "tick", "()V")),
                (RETURN, Operand::None),
            ],
        ));
        let remapped = run(vec![base, child], "method p/Base.tick ()V step\n", &RemapConfig::default())
            .unwrap();
        assert_eq!(
            instructions(&remapped[1].class.methods[0])[1],
            invoke(MemberKind::Method, "p/Child", "step", "()V")
        );
    }

    #[test]
    fn lambda_call_sites_follow_the_interface_method() {
        let mut task = class("p/Task");
        task.access_flags = ClassAccessFlag::PUBLIC | ClassAccessFlag::INTERFACE | ClassAccessFlag::ABSTRACT;
        task.methods.push(MethodModel {
            access_flags: MethodAccessFlag::PUBLIC | MethodAccessFlag::ABSTRACT,
            name: "call".into(),
            descriptor: "()V".into(),
            attributes: vec![],
        });
        let mut user = class("p/User");
        user.methods.push(method(
            "make",
            "()Lp/Task;",
            vec![
                (
                    INVOKEDYNAMIC,
                    Operand::InvokeDynamic {
                        bootstrap_method: 0,
                        name_and_type: NameAndType {
                            name: "call".into(),
                            descriptor: "()Lp/Task;".into(),
                        },
                    },
                ),
                (ARETURN, Operand::None),
            ],
        ));
        user.attributes.push(Attribute::BootstrapMethods(vec![BootstrapMethod {
            method: Constant::MethodHandle {
                kind: 6,
                reference: MemberRef {
                    kind: MemberKind::Method,
                    owner: LAMBDA_METAFACTORY.into(),
                    name: "metafactory".into(),
                    descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;".into(),
                },
            },
            arguments: vec![Constant::MethodType("()V".into())],
        }]));

        let remapped = run(
            vec![task, user],
            "class p/Task p/Job\nmethod p/Task.call ()V execute\n",
            &RemapConfig::default(),
        )
        .unwrap();
        assert_eq!(
            instructions(&remapped[1].class.methods[0])[0],
            Operand::InvokeDynamic {
                bootstrap_method: 0,
                name_and_type: NameAndType {
                    name: "execute".into(),
                    descriptor: "()Lp/Job;".into(),
                },
            }
        );
    }

    #[test]
    fn inner_classes_and_source_files() {
        let mut outer = class("a/Outer");
        outer.attributes = vec![
            Attribute::SourceFile("Outer.java".into()),
            Attribute::InnerClasses(vec![InnerClass {
                inner_class: "a/Outer$Node".into(),
                outer_class: Some("a/Outer".into()),
                inner_name: Some("Node".into()),
                access_flags: 0x0009,
            }]),
        ];
        let config = RemapConfig {
            rebuild_source_file_names: true,
            ..RemapConfig::default()
        };
        let remapped = run(
            vec![outer],
            "class a/Outer b/Tree\nclass a/Outer$Node b/Tree$Leaf\n",
            &config,
        )
        .unwrap();
        assert_eq!(
            remapped[0].class.attributes,
            [
                Attribute::SourceFile("Tree.java".into()),
                Attribute::InnerClasses(vec![InnerClass {
                    inner_class: "b/Tree$Leaf".into(),
                    outer_class: Some("b/Tree".into()),
                    inner_name: Some("Leaf".into()),
                    access_flags: 0x0009,
                }]),
            ]
        );
    }

    #[test]
    fn annotation_elements_and_enum_constants() {
        let mut marker = class("a/Marker");
        marker.access_flags = ClassAccessFlag::INTERFACE | ClassAccessFlag::ANNOTATION | ClassAccessFlag::ABSTRACT;
        marker.methods.push(MethodModel {
            access_flags: MethodAccessFlag::PUBLIC | MethodAccessFlag::ABSTRACT,
            name: "level".into(),
            descriptor: "()La/Level;".into(),
            attributes: vec![],
        });
        let mut level = class("a/Level");
        level.fields.push(FieldModel {
            access_flags: FieldAccessFlag::PUBLIC | FieldAccessFlag::STATIC | FieldAccessFlag::ENUM,
            name: "HIGH".into(),
            descriptor: "La/Level;".into(),
            attributes: vec![],
        });
        let mut user = class("a/User");
        user.attributes.push(Attribute::RuntimeVisibleAnnotations(vec![Annotation {
            type_descriptor: "La/Marker;".into(),
            elements: vec![(
                "level".into(),
                ElementValue::Enum {
                    type_descriptor: "La/Level;".into(),
                    const_name: "HIGH".into(),
                },
            )],
        }]));
        let remapped = run(
            vec![marker, level, user],
            "class a/Level a/Grade\nmethod a/Marker.level ()La/Level; grade\nfield a/Level.HIGH La/Level; TOP\n",
            &RemapConfig::default(),
        )
        .unwrap();
        assert_eq!(
            remapped[2].class.attributes,
            [Attribute::RuntimeVisibleAnnotations(vec![Annotation {
                type_descriptor: "La/Marker;".into(),
                elements: vec![(
                    "grade".into(),
                    ElementValue::Enum {
                        type_descriptor: "La/Grade;".into(),
                        const_name: "TOP".into(),
                    },
                )],
            }])]
        );
    }

    #[test]
    fn member_collisions_are_rejected() {
        let mut a = class("A");
        for name in ["x", "y"] {
            a.fields.push(FieldModel {
                access_flags: FieldAccessFlag::PRIVATE,
                name: name.into(),
                descriptor: "I".into(),
                attributes: vec![],
            });
        }
        let err = run(vec![a], "field A.x I y\n", &RemapConfig::default()).unwrap_err();
        assert!(matches!(err, RemapError::AmbiguousMapping(_)), "{err}");

        let err = run(vec![class("A"), class("B")], "class A B\n", &RemapConfig::default())
            .unwrap_err();
        assert!(matches!(err, RemapError::AmbiguousMapping(_)), "{err}");
    }

    #[test]
    fn malformed_descriptors_only_affect_their_member() {
        let mut a = class("A");
        a.fields.push(FieldModel {
            access_flags: FieldAccessFlag::PUBLIC,
            name: "broken".into(),
            descriptor: "LA".into(),
            attributes: vec![],
        });
        a.fields.push(FieldModel {
            access_flags: FieldAccessFlag::PUBLIC,
            name: "fine".into(),
            descriptor: "LA;".into(),
            attributes: vec![],
        });
        let remapped = run(vec![a], "class A Z\n", &RemapConfig::default()).unwrap();
        let class = &remapped[0].class;
        assert_eq!(class.name.as_ref(), "Z");
        assert_eq!(class.fields[0].descriptor.as_ref(), "LA");
        assert_eq!(class.fields[1].descriptor.as_ref(), "LZ;");
        assert_eq!(remapped[0].diagnostics.len(), 1);
        assert_eq!(
            remapped[0].diagnostics[0].kind,
            DiagnosticKind::DescriptorRewriteFailure
        );
    }

    #[test]
    fn single_class_entry_point() {
        let symbols = parse_mappings("class A B\n").unwrap();
        let resolver = HierarchyResolver::new(Arc::new(MemoryClassPath::new()));
        let remapped = remap(&class("A"), &symbols, &resolver).unwrap();
        assert_eq!(remapped.class.name.as_ref(), "B");
    }

    #[test]
    fn nested_simple_names() {
        assert_eq!(simple_inner_name("b/Tree$Leaf", Some("b/Tree")), Some("Leaf"));
        assert_eq!(simple_inner_name("b/Leaf", Some("b/Tree")), Some("Leaf"));
        assert_eq!(simple_inner_name("b/X$Y$Z", None), Some("Z"));
    }
}
