use std::sync::Arc;

use crate::{
    class::{
        attributes::{Attribute, Code, decode_attributes},
        constant::ConstantPool,
        structs::{Class, MemberInfo},
    },
    consts::{ClassAccessFlag, FieldAccessFlag, MethodAccessFlag},
    error::ClassReadError,
};

/// A class with every constant pool reference resolved to the value it names.
///
/// Models are never edited in place by the engine, the remapper builds a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassModel {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: ClassAccessFlag,
    pub name: Arc<str>,
    /// `None` only for `java/lang/Object` and `module-info`.
    pub super_class: Option<Arc<str>>,
    pub interfaces: Vec<Arc<str>>,
    pub fields: Vec<FieldModel>,
    pub methods: Vec<MethodModel>,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldModel {
    pub access_flags: FieldAccessFlag,
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodModel {
    pub access_flags: MethodAccessFlag,
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
    pub attributes: Vec<Attribute>,
}

impl ClassModel {
    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlag::INTERFACE)
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodModel> {
        self.methods
            .iter()
            .find(|m| m.name.as_ref() == name && m.descriptor.as_ref() == descriptor)
    }

    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&FieldModel> {
        self.fields
            .iter()
            .find(|f| f.name.as_ref() == name && f.descriptor.as_ref() == descriptor)
    }

    /// Internal name of the package, empty for the default package.
    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    pub fn source_file(&self) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::SourceFile(name) => Some(name.as_ref()),
            _ => None,
        })
    }

    /// Direct supertypes, superclass first then interfaces in declaration order.
    pub fn supertypes(&self) -> impl Iterator<Item = &Arc<str>> {
        self.super_class.iter().chain(self.interfaces.iter())
    }
}

impl MethodModel {
    pub fn code(&self) -> Option<&Code> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Code(code) => Some(code),
            _ => None,
        })
    }
}

pub fn package_of(class_name: &str) -> &str {
    class_name.rsplit_once('/').map_or("", |(package, _)| package)
}

pub(crate) fn lift_class(class: &Class) -> Result<ClassModel, ClassReadError> {
    let pool = ConstantPool::new(&class.constant_pool);
    let interfaces = class
        .interfaces
        .iter()
        .map(|&index| pool.class_name(index))
        .collect::<Result<Vec<_>, _>>()?;
    let fields = class
        .fields
        .iter()
        .map(|field| {
            let (name, descriptor, attributes) = lift_member(field, &pool)?;
            Ok(FieldModel {
                access_flags: FieldAccessFlag::from_bits_retain(field.access_flags),
                name,
                descriptor,
                attributes,
            })
        })
        .collect::<Result<Vec<_>, ClassReadError>>()?;
    let methods = class
        .methods
        .iter()
        .map(|method| {
            let (name, descriptor, attributes) = lift_member(method, &pool)?;
            Ok(MethodModel {
                access_flags: MethodAccessFlag::from_bits_retain(method.access_flags),
                name,
                descriptor,
                attributes,
            })
        })
        .collect::<Result<Vec<_>, ClassReadError>>()?;

    Ok(ClassModel {
        minor_version: class.minor_version,
        major_version: class.major_version,
        access_flags: ClassAccessFlag::from_bits_retain(class.access_flags),
        name: pool.class_name(class.this_class)?,
        super_class: pool.optional_class_name(class.super_class)?,
        interfaces,
        fields,
        methods,
        attributes: decode_attributes(&class.attributes, &pool)?,
    })
}

type LiftedMember = (Arc<str>, Arc<str>, Vec<Attribute>);

fn lift_member(member: &MemberInfo, pool: &ConstantPool) -> Result<LiftedMember, ClassReadError> {
    Ok((
        pool.utf8(member.name_index)?,
        pool.utf8(member.descriptor_index)?,
        decode_attributes(&member.attributes, pool)?,
    ))
}
