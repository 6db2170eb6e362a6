use std::{fmt, sync::Arc};

use once_cell::unsync::OnceCell;

use crate::{class::structs::ConstantPoolInfo, error::ClassReadError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

/// A symbolic `Fieldref`, `Methodref` or `InterfaceMethodref`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub kind: MemberKind,
    pub owner: Arc<str>,
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MemberKind::Field => write!(f, "{}.{}:{}", self.owner, self.name, self.descriptor),
            _ => write!(f, "{}.{}{}", self.owner, self.name, self.descriptor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameAndType {
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
}

/// A constant pool entry with every index replaced by what it points at.
///
/// Floating point values keep their raw IEEE bits so NaN payloads survive a round trip
/// and constants can be used as hash keys during pool deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Utf8(Arc<str>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(Arc<str>),
    String(Arc<str>),
    Member(MemberRef),
    NameAndType(NameAndType),
    MethodHandle { kind: u8, reference: MemberRef },
    MethodType(Arc<str>),
    Dynamic {
        bootstrap_method: u16,
        name_and_type: NameAndType,
    },
    InvokeDynamic {
        bootstrap_method: u16,
        name_and_type: NameAndType,
    },
    Module(Arc<str>),
    Package(Arc<str>),
}

impl Constant {
    /// Constants that occupy two pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    /// Whether `ldc`/`ldc_w`/`ldc2_w` may push this constant.
    pub fn is_loadable(&self) -> bool {
        matches!(
            self,
            Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_)
                | Constant::Class(_)
                | Constant::String(_)
                | Constant::MethodHandle { .. }
                | Constant::MethodType(_)
                | Constant::Dynamic { .. }
        )
    }
}

/// The constant pool a class file was read with, kept for attribute payloads that still
/// hold raw indices into it.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginalPool(pub(crate) Arc<[ConstantPoolInfo]>);

impl OriginalPool {
    pub(crate) fn entries(&self) -> &[ConstantPoolInfo] {
        &self.0
    }
}

/// Read-only view over a parsed pool that resolves indices into symbolic values.
pub(crate) struct ConstantPool<'a> {
    entries: &'a [ConstantPoolInfo],
    original: OnceCell<OriginalPool>,
}

impl<'a> ConstantPool<'a> {
    pub(crate) fn new(entries: &'a [ConstantPoolInfo]) -> Self {
        ConstantPool {
            entries,
            original: OnceCell::new(),
        }
    }

    /// A shared copy of the whole pool, made on first use.
    pub(crate) fn original(&self) -> OriginalPool {
        self.original
            .get_or_init(|| OriginalPool(Arc::from(self.entries)))
            .clone()
    }

    fn entry(&self, index: u16) -> Result<&'a ConstantPoolInfo, ClassReadError> {
        if index == 0 {
            return Err(ClassReadError::InvalidIndex(index));
        }
        match self.entries.get(index as usize - 1) {
            None | Some(ConstantPoolInfo::Empty) => Err(ClassReadError::InvalidIndex(index)),
            Some(entry) => Ok(entry),
        }
    }

    pub(crate) fn utf8(&self, index: u16) -> Result<Arc<str>, ClassReadError> {
        let ConstantPoolInfo::Utf8(string) = self.entry(index)? else {
            return Err(ClassReadError::UnexpectedConstant {
                index,
                expected: "Utf8",
            });
        };
        Ok(Arc::clone(string))
    }

    pub(crate) fn optional_utf8(&self, index: u16) -> Result<Option<Arc<str>>, ClassReadError> {
        if index == 0 {
            return Ok(None);
        }
        self.utf8(index).map(Some)
    }

    pub(crate) fn class_name(&self, index: u16) -> Result<Arc<str>, ClassReadError> {
        let ConstantPoolInfo::Class { name_index } = self.entry(index)? else {
            return Err(ClassReadError::UnexpectedConstant {
                index,
                expected: "Class",
            });
        };
        self.utf8(*name_index)
    }

    pub(crate) fn module_name(&self, index: u16) -> Result<Arc<str>, ClassReadError> {
        let ConstantPoolInfo::Module { name_index } = self.entry(index)? else {
            return Err(ClassReadError::UnexpectedConstant {
                index,
                expected: "Module",
            });
        };
        self.utf8(*name_index)
    }

    pub(crate) fn package_name(&self, index: u16) -> Result<Arc<str>, ClassReadError> {
        let ConstantPoolInfo::Package { name_index } = self.entry(index)? else {
            return Err(ClassReadError::UnexpectedConstant {
                index,
                expected: "Package",
            });
        };
        self.utf8(*name_index)
    }

    /// Index 0 means "none" for superclass, outer class and catch type slots.
    pub(crate) fn optional_class_name(
        &self,
        index: u16,
    ) -> Result<Option<Arc<str>>, ClassReadError> {
        if index == 0 {
            return Ok(None);
        }
        self.class_name(index).map(Some)
    }

    pub(crate) fn name_and_type(&self, index: u16) -> Result<NameAndType, ClassReadError> {
        let ConstantPoolInfo::NameAndType {
            name_index,
            descriptor_index,
        } = self.entry(index)?
        else {
            return Err(ClassReadError::UnexpectedConstant {
                index,
                expected: "NameAndType",
            });
        };
        Ok(NameAndType {
            name: self.utf8(*name_index)?,
            descriptor: self.utf8(*descriptor_index)?,
        })
    }

    pub(crate) fn member_ref(&self, index: u16) -> Result<MemberRef, ClassReadError> {
        let (kind, class_index, name_and_type_index) = match self.entry(index)? {
            ConstantPoolInfo::Fieldref {
                class_index,
                name_and_type_index,
            } => (MemberKind::Field, class_index, name_and_type_index),
            ConstantPoolInfo::Methodref {
                class_index,
                name_and_type_index,
            } => (MemberKind::Method, class_index, name_and_type_index),
            ConstantPoolInfo::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => (MemberKind::InterfaceMethod, class_index, name_and_type_index),
            _ => {
                return Err(ClassReadError::UnexpectedConstant {
                    index,
                    expected: "member reference",
                });
            }
        };
        let NameAndType { name, descriptor } = self.name_and_type(*name_and_type_index)?;
        Ok(MemberRef {
            kind,
            owner: self.class_name(*class_index)?,
            name,
            descriptor,
        })
    }

    pub(crate) fn constant(&self, index: u16) -> Result<Constant, ClassReadError> {
        let constant = match self.entry(index)? {
            ConstantPoolInfo::Utf8(string) => Constant::Utf8(Arc::clone(string)),
            ConstantPoolInfo::Integer(v) => Constant::Integer(*v),
            ConstantPoolInfo::Float(bits) => Constant::Float(*bits),
            ConstantPoolInfo::Long(v) => Constant::Long(*v),
            ConstantPoolInfo::Double(bits) => Constant::Double(*bits),
            ConstantPoolInfo::Class { name_index } => Constant::Class(self.utf8(*name_index)?),
            ConstantPoolInfo::String { string_index } => {
                Constant::String(self.utf8(*string_index)?)
            }
            ConstantPoolInfo::Fieldref { .. }
            | ConstantPoolInfo::Methodref { .. }
            | ConstantPoolInfo::InterfaceMethodref { .. } => {
                Constant::Member(self.member_ref(index)?)
            }
            ConstantPoolInfo::NameAndType { .. } => {
                Constant::NameAndType(self.name_and_type(index)?)
            }
            ConstantPoolInfo::MethodHandle {
                reference_kind,
                reference_index,
            } => Constant::MethodHandle {
                kind: *reference_kind,
                reference: self.member_ref(*reference_index)?,
            },
            ConstantPoolInfo::MethodType { descriptor_index } => {
                Constant::MethodType(self.utf8(*descriptor_index)?)
            }
            ConstantPoolInfo::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => Constant::Dynamic {
                bootstrap_method: *bootstrap_method_attr_index,
                name_and_type: self.name_and_type(*name_and_type_index)?,
            },
            ConstantPoolInfo::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => Constant::InvokeDynamic {
                bootstrap_method: *bootstrap_method_attr_index,
                name_and_type: self.name_and_type(*name_and_type_index)?,
            },
            ConstantPoolInfo::Module { name_index } => Constant::Module(self.utf8(*name_index)?),
            ConstantPoolInfo::Package { name_index } => Constant::Package(self.utf8(*name_index)?),
            ConstantPoolInfo::Empty => return Err(ClassReadError::InvalidIndex(index)),
        };
        Ok(constant)
    }

    pub(crate) fn loadable(&self, index: u16) -> Result<Constant, ClassReadError> {
        let constant = self.constant(index)?;
        if !constant.is_loadable() {
            return Err(ClassReadError::UnexpectedConstant {
                index,
                expected: "loadable constant",
            });
        }
        Ok(constant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<ConstantPoolInfo> {
        vec![
            ConstantPoolInfo::Utf8("a/Owner".into()),
            ConstantPoolInfo::Class { name_index: 1 },
            ConstantPoolInfo::Utf8("run".into()),
            ConstantPoolInfo::Utf8("()V".into()),
            ConstantPoolInfo::NameAndType {
                name_index: 3,
                descriptor_index: 4,
            },
            ConstantPoolInfo::Methodref {
                class_index: 2,
                name_and_type_index: 5,
            },
            ConstantPoolInfo::Long(1),
            ConstantPoolInfo::Empty,
        ]
    }

    #[test]
    fn resolves_member_refs() {
        let entries = pool();
        let pool = ConstantPool::new(&entries);
        let member = pool.member_ref(6).unwrap();
        assert_eq!(member.to_string(), "a/Owner.run()V");
        assert_eq!(member.kind, MemberKind::Method);
    }

    #[test]
    fn rejects_wrong_kind_and_holes() {
        let entries = pool();
        let pool = ConstantPool::new(&entries);
        assert!(matches!(
            pool.class_name(1),
            Err(ClassReadError::UnexpectedConstant { index: 1, .. })
        ));
        assert!(matches!(pool.constant(8), Err(ClassReadError::InvalidIndex(8))));
        assert!(matches!(pool.constant(0), Err(ClassReadError::InvalidIndex(0))));
        assert!(matches!(pool.constant(9), Err(ClassReadError::InvalidIndex(9))));
        assert!(pool.loadable(5).is_err());
    }
}
