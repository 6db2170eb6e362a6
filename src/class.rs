//! Class file codec.
//!
//! Bytes are first read into the on-disk layout ([`structs`]) and then lifted into a
//! [`ClassModel`] where every pool reference is replaced by its value. Writing goes the
//! other way and builds a new, deduplicated constant pool.

pub mod attributes;
pub mod code;
pub mod constant;
pub mod model;
pub(crate) mod parser;
pub(crate) mod structs;
pub(crate) mod writer;

pub use attributes::Attribute;
pub use code::{Instruction, Operand};
pub use constant::{Constant, MemberKind, MemberRef, NameAndType};
pub use model::{ClassModel, FieldModel, MethodModel};

use crate::error::{ClassReadError, ClassWriteError};

pub fn parse(bytes: &[u8]) -> Result<ClassModel, ClassReadError> {
    let class = parser::class_file(bytes)?;
    model::lift_class(&class)
}

pub fn serialize(class: &ClassModel) -> Result<Vec<u8>, ClassWriteError> {
    writer::write_class(class)
}
