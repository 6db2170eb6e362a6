use nom::{
    IResult, Parser,
    bytes::complete::take,
    error::{ErrorKind, ParseError},
    multi::count,
    number::complete::{be_i32, be_i64, be_u16, be_u32, be_u64, u8},
};

use crate::{
    class::structs::{AttributeInfo, Class, ConstantPoolInfo, MemberInfo, decode_modified_utf8},
    consts::{self, MAGIC, MAX_MAJOR_VERSION, MIN_MAJOR_VERSION},
    error::ClassReadError,
};

/// nom error carrying either a plain nom failure or a class-file specific one.
#[derive(Debug)]
pub(crate) enum ReadFailure {
    Nom(ErrorKind),
    Class(ClassReadError),
}

impl<I> ParseError<I> for ReadFailure {
    fn from_error_kind(_input: I, kind: ErrorKind) -> Self {
        ReadFailure::Nom(kind)
    }

    fn append(_input: I, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl From<nom::Err<ReadFailure>> for ClassReadError {
    fn from(err: nom::Err<ReadFailure>) -> Self {
        match err {
            nom::Err::Incomplete(_) => ClassReadError::UnexpectedEof,
            nom::Err::Error(failure) | nom::Err::Failure(failure) => match failure {
                ReadFailure::Nom(ErrorKind::Eof) => ClassReadError::UnexpectedEof,
                ReadFailure::Nom(kind) => ClassReadError::Syntax(format!("{kind:?}")),
                ReadFailure::Class(err) => err,
            },
        }
    }
}

pub(crate) type PResult<'a, T> = IResult<&'a [u8], T, ReadFailure>;

/// Lifts a class-level error into a nom failure so it aborts the whole parse.
pub(crate) fn lift<T>(result: Result<T, ClassReadError>) -> Result<T, nom::Err<ReadFailure>> {
    result.map_err(|err| nom::Err::Failure(ReadFailure::Class(err)))
}

pub(crate) fn class_file(input: &[u8]) -> Result<Class, ClassReadError> {
    let (rest, class) = parse_class(input)?;
    if !rest.is_empty() {
        return Err(ClassReadError::TrailingBytes(rest.len()));
    }
    Ok(class)
}

fn parse_class(input: &[u8]) -> PResult<'_, Class> {
    let (input, (minor, major)) = parse_header(input)?;
    let (input, constant_pool) = parse_constant_pool(input)?;

    let (input, access_flags) = be_u16(input)?;
    let (input, this_class) = be_u16(input)?;
    let (input, super_class) = be_u16(input)?;
    let (input, interfaces) = parse_interfaces(input)?;
    let (input, fields) = parse_members(input)?;
    let (input, methods) = parse_members(input)?;
    let (input, attributes) = parse_attributes(input)?;

    Ok((
        input,
        Class {
            major_version: major,
            minor_version: minor,
            access_flags,
            this_class,
            super_class,
            constant_pool,
            interfaces,
            fields,
            methods,
            attributes,
        },
    ))
}

fn parse_header(input: &[u8]) -> PResult<'_, (u16, u16)> {
    let (input, magic) = be_u32(input)?;
    if magic != MAGIC {
        return lift(Err(ClassReadError::InvalidMagic(magic)));
    }
    let (input, minor) = be_u16(input)?;
    let (input, major) = be_u16(input)?;
    // since Java 12 the minor version is either 0 or the preview marker
    let preview_ok = major < 56 || minor == 0 || minor == 0xffff;
    if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major) || !preview_ok {
        return lift(Err(ClassReadError::UnsupportedVersion { major, minor }));
    }
    Ok((input, (minor, major)))
}

fn parse_constant_pool(input: &[u8]) -> PResult<'_, Vec<ConstantPoolInfo>> {
    let (input, constant_pool_count) = be_u16(input)?;
    if constant_pool_count == 0 {
        return lift(Err(ClassReadError::InvalidConstantPoolCount(0)));
    }
    let slots = constant_pool_count as usize - 1;

    let mut constant_pool = Vec::with_capacity(slots);

    let mut input = input;

    while constant_pool.len() < slots {
        let constant;
        (input, constant) = parse_constant(input)?;
        let need_empty = constant.is_wide();
        constant_pool.push(constant);
        if need_empty {
            constant_pool.push(ConstantPoolInfo::Empty);
        }
    }

    // a long or double in the last slot spills past the declared count
    if constant_pool.len() != slots {
        return lift(Err(ClassReadError::InvalidConstantPoolCount(
            constant_pool_count,
        )));
    }

    Ok((input, constant_pool))
}

fn parse_constant(mut input: &[u8]) -> PResult<'_, ConstantPoolInfo> {
    let tag;
    (input, tag) = u8(input)?;
    let cp_info = match tag {
        consts::CONSTANT_UTF8 => {
            let length;
            (input, length) = be_u16(input)?;
            let bytes;
            (input, bytes) = take(length)(input)?;
            ConstantPoolInfo::Utf8(lift(decode_modified_utf8(bytes))?)
        }
        consts::CONSTANT_INTEGER => {
            let int;
            (input, int) = be_i32(input)?;
            ConstantPoolInfo::Integer(int)
        }
        consts::CONSTANT_FLOAT => {
            let bits;
            (input, bits) = be_u32(input)?;
            ConstantPoolInfo::Float(bits)
        }
        consts::CONSTANT_LONG => {
            let long;
            (input, long) = be_i64(input)?;
            ConstantPoolInfo::Long(long)
        }
        consts::CONSTANT_DOUBLE => {
            let bits;
            (input, bits) = be_u64(input)?;
            ConstantPoolInfo::Double(bits)
        }
        consts::CONSTANT_CLASS => {
            let name_index;
            (input, name_index) = be_u16(input)?;

            ConstantPoolInfo::Class { name_index }
        }
        consts::CONSTANT_STRING => {
            let string_index;
            (input, string_index) = be_u16(input)?;

            ConstantPoolInfo::String { string_index }
        }
        consts::CONSTANT_FIELDREF => {
            let (class_index, name_and_type_index);
            (input, class_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolInfo::Fieldref {
                class_index,
                name_and_type_index,
            }
        }
        consts::CONSTANT_METHODREF => {
            let (class_index, name_and_type_index);
            (input, class_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolInfo::Methodref {
                class_index,
                name_and_type_index,
            }
        }
        consts::CONSTANT_INTERFACE_METHODREF => {
            let (class_index, name_and_type_index);
            (input, class_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolInfo::InterfaceMethodref {
                class_index,
                name_and_type_index,
            }
        }
        consts::CONSTANT_NAME_AND_TYPE => {
            let (name_index, descriptor_index);
            (input, name_index) = be_u16(input)?;
            (input, descriptor_index) = be_u16(input)?;
            ConstantPoolInfo::NameAndType {
                name_index,
                descriptor_index,
            }
        }
        consts::CONSTANT_METHOD_HANDLE => {
            let (reference_kind, reference_index);
            (input, reference_kind) = u8(input)?;
            (input, reference_index) = be_u16(input)?;
            ConstantPoolInfo::MethodHandle {
                reference_kind,
                reference_index,
            }
        }
        consts::CONSTANT_METHOD_TYPE => {
            let descriptor_index;
            (input, descriptor_index) = be_u16(input)?;
            ConstantPoolInfo::MethodType { descriptor_index }
        }
        consts::CONSTANT_DYNAMIC => {
            let (bootstrap_method_attr_index, name_and_type_index);
            (input, bootstrap_method_attr_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolInfo::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            }
        }
        consts::CONSTANT_INVOKE_DYNAMIC => {
            let (bootstrap_method_attr_index, name_and_type_index);
            (input, bootstrap_method_attr_index) = be_u16(input)?;
            (input, name_and_type_index) = be_u16(input)?;
            ConstantPoolInfo::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            }
        }
        consts::CONSTANT_MODULE => {
            let name_index;
            (input, name_index) = be_u16(input)?;
            ConstantPoolInfo::Module { name_index }
        }
        consts::CONSTANT_PACKAGE => {
            let name_index;
            (input, name_index) = be_u16(input)?;
            ConstantPoolInfo::Package { name_index }
        }
        _ => {
            return lift(Err(ClassReadError::InvalidConstantPoolTag(tag)));
        }
    };
    Ok((input, cp_info))
}

fn parse_interfaces(input: &[u8]) -> PResult<'_, Vec<u16>> {
    let (input, interface_count) = be_u16(input)?;

    let (input, interfaces) = count(be_u16, interface_count as _).parse(input)?;

    Ok((input, interfaces))
}

fn parse_members(input: &[u8]) -> PResult<'_, Vec<MemberInfo>> {
    let (input, member_count) = be_u16(input)?;
    let (input, members) = count(parse_member, member_count as _).parse(input)?;
    Ok((input, members))
}

fn parse_member(input: &[u8]) -> PResult<'_, MemberInfo> {
    let (input, access_flags) = be_u16(input)?;
    let (input, name_index) = be_u16(input)?;
    let (input, descriptor_index) = be_u16(input)?;

    let (input, attributes) = parse_attributes(input)?;
    Ok((
        input,
        MemberInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        },
    ))
}

pub(crate) fn parse_attributes(input: &[u8]) -> PResult<'_, Vec<AttributeInfo>> {
    let (input, attributes_count) = be_u16(input)?;

    let (input, attributes) = count(parse_attribute, attributes_count as _).parse(input)?;

    Ok((input, attributes))
}

fn parse_attribute(input: &[u8]) -> PResult<'_, AttributeInfo> {
    let (input, attribute_name_index) = be_u16(input)?;
    let (input, attribute_length) = be_u32(input)?;
    let (input, info) = take(attribute_length)(input)?;

    Ok((
        input,
        AttributeInfo {
            attribute_name_index,
            info: info.to_vec(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(major: u16) -> Vec<u8> {
        let mut bytes = MAGIC.to_be_bytes().to_vec();
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&major.to_be_bytes());
        bytes
    }

    #[test]
    fn rejects_bad_magic() {
        let err = class_file(&[0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 52]).unwrap_err();
        assert!(matches!(err, ClassReadError::InvalidMagic(0xdeadbeef)));
    }

    #[test]
    fn rejects_unknown_version() {
        let err = class_file(&header(12)).unwrap_err();
        assert!(matches!(
            err,
            ClassReadError::UnsupportedVersion { major: 12, .. }
        ));
    }

    #[test]
    fn truncated_pool_is_eof() {
        let mut bytes = header(52);
        bytes.extend_from_slice(&3u16.to_be_bytes());
        bytes.push(consts::CONSTANT_UTF8);
        bytes.extend_from_slice(&10u16.to_be_bytes());
        bytes.extend_from_slice(b"abc");
        assert!(matches!(
            class_file(&bytes).unwrap_err(),
            ClassReadError::UnexpectedEof
        ));
    }

    #[test]
    fn long_in_last_slot_is_rejected() {
        let mut bytes = header(52);
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.push(consts::CONSTANT_LONG);
        bytes.extend_from_slice(&7i64.to_be_bytes());
        assert!(matches!(
            class_file(&bytes).unwrap_err(),
            ClassReadError::InvalidConstantPoolCount(2)
        ));
    }

    #[test]
    fn unknown_tag_is_reported() {
        let mut bytes = header(52);
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.push(2);
        assert!(matches!(
            class_file(&bytes).unwrap_err(),
            ClassReadError::InvalidConstantPoolTag(2)
        ));
    }
}
