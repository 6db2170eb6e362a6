use std::fmt;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_till1,
    character::complete::{char, one_of},
    combinator::{all_consuming, map, value},
    multi::many0,
    sequence::delimited,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid descriptor `{0}`")]
pub struct InvalidDescriptor(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    /// `None` is `void`.
    pub return_type: Option<FieldType>,
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Object(String),
    Short,
    Boolean,
    Array(Box<FieldType>),
}

/// Looks up the new internal name of a class, `None` leaves it unchanged.
pub trait ClassNameMapper {
    fn map_class_name(&self, name: &str) -> Option<&str>;
}

impl FieldType {
    pub fn to_descriptor(&self) -> String {
        self.to_string()
    }

    /// Innermost element type of an array, or the type itself.
    pub fn element_type(&self) -> &FieldType {
        match self {
            FieldType::Array(inner) => inner.element_type(),
            other => other,
        }
    }

    fn map_classes(&self, mapper: &dyn ClassNameMapper) -> FieldType {
        match self {
            FieldType::Object(name) => match mapper.map_class_name(name) {
                Some(mapped) => FieldType::Object(mapped.to_string()),
                None => self.clone(),
            },
            FieldType::Array(inner) => FieldType::Array(Box::new(inner.map_classes(mapper))),
            primitive => primitive.clone(),
        }
    }
}

impl MethodDescriptor {
    pub fn to_descriptor(&self) -> String {
        self.to_string()
    }

    /// Every class named anywhere in the descriptor, in order of appearance.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .chain(self.return_type.iter())
            .filter_map(|ty| match ty.element_type() {
                FieldType::Object(name) => Some(name.as_str()),
                _ => None,
            })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => f.write_str("B"),
            FieldType::Char => f.write_str("C"),
            FieldType::Double => f.write_str("D"),
            FieldType::Float => f.write_str("F"),
            FieldType::Int => f.write_str("I"),
            FieldType::Long => f.write_str("J"),
            FieldType::Short => f.write_str("S"),
            FieldType::Boolean => f.write_str("Z"),
            FieldType::Object(name) => write!(f, "L{name};"),
            FieldType::Array(inner) => write!(f, "[{inner}"),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for parameter in &self.parameters {
            write!(f, "{parameter}")?;
        }
        f.write_str(")")?;
        match &self.return_type {
            Some(ty) => write!(f, "{ty}"),
            None => f.write_str("V"),
        }
    }
}

pub fn parse_field_descriptor(input: &str) -> Result<FieldType, InvalidDescriptor> {
    all_consuming(parse_field_type)
        .parse(input)
        .map(|(_, ty)| ty)
        .map_err(|_| InvalidDescriptor(input.to_string()))
}

pub fn parse_method_descriptor(input: &str) -> Result<MethodDescriptor, InvalidDescriptor> {
    all_consuming(method_descriptor)
        .parse(input)
        .map(|(_, descriptor)| descriptor)
        .map_err(|_| InvalidDescriptor(input.to_string()))
}

pub fn map_field_descriptor(
    descriptor: &str,
    mapper: &dyn ClassNameMapper,
) -> Result<String, InvalidDescriptor> {
    Ok(parse_field_descriptor(descriptor)?
        .map_classes(mapper)
        .to_descriptor())
}

pub fn map_method_descriptor(
    descriptor: &str,
    mapper: &dyn ClassNameMapper,
) -> Result<String, InvalidDescriptor> {
    let parsed = parse_method_descriptor(descriptor)?;
    let mapped = MethodDescriptor {
        parameters: parsed
            .parameters
            .iter()
            .map(|ty| ty.map_classes(mapper))
            .collect(),
        return_type: parsed.return_type.map(|ty| ty.map_classes(mapper)),
    };
    Ok(mapped.to_descriptor())
}

/// Maps either kind of descriptor, telling them apart by the leading `(`.
pub fn map_descriptor(
    descriptor: &str,
    mapper: &dyn ClassNameMapper,
) -> Result<String, InvalidDescriptor> {
    if descriptor.starts_with('(') {
        map_method_descriptor(descriptor, mapper)
    } else {
        map_field_descriptor(descriptor, mapper)
    }
}

/// Maps the operand of a `CONSTANT_Class`, which is an internal name or, for arrays,
/// a field descriptor.
pub fn map_class_reference(
    name: &str,
    mapper: &dyn ClassNameMapper,
) -> Result<String, InvalidDescriptor> {
    if name.starts_with('[') {
        map_field_descriptor(name, mapper)
    } else {
        Ok(mapper.map_class_name(name).unwrap_or(name).to_string())
    }
}

fn method_descriptor(input: &str) -> IResult<&str, MethodDescriptor> {
    let (input, parameters) = delimited(char('('), many0(parse_field_type), char(')')).parse(input)?;
    let (input, return_type) = alt((map(parse_field_type, Some), value(None, char('V')))).parse(input)?;
    Ok((
        input,
        MethodDescriptor {
            parameters,
            return_type,
        },
    ))
}

fn parse_field_type(input: &str) -> IResult<&str, FieldType> {
    alt((parse_base_type, parse_object_type, parse_array_type)).parse(input)
}

fn parse_base_type(input: &str) -> IResult<&str, FieldType> {
    let (input, ch) = one_of("BCDFIJSZ")(input)?;
    let field_type = match ch {
        'B' => FieldType::Byte,
        'C' => FieldType::Char,
        'D' => FieldType::Double,
        'F' => FieldType::Float,
        'I' => FieldType::Int,
        'J' => FieldType::Long,
        'S' => FieldType::Short,
        _ => FieldType::Boolean,
    };
    Ok((input, field_type))
}

fn parse_object_type(input: &str) -> IResult<&str, FieldType> {
    let (input, class_name) =
        delimited(char('L'), take_till1(|c: char| matches!(c, ';' | '.' | '[' | '<')), char(';'))
            .parse(input)?;
    Ok((input, FieldType::Object(class_name.to_string())))
}

fn parse_array_type(input: &str) -> IResult<&str, FieldType> {
    let (input, _) = char('[')(input)?;

    let (input, field_type) = parse_field_type(input)?;

    Ok((input, FieldType::Array(Box::new(field_type))))
}
