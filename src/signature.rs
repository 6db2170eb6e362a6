//! Generic signatures as stored in `Signature` and `LocalVariableTypeTable` attributes.

use std::fmt;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_till1,
    character::complete::{char, one_of},
    combinator::{all_consuming, map, opt, value},
    multi::{many0, many1},
    sequence::{delimited, preceded},
};

use crate::descriptor::ClassNameMapper;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid generic signature `{0}`")]
pub struct InvalidSignature(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSignature {
    /// One of `BCDFIJSZ`.
    Base(char),
    Class(ClassTypeSignature),
    TypeVariable(String),
    Array(Box<TypeSignature>),
}

/// `Lpkg/Outer<..>.Inner<..>;`. `name` is the outermost class, `inner` the suffixes
/// by simple name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTypeSignature {
    pub name: String,
    pub type_arguments: Vec<TypeArgument>,
    pub inner: Vec<InnerClassType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassType {
    pub name: String,
    pub type_arguments: Vec<TypeArgument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeArgument {
    /// `*`
    Any,
    Exact(TypeSignature),
    Extends(TypeSignature),
    Super(TypeSignature),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParameter {
    pub name: String,
    pub class_bound: Option<TypeSignature>,
    pub interface_bounds: Vec<TypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub superclass: ClassTypeSignature,
    pub interfaces: Vec<ClassTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub parameters: Vec<TypeSignature>,
    /// `None` is `void`.
    pub return_type: Option<TypeSignature>,
    pub throws: Vec<TypeSignature>,
}

pub fn parse_class_signature(input: &str) -> Result<ClassSignature, InvalidSignature> {
    all_consuming(class_signature)
        .parse(input)
        .map(|(_, signature)| signature)
        .map_err(|_| InvalidSignature(input.to_string()))
}

pub fn parse_method_signature(input: &str) -> Result<MethodSignature, InvalidSignature> {
    all_consuming(method_signature)
        .parse(input)
        .map(|(_, signature)| signature)
        .map_err(|_| InvalidSignature(input.to_string()))
}

/// Field signatures are reference type signatures, local variable signatures may also be
/// base types.
pub fn parse_field_signature(input: &str) -> Result<TypeSignature, InvalidSignature> {
    all_consuming(java_type_signature)
        .parse(input)
        .map(|(_, signature)| signature)
        .map_err(|_| InvalidSignature(input.to_string()))
}

pub fn map_class_signature(
    signature: &str,
    mapper: &dyn ClassNameMapper,
) -> Result<String, InvalidSignature> {
    Ok(parse_class_signature(signature)?.map_classes(mapper).to_string())
}

pub fn map_method_signature(
    signature: &str,
    mapper: &dyn ClassNameMapper,
) -> Result<String, InvalidSignature> {
    Ok(parse_method_signature(signature)?.map_classes(mapper).to_string())
}

pub fn map_field_signature(
    signature: &str,
    mapper: &dyn ClassNameMapper,
) -> Result<String, InvalidSignature> {
    Ok(parse_field_signature(signature)?.map_classes(mapper).to_string())
}

impl TypeSignature {
    pub fn map_classes(&self, mapper: &dyn ClassNameMapper) -> TypeSignature {
        match self {
            TypeSignature::Class(class) => TypeSignature::Class(class.map_classes(mapper)),
            TypeSignature::Array(inner) => TypeSignature::Array(Box::new(inner.map_classes(mapper))),
            other => other.clone(),
        }
    }
}

fn map_arguments(arguments: &[TypeArgument], mapper: &dyn ClassNameMapper) -> Vec<TypeArgument> {
    arguments
        .iter()
        .map(|argument| match argument {
            TypeArgument::Any => TypeArgument::Any,
            TypeArgument::Exact(ty) => TypeArgument::Exact(ty.map_classes(mapper)),
            TypeArgument::Extends(ty) => TypeArgument::Extends(ty.map_classes(mapper)),
            TypeArgument::Super(ty) => TypeArgument::Super(ty.map_classes(mapper)),
        })
        .collect()
}

impl ClassTypeSignature {
    /// Inner suffixes are looked up by their binary name `Outer$Inner` and then cut back
    /// to a simple name relative to the mapped outer class.
    pub fn map_classes(&self, mapper: &dyn ClassNameMapper) -> ClassTypeSignature {
        let mut binary_name = self.name.clone();
        let mut mapped_outer = mapper
            .map_class_name(&self.name)
            .unwrap_or(&self.name)
            .to_string();
        let name = mapped_outer.clone();
        let inner = self
            .inner
            .iter()
            .map(|inner| {
                binary_name = format!("{binary_name}${}", inner.name);
                let mapped = mapper
                    .map_class_name(&binary_name)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{mapped_outer}${}", inner.name));
                let simple = match mapped.strip_prefix(&format!("{mapped_outer}$")) {
                    Some(simple) => simple.to_string(),
                    None => mapped
                        .rsplit_once('$')
                        .map_or(mapped.as_str(), |(_, simple)| simple)
                        .to_string(),
                };
                mapped_outer = mapped;
                InnerClassType {
                    name: simple,
                    type_arguments: map_arguments(&inner.type_arguments, mapper),
                }
            })
            .collect();
        ClassTypeSignature {
            name,
            type_arguments: map_arguments(&self.type_arguments, mapper),
            inner,
        }
    }
}

fn map_parameters(parameters: &[TypeParameter], mapper: &dyn ClassNameMapper) -> Vec<TypeParameter> {
    parameters
        .iter()
        .map(|parameter| TypeParameter {
            name: parameter.name.clone(),
            class_bound: parameter.class_bound.as_ref().map(|b| b.map_classes(mapper)),
            interface_bounds: parameter
                .interface_bounds
                .iter()
                .map(|b| b.map_classes(mapper))
                .collect(),
        })
        .collect()
}

impl ClassSignature {
    pub fn map_classes(&self, mapper: &dyn ClassNameMapper) -> ClassSignature {
        ClassSignature {
            type_parameters: map_parameters(&self.type_parameters, mapper),
            superclass: self.superclass.map_classes(mapper),
            interfaces: self.interfaces.iter().map(|i| i.map_classes(mapper)).collect(),
        }
    }
}

impl MethodSignature {
    pub fn map_classes(&self, mapper: &dyn ClassNameMapper) -> MethodSignature {
        MethodSignature {
            type_parameters: map_parameters(&self.type_parameters, mapper),
            parameters: self.parameters.iter().map(|p| p.map_classes(mapper)).collect(),
            return_type: self.return_type.as_ref().map(|r| r.map_classes(mapper)),
            throws: self.throws.iter().map(|t| t.map_classes(mapper)).collect(),
        }
    }
}

fn write_arguments(f: &mut fmt::Formatter<'_>, arguments: &[TypeArgument]) -> fmt::Result {
    if arguments.is_empty() {
        return Ok(());
    }
    f.write_str("<")?;
    for argument in arguments {
        match argument {
            TypeArgument::Any => f.write_str("*")?,
            TypeArgument::Exact(ty) => write!(f, "{ty}")?,
            TypeArgument::Extends(ty) => write!(f, "+{ty}")?,
            TypeArgument::Super(ty) => write!(f, "-{ty}")?,
        }
    }
    f.write_str(">")
}

fn write_parameters(f: &mut fmt::Formatter<'_>, parameters: &[TypeParameter]) -> fmt::Result {
    if parameters.is_empty() {
        return Ok(());
    }
    f.write_str("<")?;
    for parameter in parameters {
        write!(f, "{}:", parameter.name)?;
        if let Some(bound) = &parameter.class_bound {
            write!(f, "{bound}")?;
        }
        for bound in &parameter.interface_bounds {
            write!(f, ":{bound}")?;
        }
    }
    f.write_str(">")
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSignature::Base(c) => write!(f, "{c}"),
            TypeSignature::Class(class) => write!(f, "{class}"),
            TypeSignature::TypeVariable(name) => write!(f, "T{name};"),
            TypeSignature::Array(inner) => write!(f, "[{inner}"),
        }
    }
}

impl fmt::Display for ClassTypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.name)?;
        write_arguments(f, &self.type_arguments)?;
        for inner in &self.inner {
            write!(f, ".{}", inner.name)?;
            write_arguments(f, &inner.type_arguments)?;
        }
        f.write_str(";")
    }
}

impl fmt::Display for ClassSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_parameters(f, &self.type_parameters)?;
        write!(f, "{}", self.superclass)?;
        for interface in &self.interfaces {
            write!(f, "{interface}")?;
        }
        Ok(())
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_parameters(f, &self.type_parameters)?;
        f.write_str("(")?;
        for parameter in &self.parameters {
            write!(f, "{parameter}")?;
        }
        f.write_str(")")?;
        match &self.return_type {
            Some(ty) => write!(f, "{ty}")?,
            None => f.write_str("V")?,
        }
        for throws in &self.throws {
            write!(f, "^{throws}")?;
        }
        Ok(())
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| matches!(c, '.' | ';' | '[' | '/' | '<' | '>' | ':'))(input)
}

fn class_type_signature(input: &str) -> IResult<&str, ClassTypeSignature> {
    let (input, _) = char('L')(input)?;
    let (input, name) = take_till1(|c: char| matches!(c, ';' | '<' | '.')).parse(input)?;
    let (input, type_arguments) = type_arguments(input)?;
    let (input, inner) = many0(preceded(char('.'), inner_class_type)).parse(input)?;
    let (input, _) = char(';')(input)?;
    Ok((
        input,
        ClassTypeSignature {
            name: name.to_string(),
            type_arguments,
            inner,
        },
    ))
}

fn inner_class_type(input: &str) -> IResult<&str, InnerClassType> {
    let (input, name) = identifier(input)?;
    let (input, type_arguments) = type_arguments(input)?;
    Ok((
        input,
        InnerClassType {
            name: name.to_string(),
            type_arguments,
        },
    ))
}

fn type_arguments(input: &str) -> IResult<&str, Vec<TypeArgument>> {
    map(
        opt(delimited(char('<'), many1(type_argument), char('>'))),
        Option::unwrap_or_default,
    )
    .parse(input)
}

fn type_argument(input: &str) -> IResult<&str, TypeArgument> {
    alt((
        value(TypeArgument::Any, char('*')),
        map(preceded(char('+'), reference_type_signature), TypeArgument::Extends),
        map(preceded(char('-'), reference_type_signature), TypeArgument::Super),
        map(reference_type_signature, TypeArgument::Exact),
    ))
    .parse(input)
}

fn type_variable(input: &str) -> IResult<&str, TypeSignature> {
    map(delimited(char('T'), identifier, char(';')), |name: &str| {
        TypeSignature::TypeVariable(name.to_string())
    })
    .parse(input)
}

fn reference_type_signature(input: &str) -> IResult<&str, TypeSignature> {
    alt((
        map(class_type_signature, TypeSignature::Class),
        type_variable,
        map(preceded(char('['), java_type_signature), |ty| {
            TypeSignature::Array(Box::new(ty))
        }),
    ))
    .parse(input)
}

fn java_type_signature(input: &str) -> IResult<&str, TypeSignature> {
    alt((
        map(one_of("BCDFIJSZ"), TypeSignature::Base),
        reference_type_signature,
    ))
    .parse(input)
}

fn type_parameter(input: &str) -> IResult<&str, TypeParameter> {
    let (input, name) = identifier(input)?;
    let (input, class_bound) = preceded(char(':'), opt(reference_type_signature)).parse(input)?;
    let (input, interface_bounds) =
        many0(preceded(char(':'), reference_type_signature)).parse(input)?;
    Ok((
        input,
        TypeParameter {
            name: name.to_string(),
            class_bound,
            interface_bounds,
        },
    ))
}

fn type_parameters(input: &str) -> IResult<&str, Vec<TypeParameter>> {
    map(
        opt(delimited(char('<'), many1(type_parameter), char('>'))),
        Option::unwrap_or_default,
    )
    .parse(input)
}

fn class_signature(input: &str) -> IResult<&str, ClassSignature> {
    let (input, type_parameters) = type_parameters(input)?;
    let (input, superclass) = class_type_signature(input)?;
    let (input, interfaces) = many0(class_type_signature).parse(input)?;
    Ok((
        input,
        ClassSignature {
            type_parameters,
            superclass,
            interfaces,
        },
    ))
}

fn method_signature(input: &str) -> IResult<&str, MethodSignature> {
    let (input, type_parameters) = type_parameters(input)?;
    let (input, parameters) =
        delimited(char('('), many0(java_type_signature), char(')')).parse(input)?;
    let (input, return_type) =
        alt((map(java_type_signature, Some), value(None, char('V')))).parse(input)?;
    let (input, throws) = many0(preceded(
        char('^'),
        alt((map(class_type_signature, TypeSignature::Class), type_variable)),
    ))
    .parse(input)?;
    Ok((
        input,
        MethodSignature {
            type_parameters,
            parameters,
            return_type,
            throws,
        },
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    struct Names(HashMap<&'static str, &'static str>);

    impl ClassNameMapper for Names {
        fn map_class_name(&self, name: &str) -> Option<&str> {
            self.0.get(name).copied()
        }
    }

    #[test]
    fn renders_what_it_parses() {
        for signature in [
            "<T:Ljava/lang/Object;U::Ljava/lang/Comparable<-TU;>;>Ljava/util/AbstractList<TT;>;Ljava/io/Serializable;",
            "Ljava/lang/Enum<La/E;>;",
        ] {
            assert_eq!(parse_class_signature(signature).unwrap().to_string(), signature);
        }
        for signature in [
            "<R:Ljava/lang/Object;>(Ljava/util/function/Function<-TT;+TR;>;[I)TR;",
            "(Ljava/util/Map<*Ljava/lang/String;>.Entry<TK;>;)V^TX;^Ljava/io/IOException;",
        ] {
            assert_eq!(parse_method_signature(signature).unwrap().to_string(), signature);
        }
        assert_eq!(parse_field_signature("[TT;").unwrap().to_string(), "[TT;");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_class_signature("Ljava/lang/Object").is_err());
        assert!(parse_method_signature("<>()V").is_err());
        assert!(parse_field_signature("Ljava/util/List<>;").is_err());
    }

    #[test]
    fn maps_inner_classes_through_binary_names() {
        let names = Names(HashMap::from([
            ("a/Outer", "b/Renamed"),
            ("a/Outer$Inner", "b/Renamed$Nested"),
            ("a/Item", "b/Thing"),
        ]));
        assert_eq!(
            map_field_signature("La/Outer<La/Item;>.Inner<TT;>;", &names).unwrap(),
            "Lb/Renamed<Lb/Thing;>.Nested<TT;>;"
        );
        // no mapping for the inner class keeps its simple name under the new outer
        assert_eq!(
            map_field_signature("La/Outer.Other;", &names).unwrap(),
            "Lb/Renamed.Other;"
        );
        assert_eq!(
            map_method_signature("<T:La/Item;>(TT;)La/Item;^La/Item;", &names).unwrap(),
            "<T:Lb/Thing;>(TT;)Lb/Thing;^Lb/Thing;"
        );
    }
}
