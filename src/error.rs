use std::fmt;

/// Failures while decoding a class file. Any of these makes the whole input unusable.
#[derive(Debug, thiserror::Error)]
pub enum ClassReadError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid magic 0x{0:08x}")]
    InvalidMagic(u32),
    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("constant pool count {0} is inconsistent with its entries")]
    InvalidConstantPoolCount(u16),
    #[error("invalid constant pool tag {0}")]
    InvalidConstantPoolTag(u8),
    #[error("invalid constant pool index {0}")]
    InvalidIndex(u16),
    #[error("constant pool entry {index} is not a {expected}")]
    UnexpectedConstant { index: u16, expected: &'static str },
    #[error("invalid opcode 0x{opcode:02x} at {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("attribute {0} is inconsistent with its declared length")]
    InvalidAttribute(String),
    #[error("{0} trailing bytes after class file")]
    TrailingBytes(usize),
    #[error("modified utf8 error: {0}")]
    Utf8Error(String),
    #[error("malformed class file structure ({0})")]
    Syntax(String),
}

/// Failures while encoding a [`ClassModel`](crate::class::ClassModel).
#[derive(Debug, thiserror::Error)]
pub enum ClassWriteError {
    #[error("constant pool exceeds 65535 entries")]
    ConstantPoolOverflow,
    #[error("ldc operand landed at constant pool index {0}")]
    LdcIndexOverflow(u16),
    #[error("string constant of {0} bytes is too long")]
    StringTooLong(usize),
    #[error("{0} has too many entries")]
    TooManyEntries(&'static str),
    #[error("instruction recorded at offset {recorded} encodes at {actual}")]
    InstructionOffset { recorded: u32, actual: usize },
    #[error("constant {0} cannot be used here")]
    InvalidConstant(String),
    #[error("operand of {0} is out of range")]
    OperandOutOfRange(&'static str),
    #[error("attribute {0} was read with a different constant pool than the rest of the class")]
    MixedConstantPools(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RemapError {
    #[error("malformed class file {id}")]
    MalformedClassFile {
        id: String,
        #[source]
        source: ClassReadError,
    },
    #[error("failed to write class {class}")]
    Write {
        class: String,
        #[source]
        source: ClassWriteError,
    },
    #[error("ambiguous mapping: {0}")]
    AmbiguousMapping(String),
    #[error("invalid mapping at line {line}: {reason}")]
    MappingSyntax { line: usize, reason: String },
    #[error("unresolved classpath entry {0}")]
    UnresolvedClasspathEntry(String),
    #[error("class {class} is already defined by {first}")]
    DuplicateClass { class: String, first: String },
    #[error("cyclic class hierarchy through {0}")]
    HierarchyCycle(String),
    #[error("cannot rewrite `{descriptor}` of {member}")]
    DescriptorRewrite { member: String, descriptor: String },
    #[error("invalid configuration")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("remap run cancelled")]
    Cancelled,
}

pub type Result<T, E = RemapError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    UnresolvedClasspathEntry,
    DescriptorRewriteFailure,
    DebugAttribute,
    AmbiguousReference,
}

/// A non-fatal problem noticed during a run. These make up the report's log of
/// unresolved and ambiguous symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        let diagnostic = Diagnostic {
            kind,
            subject: subject.into(),
            message: message.into(),
        };
        log::warn!("{diagnostic}");
        diagnostic
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DiagnosticKind::UnresolvedClasspathEntry => "unresolved",
            DiagnosticKind::DescriptorRewriteFailure => "descriptor",
            DiagnosticKind::DebugAttribute => "debug",
            DiagnosticKind::AmbiguousReference => "ambiguous",
        };
        write!(f, "[{kind}] {}: {}", self.subject, self.message)
    }
}
