//! Renames classes, fields and methods across a set of JVM class files.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use jvm_remap::{CancelToken, ClassInput, RemapConfig, RemapRun, hierarchy, parse_mappings};
//!
//! # fn main() -> jvm_remap::Result<()> {
//! let symbols = parse_mappings("class a/A b/B\n")?;
//! let classpath = hierarchy::classpath::open("rt.jar")?;
//! let run = RemapRun::new(RemapConfig::default(), Arc::new(symbols), classpath);
//! let inputs = vec![ClassInput::new("A.class", std::fs::read("A.class")?)];
//! let report = run.run(inputs, &CancelToken::new())?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod class;
pub mod config;
pub mod consts;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod hierarchy;
pub mod mapping;
pub mod remapper;
pub mod run;
pub mod signature;

pub use class::{ClassModel, parse, serialize};
pub use config::RemapConfig;
pub use error::{Diagnostic, DiagnosticKind, RemapError, Result};
pub use hierarchy::{ClassPath, HierarchyResolver};
pub use mapping::{MemberKey, SymbolTable, parse_mappings};
pub use remapper::{Remapped, Remapper, remap};
pub use run::{CancelToken, ClassInput, FileOutcome, FileReport, RemapRun, RunReport};
