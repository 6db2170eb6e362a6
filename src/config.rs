use std::{num::NonZeroUsize, path::Path, thread, time::Duration};

use serde::Deserialize;

use crate::error::Result;

/// Settings for one remap run. Every field has a default so an empty JSON object is a
/// valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemapConfig {
    /// Worker threads for the rewrite phase, 0 picks the available parallelism.
    pub workers: usize,
    /// Upper bound for loading one class from the classpath.
    pub classpath_timeout_ms: Option<u64>,
    /// Rewrite `SourceFile` of renamed classes to `<Outer>.java`.
    pub rebuild_source_file_names: bool,
    /// Abort instead of warning when a class is missing from the classpath.
    pub fail_on_unresolved: bool,
}

impl RemapConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn classpath_timeout(&self) -> Option<Duration> {
        self.classpath_timeout_ms.map(Duration::from_millis)
    }

    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        thread::available_parallelism().map_or(1, NonZeroUsize::get)
    }
}
