//! Batch driver: parses a set of class files, remaps them on a worker pool and reports
//! per file.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crossbeam::channel;
use parking_lot::Mutex;

use crate::{
    class::{self, ClassModel},
    config::RemapConfig,
    error::{Diagnostic, RemapError, Result},
    hierarchy::{ClassPath, HierarchyResolver},
    mapping::SymbolTable,
    remapper::Remapper,
};

/// One class file handed to a run. `id` is only used for reporting, usually a path or
/// a jar entry name.
#[derive(Debug, Clone)]
pub struct ClassInput {
    pub id: String,
    pub bytes: Vec<u8>,
}

impl ClassInput {
    pub fn new(id: impl Into<String>, bytes: Vec<u8>) -> Self {
        ClassInput {
            id: id.into(),
            bytes,
        }
    }
}

#[derive(Debug)]
pub enum FileOutcome {
    /// `class_name` is the internal name after remapping.
    Written { class_name: String, bytes: Vec<u8> },
    Failed(RemapError),
}

#[derive(Debug)]
pub struct FileReport {
    pub id: String,
    pub outcome: FileOutcome,
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// In input order.
    pub files: Vec<FileReport>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunReport {
    pub fn written(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().filter_map(|file| match &file.outcome {
            FileOutcome::Written { class_name, bytes } => Some((class_name.as_str(), bytes.as_slice())),
            FileOutcome::Failed(_) => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &RemapError)> {
        self.files.iter().filter_map(|file| match &file.outcome {
            FileOutcome::Failed(err) => Some((file.id.as_str(), err)),
            FileOutcome::Written { .. } => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for file in &self.files {
            match &file.outcome {
                FileOutcome::Written { class_name, .. } => writeln!(f, "ok     {} -> {class_name}", file.id)?,
                FileOutcome::Failed(err) => writeln!(f, "failed {}: {err}", file.id)?,
            }
        }
        let failed = self.failed().count();
        write!(
            f,
            "{} written, {failed} failed, {} warnings",
            self.files.len() - failed,
            self.diagnostics.len()
        )
    }
}

/// Cancels a run from another thread. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct RemapRun {
    config: RemapConfig,
    symbols: Arc<SymbolTable>,
    classpath: Arc<dyn ClassPath>,
}

impl RemapRun {
    pub fn new(config: RemapConfig, symbols: Arc<SymbolTable>, classpath: Arc<dyn ClassPath>) -> Self {
        RemapRun {
            config,
            symbols,
            classpath,
        }
    }

    /// Remaps every input. A file that cannot be parsed, rewritten or written fails on
    /// its own; a bad mapping, a strict-mode classpath miss or cancellation fails the
    /// whole run and produces no output at all.
    pub fn run(&self, inputs: Vec<ClassInput>, cancel: &CancelToken) -> Result<RunReport> {
        let workers = self.config.worker_count();
        log::info!("remapping {} classes on {workers} workers", inputs.len());

        let parsed = parallel_map(&inputs, workers, cancel, |input| {
            class::parse(&input.bytes)
                .map(Arc::new)
                .map_err(|source| RemapError::MalformedClassFile {
                    id: input.id.clone(),
                    source,
                })
        })?;

        let mut outcomes: Vec<Option<FileOutcome>> = Vec::with_capacity(inputs.len());
        let mut jobs: Vec<(usize, Arc<ClassModel>)> = Vec::new();
        let mut defined: HashMap<Arc<str>, usize> = HashMap::new();
        for (index, parsed) in parsed.into_iter().enumerate() {
            let err = match parsed {
                Ok(model) => match defined.get(&model.name) {
                    Some(&first) => RemapError::DuplicateClass {
                        class: model.name.to_string(),
                        first: inputs[first].id.clone(),
                    },
                    None => {
                        defined.insert(Arc::clone(&model.name), index);
                        jobs.push((index, model));
                        outcomes.push(None);
                        continue;
                    }
                },
                Err(err) => err,
            };
            log::error!("{}: {err}", inputs[index].id);
            outcomes.push(Some(FileOutcome::Failed(err)));
        }

        let resolver = HierarchyResolver::with_config(Arc::clone(&self.classpath), &self.config);
        let models: Vec<Arc<ClassModel>> = jobs.iter().map(|(_, model)| Arc::clone(model)).collect();
        for model in &models {
            resolver.seed(Arc::clone(model));
        }
        let remapper = Remapper::new(&self.symbols, &resolver, &models, &self.config)?;
        if cancel.is_cancelled() {
            return Err(RemapError::Cancelled);
        }

        let file_diagnostics = Mutex::new(Vec::new());
        let mut rewritten = parallel_map(&jobs, workers, cancel, |(index, model)| {
            let id = &inputs[*index].id;
            let remapped = match remapper.remap(model) {
                Ok(remapped) => remapped,
                Err(err) => {
                    log::error!("{id}: {err}");
                    return FileOutcome::Failed(err);
                }
            };
            file_diagnostics.lock().extend(remapped.diagnostics);
            match class::serialize(&remapped.class) {
                Ok(bytes) => FileOutcome::Written {
                    class_name: remapped.class.name.to_string(),
                    bytes,
                },
                Err(source) => {
                    log::error!("{id}: cannot write {}: {source}", remapped.class.name);
                    FileOutcome::Failed(RemapError::Write {
                        class: remapped.class.name.to_string(),
                        source,
                    })
                }
            }
        })?;
        let strict_failure = rewritten.iter().position(|outcome| {
            matches!(
                outcome,
                FileOutcome::Failed(RemapError::UnresolvedClasspathEntry(_))
            )
        });
        if let Some(position) = strict_failure {
            if let FileOutcome::Failed(err) = rewritten.swap_remove(position) {
                return Err(err);
            }
        }
        for ((index, _), outcome) in jobs.iter().zip(rewritten) {
            outcomes[*index] = Some(outcome);
        }

        let mut diagnostics = resolver.diagnostics();
        diagnostics.extend(file_diagnostics.into_inner());
        let report = RunReport {
            files: inputs
                .into_iter()
                .zip(outcomes.into_iter().flatten())
                .map(|(input, outcome)| FileReport {
                    id: input.id,
                    outcome,
                })
                .collect(),
            diagnostics,
        };
        log::info!(
            "{} written, {} failed",
            report.written().count(),
            report.failed().count()
        );
        Ok(report)
    }
}

/// Applies `f` to every item on `workers` threads and returns the results in input
/// order. Workers stop picking up items once `cancel` is set.
fn parallel_map<T, R, F>(items: &[T], workers: usize, cancel: &CancelToken, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let (sender, receiver) = channel::unbounded();
    for job in items.iter().enumerate() {
        // the receiver is alive until the scope below ends
        let _ = sender.send(job);
    }
    drop(sender);

    let results = Mutex::new(Vec::with_capacity(items.len()));
    crossbeam::scope(|scope| {
        for _ in 0..workers.clamp(1, items.len().max(1)) {
            scope.spawn(|_| {
                while let Ok((index, item)) = receiver.recv() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let result = f(item);
                    results.lock().push((index, result));
                }
            });
        }
    })
    .unwrap_or_else(|panic| std::panic::resume_unwind(panic));

    if cancel.is_cancelled() {
        log::info!("run cancelled");
        return Err(RemapError::Cancelled);
    }
    let mut results = results.into_inner();
    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, result)| result).collect())
}
