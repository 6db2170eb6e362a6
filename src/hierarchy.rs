//! Lazily discovered class hierarchy.
//!
//! Every class name maps to one memoized load. Input classes are seeded up front, the
//! rest is pulled from the [`ClassPath`] the first time anything asks for it.

use std::{
    collections::{BTreeSet, HashSet, VecDeque},
    sync::Arc,
    thread,
    time::Duration,
};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::{
    class::{self, ClassModel, model::package_of},
    config::RemapConfig,
    error::{Diagnostic, DiagnosticKind, RemapError, Result},
    mapping::MemberKey,
};

pub mod classpath;

pub use classpath::{ClassPath, ClassPathChain, DirectoryClassPath, JarClassPath, MemoryClassPath};

type Node = Option<Arc<ClassModel>>;

#[derive(Debug)]
pub struct HierarchyResolver {
    classpath: Arc<dyn ClassPath>,
    timeout: Option<Duration>,
    fail_on_unresolved: bool,
    /// `None` in a cell marks a class that could not be found.
    class_registry: DashMap<Arc<str>, Arc<OnceCell<Node>>>,
    children: DashMap<Arc<str>, Vec<Arc<str>>>,
    ancestors: DashMap<Arc<str>, Arc<[Arc<str>]>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl HierarchyResolver {
    pub fn new(classpath: Arc<dyn ClassPath>) -> Self {
        Self::with_config(classpath, &RemapConfig::default())
    }

    pub fn with_config(classpath: Arc<dyn ClassPath>, config: &RemapConfig) -> Self {
        HierarchyResolver {
            classpath,
            timeout: config.classpath_timeout(),
            fail_on_unresolved: config.fail_on_unresolved,
            class_registry: DashMap::new(),
            children: DashMap::new(),
            ancestors: DashMap::new(),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    /// Registers a class that is part of the input set. Seeded classes shadow the
    /// classpath.
    pub fn seed(&self, model: Arc<ClassModel>) {
        let cell = Arc::clone(
            self.class_registry
                .entry(Arc::clone(&model.name))
                .or_default()
                .value(),
        );
        if cell.set(Some(Arc::clone(&model))).is_ok() {
            self.register_children(&model);
        } else {
            log::debug!("{} already known, keeping the first definition", model.name);
        }
    }

    fn register_children(&self, model: &ClassModel) {
        for parent in model.supertypes() {
            self.children
                .entry(Arc::clone(parent))
                .or_default()
                .push(Arc::clone(&model.name));
        }
    }

    /// Looks a class up, loading it on first use. Array types have no model.
    pub fn get(&self, name: &str) -> Result<Option<Arc<ClassModel>>> {
        if name.starts_with('[') {
            return Ok(None);
        }
        let cell = Arc::clone(self.class_registry.entry(name.into()).or_default().value());
        let node = cell.get_or_try_init(|| {
            let node = self.load(name)?;
            if let Some(model) = &node {
                self.register_children(model);
            }
            Ok::<_, RemapError>(node)
        })?;
        Ok(node.clone())
    }

    /// Reads the raw bytes of `name` within the configured time budget.
    fn fetch(&self, name: &str) -> std::result::Result<Option<Vec<u8>>, String> {
        let Some(timeout) = self.timeout else {
            return self.classpath.load(name).map_err(|err| format!("read failed: {err}"));
        };
        let (sender, receiver) = crossbeam::channel::bounded(1);
        let classpath = Arc::clone(&self.classpath);
        let owned = name.to_string();
        thread::spawn(move || {
            // the receiver is gone when the load took too long
            let _ = sender.send(classpath.load(&owned));
        });
        match receiver.recv_timeout(timeout) {
            Ok(loaded) => loaded.map_err(|err| format!("read failed: {err}")),
            Err(_) => Err(format!("load timed out after {timeout:?}")),
        }
    }

    fn load(&self, name: &str) -> Result<Node> {
        log::debug!("loading {name} from the classpath");
        match self.fetch(name) {
            Ok(Some(bytes)) => match class::parse(&bytes) {
                Ok(model) if model.name.as_ref() == name => Ok(Some(Arc::new(model))),
                Ok(model) => self.unresolved(name, format!("class file declares {}", model.name)),
                Err(err) => self.unresolved(name, format!("malformed class file: {err}")),
            },
            Ok(None) => self.unresolved(name, "not found on the classpath".to_string()),
            Err(message) => self.unresolved(name, message),
        }
    }

    /// Whether the classpath has an entry for `name`. Unlike [`get`](Self::get) this
    /// neither caches nor records anything when the entry is missing.
    pub fn on_classpath(&self, name: &str) -> bool {
        matches!(self.fetch(name), Ok(Some(_)))
    }

    fn unresolved(&self, name: &str, message: String) -> Result<Node> {
        if self.fail_on_unresolved {
            return Err(RemapError::UnresolvedClasspathEntry(format!("{name}: {message}")));
        }
        self.diagnostics.lock().push(Diagnostic::new(
            DiagnosticKind::UnresolvedClasspathEntry,
            name,
            message,
        ));
        Ok(None)
    }

    /// Every supertype of `name`, nearest first: breadth first over the superclass and
    /// then the interfaces in declaration order. Missing classes are listed but end
    /// their branch.
    pub fn ancestors_of(&self, name: &str) -> Result<Arc<[Arc<str>]>> {
        if let Some(ancestors) = self.ancestors.get(name) {
            return Ok(Arc::clone(ancestors.value()));
        }
        self.check_acyclic(name)?;

        let mut ancestors = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(Arc::<str>::from(name));
        while let Some(current) = queue.pop_front() {
            let Some(model) = self.get(&current)? else {
                continue;
            };
            for parent in model.supertypes() {
                if seen.insert(Arc::clone(parent)) {
                    ancestors.push(Arc::clone(parent));
                    queue.push_back(Arc::clone(parent));
                }
            }
        }

        let ancestors: Arc<[Arc<str>]> = ancestors.into();
        self.ancestors.insert(name.into(), Arc::clone(&ancestors));
        Ok(ancestors)
    }

    fn check_acyclic(&self, name: &str) -> Result<()> {
        fn visit(
            resolver: &HierarchyResolver,
            name: &Arc<str>,
            visiting: &mut HashSet<Arc<str>>,
            done: &mut HashSet<Arc<str>>,
        ) -> Result<()> {
            if done.contains(name) {
                return Ok(());
            }
            if !visiting.insert(Arc::clone(name)) {
                return Err(RemapError::HierarchyCycle(name.to_string()));
            }
            if let Some(model) = resolver.get(name)? {
                for parent in model.supertypes() {
                    visit(resolver, parent, visiting, done)?;
                }
            }
            visiting.remove(name);
            done.insert(Arc::clone(name));
            Ok(())
        }
        visit(self, &name.into(), &mut HashSet::new(), &mut HashSet::new())
    }

    /// Known subtypes of `name`, transitively. Only classes loaded so far count.
    pub fn descendants_of(&self, name: &str) -> BTreeSet<Arc<str>> {
        let mut descendants = BTreeSet::new();
        let mut queue: VecDeque<Arc<str>> = VecDeque::from([Arc::from(name)]);
        while let Some(current) = queue.pop_front() {
            let Some(children) = self.children.get(&current) else {
                continue;
            };
            for child in children.value() {
                if descendants.insert(Arc::clone(child)) {
                    queue.push_back(Arc::clone(child));
                }
            }
        }
        descendants
    }

    /// Classes below `method.owner` that declare an override of it.
    pub fn implementors_of(&self, method: &MemberKey) -> Result<BTreeSet<Arc<str>>> {
        let Some(owner) = self.get(&method.owner)? else {
            return Ok(BTreeSet::new());
        };
        let Some(declared) = owner.find_method(&method.name, &method.descriptor) else {
            return Ok(BTreeSet::new());
        };
        if !declared.access_flags.is_virtual() || method.name.starts_with('<') {
            return Ok(BTreeSet::new());
        }
        let package_private = declared.access_flags.is_package_private();

        let mut implementors = BTreeSet::new();
        for descendant in self.descendants_of(&method.owner) {
            let Some(model) = self.get(&descendant)? else {
                continue;
            };
            if package_private && model.package() != owner.package() {
                continue;
            }
            if model
                .find_method(&method.name, &method.descriptor)
                .is_some_and(|m| m.access_flags.is_virtual())
            {
                implementors.insert(descendant);
            }
        }
        Ok(implementors)
    }

    /// The class whose declaration a method reference resolves to: the class itself,
    /// then its superclasses, then superinterfaces breadth first.
    pub fn resolve_method_owner(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<Option<Arc<ClassModel>>> {
        let ancestors = self.ancestors_of(owner)?;
        let mut current = self.get(owner)?;
        while let Some(model) = current {
            if model.find_method(name, descriptor).is_some() {
                return Ok(Some(model));
            }
            current = match &model.super_class {
                Some(parent) => self.get(parent)?,
                None => None,
            };
        }
        for ancestor in ancestors.iter() {
            let Some(model) = self.get(ancestor)? else {
                continue;
            };
            if model.is_interface() && model.find_method(name, descriptor).is_some() {
                return Ok(Some(model));
            }
        }
        Ok(None)
    }

    /// Field lookup order: the class, its superinterfaces, then its superclass.
    pub fn resolve_field_owner(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<Option<Arc<ClassModel>>> {
        self.check_acyclic(owner)?;
        self.find_field_owner(owner, name, descriptor)
    }

    fn find_field_owner(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<Option<Arc<ClassModel>>> {
        let Some(model) = self.get(owner)? else {
            return Ok(None);
        };
        if model.find_field(name, descriptor).is_some() {
            return Ok(Some(model));
        }
        for interface in &model.interfaces {
            if let Some(found) = self.find_field_owner(interface, name, descriptor)? {
                return Ok(Some(found));
            }
        }
        match &model.super_class {
            Some(parent) => self.find_field_owner(parent, name, descriptor),
            None => Ok(None),
        }
    }

    pub fn same_package(&self, a: &str, b: &str) -> bool {
        package_of(a) == package_of(b)
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }
}
