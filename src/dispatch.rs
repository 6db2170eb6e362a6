//! Groups of method declarations that are one virtual dispatch target.
//!
//! All declarations in a group must end up with the same name, so the partition is
//! computed once before any class is rewritten and consulted by key afterwards.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::{
    class::{ClassModel, MethodModel},
    error::{RemapError, Result},
    hierarchy::HierarchyResolver,
    mapping::{MemberKey, SymbolTable},
};

#[derive(Debug, Default)]
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn push(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.rank.push(0);
        id
    }

    fn find(&mut self, mut id: usize) -> usize {
        while self.parent[id] != id {
            self.parent[id] = self.parent[self.parent[id]];
            id = self.parent[id];
        }
        id
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        match self.rank[a].cmp(&self.rank[b]) {
            std::cmp::Ordering::Less => self.parent[a] = b,
            std::cmp::Ordering::Greater => self.parent[b] = a,
            std::cmp::Ordering::Equal => {
                self.parent[b] = a;
                self.rank[a] += 1;
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct DispatchGroups {
    index: HashMap<MemberKey, usize>,
    /// Root of every member after path flattening.
    group: Vec<usize>,
    names: HashMap<usize, Arc<str>>,
    /// Classes whose hierarchy could not be walked, with the reason.
    broken: HashMap<Arc<str>, String>,
}

fn takes_part(method: &MethodModel) -> bool {
    method.access_flags.is_virtual() && !method.name.starts_with('<')
}

impl DispatchGroups {
    pub fn build(
        symbols: &SymbolTable,
        resolver: &HierarchyResolver,
        classes: &[Arc<ClassModel>],
    ) -> Result<DispatchGroups> {
        let mut index: HashMap<MemberKey, usize> = HashMap::new();
        let mut sets = DisjointSet::default();
        let mut broken = HashMap::new();
        let mut id_of = |key: MemberKey, sets: &mut DisjointSet| {
            *index.entry(key).or_insert_with(|| sets.push())
        };

        for class in classes {
            let ancestors = match resolver.ancestors_of(&class.name) {
                Ok(ancestors) => ancestors,
                Err(RemapError::HierarchyCycle(through)) => {
                    log::warn!("{} has a cyclic hierarchy through {through}", class.name);
                    broken.insert(Arc::clone(&class.name), through);
                    continue;
                }
                Err(err) => return Err(err),
            };

            // declarations visible from this class, keyed by name and descriptor
            let mut visible: BTreeMap<(Arc<str>, Arc<str>), Vec<(Arc<ClassModel>, bool)>> =
                BTreeMap::new();
            let lineage = std::iter::once(Some(Arc::clone(class)))
                .chain(ancestors.iter().map(|name| resolver.get(name).ok().flatten()));
            for model in lineage.flatten() {
                for method in model.methods.iter().filter(|m| takes_part(m)) {
                    visible
                        .entry((Arc::clone(&method.name), Arc::clone(&method.descriptor)))
                        .or_default()
                        .push((Arc::clone(&model), method.access_flags.is_package_private()));
                }
            }

            for ((name, descriptor), declarations) in visible {
                let Some(((first, _), rest)) = declarations.split_first() else {
                    continue;
                };
                let first_key = MemberKey {
                    owner: Arc::clone(&first.name),
                    name: Arc::clone(&name),
                    descriptor: Arc::clone(&descriptor),
                };
                let first_id = id_of(first_key, &mut sets);
                for (model, package_private) in rest {
                    let package_private = *package_private || declarations[0].1;
                    if package_private && model.package() != first.package() {
                        continue;
                    }
                    let key = MemberKey {
                        owner: Arc::clone(&model.name),
                        name: Arc::clone(&name),
                        descriptor: Arc::clone(&descriptor),
                    };
                    let id = id_of(key, &mut sets);
                    sets.union(first_id, id);
                }
            }
        }

        let group: Vec<usize> = (0..sets.parent.len()).map(|id| sets.find(id)).collect();
        let mut names: HashMap<usize, (Arc<str>, &MemberKey)> = HashMap::new();
        for (key, &id) in &index {
            let Some(new) = symbols.resolve_method(&key.owner, &key.name, &key.descriptor) else {
                continue;
            };
            let root = group[id];
            match names.get(&root) {
                Some((existing, other)) if existing.as_ref() != new => {
                    return Err(RemapError::AmbiguousMapping(format!(
                        "{other} and {key} override each other but map to {existing} and {new}"
                    )));
                }
                Some(_) => {}
                None => {
                    names.insert(root, (Arc::from(new), key));
                }
            }
        }
        let names = names
            .into_iter()
            .map(|(root, (new, _))| (root, new))
            .collect();

        log::debug!(
            "{} virtual methods in dispatch groups, {} classes with broken hierarchies",
            index.len(),
            broken.len()
        );
        Ok(DispatchGroups {
            index,
            group,
            names,
            broken,
        })
    }

    /// The new name a method declaration gets. Methods outside every group fall back to
    /// their own entry in the symbol table.
    pub fn name_of<'a>(&'a self, key: &MemberKey, symbols: &'a SymbolTable) -> Option<&'a str> {
        match self.index.get(key) {
            Some(&id) => self.names.get(&self.group[id]).map(AsRef::as_ref),
            None => symbols.resolve_method(&key.owner, &key.name, &key.descriptor),
        }
    }

    /// Whether two declarations were found to be the same dispatch target.
    pub fn same_group(&self, a: &MemberKey, b: &MemberKey) -> bool {
        match (self.index.get(a), self.index.get(b)) {
            (Some(&a), Some(&b)) => self.group[a] == self.group[b],
            _ => false,
        }
    }

    pub fn broken_hierarchy(&self, class: &str) -> Option<&str> {
        self.broken.get(class).map(String::as_str)
    }
}
