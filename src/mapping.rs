//! Rename tables and the text format they are loaded from.
//!
//! ```text
//! # comment
//! class a/A a/AA
//! field a/A.count I total
//! method a/A.run ()V runAA
//! ```
//!
//! Member entries are keyed by the owner, name and descriptor as they appear in the
//! input classes, before any class renames.

use std::{collections::HashMap, fmt, sync::Arc};

use indexmap::IndexMap;

use crate::{
    class::{MemberKind, model::package_of},
    descriptor::{ClassNameMapper, map_descriptor, parse_field_descriptor, parse_method_descriptor},
    error::{RemapError, Result},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberKey {
    pub owner: Arc<str>,
    pub name: Arc<str>,
    pub descriptor: Arc<str>,
}

impl MemberKey {
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        MemberKey {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.owner, self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    classes: IndexMap<Arc<str>, Arc<str>>,
    fields: IndexMap<MemberKey, Arc<str>>,
    methods: IndexMap<MemberKey, Arc<str>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, old: &str, new: &str) -> Result<()> {
        insert_unique(&mut self.classes, old.into(), new.into(), |old| {
            format!("class {old}")
        })
    }

    pub fn add_field(&mut self, owner: &str, name: &str, descriptor: &str, new: &str) -> Result<()> {
        insert_unique(
            &mut self.fields,
            MemberKey::new(owner, name, descriptor),
            new.into(),
            |key| format!("field {key}"),
        )
    }

    pub fn add_method(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        new: &str,
    ) -> Result<()> {
        if name.starts_with('<') && name != new {
            return Err(RemapError::AmbiguousMapping(format!(
                "{owner}.{name} cannot be renamed"
            )));
        }
        insert_unique(
            &mut self.methods,
            MemberKey::new(owner, name, descriptor),
            new.into(),
            |key| format!("method {key}"),
        )
    }

    pub fn resolve_class(&self, name: &str) -> Option<&str> {
        self.classes.get(name).map(AsRef::as_ref)
    }

    pub fn resolve_field(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.fields
            .get(&MemberKey::new(owner, name, descriptor))
            .map(AsRef::as_ref)
    }

    pub fn resolve_method(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.methods
            .get(&MemberKey::new(owner, name, descriptor))
            .map(AsRef::as_ref)
    }

    pub fn resolve_member(
        &self,
        kind: MemberKind,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<&str> {
        match kind {
            MemberKind::Field => self.resolve_field(owner, name, descriptor),
            MemberKind::Method | MemberKind::InterfaceMethod => {
                self.resolve_method(owner, name, descriptor)
            }
        }
    }

    /// The package all mapped classes of `package` move to, if they agree on one and it
    /// differs from `package`.
    pub fn resolve_package(&self, package: &str) -> Option<&str> {
        let mut target = None;
        for (old, new) in &self.classes {
            if package_of(old) != package {
                continue;
            }
            let moved = package_of(new);
            match target {
                Some(existing) if existing != moved => return None,
                Some(_) => {}
                None => target = Some(moved),
            }
        }
        target.filter(|&moved| moved != package)
    }

    pub fn classes(&self) -> impl Iterator<Item = (&Arc<str>, &Arc<str>)> {
        self.classes.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&MemberKey, &Arc<str>)> {
        self.fields.iter()
    }

    pub fn methods(&self) -> impl Iterator<Item = (&MemberKey, &Arc<str>)> {
        self.methods.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.fields.is_empty() && self.methods.is_empty()
    }

    /// Rejects tables where two classes end up with one name, or two members of one
    /// owner end up with the same name and descriptor.
    pub fn validate(&self) -> Result<()> {
        let mut targets: HashMap<&str, &str> = HashMap::new();
        for (old, new) in &self.classes {
            if let Some(other) = targets.insert(new, old) {
                return Err(RemapError::AmbiguousMapping(format!(
                    "classes {other} and {old} both map to {new}"
                )));
            }
        }
        for (kind, table) in [("field", &self.fields), ("method", &self.methods)] {
            let mut seen: HashMap<(Arc<str>, Arc<str>, String), &MemberKey> = HashMap::new();
            for (key, new) in table {
                let descriptor = map_descriptor(&key.descriptor, self)
                    .unwrap_or_else(|_| key.descriptor.to_string());
                if let Some(other) = seen.insert((key.owner.clone(), new.clone(), descriptor), key) {
                    return Err(RemapError::AmbiguousMapping(format!(
                        "{kind}s {other} and {key} both map to {new}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn insert_unique<K>(
    table: &mut IndexMap<K, Arc<str>>,
    key: K,
    new: Arc<str>,
    describe: impl FnOnce(&K) -> String,
) -> Result<()>
where
    K: std::hash::Hash + Eq,
{
    match table.get(&key) {
        Some(existing) if *existing != new => Err(RemapError::AmbiguousMapping(format!(
            "{} maps to both {existing} and {new}",
            describe(&key)
        ))),
        Some(_) => Ok(()),
        None => {
            table.insert(key, new);
            Ok(())
        }
    }
}

impl ClassNameMapper for SymbolTable {
    fn map_class_name(&self, name: &str) -> Option<&str> {
        self.resolve_class(name)
    }
}

/// Parses a mapping file and validates the resulting table.
pub fn parse_mappings(text: &str) -> Result<SymbolTable> {
    let mut table = SymbolTable::new();
    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let syntax = |reason: &str| RemapError::MappingSyntax {
            line: line_number,
            reason: reason.to_string(),
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["class", old, new] => {
                if !is_class_name(old) || !is_class_name(new) {
                    return Err(syntax("invalid class name"));
                }
                table.add_class(old, new)?;
            }
            ["field", member, descriptor, new] => {
                let (owner, name) = split_member(member).ok_or_else(|| syntax("expected owner.name"))?;
                if parse_field_descriptor(descriptor).is_err() {
                    return Err(syntax("invalid field descriptor"));
                }
                if !is_member_name(name) || !is_member_name(new) {
                    return Err(syntax("invalid field name"));
                }
                table.add_field(owner, name, descriptor, new)?;
            }
            ["method", member, descriptor, new] => {
                let (owner, name) = split_member(member).ok_or_else(|| syntax("expected owner.name"))?;
                if parse_method_descriptor(descriptor).is_err() {
                    return Err(syntax("invalid method descriptor"));
                }
                let special = matches!(name, "<init>" | "<clinit>");
                if !(special || is_member_name(name)) || !(special || is_member_name(new)) {
                    return Err(syntax("invalid method name"));
                }
                table.add_method(owner, name, descriptor, new)?;
            }
            [kind, ..] if !matches!(*kind, "class" | "field" | "method") => {
                return Err(syntax(&format!("unknown entry kind `{kind}`")));
            }
            _ => return Err(syntax("wrong number of columns")),
        }
    }
    table.validate()?;
    log::debug!(
        "loaded {} class, {} field and {} method mappings",
        table.classes.len(),
        table.fields.len(),
        table.methods.len()
    );
    Ok(table)
}

fn split_member(member: &str) -> Option<(&str, &str)> {
    let (owner, name) = member.rsplit_once('.')?;
    is_class_name(owner).then_some((owner, name))
}

fn is_class_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('/')
        && !name.ends_with('/')
        && !name.contains("//")
        && !name.contains(['.', ';', '[', '<', '>'])
}

fn is_member_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['.', ';', '[', '/', '<', '>'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_entry_kinds() {
        let table = parse_mappings(
            "# header\n\
             class a/A a/AA\n\
             \n\
             field a/A.count I total # trailing\n\
             method a/A.run ()V runAA\n",
        )
        .unwrap();
        assert_eq!(table.resolve_class("a/A"), Some("a/AA"));
        assert_eq!(table.resolve_class("a/B"), None);
        assert_eq!(table.resolve_field("a/A", "count", "I"), Some("total"));
        assert_eq!(table.resolve_method("a/A", "run", "()V"), Some("runAA"));
        assert_eq!(table.resolve_method("a/A", "run", "()I"), None);
        assert_eq!(
            table.resolve_member(MemberKind::InterfaceMethod, "a/A", "run", "()V"),
            Some("runAA")
        );
    }

    #[test]
    fn reports_line_numbers() {
        let err = parse_mappings("class a/A a/B\nmethod a/A.run V x\n").unwrap_err();
        assert!(matches!(err, RemapError::MappingSyntax { line: 2, .. }), "{err}");
        let err = parse_mappings("package a b\n").unwrap_err();
        assert!(matches!(err, RemapError::MappingSyntax { line: 1, .. }));
        let err = parse_mappings("class a/A\n").unwrap_err();
        assert!(matches!(err, RemapError::MappingSyntax { line: 1, .. }));
    }

    #[test]
    fn rejects_ambiguous_tables() {
        assert!(matches!(
            parse_mappings("class a/A x/Y\nclass a/B x/Y\n"),
            Err(RemapError::AmbiguousMapping(_))
        ));
        assert!(matches!(
            parse_mappings("class a/A x/Y\nclass a/A x/Z\n"),
            Err(RemapError::AmbiguousMapping(_))
        ));
        // descriptors only collide once their class names are mapped
        assert!(matches!(
            parse_mappings(
                "class a/B a/C\n\
                 method a/A.f (La/B;)V g\n\
                 method a/A.h (La/C;)V g\n"
            ),
            Err(RemapError::AmbiguousMapping(_))
        ));
        assert!(matches!(
            parse_mappings("method a/A.<init> ()V make\n"),
            Err(RemapError::AmbiguousMapping(_))
        ));
    }

    #[test]
    fn constructors_keep_their_names() {
        let table = parse_mappings(
            "method a/A.<init> ()V <init>\n\
             method a/A.<clinit> ()V <clinit>\n",
        )
        .unwrap();
        assert_eq!(table.resolve_method("a/A", "<init>", "()V"), Some("<init>"));
        assert!(matches!(
            parse_mappings("method a/A.<init> ()V <clinit>\n"),
            Err(RemapError::AmbiguousMapping(_))
        ));
        assert!(matches!(
            parse_mappings("method a/A.<new> ()V x\n"),
            Err(RemapError::MappingSyntax { line: 1, .. })
        ));
    }

    #[test]
    fn packages_follow_their_classes() {
        let table = parse_mappings(
            "class a/A b/A\n\
             class a/B b/B\n\
             class c/C d/C\n\
             class c/D e/D\n",
        )
        .unwrap();
        assert_eq!(table.resolve_package("a"), Some("b"));
        assert_eq!(table.resolve_package("c"), None);
        assert_eq!(table.resolve_package("x"), None);
    }

    #[test]
    fn repeated_identical_entries_are_fine() {
        let table = parse_mappings("class a/A a/A\nclass a/A a/A\n").unwrap();
        assert_eq!(table.resolve_class("a/A"), Some("a/A"));
    }
}
