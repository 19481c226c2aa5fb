//! The build-scoped store of defined objects.
//!
//! Every defining directive registers its canonical identifier together with
//! the document it appears in and its object type. References consult the
//! registry to find where to link to, and the index is produced from it.
//!
//! Within one document the first definition of an identifier claims it. When
//! another document defines an identifier that is already registered, a
//! [`DuplicateDefinition`] naming the earlier document is reported and the
//! later definition replaces the registered one.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::IdentifierHasher;
use crate::error::Result;
use crate::reference::ObjectType;

// ------------- RegistryEntry -------------
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    document: String,
    object_type: ObjectType,
}

impl RegistryEntry {
    pub fn new(document: &str, object_type: ObjectType) -> Self {
        Self {
            document: document.to_string(),
            object_type,
        }
    }
    pub fn document(&self) -> &str {
        &self.document
    }
    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }
}

// ------------- DuplicateDefinition -------------
/// A warning, never an error: both documents define the same identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateDefinition {
    pub identifier: String,
    pub object_type: ObjectType,
    pub earlier_document: String,
    pub document: String,
}

impl fmt::Display for DuplicateDefinition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "duplicate tryton object description of {}, other found in {}",
            self.identifier, self.earlier_document
        )
    }
}

// ------------- Link -------------
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub document: String,
    pub anchor: String,
    pub object_type: ObjectType,
    pub same_document: bool,
}

// ------------- IndexEntry -------------
/// One row of the object inventory handed to the host for its global index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub name: String,
    pub display_name: String,
    pub object_type: ObjectType,
    pub document: String,
    pub anchor: String,
    pub priority: i32,
}

// ------------- Registry -------------
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Registry {
    entries: HashMap<String, RegistryEntry, IdentifierHasher>,
    // identifiers each document has defined during the current pass
    #[serde(skip)]
    claims: HashMap<String, HashSet<String, IdentifierHasher>, IdentifierHasher>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition of `identifier` in `document`.
    pub fn define(&mut self, identifier: &str, document: &str, object_type: ObjectType) -> Option<DuplicateDefinition> {
        let first_claim = self
            .claims
            .entry(document.to_string())
            .or_default()
            .insert(identifier.to_string());
        let duplicate = match self.entries.get(identifier) {
            Some(existing) if existing.document != document => Some(DuplicateDefinition {
                identifier: identifier.to_string(),
                object_type,
                earlier_document: existing.document.clone(),
                document: document.to_string(),
            }),
            _ => None,
        };
        if let Some(duplicate) = &duplicate {
            warn!(
                document,
                identifier,
                earlier_document = %duplicate.earlier_document,
                "{}",
                duplicate
            );
        }
        if first_claim {
            self.entries
                .insert(identifier.to_string(), RegistryEntry::new(document, object_type));
        }
        duplicate
    }

    /// Forgets everything `document` defined. Returns how many entries were removed.
    pub fn clear(&mut self, document: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.document != document);
        self.claims.remove(document);
        let removed = before - self.entries.len();
        debug!(document, removed, "cleared document");
        removed
    }

    /// Takes over the entries of `other` that belong to one of `documents`.
    pub fn merge<S: AsRef<str>>(&mut self, other: &Registry, documents: &[S]) -> Vec<DuplicateDefinition> {
        let documents: HashSet<&str> = documents.iter().map(|d| d.as_ref()).collect();
        let mut incoming: Vec<(&String, &RegistryEntry)> = other
            .entries
            .iter()
            .filter(|(_, entry)| documents.contains(entry.document.as_str()))
            .collect();
        incoming.sort_by(|a, b| a.0.cmp(b.0));

        let mut duplicates = Vec::new();
        for (identifier, entry) in incoming {
            if let Some(existing) = self.entries.get(identifier) {
                if existing.document != entry.document && !documents.contains(existing.document.as_str()) {
                    let duplicate = DuplicateDefinition {
                        identifier: identifier.clone(),
                        object_type: entry.object_type,
                        earlier_document: existing.document.clone(),
                        document: entry.document.clone(),
                    };
                    warn!(document = %entry.document, identifier = %identifier, "{}", duplicate);
                    duplicates.push(duplicate);
                }
            }
            self.entries.insert(identifier.clone(), entry.clone());
        }
        for (document, claimed) in &other.claims {
            if documents.contains(document.as_str()) {
                self.claims
                    .entry(document.clone())
                    .or_default()
                    .extend(claimed.iter().cloned());
            }
        }
        duplicates
    }

    /// Exact lookup by identifier alone; the stored type comes with the entry.
    pub fn resolve(&self, identifier: &str) -> Option<&RegistryEntry> {
        self.entries.get(identifier)
    }

    /// Where a reference from `from_document` to `identifier` should link to.
    pub fn link(&self, from_document: &str, identifier: &str) -> Option<Link> {
        self.resolve(identifier).map(|entry| Link {
            document: entry.document.clone(),
            anchor: identifier.to_string(),
            object_type: entry.object_type,
            same_document: entry.document == from_document,
        })
    }

    /// `(identifier, entry)` pairs in no particular order. Each call starts over.
    pub fn all_entries(&self) -> impl Iterator<Item = (&str, &RegistryEntry)> + '_ {
        self.entries.iter().map(|(identifier, entry)| (identifier.as_str(), entry))
    }

    pub fn entries(&self) -> impl Iterator<Item = IndexEntry> + '_ {
        self.all_entries().map(|(identifier, entry)| IndexEntry {
            name: identifier.to_string(),
            display_name: identifier.to_string(),
            object_type: entry.object_type,
            document: entry.document.clone(),
            anchor: identifier.to_string(),
            priority: 1,
        })
    }

    pub fn documents(&self) -> HashSet<&str> {
        self.entries.values().map(|entry| entry.document.as_str()).collect()
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!(path = %path.display(), entries = self.len(), "saved registry");
        Ok(())
    }
    /// Reads a saved registry. Claims are not saved, documents are re-read after loading.
    pub fn load(path: &Path) -> Result<Self> {
        let registry: Registry = serde_json::from_str(&fs::read_to_string(path)?)?;
        debug!(path = %path.display(), entries = registry.len(), "loaded registry");
        Ok(registry)
    }
}

impl PartialEq for Registry {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}
