//! Named alias store: link aliases and script aliases.
//!
//! Two namespaces share one key space for lookup. When both hold the same
//! name, the script alias shadows the link alias for lookup, run and delete.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::io::persist::Backend;

/// Persisted alias document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AliasDocument {
    /// Link aliases: `name -> reference`.
    pub commands: BTreeMap<String, String>,
    /// Script aliases: `name -> canonical body`.
    pub saved_commands: BTreeMap<String, String>,
}

/// What a name resolves to, script first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alias {
    Script(String),
    Link(String),
}

/// Which namespace a delete removed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
    Script,
    Link,
}

/// Alias repository with write-through persistence.
///
/// Each operation locks the document for its own duration only; there is no
/// cross-operation transaction and racing writers to one name are
/// last-write-wins.
pub struct NamedStore {
    doc: Mutex<AliasDocument>,
    backend: Box<dyn Backend<AliasDocument>>,
}

impl NamedStore {
    pub fn load(backend: Box<dyn Backend<AliasDocument>>) -> Result<Self> {
        let doc = backend.load()?;
        debug!(
            links = doc.commands.len(),
            scripts = doc.saved_commands.len(),
            source = %backend.describe(),
            "loaded alias store"
        );
        Ok(Self {
            doc: Mutex::new(doc),
            backend,
        })
    }

    fn lock(&self) -> MutexGuard<'_, AliasDocument> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_link(&self, name: &str, reference: &str) {
        let snapshot = {
            let mut doc = self.lock();
            doc.commands.insert(name.to_string(), reference.to_string());
            doc.clone()
        };
        info!(name, reference, "saved link alias");
        self.persist(&snapshot);
    }

    pub fn set_script(&self, name: &str, body: &str) {
        let snapshot = {
            let mut doc = self.lock();
            doc.saved_commands.insert(name.to_string(), body.to_string());
            doc.clone()
        };
        info!(name, bytes = body.len(), "saved script alias");
        self.persist(&snapshot);
    }

    pub fn get_link(&self, name: &str) -> Option<String> {
        self.lock().commands.get(name).cloned()
    }

    pub fn get_script(&self, name: &str) -> Option<String> {
        self.lock().saved_commands.get(name).cloned()
    }

    /// Resolve `name`, preferring the script alias.
    pub fn lookup(&self, name: &str) -> Option<Alias> {
        let doc = self.lock();
        if let Some(body) = doc.saved_commands.get(name) {
            return Some(Alias::Script(body.clone()));
        }
        doc.commands.get(name).cloned().map(Alias::Link)
    }

    /// Remove the script alias under `name`, or the link alias if there is
    /// no script. Returns `None` when neither exists.
    pub fn delete(&self, name: &str) -> Option<AliasKind> {
        let (kind, snapshot) = {
            let mut doc = self.lock();
            let kind = if doc.saved_commands.remove(name).is_some() {
                AliasKind::Script
            } else if doc.commands.remove(name).is_some() {
                AliasKind::Link
            } else {
                return None;
            };
            (kind, doc.clone())
        };
        info!(name, ?kind, "deleted alias");
        self.persist(&snapshot);
        Some(kind)
    }

    /// Union of both namespaces' names, sorted.
    pub fn list_names(&self) -> Vec<String> {
        let doc = self.lock();
        doc.commands
            .keys()
            .chain(doc.saved_commands.keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Write the current document through the backend.
    pub fn flush(&self) -> Result<()> {
        let snapshot = self.lock().clone();
        self.backend.flush(&snapshot)
    }

    fn persist(&self, snapshot: &AliasDocument) {
        if let Err(err) = self.backend.flush(snapshot) {
            warn!(err = %err, "failed to persist alias store");
        }
    }
}
