//! In-memory document store.
//!
//! A cloneable handle over shared state. Every clone sees the same documents,
//! so an edit made through the tool backend is immediately visible to
//! resource reads and prompt expansion.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::errors::DocumentError;

/// Documents every fresh store starts with.
pub const SEED_DOCUMENTS: [(&str, &str); 6] = [
    (
        "deposition.md",
        "This deposition covers the testimony of Angela Smith, P.E.",
    ),
    (
        "report.pdf",
        "The report details the state of a 20m condenser tower.",
    ),
    (
        "financials.docx",
        "These financials outline the project's budget and expenditures.",
    ),
    (
        "outlook.pdf",
        "This document presents the projected future performance of the system.",
    ),
    (
        "plan.md",
        "The plan outlines the steps for the project's implementation.",
    ),
    (
        "spec.txt",
        "These specifications define the technical requirements for the equipment.",
    ),
];

/// Shared, mutable map of `doc_id → content`.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    docs: Arc<RwLock<BTreeMap<String, String>>>,
}

impl DocumentStore {
    /// A store holding exactly the given documents.
    pub fn new<I, K, V>(docs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let docs = docs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            docs: Arc::new(RwLock::new(docs)),
        }
    }

    /// A store holding the six sample documents.
    pub fn seeded() -> Self {
        Self::new(SEED_DOCUMENTS)
    }

    // Writers only swap whole Strings; a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.docs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.docs.write().unwrap_or_else(|e| e.into_inner())
    }

    /// All document ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn get(&self, doc_id: &str) -> Option<String> {
        self.read().get(doc_id).cloned()
    }

    /// Like [`Self::get`] but with a typed error for the missing case.
    pub fn read_doc(&self, doc_id: &str) -> Result<String, DocumentError> {
        self.get(doc_id).ok_or_else(|| DocumentError::NotFound {
            doc_id: doc_id.to_string(),
        })
    }

    /// Replace every occurrence of `old_str` with `new_str` and return the
    /// new content. If `old_str` does not occur the document is unchanged.
    pub fn edit(
        &self,
        doc_id: &str,
        old_str: &str,
        new_str: &str,
    ) -> Result<String, DocumentError> {
        if old_str.is_empty() {
            return Err(DocumentError::EmptySearch);
        }

        let mut docs = self.write();
        let content = docs.get_mut(doc_id).ok_or_else(|| DocumentError::NotFound {
            doc_id: doc_id.to_string(),
        })?;

        let replacements = content.matches(old_str).count();
        if replacements > 0 {
            *content = content.replace(old_str, new_str);
        }
        tracing::info!(doc_id, replacements, "document edited");
        Ok(content.clone())
    }
}
