//! Keyword registry.
//!
//! An ordered list of [`KeywordRecord`]s owned by one build environment.
//! Insertion order is output order: help viewers show keywords in the order
//! they appear in the project file.
//!
//! # Lifecycle
//!
//! ```text
//! append (parse)  ──▶  resolve (after render)  ──▶  read by the help builder
//!        ▲                                                   │
//!        └──────────── purge (document about to be re-parsed)┘
//! ```
//!
//! A document's records must be purged before that document is parsed
//! again, otherwise stale or duplicate keywords leak into the output.

use serde::{Deserialize, Serialize};

use crate::models::KeywordRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRegistry {
    records: Vec<KeywordRecord>,
}

impl KeywordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record at the end. Duplicate designations are allowed.
    pub fn append(&mut self, record: KeywordRecord) {
        self.records.push(record);
    }

    /// Remove every record declared by `document`, keeping the order of the
    /// rest. Returns how many were removed.
    pub fn purge(&mut self, document: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.source_document != document);
        before - self.records.len()
    }

    /// All records in insertion order.
    pub fn all_records(&self) -> &[KeywordRecord] {
        &self.records
    }

    pub fn records_for<'a>(&'a self, document: &'a str) -> impl Iterator<Item = &'a KeywordRecord> {
        self.records
            .iter()
            .filter(move |r| r.source_document == document)
    }

    /// Records that have no usable reference yet.
    pub fn unresolved(&self) -> impl Iterator<Item = &KeywordRecord> {
        self.records.iter().filter(|r| !r.is_resolved())
    }

    /// Compute the reference of every record of `document`.
    ///
    /// `target_uri` maps a document to its rendered location, or `None` if
    /// the document was never rendered; in that case the records stay
    /// unresolved. Records without an anchor keep the reference they were
    /// created with. Returns the number of records resolved.
    pub fn resolve<F>(&mut self, document: &str, target_uri: F) -> usize
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(uri) = target_uri(document) else {
            let pending = self.records_for(document).count();
            if pending > 0 {
                tracing::warn!(
                    document,
                    pending,
                    "cannot resolve keywords: document has no rendered location"
                );
            }
            return 0;
        };

        let mut resolved = 0;
        for record in self
            .records
            .iter_mut()
            .filter(|r| r.source_document == document)
        {
            if let Some(anchor) = &record.anchor_target {
                record.resolved_reference = Some(format!("{}#{}", uri, anchor.id));
                resolved += 1;
            }
        }
        resolved
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
