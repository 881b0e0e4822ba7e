//! Enrolled template set.
//!
//! At most one template per label; re-enrolling a label drops the old
//! entry and appends the new one. Serialized as
//! `{"labels":[{"name": .., "vec": [..]}]}`.

use crate::matcher::{CosineMatcher, Matcher};
use crate::types::{Descriptor, MatchResult, Template};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid template store JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    labels: &'a [Template],
}

#[derive(Deserialize)]
struct StoreFile {
    labels: Vec<Template>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateStore {
    templates: Vec<Template>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the template for `label`.
    pub fn enroll(&mut self, label: impl Into<String>, vector: Descriptor) -> &Template {
        let label = label.into();
        let replaced = self.remove(&label);
        tracing::debug!(label = %label, replaced, "template enrolled");
        self.templates.push(Template { label, vector });
        &self.templates[self.templates.len() - 1]
    }

    /// Remove the template for `label`. Returns whether one existed.
    pub fn remove(&mut self, label: &str) -> bool {
        let before = self.templates.len();
        self.templates.retain(|t| t.label != label);
        self.templates.len() != before
    }

    pub fn get(&self, label: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.label == label)
    }

    /// Templates in store order.
    pub fn list(&self) -> &[Template] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn clear(&mut self) {
        self.templates.clear();
    }

    /// Nearest template by cosine similarity; `Unknown`/0 when empty.
    pub fn best_match(&self, probe: &Descriptor) -> MatchResult {
        CosineMatcher.best_match(probe, &self.templates)
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&StoreFileRef {
            labels: &self.templates,
        })?)
    }

    /// Parse a store file, re-enrolling entries in file order so a
    /// duplicated label keeps only its last entry.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let file: StoreFile = serde_json::from_str(json)?;
        Ok(file.labels.into_iter().collect())
    }
}

impl FromIterator<Template> for TemplateStore {
    fn from_iter<I: IntoIterator<Item = Template>>(iter: I) -> Self {
        let mut store = TemplateStore::new();
        for t in iter {
            store.enroll(t.label, t.vector);
        }
        store
    }
}
