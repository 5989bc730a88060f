//! Knowledge base catalog
//!
//! Parses the FAQ catalog document into validated, immutable entries. Loading
//! is fail-closed: one structurally invalid entry rejects the whole catalog so
//! data-quality problems surface before anything is served.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embeddings::hashed::fnv1a;
use crate::{FaqError, Result};

/// A single FAQ record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    #[serde(rename = "block")]
    pub category: String,
    #[serde(rename = "subblock")]
    pub subcategory: String,
    pub question: String,
    pub answer: String,
    pub tags: Vec<String>,
}

impl Entry {
    /// Text fed to the encoder for this entry: the question followed by its
    /// tags. The answer and category never take part.
    #[inline]
    pub fn canonical_text(&self) -> String {
        let mut text = self.question.clone();
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text.trim().to_string()
    }

    /// Hex FNV-1a digest of [`Entry::canonical_text`]. Two entries with equal
    /// digests encode to the same vector under the same model.
    #[inline]
    pub fn content_digest(&self) -> String {
        format!("{:016x}", fnv1a(self.canonical_text().as_bytes()))
    }
}

// Every field optional so a missing one is reported by name rather than as a
// generic serde error.
#[derive(Debug, Deserialize)]
struct RawCatalog {
    dataset: Option<Vec<RawEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    id: Option<String>,
    block: Option<String>,
    subblock: Option<String>,
    question: Option<String>,
    answer: Option<String>,
    tags: Option<Vec<String>>,
}

/// Ordered, validated collection of entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<Entry>,
    by_id: HashMap<String, usize>,
}

impl Catalog {
    /// Read and parse a catalog file
    #[inline]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading catalog from {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            FaqError::MalformedCatalog(format!("cannot read {}: {}", path.display(), e))
        })?;

        let catalog = Self::parse(&content)?;
        info!(
            "Loaded {} catalog entries in {} categories from {}",
            catalog.len(),
            catalog.categories().len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Parse a catalog document of the form `{"dataset": [...]}`
    #[inline]
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawCatalog = serde_json::from_str(content)
            .map_err(|e| FaqError::MalformedCatalog(format!("invalid JSON: {}", e)))?;

        let raw_entries = raw
            .dataset
            .ok_or_else(|| FaqError::MalformedCatalog("missing 'dataset' key".to_string()))?;

        let entries = raw_entries
            .into_iter()
            .enumerate()
            .map(|(position, raw)| validate_entry(position, raw))
            .collect::<Result<Vec<_>>>()?;

        Self::from_entries(entries)
    }

    /// Build a catalog from already constructed entries, enforcing the same
    /// invariants as parsing.
    #[inline]
    pub fn from_entries(entries: Vec<Entry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(FaqError::MalformedCatalog(
                "catalog contains no entries".to_string(),
            ));
        }

        let mut by_id = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            for (field, value) in [
                ("id", &entry.id),
                ("block", &entry.category),
                ("subblock", &entry.subcategory),
                ("question", &entry.question),
                ("answer", &entry.answer),
            ] {
                if value.trim().is_empty() {
                    return Err(FaqError::MalformedCatalog(format!(
                        "entry #{} has an empty '{}' field",
                        position, field
                    )));
                }
            }

            if let Some(first) = by_id.insert(entry.id.clone(), position) {
                return Err(FaqError::MalformedCatalog(format!(
                    "duplicate id '{}' at entries #{} and #{}",
                    entry.id, first, position
                )));
            }
        }

        Ok(Self { entries, by_id })
    }

    #[inline]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[inline]
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.by_id.get(id).map(|&position| &self.entries[position])
    }

    /// Entry ids in catalog order
    #[inline]
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    /// Distinct categories in order of first appearance
    #[inline]
    pub fn categories(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.category.as_str())
            .unique()
            .collect()
    }

    /// Distinct subcategories of a category in order of first appearance
    #[inline]
    pub fn subcategories(&self, category: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.category == category)
            .map(|e| e.subcategory.as_str())
            .unique()
            .collect()
    }

    #[inline]
    pub fn entries_in<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries.iter().filter(move |e| e.category == category)
    }

    /// Number of entries per category, sorted by category name
    #[inline]
    pub fn category_counts(&self) -> Vec<(&str, usize)> {
        self.entries
            .iter()
            .map(|e| e.category.as_str())
            .counts()
            .into_iter()
            .sorted()
            .collect()
    }
}

fn validate_entry(position: usize, raw: RawEntry) -> Result<Entry> {
    let missing = |field: &str| {
        let label = raw
            .id
            .as_deref()
            .map_or_else(String::new, |id| format!(" (id '{}')", id));
        FaqError::MalformedCatalog(format!(
            "entry #{}{} is missing required field '{}'",
            position, label, field
        ))
    };

    let id = raw.id.clone().ok_or_else(|| missing("id"))?;
    let category = raw.block.clone().ok_or_else(|| missing("block"))?;
    let subcategory = raw.subblock.clone().ok_or_else(|| missing("subblock"))?;
    let question = raw.question.clone().ok_or_else(|| missing("question"))?;
    let answer = raw.answer.clone().ok_or_else(|| missing("answer"))?;
    let tags = raw.tags.clone().ok_or_else(|| missing("tags"))?;

    Ok(Entry {
        id,
        category,
        subcategory,
        question,
        answer,
        tags,
    })
}
