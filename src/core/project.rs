//! Scrapbox project exports.
//!
//! An export is a JSON document with a `pages` array. Each page has a
//! `title` and `lines`, where a line is either a plain string or, for
//! exports taken "with metadata", an object with a `text` field. The first
//! line of a page repeats its title.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::document::ID_SEPARATOR;
use super::notation::plain_text;
use crate::search::error::{Result, ScopeError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Export {
    #[serde(default)]
    display_name: Option<String>,
    pages: Vec<RawPage>,
}

#[derive(Deserialize)]
struct RawPage {
    #[serde(default)]
    id: Option<String>,
    title: String,
    #[serde(default)]
    lines: Vec<RawLine>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLine {
    Text(String),
    Meta { text: String },
}

impl RawLine {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) | Self::Meta { text } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Identity of the page within the project: the export id, else the title.
    pub key: String,
    pub title: String,
    /// Body lines in source order, title line excluded.
    pub lines: Vec<String>,
}

impl Page {
    /// Non-blank body lines with their offsets.
    ///
    /// Blank lines are skipped but still counted, so the offset of a line
    /// does not move when a blank line elsewhere is edited into text.
    pub fn text_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(offset, line)| (offset, line.as_str()))
    }

    /// Whole-page content: the title.
    ///
    /// Lines are indexed on their own, so editing a line leaves the page
    /// document untouched.
    pub fn content(&self) -> &str {
        &self.title
    }

    /// Page content as the embedder should see it.
    pub fn plain_content(&self) -> String {
        plain_text(&self.title)
    }
}

#[derive(Debug, Clone)]
pub struct Project {
    /// Index name, taken from the export's file name.
    pub name: String,
    pub display_name: Option<String>,
    pub pages: Vec<Page>,
}

impl Project {
    pub fn load(path: &Path) -> Result<Self> {
        let name = index_name(path)?;
        let json = fs::read_to_string(path)?;
        Self::from_json(&name, &json)
    }

    pub fn from_json(name: &str, json: &str) -> Result<Self> {
        let export: Export =
            serde_json::from_str(json).map_err(|e| ScopeError::SourceFormat(e.to_string()))?;

        if name.contains(ID_SEPARATOR) {
            return Err(ScopeError::SourceFormat(format!(
                "index name {:?} contains a control character",
                name
            )));
        }

        let mut seen = HashSet::new();
        let mut pages = Vec::with_capacity(export.pages.len());

        for raw in export.pages {
            if raw.title.trim().is_empty() {
                return Err(ScopeError::SourceFormat("page without a title".to_string()));
            }

            let key = raw.id.unwrap_or_else(|| raw.title.clone());
            if key.contains(ID_SEPARATOR) {
                return Err(ScopeError::SourceFormat(format!(
                    "page {:?} contains a control character",
                    key
                )));
            }
            if !seen.insert(key.clone()) {
                return Err(ScopeError::SourceFormat(format!(
                    "duplicate page '{}'",
                    key
                )));
            }

            let mut lines: Vec<String> = raw.lines.into_iter().map(RawLine::into_text).collect();
            if lines.first().is_some_and(|first| first.trim() == raw.title.trim()) {
                lines.remove(0);
            }

            pages.push(Page {
                key,
                title: raw.title,
                lines,
            });
        }

        Ok(Self {
            name: name.to_string(),
            display_name: export.display_name,
            pages,
        })
    }

    /// Number of documents a sync of this project produces.
    pub fn document_count(&self) -> usize {
        self.pages
            .iter()
            .map(|page| 1 + page.text_lines().count())
            .sum()
    }
}

/// Index name for an export file: its file name without extension.
pub fn index_name(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            ScopeError::SourceFormat(format!("cannot derive index name from {}", path.display()))
        })
}
