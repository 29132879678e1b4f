//! Documents: the unit stored in and retrieved from an index.
//!
//! Two granularities share one collection: a whole page, and a single line
//! of a page. Both carry the owning page's title so hits can be displayed
//! without a second lookup.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Namespace for document ids, so ids never collide with other UUIDv5 users.
const ID_NAMESPACE: Uuid = Uuid::from_u128(0x5c7a_9b1e_4d2f_4e8a_9c31_7f60_b2d4_e815);

/// Separator between id components. Page keys containing it are rejected
/// when a project is loaded.
pub const ID_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocumentKind {
    Page,
    /// `offset` is the zero-based position of the line in the page body.
    Line { offset: usize },
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Line { .. } => "line",
        }
    }
}

/// Everything stored next to the vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(flatten)]
    pub kind: DocumentKind,
    pub page_title: String,
    pub content: String,
    pub content_hash: String,
    /// Name of the embedder that produced the stored vector. Empty for
    /// records written before the model was tracked.
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub kind: DocumentKind,
    pub page_title: String,
    pub content: String,
    pub content_hash: String,
}

impl Document {
    pub fn page(index: &str, page_key: &str, page_title: &str, content: String) -> Self {
        Self {
            id: document_id(index, page_key, DocumentKind::Page),
            kind: DocumentKind::Page,
            page_title: page_title.to_string(),
            content_hash: content_hash(&content),
            content,
        }
    }

    pub fn line(
        index: &str,
        page_key: &str,
        page_title: &str,
        offset: usize,
        content: String,
    ) -> Self {
        let kind = DocumentKind::Line { offset };
        Self {
            id: document_id(index, page_key, kind),
            kind,
            page_title: page_title.to_string(),
            content_hash: content_hash(&content),
            content,
        }
    }

    /// Rebuild a document from what the store returned.
    pub fn from_payload(id: String, payload: Payload) -> Self {
        Self {
            id,
            kind: payload.kind,
            page_title: payload.page_title,
            content: payload.content,
            content_hash: payload.content_hash,
        }
    }

    /// Payload for a vector computed by `model`.
    pub fn payload(&self, model: &str) -> Payload {
        Payload {
            kind: self.kind,
            page_title: self.page_title.clone(),
            content: self.content.clone(),
            content_hash: self.content_hash.clone(),
            model: model.to_string(),
        }
    }

    /// Whether `stored` already holds this document as `model` would embed it.
    ///
    /// A renamed page keeps its id, so the title is compared as well as the
    /// content hash.
    pub fn is_unchanged(&self, stored: &Payload, model: &str) -> bool {
        self.content_hash == stored.content_hash
            && self.page_title == stored.page_title
            && self.kind == stored.kind
            && stored.model == model
    }

    pub fn is_line(&self) -> bool {
        matches!(self.kind, DocumentKind::Line { .. })
    }
}

/// Deterministic id for a document position.
///
/// The id depends only on the index name, the page identity and, for lines,
/// the offset within the page, so the same position maps to the same key on
/// every sync. The result is a UUID string, which every backend accepts as a
/// point id.
pub fn document_id(index: &str, page_key: &str, kind: DocumentKind) -> String {
    let position = match kind {
        DocumentKind::Page => "page".to_string(),
        DocumentKind::Line { offset } => format!("line:{}", offset),
    };
    let key = format!(
        "{index}{sep}{page_key}{sep}{position}",
        sep = ID_SEPARATOR
    );
    Uuid::new_v5(&ID_NAMESPACE, key.as_bytes()).to_string()
}

/// SHA-256 of the content with runs of whitespace collapsed and ends trimmed.
pub fn content_hash(content: &str) -> String {
    let normalized = content.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// A scored search result.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub document: Document,
    pub score: f32,
}

impl fmt::Display for Hit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let doc = &self.document;
        if doc.is_line() {
            write!(f, "[{:.4}] {}: {}", self.score, doc.page_title, doc.content)
        } else {
            write!(f, "[{:.4}] {}", self.score, doc.page_title)
        }
    }
}
