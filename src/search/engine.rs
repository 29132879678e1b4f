//! Index engine: incremental sync of a project into a vector store, and
//! similarity queries over the result.
//!
//! Every page yields one page document and one line document per non-blank
//! line. All of them live in a single collection named after the index, so
//! a query ranks pages and lines against each other by raw score.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use super::embedding::Embedder;
use super::error::{Result, ScopeError};
use super::vectordb::VectorStore;
use crate::core::document::{Document, Hit};
use crate::core::notation::plain_text;
use crate::core::project::Project;

/// Candidates requested from the store per query.
pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    pub top_k: usize,
    /// Hits scoring below this are dropped.
    pub min_score: Option<f32>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: None,
        }
    }
}

/// Outcome of a sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pages: usize,
    pub lines: usize,
    /// Documents whose vector was (re)computed.
    pub embedded: usize,
    /// Documents already stored with the same content, title and model.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncProgress {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub name: String,
    pub backend: String,
    pub dimension: Option<usize>,
    pub documents: usize,
    /// Embedder recorded on a stored document, if any.
    pub model: Option<String>,
}

/// A document plus the text its vector is computed from.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub document: Document,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Insert,
    Update,
    Skip,
    Force,
}

/// A named index over one project.
pub struct Index<'a> {
    name: String,
    db: &'a dyn VectorStore,
    model: &'a dyn Embedder,
    options: QueryOptions,
}

impl<'a> Index<'a> {
    pub fn new(name: impl Into<String>, db: &'a dyn VectorStore, model: &'a dyn Embedder) -> Self {
        Self {
            name: name.into(),
            db,
            model,
            options: QueryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &dyn Embedder {
        self.model
    }

    /// Documents a project maps to, pages in project order and each page's
    /// lines in source order after it.
    pub fn candidates(&self, project: &Project) -> Vec<Candidate> {
        let mut out = Vec::with_capacity(project.document_count());

        for page in &project.pages {
            out.push(Candidate {
                document: Document::page(
                    &self.name,
                    &page.key,
                    &page.title,
                    page.content().to_string(),
                ),
                text: page.plain_content(),
            });

            for (offset, line) in page.text_lines() {
                out.push(Candidate {
                    document: Document::line(
                        &self.name,
                        &page.key,
                        &page.title,
                        offset,
                        line.to_string(),
                    ),
                    text: plain_text(line),
                });
            }
        }

        out
    }

    pub fn sync(&self, project: &Project, force: bool) -> Result<SyncReport> {
        self.sync_with_progress(project, force, |_| {})
    }

    /// Bring the index up to date with `project`.
    ///
    /// Unchanged documents (same id, content hash, page title and embedder)
    /// are not embedded again unless `force` is set. Switching embedders
    /// therefore re-embeds every document. Documents no longer in the project are
    /// left in place; see [`Index::prune`]. The first failing embed or
    /// upsert aborts the sync.
    pub fn sync_with_progress<F>(
        &self,
        project: &Project,
        force: bool,
        mut on_progress: F,
    ) -> Result<SyncReport>
    where
        F: FnMut(SyncProgress),
    {
        self.db.ensure_collection(&self.name, self.model.dimensions())?;

        let candidates = self.candidates(project);
        let total = candidates.len();
        info!(
            index = %self.name,
            pages = project.pages.len(),
            documents = total,
            force,
            "syncing index"
        );

        let mut report = SyncReport {
            pages: project.pages.len(),
            ..SyncReport::default()
        };

        for (i, candidate) in candidates.iter().enumerate() {
            let doc = &candidate.document;
            if doc.is_line() {
                report.lines += 1;
            }

            let action = self.plan(doc, force)?;
            debug!(id = %doc.id, kind = doc.kind.as_str(), ?action, "sync document");

            if action == Action::Skip {
                report.skipped += 1;
            } else {
                let vector = self.model.embed(&candidate.text)?;
                self.db.upsert(&self.name, &doc.id, &vector, &doc.payload(self.model.name()))?;
                report.embedded += 1;
            }

            on_progress(SyncProgress {
                current: i + 1,
                total,
            });
        }

        info!(
            index = %self.name,
            embedded = report.embedded,
            skipped = report.skipped,
            "sync complete"
        );
        Ok(report)
    }

    fn plan(&self, doc: &Document, force: bool) -> Result<Action> {
        if force {
            return Ok(Action::Force);
        }

        Ok(match self.db.get_payload(&self.name, &doc.id)? {
            None => Action::Insert,
            Some(stored) if doc.is_unchanged(&stored, self.model.name()) => Action::Skip,
            Some(_) => Action::Update,
        })
    }

    /// Similarity search, best first.
    ///
    /// Hits come back in the store's order; an index that was never synced
    /// yields no hits. Fails with `ModelMismatch` when a candidate was
    /// embedded by another model.
    pub fn query(&self, prompt: &str) -> Result<Vec<Hit>> {
        let vector = self.model.embed(prompt)?;
        let points = self.db.search(&self.name, &vector, self.options.top_k)?;

        if let Some(stale) = points.iter().find(|p| p.payload.model != self.model.name()) {
            return Err(ScopeError::ModelMismatch {
                collection: self.name.clone(),
                expected: self.model.name().to_string(),
                actual: stale.payload.model.clone(),
            });
        }

        let hits: Vec<Hit> = points
            .into_iter()
            .filter(|p| self.options.min_score.map_or(true, |min| p.score >= min))
            .map(|p| Hit {
                score: p.score,
                document: Document::from_payload(p.id, p.payload),
            })
            .collect();

        debug!(index = %self.name, hits = hits.len(), "query");
        Ok(hits)
    }

    /// Remove stored documents that `project` no longer produces.
    ///
    /// Returns the ids of the stale documents; with `dry_run` nothing is
    /// deleted.
    pub fn prune(&self, project: &Project, dry_run: bool) -> Result<Vec<String>> {
        let live: HashSet<String> = self
            .candidates(project)
            .into_iter()
            .map(|c| c.document.id)
            .collect();

        let stale: Vec<String> = self
            .db
            .point_ids(&self.name)?
            .into_iter()
            .filter(|id| !live.contains(id))
            .collect();

        if !dry_run && !stale.is_empty() {
            self.db.delete(&self.name, &stale)?;
            info!(index = %self.name, removed = stale.len(), "pruned stale documents");
        }

        Ok(stale)
    }

    pub fn stats(&self) -> Result<IndexStats> {
        let model = match self.db.point_ids(&self.name)?.first() {
            Some(id) => self
                .db
                .get_payload(&self.name, id)?
                .map(|p| p.model)
                .filter(|m| !m.is_empty()),
            None => None,
        };

        Ok(IndexStats {
            name: self.name.clone(),
            backend: self.db.backend().to_string(),
            dimension: self.db.collection_dimension(&self.name)?,
            documents: self.db.count(&self.name)?,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::core::document::DocumentKind;
    use crate::search::error::ScopeError;
    use crate::search::memory::MemoryStore;
    use crate::search::vectordb::SqliteStore;

    /// Concept-count embedder: one dimension per concept, synonyms share one.
    struct ConceptEmbedder {
        name: &'static str,
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    const CONCEPTS: &[&[&str]] = &[
        &["sugar", "sweet", "honey"],
        &["flour", "bake"],
        &["salt", "savory"],
        &["recipes", "cooking"],
        &["add", "ingredient"],
    ];

    impl ConceptEmbedder {
        fn new() -> Self {
            Self::named("concepts")
        }

        /// Same vectors, reported under another model name.
        fn named(name: &'static str) -> Self {
            Self {
                name,
                calls: AtomicUsize::new(0),
                fail_on: None,
            }
        }

        fn failing_on(text: &'static str) -> Self {
            Self {
                fail_on: Some(text),
                ..Self::new()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn reset(&self) {
            self.calls.store(0, Ordering::SeqCst);
        }
    }

    impl Embedder for ConceptEmbedder {
        fn name(&self) -> &str {
            self.name
        }

        fn dimensions(&self) -> usize {
            CONCEPTS.len()
        }

        fn preload(&self) -> Result<()> {
            Ok(())
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(text) {
                return Err(ScopeError::EmbeddingFailure("out of memory".into()));
            }

            let mut v = vec![0.0; CONCEPTS.len()];
            for word in text.split_whitespace().map(str::to_lowercase) {
                if let Some(i) = CONCEPTS.iter().position(|c| c.contains(&word.as_str())) {
                    v[i] += 1.0;
                }
            }
            Ok(v)
        }
    }

    fn recipes(lines: &[&str]) -> Project {
        let lines: Vec<&str> = std::iter::once("Recipes").chain(lines.iter().copied()).collect();
        let json = serde_json::json!({
            "pages": [{ "title": "Recipes", "lines": lines }]
        });
        Project::from_json("kitchen", &json.to_string()).unwrap()
    }

    #[test]
    fn recipes_scenario() -> Result<()> {
        let store = MemoryStore::new();
        let model = ConceptEmbedder::new();
        let index = Index::new("kitchen", &store, &model);

        let report = index.sync(&recipes(&["Add flour", "Add sugar"]), false)?;
        assert_eq!(store.count("kitchen")?, 3);
        assert_eq!(report.embedded, 3);
        assert_eq!((report.pages, report.lines), (1, 2));

        model.reset();
        let report = index.sync(&recipes(&["Add flour", "Add sugar"]), false)?;
        assert_eq!(model.calls(), 0);
        assert_eq!(report.skipped, 3);

        let report = index.sync(&recipes(&["Add flour", "Add salt"]), false)?;
        assert_eq!(model.calls(), 1);
        assert_eq!((report.embedded, report.skipped), (1, 2));
        assert_eq!(store.count("kitchen")?, 3);

        index.sync(&recipes(&["Add flour", "Add sugar"]), false)?;
        let hits = index.query("sweet ingredient")?;
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].document.content, "Add sugar");
        assert_eq!(hits[0].document.kind, DocumentKind::Line { offset: 1 });
        Ok(())
    }

    #[test]
    fn renamed_page_refreshes_line_titles() -> Result<()> {
        let store = MemoryStore::new();
        let model = ConceptEmbedder::new();
        let index = Index::new("kitchen", &store, &model);
        let page = |title: &str| {
            let json = serde_json::json!({
                "pages": [{ "id": "p1", "title": title, "lines": [title, "Add sugar"] }]
            });
            Project::from_json("kitchen", &json.to_string()).unwrap()
        };

        index.sync(&page("Recipes"), false)?;
        model.reset();

        let report = index.sync(&page("Desserts"), false)?;
        assert_eq!((report.embedded, report.skipped), (2, 0));
        assert_eq!(store.count("kitchen")?, 2);

        let hits = index.query("sugar")?;
        assert!(hits[0].to_string().ends_with("] Desserts: Add sugar"));
        assert!(hits.iter().all(|h| h.document.page_title == "Desserts"));
        Ok(())
    }

    #[test]
    fn switching_embedder_reembeds_everything() -> Result<()> {
        let store = MemoryStore::new();
        let before = ConceptEmbedder::named("concepts-v1");
        let after = ConceptEmbedder::named("concepts-v2");
        let project = recipes(&["Add flour", "Add sugar"]);

        Index::new("kitchen", &store, &before).sync(&project, false)?;

        let index = Index::new("kitchen", &store, &after);
        assert_eq!(index.stats()?.model.as_deref(), Some("concepts-v1"));
        let err = index.query("sugar").unwrap_err();
        assert!(matches!(
            err,
            ScopeError::ModelMismatch { ref expected, ref actual, .. }
                if expected == "concepts-v2" && actual == "concepts-v1"
        ));

        let report = index.sync(&project, false)?;
        assert_eq!(after.calls(), 4);
        assert_eq!((report.embedded, report.skipped), (3, 0));
        assert_eq!(index.stats()?.model.as_deref(), Some("concepts-v2"));
        assert_eq!(index.query("sugar")?[0].document.content, "Add sugar");
        Ok(())
    }

    #[test]
    fn sqlite_sync_is_idempotent_across_reopen() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store.db");
        let model = ConceptEmbedder::new();
        let project = recipes(&["Add flour", "Add sugar"]);

        {
            let store = SqliteStore::open(&path)?;
            let report = Index::new("kitchen", &store, &model).sync(&project, false)?;
            assert_eq!(report.embedded, 3);
        }
        model.reset();

        let store = SqliteStore::open(&path)?;
        let index = Index::new("kitchen", &store, &model);
        let report = index.sync(&project, false)?;
        assert_eq!(model.calls(), 0);
        assert_eq!((report.embedded, report.skipped), (0, 3));

        let report = index.sync(&recipes(&["Add flour", "Add salt"]), false)?;
        assert_eq!((report.embedded, report.skipped), (1, 2));
        assert_eq!(store.count("kitchen")?, 3);
        assert_eq!(index.query("salt")?[0].document.content, "Add salt");
        Ok(())
    }

    #[test]
    fn force_reembeds_everything() -> Result<()> {
        let store = MemoryStore::new();
        let model = ConceptEmbedder::new();
        let index = Index::new("kitchen", &store, &model);
        let project = recipes(&["Add flour", "Add sugar"]);

        index.sync(&project, false)?;
        model.reset();

        let report = index.sync(&project, true)?;
        assert_eq!(model.calls(), 3);
        assert_eq!((report.embedded, report.skipped), (3, 0));
        assert_eq!(store.count("kitchen")?, 3);
        Ok(())
    }

    #[test]
    fn changed_content_is_overwritten_in_place() -> Result<()> {
        let store = MemoryStore::new();
        let model = ConceptEmbedder::new();
        let index = Index::new("kitchen", &store, &model);

        index.sync(&recipes(&["Add flour"]), false)?;
        let id = index.candidates(&recipes(&["Add flour"]))[1].document.id.clone();

        index.sync(&recipes(&["Add honey"]), false)?;
        let stored = store.get_payload("kitchen", &id)?.unwrap();
        assert_eq!(stored.content, "Add honey");
        Ok(())
    }

    #[test]
    fn ids_are_deterministic_across_parses() {
        let store = MemoryStore::new();
        let model = ConceptEmbedder::new();
        let index = Index::new("kitchen", &store, &model);

        let first: Vec<String> = index
            .candidates(&recipes(&["Add flour", "", "Add sugar"]))
            .into_iter()
            .map(|c| c.document.id)
            .collect();
        let second: Vec<String> = index
            .candidates(&recipes(&["Add flour", "", "Add sugar"]))
            .into_iter()
            .map(|c| c.document.id)
            .collect();

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(first.iter().collect::<HashSet<_>>().len(), 3);
    }

    #[test]
    fn candidates_follow_project_order() {
        let store = MemoryStore::new();
        let model = ConceptEmbedder::new();
        let index = Index::new("kitchen", &store, &model);

        let project = Project::from_json(
            "kitchen",
            r#"{"pages": [
                {"title": "B", "lines": ["B", "b1", "[b2]"]},
                {"title": "A", "lines": ["A", "a1"]}
            ]}"#,
        )
        .unwrap();

        let order: Vec<(String, String)> = index
            .candidates(&project)
            .into_iter()
            .map(|c| (c.document.content, c.text))
            .collect();
        assert_eq!(
            order,
            vec![
                ("B".to_string(), "B".to_string()),
                ("b1".to_string(), "b1".to_string()),
                ("[b2]".to_string(), "b2".to_string()),
                ("A".to_string(), "A".to_string()),
                ("a1".to_string(), "a1".to_string()),
            ]
        );
    }

    #[test]
    fn query_results_are_score_descending() -> Result<()> {
        let store = MemoryStore::new();
        let model = ConceptEmbedder::new();
        let index = Index::new("kitchen", &store, &model);

        index.sync(
            &recipes(&["Add flour", "Add sugar", "sweet honey", "salt", "bake bake flour"]),
            false,
        )?;

        for prompt in ["sweet", "flour", "add salt", "recipes", ""] {
            let hits = index.query(prompt)?;
            assert!(hits.windows(2).all(|w| w[0].score >= w[1].score), "{}", prompt);
        }
        Ok(())
    }

    #[test]
    fn top_k_and_min_score_limit_hits() -> Result<()> {
        let store = MemoryStore::new();
        let model = ConceptEmbedder::new();
        let project = recipes(&["Add flour", "Add sugar", "salt"]);

        Index::new("kitchen", &store, &model).sync(&project, false)?;

        let top1 = Index::new("kitchen", &store, &model).with_options(QueryOptions {
            top_k: 1,
            min_score: None,
        });
        assert_eq!(top1.query("sugar")?.len(), 1);

        let strict = Index::new("kitchen", &store, &model).with_options(QueryOptions {
            top_k: 10,
            min_score: Some(0.5),
        });
        let hits = strict.query("sugar")?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.content, "Add sugar");
        Ok(())
    }

    #[test]
    fn empty_index_returns_no_hits() -> Result<()> {
        let store = MemoryStore::new();
        let model = ConceptEmbedder::new();
        let index = Index::new("kitchen", &store, &model);

        assert!(index.query("anything")?.is_empty());

        store.ensure_collection("kitchen", model.dimensions())?;
        assert!(index.query("anything")?.is_empty());
        Ok(())
    }

    #[test]
    fn embedding_failure_aborts_sync() {
        let store = MemoryStore::new();
        let model = ConceptEmbedder::failing_on("Add sugar");
        let index = Index::new("kitchen", &store, &model);

        let err = index
            .sync(&recipes(&["Add flour", "Add sugar", "salt"]), false)
            .unwrap_err();
        assert!(matches!(err, ScopeError::EmbeddingFailure(_)));
        assert_eq!(model.calls(), 3);
        assert_eq!(store.count("kitchen").unwrap(), 2);
    }

    #[test]
    fn dimension_mismatch_is_fatal() -> Result<()> {
        let store = MemoryStore::new();
        let model = ConceptEmbedder::new();
        store.ensure_collection("kitchen", 384)?;

        let err = Index::new("kitchen", &store, &model)
            .sync(&recipes(&["Add flour"]), false)
            .unwrap_err();
        assert!(matches!(err, ScopeError::SchemaMismatch { .. }));
        assert_eq!(model.calls(), 0);
        Ok(())
    }

    #[test]
    fn orphans_survive_sync_until_pruned() -> Result<()> {
        let store = MemoryStore::new();
        let model = ConceptEmbedder::new();
        let index = Index::new("kitchen", &store, &model);

        index.sync(&recipes(&["Add flour", "Add sugar"]), false)?;
        index.sync(&recipes(&["Add flour"]), false)?;
        assert_eq!(store.count("kitchen")?, 3);

        let stale = index.prune(&recipes(&["Add flour"]), true)?;
        assert_eq!(stale.len(), 1);
        assert_eq!(store.count("kitchen")?, 3);

        let removed = index.prune(&recipes(&["Add flour"]), false)?;
        assert_eq!(removed, stale);
        assert_eq!(store.count("kitchen")?, 2);
        assert!(index.prune(&recipes(&["Add flour"]), false)?.is_empty());
        Ok(())
    }

    #[test]
    fn progress_and_stats() -> Result<()> {
        let store = MemoryStore::new();
        let model = ConceptEmbedder::new();
        let index = Index::new("kitchen", &store, &model);

        let mut seen = Vec::new();
        index.sync_with_progress(&recipes(&["Add flour", "Add sugar"]), false, |p| {
            seen.push((p.current, p.total))
        })?;
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);

        let stats = index.stats()?;
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.dimension, Some(CONCEPTS.len()));
        assert_eq!(stats.backend, "memory");
        assert_eq!(stats.model.as_deref(), Some("concepts"));
        Ok(())
    }
}
