use crate::tf::{term_frequency, TermFrequency};
use crate::tokenizer::tokenize;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Number of matches returned when the caller does not ask for a limit.
pub const DEFAULT_LIMIT: usize = 3;
/// Matches scoring at or below this cosine similarity are dropped.
pub const MIN_SCORE: f64 = 0.01;

/// A knowledge entry as held by the engine. Built only by [`VectorEngine::add`].
#[derive(Debug, Clone, Serialize)]
pub struct Document<M = serde_json::Value> {
    pub id: String,
    pub text: String,
    pub metadata: M,
    #[serde(skip)]
    term_frequency: TermFrequency,
}

impl<M> Document<M> {
    pub fn term_frequency(&self) -> &TermFrequency { &self.term_frequency }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit<'a, M = serde_json::Value> {
    pub document: &'a Document<M>,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdfState {
    Clean,
    Dirty,
}

/// In-memory TF-IDF corpus with cosine-similarity ranking.
///
/// IDF is recomputed lazily: `add` and `clear` only flip the cache state, and the
/// next `search` pays for the rebuild. Per-document TF-IDF vectors are never
/// cached; they are rebuilt from the stored term frequencies on every search so
/// the IDF cache is the only thing that can go stale.
#[derive(Debug, Clone)]
pub struct VectorEngine<M = serde_json::Value> {
    documents: Vec<Document<M>>,
    idf: HashMap<String, f64>,
    state: IdfState,
}

impl<M> Default for VectorEngine<M> {
    fn default() -> Self {
        Self { documents: Vec::new(), idf: HashMap::new(), state: IdfState::Clean }
    }
}

impl<M> VectorEngine<M> {
    pub fn new() -> Self { Self::default() }

    /// Append a document. Ids are not checked for uniqueness.
    pub fn add(&mut self, id: impl Into<String>, text: impl Into<String>, metadata: M) {
        let text = text.into();
        let term_frequency = term_frequency(&tokenize(&text));
        self.documents.push(Document { id: id.into(), text, metadata, term_frequency });
        self.state = IdfState::Dirty;
    }

    /// Drop every document and the IDF cache.
    pub fn clear(&mut self) {
        let dropped = self.documents.len();
        self.documents.clear();
        self.idf.clear();
        self.state = IdfState::Clean;
        tracing::debug!(dropped, "cleared corpus");
    }

    /// Top [`DEFAULT_LIMIT`] matches for `query`.
    pub fn search(&mut self, query: &str) -> Vec<SearchHit<'_, M>> {
        self.search_limit(query, DEFAULT_LIMIT)
    }

    /// Rank every document against `query` by cosine similarity of TF-IDF vectors.
    ///
    /// Returns at most `limit` hits scoring above [`MIN_SCORE`], best first; equal
    /// scores keep insertion order. An empty corpus or a query with no weighted
    /// terms yields an empty result.
    pub fn search_limit(&mut self, query: &str, limit: usize) -> Vec<SearchHit<'_, M>> {
        self.refresh_idf();

        let query_tf = term_frequency(&tokenize(query));
        let query_vec: HashMap<&str, f64> = query_tf
            .iter()
            .map(|(term, tf)| (term.as_str(), tf * self.idf.get(term).copied().unwrap_or(0.0)))
            .collect();
        let query_norm = query_vec.values().map(|w| w * w).sum::<f64>().sqrt();
        if query_norm == 0.0 {
            tracing::trace!(query, "query has no weighted terms");
            return Vec::new();
        }

        let mut hits: Vec<SearchHit<'_, M>> = self
            .documents
            .iter()
            .map(|doc| SearchHit { document: doc, score: self.cosine(doc, &query_vec, query_norm) })
            .filter(|hit| hit.score > MIN_SCORE)
            .collect();
        // sort_by is stable, so ties stay in insertion order
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        let total_hits = hits.len();
        hits.truncate(limit);
        tracing::trace!(query, total_hits, returned = hits.len(), "search complete");
        hits
    }

    fn cosine(&self, doc: &Document<M>, query_vec: &HashMap<&str, f64>, query_norm: f64) -> f64 {
        let mut dot = 0.0;
        let mut norm_sq = 0.0;
        for (term, tf) in &doc.term_frequency {
            let weight = tf * self.idf.get(term).copied().unwrap_or(0.0);
            norm_sq += weight * weight;
            if let Some(q) = query_vec.get(term.as_str()) {
                dot += weight * q;
            }
        }
        let doc_norm = norm_sq.sqrt();
        if doc_norm == 0.0 || query_norm == 0.0 {
            return 0.0;
        }
        dot / (doc_norm * query_norm)
    }

    fn refresh_idf(&mut self) {
        if self.state == IdfState::Clean {
            return;
        }
        let mut df: HashMap<&str, u32> = HashMap::new();
        for doc in &self.documents {
            for (term, tf) in &doc.term_frequency {
                if *tf > 0.0 {
                    *df.entry(term.as_str()).or_insert(0) += 1;
                }
            }
        }
        let n = self.documents.len() as f64;
        // Smoothed: goes negative once a term is in nearly every document.
        self.idf = df
            .into_iter()
            .map(|(term, df_t)| (term.to_owned(), (n / (1.0 + df_t as f64)).ln()))
            .collect();
        self.state = IdfState::Clean;
        tracing::debug!(documents = self.documents.len(), terms = self.idf.len(), "rebuilt idf cache");
    }

    pub fn len(&self) -> usize { self.documents.len() }

    pub fn is_empty(&self) -> bool { self.documents.is_empty() }

    /// Documents in insertion order.
    pub fn documents(&self) -> &[Document<M>] { &self.documents }

    /// True when documents were added since IDF was last computed.
    pub fn is_stale(&self) -> bool { self.state == IdfState::Dirty }

    /// Cached IDF for `term`; `None` if the cache is stale or the term unseen.
    pub fn idf(&self, term: &str) -> Option<f64> {
        match self.state {
            IdfState::Dirty => None,
            IdfState::Clean => self.idf.get(term).copied(),
        }
    }

    /// Distinct terms across the corpus. Does not touch the IDF cache.
    pub fn vocabulary_size(&self) -> usize {
        let mut terms: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for doc in &self.documents {
            terms.extend(doc.term_frequency.keys().map(String::as_str));
        }
        terms.len()
    }
}
