use anyhow::Result;
use kbsearch_core::persist::{load_records, replay, save_records, MetaFile, SnapshotPaths};
use kbsearch_core::VectorEngine;
use serde::Serialize;

/// One ranked match as printed by `query`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRow {
    pub rank: usize,
    pub id: String,
    pub score: f64,
    pub text: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusStats {
    pub documents: usize,
    pub vocabulary: usize,
}

pub fn load_engine(input: &str) -> Result<VectorEngine> {
    let records = load_records(input)?;
    let mut engine = VectorEngine::new();
    replay(&mut engine, records);
    Ok(engine)
}

/// Consolidate every record under `input` into a snapshot at `output`.
pub fn build_snapshot(input: &str, output: &str) -> Result<MetaFile> {
    let records = load_records(input)?;
    let meta = save_records(&SnapshotPaths::new(output), &records)?;
    tracing::info!(output, num_records = meta.num_records, "snapshot written");
    Ok(meta)
}

/// Replay `input` into a fresh engine and rank it against `q`.
pub fn run_query(input: &str, q: &str, k: usize) -> Result<Vec<QueryRow>> {
    let mut engine = load_engine(input)?;
    let rows = engine
        .search_limit(q, k)
        .into_iter()
        .enumerate()
        .map(|(idx, hit)| QueryRow {
            rank: idx + 1,
            id: hit.document.id.clone(),
            score: hit.score,
            text: hit.document.text.clone(),
            metadata: hit.document.metadata.clone(),
        })
        .collect();
    Ok(rows)
}

pub fn corpus_stats(input: &str) -> Result<CorpusStats> {
    let engine = load_engine(input)?;
    Ok(CorpusStats { documents: engine.len(), vocabulary: engine.vocabulary_size() })
}

pub fn render_table(rows: &[QueryRow]) -> String {
    if rows.is_empty() {
        return "no matches above threshold\n".to_string();
    }
    rows.iter()
        .map(|r| format!("{:>2}. {:.4}  {}  {}\n", r.rank, r.score, r.id, r.text))
        .collect()
}

pub fn render_json(rows: &[QueryRow]) -> Result<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}
