//! JSON Lines record store used to replay the knowledge base into a fresh engine.

use crate::error::{Result, StoreError};
use crate::VectorEngine;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_records: usize,
    pub created_at: String,
    pub version: u32,
}

pub struct SnapshotPaths {
    pub root: PathBuf,
}

impl SnapshotPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn records(&self) -> PathBuf { self.root.join("records.jsonl") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// Load records from a `.jsonl`/`.json` file, or from every such file under a directory.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<KnowledgeRecord>> {
    let path = path.as_ref();
    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_dir() {
        for entry in WalkDir::new(path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(extension(p), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else {
        files.push(path.to_path_buf());
    }

    let mut records = Vec::new();
    for file in files {
        if extension(&file) == Some("json") {
            load_json(&file, &mut records)?;
        } else {
            load_jsonl(&file, &mut records)?;
        }
    }
    tracing::debug!(path = %path.display(), count = records.len(), "loaded records");
    Ok(records)
}

fn extension(path: &Path) -> Option<&str> { path.extension().and_then(|s| s.to_str()) }

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| StoreError::Read { path: path.to_path_buf(), source })
}

fn load_jsonl(path: &Path, out: &mut Vec<KnowledgeRecord>) -> Result<()> {
    let reader = BufReader::new(open(path)?);
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| StoreError::Read { path: path.to_path_buf(), source })?;
        if line.trim().is_empty() { continue; }
        let record = serde_json::from_str(&line)
            .map_err(|source| StoreError::Decode { path: path.to_path_buf(), line: idx + 1, source })?;
        out.push(record);
    }
    Ok(())
}

fn load_json(path: &Path, out: &mut Vec<KnowledgeRecord>) -> Result<()> {
    let reader = BufReader::new(open(path)?);
    let decode = |source| StoreError::Decode { path: path.to_path_buf(), line: 1, source };
    let json: serde_json::Value = serde_json::from_reader(reader).map_err(decode)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                out.push(serde_json::from_value(v).map_err(decode)?);
            }
        }
        // Objects decode as a single record; scalars and null fail the same decode.
        other => out.push(serde_json::from_value(other).map_err(decode)?),
    }
    Ok(())
}

/// Append one record as a JSON line, creating the file and its parents if needed.
pub fn append_record<P: AsRef<Path>>(path: P, record: &KnowledgeRecord) -> Result<()> {
    append_records(path, std::slice::from_ref(record))
}

/// Append a batch with a single write. Every record is encoded before the file
/// is touched, so an encoding failure leaves the log unchanged.
pub fn append_records<P: AsRef<Path>>(path: P, records: &[KnowledgeRecord]) -> Result<()> {
    let path = path.as_ref();
    let mut buf = String::new();
    for record in records {
        buf.push_str(&serde_json::to_string(record)?);
        buf.push('\n');
    }
    if buf.is_empty() {
        return Ok(());
    }
    let write_err = |source| StoreError::Write { path: path.to_path_buf(), source };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir).map_err(write_err)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path).map_err(write_err)?;
    f.write_all(buf.as_bytes()).map_err(write_err)?;
    Ok(())
}

/// Write a consolidated snapshot: `records.jsonl` plus `meta.json`.
pub fn save_records(paths: &SnapshotPaths, records: &[KnowledgeRecord]) -> Result<MetaFile> {
    let write_err = |path: PathBuf| move |source| StoreError::Write { path, source };
    create_dir_all(&paths.root).map_err(write_err(paths.root.clone()))?;

    let records_path = paths.records();
    let f = File::create(&records_path).map_err(write_err(records_path.clone()))?;
    let mut out = BufWriter::new(f);
    for record in records {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        out.write_all(line.as_bytes()).map_err(write_err(records_path.clone()))?;
    }
    out.flush().map_err(write_err(records_path.clone()))?;

    let meta = MetaFile {
        num_records: records.len(),
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        version: SNAPSHOT_VERSION,
    };
    let json = serde_json::to_string_pretty(&meta)?;
    std::fs::write(paths.meta(), json).map_err(write_err(paths.meta()))?;
    Ok(meta)
}

pub fn load_meta(paths: &SnapshotPaths) -> Result<MetaFile> {
    let path = paths.meta();
    let buf = std::fs::read_to_string(&path).map_err(|source| StoreError::Read { path: path.clone(), source })?;
    serde_json::from_str(&buf).map_err(|source| StoreError::Decode { path, line: 1, source })
}

/// Feed every record into `engine` in order. Returns the number added.
pub fn replay<I>(engine: &mut VectorEngine, records: I) -> usize
where
    I: IntoIterator<Item = KnowledgeRecord>,
{
    let mut count = 0;
    for record in records {
        engine.add(record.id, record.text, record.metadata);
        count += 1;
    }
    tracing::info!(count, "replayed records into engine");
    count
}
