use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{Result, ScoringError};
use crate::models::ScoreRecord;

/// Source of encoded drawing images, keyed by an opaque identifier
pub trait ImageStore: Send + Sync {
    fn fetch_image(&self, image_id: &str) -> Result<Vec<u8>>;
}

/// Destination for finished subtest scores
pub trait ScoreSink: Send + Sync {
    fn persist_score(&self, record: &PersistedScore) -> Result<()>;
}

/// What gets stored for one scored subtest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedScore {
    pub subtest_id: i64,
    pub extracted_responses: Vec<String>,
    pub score: Vec<u8>,
    pub aggregated_score: u8,
}

impl PersistedScore {
    pub fn new(subtest_id: i64, record: &ScoreRecord) -> Self {
        Self {
            subtest_id,
            extracted_responses: record.responses(),
            score: record.scores().to_vec(),
            aggregated_score: record.aggregate,
        }
    }
}

/// Images stored as files in one directory, named by id with or without
/// an extension
pub struct DirImageStore {
    root: PathBuf,
}

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

impl DirImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ImageStore for DirImageStore {
    fn fetch_image(&self, image_id: &str) -> Result<Vec<u8>> {
        if image_id.is_empty() || image_id.contains(['/', '\\']) || image_id == ".." {
            return Err(ScoringError::Store {
                id: image_id.to_string(),
                reason: "invalid image id".into(),
            });
        }

        let mut candidates = vec![self.root.join(image_id)];
        candidates.extend(
            IMAGE_EXTENSIONS
                .iter()
                .map(|ext| self.root.join(format!("{}.{}", image_id, ext))),
        );

        let path = candidates.into_iter().find(|p| p.is_file()).ok_or_else(|| {
            ScoringError::Store {
                id: image_id.to_string(),
                reason: format!("no image found in {}", self.root.display()),
            }
        })?;
        Ok(std::fs::read(path)?)
    }
}

/// Appends one JSON object per persisted score to a file
pub struct JsonLinesScoreSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesScoreSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

impl ScoreSink for JsonLinesScoreSink {
    fn persist_score(&self, record: &PersistedScore) -> Result<()> {
        let line = serde_json::to_string(record).map_err(|e| ScoringError::Store {
            id: record.subtest_id.to_string(),
            reason: e.to_string(),
        })?;

        let _guard = self.lock.lock().map_err(|_| ScoringError::Store {
            id: record.subtest_id.to_string(),
            reason: "score sink lock poisoned".into(),
        })?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

/// Keeps persisted scores in memory
#[derive(Default)]
pub struct MemoryScoreSink {
    records: Mutex<Vec<PersistedScore>>,
}

impl MemoryScoreSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<PersistedScore> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ScoreSink for MemoryScoreSink {
    fn persist_score(&self, record: &PersistedScore) -> Result<()> {
        let mut records = self.records.lock().map_err(|_| ScoringError::Store {
            id: record.subtest_id.to_string(),
            reason: "score sink lock poisoned".into(),
        })?;
        records.push(record.clone());
        Ok(())
    }
}
