//! Heatmap record persistence.
//!
//! The orchestrator reports each written heatmap to a [`HeatmapSink`]. The
//! sink owns id assignment and timestamps; a label only counts as done once
//! its record is stored.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use medcam_core::{CamError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A heatmap to be recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHeatmap {
    /// Diagnosis the heatmap belongs to.
    pub diagnosis_id: u64,
    /// Written image file.
    pub file_path: PathBuf,
    /// Attribution method, e.g. `"grad-cam"`.
    pub method: String,
    /// Explained label.
    pub label: String,
}

/// A stored heatmap record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatmapRecord {
    /// Record id assigned by the sink.
    pub id: u64,
    /// Diagnosis the heatmap belongs to.
    pub diagnosis_id: u64,
    /// Written image file.
    pub file_path: PathBuf,
    /// Attribution method.
    pub method: String,
    /// Explained label.
    pub label: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl HeatmapRecord {
    fn from_new(id: u64, heatmap: NewHeatmap) -> Self {
        Self {
            id,
            diagnosis_id: heatmap.diagnosis_id,
            file_path: heatmap.file_path,
            method: heatmap.method,
            label: heatmap.label,
            created_at: Utc::now(),
        }
    }
}

/// Persistence collaborator for heatmap records.
pub trait HeatmapSink: Send + Sync {
    /// Store a record.
    ///
    /// # Errors
    ///
    /// [`CamError::Persistence`] when the record could not be stored.
    fn record(&self, heatmap: NewHeatmap) -> Result<HeatmapRecord>;
}

impl<S: HeatmapSink + ?Sized> HeatmapSink for Arc<S> {
    fn record(&self, heatmap: NewHeatmap) -> Result<HeatmapRecord> {
        (**self).record(heatmap)
    }
}

/// In-process sink with auto-incrementing ids starting at 1.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<HeatmapRecord>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored record, in insertion order.
    pub fn records(&self) -> Vec<HeatmapRecord> {
        self.records.lock().clone()
    }

    /// Records of one diagnosis.
    pub fn for_diagnosis(&self, diagnosis_id: u64) -> Vec<HeatmapRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.diagnosis_id == diagnosis_id)
            .cloned()
            .collect()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl HeatmapSink for MemorySink {
    fn record(&self, heatmap: NewHeatmap) -> Result<HeatmapRecord> {
        let mut records = self.records.lock();
        let record = HeatmapRecord::from_new(records.len() as u64 + 1, heatmap);
        records.push(record.clone());
        Ok(record)
    }
}

/// Append-only JSON-lines file, one record per line.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    next_id: Mutex<u64>,
}

impl JsonlSink {
    /// Open or create the file at `path`; ids continue after the largest stored id.
    ///
    /// # Errors
    ///
    /// [`CamError::Persistence`] when an existing file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let last_id = if path.exists() {
            read_records(&path)?.iter().map(|r| r.id).max().unwrap_or(0)
        } else {
            0
        };

        Ok(Self {
            path,
            next_id: Mutex::new(last_id + 1),
        })
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every stored record.
    pub fn records(&self) -> Result<Vec<HeatmapRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_records(&self.path)
    }
}

impl HeatmapSink for JsonlSink {
    fn record(&self, heatmap: NewHeatmap) -> Result<HeatmapRecord> {
        let mut next_id = self.next_id.lock();
        let record = HeatmapRecord::from_new(*next_id, heatmap);

        let line =
            serde_json::to_string(&record).map_err(|e| CamError::Persistence(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| CamError::Persistence(format!("{}: {e}", self.path.display())))?;
        writeln!(file, "{line}")
            .and_then(|()| file.flush())
            .map_err(|e| CamError::Persistence(format!("{}: {e}", self.path.display())))?;

        *next_id += 1;
        Ok(record)
    }
}

fn read_records(path: &Path) -> Result<Vec<HeatmapRecord>> {
    let file = std::fs::File::open(path)
        .map_err(|e| CamError::Persistence(format!("{}: {e}", path.display())))?;

    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| CamError::Persistence(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            CamError::Persistence(format!("{}:{}: {e}", path.display(), n + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}
