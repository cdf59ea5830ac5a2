//! Persisted regions of interest.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use geoprompt_core::BoundingBox;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::TilingError;

/// One saved region of interest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoiRecord {
    pub id: u64,
    pub bbox: BoundingBox,
    /// Serialized as RFC 3339.
    pub created_at: DateTime<Utc>,
}

fn check_bbox(bbox: &BoundingBox) -> Result<(), TilingError> {
    bbox.validate()?;
    bbox.crs.ensure_resolved()?;
    Ok(())
}

fn next_id(records: &[RoiRecord]) -> u64 {
    records.iter().map(|r| r.id).max().unwrap_or(0) + 1
}

/// Read a JSON-lines ROI file, rejecting it whole if any record is invalid.
pub fn read_roi_file(path: impl AsRef<Path>) -> Result<Vec<RoiRecord>, TilingError> {
    let records = read_records(path.as_ref())?;
    for r in &records {
        check_bbox(&r.bbox)?;
    }
    Ok(records)
}

/// Write `records` to `path` as JSON lines, replacing the file atomically.
pub fn write_roi_file(path: impl AsRef<Path>, records: &[RoiRecord]) -> Result<(), TilingError> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    for r in records {
        serde_json::to_writer(&mut tmp, r)?;
        tmp.write_all(b"\n")?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// ROI storage. Records are appended one at a time and never edited; the
/// whole store can be replaced from a file or copied out to one.
pub trait RoiStore {
    fn insert(&mut self, bbox: BoundingBox) -> Result<RoiRecord, TilingError>;

    /// All records in insertion order.
    fn list(&self) -> Result<Vec<RoiRecord>, TilingError>;

    /// Replace every record with those read from the JSON-lines file at
    /// `path`. Nothing changes if the file cannot be read or holds an
    /// invalid record. Returns the number of records loaded.
    fn load(&mut self, path: &Path) -> Result<usize, TilingError>;

    /// Copy every record to `path` as JSON lines. Returns the number written.
    fn backup(&self, path: &Path) -> Result<usize, TilingError> {
        let records = self.list()?;
        write_roi_file(path, &records)?;
        info!("backed up {} roi(s) to {}", records.len(), path.display());
        Ok(records.len())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRoiStore {
    records: Vec<RoiRecord>,
}

impl MemoryRoiStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoiStore for MemoryRoiStore {
    fn insert(&mut self, bbox: BoundingBox) -> Result<RoiRecord, TilingError> {
        check_bbox(&bbox)?;
        let record = RoiRecord {
            id: next_id(&self.records),
            bbox,
            created_at: Utc::now(),
        };
        self.records.push(record.clone());
        Ok(record)
    }

    fn list(&self) -> Result<Vec<RoiRecord>, TilingError> {
        Ok(self.records.clone())
    }

    fn load(&mut self, path: &Path) -> Result<usize, TilingError> {
        self.records = read_roi_file(path)?;
        Ok(self.records.len())
    }
}

/// ROI store backed by a JSON-lines file, one record per line.
#[derive(Debug)]
pub struct JsonlRoiStore {
    path: PathBuf,
    next_id: u64,
}

fn read_records(path: &Path) -> Result<Vec<RoiRecord>, TilingError> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

impl JsonlRoiStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TilingError> {
        let path = path.into();
        let next_id = if path.exists() {
            next_id(&read_records(&path)?)
        } else {
            1
        };
        Ok(Self { path, next_id })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RoiStore for JsonlRoiStore {
    fn insert(&mut self, bbox: BoundingBox) -> Result<RoiRecord, TilingError> {
        check_bbox(&bbox)?;
        let record = RoiRecord {
            id: self.next_id,
            bbox,
            created_at: Utc::now(),
        };
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        self.next_id += 1;
        debug!("saved roi {} to {}", record.id, self.path.display());
        Ok(record)
    }

    fn list(&self) -> Result<Vec<RoiRecord>, TilingError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_records(&self.path)
    }

    fn load(&mut self, path: &Path) -> Result<usize, TilingError> {
        let records = read_roi_file(path)?;
        write_roi_file(&self.path, &records)?;
        self.next_id = next_id(&records);
        info!(
            "replaced {} with {} roi(s) from {}",
            self.path.display(),
            records.len(),
            path.display()
        );
        Ok(records.len())
    }
}
