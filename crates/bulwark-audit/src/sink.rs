//! Audit sinks.
//!
//! The core treats the audit trail as a write-only append interface. Sinks
//! must never fail or block the decision that produced the record; storage
//! problems are reported through `tracing` instead.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info};

use crate::record::{AuditAction, AuditRecord};
use crate::Result;

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Appends one record. Must not panic and must not block for long.
    fn record(&self, record: AuditRecord);
}

/// In-memory sink, used in tests and by the CLI to print a trail.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record written so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Returns the records with the given action.
    pub fn by_action(&self, action: AuditAction) -> Vec<AuditRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.action == action)
            .cloned()
            .collect()
    }

    /// Counts the records with the given action.
    pub fn count_action(&self, action: AuditAction) -> usize {
        self.records.lock().iter().filter(|r| r.action == action).count()
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}

/// Mirrors records to the `bulwark::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        info!(
            target: "bulwark::audit",
            action = %record.action,
            actor_id = %record.actor_id,
            actor_trust_level = ?record.actor_trust_level,
            details = %record.details,
            "audit"
        );
    }
}

/// Append-only JSON Lines file sink.
///
/// One record per line. The file is flushed after every write so that a
/// crash loses at most the record being written.
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Opens (or creates) the log file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Io` if the file cannot be opened for append.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, record: AuditRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                error!(action = %record.action, "failed to serialize audit record: {}", e);
                return;
            }
        };
        let mut file = self.file.lock();
        if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            error!(path = %self.path.display(), "failed to append audit record: {}", e);
        }
    }
}

/// Writes every record to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    /// Creates an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of inner sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// True when there are no inner sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, record: AuditRecord) {
        for sink in &self.sinks {
            sink.record(record.clone());
        }
    }
}
