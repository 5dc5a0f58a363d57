//! Run report: what was harvested and what happened to every target.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use docweave_rewriter::{Anchor, RewriteOutcome, TargetKind};
use docweave_shared::{DocweaveError, Result, RunId};

/// Per-document result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Injection written and committed.
    Injected,
    /// Pass completed without reaching an anchor; file untouched.
    Unchanged,
    /// Nothing to inject for this target kind.
    Skipped,
    /// Parse, I/O or commit failure; file untouched.
    Failed,
}

/// Outcome for one fragment table key.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    /// `document[#fragment]` as filed.
    pub key: String,
    pub path: PathBuf,
    pub kind: TargetKind,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Anchor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl DocumentReport {
    pub fn from_outcome(key: String, outcome: RewriteOutcome, elapsed_ms: u64) -> Self {
        let status = if outcome.injected() {
            DocumentStatus::Injected
        } else {
            DocumentStatus::Unchanged
        };
        Self {
            key,
            path: outcome.path,
            kind: outcome.kind,
            status,
            anchor: outcome.anchor,
            bytes_written: Some(outcome.bytes_written),
            sha256: Some(outcome.sha256),
            error: None,
            elapsed_ms,
        }
    }

    pub fn skipped(key: String, path: PathBuf, kind: TargetKind) -> Self {
        Self {
            key,
            path,
            kind,
            status: DocumentStatus::Skipped,
            anchor: None,
            bytes_written: None,
            sha256: None,
            error: None,
            elapsed_ms: 0,
        }
    }

    pub fn failed(
        key: String,
        path: PathBuf,
        kind: TargetKind,
        error: &DocweaveError,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            key,
            path,
            kind,
            status: DocumentStatus::Failed,
            anchor: None,
            bytes_written: None,
            sha256: None,
            error: Some(error.to_string()),
            elapsed_ms,
        }
    }
}

/// A source map that could not be harvested.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Summary of one harvest + inject run, written as JSON on request.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: usize,
    pub fragments: usize,
    pub harvest_failures: Vec<SourceFailure>,
    pub documents: Vec<DocumentReport>,
    /// Scheduling stopped early after a failure (`fail_fast`).
    pub aborted: bool,
}

impl RunReport {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            run_id: RunId::new(),
            started_at: now,
            finished_at: now,
            sources: 0,
            fragments: 0,
            harvest_failures: Vec::new(),
            documents: Vec::new(),
            aborted: false,
        }
    }

    pub fn count(&self, status: DocumentStatus) -> usize {
        self.documents.iter().filter(|d| d.status == status).count()
    }

    pub fn injected(&self) -> usize {
        self.count(DocumentStatus::Injected)
    }

    pub fn failed(&self) -> usize {
        self.count(DocumentStatus::Failed)
    }

    /// True when every source harvested and no document failed.
    pub fn is_clean(&self) -> bool {
        self.harvest_failures.is_empty() && self.failed() == 0 && !self.aborted
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
        self.documents.sort_by(|a, b| a.key.cmp(&b.key));
    }

    /// Write the report as pretty JSON (temp file, then rename).
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DocweaveError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DocweaveError::validation(format!("report serialization failed: {e}")))?;
        let temp = path.with_extension("json.tmp");
        std::fs::write(&temp, json).map_err(|e| DocweaveError::io(&temp, e))?;
        std::fs::rename(&temp, path).map_err(|e| DocweaveError::io(path, e))?;
        debug!(path = %path.display(), "wrote run report");
        Ok(())
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
