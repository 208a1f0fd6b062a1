//! Request and response types exchanged between the export service and its clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::FormatId;
use crate::filters::FilterDescriptor;

/// Lifecycle of an export job. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Processing,
    Completed,
    Failed,
}

impl ExportStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExportStatus::Processing)
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportStatus::Processing => write!(f, "processing"),
            ExportStatus::Completed => write!(f, "completed"),
            ExportStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportJob {
    pub export_id: String,
    pub dataset_id: String,
    pub format: FormatId,
    pub status: ExportStatus,
    /// 0-100, only while processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Only once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExportJob {
    pub fn new(dataset_id: String, format: FormatId) -> Self {
        Self {
            export_id: format!("exp_{}", Uuid::new_v4().simple()),
            dataset_id,
            format,
            status: ExportStatus::Processing,
            progress: Some(0),
            download_url: None,
            error: None,
            record_count: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn complete(&mut self, download_url: String, record_count: u64) {
        self.status = ExportStatus::Completed;
        self.progress = None;
        self.download_url = Some(download_url);
        self.record_count = Some(record_count);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: String) {
        self.status = ExportStatus::Failed;
        self.progress = None;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }
}

/// Body of `POST /exports`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub dataset_id: String,
    pub format: FormatId,
    #[serde(default)]
    pub filters: FilterDescriptor,
}

/// Body of `POST /estimates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateRequest {
    pub dataset_id: String,
    /// Size depends on the format; CSV is assumed when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatId>,
    #[serde(default)]
    pub filters: FilterDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEstimate {
    pub record_count: u64,
    /// Bytes.
    pub estimated_size: u64,
    pub estimated_size_label: String,
    pub time_estimate_secs: u64,
    pub time_estimate_label: String,
}

/// One finished export as shown in the recent exports list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportHistoryEntry {
    pub export_id: String,
    pub dataset_id: String,
    pub dataset_name: String,
    pub format: FormatId,
    pub status: ExportStatus,
    pub record_count: u64,
    pub file_size: u64,
    pub checksum: String,
    pub download_url: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}
