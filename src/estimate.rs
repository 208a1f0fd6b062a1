//! Export size/time estimation and client-side estimate sequencing.

use std::sync::Arc;

use crate::catalog::{DatasetDescriptor, FieldType, FormatId};
use crate::error::Result;
use crate::filters::FilterDescriptor;
use crate::records::RecordSource;
use crate::schema::ExportEstimate;

/// Rows the job runner is assumed to write per second.
const ROWS_PER_SECOND: u64 = 2_000;

/// Computes [`ExportEstimate`]s from the record source.
#[derive(Clone)]
pub struct Estimator {
    source: Arc<dyn RecordSource>,
}

impl Estimator {
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self { source }
    }

    pub async fn estimate(
        &self,
        dataset: &DatasetDescriptor,
        filters: &FilterDescriptor,
        format: FormatId,
    ) -> Result<ExportEstimate> {
        let record_count = self.source.count(dataset, filters).await?;
        Ok(build_estimate(dataset, filters, format, record_count))
    }
}

pub fn build_estimate(
    dataset: &DatasetDescriptor,
    filters: &FilterDescriptor,
    format: FormatId,
    record_count: u64,
) -> ExportEstimate {
    let row = bytes_per_row(dataset, &filters.fields, format);
    let header = match format {
        FormatId::Csv => filters.fields.iter().map(|f| f.len() as u64 + 1).sum(),
        FormatId::Json => 4,
        FormatId::Jsonl => 0,
    };
    let estimated_size = header + row * record_count;
    let time_estimate_secs = record_count.div_ceil(ROWS_PER_SECOND).max(1);

    ExportEstimate {
        record_count,
        estimated_size,
        estimated_size_label: format_size(estimated_size),
        time_estimate_secs,
        time_estimate_label: format_duration(time_estimate_secs),
    }
}

fn bytes_per_row(dataset: &DatasetDescriptor, fields: &[String], format: FormatId) -> u64 {
    fields
        .iter()
        .map(|id| {
            let value = match dataset.field(id).map(|f| f.field_type) {
                Some(FieldType::Date) => 10,
                Some(FieldType::Time) => 5,
                Some(FieldType::Number) => 4,
                Some(FieldType::Boolean) => 5,
                Some(FieldType::String) | None => 14,
            };
            // separators, quotes and keys
            match format {
                FormatId::Csv => value + 1,
                FormatId::Json => value + id.len() as u64 + 12,
                FormatId::Jsonl => value + id.len() as u64 + 5,
            }
        })
        .sum()
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_duration(secs: u64) -> String {
    match secs {
        0 | 1 => "about 1 second".to_string(),
        s if s < 60 => format!("about {} seconds", s),
        s if s < 120 => "about 1 minute".to_string(),
        s => format!("about {} minutes", s.div_ceil(60)),
    }
}

// ============================================================================
// Client-side sequencing
// ============================================================================

/// Identifies one estimate request in issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EstimateTicket(u64);

/// Keeps the displayed estimate in step with the most recently issued request.
///
/// Responses are applied only when they answer the latest ticket, so a slow
/// earlier request can never overwrite a newer result.
#[derive(Debug, Default)]
pub struct EstimateTracker {
    issued: u64,
    current: Option<ExportEstimate>,
    last_error: Option<String>,
}

impl EstimateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> EstimateTicket {
        self.issued += 1;
        EstimateTicket(self.issued)
    }

    pub fn is_current(&self, ticket: EstimateTicket) -> bool {
        ticket.0 == self.issued
    }

    /// Apply a response. Returns false when the ticket was superseded.
    pub fn complete(&mut self, ticket: EstimateTicket, result: Result<ExportEstimate>) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(ticket = ticket.0, latest = self.issued, "Dropping stale estimate");
            return false;
        }
        match result {
            Ok(estimate) => {
                self.current = Some(estimate);
                self.last_error = None;
            }
            Err(err) => {
                self.current = None;
                self.last_error = Some(err.to_string());
            }
        }
        true
    }

    /// Forget the shown estimate and invalidate in-flight requests.
    pub fn reset(&mut self) {
        self.issued += 1;
        self.current = None;
        self.last_error = None;
    }

    pub fn current(&self) -> Option<&ExportEstimate> {
        self.current.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
