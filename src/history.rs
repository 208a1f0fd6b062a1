//! Recent exports registry.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use crate::schema::ExportHistoryEntry;

/// Append-only list of finished exports, newest first, bounded by `limit`.
#[derive(Debug, Clone)]
pub struct ExportHistory {
    entries: Arc<RwLock<VecDeque<ExportHistoryEntry>>>,
    limit: usize,
}

impl ExportHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            limit: limit.max(1),
        }
    }

    /// Add an entry, returning the entries dropped to stay within the limit.
    pub fn record(&self, entry: ExportHistoryEntry) -> Vec<ExportHistoryEntry> {
        let mut entries = self.entries.write().unwrap();
        entries.push_front(entry);
        if entries.len() > self.limit {
            entries.split_off(self.limit).into_iter().collect()
        } else {
            Vec::new()
        }
    }

    pub fn recent(&self) -> Vec<ExportHistoryEntry> {
        self.entries.read().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FormatId;
    use crate::schema::ExportStatus;
    use chrono::Utc;

    fn entry(id: &str) -> ExportHistoryEntry {
        ExportHistoryEntry {
            export_id: id.to_string(),
            dataset_id: "birth_records".to_string(),
            dataset_name: "Birth Records".to_string(),
            format: FormatId::Csv,
            status: ExportStatus::Completed,
            record_count: 10,
            file_size: 100,
            checksum: String::new(),
            download_url: format!("http://localhost:3000/exports/{}/download", id),
            created_at: Utc::now(),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_newest_first() {
        let history = ExportHistory::new(10);
        history.record(entry("exp_1"));
        history.record(entry("exp_2"));
        let ids: Vec<String> = history.recent().into_iter().map(|e| e.export_id).collect();
        assert_eq!(ids, vec!["exp_2", "exp_1"]);
    }

    #[test]
    fn test_limit_drops_oldest() {
        let history = ExportHistory::new(2);
        assert!(history.record(entry("exp_1")).is_empty());
        assert!(history.record(entry("exp_2")).is_empty());
        let evicted = history.record(entry("exp_3"));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].export_id, "exp_1");
        let ids: Vec<String> = history.recent().into_iter().map(|e| e.export_id).collect();
        assert_eq!(ids, vec!["exp_3", "exp_2"]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_empty() {
        let history = ExportHistory::new(0);
        assert!(history.is_empty());
        history.record(entry("exp_1"));
        assert_eq!(history.len(), 1);
    }
}
