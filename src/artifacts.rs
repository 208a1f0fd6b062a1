//! In-memory store for rendered export files.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::catalog::FormatId;

/// A finished export file.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Arc<Vec<u8>>,
    /// Hex-encoded SHA-256 of `bytes`.
    pub checksum: String,
}

impl Artifact {
    pub fn new(export_id: &str, dataset_id: &str, format: FormatId, bytes: Vec<u8>) -> Self {
        let checksum = {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            format!("{:x}", hasher.finalize())
        };
        let descriptor = format.descriptor();
        Self {
            file_name: format!("{}_{}.{}", dataset_id, export_id, descriptor.extension),
            mime_type: descriptor.mime_type,
            bytes: Arc::new(bytes),
            checksum,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Artifacts keyed by export id. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    inner: Arc<RwLock<HashMap<String, Artifact>>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, export_id: &str, artifact: Artifact) {
        tracing::debug!(
            "ArtifactStore: stored '{}' ({} bytes)",
            artifact.file_name,
            artifact.size()
        );
        let mut store = self.inner.write().unwrap();
        store.insert(export_id.to_string(), artifact);
    }

    pub fn get(&self, export_id: &str) -> Option<Artifact> {
        self.inner.read().unwrap().get(export_id).cloned()
    }

    pub fn remove(&self, export_id: &str) -> Option<Artifact> {
        self.inner.write().unwrap().remove(export_id)
    }

    pub fn exists(&self, export_id: &str) -> bool {
        self.inner.read().unwrap().contains_key(export_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_retrieve() {
        let store = ArtifactStore::new();
        let artifact = Artifact::new("exp_1", "birth_records", FormatId::Csv, b"a,b\n".to_vec());
        assert_eq!(artifact.file_name, "birth_records_exp_1.csv");
        assert_eq!(artifact.mime_type, "text/csv");

        store.store("exp_1", artifact.clone());
        let fetched = store.get("exp_1").unwrap();
        assert_eq!(fetched.bytes.as_slice(), b"a,b\n");
        assert_eq!(fetched.size(), 4);
        assert!(store.exists("exp_1"));
        assert!(store.get("exp_2").is_none());

        assert!(store.remove("exp_1").is_some());
        assert!(!store.exists("exp_1"));
    }

    #[test]
    fn test_checksum_is_sha256() {
        let artifact = Artifact::new("exp_1", "x", FormatId::Json, b"abc".to_vec());
        assert_eq!(
            artifact.checksum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_clones_share_storage() {
        let store = ArtifactStore::new();
        let clone = store.clone();
        clone.store("exp_9", Artifact::new("exp_9", "x", FormatId::Jsonl, Vec::new()));
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
    }
}
