//! Export job lifecycle on the service side.
//!
//! `request_export` validates the request, registers a `processing` job and
//! spawns a runner task that advances progress, renders the file and marks
//! the job completed (or failed).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::artifacts::{Artifact, ArtifactStore};
use crate::catalog::{Catalog, DatasetDescriptor, FormatDescriptor};
use crate::config::ServiceConfig;
use crate::error::{ExportError, Result};
use crate::estimate::Estimator;
use crate::history::ExportHistory;
use crate::records::{Facility, RecordSource};
use crate::render::render;
use crate::schema::{
    EstimateRequest, ExportEstimate, ExportHistoryEntry, ExportJob, ExportRequest,
};

/// Knobs of the job runner.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub public_url: String,
    pub step_delay: Duration,
    pub steps: u32,
}

impl From<&ServiceConfig> for JobSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            public_url: config.public_url.clone(),
            step_delay: config.job_step_delay,
            steps: config.job_steps.max(1),
        }
    }
}

/// Export service shared by all handlers. Clones share state.
#[derive(Clone)]
pub struct ExportService {
    catalog: Catalog,
    source: Arc<dyn RecordSource>,
    estimator: Estimator,
    jobs: Arc<RwLock<HashMap<String, ExportJob>>>,
    artifacts: ArtifactStore,
    history: ExportHistory,
    settings: Arc<JobSettings>,
}

impl ExportService {
    pub fn new(
        catalog: Catalog,
        source: Arc<dyn RecordSource>,
        settings: JobSettings,
        history_limit: usize,
    ) -> Self {
        Self {
            catalog,
            estimator: Estimator::new(source.clone()),
            source,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            artifacts: ArtifactStore::new(),
            history: ExportHistory::new(history_limit),
            settings: Arc::new(settings),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn list_datasets(&self) -> Vec<DatasetDescriptor> {
        self.catalog.list_datasets()
    }

    pub fn list_formats(&self) -> Vec<FormatDescriptor> {
        self.catalog.list_formats()
    }

    pub fn facilities(&self) -> Vec<Facility> {
        self.source.facilities()
    }

    pub async fn estimate(&self, request: &EstimateRequest) -> Result<ExportEstimate> {
        let dataset = self.catalog.dataset(&request.dataset_id)?;
        // without a chosen format, size against the first one the dataset offers
        let format = match request.format {
            Some(format) => format,
            None => dataset.available_formats.iter().next().copied().ok_or_else(|| {
                ExportError::InvalidDataset {
                    dataset: dataset.id.clone(),
                    reason: "no output formats".to_string(),
                }
            })?,
        };
        dataset.ensure_format(format)?;
        request.filters.validate(dataset)?;
        self.estimator.estimate(dataset, &request.filters, format).await
    }

    /// Validate and register a job, then start processing it in the background.
    pub fn request_export(&self, request: ExportRequest) -> Result<ExportJob> {
        let dataset = self.catalog.dataset(&request.dataset_id)?.clone();
        dataset.ensure_format(request.format)?;
        request.filters.validate(&dataset)?;

        let job = ExportJob::new(dataset.id.clone(), request.format);
        {
            let mut jobs = self.jobs.write().unwrap();
            jobs.insert(job.export_id.clone(), job.clone());
        }

        info!(
            export_id = %job.export_id,
            dataset = %dataset.id,
            format = %request.format,
            fields = request.filters.fields.len(),
            "Export job created"
        );

        let service = self.clone();
        let export_id = job.export_id.clone();
        tokio::spawn(async move {
            service.run(export_id, dataset, request).await;
        });

        Ok(job)
    }

    pub fn job(&self, export_id: &str) -> Result<ExportJob> {
        self.jobs
            .read()
            .unwrap()
            .get(export_id)
            .cloned()
            .ok_or_else(|| ExportError::JobNotFound(export_id.to_string()))
    }

    pub fn artifact(&self, export_id: &str) -> Result<Artifact> {
        self.artifacts
            .get(export_id)
            .ok_or_else(|| ExportError::JobNotFound(export_id.to_string()))
    }

    pub fn recent_exports(&self) -> Vec<ExportHistoryEntry> {
        self.history.recent()
    }

    pub fn download_url(&self, export_id: &str) -> String {
        format!("{}/exports/{}/download", self.settings.public_url, export_id)
    }

    async fn run(&self, export_id: String, dataset: DatasetDescriptor, request: ExportRequest) {
        let steps = self.settings.steps;
        for step in 1..=steps {
            tokio::time::sleep(self.settings.step_delay).await;
            // the last few percent belong to rendering
            let progress = (step * 90 / steps) as u8;
            self.update(&export_id, |job| job.progress = Some(progress));
            debug!(export_id = %export_id, progress, "Export progress");
        }

        match self.materialize(&export_id, &dataset, &request).await {
            Ok(artifact) => {
                let download_url = self.download_url(&export_id);
                let mut record_count = 0;
                let finished = self.update(&export_id, |job| {
                    record_count = job.record_count.unwrap_or_default();
                    job.complete(download_url.clone(), record_count);
                });
                if let Some(job) = finished {
                    let evicted = self.history.record(ExportHistoryEntry {
                        export_id: job.export_id.clone(),
                        dataset_id: dataset.id.clone(),
                        dataset_name: dataset.name.clone(),
                        format: job.format,
                        status: job.status,
                        record_count,
                        file_size: artifact.size(),
                        checksum: artifact.checksum.clone(),
                        download_url,
                        created_at: job.created_at,
                        completed_at: job.completed_at.unwrap_or(job.created_at),
                    });
                    self.forget(&evicted);
                }
                info!(
                    export_id = %export_id,
                    records = record_count,
                    bytes = artifact.size(),
                    "Export job completed"
                );
            }
            Err(err) => {
                error!(export_id = %export_id, "Export job failed: {}", err);
                self.update(&export_id, |job| job.fail(err.to_string()));
            }
        }
    }

    async fn materialize(
        &self,
        export_id: &str,
        dataset: &DatasetDescriptor,
        request: &ExportRequest,
    ) -> Result<Artifact> {
        let records = self.source.fetch(dataset, &request.filters).await?;
        let record_count = records.len() as u64;
        debug!(
            export_id,
            source = self.source.name(),
            records = record_count,
            "Fetched export records"
        );
        self.update(export_id, |job| {
            job.record_count = Some(record_count);
            job.progress = Some(95);
        });

        let bytes = render(request.format, &request.filters.fields, &records)?;
        let artifact = Artifact::new(export_id, &dataset.id, request.format, bytes);
        self.artifacts.store(export_id, artifact.clone());
        Ok(artifact)
    }

    /// Drop the jobs and files of exports that fell out of the history.
    fn forget(&self, evicted: &[ExportHistoryEntry]) {
        if evicted.is_empty() {
            return;
        }
        let mut jobs = self.jobs.write().unwrap();
        for entry in evicted {
            jobs.remove(&entry.export_id);
            self.artifacts.remove(&entry.export_id);
            debug!(export_id = %entry.export_id, "Evicted export");
        }
    }

    /// Mutate a job in place, returning the updated copy.
    fn update<F>(&self, export_id: &str, f: F) -> Option<ExportJob>
    where
        F: FnOnce(&mut ExportJob),
    {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(export_id)?;
        f(job);
        Some(job.clone())
    }
}
