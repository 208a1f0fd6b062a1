//! The export wizard: one session from dataset choice to a downloadable file.
//!
//! Steps run `Dataset → Format → Filters → Review → Status`. Every change to
//! the selection re-requests an estimate; superseded estimate requests are
//! aborted and their late answers ignored. Submitting validates the request
//! locally before anything is sent, then tracks the job with a [`StatusPoller`].

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::{DatasetDescriptor, FormatDescriptor, FormatId};
use crate::client::ExportApi;
use crate::error::{ExportError, Result};
use crate::estimate::EstimateTracker;
use crate::filters::{DateRange, ExportFilterState};
use crate::poller::{PollOutcome, PollPolicy, StatusPoller};
use crate::schema::{EstimateRequest, ExportEstimate, ExportHistoryEntry, ExportJob, ExportRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Dataset,
    Format,
    Filters,
    Review,
    Status,
}

/// Check an export request against its dataset before it is submitted.
pub fn validate_request(dataset: &DatasetDescriptor, request: &ExportRequest) -> Result<()> {
    if dataset.id != request.dataset_id {
        return Err(ExportError::Validation(format!(
            "request targets {} but {} is selected",
            request.dataset_id, dataset.id
        )));
    }
    dataset.ensure_format(request.format)?;
    request.filters.validate(dataset)
}

/// One export session.
///
/// Estimates and status polling run as tokio tasks, so the wizard is meant to
/// be driven from inside a tokio runtime. Outside one, selection changes still
/// apply but the estimate reports an error instead of being requested.
pub struct ExportWizard {
    api: Arc<dyn ExportApi>,
    datasets: Vec<DatasetDescriptor>,
    formats: Vec<FormatDescriptor>,
    step: WizardStep,
    format: Option<FormatId>,
    selection: Option<ExportFilterState>,
    estimates: Arc<Mutex<EstimateTracker>>,
    estimate_task: Option<JoinHandle<()>>,
    job: Option<ExportJob>,
    poller: Option<StatusPoller>,
    policy: PollPolicy,
    last_error: Option<String>,
}

impl ExportWizard {
    /// Load the catalog and start at the dataset step.
    pub async fn load(api: Arc<dyn ExportApi>) -> Result<Self> {
        let datasets = api.list_datasets().await?;
        let formats = api.list_formats().await?;
        info!("Export wizard loaded {} datasets", datasets.len());

        Ok(Self {
            api,
            datasets,
            formats,
            step: WizardStep::Dataset,
            format: None,
            selection: None,
            estimates: Arc::new(Mutex::new(EstimateTracker::new())),
            estimate_task: None,
            job: None,
            poller: None,
            policy: PollPolicy::default(),
            last_error: None,
        })
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn datasets(&self) -> &[DatasetDescriptor] {
        &self.datasets
    }

    pub fn formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    pub fn dataset(&self) -> Option<&DatasetDescriptor> {
        self.selection.as_ref().map(|s| s.dataset())
    }

    pub fn format(&self) -> Option<FormatId> {
        self.format
    }

    pub fn selection(&self) -> Option<&ExportFilterState> {
        self.selection.as_ref()
    }

    /// Message for the error banner, if the last remote call failed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Choose a dataset. Resets the format and all filters; a wizard past the
    /// format step goes back to it.
    pub fn select_dataset(&mut self, dataset_id: &str) -> Result<()> {
        self.ensure_editable()?;
        let dataset = self
            .datasets
            .iter()
            .find(|d| d.id == dataset_id)
            .ok_or_else(|| ExportError::UnknownDataset(dataset_id.to_string()))?;

        self.selection = Some(ExportFilterState::for_dataset(dataset));
        self.format = None;
        if matches!(self.step, WizardStep::Filters | WizardStep::Review) {
            debug!("Wizard step {:?} -> {:?} after dataset change", self.step, WizardStep::Format);
            self.step = WizardStep::Format;
        }
        self.refresh_estimate();
        Ok(())
    }

    /// Choose an output format offered by the selected dataset.
    pub fn select_format(&mut self, format: FormatId) -> Result<()> {
        self.ensure_editable()?;
        let dataset = self.require_dataset()?;
        dataset.ensure_format(format)?;
        self.format = Some(format);
        self.refresh_estimate();
        Ok(())
    }

    /// Formats offered by the selected dataset.
    pub fn available_formats(&self) -> Vec<FormatDescriptor> {
        match self.dataset() {
            Some(dataset) => self
                .formats
                .iter()
                .filter(|f| dataset.supports(f.id))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Toggle an optional field; required fields stay selected.
    pub fn toggle_field(&mut self, field_id: &str) -> Result<bool> {
        self.ensure_editable()?;
        let changed = self.selection_mut()?.toggle_field(field_id)?;
        if changed {
            self.refresh_estimate();
        }
        Ok(changed)
    }

    pub fn set_date_range(&mut self, range: Option<DateRange>) -> Result<()> {
        self.edit(|s| s.set_date_range(range))
    }

    pub fn set_facilities<S: AsRef<str>>(&mut self, values: &[S]) -> Result<()> {
        self.edit(|s| {
            s.set_facilities(values);
            Ok(())
        })
    }

    pub fn set_lgas<S: AsRef<str>>(&mut self, values: &[S]) -> Result<()> {
        self.edit(|s| {
            s.set_lgas(values);
            Ok(())
        })
    }

    pub fn set_filter<S: AsRef<str>>(&mut self, filter_id: &str, values: &[S]) -> Result<()> {
        self.edit(|s| s.set_filter(filter_id, values))
    }

    pub fn set_include_confidential(&mut self, include: bool) -> Result<()> {
        self.edit(|s| {
            s.set_include_confidential(include);
            Ok(())
        })
    }

    fn edit<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut ExportFilterState) -> Result<()>,
    {
        self.ensure_editable()?;
        f(self.selection_mut()?)?;
        self.refresh_estimate();
        Ok(())
    }

    fn ensure_editable(&self) -> Result<()> {
        if self.step == WizardStep::Status {
            return Err(ExportError::Validation(
                "export already submitted; start a new one".to_string(),
            ));
        }
        Ok(())
    }

    fn require_dataset(&self) -> Result<&DatasetDescriptor> {
        self.dataset()
            .ok_or_else(|| ExportError::Validation("no dataset selected".to_string()))
    }

    fn selection_mut(&mut self) -> Result<&mut ExportFilterState> {
        self.selection
            .as_mut()
            .ok_or_else(|| ExportError::Validation("no dataset selected".to_string()))
    }

    // ------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------

    /// Whether `advance` would succeed from the current step.
    pub fn can_advance(&self) -> bool {
        match self.step {
            WizardStep::Dataset => self.selection.is_some(),
            WizardStep::Format => self.format.is_some(),
            WizardStep::Filters => self.build_request().is_ok(),
            WizardStep::Review | WizardStep::Status => false,
        }
    }

    /// Move to the next step. `Review → Status` only happens through [`submit`](Self::submit).
    pub fn advance(&mut self) -> Result<WizardStep> {
        let next = match self.step {
            WizardStep::Dataset => {
                self.require_dataset()?;
                WizardStep::Format
            }
            WizardStep::Format => {
                if self.format.is_none() {
                    return Err(ExportError::Validation("no format selected".to_string()));
                }
                WizardStep::Filters
            }
            WizardStep::Filters => {
                self.build_request()?;
                WizardStep::Review
            }
            WizardStep::Review => {
                return Err(ExportError::Validation(
                    "submit the export to continue".to_string(),
                ))
            }
            WizardStep::Status => {
                return Err(ExportError::Validation("no step after status".to_string()))
            }
        };
        debug!("Wizard step {:?} -> {:?}", self.step, next);
        self.step = next;
        Ok(next)
    }

    pub fn back(&mut self) -> Result<WizardStep> {
        let previous = match self.step {
            WizardStep::Dataset => WizardStep::Dataset,
            WizardStep::Format => WizardStep::Dataset,
            WizardStep::Filters => WizardStep::Format,
            WizardStep::Review => WizardStep::Filters,
            WizardStep::Status => {
                return Err(ExportError::Validation(
                    "export already submitted; start a new one".to_string(),
                ))
            }
        };
        self.step = previous;
        Ok(previous)
    }

    /// Abandon the current export and start over at the dataset step.
    pub fn restart(&mut self) {
        self.dispose();
        self.step = WizardStep::Dataset;
        self.format = None;
        self.selection = None;
        self.job = None;
        self.last_error = None;
        lock(&self.estimates).reset();
    }

    // ------------------------------------------------------------------
    // Estimates
    // ------------------------------------------------------------------

    /// Request a fresh estimate for the current selection, superseding any in flight.
    pub fn refresh_estimate(&mut self) {
        let Some(selection) = &self.selection else {
            return;
        };
        let request = EstimateRequest {
            dataset_id: selection.dataset().id.clone(),
            format: self.format,
            filters: selection.descriptor(),
        };

        if let Some(previous) = self.estimate_task.take() {
            previous.abort();
        }

        let ticket = lock(&self.estimates).begin();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime, skipping estimate for {}", request.dataset_id);
            lock(&self.estimates).complete(
                ticket,
                Err(ExportError::Validation(
                    "estimates need a tokio runtime".to_string(),
                )),
            );
            return;
        };

        let api = self.api.clone();
        let estimates = self.estimates.clone();
        self.estimate_task = Some(runtime.spawn(async move {
            let result = api.estimate(&request).await;
            if let Err(err) = &result {
                warn!("Estimate for {} failed: {}", request.dataset_id, err);
            }
            lock(&estimates).complete(ticket, result);
        }));
    }

    /// Wait for the in-flight estimate, if any, and return the displayed one.
    pub async fn settle_estimate(&mut self) -> Option<ExportEstimate> {
        if let Some(task) = self.estimate_task.take() {
            let _ = task.await;
        }
        self.estimate()
    }

    pub fn estimate(&self) -> Option<ExportEstimate> {
        lock(&self.estimates).current().cloned()
    }

    pub fn estimate_error(&self) -> Option<String> {
        lock(&self.estimates).last_error().map(str::to_string)
    }

    // ------------------------------------------------------------------
    // Submission and tracking
    // ------------------------------------------------------------------

    /// The request `submit` would send, validated against the dataset.
    pub fn build_request(&self) -> Result<ExportRequest> {
        let selection = self
            .selection
            .as_ref()
            .ok_or_else(|| ExportError::Validation("no dataset selected".to_string()))?;
        let format = self
            .format
            .ok_or_else(|| ExportError::Validation("no format selected".to_string()))?;

        let request = ExportRequest {
            dataset_id: selection.dataset().id.clone(),
            format,
            filters: selection.descriptor(),
        };
        validate_request(selection.dataset(), &request)?;
        Ok(request)
    }

    /// Submit the export from the review step and start polling its status.
    pub async fn submit(&mut self) -> Result<ExportJob> {
        if self.step != WizardStep::Review {
            return Err(ExportError::Validation(format!(
                "cannot submit from the {:?} step",
                self.step
            )));
        }
        let request = self.build_request()?;

        let job = match self.api.request_export(&request).await {
            Ok(job) => job,
            Err(err) => {
                self.last_error = Some(err.to_string());
                return Err(err);
            }
        };
        info!(export_id = %job.export_id, "Export submitted");

        self.last_error = None;
        self.step = WizardStep::Status;
        self.poller = Some(StatusPoller::spawn(
            self.api.clone(),
            job.export_id.clone(),
            self.policy,
        ));
        self.job = Some(job.clone());
        Ok(job)
    }

    /// Latest known state of the submitted job.
    pub fn job(&self) -> Option<ExportJob> {
        self.poller
            .as_ref()
            .and_then(StatusPoller::latest)
            .or_else(|| self.job.clone())
    }

    pub fn poller(&self) -> Option<&StatusPoller> {
        self.poller.as_ref()
    }

    /// Wait until the poller stops and record the final job state.
    pub async fn wait_for_completion(&mut self) -> Result<PollOutcome> {
        let poller = self
            .poller
            .take()
            .ok_or_else(|| ExportError::Validation("no export submitted".to_string()))?;

        let outcome = poller.wait().await;
        match &outcome {
            Ok(PollOutcome::Finished(job)) | Ok(PollOutcome::StillProcessing(job)) => {
                self.job = Some(job.clone());
            }
            Ok(PollOutcome::Cancelled) => {}
            Err(err) => self.last_error = Some(err.to_string()),
        }
        outcome
    }

    pub async fn recent_exports(&mut self) -> Result<Vec<ExportHistoryEntry>> {
        self.api.recent_exports().await.inspect_err(|err| {
            self.last_error = Some(err.to_string());
        })
    }

    /// Stop background work owned by the session.
    pub fn dispose(&mut self) {
        if let Some(task) = self.estimate_task.take() {
            task.abort();
        }
        if let Some(poller) = self.poller.take() {
            poller.dispose();
        }
    }
}

impl Drop for ExportWizard {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn lock(tracker: &Mutex<EstimateTracker>) -> std::sync::MutexGuard<'_, EstimateTracker> {
    tracker.lock().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::jobs::{ExportService, JobSettings};
    use crate::records::{Facility, SyntheticRecords};
    use crate::schema::ExportStatus;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-process service that counts calls and slows down narrow estimates.
    struct CountingApi {
        inner: ExportService,
        estimates: AtomicUsize,
        exports: AtomicUsize,
        slow_estimate_fields: Option<usize>,
    }

    impl CountingApi {
        fn new() -> Arc<Self> {
            Self::with_slow_estimates(None)
        }

        fn with_slow_estimates(slow_estimate_fields: Option<usize>) -> Arc<Self> {
            let service = ExportService::new(
                Catalog::builtin(),
                Arc::new(SyntheticRecords::new(5)),
                JobSettings {
                    public_url: "http://exports.test".to_string(),
                    step_delay: Duration::from_millis(5),
                    steps: 3,
                },
                10,
            );
            Arc::new(Self {
                inner: service,
                estimates: AtomicUsize::new(0),
                exports: AtomicUsize::new(0),
                slow_estimate_fields,
            })
        }
    }

    #[async_trait]
    impl ExportApi for CountingApi {
        async fn list_datasets(&self) -> Result<Vec<DatasetDescriptor>> {
            Ok(self.inner.list_datasets())
        }
        async fn list_formats(&self) -> Result<Vec<FormatDescriptor>> {
            Ok(self.inner.list_formats())
        }
        async fn list_facilities(&self) -> Result<Vec<Facility>> {
            Ok(self.inner.facilities())
        }
        async fn estimate(&self, request: &EstimateRequest) -> Result<ExportEstimate> {
            self.estimates.fetch_add(1, Ordering::SeqCst);
            if Some(request.filters.fields.len()) == self.slow_estimate_fields {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            self.inner.estimate(request).await
        }
        async fn request_export(&self, request: &ExportRequest) -> Result<ExportJob> {
            self.exports.fetch_add(1, Ordering::SeqCst);
            self.inner.request_export(request.clone())
        }
        async fn job_status(&self, export_id: &str) -> Result<ExportJob> {
            self.inner.job(export_id)
        }
        async fn recent_exports(&self) -> Result<Vec<ExportHistoryEntry>> {
            Ok(self.inner.recent_exports())
        }
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy::default().with_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_birth_records_export_scenario() {
        let api = CountingApi::new();
        let mut wizard = ExportWizard::load(api.clone())
            .await
            .unwrap()
            .with_poll_policy(fast_policy());

        wizard.select_dataset("birth_records").unwrap();
        wizard.advance().unwrap();
        wizard.select_format(FormatId::Csv).unwrap();
        wizard.advance().unwrap();
        wizard
            .set_date_range(Some(
                DateRange::new(
                    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                    NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
                )
                .unwrap(),
            ))
            .unwrap();
        assert_eq!(wizard.advance().unwrap(), WizardStep::Review);

        let estimate = wizard.settle_estimate().await.unwrap();
        assert!(estimate.record_count > 0);

        let job = wizard.submit().await.unwrap();
        assert_eq!(job.status, ExportStatus::Processing);
        assert_eq!(wizard.step(), WizardStep::Status);

        let outcome = wizard.wait_for_completion().await.unwrap();
        let PollOutcome::Finished(done) = outcome else {
            panic!("export did not finish");
        };
        assert_eq!(done.status, ExportStatus::Completed);
        assert!(!done.download_url.unwrap_or_default().is_empty());
        assert_eq!(done.record_count, Some(estimate.record_count));

        let recent = wizard.recent_exports().await.unwrap();
        assert_eq!(recent[0].export_id, job.export_id);
    }

    #[tokio::test]
    async fn test_unsupported_format_rejected_locally() {
        let api = CountingApi::new();
        let mut wizard = ExportWizard::load(api.clone()).await.unwrap();
        wizard.select_dataset("immunization_records").unwrap();

        let err = wizard.select_format(FormatId::Jsonl).unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedFormat { .. }));
        assert!(err.is_validation());
        assert_eq!(wizard.format(), None);
        assert!(wizard
            .available_formats()
            .iter()
            .all(|f| f.id != FormatId::Jsonl));
        assert_eq!(api.exports.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_validate_request_rejects_unavailable_format() {
        let catalog = Catalog::builtin();
        let dataset = catalog.dataset("antenatal_visits").unwrap();
        let request = ExportRequest {
            dataset_id: dataset.id.clone(),
            format: FormatId::Json,
            filters: ExportFilterState::for_dataset(dataset).descriptor(),
        };
        assert!(matches!(
            validate_request(dataset, &request),
            Err(ExportError::UnsupportedFormat { .. })
        ));

        let ok = ExportRequest {
            format: FormatId::Jsonl,
            ..request
        };
        assert!(validate_request(dataset, &ok).is_ok());
    }

    #[tokio::test]
    async fn test_submit_requires_review_step() {
        let api = CountingApi::new();
        let mut wizard = ExportWizard::load(api.clone()).await.unwrap();
        wizard.select_dataset("birth_records").unwrap();
        wizard.select_format(FormatId::Csv).unwrap();
        assert!(wizard.submit().await.is_err());
        assert_eq!(api.exports.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_step_transitions() {
        let api = CountingApi::new();
        let mut wizard = ExportWizard::load(api).await.unwrap();
        assert_eq!(wizard.step(), WizardStep::Dataset);
        assert!(!wizard.can_advance());
        assert!(wizard.advance().is_err());

        wizard.select_dataset("patient_registry").unwrap();
        assert_eq!(wizard.advance().unwrap(), WizardStep::Format);
        assert!(!wizard.can_advance());
        wizard.select_format(FormatId::Jsonl).unwrap();
        assert_eq!(wizard.advance().unwrap(), WizardStep::Filters);
        assert_eq!(wizard.advance().unwrap(), WizardStep::Review);
        assert!(wizard.advance().is_err());

        assert_eq!(wizard.back().unwrap(), WizardStep::Filters);
        assert_eq!(wizard.back().unwrap(), WizardStep::Format);
        assert_eq!(wizard.back().unwrap(), WizardStep::Dataset);
        assert_eq!(wizard.back().unwrap(), WizardStep::Dataset);
    }

    #[tokio::test]
    async fn test_dataset_change_returns_to_format_step() {
        let api = CountingApi::new();
        let mut wizard = ExportWizard::load(api).await.unwrap();
        wizard.select_dataset("birth_records").unwrap();
        wizard.advance().unwrap();
        wizard.select_format(FormatId::Jsonl).unwrap();
        wizard.advance().unwrap();
        assert_eq!(wizard.advance().unwrap(), WizardStep::Review);

        wizard.select_dataset("immunization_records").unwrap();
        assert_eq!(wizard.step(), WizardStep::Format);
        assert_eq!(wizard.format(), None);
        assert!(!wizard.can_advance());
        assert!(wizard.advance().is_err());

        wizard.select_format(FormatId::Json).unwrap();
        assert_eq!(wizard.advance().unwrap(), WizardStep::Filters);

        // choosing a dataset before the format step keeps the step
        assert_eq!(wizard.back().unwrap(), WizardStep::Format);
        assert_eq!(wizard.back().unwrap(), WizardStep::Dataset);
        wizard.select_dataset("patient_registry").unwrap();
        assert_eq!(wizard.step(), WizardStep::Dataset);
    }

    #[tokio::test]
    async fn test_required_field_toggle_is_noop() {
        let api = CountingApi::new();
        let mut wizard = ExportWizard::load(api).await.unwrap();
        wizard.select_dataset("birth_records").unwrap();
        let before = wizard.selection().unwrap().selected_fields();
        assert!(!wizard.toggle_field("record_id").unwrap());
        assert_eq!(wizard.selection().unwrap().selected_fields(), before);
    }

    #[tokio::test]
    async fn test_latest_estimate_wins() {
        // required-only birth records (3 fields) answer slowly
        let api = CountingApi::with_slow_estimates(Some(3));
        let mut wizard = ExportWizard::load(api.clone()).await.unwrap();
        wizard.select_dataset("birth_records").unwrap();
        // let the slow request start before superseding it
        tokio::task::yield_now().await;
        wizard.toggle_field("birth_weight_kg").unwrap();

        let estimate = wizard.settle_estimate().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let expected = api
            .inner
            .estimate(&EstimateRequest {
                dataset_id: "birth_records".to_string(),
                format: None,
                filters: wizard.selection().unwrap().descriptor(),
            })
            .await
            .unwrap();
        assert_eq!(wizard.estimate(), Some(expected.clone()));
        assert_eq!(estimate, expected);
        assert_eq!(api.estimates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_estimate_error_is_reported() {
        let mut wizard = ExportWizard::load(CountingApi::new()).await.unwrap();
        wizard.select_dataset("immunization_records").unwrap();
        // bypass local validation to provoke a service-side rejection
        wizard.format = Some(FormatId::Jsonl);
        wizard.refresh_estimate();
        assert!(wizard.settle_estimate().await.is_none());
        assert!(wizard.estimate_error().is_some());
    }

    #[test]
    fn test_estimate_outside_runtime_reports_error() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut wizard = runtime.block_on(ExportWizard::load(CountingApi::new())).unwrap();

        wizard.select_dataset("birth_records").unwrap();
        assert!(wizard.estimate().is_none());
        assert!(wizard.estimate_error().unwrap().contains("tokio runtime"));
        assert!(wizard.toggle_field("birth_weight_kg").unwrap());
    }

    #[tokio::test]
    async fn test_dispose_stops_tracking() {
        let api = CountingApi::new();
        let mut wizard = ExportWizard::load(api.clone())
            .await
            .unwrap()
            .with_poll_policy(PollPolicy::default());
        wizard.select_dataset("facility_registry").unwrap();
        wizard.select_format(FormatId::Json).unwrap();
        wizard.advance().unwrap();
        wizard.advance().unwrap();
        wizard.advance().unwrap();
        wizard.submit().await.unwrap();

        assert!(wizard.poller().is_some());
        wizard.dispose();
        assert!(wizard.poller().is_none());
        assert!(wizard.wait_for_completion().await.is_err());

        assert!(wizard.select_dataset("birth_records").is_err());
        wizard.restart();
        assert_eq!(wizard.step(), WizardStep::Dataset);
        assert!(wizard.select_dataset("birth_records").is_ok());
    }

    #[tokio::test]
    async fn test_all_sentinel_through_wizard() {
        let api = CountingApi::new();
        let mut wizard = ExportWizard::load(api).await.unwrap();
        wizard.select_dataset("birth_records").unwrap();

        wizard.set_facilities(&["all", "fac_003"]).unwrap();
        assert!(wizard.selection().unwrap().facilities().matches("fac_003"));
        assert!(!wizard.selection().unwrap().facilities().matches("fac_004"));

        wizard.set_facilities(&["fac_003", "all"]).unwrap();
        assert!(wizard.selection().unwrap().facilities().is_all());
    }
}
