//! Health data export - dataset catalog, filtered export jobs and the
//! client-side wizard that drives them.

pub mod artifacts;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod estimate;
pub mod filters;
pub mod history;
pub mod jobs;
pub mod poller;
pub mod records;
pub mod render;
pub mod schema;
pub mod server;
pub mod wizard;

pub use catalog::{Catalog, DatasetDescriptor, FormatId};
pub use client::{ExportApi, HttpExportApi};
pub use error::{ExportError, Result};
pub use filters::{DateRange, ExportFilterState, FilterDescriptor, Selection};
pub use jobs::{ExportService, JobSettings};
pub use poller::{PollOutcome, PollPolicy, StatusPoller};
pub use schema::{ExportJob, ExportStatus};
pub use wizard::{ExportWizard, WizardStep};
