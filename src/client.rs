//! Client side of the export API.
//!
//! [`ExportApi`] is the seam the wizard and the poller talk through;
//! [`HttpExportApi`] implements it against the HTTP service.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::catalog::{DatasetDescriptor, FormatDescriptor};
use crate::error::{ExportError, Result};
use crate::jobs::ExportService;
use crate::records::Facility;
use crate::schema::{EstimateRequest, ExportEstimate, ExportHistoryEntry, ExportJob, ExportRequest};

/// Logical operations of the export service.
#[async_trait]
pub trait ExportApi: Send + Sync {
    async fn list_datasets(&self) -> Result<Vec<DatasetDescriptor>>;
    async fn list_formats(&self) -> Result<Vec<FormatDescriptor>>;
    async fn list_facilities(&self) -> Result<Vec<Facility>>;
    async fn estimate(&self, request: &EstimateRequest) -> Result<ExportEstimate>;
    async fn request_export(&self, request: &ExportRequest) -> Result<ExportJob>;
    async fn job_status(&self, export_id: &str) -> Result<ExportJob>;
    async fn recent_exports(&self) -> Result<Vec<ExportHistoryEntry>>;
}

/// `reqwest` implementation of [`ExportApi`].
#[derive(Clone)]
pub struct HttpExportApi {
    client: Client,
    base_url: String,
}

impl HttpExportApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a finished export file from its download URL.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Downloading export from {}", url);
        let resp = check(self.client.get(url).send().await?).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let resp = check(self.client.get(&url).send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let resp = check(self.client.post(&url).json(body).send().await?).await?;
        Ok(resp.json().await?)
    }
}

/// Turn non-2xx responses into [`ExportError::Api`].
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(ExportError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ExportApi for HttpExportApi {
    async fn list_datasets(&self) -> Result<Vec<DatasetDescriptor>> {
        self.get_json("/datasets").await
    }

    async fn list_formats(&self) -> Result<Vec<FormatDescriptor>> {
        self.get_json("/formats").await
    }

    async fn list_facilities(&self) -> Result<Vec<Facility>> {
        self.get_json("/facilities").await
    }

    async fn estimate(&self, request: &EstimateRequest) -> Result<ExportEstimate> {
        self.post_json("/estimates", request).await
    }

    async fn request_export(&self, request: &ExportRequest) -> Result<ExportJob> {
        self.post_json("/exports", request).await
    }

    async fn job_status(&self, export_id: &str) -> Result<ExportJob> {
        self.get_json(&format!("/exports/{}", export_id)).await
    }

    async fn recent_exports(&self) -> Result<Vec<ExportHistoryEntry>> {
        self.get_json("/exports").await
    }
}

/// In-process adapter, used when the wizard runs next to the service.
#[async_trait]
impl ExportApi for ExportService {
    async fn list_datasets(&self) -> Result<Vec<DatasetDescriptor>> {
        Ok(ExportService::list_datasets(self))
    }

    async fn list_formats(&self) -> Result<Vec<FormatDescriptor>> {
        Ok(ExportService::list_formats(self))
    }

    async fn list_facilities(&self) -> Result<Vec<Facility>> {
        Ok(self.facilities())
    }

    async fn estimate(&self, request: &EstimateRequest) -> Result<ExportEstimate> {
        ExportService::estimate(self, request).await
    }

    async fn request_export(&self, request: &ExportRequest) -> Result<ExportJob> {
        ExportService::request_export(self, request.clone())
    }

    async fn job_status(&self, export_id: &str) -> Result<ExportJob> {
        self.job(export_id)
    }

    async fn recent_exports(&self) -> Result<Vec<ExportHistoryEntry>> {
        Ok(ExportService::recent_exports(self))
    }
}
