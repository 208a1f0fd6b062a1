//! Dataset catalog: exportable record types, their field schemas and output formats.
//!
//! The built-in catalog covers the health registries; a directory of JSON
//! descriptors can replace it at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::ExportError;

/// Output format identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatId {
    Csv,
    Json,
    Jsonl,
}

impl FormatId {
    pub const ALL: [FormatId; 3] = [FormatId::Csv, FormatId::Json, FormatId::Jsonl];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatId::Csv => "csv",
            FormatId::Json => "json",
            FormatId::Jsonl => "jsonl",
        }
    }

    pub fn parse(s: &str) -> std::result::Result<Self, ExportError> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(FormatId::Csv),
            "json" => Ok(FormatId::Json),
            "jsonl" | "ndjson" => Ok(FormatId::Jsonl),
            _ => Err(ExportError::UnknownFormat(s.to_string())),
        }
    }

    pub fn descriptor(&self) -> FormatDescriptor {
        let (name, description, mime_type) = match self {
            FormatId::Csv => (
                "CSV",
                "Comma-separated values with a header row",
                "text/csv",
            ),
            FormatId::Json => ("JSON", "A single JSON array of records", "application/json"),
            FormatId::Jsonl => (
                "JSON Lines",
                "One JSON object per line",
                "application/x-ndjson",
            ),
        };
        FormatDescriptor {
            id: *self,
            name: name.to_string(),
            description: description.to_string(),
            extension: self.as_str().to_string(),
            mime_type: mime_type.to_string(),
        }
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub id: FormatId,
    pub name: String,
    pub description: String,
    pub extension: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Date,
    Time,
    Number,
    Boolean,
}

/// A column of an exportable dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Personally identifying; blanked unless the export opts into confidential info.
    #[serde(default)]
    pub confidential: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOption {
    pub id: String,
    pub label: String,
}

/// A dataset-specific categorical filter (gender, delivery type, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub id: String,
    pub name: String,
    /// Field the filter matches against.
    pub field: String,
    pub options: Vec<FilterOption>,
}

impl FilterSpec {
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o.id == option)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub available_formats: BTreeSet<FormatId>,
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    /// Field the export date range applies to.
    #[serde(default)]
    pub date_field: Option<String>,
    /// Field holding the facility id, used by the facility and LGA filters.
    #[serde(default)]
    pub facility_field: Option<String>,
    /// Number of records held by the source for this dataset.
    #[serde(default = "default_volume")]
    pub volume: u32,
}

fn default_volume() -> u32 {
    500
}

impl DatasetDescriptor {
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn field(&self, id: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn filter(&self, id: &str) -> Option<&FilterSpec> {
        self.filters.iter().find(|f| f.id == id)
    }

    pub fn supports(&self, format: FormatId) -> bool {
        self.available_formats.contains(&format)
    }

    /// Check that the descriptor is internally consistent.
    ///
    /// Filters, the date field and the facility field must all point at
    /// declared fields, and every filter needs at least one option.
    pub fn validate(&self) -> std::result::Result<(), ExportError> {
        let invalid = |reason: String| ExportError::InvalidDataset {
            dataset: self.id.clone(),
            reason,
        };

        if self.available_formats.is_empty() {
            return Err(invalid("no output formats".to_string()));
        }
        if self.fields.is_empty() {
            return Err(invalid("no fields".to_string()));
        }
        for filter in &self.filters {
            if filter.options.is_empty() {
                return Err(invalid(format!("filter {} has no options", filter.id)));
            }
            if self.field(&filter.field).is_none() {
                return Err(invalid(format!(
                    "filter {} targets unknown field {}",
                    filter.id, filter.field
                )));
            }
        }
        if let Some(date_field) = &self.date_field {
            match self.field(date_field) {
                Some(field) if field.field_type == FieldType::Date => {}
                Some(_) => return Err(invalid(format!("date field {} is not a date", date_field))),
                None => return Err(invalid(format!("unknown date field {}", date_field))),
            }
        }
        if let Some(facility_field) = &self.facility_field {
            if self.field(facility_field).is_none() {
                return Err(invalid(format!("unknown facility field {}", facility_field)));
            }
        }
        Ok(())
    }

    /// Returns an error unless `format` is offered by this dataset.
    pub fn ensure_format(&self, format: FormatId) -> std::result::Result<(), ExportError> {
        if self.supports(format) {
            Ok(())
        } else {
            Err(ExportError::UnsupportedFormat {
                dataset: self.id.clone(),
                format: format.to_string(),
            })
        }
    }
}

/// Read-only catalog of datasets, cheap to clone.
#[derive(Debug, Clone)]
pub struct Catalog {
    datasets: Arc<Vec<DatasetDescriptor>>,
}

impl Catalog {
    pub fn new(datasets: Vec<DatasetDescriptor>) -> Self {
        Self {
            datasets: Arc::new(datasets),
        }
    }

    /// Load one dataset descriptor per `*.json` file in `dir`, sorted by file name.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            anyhow::bail!("Catalog directory does not exist: {:?}", dir);
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut datasets = Vec::with_capacity(paths.len());
        for path in paths {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read dataset descriptor: {:?}", path))?;
            let dataset: DatasetDescriptor = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse dataset descriptor: {:?}", path))?;
            dataset
                .validate()
                .with_context(|| format!("Rejected dataset descriptor: {:?}", path))?;
            info!("Loaded dataset: {} from {:?}", dataset.id, path);
            datasets.push(dataset);
        }

        if datasets.is_empty() {
            anyhow::bail!("No dataset descriptors found in {:?}", dir);
        }

        Ok(Self::new(datasets))
    }

    pub fn builtin() -> Self {
        Self::new(builtin_datasets())
    }

    pub fn list_datasets(&self) -> Vec<DatasetDescriptor> {
        self.datasets.as_ref().clone()
    }

    /// Every format offered by at least one dataset.
    pub fn list_formats(&self) -> Vec<FormatDescriptor> {
        let offered: BTreeSet<FormatId> = self
            .datasets
            .iter()
            .flat_map(|d| d.available_formats.iter().copied())
            .collect();
        offered.iter().map(FormatId::descriptor).collect()
    }

    pub fn dataset(&self, id: &str) -> std::result::Result<&DatasetDescriptor, ExportError> {
        self.datasets
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| ExportError::UnknownDataset(id.to_string()))
    }

    /// Look up a format offered by at least one dataset.
    pub fn format(&self, id: &str) -> std::result::Result<FormatDescriptor, ExportError> {
        let format = FormatId::parse(id)?;
        if self.datasets.iter().any(|d| d.supports(format)) {
            Ok(format.descriptor())
        } else {
            Err(ExportError::UnknownFormat(id.to_string()))
        }
    }
}

// ============================================================================
// Built-in datasets
// ============================================================================

fn field(id: &str, name: &str, field_type: FieldType, required: bool) -> FieldSpec {
    FieldSpec {
        id: id.to_string(),
        name: name.to_string(),
        field_type,
        required,
        confidential: false,
    }
}

fn confidential(id: &str, name: &str) -> FieldSpec {
    FieldSpec {
        confidential: true,
        ..field(id, name, FieldType::String, false)
    }
}

fn filter(id: &str, name: &str, field: &str, options: &[(&str, &str)]) -> FilterSpec {
    FilterSpec {
        id: id.to_string(),
        name: name.to_string(),
        field: field.to_string(),
        options: options
            .iter()
            .map(|(id, label)| FilterOption {
                id: id.to_string(),
                label: label.to_string(),
            })
            .collect(),
    }
}

fn formats(ids: &[FormatId]) -> BTreeSet<FormatId> {
    ids.iter().copied().collect()
}

const GENDERS: &[(&str, &str)] = &[("male", "Male"), ("female", "Female")];

fn builtin_datasets() -> Vec<DatasetDescriptor> {
    use FieldType::{Boolean, Date, Number, Time};

    vec![
        DatasetDescriptor {
            id: "birth_records".to_string(),
            name: "Birth Records".to_string(),
            description: "Registered births with delivery and infant details".to_string(),
            available_formats: formats(&FormatId::ALL),
            fields: vec![
                field("record_id", "Record ID", FieldType::String, true),
                field("birth_date", "Date of Birth", Date, true),
                field("facility_id", "Facility", FieldType::String, true),
                field("birth_time", "Time of Birth", Time, false),
                field("lga", "LGA", FieldType::String, false),
                field("infant_gender", "Infant Gender", FieldType::String, false),
                field("birth_weight_kg", "Birth Weight (kg)", Number, false),
                field("delivery_type", "Delivery Type", FieldType::String, false),
                confidential("mother_name", "Mother's Name"),
                field("mother_age", "Mother's Age", Number, false),
                field("registered", "Civil Registration", Boolean, false),
            ],
            filters: vec![
                filter("gender", "Gender", "infant_gender", GENDERS),
                filter(
                    "delivery_type",
                    "Delivery Type",
                    "delivery_type",
                    &[
                        ("vaginal", "Vaginal"),
                        ("caesarean", "Caesarean Section"),
                        ("assisted", "Assisted"),
                    ],
                ),
            ],
            date_field: Some("birth_date".to_string()),
            facility_field: Some("facility_id".to_string()),
            volume: 1200,
        },
        DatasetDescriptor {
            id: "immunization_records".to_string(),
            name: "Immunization Records".to_string(),
            description: "Vaccine doses administered at facilities".to_string(),
            available_formats: formats(&[FormatId::Csv, FormatId::Json]),
            fields: vec![
                field("record_id", "Record ID", FieldType::String, true),
                field("patient_id", "Patient ID", FieldType::String, true),
                field("vaccination_date", "Vaccination Date", Date, true),
                field("vaccine", "Vaccine", FieldType::String, true),
                field("facility_id", "Facility", FieldType::String, true),
                field("dose_number", "Dose Number", Number, false),
                field("lga", "LGA", FieldType::String, false),
                field("gender", "Gender", FieldType::String, false),
                confidential("patient_name", "Patient Name"),
                field("adverse_event", "Adverse Event Reported", Boolean, false),
            ],
            filters: vec![
                filter(
                    "vaccine",
                    "Vaccine",
                    "vaccine",
                    &[
                        ("bcg", "BCG"),
                        ("opv", "OPV"),
                        ("penta", "Pentavalent"),
                        ("measles", "Measles"),
                        ("yellow_fever", "Yellow Fever"),
                    ],
                ),
                filter("gender", "Gender", "gender", GENDERS),
            ],
            date_field: Some("vaccination_date".to_string()),
            facility_field: Some("facility_id".to_string()),
            volume: 3000,
        },
        DatasetDescriptor {
            id: "antenatal_visits".to_string(),
            name: "Antenatal Visits".to_string(),
            description: "Antenatal care attendance and risk assessment".to_string(),
            available_formats: formats(&[FormatId::Csv, FormatId::Jsonl]),
            fields: vec![
                field("record_id", "Record ID", FieldType::String, true),
                field("patient_id", "Patient ID", FieldType::String, true),
                field("visit_date", "Visit Date", Date, true),
                field("facility_id", "Facility", FieldType::String, true),
                field("lga", "LGA", FieldType::String, false),
                field("visit_number", "Visit Number", Number, false),
                field("gestational_age_weeks", "Gestational Age (weeks)", Number, false),
                field("risk_level", "Risk Level", FieldType::String, false),
                confidential("patient_name", "Patient Name"),
            ],
            filters: vec![filter(
                "risk_level",
                "Risk Level",
                "risk_level",
                &[("normal", "Normal"), ("high", "High Risk")],
            )],
            date_field: Some("visit_date".to_string()),
            facility_field: Some("facility_id".to_string()),
            volume: 2000,
        },
        DatasetDescriptor {
            id: "patient_registry".to_string(),
            name: "Patient Registry".to_string(),
            description: "Registered patients and demographics".to_string(),
            available_formats: formats(&FormatId::ALL),
            fields: vec![
                field("record_id", "Patient ID", FieldType::String, true),
                field("registration_date", "Registration Date", Date, true),
                field("facility_id", "Registering Facility", FieldType::String, true),
                field("lga", "LGA", FieldType::String, false),
                field("gender", "Gender", FieldType::String, false),
                field("age", "Age", Number, false),
                confidential("full_name", "Full Name"),
                confidential("phone", "Phone Number"),
            ],
            filters: vec![filter("gender", "Gender", "gender", GENDERS)],
            date_field: Some("registration_date".to_string()),
            facility_field: Some("facility_id".to_string()),
            volume: 2500,
        },
        DatasetDescriptor {
            id: "facility_registry".to_string(),
            name: "Facility Registry".to_string(),
            description: "Health facilities and their classification".to_string(),
            available_formats: formats(&[FormatId::Csv, FormatId::Json]),
            fields: vec![
                field("record_id", "Facility ID", FieldType::String, true),
                field("name", "Facility Name", FieldType::String, true),
                field("lga", "LGA", FieldType::String, false),
                field("facility_type", "Facility Type", FieldType::String, false),
                field("ownership", "Ownership", FieldType::String, false),
                field("opened_date", "Date Opened", Date, false),
                field("active", "Active", Boolean, false),
            ],
            filters: vec![
                filter(
                    "facility_type",
                    "Facility Type",
                    "facility_type",
                    &[
                        ("primary", "Primary Health Centre"),
                        ("secondary", "General Hospital"),
                        ("tertiary", "Teaching Hospital"),
                    ],
                ),
                filter(
                    "ownership",
                    "Ownership",
                    "ownership",
                    &[("public", "Public"), ("private", "Private")],
                ),
            ],
            date_field: None,
            facility_field: Some("record_id".to_string()),
            volume: 120,
        },
    ]
}
