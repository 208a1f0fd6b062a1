//! Record sources backing estimates and exports.
//!
//! [`SyntheticRecords`] produces a deterministic population per dataset so
//! estimates and exported files agree with each other across runs.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::catalog::{DatasetDescriptor, FieldSpec, FieldType};
use crate::error::Result;
use crate::filters::FilterDescriptor;

pub type Record = Map<String, Value>;

/// Async trait implemented by every source of exportable records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    fn name(&self) -> &str;

    /// Number of records matching the descriptor.
    async fn count(&self, dataset: &DatasetDescriptor, filters: &FilterDescriptor) -> Result<u64>;

    /// Matching records projected onto the selected fields.
    async fn fetch(
        &self,
        dataset: &DatasetDescriptor,
        filters: &FilterDescriptor,
    ) -> Result<Vec<Record>>;

    /// Facilities that can appear in the facility filter.
    fn facilities(&self) -> Vec<Facility>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub lga: String,
}

pub const LGAS: &[&str] = &[
    "agege",
    "alimosho",
    "badagry",
    "epe",
    "ikeja",
    "ikorodu",
    "mushin",
    "surulere",
];

const FACILITY_COUNT: usize = 120;

const FIRST_NAMES: &[&str] = &[
    "Adaeze", "Bola", "Chinedu", "Damilola", "Emeka", "Funmi", "Ngozi", "Tunde", "Yetunde",
    "Zainab",
];
const LAST_NAMES: &[&str] = &[
    "Adeyemi", "Bello", "Eze", "Ibrahim", "Musa", "Nwosu", "Ogunleye", "Okafor",
];

/// Deterministic population generator.
#[derive(Debug, Clone)]
pub struct SyntheticRecords {
    seed: u64,
    facilities: Vec<Facility>,
}

impl SyntheticRecords {
    pub fn new(seed: u64) -> Self {
        let facilities = (0..FACILITY_COUNT)
            .map(|i| {
                let lga = LGAS[i % LGAS.len()];
                Facility {
                    id: format!("fac_{:03}", i + 1),
                    name: format!("{} Health Centre {}", title_case(lga), i / LGAS.len() + 1),
                    lga: lga.to_string(),
                }
            })
            .collect();
        Self { seed, facilities }
    }

    /// Stable pseudo-random draw for one (dataset, record, salt) triple.
    fn draw(&self, dataset: &str, index: u32, salt: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(dataset.as_bytes());
        hasher.update(index.to_le_bytes());
        hasher.update(salt.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }

    fn pick<'a>(&self, items: &'a [&'a str], dataset: &str, index: u32, salt: &str) -> &'a str {
        if items.is_empty() {
            return "";
        }
        items[(self.draw(dataset, index, salt) % items.len() as u64) as usize]
    }

    /// Full record before filtering and projection.
    fn generate(&self, dataset: &DatasetDescriptor, index: u32) -> Record {
        let facility = self.facility_for(dataset, index);
        let mut record = Map::new();

        for field in &dataset.fields {
            let value = if dataset.facility_field.as_deref() == Some(field.id.as_str()) {
                Value::String(facility.id.clone())
            } else if field.id == "lga" {
                Value::String(facility.lga.clone())
            } else if let Some(spec) = dataset.filters.iter().find(|f| f.field == field.id) {
                let options: Vec<&str> = spec.options.iter().map(|o| o.id.as_str()).collect();
                Value::String(self.pick(&options, &dataset.id, index, &field.id).to_string())
            } else {
                self.value_for(dataset, field, index, facility)
            };
            record.insert(field.id.clone(), value);
        }

        record
    }

    fn facility_for(&self, dataset: &DatasetDescriptor, index: u32) -> &Facility {
        let slot = if dataset.facility_field.as_deref() == Some("record_id") {
            index as u64
        } else {
            self.draw(&dataset.id, index, "facility")
        };
        &self.facilities[(slot % self.facilities.len() as u64) as usize]
    }

    fn value_for(
        &self,
        dataset: &DatasetDescriptor,
        field: &FieldSpec,
        index: u32,
        facility: &Facility,
    ) -> Value {
        let n = self.draw(&dataset.id, index, &field.id);
        match field.field_type {
            FieldType::Date => {
                let (base, span) = if dataset.date_field.as_deref() == Some(field.id.as_str()) {
                    (NaiveDate::from_ymd_opt(2024, 1, 1), 731)
                } else {
                    (NaiveDate::from_ymd_opt(2000, 1, 1), 9000)
                };
                base.and_then(|b| b.checked_add_days(Days::new(n % span)))
                    .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or(Value::Null)
            }
            FieldType::Time => Value::String(format!("{:02}:{:02}", n % 24, (n / 24) % 60)),
            FieldType::Boolean => Value::Bool(n % 4 != 0),
            FieldType::Number => number_value(&field.id, n),
            FieldType::String => match field.id.as_str() {
                "record_id" => Value::String(format!("{}-{:06}", record_prefix(&dataset.id), index + 1)),
                "patient_id" => Value::String(format!("PAT-{:06}", n % 1_000_000)),
                "name" => Value::String(facility.name.clone()),
                "phone" => Value::String(format!("+234 80{} {:03} {:04}", n % 10, (n / 10) % 1000, (n / 10_000) % 10_000)),
                id if id.ends_with("name") => Value::String(format!(
                    "{} {}",
                    self.pick(FIRST_NAMES, &dataset.id, index, "first"),
                    self.pick(LAST_NAMES, &dataset.id, index, "last")
                )),
                id => Value::String(format!("{}_{}", id, n % 100)),
            },
        }
    }

    fn matches(&self, dataset: &DatasetDescriptor, filters: &FilterDescriptor, record: &Record) -> bool {
        if let (Some(range), Some(date_field)) = (&filters.date_range, &dataset.date_field) {
            let date = record
                .get(date_field)
                .and_then(Value::as_str)
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
            match date {
                Some(date) if range.contains(date) => {}
                _ => return false,
            }
        }

        if let Some(facility_field) = &dataset.facility_field {
            let facility_id = record.get(facility_field).and_then(Value::as_str).unwrap_or("");
            if !filters.facilities.matches(facility_id) {
                return false;
            }
            if !filters.lgas.is_all() {
                let lga = self
                    .facilities
                    .iter()
                    .find(|f| f.id == facility_id)
                    .map(|f| f.lga.as_str())
                    .unwrap_or("");
                if !filters.lgas.matches(lga) {
                    return false;
                }
            }
        }

        filters.filters.iter().all(|(filter_id, selection)| {
            let Some(spec) = dataset.filter(filter_id) else {
                return true;
            };
            let value = record.get(&spec.field).and_then(Value::as_str).unwrap_or("");
            selection.matches(value)
        })
    }

    fn matching<'a>(
        &'a self,
        dataset: &'a DatasetDescriptor,
        filters: &'a FilterDescriptor,
    ) -> impl Iterator<Item = Record> + 'a {
        (0..dataset.volume)
            .map(move |i| self.generate(dataset, i))
            .filter(move |r| self.matches(dataset, filters, r))
    }
}

#[async_trait]
impl RecordSource for SyntheticRecords {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn count(&self, dataset: &DatasetDescriptor, filters: &FilterDescriptor) -> Result<u64> {
        Ok(self.matching(dataset, filters).count() as u64)
    }

    async fn fetch(
        &self,
        dataset: &DatasetDescriptor,
        filters: &FilterDescriptor,
    ) -> Result<Vec<Record>> {
        let records = self
            .matching(dataset, filters)
            .map(|record| project(dataset, filters, record))
            .collect();
        Ok(records)
    }

    fn facilities(&self) -> Vec<Facility> {
        self.facilities.clone()
    }
}

/// Keep the selected fields, blanking confidential ones unless requested.
fn project(dataset: &DatasetDescriptor, filters: &FilterDescriptor, mut record: Record) -> Record {
    let mut out = Map::new();
    for field_id in &filters.fields {
        let value = record.remove(field_id).unwrap_or(Value::Null);
        let hidden = dataset
            .field(field_id)
            .map(|f| f.confidential && !filters.include_confidential)
            .unwrap_or(false);
        out.insert(field_id.clone(), if hidden { Value::Null } else { value });
    }
    out
}

fn number_value(field_id: &str, n: u64) -> Value {
    let (min, max, decimals): (f64, f64, i32) = match field_id {
        "birth_weight_kg" => (1.5, 4.5, 2),
        "mother_age" => (16.0, 45.0, 0),
        "age" => (0.0, 90.0, 0),
        "dose_number" => (1.0, 3.0, 0),
        "visit_number" => (1.0, 8.0, 0),
        "gestational_age_weeks" => (8.0, 40.0, 0),
        _ => (0.0, 100.0, 0),
    };
    let unit = (n % 10_000) as f64 / 9_999.0;
    let scale = 10f64.powi(decimals);
    let value = ((min + unit * (max - min)) * scale).round() / scale;
    if decimals == 0 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn record_prefix(dataset_id: &str) -> String {
    dataset_id
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(3)
        .collect::<String>()
        .to_ascii_uppercase()
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
