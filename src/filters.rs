//! Filter and field selection for one export session.
//!
//! [`ExportFilterState`] is the mutable per-session state; [`FilterDescriptor`]
//! is the immutable snapshot sent to the service for estimates and exports.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::DatasetDescriptor;
use crate::error::{ExportError, Result};

/// Value a multi-select uses to mean "every member".
pub const ALL_SENTINEL: &str = "all";

/// A multi-select filter value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl Selection {
    /// Interpret a raw multi-select list, in the order the values were chosen.
    ///
    /// Equivalent to selecting each value in turn starting from `All`: "all"
    /// clears the members chosen before it. An empty list means all.
    pub fn from_values<S: AsRef<str>>(values: &[S]) -> Self {
        values.iter().fold(Selection::All, |mut selection, value| {
            selection.select(value.as_ref());
            selection
        })
    }

    /// Add a member; selecting the sentinel resets to `All`.
    pub fn select(&mut self, value: &str) {
        if value == ALL_SENTINEL {
            *self = Selection::All;
            return;
        }
        match self {
            Selection::All => *self = Selection::Only(BTreeSet::from([value.to_string()])),
            Selection::Only(members) => {
                members.insert(value.to_string());
            }
        }
    }

    /// Remove a member; removing the last one falls back to `All`.
    pub fn deselect(&mut self, value: &str) {
        if let Selection::Only(members) = self {
            members.remove(value);
            if members.is_empty() {
                *self = Selection::All;
            }
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(members) => members.contains(value),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(ExportError::InvalidDateRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Snapshot of the filters and field selection scoping an export or estimate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub facilities: Selection,
    #[serde(default)]
    pub lgas: Selection,
    /// Dataset-specific filters keyed by filter id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, Selection>,
    #[serde(default)]
    pub include_confidential: bool,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl FilterDescriptor {
    /// Check the descriptor against the dataset schema.
    pub fn validate(&self, dataset: &DatasetDescriptor) -> Result<()> {
        if let Some(range) = &self.date_range {
            range.validate()?;
        }

        for field in &self.fields {
            if dataset.field(field).is_none() {
                return Err(ExportError::UnknownField {
                    dataset: dataset.id.clone(),
                    field: field.clone(),
                });
            }
        }
        for required in dataset.required_fields() {
            if !self.fields.iter().any(|f| *f == required.id) {
                return Err(ExportError::MissingRequiredField(required.id.clone()));
            }
        }

        for (filter_id, selection) in &self.filters {
            let spec = dataset
                .filter(filter_id)
                .ok_or_else(|| ExportError::UnknownFilter {
                    dataset: dataset.id.clone(),
                    filter: filter_id.clone(),
                })?;
            if let Selection::Only(members) = selection {
                if let Some(unknown) = members.iter().find(|m| !spec.has_option(m)) {
                    return Err(ExportError::UnknownFilterOption {
                        filter: filter_id.clone(),
                        option: unknown.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Mutable filter state of one wizard session, bound to a dataset.
#[derive(Debug, Clone)]
pub struct ExportFilterState {
    dataset: DatasetDescriptor,
    date_range: Option<DateRange>,
    facilities: Selection,
    lgas: Selection,
    filters: BTreeMap<String, Selection>,
    include_confidential: bool,
    selected_fields: BTreeSet<String>,
}

impl ExportFilterState {
    /// Start a session with exactly the required fields selected.
    pub fn for_dataset(dataset: &DatasetDescriptor) -> Self {
        Self {
            dataset: dataset.clone(),
            date_range: None,
            facilities: Selection::All,
            lgas: Selection::All,
            filters: BTreeMap::new(),
            include_confidential: false,
            selected_fields: dataset.required_fields().map(|f| f.id.clone()).collect(),
        }
    }

    pub fn dataset(&self) -> &DatasetDescriptor {
        &self.dataset
    }

    /// Flip a field in or out of the selection.
    ///
    /// Returns `Ok(false)` without changing anything when the field is required.
    pub fn toggle_field(&mut self, field_id: &str) -> Result<bool> {
        let field = self
            .dataset
            .field(field_id)
            .ok_or_else(|| ExportError::UnknownField {
                dataset: self.dataset.id.clone(),
                field: field_id.to_string(),
            })?;

        if field.required {
            return Ok(false);
        }

        if !self.selected_fields.remove(field_id) {
            self.selected_fields.insert(field_id.to_string());
        }
        Ok(true)
    }

    pub fn select_all_fields(&mut self) {
        self.selected_fields = self.dataset.fields.iter().map(|f| f.id.clone()).collect();
    }

    /// Back to required fields only.
    pub fn clear_optional_fields(&mut self) {
        self.selected_fields = self
            .dataset
            .required_fields()
            .map(|f| f.id.clone())
            .collect();
    }

    /// Selected field ids in catalog order.
    pub fn selected_fields(&self) -> Vec<String> {
        self.dataset
            .fields
            .iter()
            .filter(|f| self.selected_fields.contains(&f.id))
            .map(|f| f.id.clone())
            .collect()
    }

    pub fn is_selected(&self, field_id: &str) -> bool {
        self.selected_fields.contains(field_id)
    }

    pub fn set_date_range(&mut self, range: Option<DateRange>) -> Result<()> {
        if let Some(range) = &range {
            range.validate()?;
        }
        self.date_range = range;
        Ok(())
    }

    pub fn date_range(&self) -> Option<DateRange> {
        self.date_range
    }

    pub fn set_facilities<S: AsRef<str>>(&mut self, values: &[S]) {
        self.facilities = Selection::from_values(values);
    }

    pub fn facilities(&self) -> &Selection {
        &self.facilities
    }

    pub fn set_lgas<S: AsRef<str>>(&mut self, values: &[S]) {
        self.lgas = Selection::from_values(values);
    }

    pub fn lgas(&self) -> &Selection {
        &self.lgas
    }

    /// Replace a dataset-specific filter. Unknown filters or options are rejected.
    pub fn set_filter<S: AsRef<str>>(&mut self, filter_id: &str, values: &[S]) -> Result<()> {
        let spec = self
            .dataset
            .filter(filter_id)
            .ok_or_else(|| ExportError::UnknownFilter {
                dataset: self.dataset.id.clone(),
                filter: filter_id.to_string(),
            })?;

        let selection = Selection::from_values(values);
        if let Selection::Only(members) = &selection {
            if let Some(unknown) = members.iter().find(|m| !spec.has_option(m)) {
                return Err(ExportError::UnknownFilterOption {
                    filter: filter_id.to_string(),
                    option: unknown.clone(),
                });
            }
        }

        if selection.is_all() {
            self.filters.remove(filter_id);
        } else {
            self.filters.insert(filter_id.to_string(), selection);
        }
        Ok(())
    }

    pub fn filter(&self, filter_id: &str) -> Selection {
        self.filters.get(filter_id).cloned().unwrap_or_default()
    }

    pub fn set_include_confidential(&mut self, include: bool) {
        self.include_confidential = include;
    }

    pub fn include_confidential(&self) -> bool {
        self.include_confidential
    }

    pub fn descriptor(&self) -> FilterDescriptor {
        FilterDescriptor {
            date_range: self.date_range,
            facilities: self.facilities.clone(),
            lgas: self.lgas.clone(),
            filters: self.filters.clone(),
            include_confidential: self.include_confidential,
            fields: self.selected_fields(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn births() -> DatasetDescriptor {
        Catalog::builtin().dataset("birth_records").unwrap().clone()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_initial_selection_is_required_fields() {
        for dataset in Catalog::builtin().list_datasets() {
            let state = ExportFilterState::for_dataset(&dataset);
            let required: Vec<String> = dataset.required_fields().map(|f| f.id.clone()).collect();
            assert_eq!(state.selected_fields(), required, "{}", dataset.id);
        }
    }

    #[test]
    fn test_required_field_toggle_is_noop() {
        let mut state = ExportFilterState::for_dataset(&births());
        let before = state.selected_fields();
        assert!(!state.toggle_field("record_id").unwrap());
        assert_eq!(state.selected_fields(), before);
    }

    #[test]
    fn test_required_fields_cannot_be_removed() {
        for dataset in Catalog::builtin().list_datasets() {
            let mut state = ExportFilterState::for_dataset(&dataset);
            for field in &dataset.fields {
                state.toggle_field(&field.id).unwrap();
                state.toggle_field(&field.id).unwrap();
                state.toggle_field(&field.id).unwrap();
            }
            for required in dataset.required_fields() {
                assert!(state.is_selected(&required.id));
            }
        }
    }

    #[test]
    fn test_optional_field_toggle() {
        let mut state = ExportFilterState::for_dataset(&births());
        assert!(state.toggle_field("birth_weight_kg").unwrap());
        assert!(state.is_selected("birth_weight_kg"));
        assert!(state.toggle_field("birth_weight_kg").unwrap());
        assert!(!state.is_selected("birth_weight_kg"));
        assert!(state.toggle_field("favourite_colour").is_err());
    }

    #[test]
    fn test_selected_fields_follow_catalog_order() {
        let mut state = ExportFilterState::for_dataset(&births());
        state.toggle_field("registered").unwrap();
        state.toggle_field("birth_time").unwrap();
        assert_eq!(
            state.selected_fields(),
            vec!["record_id", "birth_date", "facility_id", "birth_time", "registered"]
        );
        state.clear_optional_fields();
        assert_eq!(state.selected_fields().len(), 3);
        state.select_all_fields();
        assert_eq!(state.selected_fields().len(), births().fields.len());
    }

    #[test]
    fn test_member_after_all_narrows() {
        let mut state = ExportFilterState::for_dataset(&births());
        state.set_facilities(&["all", "fac_001"]);
        assert_eq!(
            state.facilities(),
            &Selection::Only(BTreeSet::from(["fac_001".to_string()]))
        );
    }

    #[test]
    fn test_all_after_member_clears() {
        let mut state = ExportFilterState::for_dataset(&births());
        state.set_facilities(&["fac_001", "all"]);
        assert_eq!(state.facilities(), &Selection::All);
        let empty: [&str; 0] = [];
        state.set_lgas(&empty);
        assert!(state.lgas().is_all());
    }

    #[test]
    fn test_selection_select_deselect() {
        let mut selection = Selection::All;
        selection.select("ikeja");
        selection.select("epe");
        assert!(selection.matches("epe"));
        assert!(!selection.matches("badagry"));
        selection.deselect("ikeja");
        selection.deselect("epe");
        assert!(selection.is_all());
        selection.select("epe");
        selection.select(ALL_SENTINEL);
        assert_eq!(selection, Selection::All);
    }

    #[test]
    fn test_all_in_the_middle_clears_earlier_members() {
        let values = ["fac_001", "all", "fac_002"];
        let expected = Selection::Only(BTreeSet::from(["fac_002".to_string()]));
        assert_eq!(Selection::from_values(&values), expected);

        let mut sequential = Selection::All;
        for value in values {
            sequential.select(value);
        }
        assert_eq!(sequential, expected);

        let mut state = ExportFilterState::for_dataset(&births());
        state.set_facilities(&values);
        assert_eq!(state.facilities(), &expected);
    }

    #[test]
    fn test_set_filter_validates_options() {
        let mut state = ExportFilterState::for_dataset(&births());
        state.set_filter("gender", &["female"]).unwrap();
        assert!(state.filter("gender").matches("female"));
        assert!(!state.filter("gender").matches("male"));

        assert!(matches!(
            state.set_filter("gender", &["unknown"]),
            Err(ExportError::UnknownFilterOption { .. })
        ));
        assert!(matches!(
            state.set_filter("vaccine", &["bcg"]),
            Err(ExportError::UnknownFilter { .. })
        ));

        state.set_filter("gender", &["all"]).unwrap();
        assert!(state.descriptor().filters.is_empty());
    }

    #[test]
    fn test_date_range_validation() {
        assert!(DateRange::new(date(2025, 3, 31), date(2025, 1, 1)).is_err());
        let range = DateRange::new(date(2025, 1, 1), date(2025, 3, 31)).unwrap();
        assert!(range.contains(date(2025, 3, 31)));
        assert!(!range.contains(date(2025, 4, 1)));

        let mut state = ExportFilterState::for_dataset(&births());
        state.set_date_range(Some(range)).unwrap();
        assert_eq!(state.date_range(), Some(range));
    }

    #[test]
    fn test_descriptor_validation() {
        let dataset = births();
        let state = ExportFilterState::for_dataset(&dataset);
        assert!(state.descriptor().validate(&dataset).is_ok());

        let mut missing = state.descriptor();
        missing.fields.retain(|f| f != "record_id");
        assert!(matches!(
            missing.validate(&dataset),
            Err(ExportError::MissingRequiredField(_))
        ));

        let mut bad_range = state.descriptor();
        bad_range.date_range = Some(DateRange {
            start: date(2025, 2, 1),
            end: date(2025, 1, 1),
        });
        assert!(bad_range.validate(&dataset).is_err());
    }

    #[test]
    fn test_selection_wire_format() {
        let all = serde_json::to_value(Selection::All).unwrap();
        assert_eq!(all, serde_json::json!("all"));
        let only = serde_json::to_value(Selection::from_values(&["b", "a"])).unwrap();
        assert_eq!(only, serde_json::json!({"only": ["a", "b"]}));
    }
}
