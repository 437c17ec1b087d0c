// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::RepselError;
use std::collections::{BTreeMap, HashSet};

/// Measurement scale of an acquisition attribute.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeKind {
    Continuous,
    Categorical,
}

impl AttributeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::Categorical => "categorical",
        }
    }
}

/// One attribute value on a series. `None` marks an absent value.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", content = "value", rename_all = "snake_case")
)]
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Continuous(Option<f64>),
    Categorical(Option<String>),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeKind {
        match self {
            Self::Continuous(_) => AttributeKind::Continuous,
            Self::Categorical(_) => AttributeKind::Categorical,
        }
    }

    pub fn is_present(&self) -> bool {
        match self {
            Self::Continuous(value) => value.is_some(),
            Self::Categorical(value) => value.is_some(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Continuous(value) => *value,
            Self::Categorical(_) => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            Self::Categorical(value) => value.as_deref(),
            Self::Continuous(_) => None,
        }
    }
}

/// Acquisition record for one series. Read-only after construction.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesRecord {
    id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    provenance: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    attributes: BTreeMap<String, AttributeValue>,
}

impl SeriesRecord {
    pub fn new(id: impl Into<String>, provenance: Option<&str>) -> Self {
        Self {
            id: id.into(),
            provenance: provenance.map(str::to_string),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds a continuous attribute. Builder-style; records are not mutated after ingestion.
    pub fn with_continuous(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        self.attributes
            .insert(name.into(), AttributeValue::Continuous(value));
        self
    }

    pub fn with_categorical(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.attributes.insert(
            name.into(),
            AttributeValue::Categorical(value.map(str::to_string)),
        );
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Source tag of the record, typically the hardware vendor.
    pub fn provenance(&self) -> Option<&str> {
        self.provenance.as_deref()
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn continuous(&self, name: &str) -> Option<f64> {
        self.attribute(name).and_then(AttributeValue::as_f64)
    }

    pub fn categorical(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(AttributeValue::as_category)
    }
}

/// Validated ingestion batch with an inferred attribute schema.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordSet {
    records: Vec<SeriesRecord>,
    schema: BTreeMap<String, AttributeKind>,
}

impl RecordSet {
    /// Validates identifiers, values and attribute kinds across the batch.
    pub fn new(records: Vec<SeriesRecord>) -> Result<Self, RepselError> {
        let mut seen = HashSet::with_capacity(records.len());
        let mut schema = BTreeMap::<String, AttributeKind>::new();

        for (idx, record) in records.iter().enumerate() {
            if record.id.trim().is_empty() {
                return Err(RepselError::invalid_input(format!(
                    "record at index {idx} has an empty series identifier"
                )));
            }
            if !seen.insert(record.id.as_str()) {
                return Err(RepselError::invalid_input(format!(
                    "duplicate series identifier '{}'",
                    record.id
                )));
            }

            for (name, value) in &record.attributes {
                if let AttributeValue::Continuous(Some(raw)) = value {
                    if !raw.is_finite() {
                        return Err(RepselError::invalid_input(format!(
                            "series '{}' attribute '{name}' has non-finite value {raw}",
                            record.id
                        )));
                    }
                }

                let kind = value.kind();
                match schema.get(name) {
                    Some(existing) if *existing != kind => {
                        return Err(RepselError::invalid_input(format!(
                            "attribute '{name}' is {} in earlier records but {} in series '{}'",
                            existing.as_str(),
                            kind.as_str(),
                            record.id
                        )));
                    }
                    Some(_) => {}
                    None => {
                        schema.insert(name.clone(), kind);
                    }
                }
            }
        }

        Ok(Self { records, schema })
    }

    pub fn records(&self) -> &[SeriesRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Attribute names and kinds, ordered by name.
    pub fn schema(&self) -> &BTreeMap<String, AttributeKind> {
        &self.schema
    }

    pub fn kind_of(&self, name: &str) -> Option<AttributeKind> {
        self.schema.get(name).copied()
    }

    /// Names of attributes of the given kind, ordered by name.
    pub fn attributes_of_kind(&self, kind: AttributeKind) -> Vec<&str> {
        self.schema
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Column view of a continuous attribute, one slot per record.
    pub fn continuous_column(&self, name: &str) -> Vec<Option<f64>> {
        self.records
            .iter()
            .map(|record| record.continuous(name))
            .collect()
    }

    /// Column view of a categorical attribute, one slot per record.
    pub fn categorical_column(&self, name: &str) -> Vec<Option<&str>> {
        self.records
            .iter()
            .map(|record| record.categorical(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeKind, AttributeValue, RecordSet, SeriesRecord};
    use crate::RepselError;

    fn series(id: &str) -> SeriesRecord {
        SeriesRecord::new(id, Some("SIEMENS"))
    }

    #[test]
    fn record_set_infers_schema_in_name_order() {
        let records = vec![
            series("1")
                .with_continuous("SliceThickness", Some(1.0))
                .with_categorical("Manufacturer", Some("A")),
            series("2").with_continuous("EchoTime", None),
        ];
        let set = RecordSet::new(records).expect("records should validate");

        let names: Vec<&str> = set.schema().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["EchoTime", "Manufacturer", "SliceThickness"]);
        assert_eq!(set.kind_of("Manufacturer"), Some(AttributeKind::Categorical));
        assert_eq!(
            set.attributes_of_kind(AttributeKind::Continuous),
            vec!["EchoTime", "SliceThickness"]
        );
    }

    #[test]
    fn record_set_rejects_duplicate_and_empty_identifiers() {
        let err = RecordSet::new(vec![series("a"), series("a")])
            .expect_err("duplicates must be rejected");
        assert_eq!(
            err,
            RepselError::invalid_input("duplicate series identifier 'a'")
        );

        let err = RecordSet::new(vec![series("  ")]).expect_err("blank id must be rejected");
        assert!(err.to_string().contains("empty series identifier"));
    }

    #[test]
    fn record_set_rejects_kind_conflicts_and_non_finite_values() {
        let err = RecordSet::new(vec![
            series("1").with_continuous("Rows", Some(512.0)),
            series("2").with_categorical("Rows", Some("512")),
        ])
        .expect_err("kind conflict must be rejected");
        assert!(err.to_string().contains("continuous in earlier records"));

        let err = RecordSet::new(vec![series("1").with_continuous("Rows", Some(f64::NAN))])
            .expect_err("NaN must be rejected");
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn columns_have_one_slot_per_record() {
        let set = RecordSet::new(vec![
            series("1").with_continuous("EchoTime", Some(2.5)),
            series("2"),
            series("3").with_categorical("Body", Some("HEAD")),
        ])
        .expect("records should validate");

        assert_eq!(set.continuous_column("EchoTime"), vec![Some(2.5), None, None]);
        assert_eq!(set.categorical_column("Body"), vec![None, None, Some("HEAD")]);
    }

    #[test]
    fn attribute_value_accessors() {
        let value = AttributeValue::Categorical(Some("CT".to_string()));
        assert!(value.is_present());
        assert_eq!(value.as_category(), Some("CT"));
        assert_eq!(value.as_f64(), None);
        assert!(!AttributeValue::Continuous(None).is_present());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn series_record_json_shape() {
        let raw = r#"{
            "id": "1.2.840.1",
            "provenance": "GE",
            "attributes": {
                "SliceThickness": {"kind": "continuous", "value": 1.25},
                "Modality": {"kind": "categorical", "value": "CT"},
                "EchoTime": {"kind": "continuous", "value": null}
            }
        }"#;
        let record: SeriesRecord = serde_json::from_str(raw).expect("record should parse");
        assert_eq!(record.provenance(), Some("GE"));
        assert_eq!(record.continuous("SliceThickness"), Some(1.25));
        assert_eq!(record.categorical("Modality"), Some("CT"));
        assert_eq!(
            record.attribute("EchoTime"),
            Some(&AttributeValue::Continuous(None))
        );
    }
}
