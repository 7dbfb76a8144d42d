use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Timestamp, UnknownEnumCode, Value};

/// Per-field outcome reported next to every value in a response row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum FieldStatus {
    #[default]
    Invalid = 0,
    Present = 1,
    NullValue = 2,
    NotFound = 3,
    OutsideMaxAge = 4,
}

impl FieldStatus {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for FieldStatus {
    type Error = UnknownEnumCode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FieldStatus::Invalid),
            1 => Ok(FieldStatus::Present),
            2 => Ok(FieldStatus::NullValue),
            3 => Ok(FieldStatus::NotFound),
            4 => Ok(FieldStatus::OutsideMaxAge),
            _ => Err(UnknownEnumCode {
                name: "FieldStatus",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum FeastServingType {
    #[default]
    Invalid = 0,
    Online = 1,
    Batch = 2,
}

impl FeastServingType {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for FeastServingType {
    type Error = UnknownEnumCode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FeastServingType::Invalid),
            1 => Ok(FeastServingType::Online),
            2 => Ok(FeastServingType::Batch),
            _ => Err(UnknownEnumCode {
                name: "FeastServingType",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFeastServingInfoRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFeastServingInfoResponse {
    pub version: String,
    #[serde(rename = "type")]
    pub serving_type: FeastServingType,
    #[serde(default)]
    pub job_staging_location: String,
}

/// A feature addressed by its feature table and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureReferenceV2 {
    pub feature_table: String,
    pub name: String,
}

impl FeatureReferenceV2 {
    pub fn new(feature_table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            feature_table: feature_table.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FeatureReferenceV2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.feature_table, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid feature reference '{value}': expected feature_table:feature")]
pub struct FeatureRefParseError {
    pub value: String,
}

impl FromStr for FeatureReferenceV2 {
    type Err = FeatureRefParseError;

    /// Parses the `feature_table:feature` string form used by feature lists.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FeatureRefParseError {
            value: s.to_string(),
        };
        let (table, name) = s.split_once(':').ok_or_else(invalid)?;
        if table.is_empty() || name.is_empty() || name.contains(':') {
            return Err(invalid());
        }
        Ok(FeatureReferenceV2::new(table, name))
    }
}

/// One row of entity values plus the point in time the caller is asking about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl EntityRow {
    pub fn new(timestamp: Option<Timestamp>) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetOnlineFeaturesRequestV2 {
    pub features: Vec<FeatureReferenceV2>,
    pub entity_rows: Vec<EntityRow>,
    #[serde(default)]
    pub project: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureList {
    #[serde(default)]
    pub val: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepeatedValue {
    #[serde(default)]
    pub val: Vec<Value>,
}

/// Columnar request shape.
///
/// `feature_service` and `features` form a oneof; exactly one must be set.
/// `project` is optional and overrides the project a feature service lives in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetOnlineFeaturesRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureList>,
    #[serde(default)]
    pub entities: BTreeMap<String, RepeatedValue>,
    #[serde(default)]
    pub full_feature_names: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldValues {
    pub fields: IndexMap<String, Value>,
    pub statuses: IndexMap<String, FieldStatus>,
}

impl FieldValues {
    pub fn insert(&mut self, name: String, value: Value, status: FieldStatus) {
        self.statuses.insert(name.clone(), status);
        self.fields.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<(&Value, FieldStatus)> {
        let value = self.fields.get(name)?;
        let status = self.statuses.get(name).copied().unwrap_or_default();
        Some((value, status))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetOnlineFeaturesResponse {
    pub field_values: Vec<FieldValues>,
}
