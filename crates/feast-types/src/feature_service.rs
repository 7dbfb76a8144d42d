use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Timestamp, ValueType};

/// Name and declared type of a single feature column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpecV2 {
    pub name: String,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl FeatureSpecV2 {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            labels: BTreeMap::new(),
        }
    }
}

/// Selection of columns from one feature view.
///
/// An empty `feature_columns` selects every feature the view declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureViewProjection {
    pub feature_view_name: String,
    #[serde(default)]
    pub feature_columns: Vec<FeatureSpecV2>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureServiceSpec {
    pub name: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub features: Vec<FeatureViewProjection>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureServiceMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_timestamp: Option<Timestamp>,
}

/// Registry record naming a fixed bundle of feature-view projections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureService {
    pub spec: FeatureServiceSpec,
    #[serde(default)]
    pub meta: FeatureServiceMeta,
}
