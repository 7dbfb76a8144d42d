//! Canonical form shared by both request shapes.

use std::collections::BTreeMap;

use feast_types::{
    EntityRow, FeatureReferenceV2, GetOnlineFeaturesRequest, GetOnlineFeaturesRequestV2,
    RepeatedValue,
};

use crate::error::RequestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureSelector {
    /// Every projection of a registered feature service.
    Service(String),
    /// An explicit list of table features.
    List(Vec<FeatureReferenceV2>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnlineQuery {
    /// Explicit project; wins over the default and over a feature service's own project.
    pub project: Option<String>,
    pub selector: FeatureSelector,
    pub rows: Vec<EntityRow>,
    pub full_feature_names: bool,
}

impl OnlineQuery {
    pub fn from_v2(
        request: GetOnlineFeaturesRequestV2,
        full_feature_names: bool,
    ) -> Result<Self, RequestError> {
        if request.features.is_empty() {
            return Err(RequestError::NoFeaturesRequested);
        }
        if request.entity_rows.is_empty() {
            return Err(RequestError::EmptyEntityRows);
        }
        Ok(Self {
            project: non_empty(request.project),
            selector: FeatureSelector::List(request.features),
            rows: request.entity_rows,
            full_feature_names,
        })
    }

    pub fn from_columnar(request: GetOnlineFeaturesRequest) -> Result<Self, RequestError> {
        let service = request.feature_service.filter(|s| !s.is_empty());
        let selector = match (service, request.features) {
            (Some(_), Some(_)) => return Err(RequestError::ConflictingFeatureSelector),
            (None, None) => return Err(RequestError::MissingFeatureSelector),
            (Some(name), None) => FeatureSelector::Service(name),
            (None, Some(list)) => {
                if list.val.is_empty() {
                    return Err(RequestError::NoFeaturesRequested);
                }
                let refs = list
                    .val
                    .iter()
                    .map(|s| s.parse::<FeatureReferenceV2>())
                    .collect::<Result<Vec<_>, _>>()?;
                FeatureSelector::List(refs)
            }
        };

        let rows = transpose_entities(request.entities)?;
        Ok(Self {
            project: non_empty(request.project),
            selector,
            rows,
            full_feature_names: request.full_feature_names,
        })
    }
}

fn non_empty(project: String) -> Option<String> {
    let trimmed = project.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Columns of equal length become rows without timestamps.
fn transpose_entities(
    columns: BTreeMap<String, RepeatedValue>,
) -> Result<Vec<EntityRow>, RequestError> {
    let expected = columns.values().next().map(|c| c.val.len()).unwrap_or(0);
    if expected == 0 {
        return Err(RequestError::EmptyEntityRows);
    }
    for (name, column) in &columns {
        if column.val.len() != expected {
            return Err(RequestError::RaggedEntityColumns {
                column: name.clone(),
                expected,
                found: column.val.len(),
            });
        }
    }

    let mut rows = vec![EntityRow::default(); expected];
    for (name, column) in columns {
        for (row, value) in rows.iter_mut().zip(column.val) {
            row.fields.insert(name.clone(), value);
        }
    }
    Ok(rows)
}
