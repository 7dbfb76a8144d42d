//! Expands requested feature names into concrete, ordered table features.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use feast_types::{FeatureReferenceV2, ValueType};

use crate::error::{ResolutionError, ServingError};
use crate::query::FeatureSelector;
use crate::registry::{FeatureTableSpec, Registry};

/// Separator between table and feature in full output field names.
pub const FULL_NAME_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFeature {
    pub table: String,
    pub feature_name: String,
    /// Name of the output column for this feature.
    pub field_name: String,
    /// Zero means no staleness limit.
    pub max_age: Duration,
    /// Sorted join-key names of the table.
    pub join_keys: Arc<[String]>,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFeatures {
    pub project: String,
    pub features: Vec<ResolvedFeature>,
}

impl ResolvedFeatures {
    /// Distinct table names in first-use order.
    pub fn tables(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.features
            .iter()
            .map(|f| f.table.as_str())
            .filter(|t| seen.insert(*t))
            .collect()
    }
}

pub fn output_field_name(table: &str, feature: &str, full_feature_names: bool) -> String {
    if full_feature_names {
        format!("{table}{FULL_NAME_SEPARATOR}{feature}")
    } else {
        feature.to_string()
    }
}

struct TableMeta {
    spec: FeatureTableSpec,
    join_keys: Arc<[String]>,
}

/// Resolve `selector` against the registry.
///
/// The project is `project_override` when given. Otherwise a feature service
/// resolves its tables in its own project, and a feature list uses
/// `default_project`.
pub fn resolve(
    registry: &dyn Registry,
    selector: &FeatureSelector,
    project_override: Option<&str>,
    default_project: &str,
    full_feature_names: bool,
) -> Result<ResolvedFeatures, ServingError> {
    let lookup_project = project_override.unwrap_or(default_project);
    let mut tables: HashMap<String, TableMeta> = HashMap::new();

    let (project, refs) = match selector {
        FeatureSelector::List(refs) => (lookup_project.to_string(), refs.clone()),
        FeatureSelector::Service(name) => {
            let service = registry.get_feature_service(name, lookup_project)?;
            let project = match project_override {
                Some(project) => project.to_string(),
                None if !service.spec.project.is_empty() => service.spec.project.clone(),
                None => lookup_project.to_string(),
            };
            let mut refs = Vec::new();
            for projection in &service.spec.features {
                if projection.feature_columns.is_empty() {
                    let meta = table_meta(registry, &mut tables, &projection.feature_view_name, &project)?;
                    refs.extend(meta.spec.features.iter().map(|f| {
                        FeatureReferenceV2::new(projection.feature_view_name.clone(), f.name.clone())
                    }));
                } else {
                    refs.extend(projection.feature_columns.iter().map(|f| {
                        FeatureReferenceV2::new(projection.feature_view_name.clone(), f.name.clone())
                    }));
                }
            }
            (project, refs)
        }
    };

    let mut seen: HashSet<&FeatureReferenceV2> = HashSet::new();
    for feature_ref in &refs {
        if !seen.insert(feature_ref) {
            return Err(ResolutionError::AmbiguousFeatureReference {
                table: feature_ref.feature_table.clone(),
                feature: feature_ref.name.clone(),
            }
            .into());
        }
    }

    let mut fields: HashMap<String, &str> = HashMap::new();
    let mut features = Vec::with_capacity(refs.len());
    for feature_ref in &refs {
        let meta = table_meta(registry, &mut tables, &feature_ref.feature_table, &project)?;
        let spec = meta
            .spec
            .feature(&feature_ref.name)
            .ok_or_else(|| ResolutionError::FeatureNotFound {
                table: feature_ref.feature_table.clone(),
                feature: feature_ref.name.clone(),
            })?;
        let field_name =
            output_field_name(&feature_ref.feature_table, &feature_ref.name, full_feature_names);
        if let Some(first) = fields.insert(field_name.clone(), &feature_ref.feature_table) {
            return Err(ResolutionError::FeatureNameCollision {
                field: field_name,
                first: first.to_string(),
                second: feature_ref.feature_table.clone(),
            }
            .into());
        }
        features.push(ResolvedFeature {
            table: feature_ref.feature_table.clone(),
            feature_name: feature_ref.name.clone(),
            field_name,
            max_age: meta.spec.max_age(),
            join_keys: meta.join_keys.clone(),
            value_type: spec.value_type,
        });
    }

    tracing::debug!(
        project = %project,
        features = features.len(),
        tables = tables.len(),
        "resolved feature references"
    );
    Ok(ResolvedFeatures { project, features })
}

fn table_meta<'a>(
    registry: &dyn Registry,
    cache: &'a mut HashMap<String, TableMeta>,
    table: &str,
    project: &str,
) -> Result<&'a TableMeta, ServingError> {
    if !cache.contains_key(table) {
        let spec = registry.get_feature_table(table, project)?;
        let mut join_keys = Vec::with_capacity(spec.entities.len());
        for entity in &spec.entities {
            join_keys.push(registry.get_entity(entity, project)?.join_key().to_string());
        }
        join_keys.sort();
        join_keys.dedup();
        cache.insert(
            table.to_string(),
            TableMeta {
                spec,
                join_keys: join_keys.into(),
            },
        );
    }
    cache
        .get(table)
        .ok_or_else(|| ServingError::Internal(format!("table metadata for '{table}' missing")))
}
