//! Startup loading of the registry snapshot and materialized online rows.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use feast_online_store::MemOnlineStore;
use feast_serving::{MemRegistry, Registry, RegistrySnapshot};
use feast_types::{EntityKey, Timestamp, Value, project_entity_key};
use indexmap::IndexMap;
use serde::Deserialize;

/// Materialized rows as written by an offline job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnlineData {
    #[serde(default)]
    pub rows: Vec<OnlineRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OnlineRow {
    /// Falls back to the serving default project.
    #[serde(default)]
    pub project: Option<String>,
    pub table: String,
    /// Join-key values identifying the entity.
    pub entities: BTreeMap<String, Value>,
    pub event_timestamp: Timestamp,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

pub fn load_registry(path: &Path) -> Result<MemRegistry> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read registry {}", path.display()))?;
    let snapshot: RegistrySnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("parse registry {}", path.display()))?;
    let projects = snapshot.projects.len();
    let registry = MemRegistry::from_snapshot(snapshot)?;
    tracing::info!(path = %path.display(), projects, "loaded registry");
    Ok(registry)
}

pub fn load_online_data(
    path: &Path,
    registry: &dyn Registry,
    store: &MemOnlineStore,
    default_project: &str,
) -> Result<usize> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read online data {}", path.display()))?;
    let data: OnlineData = serde_json::from_str(&raw)
        .with_context(|| format!("parse online data {}", path.display()))?;
    let written = write_online_data(data, registry, store, default_project)?;
    tracing::info!(path = %path.display(), rows = written, "loaded online data");
    Ok(written)
}

type Batch = Vec<(EntityKey, BTreeMap<String, Value>, Timestamp)>;

/// Encode each row's entity key with its table's join keys and write the
/// rows table by table. Returns the number of rows applied.
pub fn write_online_data(
    data: OnlineData,
    registry: &dyn Registry,
    store: &MemOnlineStore,
    default_project: &str,
) -> Result<usize> {
    let mut join_keys: IndexMap<(String, String), Vec<String>> = IndexMap::new();
    let mut batches: IndexMap<(String, String), Batch> = IndexMap::new();

    for (index, row) in data.rows.into_iter().enumerate() {
        let project = row.project.unwrap_or_else(|| default_project.to_string());
        let scope = (project, row.table);
        if !join_keys.contains_key(&scope) {
            let keys = table_join_keys(registry, &scope.1, &scope.0)?;
            join_keys.insert(scope.clone(), keys);
        }
        let keys = &join_keys[&scope];
        let key = project_entity_key(keys, &row.entities)
            .with_context(|| format!("row {index} of table {}", scope.1))?;
        batches
            .entry(scope)
            .or_default()
            .push((key, row.values, row.event_timestamp));
    }

    let mut written = 0;
    for ((project, table), rows) in batches {
        let applied = store.online_write_batch(&project, &table, rows)?;
        tracing::debug!(
            %project,
            %table,
            applied,
            stored = store.record_count(&project, &table),
            "wrote online rows"
        );
        written += applied;
    }
    Ok(written)
}

fn table_join_keys(registry: &dyn Registry, table: &str, project: &str) -> Result<Vec<String>> {
    let spec = registry.get_feature_table(table, project)?;
    let mut keys = spec
        .entities
        .iter()
        .map(|entity| Ok(registry.get_entity(entity, project)?.join_key().to_string()))
        .collect::<Result<Vec<_>>>()?;
    keys.sort();
    keys.dedup();
    Ok(keys)
}
