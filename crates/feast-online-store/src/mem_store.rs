use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use feast_types::{EntityKey, Timestamp, Value};

use crate::{OnlineRecord, OnlineStore, StoreError, StoreResult};

type TableKey = (String, String);
/// Rows of one table by entity document id.
type TableRows = HashMap<String, OnlineRecord>;

/// Process-local online store keyed by `(project, table)` and then by
/// [`EntityKey::document_id`].
#[derive(Clone, Default)]
pub struct MemOnlineStore {
    tables: Arc<RwLock<HashMap<TableKey, TableRows>>>,
}

impl std::fmt::Debug for MemOnlineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read().map(|t| t.len()).unwrap_or_default();
        f.debug_struct("MemOnlineStore")
            .field("tables", &tables)
            .finish()
    }
}

impl MemOnlineStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Backend("memory store lock poisoned".into())
    }

    /// Write rows for one table. A row whose event timestamp is older than the
    /// stored record for the same key is skipped. Returns the rows applied.
    pub fn online_write_batch<I>(&self, project: &str, table: &str, rows: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = (EntityKey, BTreeMap<String, Value>, Timestamp)>,
    {
        let mut guard = self.tables.write().map_err(|_| Self::poisoned())?;
        let rows_for_table = guard
            .entry((project.to_string(), table.to_string()))
            .or_default();
        let mut applied = 0;
        for (key, values, event_timestamp) in rows {
            let id = key.document_id();
            if let Some(existing) = rows_for_table.get(&id) {
                if existing.event_timestamp > event_timestamp {
                    continue;
                }
            }
            rows_for_table.insert(
                id,
                OnlineRecord {
                    event_timestamp,
                    values,
                },
            );
            applied += 1;
        }
        tracing::debug!(project, table, applied, "online write batch");
        Ok(applied)
    }

    pub fn record_count(&self, project: &str, table: &str) -> usize {
        self.tables
            .read()
            .ok()
            .and_then(|t| {
                t.get(&(project.to_string(), table.to_string()))
                    .map(HashMap::len)
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl OnlineStore for MemOnlineStore {
    fn kind(&self) -> &str {
        "memory"
    }

    async fn online_read(
        &self,
        project: &str,
        table: &str,
        keys: &[EntityKey],
        features: &[String],
    ) -> StoreResult<Vec<Option<OnlineRecord>>> {
        let guard = self.tables.read().map_err(|_| Self::poisoned())?;
        let Some(rows) = guard.get(&(project.to_string(), table.to_string())) else {
            return Ok(vec![None; keys.len()]);
        };
        let slots = keys
            .iter()
            .map(|key| {
                rows.get(&key.document_id()).map(|record| OnlineRecord {
                    event_timestamp: record.event_timestamp,
                    values: record
                        .values
                        .iter()
                        .filter(|(name, _)| features.is_empty() || features.contains(name))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect(),
                })
            })
            .collect();
        Ok(slots)
    }
}
