//! Request pipeline: resolve, group, fetch, evaluate, assemble.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use feast_online_store::{DynOnlineStore, OnlineRecord, StoreError};
use feast_types::{
    EntityKey, EntityRow, FeastServingType, FieldStatus, GetFeastServingInfoResponse,
    GetOnlineFeaturesRequest, GetOnlineFeaturesRequestV2, GetOnlineFeaturesResponse, Timestamp,
    Value, project_entity_key,
};
use indexmap::IndexMap;
use tokio::task::JoinSet;

use crate::abort::AbortSignal;
use crate::assembler::{FeatureColumn, assemble};
use crate::config::{ServingConfig, TableFailurePolicy};
use crate::error::{ResolutionError, ServingError};
use crate::query::OnlineQuery;
use crate::registry::DynRegistry;
use crate::resolver::{ResolvedFeatures, resolve};
use crate::staleness;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    ResolvingReferences,
    GroupingKeys,
    FetchingBatches,
    Evaluating,
    Assembling,
    Done,
    Failed,
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestPhase::Received => "received",
            RequestPhase::ResolvingReferences => "resolving_references",
            RequestPhase::GroupingKeys => "grouping_keys",
            RequestPhase::FetchingBatches => "fetching_batches",
            RequestPhase::Evaluating => "evaluating",
            RequestPhase::Assembling => "assembling",
            RequestPhase::Done => "done",
            RequestPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Distinct keys of one table and, for every row, the slot of its key.
struct TableGroup {
    table: String,
    features: Vec<String>,
    keys: Vec<EntityKey>,
    row_slots: Vec<usize>,
}

/// Records of one table by key slot; `None` when the read failed and the
/// table was degraded.
type Fetched = HashMap<String, Option<Vec<Option<OnlineRecord>>>>;

/// Online feature retrieval over a registry and an online store.
#[derive(Clone)]
pub struct FeatureServer {
    registry: DynRegistry,
    store: DynOnlineStore,
    config: ServingConfig,
}

impl fmt::Debug for FeatureServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureServer")
            .field("store", &self.store.kind())
            .field("config", &self.config)
            .finish()
    }
}

impl FeatureServer {
    pub fn new(registry: DynRegistry, store: DynOnlineStore, config: ServingConfig) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    pub fn config(&self) -> &ServingConfig {
        &self.config
    }

    pub fn get_feast_serving_info(&self) -> GetFeastServingInfoResponse {
        GetFeastServingInfoResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            serving_type: FeastServingType::Online,
            job_staging_location: String::new(),
        }
    }

    pub async fn get_online_features_v2(
        &self,
        request: GetOnlineFeaturesRequestV2,
    ) -> Result<GetOnlineFeaturesResponse, ServingError> {
        self.get_online_features_v2_with_abort(request, AbortSignal::never())
            .await
    }

    pub async fn get_online_features_v2_with_abort(
        &self,
        request: GetOnlineFeaturesRequestV2,
        abort: AbortSignal,
    ) -> Result<GetOnlineFeaturesResponse, ServingError> {
        let query = OnlineQuery::from_v2(request, self.config.full_feature_names)?;
        self.retrieve(query, abort).await
    }

    pub async fn get_online_features(
        &self,
        request: GetOnlineFeaturesRequest,
    ) -> Result<GetOnlineFeaturesResponse, ServingError> {
        self.get_online_features_with_abort(request, AbortSignal::never())
            .await
    }

    pub async fn get_online_features_with_abort(
        &self,
        request: GetOnlineFeaturesRequest,
        abort: AbortSignal,
    ) -> Result<GetOnlineFeaturesResponse, ServingError> {
        let query = OnlineQuery::from_columnar(request)?;
        self.retrieve(query, abort).await
    }

    /// Run a normalized query to completion, or fail it as a whole.
    pub async fn retrieve(
        &self,
        query: OnlineQuery,
        abort: AbortSignal,
    ) -> Result<GetOnlineFeaturesResponse, ServingError> {
        let received_at = Timestamp::now();
        trace_phase(RequestPhase::Received, query.rows.len());
        let result = self.run(query, received_at, &abort).await;
        match &result {
            Ok(response) => trace_phase(RequestPhase::Done, response.field_values.len()),
            Err(err) => {
                tracing::debug!(
                    phase = %RequestPhase::Failed,
                    code = err.code(),
                    error = %err,
                    "online retrieval failed"
                );
            }
        }
        result
    }

    async fn run(
        &self,
        query: OnlineQuery,
        received_at: Timestamp,
        abort: &AbortSignal,
    ) -> Result<GetOnlineFeaturesResponse, ServingError> {
        if abort.is_aborted() {
            return Err(ServingError::Cancelled);
        }

        trace_phase(RequestPhase::ResolvingReferences, query.rows.len());
        let resolved = resolve(
            self.registry.as_ref(),
            &query.selector,
            query.project.as_deref(),
            &self.config.default_project,
            query.full_feature_names,
        )?;
        let entity_fields = entity_fields(&query.rows, &resolved)?;

        trace_phase(RequestPhase::GroupingKeys, query.rows.len());
        let groups = group_keys(&query.rows, &resolved)?;

        trace_phase(RequestPhase::FetchingBatches, groups.len());
        let fetched = self.fetch(&resolved.project, &groups, abort).await?;

        trace_phase(RequestPhase::Evaluating, resolved.features.len());
        let request_ts: Vec<Timestamp> = query
            .rows
            .iter()
            .map(|row| row.timestamp.unwrap_or(received_at))
            .collect();
        let mut columns = Vec::with_capacity(resolved.features.len());
        for feature in &resolved.features {
            let group = groups
                .get(&feature.table)
                .ok_or_else(|| ServingError::Internal(format!("no key group for '{}'", feature.table)))?;
            let records = fetched
                .get(&feature.table)
                .ok_or_else(|| ServingError::Internal(format!("no fetch result for '{}'", feature.table)))?;
            let cells = match records {
                Some(records) => group
                    .row_slots
                    .iter()
                    .zip(&request_ts)
                    .map(|(slot, ts)| {
                        staleness::evaluate(
                            *ts,
                            records[*slot].as_ref(),
                            &feature.feature_name,
                            feature.max_age,
                        )
                    })
                    .collect(),
                None => vec![(Value::NULL, FieldStatus::NotFound); query.rows.len()],
            };
            columns.push(FeatureColumn::new(feature, cells));
        }

        trace_phase(RequestPhase::Assembling, query.rows.len());
        Ok(assemble(&query.rows, &entity_fields, columns))
    }

    /// Read every table group concurrently, bounded by the request timeout
    /// and raced against `abort`.
    async fn fetch(
        &self,
        project: &str,
        groups: &IndexMap<String, TableGroup>,
        abort: &AbortSignal,
    ) -> Result<Fetched, ServingError> {
        let mut set = JoinSet::new();
        for group in groups.values() {
            let store = Arc::clone(&self.store);
            let project = project.to_string();
            let table = group.table.clone();
            let keys = group.keys.clone();
            let features = group.features.clone();
            set.spawn(async move {
                let result = store.online_read(&project, &table, &keys, &features).await;
                (table, keys.len(), result)
            });
        }

        let policy = self.config.table_failure_policy;
        let collect = async move {
            let mut fetched = Fetched::with_capacity(groups.len());
            while let Some(joined) = set.join_next().await {
                let (table, expected, result) = joined
                    .map_err(|err| ServingError::Internal(format!("fetch task failed: {err}")))?;
                let result = result.and_then(|records| {
                    if records.len() == expected {
                        Ok(records)
                    } else {
                        Err(StoreError::Backend(format!(
                            "returned {} records for {expected} keys",
                            records.len()
                        )))
                    }
                });
                match result {
                    Ok(records) => {
                        tracing::debug!(table = %table, keys = expected, "table fetched");
                        fetched.insert(table, Some(records));
                    }
                    Err(source) => match policy {
                        TableFailurePolicy::FailFast => {
                            return Err(ServingError::Store { table, source });
                        }
                        TableFailurePolicy::Degrade => {
                            tracing::warn!(table = %table, error = %source, "table read failed; reporting NOT_FOUND");
                            fetched.insert(table, None);
                        }
                    },
                }
            }
            Ok(fetched)
        };

        let bounded = async {
            match self.config.request_timeout {
                Some(limit) => tokio::time::timeout(limit, collect)
                    .await
                    .map_err(|_| ServingError::Timeout(limit))?,
                None => collect.await,
            }
        };

        // Returning drops the set, which aborts any fetch still in flight.
        tokio::select! {
            biased;
            _ = abort.aborted() => Err(ServingError::Cancelled),
            result = bounded => result,
        }
    }
}

fn trace_phase(phase: RequestPhase, items: usize) {
    tracing::debug!(phase = %phase, items, "online retrieval");
}

/// Sorted union of the entity fields across rows, checked against the
/// output feature names.
fn entity_fields(
    rows: &[EntityRow],
    resolved: &ResolvedFeatures,
) -> Result<Vec<String>, ServingError> {
    let names: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.fields.keys().map(String::as_str))
        .collect();
    for feature in &resolved.features {
        if names.contains(feature.field_name.as_str()) {
            return Err(ResolutionError::FeatureNameCollision {
                field: feature.field_name.clone(),
                first: "entity rows".into(),
                second: feature.table.clone(),
            }
            .into());
        }
    }
    Ok(names.into_iter().map(str::to_string).collect())
}

fn group_keys(
    rows: &[EntityRow],
    resolved: &ResolvedFeatures,
) -> Result<IndexMap<String, TableGroup>, ServingError> {
    let mut groups: IndexMap<String, TableGroup> = IndexMap::new();
    for table in resolved.tables() {
        let mut members = resolved.features.iter().filter(|f| f.table == table);
        let Some(first) = members.next() else {
            continue;
        };
        let mut features = vec![first.feature_name.clone()];
        features.extend(members.map(|f| f.feature_name.clone()));

        let mut slots: HashMap<EntityKey, usize> = HashMap::new();
        let mut keys = Vec::new();
        let mut row_slots = Vec::with_capacity(rows.len());
        for row in rows {
            let key = project_entity_key(&first.join_keys, &row.fields)?;
            let slot = *slots.entry(key).or_insert_with_key(|key| {
                keys.push(key.clone());
                keys.len() - 1
            });
            row_slots.push(slot);
        }
        tracing::debug!(
            table,
            rows = rows.len(),
            keys = keys.len(),
            "grouped entity keys"
        );
        groups.insert(
            table.to_string(),
            TableGroup {
                table: table.to_string(),
                features,
                keys,
                row_slots,
            },
        );
    }
    Ok(groups)
}
