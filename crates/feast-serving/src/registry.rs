//! Feature metadata lookups and an in-memory registry implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use feast_types::{FeatureService, FeatureSpecV2, ValueType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Entity {name} does not exist in project {project}")]
    EntityNotFound { name: String, project: String },
    #[error("Feature table {name} does not exist in project {project}")]
    FeatureTableNotFound { name: String, project: String },
    #[error("Feature service {name} does not exist in project {project}")]
    FeatureServiceNotFound { name: String, project: String },
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpec {
    pub name: String,
    /// Column name used to look the entity up; defaults to `name` when empty.
    #[serde(default)]
    pub join_key: String,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl EntitySpec {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            join_key: String::new(),
            value_type,
            description: String::new(),
        }
    }

    pub fn join_key(&self) -> &str {
        if self.join_key.is_empty() {
            &self.name
        } else {
            &self.join_key
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureTableSpec {
    pub name: String,
    /// Names of the entities this table is keyed by.
    pub entities: Vec<String>,
    pub features: Vec<FeatureSpecV2>,
    /// Zero means values never go stale.
    #[serde(default)]
    pub max_age_secs: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl FeatureTableSpec {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureSpecV2> {
        self.features.iter().find(|f| f.name == name)
    }
}

/// Source of feature metadata.
///
/// Implementations handle their own caching and locking; lookups are called
/// from concurrent requests.
pub trait Registry: Send + Sync {
    fn get_entity(&self, name: &str, project: &str) -> Result<EntitySpec, RegistryError>;
    fn get_feature_table(&self, name: &str, project: &str)
    -> Result<FeatureTableSpec, RegistryError>;
    fn get_feature_service(&self, name: &str, project: &str)
    -> Result<FeatureService, RegistryError>;
}

pub type DynRegistry = Arc<dyn Registry>;

/// Registry contents grouped by project, as loaded from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectRegistry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRegistry {
    #[serde(default)]
    pub entities: Vec<EntitySpec>,
    #[serde(default)]
    pub feature_tables: Vec<FeatureTableSpec>,
    #[serde(default)]
    pub feature_services: Vec<FeatureService>,
}

type Scoped<T> = HashMap<(String, String), T>;

#[derive(Default)]
struct Objects {
    entities: Scoped<EntitySpec>,
    tables: Scoped<FeatureTableSpec>,
    services: Scoped<FeatureService>,
}

#[derive(Clone, Default)]
pub struct MemRegistry {
    objects: Arc<RwLock<Objects>>,
}

impl std::fmt::Debug for MemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("MemRegistry");
        if let Ok(objects) = self.objects.read() {
            s.field("entities", &objects.entities.len())
                .field("feature_tables", &objects.tables.len())
                .field("feature_services", &objects.services.len());
        }
        s.finish()
    }
}

fn scoped(project: &str, name: &str) -> (String, String) {
    (project.to_string(), name.to_string())
}

fn poisoned() -> RegistryError {
    RegistryError::Unavailable("registry lock poisoned".into())
}

impl MemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Result<Self, RegistryError> {
        let registry = Self::new();
        for (project, objects) in snapshot.projects {
            for entity in objects.entities {
                registry.apply_entity(&project, entity)?;
            }
            for table in objects.feature_tables {
                registry.apply_feature_table(&project, table)?;
            }
            for service in objects.feature_services {
                registry.apply_feature_service(&project, service)?;
            }
        }
        Ok(registry)
    }

    pub fn apply_entity(&self, project: &str, entity: EntitySpec) -> Result<(), RegistryError> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects
            .entities
            .insert(scoped(project, &entity.name), entity);
        Ok(())
    }

    pub fn apply_feature_table(
        &self,
        project: &str,
        table: FeatureTableSpec,
    ) -> Result<(), RegistryError> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects.tables.insert(scoped(project, &table.name), table);
        Ok(())
    }

    /// Register a feature service under `project`; an empty `spec.project` is
    /// filled in with it.
    pub fn apply_feature_service(
        &self,
        project: &str,
        mut service: FeatureService,
    ) -> Result<(), RegistryError> {
        if service.spec.project.is_empty() {
            service.spec.project = project.to_string();
        }
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects
            .services
            .insert(scoped(project, &service.spec.name), service);
        Ok(())
    }
}

impl Registry for MemRegistry {
    fn get_entity(&self, name: &str, project: &str) -> Result<EntitySpec, RegistryError> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        objects
            .entities
            .get(&scoped(project, name))
            .cloned()
            .ok_or_else(|| RegistryError::EntityNotFound {
                name: name.to_string(),
                project: project.to_string(),
            })
    }

    fn get_feature_table(
        &self,
        name: &str,
        project: &str,
    ) -> Result<FeatureTableSpec, RegistryError> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        objects
            .tables
            .get(&scoped(project, name))
            .cloned()
            .ok_or_else(|| RegistryError::FeatureTableNotFound {
                name: name.to_string(),
                project: project.to_string(),
            })
    }

    fn get_feature_service(
        &self,
        name: &str,
        project: &str,
    ) -> Result<FeatureService, RegistryError> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        objects
            .services
            .get(&scoped(project, name))
            .cloned()
            .ok_or_else(|| RegistryError::FeatureServiceNotFound {
                name: name.to_string(),
                project: project.to_string(),
            })
    }
}
