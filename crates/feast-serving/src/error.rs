use std::time::Duration;

use feast_online_store::StoreError;
use feast_types::{FeatureRefParseError, KeyEncodeError};
use thiserror::Error;

use crate::registry::RegistryError;

/// The request itself is malformed; nothing was looked up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("request has no entity rows")]
    EmptyEntityRows,
    #[error("request names no features")]
    NoFeaturesRequested,
    #[error("request must set one of feature_service or features")]
    MissingFeatureSelector,
    #[error("request sets both feature_service and features")]
    ConflictingFeatureSelector,
    #[error("entity column '{column}' has {found} values, expected {expected}")]
    RaggedEntityColumns {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error(transparent)]
    InvalidFeatureReference(#[from] FeatureRefParseError),
    #[error(transparent)]
    KeyEncoding(#[from] KeyEncodeError),
}

/// Requested names could not be turned into concrete features.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("feature table '{table}' has no feature '{feature}'")]
    FeatureNotFound { table: String, feature: String },
    #[error("feature '{table}:{feature}' is requested more than once")]
    AmbiguousFeatureReference { table: String, feature: String },
    #[error("output field '{field}' is produced by both '{first}' and '{second}'")]
    FeatureNameCollision {
        field: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Error)]
pub enum ServingError {
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),
    #[error("feature resolution failed: {0}")]
    Resolution(#[from] ResolutionError),
    #[error("online store read of table '{table}' failed: {source}")]
    Store {
        table: String,
        #[source]
        source: StoreError,
    },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RegistryError> for ServingError {
    fn from(err: RegistryError) -> Self {
        ServingError::Resolution(ResolutionError::Registry(err))
    }
}

impl From<KeyEncodeError> for ServingError {
    fn from(err: KeyEncodeError) -> Self {
        ServingError::Request(RequestError::KeyEncoding(err))
    }
}

/// Coarse error classes a transport maps onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Request,
    Resolution,
    Store,
    Timeout,
    Cancelled,
    Internal,
}

impl ServingError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ServingError::Request(_) => ErrorClass::Request,
            // A registry that cannot answer is a server-side failure, not a bad name.
            ServingError::Resolution(ResolutionError::Registry(RegistryError::Unavailable(_))) => {
                ErrorClass::Internal
            }
            ServingError::Resolution(_) => ErrorClass::Resolution,
            ServingError::Store { .. } => ErrorClass::Store,
            ServingError::Timeout(_) => ErrorClass::Timeout,
            ServingError::Cancelled => ErrorClass::Cancelled,
            ServingError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Stable machine-readable code for error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ServingError::Request(RequestError::KeyEncoding(KeyEncodeError::MissingJoinKey {
                ..
            })) => "missing_join_key",
            ServingError::Request(RequestError::KeyEncoding(
                KeyEncodeError::UnsupportedValueType { .. },
            )) => "unsupported_value_type",
            ServingError::Request(RequestError::InvalidFeatureReference(_)) => {
                "invalid_feature_reference"
            }
            ServingError::Request(_) => "invalid_request",
            ServingError::Resolution(err) => match err {
                ResolutionError::Registry(RegistryError::EntityNotFound { .. }) => {
                    "entity_not_found"
                }
                ResolutionError::Registry(RegistryError::FeatureTableNotFound { .. }) => {
                    "feature_table_not_found"
                }
                ResolutionError::Registry(RegistryError::FeatureServiceNotFound { .. }) => {
                    "feature_service_not_found"
                }
                ResolutionError::Registry(RegistryError::Unavailable(_)) => "registry_unavailable",
                ResolutionError::FeatureNotFound { .. } => "feature_not_found",
                ResolutionError::AmbiguousFeatureReference { .. } => "ambiguous_feature_reference",
                ResolutionError::FeatureNameCollision { .. } => "feature_name_collision",
            },
            ServingError::Store { source, .. } if source.is_transient() => "store_unavailable",
            ServingError::Store { .. } => "store_error",
            ServingError::Timeout(_) => "timeout",
            ServingError::Cancelled => "cancelled",
            ServingError::Internal(_) => "internal",
        }
    }
}
