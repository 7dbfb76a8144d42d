//! Online feature retrieval: resolves feature references, reads the latest
//! values per entity key, applies max-age staleness, and assembles rows with
//! per-field statuses.

pub mod abort;
pub mod assembler;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod query;
pub mod registry;
pub mod resolver;
pub mod staleness;

pub use abort::{AbortController, AbortSignal};
pub use config::{ConfigError, ServingConfig, TableFailurePolicy};
pub use error::{ErrorClass, RequestError, ResolutionError, ServingError};
pub use orchestrator::{FeatureServer, RequestPhase};
pub use query::{FeatureSelector, OnlineQuery};
pub use registry::{
    DynRegistry, EntitySpec, FeatureTableSpec, MemRegistry, ProjectRegistry, Registry,
    RegistryError, RegistrySnapshot,
};
pub use resolver::{ResolvedFeature, ResolvedFeatures, resolve};
