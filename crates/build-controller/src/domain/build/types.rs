//! Error types shared by the build reconcilers and their collaborators

use api_types::Build;
use api_types::TransitionError;
use kube::ResourceExt;
use thiserror::Error;

/// Failure reported by a cluster API collaborator.
///
/// `NotFound`, `AlreadyExists` and `Conflict` are distinguishable because the
/// reconcilers treat them differently from an opaque backend failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("already exists: {message}")]
    AlreadyExists { message: String },

    /// Optimistic concurrency check rejected a stale write
    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("{message}")]
    Backend { message: String },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Failure to turn a build into an executable pod.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("no builder image is configured")]
    MissingBuilderImage,

    #[error("unable to encode build: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0}")]
    Rejected(String),
}

/// Result type for reconciler operations
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Unified error type for the build reconcilers
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("the referenced output image stream {namespace}/{name} does not exist")]
    ImageStreamNotFound { namespace: String, name: String },

    #[error("the referenced output image stream {namespace}/{name} could not be found by build {build}: {source}")]
    ImageStreamLookup {
        namespace: String,
        name: String,
        build: String,
        source: ClientError,
    },

    #[error("the image stream {namespace}/{name} cannot be used as the output for build {build} because the integrated registry is not configured, or no valid external registry is set")]
    RegistryNotConfigured {
        namespace: String,
        name: String,
        build: String,
    },

    #[error("the strategy failed to create a build pod for {build}: {source}")]
    Strategy { build: String, source: StrategyError },

    #[error("failed to create pod for build {build}: {source}")]
    PodCreate { build: String, source: ClientError },

    #[error("failed to get pod {namespace}/{name}: {source}")]
    PodLookup {
        namespace: String,
        name: String,
        source: ClientError,
    },

    #[error("failed to delete pod {namespace}/{name}: {source}")]
    PodDelete {
        namespace: String,
        name: String,
        source: ClientError,
    },

    #[error("failed to update build {build}: {source}")]
    BuildUpdate { build: String, source: ClientError },

    #[error("error getting build for pod {namespace}/{name}: {source}")]
    BuildIndex {
        namespace: String,
        name: String,
        source: ClientError,
    },

    #[error("illegal status transition: {0}")]
    Transition(#[from] TransitionError),
}

impl ReconcileError {
    /// Whether redelivering the same event later may succeed.
    ///
    /// Configuration errors need an operator to fix the build or the image
    /// stream; the resulting change is delivered as a fresh event anyway.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ImageStreamNotFound { .. }
            | Self::RegistryNotConfigured { .. }
            | Self::Transition(_) => false,
            Self::Strategy { source, .. } => !matches!(source, StrategyError::MissingBuilderImage),
            _ => true,
        }
    }
}

/// `namespace/name` of a build, used in messages and log fields.
pub fn build_key(build: &Build) -> String {
    format!("{}/{}", build_namespace(build), build.name_any())
}

/// Namespace of a build, empty for a cluster-scoped object.
pub fn build_namespace(build: &Build) -> String {
    build.namespace().unwrap_or_default()
}
