//! Narrow capabilities the reconcilers consume
//!
//! Each reconciler is generic over only the capabilities it uses, so tests
//! can substitute the adapters in [`super::mock`].

use api_types::Build;
use api_types::ImageStream;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;

use super::types::ClientError;
use super::types::StrategyError;

/// Creates, deletes and fetches build pods.
#[async_trait]
pub trait PodManager: Send + Sync {
    /// Fails with [`ClientError::AlreadyExists`] if a pod with the same name exists.
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, ClientError>;

    /// Fails with [`ClientError::NotFound`] if the pod is already gone.
    async fn delete_pod(&self, namespace: &str, pod: &Pod) -> Result<(), ClientError>;

    /// Returns `None` when no pod with that name exists.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ClientError>;
}

/// Fetches image streams named as build outputs.
#[async_trait]
pub trait ImageStreamResolver: Send + Sync {
    async fn get_image_stream(&self, namespace: &str, name: &str)
        -> Result<ImageStream, ClientError>;
}

/// Knows how to create a pod which can execute a build.
pub trait BuildStrategy: Send + Sync {
    /// Receives its own copy of the build, never the one that gets persisted.
    fn create_build_pod(&self, build: Build) -> Result<Pod, StrategyError>;
}

/// Persists build changes.
#[async_trait]
pub trait BuildUpdater: Send + Sync {
    /// Fails with [`ClientError::Conflict`] when the stored build changed since
    /// `build` was read.
    async fn update(&self, namespace: &str, build: &Build) -> Result<(), ClientError>;
}

/// Keyed lookup of builds. A pod shares its key with the build it runs.
pub trait BuildIndex: Send + Sync {
    fn get(&self, namespace: &str, name: &str) -> Result<Option<Build>, ClientError>;
}

/// Records operator-visible events against a build.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Fire-and-forget; failures are the recorder's to log.
    async fn eventf(&self, build: &Build, reason: &str, message: &str);
}
