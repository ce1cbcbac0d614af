//! Handler traits consumed by the dispatcher, and their implementations
//! composing the reconcilers per watched resource kind.

use api_types::Build;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;

use super::admission::AdmissionReconciler;
use super::deletion::BuildDeletionReconciler;
use super::pod_loss::PodLossReconciler;
use super::pod_status::PodStatusReconciler;
use super::traits::BuildIndex;
use super::traits::BuildStrategy;
use super::traits::BuildUpdater;
use super::traits::EventRecorder;
use super::traits::ImageStreamResolver;
use super::traits::PodManager;
use super::types::Result;

/// Reacts to build changes.
#[async_trait]
pub trait BuildHandler: Send + Sync {
    async fn build_applied(&self, build: &Build) -> Result<()>;

    async fn build_deleted(&self, build: &Build) -> Result<()>;
}

/// Reacts to build pod changes.
#[async_trait]
pub trait PodHandler: Send + Sync {
    async fn pod_applied(&self, pod: &Pod) -> Result<()>;

    async fn pod_deleted(&self, pod: &Pod) -> Result<()>;
}

/// Build-driven reconcilers: admission and deletion cleanup.
pub struct BuildController<P, I, S, U, R> {
    admission: AdmissionReconciler<P, I, S, U, R>,
    deletion: BuildDeletionReconciler<P>,
}

impl<P, I, S, U, R> BuildController<P, I, S, U, R>
where
    P: PodManager,
    I: ImageStreamResolver,
    S: BuildStrategy,
    U: BuildUpdater,
    R: EventRecorder,
{
    pub fn new(
        admission: AdmissionReconciler<P, I, S, U, R>,
        deletion: BuildDeletionReconciler<P>,
    ) -> Self {
        Self {
            admission,
            deletion,
        }
    }
}

#[async_trait]
impl<P, I, S, U, R> BuildHandler for BuildController<P, I, S, U, R>
where
    P: PodManager,
    I: ImageStreamResolver,
    S: BuildStrategy,
    U: BuildUpdater,
    R: EventRecorder,
{
    async fn build_applied(&self, build: &Build) -> Result<()> {
        self.admission.handle_build(build).await
    }

    async fn build_deleted(&self, build: &Build) -> Result<()> {
        self.deletion.handle_build_deletion(build).await
    }
}

/// Pod-driven reconcilers: status tracking and pod loss.
pub struct BuildPodController<X, U, P> {
    status: PodStatusReconciler<X, U, P>,
    loss: PodLossReconciler<X, U>,
}

impl<X, U, P> BuildPodController<X, U, P>
where
    X: BuildIndex,
    U: BuildUpdater,
    P: PodManager,
{
    pub fn new(status: PodStatusReconciler<X, U, P>, loss: PodLossReconciler<X, U>) -> Self {
        Self { status, loss }
    }
}

#[async_trait]
impl<X, U, P> PodHandler for BuildPodController<X, U, P>
where
    X: BuildIndex,
    U: BuildUpdater,
    P: PodManager,
{
    async fn pod_applied(&self, pod: &Pod) -> Result<()> {
        self.status.handle_pod(pod).await
    }

    async fn pod_deleted(&self, pod: &Pod) -> Result<()> {
        self.loss.handle_pod_deletion(pod).await
    }
}
