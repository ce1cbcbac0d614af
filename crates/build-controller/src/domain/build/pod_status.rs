//! Advances build status from the status of its pod

use std::sync::Arc;

use api_types::Build;
use api_types::BuildEvent;
use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::debug;
use tracing::info;

use super::correlation::correlated_build;
use super::traits::BuildIndex;
use super::traits::BuildUpdater;
use super::traits::PodManager;
use super::types::build_key;
use super::types::build_namespace;
use super::types::ReconcileError;
use super::types::Result;

/// Maps an observed pod to the build event it represents.
///
/// A finished pod means `PodFailed` as soon as one container terminated with
/// a nonzero exit code, whatever the pod phase says. Pods in any other phase
/// carry no event.
pub fn pod_phase_event(pod: &Pod) -> Option<BuildEvent> {
    let status = pod.status.as_ref()?;
    match status.phase.as_deref()? {
        "Running" => Some(BuildEvent::PodRunning),
        "Succeeded" | "Failed" => {
            let failed = status
                .container_statuses
                .iter()
                .flatten()
                .filter_map(|info| info.state.as_ref()?.terminated.as_ref())
                .any(|terminated| terminated.exit_code != 0);
            Some(if failed {
                BuildEvent::PodFailed
            } else {
                BuildEvent::PodSucceeded
            })
        }
        _ => None,
    }
}

/// Watches build pods and keeps the build status in step with them.
pub struct PodStatusReconciler<X, U, P> {
    index: Arc<X>,
    updater: Arc<U>,
    pods: Arc<P>,
}

impl<X, U, P> PodStatusReconciler<X, U, P>
where
    X: BuildIndex,
    U: BuildUpdater,
    P: PodManager,
{
    pub fn new(index: Arc<X>, updater: Arc<U>, pods: Arc<P>) -> Self {
        Self {
            index,
            updater,
            pods,
        }
    }

    /// Handles a pod status change.
    ///
    /// The build is only written when its status actually changes.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::BuildIndex`] if the build cannot be looked up
    /// - [`ReconcileError::BuildUpdate`] if the new status cannot be persisted
    /// - any error of [`Self::cancel_build`] for a build being cancelled
    #[tracing::instrument(skip_all, fields(pod = %pod.name_any()))]
    pub async fn handle_pod(&self, pod: &Pod) -> Result<()> {
        let Some(mut build) = correlated_build(&*self.index, pod)? else {
            return Ok(());
        };

        if build.cancel_requested() {
            info!(build = %build_key(&build), "Cancelling build");
            return self.cancel_build(&build, pod).await;
        }

        let Some(event) = pod_phase_event(pod) else {
            return Ok(());
        };

        let previous = build.phase();
        match build.apply(event, Utc::now()) {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => {
                debug!(build = %build_key(&build), error = %e, "Ignoring pod status");
                return Ok(());
            }
        }

        info!(
            build = %build_key(&build),
            from = %previous,
            to = %build.phase(),
            "Updating build status"
        );
        self.persist(&build).await
    }

    /// Deletes the pod of a cancelled build and marks the build `Cancelled`.
    ///
    /// Builds that already reached a terminal phase are left alone.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::PodDelete`] if the pod cannot be deleted
    /// - [`ReconcileError::BuildUpdate`] if the build cannot be persisted
    pub async fn cancel_build(&self, build: &Build, pod: &Pod) -> Result<()> {
        if !build.phase().is_cancellable() {
            debug!(
                build = %build_key(build),
                phase = %build.phase(),
                "The build can be cancelled only while new, pending or running"
            );
            return Ok(());
        }

        let namespace = build_namespace(build);
        match self.pods.delete_pod(&namespace, pod).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(pod = %pod.name_any(), "Build pod was already gone");
            }
            Err(source) => {
                return Err(ReconcileError::PodDelete {
                    namespace,
                    name: pod.name_any(),
                    source,
                });
            }
        }

        let mut build = build.clone();
        build.apply(BuildEvent::CancelRequested, Utc::now())?;
        self.persist(&build).await?;

        info!(build = %build_key(&build), "Build was cancelled");
        Ok(())
    }

    async fn persist(&self, build: &Build) -> Result<()> {
        self.updater
            .update(&build_namespace(build), build)
            .await
            .map_err(|source| ReconcileError::BuildUpdate {
                build: build_key(build),
                source,
            })
    }
}
