//! Handling of build pods deleted before their build finished

use std::sync::Arc;

use api_types::BuildEvent;
use api_types::POD_LOST_MESSAGE;
use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::debug;
use tracing::info;

use super::correlation::correlated_build;
use super::traits::BuildIndex;
use super::traits::BuildUpdater;
use super::types::build_key;
use super::types::build_namespace;
use super::types::ReconcileError;
use super::types::Result;

pub struct PodLossReconciler<X, U> {
    index: Arc<X>,
    updater: Arc<U>,
}

impl<X, U> PodLossReconciler<X, U>
where
    X: BuildIndex,
    U: BuildUpdater,
{
    pub fn new(index: Arc<X>, updater: Arc<U>) -> Self {
        Self { index, updater }
    }

    /// Marks the build of a deleted pod as `Error`, unless it already finished.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::BuildIndex`] if the build cannot be looked up
    /// - [`ReconcileError::BuildUpdate`] if the build cannot be persisted
    #[tracing::instrument(skip_all, fields(pod = %pod.name_any()))]
    pub async fn handle_pod_deletion(&self, pod: &Pod) -> Result<()> {
        let Some(mut build) = correlated_build(&*self.index, pod)? else {
            return Ok(());
        };

        if build.phase().is_terminal() {
            debug!(
                build = %build_key(&build),
                phase = %build.phase(),
                "Build already finished, ignoring pod deletion"
            );
            return Ok(());
        }

        build.apply(BuildEvent::PodLost, Utc::now())?;
        build.set_message(POD_LOST_MESSAGE);

        self.updater
            .update(&build_namespace(&build), &build)
            .await
            .map_err(|source| ReconcileError::BuildUpdate {
                build: build_key(&build),
                source,
            })?;

        info!(build = %build_key(&build), "Build pod was lost");
        Ok(())
    }
}
