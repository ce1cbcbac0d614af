//! Cleanup of build pods once their build is deleted

use std::sync::Arc;

use api_types::Build;
use kube::ResourceExt;
use tracing::debug;
use tracing::info;

use super::correlation::pod_belongs_to;
use super::traits::PodManager;
use super::types::build_key;
use super::types::build_namespace;
use super::types::ReconcileError;
use super::types::Result;

pub struct BuildDeletionReconciler<P> {
    pods: Arc<P>,
}

impl<P: PodManager> BuildDeletionReconciler<P> {
    pub fn new(pods: Arc<P>) -> Self {
        Self { pods }
    }

    /// Deletes the pod of a deleted build.
    ///
    /// A pod with the build's name but without its label is not the build's
    /// and is kept.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::PodLookup`] if the pod cannot be fetched
    /// - [`ReconcileError::PodDelete`] if the pod exists and cannot be deleted
    #[tracing::instrument(skip_all, fields(build = %build_key(build)))]
    pub async fn handle_build_deletion(&self, build: &Build) -> Result<()> {
        let namespace = build_namespace(build);
        let name = build.pod_name();

        let pod = self
            .pods
            .get_pod(&namespace, &name)
            .await
            .map_err(|source| ReconcileError::PodLookup {
                namespace: namespace.clone(),
                name: name.clone(),
                source,
            })?;

        let Some(pod) = pod else {
            debug!("No pod left for deleted build");
            return Ok(());
        };

        if !pod_belongs_to(build, &pod) {
            debug!(pod = %pod.name_any(), "Pod is not labelled for the deleted build");
            return Ok(());
        }

        match self.pods.delete_pod(&namespace, &pod).await {
            Ok(()) => {
                info!(pod = %name, "Deleted pod of deleted build");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(source) => Err(ReconcileError::PodDelete {
                namespace,
                name,
                source,
            }),
        }
    }
}
