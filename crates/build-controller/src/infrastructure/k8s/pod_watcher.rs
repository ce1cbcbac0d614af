use std::time::Duration;

use api_types::BUILD_LABEL;
use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher;
use kube::runtime::watcher::Config;
use kube::runtime::WatchStreamExt;
use kube::Api;
use kube::Client;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::dispatcher::ControllerEvent;
use crate::infrastructure::k8s::types::KubernetesError;

/// Watches pods carrying the build label.
///
/// Added and modified pods become [`ControllerEvent::PodApplied`], removed
/// pods [`ControllerEvent::PodDeleted`].
pub struct PodWatcher {
    client: Client,
    namespace: Option<String>,
}

impl PodWatcher {
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    /// Watches until `cancellation_token` fires, restarting failed streams.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::DispatcherClosed`] if the event receiver is gone
    #[tracing::instrument(skip_all, fields(namespace = ?self.namespace))]
    pub async fn run(
        &self,
        sender: mpsc::Sender<ControllerEvent>,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<KubernetesError>> {
        info!("Starting pod watcher");
        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Pod watcher shutdown requested");
                    break;
                }
                result = self.watch_pods(&sender) => {
                    match result {
                        Ok(()) => {
                            warn!("Pod watch stream ended unexpectedly, restarting...");
                        }
                        Err(e) if matches!(e.current_context(), KubernetesError::DispatcherClosed { .. }) => {
                            return Err(e);
                        }
                        Err(e) => {
                            error!("Pod watch failed: {e:?}");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn watch_pods(
        &self,
        sender: &mpsc::Sender<ControllerEvent>,
    ) -> Result<(), Report<KubernetesError>> {
        let api: Api<Pod> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let config = Config::default().labels(BUILD_LABEL);
        let mut stream = watcher(api, config).default_backoff().boxed();

        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| {
                Report::new(KubernetesError::WatchFailed {
                    resource: "pods".to_string(),
                    message: format!("Watch stream error: {e}"),
                })
            })?;

            for update in pod_events(event) {
                sender.send(update).await.map_err(|_| {
                    Report::new(KubernetesError::DispatcherClosed {
                        resource: "pod".to_string(),
                    })
                })?;
            }
        }

        Ok(())
    }
}

/// Translates a watch event. A relist replays every listed pod as applied.
fn pod_events(event: watcher::Event<Pod>) -> Vec<ControllerEvent> {
    match event {
        watcher::Event::Applied(pod) => vec![ControllerEvent::PodApplied(pod)],
        watcher::Event::Deleted(pod) => vec![ControllerEvent::PodDeleted(pod)],
        watcher::Event::Restarted(pods) => {
            pods.into_iter().map(ControllerEvent::PodApplied).collect()
        }
    }
}
