use std::sync::Mutex;
use std::sync::PoisonError;

use api_types::Build;
use error_stack::Report;
use futures::StreamExt;
use kube::runtime::reflector;
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::Store;
use kube::runtime::watcher;
use kube::runtime::watcher::Config;
use kube::runtime::WatchStreamExt;
use kube::Api;
use kube::Client;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::domain::dispatcher::ControllerEvent;
use crate::infrastructure::k8s::types::KubernetesError;

/// Watches builds, keeping the reflector cache behind the build index current.
///
/// The watch stream backs off and resumes on errors by itself; it only ends
/// on cancellation or when the dispatcher goes away.
pub struct BuildWatcher {
    client: Client,
    namespace: Option<String>,
    writer: Mutex<Option<Writer<Build>>>,
}

impl BuildWatcher {
    /// Returns the watcher together with the cache it feeds.
    pub fn new(client: Client, namespace: Option<String>) -> (Self, Store<Build>) {
        let (store, writer) = reflector::store();
        let watcher = Self {
            client,
            namespace,
            writer: Mutex::new(Some(writer)),
        };
        (watcher, store)
    }

    /// Watches builds until `cancellation_token` fires.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::AlreadyRunning`] if called a second time
    /// - [`KubernetesError::DispatcherClosed`] if the event receiver is gone
    #[tracing::instrument(skip_all, fields(namespace = ?self.namespace))]
    pub async fn run(
        &self,
        sender: mpsc::Sender<ControllerEvent>,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<KubernetesError>> {
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| {
                Report::new(KubernetesError::AlreadyRunning {
                    resource: "build".to_string(),
                })
            })?;

        info!("Starting build watcher");
        let api: Api<Build> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let mut stream = reflector::reflector(writer, watcher(api, Config::default()))
            .default_backoff()
            .boxed();

        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Build watcher shutdown requested");
                    return Ok(());
                }
                event = stream.next() => {
                    match event {
                        Some(Ok(event)) => {
                            for update in build_events(event) {
                                sender.send(update).await.map_err(|_| {
                                    Report::new(KubernetesError::DispatcherClosed {
                                        resource: "build".to_string(),
                                    })
                                })?;
                            }
                        }
                        Some(Err(e)) => warn!("Build watch error, backing off: {e}"),
                        None => {
                            return Err(Report::new(KubernetesError::WatchFailed {
                                resource: "builds".to_string(),
                                message: "watch stream ended".to_string(),
                            }));
                        }
                    }
                }
            }
        }
    }
}

/// Translates a watch event. A relist replays every listed build as applied.
fn build_events(event: watcher::Event<Build>) -> Vec<ControllerEvent> {
    match event {
        watcher::Event::Applied(build) => vec![ControllerEvent::BuildApplied(build)],
        watcher::Event::Deleted(build) => vec![ControllerEvent::BuildDeleted(build)],
        watcher::Event::Restarted(builds) => builds
            .into_iter()
            .map(ControllerEvent::BuildApplied)
            .collect(),
    }
}
