use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::app::core::Application;
use crate::domain::dispatcher::ControllerEvent;

/// Task manager, responsible for starting and managing all background tasks
pub struct Tasks {
    pub tasks: Vec<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start the watchers and the dispatcher they feed
    pub fn spawn_all_tasks(&mut self, app: &Application) {
        let capacity = app.daemon_args().event_channel_capacity.max(1);
        let (event_sender, event_receiver) = mpsc::channel::<ControllerEvent>(capacity);

        let dispatcher_task = self.spawn_dispatcher_task(app, event_receiver);
        self.tasks.push(dispatcher_task);

        let build_watcher_task = self.spawn_build_watcher_task(app, event_sender.clone());
        self.tasks.push(build_watcher_task);

        let pod_watcher_task = self.spawn_pod_watcher_task(app, event_sender);
        self.tasks.push(pod_watcher_task);
    }

    /// wait for tasks to complete or receive shutdown signal
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        let signal_handler = {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                let mut sigint = signal(SignalKind::interrupt())?;

                tokio::spawn(async move {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating graceful shutdown");
                        }
                        _ = sigint.recv() => {
                            tracing::info!("Received SIGINT, initiating graceful shutdown");
                        }
                    }
                })
            }
            #[cfg(not(unix))]
            {
                tokio::spawn(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl+C: {e}");
                        return;
                    }
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                })
            }
        };

        tokio::select! {
            _ = signal_handler => {
                tracing::info!("Shutdown signal received, cancelling all tasks");
            }
            result = futures::future::select_all(self.tasks.iter_mut()) => {
                let (result, index, remaining) = result;
                drop(remaining);
                // Already completed, must not be awaited again
                self.tasks.remove(index);
                if let Err(e) = result {
                    tracing::error!("Task completed with error: {e}");
                    self.shutdown().await;
                    return Err(e.into());
                }
                tracing::warn!("Task completed unexpectedly, shutting down");
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.cancellation_token.cancel();
        self.wait_for_tasks_with_timeout(Duration::from_secs(30))
            .await;
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for task in &mut self.tasks {
                if let Err(e) = task.await {
                    tracing::error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }

    fn spawn_dispatcher_task(
        &self,
        app: &Application,
        event_receiver: mpsc::Receiver<ControllerEvent>,
    ) -> JoinHandle<()> {
        let dispatcher = app.services().dispatcher.clone();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting event dispatcher task");
            dispatcher.run(event_receiver, token).await;
            tracing::info!("Event dispatcher task completed");
        })
    }

    fn spawn_build_watcher_task(
        &self,
        app: &Application,
        event_sender: mpsc::Sender<ControllerEvent>,
    ) -> JoinHandle<()> {
        let build_watcher = app.services().build_watcher.clone();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting Kubernetes build watcher task");
            if let Err(e) = build_watcher.run(event_sender, token).await {
                tracing::error!("Kubernetes build watcher failed: {e:?}");
            } else {
                tracing::info!("Kubernetes build watcher completed");
            }
        })
    }

    fn spawn_pod_watcher_task(
        &self,
        app: &Application,
        event_sender: mpsc::Sender<ControllerEvent>,
    ) -> JoinHandle<()> {
        let pod_watcher = app.services().pod_watcher.clone();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting Kubernetes pod watcher task");
            if let Err(e) = pod_watcher.run(event_sender, token).await {
                tracing::error!("Kubernetes pod watcher failed: {e:?}");
            } else {
                tracing::info!("Kubernetes pod watcher completed");
            }
        })
    }
}
