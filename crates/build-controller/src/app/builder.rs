use std::sync::Arc;

use anyhow::Result;

use crate::app::services::ApplicationServices;
use crate::app::services::BuildControllerType;
use crate::app::services::BuildPodControllerType;
use crate::app::Application;
use crate::config::DaemonArgs;
use crate::domain::build::AdmissionReconciler;
use crate::domain::build::BuildController;
use crate::domain::build::BuildDeletionReconciler;
use crate::domain::build::BuildPodController;
use crate::domain::build::ContainerBuildStrategy;
use crate::domain::build::PodLossReconciler;
use crate::domain::build::PodStatusReconciler;
use crate::domain::build::StrategyConfig;
use crate::domain::dispatcher::Dispatcher;
use crate::domain::dispatcher::DispatcherConfig;
use crate::infrastructure::k8s::BuildWatcher;
use crate::infrastructure::k8s::KubeBuildUpdater;
use crate::infrastructure::k8s::KubeEventRecorder;
use crate::infrastructure::k8s::KubeImageStreamResolver;
use crate::infrastructure::k8s::KubePodManager;
use crate::infrastructure::k8s::PodWatcher;
use crate::infrastructure::k8s::StoreBuildIndex;
use crate::infrastructure::kube_client;

/// Application builder
pub struct ApplicationBuilder {
    daemon_args: DaemonArgs,
}

impl ApplicationBuilder {
    pub fn new(daemon_args: DaemonArgs) -> Self {
        Self { daemon_args }
    }

    /// Connects to the cluster and wires the reconcilers to it
    pub async fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        let client = kube_client::init_kube_client(self.daemon_args.kubeconfig.clone())
            .await
            .map_err(|e| anyhow::anyhow!("{e:?}"))?;
        let namespace = self.daemon_args.watch_namespace();

        let (build_watcher, store) = BuildWatcher::new(client.clone(), namespace.clone());
        let pod_watcher = PodWatcher::new(client.clone(), namespace);

        let pods = Arc::new(KubePodManager::new(client.clone()));
        let updater = Arc::new(KubeBuildUpdater::new(client.clone()));
        let index = Arc::new(StoreBuildIndex::new(store));

        let strategy_config = StrategyConfig::from(&self.daemon_args);
        if self.daemon_args.builder_image.is_empty() {
            tracing::warn!("No builder image configured, new builds cannot be admitted");
        }

        let build_controller: BuildControllerType = BuildController::new(
            AdmissionReconciler::new(
                pods.clone(),
                Arc::new(KubeImageStreamResolver::new(client.clone())),
                Arc::new(ContainerBuildStrategy::new(strategy_config)),
                updater.clone(),
                Arc::new(KubeEventRecorder::new(
                    client,
                    &self.daemon_args.controller_name,
                )),
            ),
            BuildDeletionReconciler::new(pods.clone()),
        );

        let pod_controller: BuildPodControllerType = BuildPodController::new(
            PodStatusReconciler::new(index.clone(), updater.clone(), pods),
            PodLossReconciler::new(index.clone(), updater),
        );

        let dispatcher = Dispatcher::new(
            Arc::new(build_controller),
            Arc::new(pod_controller),
            index,
            DispatcherConfig::from(&self.daemon_args),
        );

        let services = ApplicationServices {
            dispatcher: Arc::new(dispatcher),
            build_watcher: Arc::new(build_watcher),
            pod_watcher: Arc::new(pod_watcher),
        };

        Ok(Application::new(services, self.daemon_args))
    }
}
