use std::sync::Arc;

use crate::domain::build::BuildController;
use crate::domain::build::BuildPodController;
use crate::domain::build::ContainerBuildStrategy;
use crate::domain::dispatcher::Dispatcher;
use crate::infrastructure::k8s::BuildWatcher;
use crate::infrastructure::k8s::KubeBuildUpdater;
use crate::infrastructure::k8s::KubeEventRecorder;
use crate::infrastructure::k8s::KubeImageStreamResolver;
use crate::infrastructure::k8s::KubePodManager;
use crate::infrastructure::k8s::PodWatcher;
use crate::infrastructure::k8s::StoreBuildIndex;

/// Build-driven handler wired to the cluster
pub type BuildControllerType = BuildController<
    KubePodManager,
    KubeImageStreamResolver,
    ContainerBuildStrategy,
    KubeBuildUpdater,
    KubeEventRecorder,
>;

/// Pod-driven handler wired to the cluster
pub type BuildPodControllerType =
    BuildPodController<StoreBuildIndex, KubeBuildUpdater, KubePodManager>;

pub type DispatcherType = Dispatcher<BuildControllerType, BuildPodControllerType, StoreBuildIndex>;

/// Application dependencies - simple struct with Arc-wrapped services
pub struct ApplicationServices {
    pub dispatcher: Arc<DispatcherType>,
    pub build_watcher: Arc<BuildWatcher>,
    pub pod_watcher: Arc<PodWatcher>,
}
