//! Kubernetes integration module.
//!
//! The main components are:
//! - [`BuildWatcher`] and [`PodWatcher`]: turn watch events into
//!   [`ControllerEvent`](crate::domain::dispatcher::ControllerEvent)s
//! - [`KubePodManager`], [`KubeImageStreamResolver`], [`KubeBuildUpdater`],
//!   [`StoreBuildIndex`] and [`KubeEventRecorder`]: the reconciler
//!   collaborators backed by the API server

pub mod build_client;
pub mod build_watcher;
pub mod events;
pub mod image_stream;
pub mod pod_manager;
pub mod pod_watcher;
pub mod types;

pub use build_client::KubeBuildUpdater;
pub use build_client::StoreBuildIndex;
pub use build_watcher::BuildWatcher;
pub use events::KubeEventRecorder;
pub use image_stream::KubeImageStreamResolver;
pub use pod_manager::KubePodManager;
pub use pod_watcher::PodWatcher;
pub use types::KubernetesError;
