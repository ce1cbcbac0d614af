use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Clone, Debug)]
pub struct DaemonArgs {
    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "BUILD_NAMESPACE",
        help = "Kubernetes namespace to watch (empty for all namespaces)"
    )]
    pub namespace: Option<String>,

    #[arg(
        long,
        env = "BUILDER_IMAGE",
        default_value = "",
        help = "Image run by build pods, e.g. registry.example.com/builder:latest"
    )]
    pub builder_image: String,

    #[arg(
        long,
        env = "CONTROLLER_NAME",
        default_value = "build-controller",
        help = "Reporting component name of recorded events"
    )]
    pub controller_name: String,

    #[arg(
        long,
        default_value = "5",
        help = "Seconds to wait before redelivering an event that failed"
    )]
    pub retry_delay_secs: u64,

    #[arg(
        long,
        default_value = "5",
        help = "Redeliveries of a failing event before it is dropped"
    )]
    pub max_redeliveries: u32,

    #[arg(
        long,
        default_value = "256",
        help = "Capacity of the channel between the watchers and the dispatcher"
    )]
    pub event_channel_capacity: usize,
}

impl DaemonArgs {
    /// Namespace to watch, `None` meaning every namespace.
    pub fn watch_namespace(&self) -> Option<String> {
        self.namespace.clone().filter(|ns| !ns.is_empty())
    }
}
