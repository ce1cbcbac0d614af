use anyhow::Result;
use tracing::error;
use tracing::info;

use crate::app::services::ApplicationServices;
use crate::app::tasks::Tasks;
use crate::config::DaemonArgs;

/// A controller wired against one cluster and ready to watch builds.
pub struct Application {
    services: ApplicationServices,
    daemon_args: DaemonArgs,
}

impl Application {
    pub fn new(services: ApplicationServices, daemon_args: DaemonArgs) -> Self {
        Self {
            services,
            daemon_args,
        }
    }

    pub fn services(&self) -> &ApplicationServices {
        &self.services
    }

    pub fn daemon_args(&self) -> &DaemonArgs {
        &self.daemon_args
    }

    /// Reconciles builds until a watcher or the dispatcher stops, or the
    /// process is asked to shut down.
    pub async fn run(&self) -> Result<()> {
        let namespace = self.daemon_args.watch_namespace();
        info!(
            namespace = namespace.as_deref().unwrap_or("<all>"),
            builder_image = %self.daemon_args.builder_image,
            "Starting build controller"
        );

        let mut tasks = Tasks::new();
        tasks.spawn_all_tasks(self);

        tasks.wait_for_completion().await.inspect_err(|e| {
            error!("Build controller stopped with error: {e}");
        })?;

        info!("Build controller stopped");
        Ok(())
    }
}
