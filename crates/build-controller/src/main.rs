use anyhow::Result;
use api_types::Build;
use api_types::ImageStream;
use build_controller::app::ApplicationBuilder;
use build_controller::config::Cli;
use build_controller::config::Commands;
use build_controller::config::DaemonArgs;
use build_controller::logging;
use clap::Parser;
use kube::CustomResourceExt;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon(daemon_args) => run_daemon(*daemon_args).await,
        Commands::Crd => print_crds(),
    }
}

async fn run_daemon(daemon_args: DaemonArgs) -> Result<()> {
    let _guard = logging::init();

    tracing::info!("Starting build controller {}", &**version::VERSION);

    let app = ApplicationBuilder::new(daemon_args).build().await?;
    app.run().await?;

    Ok(())
}

fn print_crds() -> Result<()> {
    let builds = serde_yaml::to_string(&Build::crd())?;
    let image_streams = serde_yaml::to_string(&ImageStream::crd())?;
    print!("{builds}---\n{image_streams}");
    Ok(())
}
