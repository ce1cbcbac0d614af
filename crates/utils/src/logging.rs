//! provides logging helpers

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

/// Directory receiving rolling log files instead of stderr when set.
pub const LOG_PATH_ENV_VAR: &str = "LOG_PATH";

const LOG_FILE_PREFIX: &str = "build-controller.log";

pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Builds the formatting layer shared by all binaries.
///
/// Logs go to daily rolling files under `log_path` when it is given and
/// usable, otherwise to stderr. The returned guard must be held for as long
/// as file logging should keep flushing.
pub fn get_fmt_layer(log_path: Option<String>) -> (BoxedLayer, Option<WorkerGuard>) {
    let Some(log_path) = log_path.filter(|p| !p.is_empty()) else {
        return (stderr_layer(), None);
    };

    match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(7)
        .build(Path::new(&log_path))
    {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (layer, Some(guard))
        }
        Err(err) => {
            eprintln!("failed to create rolling log file under {log_path}: {err}; logging to stderr");
            (stderr_layer(), None)
        }
    }
}

fn stderr_layer() -> BoxedLayer {
    layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .boxed()
}
