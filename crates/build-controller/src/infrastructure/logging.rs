//! provides logging helpers

use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use utils::logging::LOG_PATH_ENV_VAR;

/// initiate the global tracing subscriber
///
/// Keep the returned guard alive for as long as logs should be flushed to file.
pub fn init() -> Option<WorkerGuard> {
    let log_path = env::var(LOG_PATH_ENV_VAR).ok();
    let (fmt_layer, guard) = utils::logging::get_fmt_layer(log_path);

    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    registry().with(fmt_layer.with_filter(env_filter)).init();
    guard
}
