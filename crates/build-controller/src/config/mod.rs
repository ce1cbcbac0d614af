use std::time::Duration;

use crate::domain::build::StrategyConfig;
use crate::domain::dispatcher::DispatcherConfig;

pub mod cli;
pub mod daemon;

impl From<&daemon::DaemonArgs> for DispatcherConfig {
    fn from(args: &daemon::DaemonArgs) -> Self {
        Self {
            retry_delay: Duration::from_secs(args.retry_delay_secs),
            max_redeliveries: args.max_redeliveries,
        }
    }
}

impl From<&daemon::DaemonArgs> for StrategyConfig {
    fn from(args: &daemon::DaemonArgs) -> Self {
        Self {
            builder_image: args.builder_image.clone(),
        }
    }
}

pub use cli::*;
pub use daemon::*;
