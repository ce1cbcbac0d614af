pub mod app;
pub mod config;
pub mod domain;
mod infrastructure;

// Re-export main modules
pub use domain::build;
pub use domain::dispatcher;
pub use infrastructure::k8s;
pub use infrastructure::kube_client;
pub use infrastructure::logging;
