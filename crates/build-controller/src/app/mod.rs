//! Wiring and lifetime of the running controller
//!
//! [`ApplicationBuilder`] connects the kube adapters to the reconcilers and
//! the dispatcher; [`Application`] runs the two watchers and the dispatcher
//! until one of them stops or a shutdown signal arrives.

pub mod builder;
pub mod core;
pub mod services;
pub mod tasks;

pub use builder::ApplicationBuilder;
pub use core::Application;
pub use services::ApplicationServices;
