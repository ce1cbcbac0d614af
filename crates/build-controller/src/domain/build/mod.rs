//! Build lifecycle reconcilers.
//!
//! Four reconcilers drive a build's status from the pod that executes it:
//!
//! - [`AdmissionReconciler`]: resolves the output of a `New` build and creates its pod
//! - [`PodStatusReconciler`]: follows pod phases and handles cancellation
//! - [`PodLossReconciler`]: errors a build whose pod vanished early
//! - [`BuildDeletionReconciler`]: removes the pod of a deleted build
//!
//! They share no state. Collaborators are reached through the traits in
//! [`traits`]; [`mock`] provides in-memory implementations for tests.

pub mod admission;
pub mod controller;
pub mod correlation;
pub mod deletion;
pub mod mock;
pub mod pod_loss;
pub mod pod_status;
pub mod strategy;
pub mod traits;
pub mod types;

pub use admission::AdmissionReconciler;
pub use controller::BuildController;
pub use controller::BuildHandler;
pub use controller::BuildPodController;
pub use controller::PodHandler;
pub use deletion::BuildDeletionReconciler;
pub use pod_loss::PodLossReconciler;
pub use pod_status::PodStatusReconciler;
pub use strategy::ContainerBuildStrategy;
pub use strategy::StrategyConfig;
pub use traits::BuildIndex;
pub use traits::BuildStrategy;
pub use traits::BuildUpdater;
pub use traits::EventRecorder;
pub use traits::ImageStreamResolver;
pub use traits::PodManager;
pub use types::ClientError;
pub use types::ReconcileError;
pub use types::StrategyError;
