//! Admission of new builds: output resolution and pod creation

use std::sync::Arc;

use api_types::Build;
use api_types::BuildEvent;
use api_types::BuildPhase;
use chrono::Utc;
use kube::ResourceExt;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::traits::BuildStrategy;
use super::traits::BuildUpdater;
use super::traits::EventRecorder;
use super::traits::ImageStreamResolver;
use super::traits::PodManager;
use super::types::build_key;
use super::types::build_namespace;
use super::types::ReconcileError;
use super::types::Result;

/// Event reason recorded when the build pod cannot be created.
pub const FAILED_CREATE_REASON: &str = "FailedCreate";

/// Outcome of admitting a `New` build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admitted {
    /// The build pod exists.
    PodCreated,
    /// Cancelled before any pod was created.
    Cancelled,
}

/// Turns `New` builds into running pods.
///
/// Only builds in `New` are acted upon, which makes redelivery of the same
/// build, or of a build some other handler already advanced, a no-op.
pub struct AdmissionReconciler<P, I, S, U, R> {
    pods: Arc<P>,
    image_streams: Arc<I>,
    strategy: Arc<S>,
    updater: Arc<U>,
    recorder: Arc<R>,
}

impl<P, I, S, U, R> AdmissionReconciler<P, I, S, U, R>
where
    P: PodManager,
    I: ImageStreamResolver,
    S: BuildStrategy,
    U: BuildUpdater,
    R: EventRecorder,
{
    pub fn new(
        pods: Arc<P>,
        image_streams: Arc<I>,
        strategy: Arc<S>,
        updater: Arc<U>,
        recorder: Arc<R>,
    ) -> Self {
        Self {
            pods,
            image_streams,
            strategy,
            updater,
            recorder,
        }
    }

    /// Admits a build observed in the cluster.
    ///
    /// Once the pod exists, a failure to persist the build is only logged: a
    /// build left observably `New` gets admitted again, and the pod creation
    /// then ends in `AlreadyExists`.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::BuildUpdate`] when a build cancelled before
    ///   admission cannot be persisted
    /// - [`ReconcileError::ImageStreamNotFound`] and
    ///   [`ReconcileError::RegistryNotConfigured`] when the output cannot be resolved
    /// - [`ReconcileError::ImageStreamLookup`] when fetching the image stream fails
    /// - [`ReconcileError::Strategy`] when no pod can be built for the build
    /// - [`ReconcileError::PodCreate`] when the pod cannot be created
    #[tracing::instrument(skip_all, fields(build = %build_key(build)))]
    pub async fn handle_build(&self, build: &Build) -> Result<()> {
        debug!("Handling build");

        if build.phase() != BuildPhase::New {
            return Ok(());
        }

        let mut build = build.clone();
        let admitted = self.next_build_status(&mut build).await?;

        match self.updater.update(&build_namespace(&build), &build).await {
            Ok(()) => Ok(()),
            Err(e) if admitted == Admitted::PodCreated => {
                warn!(error = %e, "Failed to record changes to build");
                Ok(())
            }
            Err(source) => Err(ReconcileError::BuildUpdate {
                build: build_key(&build),
                source,
            }),
        }
    }

    /// Moves `build` to its next status, creating its pod on the way.
    ///
    /// On success `build` holds the status to persist. On failure nothing has
    /// been persisted.
    async fn next_build_status(&self, build: &mut Build) -> Result<Admitted> {
        let now = Utc::now();

        if build.cancel_requested() {
            info!("Cancelling build before its pod was created");
            build.apply(BuildEvent::CancelRequested, now)?;
            return Ok(Admitted::Cancelled);
        }

        let reference = self.resolve_output(build).await?;

        build.apply(BuildEvent::Admitted, now)?;
        build.spec.output.docker_image_reference = reference;

        let pod = self
            .strategy
            .create_build_pod(build.clone())
            .map_err(|source| ReconcileError::Strategy {
                build: build_key(build),
                source,
            })?;

        let namespace = build_namespace(build);
        match self.pods.create_pod(&namespace, &pod).await {
            Ok(created) => {
                info!(pod = %created.name_any(), "Created pod for build");
            }
            Err(e) if e.is_already_exists() => {
                debug!(pod = %pod.name_any(), "Build pod already existed");
            }
            Err(source) => {
                self.recorder
                    .eventf(
                        build,
                        FAILED_CREATE_REASON,
                        &format!("Error creating: {source}"),
                    )
                    .await;
                return Err(ReconcileError::PodCreate {
                    build: build_key(build),
                    source,
                });
            }
        }
        Ok(Admitted::PodCreated)
    }

    /// Resolves the image reference the build pushes to.
    ///
    /// An output naming an image stream resolves to the stream's repository,
    /// suffixed with `:tag` when a tag is set. Otherwise the literal reference
    /// is kept.
    async fn resolve_output(&self, build: &Build) -> Result<String> {
        let output = &build.spec.output;
        let Some(to) = &output.to else {
            return Ok(output.docker_image_reference.clone());
        };

        let namespace = to
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| build_namespace(build));

        let stream = match self.image_streams.get_image_stream(&namespace, &to.name).await {
            Ok(stream) => stream,
            Err(e) if e.is_not_found() => {
                return Err(ReconcileError::ImageStreamNotFound {
                    namespace,
                    name: to.name.clone(),
                });
            }
            Err(source) => {
                return Err(ReconcileError::ImageStreamLookup {
                    namespace,
                    name: to.name.clone(),
                    build: build_key(build),
                    source,
                });
            }
        };

        let Some(repository) = stream.repository() else {
            return Err(ReconcileError::RegistryNotConfigured {
                namespace,
                name: to.name.clone(),
                build: build_key(build),
            });
        };

        Ok(match output.tag.as_deref().filter(|tag| !tag.is_empty()) {
            Some(tag) => format!("{repository}:{tag}"),
            None => repository.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use api_types::ImageStreamRef;
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::domain::build::mock::test_build;
    use crate::domain::build::mock::test_image_stream;
    use crate::domain::build::mock::MockBuildStore;
    use crate::domain::build::mock::MockBuildStrategy;
    use crate::domain::build::mock::MockEventRecorder;
    use crate::domain::build::mock::MockImageStreams;
    use crate::domain::build::mock::MockPodManager;
    use crate::domain::build::ClientError;

    type TestAdmission = AdmissionReconciler<
        MockPodManager,
        MockImageStreams,
        MockBuildStrategy,
        MockBuildStore,
        MockEventRecorder,
    >;

    struct Fixture {
        reconciler: TestAdmission,
        pods: Arc<MockPodManager>,
        streams: Arc<MockImageStreams>,
        strategy: Arc<MockBuildStrategy>,
        store: Arc<MockBuildStore>,
        recorder: Arc<MockEventRecorder>,
    }

    fn fixture() -> Fixture {
        let pods = Arc::new(MockPodManager::new());
        let streams = Arc::new(MockImageStreams::new());
        let strategy = Arc::new(MockBuildStrategy::new());
        let store = Arc::new(MockBuildStore::new());
        let recorder = Arc::new(MockEventRecorder::new());
        let reconciler = AdmissionReconciler::new(
            pods.clone(),
            streams.clone(),
            strategy.clone(),
            store.clone(),
            recorder.clone(),
        );
        Fixture {
            reconciler,
            pods,
            streams,
            strategy,
            store,
            recorder,
        }
    }

    fn stream_output_build(tag: Option<&str>) -> Build {
        let mut build = test_build("ns", "b1", BuildPhase::New);
        build.spec.output.to = Some(ImageStreamRef {
            name: "is1".to_string(),
            namespace: None,
        });
        build.spec.output.tag = tag.map(str::to_string);
        build
    }

    #[test(tokio::test)]
    async fn resolves_image_stream_output_with_tag() {
        let f = fixture();
        f.streams
            .insert(test_image_stream("ns", "is1", "registry:5000/ns/is1"));

        f.reconciler
            .handle_build(&stream_output_build(Some("v1")))
            .await
            .unwrap();

        let received = f.strategy.received();
        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0].spec.output.docker_image_reference,
            "registry:5000/ns/is1:v1"
        );
        assert_eq!(f.streams.lookups(), vec!["ns/is1".to_string()]);

        let persisted = f.store.build("ns", "b1").unwrap();
        assert_eq!(persisted.phase(), BuildPhase::Pending);
        assert_eq!(
            persisted.spec.output.docker_image_reference,
            "registry:5000/ns/is1:v1"
        );
        assert_eq!(f.pods.pod_count(), 1);
    }

    #[test(tokio::test)]
    async fn untagged_output_uses_repository_as_is() {
        let f = fixture();
        f.streams
            .insert(test_image_stream("ns", "is1", "registry:5000/ns/is1"));

        f.reconciler
            .handle_build(&stream_output_build(None))
            .await
            .unwrap();

        assert_eq!(
            f.strategy.received()[0].spec.output.docker_image_reference,
            "registry:5000/ns/is1"
        );
    }

    #[test(tokio::test)]
    async fn image_stream_namespace_overrides_build_namespace() {
        let f = fixture();
        f.streams
            .insert(test_image_stream("shared", "is1", "registry:5000/shared/is1"));
        let mut build = stream_output_build(None);
        build.spec.output.to.as_mut().unwrap().namespace = Some("shared".to_string());

        f.reconciler.handle_build(&build).await.unwrap();

        assert_eq!(f.streams.lookups(), vec!["shared/is1".to_string()]);
    }

    #[test(tokio::test)]
    async fn literal_output_is_kept() {
        let f = fixture();
        let mut build = test_build("ns", "b1", BuildPhase::New);
        build.spec.output.docker_image_reference = "quay.io/org/app:latest".to_string();

        f.reconciler.handle_build(&build).await.unwrap();

        assert!(f.streams.lookups().is_empty());
        assert_eq!(
            f.strategy.received()[0].spec.output.docker_image_reference,
            "quay.io/org/app:latest"
        );
    }

    #[test(tokio::test)]
    async fn cancelled_new_build_creates_no_pod() {
        let f = fixture();
        let mut build = test_build("ns", "b1", BuildPhase::New);
        build.spec.cancelled = true;

        f.reconciler.handle_build(&build).await.unwrap();

        assert!(f.pods.create_attempts().is_empty());
        assert!(f.strategy.received().is_empty());
        let persisted = f.store.build("ns", "b1").unwrap();
        assert_eq!(persisted.phase(), BuildPhase::Cancelled);
        assert!(persisted
            .status
            .as_ref()
            .unwrap()
            .completion_timestamp
            .is_some());
    }

    #[test(tokio::test)]
    async fn cancelled_new_build_persist_failure_is_retryable() {
        let f = fixture();
        f.store.insert(test_build("ns", "b1", BuildPhase::New));
        f.store.fail_update_with(ClientError::Conflict {
            message: "the object has been modified".to_string(),
        });
        let mut build = test_build("ns", "b1", BuildPhase::New);
        build.spec.cancelled = true;

        let err = f.reconciler.handle_build(&build).await.unwrap_err();

        assert!(matches!(err, ReconcileError::BuildUpdate { .. }));
        assert!(err.is_retryable());
        assert_eq!(f.store.build("ns", "b1").unwrap().phase(), BuildPhase::New);

        f.store.clear_failures();
        f.reconciler.handle_build(&build).await.unwrap();
        assert_eq!(
            f.store.build("ns", "b1").unwrap().phase(),
            BuildPhase::Cancelled
        );
        assert!(f.pods.create_attempts().is_empty());
    }

    #[test(tokio::test)]
    async fn builds_past_new_are_ignored() {
        let f = fixture();
        for phase in [
            BuildPhase::Pending,
            BuildPhase::Running,
            BuildPhase::Complete,
            BuildPhase::Cancelled,
        ] {
            let mut build = test_build("ns", "b1", phase);
            build.spec.output.docker_image_reference = "unchanged".to_string();

            f.reconciler.handle_build(&build).await.unwrap();
        }

        assert!(f.store.updates().is_empty());
        assert!(f.pods.create_attempts().is_empty());
        assert!(f.strategy.received().is_empty());
    }

    #[test(tokio::test)]
    async fn redelivery_creates_a_single_pod() {
        let f = fixture();
        let build = test_build("ns", "b1", BuildPhase::New);

        f.reconciler.handle_build(&build).await.unwrap();
        f.reconciler.handle_build(&build).await.unwrap();

        assert_eq!(f.pods.create_attempts().len(), 2);
        assert_eq!(f.pods.pod_count(), 1);
        assert!(f.recorder.events().is_empty());
    }

    #[test(tokio::test)]
    async fn missing_image_stream_is_a_configuration_error() {
        let f = fixture();

        let err = f
            .reconciler
            .handle_build(&stream_output_build(Some("v1")))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::ImageStreamNotFound { .. }));
        assert!(!err.is_retryable());
        assert!(f.strategy.received().is_empty());
        assert!(f.store.updates().is_empty());
    }

    #[test(tokio::test)]
    async fn image_stream_lookup_failure_is_wrapped() {
        let f = fixture();
        f.streams.fail_with(ClientError::Backend {
            message: "connection refused".to_string(),
        });

        let err = f
            .reconciler
            .handle_build(&stream_output_build(None))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::ImageStreamLookup { .. }));
        assert!(err.to_string().contains("connection refused"));
        assert!(err.is_retryable());
    }

    #[test(tokio::test)]
    async fn unresolved_repository_is_a_configuration_error() {
        let f = fixture();
        f.streams.insert(test_image_stream("ns", "is1", ""));

        let err = f
            .reconciler
            .handle_build(&stream_output_build(None))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::RegistryNotConfigured { .. }));
        assert!(!err.is_retryable());
        assert!(f.pods.create_attempts().is_empty());
    }

    #[test(tokio::test)]
    async fn strategy_failure_stops_before_pod_creation() {
        let f = fixture();
        f.strategy.fail_with("unsupported source type");

        let err = f
            .reconciler
            .handle_build(&test_build("ns", "b1", BuildPhase::New))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Strategy { .. }));
        assert!(f.pods.create_attempts().is_empty());
        assert!(f.store.updates().is_empty());
    }

    #[test(tokio::test)]
    async fn pod_creation_failure_records_event_and_persists_nothing() {
        let f = fixture();
        f.pods.fail_create_with(ClientError::Backend {
            message: "exceeded quota".to_string(),
        });

        let err = f
            .reconciler
            .handle_build(&test_build("ns", "b1", BuildPhase::New))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::PodCreate { .. }));
        assert!(err.is_retryable());
        let events = f.recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, FAILED_CREATE_REASON);
        assert!(events[0].message.contains("exceeded quota"));
        assert!(f.store.updates().is_empty());
    }

    #[test(tokio::test)]
    async fn persist_failure_after_pod_creation_is_swallowed() {
        let f = fixture();
        f.store.fail_update_with(ClientError::Conflict {
            message: "the object has been modified".to_string(),
        });

        f.reconciler
            .handle_build(&test_build("ns", "b1", BuildPhase::New))
            .await
            .unwrap();

        assert_eq!(f.pods.pod_count(), 1);
        assert_eq!(f.store.updates().len(), 1);
    }

    #[test(tokio::test)]
    async fn strategy_copy_does_not_alias_the_persisted_build() {
        let f = fixture();
        let build = test_build("ns", "b1", BuildPhase::New);

        f.reconciler.handle_build(&build).await.unwrap();

        let mut handed_out = f.strategy.received().remove(0);
        handed_out.spec.output.docker_image_reference = "tampered".to_string();
        assert_eq!(
            f.store.build("ns", "b1").unwrap().spec.output.docker_image_reference,
            ""
        );
        assert_eq!(build.phase(), BuildPhase::New);
    }
}
