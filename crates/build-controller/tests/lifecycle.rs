use std::sync::Arc;
use std::time::Duration;

use api_types::Build;
use api_types::BuildPhase;
use api_types::ImageStreamRef;
use api_types::POD_LOST_MESSAGE;
use build_controller::build::mock::test_build;
use build_controller::build::mock::test_image_stream;
use build_controller::build::mock::test_pod;
use build_controller::build::mock::MockBuildStore;
use build_controller::build::mock::MockEventRecorder;
use build_controller::build::mock::MockImageStreams;
use build_controller::build::mock::MockPodManager;
use build_controller::build::AdmissionReconciler;
use build_controller::build::BuildController;
use build_controller::build::BuildDeletionReconciler;
use build_controller::build::BuildPodController;
use build_controller::build::ContainerBuildStrategy;
use build_controller::build::PodLossReconciler;
use build_controller::build::PodStatusReconciler;
use build_controller::build::StrategyConfig;
use build_controller::dispatcher::ControllerEvent;
use build_controller::dispatcher::Dispatcher;
use build_controller::dispatcher::DispatcherConfig;
use k8s_openapi::api::core::v1::Pod;
use similar_asserts::assert_eq;
use test_log::test;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type TestDispatcher = Dispatcher<
    BuildController<
        MockPodManager,
        MockImageStreams,
        ContainerBuildStrategy,
        MockBuildStore,
        MockEventRecorder,
    >,
    BuildPodController<MockBuildStore, MockBuildStore, MockPodManager>,
    MockBuildStore,
>;

struct Cluster {
    dispatcher: TestDispatcher,
    builds: Arc<MockBuildStore>,
    pods: Arc<MockPodManager>,
}

impl Cluster {
    fn new() -> Self {
        let builds = Arc::new(MockBuildStore::new());
        let pods = Arc::new(MockPodManager::new());
        let image_streams = Arc::new(MockImageStreams::new());
        image_streams.insert(test_image_stream("ns", "is1", "registry:5000/ns/is1"));

        let strategy = ContainerBuildStrategy::new(StrategyConfig {
            builder_image: "builder:latest".to_string(),
        });

        let build_controller = BuildController::new(
            AdmissionReconciler::new(
                pods.clone(),
                image_streams,
                Arc::new(strategy),
                builds.clone(),
                Arc::new(MockEventRecorder::new()),
            ),
            BuildDeletionReconciler::new(pods.clone()),
        );
        let pod_controller = BuildPodController::new(
            PodStatusReconciler::new(builds.clone(), builds.clone(), pods.clone()),
            PodLossReconciler::new(builds.clone(), builds.clone()),
        );
        let dispatcher = Dispatcher::new(
            Arc::new(build_controller),
            Arc::new(pod_controller),
            builds.clone(),
            DispatcherConfig {
                retry_delay: Duration::from_millis(1),
                max_redeliveries: 3,
            },
        );

        Self {
            dispatcher,
            builds,
            pods,
        }
    }

    fn create_build(&self, name: &str) -> Build {
        let mut build = test_build("ns", name, BuildPhase::New);
        build.spec.output.to = Some(ImageStreamRef {
            name: "is1".to_string(),
            namespace: None,
        });
        build.spec.output.tag = Some("v1".to_string());
        self.builds.insert(build.clone());
        build
    }

    fn build(&self, name: &str) -> Build {
        self.builds.build("ns", name).unwrap()
    }

    /// The pod as the admission created it, moved to `phase`.
    fn pod_in_phase(&self, name: &str, phase: &str, exit_codes: &[i32]) -> Pod {
        let mut pod = self.pods.get("ns", name).unwrap();
        pod.status = test_pod("ns", name, phase, exit_codes).status;
        pod
    }

    async fn send(&self, events: Vec<ControllerEvent>) {
        let (sender, receiver) = mpsc::channel(events.len().max(1));
        for event in events {
            sender.send(event).await.unwrap();
        }
        drop(sender);
        self.dispatcher.run(receiver, CancellationToken::new()).await;
    }
}

#[test(tokio::test)]
async fn build_runs_to_completion_and_is_cleaned_up() {
    let cluster = Cluster::new();
    let build = cluster.create_build("b1");

    cluster.send(vec![ControllerEvent::BuildApplied(build)]).await;

    let admitted = cluster.build("b1");
    assert_eq!(admitted.phase(), BuildPhase::Pending);
    assert_eq!(
        admitted.spec.output.docker_image_reference,
        "registry:5000/ns/is1:v1"
    );
    assert_eq!(cluster.pods.pod_count(), 1);

    let running = cluster.pod_in_phase("b1", "Running", &[]);
    cluster.send(vec![ControllerEvent::PodApplied(running)]).await;
    assert_eq!(cluster.build("b1").phase(), BuildPhase::Running);

    let succeeded = cluster.pod_in_phase("b1", "Succeeded", &[0]);
    cluster
        .send(vec![ControllerEvent::PodApplied(succeeded)])
        .await;

    let finished = cluster.build("b1");
    let status = finished.status.clone().unwrap();
    assert_eq!(status.phase, BuildPhase::Complete);
    assert!(status.start_timestamp.is_some());
    assert!(status.completion_timestamp.is_some());

    cluster.builds.remove("ns", "b1");
    cluster.send(vec![ControllerEvent::BuildDeleted(finished)]).await;
    assert_eq!(cluster.pods.pod_count(), 0);
}

#[test(tokio::test)]
async fn cancelled_build_stops_its_pod() {
    let cluster = Cluster::new();
    let build = cluster.create_build("b1");
    cluster.send(vec![ControllerEvent::BuildApplied(build)]).await;

    let mut cancelled = cluster.build("b1");
    cancelled.spec.cancelled = true;
    cluster.builds.insert(cancelled);

    let running = cluster.pod_in_phase("b1", "Running", &[]);
    cluster.send(vec![ControllerEvent::PodApplied(running)]).await;

    assert_eq!(cluster.build("b1").phase(), BuildPhase::Cancelled);
    assert_eq!(cluster.pods.pod_count(), 0);
}

#[test(tokio::test)]
async fn lost_pod_errors_build_once() {
    let cluster = Cluster::new();
    let build = cluster.create_build("b1");
    cluster.send(vec![ControllerEvent::BuildApplied(build)]).await;

    let pod = cluster.pod_in_phase("b1", "Running", &[]);
    cluster
        .send(vec![
            ControllerEvent::PodApplied(pod.clone()),
            ControllerEvent::PodDeleted(pod.clone()),
        ])
        .await;

    let lost = cluster.build("b1");
    assert_eq!(lost.phase(), BuildPhase::Error);
    assert_eq!(
        lost.status.as_ref().unwrap().message.as_deref(),
        Some(POD_LOST_MESSAGE)
    );

    // A late success report cannot revive the build.
    let late = cluster.pod_in_phase("b1", "Succeeded", &[0]);
    cluster.send(vec![ControllerEvent::PodApplied(late)]).await;
    assert_eq!(cluster.build("b1").phase(), BuildPhase::Error);
}

#[test(tokio::test)]
async fn pod_creation_is_retried_until_it_succeeds() {
    let cluster = Cluster::new();
    let build = cluster.create_build("b1");
    cluster
        .pods
        .fail_create_with(build_controller::build::ClientError::Backend {
            message: "exceeded quota".to_string(),
        });

    let (sender, receiver) = mpsc::channel(1);
    sender
        .send(ControllerEvent::BuildApplied(build))
        .await
        .unwrap();
    drop(sender);

    let pods = cluster.pods.clone();
    let heal = tokio::spawn(async move {
        while pods.create_attempts().is_empty() {
            tokio::task::yield_now().await;
        }
        pods.clear_failures();
    });

    cluster
        .dispatcher
        .run(receiver, CancellationToken::new())
        .await;
    heal.await.unwrap();

    assert_eq!(cluster.build("b1").phase(), BuildPhase::Pending);
    assert_eq!(cluster.pods.pod_count(), 1);
}

#[test(tokio::test)]
async fn build_deleted_before_admission_gets_no_pod() {
    let cluster = Cluster::new();
    let build = cluster.create_build("b1");
    cluster.builds.remove("ns", "b1");

    cluster
        .send(vec![
            ControllerEvent::BuildApplied(build.clone()),
            ControllerEvent::BuildDeleted(build),
        ])
        .await;

    assert!(cluster.pods.create_attempts().is_empty());
    assert_eq!(cluster.pods.pod_count(), 0);
}
