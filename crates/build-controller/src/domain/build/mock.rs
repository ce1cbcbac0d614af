//! Test adapters implementing the collaborator traits
//!
//! These in-memory implementations record every call and can be told to fail,
//! which is how the reconciler tests and the lifecycle integration test
//! exercise partial-failure paths.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use api_types::Build;
use api_types::BuildPhase;
use api_types::BuildSpec;
use api_types::BuildStatus;
use api_types::ImageStream;
use api_types::ImageStreamSpec;
use api_types::ImageStreamStatus;
use api_types::BUILD_LABEL;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ContainerState;
use k8s_openapi::api::core::v1::ContainerStateTerminated;
use k8s_openapi::api::core::v1::ContainerStatus;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodStatus;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use super::traits::BuildIndex;
use super::traits::BuildStrategy;
use super::traits::BuildUpdater;
use super::traits::EventRecorder;
use super::traits::ImageStreamResolver;
use super::traits::PodManager;
use super::types::ClientError;
use super::types::StrategyError;

type Key = (String, String);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// A build in `phase`, with no output configured.
pub fn test_build(namespace: &str, name: &str, phase: BuildPhase) -> Build {
    let mut build = Build::new(name, BuildSpec::default());
    build.metadata.namespace = Some(namespace.to_string());
    build.status = Some(BuildStatus {
        phase,
        ..Default::default()
    });
    build
}

/// A build pod labelled for the build of the same name.
///
/// Each entry of `exit_codes` becomes a terminated container status.
pub fn test_pod(namespace: &str, name: &str, phase: &str, exit_codes: &[i32]) -> Pod {
    let container_statuses = exit_codes
        .iter()
        .enumerate()
        .map(|(i, code)| ContainerStatus {
            name: format!("step-{i}"),
            state: Some(ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code: *code,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                BUILD_LABEL.to_string(),
                name.to_string(),
            )])),
            ..Default::default()
        },
        spec: None,
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            container_statuses: Some(container_statuses),
            ..Default::default()
        }),
    }
}

/// An image stream resolving to `repository`; an empty repository means unresolved.
pub fn test_image_stream(namespace: &str, name: &str, repository: &str) -> ImageStream {
    let mut stream = ImageStream::new(name, ImageStreamSpec::default());
    stream.metadata.namespace = Some(namespace.to_string());
    stream.status = Some(ImageStreamStatus {
        docker_image_repository: repository.to_string(),
    });
    stream
}

/// In-memory pod storage with call recording and injectable failures.
#[derive(Default)]
pub struct MockPodManager {
    pods: Mutex<HashMap<Key, Pod>>,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    create_error: Mutex<Option<ClientError>>,
    delete_error: Mutex<Option<ClientError>>,
    get_error: Mutex<Option<ClientError>>,
}

impl MockPodManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pod: Pod) {
        let key = key(&pod.namespace().unwrap_or_default(), &pod.name_any());
        lock(&self.pods).insert(key, pod);
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Pod> {
        lock(&self.pods).get(&key(namespace, name)).cloned()
    }

    pub fn pod_count(&self) -> usize {
        lock(&self.pods).len()
    }

    /// `namespace/name` of every create attempt, including failed ones.
    pub fn create_attempts(&self) -> Vec<String> {
        lock(&self.created).clone()
    }

    /// `namespace/name` of every delete attempt, including failed ones.
    pub fn delete_attempts(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    pub fn fail_create_with(&self, error: ClientError) {
        *lock(&self.create_error) = Some(error);
    }

    pub fn fail_delete_with(&self, error: ClientError) {
        *lock(&self.delete_error) = Some(error);
    }

    pub fn fail_get_with(&self, error: ClientError) {
        *lock(&self.get_error) = Some(error);
    }

    pub fn clear_failures(&self) {
        *lock(&self.create_error) = None;
        *lock(&self.delete_error) = None;
        *lock(&self.get_error) = None;
    }
}

#[async_trait]
impl PodManager for MockPodManager {
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, ClientError> {
        let name = pod.name_any();
        lock(&self.created).push(format!("{namespace}/{name}"));
        if let Some(error) = lock(&self.create_error).clone() {
            return Err(error);
        }

        let mut pods = lock(&self.pods);
        let key = key(namespace, &name);
        if pods.contains_key(&key) {
            return Err(ClientError::AlreadyExists {
                message: format!("pods \"{name}\" already exists"),
            });
        }
        let mut created = pod.clone();
        created.metadata.namespace = Some(namespace.to_string());
        pods.insert(key, created.clone());
        Ok(created)
    }

    async fn delete_pod(&self, namespace: &str, pod: &Pod) -> Result<(), ClientError> {
        let name = pod.name_any();
        lock(&self.deleted).push(format!("{namespace}/{name}"));
        if let Some(error) = lock(&self.delete_error).clone() {
            return Err(error);
        }

        match lock(&self.pods).remove(&key(namespace, &name)) {
            Some(_) => Ok(()),
            None => Err(ClientError::NotFound {
                message: format!("pods \"{name}\" not found"),
            }),
        }
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ClientError> {
        if let Some(error) = lock(&self.get_error).clone() {
            return Err(error);
        }
        Ok(self.get(namespace, name))
    }
}

/// In-memory image streams.
#[derive(Default)]
pub struct MockImageStreams {
    streams: Mutex<HashMap<Key, ImageStream>>,
    lookups: Mutex<Vec<String>>,
    error: Mutex<Option<ClientError>>,
}

impl MockImageStreams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, stream: ImageStream) {
        let key = key(&stream.namespace().unwrap_or_default(), &stream.name_any());
        lock(&self.streams).insert(key, stream);
    }

    pub fn lookups(&self) -> Vec<String> {
        lock(&self.lookups).clone()
    }

    pub fn fail_with(&self, error: ClientError) {
        *lock(&self.error) = Some(error);
    }
}

#[async_trait]
impl ImageStreamResolver for MockImageStreams {
    async fn get_image_stream(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ImageStream, ClientError> {
        lock(&self.lookups).push(format!("{namespace}/{name}"));
        if let Some(error) = lock(&self.error).clone() {
            return Err(error);
        }
        lock(&self.streams)
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                message: format!("imagestreams \"{name}\" not found"),
            })
    }
}

/// Strategy producing a bare pod named after the build.
#[derive(Default)]
pub struct MockBuildStrategy {
    received: Mutex<Vec<Build>>,
    error: Mutex<Option<String>>,
}

impl MockBuildStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every build copy the strategy was handed, in order.
    pub fn received(&self) -> Vec<Build> {
        lock(&self.received).clone()
    }

    pub fn fail_with(&self, message: &str) {
        *lock(&self.error) = Some(message.to_string());
    }
}

impl BuildStrategy for MockBuildStrategy {
    fn create_build_pod(&self, build: Build) -> Result<Pod, StrategyError> {
        let name = build.name_any();
        let namespace = build.namespace().unwrap_or_default();
        lock(&self.received).push(build);
        if let Some(message) = lock(&self.error).clone() {
            return Err(StrategyError::Rejected(message));
        }
        Ok(test_pod(&namespace, &name, "Pending", &[]))
    }
}

/// In-memory build storage serving as both the index and the updater.
///
/// Every stored build carries a resource version, bumped on each write. A
/// write carrying a resource version other than the stored one is rejected
/// with [`ClientError::Conflict`]; a write without one always applies.
#[derive(Default)]
pub struct MockBuildStore {
    builds: Mutex<HashMap<Key, Build>>,
    version: Mutex<u64>,
    updates: Mutex<Vec<Build>>,
    update_error: Mutex<Option<ClientError>>,
    get_error: Mutex<Option<ClientError>>,
}

impl MockBuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `build` as the cluster's current copy, under a new version.
    pub fn insert(&self, mut build: Build) {
        let key = key(&build.namespace().unwrap_or_default(), &build.name_any());
        build.metadata.resource_version = Some(self.next_version());
        lock(&self.builds).insert(key, build);
    }

    fn next_version(&self) -> String {
        let mut version = lock(&self.version);
        *version += 1;
        version.to_string()
    }

    pub fn remove(&self, namespace: &str, name: &str) -> Option<Build> {
        lock(&self.builds).remove(&key(namespace, name))
    }

    pub fn build(&self, namespace: &str, name: &str) -> Option<Build> {
        lock(&self.builds).get(&key(namespace, name)).cloned()
    }

    /// Every build handed to `update`, including rejected writes.
    pub fn updates(&self) -> Vec<Build> {
        lock(&self.updates).clone()
    }

    pub fn fail_update_with(&self, error: ClientError) {
        *lock(&self.update_error) = Some(error);
    }

    pub fn fail_get_with(&self, error: ClientError) {
        *lock(&self.get_error) = Some(error);
    }

    pub fn clear_failures(&self) {
        *lock(&self.update_error) = None;
        *lock(&self.get_error) = None;
    }
}

impl BuildIndex for MockBuildStore {
    fn get(&self, namespace: &str, name: &str) -> Result<Option<Build>, ClientError> {
        if let Some(error) = lock(&self.get_error).clone() {
            return Err(error);
        }
        Ok(self.build(namespace, name))
    }
}

#[async_trait]
impl BuildUpdater for MockBuildStore {
    async fn update(&self, namespace: &str, build: &Build) -> Result<(), ClientError> {
        lock(&self.updates).push(build.clone());
        if let Some(error) = lock(&self.update_error).clone() {
            return Err(error);
        }

        let key = key(namespace, &build.name_any());
        let mut builds = lock(&self.builds);
        if let Some(expected) = build.resource_version() {
            let current = builds.get(&key).and_then(|stored| stored.resource_version());
            if current.as_deref() != Some(expected.as_str()) {
                return Err(ClientError::Conflict {
                    message: format!(
                        "build {}/{} was modified: version {expected} is stale",
                        key.0, key.1
                    ),
                });
            }
        }

        let mut stored = build.clone();
        stored.metadata.resource_version = Some(self.next_version());
        builds.insert(key, stored);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub build: String,
    pub reason: String,
    pub message: String,
}

/// Event recorder keeping events in memory.
#[derive(Default)]
pub struct MockEventRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MockEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl EventRecorder for MockEventRecorder {
    async fn eventf(&self, build: &Build, reason: &str, message: &str) {
        lock(&self.events).push(RecordedEvent {
            build: build.name_any(),
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}
