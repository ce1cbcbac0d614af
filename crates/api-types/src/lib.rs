//! Shared API type definitions
//!
//! This crate contains the resource types shared between the build controller
//! components: the `Build` and `ImageStream` custom resources, the build
//! lifecycle phase with its transition table, and the conventions that
//! correlate a build with the pod that executes it.

mod phase;

use chrono::DateTime;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

pub use phase::BuildEvent;
pub use phase::BuildPhase;
pub use phase::TransitionError;

/// Label carried by a build pod. Its value is the name of the owning build.
pub const BUILD_LABEL: &str = "build";

/// Message recorded on a build whose pod disappeared before it finished.
pub const POD_LOST_MESSAGE: &str = "The Pod for this Build was deleted before the Build completed.";

/// Reference to an image stream used as a build output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamRef {
    /// Image stream name
    pub name: String,
    /// Image stream namespace, defaults to the build namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Where the built image is pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
    /// Image stream to resolve the push location from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ImageStreamRef>,
    /// Tag appended to the resolved image stream repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Literal image reference, overwritten once `to` is resolved
    #[serde(default)]
    pub docker_image_reference: String,
}

/// A unit of work producing an image, executed by exactly one pod.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "build.dev",
    version = "v1",
    kind = "Build",
    plural = "builds",
    namespaced,
    status = "BuildStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    /// Output destination of the build
    #[serde(default)]
    pub output: BuildOutput,
    /// Set when a user asked for the build to be cancelled
    #[serde(default)]
    pub cancelled: bool,
}

/// Observed state of a build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    #[serde(default)]
    pub phase: BuildPhase,
    /// Human-readable detail about the current phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Set once, when the build first enters `Running`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<Time>,
    /// Set once, when the build first enters a terminal phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_timestamp: Option<Time>,
}

impl Build {
    /// Current lifecycle phase, `New` when no status was recorded yet.
    pub fn phase(&self) -> BuildPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Whether a user asked for this build to be cancelled.
    pub fn cancel_requested(&self) -> bool {
        self.spec.cancelled
    }

    /// Applies a lifecycle event.
    ///
    /// Returns `Ok(true)` when the phase changed and `Ok(false)` when the event
    /// leaves the phase as it was. Timestamps are only stamped on the first
    /// entry into `Running` or into a terminal phase.
    ///
    /// # Errors
    ///
    /// - [`TransitionError`] if the table forbids the move, in which case the
    ///   build is left untouched
    pub fn apply(&mut self, event: BuildEvent, now: DateTime<Utc>) -> Result<bool, TransitionError> {
        let current = self.phase();
        let next = current.transition(event)?;
        if next == current {
            return Ok(false);
        }

        let status = self.status.get_or_insert_with(BuildStatus::default);
        status.phase = next;
        if next == BuildPhase::Running && status.start_timestamp.is_none() {
            status.start_timestamp = Some(Time(now));
        }
        if next.is_terminal() && status.completion_timestamp.is_none() {
            status.completion_timestamp = Some(Time(now));
        }
        Ok(true)
    }

    /// Sets the human-readable status message.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.status.get_or_insert_with(BuildStatus::default).message = Some(message.into());
    }

    /// Name of the pod executing this build.
    pub fn pod_name(&self) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }
}

/// A named pointer to a backing image repository.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "build.dev",
    version = "v1",
    kind = "ImageStream",
    plural = "imagestreams",
    namespaced,
    status = "ImageStreamStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamSpec {
    /// Externally managed repository, used when no integrated registry exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_image_repository: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamStatus {
    /// Resolved repository location, empty when no registry is configured
    #[serde(default)]
    pub docker_image_repository: String,
}

impl ImageStream {
    /// Resolved repository, `None` when the stream is not usable as an output.
    pub fn repository(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|s| s.docker_image_repository.as_str())
            .filter(|repo| !repo.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn new_build() -> Build {
        Build::new("b1", BuildSpec::default())
    }

    #[test]
    fn build_without_status_is_new() {
        assert_eq!(new_build().phase(), BuildPhase::New);
    }

    #[test]
    fn apply_stamps_start_once() {
        let mut build = new_build();
        let first = Utc::now();
        assert!(build.apply(BuildEvent::PodRunning, first).unwrap());
        let later = first + chrono::Duration::seconds(30);
        assert!(!build.apply(BuildEvent::PodRunning, later).unwrap());

        let status = build.status.unwrap();
        assert_eq!(status.start_timestamp, Some(Time(first)));
        assert_eq!(status.completion_timestamp, None);
    }

    #[test]
    fn apply_stamps_completion_on_terminal_entry() {
        let mut build = new_build();
        let now = Utc::now();
        build.apply(BuildEvent::Admitted, now).unwrap();
        build.apply(BuildEvent::PodSucceeded, now).unwrap();

        let status = build.status.as_ref().unwrap();
        assert_eq!(status.phase, BuildPhase::Complete);
        assert_eq!(status.completion_timestamp, Some(Time(now)));
    }

    #[test]
    fn rejected_event_leaves_build_untouched() {
        let mut build = new_build();
        let now = Utc::now();
        build.apply(BuildEvent::CancelRequested, now).unwrap();
        let before = build.clone();

        let err = build.apply(BuildEvent::PodLost, now).unwrap_err();
        assert_eq!(err.from, BuildPhase::Cancelled);
        assert_eq!(build, before);
    }

    #[test]
    fn image_stream_without_repository_is_unresolved() {
        let mut stream = ImageStream::new("is1", ImageStreamSpec::default());
        assert_eq!(stream.repository(), None);

        stream.status = Some(ImageStreamStatus {
            docker_image_repository: "registry:5000/ns/is1".to_string(),
        });
        assert_eq!(stream.repository(), Some("registry:5000/ns/is1"));
    }

    #[test]
    fn build_deserializes_from_manifest() {
        let build: Build = serde_json::from_value(serde_json::json!({
            "apiVersion": "build.dev/v1",
            "kind": "Build",
            "metadata": { "name": "b1", "namespace": "ns" },
            "spec": { "output": { "to": { "name": "is1" }, "tag": "v1" } }
        }))
        .unwrap();

        assert_eq!(build.phase(), BuildPhase::New);
        assert!(!build.cancel_requested());
        assert_eq!(build.spec.output.tag.as_deref(), Some("v1"));
        assert_eq!(build.spec.output.to.unwrap().namespace, None);
    }
}
