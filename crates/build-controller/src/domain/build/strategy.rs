//! Default build strategy: a single container running the builder image.

use std::collections::BTreeMap;

use api_types::Build;
use api_types::BUILD_LABEL;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use super::traits::BuildStrategy;
use super::types::StrategyError;

/// Name of the container executing the build.
pub const BUILD_CONTAINER_NAME: &str = "build";

/// Pod rendering settings of [`ContainerBuildStrategy`].
#[derive(Debug, Clone, Default)]
pub struct StrategyConfig {
    /// Image that performs the build, empty when not configured
    pub builder_image: String,
}

/// Renders a build as a single-container pod.
///
/// The container receives the serialized build in `BUILD`, the resolved
/// output reference in `OUTPUT_IMAGE` and the build namespace in
/// `BUILD_NAMESPACE`.
pub struct ContainerBuildStrategy {
    config: StrategyConfig,
}

impl ContainerBuildStrategy {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }
}

fn env(name: &str, value: String) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value),
        ..Default::default()
    }
}

impl BuildStrategy for ContainerBuildStrategy {
    fn create_build_pod(&self, build: Build) -> Result<Pod, StrategyError> {
        if self.config.builder_image.is_empty() {
            return Err(StrategyError::MissingBuilderImage);
        }

        let name = build.name_any();
        let namespace = build.namespace().unwrap_or_default();
        let encoded = serde_json::to_string(&build)?;

        let container = Container {
            name: BUILD_CONTAINER_NAME.to_string(),
            image: Some(self.config.builder_image.clone()),
            env: Some(vec![
                env("BUILD", encoded),
                env(
                    "OUTPUT_IMAGE",
                    build.spec.output.docker_image_reference.clone(),
                ),
                env("BUILD_NAMESPACE", namespace.clone()),
            ]),
            ..Default::default()
        };

        Ok(Pod {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace),
                labels: Some(BTreeMap::from([(BUILD_LABEL.to_string(), name)])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![container],
                restart_policy: Some("Never".to_string()),
                ..Default::default()
            }),
            status: None,
        })
    }
}
