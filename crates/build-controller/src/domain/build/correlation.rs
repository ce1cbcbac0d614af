//! Build and pod correlation
//!
//! A build pod has the same name as its build and carries the
//! [`BUILD_LABEL`] label naming the build. Both must hold before the pod is
//! treated as belonging to the build.

use api_types::Build;
use api_types::BUILD_LABEL;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::debug;

use super::traits::BuildIndex;
use super::types::ReconcileError;
use super::types::Result;

/// Value of the build label on a pod, if any.
pub fn pod_build_label(pod: &Pod) -> Option<&str> {
    pod.labels().get(BUILD_LABEL).map(String::as_str)
}

/// Whether the pod's build label names `build`.
pub fn labelled_for(build: &Build, pod: &Pod) -> bool {
    build
        .metadata
        .name
        .as_deref()
        .is_some_and(|name| pod_build_label(pod) == Some(name))
}

/// Whether `pod` is the pod executing `build`, by name and by label.
pub fn pod_belongs_to(build: &Build, pod: &Pod) -> bool {
    build.metadata.name == pod.metadata.name && labelled_for(build, pod)
}

/// Looks up the build a pod event refers to.
///
/// Returns `None` when no build shares the pod's key, or when the build found
/// under that key does not own the pod.
pub(crate) fn correlated_build<X>(index: &X, pod: &Pod) -> Result<Option<Build>>
where
    X: BuildIndex + ?Sized,
{
    let namespace = pod.namespace().unwrap_or_default();
    let name = pod.name_any();

    let build = index
        .get(&namespace, &name)
        .map_err(|source| ReconcileError::BuildIndex {
            namespace: namespace.clone(),
            name: name.clone(),
            source,
        })?;

    let Some(build) = build else {
        debug!(pod = %format!("{namespace}/{name}"), "No build found for pod");
        return Ok(None);
    };

    if !pod_belongs_to(&build, pod) {
        debug!(
            pod = %format!("{namespace}/{name}"),
            label = ?pod_build_label(pod),
            "Pod is not labelled for the build sharing its name"
        );
        return Ok(None);
    }

    Ok(Some(build))
}

#[cfg(test)]
mod tests {
    use api_types::BuildPhase;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::domain::build::mock::test_build;
    use crate::domain::build::mock::test_pod;
    use crate::domain::build::mock::MockBuildStore;

    #[test]
    fn pod_with_matching_name_and_label_belongs_to_build() {
        let build = test_build("ns", "b1", BuildPhase::Running);
        let pod = test_pod("ns", "b1", "Running", &[]);
        assert!(pod_belongs_to(&build, &pod));
    }

    #[test]
    fn pod_labelled_for_another_build_does_not_belong() {
        let build = test_build("ns", "b1", BuildPhase::Running);
        let mut pod = test_pod("ns", "b1", "Running", &[]);
        pod.labels_mut()
            .insert(BUILD_LABEL.to_string(), "other".to_string());
        assert!(!pod_belongs_to(&build, &pod));
        assert_eq!(pod_build_label(&pod), Some("other"));
    }

    #[test]
    fn correlated_build_ignores_mislabelled_pod() {
        let store = MockBuildStore::new();
        store.insert(test_build("ns", "b1", BuildPhase::Running));

        let mut pod = test_pod("ns", "b1", "Running", &[]);
        assert!(correlated_build(&store, &pod).unwrap().is_some());

        pod.labels_mut().remove(BUILD_LABEL);
        assert!(correlated_build(&store, &pod).unwrap().is_none());
    }

    #[test]
    fn correlated_build_surfaces_index_failure() {
        let store = MockBuildStore::new();
        store.fail_get_with(crate::domain::build::ClientError::Backend {
            message: "cache not synced".to_string(),
        });

        let pod = test_pod("ns", "b1", "Running", &[]);
        let err = correlated_build(&store, &pod).unwrap_err();
        assert!(err.is_retryable());
    }
}
