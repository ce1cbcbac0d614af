use api_types::Build;
use async_trait::async_trait;
use kube::api::PostParams;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::reflector::Store;
use kube::Api;
use kube::Client;
use kube::ResourceExt;
use tracing::debug;

use crate::domain::build::BuildIndex;
use crate::domain::build::BuildUpdater;
use crate::domain::build::ClientError;

/// [`BuildUpdater`] writing builds back to the API server.
///
/// The status subresource is written first, and the spec afterwards only when
/// it differs from the stored one. Each write produces a watch event, so the
/// first one already moves a newly admitted build out of `New`. A failed spec
/// write leaves the new status stored next to the previous spec. Both writes
/// carry the resource version, so a build changed since it was read fails with
/// [`ClientError::Conflict`].
#[derive(Clone)]
pub struct KubeBuildUpdater {
    client: Client,
}

impl KubeBuildUpdater {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BuildUpdater for KubeBuildUpdater {
    async fn update(&self, namespace: &str, build: &Build) -> Result<(), ClientError> {
        let api: Api<Build> = Api::namespaced(self.client.clone(), namespace);
        let name = build.name_any();
        let params = PostParams::default();

        let body = serde_json::to_vec(build).map_err(|e| ClientError::Backend {
            message: format!("failed to encode build {namespace}/{name}: {e}"),
        })?;
        let written = api.replace_status(&name, &params, body).await?;

        if let Some(spec_update) = spec_update(written, build) {
            api.replace(&name, &params, &spec_update).await?;
        }

        debug!(namespace, build = %name, phase = %build.phase(), "Updated build");
        Ok(())
    }
}

/// The object to write when `desired` changes the spec of the stored
/// `written` build, based on the version the status write produced.
fn spec_update(mut written: Build, desired: &Build) -> Option<Build> {
    if written.spec == desired.spec {
        return None;
    }
    written.spec = desired.spec.clone();
    Some(written)
}

/// [`BuildIndex`] over the reflector cache fed by the build watcher.
#[derive(Clone)]
pub struct StoreBuildIndex {
    store: Store<Build>,
}

impl StoreBuildIndex {
    pub fn new(store: Store<Build>) -> Self {
        Self { store }
    }
}

impl BuildIndex for StoreBuildIndex {
    fn get(&self, namespace: &str, name: &str) -> Result<Option<Build>, ClientError> {
        let key = ObjectRef::new(name).within(namespace);
        Ok(self.store.get(&key).map(|build| build.as_ref().clone()))
    }
}
