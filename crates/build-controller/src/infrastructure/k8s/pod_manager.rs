use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DeleteParams;
use kube::api::PostParams;
use kube::Api;
use kube::Client;
use kube::ResourceExt;
use tracing::debug;

use crate::domain::build::ClientError;
use crate::domain::build::PodManager;

/// [`PodManager`] talking to the Kubernetes API server.
#[derive(Clone)]
pub struct KubePodManager {
    client: Client,
}

impl KubePodManager {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl PodManager for KubePodManager {
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, ClientError> {
        debug!(namespace, pod = %pod.name_any(), "Creating pod");
        Ok(self.api(namespace).create(&PostParams::default(), pod).await?)
    }

    async fn delete_pod(&self, namespace: &str, pod: &Pod) -> Result<(), ClientError> {
        debug!(namespace, pod = %pod.name_any(), "Deleting pod");
        self.api(namespace)
            .delete(&pod.name_any(), &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ClientError> {
        Ok(self.api(namespace).get_opt(name).await?)
    }
}
