use api_types::ImageStream;
use async_trait::async_trait;
use kube::Api;
use kube::Client;

use crate::domain::build::ClientError;
use crate::domain::build::ImageStreamResolver;

/// [`ImageStreamResolver`] reading `ImageStream` resources from the API server.
#[derive(Clone)]
pub struct KubeImageStreamResolver {
    client: Client,
}

impl KubeImageStreamResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageStreamResolver for KubeImageStreamResolver {
    async fn get_image_stream(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ImageStream, ClientError> {
        let api: Api<ImageStream> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }
}
