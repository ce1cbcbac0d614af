use api_types::Build;
use async_trait::async_trait;
use kube::runtime::events::Event;
use kube::runtime::events::EventType;
use kube::runtime::events::Recorder;
use kube::runtime::events::Reporter;
use kube::Client;
use kube::Resource;
use tracing::warn;

use crate::domain::build::EventRecorder;

/// [`EventRecorder`] publishing Kubernetes warning events on builds.
///
/// Publishing is fire-and-forget: a failure is logged and dropped.
#[derive(Clone)]
pub struct KubeEventRecorder {
    client: Client,
    reporter: Reporter,
}

impl KubeEventRecorder {
    /// `controller_name` shows up as the reporting component of each event.
    pub fn new(client: Client, controller_name: &str) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: controller_name.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn eventf(&self, build: &Build, reason: &str, message: &str) {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            build.object_ref(&()),
        );
        let event = Event {
            type_: EventType::Warning,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(event).await {
            warn!(reason, error = %e, "Failed to publish Kubernetes event");
        }
    }
}
