use core::error::Error;

use crate::domain::build::ClientError;

/// Errors that can occur while setting up or running Kubernetes watches.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[display("Failed to watch {resource}: {message}")]
    WatchFailed { resource: String, message: String },
    #[display("Failed to forward {resource} event: dispatcher is gone")]
    DispatcherClosed { resource: String },
    #[display("The {resource} watcher is already running")]
    AlreadyRunning { resource: String },
}

impl Error for KubernetesError {}

const ALREADY_EXISTS_REASON: &str = "AlreadyExists";

impl From<kube::Error> for ClientError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) => {
                let message = response.message;
                match response.code {
                    404 => ClientError::NotFound { message },
                    409 if response.reason == ALREADY_EXISTS_REASON => {
                        ClientError::AlreadyExists { message }
                    }
                    409 => ClientError::Conflict { message },
                    _ => ClientError::Backend { message },
                }
            }
            other => ClientError::Backend {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use kube::error::ErrorResponse;
    use similar_asserts::assert_eq;

    use super::*;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} message"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn api_errors_map_to_client_errors() {
        assert_eq!(
            ClientError::from(api_error(404, "NotFound")),
            ClientError::NotFound {
                message: "NotFound message".to_string()
            }
        );
        assert_eq!(
            ClientError::from(api_error(409, "AlreadyExists")),
            ClientError::AlreadyExists {
                message: "AlreadyExists message".to_string()
            }
        );
        assert_eq!(
            ClientError::from(api_error(409, "Conflict")),
            ClientError::Conflict {
                message: "Conflict message".to_string()
            }
        );
        assert_eq!(
            ClientError::from(api_error(403, "Forbidden")),
            ClientError::Backend {
                message: "Forbidden message".to_string()
            }
        );
    }

    #[test]
    fn watch_error_names_resource() {
        let err = KubernetesError::WatchFailed {
            resource: "pods".to_string(),
            message: "stream ended".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to watch pods: stream ended");
    }
}
