use std::error::Error as StdError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Everything that can stop a provisioning run.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("missing required environment variable {0}")]
    MissingConfiguration(&'static str),

    #[error("invalid value for {key}: {reason}")]
    InvalidConfiguration { key: &'static str, reason: String },

    #[error("authorization failed")]
    AuthorizationError(#[source] anyhow::Error),

    #[error("management API returned {status} ({code}): {message}")]
    RemoteApi {
        status: u16,
        code: String,
        message: String,
    },

    #[error("request to the management API failed")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response body from the management API")]
    UnexpectedResponse(#[from] serde_json::Error),

    #[error("refusing to poll {0}: not the management endpoint")]
    UntrustedLocation(String),

    #[error("{operation} did not complete within {waited:?}")]
    OperationTimeout { operation: String, waited: Duration },

    #[error("cancelled by operator")]
    Cancelled,

    #[error("failed to write progress output")]
    Output(#[from] io::Error),
}

impl ProvisioningError {
    /// True for failures that originate from (or on the way to) a management API.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ProvisioningError::RemoteApi { .. }
                | ProvisioningError::Transport(_)
                | ProvisioningError::UnexpectedResponse(_)
        )
    }

    /// The error and each of its causes, one per line, for the operator.
    pub fn report(&self) -> String {
        let mut report = format!("Error: {}", self);
        let mut source = StdError::source(self);
        while let Some(cause) = source {
            report.push_str(&format!("\nCaused by: {}", cause));
            source = cause.source();
        }
        report
    }

    /// Builds a `RemoteApi` error from a non-success response body. ARM wraps
    /// failures as `{"error": {"code": .., "message": ..}}`; anything else is
    /// kept verbatim as the message.
    pub(crate) fn from_response(status: u16, body: &str) -> Self {
        #[derive(serde::Deserialize)]
        struct Envelope {
            error: Detail,
        }
        #[derive(serde::Deserialize)]
        struct Detail {
            #[serde(default)]
            code: String,
            #[serde(default)]
            message: String,
        }

        match serde_json::from_str::<Envelope>(body) {
            Ok(envelope) => ProvisioningError::RemoteApi {
                status,
                code: envelope.error.code,
                message: envelope.error.message,
            },
            Err(_) => ProvisioningError::RemoteApi {
                status,
                code: String::new(),
                message: body.trim().to_owned(),
            },
        }
    }
}
