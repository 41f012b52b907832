use crate::client::{ApiResponse, ManagementSession};
use crate::ProvisioningError;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

const ASYNC_OPERATION: &str = "azure-asyncoperation";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Complete,
}

/// Handle to an accepted resource-group deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOperation {
    group_name: String,
    poll_url: Option<Url>,
    retry_after: Option<Duration>,
    state: OperationState,
}

#[derive(Deserialize)]
struct AsyncOperationStatus {
    status: String,
    #[serde(default)]
    error: Option<OperationErrorDetail>,
}

#[derive(Deserialize, Default)]
struct OperationErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

enum Poll {
    Pending(Option<Duration>),
    Done,
}

impl DeleteOperation {
    /// An operation that still has to be polled at `poll_url`.
    pub fn pending(group_name: &str, poll_url: Url, retry_after: Option<Duration>) -> Self {
        Self {
            group_name: group_name.to_owned(),
            poll_url: Some(poll_url),
            retry_after,
            state: OperationState::Pending,
        }
    }

    /// An operation the server finished synchronously.
    pub fn completed(group_name: &str) -> Self {
        Self {
            group_name: group_name.to_owned(),
            poll_url: None,
            retry_after: None,
            state: OperationState::Complete,
        }
    }

    pub(crate) fn from_response(group_name: &str, resp: &ApiResponse) -> Result<Self, ProvisioningError> {
        if resp.status != StatusCode::ACCEPTED {
            return Ok(DeleteOperation::completed(group_name));
        }
        let poll_url = poll_url(&resp.headers).ok_or_else(|| ProvisioningError::RemoteApi {
            status: resp.status.as_u16(),
            code: "MissingPollingLocation".to_owned(),
            message: format!("deletion of {} was accepted without a status location", group_name),
        })?;
        Ok(DeleteOperation::pending(group_name, poll_url, retry_after(&resp.headers)))
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Blocks until the deletion completes. `None` never gives up; `Some(limit)`
    /// fails with `OperationTimeout` once `limit` has passed.
    pub async fn wait(
        mut self,
        session: &ManagementSession,
        timeout: Option<Duration>,
    ) -> Result<(), ProvisioningError> {
        let started = Instant::now();
        let poll = self.poll_until_done(session);
        match timeout {
            None => poll.await?,
            Some(limit) => match tokio::time::timeout(limit, poll).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ProvisioningError::OperationTimeout {
                        operation: format!("deletion of resource group {}", self.group_name),
                        waited: started.elapsed(),
                    })
                }
            },
        }
        self.state = OperationState::Complete;
        info!(group = %self.group_name, "resource group deleted");
        Ok(())
    }

    async fn poll_until_done(&self, session: &ManagementSession) -> Result<(), ProvisioningError> {
        let url = match (&self.state, &self.poll_url) {
            (OperationState::Pending, Some(url)) => url.clone(),
            _ => return Ok(()),
        };
        if !session.is_management_url(&url) {
            return Err(ProvisioningError::UntrustedLocation(url.to_string()));
        }
        let mut delay = self.retry_after.unwrap_or(DEFAULT_POLL_INTERVAL);
        loop {
            tokio::time::delay_for(delay).await;
            let resp = session.get_authed(url.clone()).await?;
            match poll_outcome(&resp)? {
                Poll::Done => return Ok(()),
                Poll::Pending(hint) => {
                    debug!(group = %self.group_name, "deletion still in progress");
                    delay = hint.unwrap_or(DEFAULT_POLL_INTERVAL);
                }
            }
        }
    }
}

fn poll_url(headers: &HeaderMap) -> Option<Url> {
    headers
        .get(ASYNC_OPERATION)
        .or_else(|| headers.get(LOCATION))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Url::parse(v).ok())
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn poll_outcome(resp: &ApiResponse) -> Result<Poll, ProvisioningError> {
    if resp.status == StatusCode::ACCEPTED {
        return Ok(Poll::Pending(retry_after(&resp.headers)));
    }
    // Azure-AsyncOperation monitors answer 200 with a status document.
    let doc = match serde_json::from_str::<AsyncOperationStatus>(&resp.body) {
        Ok(doc) => doc,
        Err(_) => return Ok(Poll::Done),
    };
    match doc.status.as_str() {
        "Succeeded" => Ok(Poll::Done),
        "Failed" | "Canceled" => {
            let detail = doc.error.unwrap_or_default();
            Err(ProvisioningError::RemoteApi {
                status: resp.status.as_u16(),
                code: if detail.code.is_empty() { doc.status.clone() } else { detail.code },
                message: if detail.message.is_empty() {
                    format!("operation {}", doc.status.to_lowercase())
                } else {
                    detail.message
                },
            })
        }
        _ => Ok(Poll::Pending(retry_after(&resp.headers))),
    }
}
