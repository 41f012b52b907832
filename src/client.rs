use crate::credential::{AccessGrant, TokenSource, MANAGEMENT_RESOURCE};
use crate::ProvisioningError;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

pub const PUBLIC_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
/// Tokens this close to expiry are replaced before use.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// What came back from an authenticated call that the server accepted.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProvisioningError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Authenticated access to Azure Resource Manager for one subscription.
///
/// A single session is shared by reference between the resource and vault
/// clients; the cached token is replaced a minute before it expires.
///
/// # Examples
///
/// ```
/// use azure_keyvault_provisioning::{ManagementSession, StaticTokenSource};
/// let source = StaticTokenSource::new("eyJ0eXAi...", chrono::Utc::now());
/// let session = ManagementSession::new(Box::new(source), "11111111-1111-1111-1111-111111111111");
/// ```
pub struct ManagementSession {
    token_source: Box<dyn TokenSource>,
    http: reqwest::Client,
    endpoint: Url,
    subscription_id: String,
    token: Mutex<Option<AccessGrant>>,
}

impl std::fmt::Debug for ManagementSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementSession")
            .field("endpoint", &self.endpoint.as_str())
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

impl ManagementSession {
    /// Creates a session against a specific management endpoint. Useful for
    /// non-public Azure clouds. For the public cloud, use `ManagementSession::new`.
    pub fn new_with_endpoint(
        token_source: Box<dyn TokenSource>,
        subscription_id: &str,
        endpoint: Url,
    ) -> Self {
        Self {
            token_source,
            http: reqwest::Client::new(),
            endpoint,
            subscription_id: subscription_id.to_owned(),
            token: Mutex::new(None),
        }
    }

    pub fn new(token_source: Box<dyn TokenSource>, subscription_id: &str) -> Self {
        let endpoint =
            Url::parse(PUBLIC_MANAGEMENT_ENDPOINT).expect("public management endpoint is a valid URL");
        ManagementSession::new_with_endpoint(token_source, subscription_id, endpoint)
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// True when `url` points at the same scheme, host and port as the
    /// management endpoint, i.e. it is safe to send the bearer token there.
    pub fn is_management_url(&self, url: &Url) -> bool {
        url.origin() == self.endpoint.origin()
    }

    /// Resolves `path` (which starts with `/`) against the endpoint and pins the API version.
    pub(crate) fn url(&self, path: &str, api_version: &str) -> Result<Url, ProvisioningError> {
        let mut url = self
            .endpoint
            .join(path)
            .map_err(|e| ProvisioningError::InvalidConfiguration {
                key: "management endpoint",
                reason: e.to_string(),
            })?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    async fn bearer(&self) -> Result<String, ProvisioningError> {
        let mut cached = self.token.lock().await;
        if let Some(grant) = cached.as_ref() {
            let margin = chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
            if grant.expires_on - margin > chrono::Utc::now() {
                return Ok(grant.token.secret().clone());
            }
        }
        debug!("acquiring management token");
        let grant = self.token_source.acquire(MANAGEMENT_RESOURCE).await?;
        let secret = grant.token.secret().clone();
        *cached = Some(grant);
        Ok(secret)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<ApiResponse, ProvisioningError> {
        let token = self.bearer().await?;
        debug!(%method, %url, "management request");

        let mut request = self.http.request(method.clone(), url.clone()).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await?;
        debug!(%method, %url, status = status.as_u16(), "management response");

        if !status.is_success() {
            return Err(ProvisioningError::from_response(status.as_u16(), &body));
        }
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    pub(crate) async fn get_authed(&self, url: Url) -> Result<ApiResponse, ProvisioningError> {
        self.send::<()>(Method::GET, url, None).await
    }

    pub(crate) async fn post_authed(&self, url: Url) -> Result<ApiResponse, ProvisioningError> {
        self.send::<()>(Method::POST, url, None).await
    }

    pub(crate) async fn put_authed<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<ApiResponse, ProvisioningError> {
        self.send(Method::PUT, url, Some(body)).await
    }

    pub(crate) async fn delete_authed(&self, url: Url) -> Result<ApiResponse, ProvisioningError> {
        self.send::<()>(Method::DELETE, url, None).await
    }
}
