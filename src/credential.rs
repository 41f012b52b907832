use crate::config::Credentials;
use crate::ProvisioningError;
use anyhow::Context;
use async_trait::async_trait;
use azure_sdk_auth_aad::authorize_non_interactive;
use chrono::{DateTime, Utc};
use oauth2::{AccessToken, ClientId, ClientSecret};
use std::sync::Arc;

/// AAD resource identifier of Azure Resource Manager in the public cloud.
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";

/// A bearer token and the instant it stops being accepted.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub token: AccessToken,
    pub expires_on: DateTime<Utc>,
}

/// Something that can hand out bearer tokens for an AAD resource.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire(&self, resource: &str) -> Result<AccessGrant, ProvisioningError>;
}

/// Client-credentials flow against Azure Active Directory.
///
/// # Examples
///
/// ```
/// use azure_keyvault_provisioning::{Credentials, ServicePrincipalTokenSource};
/// let source = ServicePrincipalTokenSource::new(Credentials {
///     tenant_id: "bc598e67-03d8-44d5-aa46-8289b9a39a14".to_owned(),
///     client_id: "c1a6d79b-082b-4798-b362-a77e96de50db".to_owned(),
///     client_secret: "SUPER_SECRET_KEY".to_owned(),
/// });
/// ```
#[derive(Debug)]
pub struct ServicePrincipalTokenSource {
    credentials: Credentials,
    http: Arc<reqwest::Client>,
}

impl ServicePrincipalTokenSource {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            http: Arc::new(reqwest::Client::new()),
        }
    }
}

#[async_trait]
impl TokenSource for ServicePrincipalTokenSource {
    async fn acquire(&self, resource: &str) -> Result<AccessGrant, ProvisioningError> {
        let client_id = ClientId::new(self.credentials.client_id.clone());
        let client_secret = ClientSecret::new(self.credentials.client_secret.clone());
        let token = authorize_non_interactive(
            self.http.clone(),
            &client_id,
            &client_secret,
            resource,
            &self.credentials.tenant_id,
        )
        .await
        .with_context(|| "Failed to authenticate to Azure Active Directory")
        .map_err(ProvisioningError::AuthorizationError)?;
        Ok(AccessGrant {
            token: token.access_token().clone(),
            expires_on: token.expires_on,
        })
    }
}

/// A token minted elsewhere, e.g. with `az account get-access-token`.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    grant: AccessGrant,
}

impl StaticTokenSource {
    pub fn new(token: &str, expires_on: DateTime<Utc>) -> Self {
        Self {
            grant: AccessGrant {
                token: AccessToken::new(token.to_owned()),
                expires_on,
            },
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn acquire(&self, _resource: &str) -> Result<AccessGrant, ProvisioningError> {
        Ok(self.grant.clone())
    }
}
