use crate::client::ManagementSession;
use crate::operation::DeleteOperation;
use crate::ProvisioningError;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

const API_VERSION: &str = "2021-04-01";

/// Desired state of a resource group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceGroupSpec {
    #[serde(skip)]
    pub name: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
}

impl ResourceGroupSpec {
    pub fn new(name: &str, location: &str) -> Self {
        Self {
            name: name.to_owned(),
            location: location.to_owned(),
            tags: None,
        }
    }
}

/// The fields of an ARM resource the sample reports back to the operator.
#[derive(Debug, Clone, PartialEq, Deserialize, Getters)]
#[getset(get = "pub")]
pub struct ResourceDescriptor {
    name: String,
    id: String,
    location: String,
    #[serde(default)]
    tags: Option<BTreeMap<String, String>>,
}

impl ResourceDescriptor {
    pub fn new(name: &str, id: &str, location: &str, tags: Option<BTreeMap<String, String>>) -> Self {
        Self {
            name: name.to_owned(),
            id: id.to_owned(),
            location: location.to_owned(),
            tags,
        }
    }
}

#[derive(Debug, Deserialize, Getters)]
#[getset(get = "pub")]
pub struct ProviderRegistration {
    namespace: String,
    #[serde(rename = "registrationState", default)]
    registration_state: String,
}

/// Client for the resource-management surface: provider registration and
/// resource-group lifecycle.
///
/// # Examples
///
/// ```
/// use azure_keyvault_provisioning::{ManagementSession, ResourceManagementClient, StaticTokenSource};
/// let source = StaticTokenSource::new("eyJ0eXAi...", chrono::Utc::now());
/// let session = ManagementSession::new(Box::new(source), "11111111-1111-1111-1111-111111111111");
/// let client = ResourceManagementClient::new(&session);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ResourceManagementClient<'a> {
    pub(crate) session: &'a ManagementSession,
}

impl<'a> ResourceManagementClient<'a> {
    pub fn new(session: &'a ManagementSession) -> Self {
        Self { session }
    }

    fn group_path(&self, group_name: &str) -> String {
        format!(
            "/subscriptions/{}/resourcegroups/{}",
            self.session.subscription_id(),
            group_name
        )
    }

    /// Registers a resource provider namespace with the subscription. Safe to
    /// repeat once the provider is registered.
    pub async fn register_provider(&self, namespace: &str) -> Result<ProviderRegistration, ProvisioningError> {
        let path = format!(
            "/subscriptions/{}/providers/{}/register",
            self.session.subscription_id(),
            namespace
        );
        let url = self.session.url(&path, API_VERSION)?;
        let registration: ProviderRegistration = self.session.post_authed(url).await?.json()?;
        info!(
            namespace = %registration.namespace,
            state = %registration.registration_state,
            "provider registration submitted"
        );
        Ok(registration)
    }

    /// Creates the group, or updates it in place to match `spec`.
    pub async fn create_or_update_group(
        &self,
        spec: &ResourceGroupSpec,
    ) -> Result<ResourceDescriptor, ProvisioningError> {
        let url = self.session.url(&self.group_path(&spec.name), API_VERSION)?;
        let group: ResourceDescriptor = self.session.put_authed(url, spec).await?.json()?;
        info!(group = %group.name, location = %group.location, "resource group ready");
        Ok(group)
    }

    /// Submits deletion of the group and everything in it. Returns as soon as
    /// the request is accepted; wait on the returned operation for completion.
    pub async fn begin_delete_group(&self, group_name: &str) -> Result<DeleteOperation, ProvisioningError> {
        let url = self.session.url(&self.group_path(group_name), API_VERSION)?;
        let resp = self.session.delete_authed(url).await?;
        let operation = DeleteOperation::from_response(group_name, &resp)?;
        info!(group = group_name, state = ?operation.state(), "resource group deletion accepted");
        Ok(operation)
    }
}
