use crate::client::ManagementSession;
use crate::resources::ResourceDescriptor;
use crate::ProvisioningError;
use serde::Serialize;
use tracing::info;

const API_VERSION: &str = "2019-09-01";
const SKU_FAMILY: &str = "A";

/// Operations a principal may perform on a vault's contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Permissions {
    pub keys: Vec<String>,
    pub secrets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicy {
    pub tenant_id: String,
    pub object_id: String,
    pub permissions: Permissions,
}

/// Desired state of a vault nested in a resource group.
#[derive(Debug, Clone, PartialEq)]
pub struct VaultSpec {
    pub group_name: String,
    pub vault_name: String,
    pub location: String,
    pub sku: String,
    /// Tenant used to authenticate requests against the vault.
    pub tenant_id: String,
    pub access_policies: Vec<AccessPolicy>,
}

#[derive(Serialize)]
struct VaultCreateOrUpdateParameters<'s> {
    location: &'s str,
    properties: VaultProperties<'s>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VaultProperties<'s> {
    sku: Sku<'s>,
    tenant_id: &'s str,
    access_policies: &'s [AccessPolicy],
}

#[derive(Serialize)]
struct Sku<'s> {
    family: &'s str,
    name: &'s str,
}

impl VaultSpec {
    fn parameters(&self) -> VaultCreateOrUpdateParameters<'_> {
        VaultCreateOrUpdateParameters {
            location: &self.location,
            properties: VaultProperties {
                sku: Sku {
                    family: SKU_FAMILY,
                    name: &self.sku,
                },
                tenant_id: &self.tenant_id,
                access_policies: &self.access_policies,
            },
        }
    }
}

/// Client for the Key Vault management surface.
#[derive(Debug, Clone, Copy)]
pub struct KeyVaultManagementClient<'a> {
    pub(crate) session: &'a ManagementSession,
}

impl<'a> KeyVaultManagementClient<'a> {
    pub fn new(session: &'a ManagementSession) -> Self {
        Self { session }
    }

    /// Creates the vault, or updates it in place to match `spec`.
    pub async fn create_or_update_vault(&self, spec: &VaultSpec) -> Result<ResourceDescriptor, ProvisioningError> {
        let path = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.KeyVault/vaults/{}",
            self.session.subscription_id(),
            spec.group_name,
            spec.vault_name
        );
        let url = self.session.url(&path, API_VERSION)?;
        let vault: ResourceDescriptor = self.session.put_authed(url, &spec.parameters()).await?.json()?;
        info!(vault = %vault.name(), group = %spec.group_name, "vault ready");
        Ok(vault)
    }
}
