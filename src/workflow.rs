use crate::client::ManagementSession;
use crate::config::{Credentials, EnvConfig, SampleSettings};
use crate::credential::ServicePrincipalTokenSource;
use crate::operation::DeleteOperation;
use crate::resources::{ResourceDescriptor, ResourceGroupSpec, ResourceManagementClient};
use crate::vault::{AccessPolicy, KeyVaultManagementClient, Permissions, VaultSpec};
use crate::ProvisioningError;
use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;
use tracing::info;

pub const KEY_VAULT_NAMESPACE: &str = "Microsoft.KeyVault";

/// The remote calls the sample makes, in the order it makes them.
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    async fn register_provider(&self, namespace: &str) -> Result<(), ProvisioningError>;

    async fn create_or_update_group(
        &self,
        spec: &ResourceGroupSpec,
    ) -> Result<ResourceDescriptor, ProvisioningError>;

    async fn create_or_update_vault(&self, spec: &VaultSpec) -> Result<ResourceDescriptor, ProvisioningError>;

    async fn begin_delete_group(&self, group_name: &str) -> Result<DeleteOperation, ProvisioningError>;

    async fn wait_for_deletion(
        &self,
        operation: DeleteOperation,
        timeout: Option<Duration>,
    ) -> Result<(), ProvisioningError>;
}

/// Both management clients over one shared session.
#[derive(Debug, Clone, Copy)]
pub struct AzureManagement<'a> {
    pub resources: ResourceManagementClient<'a>,
    pub vaults: KeyVaultManagementClient<'a>,
}

impl<'a> AzureManagement<'a> {
    pub fn new(session: &'a ManagementSession) -> Self {
        Self {
            resources: ResourceManagementClient::new(session),
            vaults: KeyVaultManagementClient::new(session),
        }
    }
}

#[async_trait]
impl<'a> ProvisioningApi for AzureManagement<'a> {
    async fn register_provider(&self, namespace: &str) -> Result<(), ProvisioningError> {
        self.resources.register_provider(namespace).await?;
        Ok(())
    }

    async fn create_or_update_group(
        &self,
        spec: &ResourceGroupSpec,
    ) -> Result<ResourceDescriptor, ProvisioningError> {
        self.resources.create_or_update_group(spec).await
    }

    async fn create_or_update_vault(&self, spec: &VaultSpec) -> Result<ResourceDescriptor, ProvisioningError> {
        self.vaults.create_or_update_vault(spec).await
    }

    async fn begin_delete_group(&self, group_name: &str) -> Result<DeleteOperation, ProvisioningError> {
        self.resources.begin_delete_group(group_name).await
    }

    async fn wait_for_deletion(
        &self,
        operation: DeleteOperation,
        timeout: Option<Duration>,
    ) -> Result<(), ProvisioningError> {
        operation.wait(self.resources.session, timeout).await
    }
}

impl From<&SampleSettings> for ResourceGroupSpec {
    fn from(settings: &SampleSettings) -> Self {
        ResourceGroupSpec::new(&settings.group_name, &settings.location)
    }
}

impl From<&SampleSettings> for VaultSpec {
    fn from(settings: &SampleSettings) -> Self {
        VaultSpec {
            group_name: settings.group_name.clone(),
            vault_name: settings.vault_name.clone(),
            location: settings.location.clone(),
            sku: settings.sku.clone(),
            tenant_id: settings.vault_tenant_id.clone(),
            access_policies: vec![AccessPolicy {
                tenant_id: settings.vault_tenant_id.clone(),
                object_id: settings.object_id.clone(),
                permissions: Permissions {
                    keys: settings.key_permissions.clone(),
                    secrets: settings.secret_permissions.clone(),
                },
            }],
        }
    }
}

/// Writes the name, id, location and tags of a resource.
pub fn print_item<W: Write>(out: &mut W, item: &ResourceDescriptor) -> Result<(), ProvisioningError> {
    writeln!(out, "\tName: {}", item.name())?;
    writeln!(out, "\tId: {}", item.id())?;
    writeln!(out, "\tLocation: {}", item.location())?;
    match item.tags() {
        Some(tags) => writeln!(out, "\tTags: {:?}", tags)?,
        None => writeln!(out, "\tTags: None")?,
    }
    Ok(())
}

/// Registers the Key Vault provider, creates the group and the vault, then
/// deletes the group and waits for the deletion to finish.
///
/// The first failure ends the run. Nothing already created is cleaned up.
pub async fn run_workflow<A, W>(api: &A, settings: &SampleSettings, out: &mut W) -> Result<(), ProvisioningError>
where
    A: ProvisioningApi + ?Sized,
    W: Write,
{
    // Only needed once per subscription; repeating it is harmless.
    api.register_provider(KEY_VAULT_NAMESPACE).await?;

    writeln!(out, "\nCreate Resource Group")?;
    let group = api.create_or_update_group(&ResourceGroupSpec::from(settings)).await?;
    print_item(out, &group)?;

    writeln!(out, "\nCreate a vault")?;
    let vault = api.create_or_update_vault(&VaultSpec::from(settings)).await?;
    print_item(out, &vault)?;

    writeln!(out, "\nDelete Resource Group")?;
    let deletion = api.begin_delete_group(&settings.group_name).await?;
    api.wait_for_deletion(deletion, settings.delete_timeout).await?;
    writeln!(out, "\nDeleted: {}", settings.group_name)?;
    Ok(())
}

/// Owns the session both management clients borrow.
#[derive(Debug)]
pub struct AzureProvisioning {
    session: ManagementSession,
}

impl AzureProvisioning {
    pub fn new(session: ManagementSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &ManagementSession {
        &self.session
    }

    fn api(&self) -> AzureManagement<'_> {
        AzureManagement::new(&self.session)
    }
}

#[async_trait]
impl ProvisioningApi for AzureProvisioning {
    async fn register_provider(&self, namespace: &str) -> Result<(), ProvisioningError> {
        self.api().register_provider(namespace).await
    }

    async fn create_or_update_group(
        &self,
        spec: &ResourceGroupSpec,
    ) -> Result<ResourceDescriptor, ProvisioningError> {
        self.api().resources.create_or_update_group(spec).await
    }

    async fn create_or_update_vault(&self, spec: &VaultSpec) -> Result<ResourceDescriptor, ProvisioningError> {
        self.api().vaults.create_or_update_vault(spec).await
    }

    async fn begin_delete_group(&self, group_name: &str) -> Result<DeleteOperation, ProvisioningError> {
        self.api().resources.begin_delete_group(group_name).await
    }

    async fn wait_for_deletion(
        &self,
        operation: DeleteOperation,
        timeout: Option<Duration>,
    ) -> Result<(), ProvisioningError> {
        operation.wait(&self.session, timeout).await
    }
}

/// Loads configuration, connects, then runs the workflow. `connect` is only
/// called once configuration has loaded.
pub async fn run_with<L, C, A, W>(load: L, connect: C, out: &mut W) -> Result<(), ProvisioningError>
where
    L: FnOnce() -> Result<EnvConfig, ProvisioningError>,
    C: FnOnce(Credentials, &SampleSettings) -> A,
    A: ProvisioningApi,
    W: Write,
{
    let config = load()?;
    let settings = config.settings();
    info!(
        subscription = %settings.subscription_id,
        group = %settings.group_name,
        location = %settings.location,
        "starting key vault sample"
    );

    let api = connect(config.credentials(), &settings);
    run_workflow(&api, &settings, out).await
}

/// Runs the sample end to end with credentials and settings taken from the
/// environment, reporting progress on stdout.
pub async fn run_example() -> Result<(), ProvisioningError> {
    let connect = |credentials: Credentials, settings: &SampleSettings| {
        AzureProvisioning::new(ManagementSession::new(
            Box::new(ServicePrincipalTokenSource::new(credentials)),
            &settings.subscription_id,
        ))
    };
    run_with(EnvConfig::from_env, connect, &mut std::io::stdout()).await
}
