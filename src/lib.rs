//! Provision and tear down an Azure Key Vault through the Azure Resource
//! Manager REST APIs, authenticating as a service principal.

mod client;
mod config;
mod credential;
mod error;
mod operation;
mod resources;
mod vault;
mod workflow;

pub use client::{ApiResponse, ManagementSession, PUBLIC_MANAGEMENT_ENDPOINT};
pub use config::*;
pub use credential::{AccessGrant, ServicePrincipalTokenSource, StaticTokenSource, TokenSource, MANAGEMENT_RESOURCE};
pub use error::ProvisioningError;
pub use operation::{DeleteOperation, OperationState, DEFAULT_POLL_INTERVAL};
pub use resources::{ProviderRegistration, ResourceDescriptor, ResourceGroupSpec, ResourceManagementClient};
pub use vault::{AccessPolicy, KeyVaultManagementClient, Permissions, VaultSpec};
pub use workflow::{
    print_item, run_example, run_with, run_workflow, AzureManagement, AzureProvisioning, ProvisioningApi,
    KEY_VAULT_NAMESPACE,
};
