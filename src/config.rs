use crate::ProvisioningError;
use envconfig::{Envconfig, Error as EnvconfigError};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

pub const TENANT_ID_VAR: &str = "AZURE_TENANT_ID";
pub const CLIENT_ID_VAR: &str = "AZURE_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "AZURE_CLIENT_SECRET";
pub const SUBSCRIPTION_ID_VAR: &str = "AZURE_SUBSCRIPTION_ID";
pub const OBJECT_ID_VAR: &str = "AZURE_OBJECT_ID";
pub const DELETE_TIMEOUT_VAR: &str = "AZURE_DELETE_TIMEOUT_SECS";

pub const PLACEHOLDER_SUBSCRIPTION_ID: &str = "11111111-1111-1111-1111-111111111111";
/// Fake principal id used by the sample when `AZURE_OBJECT_ID` is not given.
pub const PLACEHOLDER_OBJECT_ID: &str = "6819f86e-5d41-47b0-9297-334f33d7922d";

pub const DEFAULT_LOCATION: &str = "westus";
pub const DEFAULT_GROUP_NAME: &str = "azure-sample-group";
pub const DEFAULT_VAULT_NAME: &str = "keyvault-sample";
pub const DEFAULT_SKU: &str = "standard";
pub const ALL_PERMISSIONS: &str = "all";

/// Service principal secrets used to obtain a management token.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// What the sample creates and where.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSettings {
    pub subscription_id: String,
    pub location: String,
    pub group_name: String,
    pub vault_name: String,
    pub sku: String,
    /// Tenant the vault trusts; also the tenant of its access policy.
    pub vault_tenant_id: String,
    /// Principal granted the access policy.
    pub object_id: String,
    pub key_permissions: Vec<String>,
    pub secret_permissions: Vec<String>,
    /// `None` waits for the group deletion for as long as it takes.
    pub delete_timeout: Option<Duration>,
}

impl SampleSettings {
    /// Sample defaults for the given tenant.
    pub fn new(vault_tenant_id: &str) -> Self {
        SampleSettings {
            subscription_id: PLACEHOLDER_SUBSCRIPTION_ID.to_owned(),
            location: DEFAULT_LOCATION.to_owned(),
            group_name: DEFAULT_GROUP_NAME.to_owned(),
            vault_name: DEFAULT_VAULT_NAME.to_owned(),
            sku: DEFAULT_SKU.to_owned(),
            vault_tenant_id: vault_tenant_id.to_owned(),
            object_id: PLACEHOLDER_OBJECT_ID.to_owned(),
            key_permissions: vec![ALL_PERMISSIONS.to_owned()],
            secret_permissions: vec![ALL_PERMISSIONS.to_owned()],
            delete_timeout: None,
        }
    }
}

/// The sample's environment. Fields are read in declaration order, so the
/// first missing credential is the one reported.
#[derive(Envconfig, Clone)] // No Debug so the secret is not printed
pub struct EnvConfig {
    #[envconfig(from = "AZURE_TENANT_ID")]
    pub tenant_id: String,
    #[envconfig(from = "AZURE_CLIENT_ID")]
    pub client_id: String,
    #[envconfig(from = "AZURE_CLIENT_SECRET")]
    pub client_secret: String,
    #[envconfig(from = "AZURE_SUBSCRIPTION_ID", default = "11111111-1111-1111-1111-111111111111")]
    pub subscription_id: String,
    #[envconfig(from = "AZURE_OBJECT_ID")]
    pub object_id: Option<String>,
    #[envconfig(from = "AZURE_DELETE_TIMEOUT_SECS")]
    pub delete_timeout_secs: Option<u64>,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, ProvisioningError> {
        Self::init_from_env()?.validated()
    }

    pub fn from_hashmap(vars: &HashMap<String, String>) -> Result<Self, ProvisioningError> {
        Self::init_from_hashmap(vars)?.validated()
    }

    /// Set-but-empty credentials are as good as missing.
    fn validated(self) -> Result<Self, ProvisioningError> {
        let required = [
            (TENANT_ID_VAR, &self.tenant_id),
            (CLIENT_ID_VAR, &self.client_id),
            (CLIENT_SECRET_VAR, &self.client_secret),
        ];
        if let Some((key, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(ProvisioningError::MissingConfiguration(*key));
        }
        Ok(self)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }

    pub fn settings(&self) -> SampleSettings {
        let mut settings = SampleSettings::new(&self.tenant_id);
        settings.subscription_id = self.subscription_id.clone();
        if let Some(object_id) = self.object_id.as_ref().filter(|v| !v.is_empty()) {
            settings.object_id = object_id.clone();
        }
        settings.delete_timeout = self.delete_timeout_secs.map(Duration::from_secs);
        settings
    }
}

impl From<EnvconfigError> for ProvisioningError {
    fn from(err: EnvconfigError) -> Self {
        match err {
            EnvconfigError::EnvVarMissing { name } => ProvisioningError::MissingConfiguration(name),
            EnvconfigError::ParseError { name } => ProvisioningError::InvalidConfiguration {
                key: name,
                reason: "value could not be parsed".to_owned(),
            },
        }
    }
}
