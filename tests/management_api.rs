use async_trait::async_trait;
use azure_keyvault_provisioning::*;
use chrono::{Duration as ChronoDuration, Utc};
use mockito::{mock, Matcher};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const TOKEN: &str = "test-token";
const SUBSCRIPTION: &str = "sub";

fn session() -> ManagementSession {
    let source = StaticTokenSource::new(TOKEN, Utc::now() + ChronoDuration::hours(1));
    let endpoint = Url::parse(&mockito::server_url()).unwrap();
    ManagementSession::new_with_endpoint(Box::new(source), SUBSCRIPTION, endpoint)
}

fn path(p: &str) -> Matcher {
    Matcher::Regex(format!(r"^{}(\?.*)?$", p))
}

fn api_version(version: &str) -> Matcher {
    Matcher::UrlEncoded("api-version".into(), version.into())
}

fn group_body() -> String {
    json!({
        "id": "/subscriptions/sub/resourceGroups/azure-sample-group",
        "name": "azure-sample-group",
        "location": "westus",
        "properties": { "provisioningState": "Succeeded" }
    })
    .to_string()
}

fn vault_body() -> String {
    json!({
        "id": "/subscriptions/sub/resourceGroups/azure-sample-group/providers/Microsoft.KeyVault/vaults/keyvault-sample",
        "name": "keyvault-sample",
        "type": "Microsoft.KeyVault/vaults",
        "location": "westus",
        "tags": {},
        "properties": { "vaultUri": "https://keyvault-sample.vault.azure.net/" }
    })
    .to_string()
}

fn settings() -> SampleSettings {
    let mut settings = SampleSettings::new("tenant");
    settings.subscription_id = SUBSCRIPTION.to_owned();
    settings.object_id = "principal".to_owned();
    settings
}

#[tokio::test]
async fn registers_the_key_vault_provider() {
    let m = mock("POST", path("/subscriptions/sub/providers/Microsoft.KeyVault/register"))
        .match_query(api_version("2021-04-01"))
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"/subscriptions/sub/providers/Microsoft.KeyVault","namespace":"Microsoft.KeyVault","registrationState":"Registered"}"#)
        .create();

    let session = session();
    let registration = ResourceManagementClient::new(&session)
        .register_provider("Microsoft.KeyVault")
        .await
        .unwrap();

    assert_eq!(registration.registration_state(), "Registered");
    m.assert();
}

#[tokio::test]
async fn creates_the_resource_group() {
    let m = mock("PUT", path("/subscriptions/sub/resourcegroups/azure-sample-group"))
        .match_query(api_version("2021-04-01"))
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::Json(json!({ "location": "westus" })))
        .with_status(201)
        .with_body(group_body())
        .create();

    let session = session();
    let group = ResourceManagementClient::new(&session)
        .create_or_update_group(&ResourceGroupSpec::new("azure-sample-group", "westus"))
        .await
        .unwrap();

    assert_eq!(group.name(), "azure-sample-group");
    assert_eq!(group.id(), "/subscriptions/sub/resourceGroups/azure-sample-group");
    assert_eq!(group.location(), "westus");
    assert_eq!(group.tags(), &None);
    m.assert();
}

#[tokio::test]
async fn creates_the_vault_with_sample_policy() {
    let m = mock(
        "PUT",
        path("/subscriptions/sub/resourceGroups/azure-sample-group/providers/Microsoft.KeyVault/vaults/keyvault-sample"),
    )
    .match_query(api_version("2019-09-01"))
    .match_body(Matcher::PartialJson(json!({
        "location": "westus",
        "properties": {
            "sku": { "name": "standard" },
            "tenantId": "tenant",
            "accessPolicies": [{
                "tenantId": "tenant",
                "objectId": "principal",
                "permissions": { "keys": ["all"], "secrets": ["all"] }
            }]
        }
    })))
    .with_status(200)
    .with_body(vault_body())
    .create();

    let session = session();
    let vault = KeyVaultManagementClient::new(&session)
        .create_or_update_vault(&VaultSpec::from(&settings()))
        .await
        .unwrap();

    assert_eq!(vault.name(), "keyvault-sample");
    assert_eq!(vault.tags().as_ref().map(|t| t.len()), Some(0));
    m.assert();
}

#[tokio::test]
async fn remote_failures_keep_the_arm_error() {
    let _m = mock("PUT", path("/subscriptions/sub/resourcegroups/azure-sample-group"))
        .with_status(403)
        .with_body(r#"{"error":{"code":"AuthorizationFailed","message":"The client does not have authorization"}}"#)
        .create();

    let session = session();
    let err = ResourceManagementClient::new(&session)
        .create_or_update_group(&ResourceGroupSpec::new("azure-sample-group", "westus"))
        .await
        .unwrap_err();

    match err {
        ProvisioningError::RemoteApi { status, code, message } => {
            assert_eq!(status, 403);
            assert_eq!(code, "AuthorizationFailed");
            assert_eq!(message, "The client does not have authorization");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn deletion_is_polled_until_done() {
    let location = format!("{}/subscriptions/sub/operationresults/op-1", mockito::server_url());
    let delete = mock("DELETE", path("/subscriptions/sub/resourcegroups/azure-sample-group"))
        .with_status(202)
        .with_header("location", &location)
        .with_header("retry-after", "0")
        .create();
    let poll = mock("GET", path("/subscriptions/sub/operationresults/op-1"))
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .create();

    let session = session();
    let operation = ResourceManagementClient::new(&session)
        .begin_delete_group("azure-sample-group")
        .await
        .unwrap();
    assert_eq!(operation.state(), OperationState::Pending);
    assert_eq!(operation.group_name(), "azure-sample-group");

    operation.wait(&session, None).await.unwrap();
    delete.assert();
    poll.assert();
}

#[tokio::test]
async fn failed_async_operation_is_reported() {
    let monitor = format!("{}/subscriptions/sub/asyncoperations/op-2", mockito::server_url());
    let _delete = mock("DELETE", path("/subscriptions/sub/resourcegroups/azure-sample-group"))
        .with_status(202)
        .with_header("azure-asyncoperation", &monitor)
        .with_header("retry-after", "0")
        .create();
    let _poll = mock("GET", path("/subscriptions/sub/asyncoperations/op-2"))
        .with_status(200)
        .with_body(r#"{"status":"Failed","error":{"code":"ScopeLocked","message":"group is locked"}}"#)
        .create();

    let session = session();
    let operation = ResourceManagementClient::new(&session)
        .begin_delete_group("azure-sample-group")
        .await
        .unwrap();

    match operation.wait(&session, None).await {
        Err(ProvisioningError::RemoteApi { code, .. }) => assert_eq!(code, "ScopeLocked"),
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn bounded_wait_times_out() {
    let location = format!("{}/subscriptions/sub/operationresults/op-3", mockito::server_url());
    let _delete = mock("DELETE", path("/subscriptions/sub/resourcegroups/azure-sample-group"))
        .with_status(202)
        .with_header("location", &location)
        .with_header("retry-after", "30")
        .create();

    let session = session();
    let operation = ResourceManagementClient::new(&session)
        .begin_delete_group("azure-sample-group")
        .await
        .unwrap();

    match operation.wait(&session, Some(Duration::from_millis(50))).await {
        Err(ProvisioningError::OperationTimeout { operation, .. }) => {
            assert!(operation.contains("azure-sample-group"))
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn foreign_poll_location_is_refused() {
    let delete = mock("DELETE", path("/subscriptions/sub/resourcegroups/azure-sample-group"))
        .with_status(202)
        .with_header("location", "https://attacker.example.com/operationresults/op-4")
        .with_header("retry-after", "0")
        .create();

    let session = session();
    let operation = ResourceManagementClient::new(&session)
        .begin_delete_group("azure-sample-group")
        .await
        .unwrap();

    match operation.wait(&session, Some(Duration::from_secs(5))).await {
        Err(ProvisioningError::UntrustedLocation(url)) => assert!(url.starts_with("https://attacker.example.com/")),
        other => panic!("unexpected result {:?}", other),
    }
    delete.assert();
}

#[tokio::test]
async fn full_run_against_the_management_api() {
    let register = mock("POST", path("/subscriptions/sub/providers/Microsoft.KeyVault/register"))
        .with_status(200)
        .with_body(r#"{"namespace":"Microsoft.KeyVault","registrationState":"Registering"}"#)
        .create();
    let group = mock("PUT", path("/subscriptions/sub/resourcegroups/azure-sample-group"))
        .with_status(200)
        .with_body(group_body())
        .create();
    let vault = mock(
        "PUT",
        path("/subscriptions/sub/resourceGroups/azure-sample-group/providers/Microsoft.KeyVault/vaults/keyvault-sample"),
    )
    .with_status(200)
    .with_body(vault_body())
    .create();
    let delete = mock("DELETE", path("/subscriptions/sub/resourcegroups/azure-sample-group"))
        .with_status(200)
        .create();

    let session = session();
    let api = AzureManagement::new(&session);
    let mut out = Vec::new();
    run_workflow(&api, &settings(), &mut out).await.unwrap();

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("\tName: keyvault-sample\n"));
    assert!(printed.ends_with("\nDeleted: azure-sample-group\n"));
    register.assert();
    group.assert();
    vault.assert();
    delete.assert();
}

#[tokio::test]
async fn vault_conflict_leaves_the_group_alone() {
    let _register = mock("POST", path("/subscriptions/sub/providers/Microsoft.KeyVault/register"))
        .with_status(200)
        .with_body(r#"{"namespace":"Microsoft.KeyVault","registrationState":"Registered"}"#)
        .create();
    let _group = mock("PUT", path("/subscriptions/sub/resourcegroups/azure-sample-group"))
        .with_status(200)
        .with_body(group_body())
        .create();
    let _vault = mock(
        "PUT",
        path("/subscriptions/sub/resourceGroups/azure-sample-group/providers/Microsoft.KeyVault/vaults/keyvault-sample"),
    )
    .with_status(409)
    .with_body(r#"{"error":{"code":"VaultAlreadyExists","message":"name taken"}}"#)
    .create();
    let delete = mock("DELETE", Matcher::Any).expect(0).create();

    let session = session();
    let api = AzureManagement::new(&session);
    let err = run_workflow(&api, &settings(), &mut Vec::new()).await.unwrap_err();

    assert!(err.is_remote());
    delete.assert();
}

/// Hands out short-lived tokens and counts how often it was asked.
struct CountingSource {
    calls: Arc<AtomicUsize>,
    lifetime: ChronoDuration,
}

#[async_trait]
impl TokenSource for CountingSource {
    async fn acquire(&self, resource: &str) -> Result<AccessGrant, ProvisioningError> {
        assert_eq!(resource, MANAGEMENT_RESOURCE);
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let source = StaticTokenSource::new(&format!("token-{}", n), Utc::now() + self.lifetime);
        source.acquire(resource).await
    }
}

async fn register_twice(lifetime: ChronoDuration) -> usize {
    let _m = mock("POST", path("/subscriptions/sub/providers/Microsoft.KeyVault/register"))
        .with_status(200)
        .with_body(r#"{"namespace":"Microsoft.KeyVault","registrationState":"Registered"}"#)
        .expect(2)
        .create();

    let calls = Arc::new(AtomicUsize::new(0));
    let source = CountingSource {
        calls: calls.clone(),
        lifetime,
    };
    let endpoint = Url::parse(&mockito::server_url()).unwrap();
    let session = ManagementSession::new_with_endpoint(Box::new(source), SUBSCRIPTION, endpoint);
    let client = ResourceManagementClient::new(&session);
    client.register_provider(KEY_VAULT_NAMESPACE).await.unwrap();
    client.register_provider(KEY_VAULT_NAMESPACE).await.unwrap();
    calls.load(Ordering::SeqCst)
}

#[tokio::test]
async fn valid_token_is_reused() {
    assert_eq!(register_twice(ChronoDuration::hours(1)).await, 1);
}

#[tokio::test]
async fn token_about_to_expire_is_refreshed() {
    assert_eq!(register_twice(ChronoDuration::seconds(30)).await, 2);
}

#[tokio::test]
async fn expired_token_is_refreshed() {
    assert_eq!(register_twice(ChronoDuration::seconds(-1)).await, 2);
}
