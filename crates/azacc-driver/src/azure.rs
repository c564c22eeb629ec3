use std::process::Command as StdCommand;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use azacc_domain::{Disk, VirtualMachine};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::client::{ComputeClient, Lookup};
use crate::error::DriverError;

const COMPUTE_API_VERSION: &str = "2017-03-30";

// ── Configuration ─────────────────────────────────────────────────────────────

/// Subscription and credentials for the compute client.
#[derive(Clone)]
pub struct AzureClientConfig {
    pub subscription_id: String,
    pub tenant_id: String,
    /// With `client_secret`, selects service principal auth. Without it the
    /// client tries managed identity, then the Azure CLI.
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

// ── Base URLs (overridden in tests) ───────────────────────────────────────────

#[derive(Clone)]
pub(crate) struct BaseUrls {
    management: String,
    login:      String,
    imds:       String,
}

impl Default for BaseUrls {
    fn default() -> Self {
        Self {
            management: "https://management.azure.com".into(),
            login:      "https://login.microsoftonline.com".into(),
            imds:       "http://169.254.169.254".into(),
        }
    }
}

// ── Token provider ────────────────────────────────────────────────────────────

/// Source of ARM bearer tokens.
#[async_trait]
trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, DriverError>;
}

fn cached(cache: &Option<(String, Instant)>) -> Option<String> {
    match cache {
        Some((tok, expiry)) if Instant::now() < *expiry => Some(tok.clone()),
        _ => None,
    }
}

// ── Service Principal ─────────────────────────────────────────────────────────

struct ServicePrincipalTokenProvider {
    tenant_id:     String,
    client_id:     String,
    client_secret: String,
    login_base:    String,
    client:        reqwest::Client,
    cache:         Mutex<Option<(String, Instant)>>,
}

#[async_trait]
impl TokenProvider for ServicePrincipalTokenProvider {
    async fn token(&self) -> Result<String, DriverError> {
        if let Some(tok) = cached(&*self.cache.lock().await) {
            return Ok(tok);
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant_id);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("scope", "https://management.azure.com/.default"),
        ];
        let resp: Value = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| DriverError::Auth(format!("SP token request: {}", e)))?
            .json()
            .await
            .map_err(|e| DriverError::Auth(format!("SP token decode: {}", e)))?;

        let tok = resp["access_token"]
            .as_str()
            .ok_or_else(|| DriverError::Auth(format!("SP token: no access_token in response: {}", resp)))?
            .to_string();
        let expires_in = resp["expires_in"].as_u64().unwrap_or(3600);
        let expiry = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));

        *self.cache.lock().await = Some((tok.clone(), expiry));
        Ok(tok)
    }
}

// ── Managed Identity (IMDS) ───────────────────────────────────────────────────

struct ManagedIdentityTokenProvider {
    imds_base: String,
    client:    reqwest::Client,
    cache:     Mutex<Option<(String, Instant)>>,
}

#[async_trait]
impl TokenProvider for ManagedIdentityTokenProvider {
    async fn token(&self) -> Result<String, DriverError> {
        if let Some(tok) = cached(&*self.cache.lock().await) {
            return Ok(tok);
        }

        let resp: Value = self
            .client
            .get(format!("{}/metadata/identity/oauth2/token", self.imds_base))
            .header("Metadata", "true")
            .query(&[
                ("api-version", "2018-02-01"),
                ("resource", "https://management.azure.com/"),
            ])
            .send()
            .await
            .map_err(|e| DriverError::Auth(format!("IMDS token request: {}", e)))?
            .json()
            .await
            .map_err(|e| DriverError::Auth(format!("IMDS token decode: {}", e)))?;

        let tok = resp["access_token"]
            .as_str()
            .ok_or_else(|| DriverError::Auth(format!("IMDS token: no access_token: {}", resp)))?
            .to_string();
        let expires_in = resp["expires_in"]
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(3600);
        let expiry = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));

        *self.cache.lock().await = Some((tok.clone(), expiry));
        Ok(tok)
    }
}

// ── Azure CLI ─────────────────────────────────────────────────────────────────

struct AzureCliTokenProvider {
    tenant_id: String,
}

#[async_trait]
impl TokenProvider for AzureCliTokenProvider {
    async fn token(&self) -> Result<String, DriverError> {
        let output = StdCommand::new("az")
            .args([
                "account",
                "get-access-token",
                "--resource",
                "https://management.azure.com",
                "--tenant",
                &self.tenant_id,
                "--output",
                "json",
            ])
            .output()
            .map_err(|e| DriverError::Auth(format!("az CLI not found: {}. Install Azure CLI or set ARM_CLIENT_ID and ARM_CLIENT_SECRET.", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DriverError::Auth(format!(
                "az account get-access-token failed: {}. Run 'az login' first.",
                stderr.trim()
            )));
        }

        let resp: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| DriverError::Auth(format!("az CLI output parse: {}", e)))?;
        let tok = resp["accessToken"]
            .as_str()
            .ok_or_else(|| DriverError::Auth("az CLI: no accessToken in output".into()))?
            .to_string();
        Ok(tok)
    }
}

// ── Static (tests) ────────────────────────────────────────────────────────────

/// Fixed bearer token for wiremock tests.
#[cfg(test)]
struct StaticToken(String);

#[cfg(test)]
#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, DriverError> {
        Ok(self.0.clone())
    }
}

// ── AzureComputeClient ────────────────────────────────────────────────────────

/// Reads disks and virtual machines from Azure Resource Manager.
pub struct AzureComputeClient {
    config: AzureClientConfig,
    client: reqwest::Client,
    token:  Box<dyn TokenProvider>,
    base:   BaseUrls,
}

impl AzureComputeClient {
    /// Create a client, auto-selecting the token provider:
    /// 1. `client_id` + `client_secret` in config → Service Principal
    /// 2. `IDENTITY_ENDPOINT` env var → Managed Identity (IMDS)
    /// 3. Otherwise → Azure CLI (`az account get-access-token`)
    pub fn new(config: AzureClientConfig) -> Result<Self, DriverError> {
        if config.subscription_id.is_empty() {
            return Err(DriverError::Internal("subscription id must not be empty".into()));
        }
        let client = reqwest::Client::new();
        let base   = BaseUrls::default();

        let token: Box<dyn TokenProvider> = if let (Some(cid), Some(cs)) = (
            config.client_id.as_deref(),
            config.client_secret.as_deref(),
        ) {
            debug!("using service principal credentials");
            Box::new(ServicePrincipalTokenProvider {
                tenant_id:     config.tenant_id.clone(),
                client_id:     cid.to_string(),
                client_secret: cs.to_string(),
                login_base:    base.login.clone(),
                client:        client.clone(),
                cache:         Mutex::new(None),
            })
        } else if std::env::var("IDENTITY_ENDPOINT").is_ok() {
            debug!("using managed identity credentials");
            Box::new(ManagedIdentityTokenProvider {
                imds_base: base.imds.clone(),
                client:    client.clone(),
                cache:     Mutex::new(None),
            })
        } else {
            debug!("using Azure CLI credentials");
            Box::new(AzureCliTokenProvider {
                tenant_id: config.tenant_id.clone(),
            })
        };

        Ok(Self { config, client, token, base })
    }

    /// Create a client with a static bearer token and custom base URLs.
    #[cfg(test)]
    pub(crate) fn with_static_token(config: AzureClientConfig, token: &str, base: BaseUrls) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            token:  Box::new(StaticToken(token.to_string())),
            base,
        }
    }

    async fn bearer(&self) -> Result<String, DriverError> {
        self.token.token().await
    }

    fn compute_url(&self, subscription_id: &str, resource_group: &str, collection: &str, name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/{}/{}?api-version={}",
            self.base.management,
            subscription_id,
            resource_group,
            collection,
            name,
            COMPUTE_API_VERSION,
        )
    }

    // ── ARM error parsing ─────────────────────────────────────────────────────

    fn parse_arm_error(body: &Value) -> String {
        let err = body
            .get("error")
            .or_else(|| body.get("Error"))
            .unwrap_or(body);
        let code    = err["code"].as_str().unwrap_or("Unknown");
        let message = err["message"].as_str().unwrap_or("unknown error");
        format!("{}: {}", code, message)
    }

    // ── ARM HTTP verbs ────────────────────────────────────────────────────────

    async fn arm_get(&self, url: &str) -> Result<(u16, Value), DriverError> {
        let token = self.bearer().await?;
        debug!(url, "Azure ARM GET");
        let resp = self
            .client
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| DriverError::Transport(format!("GET {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        let body: Value = resp
            .json()
            .await
            .unwrap_or(Value::Null);
        Ok((status, body))
    }

    /// GET a resource, checking the status before anything else so a 404
    /// is reported as `NotFound` rather than an error.
    async fn get_resource<T: DeserializeOwned>(&self, url: &str) -> Lookup<T> {
        let (status, body) = match self.arm_get(url).await {
            Ok(r) => r,
            Err(e) => return Lookup::TransportError(e),
        };

        if status == 404 {
            debug!(url, "resource not found");
            return Lookup::NotFound;
        }
        if !(200..300).contains(&status) {
            let message = Self::parse_arm_error(&body);
            warn!(url, status, %message, "Azure ARM GET failed");
            return Lookup::TransportError(DriverError::Api {
                url: url.to_string(),
                status,
                message,
            });
        }

        match serde_json::from_value(body) {
            Ok(v) => Lookup::Found(v),
            Err(e) => Lookup::TransportError(DriverError::Decode(format!("GET {}: {}", url, e))),
        }
    }
}

#[async_trait]
impl ComputeClient for AzureComputeClient {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn get_disk(&self, resource_group: &str, name: &str) -> Lookup<Disk> {
        self.get_disk_in(&self.config.subscription_id, resource_group, name).await
    }

    async fn get_disk_in(&self, subscription_id: &str, resource_group: &str, name: &str) -> Lookup<Disk> {
        let url = self.compute_url(subscription_id, resource_group, "disks", name);
        self.get_resource(&url).await
    }

    async fn get_virtual_machine(&self, resource_group: &str, name: &str) -> Lookup<VirtualMachine> {
        let url = self.compute_url(&self.config.subscription_id, resource_group, "virtualMachines", name);
        self.get_resource(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fetch_disk;
    use azacc_domain::ArmResourceId;
    use serde_json::json;
    use wiremock::{
        matchers::{header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    const SUB: &str = "00000000-0000-0000-0000-000000000000";

    fn test_config() -> AzureClientConfig {
        AzureClientConfig {
            subscription_id: SUB.into(),
            tenant_id:       "test-tenant-id".into(),
            client_id:       None,
            client_secret:   None,
        }
    }

    fn test_base(url: &str) -> BaseUrls {
        BaseUrls {
            management: url.to_string(),
            login:      url.to_string(),
            imds:       url.to_string(),
        }
    }

    fn client(server: &MockServer) -> AzureComputeClient {
        AzureComputeClient::with_static_token(test_config(), "fake-token", test_base(&server.uri()))
    }

    fn disk_path(rg: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/disks/{}",
            SUB, rg, name
        )
    }

    fn disk_body(rg: &str, name: &str) -> Value {
        json!({
            "id": disk_path(rg, name),
            "name": name,
            "location": "westus",
            "sku": { "name": "Standard_LRS" },
            "properties": {
                "diskSizeGB": 1,
                "creationData": { "createOption": "Empty" },
                "provisioningState": "Succeeded"
            }
        })
    }

    #[tokio::test]
    async fn get_disk_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(disk_path("acctestRG-1", "acctmd-1").as_str()))
            .and(query_param("api-version", COMPUTE_API_VERSION))
            .and(header("authorization", "Bearer fake-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(disk_body("acctestRG-1", "acctmd-1")))
            .mount(&server)
            .await;

        let disk = client(&server)
            .get_disk("acctestRG-1", "acctmd-1")
            .await
            .found()
            .unwrap();
        assert_eq!(disk.name, "acctmd-1");
        assert_eq!(disk.properties.disk_size_gb, Some(1));
    }

    #[tokio::test]
    async fn not_found_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(disk_path("acctestRG-1", "gone").as_str()))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": "ResourceNotFound", "message": "The Resource 'gone' was not found." }
            })))
            .mount(&server)
            .await;

        let lookup = client(&server).get_disk("acctestRG-1", "gone").await;
        assert!(matches!(lookup, Lookup::NotFound));
    }

    #[tokio::test]
    async fn server_error_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(disk_path("acctestRG-1", "d").as_str()))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": { "code": "InternalServerError", "message": "boom" }
            })))
            .mount(&server)
            .await;

        match client(&server).get_disk("acctestRG-1", "d").await {
            Lookup::TransportError(DriverError::Api { status, message, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "InternalServerError: boom");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn undecodable_body_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(disk_path("acctestRG-1", "d").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": true })))
            .mount(&server)
            .await;

        let lookup = client(&server).get_disk("acctestRG-1", "d").await;
        assert!(matches!(lookup, Lookup::TransportError(DriverError::Decode(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let base = test_base("http://127.0.0.1:1");
        let client = AzureComputeClient::with_static_token(test_config(), "t", base);
        let lookup = client.get_disk("rg", "d").await;
        assert!(matches!(lookup, Lookup::TransportError(DriverError::Transport(_))));
    }

    #[tokio::test]
    async fn get_virtual_machine_decodes_storage_profile() {
        let server = MockServer::start().await;
        let vm_path = format!(
            "/subscriptions/{}/resourceGroups/acctestRG-1/providers/Microsoft.Compute/virtualMachines/acctvm-1",
            SUB
        );
        Mock::given(method("GET"))
            .and(path(vm_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": vm_path,
                "name": "acctvm-1",
                "location": "westus",
                "properties": {
                    "storageProfile": {
                        "osDisk": {
                            "name": "myosdisk1",
                            "createOption": "FromImage",
                            "managedDisk": { "id": disk_path("acctestRG-1", "myosdisk1") }
                        },
                        "dataDisks": []
                    }
                }
            })))
            .mount(&server)
            .await;

        let vm = client(&server)
            .get_virtual_machine("acctestRG-1", "acctvm-1")
            .await
            .found()
            .unwrap();
        let os = vm.storage_profile().os_disk.as_ref().unwrap();
        assert_eq!(os.name, "myosdisk1");
        assert!(os.managed_disk.is_some());
    }

    #[tokio::test]
    async fn fetch_disk_uses_id_components() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(disk_path("acctestRG-7", "osd-7").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(disk_body("acctestRG-7", "osd-7")))
            .expect(2)
            .mount(&server)
            .await;

        let id = ArmResourceId::parse(&disk_path("acctestRG-7", "osd-7")).unwrap();
        let c = client(&server);
        let first = fetch_disk(&c, &id).await.found().unwrap();
        let second = fetch_disk(&c, &id).await.found().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.id, id.as_str());
    }

    #[tokio::test]
    async fn fetch_disk_without_disks_segment_fails() {
        let server = MockServer::start().await;
        let id = ArmResourceId::parse(&format!(
            "/subscriptions/{}/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm",
            SUB
        ))
        .unwrap();
        let lookup = fetch_disk(&client(&server), &id).await;
        assert!(matches!(lookup, Lookup::TransportError(DriverError::InvalidResourceId(_))));
    }

    #[tokio::test]
    async fn static_token_is_sent_as_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(disk_path("rg", "d2").as_str()))
            .and(header("Authorization", "Bearer fixed-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(disk_body("rg", "d2")))
            .expect(1)
            .mount(&server)
            .await;

        let c = AzureComputeClient::with_static_token(test_config(), "fixed-token", test_base(&server.uri()));
        assert!(c.get_disk("rg", "d2").await.exists());
    }

    #[tokio::test]
    async fn fetch_disk_reads_from_the_id_subscription() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions/bbbb/resourceGroups/rg/providers/Microsoft.Compute/disks/d1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(disk_body("rg", "d1")))
            .expect(1)
            .mount(&server)
            .await;

        let config = AzureClientConfig { subscription_id: "aaaa".into(), ..test_config() };
        let c = AzureComputeClient::with_static_token(config, "fake-token", test_base(&server.uri()));
        let id = ArmResourceId::parse(
            "/subscriptions/bbbb/resourceGroups/rg/providers/Microsoft.Compute/disks/d1",
        )
        .unwrap();
        let disk = fetch_disk(&c, &id).await.found().unwrap();
        assert_eq!(disk.name, "d1");
    }

    #[tokio::test]
    async fn service_principal_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test-tenant-id/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "sp-token",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ServicePrincipalTokenProvider {
            tenant_id:     "test-tenant-id".into(),
            client_id:     "cid".into(),
            client_secret: "secret".into(),
            login_base:    server.uri(),
            client:        reqwest::Client::new(),
            cache:         Mutex::new(None),
        };
        assert_eq!(provider.token().await.unwrap(), "sp-token");
        assert_eq!(provider.token().await.unwrap(), "sp-token");
    }

    #[tokio::test]
    async fn managed_identity_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .and(header("Metadata", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "mi-token",
                "expires_in": "3599"
            })))
            .mount(&server)
            .await;

        let provider = ManagedIdentityTokenProvider {
            imds_base: server.uri(),
            client:    reqwest::Client::new(),
            cache:     Mutex::new(None),
        };
        assert_eq!(provider.token().await.unwrap(), "mi-token");
    }

    #[test]
    fn arm_error_parsing() {
        let body = json!({ "error": { "code": "NotFound", "message": "nope" } });
        assert_eq!(AzureComputeClient::parse_arm_error(&body), "NotFound: nope");
        assert_eq!(AzureComputeClient::parse_arm_error(&Value::Null), "Unknown: unknown error");
    }

    #[test]
    fn empty_subscription_rejected() {
        let mut config = test_config();
        config.subscription_id = String::new();
        assert!(AzureComputeClient::new(config).is_err());
    }
}
