//! Orchestration service manager
//!
//! Keeps the registry of completion-capable orchestration services:
//! internal services registered in-process and external services discovered
//! from configured API endpoints. Discovery runs in a background task
//! started at construction; [`OrchestrationServiceManager::ready`] awaits
//! its completion. The external registry is swapped in as a whole, so
//! callers never observe a partially populated mapping.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

// ═══════════════════════════════════════════════════════════════════════════
// Service Port & Status
// ═══════════════════════════════════════════════════════════════════════════

/// Health of one orchestration service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceHealth {
    Ready,
    Initializing,
    Unavailable,
}

/// Status report for one orchestration service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub health: ServiceHealth,
    #[serde(default)]
    pub message: Option<String>,
}

/// A service that can answer completion requests
#[async_trait]
pub trait OrchestrationService: Send + Sync {
    fn name(&self) -> &str;

    async fn get_status(&self) -> Result<ServiceStatus>;

    /// Run one completion request. Payloads are opaque to the manager.
    async fn complete(&self, request: serde_json::Value) -> Result<serde_json::Value>;
}

impl std::fmt::Debug for dyn OrchestrationService + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationService")
            .field("name", &self.name())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Endpoint Discovery
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointCategory {
    ExternalOrchestration,
    Orchestration,
    General,
}

/// One configured API endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpointConfiguration {
    pub name: String,
    pub url: String,
    pub category: EndpointCategory,
    /// Secret key under which the endpoint's API key is stored
    pub api_key_configuration_name: String,
}

/// Source of endpoint configuration and secrets
#[async_trait]
pub trait ResourceConfiguration: Send + Sync {
    async fn list_endpoints(&self) -> Result<Vec<ApiEndpointConfiguration>>;

    async fn resolve_secret(&self, key: &str) -> Result<Option<String>>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Remote Proxy
// ═══════════════════════════════════════════════════════════════════════════

/// HTTP proxy for an externally hosted orchestration service
pub struct RemoteOrchestrationService {
    name: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RemoteOrchestrationService {
    pub fn new(name: impl Into<String>, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> PipelineError {
        PipelineError::Transport {
            service: self.name.clone(),
            attempts: 1,
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl OrchestrationService for RemoteOrchestrationService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_status(&self) -> Result<ServiceStatus> {
        let response = self
            .client
            .get(format!("{}/status", self.url))
            .header("X-API-KEY", &self.api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let health = if response.status().is_success() {
            ServiceHealth::Ready
        } else {
            ServiceHealth::Unavailable
        };
        Ok(ServiceStatus {
            name: self.name.clone(),
            health,
            message: None,
        })
    }

    async fn complete(&self, request: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(format!("{}/completions", self.url))
            .header("X-API-KEY", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?
            .error_for_status()
            .map_err(|e| self.transport_error(e))?;

        response.json().await.map_err(|e| self.transport_error(e))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Manager
// ═══════════════════════════════════════════════════════════════════════════

type ServiceMap = HashMap<String, Arc<dyn OrchestrationService>>;

pub struct OrchestrationServiceManager {
    internal: ServiceMap,
    external: Arc<RwLock<ServiceMap>>,
    ready_rx: watch::Receiver<bool>,
}

impl OrchestrationServiceManager {
    /// Create the manager and start external endpoint discovery.
    ///
    /// Callable before discovery finishes; until then
    /// [`OrchestrationServiceManager::get_service`] resolves internal
    /// services only.
    pub fn new(
        internal_services: Vec<Arc<dyn OrchestrationService>>,
        resources: Arc<dyn ResourceConfiguration>,
    ) -> Self {
        let internal: ServiceMap = internal_services
            .into_iter()
            .map(|s| (s.name().to_string(), s))
            .collect();

        let external: Arc<RwLock<ServiceMap>> = Arc::new(RwLock::new(HashMap::new()));
        let (ready_tx, ready_rx) = watch::channel(false);

        let registry = Arc::clone(&external);
        tokio::spawn(async move {
            match discover_external_services(resources.as_ref()).await {
                Ok(discovered) => {
                    info!(
                        services = discovered.len(),
                        "External orchestration service discovery finished"
                    );
                    *registry.write().unwrap_or_else(|e| e.into_inner()) = discovered;
                }
                Err(e) => {
                    warn!(error = %e, "External orchestration service discovery failed");
                }
            }
            let _ = ready_tx.send(true);
        });

        Self {
            internal,
            external,
            ready_rx,
        }
    }

    /// Await completion of the initial external discovery.
    pub async fn ready(&self) {
        let mut rx = self.ready_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Resolve a service by name, internal services first.
    ///
    /// # Errors
    ///
    /// `UnsupportedService` for unknown names.
    pub fn get_service(&self, name: &str) -> Result<Arc<dyn OrchestrationService>> {
        if let Some(service) = self.internal.get(name) {
            return Ok(Arc::clone(service));
        }
        let external = self.external.read().unwrap_or_else(|e| e.into_inner());
        external
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| PipelineError::UnsupportedService(name.to_string()))
    }

    /// Names of every known service.
    pub fn service_names(&self) -> Vec<String> {
        let external = self.external.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = self.internal.keys().chain(external.keys()).cloned().collect();
        names.sort();
        names
    }

    /// Query every known service concurrently.
    ///
    /// A service whose status call fails contributes an unavailable entry
    /// instead of aborting the aggregate.
    pub async fn get_aggregate_status(&self) -> Vec<ServiceStatus> {
        let services: Vec<Arc<dyn OrchestrationService>> = {
            let external = self.external.read().unwrap_or_else(|e| e.into_inner());
            self.internal
                .values()
                .chain(external.values())
                .map(Arc::clone)
                .collect()
        };

        let statuses = join_all(services.iter().map(|service| async move {
            match service.get_status().await {
                Ok(status) => status,
                Err(e) => {
                    warn!(service = service.name(), error = %e, "Status query failed");
                    ServiceStatus {
                        name: service.name().to_string(),
                        health: ServiceHealth::Unavailable,
                        message: Some(e.to_string()),
                    }
                }
            }
        }))
        .await;

        let mut statuses = statuses;
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

/// Discover external orchestration endpoints and wrap them in HTTP proxies.
///
/// Endpoints without a resolvable API key are skipped with a warning, not
/// treated as fatal.
async fn discover_external_services(
    resources: &dyn ResourceConfiguration,
) -> Result<ServiceMap> {
    let mut services: ServiceMap = HashMap::new();

    for endpoint in resources.list_endpoints().await? {
        if endpoint.category != EndpointCategory::ExternalOrchestration {
            continue;
        }
        match resources
            .resolve_secret(&endpoint.api_key_configuration_name)
            .await?
        {
            Some(api_key) => {
                info!(name = %endpoint.name, url = %endpoint.url, "Registered external orchestration service");
                services.insert(
                    endpoint.name.clone(),
                    Arc::new(RemoteOrchestrationService::new(
                        endpoint.name,
                        endpoint.url,
                        api_key,
                    )),
                );
            }
            None => {
                warn!(
                    name = %endpoint.name,
                    secret = %endpoint.api_key_configuration_name,
                    "Skipping endpoint with unresolvable API key"
                );
            }
        }
    }

    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticService {
        name: String,
        healthy: bool,
    }

    #[async_trait]
    impl OrchestrationService for StaticService {
        fn name(&self) -> &str {
            &self.name
        }

        async fn get_status(&self) -> Result<ServiceStatus> {
            if self.healthy {
                Ok(ServiceStatus {
                    name: self.name.clone(),
                    health: ServiceHealth::Ready,
                    message: None,
                })
            } else {
                Err(PipelineError::Transport {
                    service: self.name.clone(),
                    attempts: 1,
                    message: "down".to_string(),
                })
            }
        }

        async fn complete(&self, request: serde_json::Value) -> Result<serde_json::Value> {
            Ok(request)
        }
    }

    struct StaticResources {
        endpoints: Vec<ApiEndpointConfiguration>,
    }

    #[async_trait]
    impl ResourceConfiguration for StaticResources {
        async fn list_endpoints(&self) -> Result<Vec<ApiEndpointConfiguration>> {
            Ok(self.endpoints.clone())
        }

        async fn resolve_secret(&self, key: &str) -> Result<Option<String>> {
            if key == "known-key" {
                Ok(Some("secret".to_string()))
            } else {
                Ok(None)
            }
        }
    }

    fn external_endpoint(name: &str, key: &str) -> ApiEndpointConfiguration {
        ApiEndpointConfiguration {
            name: name.to_string(),
            url: format!("http://{name}.internal"),
            category: EndpointCategory::ExternalOrchestration,
            api_key_configuration_name: key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_discovery_registers_external_services() {
        let resources = Arc::new(StaticResources {
            endpoints: vec![
                external_endpoint("external-a", "known-key"),
                external_endpoint("no-key", "missing-key"),
                ApiEndpointConfiguration {
                    name: "general".to_string(),
                    url: "http://general".to_string(),
                    category: EndpointCategory::General,
                    api_key_configuration_name: "known-key".to_string(),
                },
            ],
        });

        let manager = OrchestrationServiceManager::new(Vec::new(), resources);
        manager.ready().await;

        // Only the external-orchestration endpoint with a resolvable key
        assert_eq!(manager.service_names(), vec!["external-a"]);
        assert!(manager.get_service("external-a").is_ok());
        assert!(matches!(
            manager.get_service("general").unwrap_err(),
            PipelineError::UnsupportedService(_)
        ));
    }

    #[tokio::test]
    async fn test_internal_services_resolve_before_readiness() {
        let resources = Arc::new(StaticResources { endpoints: vec![] });
        let manager = OrchestrationServiceManager::new(
            vec![Arc::new(StaticService {
                name: "internal-lc".to_string(),
                healthy: true,
            }) as Arc<dyn OrchestrationService>],
            resources,
        );

        // No ready() call; internal lookup must already work
        assert!(manager.get_service("internal-lc").is_ok());
    }

    #[tokio::test]
    async fn test_aggregate_status_converts_failures() {
        let resources = Arc::new(StaticResources { endpoints: vec![] });
        let manager = OrchestrationServiceManager::new(
            vec![
                Arc::new(StaticService {
                    name: "healthy".to_string(),
                    healthy: true,
                }) as Arc<dyn OrchestrationService>,
                Arc::new(StaticService {
                    name: "broken".to_string(),
                    healthy: false,
                }),
            ],
            resources,
        );
        manager.ready().await;

        let statuses = manager.get_aggregate_status().await;
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].name, "broken");
        assert_eq!(statuses[0].health, ServiceHealth::Unavailable);
        assert!(statuses[0].message.as_deref().unwrap().contains("down"));
        assert_eq!(statuses[1].health, ServiceHealth::Ready);
    }

    #[tokio::test]
    async fn test_complete_round_trips_payload() {
        let resources = Arc::new(StaticResources { endpoints: vec![] });
        let manager = OrchestrationServiceManager::new(
            vec![Arc::new(StaticService {
                name: "internal-lc".to_string(),
                healthy: true,
            }) as Arc<dyn OrchestrationService>],
            resources,
        );

        manager.ready().await;
        let service = manager.get_service("internal-lc").unwrap();
        let payload = serde_json::json!({"user_prompt": "hello"});
        let result = service.complete(payload.clone()).await.unwrap();
        assert_eq!(result, payload);
    }
}
