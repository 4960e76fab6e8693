//! Capabilities documents and the normalized resource model.
//!
//! Every protocol parser produces the same [`Resource`] shape so fixture
//! selection never needs to know which document a resource came from.

pub mod edr;
pub mod model;
pub mod wms;
pub mod wmts;

pub use model::*;

use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;

use crate::error::{ProbeError, ProbeResult};
use crate::executor::RequestExecutor;
use crate::service::{Endpoints, Service};

/// Source of normalized resources for a service.
#[async_trait]
pub trait CapabilitiesSource: Send + Sync {
    async fn fetch(&self, service: Service) -> ProbeResult<Vec<Resource>>;
}

/// Fetches capabilities documents from the server under test.
pub struct HttpCapabilities {
    executor: Arc<RequestExecutor>,
    endpoints: Endpoints,
}

impl HttpCapabilities {
    pub fn new(executor: Arc<RequestExecutor>, endpoints: Endpoints) -> Self {
        Self { executor, endpoints }
    }
}

/// Capabilities request URL for a service.
pub fn capabilities_url(endpoints: &Endpoints, service: Service) -> url::Url {
    match service {
        Service::Wms => endpoints.kvp(
            Service::Wms,
            &[("SERVICE", "WMS"), ("REQUEST", "GetCapabilities"), ("VERSION", "1.3.0")],
        ),
        Service::Wmts => endpoints.kvp(
            Service::Wmts,
            &[("SERVICE", "WMTS"), ("REQUEST", "GetCapabilities"), ("VERSION", "1.0.0")],
        ),
        Service::Edr => endpoints.path(Service::Edr, &["collections"]),
    }
}

#[async_trait]
impl CapabilitiesSource for HttpCapabilities {
    async fn fetch(&self, service: Service) -> ProbeResult<Vec<Resource>> {
        let url = capabilities_url(&self.endpoints, service);
        let exchange = self
            .executor
            .get(&url)
            .await
            .map_err(|failure| ProbeError::Capabilities(failure.to_string()))?;

        if !exchange.status.is_success() {
            return Err(ProbeError::Capabilities(format!(
                "{} returned HTTP {}",
                url, exchange.status
            )));
        }

        let text = exchange.text();
        let resources = match service {
            Service::Wms => wms::parse(&text)?.layers,
            Service::Wmts => wmts::parse(&text)?.layers,
            Service::Edr => edr::parse(&exchange.body)?,
        };
        Ok(resources)
    }
}

/// Load resources for every service, degrading failures to empty lists.
pub async fn load_all(source: &dyn CapabilitiesSource) -> IndexMap<Service, Vec<Resource>> {
    let mut loaded = IndexMap::new();
    for service in Service::ALL {
        let resources = match source.fetch(service).await {
            Ok(resources) => {
                tracing::info!(%service, count = resources.len(), "Loaded capabilities");
                resources
            }
            Err(e) => {
                tracing::warn!(%service, error = %e, "Capabilities unavailable");
                Vec::new()
            }
        };
        loaded.insert(service, resources);
    }
    loaded
}
