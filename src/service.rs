use serde::Serialize;
use std::fmt;
use url::Url;

use crate::config::Config;
use crate::error::ProbeResult;

/// Protocol family of a probed endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Wms,
    Wmts,
    Edr,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Wms, Service::Wmts, Service::Edr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Wms => "wms",
            Service::Wmts => "wmts",
            Service::Edr => "edr",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved service endpoints of the server under test.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub wms: Url,
    pub wmts: Url,
    pub edr: Url,
}

impl Endpoints {
    pub fn from_config(config: &Config) -> ProbeResult<Self> {
        Ok(Self {
            wms: config.wms_url()?,
            wmts: config.wmts_url()?,
            edr: config.edr_url()?,
        })
    }

    pub fn of(&self, service: Service) -> &Url {
        match service {
            Service::Wms => &self.wms,
            Service::Wmts => &self.wmts,
            Service::Edr => &self.edr,
        }
    }

    /// Key-value-pair request against a service endpoint, parameters in the given order.
    pub fn kvp(&self, service: Service, params: &[(&str, &str)]) -> Url {
        let mut url = self.of(service).clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    /// Path-based request: segments are appended below the service endpoint.
    pub fn path(&self, service: Service, segments: &[&str]) -> Url {
        let mut url = self.of(service).clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Path-based request with a query string.
    pub fn path_query(&self, service: Service, segments: &[&str], params: &[(&str, &str)]) -> Url {
        let mut url = self.path(service, segments);
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        url
    }
}
