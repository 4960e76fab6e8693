//! Fixture selection over the normalized capabilities.
//!
//! Which resource anchors each notable dimension is fixed when the context is built
//! (first match wins). Which value of that dimension a request uses is drawn by the
//! [`Sampler`] at execution time.

use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Mutex;

use crate::capabilities::{Dimension, DimensionKind, Resource};
use crate::service::Service;

/// A resource paired with the dimension it was selected for.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionFixture {
    pub resource: Resource,
    pub dimension: String,
}

impl DimensionFixture {
    pub fn axis(&self) -> Option<&Dimension> {
        self.resource.dimensions.get(&self.dimension)
    }
}

/// Fixtures for one service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceFixtures {
    pub resources: Vec<Resource>,
    pub default: Option<Resource>,
    pub time: Option<DimensionFixture>,
    pub elevation: Option<DimensionFixture>,
    pub custom: Option<DimensionFixture>,
}

impl ServiceFixtures {
    pub fn build(resources: Vec<Resource>) -> Self {
        let default = resources.first().cloned();
        let time = first_with(&resources, DimensionKind::Time);
        let elevation = first_with(&resources, DimensionKind::Elevation);
        let custom = first_with(&resources, DimensionKind::Custom);
        Self {
            resources,
            default,
            time,
            elevation,
            custom,
        }
    }

    pub fn dimension(&self, kind: DimensionKind) -> Option<&DimensionFixture> {
        match kind {
            DimensionKind::Time => self.time.as_ref(),
            DimensionKind::Elevation => self.elevation.as_ref(),
            DimensionKind::Custom => self.custom.as_ref(),
        }
    }

    /// First resource advertising at least one EDR parameter.
    pub fn with_parameters(&self) -> Option<&Resource> {
        self.resources.iter().find(|r| !r.parameters.is_empty())
    }
}

fn first_with(resources: &[Resource], kind: DimensionKind) -> Option<DimensionFixture> {
    resources.iter().find_map(|resource| {
        resource
            .dimensions
            .iter()
            .find(|(name, dim)| DimensionKind::of(name) == kind && !dim.candidates().is_empty())
            .map(|(name, _)| DimensionFixture {
                resource: resource.clone(),
                dimension: name.clone(),
            })
    })
}

/// Read-only sampling context shared by every test in a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    services: IndexMap<Service, ServiceFixtures>,
}

impl ExecutionContext {
    pub fn build(capabilities: IndexMap<Service, Vec<Resource>>) -> Self {
        let services = capabilities
            .into_iter()
            .map(|(service, resources)| (service, ServiceFixtures::build(resources)))
            .collect();
        Self { services }
    }

    /// Context without any resources; every fixture-dependent test skips.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn service(&self, service: Service) -> Option<&ServiceFixtures> {
        self.services.get(&service)
    }

    pub fn default_resource(&self, service: Service) -> Option<&Resource> {
        self.service(service).and_then(|f| f.default.as_ref())
    }

    pub fn dimension(&self, service: Service, kind: DimensionKind) -> Option<&DimensionFixture> {
        self.service(service).and_then(|f| f.dimension(kind))
    }

    pub fn resource_count(&self) -> usize {
        self.services.values().map(|f| f.resources.len()).sum()
    }
}

/// Injectable random source for dimension values.
pub struct Sampler {
    rng: Mutex<StdRng>,
}

impl Sampler {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    /// Uniformly pick one of `values`.
    pub fn pick(&self, values: &[String]) -> Option<String> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        values.choose(&mut *rng).cloned()
    }

    /// Uniformly pick a value of a dimension (its enumeration, or its default).
    pub fn pick_value(&self, dimension: &Dimension) -> Option<String> {
        self.pick(&dimension.candidates())
    }
}
