//! Static catalog of conformance tests.
//!
//! Each [`TestCase`] is a plain function pointer over a [`Probe`]. Tests are grouped into
//! categories, executed in declaration order, and identified by a globally unique id.

pub mod edr;
pub mod wms;
pub mod wmts;

use futures::future::BoxFuture;
use std::collections::HashSet;
use std::fmt;
use url::Url;

use crate::assertions::{Checks, exception_code};
use crate::capabilities::{DimensionKind, Resource};
use crate::error::{ProbeError, ProbeResult};
use crate::executor::{Exchange, RequestExecutor, TransportFailure};
use crate::fixtures::{ExecutionContext, Sampler};
use crate::results::Outcome;
use crate::service::{Endpoints, Service};

pub type TestFn = for<'a> fn(&'a Probe<'a>) -> BoxFuture<'a, Outcome>;

/// Everything a test body may use. Tests read the context; they never mutate it.
pub struct Probe<'a> {
    pub context: &'a ExecutionContext,
    pub executor: &'a RequestExecutor,
    pub sampler: &'a Sampler,
    pub endpoints: &'a Endpoints,
}

impl Probe<'_> {
    pub async fn fetch(&self, url: &Url) -> Result<Exchange, TransportFailure> {
        self.executor.get(url).await
    }

    /// Issue one request and evaluate it. Transport failures become a failed outcome.
    pub async fn evaluate<F>(&self, url: Url, evaluate: F) -> Outcome
    where
        F: FnOnce(&Exchange, &mut Checks),
    {
        match self.fetch(&url).await {
            Ok(exchange) => {
                let mut checks = Checks::new();
                evaluate(&exchange, &mut checks);
                Outcome::evaluated(checks, &exchange)
            }
            Err(failure) => Outcome::transport_failure(&failure),
        }
    }

    pub fn resource(&self, service: Service) -> Option<&Resource> {
        self.context.default_resource(service)
    }

    /// Resource anchoring a dimension of `kind`, with a value drawn for this request.
    pub fn sample(&self, service: Service, kind: DimensionKind) -> Option<Sampled<'_>> {
        let fixture = self.context.dimension(service, kind)?;
        let value = self.sampler.pick_value(fixture.axis()?)?;
        Some(Sampled {
            resource: &fixture.resource,
            dimension: &fixture.dimension,
            value,
        })
    }
}

/// A dimension value drawn for a single request.
#[derive(Debug, Clone)]
pub struct Sampled<'a> {
    pub resource: &'a Resource,
    pub dimension: &'a str,
    pub value: String,
}

#[derive(Clone, Copy)]
pub struct TestCase {
    pub id: &'static str,
    pub description: &'static str,
    /// Clause of the standard being exercised. Informational only.
    pub spec_reference: &'static str,
    pub category: &'static str,
    pub run: TestFn,
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("spec_reference", &self.spec_reference)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Category {
    pub id: &'static str,
    pub title: &'static str,
    pub tests: Vec<TestCase>,
}

impl Category {
    pub fn new(id: &'static str, title: &'static str, tests: Vec<TestCase>) -> Self {
        Self { id, title, tests }
    }
}

/// Builds a [`TestCase`] around an `async fn(&Probe<'_>) -> Outcome`.
macro_rules! test_case {
    ($category:expr, $id:literal, $reference:literal, $description:literal, $run:path) => {
        $crate::catalog::TestCase {
            id: $id,
            description: $description,
            spec_reference: $reference,
            category: $category,
            run: |probe| ::futures::FutureExt::boxed($run(probe)),
        }
    };
}
pub(crate) use test_case;

#[derive(Debug, Clone)]
pub struct Catalog {
    categories: Vec<Category>,
}

impl Catalog {
    /// Test ids must be unique across the whole catalog, category ids across categories.
    pub fn new(categories: Vec<Category>) -> ProbeResult<Self> {
        let mut seen = HashSet::new();
        let mut seen_categories = HashSet::new();
        for category in &categories {
            if !seen_categories.insert(category.id) {
                return Err(ProbeError::DuplicateTestId(category.id.to_string()));
            }
            for case in &category.tests {
                if !seen.insert(case.id) {
                    return Err(ProbeError::DuplicateTestId(case.id.to_string()));
                }
            }
        }
        Ok(Self { categories })
    }

    pub fn builtin() -> ProbeResult<Self> {
        Self::new(vec![wms::category(), wmts::category(), edr::category()])
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn find(&self, test_id: &str) -> Option<(&Category, &TestCase)> {
        self.categories.iter().find_map(|category| {
            category
                .tests
                .iter()
                .find(|case| case.id == test_id)
                .map(|case| (category, case))
        })
    }

    pub fn len(&self) -> usize {
        self.categories.iter().map(|c| c.tests.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered key-value-pair request. Setting an existing key replaces its value in place.
#[derive(Debug, Clone)]
pub(crate) struct Kvp {
    params: Vec<(String, String)>,
}

impl Kvp {
    pub(crate) fn new(params: &[(&str, &str)]) -> Self {
        Self {
            params: params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    pub(crate) fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        match self.params.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
        self
    }

    pub(crate) fn remove(mut self, key: &str) -> Self {
        self.params.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        self
    }

    pub(crate) fn url(&self, endpoints: &Endpoints, service: Service) -> Url {
        let pairs: Vec<(&str, &str)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        endpoints.kvp(service, &pairs)
    }
}

/// HTTP 400 carrying the given exception code.
pub(crate) fn rejected_with(x: &Exchange, code: &str) -> bool {
    x.status.as_u16() == 400 && exception_code(x).as_deref() == Some(code)
}

/// HTTP 200 with an image body.
pub(crate) fn served_image(x: &Exchange) -> bool {
    x.status.is_success() && x.has_content_type("image/")
}

/// `minx,miny,maxx,maxy` with the given axis order.
pub(crate) fn bbox_param(rect: &geo::Rect<f64>, lat_lon: bool) -> String {
    let (min, max) = (rect.min(), rect.max());
    if lat_lon {
        format!("{},{},{},{}", min.y, min.x, max.y, max.x)
    } else {
        format!("{},{},{},{}", min.x, min.y, max.x, max.y)
    }
}
