//! Run orchestration.
//!
//! A [`Session`] owns everything a run needs: the catalog, the current execution
//! context, the result store and the busy flag that keeps runs and capabilities
//! reloads mutually exclusive. Tests run strictly one after another.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::capabilities::{CapabilitiesSource, HttpCapabilities, load_all};
use crate::catalog::{Catalog, Category, Probe, TestCase};
use crate::config::Config;
use crate::error::{ProbeError, ProbeResult};
use crate::executor::RequestExecutor;
use crate::fixtures::{ExecutionContext, Sampler};
use crate::report::Report;
use crate::results::{Outcome, ResultStore, Summary};
use crate::service::Endpoints;

/// Releases the busy flag when dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Session {
    config: Arc<Config>,
    endpoints: Endpoints,
    executor: Arc<RequestExecutor>,
    source: Box<dyn CapabilitiesSource>,
    catalog: Catalog,
    context: RwLock<Arc<ExecutionContext>>,
    results: Mutex<ResultStore>,
    sampler: Sampler,
    test_delay: Duration,
    category_delay: Duration,
    busy: AtomicBool,
    summary: watch::Sender<Summary>,
}

impl Session {
    /// Session over the builtin catalog, fetching capabilities over HTTP.
    pub fn new(config: Arc<Config>) -> ProbeResult<Self> {
        let executor = Arc::new(RequestExecutor::new(&config)?);
        let endpoints = Endpoints::from_config(&config)?;
        let source = Box::new(HttpCapabilities::new(executor.clone(), endpoints.clone()));
        Self::with_parts(config, executor, Catalog::builtin()?, source)
    }

    pub fn with_parts(
        config: Arc<Config>,
        executor: Arc<RequestExecutor>,
        catalog: Catalog,
        source: Box<dyn CapabilitiesSource>,
    ) -> ProbeResult<Self> {
        let endpoints = Endpoints::from_config(&config)?;
        let results = ResultStore::new(&catalog);
        let (summary, _) = watch::channel(results.summary());
        let sampler = Sampler::new(config.seed);

        Ok(Self {
            endpoints,
            executor,
            source,
            catalog,
            context: RwLock::new(Arc::new(ExecutionContext::empty())),
            results: Mutex::new(results),
            sampler,
            test_delay: config.schedule.test_delay(),
            category_delay: config.schedule.category_delay(),
            busy: AtomicBool::new(false),
            summary,
            config,
        })
    }

    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn context(&self) -> Arc<ExecutionContext> {
        self.context
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Observe summaries as they are recomputed after every test.
    pub fn subscribe(&self) -> watch::Receiver<Summary> {
        self.summary.subscribe()
    }

    pub fn summary(&self) -> Summary {
        self.results().summary()
    }

    pub fn outcome(&self, test_id: &str) -> Option<Outcome> {
        self.results().outcome(test_id).cloned()
    }

    pub fn report(&self) -> Report {
        Report::build(&self.config.base_url, &self.catalog, &self.results())
    }

    fn results(&self) -> MutexGuard<'_, ResultStore> {
        self.results.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn acquire(&self) -> ProbeResult<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ProbeError::Busy)?;
        Ok(BusyGuard(&self.busy))
    }

    /// Apply a change to the result store and publish the recomputed summary.
    fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut ResultStore),
    {
        let summary = {
            let mut results = self.results();
            change(&mut results);
            results.summary()
        };
        self.summary.send_replace(summary);
    }

    /// Fetch capabilities for every service and rebuild the execution context.
    ///
    /// Previous outcomes refer to the old context and are reset to pending.
    pub async fn reload_capabilities(&self) -> ProbeResult<usize> {
        let _guard = self.acquire()?;
        let loaded = load_all(self.source.as_ref()).await;
        let context = ExecutionContext::build(loaded);
        let count = context.resource_count();
        self.install(context);
        tracing::info!(resources = count, "Execution context rebuilt");
        Ok(count)
    }

    /// Replace the execution context directly, resetting every outcome.
    pub fn set_context(&self, context: ExecutionContext) -> ProbeResult<()> {
        let _guard = self.acquire()?;
        self.install(context);
        Ok(())
    }

    fn install(&self, context: ExecutionContext) {
        *self
            .context
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(context);
        self.update(ResultStore::clear);
    }

    /// Reset every outcome to pending. The catalog and context are kept.
    pub fn clear(&self) -> ProbeResult<()> {
        let _guard = self.acquire()?;
        self.update(ResultStore::clear);
        Ok(())
    }

    pub async fn run_test(&self, test_id: &str) -> ProbeResult<Outcome> {
        let _guard = self.acquire()?;
        let (category, case) = self
            .catalog
            .find(test_id)
            .ok_or_else(|| ProbeError::UnknownTest(test_id.to_string()))?;
        let context = self.context();
        Ok(self.execute(&context, category, case).await)
    }

    pub async fn run_category(&self, category_id: &str) -> ProbeResult<Summary> {
        let _guard = self.acquire()?;
        let category = self
            .catalog
            .category(category_id)
            .ok_or_else(|| ProbeError::UnknownCategory(category_id.to_string()))?;
        let context = self.context();
        // Reset up front so counts only move forward during the run
        self.update(|results| results.reset_category(category.id));
        self.execute_category(&context, category).await;
        Ok(self.summary())
    }

    pub async fn run_all(&self) -> ProbeResult<Summary> {
        let _guard = self.acquire()?;
        let context = self.context();
        self.update(ResultStore::clear);
        let started = Instant::now();
        tracing::info!(
            tests = self.catalog.len(),
            resources = context.resource_count(),
            "Starting run"
        );

        for (i, category) in self.catalog.categories().iter().enumerate() {
            if i > 0 && !self.category_delay.is_zero() {
                tokio::time::sleep(self.category_delay).await;
            }
            self.execute_category(&context, category).await;
        }

        let summary = self.summary();
        tracing::info!(
            pass = summary.global.pass,
            fail = summary.global.fail,
            skip = summary.global.skip,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run complete"
        );
        Ok(summary)
    }

    async fn execute_category(&self, context: &ExecutionContext, category: &Category) {
        tracing::info!(category = category.id, tests = category.tests.len(), "Running category");
        for (i, case) in category.tests.iter().enumerate() {
            if i > 0 && !self.test_delay.is_zero() {
                tokio::time::sleep(self.test_delay).await;
            }
            self.execute(context, category, case).await;
        }
        if let Some(counts) = self.summary().categories.get(category.id) {
            tracing::info!(
                category = category.id,
                pass = counts.pass,
                fail = counts.fail,
                skip = counts.skip,
                "Category complete"
            );
        }
    }

    async fn execute(&self, context: &ExecutionContext, category: &Category, case: &TestCase) -> Outcome {
        self.update(|results| {
            results.reset(category.id, case.id);
            results.mark_running(category.id, case.id);
        });

        let probe = Probe {
            context,
            executor: &self.executor,
            sampler: &self.sampler,
            endpoints: &self.endpoints,
        };
        let started = Instant::now();
        let outcome = match AssertUnwindSafe((case.run)(&probe)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::failed("test body panicked").with_elapsed(started.elapsed()),
        };

        tracing::debug!(
            test = case.id,
            status = ?outcome.status,
            attempts = outcome.attempt_count,
            elapsed_ms = outcome.elapsed_ms,
            "Test finished"
        );
        if let Some(message) = &outcome.error_message {
            tracing::debug!(test = case.id, %message, "Test detail");
        }

        self.update(|results| {
            results.complete(category.id, case.id, outcome.clone());
        });
        outcome
    }
}
