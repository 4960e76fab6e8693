//! Per-test outcomes and the counts derived from them.

use indexmap::IndexMap;
use serde::Serialize;
use std::time::Duration;

use crate::assertions::{Check, Checks};
use crate::catalog::Catalog;
use crate::executor::{Exchange, TransportFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Running,
    Pass,
    Fail,
    Skip,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Pass | Status::Fail | Status::Skip)
    }

    /// Outcomes only move pending → running → {pass, fail, skip}.
    pub fn can_transition_to(&self, next: Status) -> bool {
        match self {
            Status::Pending => next == Status::Running,
            Status::Running => next.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub status: Status,
    pub checks: Vec<Check>,
    pub error_message: Option<String>,
    pub last_request_url: Option<String>,
    pub elapsed_ms: u64,
    pub attempt_count: u32,
}

impl Default for Outcome {
    fn default() -> Self {
        Self::pending()
    }
}

impl Outcome {
    pub fn pending() -> Self {
        Self {
            status: Status::Pending,
            checks: Vec::new(),
            error_message: None,
            last_request_url: None,
            elapsed_ms: 0,
            attempt_count: 0,
        }
    }

    /// Precondition not met; no request was issued.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Skip,
            error_message: Some(reason.into()),
            ..Self::pending()
        }
    }

    /// Failure raised by the test body itself rather than by the server.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Status::Fail,
            error_message: Some(message.into()),
            ..Self::pending()
        }
    }

    pub fn transport_failure(failure: &TransportFailure) -> Self {
        Self {
            status: Status::Fail,
            error_message: Some(failure.message.clone()),
            last_request_url: Some(failure.url.to_string()),
            elapsed_ms: failure.elapsed.as_millis() as u64,
            attempt_count: failure.attempts,
            ..Self::pending()
        }
    }

    /// Pass when every check passed; the exchange supplies URL and attempt count.
    pub fn evaluated(checks: Checks, exchange: &Exchange) -> Self {
        let passed = checks.all_passed();
        let error_message = if passed {
            None
        } else {
            let failed: Vec<&str> = checks.failed().map(|c| c.name.as_str()).collect();
            Some(if failed.is_empty() {
                "no checks were recorded".to_string()
            } else {
                format!("failed checks: {}", failed.join(", "))
            })
        };
        Self {
            status: if passed { Status::Pass } else { Status::Fail },
            checks: checks.into_vec(),
            error_message,
            last_request_url: Some(exchange.url.to_string()),
            elapsed_ms: exchange.elapsed.as_millis() as u64,
            attempt_count: exchange.attempts,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = elapsed.as_millis() as u64;
        self
    }
}

/// Counts over a set of outcomes. Running outcomes count as pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub pass: usize,
    pub fail: usize,
    pub skip: usize,
    pub pending: usize,
    pub total: usize,
    /// `pass + fail`; skipped tests are not part of the pass-rate denominator.
    pub tested: usize,
}

impl Counts {
    fn record(&mut self, status: Status) {
        match status {
            Status::Pass => self.pass += 1,
            Status::Fail => self.fail += 1,
            Status::Skip => self.skip += 1,
            Status::Pending | Status::Running => self.pending += 1,
        }
        self.total += 1;
        self.tested = self.pass + self.fail;
    }

    fn add(&mut self, other: &Counts) {
        self.pass += other.pass;
        self.fail += other.fail;
        self.skip += other.skip;
        self.pending += other.pending;
        self.total += other.total;
        self.tested += other.tested;
    }

    pub fn pass_rate(&self) -> Option<f64> {
        (self.tested > 0).then(|| self.pass as f64 / self.tested as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub categories: IndexMap<&'static str, Counts>,
    pub global: Counts,
}

/// Outcomes keyed by category then test id, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    categories: IndexMap<&'static str, IndexMap<&'static str, Outcome>>,
}

impl ResultStore {
    pub fn new(catalog: &Catalog) -> Self {
        let categories = catalog
            .categories()
            .iter()
            .map(|category| {
                let tests = category
                    .tests
                    .iter()
                    .map(|case| (case.id, Outcome::pending()))
                    .collect();
                (category.id, tests)
            })
            .collect();
        Self { categories }
    }

    pub fn outcome(&self, test_id: &str) -> Option<&Outcome> {
        self.categories.values().find_map(|tests| tests.get(test_id))
    }

    fn slot(&mut self, category: &str, test_id: &str) -> Option<&mut Outcome> {
        self.categories.get_mut(category)?.get_mut(test_id)
    }

    pub fn mark_running(&mut self, category: &str, test_id: &str) -> bool {
        let Some(slot) = self.slot(category, test_id) else {
            return false;
        };
        if !slot.status.can_transition_to(Status::Running) {
            tracing::warn!(test = test_id, from = ?slot.status, "Rejected transition to running");
            return false;
        }
        slot.status = Status::Running;
        true
    }

    /// Store a terminal outcome for a running test.
    pub fn complete(&mut self, category: &str, test_id: &str, outcome: Outcome) -> bool {
        let Some(slot) = self.slot(category, test_id) else {
            return false;
        };
        if !slot.status.can_transition_to(outcome.status) {
            tracing::warn!(
                test = test_id,
                from = ?slot.status,
                to = ?outcome.status,
                "Rejected outcome transition"
            );
            return false;
        }
        *slot = outcome;
        true
    }

    /// Return one outcome to pending so the test can be run again.
    pub fn reset(&mut self, category: &str, test_id: &str) {
        if let Some(slot) = self.slot(category, test_id) {
            *slot = Outcome::pending();
        }
    }

    /// Reset every outcome of one category to pending.
    pub fn reset_category(&mut self, category: &str) {
        if let Some(tests) = self.categories.get_mut(category) {
            for outcome in tests.values_mut() {
                *outcome = Outcome::pending();
            }
        }
    }

    /// Reset every outcome to pending. Idempotent.
    pub fn clear(&mut self) {
        for tests in self.categories.values_mut() {
            for outcome in tests.values_mut() {
                *outcome = Outcome::pending();
            }
        }
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for (category, tests) in &self.categories {
            let mut counts = Counts::default();
            for outcome in tests.values() {
                counts.record(outcome.status);
            }
            summary.global.add(&counts);
            summary.categories.insert(category, counts);
        }
        summary
    }
}
