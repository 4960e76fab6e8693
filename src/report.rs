//! Run reports: JSON for machines, plain text for terminals.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::ProbeResult;
use crate::results::{Counts, Outcome, ResultStore, Status};

#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    pub id: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub spec_reference: &'static str,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryReport {
    pub id: &'static str,
    pub title: &'static str,
    pub counts: Counts,
    pub pass_rate: Option<f64>,
    pub tests: Vec<TestRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub endpoint: String,
    pub categories: Vec<CategoryReport>,
    pub totals: Counts,
    pub pass_rate: Option<f64>,
}

impl Report {
    pub fn build(endpoint: &str, catalog: &Catalog, results: &ResultStore) -> Self {
        let summary = results.summary();
        let categories = catalog
            .categories()
            .iter()
            .map(|category| {
                let counts = summary.categories.get(category.id).copied().unwrap_or_default();
                let tests = category
                    .tests
                    .iter()
                    .map(|case| TestRecord {
                        id: case.id,
                        category: category.id,
                        description: case.description,
                        spec_reference: case.spec_reference,
                        outcome: results.outcome(case.id).cloned().unwrap_or_default(),
                    })
                    .collect();
                CategoryReport {
                    id: category.id,
                    title: category.title,
                    counts,
                    pass_rate: counts.pass_rate(),
                    tests,
                }
            })
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            endpoint: endpoint.to_string(),
            categories,
            totals: summary.global,
            pass_rate: summary.global.pass_rate(),
        }
    }

    pub fn to_json(&self) -> ProbeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn has_failures(&self) -> bool {
        self.totals.fail > 0
    }
}

fn rate(rate: Option<f64>) -> String {
    rate.map(|r| format!("{:.1}%", r * 100.0))
        .unwrap_or_else(|| "n/a".to_string())
}

fn label(status: Status) -> &'static str {
    match status {
        Status::Pending => "PEND",
        Status::Running => "RUN ",
        Status::Pass => "PASS",
        Status::Fail => "FAIL",
        Status::Skip => "SKIP",
    }
}

fn counts_line(counts: &Counts) -> String {
    format!(
        "{} pass, {} fail, {} skip, {} pending",
        counts.pass, counts.fail, counts.skip, counts.pending
    )
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "spatialprobe run {} at {}", self.run_id, self.generated_at.to_rfc3339())?;
        writeln!(f, "endpoint: {}", self.endpoint)?;

        for category in &self.categories {
            writeln!(f)?;
            writeln!(
                f,
                "[{}] {}: {} ({})",
                category.id,
                category.title,
                counts_line(&category.counts),
                rate(category.pass_rate)
            )?;
            for test in &category.tests {
                let outcome = &test.outcome;
                match outcome.status {
                    Status::Skip => writeln!(
                        f,
                        "  {} {}: {}",
                        label(outcome.status),
                        test.id,
                        outcome.error_message.as_deref().unwrap_or("skipped")
                    )?,
                    Status::Pending | Status::Running => {
                        writeln!(f, "  {} {}", label(outcome.status), test.id)?
                    }
                    Status::Pass | Status::Fail => writeln!(
                        f,
                        "  {} {} ({} ms, {} attempt{})",
                        label(outcome.status),
                        test.id,
                        outcome.elapsed_ms,
                        outcome.attempt_count,
                        if outcome.attempt_count == 1 { "" } else { "s" }
                    )?,
                }

                if outcome.status == Status::Fail {
                    for check in outcome.checks.iter().filter(|c| !c.passed) {
                        match &check.detail {
                            Some(detail) => writeln!(f, "       x {}: {}", check.name, detail)?,
                            None => writeln!(f, "       x {}", check.name)?,
                        }
                    }
                    if outcome.checks.is_empty() {
                        if let Some(message) = &outcome.error_message {
                            writeln!(f, "       {}", message)?;
                        }
                    }
                    if let Some(url) = &outcome.last_request_url {
                        writeln!(f, "       url: {}", url)?;
                    }
                }
            }
        }

        writeln!(f)?;
        write!(
            f,
            "total: {} of {} ({} pass rate)",
            counts_line(&self.totals),
            self.totals.total,
            rate(self.pass_rate)
        )
    }
}
