//! Migration outcome aggregation.

use crate::pkg::split_spec;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Terminal state of one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionOutcome {
    Succeeded,
    Failed,
    Skipped,
}

impl VersionOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Final result of a run. Entries are `name@version`.
///
/// Order within each list reflects completion order and carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationResult {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

impl MigrationResult {
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.skipped.len()
    }

    /// True if no version failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// The entries belonging to package `name`, per outcome.
    #[must_use]
    pub fn for_package(&self, name: &str) -> MigrationResult {
        let pick = |items: &[String]| {
            items
                .iter()
                .filter(|item| split_spec(item).is_some_and(|(n, _)| n == name))
                .cloned()
                .collect()
        };
        MigrationResult {
            succeeded: pick(&self.succeeded),
            failed: pick(&self.failed),
            skipped: pick(&self.skipped),
        }
    }

    /// Sort every list, for stable display.
    pub fn sort(&mut self) {
        self.succeeded.sort();
        self.failed.sort();
        self.skipped.sort();
    }
}

#[derive(Debug, Default)]
struct Collected {
    result: MigrationResult,
    seen: HashSet<String>,
}

/// Append-only, shareable [`MigrationResult`] builder.
#[derive(Debug, Default)]
pub struct ResultCollector {
    inner: Mutex<Collected>,
}

impl ResultCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name@version` under `outcome`.
    ///
    /// Returns false (and records nothing) if the version already has an outcome.
    pub fn record(&self, name: &str, version: &str, outcome: VersionOutcome) -> bool {
        let key = format!("{name}@{version}");
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.seen.insert(key.clone()) {
            return false;
        }
        let list = match outcome {
            VersionOutcome::Succeeded => &mut inner.result.succeeded,
            VersionOutcome::Failed => &mut inner.result.failed,
            VersionOutcome::Skipped => &mut inner.result.skipped,
        };
        list.push(key);
        true
    }

    #[must_use]
    pub fn into_result(self) -> MigrationResult {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .result
    }
}
