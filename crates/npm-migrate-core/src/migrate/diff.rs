//! Source/destination version diff.
//!
//! Fetches each requested package's descriptor from both registries once, at
//! the start of a run. Everything the scheduler decides later comes from the
//! [`MigrationPlan`] built here.

use super::observer::{MigrationObserver, RegistrySide};
use super::pool::IoPool;
use crate::error::MigrateError;
use crate::pkg::{PackageDescriptor, PackageSpec, RegistryClient};
use futures::future::join_all;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};
use url::Url;

/// `(name, version)` pairs already present at the destination.
///
/// Built once per run; never updated with versions published during the run.
#[derive(Debug, Clone, Default)]
pub struct ExistingVersionSet {
    keys: HashSet<String>,
}

impl ExistingVersionSet {
    /// Lookup key for a version.
    #[must_use]
    pub fn key(name: &str, version: &str) -> String {
        format!("{name}^{version}")
    }

    #[must_use]
    pub fn from_descriptors<'a>(descriptors: impl IntoIterator<Item = &'a PackageDescriptor>) -> Self {
        let keys = descriptors
            .into_iter()
            .flat_map(|d| d.versions.iter().map(move |v| Self::key(&d.name, v)))
            .collect();
        Self { keys }
    }

    #[must_use]
    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.keys.contains(&Self::key(name, version))
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}

/// What a run will look at.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    /// Source descriptors with their effective version sets, in request order.
    /// Packages whose source query failed are absent.
    pub packages: Vec<PackageDescriptor>,
    pub existing: ExistingVersionSet,
}

impl MigrationPlan {
    /// Whether `name@version` must be transferred.
    #[must_use]
    pub fn requires_transfer(&self, name: &str, version: &str) -> bool {
        !self.existing.contains(name, version)
    }
}

/// A package name with the versions asked for (`None` = every version).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Request {
    pub name: String,
    pub pins: Option<BTreeSet<String>>,
}

/// Merge identifiers naming the same package. A bare name wins over pins.
pub(crate) fn merge_requests(specs: &[PackageSpec]) -> Vec<Request> {
    let mut requests: Vec<Request> = Vec::new();

    for spec in specs {
        let idx = match requests.iter().position(|r| r.name == spec.name) {
            Some(idx) => idx,
            None => {
                requests.push(Request {
                    name: spec.name.clone(),
                    pins: Some(BTreeSet::new()),
                });
                requests.len() - 1
            }
        };
        let request = &mut requests[idx];

        match (&spec.version, &mut request.pins) {
            (Some(v), Some(pins)) => {
                pins.insert(v.clone());
            }
            (None, pins) => *pins = None,
            (Some(_), None) => {}
        }
    }

    requests
}

/// Query both registries for every requested package and build the plan.
pub async fn build_plan(
    client: &dyn RegistryClient,
    pool: &IoPool,
    observer: &dyn MigrationObserver,
    from: &Url,
    to: &Url,
    specs: &[PackageSpec],
) -> MigrationPlan {
    let requests = merge_requests(specs);

    let fetched = join_all(requests.iter().map(|request| async move {
        let (source, destination) = futures::join!(
            fetch_descriptor(client, pool, observer, from, &request.name, RegistrySide::Source),
            fetch_descriptor(client, pool, observer, to, &request.name, RegistrySide::Destination),
        );
        (request, source, destination)
    }))
    .await;

    let mut packages = Vec::with_capacity(fetched.len());
    let mut destinations = Vec::with_capacity(fetched.len());

    for (request, source, destination) in fetched {
        destinations.push(destination.unwrap_or_else(|e| {
            debug!(name = %request.name, error = %e, "Destination has no usable metadata, treating as absent");
            PackageDescriptor::absent(&request.name)
        }));

        let source = match source {
            Ok(source) => source,
            Err(e) => {
                warn!(name = %request.name, error = %e, "Source metadata query failed, skipping package");
                continue;
            }
        };

        let source = match &request.pins {
            None => source,
            Some(pins) => source.pinned(pins.clone()),
        };
        packages.push(source);
    }

    let existing = ExistingVersionSet::from_descriptors(&destinations);
    debug!(
        packages = packages.len(),
        existing = existing.len(),
        "Built migration plan"
    );

    MigrationPlan { packages, existing }
}

async fn fetch_descriptor(
    client: &dyn RegistryClient,
    pool: &IoPool,
    observer: &dyn MigrationObserver,
    registry: &Url,
    name: &str,
    side: RegistrySide,
) -> Result<PackageDescriptor, MigrateError> {
    let result = pool
        .run(client.inspect(registry, name, None))
        .await
        .and_then(|packument| PackageDescriptor::from_packument(name, &packument))
        .map(|mut descriptor| {
            // Keys must match the requested name even if the registry disagrees
            descriptor.name = name.to_string();
            descriptor
        });

    debug!(name = %name, side = side.as_str(), ok = result.is_ok(), "Fetched metadata");
    observer.on_metadata_fetched(name, side, result.is_ok());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(items: &[&str]) -> Vec<PackageSpec> {
        items.iter().map(|s| PackageSpec::parse(s).unwrap()).collect()
    }

    #[test]
    fn test_existing_version_set() {
        let desc = PackageDescriptor {
            name: "p".into(),
            versions: BTreeSet::from(["1.0.0".to_string()]),
            ..PackageDescriptor::default()
        };
        let set = ExistingVersionSet::from_descriptors([&desc]);
        assert!(set.contains("p", "1.0.0"));
        assert!(!set.contains("p", "1.1.0"));
        assert!(!set.contains("q", "1.0.0"));
        assert_eq!(ExistingVersionSet::key("p", "1.0.0"), "p^1.0.0");
    }

    #[test]
    fn test_merge_requests_pins_union() {
        let merged = merge_requests(&specs(&["p@1.0.0", "q", "p@1.1.0"]));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "p");
        assert_eq!(
            merged[0].pins,
            Some(BTreeSet::from(["1.0.0".to_string(), "1.1.0".to_string()]))
        );
        assert_eq!(merged[1].pins, None);
    }

    #[test]
    fn test_merge_requests_bare_name_wins() {
        let merged = merge_requests(&specs(&["p@1.0.0", "p", "p@2.0.0"]));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].pins, None);
    }
}
