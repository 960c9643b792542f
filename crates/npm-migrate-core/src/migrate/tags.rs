//! Distribution-tag reconciliation.
//!
//! A registry moves `latest` on its own when a publish does not name a tag,
//! and concurrent out-of-order publishes make the result arbitrary. Every
//! publish therefore names a tag: the version's source tag if it has one,
//! otherwise a scratch tag no source tag uses. When the package is done the
//! scratch tag is dropped and the source tags, `latest` last, are pointed
//! at their versions.

use super::pool::IoPool;
use crate::error::MigrateError;
use crate::pkg::{PackageDescriptor, RegistryClient};
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};
use url::Url;

pub const LATEST_TAG: &str = "latest";

/// Attempts at finding a free scratch tag, the bare base name included.
pub const TEMP_TAG_ATTEMPTS: u32 = 16;

/// Version → tag, reversed from a package's source dist-tags.
///
/// When several tags share a version, `latest` wins, then the
/// alphabetically first tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistTagMap {
    by_version: HashMap<String, String>,
}

impl DistTagMap {
    #[must_use]
    pub fn from_tags(tags: &BTreeMap<String, String>) -> Self {
        let mut by_version: HashMap<String, String> = HashMap::new();
        for (tag, version) in tags {
            if tag == LATEST_TAG || !by_version.contains_key(version) {
                by_version.insert(version.clone(), tag.clone());
            }
        }
        Self { by_version }
    }

    #[must_use]
    pub fn tag_for(&self, version: &str) -> Option<&str> {
        self.by_version.get(version).map(String::as_str)
    }
}

/// Pick a scratch tag name not in `tags`.
///
/// Tries `base`, then `base-<8 hex>` with random suffixes.
///
/// # Errors
/// Returns [`MigrateError::TempTagExhausted`] after [`TEMP_TAG_ATTEMPTS`] collisions.
pub fn choose_temp_tag(base: &str, tags: &BTreeMap<String, String>) -> Result<String, MigrateError> {
    let mut rng = rand::thread_rng();
    choose_temp_tag_with(base, |t| tags.contains_key(t), || {
        format!("{base}-{:08x}", rng.gen::<u32>())
    })
}

fn choose_temp_tag_with(
    base: &str,
    taken: impl Fn(&str) -> bool,
    mut next_candidate: impl FnMut() -> String,
) -> Result<String, MigrateError> {
    let mut candidate = base.to_string();
    for _ in 0..TEMP_TAG_ATTEMPTS {
        if !taken(&candidate) {
            return Ok(candidate);
        }
        candidate = next_candidate();
    }
    Err(MigrateError::TempTagExhausted {
        base: base.to_string(),
        attempts: TEMP_TAG_ATTEMPTS,
    })
}

/// Tag decisions for one package.
#[derive(Debug, Clone)]
pub struct TagPlan {
    source_tags: BTreeMap<String, String>,
    by_version: DistTagMap,
    temp_tag: String,
}

/// What happened to one version's publish, as the reconciler needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAttempt {
    pub version: String,
    pub tag: String,
    pub succeeded: bool,
}

impl TagPlan {
    /// Plan tags for `source`.
    ///
    /// # Errors
    /// Returns an error if no scratch tag name is free.
    pub fn new(source: &PackageDescriptor, temp_tag_base: &str) -> Result<Self, MigrateError> {
        Ok(Self {
            temp_tag: choose_temp_tag(temp_tag_base, &source.dist_tags)?,
            by_version: DistTagMap::from_tags(&source.dist_tags),
            source_tags: source.dist_tags.clone(),
        })
    }

    /// The tag to publish `version` under.
    #[must_use]
    pub fn publish_tag(&self, version: &str) -> &str {
        self.by_version.tag_for(version).unwrap_or(&self.temp_tag)
    }

    #[must_use]
    pub fn temp_tag(&self) -> &str {
        &self.temp_tag
    }

    /// Tags to (re-)point after transfer, `latest` last.
    ///
    /// A tag is included when its version is present at the destination and
    /// no successful publish already set it; `latest` is always included
    /// when its version is present.
    #[must_use]
    pub fn repoint_targets(
        &self,
        attempts: &[PublishAttempt],
        present: impl Fn(&str) -> bool,
    ) -> Vec<(String, String)> {
        let already_set: HashSet<(&str, &str)> = attempts
            .iter()
            .filter(|a| a.succeeded)
            .map(|a| (a.tag.as_str(), a.version.as_str()))
            .collect();

        let mut targets: Vec<(String, String)> = self
            .source_tags
            .iter()
            .filter(|(tag, _)| tag.as_str() != LATEST_TAG)
            .filter(|(tag, version)| {
                present(version) && !already_set.contains(&(tag.as_str(), version.as_str()))
            })
            .map(|(tag, version)| (tag.clone(), version.clone()))
            .collect();

        if let Some(latest) = self.source_tags.get(LATEST_TAG) {
            if present(latest) {
                targets.push((LATEST_TAG.to_string(), latest.clone()));
            }
        }

        targets
    }
}

/// Remove the scratch tag if any publish used it, then re-point tags.
///
/// Every operation is best-effort: failures are logged and ignored.
pub async fn reconcile(
    client: &dyn RegistryClient,
    pool: &IoPool,
    registry: &Url,
    name: &str,
    plan: &TagPlan,
    attempts: &[PublishAttempt],
    present: impl Fn(&str) -> bool,
) {
    if attempts.iter().any(|a| a.tag == plan.temp_tag()) {
        let tag = plan.temp_tag();
        match pool.run(client.remove_dist_tag(registry, name, tag)).await {
            Ok(()) => debug!(name = %name, tag = %tag, "Removed temporary tag"),
            Err(e) => debug!(name = %name, tag = %tag, error = %e, "Temporary tag not removed"),
        }
    }

    for (tag, version) in plan.repoint_targets(attempts, present) {
        let spec = format!("{name}@{version}");
        match pool.run(client.add_dist_tag(registry, &spec, &tag)).await {
            Ok(()) => debug!(spec = %spec, tag = %tag, "Pointed tag"),
            Err(e) => warn!(spec = %spec, tag = %tag, error = %e, "Failed to point tag"),
        }
    }
}
