//! The migration scheduler.
//!
//! Packages run concurrently, and so do the versions inside a package. All
//! of it shares one [`IoPool`], so the configured concurrency bounds the
//! total number of in-flight registry calls, file writes and transforms.

use super::diff::{build_plan, MigrationPlan};
use super::observer::{MigrationObserver, NoopObserver};
use super::pool::IoPool;
use super::result::{MigrationResult, ResultCollector, VersionOutcome};
use super::tags::{reconcile, PublishAttempt, TagPlan};
use crate::config::MigrateConfig;
use crate::error::MigrateError;
use crate::pkg::spec::url_encoded_name;
use crate::pkg::{
    retarget_registry, tarball_file_name, PackageDescriptor, RegistryClient, VersionDescriptor,
};
use futures::future::join_all;
use npm_migrate_util::fs::{atomic_write, recreate_dir};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Runs one migration.
pub struct Migrator {
    client: Arc<dyn RegistryClient>,
    observer: Arc<dyn MigrationObserver>,
    pool: IoPool,
    config: MigrateConfig,
}

/// One version's pipeline, as far as it got.
struct VersionAttempt {
    version: String,
    /// Tag passed to `publish`, if the pipeline got that far.
    published_under: Option<String>,
    result: Result<(), MigrateError>,
}

/// Keeps a per-run temporary staging root alive for the run.
enum StagingRoot {
    Temporary(TempDir),
    Configured(PathBuf),
}

impl StagingRoot {
    fn path(&self) -> &Path {
        match self {
            Self::Temporary(dir) => dir.path(),
            Self::Configured(path) => path,
        }
    }
}

impl Migrator {
    #[must_use]
    pub fn new(client: Arc<dyn RegistryClient>, config: MigrateConfig) -> Self {
        Self {
            client,
            observer: Arc::new(NoopObserver),
            pool: IoPool::new(config.concurrency),
            config,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn MigrationObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    /// Migrate every configured package.
    ///
    /// Per-version failures are recorded in the result, never returned.
    ///
    /// # Errors
    /// Returns [`MigrateError::Staging`] if the staging root cannot be created.
    pub async fn run(&self) -> Result<MigrationResult, MigrateError> {
        let staging = self.staging_root()?;
        debug!(path = %staging.path().display(), "Staging root ready");

        self.preflight().await;

        let plan = build_plan(
            self.client.as_ref(),
            &self.pool,
            self.observer.as_ref(),
            &self.config.from,
            &self.config.to,
            &self.config.packages,
        )
        .await;

        let collector = ResultCollector::new();
        join_all(
            plan.packages
                .iter()
                .map(|package| self.sync_package(package, &plan, staging.path(), &collector)),
        )
        .await;

        let mut result = collector.into_result();
        result.sort();
        info!(
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            "Migration finished"
        );
        Ok(result)
    }

    fn staging_root(&self) -> Result<StagingRoot, MigrateError> {
        match &self.config.staging_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok(StagingRoot::Configured(dir.clone()))
            }
            None => Ok(StagingRoot::Temporary(
                tempfile::Builder::new().prefix("npm-migrate-").tempdir()?,
            )),
        }
    }

    async fn preflight(&self) {
        let to = &self.config.to;
        match self.pool.run(self.client.who_am_i(to)).await {
            Ok(user) => info!(registry = %to, user = %user, "Authenticated to destination"),
            Err(e) => warn!(registry = %to, error = %e, "Destination whoami failed, publishes may be rejected"),
        }
    }

    fn resolve(&self, collector: &ResultCollector, name: &str, version: &str, outcome: VersionOutcome) {
        if collector.record(name, version, outcome) {
            self.observer.on_version_resolved(name, version, outcome);
        }
    }

    async fn sync_package(
        &self,
        package: &PackageDescriptor,
        plan: &MigrationPlan,
        staging_root: &Path,
        collector: &ResultCollector,
    ) {
        let name = package.name.as_str();
        let (to_transfer, present): (Vec<&String>, Vec<&String>) = package
            .versions
            .iter()
            .partition(|v| plan.requires_transfer(name, v));

        for version in &present {
            self.resolve(collector, name, version, VersionOutcome::Skipped);
        }

        if to_transfer.is_empty() {
            info!(name = %name, skipped = present.len(), "Package up to date");
            // Tags may still have drifted, or a tag call failed last run
            match TagPlan::new(package, &self.config.temp_tag_base) {
                Ok(tags) => {
                    reconcile(
                        self.client.as_ref(),
                        &self.pool,
                        &self.config.to,
                        name,
                        &tags,
                        &[],
                        |version| !plan.requires_transfer(name, version),
                    )
                    .await;
                }
                Err(e) => warn!(name = %name, error = %e, "Cannot plan tags, leaving them as they are"),
            }
            self.observer.on_package_complete(name);
            return;
        }

        info!(
            name = %name,
            transfer = to_transfer.len(),
            skipped = present.len(),
            "Migrating package"
        );

        let tags = match TagPlan::new(package, &self.config.temp_tag_base) {
            Ok(tags) => tags,
            Err(e) => {
                warn!(name = %name, error = %e, "Cannot plan tags, failing package");
                self.fail_all(collector, name, &to_transfer);
                return;
            }
        };

        let package_dir = staging_root.join(url_encoded_name(name));
        let dir = package_dir.clone();
        if let Err(e) = self.pool.run_blocking(move || recreate_dir(&dir)).await {
            let e = MigrateError::from(e);
            warn!(name = %name, path = %package_dir.display(), error = %e, "Cannot prepare staging directory");
            self.fail_all(collector, name, &to_transfer);
            return;
        }

        let attempts = join_all(to_transfer.iter().map(|version| {
            self.transfer_version(name, version, tags.publish_tag(version), &package_dir)
        }))
        .await;

        let mut succeeded = HashSet::new();
        let mut publishes = Vec::new();
        for attempt in attempts {
            match &attempt.result {
                Ok(()) => {
                    debug!(name = %name, version = %attempt.version, "Version migrated");
                    succeeded.insert(attempt.version.clone());
                    self.resolve(collector, name, &attempt.version, VersionOutcome::Succeeded);
                }
                Err(e) => {
                    warn!(name = %name, version = %attempt.version, code = e.code(), error = %e, "Version failed");
                    self.resolve(collector, name, &attempt.version, VersionOutcome::Failed);
                }
            }
            if let Some(tag) = attempt.published_under {
                publishes.push(PublishAttempt {
                    version: attempt.version,
                    tag,
                    succeeded: attempt.result.is_ok(),
                });
            }
        }

        reconcile(
            self.client.as_ref(),
            &self.pool,
            &self.config.to,
            name,
            &tags,
            &publishes,
            |version| succeeded.contains(version) || !plan.requires_transfer(name, version),
        )
        .await;

        self.observer.on_package_complete(name);
    }

    fn fail_all(&self, collector: &ResultCollector, name: &str, versions: &[&String]) {
        for version in versions {
            self.resolve(collector, name, version, VersionOutcome::Failed);
        }
        self.observer.on_package_complete(name);
    }

    async fn transfer_version(
        &self,
        name: &str,
        version: &str,
        tag: &str,
        package_dir: &Path,
    ) -> VersionAttempt {
        let archive = match self.stage_version(name, version, package_dir).await {
            Ok(archive) => archive,
            Err(e) => {
                return VersionAttempt {
                    version: version.to_string(),
                    published_under: None,
                    result: Err(e),
                }
            }
        };

        debug!(name = %name, version = %version, tag = %tag, "Publishing");
        let result = self
            .pool
            .run(self.client.publish(&self.config.to, tag, &archive))
            .await;

        VersionAttempt {
            version: version.to_string(),
            published_under: Some(tag.to_string()),
            result,
        }
    }

    /// Download, retarget and write one version's tarball; returns its path.
    async fn stage_version(
        &self,
        name: &str,
        version: &str,
        package_dir: &Path,
    ) -> Result<PathBuf, MigrateError> {
        let spec = format!("{name}@{version}");
        let doc = self
            .pool
            .run(self.client.inspect(&self.config.from, name, Some(version)))
            .await?;
        let descriptor = VersionDescriptor::from_version_doc(&spec, &doc)?;

        debug!(name = %name, version = %version, url = %descriptor.tarball_url, "Downloading tarball");
        let tarball = self
            .pool
            .run(self.client.fetch_tarball(&descriptor.tarball_url))
            .await?;
        debug!(name = %name, version = %version, size = tarball.len(), "Downloaded tarball");

        let tarball = if descriptor.may_need_retarget(&self.config.to) {
            let to = self.config.to.clone();
            let transformed = self
                .pool
                .run_blocking(move || retarget_registry(tarball, &to))
                .await?;
            debug!(name = %name, version = %version, rewritten = transformed.is_rewritten(), "Retargeted manifest");
            transformed.into_bytes()
        } else {
            tarball
        };

        let path = package_dir.join(tarball_file_name(&descriptor.tarball_url, name, version));
        let target = path.clone();
        self.pool
            .run_blocking(move || atomic_write(&target, &tarball))
            .await?;

        Ok(path)
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
