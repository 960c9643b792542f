//! The migration command.

use miette::{IntoDiagnostic, Result};
use npm_migrate_core::{
    concurrency_from_env, HttpRegistry, MigrateConfig, MigrationObserver, MigrationResult,
    Migrator, PackageSpec, RegistrySide, VersionOutcome,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Width the package column is padded to in the text summary.
const NAME_COLUMN: usize = 80;

pub struct MigrateArgs<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub packages: &'a [String],
    pub concurrency: Option<usize>,
    pub staging_dir: Option<PathBuf>,
    pub json: bool,
}

/// Logs progress as the engine reports it.
struct ProgressLog;

impl MigrationObserver for ProgressLog {
    fn on_metadata_fetched(&self, name: &str, side: RegistrySide, ok: bool) {
        debug!(name = %name, side = side.as_str(), ok, "Metadata");
    }

    fn on_version_resolved(&self, name: &str, version: &str, outcome: VersionOutcome) {
        if outcome != VersionOutcome::Skipped {
            info!("{name}@{version} {}", outcome.as_str());
        }
    }

    fn on_package_complete(&self, name: &str) {
        debug!(name = %name, "Package complete");
    }
}

pub fn run(cwd: &Path, args: &MigrateArgs<'_>) -> Result<()> {
    let mut config = MigrateConfig::new(args.from, args.to, args.packages).into_diagnostic()?
        .with_concurrency(args.concurrency.unwrap_or_else(concurrency_from_env));
    if let Some(dir) = &args.staging_dir {
        config = config.with_staging_dir(dir.clone());
    }

    let client = Arc::new(HttpRegistry::from_npmrc(cwd).into_diagnostic()?);
    info!(
        from = %config.from,
        to = %config.to,
        packages = config.packages.len(),
        concurrency = config.concurrency,
        "Starting migration"
    );

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let migrator = Migrator::new(client, config).with_observer(Arc::new(ProgressLog));
    let result = runtime.block_on(migrator.run()).into_diagnostic()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
    } else {
        print!("{}", render_summary(&result, &migrator.config().packages));
    }
    Ok(())
}

/// One line per version, grouped by package in request order.
fn render_summary(result: &MigrationResult, packages: &[PackageSpec]) -> String {
    let mut seen = Vec::new();
    let mut out = String::new();

    for spec in packages {
        if seen.contains(&spec.name.as_str()) {
            continue;
        }
        seen.push(spec.name.as_str());

        let package = result.for_package(&spec.name);
        for (items, status) in [
            (&package.skipped, VersionOutcome::Skipped),
            (&package.succeeded, VersionOutcome::Succeeded),
            (&package.failed, VersionOutcome::Failed),
        ] {
            for item in items {
                out.push_str(&format!("{item:<width$}\t{}\n", status.as_str(), width = NAME_COLUMN));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(items: &[&str]) -> Vec<PackageSpec> {
        items.iter().map(|s| PackageSpec::parse(s).unwrap()).collect()
    }

    #[test]
    fn test_summary_groups_by_package() {
        let result = MigrationResult {
            succeeded: vec!["a@1.0.1".into(), "b@2.0.0".into()],
            failed: vec!["a@1.0.2".into()],
            skipped: vec!["a@1.0.0".into()],
        };

        let summary = render_summary(&result, &specs(&["b", "a@1.0.1", "a"]));
        let lines: Vec<(&str, &str)> = summary
            .lines()
            .map(|l| {
                let (name, status) = l.split_once('\t').unwrap();
                assert_eq!(name.len(), NAME_COLUMN);
                (name.trim_end(), status)
            })
            .collect();

        assert_eq!(
            lines,
            vec![
                ("b@2.0.0", "succeeded"),
                ("a@1.0.0", "skipped"),
                ("a@1.0.1", "succeeded"),
                ("a@1.0.2", "failed"),
            ]
        );
    }

    #[test]
    fn test_summary_empty() {
        assert!(render_summary(&MigrationResult::default(), &specs(&["a"])).is_empty());
    }
}
