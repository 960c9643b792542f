use crate::error::MigrateError;
use crate::pkg::PackageSpec;
use std::path::PathBuf;
use url::Url;

/// Environment variable overriding the I/O pool capacity.
pub const CONCURRENCY_ENV: &str = "NPM_MIGRATE_CONCURRENCY";

/// Pool capacity when the environment does not say otherwise.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Base name of the scratch dist-tag used during transfer.
pub const DEFAULT_TEMP_TAG_BASE: &str = "migrate-tmp";

/// One migration run.
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    /// Source registry, normalized with a trailing slash.
    pub from: Url,

    /// Destination registry, normalized with a trailing slash.
    pub to: Url,

    /// Requested packages, in the order given.
    pub packages: Vec<PackageSpec>,

    /// Capacity of the shared I/O pool (at least 1).
    pub concurrency: usize,

    /// Staging root. `None` means a fresh temp dir for this run.
    pub staging_dir: Option<PathBuf>,

    pub temp_tag_base: String,
}

impl MigrateConfig {
    /// Create a config for the given registries and package identifiers.
    ///
    /// Concurrency comes from [`CONCURRENCY_ENV`].
    ///
    /// # Errors
    /// Returns an error if a registry URL or a package identifier is invalid.
    pub fn new<S: AsRef<str>>(from: &str, to: &str, packages: &[S]) -> Result<Self, MigrateError> {
        let packages = packages
            .iter()
            .map(|p| PackageSpec::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            from: normalize_registry_url(from)?,
            to: normalize_registry_url(to)?,
            packages,
            concurrency: concurrency_from_env(),
            staging_dir: None,
            temp_tag_base: DEFAULT_TEMP_TAG_BASE.to_string(),
        })
    }

    /// Set the pool capacity. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Stage tarballs under `dir` instead of a per-run temp dir.
    #[must_use]
    pub fn with_staging_dir(mut self, dir: PathBuf) -> Self {
        self.staging_dir = Some(dir);
        self
    }

    #[must_use]
    pub fn with_temp_tag_base(mut self, base: impl Into<String>) -> Self {
        self.temp_tag_base = base.into();
        self
    }
}

/// Read the pool capacity from [`CONCURRENCY_ENV`].
///
/// Absent or non-numeric falls back to [`DEFAULT_CONCURRENCY`]; numbers below 1 become 1.
#[must_use]
pub fn concurrency_from_env() -> usize {
    parse_concurrency(std::env::var(CONCURRENCY_ENV).ok().as_deref())
}

fn parse_concurrency(raw: Option<&str>) -> usize {
    match raw.map(str::trim).map(str::parse::<i64>) {
        Some(Ok(n)) if n < 1 => 1,
        Some(Ok(n)) => usize::try_from(n).unwrap_or(usize::MAX),
        _ => DEFAULT_CONCURRENCY,
    }
}

/// Parse a registry URL and make sure it ends with `/` so joins stay under it.
///
/// # Errors
/// Returns an error if the URL cannot be parsed.
pub fn normalize_registry_url(raw: &str) -> Result<Url, MigrateError> {
    let raw = raw.trim();
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash)
        .map_err(|e| MigrateError::config(format!("Invalid registry URL '{raw}': {e}")))
}
