//! Error taxonomy for the migration engine.
//!
//! Each variant matches the smallest unit that fails independently: a metadata
//! query drops one package, the others fail one version. Tag operations are
//! logged and ignored by the caller.

use thiserror::Error;

/// Stable error codes.
pub mod codes {
    pub const MIGRATE_METADATA_ERROR: &str = "MIGRATE_METADATA_ERROR";
    pub const MIGRATE_TRANSFER_ERROR: &str = "MIGRATE_TRANSFER_ERROR";
    pub const MIGRATE_ARCHIVE_ERROR: &str = "MIGRATE_ARCHIVE_ERROR";
    pub const MIGRATE_PUBLISH_ERROR: &str = "MIGRATE_PUBLISH_ERROR";
    pub const MIGRATE_TAG_OPERATION_ERROR: &str = "MIGRATE_TAG_OPERATION_ERROR";
    pub const MIGRATE_SPEC_INVALID: &str = "MIGRATE_SPEC_INVALID";
    pub const MIGRATE_TEMP_TAG_EXHAUSTED: &str = "MIGRATE_TEMP_TAG_EXHAUSTED";
    pub const MIGRATE_STAGING_ERROR: &str = "MIGRATE_STAGING_ERROR";
    pub const MIGRATE_CONFIG_ERROR: &str = "MIGRATE_CONFIG_ERROR";
}

/// Migration engine error.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Registry metadata query failed (network, not found, bad JSON).
    #[error("metadata query failed: {0}")]
    Metadata(String),

    /// Tarball download failed.
    #[error("tarball download failed: {0}")]
    Transfer(String),

    /// Manifest rewrite or archive streaming failed.
    #[error("archive rewrite failed: {0}")]
    Archive(String),

    /// Destination rejected the publish, or the network failed during it.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Best-effort dist-tag add/remove failed.
    #[error("dist-tag operation failed: {0}")]
    TagOperation(String),

    #[error("invalid package spec: {0}")]
    SpecInvalid(String),

    /// No free temporary tag name was found within the attempt budget.
    #[error("no free temporary tag after {attempts} attempts (base '{base}')")]
    TempTagExhausted { base: String, attempts: u32 },

    #[error("staging failed: {0}")]
    Staging(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MigrateError {
    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Metadata(_) => codes::MIGRATE_METADATA_ERROR,
            Self::Transfer(_) => codes::MIGRATE_TRANSFER_ERROR,
            Self::Archive(_) => codes::MIGRATE_ARCHIVE_ERROR,
            Self::Publish(_) => codes::MIGRATE_PUBLISH_ERROR,
            Self::TagOperation(_) => codes::MIGRATE_TAG_OPERATION_ERROR,
            Self::SpecInvalid(_) => codes::MIGRATE_SPEC_INVALID,
            Self::TempTagExhausted { .. } => codes::MIGRATE_TEMP_TAG_EXHAUSTED,
            Self::Staging(_) => codes::MIGRATE_STAGING_ERROR,
            Self::Config(_) => codes::MIGRATE_CONFIG_ERROR,
        }
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    pub fn tag_operation(msg: impl Into<String>) -> Self {
        Self::TagOperation(msg.into())
    }

    pub fn spec_invalid(msg: impl Into<String>) -> Self {
        Self::SpecInvalid(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Describe a reqwest failure the way the operator needs to read it.
pub(crate) fn describe_http_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("Request timed out: {e}")
    } else if e.is_connect() {
        format!("Connection failed: {e}")
    } else {
        e.to_string()
    }
}
