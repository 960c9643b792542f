//! Progress hooks.
//!
//! The scheduler reports every state transition here. Frontends that draw
//! progress implement [`MigrationObserver`]; the engine runs the same with
//! [`NoopObserver`].

use super::result::VersionOutcome;

/// Which side of the migration a metadata query went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrySide {
    Source,
    Destination,
}

impl RegistrySide {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }
}

/// Receives migration progress. All methods default to doing nothing.
pub trait MigrationObserver: Send + Sync {
    /// A package descriptor query finished (`ok == false` on failure).
    fn on_metadata_fetched(&self, _name: &str, _side: RegistrySide, _ok: bool) {}

    /// A version reached a terminal state.
    fn on_version_resolved(&self, _name: &str, _version: &str, _outcome: VersionOutcome) {}

    /// Every version of a package was attempted and its tags reconciled.
    fn on_package_complete(&self, _name: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl MigrationObserver for NoopObserver {}
