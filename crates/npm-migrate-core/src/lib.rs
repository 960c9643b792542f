#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Copies npm packages between registries.
//!
//! The engine diffs the version sets of a source and a destination registry,
//! transfers the missing versions through one bounded I/O pool, retargets each
//! manifest's `publishConfig.registry`, and repairs distribution tags once a
//! package's versions have all been attempted.

pub mod config;
pub mod error;
pub mod migrate;
pub mod pkg;
pub mod version;

pub use config::{concurrency_from_env, MigrateConfig, CONCURRENCY_ENV, DEFAULT_CONCURRENCY};
pub use error::{codes, MigrateError};
pub use migrate::{
    MigrationObserver, MigrationResult, Migrator, NoopObserver, RegistrySide, VersionOutcome,
};
pub use pkg::{HttpRegistry, PackageSpec, RegistryClient};
pub use version::VERSION;
