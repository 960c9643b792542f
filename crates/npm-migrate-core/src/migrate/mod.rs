//! The migration engine.
//!
//! [`Migrator`] drives a run: [`diff`] decides what moves, [`scheduler`]
//! moves it through the shared [`IoPool`], [`tags`] repairs distribution
//! tags and [`result`] collects per-version outcomes.

pub mod diff;
pub mod observer;
pub mod pool;
pub mod result;
pub mod scheduler;
pub mod tags;

pub use diff::{build_plan, ExistingVersionSet, MigrationPlan};
pub use observer::{MigrationObserver, NoopObserver, RegistrySide};
pub use pool::IoPool;
pub use result::{MigrationResult, ResultCollector, VersionOutcome};
pub use scheduler::Migrator;
pub use tags::{choose_temp_tag, DistTagMap, TagPlan, LATEST_TAG, TEMP_TAG_ATTEMPTS};
