//! Registry-facing building blocks.
//!
//! Provides utilities for:
//! - Parsing package identifiers (name, name@version)
//! - Reading registry credentials from `.npmrc`
//! - Typed package and version descriptors
//! - The registry client capability and its HTTP implementation
//! - Downloading tarballs and retargeting their manifest
//! - Building publish documents

pub mod descriptor;
pub mod npmrc;
pub mod publish;
pub mod registry;
pub mod spec;
pub mod tarball;

pub use descriptor::{PackageDescriptor, VersionDescriptor};
pub use npmrc::{load_npmrc_files, NpmrcConfig};
pub use publish::{build_publish_document, PublishDocument};
pub use registry::{split_spec, HttpRegistry, RegistryClient};
pub use spec::PackageSpec;
pub use tarball::{
    download_tarball, needs_retarget, read_manifest, retarget_registry, tarball_file_name,
    Transformed, MANIFEST_PATH, MAX_TARBALL_SIZE,
};
