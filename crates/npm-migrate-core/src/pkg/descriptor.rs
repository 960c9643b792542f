//! Typed views over registry metadata.

use super::tarball::needs_retarget;
use crate::error::MigrateError;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use url::Url;

/// A package's tags and versions as one registry reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDescriptor {
    pub name: String,
    /// Tag name → version.
    pub dist_tags: BTreeMap<String, String>,
    pub versions: BTreeSet<String>,
}

impl PackageDescriptor {
    /// Build from a packument.
    ///
    /// `versions` may be an object keyed by version (registry document) or an
    /// array of version strings (`npm view --json` output).
    ///
    /// # Errors
    /// Returns an error if the document is not an object.
    pub fn from_packument(name: &str, packument: &Value) -> Result<Self, MigrateError> {
        if !packument.is_object() {
            return Err(MigrateError::metadata(format!(
                "Registry returned a non-object document for '{name}'"
            )));
        }

        let dist_tags = packument
            .get("dist-tags")
            .and_then(Value::as_object)
            .map(|tags| {
                tags.iter()
                    .filter_map(|(tag, v)| v.as_str().map(|v| (tag.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let versions = match packument.get("versions") {
            Some(Value::Object(obj)) => obj.keys().cloned().collect(),
            Some(Value::Array(arr)) => arr
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            Some(Value::String(single)) => BTreeSet::from([single.clone()]),
            _ => BTreeSet::new(),
        };

        Ok(Self {
            name: packument
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(name)
                .to_string(),
            dist_tags,
            versions,
        })
    }

    /// An empty descriptor, used when the destination knows nothing of `name`.
    #[must_use]
    pub fn absent(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Replace the version set with the pinned versions.
    ///
    /// Pins are kept even if the registry did not list them; the per-version
    /// lookup will then fail and record them.
    #[must_use]
    pub fn pinned(mut self, versions: BTreeSet<String>) -> Self {
        self.versions = versions;
        self
    }
}

/// Per-version detail needed to transfer one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDescriptor {
    pub tarball_url: String,
    /// `publishConfig.registry` as declared in the published manifest.
    pub registry_preference: Option<String>,
    /// Whether the document carries a `publishConfig` object at all.
    pub has_publish_config: bool,
}

impl VersionDescriptor {
    /// Build from a version document (`versions[v]` or `GET /name/v`).
    ///
    /// # Errors
    /// Returns an error if the document has no `dist.tarball`.
    pub fn from_version_doc(spec: &str, doc: &Value) -> Result<Self, MigrateError> {
        let tarball_url = doc
            .get("dist")
            .and_then(|d| d.get("tarball"))
            .and_then(Value::as_str)
            .ok_or_else(|| MigrateError::metadata(format!("No tarball URL for {spec}")))?
            .to_string();

        Ok(Self {
            tarball_url,
            registry_preference: registry_preference(doc).map(String::from),
            has_publish_config: doc.get("publishConfig").is_some_and(Value::is_object),
        })
    }

    /// Whether the archive has to go through the manifest rewrite.
    ///
    /// Some registries drop `publishConfig` from version documents while the
    /// archived manifest keeps it, so a document without one is not trusted.
    #[must_use]
    pub fn may_need_retarget(&self, destination: &Url) -> bool {
        !self.has_publish_config || needs_retarget(self.registry_preference.as_deref(), destination)
    }
}

/// Read `publishConfig.registry` from a manifest.
#[must_use]
pub fn registry_preference(manifest: &Value) -> Option<&str> {
    manifest.get("publishConfig")?.get("registry")?.as_str()
}
