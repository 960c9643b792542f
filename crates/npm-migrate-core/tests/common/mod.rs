//! In-memory registries for engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use npm_migrate_core::pkg::{read_manifest, split_spec};
use npm_migrate_core::{MigrateError, RegistryClient};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

pub const REG_A: &str = "http://reg-a.test/";
pub const REG_B: &str = "http://reg-b.test/";

/// A gzip'd tarball holding `package/package.json` and an `index.js`.
pub fn make_tarball(manifest: &Value) -> Bytes {
    let manifest = serde_json::to_vec(manifest).unwrap();
    let mut tar_bytes = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_bytes);
        for (path, data) in [
            ("package/package.json", manifest.as_slice()),
            ("package/index.js", b"module.exports = 1;\n".as_slice()),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, data).unwrap();
        }
        builder.finish().unwrap();
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    Bytes::from(encoder.finish().unwrap())
}

#[derive(Debug, Clone, Default)]
pub struct FakePackage {
    pub dist_tags: BTreeMap<String, String>,
    /// version → version document
    pub versions: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub name: String,
    pub version: String,
    pub tag: String,
    pub manifest: Value,
    pub archive: Bytes,
}

#[derive(Debug, Default)]
struct State {
    packages: HashMap<(String, String), FakePackage>,
    tarballs: HashMap<String, Bytes>,
    broken_tarballs: HashSet<String>,
    broken_metadata: HashSet<(String, String)>,
    published: Vec<Published>,
    tag_ops: Vec<String>,
}

/// Several registries behind one [`RegistryClient`], keyed by base URL.
///
/// Publishing mimics npm: the named tag moves, and a package without
/// `latest` gets it pointed at whatever was published first.
#[derive(Debug, Default)]
pub struct FakeRegistry {
    state: Mutex<State>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlight<'a>(&'a FakeRegistry);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Add `name@version` to `registry`, with a tarball at `registry`.
    pub fn add_version(&self, registry: &str, name: &str, version: &str, extra: Value) {
        let mut manifest = json!({ "name": name, "version": version });
        if let (Some(obj), Value::Object(extra)) = (manifest.as_object_mut(), extra) {
            obj.extend(extra);
        }
        let unscoped = name.rsplit('/').next().unwrap_or(name);
        let url = format!("{registry}{name}/-/{unscoped}-{version}.tgz");

        let mut doc = manifest.clone();
        doc["dist"] = json!({ "tarball": url });

        let mut state = self.state.lock().unwrap();
        state.tarballs.insert(url, make_tarball(&manifest));
        state
            .packages
            .entry((registry.to_string(), name.to_string()))
            .or_default()
            .versions
            .insert(version.to_string(), doc);
    }

    pub fn set_tag(&self, registry: &str, name: &str, tag: &str, version: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .packages
            .entry((registry.to_string(), name.to_string()))
            .or_default()
            .dist_tags
            .insert(tag.to_string(), version.to_string());
    }

    /// Drop `publishConfig` from a version document, leaving the archive alone.
    pub fn strip_publish_config(&self, registry: &str, name: &str, version: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(doc) = state
            .packages
            .get_mut(&(registry.to_string(), name.to_string()))
            .and_then(|p| p.versions.get_mut(version))
            .and_then(Value::as_object_mut)
        {
            doc.remove("publishConfig");
        }
    }

    pub fn source_tarball(&self, registry: &str, name: &str, version: &str) -> Option<Bytes> {
        let unscoped = name.rsplit('/').next().unwrap_or(name);
        self.state
            .lock()
            .unwrap()
            .tarballs
            .get(&format!("{registry}{name}/-/{unscoped}-{version}.tgz"))
            .cloned()
    }

    pub fn break_tarball(&self, registry: &str, name: &str, version: &str) {
        let unscoped = name.rsplit('/').next().unwrap_or(name);
        self.state
            .lock()
            .unwrap()
            .broken_tarballs
            .insert(format!("{registry}{name}/-/{unscoped}-{version}.tgz"));
    }

    pub fn break_metadata(&self, registry: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .broken_metadata
            .insert((registry.to_string(), name.to_string()));
    }

    pub fn package(&self, registry: &str, name: &str) -> Option<FakePackage> {
        self.state
            .lock()
            .unwrap()
            .packages
            .get(&(registry.to_string(), name.to_string()))
            .cloned()
    }

    pub fn tags(&self, registry: &str, name: &str) -> BTreeMap<String, String> {
        self.package(registry, name).map(|p| p.dist_tags).unwrap_or_default()
    }

    pub fn published(&self) -> Vec<Published> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn tag_ops(&self) -> Vec<String> {
        self.state.lock().unwrap().tag_ops.clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        InFlight(self)
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn inspect(
        &self,
        registry: &Url,
        name: &str,
        version: Option<&str>,
    ) -> Result<Value, MigrateError> {
        let _guard = self.enter().await;
        let state = self.state.lock().unwrap();
        let key = (registry.to_string(), name.to_string());
        if state.broken_metadata.contains(&key) {
            return Err(MigrateError::metadata(format!("{name}: registry unavailable")));
        }
        let package = state
            .packages
            .get(&key)
            .ok_or_else(|| MigrateError::metadata(format!("Package not found: {name}")))?;

        match version {
            Some(v) => package
                .versions
                .get(v)
                .cloned()
                .ok_or_else(|| MigrateError::metadata(format!("Version not found: {name}@{v}"))),
            None => Ok(json!({
                "name": name,
                "dist-tags": package.dist_tags,
                "versions": package.versions,
            })),
        }
    }

    async fn fetch_tarball(&self, url: &str) -> Result<Bytes, MigrateError> {
        let _guard = self.enter().await;
        let state = self.state.lock().unwrap();
        if state.broken_tarballs.contains(url) {
            return Err(MigrateError::transfer(format!("Download failed with status 500 for '{url}'")));
        }
        state
            .tarballs
            .get(url)
            .cloned()
            .ok_or_else(|| MigrateError::transfer(format!("Download failed with status 404 for '{url}'")))
    }

    async fn publish(&self, registry: &Url, tag: &str, archive: &Path) -> Result<(), MigrateError> {
        let _guard = self.enter().await;
        let bytes = Bytes::from(std::fs::read(archive).map_err(|e| MigrateError::publish(e.to_string()))?);
        let manifest = read_manifest(&bytes)?;
        let name = manifest["name"].as_str().unwrap_or_default().to_string();
        let version = manifest["version"].as_str().unwrap_or_default().to_string();

        let mut state = self.state.lock().unwrap();
        let package = state
            .packages
            .entry((registry.to_string(), name.clone()))
            .or_default();
        if package.versions.contains_key(&version) {
            return Err(MigrateError::publish(format!("409 Conflict for {name}@{version}")));
        }
        let mut doc = manifest.clone();
        doc["dist"] = json!({ "tarball": format!("{registry}{name}/-/{version}.tgz") });
        package.versions.insert(version.clone(), doc);
        package.dist_tags.insert(tag.to_string(), version.clone());
        package
            .dist_tags
            .entry("latest".to_string())
            .or_insert_with(|| version.clone());

        state.tarballs.insert(format!("{registry}{name}/-/{version}.tgz"), bytes.clone());
        state.published.push(Published {
            name,
            version,
            tag: tag.to_string(),
            manifest,
            archive: bytes,
        });
        Ok(())
    }

    async fn add_dist_tag(&self, registry: &Url, spec: &str, tag: &str) -> Result<(), MigrateError> {
        let _guard = self.enter().await;
        let (name, version) = split_spec(spec)
            .ok_or_else(|| MigrateError::tag_operation(format!("Bad spec {spec}")))?;
        let mut state = self.state.lock().unwrap();
        state.tag_ops.push(format!("add {tag} {spec}"));
        let package = state
            .packages
            .get_mut(&(registry.to_string(), name.to_string()))
            .ok_or_else(|| MigrateError::tag_operation(format!("Package not found: {name}")))?;
        package.dist_tags.insert(tag.to_string(), version.to_string());
        Ok(())
    }

    async fn remove_dist_tag(&self, registry: &Url, name: &str, tag: &str) -> Result<(), MigrateError> {
        let _guard = self.enter().await;
        let mut state = self.state.lock().unwrap();
        state.tag_ops.push(format!("rm {tag} {name}"));
        let package = state
            .packages
            .get_mut(&(registry.to_string(), name.to_string()))
            .ok_or_else(|| MigrateError::tag_operation(format!("Package not found: {name}")))?;
        package
            .dist_tags
            .remove(tag)
            .map(|_| ())
            .ok_or_else(|| MigrateError::tag_operation(format!("Tag not found: {tag}")))
    }

    async fn who_am_i(&self, _registry: &Url) -> Result<String, MigrateError> {
        let _guard = self.enter().await;
        Ok("tester".to_string())
    }
}
