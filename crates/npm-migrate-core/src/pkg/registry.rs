//! Registry access.
//!
//! [`RegistryClient`] is the capability the engine needs from a registry;
//! every call names its registry explicitly. [`HttpRegistry`] speaks the npm
//! registry HTTP API directly.

use super::npmrc::{load_npmrc_files, NpmrcConfig};
use super::publish::build_publish_document;
use super::spec::url_encoded_name;
use super::tarball::{download_tarball, read_manifest, MAX_TARBALL_SIZE};
use crate::error::{describe_http_error, MigrateError};
use crate::version::USER_AGENT;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Publish requests carry the whole tarball; give them longer.
const PUBLISH_TIMEOUT_SECS: u64 = 120;

/// Longest response-body excerpt quoted in an error.
const ERROR_BODY_EXCERPT: usize = 200;

/// Operations the migration engine performs against registries.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch a packument, or with `version` the document for that version.
    async fn inspect(
        &self,
        registry: &Url,
        name: &str,
        version: Option<&str>,
    ) -> Result<Value, MigrateError>;

    async fn fetch_tarball(&self, url: &str) -> Result<Bytes, MigrateError>;

    /// Publish the archive at `archive` under `tag`.
    async fn publish(&self, registry: &Url, tag: &str, archive: &Path) -> Result<(), MigrateError>;

    /// Point `tag` at `spec` (`name@version`).
    async fn add_dist_tag(&self, registry: &Url, spec: &str, tag: &str)
        -> Result<(), MigrateError>;

    async fn remove_dist_tag(
        &self,
        registry: &Url,
        name: &str,
        tag: &str,
    ) -> Result<(), MigrateError>;

    /// The authenticated user's name.
    async fn who_am_i(&self, registry: &Url) -> Result<String, MigrateError>;
}

/// npm registry HTTP client.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    http: Client,
    npmrc: NpmrcConfig,
}

impl HttpRegistry {
    /// Create a client with the given credentials.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(npmrc: NpmrcConfig) -> Result<Self, MigrateError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MigrateError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { http, npmrc })
    }

    /// Create a client using `.npmrc` credentials found from `dir` upward.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_npmrc(dir: &Path) -> Result<Self, MigrateError> {
        Self::new(load_npmrc_files(dir))
    }

    fn authed(&self, request: RequestBuilder, url: &Url) -> RequestBuilder {
        match self.npmrc.token_for(url) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn package_url(registry: &Url, name: &str) -> Result<Url, MigrateError> {
        registry
            .join(&url_encoded_name(name))
            .map_err(|e| MigrateError::metadata(format!("Failed to build URL for '{name}': {e}")))
    }

    fn dist_tag_url(registry: &Url, name: &str, tag: &str) -> Result<Url, MigrateError> {
        registry
            .join(&format!(
                "-/package/{}/dist-tags/{tag}",
                url_encoded_name(name)
            ))
            .map_err(|e| {
                MigrateError::tag_operation(format!("Failed to build dist-tag URL for '{name}': {e}"))
            })
    }
}

#[async_trait]
impl RegistryClient for HttpRegistry {
    async fn inspect(
        &self,
        registry: &Url,
        name: &str,
        version: Option<&str>,
    ) -> Result<Value, MigrateError> {
        let url = Self::package_url(registry, name)?;

        let response = self
            .authed(self.http.get(url.as_str()), &url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| MigrateError::metadata(describe_http_error(&e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MigrateError::metadata(format!(
                "Package not found: {name} at {registry}"
            )));
        }

        let response = ensure_success(response)
            .await
            .map_err(|msg| MigrateError::metadata(format!("{msg} for '{name}'")))?;

        let packument: Value = response
            .json()
            .await
            .map_err(|e| MigrateError::metadata(format!("Invalid JSON for '{name}': {e}")))?;

        match version {
            None => Ok(packument),
            Some(v) => packument
                .get("versions")
                .and_then(|vs| vs.get(v))
                .cloned()
                .ok_or_else(|| {
                    MigrateError::metadata(format!("Version not found: {name}@{v} at {registry}"))
                }),
        }
    }

    async fn fetch_tarball(&self, url: &str) -> Result<Bytes, MigrateError> {
        let token = Url::parse(url)
            .ok()
            .and_then(|u| self.npmrc.token_for(&u).map(String::from));
        download_tarball(&self.http, url, MAX_TARBALL_SIZE, token.as_deref()).await
    }

    async fn publish(&self, registry: &Url, tag: &str, archive: &Path) -> Result<(), MigrateError> {
        let tarball = tokio::fs::read(archive).await.map_err(|e| {
            MigrateError::publish(format!("Failed to read {}: {e}", archive.display()))
        })?;

        let manifest = read_manifest(&tarball)?;
        let doc = build_publish_document(&manifest, &tarball, registry, tag)?;
        let url = Self::package_url(registry, &doc.name)
            .map_err(|e| MigrateError::publish(e.to_string()))?;

        let response = self
            .authed(self.http.put(url.as_str()), &url)
            .timeout(Duration::from_secs(PUBLISH_TIMEOUT_SECS))
            .json(&doc.body)
            .send()
            .await
            .map_err(|e| MigrateError::publish(describe_http_error(&e)))?;

        ensure_success(response).await.map_err(|msg| {
            MigrateError::publish(format!("{msg} for {}@{}", doc.name, doc.version))
        })?;
        Ok(())
    }

    async fn add_dist_tag(
        &self,
        registry: &Url,
        spec: &str,
        tag: &str,
    ) -> Result<(), MigrateError> {
        let (name, version) = split_spec(spec).ok_or_else(|| {
            MigrateError::tag_operation(format!("Expected name@version, got '{spec}'"))
        })?;
        let url = Self::dist_tag_url(registry, name, tag)?;

        let response = self
            .authed(self.http.put(url.as_str()), &url)
            .json(&version)
            .send()
            .await
            .map_err(|e| MigrateError::tag_operation(describe_http_error(&e)))?;

        ensure_success(response)
            .await
            .map_err(|msg| MigrateError::tag_operation(format!("{msg} adding {tag} to {spec}")))?;
        Ok(())
    }

    async fn remove_dist_tag(
        &self,
        registry: &Url,
        name: &str,
        tag: &str,
    ) -> Result<(), MigrateError> {
        let url = Self::dist_tag_url(registry, name, tag)?;

        let response = self
            .authed(self.http.delete(url.as_str()), &url)
            .send()
            .await
            .map_err(|e| MigrateError::tag_operation(describe_http_error(&e)))?;

        ensure_success(response)
            .await
            .map_err(|msg| MigrateError::tag_operation(format!("{msg} removing {tag} from {name}")))?;
        Ok(())
    }

    async fn who_am_i(&self, registry: &Url) -> Result<String, MigrateError> {
        let url = registry
            .join("-/whoami")
            .map_err(|e| MigrateError::metadata(format!("Failed to build whoami URL: {e}")))?;

        let response = self
            .authed(self.http.get(url.as_str()), &url)
            .send()
            .await
            .map_err(|e| MigrateError::metadata(describe_http_error(&e)))?;

        let response = ensure_success(response)
            .await
            .map_err(|msg| MigrateError::metadata(format!("{msg} for whoami")))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| MigrateError::metadata(format!("Invalid whoami JSON: {e}")))?;

        body.get("username")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| MigrateError::metadata("whoami response has no username"))
    }
}

/// Pass through 2xx responses; otherwise describe status and body.
async fn ensure_success(response: Response) -> Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
    if excerpt.is_empty() {
        Err(format!("Registry returned status {status}"))
    } else {
        Err(format!("Registry returned status {status} ({excerpt})"))
    }
}

/// Split `name@version`, keeping a leading scope `@` with the name.
#[must_use]
pub fn split_spec(spec: &str) -> Option<(&str, &str)> {
    let (name, version) = spec.rsplit_once('@')?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name, version))
}
