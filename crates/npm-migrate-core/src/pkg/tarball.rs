//! Tarball download and manifest retargeting.

use super::descriptor::registry_preference;
use crate::error::{describe_http_error, MigrateError};
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::Client;
use serde_json::Value;
use std::io::Read;
use std::time::Duration;
use tar::{Archive, Builder};
use url::Url;

/// Maximum tarball size (200 MB).
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

/// Path of the manifest inside an npm tarball.
pub const MANIFEST_PATH: &str = "package/package.json";

/// Download timeout in seconds.
const DOWNLOAD_TIMEOUT_SECS: u64 = 60;

/// Result of [`retarget_registry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformed {
    /// The input bytes, untouched.
    Unchanged(Bytes),
    /// A re-packed archive whose manifest points at the destination.
    Rewritten(Bytes),
}

impl Transformed {
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        match self {
            Self::Unchanged(b) | Self::Rewritten(b) => b,
        }
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Unchanged(b) | Self::Rewritten(b) => b,
        }
    }

    #[must_use]
    pub fn is_rewritten(&self) -> bool {
        matches!(self, Self::Rewritten(_))
    }
}

/// Download a tarball from a URL.
///
/// If `auth_token` is provided, attaches a `Bearer` authorization header.
///
/// # Errors
/// Returns an error if the download fails or exceeds the size limit.
pub async fn download_tarball(
    client: &Client,
    url: &str,
    max_bytes: u64,
    auth_token: Option<&str>,
) -> Result<Bytes, MigrateError> {
    let mut request = client
        .get(url)
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS));

    if let Some(token) = auth_token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(|e| {
        MigrateError::transfer(format!("Failed to download '{url}': {}", describe_http_error(&e)))
    })?;

    if !response.status().is_success() {
        return Err(MigrateError::transfer(format!(
            "Download failed with status {} for '{url}'",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(MigrateError::transfer(format!(
                "Tarball too large: {len} bytes (max: {max_bytes})"
            )));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| MigrateError::transfer(format!("Failed to read response body: {e}")))?;

    if bytes.len() as u64 > max_bytes {
        return Err(MigrateError::transfer(format!(
            "Tarball too large: {} bytes (max: {max_bytes})",
            bytes.len()
        )));
    }

    Ok(bytes)
}

/// Whether a declared registry preference must be replaced by `destination`.
///
/// Absent preferences are left alone; `X` and `X/` compare equal.
#[must_use]
pub fn needs_retarget(preference: Option<&str>, destination: &Url) -> bool {
    match preference {
        None => false,
        Some(pref) => pref.trim().trim_end_matches('/') != destination.as_str().trim_end_matches('/'),
    }
}

/// Point the manifest's `publishConfig.registry` at `destination`.
///
/// Entries are streamed in their original order; everything but
/// [`MANIFEST_PATH`] is copied header and body verbatim. When the manifest's
/// preference is absent or already matches, the original bytes come back as
/// [`Transformed::Unchanged`].
///
/// # Errors
/// Returns an error if the archive is malformed or the manifest is not valid JSON.
pub fn retarget_registry(tgz: Bytes, destination: &Url) -> Result<Transformed, MigrateError> {
    match repack_with_manifest(&tgz, destination)? {
        Some(out) => Ok(Transformed::Rewritten(Bytes::from(out))),
        None => Ok(Transformed::Unchanged(tgz)),
    }
}

fn repack_with_manifest(tgz: &[u8], destination: &Url) -> Result<Option<Vec<u8>>, MigrateError> {
    let mut archive = Archive::new(GzDecoder::new(tgz));
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut rewritten = false;

    // Raw mode keeps GNU long-name and PAX records as their own entries so
    // they are copied through untouched.
    let entries = archive
        .entries()
        .map_err(|e| MigrateError::archive(format!("Failed to read tarball entries: {e}")))?
        .raw(true);

    for entry in entries {
        let mut entry = entry
            .map_err(|e| MigrateError::archive(format!("Failed to read tarball entry: {e}")))?;

        let is_manifest = entry
            .path()
            .map_err(|e| MigrateError::archive(format!("Failed to read entry path: {e}")))?
            .as_os_str()
            == MANIFEST_PATH;

        let mut header = entry.header().clone();

        if is_manifest && !rewritten {
            let mut body = Vec::new();
            entry
                .read_to_end(&mut body)
                .map_err(|e| MigrateError::archive(format!("Failed to read {MANIFEST_PATH}: {e}")))?;

            let Some(body) = rewrite_manifest(&body, destination)? else {
                return Ok(None);
            };
            rewritten = true;

            header.set_size(body.len() as u64);
            header.set_cksum();
            builder
                .append(&header, &body[..])
                .map_err(|e| MigrateError::archive(format!("Failed to write {MANIFEST_PATH}: {e}")))?;
        } else {
            builder
                .append(&header, &mut entry)
                .map_err(|e| MigrateError::archive(format!("Failed to copy tarball entry: {e}")))?;
        }
    }

    if !rewritten {
        return Ok(None);
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| MigrateError::archive(format!("Failed to finish tarball: {e}")))?;
    let out = encoder
        .finish()
        .map_err(|e| MigrateError::archive(format!("Failed to compress tarball: {e}")))?;

    Ok(Some(out))
}

/// Rewrite manifest JSON, or `None` if it already targets `destination`.
fn rewrite_manifest(body: &[u8], destination: &Url) -> Result<Option<Vec<u8>>, MigrateError> {
    let mut manifest: Value = serde_json::from_slice(body)
        .map_err(|e| MigrateError::archive(format!("Invalid {MANIFEST_PATH}: {e}")))?;

    if !needs_retarget(registry_preference(&manifest), destination) {
        return Ok(None);
    }

    if let Some(config) = manifest
        .get_mut("publishConfig")
        .and_then(Value::as_object_mut)
    {
        config.insert(
            "registry".to_string(),
            Value::String(destination.as_str().to_string()),
        );
    }

    let mut out = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| MigrateError::archive(format!("Failed to serialize manifest: {e}")))?;
    out.push(b'\n');
    Ok(Some(out))
}

/// Read and parse [`MANIFEST_PATH`] from a gzipped tarball.
///
/// # Errors
/// Returns an error if the archive is malformed or has no manifest.
pub fn read_manifest(tgz: &[u8]) -> Result<Value, MigrateError> {
    let gz = GzDecoder::new(tgz);
    let mut archive = Archive::new(gz);

    for entry in archive
        .entries()
        .map_err(|e| MigrateError::archive(format!("Failed to read tarball entries: {e}")))?
    {
        let mut entry = entry
            .map_err(|e| MigrateError::archive(format!("Failed to read tarball entry: {e}")))?;

        let is_manifest = entry
            .path()
            .map_err(|e| MigrateError::archive(format!("Failed to read entry path: {e}")))?
            .as_os_str()
            == MANIFEST_PATH;

        if is_manifest {
            let mut body = Vec::new();
            entry
                .read_to_end(&mut body)
                .map_err(|e| MigrateError::archive(format!("Failed to read {MANIFEST_PATH}: {e}")))?;
            return serde_json::from_slice(&body)
                .map_err(|e| MigrateError::archive(format!("Invalid {MANIFEST_PATH}: {e}")));
        }
    }

    Err(MigrateError::archive(format!(
        "Tarball has no {MANIFEST_PATH}"
    )))
}

/// Staging file name for a version: the tarball URL's basename, or
/// `<unscoped-name>-<version>.tgz` when the URL has none.
#[must_use]
pub fn tarball_file_name(tarball_url: &str, name: &str, version: &str) -> String {
    Url::parse(tarball_url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(String::from))
        })
        .filter(|base| !base.is_empty() && base != "." && base != "..")
        .unwrap_or_else(|| format!("{}-{version}.tgz", super::spec::unscoped_name(name)))
}
