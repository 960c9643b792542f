//! Registry publish document.
//!
//! Mirrors what `npm publish` sends: one version document plus the tarball
//! as a base64 attachment, `PUT` to `{registry}{name}`.

use super::spec::unscoped_name;
use crate::error::MigrateError;
use npm_migrate_util::hash::{base64_encode, sha1_hex, sha512_integrity};
use serde_json::{json, Value};
use url::Url;

/// A ready-to-send publish request.
#[derive(Debug, Clone)]
pub struct PublishDocument {
    pub name: String,
    pub version: String,
    pub body: Value,
}

/// Build the publish document for `tarball` whose manifest is `manifest`.
///
/// # Errors
/// Returns an error if the manifest lacks `name` or `version`.
pub fn build_publish_document(
    manifest: &Value,
    tarball: &[u8],
    registry: &Url,
    tag: &str,
) -> Result<PublishDocument, MigrateError> {
    let name = manifest
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| MigrateError::publish("Manifest has no name"))?
        .to_string();
    let version = manifest
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| MigrateError::publish(format!("Manifest for {name} has no version")))?
        .to_string();

    let file_name = format!("{}-{version}.tgz", unscoped_name(&name));
    let tarball_url = format!("{}{name}/-/{file_name}", registry.as_str());

    let mut version_doc = manifest.clone();
    if let Some(doc) = version_doc.as_object_mut() {
        doc.insert("_id".to_string(), json!(format!("{name}@{version}")));
        doc.insert(
            "dist".to_string(),
            json!({
                "shasum": sha1_hex(tarball),
                "integrity": sha512_integrity(tarball),
                "tarball": tarball_url,
            }),
        );
    }

    let access = manifest
        .get("publishConfig")
        .and_then(|c| c.get("access"))
        .cloned()
        .unwrap_or(Value::Null);

    let body = json!({
        "_id": name,
        "name": name,
        "description": manifest.get("description").cloned().unwrap_or(Value::Null),
        "dist-tags": { tag: version },
        "versions": { version.clone(): version_doc },
        "access": access,
        "_attachments": {
            file_name: {
                "content_type": "application/octet-stream",
                "data": base64_encode(tarball),
                "length": tarball.len(),
            }
        }
    });

    Ok(PublishDocument {
        name,
        version,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_document_shape() {
        let manifest = json!({
            "name": "@my/pkg",
            "version": "1.2.0",
            "description": "demo",
            "publishConfig": { "access": "public", "registry": "http://localhost:4873/" }
        });
        let registry = Url::parse("http://localhost:4873/").unwrap();

        let doc = build_publish_document(&manifest, b"tgz-bytes", &registry, "next").unwrap();
        assert_eq!(doc.name, "@my/pkg");
        assert_eq!(doc.version, "1.2.0");

        let body = &doc.body;
        assert_eq!(body["dist-tags"]["next"], "1.2.0");
        assert_eq!(body["access"], "public");
        assert_eq!(body["versions"]["1.2.0"]["_id"], "@my/pkg@1.2.0");
        assert_eq!(
            body["versions"]["1.2.0"]["dist"]["tarball"],
            "http://localhost:4873/@my/pkg/-/pkg-1.2.0.tgz"
        );
        assert_eq!(
            body["versions"]["1.2.0"]["dist"]["shasum"],
            sha1_hex(b"tgz-bytes")
        );
        let attachment = &body["_attachments"]["pkg-1.2.0.tgz"];
        assert_eq!(attachment["length"], 9);
        assert_eq!(attachment["data"], base64_encode(b"tgz-bytes"));
    }

    #[test]
    fn test_publish_document_requires_version() {
        let registry = Url::parse("http://localhost:4873/").unwrap();
        let err = build_publish_document(&json!({"name": "a"}), b"", &registry, "latest")
            .unwrap_err();
        assert_eq!(err.code(), crate::codes::MIGRATE_PUBLISH_ERROR);
    }
}
