//! `.npmrc` auth-token lookup.
//!
//! Reads `//host/path/:_authToken=TOKEN` directives (with `${ENV_VAR}`
//! expansion) so requests to a registry carry the operator's existing
//! credentials. Nothing is ever written back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

/// Parsed `.npmrc` credentials.
#[derive(Debug, Clone, Default)]
pub struct NpmrcConfig {
    /// `host[/path]` → auth token (e.g., `npm.example.com/repo` → `abc123`).
    pub auth_tokens: HashMap<String, String>,
}

impl NpmrcConfig {
    /// Find the token for a registry or tarball URL.
    ///
    /// The longest configured `host/path` prefix of `url` wins, so a token
    /// for `host/repo` applies to `https://host/repo/pkg/-/pkg-1.0.0.tgz`.
    #[must_use]
    pub fn token_for(&self, url: &Url) -> Option<&str> {
        let host = url.host_str()?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        for len in (0..=segments.len()).rev() {
            let key = if len == 0 {
                host.clone()
            } else {
                format!("{host}/{}", segments[..len].join("/"))
            };
            if let Some(token) = self.auth_tokens.get(&key) {
                return Some(token.as_str());
            }
        }

        None
    }
}

/// Parse a single `.npmrc` file's content.
///
/// Ignores comments (`#`, `;`), blank lines and every directive other than
/// `//host/:_authToken=TOKEN`.
#[must_use]
pub fn parse_npmrc(content: &str) -> NpmrcConfig {
    let mut config = NpmrcConfig::default();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if !line.starts_with("//") {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();

        let Some(host_part) = key
            .strip_prefix("//")
            .and_then(|k| k.strip_suffix(":_authToken"))
        else {
            continue;
        };

        let token = expand_env_vars(value.trim());
        if !token.is_empty() {
            config
                .auth_tokens
                .insert(host_part.trim_end_matches('/').to_string(), token);
        }
    }

    config
}

/// Load and merge `.npmrc` files from `start_dir` up to the filesystem root,
/// then `$HOME/.npmrc`. The nearest file wins on conflicts.
#[must_use]
pub fn load_npmrc_files(start_dir: &Path) -> NpmrcConfig {
    let mut merged = NpmrcConfig::default();

    let mut dir = Some(start_dir.to_path_buf());
    while let Some(d) = dir {
        merge_file(&mut merged, &d.join(".npmrc"));
        dir = d.parent().map(Path::to_path_buf);
    }

    if let Some(home) = home_dir() {
        merge_file(&mut merged, &home.join(".npmrc"));
    }

    merged
}

fn merge_file(target: &mut NpmrcConfig, path: &Path) {
    if !path.is_file() {
        return;
    }
    if let Ok(content) = std::fs::read_to_string(path) {
        for (host, token) in parse_npmrc(&content).auth_tokens {
            target.auth_tokens.entry(host).or_insert(token);
        }
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
            // Unset variables expand to empty, as npm does
            if let Ok(val) = std::env::var(&var_name) {
                result.push_str(&val);
            }
        } else {
            result.push(ch);
        }
    }

    result
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .map(PathBuf::from)
}
