//! Package identifier parsing.
//!
//! Accepts the identifiers an operator passes on the command line:
//! - `left-pad`
//! - `left-pad@1.3.0`
//! - `@my/pkg`
//! - `@my/pkg@2.0.0`
//!
//! A version after `@` pins the migration to exactly that version.

use crate::error::MigrateError;
use std::fmt;

/// A parsed package identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Full package name (e.g., "@scope/name" or "name").
    pub name: String,
    /// Pinned version, if any.
    pub version: Option<String>,
}

impl PackageSpec {
    /// Parse a package identifier.
    ///
    /// # Errors
    /// Returns an error if the identifier is invalid.
    pub fn parse(input: &str) -> Result<Self, MigrateError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(MigrateError::spec_invalid("Empty package identifier"));
        }

        if input.starts_with('@') {
            Self::parse_scoped(input)
        } else {
            Self::parse_unscoped(input)
        }
    }

    fn parse_scoped(input: &str) -> Result<Self, MigrateError> {
        let Some(slash_pos) = input.find('/') else {
            return Err(MigrateError::spec_invalid(format!(
                "Invalid scoped package: missing '/' in '{input}'"
            )));
        };

        if slash_pos == 1 {
            return Err(MigrateError::spec_invalid(format!(
                "Invalid scoped package: empty scope in '{input}'"
            )));
        }

        let scope = &input[1..slash_pos];
        let after_slash = &input[slash_pos + 1..];

        let (pkg_name, version) = match after_slash.split_once('@') {
            Some((pkg_name, version)) => (pkg_name, Some(version)),
            None => (after_slash, None),
        };

        if pkg_name.is_empty() {
            return Err(MigrateError::spec_invalid(format!(
                "Invalid scoped package: empty name in '{input}'"
            )));
        }

        Self::validate_name(scope)?;
        Self::validate_name(pkg_name)?;

        Ok(Self {
            name: format!("@{scope}/{pkg_name}"),
            version: Self::validate_version(input, version)?,
        })
    }

    fn parse_unscoped(input: &str) -> Result<Self, MigrateError> {
        let (name, version) = match input.split_once('@') {
            Some((name, version)) => (name, Some(version)),
            None => (input, None),
        };

        if name.is_empty() {
            return Err(MigrateError::spec_invalid(format!(
                "Invalid package identifier: empty name in '{input}'"
            )));
        }

        Self::validate_name(name)?;

        Ok(Self {
            name: name.to_string(),
            version: Self::validate_version(input, version)?,
        })
    }

    fn validate_name(name: &str) -> Result<(), MigrateError> {
        for c in name.chars() {
            if !c.is_alphanumeric() && c != '-' && c != '_' && c != '.' && c != '~' {
                return Err(MigrateError::spec_invalid(format!(
                    "Invalid character '{c}' in package name '{name}'"
                )));
            }
        }
        Ok(())
    }

    fn validate_version(input: &str, version: Option<&str>) -> Result<Option<String>, MigrateError> {
        match version {
            None => Ok(None),
            Some("") => Err(MigrateError::spec_invalid(format!(
                "Invalid package identifier: empty version in '{input}'"
            ))),
            Some(v) if v.chars().any(char::is_whitespace) || v.contains('@') => {
                Err(MigrateError::spec_invalid(format!(
                    "Invalid version '{v}' in '{input}'"
                )))
            }
            Some(v) => Ok(Some(v.to_string())),
        }
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{v}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// URL-encode a package name for registry requests (`@scope/name` → `@scope%2Fname`).
#[must_use]
pub fn url_encoded_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replace('/', "%2F")
    } else {
        name.to_string()
    }
}

/// Strip the `@scope/` prefix from a package name, if any.
#[must_use]
pub fn unscoped_name(name: &str) -> &str {
    if name.starts_with('@') {
        name.split_once('/').map_or(name, |(_, rest)| rest)
    } else {
        name
    }
}
