//! Manifest content format and syntax checking.
//!
//! The store only cares that uploaded content is a syntactically valid
//! collection of manifest documents. What the documents mean is up to the
//! agents that fetch them.

use std::fmt;
use std::str::FromStr;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::error::{SyntaxError, ValidationError};

/// Recognized manifest content formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    /// A YAML stream of one or more `---` separated documents.
    Yaml,
    /// JSON documents. JSON is a subset of YAML, so these are checked the
    /// same way; multiple documents need `---` separators.
    Json,
}

impl ManifestFormat {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ManifestFormat::Yaml => "yaml",
            ManifestFormat::Json => "json",
        }
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManifestFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yaml" | "yml" | "application/yaml" | "application/x-yaml" => Ok(ManifestFormat::Yaml),
            "json" | "application/json" => Ok(ManifestFormat::Json),
            _ => Err(ValidationError::UnknownFormat(s.to_string())),
        }
    }
}

/// Syntax checker for a manifest document collection.
pub trait ManifestSyntax: Send + Sync {
    /// Parse every document in `bytes`, returning how many were found.
    fn parse_all(&self, bytes: &[u8]) -> Result<usize, SyntaxError>;
}

/// Checks a YAML document stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlDocuments;

impl ManifestSyntax for YamlDocuments {
    fn parse_all(&self, bytes: &[u8]) -> Result<usize, SyntaxError> {
        let mut count = 0;

        for document in serde_yaml::Deserializer::from_slice(bytes) {
            IgnoredAny::deserialize(document)
                .map_err(|e| SyntaxError::new(format!("document {}: {}", count + 1, e)))?;
            count += 1;
        }

        if count == 0 {
            return Err(SyntaxError::new("no documents found"));
        }
        Ok(count)
    }
}
