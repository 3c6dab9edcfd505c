// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Pipeline configuration loading
//!
//! Turns a configuration reference (a path or `file://` URI) into a
//! validated [`PipelineConfig`]. JSON is the primary format; YAML and TOML
//! are accepted by file extension.

mod document;
mod validation;

pub use document::{InputSpec, PipelineDocument, ProcessorSpec, SinkSpec, SourceSpec};
pub use validation::{check_config, ensure_valid, is_valid_identifier, SUPPORTED_VERSIONS};

use std::path::{Path, PathBuf};

use crate::errors::{PipeflowError, PipeflowResult};
use crate::pipeline::PipelineConfig;

/// Opaque locator of a pipeline document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigRef(String);

impl ConfigRef {
    /// Wrap a path or URI
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The reference as written
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem path this reference points at
    ///
    /// Plain paths and `file://` URIs are supported; any other scheme is
    /// unreachable.
    pub fn to_path(&self) -> PipeflowResult<PathBuf> {
        if let Some(rest) = self.0.strip_prefix("file://") {
            return Ok(PathBuf::from(rest));
        }

        if let Some((scheme, _)) = self.0.split_once("://") {
            return Err(PipeflowError::ConfigNotFound {
                reference: self.0.clone(),
                reason: format!("unsupported scheme '{}', only file paths are readable", scheme),
            });
        }

        Ok(PathBuf::from(&self.0))
    }

    /// Document format implied by the extension
    pub fn format(&self) -> ConfigFormat {
        ConfigFormat::from_path(Path::new(&self.0))
    }
}

impl std::fmt::Display for ConfigRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConfigRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ConfigRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&Path> for ConfigRef {
    fn from(p: &Path) -> Self {
        Self(p.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for ConfigRef {
    fn from(p: PathBuf) -> Self {
        Self::from(p.as_path())
    }
}

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Pick a format from a file extension, defaulting to JSON
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml") | Some("yml") => Self::Yaml,
            Some("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
            Self::Toml => write!(f, "toml"),
        }
    }
}

/// Reads and validates pipeline documents
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Create a new loader
    pub fn new() -> Self {
        Self
    }

    /// Load the document behind `reference`
    pub fn load(&self, reference: &ConfigRef) -> PipeflowResult<PipelineConfig> {
        let path = reference.to_path()?;

        let content = std::fs::read_to_string(&path).map_err(|e| PipeflowError::ConfigNotFound {
            reference: reference.to_string(),
            reason: format!("could not read '{}': {}", path.display(), e),
        })?;

        tracing::debug!(reference = %reference, format = %reference.format(), "Loaded pipeline document");

        self.load_str(&content, reference.format())
    }

    /// Parse and validate an in-memory document
    pub fn load_str(&self, content: &str, format: ConfigFormat) -> PipeflowResult<PipelineConfig> {
        let document = Self::parse(content, format)?;
        let config = document.resolve()?;
        ensure_valid(&config)?;

        Ok(config)
    }

    fn parse(content: &str, format: ConfigFormat) -> PipeflowResult<PipelineDocument> {
        let parsed = match format {
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        };

        parsed.map_err(|reason| PipeflowError::ConfigInvalid {
            reason,
            help: Some(format!(
                "A pipeline {} document needs at least 'source' and 'sink', each with a 'type'",
                format
            )),
        })
    }
}
