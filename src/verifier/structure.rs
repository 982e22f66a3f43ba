use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::{JsonMap, RequestMethod};

/// Source of request templates, keyed by method, tag and version.
pub trait StructureSource: Send + Sync {
    /// A `version` of 0 or less selects the latest version; otherwise the
    /// closest version at or above it.
    fn structure(&self, method: RequestMethod, tag: &str, version: i64) -> Option<JsonMap>;
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StructureLoadError {
    #[error("Failed to read structure file: {0}")]
    Io(String),

    #[error("Failed to parse structure file: {0}")]
    Yaml(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureEntry {
    pub method: RequestMethod,
    pub tag: String,
    #[serde(default)]
    pub version: i64,
    pub structure: JsonMap,
}

/// In-memory templates, usually loaded from YAML:
///
/// ```yaml
/// entries:
///   - method: POST
///     tag: Moment
///     version: 1
///     structure:
///       Moment:
///         MUST: content
///         REFUSE: id
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticStructures {
    #[serde(default)]
    pub entries: Vec<StructureEntry>,
}

impl StaticStructures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, method: RequestMethod, tag: &str, version: i64, structure: JsonMap) -> Self {
        self.entries.push(StructureEntry {
            method,
            tag: tag.to_string(),
            version,
            structure,
        });
        self
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, StructureLoadError> {
        serde_yaml::from_str(content).map_err(|e| StructureLoadError::Yaml(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StructureLoadError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            StructureLoadError::Io(format!("{}: {}", path.as_ref().display(), e))
        })?;
        let structures = Self::from_yaml_str(&content)?;
        log::info!(
            "Loaded {} request structure(s) from {}",
            structures.entries.len(),
            path.as_ref().display()
        );
        Ok(structures)
    }
}

impl StructureSource for StaticStructures {
    fn structure(&self, method: RequestMethod, tag: &str, version: i64) -> Option<JsonMap> {
        let candidates = self
            .entries
            .iter()
            .filter(|e| e.method == method && e.tag == tag);
        let chosen = if version <= 0 {
            candidates.max_by_key(|e| e.version)
        } else {
            candidates
                .filter(|e| e.version >= version)
                .min_by_key(|e| e.version)
        };
        chosen.map(|e| e.structure.clone())
    }
}
