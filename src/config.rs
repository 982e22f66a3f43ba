use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::resolver::path_index::ReferencePolicy;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Limits and switches for one resolver. Immutable once a request starts.
#[derive(Clone, Debug, Validate, Serialize, Deserialize, PartialEq)]
#[serde(default)]
#[validate(schema(function = "validate_counts"))]
pub struct ResolverConfig {
    /// Pages are numbered from 1 instead of 0
    pub start_from_1: bool,

    #[validate(range(min = 1, max = 100000, message = "Max query page must be between 1 and 100000"))]
    pub max_query_page: usize,

    #[validate(range(min = 1, max = 10000, message = "Default query count must be between 1 and 10000"))]
    pub default_query_count: usize,

    #[validate(range(min = 1, max = 10000, message = "Max query count must be between 1 and 10000"))]
    pub max_query_count: usize,

    /// Upper bound on rows a single PUT/DELETE may address through `id{}`
    #[validate(range(min = 1, max = 10000, message = "Max update count must be between 1 and 10000"))]
    pub max_update_count: usize,

    /// Executed statements allowed per request
    #[validate(range(min = 1, max = 100000, message = "Max SQL count must be between 1 and 100000"))]
    pub max_sql_count: usize,

    /// Table nodes allowed in one object
    #[validate(range(min = 1, max = 1000, message = "Max object count must be between 1 and 1000"))]
    pub max_object_count: usize,

    /// Array nodes allowed in one object
    #[validate(range(min = 1, max = 1000, message = "Max array count must be between 1 and 1000"))]
    pub max_array_count: usize,

    #[validate(range(min = 1, max = 100, message = "Max query depth must be between 1 and 100"))]
    pub max_query_depth: usize,

    pub verify_role: bool,

    pub verify_content: bool,

    /// Adds timing, statement and depth counters to responses
    pub debug: bool,

    pub reference_policy: ReferencePolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            start_from_1: false,
            max_query_page: 100,
            default_query_count: 10,
            max_query_count: 100,
            max_update_count: 10,
            max_sql_count: 200,
            max_object_count: 5,
            max_array_count: 5,
            max_query_depth: 5,
            verify_role: true,
            verify_content: true,
            debug: false,
            reference_policy: ReferencePolicy::Permissive,
        }
    }
}

fn validate_counts(config: &ResolverConfig) -> Result<(), ValidationError> {
    if config.default_query_count > config.max_query_count {
        let mut error = ValidationError::new("default_query_count");
        error.message = Some("Default query count cannot exceed max query count".into());
        return Err(error);
    }
    Ok(())
}

impl ResolverConfig {
    pub fn min_query_page(&self) -> i64 {
        if self.start_from_1 {
            1
        } else {
            0
        }
    }

    /// Create configuration from `APITREE_*` environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            start_from_1: parse_env_var("APITREE_START_FROM_1", &defaults.start_from_1.to_string())?,
            max_query_page: parse_env_var("APITREE_MAX_QUERY_PAGE", &defaults.max_query_page.to_string())?,
            default_query_count: parse_env_var(
                "APITREE_DEFAULT_QUERY_COUNT",
                &defaults.default_query_count.to_string(),
            )?,
            max_query_count: parse_env_var("APITREE_MAX_QUERY_COUNT", &defaults.max_query_count.to_string())?,
            max_update_count: parse_env_var(
                "APITREE_MAX_UPDATE_COUNT",
                &defaults.max_update_count.to_string(),
            )?,
            max_sql_count: parse_env_var("APITREE_MAX_SQL_COUNT", &defaults.max_sql_count.to_string())?,
            max_object_count: parse_env_var(
                "APITREE_MAX_OBJECT_COUNT",
                &defaults.max_object_count.to_string(),
            )?,
            max_array_count: parse_env_var("APITREE_MAX_ARRAY_COUNT", &defaults.max_array_count.to_string())?,
            max_query_depth: parse_env_var("APITREE_MAX_QUERY_DEPTH", &defaults.max_query_depth.to_string())?,
            verify_role: parse_env_var("APITREE_VERIFY_ROLE", &defaults.verify_role.to_string())?,
            verify_content: parse_env_var("APITREE_VERIFY_CONTENT", &defaults.verify_content.to_string())?,
            debug: parse_env_var("APITREE_DEBUG", "false")?,
            reference_policy: parse_env_var("APITREE_REFERENCE_POLICY", "permissive")?,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Server configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host address
    #[validate(length(min = 1, message = "HTTP host cannot be empty"))]
    pub http_host: String,

    /// HTTP server port (1-65535)
    #[validate(range(
        min = 1,
        max = 65535,
        message = "HTTP port must be between 1 and 65535"
    ))]
    pub http_port: u16,

    /// YAML or JSON file with the tables served by the in-memory executor
    pub data_file: Option<String>,

    /// YAML file with request structures for content verification
    pub structure_file: Option<String>,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 3600, message = "Request timeout must be between 1 and 3600 seconds"))]
    pub request_timeout_secs: u64,

    /// Maximum accepted request body size in bytes
    #[validate(range(min = 1024, message = "Body limit must be at least 1024 bytes"))]
    pub max_body_bytes: usize,

    #[validate(nested)]
    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            data_file: None,
            structure_file: None,
            request_timeout_secs: 30,
            max_body_bytes: 1024 * 1024,
            resolver: ResolverConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            http_host: env::var("APITREE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: parse_env_var("APITREE_PORT", "8080")?,
            data_file: env::var("APITREE_DATA_FILE").ok(),
            structure_file: env::var("APITREE_STRUCTURE_FILE").ok(),
            request_timeout_secs: parse_env_var("APITREE_REQUEST_TIMEOUT_SECS", "30")?,
            max_body_bytes: parse_env_var("APITREE_MAX_BODY_BYTES", "1048576")?,
            resolver: ResolverConfig::from_env()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let resolver = ResolverConfig {
            max_query_depth: cli.max_query_depth,
            max_sql_count: cli.max_sql_count,
            debug: cli.debug,
            reference_policy: cli.reference_policy,
            ..ResolverConfig::default()
        };
        let config = Self {
            http_host: cli.http_host,
            http_port: cli.http_port,
            data_file: cli.data_file,
            structure_file: cli.structure_file,
            request_timeout_secs: cli.request_timeout_secs,
            max_body_bytes: ServerConfig::default().max_body_bytes,
            resolver,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug)]
pub struct CliConfig {
    pub http_host: String,
    pub http_port: u16,
    pub data_file: Option<String>,
    pub structure_file: Option<String>,
    pub request_timeout_secs: u64,
    pub max_query_depth: usize,
    pub max_sql_count: usize,
    pub debug: bool,
    pub reference_policy: ReferencePolicy,
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
