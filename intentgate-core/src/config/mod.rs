//! YAML configuration: schema, defaults, loading and validation.

pub mod defaults;
pub mod duration_format;
pub mod error;
pub mod loader;
pub mod schema;

pub use defaults::IntentGateDefaults;
pub use error::ConfigError;
pub use loader::{find_config_file, load_and_validate, load_config, load_or_default, validate};
pub use schema::{
    AuditConfig, Config, InterceptConfig, MarkerConfig, OracleBackend, OracleConfig, ServerConfig,
    StateConfig,
};
