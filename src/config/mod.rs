//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, import firebase.json rewrites)
//!     → validation.rs (semantic checks, all errors collected)
//!     → FirecloudConfig (validated, immutable)
//!     → startup converts sections into runtime types
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::FirecloudConfig;
pub use validation::ValidationError;
