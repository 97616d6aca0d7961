//! Configuration schema for hypershift.
//!
//! Loaded from `.config/hypershift.styx`. Every field is optional; accessors
//! fall back to the built-in defaults.
//!
//! ```styx
//! default_chunk_time_interval "1 day"
//! migrate_data true
//! catalog_schemas (public metrics)
//! ```

use facet::Facet;

/// Chunk interval used when a hypertable declares none.
pub const DEFAULT_CHUNK_TIME_INTERVAL: &str = "7 days";

/// Top-level configuration.
#[derive(Facet, Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Chunk interval for hypertables that don't declare one.
    #[facet(default)]
    pub default_chunk_time_interval: Option<String>,

    /// Whether converting a populated table to a hypertable migrates its rows
    /// when the hypertable itself doesn't say.
    #[facet(default)]
    pub migrate_data: Option<bool>,

    /// Schemas the catalog extractors read. All user schemas when unset.
    #[facet(default)]
    pub catalog_schemas: Option<Vec<String>>,
}

impl Config {
    pub fn chunk_time_interval(&self) -> &str {
        self.default_chunk_time_interval
            .as_deref()
            .unwrap_or(DEFAULT_CHUNK_TIME_INTERVAL)
    }

    pub fn migrate_data(&self) -> bool {
        self.migrate_data.unwrap_or(false)
    }

    /// Returns true if objects in `schema` should be extracted.
    pub fn includes_schema(&self, schema: &str) -> bool {
        match &self.catalog_schemas {
            Some(schemas) => schemas.iter().any(|s| s == schema),
            None => true,
        }
    }
}
