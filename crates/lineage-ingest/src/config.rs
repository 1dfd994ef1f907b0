//! Crawler configuration
//!
//! Settings consumed by the fetch engine. Everything has a default; values can
//! come from `LINEAGE_*` environment variables or the `with_*` setters.

use lineage_common::{LineageError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default metadata service URL when not specified via environment variable.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8111";

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default recursion budget. The top-level batch is depth 0.
pub const DEFAULT_MAX_DEPTH: u32 = 8;

/// Default request template for table details
pub const DEFAULT_TABLE_DETAIL_TEMPLATE: &str = "/api/atlas/v2/entity/guid";

/// Default request template for column lineage
pub const DEFAULT_COLUMN_LINEAGE_TEMPLATE: &str = "/api/atlas/v2/lineage";

/// Crawler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Base URL of the metadata service
    pub base_url: String,

    /// Timeout applied by the HTTP transport to every request
    pub request_timeout_secs: u64,

    /// Signals at or beyond this depth are persisted but not crawled further
    pub max_depth: u32,

    /// Template used for table detail requests
    pub table_detail_template: String,

    /// Template used for column lineage requests
    pub column_lineage_template: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_depth: DEFAULT_MAX_DEPTH,
            table_detail_template: DEFAULT_TABLE_DETAIL_TEMPLATE.to_string(),
            column_lineage_template: DEFAULT_COLUMN_LINEAGE_TEMPLATE.to_string(),
        }
    }
}

impl CrawlConfig {
    /// Load config from environment variables
    ///
    /// - `LINEAGE_BASE_URL`
    /// - `LINEAGE_REQUEST_TIMEOUT_SECS`
    /// - `LINEAGE_MAX_DEPTH`
    /// - `LINEAGE_TABLE_DETAIL_TEMPLATE`
    /// - `LINEAGE_COLUMN_LINEAGE_TEMPLATE`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("LINEAGE_BASE_URL") {
            config.base_url = url;
        }

        if let Ok(secs) = std::env::var("LINEAGE_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = secs.parse().map_err(|_| {
                LineageError::config(format!("LINEAGE_REQUEST_TIMEOUT_SECS must be an integer, got '{}'", secs))
            })?;
        }

        if let Ok(depth) = std::env::var("LINEAGE_MAX_DEPTH") {
            config.max_depth = depth.parse().map_err(|_| {
                LineageError::config(format!("LINEAGE_MAX_DEPTH must be an integer, got '{}'", depth))
            })?;
        }

        if let Ok(template) = std::env::var("LINEAGE_TABLE_DETAIL_TEMPLATE") {
            config.table_detail_template = template;
        }

        if let Ok(template) = std::env::var("LINEAGE_COLUMN_LINEAGE_TEMPLATE") {
            config.column_lineage_template = template;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_column_lineage_template(mut self, template: impl Into<String>) -> Self {
        self.column_lineage_template = template.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(LineageError::config("base URL must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(LineageError::config("request timeout must be at least one second"));
        }
        if self.table_detail_template.trim().is_empty() {
            return Err(LineageError::config("table detail template must not be empty"));
        }
        if self.column_lineage_template.trim().is_empty() {
            return Err(LineageError::config("column lineage template must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CrawlConfig::default();
        assert_eq!(config.base_url, "http://localhost:8111");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_setters() {
        let config = CrawlConfig::default()
            .with_base_url("http://atlas:21000")
            .with_max_depth(2)
            .with_request_timeout_secs(5);

        assert_eq!(config.base_url, "http://atlas:21000");
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn test_validate_rejects_blank_base_url() {
        let config = CrawlConfig::default().with_base_url("  ");
        assert!(config.validate().is_err());

        let config = CrawlConfig::default().with_request_timeout_secs(0);
        assert!(config.validate().is_err());
    }
}
