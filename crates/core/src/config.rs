//! Store configuration
//!
//! Stored as `config.toml` in the store directory:
//!
//! ```toml
//! score_width = 10
//! max_buckets = 0
//! sync_on_write = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Error;
use crate::score::SCORE_SIZE;
use crate::Result;

/// Score bytes kept per bucket entry unless configured otherwise
pub const DEFAULT_SCORE_WIDTH: usize = 10;

/// Tunables fixed when a store is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Leading score bytes stored in each bucket entry (1-32)
    ///
    /// Shorter widths pack more entries per bucket; a partial match is
    /// always confirmed against the full score in the content log.
    pub score_width: usize,
    /// Bucket limit (0 = unbounded)
    pub max_buckets: u32,
    /// Flush the content log after every appended record
    pub sync_on_write: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            score_width: DEFAULT_SCORE_WIDTH,
            max_buckets: 0,
            sync_on_write: false,
        }
    }
}

impl StoreConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.score_width == 0 || self.score_width > SCORE_SIZE {
            return Err(Error::Config(format!(
                "score_width must be between 1 and {}, got {}",
                SCORE_SIZE, self.score_width
            )));
        }
        if self.max_buckets == u32::MAX {
            return Err(Error::Config(format!(
                "max_buckets must be below {}",
                u32::MAX
            )));
        }
        Ok(())
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate and write a config file
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Commented example configuration
    pub fn example() -> &'static str {
        r#"# Chunkstore configuration

# Leading score bytes stored per bucket entry (1-32).
# Matches are always confirmed against the full score in the content log.
score_width = 10

# Maximum number of buckets (0 = unbounded)
max_buckets = 0

# Flush the content log after every write
sync_on_write = false
"#
    }
}
