//! Database location configuration.

use serde::{Deserialize, Serialize};

/// Default path of the project-local libSQL database file.
fn default_path() -> String {
    ".quill/quill.db".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file. `":memory:"` for tests.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
        }
    }
}
