use crate::CleanupOption;
use serde::{Deserialize, Serialize};

/// Parser settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// How relationship members dropped by a parse are reconciled.
    #[serde(default)]
    pub cleanup: CleanupOption,
}

impl ParserConfig {
    pub fn with_cleanup(cleanup: CleanupOption) -> Self {
        Self { cleanup }
    }
}
