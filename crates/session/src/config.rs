use std::time::Duration;

use blockpad_core::EditorConfig;
use serde::{Deserialize, Serialize};

/// Timing and limits for an editing session. Every field has a default, so
/// hosts only spell out what they change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Quiet period after the last edit before the document is written.
    pub save_debounce_ms: u64,
    /// How long a transient error stays visible.
    pub error_display_ms: u64,
    pub image_min_width: f32,
    pub max_undo: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_debounce_ms: 500,
            error_display_ms: 5_000,
            image_min_width: blockpad_core::nodes::MIN_IMAGE_WIDTH,
            max_undo: 200,
        }
    }
}

impl SessionConfig {
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn error_display(&self) -> Duration {
        Duration::from_millis(self.error_display_ms)
    }

    pub fn editor_config(&self) -> EditorConfig {
        EditorConfig {
            max_undo: self.max_undo,
            ..EditorConfig::default()
        }
        .with_defaults()
    }
}
