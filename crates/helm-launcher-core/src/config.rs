//! Configuration for launcher sessions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serialization format of the raw values editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextFormat {
    /// YAML, the format of `values.yaml`. Default.
    #[default]
    Yaml,
    /// Pretty-printed JSON.
    Json,
}

/// Options for a launcher session.
///
/// ## Serialization Format
///
/// Fields are serialized in `kebab-case` (e.g., `max-depth`, `text-debounce-ms`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LauncherOptions {
    /// Maximum schema nesting walked before a sub-tree is skipped.
    pub max_depth: usize,
    /// Format used by the raw values editor and `to_text`.
    pub text_format: TextFormat,
    /// Debounce window for text and numeric field edits.
    pub text_debounce_ms: u64,
    /// Debounce window for structural toggles (checkboxes, selects).
    pub toggle_debounce_ms: u64,
}

impl LauncherOptions {
    pub fn text_debounce(&self) -> Duration {
        Duration::from_millis(self.text_debounce_ms)
    }

    pub fn toggle_debounce(&self) -> Duration {
        Duration::from_millis(self.toggle_debounce_ms)
    }
}

impl Default for LauncherOptions {
    fn default() -> Self {
        Self {
            max_depth: 32,
            text_format: TextFormat::Yaml,
            text_debounce_ms: 500,
            toggle_debounce_ms: 0,
        }
    }
}
