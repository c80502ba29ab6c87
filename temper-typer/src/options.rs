use serde::{Deserialize, Serialize};

use crate::builder::DEFAULT_OUTPUT_NAME;

/// Knobs for one run of the typing stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TyperOptions {
    /// Synthetic name that receives the module's result. `None` means the
    /// module has no result.
    pub output_name: Option<String>,
    /// Report bubbling expressions in functions that do not declare
    /// `throws Bubble`.
    pub check_bubbles: bool,
    /// Add an info-level note to every node whose type mentions `Invalid`.
    pub invalid_notes: bool,
}

impl Default for TyperOptions {
    fn default() -> Self {
        Self {
            output_name: Some(DEFAULT_OUTPUT_NAME.to_string()),
            check_bubbles: true,
            invalid_notes: true,
        }
    }
}
