//! The `x-onyxia` vendor extension block carried by chart value schemas.
//!
//! ```json
//! "memory": {
//!   "type": "string",
//!   "default": "2Gi",
//!   "x-onyxia": {
//!     "render": "slider",
//!     "sliderMin": 1, "sliderMax": 64, "sliderStep": 1, "sliderUnit": "Gi",
//!     "sliderRangeId": "memory", "sliderExtremity": "down"
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// UI annotations attached to a schema node.
///
/// Unknown keys are ignored. A block that fails to deserialize is replaced by
/// the default (no annotations) with a warning, see [`XOnyxia::from_schema`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XOnyxia {
    pub hidden: Option<Hidden>,
    pub readonly: bool,
    pub render: Option<String>,
    pub slider_min: Option<f64>,
    pub slider_max: Option<f64>,
    pub slider_step: Option<f64>,
    pub slider_unit: Option<String>,
    pub slider_extremity: Option<SliderExtremity>,
    pub slider_extremity_semantic: Option<String>,
    pub slider_range_id: Option<String>,
    /// Static suggestions for `render: list` fields.
    pub list_enum: Vec<Value>,
    /// Dotted path (or `{{path}}` template) into the launch context whose
    /// value replaces the chart default.
    pub overwrite_default_with: Option<String>,
    /// Dotted path into the launch context yielding the suggestion list.
    pub overwrite_list_enum_with: Option<String>,
    /// Marks an optional sub-tree the user can switch off as a whole.
    pub auto_injection: bool,
}

/// `hidden` is either a plain flag or a condition on another value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Hidden {
    Flag(bool),
    When(HiddenWhen),
}

/// Hide the node while the value at `path` equals `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HiddenWhen {
    /// Dotted Helm path of the watched value.
    pub path: String,
    pub value: Value,
    /// Resolve `path` against the parent of the annotated node instead of the root.
    #[serde(default)]
    pub is_path_relative: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliderExtremity {
    Down,
    Up,
}

/// Explicit rendering override requested through `x-onyxia.render`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderHint {
    TextArea,
    Password,
    List,
    Slider,
    Yaml,
}

impl XOnyxia {
    /// Read the `x-onyxia` block of a raw schema object.
    pub fn from_schema(schema: &Value, pointer: &str) -> Self {
        let Some(raw) = schema.get("x-onyxia") else {
            return Self::default();
        };
        match serde_json::from_value::<XOnyxia>(raw.clone()) {
            Ok(ext) => ext,
            Err(err) => {
                tracing::warn!(schema_path = %pointer, error = %err, "ignoring malformed x-onyxia block");
                Self::default()
            }
        }
    }

    pub fn render_hint(&self) -> Option<RenderHint> {
        let render = self.render.as_deref()?;
        match render {
            "textArea" | "textarea" => Some(RenderHint::TextArea),
            "password" => Some(RenderHint::Password),
            "list" => Some(RenderHint::List),
            "slider" => Some(RenderHint::Slider),
            "yaml" | "yamlCodeBlock" => Some(RenderHint::Yaml),
            other => {
                tracing::warn!(render = %other, "unknown x-onyxia render hint");
                None
            }
        }
    }

    /// Declares an end of a paired range slider.
    pub fn is_range_end(&self) -> bool {
        self.slider_range_id.is_some() && self.slider_extremity.is_some()
    }
}
