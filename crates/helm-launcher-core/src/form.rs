//! The derived form tree.
//!
//! Everything here is output: the walker regenerates the whole tree from
//! `(schema, values, ui state)` on every change and nothing is mutated in
//! place. Edits flow back through the session as `(path, value)` pairs.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use crate::error::{FieldError, FieldErrorKind};
use crate::path::HelmValuesPath;

/// Most specific rendering of a scalar leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScalarKind {
    Boolean,
    Integer,
    Number,
    String,
    EnumSelect,
    FreeText,
    TextArea,
    Slider,
    RangeSlider,
    YamlBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootForm {
    pub main: Vec<FormNode>,
    /// The chart's top-level `global` block, when the schema declares one.
    pub global: Option<FormFieldGroup>,
    /// One sub-tree per chart dependency, namespaced under its name.
    pub dependencies: BTreeMap<String, FormFieldGroup>,
    /// Every outstanding field error; a non-empty list blocks the launch.
    pub errored_form_fields: Vec<FieldError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FormNode {
    Field(FormField),
    Group(FormFieldGroup),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormFieldGroup {
    pub helm_values_path: HelmValuesPath,
    pub title: String,
    pub description: Option<String>,
    /// Array groups only: another element may be appended.
    pub can_add: bool,
    /// Array elements only: this element may be removed.
    pub can_remove: bool,
    pub is_hidden: bool,
    /// `None` for ordinary groups; for auto-injection groups, whether the
    /// sub-tree is switched on.
    pub is_auto_injected: Option<bool>,
    /// Group-level findings (array length bounds).
    pub errors: Vec<FieldErrorKind>,
    pub nodes: Vec<FormNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub helm_values_path: HelmValuesPath,
    pub title: String,
    pub description: Option<String>,
    pub is_readonly: bool,
    pub is_required: bool,
    pub errors: Vec<FieldErrorKind>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

/// Kind-specific payload of a field. `value` is the raw effective value,
/// which may be of the wrong type while a validation error is pending.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "fieldType",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum FieldKind {
    Boolean {
        value: Value,
    },
    Integer {
        value: Value,
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    Number {
        value: Value,
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
    String {
        value: Value,
        pattern: Option<String>,
        is_password: bool,
    },
    EnumSelect {
        value: Value,
        options: Vec<Value>,
    },
    FreeText {
        value: Value,
        suggestions: Vec<Value>,
    },
    TextArea {
        value: Value,
    },
    Slider {
        value: Value,
        /// Numeric part of `value`, unit stripped.
        number: Option<f64>,
        bounds: SliderBounds,
    },
    RangeSlider {
        low: RangeEnd,
        high: RangeEnd,
        bounds: SliderBounds,
    },
    YamlBlock {
        value: Value,
        /// `object` or `array`.
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SliderBounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub unit: Option<String>,
}

/// One end of a range slider; each end edits its own path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeEnd {
    pub helm_values_path: HelmValuesPath,
    pub title: String,
    pub semantic: Option<String>,
    pub value: Value,
    pub number: Option<f64>,
}

impl FieldKind {
    pub fn scalar_kind(&self) -> ScalarKind {
        match self {
            FieldKind::Boolean { .. } => ScalarKind::Boolean,
            FieldKind::Integer { .. } => ScalarKind::Integer,
            FieldKind::Number { .. } => ScalarKind::Number,
            FieldKind::String { .. } => ScalarKind::String,
            FieldKind::EnumSelect { .. } => ScalarKind::EnumSelect,
            FieldKind::FreeText { .. } => ScalarKind::FreeText,
            FieldKind::TextArea { .. } => ScalarKind::TextArea,
            FieldKind::Slider { .. } => ScalarKind::Slider,
            FieldKind::RangeSlider { .. } => ScalarKind::RangeSlider,
            FieldKind::YamlBlock { .. } => ScalarKind::YamlBlock,
        }
    }

    /// Current value; for a range slider, the lower end.
    pub fn value(&self) -> &Value {
        match self {
            FieldKind::Boolean { value }
            | FieldKind::Integer { value, .. }
            | FieldKind::Number { value, .. }
            | FieldKind::String { value, .. }
            | FieldKind::EnumSelect { value, .. }
            | FieldKind::FreeText { value, .. }
            | FieldKind::TextArea { value }
            | FieldKind::Slider { value, .. }
            | FieldKind::YamlBlock { value, .. } => value,
            FieldKind::RangeSlider { low, .. } => &low.value,
        }
    }
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

impl FormNode {
    pub fn path(&self) -> &HelmValuesPath {
        match self {
            FormNode::Field(field) => &field.helm_values_path,
            FormNode::Group(group) => &group.helm_values_path,
        }
    }

    fn find_field(&self, path: &HelmValuesPath) -> Option<&FormField> {
        match self {
            FormNode::Field(field) => {
                let matches = field.helm_values_path == *path
                    || matches!(&field.kind, FieldKind::RangeSlider { high, .. } if high.helm_values_path == *path);
                matches.then_some(field)
            }
            FormNode::Group(group) => group.field(path),
        }
    }

    fn find_group(&self, path: &HelmValuesPath) -> Option<&FormFieldGroup> {
        match self {
            FormNode::Field(_) => None,
            FormNode::Group(group) => group.group(path),
        }
    }
}

impl FormFieldGroup {
    /// The field editing `path`, anywhere below this group.
    pub fn field(&self, path: &HelmValuesPath) -> Option<&FormField> {
        self.nodes.iter().find_map(|node| node.find_field(path))
    }

    /// This group or a nested group at `path`.
    pub fn group(&self, path: &HelmValuesPath) -> Option<&FormFieldGroup> {
        if self.helm_values_path == *path {
            return Some(self);
        }
        self.nodes.iter().find_map(|node| node.find_group(path))
    }
}

impl RootForm {
    fn sections(&self) -> impl Iterator<Item = &FormFieldGroup> {
        self.global.iter().chain(self.dependencies.values())
    }

    /// The field editing `path`, in any section of the form.
    pub fn field(&self, path: &HelmValuesPath) -> Option<&FormField> {
        self.main
            .iter()
            .find_map(|node| node.find_field(path))
            .or_else(|| self.sections().find_map(|group| group.field(path)))
    }

    pub fn group(&self, path: &HelmValuesPath) -> Option<&FormFieldGroup> {
        self.main
            .iter()
            .find_map(|node| node.find_group(path))
            .or_else(|| self.sections().find_map(|group| group.group(path)))
    }

    /// `true` while field errors block the launch.
    pub fn has_errors(&self) -> bool {
        !self.errored_form_fields.is_empty()
    }
}

// ---------------------------------------------------------------------------
// UI state
// ---------------------------------------------------------------------------

/// Presentation inputs that are not part of the values tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    /// Auto-injection groups the user switched off.
    pub disabled_auto_injections: BTreeSet<HelmValuesPath>,
    /// Errors reported from outside the engine (e.g. by the backend).
    pub external_errors: BTreeMap<HelmValuesPath, Vec<FieldErrorKind>>,
    /// Autocomplete options, which may arrive after the form was first built.
    pub suggestions: BTreeMap<HelmValuesPath, Vec<Value>>,
}

impl UiState {
    pub fn is_auto_injection_disabled(&self, path: &HelmValuesPath) -> bool {
        self.disabled_auto_injections.contains(path)
    }
}
