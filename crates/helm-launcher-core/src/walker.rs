//! Schema Walker: derives the form tree from a schema and a values tree.
//!
//! The walk is a single recursive descent over the schema, reading the
//! current value at each position. Objects become groups (declared property
//! order), arrays become groups with one sub-group per element, scalars
//! become fields classified into their most specific [`ScalarKind`]:
//!
//! 1. explicit `x-onyxia.render` hint
//! 2. `enum` options (select)
//! 3. format hints: slider bounds, paired range ends, opaque object/array
//! 4. primitive type
//!
//! [`ScalarKind`]: crate::form::ScalarKind

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{FieldError, FieldErrorKind};
use crate::form::{FieldKind, FormField, FormFieldGroup, FormNode, RangeEnd, RootForm, UiState};
use crate::path::{HelmValuesPath, PathSegment};
use crate::schema::{
    NodeKind, NodeMeta, ObjectSchema, Primitive, Property, RenderHint, ScalarSchema, SchemaNode,
    XOnyxia,
};
use crate::validation::{
    additional_validation, is_hidden, numeric_part, range_pairs, slider_bounds, RangeEnds,
    RangePair,
};
use crate::values::get_in;

/// Key of the values block shared by a chart and its dependencies.
pub const GLOBAL_KEY: &str = "global";

/// Derive the complete form for `values`.
///
/// Top-level properties named after a chart dependency are walked into
/// [`RootForm::dependencies`], the `global` block into [`RootForm::global`];
/// everything else lands in [`RootForm::main`]. Never fails: nodes that
/// cannot be rendered are skipped with a warning.
pub fn derive_form(
    schema: &SchemaNode,
    values: &Value,
    ui: &UiState,
    dependencies: &[String],
) -> RootForm {
    let mut errors = additional_validation(values, schema);
    for (path, kinds) in &ui.external_errors {
        errors.extend(kinds.iter().map(|kind| FieldError::new(path.clone(), kind.clone())));
    }

    let mut errors_by_path: BTreeMap<HelmValuesPath, Vec<FieldErrorKind>> = BTreeMap::new();
    for error in &errors {
        errors_by_path
            .entry(error.path.clone())
            .or_default()
            .push(error.kind.clone());
    }

    let walker = Walker {
        root: values,
        ui,
        errors: &errors_by_path,
    };

    let mut form = RootForm {
        main: Vec::new(),
        global: None,
        dependencies: BTreeMap::new(),
        errored_form_fields: errors,
    };

    let root = HelmValuesPath::root();
    match &schema.kind {
        NodeKind::Object(object) => {
            for node in walker.walk_properties(object, &root, false) {
                let name = node
                    .path()
                    .last()
                    .and_then(PathSegment::as_key)
                    .map(str::to_string);
                match (node, name) {
                    (FormNode::Group(group), Some(name)) if name == GLOBAL_KEY => {
                        form.global = Some(group);
                    }
                    (FormNode::Group(group), Some(name)) if dependencies.contains(&name) => {
                        form.dependencies.insert(name, group);
                    }
                    (node, _) => form.main.push(node),
                }
            }
        }
        _ => form.main.extend(walker.walk(schema, &root, "values", false, false)),
    }

    tracing::debug!(
        main = form.main.len(),
        dependencies = form.dependencies.len(),
        errors = form.errored_form_fields.len(),
        "derived form"
    );
    form
}

struct Walker<'a> {
    root: &'a Value,
    ui: &'a UiState,
    errors: &'a BTreeMap<HelmValuesPath, Vec<FieldErrorKind>>,
}

impl Walker<'_> {
    fn value_at(&self, path: &HelmValuesPath) -> Value {
        get_in(self.root, path.segments())
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn errors_at(&self, path: &HelmValuesPath) -> Vec<FieldErrorKind> {
        self.errors.get(path).cloned().unwrap_or_default()
    }

    /// Walk one schema node. `None` when the node is omitted (hidden
    /// scalars, unsupported nodes).
    fn walk(
        &self,
        node: &SchemaNode,
        path: &HelmValuesPath,
        name: &str,
        required: bool,
        readonly: bool,
    ) -> Option<FormNode> {
        let hidden = is_hidden(&node.meta.x_onyxia, self.root, path);
        let readonly = readonly || node.meta.read_only;

        match &node.kind {
            NodeKind::Object(object) => {
                let mut group = self.group(&node.meta, path, name, hidden);
                let mut readonly = readonly;
                if node.meta.x_onyxia.auto_injection {
                    let enabled = !self.ui.is_auto_injection_disabled(path);
                    group.is_auto_injected = Some(enabled);
                    readonly = readonly || !enabled;
                }
                group.nodes = self.walk_properties(object, path, readonly);
                Some(FormNode::Group(group))
            }
            NodeKind::Array(array) => {
                let mut group = self.group(&node.meta, path, name, hidden);
                let len = match get_in(self.root, path.segments()) {
                    Some(Value::Array(items)) => items.len(),
                    _ => 0,
                };
                group.can_add = !readonly && array.max_items.map_or(true, |max| len < max);
                group.nodes = (0..len)
                    .map(|index| {
                        let element_path = path.index(index);
                        let title = format!("{} {}", group.title, index + 1);
                        let mut element = FormFieldGroup {
                            helm_values_path: element_path.clone(),
                            title: title.clone(),
                            description: None,
                            can_add: false,
                            can_remove: !readonly && len > array.min_items,
                            is_hidden: false,
                            is_auto_injected: None,
                            errors: Vec::new(),
                            nodes: Vec::new(),
                        };
                        element.nodes = match &array.items.kind {
                            NodeKind::Object(object) => {
                                self.walk_properties(object, &element_path, readonly)
                            }
                            _ => self
                                .walk(&array.items, &element_path, &title, false, readonly)
                                .into_iter()
                                .collect(),
                        };
                        FormNode::Group(element)
                    })
                    .collect();
                Some(FormNode::Group(group))
            }
            NodeKind::Scalar(scalar) => {
                if hidden {
                    return None;
                }
                let kind = self.classify(scalar, &node.meta.x_onyxia, path);
                Some(FormNode::Field(self.field(&node.meta, path, name, required, readonly, kind)))
            }
            NodeKind::Unsupported { reason } => {
                tracing::debug!(path = %path, %reason, "skipping unsupported node");
                None
            }
        }
    }

    fn walk_properties(
        &self,
        object: &ObjectSchema,
        path: &HelmValuesPath,
        readonly: bool,
    ) -> Vec<FormNode> {
        let roles = range_roles(object, path);
        let mut nodes = Vec::new();
        for property in &object.properties {
            let child_path = path.key(&property.name);
            match roles.get(property.name.as_str()) {
                Some(RangeRole::Low(pair)) => {
                    if let Some(field) = self.range_field(pair, path, readonly) {
                        nodes.push(FormNode::Field(field));
                    }
                    continue;
                }
                Some(RangeRole::High) => continue,
                None => {}
            }
            nodes.extend(self.walk(
                &property.node,
                &child_path,
                &property.name,
                property.required,
                readonly,
            ));
        }
        nodes
    }

    fn group(
        &self,
        meta: &NodeMeta,
        path: &HelmValuesPath,
        name: &str,
        hidden: bool,
    ) -> FormFieldGroup {
        FormFieldGroup {
            helm_values_path: path.clone(),
            title: meta.title.clone().unwrap_or_else(|| name.to_string()),
            description: meta.description.clone(),
            can_add: false,
            can_remove: false,
            is_hidden: hidden,
            is_auto_injected: None,
            errors: self.errors_at(path),
            nodes: Vec::new(),
        }
    }

    fn field(
        &self,
        meta: &NodeMeta,
        path: &HelmValuesPath,
        name: &str,
        required: bool,
        readonly: bool,
        kind: FieldKind,
    ) -> FormField {
        FormField {
            helm_values_path: path.clone(),
            title: meta.title.clone().unwrap_or_else(|| name.to_string()),
            description: meta.description.clone(),
            is_readonly: readonly,
            is_required: required,
            errors: self.errors_at(path),
            kind,
        }
    }

    // -----------------------------------------------------------------------
    // Scalar classification
    // -----------------------------------------------------------------------

    fn classify(&self, scalar: &ScalarSchema, ext: &XOnyxia, path: &HelmValuesPath) -> FieldKind {
        let value = self.value_at(path);

        match ext.render_hint() {
            Some(RenderHint::TextArea) => return FieldKind::TextArea { value },
            Some(RenderHint::Password) => {
                return FieldKind::String {
                    value,
                    pattern: scalar.pattern.as_ref().map(|p| p.as_str().to_string()),
                    is_password: true,
                }
            }
            Some(RenderHint::List) => {
                let suggestions = self
                    .ui
                    .suggestions
                    .get(path)
                    .cloned()
                    .unwrap_or_else(|| ext.list_enum.clone());
                return FieldKind::FreeText { value, suggestions };
            }
            Some(RenderHint::Slider) => match slider_bounds(scalar, ext) {
                Some(bounds) => {
                    let number = numeric_part(&value, bounds.unit.as_deref());
                    return FieldKind::Slider {
                        value,
                        number,
                        bounds,
                    };
                }
                None => {
                    tracing::warn!(path = %path, "slider without bounds, rendering as plain field");
                }
            },
            Some(RenderHint::Yaml) => {
                return FieldKind::YamlBlock {
                    value,
                    expected: scalar.primitive.name(),
                }
            }
            None => {}
        }

        if let Some(options) = &scalar.enum_options {
            return FieldKind::EnumSelect {
                value,
                options: options.clone(),
            };
        }

        if ext.slider_min.is_some() && ext.slider_max.is_some() {
            if let Some(bounds) = slider_bounds(scalar, ext) {
                let number = numeric_part(&value, bounds.unit.as_deref());
                return FieldKind::Slider {
                    value,
                    number,
                    bounds,
                };
            }
        }

        match scalar.primitive {
            Primitive::Boolean => FieldKind::Boolean { value },
            Primitive::Integer => FieldKind::Integer {
                value,
                minimum: scalar.minimum,
                maximum: scalar.maximum,
            },
            Primitive::Number => FieldKind::Number {
                value,
                minimum: scalar.minimum,
                maximum: scalar.maximum,
            },
            Primitive::String => FieldKind::String {
                value,
                pattern: scalar.pattern.as_ref().map(|p| p.as_str().to_string()),
                is_password: false,
            },
            Primitive::Object | Primitive::Array => FieldKind::YamlBlock {
                value,
                expected: scalar.primitive.name(),
            },
        }
    }

    fn range_field(
        &self,
        pair: &RangePair<'_>,
        parent: &HelmValuesPath,
        readonly: bool,
    ) -> Option<FormField> {
        let (low, high, bounds) = (pair.low, pair.high, &pair.bounds);
        let low_path = parent.key(&low.name);
        let high_path = parent.key(&high.name);
        let low_hidden = is_hidden(&low.node.meta.x_onyxia, self.root, &low_path);
        let high_hidden = is_hidden(&high.node.meta.x_onyxia, self.root, &high_path);
        if low_hidden && high_hidden {
            return None;
        }

        let end = |property: &Property, path: &HelmValuesPath| {
            let value = self.value_at(path);
            RangeEnd {
                helm_values_path: path.clone(),
                title: property
                    .node
                    .meta
                    .title
                    .clone()
                    .unwrap_or_else(|| property.name.clone()),
                semantic: property.node.meta.x_onyxia.slider_extremity_semantic.clone(),
                number: numeric_part(&value, bounds.unit.as_deref()),
                value,
            }
        };
        let kind = FieldKind::RangeSlider {
            low: end(low, &low_path),
            high: end(high, &high_path),
            bounds: bounds.clone(),
        };

        let mut field = self.field(
            &low.node.meta,
            &low_path,
            &low.name,
            low.required || high.required,
            readonly || low.node.meta.read_only || high.node.meta.read_only,
            kind,
        );
        for error in self.errors_at(&high_path) {
            if !field.errors.contains(&error) {
                field.errors.push(error);
            }
        }
        Some(field)
    }
}

// ---------------------------------------------------------------------------
// Range pairing
// ---------------------------------------------------------------------------

enum RangeRole<'a> {
    Low(RangePair<'a>),
    High,
}

/// Role of each range-slider end among the properties of `object`.
///
/// A complete pair renders as one range slider at the position of its lower
/// end. Anything else falls back to independent fields.
fn range_roles<'a>(object: &'a ObjectSchema, path: &HelmValuesPath) -> BTreeMap<&'a str, RangeRole<'a>> {
    let mut roles = BTreeMap::new();
    for ends in range_pairs(object) {
        match ends {
            RangeEnds::Paired(pair) => {
                let (low, high) = (pair.low, pair.high);
                roles.insert(high.name.as_str(), RangeRole::High);
                roles.insert(low.name.as_str(), RangeRole::Low(pair));
            }
            RangeEnds::Unpaired { id, reason } => tracing::warn!(
                path = %path,
                range_id = %id,
                %reason,
                "incomplete range slider, rendering its ends as independent fields"
            ),
        }
    }
    roles
}

// ===========================================================================
// Tests
// ===========================================================================
