//! The launcher session: one chart, one Patch Store, one user.
//!
//! A [`LauncherSession`] owns every piece of mutable launcher state and
//! exposes explicit methods for each user action. All transitions are
//! synchronous. Backend access goes through the [`LauncherPort`] the session
//! was opened with; results of asynchronous work done by the caller
//! (autocomplete options, backend field errors) are fed in as plain inputs.
//!
//! Field edits are debounced: the caller passes the time of each edit and
//! calls [`LauncherSession::tick`] to apply the edits whose window elapsed.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{LauncherOptions, TextFormat};
use crate::context::apply_context;
use crate::error::{FieldError, FieldErrorKind, LauncherError};
use crate::form::{RootForm, UiState};
use crate::launch_script::launch_script;
use crate::mutate::{add_array_item, remove_array_item, reset_disabled_subtrees, toggle_auto_injected};
use crate::patch::PatchStore;
use crate::path::HelmValuesPath;
use crate::resolve::{compute_diff, resolve, to_json_patch};
use crate::restorable::RestorableConfig;
use crate::schema::{parse_schema, NodeKind, Primitive, SchemaNode};
use crate::text::{from_text, to_text};
use crate::validation::additional_validation;
use crate::values::get_in;
use crate::walker::derive_form;

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Identifies one chart version in one catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartKey {
    pub catalog_id: String,
    pub chart_name: String,
    /// Empty for "latest".
    pub chart_version: String,
}

/// What the backend knows about a chart version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSnapshot {
    pub chart_name: String,
    pub chart_version: String,
    pub values_schema: Value,
    #[serde(alias = "valuesYamlDefaults")]
    pub values_defaults: Value,
    /// Names of the chart's dependencies (sub-charts).
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Payload handed to the backend to install a release.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    pub release_name: String,
    pub catalog_id: String,
    pub chart_name: String,
    pub chart_version: String,
    pub values: Value,
    pub friendly_name: String,
    pub is_shared: bool,
    pub s3_config_id: Option<String>,
}

/// Backend capability used by a session.
pub trait LauncherPort {
    fn fetch_chart(&self, chart: &ChartKey) -> Result<ChartSnapshot, LauncherError>;

    fn launch(&self, request: &LaunchRequest) -> Result<(), LauncherError>;
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct PendingEdit {
    path: HelmValuesPath,
    value: Value,
    due: Instant,
    seq: u64,
}

/// The raw values editor, while open.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEditor {
    pub format: TextFormat,
    pub text: String,
    /// Set while `text` does not parse or does not fit the schema; the
    /// values tree keeps its last good state meanwhile.
    pub error: Option<RawTextError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawTextError {
    pub message: String,
    /// Path-scoped problems, for shape mismatches.
    pub fields: Vec<FieldError>,
}

impl From<LauncherError> for RawTextError {
    fn from(err: LauncherError) -> Self {
        let message = err.to_string();
        let fields = match err {
            LauncherError::ShapeMismatch { errors } => errors,
            _ => Vec::new(),
        };
        Self { message, fields }
    }
}

pub struct LauncherSession<P: LauncherPort> {
    port: P,
    options: LauncherOptions,
    context: Value,
    chart: ChartKey,
    dependencies: Vec<String>,
    schema: SchemaNode,
    /// Chart defaults after launch-context injection.
    defaults: Value,
    store: PatchStore,
    ui: UiState,
    pending: Vec<PendingEdit>,
    next_seq: u64,
    raw_editor: Option<RawEditor>,
    friendly_name: String,
    is_shared: bool,
    s3_config_id: Option<String>,
}

struct LoadedChart {
    dependencies: Vec<String>,
    schema: SchemaNode,
    defaults: Value,
    suggestions: BTreeMap<HelmValuesPath, Vec<Value>>,
}

fn load_chart<P: LauncherPort>(
    port: &P,
    chart: &ChartKey,
    options: &LauncherOptions,
    context: &Value,
) -> Result<LoadedChart, LauncherError> {
    let snapshot = port.fetch_chart(chart)?;
    let schema = parse_schema(&snapshot.values_schema, options.max_depth)?;
    let mut defaults = match snapshot.values_defaults {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    let suggestions = apply_context(&mut defaults, &schema, context);
    tracing::debug!(
        chart = %snapshot.chart_name,
        version = %snapshot.chart_version,
        dependencies = snapshot.dependencies.len(),
        "loaded chart"
    );
    Ok(LoadedChart {
        dependencies: snapshot.dependencies,
        schema,
        defaults,
        suggestions,
    })
}

impl<P: LauncherPort> LauncherSession<P> {
    /// Fetch `chart` through `port` and start from its defaults.
    ///
    /// `context` is the user/project object that `overwriteDefaultWith` and
    /// `overwriteListEnumWith` references are resolved against.
    pub fn open(
        port: P,
        chart: ChartKey,
        options: LauncherOptions,
        context: Value,
    ) -> Result<Self, LauncherError> {
        let loaded = load_chart(&port, &chart, &options, &context)?;
        Ok(Self {
            port,
            options,
            context,
            friendly_name: chart.chart_name.clone(),
            chart,
            dependencies: loaded.dependencies,
            schema: loaded.schema,
            defaults: loaded.defaults,
            store: PatchStore::new(),
            ui: UiState {
                suggestions: loaded.suggestions,
                ..UiState::default()
            },
            pending: Vec::new(),
            next_seq: 0,
            raw_editor: None,
            is_shared: false,
            s3_config_id: None,
        })
    }

    /// Reopen a bookmarked or linked configuration.
    pub fn restore(
        port: P,
        config: &RestorableConfig,
        options: LauncherOptions,
        context: Value,
    ) -> Result<Self, LauncherError> {
        let mut session = Self::open(port, config.chart_key(), options, context)?;
        session.store = config.patch_store();
        session.friendly_name = config.friendly_name.clone();
        session.is_shared = config.is_shared;
        session.s3_config_id = config.s3_config_id.clone();
        Ok(session)
    }

    /// Move to another chart version or catalog entry. The Patch Store and
    /// all UI state start over; on error the session is unchanged.
    pub fn switch_chart(&mut self, chart: ChartKey) -> Result<(), LauncherError> {
        let loaded = load_chart(&self.port, &chart, &self.options, &self.context)?;
        tracing::debug!(from = ?self.chart, to = ?chart, "switching chart");
        self.chart = chart;
        self.dependencies = loaded.dependencies;
        self.schema = loaded.schema;
        self.defaults = loaded.defaults;
        self.store.restore_all_default();
        self.ui = UiState {
            suggestions: loaded.suggestions,
            ..UiState::default()
        };
        self.pending.clear();
        self.raw_editor = None;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn chart(&self) -> &ChartKey {
        &self.chart
    }

    pub fn schema(&self) -> &SchemaNode {
        &self.schema
    }

    pub fn defaults(&self) -> &Value {
        &self.defaults
    }

    pub fn patch_store(&self) -> &PatchStore {
        &self.store
    }

    pub fn ui_state(&self) -> &UiState {
        &self.ui
    }

    pub fn options(&self) -> &LauncherOptions {
        &self.options
    }

    /// Effective values (pending edits not included).
    pub fn values(&self) -> Value {
        resolve(&self.defaults, &self.store, &self.schema)
    }

    pub fn form(&self) -> RootForm {
        derive_form(&self.schema, &self.values(), &self.ui, &self.dependencies)
    }

    pub fn has_pending_edits(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn raw_editor(&self) -> Option<&RawEditor> {
        self.raw_editor.as_ref()
    }

    // -----------------------------------------------------------------------
    // Field edits
    // -----------------------------------------------------------------------

    /// Queue an edit of the field at `path`, issued at `now`.
    ///
    /// Toggles (booleans, selects) use the toggle window, everything else the
    /// text window. A zero window applies the edit at once, after every
    /// earlier pending edit. A later edit of the same field replaces the
    /// queued one.
    pub fn edit_field(
        &mut self,
        path: HelmValuesPath,
        value: Value,
        now: Instant,
    ) -> Result<(), LauncherError> {
        self.check_editable(&path)?;
        let window = if self.is_toggle(&path) {
            self.options.toggle_debounce()
        } else {
            self.options.text_debounce()
        };

        self.pending.retain(|edit| edit.path != path);
        if window.is_zero() {
            self.flush_pending_edits();
            self.apply_value(path, value);
            return Ok(());
        }

        self.pending.push(PendingEdit {
            path,
            value,
            due: now + window,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        Ok(())
    }

    /// Apply every queued edit whose window has elapsed at `now`.
    pub fn tick(&mut self, now: Instant) {
        let (due, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.pending).into_iter().partition(|e| e.due <= now);
        self.pending = waiting;
        self.apply_in_order(due);
    }

    /// Apply every queued edit now.
    pub fn flush_pending_edits(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.apply_in_order(pending);
    }

    /// Drop every queued edit.
    pub fn discard_pending_edits(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(count = self.pending.len(), "discarding pending edits");
        }
        self.pending.clear();
    }

    fn apply_in_order(&mut self, mut edits: Vec<PendingEdit>) {
        edits.sort_by_key(|edit| edit.seq);
        for edit in edits {
            self.apply_value(edit.path, edit.value);
        }
    }

    /// Set the field at `path` immediately, bypassing the debounce.
    pub fn set_value(&mut self, path: HelmValuesPath, value: Value) -> Result<(), LauncherError> {
        self.check_editable(&path)?;
        self.pending.retain(|edit| edit.path != path);
        self.apply_value(path, value);
        Ok(())
    }

    /// Drop the user's override at `path`.
    pub fn unset_value(&mut self, path: &HelmValuesPath) {
        self.pending.retain(|edit| edit.path != *path);
        self.store.unset(path);
        self.refresh_raw_editor();
    }

    pub fn restore_all_defaults(&mut self) {
        self.pending.clear();
        self.store.restore_all_default();
        self.refresh_raw_editor();
    }

    fn check_editable(&self, path: &HelmValuesPath) -> Result<(), LauncherError> {
        if self.schema.allows(path.segments()) {
            Ok(())
        } else {
            Err(LauncherError::invariant(path, "path is not part of the values schema"))
        }
    }

    fn is_toggle(&self, path: &HelmValuesPath) -> bool {
        match self.schema.node_at(path.segments()).map(|node| &node.kind) {
            Some(NodeKind::Scalar(scalar)) => {
                scalar.primitive == Primitive::Boolean || scalar.enum_options.is_some()
            }
            _ => false,
        }
    }

    /// Record `value` at `path` keeping the store minimal: writes inside a
    /// container entry update that entry, and a value equal to what the
    /// defaults already produce drops the override.
    fn apply_value(&mut self, path: HelmValuesPath, value: Value) {
        if !self.store.set_within_container(&path, value.clone()) {
            let mut without = self.store.clone();
            without.unset(&path);
            let fallback = resolve(&self.defaults, &without, &self.schema);
            if get_in(&fallback, path.segments()) == Some(&value) {
                self.store = without;
            } else {
                self.store.set(path.clone(), value);
            }
        }
        tracing::debug!(path = %path, entries = self.store.len(), "applied field edit");
        self.refresh_raw_editor();
    }

    // -----------------------------------------------------------------------
    // Structural edits
    // -----------------------------------------------------------------------

    pub fn add_array_item(&mut self, array_path: &HelmValuesPath) -> Result<(), LauncherError> {
        self.flush_pending_edits();
        add_array_item(&mut self.store, &self.defaults, &self.schema, array_path)?;
        self.refresh_raw_editor();
        Ok(())
    }

    pub fn remove_array_item(
        &mut self,
        array_path: &HelmValuesPath,
        index: usize,
    ) -> Result<(), LauncherError> {
        self.flush_pending_edits();
        remove_array_item(&mut self.store, &self.defaults, &self.schema, array_path, index)?;
        self.refresh_raw_editor();
        Ok(())
    }

    pub fn toggle_auto_injected(
        &mut self,
        path: &HelmValuesPath,
        is_auto_injected: bool,
    ) -> Result<(), LauncherError> {
        toggle_auto_injected(&mut self.ui, &self.schema, path, is_auto_injected)
    }

    /// Autocomplete options for the field at `path`; may arrive at any time.
    pub fn set_suggestions(&mut self, path: HelmValuesPath, options: Vec<Value>) {
        self.ui.suggestions.insert(path, options);
    }

    /// Errors reported by the backend for the field at `path`. An empty list
    /// clears them.
    pub fn set_external_errors(&mut self, path: HelmValuesPath, errors: Vec<FieldErrorKind>) {
        if errors.is_empty() {
            self.ui.external_errors.remove(&path);
        } else {
            self.ui.external_errors.insert(path, errors);
        }
    }

    // -----------------------------------------------------------------------
    // Raw editor
    // -----------------------------------------------------------------------

    /// Show the values as text, in `format` or the configured default.
    pub fn open_raw_editor(&mut self, format: Option<TextFormat>) -> Result<(), LauncherError> {
        self.flush_pending_edits();
        let format = format.unwrap_or(self.options.text_format);
        let text = to_text(&self.values(), format)?;
        self.raw_editor = Some(RawEditor {
            format,
            text,
            error: None,
        });
        Ok(())
    }

    /// Replace the raw text. Text that parses and fits the schema replaces
    /// the Patch Store with its minimal diff; otherwise the error is kept on
    /// the editor and the store is left alone.
    pub fn update_raw_text(&mut self, text: String) -> Result<(), LauncherError> {
        let Some(editor) = self.raw_editor.as_mut() else {
            return Err(LauncherError::invariant(
                &HelmValuesPath::root(),
                "raw editor is not open",
            ));
        };
        match from_text(&text, editor.format, &self.defaults, &self.schema) {
            Ok(entries) => {
                self.store = PatchStore::from_diff_list(entries);
                editor.error = None;
            }
            Err(err) => {
                tracing::debug!(error = %err, "raw text rejected");
                editor.error = Some(err.into());
            }
        }
        editor.text = text;
        Ok(())
    }

    /// Close the raw editor. Text that never parsed is discarded.
    pub fn close_raw_editor(&mut self) {
        if let Some(editor) = self.raw_editor.take() {
            if editor.error.is_some() {
                tracing::debug!("discarding unparsed raw text");
            }
        }
    }

    fn refresh_raw_editor(&mut self) {
        let values = self.values();
        if let Some(editor) = self.raw_editor.as_mut() {
            if editor.error.is_some() {
                return;
            }
            match to_text(&values, editor.format) {
                Ok(text) => editor.text = text,
                Err(err) => tracing::warn!(error = %err, "cannot render values as text"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Launch
    // -----------------------------------------------------------------------

    pub fn set_friendly_name(&mut self, name: impl Into<String>) {
        self.friendly_name = name.into();
    }

    pub fn set_shared(&mut self, is_shared: bool) {
        self.is_shared = is_shared;
    }

    pub fn set_s3_config_id(&mut self, id: Option<String>) {
        self.s3_config_id = id;
    }

    /// Values to install: effective values with switched-off auto-injection
    /// groups back at their defaults.
    pub fn final_helm_values(&self) -> Value {
        let mut values = self.values();
        reset_disabled_subtrees(&mut values, &self.defaults, &self.ui);
        values
    }

    /// Patch entries equivalent to [`Self::final_helm_values`].
    pub fn final_patch_entries(&self) -> Vec<crate::patch::PatchEntry> {
        compute_diff(&self.defaults, &self.final_helm_values(), &self.schema)
    }

    /// Kubernetes-safe release name derived from the friendly name.
    pub fn release_name(&self) -> String {
        let mut name = String::new();
        for ch in self.friendly_name.chars() {
            if ch.is_ascii_alphanumeric() {
                name.push(ch.to_ascii_lowercase());
            } else if !name.ends_with('-') {
                name.push('-');
            }
        }
        let name: String = name.trim_matches('-').chars().take(53).collect();
        let name = name.trim_end_matches('-');
        if name.is_empty() {
            self.chart.chart_name.clone()
        } else {
            name.to_string()
        }
    }

    pub fn launch_script_text(&self) -> String {
        let values = self.final_helm_values();
        let entries = compute_diff(&self.defaults, &values, &self.schema);
        launch_script(&self.release_name(), &self.chart, &entries, &values)
    }

    pub fn json_patch(&self) -> json_patch::Patch {
        to_json_patch(&self.defaults, &self.store, &self.schema)
    }

    pub fn restorable_config(&self) -> RestorableConfig {
        RestorableConfig {
            catalog_id: self.chart.catalog_id.clone(),
            chart_name: self.chart.chart_name.clone(),
            chart_version: self.chart.chart_version.clone(),
            friendly_name: self.friendly_name.clone(),
            is_shared: self.is_shared,
            s3_config_id: self.s3_config_id.clone(),
            patch_entries: self.store.to_diff_list(),
        }
    }

    /// Why a launch would be refused right now, if anything.
    pub fn launch_blocker(&self) -> Option<String> {
        if let Some(RawEditor {
            error: Some(error), ..
        }) = &self.raw_editor
        {
            return Some(format!("raw values text is invalid: {}", error.message));
        }
        let errors = additional_validation(&self.final_helm_values(), &self.schema).len()
            + self.ui.external_errors.values().map(Vec::len).sum::<usize>();
        (errors > 0).then(|| format!("{errors} field error(s) outstanding"))
    }

    /// Flush pending edits, check for errors and hand the launch to the port.
    pub fn launch(&mut self) -> Result<LaunchRequest, LauncherError> {
        self.flush_pending_edits();
        if let Some(reason) = self.launch_blocker() {
            return Err(LauncherError::LaunchBlocked { reason });
        }
        let request = LaunchRequest {
            release_name: self.release_name(),
            catalog_id: self.chart.catalog_id.clone(),
            chart_name: self.chart.chart_name.clone(),
            chart_version: self.chart.chart_version.clone(),
            values: self.final_helm_values(),
            friendly_name: self.friendly_name.clone(),
            is_shared: self.is_shared,
            s3_config_id: self.s3_config_id.clone(),
        };
        self.port.launch(&request)?;
        tracing::debug!(release = %request.release_name, "launched");
        Ok(request)
    }

    /// End the session: pending edits are flushed and the resulting
    /// configuration is returned for persistence.
    pub fn close(mut self) -> RestorableConfig {
        self.flush_pending_edits();
        self.restorable_config()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
