//! # helm-launcher-core
//!
//! Form derivation and patch reconciliation for a Helm chart launcher.
//!
//! A chart ships a `values.schema.json` and a `values.yaml`. This crate turns
//! the schema into a form tree ([`derive_form`]), records what the user
//! changed as a minimal ordered set of patches ([`PatchStore`]), resolves the
//! values that will actually be installed ([`resolve`]) and keeps a raw
//! YAML/JSON view of those values in sync with the form ([`to_text`],
//! [`from_text`]).
//!
//! [`LauncherSession`] ties the pieces together for one user and one chart.
//! Everything else is a pure function over plain [`serde_json::Value`] trees
//! and can be used on its own.
//!
//! ```
//! use helm_launcher_core::{path, parse_schema, resolve, PatchStore};
//! use serde_json::json;
//!
//! let schema = parse_schema(
//!     &json!({"type": "object", "properties": {"replicas": {"type": "integer"}}}),
//!     32,
//! )?;
//! let defaults = json!({"replicas": 1});
//!
//! let mut store = PatchStore::new();
//! store.set(path!["replicas"], json!(3));
//! assert_eq!(resolve(&defaults, &store, &schema), json!({"replicas": 3}));
//! # Ok::<(), helm_launcher_core::LauncherError>(())
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod form;
pub mod launch_script;
pub mod mutate;
pub mod patch;
pub mod path;
pub mod resolve;
pub mod restorable;
pub mod schema;
pub mod session;
pub mod text;
pub mod url_codec;
pub mod validation;
mod values;
pub mod walker;

pub use config::{LauncherOptions, TextFormat};
pub use context::{apply_context, resolve_reference};
pub use error::{ErrorCode, FieldError, FieldErrorKind, LauncherError};
pub use form::{
    FieldKind, FormField, FormFieldGroup, FormNode, RangeEnd, RootForm, ScalarKind, SliderBounds,
    UiState,
};
pub use launch_script::launch_script;
pub use mutate::{add_array_item, remove_array_item, reset_disabled_subtrees, toggle_auto_injected};
pub use patch::{PatchEntry, PatchOp, PatchStore};
pub use path::{HelmValuesPath, PathSegment};
pub use resolve::{compute_diff, resolve, to_json_patch};
pub use restorable::RestorableConfig;
pub use schema::{parse_schema, NodeKind, SchemaNode, XOnyxia};
pub use session::{
    ChartKey, ChartSnapshot, LaunchRequest, LauncherPort, LauncherSession, RawEditor, RawTextError,
};
pub use text::{from_text, parse_text, to_text};
pub use url_codec::{decode_patch_query, encode_patch_query};
pub use validation::additional_validation;
pub use values::get_in;
pub use walker::derive_form;
