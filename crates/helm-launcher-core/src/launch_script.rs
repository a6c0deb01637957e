//! Shell rendering of a launch as a `helm install` command.

use serde_json::Value;

use crate::patch::PatchEntry;
use crate::path::{HelmValuesPath, PathSegment};
use crate::session::ChartKey;
use crate::values::get_in;

/// Render the `helm install` command equivalent to launching `chart` with
/// `entries` applied over its defaults. `values` is the resolved result of
/// those entries.
///
/// Strings go through `--set-string` so Helm keeps them as strings, nested
/// structures through `--set-json`, and deleted keys become `null` (Helm
/// removes keys set to null). Helm cannot truncate an array, so a deletion
/// at an array index sets the whole shortened array from `values`.
pub fn launch_script(
    release_name: &str,
    chart: &ChartKey,
    entries: &[PatchEntry],
    values: &Value,
) -> String {
    let mut lines = vec![format!(
        "helm install {} {}/{}",
        shell_quote(release_name),
        shell_quote(&chart.catalog_id),
        shell_quote(&chart.chart_name)
    )];
    if !chart.chart_version.is_empty() {
        lines[0].push_str(&format!(" --version {}", shell_quote(&chart.chart_version)));
    }

    for entry in entries {
        let path = entry.path.to_string();
        let line = match &entry.value {
            None => match truncated_array(entry, values) {
                Some((array_path, array)) => format!(
                    "--set-json {}",
                    shell_quote(&format!("{array_path}={array}"))
                ),
                None => format!("--set {}", shell_quote(&format!("{path}=null"))),
            },
            Some(Value::Null) => format!("--set {}", shell_quote(&format!("{path}=null"))),
            Some(Value::String(s)) => format!(
                "--set-string {}",
                shell_quote(&format!("{path}={}", escape_set_value(s)))
            ),
            Some(value @ (Value::Bool(_) | Value::Number(_))) => {
                format!("--set {}", shell_quote(&format!("{path}={value}")))
            }
            Some(container) => format!("--set-json {}", shell_quote(&format!("{path}={container}"))),
        };
        lines.push(format!("  {line}"));
    }

    lines.join(" \\\n")
}

/// Path and resolved value of the array a deletion at an index truncates.
fn truncated_array<'a>(entry: &PatchEntry, values: &'a Value) -> Option<(String, &'a Value)> {
    let (last, parent) = entry.path.segments().split_last()?;
    if !matches!(last, PathSegment::Index(_)) || parent.is_empty() {
        return None;
    }
    let array = get_in(values, parent).filter(|v| v.is_array())?;
    let array_path: HelmValuesPath = parent.to_vec().into();
    Some((array_path.to_string(), array))
}

/// Helm splits `--set` arguments on commas; a literal comma and backslash
/// must be escaped.
fn escape_set_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace(',', "\\,")
}

/// Single-quote `arg` for a POSIX shell unless it is made of safe characters.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+[]".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn chart() -> ChartKey {
        ChartKey {
            catalog_id: "ide".into(),
            chart_name: "jupyter-python".into(),
            chart_version: "2.1.0".into(),
        }
    }

    #[test]
    fn test_script_without_entries() {
        assert_eq!(
            launch_script("jupyter-python-1234", &chart(), &[], &json!({})),
            "helm install jupyter-python-1234 ide/jupyter-python --version 2.1.0"
        );
    }

    #[test]
    fn test_script_renders_each_value_kind() {
        let entries = vec![
            PatchEntry::set(path!["replicas"], json!(2)),
            PatchEntry::set(path!["resources", "limits", "memory"], json!("2Gi")),
            PatchEntry::set(path!["args"], json!("a,b")),
            PatchEntry::set(path!["greeting"], json!("it's")),
            PatchEntry::set(path!["podAnnotations"], json!({"a": "b"})),
            PatchEntry::delete(path!["sidecar"]),
        ];
        let script = launch_script("nb", &chart(), &entries, &json!({}));
        assert_eq!(
            script,
            "helm install nb ide/jupyter-python --version 2.1.0 \\\n\
             \x20 --set replicas=2 \\\n\
             \x20 --set-string resources.limits.memory=2Gi \\\n\
             \x20 --set-string 'args=a\\,b' \\\n\
             \x20 --set-string 'greeting=it'\\''s' \\\n\
             \x20 --set-json 'podAnnotations={\"a\":\"b\"}' \\\n\
             \x20 --set sidecar=null"
        );
    }

    #[test]
    fn test_array_truncation_sets_the_shortened_array() {
        let entries = vec![
            PatchEntry::set(path!["env", 0, "name"], json!("B")),
            PatchEntry::delete(path!["env", 1]),
        ];
        let values = json!({"env": [{"name": "B", "value": "2"}]});
        let script = launch_script("nb", &chart(), &entries, &values);
        assert_eq!(
            script,
            "helm install nb ide/jupyter-python --version 2.1.0 \\\n\
             \x20 --set-string env[0].name=B \\\n\
             \x20 --set-json 'env=[{\"name\":\"B\",\"value\":\"2\"}]'"
        );
    }
}
