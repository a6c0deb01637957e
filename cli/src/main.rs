use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use helm_launcher_core::{
    decode_patch_query, encode_patch_query, ChartKey, ChartSnapshot, HelmValuesPath,
    LaunchRequest, LauncherError, LauncherOptions, LauncherPort, LauncherSession, PatchEntry,
    RestorableConfig, TextFormat,
};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "helm-launcher")]
#[command(about = "Derive launcher forms, resolve values and encode patches for Helm charts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the form derived from a chart's values schema
    Form {
        #[command(flatten)]
        chart: ChartArgs,

        /// Output file (defaults to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },

    /// Print the values that would be installed
    Resolve {
        #[command(flatten)]
        chart: ChartArgs,

        /// Output file (defaults to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print YAML instead of JSON
        #[arg(long)]
        yaml: bool,

        /// Output format (JSON only)
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },

    /// Compute the patch entries turning the chart defaults into a values file
    Diff {
        /// Chart directory (Chart.yaml, values.yaml, values.schema.json)
        chart_dir: PathBuf,

        /// Edited values file (.json is read as JSON, anything else as YAML)
        values: PathBuf,

        /// Print an auto-launch query string instead of JSON entries
        #[arg(long)]
        query: bool,

        /// Launch context (JSON) for overwriteDefaultWith references
        #[arg(long)]
        context: Option<PathBuf>,

        /// Launcher options file (JSON)
        #[arg(long)]
        options: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },

    /// Convert patch entries to and from URL query strings
    Url {
        #[command(subcommand)]
        action: UrlAction,
    },

    /// Print the `helm install` command equivalent to a launch
    Script {
        #[command(flatten)]
        chart: ChartArgs,

        /// Friendly name; the release name is derived from it
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum UrlAction {
    /// Encode a JSON list of patch entries
    Encode {
        /// Patch entries file (JSON array of {path, value})
        input: PathBuf,
    },

    /// Decode a query string into JSON patch entries
    Decode {
        /// Query string, with or without the leading '?'
        query: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
}

/// Chart and user edits shared by the commands that open a session.
#[derive(Args)]
struct ChartArgs {
    /// Chart directory (Chart.yaml, values.yaml, values.schema.json)
    chart_dir: PathBuf,

    /// Catalog the chart belongs to
    #[arg(long, default_value = "local")]
    catalog: String,

    /// Patch entries file (JSON array of {path, value})
    #[arg(long, conflicts_with = "query")]
    patch: Option<PathBuf>,

    /// Patch entries as an auto-launch query string
    #[arg(long)]
    query: Option<String>,

    /// Auto-injection group to switch off (dotted path, repeatable)
    #[arg(long = "no-inject", value_name = "PATH")]
    no_inject: Vec<String>,

    /// Launch context (JSON) for overwriteDefaultWith references
    #[arg(long)]
    context: Option<PathBuf>,

    /// Launcher options file (JSON)
    #[arg(long)]
    options: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    Pretty,
    Compact,
}

// ---------------------------------------------------------------------------
// Local chart port
// ---------------------------------------------------------------------------

/// Serves a chart from a directory on disk. Launching is not supported.
struct LocalChartPort {
    dir: PathBuf,
}

impl LocalChartPort {
    fn read(&self, file: &str) -> Result<String, LauncherError> {
        let path = self.dir.join(file);
        fs::read_to_string(&path)
            .map_err(|e| LauncherError::PortFailure(format!("{}: {e}", path.display())))
    }

    fn chart_yaml(&self) -> Result<Value, LauncherError> {
        Ok(serde_yaml_ng::from_str(&self.read("Chart.yaml")?)?)
    }

    fn chart_key(&self, catalog: &str) -> Result<ChartKey> {
        let chart_yaml = self.chart_yaml()?;
        let name = chart_yaml["name"]
            .as_str()
            .context("Chart.yaml has no name")?
            .to_string();
        Ok(ChartKey {
            catalog_id: catalog.to_string(),
            chart_name: name,
            chart_version: chart_yaml["version"].as_str().unwrap_or_default().to_string(),
        })
    }
}

impl LauncherPort for LocalChartPort {
    fn fetch_chart(&self, chart: &ChartKey) -> Result<ChartSnapshot, LauncherError> {
        let chart_yaml = self.chart_yaml()?;
        let dependencies = chart_yaml["dependencies"]
            .as_array()
            .map(|deps| {
                deps.iter()
                    .filter_map(|dep| dep["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let values_defaults = match self.read("values.yaml") {
            Ok(text) => serde_yaml_ng::from_str(&text)?,
            Err(_) => Value::Null,
        };
        Ok(ChartSnapshot {
            chart_name: chart.chart_name.clone(),
            chart_version: chart.chart_version.clone(),
            values_schema: serde_json::from_str(&self.read("values.schema.json")?)?,
            values_defaults,
            dependencies,
        })
    }

    fn launch(&self, request: &LaunchRequest) -> Result<(), LauncherError> {
        Err(LauncherError::PortFailure(format!(
            "cannot launch '{}' from a local chart directory",
            request.release_name
        )))
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for output
    let log_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Form {
            chart,
            output,
            format,
        } => {
            let session = open_session(&chart, None)?;
            write_json(&session.form(), output.as_ref(), format)?;
        }
        Commands::Resolve {
            chart,
            output,
            yaml,
            format,
        } => {
            let session = open_session(&chart, None)?;
            let values = session.final_helm_values();
            if yaml {
                let text = helm_launcher_core::to_text(&values, TextFormat::Yaml)
                    .context("Failed to render values as YAML")?;
                write_text(&text, output.as_ref())?;
            } else {
                write_json(&values, output.as_ref(), format)?;
            }
        }
        Commands::Diff {
            chart_dir,
            values,
            query,
            context,
            options,
            format,
        } => {
            let port = LocalChartPort { dir: chart_dir };
            let key = port.chart_key("local")?;
            let mut session = LauncherSession::open(
                port,
                key,
                load_options(options.as_deref())?,
                load_context(context.as_deref())?,
            )
            .context("Failed to open chart")?;

            let text = fs::read_to_string(&values)
                .with_context(|| format!("Failed to read values file: {}", values.display()))?;
            let text_format = match values.extension().and_then(|ext| ext.to_str()) {
                Some("json") => TextFormat::Json,
                _ => TextFormat::Yaml,
            };
            session.open_raw_editor(Some(text_format))?;
            session.update_raw_text(text)?;
            if let Some(error) = session.raw_editor().and_then(|editor| editor.error.as_ref()) {
                for field in &error.fields {
                    eprintln!("Error: {}: {}", field.path, field.kind);
                }
                bail!("Invalid values file {}: {}", values.display(), error.message);
            }

            let entries = session.patch_store().to_diff_list();
            if query {
                write_text(&encode_patch_query(&entries), None)?;
            } else {
                write_json(&entries, None, format)?;
            }
        }
        Commands::Url { action } => match action {
            UrlAction::Encode { input } => {
                let entries: Vec<PatchEntry> = read_json(&input)?;
                write_text(&encode_patch_query(&entries), None)?;
            }
            UrlAction::Decode { query, format } => {
                let entries = decode_patch_query(query.trim())
                    .map_err(|e| anyhow::Error::from(e).context("Failed to decode query"))?;
                write_json(&entries, None, format)?;
            }
        },
        Commands::Script { chart, name } => {
            let session = open_session(&chart, name)?;
            for error in session.form().errored_form_fields {
                eprintln!("Warning: {}: {}", error.path, error.kind);
            }
            write_text(&session.launch_script_text(), None)?;
        }
    }

    Ok(())
}

/// Open a session on the chart and replay the user's edits.
fn open_session(
    args: &ChartArgs,
    friendly_name: Option<String>,
) -> Result<LauncherSession<LocalChartPort>> {
    let port = LocalChartPort {
        dir: args.chart_dir.clone(),
    };
    let key = port.chart_key(&args.catalog)?;

    let patch_entries = match (&args.patch, &args.query) {
        (Some(path), _) => read_json(path)?,
        (None, Some(query)) => decode_patch_query(query.trim())
            .map_err(|e| anyhow::Error::from(e).context("Failed to decode --query"))?,
        (None, None) => Vec::new(),
    };
    let config = RestorableConfig {
        catalog_id: key.catalog_id,
        friendly_name: friendly_name.unwrap_or_else(|| key.chart_name.clone()),
        chart_name: key.chart_name,
        chart_version: key.chart_version,
        is_shared: false,
        s3_config_id: None,
        patch_entries,
    };

    let mut session = LauncherSession::restore(
        port,
        &config,
        load_options(args.options.as_deref())?,
        load_context(args.context.as_deref())?,
    )
    .with_context(|| format!("Failed to open chart: {}", args.chart_dir.display()))?;

    for dotted in &args.no_inject {
        let path: HelmValuesPath = dotted
            .parse()
            .with_context(|| format!("Invalid --no-inject path: {dotted}"))?;
        session.toggle_auto_injected(&path, false)?;
    }
    Ok(session)
}

fn load_options(path: Option<&Path>) -> Result<LauncherOptions> {
    match path {
        Some(path) => read_json(path),
        None => Ok(LauncherOptions::default()),
    }
}

fn load_context(path: Option<&Path>) -> Result<Value> {
    match path {
        Some(path) => read_json(path),
        None => Ok(Value::Object(Default::default())),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse JSON from: {}", path.display()))
}

fn writer(path: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    Ok(if let Some(p) = path {
        let file = File::create(p)
            .with_context(|| format!("Failed to create output file: {}", p.display()))?;
        Box::new(BufWriter::new(file))
    } else {
        Box::new(BufWriter::new(io::stdout()))
    })
}

fn write_text(text: &str, path: Option<&PathBuf>) -> Result<()> {
    let mut writer = writer(path)?;
    writer
        .write_all(text.as_bytes())
        .context("Failed to write output")?;
    if !text.ends_with('\n') {
        writeln!(writer).context("Failed to write trailing newline")?;
    }
    writer.flush().context("Failed to flush output")?;
    Ok(())
}

fn write_json<T: serde::Serialize>(
    val: &T,
    path: Option<&PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let mut writer = writer(path)?;

    match format {
        OutputFormat::Pretty => {
            serde_json::to_writer_pretty(&mut writer, val).context("Failed to write JSON")?;
        }
        OutputFormat::Compact => {
            serde_json::to_writer(&mut writer, val).context("Failed to write JSON")?;
        }
    }

    // Ensure trailing newline
    writeln!(writer).context("Failed to write trailing newline")?;
    writer.flush().context("Failed to flush output")?;

    Ok(())
}
