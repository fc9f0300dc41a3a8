//! schema-field CLI
//!
//! Command-line interface for resolving field schemas and reconciling models.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use schema_field::{
    load_json, load_options, load_schema_auto, resolve, Field, FieldEvent, FieldOptions,
    ModelKey, OptionsFile,
};

#[derive(Parser)]
#[command(name = "schema-field")]
#[command(about = "Resolve JSON-Schema fields and reconcile models against them")]
#[command(version)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective schema of a field
    Resolve {
        /// Schema source: file path or URL (http:// or https://)
        schema: String,

        /// Model file holding the field value (read as the wrapper slot)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Slot name of the field in its wrapper
        #[arg(long, default_value = "root")]
        key: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Reconcile a model against a schema and print the result
    Reconcile {
        /// Schema source: file path or URL (http:// or https://)
        schema: String,

        /// Model file (an empty model if not specified)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Options file (camelCase JSON)
        #[arg(long)]
        options: Option<PathBuf>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Perform x-fromUrl fetches over HTTP
        #[arg(long)]
        fetch: bool,
    },

    /// Print the option list of a select field
    Items {
        /// Schema source: file path or URL (http:// or https://)
        schema: String,

        /// Model file (an empty model if not specified)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Options file (camelCase JSON)
        #[arg(long)]
        options: Option<PathBuf>,

        /// Perform x-fromUrl fetches over HTTP
        #[arg(long)]
        fetch: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let result = match cli.command {
        Commands::Resolve {
            schema,
            model,
            key,
            pretty,
        } => run_resolve(&schema, model.as_deref(), key, pretty),

        Commands::Reconcile {
            schema,
            model,
            options,
            output,
            pretty,
            fetch,
        } => run_reconcile(
            &schema,
            model.as_deref(),
            options.as_deref(),
            output,
            pretty,
            fetch,
        ),

        Commands::Items {
            schema,
            model,
            options,
            fetch,
        } => run_items(&schema, model.as_deref(), options.as_deref(), fetch),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_resolve(
    schema_source: &str,
    model: Option<&Path>,
    key: String,
    pretty: bool,
) -> Result<(), u8> {
    let schema = load_schema_auto(schema_source).map_err(report)?;
    let key = ModelKey::Name(key);
    let mut wrapper = json!({});
    if let Some(path) = model {
        key.set(&mut wrapper, load_json(path).map_err(report)?);
    }

    let effective = resolve(&schema, &wrapper, &key);
    println!("{}", to_json(&effective.to_value(), pretty)?);
    Ok(())
}

fn run_reconcile(
    schema_source: &str,
    model: Option<&Path>,
    options: Option<&Path>,
    output: Option<PathBuf>,
    pretty: bool,
    fetch: bool,
) -> Result<(), u8> {
    let (_, wrapper) = mount(schema_source, model, options, fetch)?;
    let reconciled = wrapper.get("root").cloned().unwrap_or(Value::Null);
    let json_output = to_json(&reconciled, pretty)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

fn run_items(
    schema_source: &str,
    model: Option<&Path>,
    options: Option<&Path>,
    fetch: bool,
) -> Result<(), u8> {
    let (field, _) = mount(schema_source, model, options, fetch)?;
    let items = field.select_items().unwrap_or_default();
    println!("{}", to_json(&items, true)?);
    Ok(())
}

/// Load inputs, mount a root field and settle it once.
fn mount(
    schema_source: &str,
    model: Option<&Path>,
    options: Option<&Path>,
    fetch: bool,
) -> Result<(Field, Value), u8> {
    let schema = load_schema_auto(schema_source).map_err(report)?;
    let options = match options {
        Some(path) => load_options(path).map_err(report)?,
        None => OptionsFile::default(),
    };
    let options = attach_capabilities(options.into_options(), fetch)?;

    let mut wrapper = json!({});
    if let Some(path) = model {
        wrapper["root"] = load_json(path).map_err(report)?;
    }

    let mut field = Field::root(schema, Arc::new(options));
    field.mount(&mut wrapper);
    field.settle(&mut wrapper);

    for event in field.drain_events() {
        if let FieldEvent::Error { message } = event {
            warn!("{}", message);
        }
    }
    Ok((field, wrapper))
}

fn attach_capabilities(options: FieldOptions, fetch: bool) -> Result<FieldOptions, u8> {
    #[cfg(feature = "markdown")]
    let options = options.with_markdown(Arc::new(schema_field::PulldownRenderer));

    if !fetch {
        return Ok(options);
    }

    #[cfg(feature = "remote")]
    {
        let client = schema_field::ReqwestClient::new().map_err(|e| {
            eprintln!("Error: {}", e);
            3u8
        })?;
        Ok(options.with_http(Arc::new(client)))
    }
    #[cfg(not(feature = "remote"))]
    {
        eprintln!("Error: --fetch requires the `remote` feature");
        Err(2)
    }
}

fn report(e: schema_field::LoadError) -> u8 {
    eprintln!("Error: {}", e);
    e.exit_code() as u8
}

fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String, u8> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })
}
