//! jobform - dependent-field resolution for DataX job forms
//!
//! CLI entry point for inspecting templates and layouts and replaying form
//! sessions against a catalog fixture.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use serde_json::json;
use tracing::{debug, info};

use jobform::catalog::{DatasourceCatalog, StaticCatalog};
use jobform::cli::{Cli, Command, OutputFormat, get_log_path};
use jobform::config::Config;
use jobform::domain::Model;
use jobform::resolver::{FormResolver, ResolverConfig};
use jobform::session::{self, Session, SessionReport};
use jobform::template::{FormTemplate, SpanRef};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Template { path, format } => {
            debug!(?path, %format, "main: matched Template command");
            cmd_template(&config, path, format)
        }
        Command::Layout {
            source,
            target,
            custom,
            format,
        } => {
            debug!(%source, %target, custom, "main: matched Layout command");
            cmd_layout(&config, &source, &target, custom, format)
        }
        Command::Run {
            session,
            catalog,
            format,
        } => {
            debug!(?session, ?catalog, "main: matched Run command");
            cmd_run(&config, session, catalog, format).await
        }
    }
}

fn load_template(config: &Config, path: Option<PathBuf>) -> Result<FormTemplate> {
    match path {
        Some(path) => FormTemplate::load(path),
        None => config.template.load_template(),
    }
}

fn cmd_template(config: &Config, path: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let template = load_template(config, path)?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&template)?);
        return Ok(());
    }

    println!(
        "{} {} ({} descriptors)",
        "Template".bold(),
        template.name.cyan(),
        template.descriptors.len()
    );
    for descriptor in &template.descriptors {
        let span = match &descriptor.span {
            SpanRef::Fixed(span) => span.to_string(),
            SpanRef::Slot(slot) => slot.clone(),
        };
        let trigger = descriptor
            .trigger
            .as_ref()
            .map(|t| format!(" -> {}", t.lookup.name()))
            .unwrap_or_default();
        println!(
            "  {:45} {:18} {:18}{}",
            descriptor.id(),
            descriptor.kind.to_string().dimmed(),
            span,
            trigger.yellow()
        );
    }
    Ok(())
}

fn cmd_layout(config: &Config, source: &str, target: &str, custom: bool, format: OutputFormat) -> Result<()> {
    let template = config.template.load_template()?;
    let layout = template.layout.clone();

    let mut model = Model::new();
    model.set(&layout.template_key, json!(custom));
    model.set(&layout.source_key, json!(source));
    model.set(&layout.target_key, json!(target));

    let catalog: Arc<dyn DatasourceCatalog> = Arc::new(StaticCatalog::new());
    let resolver = FormResolver::new(template, model, catalog, ResolverConfig::default())?;
    let fields = resolver.visible_fields();

    if format == OutputFormat::Json {
        let spans: Vec<_> = fields.iter().map(|f| json!({"id": f.id, "span": f.span})).collect();
        println!("{}", serde_json::to_string_pretty(&spans)?);
        return Ok(());
    }

    for field in fields {
        println!("  {:45} {:>2}", field.id, field.span);
    }
    Ok(())
}

async fn cmd_run(
    config: &Config,
    session_path: PathBuf,
    catalog_path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let session = Session::load(&session_path)?;
    let template = config.template.load_template()?;
    let catalog = match catalog_path {
        Some(path) => StaticCatalog::load(path)?,
        None => config.catalog.load_catalog()?,
    };

    let report = session::run(
        session,
        template,
        Arc::new(catalog),
        config.lookup.to_resolver_config(),
    )
    .await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report)?,
    }

    if report.is_valid() {
        Ok(())
    } else {
        Err(eyre!("{} field(s) failed validation", report.errors.len()))
    }
}

fn print_report(report: &SessionReport) -> Result<()> {
    println!("{}", "Visible fields".bold());
    for field in &report.fields {
        let value = field
            .value
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        println!("  {:45} {:>2}  {}", field.id, field.span, value.dimmed());
    }

    for failure in &report.lookup_failures {
        println!("{} lookup {}", "!".yellow(), failure);
    }
    for error in &report.mapping_errors {
        println!("{} mapping {}", "!".yellow(), error);
    }

    if report.errors.is_empty() {
        println!("{}", "Form is valid".green());
    } else {
        println!("{}", "Validation errors".red().bold());
        for error in &report.errors {
            println!("  {} {}", "x".red(), error);
        }
    }

    println!("{}", serde_json::to_string_pretty(&report.snapshot)?);
    Ok(())
}
