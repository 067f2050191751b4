//! MCP Capabilities - `OpenAPI`-derived tools and resources
//!
//! Inspect how a document maps onto capabilities, read resources and call
//! tools against the document's backend.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde_json::{Value, json};
use tracing::info;

use mcp_capabilities::{
    Error, Result,
    capability::{
        CapabilityFactory, HttpExecutor, IN_PROCESS_BASE_URL, OpenApiDocument,
        RouteClassifier,
    },
    cli::{Cli, Command, OutputFormat},
    config::Config,
    protocol::{Content, ResourceContents},
    registry::CapabilityRegistry,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let Cli {
        config,
        spec,
        base_url,
        log_level,
        log_format,
        command,
    } = Cli::parse();

    if let Err(e) = setup_tracing(&log_level, log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match command {
        Command::Inspect { format } => run_inspect(&config, spec, format),
        Command::Read { uri } => run_read(&config, spec, base_url, &uri).await,
        Command::Call { tool, args } => run_call(&config, spec, base_url, &tool, &args).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_document(config: &Config, spec: Option<PathBuf>) -> Result<OpenApiDocument> {
    let path = spec.or_else(|| config.openapi.spec.clone()).ok_or_else(|| {
        Error::Config("No OpenAPI document given (use --spec or openapi.spec)".to_string())
    })?;
    OpenApiDocument::from_file(path)
}

/// Print the classification of every operation
fn run_inspect(config: &Config, spec: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let doc = load_document(config, spec)?;
    // Nothing is sent during inspection, so the backend address is irrelevant
    let executor = HttpExecutor::reqwest(IN_PROCESS_BASE_URL, config.openapi.timeout)?;
    let factory = CapabilityFactory::from_config(&config.openapi, Arc::new(executor))?;

    let mut rows = Vec::with_capacity(doc.operations.len());
    for op in &doc.operations {
        let kind = factory.classifier().classify(op);
        let (key, error) = match factory.build(op) {
            Ok(Some(cap)) => (Some(cap.key().to_string()), None),
            Ok(None) => (None, None),
            Err(e) => (None, Some(e.to_string())),
        };
        rows.push(json!({
            "method": op.method,
            "path": op.path,
            "operation": op.id(),
            "kind": kind.to_string(),
            "default_kind": RouteClassifier::default_kind(op).to_string(),
            "key": key,
            "error": error,
        }));
    }
    let skipped: Vec<String> = doc.skipped.iter().map(ToString::to_string).collect();

    match format {
        OutputFormat::Json => {
            let out = json!({ "title": doc.title, "operations": rows, "skipped": skipped });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            println!("{} (OpenAPI {})\n", doc.title, doc.openapi_version);
            for row in &rows {
                let target = match (row["key"].as_str(), row["error"].as_str()) {
                    (Some(key), _) => key.to_string(),
                    (None, Some(error)) => format!("❌ {error}"),
                    (None, None) => "-".to_string(),
                };
                println!(
                    "{:<7} {:<40} {:<18} {}",
                    row["method"].as_str().unwrap_or_default(),
                    row["path"].as_str().unwrap_or_default(),
                    row["kind"].as_str().unwrap_or_default(),
                    target
                );
            }
            for error in &skipped {
                println!("⚠️  skipped: {error}");
            }
        }
    }
    Ok(())
}

/// Build a registry for the document against its backend
fn build_registry(
    config: &Config,
    spec: Option<PathBuf>,
    base_url: Option<String>,
) -> Result<CapabilityRegistry> {
    let doc = load_document(config, spec)?;
    let base_url = base_url
        .or_else(|| config.openapi.base_url.clone())
        .or_else(|| doc.base_url.clone())
        .ok_or_else(|| {
            Error::Config(
                "No backend URL (use --base-url, openapi.base_url or servers in the document)"
                    .to_string(),
            )
        })?;

    let executor = HttpExecutor::reqwest(&base_url, config.openapi.timeout)?;
    let factory = CapabilityFactory::from_config(&config.openapi, Arc::new(executor))?;
    let registry = CapabilityRegistry::from_config(config);
    let report = factory.populate(doc, &registry);
    for error in &report.errors {
        eprintln!("⚠️  {error}");
    }
    info!(base_url = %base_url, capabilities = registry.len(), "Registry ready");
    Ok(registry)
}

async fn run_read(
    config: &Config,
    spec: Option<PathBuf>,
    base_url: Option<String>,
    uri: &str,
) -> Result<()> {
    let registry = build_registry(config, spec, base_url)?;
    let contents = registry.run(registry.read_resource(uri)).await?;
    match contents {
        ResourceContents::Text { text, .. } => println!("{}", pretty(&text)),
        blob @ ResourceContents::Blob { .. } => {
            println!("{}", serde_json::to_string_pretty(&blob)?);
        }
    }
    Ok(())
}

async fn run_call(
    config: &Config,
    spec: Option<PathBuf>,
    base_url: Option<String>,
    tool: &str,
    args: &str,
) -> Result<()> {
    let args: Value = serde_json::from_str(args)
        .map_err(|e| Error::InvalidArguments(format!("--args is not valid JSON: {e}")))?;
    let registry = build_registry(config, spec, base_url)?;
    let content = registry.run(registry.call_tool(tool, args)).await?;
    for item in content {
        match item {
            Content::Text { text } => println!("{}", pretty(&text)),
            image @ Content::Image { .. } => {
                println!("{}", serde_json::to_string_pretty(&image)?);
            }
        }
    }
    Ok(())
}

/// Re-indent JSON text; other text is returned unchanged
fn pretty(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| text.to_string())
}
