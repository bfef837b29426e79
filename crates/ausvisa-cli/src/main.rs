//! AusVisa CLI - ask about studying, visas and settling in Australia

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use ausvisa_core::config::Config;
use ausvisa_core::graph::{GraphQueryExecutor, GraphStore, Neo4jStore};
use ausvisa_core::pipeline::{AnswerStream, ChatReply, Orchestrator, StreamFrame};
use ausvisa_core::templates::{TemplateRegistry, TemplateSource};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "ausvisa")]
#[command(author, version, about = "Answers questions about studying, visas and settling in Australia", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text, json or sse)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Sse,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question
    Ask {
        /// The question to answer
        question: String,
        /// Stream the answer as it is generated
        #[arg(long, overrides_with = "no_stream")]
        stream: bool,
        /// Wait for the whole answer
        #[arg(long)]
        no_stream: bool,
    },

    /// Start an interactive session
    Chat,

    /// Inspect query templates
    Templates {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Show knowledge graph statistics
    Stats,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List registered query types
    List,
    /// Show one template
    Show { name: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset to defaults
    Reset,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_level = if cli.quiet {
        "ausvisa=warn"
    } else {
        "ausvisa=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.parse()?),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Ask {
            question,
            stream,
            no_stream,
        } => {
            let config = Config::load_with_env()?;
            let streaming = resolve_streaming(config.pipeline.streaming, stream, no_stream);
            cmd_ask(&config, &question, streaming, cli.format).await
        }

        Commands::Chat => cmd_chat(cli.quiet).await,

        Commands::Templates { action } => cmd_templates(action, cli.format, cli.quiet),

        Commands::Stats => cmd_stats(cli.format).await,

        Commands::Config { action } => cmd_config(action, cli.quiet),

        Commands::Doctor => cmd_doctor(cli.quiet).await,
    }
}

/// Explicit flags win over the configured default
fn resolve_streaming(configured: bool, stream: bool, no_stream: bool) -> bool {
    if no_stream {
        false
    } else if stream {
        true
    } else {
        configured
    }
}

fn template_registry(config: &Config) -> TemplateRegistry {
    TemplateRegistry::load(config.pipeline.templates_path.as_deref())
}

fn graph_executor(config: &Config) -> GraphQueryExecutor {
    GraphQueryExecutor::new(
        Arc::new(Neo4jStore::new(&config.graph)),
        Arc::new(template_registry(config)),
    )
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_ask(
    config: &Config,
    question: &str,
    streaming: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let question = question.trim();
    if question.is_empty() {
        return Err(anyhow!("Question must not be empty"));
    }

    let orchestrator = Orchestrator::from_config(config)?;

    match format {
        OutputFormat::Json => {
            let answer = orchestrator.answer(question).await;
            debug!(source = ?answer.source, "Answer ready");
            let reply = ChatReply::from(answer);
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        OutputFormat::Sse => {
            let mut stream = orchestrator.answer_stream(question);
            let mut stdout = io::stdout();
            while let Some(chunk) = stream.next().await {
                write!(stdout, "{}", StreamFrame::Chunk(chunk).to_sse())?;
                stdout.flush()?;
            }
            write!(stdout, "{}", StreamFrame::End.to_sse())?;
            stdout.flush()?;
        }
        OutputFormat::Text if streaming => {
            print_stream(orchestrator.answer_stream(question)).await?;
        }
        OutputFormat::Text => {
            let answer = orchestrator.answer(question).await;
            println!("{}", answer.response);
        }
    }
    Ok(())
}

async fn print_stream(mut stream: AnswerStream) -> anyhow::Result<()> {
    let mut stdout = io::stdout();
    while let Some(chunk) = stream.next().await {
        write!(stdout, "{}", chunk)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

async fn cmd_chat(quiet: bool) -> anyhow::Result<()> {
    let config = Config::load_with_env()?;
    let orchestrator = Orchestrator::from_config(&config)?;
    let mut editor =
        DefaultEditor::new().map_err(|e| anyhow!("Failed to start line editor: {}", e))?;

    if !quiet {
        println!("AusVisa chat ({})", orchestrator.model_name());
        println!("Ask about studying, visas or settling in Australia. Type `exit` to leave.");
        println!();
    }

    loop {
        match editor.readline("you> ") {
            Ok(line) => {
                let question = line.trim();
                if question.is_empty() {
                    continue;
                }
                if matches!(question, "exit" | "quit" | "/exit" | "/quit") {
                    break;
                }
                let _ = editor.add_history_entry(question);

                print!("ausvisa> ");
                io::stdout().flush()?;
                print_stream(orchestrator.answer_stream(question)).await?;
                println!();
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(anyhow!("Failed to read input: {}", e)),
        }
    }

    if !quiet {
        println!("Goodbye!");
    }
    Ok(())
}

fn cmd_templates(action: TemplateAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load_with_env()?;
    let registry = template_registry(&config);

    match action {
        TemplateAction::List => {
            if format == OutputFormat::Json {
                let items: Vec<_> = registry
                    .names()
                    .into_iter()
                    .filter_map(|name| registry.get(name))
                    .map(|t| serde_json::json!({"name": t.name, "parameters": t.parameters}))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&items)?);
                return Ok(());
            }

            if !quiet {
                println!("Query types ({}):", describe_source(registry.source()));
            }
            for name in registry.names() {
                let params = registry
                    .get(name)
                    .map(|t| {
                        t.parameters
                            .iter()
                            .map(|p| format!("${}", p))
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                println!("  {} ({})", name, params);
            }
        }
        TemplateAction::Show { name } => {
            let template = registry.get(&name).ok_or_else(|| {
                anyhow!(
                    "Unknown query type '{}'. Run `ausvisa templates list` to see all query types.",
                    name
                )
            })?;

            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(template)?);
                return Ok(());
            }

            println!("Template: {}", template.name);
            println!(
                "  Parameters: {}",
                template
                    .parameters
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!();
            println!("{}", template.body);
        }
    }
    Ok(())
}

fn describe_source(source: &TemplateSource) -> String {
    match source {
        TemplateSource::File(path) => path.display().to_string(),
        TemplateSource::Defaults => "built-in defaults".to_string(),
    }
}

async fn cmd_stats(format: OutputFormat) -> anyhow::Result<()> {
    let config = Config::load_with_env()?;
    let executor = graph_executor(&config);
    let stats = executor
        .stats()
        .await
        .with_context(|| format!("Failed to query {}", executor.store().describe()))?;

    if format == OutputFormat::Json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "universities": stats.universities,
                "programs": stats.programs,
                "visas": stats.visas,
            }))?
        );
    } else {
        println!("Knowledge graph:");
        println!("  Universities: {}", stats.universities);
        println!("  Programs: {}", stats.programs);
        println!("  Visas: {}", stats.visas);
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("AusVisa Health Check");
        println!("====================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load_with_env() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            config
        }
        Err(e) => {
            if !quiet {
                println!("[!!] Configuration: Error - {}", e);
            }
            return Err(anyhow!("Health check failed"));
        }
    };

    match config.llm.redacted_api_key() {
        Ok(Some(redacted)) => {
            if !quiet {
                println!(
                    "[OK] API Key: Configured ({}, model {})",
                    redacted, config.llm.default_model
                );
            }
        }
        Ok(None) => {
            all_ok = false;
            warn!("API key not configured");
            if !quiet {
                println!("[!!] API Key: Not configured");
                println!("     Set AUSVISA_API_KEY or GOOGLE_API_KEY environment variable");
            }
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] API Key: Error - {}", e);
            }
        }
    }

    let registry = template_registry(&config);
    if !quiet {
        match (registry.source(), &config.pipeline.templates_path) {
            (TemplateSource::File(path), _) => println!(
                "[OK] Templates: {} query types from {}",
                registry.len(),
                path.display()
            ),
            (TemplateSource::Defaults, Some(path)) => println!(
                "[!!] Templates: {} unusable, using {} built-in query types",
                path.display(),
                registry.len()
            ),
            (TemplateSource::Defaults, None) => {
                println!("[OK] Templates: {} built-in query types", registry.len())
            }
        }
    }
    if matches!(registry.source(), TemplateSource::Defaults)
        && config.pipeline.templates_path.is_some()
    {
        all_ok = false;
    }

    let executor = graph_executor(&config);
    let target = executor.store().describe();
    if executor.health().await {
        if !quiet {
            println!("[OK] Graph store: Connected ({})", target);
        }
    } else {
        all_ok = false;
        if !quiet {
            println!("[!!] Graph store: Unreachable ({})", target);
            println!("     Check NEO4J_URI, NEO4J_USER and NEO4J_PASSWORD");
        }
    }

    if !quiet {
        match Config::config_path() {
            Ok(path) if path.exists() => println!("[OK] Config file: {}", path.display()),
            Ok(path) => println!("[--] Config file: {} (using defaults)", path.display()),
            Err(e) => println!("[!!] Config file: Error - {}", e),
        }
        println!(
            "[--] Cache: {}",
            if config.cache.enabled {
                format!("enabled, {}s TTL", config.cache.ttl_secs)
            } else {
                "disabled".to_string()
            }
        );
        println!();
    }

    if all_ok {
        if !quiet {
            println!("All checks passed.");
        }
        Ok(())
    } else {
        Err(anyhow!("Health check found problems"))
    }
}
