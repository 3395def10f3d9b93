use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codectx::config::{Config, DEFAULT_CONFIG_PATH};
use codectx::context::ContextRequest;
use codectx::engine::ContextEngine;
use codectx::events::IndexProgress;
use codectx::mcp::server::{McpContext, McpServer};
use codectx::store::search::SearchOptions;
use codectx::watcher::FileWatcher;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "codectx")]
#[command(about = "Source-tree indexing and token-budgeted context selection")]
#[command(version)]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Workspace root to index
    #[arg(long, short, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index the workspace and print its status
    Index,
    /// Look up where a symbol is declared
    Symbol {
        name: String,
        /// Also list import sites
        #[arg(long)]
        references: bool,
    },
    /// Search file paths, symbol names and content
    Search {
        query: String,
        #[arg(long)]
        case_sensitive: bool,
        #[arg(long)]
        regex: bool,
    },
    /// List files connected to a file through imports
    Related {
        path: String,
        #[arg(long, default_value_t = 10)]
        max: usize,
    },
    /// Assemble budgeted context for a task
    Context {
        #[arg(long)]
        current: Option<String>,
        #[arg(long)]
        query: Option<String>,
        #[arg(long = "symbol")]
        symbols: Vec<String>,
        #[arg(long)]
        max_tokens: Option<usize>,
    },
    /// Index the workspace, then serve MCP on stdio
    Serve {
        /// Re-index changed files while serving
        #[arg(long)]
        watch: bool,
    },
    /// Write the default configuration to the config path
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries JSON and the MCP transport
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codectx=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Command::InitConfig = cli.command {
        Config::default().save(&cli.config)?;
        info!("Wrote default configuration to {}", cli.config);
        return Ok(());
    }

    let config = Config::load(&cli.config)?;
    let engine = Arc::new(ContextEngine::new(config).context("invalid configuration")?);

    match cli.command {
        Command::Index => {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {pos}/{len} {msg}")
                    .context("invalid progress template")?
                    .progress_chars("█▓░"),
            );
            let report = |p: IndexProgress| {
                pb.set_length(p.total as u64);
                pb.set_position(p.processed as u64);
                pb.set_message(p.path);
            };
            let summary = engine.index_workspace(&cli.root, Some(&report)).await?;
            pb.finish_and_clear();

            let status = engine.get_index_status().await;
            print_json(&serde_json::json!({ "summary": summary, "status": status }))?;
        }
        Command::Symbol { name, references } => {
            engine.index_workspace(&cli.root, None).await?;
            let mut out = serde_json::json!({
                "symbol": name,
                "definitions": engine.find_symbol(&name).await,
            });
            if references {
                out["references"] = serde_json::to_value(engine.find_references(&name).await)?;
            }
            print_json(&out)?;
        }
        Command::Search {
            query,
            case_sensitive,
            regex,
        } => {
            engine.index_workspace(&cli.root, None).await?;
            let options = SearchOptions {
                case_sensitive,
                regex,
            };
            let paths: Vec<String> = engine
                .search_files(&query, options)
                .await?
                .into_iter()
                .map(|f| f.path)
                .collect();
            print_json(&paths)?;
        }
        Command::Related { path, max } => {
            engine.index_workspace(&cli.root, None).await?;
            let paths: Vec<String> = engine
                .get_related_files(&path, max)
                .await
                .into_iter()
                .map(|f| f.path)
                .collect();
            print_json(&paths)?;
        }
        Command::Context {
            current,
            query,
            symbols,
            max_tokens,
        } => {
            engine.index_workspace(&cli.root, None).await?;
            let request = ContextRequest {
                current_file: current,
                query,
                symbols,
                max_tokens,
            };
            print_json(&engine.build_context(&request).await)?;
        }
        Command::Serve { watch } => {
            let summary = engine.index_workspace(&cli.root, None).await?;
            info!(
                "Indexed {} files ({} symbols)",
                summary.indexed, summary.symbols
            );

            // Dropping the watcher stops it, so it lives until the server returns
            let _watcher = if watch {
                let root = engine
                    .root()
                    .await
                    .context("workspace root missing after indexing")?;
                let mut watcher =
                    FileWatcher::new(engine.clone()).context("failed to start file watcher")?;
                watcher
                    .watch(&root)
                    .with_context(|| format!("failed to watch {}", root.display()))?;
                info!("Watching {}", root.display());
                Some(watcher)
            } else {
                None
            };

            McpServer::new(McpContext { engine }).start().await?;
        }
        Command::InitConfig => {}
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
