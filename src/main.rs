//! Vibedeck - live dashboard for AI coding-agent session transcripts.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vibedeck::backends::codex::is_rollout_file;
use vibedeck::backends::{read_messages, BackendSet, ClaudeCodeFormat, CodexFormat};
use vibedeck::broadcast::BroadcastHub;
use vibedeck::config::{ConfigError, ConfigLoader, DeckConfig};
use vibedeck::dashboard::{AppState, DashboardConfig, DashboardError, DashboardServer};
use vibedeck::display::print_banner;
use vibedeck::export::{session_markdown, ExportOptions};
use vibedeck::registry::SessionRegistry;
use vibedeck::relay::{MessageRelay, RelayOptions};
use vibedeck::render::HtmlRenderer;
use vibedeck::search::{format_results, search_sessions, SearchError, SearchOptions};
use vibedeck::session::{LineFormat, Tailer};
use vibedeck::watcher::{DirectoryWatcher, LivePipeline};

#[derive(Parser)]
#[command(
    name = "vibedeck",
    about = "Live dashboard for AI coding-agent sessions",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard and stream live session updates.
    Serve {
        /// Host address to bind to.
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on.
        #[arg(short, long)]
        port: Option<u16>,
        /// Config file to load instead of the default search paths.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Also track these session files on top of the recent-session scan.
        #[arg(long = "session", value_name = "PATH")]
        sessions: Vec<PathBuf>,
        /// Maximum number of tracked sessions.
        #[arg(long)]
        max_sessions: Option<usize>,
        /// Track subagent transcripts too.
        #[arg(long)]
        include_subagents: bool,
        /// Reject messages sent from the dashboard.
        #[arg(long)]
        disable_send: bool,
        /// Pass the skip-permissions flag to the agent CLI.
        #[arg(long)]
        dangerously_skip_permissions: bool,
    },
    /// Print the normalized messages of a session file as JSON lines.
    Messages {
        /// Session transcript to read.
        path: PathBuf,
    },
    /// Search session transcripts of every enabled backend for a phrase.
    Search {
        /// Phrase to look for, matched literally.
        phrase: String,
        /// Maximum number of sessions to show.
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
        /// Search subagent transcripts too.
        #[arg(long)]
        include_subagents: bool,
        /// Match case exactly.
        #[arg(long)]
        case_sensitive: bool,
        /// Match and show tool calls and tool output too.
        #[arg(long)]
        show_tools: bool,
        /// Messages shown before and after each match.
        #[arg(long, default_value_t = 5)]
        context: usize,
        /// Config file to load instead of the default search paths.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Export a session transcript as markdown.
    Export {
        /// Session transcript to export.
        path: PathBuf,
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Keep only the conversation.
        #[arg(long)]
        hide_tools: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dashboard(#[from] DashboardError),

    #[error("No backends enabled")]
    NoBackends,

    #[error("Session file not found: {0}")]
    MissingFile(PathBuf),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Serve {
            host,
            port,
            config,
            sessions,
            max_sessions,
            include_subagents,
            disable_send,
            dangerously_skip_permissions,
        } => {
            let loader = config.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
            match loader.load() {
                Ok(mut deck) => {
                    if let Some(host) = host {
                        deck.server.host = host;
                    }
                    if let Some(port) = port {
                        deck.server.port = port;
                    }
                    if let Some(max) = max_sessions {
                        deck.sessions.max_sessions = max;
                    }
                    deck.sessions.include_subagents |= include_subagents;
                    deck.send.enabled &= !disable_send;
                    deck.send.skip_permissions |= dangerously_skip_permissions;
                    serve(deck, &sessions).await
                }
                Err(e) => Err(e.into()),
            }
        }
        Commands::Messages { path } => print_messages(&path).await,
        Commands::Search {
            phrase,
            limit,
            include_subagents,
            case_sensitive,
            show_tools,
            context,
            config,
        } => {
            let options = SearchOptions {
                limit,
                include_subagents,
                case_sensitive,
                hide_tools: !show_tools,
                context_before: context,
                context_after: context,
            };
            let loader = config.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
            match loader.load() {
                Ok(deck) => run_search(&deck, &phrase, &options).await,
                Err(e) => Err(e.into()),
            }
        }
        Commands::Export {
            path,
            output,
            hide_tools,
        } => export(&path, output.as_deref(), hide_tools).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn enabled_backends(config: &DeckConfig) -> Result<BackendSet, AppError> {
    let backends = BackendSet::from_names(
        &config.backends.enabled,
        config.backends.claude_projects_dir.clone(),
        config.backends.codex_sessions_dir.clone(),
    );
    if backends.is_empty() {
        return Err(AppError::NoBackends);
    }
    Ok(backends)
}

async fn serve(config: DeckConfig, session_paths: &[PathBuf]) -> Result<(), AppError> {
    let backends = enabled_backends(&config)?;

    let registry = Arc::new(SessionRegistry::new(
        backends.clone(),
        config.sessions.max_sessions,
    ));
    let hub = Arc::new(BroadcastHub::with_capacity(config.sessions.subscriber_capacity));
    let pipeline = LivePipeline::new(
        Arc::clone(&registry),
        Arc::clone(&hub),
        Arc::new(HtmlRenderer::new()),
    )
    .with_include_subagents(config.sessions.include_subagents)
    .with_sweep_interval(config.sessions.sweep_interval());

    pipeline.track_startup(session_paths).await;

    let cancel = CancellationToken::new();
    let roots: Vec<PathBuf> = backends
        .all()
        .iter()
        .map(|backend| backend.projects_dir().to_path_buf())
        .collect();
    let (_watcher, events) = match DirectoryWatcher::new(&roots, config.sessions.debounce()) {
        Ok((watcher, events)) => (Some(watcher), events),
        Err(e) => {
            tracing::warn!(error = %e, "File watching unavailable, using periodic sweep only");
            let (_, events) = mpsc::unbounded_channel();
            (None, events)
        }
    };

    let pipeline_task = {
        let pipeline = pipeline.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { pipeline.run(events, cancel).await })
    };

    let relay = Arc::new(MessageRelay::new(
        Arc::clone(&registry),
        Arc::clone(&hub),
        RelayOptions {
            enabled: config.send.enabled,
            fork: config.send.fork,
            send: config.send.options(),
        },
    ));

    let dashboard_config = DashboardConfig::from(&config.server);
    let server = DashboardServer::new(AppState::new(&pipeline, relay, cancel.clone()))
        .with_config(dashboard_config);
    print_banner(
        &server.address(),
        &backends,
        registry.len(),
        config.send.enabled,
    );

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received ctrl-c, shutting down");
            }
            cancel.cancel();
        });
    }

    let result = server.run().await;
    cancel.cancel();
    if let Err(e) = pipeline_task.await {
        tracing::warn!(error = %e, "Pipeline task failed");
    }
    hub.clear();
    registry.clear();
    result.map_err(AppError::from)
}

fn format_for(path: &Path) -> Arc<dyn LineFormat> {
    if is_rollout_file(path) {
        Arc::new(CodexFormat)
    } else {
        Arc::new(ClaudeCodeFormat)
    }
}

async fn print_messages(path: &Path) -> Result<(), AppError> {
    if !path.is_file() {
        return Err(AppError::MissingFile(path.to_path_buf()));
    }
    let mut tailer = Tailer::new(path.to_path_buf(), format_for(path));
    for entry in tailer.read_all().await {
        println!("{}", serde_json::to_string(&entry.message)?);
    }
    Ok(())
}

async fn run_search(config: &DeckConfig, phrase: &str, options: &SearchOptions) -> Result<(), AppError> {
    let backends = enabled_backends(config)?;
    let phrase = phrase.to_string();
    let search_options = *options;
    let results =
        tokio::task::spawn_blocking(move || search_sessions(&backends, &phrase, &search_options))
            .await
            .map_err(|e| DashboardError::ServerError(format!("Search task failed: {e}")))??;
    print!("{}", format_results(&results, options));
    Ok(())
}

async fn export(path: &Path, output: Option<&Path>, hide_tools: bool) -> Result<(), AppError> {
    if !path.is_file() {
        return Err(AppError::MissingFile(path.to_path_buf()));
    }
    let format = format_for(path);
    let messages = read_messages(path, format.as_ref());
    let markdown = session_markdown(path, format.name(), &messages, ExportOptions { hide_tools });

    match output {
        Some(output) => {
            tokio::fs::write(output, markdown)
                .await
                .map_err(|source| AppError::Write {
                    path: output.to_path_buf(),
                    source,
                })?;
            tracing::info!(path = %output.display(), messages = messages.len(), "Exported session");
        }
        None => print!("{markdown}"),
    }
    Ok(())
}
