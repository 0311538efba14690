use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use newsletter_stories::config::{
    self, EXTRACTOR_CONFIG_NAME, ExtractorFileConfig, LlmConfig, SERVER_CONFIG_NAME,
    ServerFileConfig,
};
use newsletter_stories::extract::OpenAiExtractor;
use newsletter_stories::logging::{self, LogOptions};
use newsletter_stories::pipeline::{
    DEFAULT_CALL_TIMEOUT, IngestionProcessor, ProcessorConfig, RunSummary,
};
use newsletter_stories::server::{self, AppState};
use newsletter_stories::stories::create_private_dir;
use newsletter_stories::version;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Config file. Defaults to `story-extractor.toml` / `ui-server.toml`
    /// in the working directory, then in `$HOME`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract stories from every new message in a Maildir.
    Extract(ExtractArgs),
    /// Serve the story browser UI.
    Serve(ServeArgs),
    /// Print build information.
    Version,
}

#[derive(Args)]
struct ExtractArgs {
    /// Maildir to read newsletters from.
    #[arg(long, env = "STORY_EXTRACTOR_MAILDIR")]
    maildir: Option<PathBuf>,

    /// Output directory for story files (created if missing).
    #[arg(long, env = "STORY_EXTRACTOR_STORYDIR")]
    storydir: Option<PathBuf>,

    /// Maximum number of messages to process, newest first (0 = unlimited).
    #[arg(long, env = "STORY_EXTRACTOR_LIMIT")]
    limit: Option<usize>,

    /// Enable debug logging.
    #[arg(long, short, env = "STORY_EXTRACTOR_VERBOSE")]
    verbose: bool,

    /// Log parsed message headers.
    #[arg(long)]
    log_headers: bool,

    /// Log parsed message headers and bodies.
    #[arg(long)]
    log_bodies: bool,

    /// Log extracted stories.
    #[arg(long)]
    log_stories: bool,

    /// Timeout for a single extraction call, in seconds [default: 60].
    #[arg(long, env = "STORY_EXTRACTOR_CALL_TIMEOUT_SECS")]
    call_timeout_secs: Option<u64>,

    /// Stop starting new messages after this many seconds.
    #[arg(long, env = "STORY_EXTRACTOR_RUN_TIMEOUT_SECS")]
    run_timeout_secs: Option<u64>,
}

#[derive(Args)]
struct ServeArgs {
    /// Directory holding story files.
    #[arg(long, env = "UI_SERVER_STORYDIR")]
    storydir: Option<PathBuf>,

    /// Directory for saved copies (created on first save).
    #[arg(long, env = "UI_SERVER_SAVEDIR")]
    savedir: Option<PathBuf>,

    /// Address to bind [default: 0.0.0.0].
    #[arg(long, env = "UI_SERVER_HOST")]
    host: Option<String>,

    /// Port to listen on [default: 8080].
    #[arg(long, env = "UI_SERVER_PORT")]
    port: Option<u16>,

    /// Enable debug logging.
    #[arg(long, short, env = "UI_SERVER_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Extract(args) => {
            let file = config::load_file(cli.config.as_deref(), EXTRACTOR_CONFIG_NAME)?;
            run_extract(args, file).await
        }
        Command::Serve(args) => {
            let file = config::load_file(cli.config.as_deref(), SERVER_CONFIG_NAME)?;
            run_serve(args, file).await
        }
        Command::Version => {
            println!("{}", version::version_string());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_extract(args: ExtractArgs, file: ExtractorFileConfig) -> anyhow::Result<ExitCode> {
    let verbose = args.verbose || file.verbose;
    logging::init(verbose);

    let maildir = config::required_path(args.maildir, file.maildir, "maildir")?;
    let storydir = config::required_path(args.storydir, file.storydir, "storydir")?;
    let llm = LlmConfig::from_env_and_file(&file.llm)?;
    let call_timeout = args
        .call_timeout_secs
        .or(file.call_timeout_secs)
        .map_or(DEFAULT_CALL_TIMEOUT, Duration::from_secs);
    let limit = args.limit.or(file.limit).filter(|n| *n > 0);

    create_private_dir(&storydir)
        .with_context(|| format!("Failed to create story directory {}", storydir.display()))?;

    info!(
        version = %version::version_string(),
        model = %llm.model,
        maildir = %maildir.display(),
        storydir = %storydir.display(),
        "Starting story extraction"
    );

    let extractor = Arc::new(OpenAiExtractor::new(llm, call_timeout)?);
    let config = ProcessorConfig {
        maildir,
        storydir,
        limit,
        call_timeout,
        run_timeout: args
            .run_timeout_secs
            .or(file.run_timeout_secs)
            .map(Duration::from_secs),
        log: LogOptions {
            verbose,
            log_headers: args.log_headers || file.log_headers,
            log_bodies: args.log_bodies || file.log_bodies,
            log_stories: args.log_stories || file.log_stories,
        },
    };
    let processor = IngestionProcessor::new(config, extractor);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, aborting run");
            let _ = shutdown_tx.send(true);
        }
    });

    let summary = processor.run_with_shutdown(shutdown_rx).await?;
    print_summary(&summary);

    Ok(if summary.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Processed {} emails: {} processed, {} skipped, {} errors{}",
        summary.total,
        summary.processed,
        summary.skipped,
        summary.errors,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
}

async fn run_serve(args: ServeArgs, file: ServerFileConfig) -> anyhow::Result<ExitCode> {
    logging::init(args.verbose || file.verbose);

    let storydir = config::required_path(args.storydir, file.storydir, "storydir")?;
    let savedir = config::required_path(args.savedir, file.savedir, "savedir")?;
    let host = args
        .host
        .or(file.host)
        .unwrap_or_else(|| "0.0.0.0".to_string());
    let port = args.port.or(file.port).unwrap_or(8080);

    let addr = format!("{host}:{port}");
    info!(
        version = %version::version_string(),
        storydir = %storydir.display(),
        savedir = %savedir.display(),
        "Starting UI server"
    );

    let state = AppState::new(storydir, savedir);
    server::serve(&addr, state)
        .await
        .with_context(|| format!("UI server on {addr} failed"))?;
    Ok(ExitCode::SUCCESS)
}
