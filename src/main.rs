mod cli;

use reelcast::clients::{ChainedExtractor, HttpCaptioner, HttpRemoteStorage, HttpSourceClient};
use reelcast::config::persist::CredentialStore;
use reelcast::config::{self, Config};
use reelcast::gate::ConcurrencyGate;
use reelcast::inbound;
use reelcast::publish::{InstagramPublisher, Publisher, StoreRefreshHook, YouTubePublisher};
use reelcast::report::LogReporter;
use reelcast::session::{AvMediaProcessor, SessionError, SessionRunner};
use reelcast::store::TransientStore;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on
    // the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelcast=trace,reelcast_av=debug".to_string()
        } else {
            "reelcast=debug,reelcast_av=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Run { message } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_message(&message, cli.config.as_deref()))
        }
        Commands::Watch => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(watch_stdin(cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::CheckTools => check_tools(),
        Commands::Version => {
            println!("reelcast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Wire the full pipeline from config and the credentials file.
fn build_runner(config: Config) -> Result<SessionRunner> {
    let store = TransientStore::new(&config.pipeline.transient_dir)?;
    let credentials = CredentialStore::new(&config.pipeline.credentials_file);
    let accounts = credentials.load()?;

    if accounts.instagram.is_empty() && accounts.youtube.is_empty() {
        tracing::warn!(
            file = ?credentials.path(),
            "no publishing accounts configured, sessions will have nowhere to publish"
        );
    }

    let refresh_hook = Arc::new(StoreRefreshHook::new(credentials));
    let mut publishers: Vec<Arc<dyn Publisher>> = Vec::new();
    for account in accounts.instagram {
        publishers.push(Arc::new(InstagramPublisher::new(
            &config.instagram,
            account,
            store.clone(),
        )));
    }
    for account in accounts.youtube {
        publishers.push(Arc::new(
            YouTubePublisher::new(&config.youtube, account)
                .with_refresh_hook(refresh_hook.clone()),
        ));
    }

    let gate = Arc::new(ConcurrencyGate::new(config.pipeline.max_concurrent_sessions));
    let media = Arc::new(AvMediaProcessor::new(
        config.transform.clone(),
        config.pipeline.min_video_bytes,
        store.clone(),
    ));
    let source = Arc::new(HttpSourceClient::new(&config.source));
    let extractor = Arc::new(ChainedExtractor::new(&config.extract));
    let storage = Arc::new(HttpRemoteStorage::new(&config.storage));
    let captioner = Arc::new(HttpCaptioner::new(&config.captioner));

    Ok(SessionRunner::new(
        config,
        gate,
        store,
        Arc::new(LogReporter),
        source,
        extractor,
        storage,
        captioner,
        media,
        publishers,
    ))
}

async fn run_message(message: &str, config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let runner = build_runner(config)?;

    let Some(request) = inbound::parse_message(message) else {
        anyhow::bail!("message contains no recognized source URL");
    };

    let outcome = runner.run(&request).await?;
    for result in &outcome.results {
        match (&result.error, &result.permalink) {
            (None, Some(permalink)) => {
                println!("{} {}: published at {}", result.platform, result.account, permalink)
            }
            (None, None) => println!("{} {}: published", result.platform, result.account),
            (Some(error), _) => println!("{} {}: failed ({})", result.platform, result.account, error),
        }
    }
    println!(
        "session {} finished in {}s",
        outcome.session_id,
        outcome.elapsed.as_secs()
    );
    Ok(())
}

/// Read trigger messages from stdin, one per line. Sessions run
/// concurrently; the admission gate turns excess lines into an immediate
/// busy response instead of a queue.
async fn watch_stdin(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let runner = Arc::new(build_runner(config)?);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut sessions = tokio::task::JoinSet::new();

    tracing::info!("watching stdin for trigger messages");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let Some(request) = inbound::parse_message(&line) else {
                    continue;
                };
                let runner = Arc::clone(&runner);
                sessions.spawn(async move {
                    match runner.run(&request).await {
                        Ok(outcome) => {
                            tracing::info!(
                                session = %outcome.session_id,
                                phase = ?outcome.phase(),
                                "session finished"
                            );
                        }
                        Err(SessionError::Busy) => {
                            tracing::warn!(url = %request.source_url, "session rejected: busy");
                        }
                        Err(e) => {
                            tracing::error!(url = %request.source_url, error = %e, "session failed");
                        }
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested, waiting for running sessions");
                break;
            }
        }
    }

    // Let in-flight sessions finish their cleanup before exiting.
    while sessions.join_next().await.is_some() {}
    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(path)?;
    println!("Configuration is valid");
    println!(
        "  transient dir: {}",
        config.pipeline.transient_dir.display()
    );
    println!(
        "  max concurrent sessions: {}",
        config.pipeline.max_concurrent_sessions
    );
    println!("  retry attempts: {}", config.retry.max_attempts);
    Ok(())
}

fn check_tools() -> Result<()> {
    let tools = reelcast_av::check_tools();
    let mut all_found = true;

    for tool in &tools {
        if tool.available {
            println!(
                "✓ {} found{}",
                tool.name,
                tool.version
                    .as_deref()
                    .map(|v| format!(" ({})", v))
                    .unwrap_or_default()
            );
        } else {
            println!("✗ {} not found", tool.name);
            all_found = false;
        }
    }

    if !all_found {
        anyhow::bail!("some required tools are missing");
    }
    Ok(())
}
