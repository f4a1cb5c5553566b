use anyhow::{Context, Result};
use clap::Parser;
use purge_service::{PostSource, PurgeEngine, PurgeReport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use twitter_client::{RetryConfig, RetryController, TimelineApi, TwitterApiClient};
use whitewall_core::{Config, CoreError, ErrorExt, EXIT_OK, EXIT_TWFAIL};

const DEFAULT_CONFIG: &str = "whitewall.toml";
const DEFAULT_FILTER: &str = "whitewall=info,purge_service=info,twitter_client=info";
const VERBOSE_FILTER: &str = "whitewall=debug,purge_service=debug,twitter_client=debug";

/// Deletes old posts from your timeline, keeping the ones you care about.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Log what would be deleted without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Resume below this post id instead of starting at the newest post
    #[arg(long)]
    start_cursor: Option<String>,

    /// Read posts from an exported archive (file or directory of batches)
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Seconds to sleep before walking the timeline again; 0 quits when done
    #[arg(long)]
    idle_seconds: Option<u64>,

    /// Debug logging for all whitewall crates
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn load_config(&self) -> Result<Config> {
        let mut config = if self.config.exists() || self.config != PathBuf::from(DEFAULT_CONFIG) {
            Config::load(&self.config).map_err(CoreError::from).with_context(|| {
                format!("Failed to load configuration from {}", self.config.display())
            })?
        } else {
            info!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env();
        if self.dry_run {
            config.run.dry_run = true;
        }
        if let Some(cursor) = &self.start_cursor {
            config.run.start_cursor = Some(cursor.clone());
        }
        if let Some(archive) = &self.archive {
            config.run.archive_source = Some(archive.clone());
        }
        if let Some(idle) = self.idle_seconds {
            config.run.idle_seconds = idle;
        }
        config
            .validate()
            .map_err(CoreError::from)
            .context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let code = match run(args).await {
        Ok(()) => EXIT_OK,
        Err(error) => match error.downcast_ref::<CoreError>() {
            Some(core) => {
                core.log_error();
                eprintln!("{}", core.user_friendly_message());
                core.exit_code()
            }
            None => {
                tracing::error!("{:#}", error);
                eprintln!("{error:#}");
                EXIT_TWFAIL
            }
        },
    };
    std::process::exit(code);
}

async fn run(args: Args) -> Result<()> {
    let config = args.load_config()?;
    info!("Starting whitewall {}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Configuration: {:?}", config);

    let retry = Arc::new(RetryController::new(RetryConfig::from(&config.retry)));
    let mut client = TwitterApiClient::new(&config.api, &config.credentials)
        .context("Failed to create API client")?
        .with_retweets(config.run.include_retweets);

    let account = retry
        .execute("verify_credentials", || client.verify_credentials())
        .await
        .context("Failed to verify credentials")?;
    info!("authenticated as @{} (#{})", account.screen_name, account.id);

    match client.user_id() {
        Some(configured) if configured != account.id => warn!(
            "Configured user id {} differs from the authenticated account #{}",
            configured, account.id
        ),
        Some(_) => {}
        None => client = client.with_user_id(account.id.clone()),
    }

    let api = Arc::new(client);
    let source = PostSource::from_config(api.clone(), retry.clone(), &config.run)
        .await
        .context("Failed to open post source")?;
    let mut engine = PurgeEngine::new(api, source, retry.clone(), &config);

    let outcome = tokio::select! {
        result = engine.run() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(result) => {
            let report = result.context("Purge stopped")?;
            log_report(&report, &retry);
        }
        None => {
            info!(
                "Interrupted; resume with --start-cursor {}",
                engine.cursor()
            );
        }
    }
    Ok(())
}

fn log_report(report: &PurgeReport, retry: &RetryController) {
    info!(
        "Done after {} walk(s): {} examined, {} kept, {} deleted, {} already gone, {} would delete",
        report.walks,
        report.examined,
        report.kept,
        report.deleted,
        report.already_gone,
        report.would_delete
    );
    let metrics = retry.get_metrics();
    info!(
        "Retries: {} total ({} rate limit waits, {} transient), {:?} spent waiting",
        metrics.total_retries,
        metrics.rate_limit_waits,
        metrics.transient_retries,
        metrics.total_delay
    );
}
