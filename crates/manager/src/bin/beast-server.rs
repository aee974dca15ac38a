//! beast-server: runs the message router as a long-lived process.
//!
//! Loads the server config and the route definitions, starts the dispatch
//! pool and the cron scheduler, then reads newline-delimited JSON messages
//! from stdin and hands each one to the message manager. Stops on EOF or
//! Ctrl-C, draining in-flight work before exiting.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use beast_adaptors::AdaptorManager;
use beast_core::config::load_dotenv;
use beast_core::{BeastConfig, Message, MessageSink};
use beast_manager::{CronScheduler, MessageManager};
use beast_router::{Router, YamlRouteStore};
use beast_rules::{RuleContext, TimeoutManager};

// ── CLI ─────────────────────────────────────────────────────────────

/// Beast message router server.
#[derive(Parser, Debug)]
#[command(name = "beast-server", version, about)]
struct Cli {
    /// Path to the beast.toml config file.
    #[arg(long, env = "BEAST_CONFIG", default_value = "config/beast.toml")]
    config: String,

    /// Route definitions directory. Overrides `routes.dir` from the config.
    #[arg(long, env = "BEAST_ROUTES_DIR")]
    routes_dir: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "BEAST_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &str) -> anyhow::Result<BeastConfig> {
    if Path::new(path).exists() {
        let config = BeastConfig::from_file(path)?;
        info!(path = %path, "loaded beast config");
        return Ok(config);
    }
    warn!(path = %path, "config file not found, using defaults");
    let mut config = BeastConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = load_config(&cli.config)?;
    if let Some(dir) = cli.routes_dir {
        config.routes.dir = dir;
    }

    let timeouts = TimeoutManager::current();
    let store = Arc::new(YamlRouteStore::new(&config.routes.dir)?);
    let router = Arc::new(Router::with_store(
        RuleContext::with_timeouts(Arc::clone(&timeouts)),
        store,
    ));
    let loaded = router.load_from_store()?;
    info!(routes = loaded, dir = %config.routes.dir, "routes loaded");

    let adaptors = Arc::new(AdaptorManager::from_config(&config.adaptors)?);
    let manager = MessageManager::start(Arc::clone(&router), adaptors, &config.manager);
    let sink: Arc<dyn MessageSink> = manager.clone();
    timeouts.set_sink(&sink);

    let scheduler = Arc::new(CronScheduler::from_jobs(Arc::clone(&sink), &config.scheduler.jobs)?);
    let scheduler_task = {
        let scheduler = Arc::clone(&scheduler);
        let tick = config.scheduler.tick();
        tokio::spawn(async move { scheduler.run(tick).await })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("reading messages from stdin");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match serde_json::from_str::<Message>(&line) {
                        Ok(message) => {
                            debug!(kind = message.kind(), "message received");
                            manager.manage(message);
                        }
                        Err(e) => warn!(error = %e, "skipping malformed message"),
                    },
                    Ok(None) => {
                        info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }
    }

    scheduler.stop();
    if let Err(e) = scheduler_task.await {
        warn!(error = %e, "scheduler task failed");
    }
    manager.shutdown().await;
    timeouts.clear();
    info!(stats = ?manager.stats(), "beast-server stopped");
    Ok(())
}
