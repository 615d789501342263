mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};

use sitewatch_core::{
    is_valid_url, uptime_percent, CheckResult, HttpProber, LogNotifier, MemoryStore,
    MonitorContext, Notifier, SchedulerConfig, SendError, Site, Stores, Supervisor,
    WebhookConfig, WebhookNotifier,
};

/// Website monitor: probes sites on a schedule and alerts on sustained outages.
#[derive(Parser)]
#[command(name = "sitewatch", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and its HTTP API.
    Serve {
        /// Listen address (e.g. 0.0.0.0:8080). Overrides config file.
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Monitor a single URL from the command line (no API server).
    Watch {
        /// URL to probe.
        url: String,

        /// Seconds between checks.
        #[arg(long, default_value_t = 5)]
        interval: u64,

        /// Per-check timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Consecutive DOWN checks before alerting.
        #[arg(long, default_value_t = 3)]
        threshold: usize,

        /// Optional webhook URL to POST alerts to.
        #[arg(long)]
        webhook_url: Option<String>,

        /// Alert recipient passed to the notifier.
        #[arg(long)]
        email: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { listen, config } => {
            run_serve(listen, config).await;
        }
        Commands::Watch {
            url,
            interval,
            timeout_ms,
            threshold,
            webhook_url,
            email,
        } => {
            fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
                )
                .init();
            let opts = WatchOptions {
                url,
                interval,
                timeout_ms,
                threshold,
                webhook_url,
                email,
            };
            run_watch(opts).await;
        }
    }
}

async fn run_serve(listen_override: Option<SocketAddr>, config_path: Option<PathBuf>) {
    let app_config = if let Some(ref path) = config_path {
        match config::AppConfig::load(path) {
            Ok(c) => {
                init_tracing(&c.server.log_format);
                tracing::info!(path = %path.display(), "Loaded config file");
                Some(c)
            }
            Err(e) => {
                init_tracing("pretty");
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        }
    } else {
        init_tracing("pretty");
        None
    };

    let listen = listen_override
        .or(app_config.as_ref().map(|c| c.server.listen))
        .unwrap_or_else(config::default_listen);

    let scheduler_config = app_config
        .as_ref()
        .map(|c| c.scheduler.to_scheduler_config())
        .unwrap_or_default();

    let webhooks = app_config
        .as_ref()
        .map(|c| c.webhook.clone())
        .unwrap_or_default();

    let store = Arc::new(MemoryStore::new());
    if let Some(ref app_config) = app_config {
        for site in &app_config.site {
            store.upsert_site(site.clone()).await;
        }
        tracing::info!(count = app_config.site.len(), "Sites loaded from config");
    }

    let prober = match HttpProber::new() {
        Ok(p) => Arc::new(p),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            std::process::exit(1);
        }
    };

    let notifier = match build_notifier(webhooks) {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build webhook client");
            std::process::exit(1);
        }
    };

    let ctx = MonitorContext::new(
        Stores::memory(store),
        prober,
        notifier,
        scheduler_config,
    );
    let supervisor = Arc::new(Supervisor::new(ctx));

    match supervisor.start_all().await {
        Ok(count) => tracing::info!(sites = count, "Scheduler running"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load active sites");
            std::process::exit(1);
        }
    }

    let state = sitewatch_api::state::AppState::new(Arc::clone(&supervisor));

    tracing::info!(%listen, "Starting sitewatch API server");
    let served =
        sitewatch_api::serve_with_state(listen, state, sitewatch_api::shutdown_signal()).await;

    tracing::info!("Shutting down monitor tasks...");
    supervisor.shutdown_all().await;

    if let Err(e) = served {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
}

fn build_notifier(webhooks: Vec<WebhookConfig>) -> Result<Arc<dyn Notifier>, String> {
    if webhooks.is_empty() {
        tracing::info!("No webhooks configured, alerts will only be logged");
        return Ok(Arc::new(LogNotifier));
    }
    let client = HttpProber::build_client().map_err(|e| e.to_string())?;
    tracing::info!(count = webhooks.len(), "Webhook notifier configured");
    Ok(Arc::new(WebhookNotifier::new(webhooks, client)))
}

struct WatchOptions {
    url: String,
    interval: u64,
    timeout_ms: Option<u64>,
    threshold: usize,
    webhook_url: Option<String>,
    email: Option<String>,
}

/// Prints alerts above the status line, and forwards them to a webhook
/// when one is configured.
struct ConsoleNotifier {
    multi: MultiProgress,
    forward: Option<WebhookNotifier>,
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), SendError> {
        let ts = chrono_now();
        self.multi
            .println(format!(
                "  {}  {} {}",
                style(ts).dim(),
                style("ALERT").red().bold(),
                style(subject).red()
            ))
            .ok();
        self.multi
            .println(format!("  {}  {} {}", " ".repeat(8), style(recipient).dim(), body))
            .ok();
        match &self.forward {
            Some(webhook) => webhook.send(recipient, subject, body).await,
            None => Ok(()),
        }
    }
}

async fn run_watch(opts: WatchOptions) {
    if !is_valid_url(&opts.url) {
        eprintln!(
            "{} URL must use http or https and name a host: {}",
            style("error:").red().bold(),
            opts.url
        );
        std::process::exit(2);
    }

    let multi = MultiProgress::new();

    let forward = match opts.webhook_url.as_deref() {
        Some(url) => match HttpProber::build_client() {
            Ok(client) => Some(WebhookNotifier::new(vec![WebhookConfig::new(url)], client)),
            Err(e) => {
                eprintln!("{} {}", style("error:").red().bold(), e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let prober = match HttpProber::new() {
        Ok(p) => Arc::new(p),
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    let mut site = Site::new("watch", opts.url.clone(), opts.interval.max(1))
        .with_owner_email(opts.email.clone().unwrap_or_else(|| "console".to_string()));
    if let Some(ms) = opts.timeout_ms {
        site = site.with_timeout_ms(ms);
    }
    let site_id = site.id.clone();

    let config = SchedulerConfig::default().with_consecutive_down_threshold(opts.threshold);
    let probe_timeout = config.probe_timeout_for(&site);

    let store = Arc::new(MemoryStore::new());
    store.upsert_site(site).await;

    let notifier = Arc::new(ConsoleNotifier {
        multi: multi.clone(),
        forward,
    });
    let ctx = MonitorContext::new(Stores::memory(store.clone()), prober, notifier, config);
    let supervisor = Supervisor::new(ctx);

    let msg_style = ProgressStyle::with_template("{wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());

    multi
        .println(format!(
            "{} {}",
            style("sitewatch").bold(),
            style(env!("CARGO_PKG_VERSION")).dim()
        ))
        .ok();
    multi
        .println(format!(
            "  {} {}",
            style("url:      ").dim(),
            style(&opts.url).bold()
        ))
        .ok();
    multi
        .println(format!("  {} {}s", style("interval: ").dim(), opts.interval.max(1)))
        .ok();
    multi
        .println(format!(
            "  {} {}ms",
            style("timeout:  ").dim(),
            probe_timeout.as_millis()
        ))
        .ok();
    multi
        .println(format!("  {} {}", style("threshold:").dim(), opts.threshold.max(1)))
        .ok();
    if let Some(ref wh) = opts.webhook_url {
        multi
            .println(format!("  {} {}", style("webhook:  ").dim(), wh))
            .ok();
    }
    multi.println("").ok();
    multi
        .println(format!("{}", style("Press Ctrl+C to stop").dim()))
        .ok();
    multi.println("").ok();

    supervisor.reschedule(&site_id).await;

    let status_bar = multi.add(ProgressBar::new_spinner().with_style(msg_style));
    status_bar.set_message(format!(
        "{}\n  {}",
        format_separator(0),
        style("Waiting for first check...").dim()
    ));

    let mut printed = 0usize;
    let mut last_seen: Option<String> = None;
    let shutdown = sitewatch_api::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
            _ = &mut shutdown => {
                status_bar.finish_and_clear();
                supervisor.shutdown_all().await;
                multi.println(format!("\n{}", style("Monitor stopped.").dim())).ok();
                return;
            }
        }

        let checks = store.all_checks(&site_id).await;
        let fresh = unseen_checks(&checks, last_seen.as_deref());
        if fresh.is_empty() {
            continue;
        }
        for check in fresh {
            multi.println(format_check(check)).ok();
        }
        printed += fresh.len();
        last_seen = checks.last().map(|c| c.id.clone());

        let uptime = uptime_percent(&checks);
        let mut lines = vec![format_separator(printed)];
        if let Some(last) = checks.last() {
            lines.push(format!(
                "  {:<6} uptime={:.2}%  checks={}  last={}",
                status_badge(last),
                uptime,
                printed,
                last.timestamp.format("%H:%M:%S")
            ));
        }
        status_bar.set_message(lines.join("\n"));
    }
}

/// Checks stored after the one with id `last_seen`. Everything is unseen when
/// that check is unknown or has been evicted from the history.
fn unseen_checks<'a>(checks: &'a [CheckResult], last_seen: Option<&str>) -> &'a [CheckResult] {
    match last_seen.and_then(|id| checks.iter().rposition(|c| c.id == id)) {
        Some(pos) => &checks[pos + 1..],
        None => checks,
    }
}

fn chrono_now() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

fn status_badge(check: &CheckResult) -> String {
    if check.is_up() {
        style("UP").green().bold().to_string()
    } else {
        style("DOWN").red().bold().to_string()
    }
}

fn format_check(check: &CheckResult) -> String {
    let ts = check.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S");
    let code = check
        .status_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "---".to_string());
    let latency = check
        .latency_ms
        .map(|ms| format!("{}ms", ms))
        .unwrap_or_default();
    let detail = check.error.as_deref().unwrap_or_default();
    format!(
        "  {}  {:<6} {} {:>7}  {}",
        style(ts).dim(),
        status_badge(check),
        code,
        style(latency).dim(),
        style(detail).red()
    )
}

fn format_separator(check_num: usize) -> String {
    let label = if check_num == 0 {
        String::new()
    } else {
        format!(" check {} ", check_num)
    };
    let width = 54usize.saturating_sub(label.len());
    format!(
        "{}{}{}",
        style("──").dim(),
        style(label).dim().bold(),
        style("─".repeat(width)).dim()
    )
}

fn init_tracing(log_format: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .init();
        }
    }
}
