// Export worker binary
//
// Renders dashboards and insights through headless Chromium. `render` runs a
// single direct job and writes the artifact to a file; `export` processes
// asset records from a SQLite database; `token` inspects render tokens.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use render_exporter::{
    AssetStore, ChromiumRenderer, ExportFormat, ExportJob, ExportReference, ExportRunner,
    ExportWorker, ExporterConfig, InMemoryAssetStore, SqliteAssetStore, chromium_runner,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "render-exporter", version, about = "Headless dashboard and insight exporter")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "EXPORTER_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one resource directly and write the artifact to a file
    Render {
        #[command(flatten)]
        config: ConfigArgs,
        /// Resource kind: dashboard or insight
        #[arg(long = "type")]
        export_type: String,
        #[arg(long)]
        id: String,
        #[arg(long, default_value = "image/png")]
        format: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Process exported-asset records from a SQLite database
    Export {
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long, env = "EXPORTER_DB")]
        db: PathBuf,
        #[arg(long = "asset-id", required = true)]
        asset_ids: Vec<i64>,
    },
    /// Issue or verify render tokens
    Token {
        #[command(flatten)]
        config: ConfigArgs,
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    Issue {
        #[arg(long = "type")]
        resource_type: String,
        #[arg(long)]
        id: String,
    },
    Verify {
        token: String,
    },
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Base URL of the web app serving the export page
    #[arg(long, env = "EXPORTER_SITE_URL", default_value = "http://localhost:8000")]
    site_url: String,
    #[arg(long, env = "EXPORTER_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,
    #[arg(long, env = "EXPORTER_POOL_SIZE", default_value_t = 1)]
    pool_size: usize,
    /// Show the browser window (debug builds only)
    #[arg(long, env = "EXPORTER_HEADED")]
    headed: bool,
    #[arg(long, env = "EXPORTER_READINESS_SELECTOR")]
    readiness_selector: Option<String>,
    #[arg(long, env = "EXPORTER_READINESS_TIMEOUT_SECS")]
    readiness_timeout_secs: Option<u64>,
    #[arg(long, env = "EXPORTER_READINESS_POLL_INTERVAL_MS")]
    readiness_poll_interval_ms: Option<u64>,
    #[arg(long, env = "EXPORTER_JOB_TIMEOUT_SECS")]
    job_timeout_secs: Option<u64>,
    #[arg(long, env = "EXPORTER_DASHBOARD_WIDTH")]
    dashboard_viewport_width: Option<u32>,
    #[arg(long, env = "EXPORTER_INSIGHT_WIDTH")]
    insight_viewport_width: Option<u32>,
    #[arg(long, env = "EXPORTER_TOKEN_SECRET", hide_env_values = true)]
    token_secret: Option<String>,
    #[arg(long, env = "EXPORTER_TOKEN_TTL_SECS")]
    token_ttl_secs: Option<u64>,
}

impl ConfigArgs {
    fn into_config(self) -> Result<ExporterConfig> {
        let mut builder = ExporterConfig::builder()
            .site_url(&self.site_url)?
            .pool_size(self.pool_size)
            .headless(!self.headed)
            .token_secret(self.token_secret);

        if let Some(dir) = self.scratch_dir {
            builder = builder.scratch_dir(dir);
        }
        if let Some(selector) = self.readiness_selector {
            builder = builder.readiness_selector(selector);
        }
        if let Some(secs) = self.readiness_timeout_secs {
            builder = builder.readiness_timeout_secs(secs);
        }
        if let Some(millis) = self.readiness_poll_interval_ms {
            builder = builder.readiness_poll_interval_ms(millis);
        }
        if let Some(secs) = self.job_timeout_secs {
            builder = builder.job_timeout_secs(secs);
        }
        if let Some(width) = self.dashboard_viewport_width {
            builder = builder.dashboard_viewport_width(width);
        }
        if let Some(width) = self.insight_viewport_width {
            builder = builder.insight_viewport_width(width);
        }
        if let Some(secs) = self.token_ttl_secs {
            builder = builder.token_ttl_secs(secs);
        }

        builder.build()
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("render_exporter=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Render {
            config,
            export_type,
            id,
            format,
            out,
        } => {
            let config = Arc::new(config.into_config()?);
            let export_format: ExportFormat = format.parse()?;
            let store: Arc<dyn AssetStore> = Arc::new(InMemoryAssetStore::new());
            let runner = chromium_runner(config, store);

            let job = ExportJob::Direct {
                export_type,
                resource_id: id,
                export_format,
            };
            let result = run_until_interrupted(&runner, async {
                let outcome = runner.run(&job).await?;
                let content = outcome.content.context("Direct job returned no content")?;
                tokio::fs::write(&out, content)
                    .await
                    .with_context(|| format!("Failed to write {}", out.display()))?;
                info!(path = %out.display(), bytes = outcome.bytes_len, "Export written");
                Ok(())
            })
            .await;
            runner.renderer().pool().shutdown().await;
            result
        }
        Command::Export {
            config,
            db,
            asset_ids,
        } => {
            let config = Arc::new(config.into_config()?);
            let store: Arc<dyn AssetStore> = Arc::new(SqliteAssetStore::open(&db).await?);
            let concurrency = config.pool_size();
            let runner = Arc::new(chromium_runner(config, store));
            let worker = ExportWorker::spawn(Arc::clone(&runner), concurrency, asset_ids.len());

            let result = run_until_interrupted(&runner, async {
                for asset_id in asset_ids {
                    if worker.submit(ExportJob::asset(asset_id)).await.is_err() {
                        bail!("Export worker stopped accepting jobs");
                    }
                }
                let report = worker.shutdown().await;
                info!(
                    succeeded = report.succeeded,
                    failed = report.failed,
                    "Export run finished"
                );
                if report.failed > 0 {
                    bail!("{} export job(s) failed", report.failed);
                }
                Ok(())
            })
            .await;
            runner.renderer().pool().shutdown().await;
            result
        }
        Command::Token { config, action } => {
            let config = config.into_config()?;
            let issuer = config.token_issuer();
            if !config.has_token_secret() {
                warn!("No token secret configured; using unsigned tokens");
            }
            match action {
                TokenAction::Issue { resource_type, id } => {
                    println!("{}", issuer.issue(&ExportReference::new(resource_type, id))?);
                }
                TokenAction::Verify { token } => {
                    let reference = issuer.verify(&token)?;
                    println!("{}", serde_json::to_string(&reference)?);
                }
            }
            Ok(())
        }
    }
}

/// Drive `work` until it finishes or Ctrl-C arrives
async fn run_until_interrupted<F>(runner: &ExportRunner<ChromiumRenderer>, work: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => {
            warn!(
                launches = runner.renderer().pool().launch_count(),
                "Interrupted, shutting down browser sessions"
            );
            bail!("Interrupted")
        }
    }
}
