use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use crate::auth::Token;
use crate::collector::{Collector, DEFAULT_DEPENDENCY_BOT};
use crate::metrics::MetricsRecord;
use crate::publish::{write_atomic, RunLock, StagedFile};
use crate::render::{render_dashboard, Template};
use crate::sources::fixture::FixtureSource;
use crate::sources::github::{ClientOptions, GitHubSource};
use crate::sources::EventSource;
use crate::window::Window;
use crate::workflows::WorkflowMapping;

const METRICS_FILE: &str = "metrics.json";
const DASHBOARD_FILE: &str = "index.html";

#[derive(Parser)]
#[command(name = "devops-dashboard")]
#[command(author, version, about = "Delivery metrics dashboard generator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory the dashboard artifacts are written to
    #[arg(short, long, global = true, default_value = "site")]
    site_dir: PathBuf,

    /// Pretty print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect metrics and write metrics.json
    Collect {
        #[command(flatten)]
        source: SourceArgs,

        /// Print the metrics to stdout instead of writing metrics.json
        #[arg(long, default_value_t = false)]
        stdout: bool,
    },
    /// Render index.html from a previously collected metrics.json
    Render {
        /// Metrics file to render (defaults to <site-dir>/metrics.json)
        #[arg(short, long)]
        metrics: Option<PathBuf>,

        #[command(flatten)]
        template: TemplateArgs,
    },
    /// Collect metrics and render the dashboard in one run
    Publish {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        template: TemplateArgs,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// GitHub API token (needs read access to actions, pull requests and Dependabot alerts)
    #[arg(short, long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Repository to report on (e.g., "owner/name")
    #[arg(short, long, env = "GITHUB_REPOSITORY")]
    repo: String,

    /// Lookback window in days
    #[arg(
        short,
        long,
        env = "METRICS_WINDOW_DAYS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    window_days: u32,

    /// Instant the window ends at, in RFC 3339 (defaults to now)
    #[arg(long, env = "METRICS_AS_OF", value_name = "TIMESTAMP")]
    as_of: Option<DateTime<Utc>>,

    /// GitHub API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    api_url: String,

    /// Workflow name or file reporting CI results (repeatable)
    #[arg(long = "ci-workflow", value_name = "NAME_OR_PATH", default_value = "CI")]
    ci_workflows: Vec<String>,

    /// Workflow name or file reporting deployments (repeatable)
    #[arg(
        long = "cd-workflow",
        value_name = "NAME_OR_PATH",
        default_value = "CD - Azure Web App"
    )]
    cd_workflows: Vec<String>,

    /// Workflow name or file reporting security scans (repeatable)
    #[arg(long = "security-workflow", value_name = "NAME_OR_PATH", default_value = "Security")]
    security_workflows: Vec<String>,

    /// Login of the bot opening dependency update pull requests
    #[arg(long, default_value = DEFAULT_DEPENDENCY_BOT)]
    dependency_bot: String,

    /// Retries for rate-limited or failing requests
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Maximum pages fetched per category
    #[arg(long, default_value_t = 10)]
    max_pages: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    /// Read events from a JSON fixture instead of the GitHub API
    #[arg(long)]
    fixture: Option<PathBuf>,
}

#[derive(Args)]
struct TemplateArgs {
    /// HTML template with {{ placeholder }} markers (defaults to the built-in dashboard)
    #[arg(long)]
    template: Option<PathBuf>,
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Collect { source, stdout } => {
                let record = source.collect().await?;
                let json = self.to_json(&record)?;

                if *stdout {
                    println!("{json}");
                } else {
                    let _lock = RunLock::acquire(&self.site_dir)?;
                    write_atomic(&self.site_dir.join(METRICS_FILE), json.as_bytes())?;
                }

                Ok(())
            }
            Commands::Render { metrics, template } => {
                let metrics_path = metrics
                    .clone()
                    .unwrap_or_else(|| self.site_dir.join(METRICS_FILE));
                let record = read_record(&metrics_path)?;
                let html = render_dashboard(&record, &template.load()?)?;

                let _lock = RunLock::acquire(&self.site_dir)?;
                write_atomic(&self.site_dir.join(DASHBOARD_FILE), html.as_bytes())?;

                Ok(())
            }
            Commands::Publish { source, template } => {
                // Load the template before spending API quota on a run that cannot render
                let template = template.load()?;
                let _lock = RunLock::acquire(&self.site_dir)?;

                let record = source.collect().await?;
                let json = self.to_json(&record)?;
                let html = render_dashboard(&record, &template)?;

                // Both artifacts are staged before either becomes visible
                let metrics =
                    StagedFile::write(&self.site_dir.join(METRICS_FILE), json.as_bytes())?;
                let dashboard =
                    StagedFile::write(&self.site_dir.join(DASHBOARD_FILE), html.as_bytes())?;
                metrics.commit()?;
                dashboard.commit()?;

                info!("Dashboard published to {}", self.site_dir.display());
                Ok(())
            }
        }
    }

    fn to_json(&self, record: &MetricsRecord) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(record)?
        } else {
            serde_json::to_string(record)?
        };
        Ok(json)
    }
}

impl SourceArgs {
    async fn collect(&self) -> Result<MetricsRecord> {
        let now = self.as_of.unwrap_or_else(Utc::now);
        let window = Window::trailing(self.window_days, now)?;

        if let Some(path) = &self.fixture {
            let source = FixtureSource::load(path)?;
            return self.run_collector(source, &window).await;
        }

        let token = Token::from_optional(self.token.as_deref());
        if token.is_none() {
            warn!(
                "No GitHub token provided; requests are unauthenticated and heavily rate limited"
            );
        }

        let options = ClientOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            max_pages: self.max_pages,
            ..ClientOptions::default()
        };
        let source = GitHubSource::new(&self.api_url, &self.repo, token, options)?;
        self.run_collector(source, &window).await
    }

    async fn run_collector<S: EventSource + Sync>(
        &self,
        source: S,
        window: &Window,
    ) -> Result<MetricsRecord> {
        let mapping = WorkflowMapping::new(
            self.ci_workflows.clone(),
            self.cd_workflows.clone(),
            self.security_workflows.clone(),
        )?;

        let record = Collector::new(source, self.repo.clone(), mapping)
            .with_dependency_bot(self.dependency_bot.clone())
            .collect(window)
            .await?;
        Ok(record)
    }
}

impl TemplateArgs {
    fn load(&self) -> Result<Template> {
        match &self.template {
            Some(path) => Template::load(path)
                .with_context(|| format!("Failed to read template {}", path.display())),
            None => Ok(Template::embedded()),
        }
    }
}

fn read_record(path: &Path) -> Result<MetricsRecord> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read metrics from {}", path.display()))?;
    let record = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid metrics file {}", path.display()))?;
    Ok(record)
}
