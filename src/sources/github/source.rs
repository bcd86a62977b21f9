use async_trait::async_trait;
use log::info;

use super::client::{ClientOptions, GitHubClient};
use super::types::{DependabotAlertDto, PullRequestDto, WorkflowRunsPageDto};
use crate::auth::Token;
use crate::error::{DashboardError, Result};
use crate::events::Event;
use crate::sources::{Category, EventSource};
use crate::window::Window;

pub struct GitHubSource {
    client: GitHubClient,
    repo: String,
}

impl GitHubSource {
    pub fn new(
        api_url: &str,
        repo: &str,
        token: Option<Token>,
        options: ClientOptions,
    ) -> Result<Self> {
        validate_repo(repo)?;
        let client = GitHubClient::new(api_url, token, options)?;

        Ok(Self {
            client,
            repo: repo.to_string(),
        })
    }

    async fn fetch_workflow_runs(&self, window: &Window) -> Result<Vec<Event>> {
        let url = self.client.repo_url(&self.repo, "actions/runs")?;
        let start = window.start();
        let query = [("created", format!(">={}", start.format("%Y-%m-%d")))];

        let runs = self
            .client
            .fetch_paginated::<WorkflowRunsPageDto>(Category::WorkflowRuns, url, &query, |page| {
                page.last().is_some_and(|run| run.created_at < start)
            })
            .await?;

        Ok(runs.into_iter().map(|dto| Event::Run(dto.into())).collect())
    }

    async fn fetch_merged_pull_requests(&self, window: &Window) -> Result<Vec<Event>> {
        let url = self.client.repo_url(&self.repo, "pulls")?;
        let start = window.start();
        let query = [
            ("state", "closed".to_string()),
            ("sort", "updated".to_string()),
            ("direction", "desc".to_string()),
        ];

        // A PR cannot merge after its last update, so once a page reaches
        // PRs updated before the window nothing older can count
        let prs = self
            .client
            .fetch_paginated::<Vec<PullRequestDto>>(
                Category::MergedPullRequests,
                url,
                &query,
                |page| {
                    page.last()
                        .and_then(|pr| pr.updated_at)
                        .is_some_and(|updated| updated < start)
                },
            )
            .await?;

        Ok(prs
            .into_iter()
            .filter(|pr| pr.merged_at.is_some())
            .map(|dto| Event::PullRequest(dto.into()))
            .collect())
    }

    async fn fetch_open_pull_requests(&self) -> Result<Vec<Event>> {
        let url = self.client.repo_url(&self.repo, "pulls")?;
        let query = [("state", "open".to_string())];

        let prs = self
            .client
            .fetch_paginated::<Vec<PullRequestDto>>(
                Category::OpenPullRequests,
                url,
                &query,
                |_| false,
            )
            .await?;

        Ok(prs
            .into_iter()
            .map(|dto| Event::PullRequest(dto.into()))
            .collect())
    }

    async fn fetch_dependency_alerts(&self) -> Result<Vec<Event>> {
        let url = self.client.repo_url(&self.repo, "dependabot/alerts")?;
        let query = [("state", "open".to_string())];

        let alerts = self
            .client
            .fetch_paginated::<Vec<DependabotAlertDto>>(
                Category::DependencyAlerts,
                url,
                &query,
                |_| false,
            )
            .await?;

        Ok(alerts
            .into_iter()
            .map(|dto| Event::Alert(dto.into()))
            .collect())
    }
}

#[async_trait]
impl EventSource for GitHubSource {
    async fn fetch(&self, category: Category, window: &Window) -> Result<Vec<Event>> {
        info!("Fetching {category} for {}...", self.repo);

        let events = match category {
            Category::WorkflowRuns => self.fetch_workflow_runs(window).await?,
            Category::MergedPullRequests => self.fetch_merged_pull_requests(window).await?,
            Category::OpenPullRequests => self.fetch_open_pull_requests().await?,
            Category::DependencyAlerts => self.fetch_dependency_alerts().await?,
        };

        info!("Fetched {} {category}", events.len());
        Ok(events)
    }
}

fn validate_repo(repo: &str) -> Result<()> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };

    match repo.split_once('/') {
        Some((owner, name)) if valid_part(owner) && valid_part(name) => Ok(()),
        _ => Err(DashboardError::Config(format!(
            "repository must look like 'owner/name', got '{repo}'"
        ))),
    }
}
