use std::path::Path;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use super::{Category, EventSource};
use crate::error::Result;
use crate::events::{DependencyAlert, Event, PullRequest, WorkflowRun};
use crate::window::Window;

/// Event source backed by a JSON document, for offline runs and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureSource {
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRun>,
    #[serde(default)]
    pub closed_pull_requests: Vec<PullRequest>,
    #[serde(default)]
    pub open_pull_requests: Vec<PullRequest>,
    #[serde(default)]
    pub dependency_alerts: Vec<DependencyAlert>,
}

impl FixtureSource {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let fixture: Self = serde_json::from_str(&raw)?;

        info!(
            "Loaded fixture {} ({} runs, {} closed PRs, {} open PRs, {} alerts)",
            path.display(),
            fixture.workflow_runs.len(),
            fixture.closed_pull_requests.len(),
            fixture.open_pull_requests.len(),
            fixture.dependency_alerts.len()
        );

        Ok(fixture)
    }
}

#[async_trait]
impl EventSource for FixtureSource {
    async fn fetch(&self, category: Category, _window: &Window) -> Result<Vec<Event>> {
        let events = match category {
            Category::WorkflowRuns => self.workflow_runs.iter().cloned().map(Event::Run).collect(),
            Category::MergedPullRequests => self
                .closed_pull_requests
                .iter()
                .cloned()
                .map(Event::PullRequest)
                .collect(),
            Category::OpenPullRequests => self
                .open_pull_requests
                .iter()
                .cloned()
                .map(Event::PullRequest)
                .collect(),
            Category::DependencyAlerts => self
                .dependency_alerts
                .iter()
                .cloned()
                .map(Event::Alert)
                .collect(),
        };

        Ok(events)
    }
}
