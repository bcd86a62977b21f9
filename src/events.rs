use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A finished or in-flight workflow run, independent of the hosting platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub path: String,
    /// `None` while the run is still queued or in progress.
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn is_completed(&self) -> bool {
        self.conclusion.is_some()
    }

    pub fn succeeded(&self) -> bool {
        self.conclusion.as_deref() == Some("success")
    }

    pub fn failed(&self) -> bool {
        self.conclusion.as_deref() == Some("failure")
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        let started = self.started_at?;
        let ended = self.updated_at?;

        #[allow(clippy::cast_precision_loss)]
        let seconds = (ended - started).num_milliseconds() as f64 / 1000.0;
        (seconds >= 0.0).then_some(seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub author: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    pub fn lead_time_seconds(&self) -> Option<f64> {
        let merged = self.merged_at?;

        #[allow(clippy::cast_precision_loss)]
        let seconds = (merged - self.created_at).num_milliseconds() as f64 / 1000.0;
        Some(seconds.max(0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyAlert {
    pub package: String,
    #[serde(default)]
    pub ecosystem: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Run(WorkflowRun),
    PullRequest(PullRequest),
    Alert(DependencyAlert),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Run(_) => "workflow run",
            Self::PullRequest(_) => "pull request",
            Self::Alert(_) => "dependency alert",
        }
    }
}
