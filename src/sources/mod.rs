pub mod fixture;
pub mod github;

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::events::Event;
use crate::window::Window;

/// Raw event listings the collector pulls from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    WorkflowRuns,
    MergedPullRequests,
    OpenPullRequests,
    DependencyAlerts,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WorkflowRuns => "workflow runs",
            Self::MergedPullRequests => "merged pull requests",
            Self::OpenPullRequests => "open pull requests",
            Self::DependencyAlerts => "dependency alerts",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait EventSource {
    /// Returns every event of `category` relevant to `window`.
    ///
    /// Sources may return events outside the window; the collector
    /// filters again before reducing. `OpenPullRequests` and
    /// `DependencyAlerts` describe current state and ignore the window.
    async fn fetch(&self, category: Category, window: &Window) -> Result<Vec<Event>>;
}
