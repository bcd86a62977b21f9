use std::collections::HashSet;

use crate::error::{DashboardError, Result};
use crate::events::WorkflowRun;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowKind {
    Ci,
    Deployment,
    Security,
}

/// Explicit mapping from workflow identifiers to the category they report on.
///
/// An identifier matches a run by workflow name (case-insensitive) or by
/// workflow file path, either in full or by file name.
#[derive(Debug, Clone)]
pub struct WorkflowMapping {
    ci: Vec<String>,
    deployment: Vec<String>,
    security: Vec<String>,
}

impl WorkflowMapping {
    pub fn new(ci: Vec<String>, deployment: Vec<String>, security: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::new();
        for id in ci.iter().chain(&deployment).chain(&security) {
            let id = id.trim();
            if id.is_empty() {
                return Err(DashboardError::Config(
                    "workflow identifiers must not be empty".to_string(),
                ));
            }
            if !seen.insert(id.to_lowercase()) {
                return Err(DashboardError::Config(format!(
                    "workflow '{id}' is mapped to more than one category"
                )));
            }
        }

        Ok(Self {
            ci,
            deployment,
            security,
        })
    }

    pub fn classify(&self, run: &WorkflowRun) -> Option<WorkflowKind> {
        [
            (WorkflowKind::Ci, &self.ci),
            (WorkflowKind::Deployment, &self.deployment),
            (WorkflowKind::Security, &self.security),
        ]
        .into_iter()
        .find(|(_, ids)| ids.iter().any(|id| matches_run(id.trim(), run)))
        .map(|(kind, _)| kind)
    }
}

impl Default for WorkflowMapping {
    fn default() -> Self {
        Self {
            ci: vec!["CI".to_string()],
            deployment: vec!["CD - Azure Web App".to_string()],
            security: vec!["Security".to_string()],
        }
    }
}

fn matches_run(id: &str, run: &WorkflowRun) -> bool {
    run.name.eq_ignore_ascii_case(id)
        || (!run.path.is_empty()
            && (run.path == id || run.path.rsplit('/').next() == Some(id)))
}
