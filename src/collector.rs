use std::collections::BTreeSet;

use log::{info, warn};

use crate::error::{DashboardError, Result};
use crate::events::{DependencyAlert, Event, PullRequest, WorkflowRun};
use crate::metrics::{
    CiMetrics, DependencyMetrics, DeploymentMetrics, FlowMetrics, MetricsRecord, Ratio,
    SecurityMetrics,
};
use crate::sources::{Category, EventSource};
use crate::window::Window;
use crate::workflows::{WorkflowKind, WorkflowMapping};

pub const DEFAULT_DEPENDENCY_BOT: &str = "dependabot[bot]";

pub struct Collector<S> {
    source: S,
    repository: String,
    mapping: WorkflowMapping,
    dependency_bot: String,
}

impl<S: EventSource + Sync> Collector<S> {
    pub fn new(source: S, repository: String, mapping: WorkflowMapping) -> Self {
        Self {
            source,
            repository,
            mapping,
            dependency_bot: DEFAULT_DEPENDENCY_BOT.to_string(),
        }
    }

    #[must_use]
    pub fn with_dependency_bot(mut self, login: String) -> Self {
        self.dependency_bot = login;
        self
    }

    /// Fetches every category, then reduces them into one record.
    ///
    /// Any failed category aborts the whole run so a partial record is
    /// never published.
    pub async fn collect(&self, window: &Window) -> Result<MetricsRecord> {
        info!(
            "Collecting metrics for {} over the last {} days",
            self.repository,
            window.days()
        );

        let (runs, merged, open, alerts) = futures::try_join!(
            self.source.fetch(Category::WorkflowRuns, window),
            self.source.fetch(Category::MergedPullRequests, window),
            self.source.fetch(Category::OpenPullRequests, window),
            self.source.fetch(Category::DependencyAlerts, window),
        )?;

        let runs = into_runs(runs)?;
        let merged = into_pull_requests(merged, Category::MergedPullRequests)?;
        let open = into_pull_requests(open, Category::OpenPullRequests)?;
        let alerts = into_alerts(alerts)?;

        let partitions = partition_runs(&runs, window, &self.mapping);
        if partitions.deployments.is_empty() {
            warn!("No deployment runs matched in window for {}", self.repository);
        }

        let merged_in_window: Vec<&PullRequest> = merged
            .iter()
            .filter(|pr| pr.merged_at.is_some_and(|at| window.contains(at)))
            .collect();

        let record = MetricsRecord {
            generated_at: window.end(),
            window_days: window.days(),
            repository: self.repository.clone(),
            deployments: deployment_metrics(&partitions.deployments),
            pull_requests: flow_metrics(&merged_in_window),
            ci: ci_metrics(&partitions.ci),
            security: security_metrics(&partitions.security),
            dependencies: dependency_metrics(
                &open,
                &merged_in_window,
                &alerts,
                &self.dependency_bot,
            ),
        };

        info!(
            "Collected {} deployments, {} CI runs, {} security runs, {} merged PRs",
            record.deployments.total,
            record.ci.runs,
            record.security.runs,
            record.pull_requests.merged
        );

        Ok(record)
    }
}

fn into_runs(events: Vec<Event>) -> Result<Vec<WorkflowRun>> {
    events
        .into_iter()
        .map(|event| match event {
            Event::Run(run) => Ok(run),
            other => Err(unexpected(Category::WorkflowRuns, &other)),
        })
        .collect()
}

fn into_pull_requests(events: Vec<Event>, category: Category) -> Result<Vec<PullRequest>> {
    events
        .into_iter()
        .map(|event| match event {
            Event::PullRequest(pr) => Ok(pr),
            other => Err(unexpected(category, &other)),
        })
        .collect()
}

fn into_alerts(events: Vec<Event>) -> Result<Vec<DependencyAlert>> {
    events
        .into_iter()
        .map(|event| match event {
            Event::Alert(alert) => Ok(alert),
            other => Err(unexpected(Category::DependencyAlerts, &other)),
        })
        .collect()
}

fn unexpected(category: Category, event: &Event) -> DashboardError {
    DashboardError::DataShape {
        category,
        message: format!("source returned a {} event", event.kind()),
    }
}

#[derive(Debug, Default)]
struct RunPartitions<'a> {
    ci: Vec<&'a WorkflowRun>,
    deployments: Vec<&'a WorkflowRun>,
    security: Vec<&'a WorkflowRun>,
}

/// Splits completed runs created inside the window by workflow kind,
/// oldest first.
fn partition_runs<'a>(
    runs: &'a [WorkflowRun],
    window: &Window,
    mapping: &WorkflowMapping,
) -> RunPartitions<'a> {
    let mut sorted: Vec<&WorkflowRun> = runs
        .iter()
        .filter(|run| run.is_completed() && window.contains(run.created_at))
        .collect();
    sorted.sort_by_key(|run| (run.created_at, run.id));

    sorted
        .into_iter()
        .fold(RunPartitions::default(), |mut acc, run| {
            match mapping.classify(run) {
                Some(WorkflowKind::Ci) => acc.ci.push(run),
                Some(WorkflowKind::Deployment) => acc.deployments.push(run),
                Some(WorkflowKind::Security) => acc.security.push(run),
                None => {}
            }
            acc
        })
}

fn deployment_metrics(runs: &[&WorkflowRun]) -> DeploymentMetrics {
    let total = runs.len();
    let successful = runs.iter().filter(|r| r.succeeded()).count();
    let failed = runs.iter().filter(|r| r.failed()).count();

    let durations: Vec<f64> = runs
        .iter()
        .filter(|r| r.succeeded())
        .filter_map(|r| r.duration_seconds())
        .collect();

    DeploymentMetrics {
        total,
        successful,
        failed,
        success_rate: Ratio::of(successful, total),
        change_failure_rate: Ratio::of(failed, total),
        recovery_time_seconds: recovery_time(runs),
        avg_duration_seconds: compute_mean(&durations),
    }
}

/// Mean time from the first failure of a failing streak to the next
/// success. Streaks still failing at the end of the window are not counted.
fn recovery_time(runs: &[&WorkflowRun]) -> Option<f64> {
    let (recoveries, _) = runs.iter().fold(
        (Vec::new(), None),
        |(mut recoveries, failing_since), run| {
            if run.failed() {
                (recoveries, failing_since.or(Some(run.created_at)))
            } else if run.succeeded() {
                if let Some(failed_at) = failing_since {
                    #[allow(clippy::cast_precision_loss)]
                    let seconds = (run.created_at - failed_at).num_milliseconds() as f64 / 1000.0;
                    recoveries.push(seconds);
                }
                (recoveries, None)
            } else {
                (recoveries, failing_since)
            }
        },
    );

    compute_mean(&recoveries)
}

fn flow_metrics(merged: &[&PullRequest]) -> FlowMetrics {
    let lead_times: Vec<f64> = merged
        .iter()
        .filter_map(|pr| pr.lead_time_seconds())
        .collect();

    FlowMetrics {
        merged: merged.len(),
        lead_time_avg_seconds: compute_mean(&lead_times),
        lead_time_median_seconds: compute_median(&lead_times),
    }
}

fn ci_metrics(runs: &[&WorkflowRun]) -> CiMetrics {
    let successful = runs.iter().filter(|r| r.succeeded()).count();
    let durations: Vec<f64> = runs.iter().filter_map(|r| r.duration_seconds()).collect();

    CiMetrics {
        runs: runs.len(),
        success_rate: Ratio::of(successful, runs.len()),
        avg_duration_seconds: compute_mean(&durations),
    }
}

fn security_metrics(runs: &[&WorkflowRun]) -> SecurityMetrics {
    let successful = runs.iter().filter(|r| r.succeeded()).count();

    SecurityMetrics {
        runs: runs.len(),
        success_rate: Ratio::of(successful, runs.len()),
        // Runs are sorted oldest first
        last_conclusion: runs.last().and_then(|r| r.conclusion.clone()),
    }
}

fn dependency_metrics(
    open: &[PullRequest],
    merged_in_window: &[&PullRequest],
    alerts: &[DependencyAlert],
    bot: &str,
) -> DependencyMetrics {
    let outdated: BTreeSet<(&str, &str)> = alerts
        .iter()
        .map(|a| (a.ecosystem.as_str(), a.package.as_str()))
        .collect();

    DependencyMetrics {
        open_prs: open.iter().filter(|pr| pr.author == bot).count(),
        merged_prs: merged_in_window.iter().filter(|pr| pr.author == bot).count(),
        outdated_packages: outdated.len(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn compute_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn compute_median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;

    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::fixture::FixtureSource;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn window() -> Window {
        Window::trailing(30, now()).unwrap()
    }

    fn run(id: u64, name: &str, conclusion: &str, hours_ago: i64) -> WorkflowRun {
        let created = now() - Duration::hours(hours_ago);
        WorkflowRun {
            id,
            name: name.to_string(),
            path: String::new(),
            conclusion: Some(conclusion.to_string()),
            created_at: created,
            started_at: Some(created),
            updated_at: Some(created + Duration::minutes(10)),
        }
    }

    fn pr(
        number: u64,
        author: &str,
        created_hours_ago: i64,
        merged_hours_ago: Option<i64>,
    ) -> PullRequest {
        PullRequest {
            number,
            author: author.to_string(),
            created_at: now() - Duration::hours(created_hours_ago),
            updated_at: None,
            merged_at: merged_hours_ago.map(|h| now() - Duration::hours(h)),
        }
    }

    fn collector(fixture: FixtureSource) -> Collector<FixtureSource> {
        Collector::new(fixture, "octo/calc".to_string(), WorkflowMapping::default())
    }

    #[tokio::test]
    async fn test_ci_and_deployment_success_ratios() {
        let fixture = FixtureSource {
            workflow_runs: vec![
                run(1, "CI", "success", 30),
                run(2, "CI", "failure", 20),
                run(3, "CI", "success", 10),
                run(4, "CD - Azure Web App", "success", 5),
            ],
            ..FixtureSource::default()
        };

        let record = collector(fixture).collect(&window()).await.unwrap();

        let ci = record.ci.success_rate.value().unwrap();
        assert_eq!(record.ci.runs, 3);
        assert!((ci - 0.667).abs() < 1e-3);
        assert_eq!(record.deployments.success_rate.value(), Some(1.0));
        assert_eq!(record.deployments.change_failure_rate.value(), Some(0.0));
        assert_eq!(record.ci.avg_duration_seconds, Some(600.0));
    }

    #[tokio::test]
    async fn test_no_deployments_yields_no_data_ratios() {
        let fixture = FixtureSource {
            workflow_runs: vec![run(1, "CI", "success", 1)],
            ..FixtureSource::default()
        };

        let record = collector(fixture).collect(&window()).await.unwrap();

        assert_eq!(record.deployments.total, 0);
        assert_eq!(record.deployments.change_failure_rate, Ratio::NO_DATA);
        assert_eq!(record.deployments.success_rate, Ratio::NO_DATA);
        assert_eq!(record.deployments.recovery_time_seconds, None);
        assert_eq!(record.security.success_rate, Ratio::NO_DATA);
        assert_eq!(record.security.last_conclusion, None);
    }

    #[tokio::test]
    async fn test_runs_outside_window_or_in_progress_are_ignored() {
        let mut in_progress = run(3, "CI", "success", 2);
        in_progress.conclusion = None;
        let fixture = FixtureSource {
            workflow_runs: vec![
                run(1, "CI", "failure", 24 * 31),
                run(2, "CI", "success", 2),
                in_progress,
                // Arrived after the reference instant
                run(4, "CI", "failure", -1),
            ],
            ..FixtureSource::default()
        };

        let record = collector(fixture).collect(&window()).await.unwrap();

        assert_eq!(record.ci.runs, 1);
        assert_eq!(record.ci.success_rate.value(), Some(1.0));
    }

    #[test]
    fn test_recovery_time_averages_every_recovery() {
        let runs = [
            run(1, "CD", "success", 100),
            run(2, "CD", "failure", 90),
            run(3, "CD", "failure", 88),
            run(4, "CD", "success", 86),
            run(5, "CD", "failure", 50),
            run(6, "CD", "cancelled", 49),
            run(7, "CD", "success", 48),
            run(8, "CD", "failure", 10),
        ];
        let refs: Vec<&WorkflowRun> = runs.iter().collect();

        let metrics = deployment_metrics(&refs);

        // (90-86)h and (50-48)h; the trailing failure never recovered
        assert_eq!(metrics.recovery_time_seconds, Some(3.0 * 3600.0));
        assert_eq!(metrics.failed, 4);
        assert_eq!(metrics.successful, 3);
        assert_eq!(metrics.total, 8);
        assert_eq!(metrics.change_failure_rate.value(), Some(0.5));
    }

    #[test]
    fn test_recovery_time_without_failures() {
        let runs = [run(1, "CD", "success", 5)];
        let refs: Vec<&WorkflowRun> = runs.iter().collect();

        assert_eq!(recovery_time(&refs), None);
    }

    #[test]
    fn test_deploy_duration_counts_successful_runs_only() {
        let mut slow_failure = run(2, "CD", "failure", 3);
        slow_failure.updated_at = slow_failure.started_at.map(|s| s + Duration::hours(1));
        let runs = [run(1, "CD", "success", 5), slow_failure];
        let refs: Vec<&WorkflowRun> = runs.iter().collect();

        assert_eq!(deployment_metrics(&refs).avg_duration_seconds, Some(600.0));
    }

    #[tokio::test]
    async fn test_pull_request_flow_and_dependency_metrics() {
        let fixture = FixtureSource {
            closed_pull_requests: vec![
                pr(1, "alice", 10, Some(8)),
                pr(2, "dependabot[bot]", 30, Some(24)),
                pr(3, "bob", 24 * 40, Some(24 * 35)),
                pr(4, "carol", 5, None),
            ],
            open_pull_requests: vec![
                pr(5, "dependabot[bot]", 3, None),
                pr(6, "dependabot[bot]", 2, None),
                pr(7, "alice", 1, None),
            ],
            dependency_alerts: vec![
                DependencyAlert {
                    package: "requests".to_string(),
                    ecosystem: "pip".to_string(),
                },
                DependencyAlert {
                    package: "requests".to_string(),
                    ecosystem: "pip".to_string(),
                },
                DependencyAlert {
                    package: "urllib3".to_string(),
                    ecosystem: "pip".to_string(),
                },
            ],
            ..FixtureSource::default()
        };

        let record = collector(fixture).collect(&window()).await.unwrap();

        assert_eq!(record.pull_requests.merged, 2);
        assert_eq!(record.pull_requests.lead_time_avg_seconds, Some(4.0 * 3600.0));
        assert_eq!(record.pull_requests.lead_time_median_seconds, Some(4.0 * 3600.0));
        assert_eq!(record.dependencies.open_prs, 2);
        assert_eq!(record.dependencies.merged_prs, 1);
        assert_eq!(record.dependencies.outdated_packages, 2);
    }

    #[tokio::test]
    async fn test_custom_dependency_bot() {
        let fixture = FixtureSource {
            open_pull_requests: vec![
                pr(1, "renovate[bot]", 1, None),
                pr(2, "dependabot[bot]", 1, None),
            ],
            ..FixtureSource::default()
        };

        let record = collector(fixture)
            .with_dependency_bot("renovate[bot]".to_string())
            .collect(&window())
            .await
            .unwrap();

        assert_eq!(record.dependencies.open_prs, 1);
    }

    #[tokio::test]
    async fn test_security_last_conclusion_is_most_recent() {
        let fixture = FixtureSource {
            workflow_runs: vec![
                run(2, "Security", "failure", 1),
                run(1, "Security", "success", 48),
            ],
            ..FixtureSource::default()
        };

        let record = collector(fixture).collect(&window()).await.unwrap();

        assert_eq!(record.security.runs, 2);
        assert_eq!(record.security.last_conclusion.as_deref(), Some("failure"));
        assert_eq!(record.security.success_rate.value(), Some(0.5));
    }

    #[tokio::test]
    async fn test_record_is_stamped_with_window_end() {
        let record = collector(FixtureSource::default())
            .collect(&window())
            .await
            .unwrap();

        assert_eq!(record.generated_at, now());
        assert_eq!(record.window_days, 30);
        assert_eq!(record.repository, "octo/calc");
    }

    struct FailingSource;

    #[async_trait]
    impl EventSource for FailingSource {
        async fn fetch(&self, category: Category, _window: &Window) -> Result<Vec<Event>> {
            match category {
                Category::DependencyAlerts => Err(DashboardError::Api {
                    category,
                    message: "403 Forbidden".to_string(),
                }),
                _ => Ok(vec![]),
            }
        }
    }

    #[tokio::test]
    async fn test_failed_category_aborts_collection() {
        let collector = Collector::new(
            FailingSource,
            "octo/calc".to_string(),
            WorkflowMapping::default(),
        );

        let err = collector.collect(&window()).await.unwrap_err();

        assert!(err.to_string().contains("dependency alerts"));
    }

    struct MislabelledSource;

    #[async_trait]
    impl EventSource for MislabelledSource {
        async fn fetch(&self, category: Category, _window: &Window) -> Result<Vec<Event>> {
            match category {
                Category::WorkflowRuns => Ok(vec![Event::Alert(DependencyAlert {
                    package: "x".to_string(),
                    ecosystem: String::new(),
                })]),
                _ => Ok(vec![]),
            }
        }
    }

    #[tokio::test]
    async fn test_wrong_event_kind_is_a_data_shape_error() {
        let collector = Collector::new(
            MislabelledSource,
            "octo/calc".to_string(),
            WorkflowMapping::default(),
        );

        let err = collector.collect(&window()).await.unwrap_err();

        assert!(matches!(
            err,
            DashboardError::DataShape {
                category: Category::WorkflowRuns,
                ..
            }
        ));
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(compute_median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(compute_median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(compute_median(&[]), None);
    }
}
