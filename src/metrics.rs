use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fraction in `[0, 1]`, or no data when the denominator was zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Option<f64>", into = "Option<f64>")]
pub struct Ratio(Option<f64>);

impl Ratio {
    pub const NO_DATA: Self = Self(None);

    pub fn of(part: usize, whole: usize) -> Self {
        if whole == 0 {
            return Self::NO_DATA;
        }

        #[allow(clippy::cast_precision_loss)]
        let value = part.min(whole) as f64 / whole as f64;
        Self(Some(value))
    }

    pub fn value(self) -> Option<f64> {
        self.0
    }
}

impl TryFrom<Option<f64>> for Ratio {
    type Error = String;

    fn try_from(value: Option<f64>) -> Result<Self, Self::Error> {
        match value {
            Some(v) if !(0.0..=1.0).contains(&v) => {
                Err(format!("ratio {v} is outside the range [0, 1]"))
            }
            other => Ok(Self(other)),
        }
    }
}

impl From<Ratio> for Option<f64> {
    fn from(ratio: Ratio) -> Self {
        ratio.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub generated_at: DateTime<Utc>,
    pub window_days: u32,
    pub repository: String,
    pub deployments: DeploymentMetrics,
    pub pull_requests: FlowMetrics,
    pub ci: CiMetrics,
    pub security: SecurityMetrics,
    pub dependencies: DependencyMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentMetrics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: Ratio,
    pub change_failure_rate: Ratio,
    pub recovery_time_seconds: Option<f64>,
    pub avg_duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowMetrics {
    pub merged: usize,
    pub lead_time_avg_seconds: Option<f64>,
    pub lead_time_median_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiMetrics {
    pub runs: usize,
    pub success_rate: Ratio,
    pub avg_duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityMetrics {
    pub runs: usize,
    pub success_rate: Ratio,
    pub last_conclusion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyMetrics {
    pub open_prs: usize,
    pub merged_prs: usize,
    pub outdated_packages: usize,
}
