//! Dashboard rendering.
//!
//! Templates are plain HTML with `{{ name }}` placeholders. Every
//! placeholder must name a value exposed by [`placeholder_values`];
//! values that have no data render as [`NO_DATA`].

use std::path::Path;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};

use crate::error::{DashboardError, Result};
use crate::metrics::{MetricsRecord, Ratio};

pub const NO_DATA: &str = "no data";

const EMBEDDED_TEMPLATE: &str = include_str!("../templates/index.html");

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("placeholder pattern is valid"))
}

#[derive(Debug, Clone)]
pub struct Template {
    source: String,
}

impl Template {
    pub fn embedded() -> Self {
        Self::from_source(EMBEDDED_TEMPLATE)
    }

    pub fn from_source(source: &str) -> Self {
        Self {
            source: source.to_string(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_source(&std::fs::read_to_string(path)?))
    }

    /// Substitutes every placeholder, failing on the first one with no
    /// mapping so a half-rendered page is never produced.
    pub fn render(&self, values: &IndexMap<&'static str, Option<String>>) -> Result<String> {
        let pattern = placeholder_pattern();

        if let Some(unknown) = pattern
            .captures_iter(&self.source)
            .map(|caps| placeholder_name(&caps))
            .find(|name| !values.contains_key(*name))
        {
            return Err(DashboardError::TemplateMismatch(unknown.to_string()));
        }

        let rendered = pattern.replace_all(&self.source, |caps: &Captures<'_>| {
            values
                .get(placeholder_name(caps))
                .and_then(Option::as_deref)
                .map_or_else(|| NO_DATA.to_string(), escape_html)
        });

        Ok(rendered.into_owned())
    }
}

fn placeholder_name<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1).map_or("", |m| m.as_str().trim())
}

pub fn render_dashboard(record: &MetricsRecord, template: &Template) -> Result<String> {
    template.render(&placeholder_values(record))
}

/// Display values for every placeholder a template may use.
pub fn placeholder_values(record: &MetricsRecord) -> IndexMap<&'static str, Option<String>> {
    let d = &record.deployments;
    let pr = &record.pull_requests;
    let ci = &record.ci;
    let sec = &record.security;
    let deps = &record.dependencies;

    IndexMap::from([
        ("repository", Some(record.repository.clone())),
        ("window_days", Some(record.window_days.to_string())),
        (
            "generated_at",
            Some(record.generated_at.format("%Y-%m-%d %H:%M UTC").to_string()),
        ),
        ("deployments.total", Some(d.total.to_string())),
        ("deployments.successful", Some(d.successful.to_string())),
        ("deployments.failed", Some(d.failed.to_string())),
        ("deployments.success_rate", format_ratio(d.success_rate)),
        (
            "deployments.change_failure_rate",
            format_ratio(d.change_failure_rate),
        ),
        (
            "deployments.recovery_time",
            d.recovery_time_seconds.map(format_duration),
        ),
        (
            "deployments.avg_duration",
            d.avg_duration_seconds.map(format_duration),
        ),
        ("pull_requests.merged", Some(pr.merged.to_string())),
        (
            "pull_requests.lead_time_avg",
            pr.lead_time_avg_seconds.map(format_duration),
        ),
        (
            "pull_requests.lead_time_median",
            pr.lead_time_median_seconds.map(format_duration),
        ),
        ("ci.runs", Some(ci.runs.to_string())),
        ("ci.success_rate", format_ratio(ci.success_rate)),
        ("ci.avg_duration", ci.avg_duration_seconds.map(format_duration)),
        ("security.runs", Some(sec.runs.to_string())),
        ("security.success_rate", format_ratio(sec.success_rate)),
        ("security.last_conclusion", sec.last_conclusion.clone()),
        ("dependencies.open_prs", Some(deps.open_prs.to_string())),
        ("dependencies.merged_prs", Some(deps.merged_prs.to_string())),
        (
            "dependencies.outdated_packages",
            Some(deps.outdated_packages.to_string()),
        ),
    ])
}

fn format_ratio(ratio: Ratio) -> Option<String> {
    ratio.value().map(|v| format!("{:.1}%", v * 100.0))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (days, hours, minutes, secs) = (
        total / 86_400,
        total % 86_400 / 3_600,
        total % 3_600 / 60,
        total % 60,
    );

    match total {
        0..=59 => format!("{secs}s"),
        60..=3_599 => format!("{minutes}m {secs}s"),
        3_600..=86_399 => format!("{hours}h {minutes}m"),
        _ => format!("{days}d {hours}h"),
    }
}

fn escape_html(value: &str) -> String {
    value.chars().fold(String::with_capacity(value.len()), |mut out, c| {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
        out
    })
}
