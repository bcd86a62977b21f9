use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::events::{DependencyAlert, PullRequest, WorkflowRun};

/// A single page of a paginated GitHub listing.
pub trait PageBody: DeserializeOwned {
    type Item;

    fn into_items(self) -> Vec<Self::Item>;
}

impl<T: DeserializeOwned> PageBody for Vec<T> {
    type Item = T;

    fn into_items(self) -> Vec<T> {
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct WorkflowRunsPageDto {
    pub workflow_runs: Vec<WorkflowRunDto>,
}

impl PageBody for WorkflowRunsPageDto {
    type Item = WorkflowRunDto;

    fn into_items(self) -> Vec<WorkflowRunDto> {
        self.workflow_runs
    }
}

#[derive(Debug, Deserialize)]
pub struct WorkflowRunDto {
    pub id: u64,
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub run_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<WorkflowRunDto> for WorkflowRun {
    fn from(dto: WorkflowRunDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name.unwrap_or_default(),
            path: dto.path.unwrap_or_default(),
            conclusion: dto.conclusion,
            created_at: dto.created_at,
            started_at: dto.run_started_at,
            updated_at: dto.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UserDto {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestDto {
    pub number: u64,
    pub user: Option<UserDto>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

impl From<PullRequestDto> for PullRequest {
    fn from(dto: PullRequestDto) -> Self {
        Self {
            number: dto.number,
            // Deleted accounts come back as a null user
            author: dto.user.map(|u| u.login).unwrap_or_default(),
            created_at: dto.created_at,
            updated_at: dto.updated_at,
            merged_at: dto.merged_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PackageDto {
    pub name: String,
    #[serde(default)]
    pub ecosystem: String,
}

#[derive(Debug, Deserialize)]
pub struct DependencyDto {
    pub package: PackageDto,
}

#[derive(Debug, Deserialize)]
pub struct DependabotAlertDto {
    pub dependency: DependencyDto,
}

impl From<DependabotAlertDto> for DependencyAlert {
    fn from(dto: DependabotAlertDto) -> Self {
        Self {
            package: dto.dependency.package.name,
            ecosystem: dto.dependency.package.ecosystem,
        }
    }
}
