use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AppError;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processed => "processed",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processed" => Ok(JobStatus::Processed),
            "error" => Ok(JobStatus::Error),
            other => Err(AppError::Storage(format!("Unknown job status: {other}"))),
        }
    }
}

/// One queued e-mail awaiting, or having undergone, parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: i64,
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub status: JobStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Metadata sent alongside the body to the parsing service.
    pub fn parse_metadata(&self) -> std::collections::HashMap<String, String> {
        std::collections::HashMap::from([("subject".to_string(), self.subject.clone())])
    }
}
