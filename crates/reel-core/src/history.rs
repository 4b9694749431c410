//! Generation history: one record per identifier with the outcome of its
//! most recent attempt.

use crate::error::Result;
use crate::io;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub dt: String,
    #[serde(rename = "msgError")]
    pub msg_error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub term: String,
    pub generated_at: String,
    pub error: bool,
    #[serde(
        rename = "errorDetail",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_detail: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationHistory {
    records: Vec<HistoryRecord>,
}

impl GenerationHistory {
    /// Load history. Missing, blank or corrupt files yield an empty history.
    pub fn load(path: &Path) -> Result<Self> {
        let Some(data) = io::read_optional(path)? else {
            return Ok(Self::default());
        };
        match serde_json::from_str(&data) {
            Ok(history) => Ok(history),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "generation history is unreadable; starting a new one"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        io::write_json(path, self)
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn get(&self, term: &str) -> Option<&HistoryRecord> {
        self.records.iter().find(|r| r.term == term)
    }

    /// Record a successful generation. Clears any earlier error detail.
    pub fn record_success(&mut self, term: &str) {
        let now = Local::now().format(TIMESTAMP_FORMAT).to_string();
        match self.records.iter_mut().find(|r| r.term == term) {
            Some(existing) => {
                existing.error = false;
                existing.error_detail = None;
                existing.generated_at = now;
            }
            None => self.records.push(HistoryRecord {
                term: term.to_string(),
                generated_at: now,
                error: false,
                error_detail: None,
            }),
        }
    }

    /// Record a failed generation. An existing record keeps its
    /// `generated_at` so the last good run stays visible.
    pub fn record_failure(&mut self, term: &str, message: &str) {
        let now = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let detail = ErrorDetail {
            dt: now.clone(),
            msg_error: message.to_string(),
        };
        match self.records.iter_mut().find(|r| r.term == term) {
            Some(existing) => {
                existing.error = true;
                existing.error_detail = Some(detail);
            }
            None => self.records.push(HistoryRecord {
                term: term.to_string(),
                generated_at: now,
                error: true,
                error_detail: Some(detail),
            }),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter().filter(|r| r.error)
    }
}
