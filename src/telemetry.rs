//! Per-run telemetry.
//!
//! Every orchestrator phase and every section-generator call is recorded as a
//! [`TelemetryEvent`] with its duration, a success flag, and a coarse
//! [`ErrorCategory`]. Events are emitted through `tracing` under the
//! `devjournal::telemetry` target and also kept in memory so a run can report
//! what degraded.

use serde::Serialize;
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Coarse failure classification used in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Commit,
    Diff,
    Chat,
    Credential,
    Timeout,
    Network,
    Response,
    Io,
    Other,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Commit => "commit",
            ErrorCategory::Diff => "diff",
            ErrorCategory::Chat => "chat",
            ErrorCategory::Credential => "credential",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Network => "network",
            ErrorCategory::Response => "response",
            ErrorCategory::Io => "io",
            ErrorCategory::Other => "other",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error tagged with its telemetry category.
///
/// Wrapped in `anyhow::Error` at the point of failure; [`categorize`] finds
/// it again anywhere in the error chain.
#[derive(Debug)]
pub struct CategorizedError {
    pub category: ErrorCategory,
    pub message: String,
}

impl CategorizedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for CategorizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

impl std::error::Error for CategorizedError {}

/// Map an error chain onto a telemetry category.
pub fn categorize(err: &anyhow::Error) -> ErrorCategory {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<CategorizedError>() {
            return e.category;
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            return if e.is_timeout() {
                ErrorCategory::Timeout
            } else if e.is_decode() {
                ErrorCategory::Response
            } else {
                ErrorCategory::Network
            };
        }
        if cause.is::<tokio::time::error::Elapsed>() {
            return ErrorCategory::Timeout;
        }
        if cause.is::<serde_json::Error>() {
            return ErrorCategory::Response;
        }
        if cause.is::<sqlx::Error>() {
            return ErrorCategory::Chat;
        }
        if cause.is::<std::io::Error>() {
            return ErrorCategory::Io;
        }
    }
    ErrorCategory::Other
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub name: String,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
}

#[derive(Debug)]
pub struct Telemetry {
    run_id: String,
    events: Vec<TelemetryEvent>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            events: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Record an event that started at `started`.
    pub fn record(&mut self, name: &str, started: Instant, outcome: Result<(), ErrorCategory>) {
        let duration_ms = started.elapsed().as_millis() as u64;
        let event = TelemetryEvent {
            name: name.to_string(),
            duration_ms,
            success: outcome.is_ok(),
            category: outcome.err(),
        };

        match event.category {
            None => tracing::info!(
                target: "devjournal::telemetry",
                run_id = %self.run_id,
                event = %event.name,
                duration_ms,
                success = true,
                "telemetry"
            ),
            Some(category) => tracing::warn!(
                target: "devjournal::telemetry",
                run_id = %self.run_id,
                event = %event.name,
                duration_ms,
                success = false,
                category = %category,
                "telemetry"
            ),
        }

        self.events.push(event);
    }

    pub fn events(&self) -> &[TelemetryEvent] {
        &self.events
    }

    pub fn failures(&self) -> impl Iterator<Item = &TelemetryEvent> {
        self.events.iter().filter(|e| !e.success)
    }

    pub fn find(&self, name: &str) -> Option<&TelemetryEvent> {
        self.events.iter().find(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_categorize_tagged_error_through_context() {
        let err = anyhow::Error::new(CategorizedError::new(
            ErrorCategory::Credential,
            "OPENAI_API_KEY not set",
        ))
        .context("section generation failed");
        assert_eq!(categorize(&err), ErrorCategory::Credential);
    }

    #[test]
    fn test_categorize_io_error() {
        let result: anyhow::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")).context("reading file");
        assert_eq!(categorize(&result.unwrap_err()), ErrorCategory::Io);
    }

    #[test]
    fn test_categorize_unknown() {
        assert_eq!(categorize(&anyhow::anyhow!("boom")), ErrorCategory::Other);
    }

    #[test]
    fn test_record_keeps_events_in_order() {
        let mut telemetry = Telemetry::new();
        telemetry.record("phase:collecting", Instant::now(), Ok(()));
        telemetry.record(
            "section:frustrations",
            Instant::now(),
            Err(ErrorCategory::Timeout),
        );

        let names: Vec<_> = telemetry.events().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["phase:collecting", "section:frustrations"]);
        let failed: Vec<_> = telemetry.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].category, Some(ErrorCategory::Timeout));
    }
}
