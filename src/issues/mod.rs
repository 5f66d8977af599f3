//! Non-fatal problem reporting for the cleanup engine.

pub mod dedup;
pub mod sink;

pub use dedup::DedupIssueSink;
pub use sink::{IssueLog, TracingIssueSink};

use std::fmt;
use std::sync::Arc;

/// How bad an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A single reported problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub source: &'static str,
    pub summary: String,
    pub details: Option<String>,
}

impl Issue {
    pub fn new(severity: Severity, source: &'static str, summary: impl Into<String>) -> Self {
        Self {
            severity,
            source,
            summary: summary.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Receiver of issues. Implementations must not block for long; they are
/// called from the cleanup worker and from request threads.
pub trait IssueSink: Send + Sync {
    fn report(&self, issue: Issue);
}

impl<T: IssueSink + ?Sized> IssueSink for Arc<T> {
    fn report(&self, issue: Issue) {
        (**self).report(issue);
    }
}
