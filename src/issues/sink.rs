// Basic issue sinks.

use parking_lot::Mutex;
use tracing::{error, info, warn};

use super::{Issue, IssueSink, Severity};

const COMPONENT: &str = "cleanup-issues";

/// Forwards issues to `tracing`, one event per issue.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingIssueSink;

impl IssueSink for TracingIssueSink {
    fn report(&self, issue: Issue) {
        let details = issue.details.as_deref().unwrap_or("");
        match issue.severity {
            Severity::Info => info!(
                component = COMPONENT,
                source = issue.source,
                details = %details,
                "{}", issue.summary
            ),
            Severity::Warning => warn!(
                component = COMPONENT,
                source = issue.source,
                details = %details,
                "{}", issue.summary
            ),
            Severity::Error | Severity::Critical => error!(
                component = COMPONENT,
                source = issue.source,
                severity = %issue.severity,
                details = %details,
                "{}", issue.summary
            ),
        }
    }
}

/// Keeps every reported issue in memory.
#[derive(Debug, Default)]
pub struct IssueLog {
    issues: Mutex<Vec<Issue>>,
}

impl IssueLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out everything reported so far.
    pub fn snapshot(&self) -> Vec<Issue> {
        self.issues.lock().clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues
            .lock()
            .iter()
            .filter(|i| i.severity == severity)
            .count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.issues.lock().iter().any(|i| i.summary.contains(needle))
    }

    pub fn len(&self) -> usize {
        self.issues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.lock().is_empty()
    }
}

impl IssueSink for IssueLog {
    fn report(&self, issue: Issue) {
        self.issues.lock().push(issue);
    }
}
