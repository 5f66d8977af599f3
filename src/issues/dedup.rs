// Deduplicating wrapper that keeps repeated issues from flooding the sink.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::{Issue, IssueSink};

struct Seen {
    last_emitted: Option<Instant>,
    suppressed: usize,
}

/// Emits an issue the first time its summary is seen, then swallows repeats
/// for `window`. The next emission after the window carries the number of
/// repeats that were swallowed.
pub struct DedupIssueSink<S: IssueSink> {
    inner: S,
    window: Duration,
    seen: DashMap<String, Seen>,
}

impl<S: IssueSink> DedupIssueSink<S> {
    pub fn new(inner: S, window: Duration) -> Self {
        Self {
            inner,
            window,
            seen: DashMap::new(),
        }
    }
}

impl<S: IssueSink> IssueSink for DedupIssueSink<S> {
    fn report(&self, issue: Issue) {
        let now = Instant::now();
        let suppressed = {
            let mut entry = self.seen.entry(issue.summary.clone()).or_insert(Seen {
                last_emitted: None,
                suppressed: 0,
            });
            if let Some(at) = entry.last_emitted {
                if now.duration_since(at) <= self.window {
                    entry.suppressed += 1;
                    return;
                }
            }
            entry.last_emitted = Some(now);
            std::mem::take(&mut entry.suppressed)
        };

        if suppressed > 0 {
            let repeated = format!("repeated {} more time(s)", suppressed);
            let details = match issue.details {
                Some(ref d) => format!("{d}; {repeated}"),
                None => repeated,
            };
            self.inner.report(Issue {
                details: Some(details),
                ..issue
            });
        } else {
            self.inner.report(issue);
        }
    }
}
