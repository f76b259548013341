use shared::store::{CacheInvalidator, Notifier, Severity};
use tracing::{error, info};

/// Used when no query cache sits in front of the store.
pub struct NoopCache;

impl CacheInvalidator for NoopCache {
    fn invalidate(&self, _key: &str) {}
}

/// Routes user notifications to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Error => error!(target: "notification", "{message}"),
            Severity::Success | Severity::Info => info!(target: "notification", ?severity, "{message}"),
        }
    }
}
