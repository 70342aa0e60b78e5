use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retention class of an audit entry. Access-control mutations are
/// Critical and never trimmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    #[default]
    Important,
    Noise,
}

/// Implemented by every entity whose mutations land in the activity log.
pub trait Loggable: Serialize + Send + Sync {
    /// Event-name prefix, e.g. "access_grant" in "access_grant.created".
    fn entity_type() -> &'static str;

    /// Usually the entity's primary key.
    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Destructive actions are always retained long-term, whatever the
    /// entity's own severity says.
    fn severity_for_action(&self, action: &str) -> Severity {
        if matches!(action, "deleted" | "revoked") {
            return Severity::Critical;
        }
        self.severity()
    }
}
