use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

/// Sensitivity tier of a catalogued field, ordered from least to most
/// sensitive. The ordering matters: tests and callers rely on
/// `Public < Internal < Sensitive < HighlySensitive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Public,
    Internal,
    Sensitive,
    HighlySensitive,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Public => "public",
            Classification::Internal => "internal",
            Classification::Sensitive => "sensitive",
            Classification::HighlySensitive => "highly_sensitive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Classification::Public),
            "internal" => Some(Classification::Internal),
            "sensitive" => Some(Classification::Sensitive),
            "highly_sensitive" => Some(Classification::HighlySensitive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FieldDefinition {
    /// Stable identifier, e.g. "salary" or "contact_work_email".
    pub key: String,
    pub label: String,
    pub classification: Classification,
    pub self_editable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for FieldDefinition {
    fn entity_type() -> &'static str { "field_definition" }
    // Field keys are strings; derive a stable uuid for the audit log.
    fn subject_id(&self) -> Uuid { Uuid::new_v5(&Uuid::NAMESPACE_OID, self.key.as_bytes()) }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FieldUpsertRequest {
    #[schema(example = "Salary")]
    pub label: String,
    pub classification: Classification,
    #[serde(default)]
    pub self_editable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_ordered_by_sensitivity() {
        assert!(Classification::Public < Classification::Internal);
        assert!(Classification::Internal < Classification::Sensitive);
        assert!(Classification::Sensitive < Classification::HighlySensitive);
    }

    #[test]
    fn text_round_trip() {
        for tier in [
            Classification::Public,
            Classification::Internal,
            Classification::Sensitive,
            Classification::HighlySensitive,
        ] {
            assert_eq!(Classification::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(Classification::parse("secret"), None);
    }
}
