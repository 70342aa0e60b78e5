use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: String, actor_id: Option<Uuid>, subject_id: Option<Uuid>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

/// Structured activity payload stored alongside each audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    /// The current/new state of the entity
    #[serde(rename = "new")]
    pub current: Value,
    /// The previous state (for update/delete operations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    /// Severity level for retention policy
    pub severity: Severity,
}

/// Log an audit event for any entity implementing `Loggable`.
/// Fire and forget: a full or closed bus never fails the request path.
pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
) {
    log_activity_with_old(event_bus, action, actor_id, entity, None);
}

pub fn log_activity_with_old<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    old_entity: Option<&T>,
) {
    let event_name = format!("{}.{}", T::entity_type(), action);

    let severity = entity.severity_for_action(action);
    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        severity,
    };

    let event = DomainEvent::new(
        event_name,
        actor_id,
        Some(entity.subject_id()),
        serde_json::to_value(&payload).unwrap_or_default(),
    );

    let _ = event_bus.send(serde_json::to_value(event).unwrap_or_default());
}

fn describe(name: &str) -> String {
    match name {
        "user_role.updated" => "User role assignments replaced",
        "user_visibility.updated" => "User visibility changed",
        "department.created" => "Department created",
        "department.updated" => "Department leaders replaced",
        "field_definition.created" => "Field definition created",
        "field_definition.updated" => "Field definition updated",
        "field_definition.deleted" => "Field definition deleted",
        "access_grant.created" => "Temporary access grant created",
        "access_grant.revoked" => "Temporary access grant revoked",
        _ => "System event",
    }
    .to_string()
}

/// Consume audit events and project them into `activity_log` plus the
/// hash-chained `event_store`.
pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    while let Ok(event) = rx.recv().await {
        if let Err(e) = persist_event(&pool, &event).await {
            tracing::error!("failed to persist audit event: {}", e);
        }
    }
}

async fn persist_event(pool: &SqlitePool, event: &Value) -> Result<(), sqlx::Error> {
    let name = event.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
    let actor_id = event.get("actor_id").and_then(|v| v.as_str()).map(String::from);
    let subject_id = event.get("subject_id").and_then(|v| v.as_str()).map(String::from);

    let occurred_at = event
        .get("occurred_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let severity = event
        .get("payload")
        .and_then(|p| p.get("severity"))
        .and_then(|s| s.as_str())
        .unwrap_or("important")
        .to_string();

    let properties = serde_json::to_string(event).unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO activity_log (id, event_name, description, actor_id, subject_id, occurred_at, properties, severity)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(describe(name))
    .bind(&actor_id)
    .bind(&subject_id)
    .bind(occurred_at)
    .bind(&properties)
    .bind(&severity)
    .execute(pool)
    .await?;

    // Hash chain: each row carries SHA256(prev_hash || payload) so tampering
    // with history is detectable.
    let prev_hash: Option<String> = sqlx::query_scalar(
        "SELECT hash FROM event_store ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    if let Some(ref ph) = prev_hash {
        hasher.update(ph.as_bytes());
    }
    hasher.update(properties.as_bytes());
    let hash = hex::encode(hasher.finalize());

    sqlx::query(
        r#"
        INSERT INTO event_store (id, event_name, occurred_at, actor_id, subject_id, payload, severity, prev_hash, hash, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(occurred_at)
    .bind(&actor_id)
    .bind(&subject_id)
    .bind(&properties)
    .bind(&severity)
    .bind(&prev_hash)
    .bind(&hash)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}
