pub mod departments;
pub mod fields;
pub mod grants;
pub mod health;
pub mod rbac;
pub mod users;

use uuid::Uuid;

use crate::acl::permissions;
use crate::app::AppState;
use crate::errors::{AppError, AppResult};

/// Write-path gate: super-admin or the named permission, else `Forbidden`.
/// Read-path decisions never use this; they degrade to empty results.
pub(crate) async fn require_permission(
    state: &AppState,
    user_id: Uuid,
    permission: (&str, &str),
) -> AppResult<()> {
    if state.rbac().has_permission(user_id, permission.0, permission.1).await? {
        return Ok(());
    }
    Err(AppError::forbidden(format!(
        "missing permission {}",
        permissions::name(permission)
    )))
}
