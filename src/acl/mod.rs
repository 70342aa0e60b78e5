//! Access-control core: RBAC evaluation, organization hierarchy traversal,
//! temporary access grants, field classification and the composed
//! row/field-level visibility decisions.
//!
//! Decision functions never error for "denied"; they return false or an
//! empty set. Only mutating operations that violate an authority rule
//! return `Forbidden`.

pub mod access;
pub mod fields;
pub mod grants;
pub mod org;
pub mod rbac;
pub mod visibility;

pub use access::{AccessControl, RowScope, UserAclRow, UserRowFilter};
pub use fields::FieldRegistry;
pub use grants::GrantStore;
pub use org::OrgSnapshot;
pub use rbac::Rbac;
pub use visibility::FieldVisibility;

/// Well-known role names
pub mod roles {
    pub const SUPER_ADMIN: &str = "super_admin";
    pub const ADMIN: &str = "admin";
    pub const HR_MANAGER: &str = "hr_manager";
    pub const MEMBER: &str = "member";

    /// Roles whose assignment or revocation is itself restricted to
    /// super-admin callers.
    pub const HIGH_PRIVILEGE: [&str; 3] = [ADMIN, HR_MANAGER, SUPER_ADMIN];
}

/// Well-known (resource, action) permission pairs
pub mod permissions {
    pub const CONTACT_READ: (&str, &str) = ("contact", "read");
    pub const USER_SENSITIVE_READ: (&str, &str) = ("user_sensitive", "read");
    pub const USER_HIGHLY_SENSITIVE_READ: (&str, &str) = ("user_highly_sensitive", "read");

    pub const USER_MANAGE: (&str, &str) = ("user", "manage");
    pub const DEPARTMENT_MANAGE: (&str, &str) = ("department", "manage");
    pub const FIELD_MANAGE: (&str, &str) = ("field_definition", "manage");
    pub const GRANT_MANAGE: (&str, &str) = ("access_grant", "manage");

    pub fn name(pair: (&str, &str)) -> String {
        format!("{}.{}", pair.0, pair.1)
    }
}

/// Internal-tier field keys a leader may read for members of departments
/// they lead, without holding `contact.read`.
pub const MANAGER_FIELD_WHITELIST: [&str; 7] = [
    "name",
    "department",
    "position",
    "employee_no",
    "employment_status",
    "join_date",
    "contact_work_email",
];
