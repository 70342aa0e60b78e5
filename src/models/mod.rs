pub mod department;
pub mod field;
pub mod grant;
pub mod rbac;
pub mod user;
