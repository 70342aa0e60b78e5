use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::acl::{AccessControl, FieldRegistry, FieldVisibility, GrantStore, Rbac};
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{departments, fields, grants, health, rbac, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            event_bus,
        }
    }

    pub fn rbac(&self) -> Rbac {
        Rbac::new(self.pool.clone())
    }

    pub fn access(&self) -> AccessControl {
        AccessControl::new(self.pool.clone())
    }

    pub fn grants(&self) -> GrantStore {
        GrantStore::new(self.pool.clone())
    }

    pub fn fields(&self) -> FieldRegistry {
        FieldRegistry::new(self.pool.clone())
    }

    pub fn visibility(&self) -> FieldVisibility {
        FieldVisibility::new(self.pool.clone())
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/:id/profile", get(users::get_profile))
        .route("/:id/visibility", put(users::update_visibility))
        .route("/:id/roles", put(rbac::set_user_roles))
        .route("/:id/effective-permissions", get(rbac::get_effective_permissions));

    let department_routes = Router::new()
        .route("/", get(departments::list_departments))
        .route("/", post(departments::create_department))
        .route("/:id/leaders", put(departments::update_leaders));

    let field_routes = Router::new()
        .route("/", get(fields::list_fields))
        .route("/:key", put(fields::upsert_field))
        .route("/:key", delete(fields::delete_field));

    let grant_routes = Router::new()
        .route("/", get(grants::list_grants))
        .route("/", post(grants::create_grant))
        .route("/:id", delete(grants::revoke_grant));

    let rbac_routes = Router::new()
        .route("/roles", get(rbac::list_roles))
        .route("/permissions", get(rbac::list_permissions));

    let router = Router::new()
        .route("/health", get(health::health))
        .nest("/users", user_routes)
        .nest("/departments", department_routes)
        .nest("/fields", field_routes)
        .nest("/grants", grant_routes)
        .nest("/rbac", rbac_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
