use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use peoplecore::{app, db, models, routes};

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::users::list_users,
        routes::users::get_profile,
        routes::users::update_visibility,
        routes::rbac::list_roles,
        routes::rbac::list_permissions,
        routes::rbac::set_user_roles,
        routes::rbac::get_effective_permissions,
        routes::departments::list_departments,
        routes::departments::create_department,
        routes::departments::update_leaders,
        routes::fields::list_fields,
        routes::fields::upsert_field,
        routes::fields::delete_field,
        routes::grants::list_grants,
        routes::grants::create_grant,
        routes::grants::revoke_grant,
    ),
    components(
        schemas(
            models::user::User,
            models::user::UserProfile,
            models::user::UserVisibility,
            models::user::VisibilityUpdateRequest,
            models::user::ViewScope,
            models::department::Department,
            models::department::DepartmentCreateRequest,
            models::department::UpdateLeadersRequest,
            models::rbac::Role,
            models::rbac::Permission,
            models::rbac::SetUserRolesRequest,
            models::rbac::UserRoleAssignment,
            models::rbac::EffectivePermissions,
            models::field::FieldDefinition,
            models::field::FieldUpsertRequest,
            models::field::Classification,
            models::grant::TemporaryAccessGrant,
            models::grant::GrantCreateRequest
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness probe"),
        (name = "Users", description = "User listing and redacted profiles"),
        (name = "RBAC", description = "Roles and effective permissions"),
        (name = "Departments", description = "Organization hierarchy"),
        (name = "Fields", description = "Field classification catalog"),
        (name = "Grants", description = "Temporary access grants")
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let pool = db::init().await?;
    let app = app::create_app(pool).await?;

    let app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let port = std::env::var("APP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8000);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
