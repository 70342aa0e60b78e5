use sqlx::Row;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use peoplecore::acl::{permissions, roles};
use peoplecore::models::field::Classification;

#[derive(Parser, Debug)]
#[command(author, version, about = "peoplecore migration and seed tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Insert baseline roles, permissions and the field catalog
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may differ,
    // so fall back to the crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator
                .undo(&pool, 1)
                .await
                .context("no migrations were rolled back")?;
            println!("Rolled back last migration");
        }
        Commands::Seed => {
            let pool = get_pool().await?;
            seed(&pool).await?;
            println!("Baseline roles, permissions and field catalog seeded");
        }
    }

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y_%m_%d_%H%M%S");
    let sanitized = sanitize_name(name);
    let filename = format!("{}_{}.sql", timestamp, sanitized);
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // If the migrations table doesn't exist, nothing is applied yet
    let db_applied =
        sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;
    let applied_versions: HashSet<i64> = if db_applied.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let version = migration.version;
        let applied = applied_versions.contains(&version);
        let status = if applied { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if !desc.is_empty() { desc } else { "unknown" };
        println!("{:<8} {:<20} {}", status, version, name);
    }

    Ok(())
}

/// Idempotent seed: safe to re-run, existing rows are left untouched.
async fn seed(pool: &SqlitePool) -> anyhow::Result<()> {
    let now = Utc::now();

    let role_defs: [(&str, &str, bool); 4] = [
        (roles::SUPER_ADMIN, "Unrestricted access across all companies", true),
        (roles::ADMIN, "Administrative access within a company", true),
        (roles::HR_MANAGER, "HR data management within a company", true),
        (roles::MEMBER, "Regular member", true),
    ];

    for (name, description, is_system) in role_defs {
        sqlx::query(
            "INSERT OR IGNORE INTO roles (id, name, description, is_system, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(description)
        .bind(is_system)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    }

    let permission_defs: [((&str, &str), &str); 7] = [
        (permissions::CONTACT_READ, "Read internal-tier contact fields"),
        (permissions::USER_SENSITIVE_READ, "Read sensitive-tier fields"),
        (permissions::USER_HIGHLY_SENSITIVE_READ, "Read highly-sensitive-tier fields"),
        (permissions::USER_MANAGE, "Manage users and their visibility"),
        (permissions::DEPARTMENT_MANAGE, "Manage departments and leaders"),
        (permissions::FIELD_MANAGE, "Manage the field classification catalog"),
        (permissions::GRANT_MANAGE, "Manage temporary access grants"),
    ];

    for ((resource, action), description) in permission_defs {
        sqlx::query(
            "INSERT OR IGNORE INTO permissions (id, resource, action, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(resource)
        .bind(action)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    }

    // Default role -> permission wiring. super_admin is deliberately left
    // without rows: its bypass is evaluated before any permission lookup.
    let wiring: [(&str, (&str, &str)); 9] = [
        (roles::ADMIN, permissions::CONTACT_READ),
        (roles::ADMIN, permissions::USER_MANAGE),
        (roles::ADMIN, permissions::DEPARTMENT_MANAGE),
        (roles::ADMIN, permissions::FIELD_MANAGE),
        (roles::ADMIN, permissions::GRANT_MANAGE),
        (roles::HR_MANAGER, permissions::CONTACT_READ),
        (roles::HR_MANAGER, permissions::USER_SENSITIVE_READ),
        (roles::HR_MANAGER, permissions::USER_MANAGE),
        (roles::HR_MANAGER, permissions::GRANT_MANAGE),
    ];

    for (role_name, (resource, action)) in wiring {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO role_permissions (role_id, permission_id, created_at)
            SELECT r.id, p.id, ?
            FROM roles r, permissions p
            WHERE r.name = ? AND p.resource = ? AND p.action = ?
            "#,
        )
        .bind(now)
        .bind(role_name)
        .bind(resource)
        .bind(action)
        .execute(pool)
        .await?;
    }

    let field_defs: [(&str, &str, Classification, bool); 12] = [
        ("name", "Name", Classification::Public, false),
        ("department", "Department", Classification::Public, false),
        ("position", "Position", Classification::Public, false),
        ("employee_no", "Employee number", Classification::Internal, false),
        ("employment_status", "Employment status", Classification::Internal, false),
        ("join_date", "Join date", Classification::Internal, false),
        ("contact_work_email", "Work email", Classification::Internal, false),
        ("contact_phone", "Phone", Classification::Internal, true),
        ("home_address", "Home address", Classification::Sensitive, true),
        ("birth_date", "Date of birth", Classification::Sensitive, false),
        ("salary", "Salary", Classification::HighlySensitive, false),
        ("national_id", "National id", Classification::HighlySensitive, false),
    ];

    for (key, label, classification, self_editable) in field_defs {
        sqlx::query(
            "INSERT OR IGNORE INTO field_definitions (key, label, classification, self_editable, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(key)
        .bind(label)
        .bind(classification.as_str())
        .bind(self_editable)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Try local ./migrations first (when running from repo root). If that
    // doesn't exist (common in containers where CWD differs), fall back to
    // the crate-local migrations folder determined by CARGO_MANIFEST_DIR.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
