mod common;

use anyhow::Result;
use chrono::{Duration, Utc};
use uuid::Uuid;

use peoplecore::acl::{roles, FieldVisibility};

use common::{
    give_permission, give_role, insert_department, insert_grant, insert_user, seed_field_catalog,
    set_leader, setup_pool,
};

#[tokio::test]
async fn empty_catalog_means_nothing_is_visible() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    let viewer = insert_user(&pool, "Viewer", None, None).await?;
    give_role(&pool, viewer, roles::SUPER_ADMIN).await?;

    let visibility = FieldVisibility::new(pool.clone());
    let keys = visibility.visible_field_keys(viewer, "user", None).await?;
    assert!(keys.is_empty());

    Ok(())
}

#[tokio::test]
async fn super_admin_sees_every_tier() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_field_catalog(&pool).await?;

    let company = Uuid::new_v4();
    let admin = insert_user(&pool, "Root", Some(company), None).await?;
    give_role(&pool, admin, roles::SUPER_ADMIN).await?;
    let target = insert_user(&pool, "Target", Some(company), None).await?;

    let visibility = FieldVisibility::new(pool.clone());
    let keys = visibility.visible_field_keys(admin, "user", Some(target)).await?;

    assert!(keys.contains("salary"));
    assert!(keys.contains("home_address"));
    assert!(keys.contains("join_date"));
    assert!(keys.contains("name"));

    Ok(())
}

#[tokio::test]
async fn plain_colleague_sees_public_only() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_field_catalog(&pool).await?;

    let company = Uuid::new_v4();
    let viewer = insert_user(&pool, "Viewer", Some(company), None).await?;
    let target = insert_user(&pool, "Target", Some(company), None).await?;

    let visibility = FieldVisibility::new(pool.clone());
    let keys = visibility.visible_field_keys(viewer, "user", Some(target)).await?;

    assert!(keys.contains("name"));
    assert!(keys.contains("position"));
    assert!(!keys.contains("join_date"));
    assert!(!keys.contains("home_address"));
    assert!(!keys.contains("salary"));

    Ok(())
}

#[tokio::test]
async fn self_view_unlocks_internal_but_not_sensitive() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_field_catalog(&pool).await?;

    let company = Uuid::new_v4();
    let me = insert_user(&pool, "Me", Some(company), None).await?;

    let visibility = FieldVisibility::new(pool.clone());
    let keys = visibility.visible_field_keys(me, "user", Some(me)).await?;

    assert!(keys.contains("join_date"));
    assert!(keys.contains("contact_phone"));
    assert!(keys.contains("employee_no"));
    // own record does not unlock the sensitive tiers
    assert!(!keys.contains("home_address"));
    assert!(!keys.contains("salary"));

    Ok(())
}

#[tokio::test]
async fn leader_gets_the_whitelist_not_all_internal_keys() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_field_catalog(&pool).await?;

    let company = Uuid::new_v4();
    let parent = insert_department(&pool, "Engineering", None, company).await?;
    let child = insert_department(&pool, "Backend", Some(parent), company).await?;

    let leader = insert_user(&pool, "Lead", Some(company), Some(parent)).await?;
    set_leader(&pool, parent, leader).await?;
    let member = insert_user(&pool, "Member", Some(company), Some(child)).await?;

    let visibility = FieldVisibility::new(pool.clone());
    let keys = visibility.visible_field_keys(leader, "user", Some(member)).await?;

    // whitelisted internal keys open up
    assert!(keys.contains("join_date"));
    assert!(keys.contains("employee_no"));
    // internal but not whitelisted: still closed
    assert!(!keys.contains("contact_phone"));
    // leadership never reaches the sensitive tiers
    assert!(!keys.contains("home_address"));
    assert!(!keys.contains("salary"));

    Ok(())
}

#[tokio::test]
async fn contact_read_opens_all_internal_keys() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_field_catalog(&pool).await?;

    let company = Uuid::new_v4();
    let viewer = insert_user(&pool, "Viewer", Some(company), None).await?;
    give_permission(&pool, viewer, "contact", "read").await?;
    let target = insert_user(&pool, "Target", Some(company), None).await?;

    let visibility = FieldVisibility::new(pool.clone());
    let keys = visibility.visible_field_keys(viewer, "user", Some(target)).await?;

    assert!(keys.contains("join_date"));
    assert!(keys.contains("contact_phone"));
    assert!(!keys.contains("home_address"));

    Ok(())
}

#[tokio::test]
async fn sensitive_tiers_gate_on_distinct_permissions() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_field_catalog(&pool).await?;

    let company = Uuid::new_v4();
    let hr = insert_user(&pool, "HR", Some(company), None).await?;
    give_permission(&pool, hr, "user_sensitive", "read").await?;
    let target = insert_user(&pool, "Target", Some(company), None).await?;

    let visibility = FieldVisibility::new(pool.clone());
    let keys = visibility.visible_field_keys(hr, "user", Some(target)).await?;

    // sensitive opens, highly-sensitive needs its own permission
    assert!(keys.contains("home_address"));
    assert!(!keys.contains("salary"));

    give_permission(&pool, hr, "user_highly_sensitive", "read").await?;
    let keys = visibility.visible_field_keys(hr, "user", Some(target)).await?;
    assert!(keys.contains("salary"));

    Ok(())
}

#[tokio::test]
async fn cross_company_target_yields_nothing_without_a_grant() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_field_catalog(&pool).await?;

    let viewer = insert_user(&pool, "Viewer", Some(Uuid::new_v4()), None).await?;
    give_permission(&pool, viewer, "user_highly_sensitive", "read").await?;
    let outsider = insert_user(&pool, "Outsider", Some(Uuid::new_v4()), None).await?;

    let visibility = FieldVisibility::new(pool.clone());
    let keys = visibility.visible_field_keys(viewer, "user", Some(outsider)).await?;

    // even public keys stay closed across the boundary
    assert!(keys.is_empty());

    Ok(())
}

#[tokio::test]
async fn cross_boundary_grant_pierces_company_isolation() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_field_catalog(&pool).await?;

    let viewer = insert_user(&pool, "Auditor", Some(Uuid::new_v4()), None).await?;
    let outsider = insert_user(&pool, "Outsider", Some(Uuid::new_v4()), None).await?;

    let now = Utc::now();
    insert_grant(
        &pool,
        viewer,
        "salary",
        now - Duration::hours(1),
        now + Duration::hours(1),
        true,
        None,
    )
    .await?;

    let visibility = FieldVisibility::new(pool.clone());
    let keys = visibility.visible_field_keys(viewer, "user", Some(outsider)).await?;

    assert!(keys.contains("salary"));
    assert!(keys.contains("name"));
    // the grant names salary only; other gated tiers stay closed
    assert!(!keys.contains("home_address"));

    Ok(())
}

#[tokio::test]
async fn missing_target_reads_as_invisible() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_field_catalog(&pool).await?;

    let viewer = insert_user(&pool, "Viewer", None, None).await?;

    let visibility = FieldVisibility::new(pool.clone());
    let keys = visibility
        .visible_field_keys(viewer, "user", Some(Uuid::new_v4()))
        .await?;
    assert!(keys.is_empty());

    Ok(())
}

/// Whenever the target row is visible at all, the public keys are always
/// part of the answer.
#[tokio::test]
async fn public_keys_are_a_floor_for_visible_targets() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_field_catalog(&pool).await?;

    let company = Uuid::new_v4();
    let target = insert_user(&pool, "Target", Some(company), None).await?;

    let plain = insert_user(&pool, "Plain", Some(company), None).await?;
    let hr = insert_user(&pool, "HR", Some(company), None).await?;
    give_permission(&pool, hr, "user_sensitive", "read").await?;
    let admin = insert_user(&pool, "Root", Some(company), None).await?;
    give_role(&pool, admin, roles::SUPER_ADMIN).await?;

    let visibility = FieldVisibility::new(pool.clone());
    for viewer in [plain, hr, admin, target] {
        let keys = visibility.visible_field_keys(viewer, "user", Some(target)).await?;
        assert!(keys.contains("name"), "viewer {} lost public keys", viewer);
        assert!(keys.contains("position"), "viewer {} lost public keys", viewer);
    }

    Ok(())
}

#[tokio::test]
async fn no_target_evaluates_viewer_capabilities_only() -> Result<()> {
    let (_dir, pool) = setup_pool().await?;
    seed_field_catalog(&pool).await?;

    let viewer = insert_user(&pool, "Viewer", None, None).await?;
    give_permission(&pool, viewer, "contact", "read").await?;

    let visibility = FieldVisibility::new(pool.clone());
    let keys = visibility.visible_field_keys(viewer, "user", None).await?;

    assert!(keys.contains("name"));
    assert!(keys.contains("join_date"));
    // no target means no self-view and no leader relation
    assert!(!keys.contains("home_address"));

    Ok(())
}
