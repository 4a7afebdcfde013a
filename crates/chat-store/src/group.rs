//! Group chat and membership operations.
//!
//! Membership is one row per member, so adding or removing someone is a
//! single-row write. Roles live in a sparse side table; a member without a
//! role row is a plain member.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{Group, GroupMember, GroupRole, NewGroup, Participant};
use crate::now_ms;

/// Create a group.
///
/// The creator becomes the first member and is granted the admin role.
pub async fn create_group(pool: &SqlitePool, group: &NewGroup) -> Result<Group> {
    let id = Uuid::now_v7().to_string();
    let created_at = now_ms();

    sqlx::query(
        r#"
        INSERT INTO chat_groups (id, name, photo_url, creator_id,
                                 last_message, last_message_time, created_at)
        VALUES (?, ?, ?, ?, '', 0, ?)
        "#,
    )
    .bind(&id)
    .bind(&group.name)
    .bind(&group.photo_url)
    .bind(&group.creator.id)
    .bind(created_at)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO group_members (group_id, user_id, display_name, photo_url, joined_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&group.creator.id)
    .bind(&group.creator.name)
    .bind(&group.creator.photo_url)
    .bind(created_at)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO group_roles (group_id, user_id, role)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&group.creator.id)
    .bind(GroupRole::Admin)
    .execute(pool)
    .await?;

    Ok(Group {
        id,
        name: group.name.clone(),
        photo_url: group.photo_url.clone(),
        creator_id: group.creator.id.clone(),
        last_message: String::new(),
        last_message_time: 0,
        created_at,
    })
}

/// Get a group by id.
pub async fn get_group(pool: &SqlitePool, id: &str) -> Result<Group> {
    sqlx::query_as::<_, Group>(
        r#"
        SELECT id, name, photo_url, creator_id, last_message,
               last_message_time, created_at
        FROM chat_groups
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound {
        entity: "Group",
        id: id.to_string(),
    })
}

/// List all groups a user belongs to, most recent activity first.
pub async fn list_groups_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Group>> {
    let groups = sqlx::query_as::<_, Group>(
        r#"
        SELECT g.id, g.name, g.photo_url, g.creator_id, g.last_message,
               g.last_message_time, g.created_at
        FROM chat_groups g
        INNER JOIN group_members m ON m.group_id = g.id
        WHERE m.user_id = ?
        ORDER BY g.last_message_time DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(groups)
}

/// List a group's members, in join order.
pub async fn members(pool: &SqlitePool, group_id: &str) -> Result<Vec<GroupMember>> {
    let members = sqlx::query_as::<_, GroupMember>(
        r#"
        SELECT group_id, user_id, display_name, photo_url, joined_at
        FROM group_members
        WHERE group_id = ?
        ORDER BY joined_at ASC, user_id ASC
        "#,
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    Ok(members)
}

/// Add a member to a group.
pub async fn add_member(pool: &SqlitePool, group_id: &str, member: &Participant) -> Result<()> {
    let joined_at = now_ms();

    sqlx::query(
        r#"
        INSERT INTO group_members (group_id, user_id, display_name, photo_url, joined_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(group_id)
    .bind(&member.id)
    .bind(&member.name)
    .bind(&member.photo_url)
    .bind(joined_at)
    .execute(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return StoreError::AlreadyExists {
                    entity: "GroupMember",
                    id: format!("{}/{}", group_id, member.id),
                };
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::NotFound {
                    entity: "Group",
                    id: group_id.to_string(),
                };
            }
        }
        StoreError::Sqlx(e)
    })?;

    Ok(())
}

/// Remove a member from a group. Their role row goes with them.
pub async fn remove_member(pool: &SqlitePool, group_id: &str, user_id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM group_members
        WHERE group_id = ? AND user_id = ?
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotAMember {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
        });
    }

    sqlx::query(
        r#"
        DELETE FROM group_roles
        WHERE group_id = ? AND user_id = ?
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Check whether a user is a member of a group.
pub async fn is_member(pool: &SqlitePool, group_id: &str, user_id: &str) -> Result<bool> {
    let result = sqlx::query_scalar::<_, i32>(
        r#"
        SELECT 1
        FROM group_members
        WHERE group_id = ? AND user_id = ?
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(result.is_some())
}

/// Set a member's role.
pub async fn set_role(
    pool: &SqlitePool,
    group_id: &str,
    user_id: &str,
    role: GroupRole,
) -> Result<()> {
    if !is_member(pool, group_id, user_id).await? {
        return Err(StoreError::NotAMember {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
        });
    }

    sqlx::query(
        r#"
        INSERT INTO group_roles (group_id, user_id, role)
        VALUES (?, ?, ?)
        ON CONFLICT(group_id, user_id) DO UPDATE SET
            role = excluded.role
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .bind(role)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a member's role. Members without a role row are plain members.
pub async fn get_role(pool: &SqlitePool, group_id: &str, user_id: &str) -> Result<GroupRole> {
    let role = sqlx::query_scalar::<_, GroupRole>(
        r#"
        SELECT role
        FROM group_roles
        WHERE group_id = ? AND user_id = ?
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    if let Some(role) = role {
        return Ok(role);
    }

    if is_member(pool, group_id, user_id).await? {
        Ok(GroupRole::Member)
    } else {
        Err(StoreError::NotAMember {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
        })
    }
}

/// Delete a group. Members, roles, messages and receipts are purged.
pub async fn delete_group(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM chat_groups
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "Group",
            id: id.to_string(),
        });
    }

    Ok(())
}
