//! Group message operations.
//!
//! Group messages carry per-member delivered/read receipts and support
//! sender-side edits and soft deletes. A soft delete blanks the body and
//! stamps `deleted_at` but keeps the record; hard removal is separate.

use std::collections::HashMap;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::group;
use crate::models::{GroupMessage, NewGroupMessage};
use crate::now_ms;

/// Append a message to a group ledger.
///
/// The sender must be a member. The store assigns the push key and the
/// send timestamp, then refreshes the group's preview and last-message
/// time.
pub async fn send_group_message(
    pool: &SqlitePool,
    group_id: &str,
    message: &NewGroupMessage,
) -> Result<GroupMessage> {
    ensure_member(pool, group_id, &message.sender_id).await?;

    let id = Uuid::now_v7().to_string();
    let sent_at = now_ms();

    sqlx::query(
        r#"
        INSERT INTO group_messages (id, group_id, sender_id, sender_name,
                                    body, kind, media_url, sent_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(group_id)
    .bind(&message.sender_id)
    .bind(&message.sender_name)
    .bind(&message.body)
    .bind(message.kind)
    .bind(&message.media_url)
    .bind(sent_at)
    .execute(pool)
    .await?;

    let preview = message.kind.preview_label(&message.body);
    sqlx::query(
        r#"
        UPDATE chat_groups
        SET last_message = ?, last_message_time = ?
        WHERE id = ?
        "#,
    )
    .bind(preview)
    .bind(sent_at)
    .bind(group_id)
    .execute(pool)
    .await?;

    Ok(GroupMessage {
        id,
        group_id: group_id.to_string(),
        sender_id: message.sender_id.clone(),
        sender_name: message.sender_name.clone(),
        body: message.body.clone(),
        kind: message.kind,
        media_url: message.media_url.clone(),
        sent_at,
        edited_at: None,
        deleted_at: None,
        delivered_to: Vec::new(),
        read_by: Vec::new(),
    })
}

/// Get a group's full message ledger, oldest first, receipts included.
pub async fn get_group_messages(pool: &SqlitePool, group_id: &str) -> Result<Vec<GroupMessage>> {
    let mut messages = sqlx::query_as::<_, GroupMessage>(
        r#"
        SELECT id, group_id, sender_id, sender_name, body, kind,
               media_url, sent_at, edited_at, deleted_at
        FROM group_messages
        WHERE group_id = ?
        ORDER BY sent_at ASC, id ASC
        "#,
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    let receipts = sqlx::query_as::<_, (String, String, Option<i64>, Option<i64>)>(
        r#"
        SELECT message_id, user_id, delivered_at, read_at
        FROM group_receipts
        WHERE message_id IN (SELECT id FROM group_messages WHERE group_id = ?)
        ORDER BY user_id ASC
        "#,
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    let index: HashMap<String, usize> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id.clone(), i))
        .collect();
    for (message_id, user_id, delivered_at, read_at) in receipts {
        if let Some(&i) = index.get(&message_id) {
            if delivered_at.is_some() {
                messages[i].delivered_to.push(user_id.clone());
            }
            if read_at.is_some() {
                messages[i].read_by.push(user_id);
            }
        }
    }

    Ok(messages)
}

/// Get a single group message with its receipts.
pub async fn get_group_message(
    pool: &SqlitePool,
    group_id: &str,
    message_id: &str,
) -> Result<GroupMessage> {
    let mut message = fetch_message(pool, group_id, message_id).await?;

    let receipts = sqlx::query_as::<_, (String, Option<i64>, Option<i64>)>(
        r#"
        SELECT user_id, delivered_at, read_at
        FROM group_receipts
        WHERE message_id = ?
        ORDER BY user_id ASC
        "#,
    )
    .bind(message_id)
    .fetch_all(pool)
    .await?;

    for (user_id, delivered_at, read_at) in receipts {
        if delivered_at.is_some() {
            message.delivered_to.push(user_id.clone());
        }
        if read_at.is_some() {
            message.read_by.push(user_id);
        }
    }

    Ok(message)
}

/// Edit a message's body. Only the sender may edit, and a soft-deleted
/// message stays deleted.
pub async fn edit_group_message(
    pool: &SqlitePool,
    group_id: &str,
    message_id: &str,
    editor_id: &str,
    new_body: &str,
) -> Result<GroupMessage> {
    let message = fetch_message(pool, group_id, message_id).await?;

    if message.sender_id != editor_id {
        return Err(StoreError::Forbidden {
            reason: "only the sender can edit a message".to_string(),
        });
    }
    if message.is_deleted() {
        return Err(StoreError::Forbidden {
            reason: "cannot edit a deleted message".to_string(),
        });
    }

    sqlx::query(
        r#"
        UPDATE group_messages
        SET body = ?, edited_at = ?
        WHERE id = ?
        "#,
    )
    .bind(new_body)
    .bind(now_ms())
    .bind(message_id)
    .execute(pool)
    .await?;

    get_group_message(pool, group_id, message_id).await
}

/// Soft-delete a message: blank the body and stamp `deleted_at`.
///
/// Only the sender may delete. Repeating the call is a no-op that keeps
/// the original deletion timestamp.
pub async fn soft_delete_group_message(
    pool: &SqlitePool,
    group_id: &str,
    message_id: &str,
    caller_id: &str,
) -> Result<GroupMessage> {
    let message = fetch_message(pool, group_id, message_id).await?;

    if message.sender_id != caller_id {
        return Err(StoreError::Forbidden {
            reason: "only the sender can delete a message".to_string(),
        });
    }

    sqlx::query(
        r#"
        UPDATE group_messages
        SET body = '', deleted_at = COALESCE(deleted_at, ?)
        WHERE id = ?
        "#,
    )
    .bind(now_ms())
    .bind(message_id)
    .execute(pool)
    .await?;

    get_group_message(pool, group_id, message_id).await
}

/// Hard-remove a message and its receipts from the ledger.
pub async fn remove_group_message(
    pool: &SqlitePool,
    group_id: &str,
    message_id: &str,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM group_messages
        WHERE id = ? AND group_id = ?
        "#,
    )
    .bind(message_id)
    .bind(group_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "GroupMessage",
            id: message_id.to_string(),
        });
    }

    Ok(())
}

/// Record that a message reached a member's device.
///
/// Idempotent: repeated calls keep the first delivery timestamp.
pub async fn mark_delivered(
    pool: &SqlitePool,
    group_id: &str,
    message_id: &str,
    user_id: &str,
) -> Result<()> {
    ensure_member(pool, group_id, user_id).await?;
    ensure_message_in_group(pool, group_id, message_id).await?;

    sqlx::query(
        r#"
        INSERT INTO group_receipts (message_id, user_id, delivered_at, read_at)
        VALUES (?, ?, ?, NULL)
        ON CONFLICT(message_id, user_id) DO UPDATE SET
            delivered_at = COALESCE(group_receipts.delivered_at, excluded.delivered_at)
        "#,
    )
    .bind(message_id)
    .bind(user_id)
    .bind(now_ms())
    .execute(pool)
    .await?;

    Ok(())
}

/// Record that a member read a message. Reading implies delivery.
///
/// Idempotent: repeated calls keep the first timestamps.
pub async fn mark_read(
    pool: &SqlitePool,
    group_id: &str,
    message_id: &str,
    user_id: &str,
) -> Result<()> {
    ensure_member(pool, group_id, user_id).await?;
    ensure_message_in_group(pool, group_id, message_id).await?;

    let now = now_ms();
    sqlx::query(
        r#"
        INSERT INTO group_receipts (message_id, user_id, delivered_at, read_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(message_id, user_id) DO UPDATE SET
            delivered_at = COALESCE(group_receipts.delivered_at, excluded.delivered_at),
            read_at = COALESCE(group_receipts.read_at, excluded.read_at)
        "#,
    )
    .bind(message_id)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a message row without receipts.
async fn fetch_message(
    pool: &SqlitePool,
    group_id: &str,
    message_id: &str,
) -> Result<GroupMessage> {
    sqlx::query_as::<_, GroupMessage>(
        r#"
        SELECT id, group_id, sender_id, sender_name, body, kind,
               media_url, sent_at, edited_at, deleted_at
        FROM group_messages
        WHERE id = ? AND group_id = ?
        "#,
    )
    .bind(message_id)
    .bind(group_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound {
        entity: "GroupMessage",
        id: message_id.to_string(),
    })
}

/// Resolve a non-member into the right error: the group may not exist at
/// all.
async fn ensure_member(pool: &SqlitePool, group_id: &str, user_id: &str) -> Result<()> {
    if group::is_member(pool, group_id, user_id).await? {
        return Ok(());
    }

    group::get_group(pool, group_id).await?;
    Err(StoreError::NotAMember {
        group_id: group_id.to_string(),
        user_id: user_id.to_string(),
    })
}

async fn ensure_message_in_group(
    pool: &SqlitePool,
    group_id: &str,
    message_id: &str,
) -> Result<()> {
    let exists = sqlx::query_scalar::<_, i32>(
        r#"
        SELECT 1
        FROM group_messages
        WHERE id = ? AND group_id = ?
        "#,
    )
    .bind(message_id)
    .bind(group_id)
    .fetch_optional(pool)
    .await?;

    if exists.is_none() {
        return Err(StoreError::NotFound {
            entity: "GroupMessage",
            id: message_id.to_string(),
        });
    }

    Ok(())
}
