//! 1:1 message operations.
//!
//! Sending appends to the room's log and folds the message into the parent
//! room record (preview text, timestamp, unread counter) so room lists can
//! render without touching the log.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{Message, NewMessage};
use crate::now_ms;

/// Append a message to a room's log.
///
/// The store assigns the push key (time-ordered UUIDv7) and the send
/// timestamp, so ordering never depends on sender clocks. After the insert
/// the parent room's preview and last-message time are refreshed and its
/// unread counter is incremented in place.
pub async fn send_message(
    pool: &SqlitePool,
    room_id: &str,
    message: &NewMessage,
) -> Result<Message> {
    let id = Uuid::now_v7().to_string();
    let sent_at = now_ms();

    sqlx::query(
        r#"
        INSERT INTO messages (id, room_id, sender_id, sender_name,
                              receiver_id, receiver_name, body, kind,
                              media_url, read, sent_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(&id)
    .bind(room_id)
    .bind(&message.sender_id)
    .bind(&message.sender_name)
    .bind(&message.receiver_id)
    .bind(&message.receiver_name)
    .bind(&message.body)
    .bind(message.kind)
    .bind(&message.media_url)
    .bind(sent_at)
    .execute(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_foreign_key_violation() {
                return StoreError::NotFound {
                    entity: "Room",
                    id: room_id.to_string(),
                };
            }
        }
        StoreError::Sqlx(e)
    })?;

    let preview = message.kind.preview_label(&message.body);
    sqlx::query(
        r#"
        UPDATE rooms
        SET last_message = ?, last_message_time = ?,
            unread_count = unread_count + 1
        WHERE id = ?
        "#,
    )
    .bind(preview)
    .bind(sent_at)
    .bind(room_id)
    .execute(pool)
    .await?;

    Ok(Message {
        id,
        room_id: room_id.to_string(),
        sender_id: message.sender_id.clone(),
        sender_name: message.sender_name.clone(),
        receiver_id: message.receiver_id.clone(),
        receiver_name: message.receiver_name.clone(),
        body: message.body.clone(),
        kind: message.kind,
        media_url: message.media_url.clone(),
        read: false,
        sent_at,
    })
}

/// Get a room's full message log, oldest first.
pub async fn get_messages(pool: &SqlitePool, room_id: &str) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        r#"
        SELECT id, room_id, sender_id, sender_name, receiver_id,
               receiver_name, body, kind, media_url, read, sent_at
        FROM messages
        WHERE room_id = ?
        ORDER BY sent_at ASC, id ASC
        "#,
    )
    .bind(room_id)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}

/// Get up to `limit` messages older than the `before` cursor, oldest
/// first. `None` fetches the latest page; page backwards by passing the
/// previous page's oldest `(sent_at, id)` pair. The id in the cursor
/// breaks ties, so messages stamped in the same millisecond stay
/// reachable across page boundaries.
pub async fn get_messages_before(
    pool: &SqlitePool,
    room_id: &str,
    before: Option<(i64, &str)>,
    limit: u32,
) -> Result<Vec<Message>> {
    let mut messages = match before {
        Some((ts, id)) => {
            sqlx::query_as::<_, Message>(
                r#"
                SELECT id, room_id, sender_id, sender_name, receiver_id,
                       receiver_name, body, kind, media_url, read, sent_at
                FROM messages
                WHERE room_id = ? AND (sent_at < ? OR (sent_at = ? AND id < ?))
                ORDER BY sent_at DESC, id DESC
                LIMIT ?
                "#,
            )
            .bind(room_id)
            .bind(ts)
            .bind(ts)
            .bind(id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Message>(
                r#"
                SELECT id, room_id, sender_id, sender_name, receiver_id,
                       receiver_name, body, kind, media_url, read, sent_at
                FROM messages
                WHERE room_id = ?
                ORDER BY sent_at DESC, id DESC
                LIMIT ?
                "#,
            )
            .bind(room_id)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    messages.reverse();
    Ok(messages)
}

/// Delete a message from a room's log.
///
/// The parent room's preview and unread counter are left as they are, even
/// when the deleted message was the latest one.
pub async fn delete_message(pool: &SqlitePool, room_id: &str, message_id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM messages
        WHERE id = ? AND room_id = ?
        "#,
    )
    .bind(message_id)
    .bind(room_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "Message",
            id: message_id.to_string(),
        });
    }

    Ok(())
}

/// Mark every unread message addressed to `user_id` in a room as read.
///
/// Returns the number of messages flipped; zero is not an error.
pub async fn mark_messages_read(
    pool: &SqlitePool,
    room_id: &str,
    user_id: &str,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE messages
        SET read = 1
        WHERE room_id = ? AND receiver_id = ? AND read = 0
        "#,
    )
    .bind(room_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Reset a room's unread counter to zero.
pub async fn reset_unread(pool: &SqlitePool, room_id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE rooms
        SET unread_count = 0
        WHERE id = ?
        "#,
    )
    .bind(room_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "Room",
            id: room_id.to_string(),
        });
    }

    Ok(())
}
